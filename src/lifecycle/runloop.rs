//! Main-thread control loop
//!
//! The OS hotkey registration has to be created and driven on the main
//! thread, so the settings controller lives here. IPC tasks reach it by
//! sending [`Command`]s and awaiting the reply.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::ipc::{DaemonStatus, Request, Response};
use crate::settings::SettingsController;

/// How long to wait for OS events before checking for commands
const TICK: Duration = Duration::from_millis(100);

/// Work for the main thread
#[derive(Debug)]
pub enum Command {
    /// Answer an IPC request
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    /// Leave the loop and release the hotkey
    Shutdown,
}

enum Tick {
    Command(Command),
    Idle,
    Closed,
}

pub struct ControlLoop {
    controller: SettingsController,
    commands: mpsc::Receiver<Command>,
    started_at: Instant,
}

impl ControlLoop {
    pub fn new(controller: SettingsController, commands: mpsc::Receiver<Command>) -> Self {
        Self {
            controller,
            commands,
            started_at: Instant::now(),
        }
    }

    /// Serve commands until shutdown. The hotkey is unregistered before
    /// this returns.
    pub fn run(mut self) {
        info!("control loop started");

        loop {
            match self.next_command() {
                Tick::Command(Command::Request { request, reply }) => {
                    debug!(?request, "handling request");
                    let response = self.handle(request);
                    if reply.send(response).is_err() {
                        debug!("requester went away before the reply");
                    }
                }
                Tick::Command(Command::Shutdown) => {
                    info!("control loop shutting down");
                    break;
                }
                Tick::Idle => {}
                Tick::Closed => {
                    warn!("command channel closed");
                    break;
                }
            }
        }

        self.controller.deactivate();
    }

    fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,
            Request::Subscribe => Response::Subscribed,
            Request::GetStatus => Response::Status(DaemonStatus::new(
                self.controller.status(),
                self.started_at.elapsed().as_secs(),
            )),
            Request::GetBinding => Response::Binding(self.controller.status()),
            Request::SetBinding { binding } => match self.controller.change_binding(binding) {
                Ok(_) => Response::Binding(self.controller.status()),
                Err(e) => Response::from(&e),
            },
            Request::ResetBinding => match self.controller.reset_binding() {
                Ok(_) => Response::Binding(self.controller.status()),
                Err(e) => Response::from(&e),
            },
            Request::ClearHistory => {
                self.controller.clear_history();
                Response::Ok
            }
        }
    }

    #[cfg(target_os = "macos")]
    fn next_command(&self) -> Tick {
        use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};

        if let Some(tick) = self.poll_command() {
            return tick;
        }

        // Deliver pending OS events, hotkey presses included, on this thread
        unsafe {
            let _ = CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, TICK, true);
        }

        self.poll_command().unwrap_or(Tick::Idle)
    }

    #[cfg(target_os = "macos")]
    fn poll_command(&self) -> Option<Tick> {
        match self.commands.try_recv() {
            Ok(command) => Some(Tick::Command(command)),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Tick::Closed),
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn next_command(&self) -> Tick {
        match self.commands.recv_timeout(TICK) {
            Ok(command) => Tick::Command(command),
            Err(mpsc::RecvTimeoutError::Timeout) => Tick::Idle,
            Err(mpsc::RecvTimeoutError::Disconnected) => Tick::Closed,
        }
    }
}
