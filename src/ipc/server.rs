//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! application events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::events::AppEvent;
use crate::lifecycle::Command;

use super::protocol::{Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    commands: std_mpsc::Sender<Command>,
    events: broadcast::Sender<AppEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket. Must be called within a tokio runtime.
    pub fn new(
        socket_path: &Path,
        commands: std_mpsc::Sender<Command>,
        events: broadcast::Sender<AppEvent>,
    ) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            commands,
            events,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let commands = self.commands.clone();
                    let events = self.events.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, commands, events) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Disconnect clients and remove the socket file
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Serve one client until it disconnects
async fn handle_client(
    stream: UnixStream,
    commands: std_mpsc::Sender<Command>,
    events: broadcast::Sender<AppEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    // Reads happen on their own task so a pushed notification never
    // interrupts a half-read request.
    let (request_tx, mut request_rx) = mpsc::channel::<Request>(8);
    let reader_task = tokio::spawn(async move {
        loop {
            match read_message::<Request, _>(&mut reader).await {
                Ok(Some(request)) => {
                    if request_tx.send(request).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(?e, "failed to read request");
                    break;
                }
            }
        }
    });

    let mut subscription: Option<broadcast::Receiver<AppEvent>> = None;

    let result = loop {
        tokio::select! {
            request = request_rx.recv() => {
                let Some(request) = request else { break Ok(()) };
                debug!(?request, "received request");

                let response = match request {
                    Request::Ping => Response::Pong,
                    Request::Subscribe => {
                        subscription = Some(events.subscribe());
                        debug!("client subscribed to notifications");
                        Response::Subscribed
                    }
                    other => dispatch(&commands, other).await,
                };

                if let Err(e) = send_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = next_event(&mut subscription) => {
                match event {
                    Some(event) => {
                        let note = Notification::Event { event };
                        if let Err(e) = send_message(&mut writer, &note).await {
                            break Err(e);
                        }
                    }
                    None => subscription = None,
                }
            }
        }
    };

    reader_task.abort();
    result
}

/// Hand a request to the main thread and wait for its answer
async fn dispatch(commands: &std_mpsc::Sender<Command>, request: Request) -> Response {
    let (reply, response) = oneshot::channel();
    if commands.send(Command::Request { request, reply }).is_err() {
        return unavailable();
    }
    response.await.unwrap_or_else(|_| unavailable())
}

fn unavailable() -> Response {
    Response::Error {
        code: "unavailable".to_string(),
        message: "daemon is shutting down".to_string(),
    }
}

/// Next event for a subscribed client; pending forever when not subscribed.
/// `None` means the event channel closed.
async fn next_event(subscription: &mut Option<broadcast::Receiver<AppEvent>>) -> Option<AppEvent> {
    let Some(rx) = subscription else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Read one length-prefixed JSON message; `None` on clean EOF
pub(crate) async fn read_message<T, R>(reader: &mut R) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large ({len} bytes)");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    let msg = serde_json::from_slice(&msg_buf).context("failed to parse message")?;
    Ok(Some(msg))
}

/// Send a length-prefixed JSON message
pub(crate) async fn send_message<T, W>(writer: &mut W, msg: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    async fn request(stream: &mut UnixStream, request: Request) -> Value {
        send_message(stream, &request).await.unwrap();
        read_message::<Value, _>(stream).await.unwrap().unwrap()
    }

    #[test]
    fn test_ping_and_event_push() {
        tokio_test::block_on(async {
            let dir = tempdir().unwrap();
            let socket = dir.path().join("daemon.sock");
            let (commands, _command_rx) = std_mpsc::channel();
            let (events, _) = broadcast::channel(16);

            let server = Arc::new(Server::new(&socket, commands, events.clone()).unwrap());
            let running = Arc::clone(&server);
            tokio::spawn(async move { running.run().await });

            let mut client = UnixStream::connect(&socket).await.unwrap();
            assert_eq!(request(&mut client, Request::Ping).await["type"], "pong");
            assert_eq!(request(&mut client, Request::Subscribe).await["type"], "subscribed");

            events.send(AppEvent::ShowHistoryRequested).unwrap();
            let note = read_message::<Value, _>(&mut client).await.unwrap().unwrap();
            assert_eq!(note["type"], "event");
            assert_eq!(note["event"]["type"], "show_history_requested");

            server.shutdown().await;
            assert!(!socket.exists());
        });
    }

    #[test]
    fn test_requests_are_dispatched_to_main_thread() {
        let (commands, command_rx) = std_mpsc::channel::<Command>();
        let responder = thread::spawn(move || {
            if let Ok(Command::Request { request, reply }) = command_rx.recv() {
                assert_eq!(request, Request::ClearHistory);
                reply.send(Response::Ok).unwrap();
            }
        });

        tokio_test::block_on(async {
            let dir = tempdir().unwrap();
            let socket = dir.path().join("daemon.sock");
            let (events, _) = broadcast::channel(16);

            let server = Arc::new(Server::new(&socket, commands, events).unwrap());
            let running = Arc::clone(&server);
            tokio::spawn(async move { running.run().await });

            let mut client = UnixStream::connect(&socket).await.unwrap();
            assert_eq!(request(&mut client, Request::ClearHistory).await["type"], "ok");
        });

        responder.join().unwrap();
    }

    #[test]
    fn test_oversized_message_rejected() {
        tokio_test::block_on(async {
            let mut frame: &[u8] = &(MAX_MESSAGE_LEN as u32 + 1).to_le_bytes();
            let result = read_message::<Request, _>(&mut frame).await;
            assert!(result.is_err());
        });
    }
}
