//! Key binding and modifier mask definitions
//!
//! Key codes are macOS virtual key codes (ANSI layout). Modifier bits use
//! the Carbon `EventModifiers` values, which are what the hotkey API
//! expects and what the preferences file stores.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Virtual key codes referenced by name
pub mod key_code {
    pub const C: u32 = 8;
    pub const V: u32 = 9;
    pub const RETURN: u32 = 36;
    pub const SPACE: u32 = 49;
    pub const DELETE: u32 = 51;
    pub const ESCAPE: u32 = 53;
}

/// Set of modifier keys held together with the key code
///
/// Unknown bits are kept as-is so a stored mask always round-trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierMask(u32);

impl ModifierMask {
    #[cfg(test)]
    pub const NONE: Self = Self(0);
    /// Carbon `cmdKey`
    pub const COMMAND: Self = Self(0x0100);
    /// Carbon `shiftKey`
    pub const SHIFT: Self = Self(0x0200);
    /// Carbon `optionKey`
    pub const OPTION: Self = Self(0x0800);
    /// Carbon `controlKey`
    pub const CONTROL: Self = Self(0x1000);

    /// Wrap a raw mask, keeping every bit
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ModifierMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A key code plus modifiers, always applied as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key_code: u32,
    pub modifiers: ModifierMask,
}

impl KeyBinding {
    /// Option+V
    pub const DEFAULT: Self = Self::new(key_code::V, ModifierMask::OPTION);

    pub const fn new(key_code: u32, modifiers: ModifierMask) -> Self {
        Self { key_code, modifiers }
    }
}

impl Default for KeyBinding {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::format::format_binding(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binding() {
        let binding = KeyBinding::default();
        assert_eq!(binding.key_code, 9);
        assert_eq!(binding.modifiers.bits(), 0x0800);
    }

    #[test]
    fn test_mask_composition() {
        let mask = ModifierMask::COMMAND | ModifierMask::SHIFT;
        assert_eq!(mask.bits(), 0x0300);
        assert!(mask.contains(ModifierMask::COMMAND));
        assert!(mask.contains(ModifierMask::SHIFT));
        assert!(!mask.contains(ModifierMask::OPTION));
    }

    #[test]
    fn test_unknown_bits_preserved() {
        let mask = ModifierMask::from_bits(0x0001 | 0x0800);
        assert_eq!(mask.bits(), 0x0801);
        assert!(mask.contains(ModifierMask::OPTION));
        assert!(!mask.contains(ModifierMask::COMMAND));
    }

    #[test]
    fn test_binding_serialization() {
        let binding = KeyBinding::new(key_code::C, ModifierMask::COMMAND);
        let json = serde_json::to_string(&binding).unwrap();
        assert_eq!(json, r#"{"key_code":8,"modifiers":256}"#);
    }
}
