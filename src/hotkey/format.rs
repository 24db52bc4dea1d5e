//! Human-readable rendering of a key binding, e.g. "⌘⇧V"

use super::keys::{key_code, KeyBinding, ModifierMask};

/// Glyphs in display order
const MODIFIER_GLYPHS: [(ModifierMask, &str); 4] = [
    (ModifierMask::COMMAND, "⌘"),
    (ModifierMask::SHIFT, "⇧"),
    (ModifierMask::OPTION, "⌥"),
    (ModifierMask::CONTROL, "⌃"),
];

/// Labels for virtual key codes on the ANSI layout
const KEY_LABELS: &[(u32, &str)] = &[
    (0, "A"),
    (1, "S"),
    (2, "D"),
    (3, "F"),
    (4, "H"),
    (5, "G"),
    (6, "Z"),
    (7, "X"),
    (key_code::C, "C"),
    (key_code::V, "V"),
    (11, "B"),
    (12, "Q"),
    (13, "W"),
    (14, "E"),
    (15, "R"),
    (16, "Y"),
    (17, "T"),
    (18, "1"),
    (19, "2"),
    (20, "3"),
    (21, "4"),
    (22, "6"),
    (23, "5"),
    (25, "9"),
    (26, "7"),
    (28, "8"),
    (29, "0"),
    (31, "O"),
    (32, "U"),
    (34, "I"),
    (35, "P"),
    (key_code::RETURN, "↩\u{FE0E}"),
    (37, "L"),
    (38, "J"),
    (40, "K"),
    (45, "N"),
    (46, "M"),
    (key_code::SPACE, "Space"),
    (key_code::DELETE, "⌫"),
    (key_code::ESCAPE, "⎋"),
];

/// Render modifiers then key label. Never fails; unknown codes become `[code]`.
pub fn format_binding(binding: &KeyBinding) -> String {
    let mut out: String = MODIFIER_GLYPHS
        .iter()
        .filter(|(mask, _)| binding.modifiers.contains(*mask))
        .map(|(_, glyph)| *glyph)
        .collect();

    match key_label(binding.key_code) {
        Some(label) => out.push_str(label),
        None => out.push_str(&format!("[{}]", binding.key_code)),
    }
    out
}

/// Label for a key code, if it is in the table
pub fn key_label(key_code: u32) -> Option<&'static str> {
    KEY_LABELS
        .iter()
        .find(|(code, _)| *code == key_code)
        .map(|(_, label)| *label)
}
