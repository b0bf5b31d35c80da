//! Process-wide "last input type" state.
//!
//! Hosts feed pointer and key events in through [`record_pointer`] and
//! [`record_key`]; rendering code that styles keyboard focus reads
//! [`keyboard_seen_last`]. The state starts as [`InputType::Mouse`].

use std::sync::atomic::{AtomicU8, Ordering};

/// Kind of input device that produced the most recent interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputType {
    Touch = 0,
    Pen = 1,
    Mouse = 2,
    Keyboard = 3,
}

impl InputType {
    /// Maps a pointer-event `pointerType` value; unknown values read as mouse.
    ///
    /// Numeric legacy codes (`"2"` touch, `"3"` pen, `"4"` mouse) are accepted.
    pub fn from_pointer_type(pointer_type: &str) -> Self {
        match pointer_type {
            "touch" | "2" => InputType::Touch,
            "pen" | "3" => InputType::Pen,
            _ => InputType::Mouse,
        }
    }

    /// Parses a lowercase input name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "touch" => Some(InputType::Touch),
            "pen" => Some(InputType::Pen),
            "mouse" => Some(InputType::Mouse),
            "keyboard" => Some(InputType::Keyboard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Touch => "touch",
            InputType::Pen => "pen",
            InputType::Mouse => "mouse",
            InputType::Keyboard => "keyboard",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => InputType::Touch,
            1 => InputType::Pen,
            3 => InputType::Keyboard,
            _ => InputType::Mouse,
        }
    }
}

static LAST_INPUT: AtomicU8 = AtomicU8::new(InputType::Mouse as u8);

/// The most recently recorded input type.
pub fn last_input_type() -> InputType {
    InputType::from_u8(LAST_INPUT.load(Ordering::Relaxed))
}

pub fn set_last_input_type(input: InputType) {
    LAST_INPUT.store(input as u8, Ordering::Relaxed);
}

/// Records a pointer-down with the given `pointerType`.
pub fn record_pointer(pointer_type: &str) {
    set_last_input_type(InputType::from_pointer_type(pointer_type));
}

/// Records a key-down.
pub fn record_key() {
    set_last_input_type(InputType::Keyboard);
}

/// True when the last interaction came from the keyboard.
pub fn keyboard_seen_last() -> bool {
    last_input_type() == InputType::Keyboard
}

/// `true` records keyboard input, `false` records mouse input.
pub fn set_keyboard_seen_last(seen: bool) {
    set_last_input_type(if seen {
        InputType::Keyboard
    } else {
        InputType::Mouse
    });
}
