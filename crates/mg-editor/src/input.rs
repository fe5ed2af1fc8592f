//! Input abstraction layer.
//!
//! Normalizes DOM pointer, wheel and animation-frame callbacks into a
//! unified `InputEvent` consumed by the viewport engine. Coordinates are
//! screen pixels relative to the drawing surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

impl PointerButton {
    /// Map a DOM `MouseEvent.button` value.
    pub fn from_dom(button: i16) -> Self {
        match button {
            1 => Self::Middle,
            2 => Self::Secondary,
            _ => Self::Primary,
        }
    }
}

/// A normalized input event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InputEvent {
    /// Button pressed. `time_ms` is any monotonic clock in milliseconds.
    PointerDown {
        x: f64,
        y: f64,
        #[serde(default)]
        button: PointerButton,
        #[serde(default)]
        time_ms: f64,
    },

    PointerMove { x: f64, y: f64 },

    PointerUp {
        x: f64,
        y: f64,
        #[serde(default)]
        button: PointerButton,
    },

    /// Wheel scroll; positive `delta_y` zooms out.
    Wheel { x: f64, y: f64, delta_y: f64 },

    /// Animation frame, `dt_ms` after the previous one.
    Frame { dt_ms: f64 },
}

impl InputEvent {
    pub fn from_pointer_down(x: f64, y: f64, button: i16, time_ms: f64) -> Self {
        Self::PointerDown {
            x,
            y,
            button: PointerButton::from_dom(button),
            time_ms,
        }
    }

    pub fn from_pointer_move(x: f64, y: f64) -> Self {
        Self::PointerMove { x, y }
    }

    pub fn from_pointer_up(x: f64, y: f64, button: i16) -> Self {
        Self::PointerUp {
            x,
            y,
            button: PointerButton::from_dom(button),
        }
    }

    /// Extract position if this is a pointer or wheel event.
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            Self::PointerDown { x, y, .. }
            | Self::PointerMove { x, y }
            | Self::PointerUp { x, y, .. }
            | Self::Wheel { x, y, .. } => Some((*x, *y)),
            Self::Frame { .. } => None,
        }
    }
}
