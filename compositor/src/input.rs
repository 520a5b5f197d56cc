//! Input events — the tagged event model every backend feeds the frame loop.
//!
//! Backends translate their native notifications (X11 window lifecycle,
//! keyboard, pointer) into `WmEvent`s.  The frame loop matches on them
//! exhaustively, so adding a variant forces every consumer to handle it.

use crate::window::WindowHandle;

// ── Keys ───────────────────────────────────────────────────

/// Horizontal movement direction relative to the current yaw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Forward,
        Direction::Back,
        Direction::Left,
        Direction::Right,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// The fixed set of bound keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// End the session.
    Quit,
    /// Tear down and re-execute the compositor.
    Restart,
    /// Spawn the configured external application.
    Launch,
    /// Move the avatar while held.
    Move(Direction),
}

// Linux evdev key codes (linux/input-event-codes.h).
const KEY_ESC: u32 = 1;
const KEY_W: u32 = 17;
const KEY_A: u32 = 30;
const KEY_S: u32 = 31;
const KEY_D: u32 = 32;
const KEY_F1: u32 = 59;
const KEY_F12: u32 = 88;
const KEY_UP: u32 = 103;
const KEY_LEFT: u32 = 105;
const KEY_RIGHT: u32 = 106;
const KEY_DOWN: u32 = 108;

impl KeyAction {
    /// Map an evdev key code to its binding, if it has one.
    pub fn from_keycode(code: u32) -> Option<Self> {
        let action = match code {
            KEY_ESC => Self::Quit,
            KEY_F12 => Self::Restart,
            KEY_F1 => Self::Launch,
            KEY_W | KEY_UP => Self::Move(Direction::Forward),
            KEY_S | KEY_DOWN => Self::Move(Direction::Back),
            KEY_A | KEY_LEFT => Self::Move(Direction::Left),
            KEY_D | KEY_RIGHT => Self::Move(Direction::Right),
            _ => return None,
        };
        Some(action)
    }

    /// Parse an action name: `quit`, `restart`, `launch` or a direction.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "quit" => Some(Self::Quit),
            "restart" => Some(Self::Restart),
            "launch" => Some(Self::Launch),
            _ => Direction::ALL
                .into_iter()
                .find(|d| d.as_str() == name)
                .map(Self::Move),
        }
    }
}

// ── Events ─────────────────────────────────────────────────

/// One notification from the windowing system or an input device.
#[derive(Debug, Clone, PartialEq)]
pub enum WmEvent {
    /// A top-level window was created.
    Created { window: WindowHandle },
    /// A window's size changed.
    Configured {
        window: WindowHandle,
        width: u32,
        height: u32,
    },
    /// A window became visible.
    Mapped { window: WindowHandle },
    /// A window was hidden.
    Unmapped { window: WindowHandle },
    /// A window no longer exists.
    Destroyed { window: WindowHandle },
    /// A bound key changed state.
    Key { action: KeyAction, pressed: bool },
    /// Absolute pointer position in output pixels.
    PointerMotion { x: f64, y: f64 },
    /// The output window was closed by the host.
    CloseRequested,
}
