//! Framed wire encoding used by [`StreamConnection`](super::StreamConnection).
//!
//! Every frame is a little-endian header followed by its payload:
//!
//! ```text
//! +-------------+-------------+-------------------+
//! | opcode: u16 | length: u16 | payload[length]   |
//! +-------------+-------------+-------------------+
//! ```
//!
//! Events travel from the display service to the client, requests the other
//! way. Both directions are exposed so that a service (or a test double) can
//! be written against the same codec.

use crate::error::DecodeError;
use crate::event::{ButtonState, Event, KeyState, Modifiers, MouseButton, Output};

/// Size of the frame header.
pub const HEADER_LEN: usize = 4;

/// Largest accepted payload.
pub const MAX_PAYLOAD: usize = 4096;

pub const OP_KEY: u16 = 0x0001;
pub const OP_MOTION: u16 = 0x0002;
pub const OP_RESIZE: u16 = 0x0003;
pub const OP_OUTPUTS: u16 = 0x0004;

pub const OP_WINDOW_STATE: u16 = 0x0101;
pub const OP_TITLE: u16 = 0x0102;

const KEY_LEN: usize = 12;
const MOTION_LEN: usize = 16;
const RESIZE_LEN: usize = 12;
const OUTPUT_RECORD_LEN: usize = 20;
const WINDOW_STATE_LEN: usize = 16;

const ACTION_DOWN: u8 = 0;
const ACTION_UP: u8 = 1;
const ACTION_MOVE: u8 = 2;
const ACTION_HOVER_ENTER: u8 = 3;
const ACTION_HOVER_EXIT: u8 = 4;

const BUTTON_PRIMARY: u8 = 1;
const BUTTON_SECONDARY: u8 = 2;
const BUTTON_TERTIARY: u8 = 4;

const WIRE_SHIFT: u32 = 0x0001;
const WIRE_ALT: u32 = 0x0002;
const WIRE_CTRL: u32 = 0x1000;
const WIRE_META: u32 = 0x0001_0000;
const WIRE_CAPS_LOCK: u32 = 0x0010_0000;

/// Window state changes a client can ask the service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Create,
    Fullscreen,
    Maximized,
    Minimized,
    Restore,
    Resize,
    Destroyed,
}

impl WindowState {
    fn to_wire(self) -> u8 {
        match self {
            WindowState::Create => 0,
            WindowState::Fullscreen => 1,
            WindowState::Maximized => 2,
            WindowState::Minimized => 3,
            WindowState::Restore => 4,
            WindowState::Resize => 5,
            WindowState::Destroyed => 6,
        }
    }

    fn from_wire(v: u8) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => WindowState::Create,
            1 => WindowState::Fullscreen,
            2 => WindowState::Maximized,
            3 => WindowState::Minimized,
            4 => WindowState::Restore,
            5 => WindowState::Resize,
            6 => WindowState::Destroyed,
            other => return Err(DecodeError::UnknownWindowState(other)),
        })
    }
}

/// A message from the client to the display service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SetWindowState {
        window: u32,
        state: WindowState,
        width: u32,
        height: u32,
    },
    SetTitle {
        window: u32,
        title: String,
    },
}

/// A complete frame at the start of a buffer.
struct Frame<'a> {
    opcode: u16,
    payload: &'a [u8],

    /// Header plus payload.
    size: usize,
}

/// Splits off the first frame, or returns `None` if it is still incomplete.
fn split_frame(buf: &[u8]) -> Result<Option<Frame<'_>>, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let opcode = u16::from_le_bytes([buf[0], buf[1]]);
    let len = u16::from_le_bytes([buf[2], buf[3]]) as usize;

    if len > MAX_PAYLOAD {
        return Err(DecodeError::Oversized(len));
    }

    let size = HEADER_LEN + len;
    if buf.len() < size {
        return Ok(None);
    }

    Ok(Some(Frame {
        opcode,
        payload: &buf[HEADER_LEN..size],
        size,
    }))
}

fn expect_len(opcode: u16, payload: &[u8], expected: usize) -> Result<(), DecodeError> {
    if payload.len() != expected {
        return Err(DecodeError::BadLength {
            opcode,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn u32_at(p: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

fn i32_at(p: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

fn f32_at(p: &[u8], off: usize) -> f32 {
    f32::from_bits(u32_at(p, off))
}

fn put_header(out: &mut Vec<u8>, opcode: u16, len: usize) {
    debug_assert!(len <= MAX_PAYLOAD);

    out.extend_from_slice(&opcode.to_le_bytes());
    out.extend_from_slice(&(len as u16).to_le_bytes());
}

/// Wire bits per modifier. Meta decodes as Alt and is never encoded.
const WIRE_MODIFIERS: [(Modifiers, u32); 5] = [
    (Modifiers::SHIFT, WIRE_SHIFT),
    (Modifiers::CONTROL, WIRE_CTRL),
    (Modifiers::ALT, WIRE_ALT),
    (Modifiers::ALT, WIRE_META),
    (Modifiers::CAPS_LOCK, WIRE_CAPS_LOCK),
];

/// Translates a wire modifier mask; unknown bits are dropped.
pub fn translate_modifiers(mask: u32) -> Modifiers {
    let mut modifiers = Modifiers::empty();

    for (flag, bit) in WIRE_MODIFIERS {
        if mask & bit != 0 {
            modifiers.insert(flag);
        }
    }

    modifiers
}

fn modifiers_to_wire(modifiers: Modifiers) -> u32 {
    let mut mask = 0;

    for (flag, bit) in WIRE_MODIFIERS {
        if bit != WIRE_META && modifiers.contains(flag) {
            mask |= bit;
        }
    }

    mask
}

fn decode_button(buttons: u8) -> MouseButton {
    match buttons {
        BUTTON_PRIMARY => MouseButton::Left,
        BUTTON_SECONDARY => MouseButton::Right,
        BUTTON_TERTIARY => MouseButton::Middle,
        other => MouseButton::Other(other),
    }
}

fn encode_button(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => BUTTON_PRIMARY,
        MouseButton::Right => BUTTON_SECONDARY,
        MouseButton::Middle => BUTTON_TERTIARY,
        MouseButton::Other(v) => v,
    }
}

/// Decodes one motion frame. Exactly one action is handled per frame.
fn decode_motion(p: &[u8]) -> Option<Event> {
    let window = u32_at(p, 0);
    let action = p[4];
    let button = decode_button(p[5]);
    let x = f32_at(p, 8);
    let y = f32_at(p, 12);

    match action {
        ACTION_DOWN | ACTION_UP => Some(Event::PointerButton {
            window,
            state: if action == ACTION_DOWN {
                ButtonState::Pressed
            } else {
                ButtonState::Released
            },
            button,
            x,
            y,
        }),
        ACTION_MOVE => Some(Event::PointerMotion { x, y }),
        ACTION_HOVER_ENTER => Some(Event::PointerEnter { window, x, y }),
        ACTION_HOVER_EXIT => Some(Event::PointerLeave { window, x, y }),
        _ => None,
    }
}

fn decode_outputs(opcode: u16, p: &[u8]) -> Result<Vec<Output>, DecodeError> {
    if p.len() < 4 {
        return Err(DecodeError::BadLength {
            opcode,
            expected: 4,
            actual: p.len(),
        });
    }

    let count = u32_at(p, 0) as usize;
    expect_len(
        opcode,
        p,
        count.saturating_mul(OUTPUT_RECORD_LEN).saturating_add(4),
    )?;

    Ok(p[4..]
        .chunks_exact(OUTPUT_RECORD_LEN)
        .map(|r| Output {
            x: i32_at(r, 0),
            y: i32_at(r, 4),
            width: u32_at(r, 8),
            height: u32_at(r, 12),
            used: r[16] != 0,
        })
        .collect())
}

/// Decodes the first event frame in `buf`.
///
/// Returns `Ok(None)` while the frame is incomplete. Otherwise returns the
/// number of bytes consumed together with the event; frames that carry no
/// event for this client (such as unhandled pointer actions) yield `None`.
pub fn decode_event(buf: &[u8]) -> Result<Option<(Option<Event>, usize)>, DecodeError> {
    let Some(frame) = split_frame(buf)? else {
        return Ok(None);
    };
    let p = frame.payload;

    let event = match frame.opcode {
        OP_KEY => {
            expect_len(frame.opcode, p, KEY_LEN)?;
            let state = match p[0] {
                0 => KeyState::Released,
                1 => KeyState::Pressed,
                other => return Err(DecodeError::UnknownKeyState(other)),
            };
            Some(Event::Key {
                state,
                keysym: u32_at(p, 4),
                modifiers: translate_modifiers(u32_at(p, 8)),
            })
        }
        OP_MOTION => {
            expect_len(frame.opcode, p, MOTION_LEN)?;
            decode_motion(p)
        }
        OP_RESIZE => {
            expect_len(frame.opcode, p, RESIZE_LEN)?;
            Some(Event::WindowResized {
                window: u32_at(p, 0),
                width: u32_at(p, 4),
                height: u32_at(p, 8),
            })
        }
        OP_OUTPUTS => Some(Event::OutputsChanged(decode_outputs(frame.opcode, p)?)),
        other => return Err(DecodeError::UnknownOpcode(other)),
    };

    Ok(Some((event, frame.size)))
}

/// Appends the frame for `event` to `out`.
///
/// # Errors
///
/// Returns [`DecodeError::Oversized`] and leaves `out` untouched if the
/// payload would not fit in a frame.
pub fn encode_event(event: &Event, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    match event {
        Event::Key {
            state,
            keysym,
            modifiers,
        } => {
            put_header(out, OP_KEY, KEY_LEN);
            out.push(match state {
                KeyState::Released => 0,
                KeyState::Pressed => 1,
            });
            out.extend_from_slice(&[0; 3]);
            out.extend_from_slice(&keysym.to_le_bytes());
            out.extend_from_slice(&modifiers_to_wire(*modifiers).to_le_bytes());
        }
        Event::PointerMotion { x, y } => {
            put_motion(out, 0, ACTION_MOVE, 0, *x, *y);
        }
        Event::PointerButton {
            window,
            state,
            button,
            x,
            y,
        } => {
            let action = match state {
                ButtonState::Pressed => ACTION_DOWN,
                ButtonState::Released => ACTION_UP,
            };
            put_motion(out, *window, action, encode_button(*button), *x, *y);
        }
        Event::PointerEnter { window, x, y } => {
            put_motion(out, *window, ACTION_HOVER_ENTER, 0, *x, *y);
        }
        Event::PointerLeave { window, x, y } => {
            put_motion(out, *window, ACTION_HOVER_EXIT, 0, *x, *y);
        }
        Event::WindowResized {
            window,
            width,
            height,
        } => {
            put_header(out, OP_RESIZE, RESIZE_LEN);
            out.extend_from_slice(&window.to_le_bytes());
            out.extend_from_slice(&width.to_le_bytes());
            out.extend_from_slice(&height.to_le_bytes());
        }
        Event::OutputsChanged(outputs) => {
            let len = outputs
                .len()
                .saturating_mul(OUTPUT_RECORD_LEN)
                .saturating_add(4);
            if len > MAX_PAYLOAD {
                return Err(DecodeError::Oversized(len));
            }

            put_header(out, OP_OUTPUTS, len);
            out.extend_from_slice(&(outputs.len() as u32).to_le_bytes());
            for output in outputs {
                out.extend_from_slice(&output.x.to_le_bytes());
                out.extend_from_slice(&output.y.to_le_bytes());
                out.extend_from_slice(&output.width.to_le_bytes());
                out.extend_from_slice(&output.height.to_le_bytes());
                out.push(output.used as u8);
                out.extend_from_slice(&[0; 3]);
            }
        }
    }

    Ok(())
}

fn put_motion(out: &mut Vec<u8>, window: u32, action: u8, buttons: u8, x: f32, y: f32) {
    put_header(out, OP_MOTION, MOTION_LEN);
    out.extend_from_slice(&window.to_le_bytes());
    out.extend_from_slice(&[action, buttons, 0, 0]);
    out.extend_from_slice(&x.to_bits().to_le_bytes());
    out.extend_from_slice(&y.to_bits().to_le_bytes());
}

/// Appends the frame for `request` to `out`.
///
/// Titles longer than a frame allows are truncated at a character boundary.
pub fn encode_request(request: &Request, out: &mut Vec<u8>) {
    match request {
        Request::SetWindowState {
            window,
            state,
            width,
            height,
        } => {
            put_header(out, OP_WINDOW_STATE, WINDOW_STATE_LEN);
            out.extend_from_slice(&window.to_le_bytes());
            out.extend_from_slice(&[state.to_wire(), 0, 0, 0]);
            out.extend_from_slice(&width.to_le_bytes());
            out.extend_from_slice(&height.to_le_bytes());
        }
        Request::SetTitle { window, title } => {
            let mut end = title.len().min(MAX_PAYLOAD - 4);
            while !title.is_char_boundary(end) {
                end -= 1;
            }

            put_header(out, OP_TITLE, 4 + end);
            out.extend_from_slice(&window.to_le_bytes());
            out.extend_from_slice(&title.as_bytes()[..end]);
        }
    }
}

/// Decodes the first request frame in `buf`.
///
/// Returns `Ok(None)` while the frame is incomplete.
pub fn decode_request(buf: &[u8]) -> Result<Option<(Request, usize)>, DecodeError> {
    let Some(frame) = split_frame(buf)? else {
        return Ok(None);
    };
    let p = frame.payload;

    let request = match frame.opcode {
        OP_WINDOW_STATE => {
            expect_len(frame.opcode, p, WINDOW_STATE_LEN)?;
            Request::SetWindowState {
                window: u32_at(p, 0),
                state: WindowState::from_wire(p[4])?,
                width: u32_at(p, 8),
                height: u32_at(p, 12),
            }
        }
        OP_TITLE => {
            if p.len() < 4 {
                return Err(DecodeError::BadLength {
                    opcode: frame.opcode,
                    expected: 4,
                    actual: p.len(),
                });
            }
            let title = std::str::from_utf8(&p[4..]).map_err(|_| DecodeError::InvalidUtf8)?;
            Request::SetTitle {
                window: u32_at(p, 0),
                title: title.to_owned(),
            }
        }
        other => return Err(DecodeError::UnknownOpcode(other)),
    };

    Ok(Some((request, frame.size)))
}
