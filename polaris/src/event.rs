//! Decoded protocol events and the sink that receives them.
//!
//! Events are produced on the worker thread. The [`EventSink`] is moved into
//! the worker when processing starts and dropped when it ends, so no sink
//! call can happen after the worker has observed a stop.
//!
//! Sinks whose real consumer lives on another thread should marshal events
//! instead of touching that thread's state directly; [`ChannelSink`] does
//! this with a `std::sync::mpsc` channel.

use bitflags::bitflags;
use log::warn;
use std::sync::mpsc::Sender;

/// A protocol event decoded from the display connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A key was pressed or released.
    Key {
        state: KeyState,
        keysym: u32,
        modifiers: Modifiers,
    },

    /// The pointer moved.
    PointerMotion { x: f32, y: f32 },

    /// A pointer button changed state over `window`.
    PointerButton {
        window: u32,
        state: ButtonState,
        button: MouseButton,
        x: f32,
        y: f32,
    },

    /// The pointer entered `window`.
    PointerEnter { window: u32, x: f32, y: f32 },

    /// The pointer left `window`.
    PointerLeave { window: u32, x: f32, y: f32 },

    /// The compositor resized `window`.
    WindowResized { window: u32, width: u32, height: u32 },

    /// The output configuration changed.
    OutputsChanged(Vec<Output>),
}

impl Event {
    /// Shorthand for a key press without modifiers.
    pub fn key_down(keysym: u32) -> Self {
        Event::Key {
            state: KeyState::Pressed,
            keysym,
            modifiers: Modifiers::empty(),
        }
    }

    /// Shorthand for a key release without modifiers.
    pub fn key_up(keysym: u32) -> Self {
        Event::Key {
            state: KeyState::Released,
            keysym,
            modifiers: Modifiers::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u8),
}

/// One output (monitor) as reported by the display service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,

    /// Unused outputs are connected but not part of the layout.
    pub used: bool,
}

bitflags! {
    /// Keyboard modifier flags attached to key events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u32 {
        const SHIFT     = 0b0000_0001;
        const CONTROL   = 0b0000_0010;
        const ALT       = 0b0000_0100;
        const CAPS_LOCK = 0b0000_1000;
    }
}

/// Receiving end for decoded events.
///
/// Implementations run on the worker thread and must not block for an
/// unbounded time.
pub trait EventSink: Send {
    fn deliver(&mut self, event: Event);
}

impl<F> EventSink for F
where
    F: FnMut(Event) + Send,
{
    fn deliver(&mut self, event: Event) {
        self(event)
    }
}

/// Forwards events to another thread over a channel.
///
/// Once the receiver is gone, events are dropped and a warning is logged
/// the first time it happens.
pub struct ChannelSink {
    sender: Sender<Event>,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(sender: Sender<Event>) -> Self {
        Self {
            sender,
            disconnected: false,
        }
    }
}

impl EventSink for ChannelSink {
    fn deliver(&mut self, event: Event) {
        if self.sender.send(event).is_err() && !self.disconnected {
            warn!("event receiver dropped; discarding further events");
            self.disconnected = true;
        }
    }
}
