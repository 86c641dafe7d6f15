//! # Polaris
//!
//! **Polaris** is a display-server client shim. It keeps a connection to a
//! windowing/compositor service moving from a dedicated background thread,
//! turns inbound protocol messages into [`Event`]s and exposes screen state
//! to the host graphics pipeline.
//!
//! At its heart is the protocol I/O [`Scheduler`]:
//!
//! - A **single worker thread** per connection, blocked in `epoll` while idle
//! - **In-order dispatch**: buffered messages are delivered before any new
//!   read, so a readiness edge never overtakes a batch in progress
//! - **Backpressure** through the interest set: write readiness is requested
//!   only while a flush would block, and dropped again once it completes
//! - **Cooperative shutdown** through an atomic flag and an `eventfd` waker,
//!   with a joining [`Scheduler::stop`] by default
//!
//! Any transport failure ends the worker and invalidates the [`Connection`];
//! reconnecting is left to the owner.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use polaris::display::Display;
//! use polaris::transport::StreamConnection;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = StreamConnection::connect("/run/user/1000/display-0")?;
//!     let mut display = Display::new(connection);
//!
//!     let events = display.start_processing_events()?;
//!     for event in events {
//!         display.handle_event(&event);
//!         println!("{:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`display`]: Connection owner with the screen list
//! - [`transport`]: Unix socket connection and its wire codec
//!
//! Only Linux is supported.

mod builder;
mod connection;
mod error;
mod event;
mod reactor;

pub mod display;
pub mod transport;

pub use builder::SchedulerBuilder;
pub use connection::{Connection, FlushOutcome};
pub use error::{DecodeError, Error, Result};
pub use event::{
    ButtonState, ChannelSink, Event, EventSink, KeyState, Modifiers, MouseButton, Output,
};
pub use reactor::{Interest, Scheduler, SchedulerStats};
