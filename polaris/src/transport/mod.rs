//! Socket-backed display connection.
//!
//! - [`StreamConnection`]: a [`Connection`](crate::Connection) over a Unix
//!   stream socket
//! - [`codec`]: the framing shared with the display service

pub mod codec;

mod stream;

pub use codec::{Request, WindowState};
pub use stream::StreamConnection;
