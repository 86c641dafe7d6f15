//! The display subsystem that owns a connection and its scheduler.
//!
//! A [`Display`] is an explicit handle: create one per connection and pass
//! it to whoever needs it. Events are handed to the controller thread over a
//! channel returned by [`Display::start_processing_events`]; the controller
//! feeds them back through [`Display::handle_event`] to keep display state
//! such as the screen list current.

use crate::builder::SchedulerBuilder;
use crate::connection::Connection;
use crate::error::Result;
use crate::event::{ChannelSink, Event, Output};
use crate::reactor::Scheduler;

use log::debug;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An axis-aligned rectangle in global compositor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// An output in use by the display service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    geometry: Rect,
}

impl Screen {
    pub fn geometry(&self) -> Rect {
        self.geometry
    }
}

impl From<&Output> for Screen {
    fn from(output: &Output) -> Self {
        Screen {
            geometry: Rect {
                x: output.x,
                y: output.y,
                width: output.width,
                height: output.height,
            },
        }
    }
}

/// A connection to the display service together with its I/O scheduler.
pub struct Display<C: Connection> {
    scheduler: Scheduler<C>,

    /// May be read from any thread holding a reference to the display.
    screens: Mutex<Vec<Screen>>,

    processing: bool,
}

impl<C: Connection> Display<C> {
    /// Wraps `connection` with a default-configured scheduler.
    pub fn new(connection: C) -> Self {
        Self::with_builder(connection, SchedulerBuilder::new())
    }

    pub fn with_builder(connection: C, builder: SchedulerBuilder) -> Self {
        Self {
            scheduler: builder.build(Arc::new(connection)),
            screens: Mutex::new(Vec::new()),
            processing: false,
        }
    }

    /// Returns `false` once the connection has failed.
    pub fn is_valid(&self) -> bool {
        self.scheduler.connection().is_valid()
    }

    pub fn connection(&self) -> &Arc<C> {
        self.scheduler.connection()
    }

    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    /// Starts the background worker and returns the stream of events.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Scheduler::start`].
    pub fn start_processing_events(&mut self) -> Result<Receiver<Event>> {
        let (sender, receiver) = mpsc::channel();

        self.scheduler.start(ChannelSink::new(sender))?;
        self.processing = true;

        debug!("display started processing events");
        Ok(receiver)
    }

    /// Stops the background worker. Idempotent.
    pub fn stop_processing_events(&mut self) {
        self.scheduler.stop();
        self.processing = false;
    }

    /// Returns `true` between a successful start and the next stop.
    ///
    /// This does not turn `false` by itself when the connection fails; check
    /// [`is_valid`](Self::is_valid) for that.
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Asks the worker to flush queued outbound messages.
    pub fn flush(&self) {
        self.scheduler.request_flush();
    }

    /// Applies an event to display state on the controller thread.
    ///
    /// Output changes replace the screen list while processing is active and
    /// are ignored otherwise.
    pub fn handle_event(&self, event: &Event) {
        if let Event::OutputsChanged(outputs) = event {
            if self.processing {
                self.update_screens(outputs);
            }
        }
    }

    /// Replaces the screen list with the outputs that are in use.
    pub fn update_screens(&self, outputs: &[Output]) {
        let screens: Vec<Screen> = outputs
            .iter()
            .filter(|o| o.used)
            .map(Screen::from)
            .collect();

        debug!("screen list updated: {} in use", screens.len());
        *self.screens_guard() = screens;
    }

    /// Returns a snapshot of the screen list.
    pub fn screens(&self) -> Vec<Screen> {
        self.screens_guard().clone()
    }

    /// The first screen in use, if any.
    pub fn primary_screen(&self) -> Option<Screen> {
        self.screens_guard().first().copied()
    }

    fn screens_guard(&self) -> MutexGuard<'_, Vec<Screen>> {
        self.screens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connection> Drop for Display<C> {
    fn drop(&mut self) {
        self.stop_processing_events();
    }
}
