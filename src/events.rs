//! Event definitions for the application event loop.
//!
//! Every producer (stream workers, exit watchers, restart timers, the input thread
//! and the signal listener) sends into one channel; the loop is the only consumer,
//! which serializes all supervisor mutations.

use crossterm::event::KeyEvent;

use crate::output::CapturedLine;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// Something happened to a supervised process.
    Process(ProcessUpdate),
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize,
    /// A termination signal was received (the cleanup hook has already run).
    Shutdown { signal: &'static str },
}

/// Updates applied by the supervisor.
#[derive(Debug, Clone)]
pub enum ProcessUpdate {
    /// A classified line from one of the child's streams.
    Line(CapturedLine),
    /// A spawned instance terminated.
    Exited {
        name: String,
        generation: u64,
        code: i32,
    },
    /// The restart delay for `name` elapsed.
    RestartDue { name: String },
}
