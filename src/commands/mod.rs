//! Command handling module.
//!
//! Parses the gate's slash commands and button presses, runs them against
//! the referral gate and dispatches Bot API updates.

mod dispatcher;
mod handler;
mod types;

pub use dispatcher::{DispatcherMessage, UpdateDispatcher};
pub use handler::CommandHandler;
pub use types::{normalize_channel, GateCommand, Response, CHECK_SUBSCRIPTION};
