//! Table orchestration.
//!
//! `table` holds the controller state machine; `controller` runs it on a
//! tokio task and performs its network effects. UI/CLI layers talk to the
//! run loop through `TableCommand`s and receive `TableEvent`s back.

mod controller;
mod table;

pub use controller::run_controller;
pub use table::{Completion, Effect, Step, TableCommand, TableController};
