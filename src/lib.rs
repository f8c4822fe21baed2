pub mod actions;
pub mod api;
pub mod cli;
pub mod config;
pub mod deletion;
pub mod edit;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod query;
mod text_output;
pub mod view_state;

#[cfg(test)]
mod testing;
