//! Prompt relay: forwards a prompt to the Anthropic Messages API and returns
//! `{analysis}` or `{error}` envelopes.

pub mod config;
pub mod outcome;
pub mod routes;
pub mod server;

pub use config::RelayConfig;
pub use outcome::RelayOutcome;
pub use server::{RelayState, build_app};
