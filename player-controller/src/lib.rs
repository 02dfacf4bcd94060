pub mod types;
pub mod errors;
pub mod config;
pub mod serde_helpers;
pub mod transport;
pub mod engine;
pub mod controller;
pub mod classifier;
pub mod poller;
pub mod session;
#[cfg(test)]
mod session_test;
pub mod input;
#[cfg(test)]
mod input_test;
pub mod continuity;
pub mod app;
pub mod mock_server;
#[cfg(test)]
mod testing;

pub use types::*;
pub use errors::*;
