// Core types and functionality for start-defender

pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod secrets;
pub mod types;

pub use error::{DefenderError, DefenderResult};
pub use types::*;
