//! Agent Client and the A2A wire protocol (§4.6, §6).

pub mod client;
pub mod error;

pub use client::{AgentClient, AgentOutcome, TaskCallContext};
pub use error::ProtocolError;
