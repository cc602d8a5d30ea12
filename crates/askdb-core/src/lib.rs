pub mod config;
pub mod error;
pub mod events;
pub mod safety;
pub mod types;

pub use config::AskConfig;
pub use error::{AskError, Result};
pub use events::TurnEvent;
pub use safety::{SafetyDecision, SqlSafetyGate};
pub use types::*;
