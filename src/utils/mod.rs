//! Utility modules for cross-cutting concerns

pub mod clock;
pub mod error;
pub mod security;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::BotError;
pub use security::WhitelistChecker;
