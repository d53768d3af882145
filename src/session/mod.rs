pub mod manager;
pub mod types;

pub use manager::SessionStore;
pub use types::ConversationContext;
