pub mod router;
pub mod types;

pub use router::{ChatRouter, Routed};
pub use types::{Command, IncomingContent, IncomingMessage, MediaAttachment, MediaKind};
