//! relaybot: a Telegram bot that streams Gemini replies into chat messages.

pub mod channels;
pub mod chat;
pub mod config;
pub mod gateway;
pub mod governor;
pub mod providers;
pub mod relay;
pub mod session;
pub mod utils;
