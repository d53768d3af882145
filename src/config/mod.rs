pub mod loader;
pub mod schema;

pub use loader::{ConfigError, load_config, load_dotenv, validate_credentials};
pub use schema::{BotMessages, Config};
