//! Gateway for relaybot
//!
//! Wires the Telegram dispatcher, the Gemini client and the stream relay
//! together, then polls Telegram until SIGTERM/SIGINT.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::channels::{MessageDispatcher, TelegramDispatcher};
use crate::chat::{ChatRouter, Command, IncomingContent, IncomingMessage, MediaAttachment, MediaKind};
use crate::config::Config;
use crate::governor::RateGovernor;
use crate::providers::{GeminiClient, GeminiConfig, ModelClient, SessionOptions};
use crate::relay::{RelayConfig, StreamRelay};
use crate::session::SessionStore;
use crate::utils::{BotError, Clock, SystemClock};

const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";
const DEFAULT_VOICE_MIME: &str = "audio/ogg";
const PHOTO_MIME: &str = "image/jpeg";

/// Username used to match `/command@bot` in group chats
#[derive(Debug, Clone)]
struct BotName(String);

/// Runs the bot until a shutdown signal arrives.
///
/// Both credentials must already be present in `config`.
pub async fn run_gateway(config: &Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting relaybot gateway");

    let token = config
        .telegram_token
        .as_deref()
        .ok_or_else(|| BotError::config("Telegram bot token is not set"))?;
    let api_key = config
        .gemini_api_key
        .as_deref()
        .ok_or_else(|| BotError::config("Gemini API key is not set"))?;

    let telegram = TelegramDispatcher::new(token).map_err(|e| BotError::config(e.to_string()))?;
    let bot = telegram.bot().clone();

    let me = bot
        .get_me()
        .await
        .map_err(|e| BotError::external_service("telegram", e.to_string()))?;
    let bot_name = me.username().to_string();
    info!(username = %bot_name, "Connected to Telegram");

    if let Err(e) = register_commands(&bot, config).await {
        warn!(error = %e, "Failed to register bot commands");
    }

    let gemini = GeminiClient::new(
        GeminiConfig::new(api_key).with_base_url(config.gemini_base_url.clone()),
    )
    .map_err(|e| BotError::config(e.to_string()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client: Arc<dyn ModelClient> = Arc::new(gemini);
    let dispatcher: Arc<dyn MessageDispatcher> = Arc::new(telegram);

    let sessions = Arc::new(SessionStore::new(
        Arc::clone(&client),
        SessionOptions::for_bot(config.system_instruction.clone(), config.enable_search),
        Duration::from_secs(config.session_ttl_secs),
        Arc::clone(&clock),
    ));
    let governor = Arc::new(RateGovernor::new(
        config.rpm_limit,
        config.tpm_limit,
        Arc::clone(&clock),
    ));
    let relay = Arc::new(StreamRelay::new(
        client,
        Arc::clone(&dispatcher),
        Arc::clone(&sessions),
        governor,
        clock,
        RelayConfig::from_config(config),
    ));
    let router = Arc::new(ChatRouter::new(relay, dispatcher, sessions, config));

    info!(
        model = %config.model,
        pro_model = %config.pro_model,
        rpm_limit = config.rpm_limit,
        tpm_limit = config.tpm_limit,
        session_ttl_secs = config.session_ttl_secs,
        "Gateway initialized, polling for updates"
    );

    let handler = Update::filter_message().endpoint(handle_message);
    let mut polling = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, Arc::new(BotName(bot_name))])
        .default_handler(|update| async move {
            debug!(update_id = update.id.0, "Ignoring unsupported update");
        })
        .build();

    tokio::select! {
        _ = polling.dispatch() => {
            warn!("Update polling stopped");
        }
        _ = shutdown_signal() => {}
    }

    info!("Gateway shutdown complete");
    Ok(())
}

/// Command menu shown by Telegram clients.
pub fn bot_commands(config: &Config) -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Start"),
        BotCommand::new("gemini", format!("using {}", config.model)),
        BotCommand::new("gemini_pro", format!("using {}", config.pro_model)),
        BotCommand::new("youtube", "Ask about a YouTube video"),
        BotCommand::new("clear", "Clear all history"),
    ]
}

async fn register_commands(bot: &Bot, config: &Config) -> Result<(), teloxide::RequestError> {
    bot.delete_my_commands().await?;
    bot.set_my_commands(bot_commands(config)).await?;
    Ok(())
}

async fn handle_message(
    msg: Message,
    router: Arc<ChatRouter>,
    bot_name: Arc<BotName>,
) -> ResponseResult<()> {
    let Some(incoming) = to_incoming(&msg, &bot_name.0) else {
        debug!(chat_id = msg.chat.id.0, "Ignoring message without supported content");
        return Ok(());
    };

    let user_id = incoming.user_id;
    match router.handle(incoming).await {
        Ok(routed) => debug!(user_id = user_id, routed = ?routed, "Message handled"),
        Err(e) => error!(user_id = user_id, error = %e, "Failed to answer message"),
    }
    Ok(())
}

/// Strips a Telegram message down to what the router needs.
fn to_incoming(msg: &Message, bot_name: &str) -> Option<IncomingMessage> {
    let user = msg.from.as_ref()?;
    let content = if let Some(text) = msg.text() {
        match Command::parse(text, bot_name) {
            Ok(command) => IncomingContent::Command(command),
            Err(_) => IncomingContent::Text(text.to_string()),
        }
    } else {
        IncomingContent::Media(media_of(msg)?)
    };

    Some(IncomingMessage {
        user_id: user.id.0 as i64,
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        is_private: msg.chat.is_private(),
        content,
    })
}

fn media_of(msg: &Message) -> Option<MediaAttachment> {
    let caption = msg.caption().map(str::to_string);

    let (kind, file_id, mime_type) = if let Some(photos) = msg.photo() {
        // sizes are ordered smallest first
        let largest = photos.last()?;
        (MediaKind::Image, largest.file.id.clone(), PHOTO_MIME.to_string())
    } else if let Some(doc) = msg.document() {
        let mime = doc.mime_type.as_ref()?.essence_str().to_string();
        (MediaKind::from_document_mime(&mime)?, doc.file.id.clone(), mime)
    } else if let Some(audio) = msg.audio() {
        let mime = audio
            .mime_type
            .as_ref()
            .map_or(DEFAULT_AUDIO_MIME.to_string(), |m| m.essence_str().to_string());
        (MediaKind::Audio, audio.file.id.clone(), mime)
    } else if let Some(voice) = msg.voice() {
        let mime = voice
            .mime_type
            .as_ref()
            .map_or(DEFAULT_VOICE_MIME.to_string(), |m| m.essence_str().to_string());
        (MediaKind::Audio, voice.file.id.clone(), mime)
    } else {
        return None;
    };

    Some(MediaAttachment {
        kind,
        file_id,
        mime_type,
        caption,
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT, initiating graceful shutdown...");
                    }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signals");
            std::future::pending::<()>().await;
        }
    }
}
