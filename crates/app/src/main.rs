use std::process::ExitCode;
use std::sync::Arc;

use kindred_channel::{HttpMediaService, WebSocketConnector};
use kindred_sync::ConversationEngine;
use snafu::{ResultExt, Snafu};
use tracing_subscriber::EnvFilter;

mod console;
mod settings;

use console::ConsoleError;
use settings::{SettingsError, SettingsStore};

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("invalid settings on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("console session failed on `{stage}`: {source}"))]
    Console {
        stage: &'static str,
        source: ConsoleError,
    },
}

/// Connects one conversation and drives it from the terminal.
///
/// Settings come from `<config dir>/kindred/settings.json` overlaid with
/// `KINDRED_*` environment variables; log filtering follows `RUST_LOG`.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "kindred exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let store = SettingsStore::load();
    let settings = store.settings();

    let config = settings.to_engine_config().context(SettingsSnafu {
        stage: "build-engine-config",
    })?;
    let conversation_id = settings.conversation().context(SettingsSnafu {
        stage: "read-conversation",
    })?;
    let socket_endpoint = settings.socket_endpoint().context(SettingsSnafu {
        stage: "read-socket-endpoint",
    })?;
    let media_endpoint = settings.media_endpoint().context(SettingsSnafu {
        stage: "read-media-endpoint",
    })?;

    tracing::info!(
        conversation_id = %conversation_id,
        socket = %socket_endpoint,
        media = %media_endpoint,
        "starting conversation"
    );

    let connector = WebSocketConnector::new(socket_endpoint, config.user_id.clone());
    let media = HttpMediaService::new(media_endpoint);
    let (handle, events) =
        ConversationEngine::spawn(config, conversation_id, Arc::new(connector), Arc::new(media));

    console::run(handle, events, store)
        .await
        .context(ConsoleSnafu { stage: "console" })
}
