mod catalog;
mod config;
mod context;
mod dispatch;
mod event;
mod handler;
mod helper;
mod llm;
mod logging;
mod plugin;
mod scanner;
mod volatile_state;

use serenity::{all::GatewayIntents, gateway::GatewayError, Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crate::logging::init();

    let cfg = crate::config::Config::load().await.inspect_err(|e| {
        tracing::error!("{:#}", e);
    })?;
    let token = cfg.general.discord_token.clone();
    let vstate = crate::volatile_state::VolatileState::new(cfg.history.channel_max_message_count);
    let handler = handler::Handler::new(cfg, vstate);

    // Things we want discord to tell us about.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down bot...");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.map_err(|e| {
        log_login_help(&e);
        e.into()
    })
}

fn log_login_help(err: &serenity::Error) {
    tracing::error!("Failed to log in to Discord: {}", err);
    match err {
        serenity::Error::Gateway(GatewayError::DisallowedGatewayIntents) => tracing::error!(
            "Enable the privileged \"Message Content Intent\" for this bot at \
             https://discord.com/developers/applications (Bot > Privileged Gateway Intents), \
             then restart"
        ),
        serenity::Error::Gateway(GatewayError::InvalidAuthentication) => {
            tracing::error!("Check that DISCORD_TOKEN holds this bot's token")
        }
        _ => {}
    }
}
