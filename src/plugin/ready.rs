use crate::{catalog, event::*, log_event, log_internal, logging::*, plugin::*};
use anyhow::Result;

/// Reports what the bot is watching once the connection to Discord is ready.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Ready(ready) = event else {
            return Ok(EventHandled::No);
        };

        log_event!(
            "Connected to {} server(s) as {}",
            ready.guilds.len(),
            ready.user.color(),
        );

        let cfg = ctx.cfg.read().await;
        let mut channels = Vec::new();
        for channel_id in &cfg.general.monitor_channels {
            channels.push(channel_id.color(ctx.http).await);
        }
        if channels.is_empty() {
            tracing::warn!("No channels are monitored; set MONITOR_CHANNEL_IDS");
        } else {
            log_internal!("Monitoring channel(s): {}", channels.join(", "));
        }
        log_internal!("Will notify {} user(s)", cfg.general.notify_users.len());
        log_internal!("Monitoring keywords: {}", catalog::describe());
        log_internal!(
            "Conversational replies are {}",
            if cfg.llm.is_some() { "enabled" } else { "disabled" }
        );

        Ok(EventHandled::Yes)
    }
}
