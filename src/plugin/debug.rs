use crate::{event::*, helper::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Logs incoming events.  Never consumes them.
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        log_event!(
            "{}{}{}{}{}{} {}",
            msg.guild_id.color(ctx.http).await,
            Glue {}.color(),
            msg.channel_id.color(ctx.http).await,
            Glue {}.color(),
            msg.author.color(),
            Glue {}.color(),
            msg.human_format_content(ctx).await?,
        );

        // Stock bots speak almost entirely in embeds; show what the scanner will see.
        if ctx.cfg.read().await.is_monitored(msg.channel_id) {
            tracing::debug!(
                "bot author: {}, embeds: {}",
                msg.author.bot,
                msg.embeds.len()
            );
            for (index, embed) in msg.embeds.iter().enumerate() {
                tracing::debug!(
                    "  embed {}: title={:?} description={:?}",
                    index + 1,
                    embed.title,
                    embed.description
                );
                for field in &embed.fields {
                    tracing::debug!("    {} = {}", field.name, field.value);
                }
            }
        }

        Ok(EventHandled::No)
    }
}
