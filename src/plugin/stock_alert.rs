use crate::{
    dispatch::{DispatchReport, Dispatcher, Notification, Origin, Outbox, Pacing},
    event::*,
    log_internal,
    logging::{Item, PrintColor},
    plugin::*,
    scanner,
};
use anyhow::Result;
use serenity::all::{ChannelId, Embed, MessageId, ReactionType, UserId};

/// Watches stock announcement channels and DMs subscribers when a rare item shows up.
pub struct StockAlert;

#[serenity::async_trait]
impl Plugin for StockAlert {
    fn name(&self) -> &'static str {
        "stock_alert"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        // Copy what we need so the config lock isn't held while messages are paced out.
        let (monitored, recipients, pacing, reaction) = {
            let cfg = ctx.cfg.read().await;
            (
                cfg.is_monitored(msg.channel_id),
                cfg.general.notify_users.clone(),
                cfg.stock.pacing(),
                cfg.stock.reaction.clone(),
            )
        };

        let origin = Origin {
            channel_id: msg.channel_id,
            message_id: msg.id,
        };
        let outbox = DiscordOutbox { ctx };
        // Announcements come from bots, so bot authors are deliberately not filtered here.
        let scan = scan_and_dispatch(
            monitored,
            origin,
            &msg.embeds,
            &recipients,
            &outbox,
            pacing,
            &reaction,
        )
        .await;

        Ok(match scan {
            StockScan::NotMonitored => EventHandled::No,
            StockScan::NoMatch | StockScan::Dispatched(_) => EventHandled::Yes,
        })
    }
}

/// What became of one message in a channel that may be monitored
#[derive(Debug, PartialEq, Eq)]
pub enum StockScan {
    NotMonitored,
    NoMatch,
    Dispatched(DispatchReport),
}

/// Scan `embeds` for catalog items and, if any match, notify every recipient and react.
pub async fn scan_and_dispatch(
    monitored: bool,
    origin: Origin,
    embeds: &[Embed],
    recipients: &[UserId],
    outbox: &impl Outbox,
    pacing: Pacing,
    reaction: &str,
) -> StockScan {
    if !monitored {
        return StockScan::NotMonitored;
    }

    let report = scanner::scan_embeds(embeds);
    if report.is_empty() {
        return StockScan::NoMatch;
    }

    log_internal!(
        "Found item(s): {}",
        report
            .iter()
            .map(|item| Item(item).color())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let outcome = Dispatcher::new(outbox, pacing, reaction)
        .dispatch(origin, &report, recipients)
        .await;
    if !outcome.reacted || outcome.delivery.failed > 0 {
        tracing::warn!(
            "Stock alert incomplete: {} sent, {} failed, reacted: {}",
            outcome.delivery.sent,
            outcome.delivery.failed,
            outcome.reacted
        );
    }
    StockScan::Dispatched(outcome)
}

/// Delivers notifications as Discord direct messages.
struct DiscordOutbox<'a, 'b> {
    ctx: &'a Context<'b>,
}

#[serenity::async_trait]
impl<'a, 'b> Outbox for DiscordOutbox<'a, 'b> {
    async fn direct_message(&self, recipient: UserId, notification: &Notification) -> Result<()> {
        let user = recipient.to_user(self.ctx.cache_http).await?;
        user.direct_message(self.ctx.cache_http, notification.to_message())
            .await?;
        Ok(())
    }

    async fn react(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        reaction: &str,
    ) -> Result<()> {
        let reaction = ReactionType::Unicode(reaction.to_owned());
        channel_id
            .create_reaction(self.ctx.http, message_id, reaction)
            .await?;
        Ok(())
    }
}
