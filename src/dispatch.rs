//! Fans a match report out to every recipient as paced direct messages.
//!
//! The whole outbound sequence is laid out as a queue up front (recipient outer, item inner, three
//! messages per item), then drained by a [`PacedSender`].  Every send is attempted; a failure is
//! logged and counted, never propagated, so one unreachable recipient cannot starve the others.

use crate::{
    helper::NonFatal,
    log_internal,
    logging::{Item, PrintColor},
};
use anyhow::Result;
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, MessageId, Timestamp, UserId,
};
use std::{collections::VecDeque, time::Duration};

const ALERT_COLOUR: u32 = 0xFF6B35;

/// One of the three messages each recipient gets per matched item, in sending order.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Rich embed mentioning the recipient
    Alert {
        item: &'static str,
        recipient: UserId,
        captured_at: Timestamp,
    },
    Exclamation {
        item: &'static str,
    },
    FollowUp {
        item: &'static str,
    },
}

impl Notification {
    /// The fixed three-message sequence for one item.
    pub fn sequence(item: &'static str, recipient: UserId, captured_at: Timestamp) -> [Self; 3] {
        [
            Notification::Alert {
                item,
                recipient,
                captured_at,
            },
            Notification::Exclamation { item },
            Notification::FollowUp { item },
        ]
    }

    pub fn item(&self) -> &'static str {
        match self {
            Notification::Alert { item, .. }
            | Notification::Exclamation { item }
            | Notification::FollowUp { item } => item,
        }
    }

    /// Alerts show when they were sent, not when they were queued.
    pub fn stamp(&mut self, now: Timestamp) {
        if let Notification::Alert { captured_at, .. } = self {
            *captured_at = now;
        }
    }

    pub fn to_message(&self) -> CreateMessage {
        match self {
            Notification::Alert {
                item,
                recipient,
                captured_at,
            } => {
                let embed = CreateEmbed::new()
                    .colour(ALERT_COLOUR)
                    .title("\u{1F6A8} STOCK ALERT!")
                    .description(format!(
                        "Hey <@{}>! \u{1F389}\n\n**{}** is now available in stock!",
                        recipient, item
                    ))
                    .field("\u{1F4E6} Item", format!("**{}**", item), true)
                    .field(
                        "\u{23F0} Time",
                        format!("<t:{}:F>", captured_at.unix_timestamp()),
                        true,
                    )
                    .field("\u{1F525} Status", "**IN STOCK NOW!**", true)
                    .footer(CreateEmbedFooter::new("Quick! Get it before it's gone!"))
                    .timestamp(*captured_at);
                CreateMessage::new().embed(embed)
            }
            Notification::Exclamation { item } => CreateMessage::new().content(format!(
                "*Pisty yawa giaytay ka! {} na stock na!* \u{1F624}\u{1F4A2}",
                item
            )),
            Notification::FollowUp { item } => CreateMessage::new().content(format!(
                "**Bahala ka basta ni stock ang {}!** \u{1F937}\u{2728}",
                item
            )),
        }
    }
}

/// How long to wait after each kind of message before sending the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub after_alert: Duration,
    pub after_exclamation: Duration,
    pub after_follow_up: Duration,
}

impl Pacing {
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            after_alert: Duration::ZERO,
            after_exclamation: Duration::ZERO,
            after_follow_up: Duration::ZERO,
        }
    }

    pub fn after(&self, notification: &Notification) -> Duration {
        match notification {
            Notification::Alert { .. } => self.after_alert,
            Notification::Exclamation { .. } => self.after_exclamation,
            Notification::FollowUp { .. } => self.after_follow_up,
        }
    }
}

/// Where notifications go.  Implemented over Discord and by test doubles.
#[serenity::async_trait]
pub trait Outbox: Sync {
    async fn direct_message(&self, recipient: UserId, notification: &Notification) -> Result<()>;
    async fn react(&self, channel_id: ChannelId, message_id: MessageId, reaction: &str)
        -> Result<()>;
}

/// Result of draining a queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub failed: usize,
}

/// Sends queued notifications one at a time, sleeping per the pacing policy in between.
pub struct PacedSender<'a, O> {
    outbox: &'a O,
    pacing: Pacing,
}

impl<'a, O: Outbox> PacedSender<'a, O> {
    pub fn new(outbox: &'a O, pacing: Pacing) -> Self {
        Self { outbox, pacing }
    }

    pub async fn drain(&self, mut queue: VecDeque<(UserId, Notification)>) -> Delivery {
        let mut delivery = Delivery::default();
        while let Some((recipient, mut notification)) = queue.pop_front() {
            notification.stamp(Timestamp::now());
            let sent = self
                .outbox
                .direct_message(recipient, &notification)
                .await
                .non_fatal(format!("DM user {} about {}", recipient, notification.item()));
            match sent {
                Some(()) => delivery.sent += 1,
                None => delivery.failed += 1,
            }

            let pause = self.pacing.after(&notification);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        delivery
    }
}

/// Outcome of one dispatch, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivery: Delivery,
    pub reacted: bool,
}

/// The message whose embeds produced the report
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

pub struct Dispatcher<'a, O> {
    outbox: &'a O,
    pacing: Pacing,
    reaction: &'a str,
}

impl<'a, O: Outbox> Dispatcher<'a, O> {
    pub fn new(outbox: &'a O, pacing: Pacing, reaction: &'a str) -> Self {
        Self {
            outbox,
            pacing,
            reaction,
        }
    }

    /// Lay out every message to send, recipient outer and item inner.
    pub fn queue(items: &[&'static str], recipients: &[UserId]) -> VecDeque<(UserId, Notification)> {
        let mut queue = VecDeque::with_capacity(items.len() * recipients.len() * 3);
        for &recipient in recipients {
            for &item in items {
                // Restamped by the sender as each alert goes out.
                let captured_at = Timestamp::now();
                for notification in Notification::sequence(item, recipient, captured_at) {
                    queue.push_back((recipient, notification));
                }
            }
        }
        queue
    }

    /// Notify every recipient about every item, then mark the origin message.
    ///
    /// Callers gate on a non-empty report.
    pub async fn dispatch(
        &self,
        origin: Origin,
        items: &[&'static str],
        recipients: &[UserId],
    ) -> DispatchReport {
        debug_assert!(!items.is_empty());

        let queue = Self::queue(items, recipients);
        let delivery = PacedSender::new(self.outbox, self.pacing)
            .drain(queue)
            .await;

        log_internal!(
            "Sent {} stock notification(s) to {} user(s) for: {} ({} failed)",
            delivery.sent,
            recipients.len(),
            items
                .iter()
                .map(|item| Item(item).color())
                .collect::<Vec<_>>()
                .join(", "),
            delivery.failed,
        );

        let reacted = self
            .outbox
            .react(origin.channel_id, origin.message_id, self.reaction)
            .await
            .non_fatal("react to stock message")
            .is_some();

        DispatchReport { delivery, reacted }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    fn origin() -> Origin {
        Origin {
            channel_id: ChannelId::new(1),
            message_id: MessageId::new(99),
        }
    }

    #[tokio::test]
    async fn one_item_two_recipients() {
        let outbox = FakeOutbox::default();
        let (a, b) = (UserId::new(10), UserId::new(20));

        let report = Dispatcher::new(&outbox, Pacing::none(), "\u{1F3AF}")
            .dispatch(origin(), &["MASTER SPRINKLER"], &[a, b])
            .await;

        assert_eq!(report.delivery, Delivery { sent: 6, failed: 0 });
        assert!(report.reacted);

        let calls = outbox.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                Call::Dm(a, "MASTER SPRINKLER", "alert"),
                Call::Dm(a, "MASTER SPRINKLER", "exclamation"),
                Call::Dm(a, "MASTER SPRINKLER", "follow-up"),
                Call::Dm(b, "MASTER SPRINKLER", "alert"),
                Call::Dm(b, "MASTER SPRINKLER", "exclamation"),
                Call::Dm(b, "MASTER SPRINKLER", "follow-up"),
                Call::React(MessageId::new(99), "\u{1F3AF}".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn recipient_outer_item_inner_with_duplicates() {
        let outbox = FakeOutbox::default();
        let recipients = [UserId::new(1), UserId::new(2), UserId::new(3)];
        let items = ["BEE EGG", "EMBER LILY", "BEE EGG"];

        let report = Dispatcher::new(&outbox, Pacing::none(), "x")
            .dispatch(origin(), &items, &recipients)
            .await;

        assert_eq!(report.delivery.sent, 3 * items.len() * recipients.len());

        let dms = dms(&outbox);
        let mut expected = Vec::new();
        for &r in &recipients {
            for &item in &items {
                for k in ["alert", "exclamation", "follow-up"] {
                    expected.push(Call::Dm(r, item, k));
                }
            }
        }
        assert_eq!(dms, expected);
    }

    #[tokio::test]
    async fn failing_recipient_does_not_stop_the_next() {
        let (bad, good) = (UserId::new(1), UserId::new(2));
        let outbox = FakeOutbox {
            unreachable: vec![bad],
            ..Default::default()
        };

        let report = Dispatcher::new(&outbox, Pacing::none(), "x")
            .dispatch(origin(), &["BUG EGG", "BEANSTALK"], &[bad, good])
            .await;

        assert_eq!(report.delivery, Delivery { sent: 6, failed: 6 });
        assert!(report.reacted);
        let to_good = dms(&outbox)
            .into_iter()
            .filter(|call| matches!(call, Call::Dm(r, ..) if *r == good))
            .count();
        assert_eq!(to_good, 6);
    }

    #[tokio::test]
    async fn reaction_failure_is_not_fatal() {
        let outbox = FakeOutbox {
            react_fails: true,
            ..Default::default()
        };

        let report = Dispatcher::new(&outbox, Pacing::none(), "x")
            .dispatch(origin(), &["NECTAR STAFF"], &[UserId::new(5)])
            .await;

        assert_eq!(report.delivery.sent, 3);
        assert!(!report.reacted);
    }

    #[tokio::test]
    async fn no_recipients_still_reacts() {
        let outbox = FakeOutbox::default();
        let report = Dispatcher::new(&outbox, Pacing::none(), "x")
            .dispatch(origin(), &["NECTAR STAFF"], &[])
            .await;
        assert_eq!(report.delivery, Delivery::default());
        assert!(report.reacted);
    }

    #[tokio::test]
    async fn paced_sender_waits_between_messages() {
        let outbox = FakeOutbox::default();
        let pacing = Pacing {
            after_alert: Duration::from_millis(15),
            after_exclamation: Duration::from_millis(10),
            after_follow_up: Duration::from_millis(5),
        };
        let queue = Dispatcher::<FakeOutbox>::queue(&["BEE EGG"], &[UserId::new(1)]);

        let started = std::time::Instant::now();
        let delivery = PacedSender::new(&outbox, pacing).drain(queue).await;

        assert_eq!(delivery.sent, 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn alerts_are_stamped_when_sent() {
        let outbox = FakeOutbox::default();
        let queued_at = Timestamp::from_unix_timestamp(1_600_000_000).unwrap();
        let queue: VecDeque<_> = Notification::sequence("BEE EGG", UserId::new(1), queued_at)
            .into_iter()
            .map(|notification| (UserId::new(1), notification))
            .collect();

        PacedSender::new(&outbox, Pacing::none()).drain(queue).await;

        let times = outbox.alert_times.lock().unwrap().clone();
        assert_eq!(times.len(), 1);
        assert!(times[0].unix_timestamp() > queued_at.unix_timestamp());
    }

    #[test]
    fn stamp_only_touches_alerts() {
        let then = Timestamp::from_unix_timestamp(1_600_000_000).unwrap();
        let now = Timestamp::from_unix_timestamp(1_700_000_000).unwrap();
        let [mut alert, mut exclamation, _] = Notification::sequence("BUG EGG", UserId::new(3), then);

        alert.stamp(now);
        exclamation.stamp(now);

        assert!(matches!(alert, Notification::Alert { captured_at, .. } if captured_at == now));
        assert_eq!(exclamation, Notification::Exclamation { item: "BUG EGG" });
    }

    #[test]
    fn pacing_per_kind() {
        let pacing = Pacing {
            after_alert: Duration::from_millis(500),
            after_exclamation: Duration::from_millis(300),
            after_follow_up: Duration::from_millis(400),
        };
        let [alert, exclamation, follow_up] =
            Notification::sequence("BEE EGG", UserId::new(1), Timestamp::now());
        assert_eq!(pacing.after(&alert), Duration::from_millis(500));
        assert_eq!(pacing.after(&exclamation), Duration::from_millis(300));
        assert_eq!(pacing.after(&follow_up), Duration::from_millis(400));
    }

    #[test]
    fn alert_mentions_recipient_and_item() {
        let captured_at = Timestamp::from_unix_timestamp(1_700_000_000).unwrap();
        let [alert, exclamation, follow_up] =
            Notification::sequence("EMBER LILY", UserId::new(77), captured_at);

        let alert = serde_json::to_value(alert.to_message()).unwrap();
        let embed = &alert["embeds"][0];
        assert!(embed["description"].as_str().unwrap().contains("<@77>"));
        assert_eq!(embed["fields"][0]["value"], "**EMBER LILY**");
        assert_eq!(embed["fields"][1]["value"], "<t:1700000000:F>");
        assert_eq!(embed["fields"][2]["value"], "**IN STOCK NOW!**");

        let exclamation = serde_json::to_value(exclamation.to_message()).unwrap();
        assert!(exclamation["content"].as_str().unwrap().contains("EMBER LILY"));
        let follow_up = serde_json::to_value(follow_up.to_message()).unwrap();
        assert!(follow_up["content"].as_str().unwrap().contains("EMBER LILY"));
    }
}
