use crate::{
    event::*,
    helper::*,
    llm::{fetch_images, Gemini, Generate, InlineImage, Prompt},
    log_internal,
    plugin::*,
    volatile_state::{MemoryEntry, VolatileState},
};
use anyhow::Result;
use rand::Rng;
use serenity::all::{ChannelId, Message};
use std::time::Duration;
use tokio::sync::RwLock;

/// Answers messages addressed to the bot with generated text.
pub struct LlmReply;

#[serenity::async_trait]
impl Plugin for LlmReply {
    fn name(&self) -> &'static str {
        "llm_reply"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        // Ignore all bot messages, including my own
        if msg.author.bot {
            return Ok(EventHandled::No);
        }

        // Interpret an unconfigured backend as opting out of this plugin
        let Some(settings) = ctx.cfg.read().await.llm.clone() else {
            return Ok(EventHandled::No);
        };

        // Only respond if the message is to me
        if !msg.is_to_me(ctx).await? {
            return Ok(EventHandled::No);
        }

        let (bot_id, bot_name) = {
            let me = ctx.cache.current_user();
            (me.id, me.display_name().to_owned())
        };
        let speaker = msg.author.nick_in_guild(ctx, msg.guild_id).await;
        let turn = Turn {
            channel_id: msg.channel_id,
            speaker,
            text: strip_mention(&msg.content, bot_id),
            images: fetch_images(&msg.attachments).await,
        };

        let responder = Responder {
            persona: settings.system.replace("{{bot}}", &bot_name),
            bot_name,
            fallback: settings.fallback_reply.clone(),
            reply_delay: settings.reply_delay_range(),
        };
        let generator = Gemini {
            settings: &settings,
        };
        let conversation = DiscordConversation { ctx, msg };
        responder
            .respond(ctx.vstate, &generator, &conversation, turn)
            .await?;

        Ok(EventHandled::Yes)
    }
}

/// One message addressed to the bot, with the mention already stripped
pub struct Turn {
    pub channel_id: ChannelId,
    pub speaker: String,
    pub text: String,
    pub images: Vec<InlineImage>,
}

/// Where the reply goes.  Implemented over Discord and by test doubles.
#[serenity::async_trait]
pub trait Conversation: Sync {
    /// Show a typing indicator for `delay`, then reply.
    async fn reply_after_typing(&self, text: &str, delay: Duration) -> Result<()>;
    async fn reply(&self, text: &str) -> Result<()>;
}

pub struct Responder {
    pub persona: String,
    pub bot_name: String,
    pub fallback: String,
    /// Inclusive bounds of the pause before replying
    pub reply_delay: (Duration, Duration),
}

impl Responder {
    /// Generate a reply from the channel's memory and send it.  If generating or sending fails,
    /// the fallback is sent once instead.  Memory is only touched when generation succeeds.
    pub async fn respond(
        &self,
        vstate: &RwLock<VolatileState>,
        generator: &impl Generate,
        conversation: &impl Conversation,
        turn: Turn,
    ) -> Result<()> {
        let answered = async {
            let reply = self.converse(vstate, generator, turn).await?;
            conversation.reply_after_typing(&reply, self.pause()).await
        }
        .await;

        if let Err(err) = answered {
            tracing::error!("Failed to reply: {:#}", err);
            conversation.reply(&self.fallback).await?;
        }
        Ok(())
    }

    /// Build the prompt, generate, and remember both sides of the exchange.
    ///
    /// The memory lock is not held while generating, so overlapping mentions in one channel may
    /// interleave their entries.
    pub async fn converse(
        &self,
        vstate: &RwLock<VolatileState>,
        generator: &impl Generate,
        turn: Turn,
    ) -> Result<String> {
        let history = vstate.read().await.memory.snapshot(turn.channel_id);
        if let Some(oldest) = history.first() {
            tracing::debug!("Prompting with channel memory since {}", oldest.timestamp);
        }
        let prompt = Prompt::build(
            &self.persona,
            &history,
            &turn.speaker,
            &turn.text,
            turn.images,
        );

        let reply = generator.generate(&prompt).await?;

        let mut vstate = vstate.write().await;
        vstate
            .memory
            .append(turn.channel_id, MemoryEntry::new(turn.speaker, turn.text));
        vstate
            .memory
            .append(turn.channel_id, MemoryEntry::new(&self.bot_name, &reply));
        let remembered = vstate.memory.len(turn.channel_id);
        drop(vstate);

        log_internal!(
            "Generated a {} character reply from {} line(s) of history ({} remembered now)",
            reply.chars().count(),
            history.len(),
            remembered
        );
        Ok(reply)
    }

    /// Uniformly drawn so replies don't arrive suspiciously fast.
    fn pause(&self) -> Duration {
        let (min, max) = self.reply_delay;
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

struct DiscordConversation<'a, 'b> {
    ctx: &'a Context<'b>,
    msg: &'a Message,
}

#[serenity::async_trait]
impl<'a, 'b> Conversation for DiscordConversation<'a, 'b> {
    async fn reply_after_typing(&self, text: &str, delay: Duration) -> Result<()> {
        let typing = self.msg.channel_id.start_typing(self.ctx.http);
        tokio::time::sleep(delay).await;
        let sent = self.msg.reply(self.ctx.cache_http, text).await;
        typing.stop();
        sent?;
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result<()> {
        self.msg.reply(self.ctx.cache_http, text).await?;
        Ok(())
    }
}
