//! Miscellaneous convenience methods

use crate::context::Context;
use anyhow::Result;
use serenity::all::{GuildId, UserId};
use std::collections::HashMap;
use std::fmt::Display;

/// Outbound calls whose failure should be logged rather than abort the surrounding loop.
pub trait NonFatal<T> {
    /// Log a failure of `what` at warn level and carry on with `None`.
    fn non_fatal(self, what: impl Display) -> Option<T>;
}

impl<T, E: Display> NonFatal<T> for std::result::Result<T, E> {
    fn non_fatal(self, what: impl Display) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("Failed to {}: {}", what, err);
                None
            }
        }
    }
}

/// Remove both `<@id>` and `<@!id>` mentions of `user_id` and trim what is left.
pub fn strip_mention(content: &str, user_id: UserId) -> String {
    content
        .replace(&format!("<@!{}>", user_id), "")
        .replace(&format!("<@{}>", user_id), "")
        .trim()
        .to_owned()
}

#[serenity::async_trait]
pub trait UserHelper {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String;
}

#[serenity::async_trait]
impl UserHelper for serenity::all::User {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String {
        let nick_in_guild = match guild_id {
            Some(guild_id) => self.nick_in(ctx.cache_http, guild_id).await,
            None => None,
        };

        // May not be in a guild, e.g. DM.  Fall back to display name.
        match nick_in_guild {
            Some(nick_in_guild) => nick_in_guild,
            None => self.display_name().to_owned(),
        }
    }
}

#[serenity::async_trait]
pub trait MessageHelper {
    async fn human_format_content(&self, ctx: &Context) -> Result<String>;
    async fn is_to_me(&self, ctx: &Context) -> Result<bool>;
}

#[serenity::async_trait]
impl MessageHelper for serenity::all::Message {
    /// Convert discord-formatted message content, which may contain non-user-friendly markup, to a
    /// human-friendly format for the logs.
    ///
    /// Serenity provides a message.content_safe() method which uses global discord names rather
    /// than our preferred per-server names.  Thus, we're reimplementing the logic here with the
    /// preferred name.
    async fn human_format_content(&self, ctx: &Context) -> Result<String> {
        let mut content = self.content.clone();

        let mut mention_map: HashMap<String, String> = HashMap::new();

        // Map user mentions (e.g. `<@!1234567890>`)
        for user in &self.mentions {
            let name = user.nick_in_guild(ctx, self.guild_id).await;
            mention_map.insert(format!("<@!{}>", user.id), format!("@{}", name));
            mention_map.insert(format!("<@{}>", user.id), format!("@{}", name));
        }

        if let Some(guild) = self.guild(ctx.cache) {
            // Map role mentions (e.g. `<@&1234567890>`)
            for role_id in &self.mention_roles {
                let name = match guild.roles.get(role_id) {
                    Some(role) => format!("@{}", role.name),
                    None => "@UnknownRole".to_owned(),
                };
                mention_map.insert(format!("<@&{}>", role_id), name);
            }
        }

        for (mention, name) in mention_map {
            content = content.replace(&mention, &name);
        }

        Ok(content)
    }

    async fn is_to_me(&self, ctx: &Context) -> Result<bool> {
        // mentions me, the bot, directly
        if self.mentions_me(ctx.cache_http).await? {
            return Ok(true);
        }

        // Is a reply to a comment the bot made
        let my_id = ctx.cache.current_user().id;
        if let Some(referenced) = &self.referenced_message {
            if referenced.author.id == my_id {
                return Ok(true);
            }
        }

        // mentions a role I'm in within the guild
        let message_roles = &self.mention_roles;
        if message_roles.is_empty() {
            return Ok(false);
        }
        let Some(guild) = &self.guild(ctx.cache) else {
            return Ok(false);
        };
        let Some(my_member) = &guild.members.get(&my_id) else {
            return Ok(false);
        };
        Ok(message_roles
            .iter()
            .any(|role_id| my_member.roles.contains(role_id)))
    }
}
