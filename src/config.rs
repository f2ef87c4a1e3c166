use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, UserId};
use std::{io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/stockbot/config.toml";

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL_NAME: &str = "gemini-1.5-flash";
const DEFAULT_SYSTEM: &str = "You are {{bot}}, a friendly regular in a gaming Discord server. \
Keep replies short and casual, like a chat message rather than an essay. \
Match the language and mood of whoever is talking to you, and never mention that you are an AI.";
const DEFAULT_FALLBACK_REPLY: &str = "Sorry, my brain glitched for a second. Try again in a bit?";

/// Bot configuration
#[derive(Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub stock: Stock,
    pub history: History,
    /// Conversational replies are disabled unless present with an api key.
    pub llm: Option<Llm>,
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct General {
    pub discord_token: String,
    /// Channels whose messages are scanned for stock announcements
    pub monitor_channels: Vec<ChannelId>,
    /// Users who are DM'd when a catalog item is announced
    pub notify_users: Vec<UserId>,
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Stock {
    pub pause_after_alert_ms: u64,
    pub pause_after_exclamation_ms: u64,
    pub pause_after_follow_up_ms: u64,
    /// Reaction left on an announcement once everyone was notified
    pub reaction: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct History {
    pub channel_max_message_count: usize,
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Llm {
    pub api_key: String,
    pub api_url: String,
    pub model_name: String,
    /// Persona instructions.  `{{bot}}` is replaced with the bot's name.
    pub system: String,
    pub temperature: f32,
    pub reply_delay_min_ms: u64,
    pub reply_delay_max_ms: u64,
    /// Sent instead of a generated reply when generation fails
    pub fallback_reply: String,
}

impl Default for Stock {
    fn default() -> Self {
        Self {
            pause_after_alert_ms: 500,
            pause_after_exclamation_ms: 300,
            pause_after_follow_up_ms: 400,
            reaction: "\u{1F3AF}".to_owned(), // direct hit
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self {
            channel_max_message_count: 20,
        }
    }
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_owned(),
            model_name: DEFAULT_MODEL_NAME.to_owned(),
            system: DEFAULT_SYSTEM.to_owned(),
            temperature: 0.9,
            reply_delay_min_ms: 1000,
            reply_delay_max_ms: 3000,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_owned(),
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    /// Load the optional configuration file, then apply environment overrides.
    pub async fn load() -> Result<Self> {
        if let Some(err) = dotenv_problem(dotenvy::dotenv()) {
            tracing::warn!("Ignoring .env file: {}", err);
        }

        let path = Self::config_path()?;
        let contents = match tokio::fs::File::open(&path).await {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents).await.map_err(|e| {
                    anyhow!(
                        "Could not read configuration at `{}`: {}",
                        path.to_string_lossy(),
                        e
                    )
                })?;
                contents
            }
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(anyhow!(
                    "Could not open configuration at `{}`: {}",
                    path.to_string_lossy(),
                    e
                ))
            }
        };

        let mut config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = var("DISCORD_TOKEN") {
            self.general.discord_token = token.trim().to_owned();
        }
        if let Some(ids) = var("MONITOR_CHANNEL_IDS") {
            self.general.monitor_channels = parse_id_list(&ids, "MONITOR_CHANNEL_IDS")?;
        }
        if let Some(ids) = var("NOTIFY_USERS") {
            self.general.notify_users = parse_id_list(&ids, "NOTIFY_USERS")?;
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            self.llm.get_or_insert_with(Llm::default).api_key = key.trim().to_owned();
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.general.discord_token.is_empty() {
            return Err(anyhow!(
                "DISCORD_TOKEN is not set.  Set it in the environment, a `.env` file, or \
                 `discord_token` under [general] in ~/{}",
                CONFIG_PATH_REL_HOME
            ));
        }

        // An llm section without a key can't do anything; treat it as opting out.
        if self.llm.as_ref().is_some_and(|llm| llm.api_key.is_empty()) {
            self.llm = None;
        }

        if let Some(llm) = &mut self.llm {
            if llm.reply_delay_min_ms > llm.reply_delay_max_ms {
                std::mem::swap(&mut llm.reply_delay_min_ms, &mut llm.reply_delay_max_ms);
            }
        }

        Ok(())
    }

    pub fn is_monitored(&self, channel_id: ChannelId) -> bool {
        self.general.monitor_channels.contains(&channel_id)
    }
}

impl Stock {
    pub fn pacing(&self) -> crate::dispatch::Pacing {
        crate::dispatch::Pacing {
            after_alert: Duration::from_millis(self.pause_after_alert_ms),
            after_exclamation: Duration::from_millis(self.pause_after_exclamation_ms),
            after_follow_up: Duration::from_millis(self.pause_after_follow_up_ms),
        }
    }
}

impl Llm {
    pub fn reply_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reply_delay_min_ms),
            Duration::from_millis(self.reply_delay_max_ms),
        )
    }
}

/// Comma separated Discord ids.  Whitespace around entries and empty entries are ignored.
fn parse_id_list<T: FromStr>(list: &str, name: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<T>()
                .map_err(|e| anyhow!("Invalid id `{}` in {}: {}", id, name, e))
        })
        .collect()
}

/// A missing `.env` is fine since plain environment variables still apply.  Anything else,
/// like a malformed line, is worth telling the operator about.
fn dotenv_problem(loaded: dotenvy::Result<PathBuf>) -> Option<dotenvy::Error> {
    match loaded {
        Ok(_) => None,
        Err(err) if err.not_found() => None,
        Err(err) => Some(err),
    }
}
