use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{commands::Commands, errors::Error, pricing::PricingTable, Result};

const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0125";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const BASE_SYSTEM_PROMPT: &str = "You are a to-the-point assistant specialised in data science, \
living in a group chat. Your name is {bot}.\n\
Answer in the same language the user writes in.\n\
Only greet a user if they greet you first, and never greet repeatedly.\n\
Address users by their own names.\n\
Use the conversation history to answer when it is relevant.\n\
Keep the tone casual and approachable without being tiresome.\n\
Do not ask whether you can help with anything else.";

/// Typed configuration for the bot, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    pub openai_base_url: String,

    // Model + pricing
    pub model: String,
    pub pricing: Arc<PricingTable>,
    pub query_timeout: Duration,

    // Bot persona
    pub bot_name: String,
    pub system_prompt: String,
    pub default_error_answer: String,

    // Commands / memory
    pub commands: Commands,
    pub memory_size: usize,

    // Rate limiting
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    /// Identity -> display name.
    pub users: BTreeMap<String, String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |key: &str| get(key).and_then(non_empty);
        let env_u64 = |key: &str| -> Result<Option<u64>> {
            env_str(key)
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer")))
                })
                .transpose()
        };

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let openai_api_key = env_str("OPENAI_API_KEY").ok_or_else(|| {
            Error::Config("OPENAI_API_KEY environment variable is required".to_string())
        })?;
        let openai_base_url = env_str("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        // Pricing: PRICING_FILE replaces the built-in table.
        let pricing = match env_str("PRICING_FILE").map(PathBuf::from) {
            Some(path) => PricingTable::load(&path).map_err(|e| {
                Error::Config(format!("failed to load {}: {e}", path.display()))
            })?,
            None => PricingTable::builtin(),
        };

        // The model must be priced; fail at startup rather than on the first query.
        let model = env_str("DOGIMO_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        pricing.price_for(&model)?;

        let query_timeout = Duration::from_millis(env_u64("QUERY_TIMEOUT_MS")?.unwrap_or(60_000));

        let bot_name = env_str("BOT_NAME").unwrap_or_else(|| "Dogimo".to_string());
        let users = parse_users(env_str("DOGIMO_USERS"));
        let system_prompt = env_str("SYSTEM_PROMPT")
            .unwrap_or_else(|| build_system_prompt(&bot_name, &users));
        let default_error_answer = env_str("DEFAULT_ERROR_ANSWER")
            .unwrap_or_else(|| "Sorry, I couldn't get a proper answer.".to_string());

        let defaults = Commands::default();
        let commands = Commands {
            chat: env_str("CHAT_COMMAND").unwrap_or(defaults.chat),
            stats: env_str("STATS_COMMAND").unwrap_or(defaults.stats),
            help: env_str("HELP_COMMAND").unwrap_or(defaults.help),
        };

        let memory_size = env_u64("MEMORY_SIZE")?.unwrap_or(50) as usize;

        // Rate limiting
        let rate_limit_requests = env_u64("RATE_LIMIT_REQUESTS")?.unwrap_or(5);
        let rate_limit_window = env_u64("RATE_LIMIT_WINDOW")?.unwrap_or(60);
        if rate_limit_requests == 0 || rate_limit_requests > u32::MAX as u64 {
            return Err(Error::Config(
                "RATE_LIMIT_REQUESTS must be between 1 and 4294967295".to_string(),
            ));
        }
        if rate_limit_window == 0 {
            return Err(Error::Config(
                "RATE_LIMIT_WINDOW must be at least 1 second".to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token,
            openai_api_key,
            openai_base_url,
            model,
            pricing: Arc::new(pricing),
            query_timeout,
            bot_name,
            system_prompt,
            default_error_answer,
            commands,
            memory_size,
            rate_limit_requests: rate_limit_requests as u32,
            rate_limit_window: Duration::from_secs(rate_limit_window),
            users,
        })
    }

    /// Test/fixture helper: a config built from an in-memory map.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}

fn build_system_prompt(bot_name: &str, users: &BTreeMap<String, String>) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT.replace("{bot}", bot_name);
    if !users.is_empty() {
        prompt.push('\n');
        for (id, name) in users {
            prompt.push_str(&format!("\nThe username of {name} in the chat is {id}."));
        }
    }
    prompt
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

/// `alice=Alice Smith,bob=Bob` -> {alice: "Alice Smith", bob: "Bob"}.
fn parse_users(v: Option<String>) -> BTreeMap<String, String> {
    v.unwrap_or_default()
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(id, name)| (id.trim().to_string(), name.trim().to_string()))
        .filter(|(id, name)| !id.is_empty() && !name.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
