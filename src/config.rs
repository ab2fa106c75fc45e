use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

#[derive(Debug, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub ollama: OllamaConfig,
    pub classifier: ClassifierConfig,
    pub data_dir: String,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
}

#[derive(Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    pub timeout_secs: u64,
}

// Hand-written so the password never ends up in logs.
impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("folder", &self.folder)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ImapConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Full URL of the generate endpoint, e.g. `http://host:11434/api/generate`.
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    /// Lower-cased sender-name tokens that always make a message important.
    pub whitelist: Vec<String>,
    /// Lower-cased sender-name tokens that always make a message unimportant.
    pub blacklist: Vec<String>,
    pub user_name: String,
    /// Custom prompt template, `None` uses the built-in one.
    pub prompt_template: Option<String>,
    pub clean_response: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule_times: Vec<String>, // Format: "HH:MM" (e.g., ["06:00", "18:00"])
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
}

impl Config {
    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup (the process
    /// environment in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::check_required_vars(&lookup)?;

        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        // Checked above, only empty values can reach the default.
        let required = |key: &str| -> String { get(key, "") };

        Ok(Config {
            imap: ImapConfig {
                host: required("IMAP_HOST"),
                port: get("IMAP_PORT", "993").parse().unwrap_or(993),
                username: required("IMAP_USER"),
                password: lookup("IMAP_PASSWORD").unwrap_or_default(),
                folder: get("IMAP_FOLDER", "INBOX"),
                timeout_secs: get("IMAP_TIMEOUT", "60").parse().unwrap_or(60),
            },
            ollama: OllamaConfig {
                api_url: get("OLLAMA_API_URL", DEFAULT_OLLAMA_URL),
                model: get("OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
                timeout_secs: get("OLLAMA_TIMEOUT", "60").parse().unwrap_or(60),
            },
            classifier: ClassifierConfig {
                whitelist: parse_token_list(&get("EMAIL_WHITELIST", "")),
                blacklist: parse_token_list(&get("EMAIL_BLACKLIST", "")),
                user_name: get("USER_NAME", "the user"),
                prompt_template: lookup("PROMPT_TEMPLATE").filter(|t| !t.trim().is_empty()),
                clean_response: parse_bool(&get("CLEAN_LLM_RESPONSE", "true")).unwrap_or(true),
            },
            data_dir: get("DATA_DIR", "./data"),
            scheduler: SchedulerConfig {
                schedule_times: get("SCHEDULER_TIMES", "06:00")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            server: ServerConfig {
                host: get("SERVER_HOST", "0.0.0.0"),
                port: get("SERVER_PORT", "5000").parse().unwrap_or(5000),
                public_url: get("FEED_PUBLIC_URL", "http://localhost:5000/rss"),
            },
        })
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("summaries.db")
    }

    pub fn watermark_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("last_uid.txt")
    }

    fn check_required_vars<F>(lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required_vars = ["IMAP_HOST", "IMAP_USER", "IMAP_PASSWORD"];

        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| lookup(*var).map_or(true, |v| v.trim().is_empty()))
            .collect();

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Missing environment variables: {}\n\
                 \n\
                 💡 Solutions:\n\
                 1. Create a .env file with your credentials:\n\
                    IMAP_HOST=imap.example.com\n\
                    IMAP_USER=me@example.com\n\
                    IMAP_PASSWORD=app-password\n\
                 \n\
                 2. Or export the variables manually before running:\n\
                    export IMAP_HOST=imap.example.com\n\
                    cargo run -- --check-config",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}

/// Splits a comma-separated list into trimmed, lower-cased, non-empty tokens.
pub fn parse_token_list(raw: &str) -> Vec<String> {
    let mut tokens: Vec<String> = raw
        .split(',')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Lookup backed by a map, for tests.
#[cfg(test)]
pub(crate) fn map_lookup(
    vars: std::collections::HashMap<String, String>,
) -> impl Fn(&str) -> Option<String> {
    move |key| vars.get(key).cloned()
}
