use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::collections::CuratedLists;

pub const DEFAULT_CONFIG_FILENAME: &str = "gamesync.toml";
pub const DEFAULT_USER_AGENT: &str = "gamesync/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1_500;
pub const DEFAULT_STORE_PAGE_URL: &str = "https://store.steampowered.com/app/{id}";
pub const DEFAULT_WORKSPACE_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_WORKSPACE_API_VERSION: &str = "2022-06-28";
pub const DEFAULT_PLATFORM_TAGS: [&str; 2] = ["Steam", "gamesync"];

/// `ENVIRONMENT` values that route writes to the test game database.
const TEST_ENVIRONMENTS: [&str; 4] = ["dev", "development", "staging", "local"];

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# gamesync configuration. Secrets may instead come from the environment
# (STEAM_API_KEY, STEAM_USER_ID, NOTION_TOKEN, NOTION_GAME_DB).

[store]
user_id = ""
api_key = ""
# store_page_url = "https://store.steampowered.com/app/{id}"
# platform_tags = ["Steam", "gamesync"]

# Library games are only synced when listed in one of these collections.
[store.collections]
finished = []
playing = []
up_next = []

[workspace]
token = ""
game_database = ""
# Used instead of game_database when ENVIRONMENT is dev/development/staging/local.
# test_game_database = ""

[http]
# timeout_ms = 30000
# rate_limit_ms = 1500
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StoreSection {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub store_page_url: Option<String>,
    #[serde(default)]
    pub platform_tags: Vec<String>,
    #[serde(default)]
    pub collections: CuratedLists,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WorkspaceSection {
    pub token: Option<String>,
    pub game_database: Option<String>,
    pub test_game_database: Option<String>,
    pub api_url: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub timeout_ms: Option<u64>,
    pub rate_limit_ms: Option<u64>,
    pub user_agent: Option<String>,
}

/// Validated settings handed to every component at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub store: StoreSettings,
    pub workspace: WorkspaceSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub user_id: String,
    pub api_key: String,
    pub store_page_url: String,
    pub platform_tags: Vec<String>,
    pub collections: CuratedLists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub api_url: String,
    pub api_version: String,
    pub token: String,
    pub database_id: String,
    pub using_test_database: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
    pub user_agent: String,
}

impl AppConfig {
    /// Resolve against the process environment: env > config > default.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.resolve_with(|key| env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let config_value = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        let api_key = env_value("STEAM_API_KEY")
            .or_else(|| config_value(&self.store.api_key))
            .context("storefront API key is missing (set STEAM_API_KEY or [store].api_key)")?;
        let user_id = env_value("STEAM_USER_ID")
            .or_else(|| config_value(&self.store.user_id))
            .context("storefront user id is missing (set STEAM_USER_ID or [store].user_id)")?;
        let token = env_value("NOTION_TOKEN")
            .or_else(|| config_value(&self.workspace.token))
            .context("workspace token is missing (set NOTION_TOKEN or [workspace].token)")?;

        let using_test_database = env_value("ENVIRONMENT")
            .map(|value| TEST_ENVIRONMENTS.contains(&value.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let database_id = if using_test_database {
            env_value("NOTION_TEST_GAME_DB")
                .or_else(|| config_value(&self.workspace.test_game_database))
                .context(
                    "ENVIRONMENT selects the test database but none is configured \
                     (set NOTION_TEST_GAME_DB or [workspace].test_game_database)",
                )?
        } else {
            env_value("NOTION_GAME_DB")
                .or_else(|| config_value(&self.workspace.game_database))
                .context(
                    "game database id is missing (set NOTION_GAME_DB or [workspace].game_database)",
                )?
        };

        let store_page_url = config_value(&self.store.store_page_url)
            .unwrap_or_else(|| DEFAULT_STORE_PAGE_URL.to_string());
        if !store_page_url.contains("{id}") {
            bail!("[store].store_page_url must contain an {{id}} placeholder: {store_page_url}");
        }
        let platform_tags = if self.store.platform_tags.is_empty() {
            DEFAULT_PLATFORM_TAGS.iter().map(ToString::to_string).collect()
        } else {
            self.store.platform_tags.clone()
        };

        let timeout_ms = match env_value("GAMESYNC_HTTP_TIMEOUT_MS") {
            Some(value) => value.parse::<u64>().with_context(|| {
                format!("GAMESYNC_HTTP_TIMEOUT_MS must be a whole number of milliseconds: {value}")
            })?,
            None => self.http.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        };
        if timeout_ms == 0 {
            bail!("HTTP timeout must be greater than zero milliseconds");
        }
        let user_agent = env_value("GAMESYNC_USER_AGENT")
            .or_else(|| config_value(&self.http.user_agent))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Ok(ResolvedConfig {
            store: StoreSettings {
                user_id,
                api_key,
                store_page_url,
                platform_tags,
                collections: self.store.collections.clone(),
            },
            workspace: WorkspaceSettings {
                api_url: config_value(&self.workspace.api_url)
                    .unwrap_or_else(|| DEFAULT_WORKSPACE_API_URL.to_string()),
                api_version: config_value(&self.workspace.api_version)
                    .unwrap_or_else(|| DEFAULT_WORKSPACE_API_VERSION.to_string()),
                token,
                database_id,
                using_test_database,
            },
            http: HttpSettings {
                timeout_ms,
                rate_limit_ms: self.http.rate_limit_ms.unwrap_or(DEFAULT_RATE_LIMIT_MS),
                user_agent,
            },
        })
    }
}

/// Pick the config file: `--config` flag > `GAMESYNC_CONFIG` > `./gamesync.toml`.
pub fn resolve_config_path(flag: Option<&Path>, cwd: &Path) -> (PathBuf, ValueSource) {
    if let Some(path) = flag {
        return (path.to_path_buf(), ValueSource::Flag);
    }
    if let Ok(value) = env::var("GAMESYNC_CONFIG") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return (PathBuf::from(trimmed), ValueSource::Env);
        }
    }
    (cwd.join(DEFAULT_CONFIG_FILENAME), ValueSource::Default)
}

/// Load and parse an AppConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: AppConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Write the starter config. Returns `true` when a write occurred.
pub fn write_default_config(config_path: &Path, force: bool) -> Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(config_path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}
