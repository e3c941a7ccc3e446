use std::collections::HashMap;
use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{HttpSettings, StoreSettings};
use crate::error::SyncError;

pub const STORE_API_URL: &str = "https://api.steampowered.com";
pub const STORE_URL: &str = "https://store.steampowered.com";
pub const STORE_CDN_URL: &str = "https://cdn.cloudflare.steamstatic.com/steam/apps";

/// Stops a misbehaving wishlist endpoint from paging forever.
const MAX_WISHLIST_PAGES: usize = 1_000;

/// Catalog metadata for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDetail {
    pub app_id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub header_image: Option<String>,
    pub release_date_text: String,
}

/// One entry of the user's library, with raw counters as the API returns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedGameEntry {
    pub app_id: String,
    pub name: String,
    /// Playtime counters in minutes.
    pub playtime_forever: u64,
    pub playtime_windows: u64,
    pub playtime_mac: u64,
    pub playtime_linux: u64,
    pub playtime_disconnected: u64,
    /// Unix epoch seconds, `0` when never played.
    pub last_played_epoch: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishlistEntry {
    pub app_id: String,
}

pub trait StoreApi {
    fn get_app_detail(&mut self, app_id: &str) -> Result<AppDetail, SyncError>;
    fn get_owned_games(&mut self, user_id: &str) -> Result<Vec<OwnedGameEntry>, SyncError>;
    fn get_wishlist_page(
        &mut self,
        user_id: &str,
        page: usize,
    ) -> Result<Vec<WishlistEntry>, SyncError>;
    fn request_count(&self) -> usize;

    /// Request wishlist pages until an empty one comes back.
    fn get_wishlist(&mut self, user_id: &str) -> Result<Vec<WishlistEntry>, SyncError> {
        let mut entries = Vec::new();
        for page in 0..MAX_WISHLIST_PAGES {
            let batch = self.get_wishlist_page(user_id, page)?;
            if batch.is_empty() {
                return Ok(entries);
            }
            entries.extend(batch);
        }
        Err(SyncError::transport(format!(
            "wishlist for user {user_id} did not end after {MAX_WISHLIST_PAGES} pages"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct SteamClientConfig {
    pub api_url: String,
    pub store_url: String,
    pub api_key: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
}

impl SteamClientConfig {
    pub fn from_settings(store: &StoreSettings, http: &HttpSettings) -> Self {
        Self {
            api_url: STORE_API_URL.to_string(),
            store_url: STORE_URL.to_string(),
            api_key: store.api_key.clone(),
            user_agent: http.user_agent.clone(),
            timeout_ms: http.timeout_ms,
            rate_limit_ms: http.rate_limit_ms,
        }
    }
}

pub struct SteamClient {
    client: Client,
    config: SteamClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl SteamClient {
    pub fn new(config: SteamClientConfig) -> Result<Self, SyncError> {
        if config.api_key.trim().is_empty() {
            return Err(SyncError::transport("storefront API key is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| {
                SyncError::transport(format!("failed to build storefront HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn request_json(&mut self, url: &str, params: &[(&str, String)]) -> Result<Value, SyncError> {
        self.apply_rate_limit();
        debug!(url, "storefront request");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.config.user_agent.clone())
            .query(params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::transport(format!(
                "storefront request to {url} failed with HTTP {status}"
            )));
        }
        response.json::<Value>().map_err(SyncError::from)
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl StoreApi for SteamClient {
    fn get_app_detail(&mut self, app_id: &str) -> Result<AppDetail, SyncError> {
        let url = format!("{}/api/appdetails", self.config.store_url);
        let payload = self.request_json(&url, &[("appids", app_id.to_string())])?;
        decode_app_detail(app_id, payload)
    }

    fn get_owned_games(&mut self, user_id: &str) -> Result<Vec<OwnedGameEntry>, SyncError> {
        let url = format!(
            "{}/IPlayerService/GetOwnedGames/v0001/",
            self.config.api_url
        );
        let params = [
            ("key", self.config.api_key.clone()),
            ("steamid", user_id.to_string()),
            ("include_appinfo", "1".to_string()),
            ("include_played_free_games", "1".to_string()),
            ("skip_unvetted_apps", "false".to_string()),
            ("format", "json".to_string()),
        ];
        let payload = self.request_json(&url, &params)?;
        decode_owned_games(payload)
    }

    fn get_wishlist_page(
        &mut self,
        user_id: &str,
        page: usize,
    ) -> Result<Vec<WishlistEntry>, SyncError> {
        let url = format!(
            "{}/wishlist/profiles/{user_id}/wishlistdata/",
            self.config.store_url
        );
        let payload = self.request_json(&url, &[("p", page.to_string())])?;
        decode_wishlist_page(payload)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub fn store_page_url(template: &str, app_id: &str) -> String {
    template.replace("{id}", app_id)
}

pub fn cdn_header_image(app_id: &str) -> String {
    format!("{STORE_CDN_URL}/{app_id}/header.jpg")
}

/// The app-details endpoint answers `{"<id>": {"success": bool, "data": {...}}}`.
pub fn decode_app_detail(app_id: &str, payload: Value) -> Result<AppDetail, SyncError> {
    let mut envelope: HashMap<String, Option<AppDetailEnvelope>> =
        serde_json::from_value(payload)
            .map_err(|error| SyncError::decode(format!("app detail {app_id}"), error))?;
    let entry = envelope
        .remove(app_id)
        .flatten()
        .ok_or_else(|| SyncError::NotFound(app_id.to_string()))?;
    let data = match (entry.success, entry.data) {
        (true, Some(data)) => data,
        _ => return Err(SyncError::NotFound(app_id.to_string())),
    };

    let resolved_id = match data.steam_appid {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => app_id.to_string(),
    };
    Ok(AppDetail {
        app_id: resolved_id,
        name: data.name.trim().to_string(),
        genres: data
            .genres
            .into_iter()
            .map(|genre| genre.description.trim().to_string())
            .filter(|genre| !genre.is_empty())
            .collect(),
        header_image: data.header_image.filter(|url| !url.trim().is_empty()),
        release_date_text: data.release_date.map(|release| release.date).unwrap_or_default(),
    })
}

pub fn decode_owned_games(payload: Value) -> Result<Vec<OwnedGameEntry>, SyncError> {
    let parsed: OwnedGamesResponse = serde_json::from_value(payload)
        .map_err(|error| SyncError::decode("owned games response", error))?;
    Ok(parsed
        .response
        .games
        .into_iter()
        .map(|game| OwnedGameEntry {
            app_id: game.appid.to_string(),
            name: game.name,
            playtime_forever: game.playtime_forever,
            playtime_windows: game.playtime_windows_forever,
            playtime_mac: game.playtime_mac_forever,
            playtime_linux: game.playtime_linux_forever,
            playtime_disconnected: game.playtime_disconnected,
            last_played_epoch: game.rtime_last_played,
        })
        .collect())
}

/// A wishlist page is an object keyed by app id; past the last page the
/// endpoint answers with an empty array.
pub fn decode_wishlist_page(payload: Value) -> Result<Vec<WishlistEntry>, SyncError> {
    match payload {
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(app_id, _)| WishlistEntry { app_id })
            .collect()),
        other => Err(SyncError::decode(
            "wishlist page",
            format!("unexpected payload: {}", truncate(&other.to_string(), 120)),
        )),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Debug, Deserialize)]
struct AppDetailEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<AppDetailData>,
}

#[derive(Debug, Deserialize)]
struct AppDetailData {
    #[serde(default)]
    name: String,
    steam_appid: Option<Value>,
    header_image: Option<String>,
    #[serde(default)]
    genres: Vec<GenreItem>,
    release_date: Option<ReleaseDateItem>,
}

#[derive(Debug, Deserialize)]
struct GenreItem {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseDateItem {
    #[serde(default)]
    date: String,
}

#[derive(Debug, Deserialize, Default)]
struct OwnedGamesResponse {
    #[serde(default)]
    response: OwnedGamesPayload,
}

#[derive(Debug, Deserialize, Default)]
struct OwnedGamesPayload {
    #[serde(default)]
    games: Vec<OwnedGameItem>,
}

#[derive(Debug, Deserialize)]
struct OwnedGameItem {
    appid: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    playtime_forever: u64,
    #[serde(default)]
    playtime_windows_forever: u64,
    #[serde(default)]
    playtime_mac_forever: u64,
    #[serde(default)]
    playtime_linux_forever: u64,
    #[serde(default)]
    playtime_disconnected: u64,
    #[serde(default)]
    rtime_last_played: i64,
}
