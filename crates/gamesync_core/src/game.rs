use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::collections::{CuratedLists, Membership, classify};
use crate::dates::parse_release_date;
use crate::error::SyncError;
use crate::status::{Status, resolve_status};
use crate::store::{AppDetail, OwnedGameEntry, StoreApi, WishlistEntry, cdn_header_image};

/// Playtime counters for an owned game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaytimeStats {
    pub total: Duration,
    pub windows: Duration,
    pub mac: Duration,
    pub linux: Duration,
    pub disconnected: Duration,
}

impl PlaytimeStats {
    fn from_minutes(entry: &OwnedGameEntry) -> Self {
        let minutes = |value: u64| Duration::from_secs(value.saturating_mul(60));
        Self {
            total: minutes(entry.playtime_forever),
            windows: minutes(entry.playtime_windows),
            mac: minutes(entry.playtime_mac),
            linux: minutes(entry.playtime_linux),
            disconnected: minutes(entry.playtime_disconnected),
        }
    }
}

/// A game assembled from storefront data for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Game {
    pub external_id: String,
    pub name: String,
    pub cover_image_url: Option<String>,
    pub genres: Vec<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub playtime: Option<PlaytimeStats>,
    pub last_played: Option<DateTime<Utc>>,
    pub membership: Membership,
    pub owned: bool,
}

impl Game {
    /// Status a new workspace record for this game starts in.
    pub fn initial_status(&self, now: DateTime<Utc>) -> Status {
        resolve_status(self.release_date, self.owned, &self.membership, now)
    }
}

pub fn map_library_entry(
    entry: &OwnedGameEntry,
    detail: &AppDetail,
    membership: Membership,
) -> Game {
    let mut game = map_catalog_detail(&entry.app_id, detail);
    if game.name.is_empty() {
        game.name = entry.name.trim().to_string();
    }
    game.playtime = Some(PlaytimeStats::from_minutes(entry));
    game.last_played = epoch_to_timestamp(entry.last_played_epoch);
    game.membership = membership;
    game.owned = true;
    game
}

pub fn map_wishlist_entry(entry: &WishlistEntry, detail: &AppDetail) -> Game {
    map_catalog_detail(&entry.app_id, detail)
}

/// `requested_id` is only used when the catalog did not report its own id.
fn map_catalog_detail(requested_id: &str, detail: &AppDetail) -> Game {
    let app_id = if detail.app_id.is_empty() {
        requested_id
    } else {
        detail.app_id.as_str()
    };
    let mut genres = Vec::with_capacity(detail.genres.len());
    for genre in &detail.genres {
        if !genres.contains(genre) {
            genres.push(genre.clone());
        }
    }
    Game {
        external_id: app_id.to_string(),
        name: detail.name.trim().to_string(),
        cover_image_url: Some(
            detail
                .header_image
                .clone()
                .unwrap_or_else(|| cdn_header_image(app_id)),
        ),
        genres,
        release_date: parse_release_date(&detail.release_date_text),
        playtime: None,
        last_played: None,
        membership: Membership::new(),
        owned: false,
    }
}

fn epoch_to_timestamp(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch <= 0 {
        return None;
    }
    DateTime::from_timestamp(epoch, 0)
}

/// Games in first-seen order, unique by name.
#[derive(Debug, Clone, Default)]
pub struct GameSet {
    games: Vec<Game>,
    names: HashSet<String>,
}

impl GameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a game with the same name is already present.
    pub fn insert(&mut self, game: Game) -> bool {
        if !self.names.insert(game.name.clone()) {
            return false;
        }
        self.games.push(game);
        true
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Game> {
        self.games.iter()
    }

    pub fn extend(&mut self, other: GameSet) -> usize {
        other
            .games
            .into_iter()
            .map(|game| self.insert(game))
            .filter(|inserted| *inserted)
            .count()
    }
}

impl IntoIterator for GameSet {
    type Item = Game;
    type IntoIter = std::vec::IntoIter<Game>;

    fn into_iter(self) -> Self::IntoIter {
        self.games.into_iter()
    }
}

/// Catalog ids that could not be resolved while assembling a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    pub app_ids: Vec<String>,
}

/// Owned games that sit in at least one curated collection. Uncurated library
/// entries are never fetched in detail.
pub fn collect_library_games<S: StoreApi>(
    api: &mut S,
    user_id: &str,
    lists: &CuratedLists,
) -> Result<(GameSet, Unresolved), SyncError> {
    let entries = api
        .get_owned_games(user_id)
        .map_err(|error| error.for_entity("fetch library", user_id))?;
    debug!(owned = entries.len(), "fetched library");

    let mut games = GameSet::new();
    let mut unresolved = Unresolved::default();
    for entry in &entries {
        let membership = classify(&entry.app_id, lists);
        if membership.is_empty() {
            continue;
        }
        let Some(detail) = fetch_detail(api, &entry.app_id, &mut unresolved)? else {
            continue;
        };
        let game = map_library_entry(entry, &detail, membership);
        insert_named(&mut games, game, &entry.app_id, &mut unresolved);
    }
    Ok((games, unresolved))
}

pub fn collect_wishlist_games<S: StoreApi>(
    api: &mut S,
    user_id: &str,
) -> Result<(GameSet, Unresolved), SyncError> {
    let entries = api
        .get_wishlist(user_id)
        .map_err(|error| error.for_entity("fetch wishlist", user_id))?;
    debug!(wishlisted = entries.len(), "fetched wishlist");

    let mut games = GameSet::new();
    let mut unresolved = Unresolved::default();
    for entry in &entries {
        let Some(detail) = fetch_detail(api, &entry.app_id, &mut unresolved)? else {
            continue;
        };
        let game = map_wishlist_entry(entry, &detail);
        insert_named(&mut games, game, &entry.app_id, &mut unresolved);
    }
    Ok((games, unresolved))
}

/// A game without a name can never be matched to a record, so it is treated
/// like an unknown catalog entry.
fn insert_named(games: &mut GameSet, game: Game, app_id: &str, unresolved: &mut Unresolved) {
    if game.name.is_empty() {
        warn!(app_id, "catalog entry has no name, skipping");
        unresolved.app_ids.push(app_id.to_string());
    } else if !games.insert(game) {
        debug!(app_id, "duplicate title skipped");
    }
}

fn fetch_detail<S: StoreApi>(
    api: &mut S,
    app_id: &str,
    unresolved: &mut Unresolved,
) -> Result<Option<AppDetail>, SyncError> {
    match api.get_app_detail(app_id) {
        Ok(detail) => Ok(Some(detail)),
        Err(error) if error.is_not_found() => {
            warn!(app_id, "catalog entry not found, skipping");
            unresolved.app_ids.push(app_id.to_string());
            Ok(None)
        }
        Err(error) => Err(error.for_entity("fetch catalog detail", app_id)),
    }
}
