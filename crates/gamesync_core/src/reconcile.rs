use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ResolvedConfig, StoreSettings};
use crate::dates::parse_workspace_date;
use crate::error::SyncError;
use crate::game::{Game, GameSet, collect_library_games, collect_wishlist_games};
use crate::status::Status;
use crate::store::{SteamClient, SteamClientConfig, StoreApi, store_page_url};
use crate::workspace::{
    NotionClient, NotionClientConfig, RecordFields, RecordFilter, RecordUpdate, WorkspaceApi,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    WouldCreate,
    Exists,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WouldCreate => "would_create",
            Self::Exists => "exists",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncGameResult {
    pub title: String,
    pub external_id: String,
    pub status: Status,
    pub owned: bool,
    pub action: SyncAction,
    pub record_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub library_games: usize,
    pub wishlist_games: usize,
    pub existing_records: usize,
    pub invalid_records: usize,
    pub created: usize,
    pub unchanged: usize,
    pub unresolved: Vec<String>,
    pub games: Vec<SyncGameResult>,
    pub store_request_count: usize,
    pub workspace_request_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Transitioned,
    WouldTransition,
    StillUnreleased,
    SkippedMissingDate,
}

impl TransitionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transitioned => "transitioned",
            Self::WouldTransition => "would_transition",
            Self::StillUnreleased => "still_unreleased",
            Self::SkippedMissingDate => "skipped_missing_date",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecordResult {
    pub title: String,
    pub record_id: String,
    pub release_date: Option<String>,
    pub action: TransitionAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub dry_run: bool,
    pub examined: usize,
    pub transitioned: usize,
    pub still_unreleased: usize,
    pub skipped: usize,
    pub invalid_records: usize,
    pub records: Vec<TransitionRecordResult>,
    pub request_count: usize,
}

pub fn sync_games(config: &ResolvedConfig, options: &SyncOptions) -> Result<SyncReport, SyncError> {
    let mut store = SteamClient::new(SteamClientConfig::from_settings(&config.store, &config.http))?;
    let mut workspace = NotionClient::new(NotionClientConfig::from_settings(
        &config.workspace,
        &config.http,
    ))?;
    sync_games_with_api(
        &mut store,
        &mut workspace,
        &config.store,
        &config.workspace.database_id,
        options,
        Utc::now(),
    )
}

pub fn transition_games(
    config: &ResolvedConfig,
    options: &SyncOptions,
) -> Result<TransitionReport, SyncError> {
    let mut workspace = NotionClient::new(NotionClientConfig::from_settings(
        &config.workspace,
        &config.http,
    ))?;
    transition_games_with_api(
        &mut workspace,
        &config.workspace.database_id,
        options,
        Utc::now(),
    )
}

/// Create a workspace record for every storefront game whose title is not in
/// the database yet. The first failed create aborts the run; records created
/// before it are kept.
pub fn sync_games_with_api<S: StoreApi, W: WorkspaceApi>(
    store: &mut S,
    workspace: &mut W,
    settings: &StoreSettings,
    database_id: &str,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<SyncReport, SyncError> {
    if settings.collections.is_empty() {
        warn!("no curated collections configured, library games will not be synced");
    }
    let (library, library_unresolved) =
        collect_library_games(store, &settings.user_id, &settings.collections)?;
    let (wishlist, wishlist_unresolved) = collect_wishlist_games(store, &settings.user_id)?;

    let mut report = SyncReport {
        dry_run: options.dry_run,
        library_games: library.len(),
        wishlist_games: wishlist.len(),
        existing_records: 0,
        invalid_records: 0,
        created: 0,
        unchanged: 0,
        unresolved: library_unresolved.app_ids,
        games: Vec::new(),
        store_request_count: 0,
        workspace_request_count: 0,
    };
    report.unresolved.extend(wishlist_unresolved.app_ids);

    let mut games = GameSet::new();
    games.extend(library);
    games.extend(wishlist);

    let existing = workspace
        .query_records(database_id, None)
        .map_err(|error| error.for_entity("query records", database_id))?;
    report.existing_records = existing.page_count();
    report.invalid_records = existing.rejected.len();
    // Invalid pages still hold their title, otherwise they would be re-created.
    let existing_titles = existing.titles().collect::<HashSet<_>>();

    for game in games {
        let status = game.initial_status(now);
        if existing_titles.contains(game.name.as_str()) {
            report.unchanged += 1;
            report.games.push(game_result(&game, status, SyncAction::Exists, None));
            continue;
        }

        if options.dry_run {
            info!(title = %game.name, %status, "would create record");
            report.created += 1;
            report
                .games
                .push(game_result(&game, status, SyncAction::WouldCreate, None));
            continue;
        }

        let fields = record_fields(&game, status, settings);
        let record_id = workspace
            .create_record(database_id, &fields)
            .map_err(|error| error.for_entity("create record", game.name.clone()))?;
        info!(title = %game.name, %status, record_id = %record_id, "created record");
        report.created += 1;
        report.games.push(game_result(
            &game,
            status,
            SyncAction::Created,
            Some(record_id),
        ));
    }

    report.store_request_count = store.request_count();
    report.workspace_request_count = workspace.request_count();
    Ok(report)
}

/// Move every Unreleased record whose release date has passed to Unowned.
/// Only the status property is written.
pub fn transition_games_with_api<W: WorkspaceApi>(
    workspace: &mut W,
    database_id: &str,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<TransitionReport, SyncError> {
    let filter = RecordFilter::Status(Status::Unreleased);
    let query = workspace
        .query_records(database_id, Some(&filter))
        .map_err(|error| error.for_entity("query records", database_id))?;

    let mut report = TransitionReport {
        dry_run: options.dry_run,
        examined: 0,
        transitioned: 0,
        still_unreleased: 0,
        skipped: 0,
        invalid_records: query.rejected.len(),
        records: Vec::new(),
        request_count: 0,
    };

    for record in query.records.into_iter().filter(|record| filter.matches(record)) {
        report.examined += 1;
        let Some(date_text) = record.release_date.clone() else {
            warn!(title = %record.title, "unreleased record has no release date, skipping");
            report.skipped += 1;
            report.records.push(TransitionRecordResult {
                title: record.title,
                record_id: record.id,
                release_date: None,
                action: TransitionAction::SkippedMissingDate,
            });
            continue;
        };

        let release_date = parse_workspace_date(&date_text).ok_or_else(|| {
            SyncError::decode("release date", format!("unrecognized date {date_text:?}"))
                .for_entity("transition record", record.title.clone())
        })?;

        let action = if now < release_date {
            report.still_unreleased += 1;
            TransitionAction::StillUnreleased
        } else if options.dry_run {
            info!(title = %record.title, "would transition to {}", Status::Unowned);
            report.transitioned += 1;
            TransitionAction::WouldTransition
        } else {
            let update = RecordUpdate {
                status: Some(Status::Unowned),
            };
            workspace
                .update_record(&record.id, &update)
                .map_err(|error| error.for_entity("transition record", record.title.clone()))?;
            info!(title = %record.title, "transitioned to {}", Status::Unowned);
            report.transitioned += 1;
            TransitionAction::Transitioned
        };

        report.records.push(TransitionRecordResult {
            title: record.title,
            record_id: record.id,
            release_date: Some(date_text),
            action,
        });
    }

    report.request_count = workspace.request_count();
    Ok(report)
}

fn record_fields(game: &Game, status: Status, settings: &StoreSettings) -> RecordFields {
    RecordFields {
        title: game.name.clone(),
        status,
        platforms: settings.platform_tags.clone(),
        genres: game.genres.clone(),
        store_url: store_page_url(&settings.store_page_url, &game.external_id),
        cover_art: game.cover_image_url.clone(),
        release_date: game.release_date,
    }
}

fn game_result(
    game: &Game,
    status: Status,
    action: SyncAction,
    record_id: Option<String>,
) -> SyncGameResult {
    SyncGameResult {
        title: game.name.clone(),
        external_id: game.external_id.clone(),
        status,
        owned: game.owned,
        action,
        record_id,
    }
}
