use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::config::{HttpSettings, WorkspaceSettings};
use crate::dates::format_workspace_date;
use crate::error::SyncError;
use crate::status::Status;

pub const PROP_NAME: &str = "Name";
pub const PROP_STATUS: &str = "Status";
pub const PROP_TAGS: &str = "Tags";
pub const PROP_STORE_PAGE: &str = "Official Store Page";
pub const PROP_COMPLETED_DATE: &str = "Completed Date";
pub const PROP_COVER_ART: &str = "Cover Art";
pub const PROP_PLATFORM: &str = "Platform";
pub const PROP_RELEASE_DATE: &str = "Release Date";
pub const PROP_RATING: &str = "Rating";
pub const PROP_NOTES: &str = "Notes";

const QUERY_PAGE_SIZE: usize = 100;
/// Upper bound on cursor pages followed by one query.
pub const MAX_QUERY_PAGES: usize = 1000;

/// One game row of the workspace database, decoded and validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub title: String,
    /// `None` when the stored label is not one of the known statuses.
    pub status: Option<Status>,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
    pub store_url: Option<String>,
    pub cover_art: Option<String>,
    /// Workspace-native date text, parsed only when needed.
    pub release_date: Option<String>,
    pub completed_date: Option<String>,
    pub rating: Option<String>,
    pub notes: Option<String>,
}

/// A page that failed validation. The title is kept when it could be read so
/// the page still counts as an existing game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub id: String,
    pub title: Option<String>,
    pub reason: String,
}

/// Result of one database query, cursor pages already followed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordQuery {
    pub records: Vec<WorkspaceRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl RecordQuery {
    /// Titles of every page that has one, valid or not.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .map(|record| record.title.as_str())
            .chain(self.rejected.iter().filter_map(|rejected| rejected.title.as_deref()))
    }

    pub fn page_count(&self) -> usize {
        self.records.len() + self.rejected.len()
    }
}

/// Fields of a record to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFields {
    pub title: String,
    pub status: Status,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
    pub store_url: String,
    pub cover_art: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
}

/// Partial update; only fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    Status(Status),
}

impl RecordFilter {
    pub fn matches(&self, record: &WorkspaceRecord) -> bool {
        match self {
            Self::Status(status) => record.status == Some(*status),
        }
    }
}

pub trait WorkspaceApi {
    fn query_records(
        &mut self,
        database_id: &str,
        filter: Option<&RecordFilter>,
    ) -> Result<RecordQuery, SyncError>;
    fn create_record(
        &mut self,
        database_id: &str,
        fields: &RecordFields,
    ) -> Result<String, SyncError>;
    fn update_record(&mut self, record_id: &str, update: &RecordUpdate) -> Result<(), SyncError>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct NotionClientConfig {
    pub api_url: String,
    pub api_version: String,
    pub token: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl NotionClientConfig {
    pub fn from_settings(workspace: &WorkspaceSettings, http: &HttpSettings) -> Self {
        Self {
            api_url: workspace.api_url.trim_end_matches('/').to_string(),
            api_version: workspace.api_version.clone(),
            token: workspace.token.clone(),
            user_agent: http.user_agent.clone(),
            timeout_ms: http.timeout_ms,
        }
    }
}

pub struct NotionClient {
    client: Client,
    config: NotionClientConfig,
    request_count: usize,
}

impl NotionClient {
    pub fn new(config: NotionClientConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| {
                SyncError::transport(format!("failed to build workspace HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn send_json(
        &mut self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> Result<Value, SyncError> {
        let url = format!("{}{path}", self.config.api_url);
        self.request_count += 1;
        debug!(%method, url = %url, "workspace request");
        let response = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header("Notion-Version", self.config.api_version.clone())
            .header(USER_AGENT, self.config.user_agent.clone())
            .json(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorBody>()
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_default();
            return Err(SyncError::transport(format!(
                "workspace request to {path} failed with HTTP {status} {detail}"
            )));
        }
        response.json::<Value>().map_err(SyncError::from)
    }
}

impl WorkspaceApi for NotionClient {
    fn query_records(
        &mut self,
        database_id: &str,
        filter: Option<&RecordFilter>,
    ) -> Result<RecordQuery, SyncError> {
        let path = format!("/databases/{database_id}/query");
        collect_query_pages(|cursor| {
            let body = query_body(filter, cursor);
            let response = self.send_json(reqwest::Method::POST, &path, &body)?;
            serde_json::from_value(response)
                .map_err(|error| SyncError::decode("database query response", error))
        })
    }

    fn create_record(
        &mut self,
        database_id: &str,
        fields: &RecordFields,
    ) -> Result<String, SyncError> {
        let body = json!({
            "parent": {"database_id": database_id},
            "properties": create_properties(fields),
        });
        let response = self.send_json(reqwest::Method::POST, "/pages", &body)?;
        response
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| SyncError::decode("create page response", "missing page id"))
    }

    fn update_record(&mut self, record_id: &str, update: &RecordUpdate) -> Result<(), SyncError> {
        if record_id.trim().is_empty() {
            return Err(SyncError::validation("<unknown>", "update with empty record id"));
        }
        let body = json!({"properties": update_properties(update)});
        self.send_json(
            reqwest::Method::PATCH,
            &format!("/pages/{record_id}"),
            &body,
        )?;
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub fn query_body(filter: Option<&RecordFilter>, cursor: Option<&str>) -> Value {
    let mut body = json!({
        "page_size": QUERY_PAGE_SIZE,
        "sorts": [{"property": PROP_NAME, "direction": "ascending"}],
    });
    if let Some(RecordFilter::Status(status)) = filter {
        body["filter"] = json!({
            "property": PROP_STATUS,
            "status": {"equals": status.as_str()},
        });
    }
    if let Some(cursor) = cursor {
        body["start_cursor"] = Value::String(cursor.to_string());
    }
    body
}

pub fn create_properties(fields: &RecordFields) -> Value {
    let mut properties = Map::new();
    properties.insert(
        PROP_NAME.to_string(),
        json!({"title": [{"type": "text", "text": {"content": fields.title}}]}),
    );
    properties.insert(PROP_STATUS.to_string(), status_property(fields.status));
    properties.insert(PROP_PLATFORM.to_string(), multi_select(&fields.platforms));
    properties.insert(PROP_TAGS.to_string(), multi_select(&fields.genres));
    properties.insert(PROP_STORE_PAGE.to_string(), json!({"url": fields.store_url}));
    if let Some(cover) = &fields.cover_art {
        properties.insert(
            PROP_COVER_ART.to_string(),
            json!({"files": [{"name": cover, "type": "external", "external": {"url": cover}}]}),
        );
    }
    if let Some(date) = fields.release_date {
        properties.insert(
            PROP_RELEASE_DATE.to_string(),
            json!({"date": {"start": format_workspace_date(date)}}),
        );
    }
    Value::Object(properties)
}

pub fn update_properties(update: &RecordUpdate) -> Value {
    let mut properties = Map::new();
    if let Some(status) = update.status {
        properties.insert(PROP_STATUS.to_string(), status_property(status));
    }
    Value::Object(properties)
}

fn status_property(status: Status) -> Value {
    json!({"status": {"name": status.as_str()}})
}

fn multi_select(names: &[String]) -> Value {
    let options = names
        .iter()
        .map(|name| json!({"name": name}))
        .collect::<Vec<_>>();
    json!({"multi_select": options})
}

/// Follow `next_cursor` while `has_more`, decoding every page. Invalid pages
/// are set aside with a warning instead of failing the query.
pub fn collect_query_pages<F>(mut fetch: F) -> Result<RecordQuery, SyncError>
where
    F: FnMut(Option<&str>) -> Result<QueryPage, SyncError>,
{
    let mut query = RecordQuery::default();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_QUERY_PAGES {
        let page = fetch(cursor.as_deref())?;
        for object in page.results {
            match decode_page(object) {
                Ok(record) => query.records.push(record),
                Err(rejected) => {
                    warn!(id = %rejected.id, "skipping workspace record: {}", rejected.reason);
                    query.rejected.push(rejected);
                }
            }
        }

        let next = if page.has_more { page.next_cursor } else { None };
        match next {
            None => return Ok(query),
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(SyncError::decode(
                    "database query response",
                    format!("cursor {next} repeated"),
                ));
            }
            Some(next) => cursor = Some(next),
        }
    }

    Err(SyncError::transport(format!(
        "database query did not end after {MAX_QUERY_PAGES} pages"
    )))
}

/// Decode a page, keeping its title on failure when one is readable.
pub fn decode_page(page: PageObject) -> Result<WorkspaceRecord, RejectedRecord> {
    let id = page.id.clone();
    let title = match page.properties.get(PROP_NAME) {
        Some(PropertyValue::Title { title }) => Some(plain_text(title)).filter(|t| !t.is_empty()),
        _ => None,
    };
    decode_record(page).map_err(|error| RejectedRecord {
        id,
        title,
        reason: error.to_string(),
    })
}

/// Decode one database page into a typed record.
pub fn decode_record(page: PageObject) -> Result<WorkspaceRecord, SyncError> {
    let PageObject { id, mut properties } = page;

    let title = match properties.remove(PROP_NAME) {
        Some(PropertyValue::Title { title }) => plain_text(&title),
        Some(_) => return Err(SyncError::validation(&id, "Name is not a title property")),
        None => String::new(),
    };
    if title.is_empty() {
        return Err(SyncError::validation(&id, "record has no title"));
    }

    let status = match properties.remove(PROP_STATUS) {
        Some(PropertyValue::Status { status }) | Some(PropertyValue::Select { select: status }) => {
            status.and_then(|option| option.name.parse::<Status>().ok())
        }
        None => None,
        Some(_) => return Err(unexpected_type(&title, PROP_STATUS)),
    };
    let store_url = match properties.remove(PROP_STORE_PAGE) {
        Some(PropertyValue::Url { url }) => url.filter(|url| !url.is_empty()),
        None => None,
        Some(_) => return Err(unexpected_type(&title, PROP_STORE_PAGE)),
    };
    let cover_art = match properties.remove(PROP_COVER_ART) {
        Some(PropertyValue::Files { files }) => {
            files.into_iter().next().and_then(FileItem::into_url)
        }
        None => None,
        Some(_) => return Err(unexpected_type(&title, PROP_COVER_ART)),
    };
    let platforms = take_multi_select(&mut properties, &title, PROP_PLATFORM)?;
    let genres = take_multi_select(&mut properties, &title, PROP_TAGS)?;
    let release_date = take_date(&mut properties, &title, PROP_RELEASE_DATE)?;
    let completed_date = take_date(&mut properties, &title, PROP_COMPLETED_DATE)?;
    let rating = take_rich_text(&mut properties, &title, PROP_RATING)?;
    let notes = take_rich_text(&mut properties, &title, PROP_NOTES)?;

    Ok(WorkspaceRecord {
        id,
        title,
        status,
        platforms,
        genres,
        store_url,
        cover_art,
        release_date,
        completed_date,
        rating,
        notes,
    })
}

fn unexpected_type(record: &str, property: &str) -> SyncError {
    SyncError::validation(record, format!("{property} has an unexpected property type"))
}

fn take_multi_select(
    properties: &mut BTreeMap<String, PropertyValue>,
    record: &str,
    name: &str,
) -> Result<Vec<String>, SyncError> {
    match properties.remove(name) {
        Some(PropertyValue::MultiSelect { multi_select }) => {
            Ok(multi_select.into_iter().map(|option| option.name).collect())
        }
        None => Ok(Vec::new()),
        Some(_) => Err(unexpected_type(record, name)),
    }
}

fn take_date(
    properties: &mut BTreeMap<String, PropertyValue>,
    record: &str,
    name: &str,
) -> Result<Option<String>, SyncError> {
    match properties.remove(name) {
        Some(PropertyValue::Date { date }) => Ok(date.map(|value| value.start)),
        None => Ok(None),
        Some(_) => Err(unexpected_type(record, name)),
    }
}

fn take_rich_text(
    properties: &mut BTreeMap<String, PropertyValue>,
    record: &str,
    name: &str,
) -> Result<Option<String>, SyncError> {
    match properties.remove(name) {
        Some(PropertyValue::RichText { rich_text }) => {
            let text = plain_text(&rich_text);
            Ok((!text.is_empty()).then_some(text))
        }
        None => Ok(None),
        Some(_) => Err(unexpected_type(record, name)),
    }
}

fn plain_text(items: &[RichTextItem]) -> String {
    items
        .iter()
        .map(|item| item.plain_text.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}

/// One page of a database query response.
#[derive(Debug, Deserialize, Default)]
pub struct QueryPage {
    #[serde(default)]
    pub results: Vec<PageObject>,
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct PageObject {
    pub id: String,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<RichTextItem>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichTextItem>,
    },
    Status {
        status: Option<SelectOption>,
    },
    Select {
        select: Option<SelectOption>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<SelectOption>,
    },
    Url {
        url: Option<String>,
    },
    Date {
        date: Option<DateValue>,
    },
    Files {
        #[serde(default)]
        files: Vec<FileItem>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RichTextItem {
    #[serde(default)]
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct SelectOption {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DateValue {
    start: String,
}

#[derive(Debug, Deserialize)]
struct FileItem {
    #[serde(default)]
    name: String,
    external: Option<FileUrl>,
    file: Option<FileUrl>,
}

impl FileItem {
    fn into_url(self) -> Option<String> {
        self.external
            .or(self.file)
            .map(|file| file.url)
            .or_else(|| (!self.name.is_empty()).then_some(self.name))
    }
}

#[derive(Debug, Deserialize)]
struct FileUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn page(value: Value) -> PageObject {
        serde_json::from_value(value).expect("page object")
    }

    fn hollow_knight_page() -> Value {
        json!({
            "object": "page",
            "id": "page-1",
            "properties": {
                "Name": {"id": "title", "type": "title", "title": [
                    {"type": "text", "plain_text": "Hollow "},
                    {"type": "text", "plain_text": "Knight"}
                ]},
                "Status": {"id": "s", "type": "status", "status": {"id": "x", "name": "Unreleased", "color": "gray"}},
                "Platform": {"id": "p", "type": "multi_select", "multi_select": [{"name": "Steam"}, {"name": "gamesync"}]},
                "Tags": {"id": "t", "type": "multi_select", "multi_select": [{"name": "Metroidvania"}]},
                "Official Store Page": {"id": "u", "type": "url", "url": "https://store.steampowered.com/app/367520"},
                "Cover Art": {"id": "c", "type": "files", "files": [
                    {"name": "cover", "type": "external", "external": {"url": "https://cdn.example/367520.jpg"}}
                ]},
                "Release Date": {"id": "r", "type": "date", "date": {"start": "2017-02-24", "end": null, "time_zone": null}},
                "Completed Date": {"id": "d", "type": "date", "date": null},
                "Rating": {"id": "g", "type": "rich_text", "rich_text": []},
                "Notes": {"id": "n", "type": "rich_text", "rich_text": [{"plain_text": "bench at dirtmouth"}]},
                "Hours": {"id": "h", "type": "number", "number": 12}
            }
        })
    }

    #[test]
    fn decodes_full_page() {
        let record = decode_record(page(hollow_knight_page())).expect("record");
        assert_eq!(record.id, "page-1");
        assert_eq!(record.title, "Hollow Knight");
        assert_eq!(record.status, Some(Status::Unreleased));
        assert_eq!(record.platforms, vec!["Steam", "gamesync"]);
        assert_eq!(record.genres, vec!["Metroidvania"]);
        assert_eq!(
            record.store_url.as_deref(),
            Some("https://store.steampowered.com/app/367520")
        );
        assert_eq!(record.cover_art.as_deref(), Some("https://cdn.example/367520.jpg"));
        assert_eq!(record.release_date.as_deref(), Some("2017-02-24"));
        assert_eq!(record.completed_date, None);
        assert_eq!(record.rating, None);
        assert_eq!(record.notes.as_deref(), Some("bench at dirtmouth"));
    }

    #[test]
    fn missing_title_is_rejected() {
        let error = decode_record(page(json!({
            "id": "page-2",
            "properties": {
                "Name": {"type": "title", "title": []},
                "Status": {"type": "status", "status": {"name": "Playing"}}
            }
        })))
        .expect_err("empty title");
        assert!(matches!(error.kind(), SyncError::Validation { .. }));
        assert!(error.to_string().contains("page-2"));

        let error = decode_record(page(json!({"id": "page-3", "properties": {}})))
            .expect_err("no title property");
        assert!(matches!(error.kind(), SyncError::Validation { .. }));
    }

    #[test]
    fn wrong_property_type_is_rejected() {
        let mut value = hollow_knight_page();
        value["properties"]["Release Date"] = json!({"type": "rich_text", "rich_text": []});
        let error = decode_record(page(value)).expect_err("wrong type");
        assert!(matches!(error.kind(), SyncError::Validation { .. }));
        assert!(error.to_string().contains("Release Date"));
        assert!(error.to_string().contains("Hollow Knight"));
    }

    #[test]
    fn unknown_status_label_decodes_to_none() {
        let mut value = hollow_knight_page();
        value["properties"]["Status"] = json!({"type": "status", "status": {"name": "Abandoned"}});
        let record = decode_record(page(value)).expect("record");
        assert_eq!(record.status, None);

        let mut value = hollow_knight_page();
        value["properties"]["Status"] = json!({"type": "select", "select": {"name": "Up Next"}});
        let record = decode_record(page(value)).expect("record");
        assert_eq!(record.status, Some(Status::UpNext));
    }

    #[test]
    fn create_properties_carry_every_field() {
        let fields = RecordFields {
            title: "Hades".to_string(),
            status: Status::Unowned,
            platforms: vec!["Steam".to_string(), "gamesync".to_string()],
            genres: vec!["Action".to_string()],
            store_url: "https://store.steampowered.com/app/1145360".to_string(),
            cover_art: Some("https://cdn.example/hades.jpg".to_string()),
            release_date: Some(Utc.with_ymd_and_hms(2020, 9, 17, 0, 0, 0).unwrap()),
        };
        let properties = create_properties(&fields);
        assert_eq!(properties["Name"]["title"][0]["text"]["content"], "Hades");
        assert_eq!(properties["Status"]["status"]["name"], "Unowned");
        assert_eq!(properties["Platform"]["multi_select"][1]["name"], "gamesync");
        assert_eq!(properties["Tags"]["multi_select"][0]["name"], "Action");
        assert_eq!(
            properties["Official Store Page"]["url"],
            "https://store.steampowered.com/app/1145360"
        );
        assert_eq!(
            properties["Cover Art"]["files"][0]["external"]["url"],
            "https://cdn.example/hades.jpg"
        );
        assert_eq!(properties["Release Date"]["date"]["start"], "2020-09-17");
    }

    #[test]
    fn create_properties_omit_unknown_date_and_cover() {
        let fields = RecordFields {
            title: "Silksong".to_string(),
            status: Status::Unreleased,
            platforms: Vec::new(),
            genres: Vec::new(),
            store_url: "https://store.steampowered.com/app/1030300".to_string(),
            cover_art: None,
            release_date: None,
        };
        let properties = create_properties(&fields);
        let object = properties.as_object().expect("object");
        assert!(!object.contains_key("Release Date"));
        assert!(!object.contains_key("Cover Art"));
        assert_eq!(properties["Status"]["status"]["name"], "Unreleased");
    }

    #[test]
    fn update_properties_touch_status_only() {
        let properties = update_properties(&RecordUpdate {
            status: Some(Status::Unowned),
        });
        let object = properties.as_object().expect("object");
        assert_eq!(object.len(), 1);
        assert_eq!(properties["Status"]["status"]["name"], "Unowned");
        assert!(
            update_properties(&RecordUpdate::default())
                .as_object()
                .is_some_and(Map::is_empty)
        );
    }

    #[test]
    fn query_body_includes_filter_and_cursor() {
        let filter = RecordFilter::Status(Status::Unreleased);
        let body = query_body(Some(&filter), Some("cursor-2"));
        assert_eq!(body["page_size"], 100);
        assert_eq!(body["sorts"][0]["property"], "Name");
        assert_eq!(body["filter"]["property"], "Status");
        assert_eq!(body["filter"]["status"]["equals"], "Unreleased");
        assert_eq!(body["start_cursor"], "cursor-2");

        let plain = query_body(None, None);
        assert!(plain.get("filter").is_none());
        assert!(plain.get("start_cursor").is_none());
    }

    #[test]
    fn filter_matches_on_status() {
        let record = decode_record(page(hollow_knight_page())).expect("record");
        assert!(RecordFilter::Status(Status::Unreleased).matches(&record));
        assert!(!RecordFilter::Status(Status::Unowned).matches(&record));
    }

    fn query_page(titles: &[&str], next_cursor: Option<&str>, has_more: bool) -> QueryPage {
        let results = titles
            .iter()
            .enumerate()
            .map(|(index, title)| {
                json!({
                    "id": format!("{title}-{index}"),
                    "properties": {"Name": {"type": "title", "title": [{"plain_text": title}]}}
                })
            })
            .collect::<Vec<_>>();
        serde_json::from_value(json!({
            "results": results,
            "next_cursor": next_cursor,
            "has_more": has_more,
        }))
        .expect("query page")
    }

    #[test]
    fn query_follows_cursor_until_no_more() {
        let mut requested = Vec::new();
        let query = collect_query_pages(|cursor| {
            requested.push(cursor.map(ToString::to_string));
            Ok(match cursor {
                None => query_page(&["Celeste", "Hades"], Some("c1"), true),
                Some("c1") => query_page(&["Tunic"], Some("c2"), true),
                _ => query_page(&["Portal 2"], None, false),
            })
        })
        .expect("query");

        assert_eq!(
            requested,
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
        assert_eq!(
            query.titles().collect::<Vec<_>>(),
            vec!["Celeste", "Hades", "Tunic", "Portal 2"]
        );
    }

    #[test]
    fn query_stops_when_has_more_is_false() {
        let mut calls = 0;
        let query = collect_query_pages(|_| {
            calls += 1;
            Ok(query_page(&["Celeste"], Some("stale"), false))
        })
        .expect("query");
        assert_eq!(calls, 1);
        assert_eq!(query.records.len(), 1);
    }

    #[test]
    fn query_rejects_a_repeating_cursor() {
        let error = collect_query_pages(|_| Ok(query_page(&[], Some("same"), true)))
            .expect_err("repeating cursor");
        assert!(matches!(error.kind(), SyncError::Decode { .. }));
    }

    #[test]
    fn query_gives_up_after_page_limit() {
        let mut calls = 0;
        let error = collect_query_pages(|_| {
            calls += 1;
            let next = format!("c{calls}");
            Ok(query_page(&[], Some(&next), true))
        })
        .expect_err("page limit");
        assert_eq!(calls, MAX_QUERY_PAGES);
        assert!(error.to_string().contains("did not end"));
    }

    #[test]
    fn invalid_pages_keep_their_title() {
        let mut value = hollow_knight_page();
        value["properties"]["Rating"] = json!({"type": "select", "select": {"name": "10"}});
        let untitled = json!({"id": "page-9", "properties": {}});
        let query = collect_query_pages(|_| {
            Ok(serde_json::from_value(json!({
                "results": [value.clone(), untitled.clone()],
                "has_more": false,
            }))
            .expect("query page"))
        })
        .expect("query");

        assert!(query.records.is_empty());
        assert_eq!(query.rejected.len(), 2);
        assert_eq!(query.rejected[0].title.as_deref(), Some("Hollow Knight"));
        assert!(query.rejected[0].reason.contains("Rating"));
        assert_eq!(query.rejected[1].title, None);
        assert_eq!(query.titles().collect::<Vec<_>>(), vec!["Hollow Knight"]);
        assert_eq!(query.page_count(), 2);
    }
}
