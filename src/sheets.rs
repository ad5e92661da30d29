use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::SheetsSettings;
use crate::error::{check_status, Error, Result};
use crate::model::{PaperLink, DEFAULT_PRIORITY};
use crate::pipeline::{LinkSink, WriteOutcome};
use crate::reader::{LinkSource, SourceKey, SourceRecord};

const HEADER_ROW: usize = 2;
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const COLUMNS: &[&str] = &["Title", "優先度(1-5)", "URL", "Note", "Created At"];
pub const TAG_COLUMNS: &[&str] = &["Proj関連", "気象", "データ同化", "Sim/PDE", "LLM", "HPC"];

// ── API ──

#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Cell values of an A1 range as strings; trailing blanks are omitted by the API.
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>>;

    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()>;

    /// Delete rows `[start, end)`, zero-based.
    async fn delete_rows(&self, start: usize, end: usize) -> Result<()>;
}

pub struct SheetsClient {
    client: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    sheet_gid: i64,
    token: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsClient {
    pub fn new(
        client: reqwest::Client,
        settings: &SheetsSettings,
        spreadsheet_id: &str,
        token: String,
    ) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            Error::Config(::config::ConfigError::Message(format!(
                "sheets.base_url '{}': {}",
                settings.base_url, e
            )))
        })?;
        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_gid: settings.sheet_gid,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["spreadsheets", &self.spreadsheet_id, "values", range]);
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        let body: ValueRange = check_status(resp).await?.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let url = self.url(&["spreadsheets", &self.spreadsheet_id, "values", range]);
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn delete_rows(&self, start: usize, end: usize) -> Result<()> {
        let batch = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&["spreadsheets", &batch]);
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": self.sheet_gid,
                        "dimension": "ROWS",
                        "startIndex": start,
                        "endIndex": end,
                    }
                }
            }]
        });
        let resp = self.client.post(url).bearer_auth(&self.token).json(&body).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn a1(sheet: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cells)
}

// ── Writer ──

pub fn header_row() -> Vec<String> {
    COLUMNS.iter().chain(TAG_COLUMNS).map(|s| s.to_string()).collect()
}

pub fn sheet_row(link: &PaperLink) -> Vec<String> {
    vec![
        link.title.clone(),
        link.priority.to_string(),
        link.url.clone(),
        link.note.clone(),
        link.created_at
            .map(|t| t.format(DATE_FORMAT).to_string())
            .unwrap_or_default(),
    ]
}

/// Appends each record below the last filled row of column A.
pub struct SheetWriter<S: SheetsApi> {
    /// None for a dry run
    api: Option<S>,
    sheet_name: String,
    headers_written: bool,
}

impl<S: SheetsApi> SheetWriter<S> {
    pub fn new(api: S, sheet_name: &str) -> Self {
        Self {
            api: Some(api),
            sheet_name: sheet_name.to_string(),
            headers_written: false,
        }
    }

    /// Prints rows instead of writing them; needs no Sheets client.
    pub fn dry_run(sheet_name: &str) -> Self {
        Self {
            api: None,
            sheet_name: sheet_name.to_string(),
            headers_written: false,
        }
    }
}

#[async_trait]
impl<S: SheetsApi> LinkSink for SheetWriter<S> {
    async fn write(&mut self, link: &PaperLink) -> Result<WriteOutcome> {
        let row = sheet_row(link);
        let Some(api) = &self.api else {
            let payload = serde_json::to_string(&row)?;
            info!(%payload, sheet = %self.sheet_name, "Dry run, row not written");
            println!("Dry run: {}", payload);
            return Ok(WriteOutcome::DryRun);
        };

        if !self.headers_written {
            let range = a1(&self.sheet_name, &format!("A{}", HEADER_ROW));
            api.update_values(&range, vec![header_row()]).await?;
            self.headers_written = true;
        }

        let filled = api.get_values(&a1(&self.sheet_name, "A:A")).await?.len();
        let target = filled.max(HEADER_ROW) + 1;
        debug!(filled, target, "Located first empty row");

        let range = a1(&self.sheet_name, &format!("A{}", target));
        api.update_values(&range, vec![row]).await?;
        info!(row = target, title = %link.title, "Appended row");
        Ok(WriteOutcome::Written)
    }
}

// ── Reader ──

/// Parse one data row. Blank rows give `Ok(None)`.
pub fn parse_row(row_no: usize, cells: &[String], tag_headers: &[String]) -> Result<Option<PaperLink>> {
    let cell = |i: usize| cells.get(i).map(|s| s.trim()).unwrap_or("");
    if cells.iter().all(|c| c.trim().is_empty()) {
        return Ok(None);
    }
    let malformed = |reason: String| Error::MalformedRow { row: row_no, reason };

    let title = cell(0);
    if title.is_empty() {
        return Err(malformed("missing title".into()));
    }
    let url = cell(2);
    if url.is_empty() {
        return Err(malformed("missing url".into()));
    }

    let priority = match cell(1) {
        "" => DEFAULT_PRIORITY,
        p => match p.parse::<u8>() {
            Ok(n) if (1..=5).contains(&n) => n,
            _ => return Err(malformed(format!("priority '{}' not in 1-5", p))),
        },
    };

    let created_at = match cell(4) {
        "" => None,
        s => Some(
            NaiveDateTime::parse_from_str(s, DATE_FORMAT)
                .map_err(|e| malformed(format!("created at '{}': {}", s, e)))?
                .and_utc(),
        ),
    };

    let tags = tag_headers
        .iter()
        .enumerate()
        .filter(|(i, _)| cell(COLUMNS.len() + i).eq_ignore_ascii_case("TRUE"))
        .map(|(_, h)| h.clone())
        .collect();

    Ok(Some(PaperLink {
        title: title.to_string(),
        url: url.to_string(),
        tags,
        priority,
        note: cell(3).to_string(),
        created_at,
    }))
}

/// Reads collected rows back out of the sheet. Relocation deletes the row.
pub struct SheetReader<S: SheetsApi> {
    api: S,
    sheet_name: String,
    delete_processed: bool,
    limit: usize,
    rows: Option<VecDeque<(usize, Vec<String>)>>,
    tag_headers: Vec<String>,
    yielded: usize,
    deleted: usize,
}

impl<S: SheetsApi> SheetReader<S> {
    pub fn new(api: S, sheet_name: &str, delete_processed: bool, limit: usize) -> Self {
        Self {
            api,
            sheet_name: sheet_name.to_string(),
            delete_processed,
            limit,
            rows: None,
            tag_headers: TAG_COLUMNS.iter().map(|s| s.to_string()).collect(),
            yielded: 0,
            deleted: 0,
        }
    }

    async fn load(&mut self) -> Result<()> {
        let range = a1(&self.sheet_name, &format!("A{}:K", HEADER_ROW));
        let mut values = self.api.get_values(&range).await?.into_iter();

        if let Some(header) = values.next() {
            if header.len() > COLUMNS.len() {
                self.tag_headers = header[COLUMNS.len()..].to_vec();
            }
        }
        let rows: VecDeque<_> = values
            .enumerate()
            .map(|(i, cells)| (HEADER_ROW + 1 + i, cells))
            .collect();
        info!(rows = rows.len(), sheet = %self.sheet_name, "Loaded sheet rows");
        self.rows = Some(rows);
        Ok(())
    }
}

#[async_trait]
impl<S: SheetsApi> LinkSource for SheetReader<S> {
    async fn next(&mut self) -> Result<Option<SourceRecord>> {
        if self.yielded >= self.limit {
            return Ok(None);
        }
        if self.rows.is_none() {
            self.load().await?;
        }
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        while let Some((row_no, cells)) = rows.pop_front() {
            if let Some(link) = parse_row(row_no, &cells, &self.tag_headers)? {
                self.yielded += 1;
                return Ok(Some(SourceRecord {
                    key: SourceKey::SheetRow(row_no),
                    link,
                }));
            }
        }
        Ok(None)
    }

    async fn relocate(&mut self, record: &SourceRecord) -> Result<bool> {
        let SourceKey::SheetRow(row_no) = record.key else {
            return Ok(false);
        };
        if !self.delete_processed {
            return Ok(false);
        }
        // earlier deletions in this run shifted the row up
        let current = row_no - self.deleted;
        self.api.delete_rows(current - 1, current).await?;
        self.deleted += 1;
        info!(row = current, "Deleted processed row");
        Ok(true)
    }
}
