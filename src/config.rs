//! Runtime settings.
//!
//! Sources, later ones winning:
//! - built-in defaults
//! - `paperlink.{toml,json,yaml}` in the working directory, or `--config <path>`
//! - environment variables `PAPERLINK__<SECTION>__<KEY>`
//!
//! Secrets left unset are then filled from the legacy `user.json` in
//! `credentials_dir`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::DEFAULT_SITES;

const LEGACY_USER_FILE: &str = "user.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding token and OAuth files
    pub credentials_dir: PathBuf,
    /// Allow-list for the site filter
    pub sites: Vec<String>,
    pub raindrop: RaindropSettings,
    pub notion: NotionSettings,
    pub sheets: SheetsSettings,
    pub zotero: ZoteroSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaindropSettings {
    pub base_url: String,
    pub api_token: Option<String>,
    pub token_file: PathBuf,
    pub source_collection: String,
    pub read_collection: String,
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotionSettings {
    pub base_url: String,
    pub api_secret: Option<String>,
    pub database_id: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    pub base_url: String,
    pub token_uri: String,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    /// Numeric sheet id, needed for row deletion
    pub sheet_gid: i64,
    pub oauth_file: PathBuf,
    /// Defaults to the first `client_secret_*.json` in `credentials_dir`
    pub client_secret_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZoteroSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    /// "user" or "group"
    pub library_type: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials_dir: PathBuf::from("."),
            sites: DEFAULT_SITES.iter().map(|s| s.to_string()).collect(),
            raindrop: RaindropSettings::default(),
            notion: NotionSettings::default(),
            sheets: SheetsSettings::default(),
            zotero: ZoteroSettings::default(),
        }
    }
}

impl Default for RaindropSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.raindrop.io/rest/v1".into(),
            api_token: None,
            token_file: PathBuf::from("raindrop_token.txt"),
            source_collection: "論文/unread".into(),
            read_collection: "論文/read".into(),
            page_size: 20,
        }
    }
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com/v1".into(),
            api_secret: None,
            database_id: None,
            version: "2022-06-28".into(),
        }
    }
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com/v4".into(),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            spreadsheet_id: None,
            sheet_name: "シート1".into(),
            sheet_gid: 0,
            oauth_file: PathBuf::from("oauth_info.json"),
            client_secret_file: None,
        }
    }
}

impl Default for ZoteroSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.zotero.org".into(),
            api_key: None,
            user_id: None,
            library_type: "user".into(),
        }
    }
}

/// Flat credential file kept from the script era.
#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    raindrop_api_token: Option<String>,
    notion_api_secret: Option<String>,
    zotero_api_key: Option<String>,
    zotero_user_id: Option<serde_json::Value>,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::with_name("paperlink").required(false));
        if let Some(p) = path {
            builder = builder.add_source(File::from(p));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("PAPERLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.merge_user_info()?;
        Ok(settings)
    }

    /// Resolve a credential path against `credentials_dir`.
    pub fn credential_path(&self, p: &Path) -> PathBuf {
        self.credentials_dir.join(p)
    }

    fn merge_user_info(&mut self) -> Result<()> {
        let path = self.credential_path(Path::new(LEGACY_USER_FILE));
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let info: UserInfo = serde_json::from_str(&raw)?;
        debug!("Merging credentials from {}", path.display());

        if self.raindrop.api_token.is_none() {
            self.raindrop.api_token = info.raindrop_api_token;
        }
        if self.notion.api_secret.is_none() {
            self.notion.api_secret = info.notion_api_secret;
        }
        if self.zotero.api_key.is_none() {
            self.zotero.api_key = info.zotero_api_key;
        }
        if self.zotero.user_id.is_none() {
            self.zotero.user_id = info.zotero_user_id.map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        }
        Ok(())
    }

    /// Bearer token for Raindrop: configured value, else the token file.
    pub fn raindrop_token(&self) -> Result<String> {
        if let Some(token) = &self.raindrop.api_token {
            return Ok(token.clone());
        }
        let path = self.credential_path(&self.raindrop.token_file);
        match std::fs::read_to_string(&path) {
            Ok(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Ok(_) => Err(Error::MissingCredential(format!("{} is empty", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::MissingCredential(
                format!("raindrop.api_token (or {})", path.display()),
            )),
            Err(e) => Err(Error::io(path.display().to_string(), e)),
        }
    }
}

pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::MissingCredential(name.to_string()))
}
