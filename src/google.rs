//! OAuth2 credentials for the Sheets API, assembled from the installed-app
//! client secret and a saved token file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{check_status, Error, Result};

#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: InstalledApp,
}

#[derive(Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct OAuthInfo {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GoogleCredentials {
    pub fn load(settings: &Settings) -> Result<Self> {
        let secret_path = match &settings.sheets.client_secret_file {
            Some(p) => settings.credential_path(p),
            None => find_client_secret(&settings.credentials_dir)?,
        };
        let secret: ClientSecretFile = read_json(&secret_path)?;

        let oauth_path = settings.credential_path(&settings.sheets.oauth_file);
        let oauth: OAuthInfo = read_json(&oauth_path)?;

        Ok(Self {
            client_id: secret.installed.client_id,
            client_secret: secret.installed.client_secret,
            access_token: oauth.access_token,
            refresh_token: oauth.refresh_token,
            token_uri: settings.sheets.token_uri.clone(),
        })
    }

    /// Exchange the refresh token for a fresh access token.
    /// Keeps the saved access token when there is no refresh token.
    pub async fn refresh(&mut self, client: &reqwest::Client) -> Result<()> {
        let Some(refresh_token) = self.refresh_token.as_deref() else {
            warn!("No refresh token saved, using stored access token as is");
            return Ok(());
        };
        let resp = client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(resp).await?.json().await?;
        self.access_token = token.access_token;
        info!("Refreshed Google access token");
        Ok(())
    }
}

/// First `client_secret_*.json` in the directory, by name.
fn find_client_secret(dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("client_secret_") && n.ends_with(".json"))
        })
        .collect();
    found.sort();
    found.into_iter().next().ok_or_else(|| {
        Error::MissingCredential(format!("client_secret_*.json in {}", dir.display()))
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::MissingCredential(path.display().to_string())
        } else {
            Error::io(path.display().to_string(), e)
        }
    })?;
    Ok(serde_json::from_str(&raw)?)
}
