use serde_json::Value;
use tracing::info;

use crate::config::{required, ZoteroSettings};
use crate::error::{check_status, Result};

/// `users/<id>` or `groups/<id>`.
pub fn library_path(library_type: &str, id: &str) -> String {
    match library_type {
        "group" | "groups" => format!("groups/{}", id),
        _ => format!("users/{}", id),
    }
}

/// Top-level items of the library, newest first as the API returns them.
pub async fn top_items(client: &reqwest::Client, settings: &ZoteroSettings, limit: usize) -> Result<Vec<Value>> {
    let key = required(&settings.api_key, "zotero.api_key")?;
    let user_id = required(&settings.user_id, "zotero.user_id")?;
    let url = format!(
        "{}/{}/items/top",
        settings.base_url.trim_end_matches('/'),
        library_path(&settings.library_type, user_id)
    );
    info!(%url, limit, "Fetching Zotero items");

    let resp = client
        .get(&url)
        .header("Zotero-API-Key", key)
        .header("Zotero-API-Version", "3")
        .query(&[("limit", limit.to_string())])
        .send()
        .await?;
    Ok(check_status(resp).await?.json().await?)
}
