use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{required, NotionSettings};
use crate::error::{check_status, Result};
use crate::model::PaperLink;
use crate::pipeline::{LinkSink, WriteOutcome};

// Property names of the reading-list database
const PROP_TITLE: &str = "タイトル";
const PROP_URL: &str = "URL";
const PROP_TAGS: &str = "タグ";
const PROP_PRIORITY: &str = "優先度";
const PROP_CREATED: &str = "作成日時";

/// Page-creation body for one paper.
pub fn page_payload(database_id: &str, link: &PaperLink) -> Value {
    let mut properties = json!({
        PROP_TITLE: { "title": [{ "text": { "content": link.title } }] },
        PROP_URL: { "url": link.url },
        PROP_TAGS: { "multi_select": link.tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>() },
        PROP_PRIORITY: { "number": link.priority },
    });
    if let Some(created) = link.created_at {
        properties[PROP_CREATED] = json!({ "date": { "start": created.to_rfc3339() } });
    }

    json!({
        "parent": { "database_id": database_id },
        "properties": properties,
        "children": [{
            "object": "block",
            "type": "paragraph",
            "paragraph": {
                "rich_text": [{ "type": "text", "text": { "content": link.note } }]
            }
        }]
    })
}

fn created_page_id(page: &Value) -> &str {
    page.get("id").and_then(Value::as_str).unwrap_or("?")
}

pub struct NotionWriter {
    client: reqwest::Client,
    pages_url: String,
    secret: String,
    database_id: String,
    version: String,
    dry_run: bool,
}

impl NotionWriter {
    /// A dry run prints payloads only, so it needs neither secret nor database id.
    pub fn new(client: reqwest::Client, settings: &NotionSettings, dry_run: bool) -> Result<Self> {
        let (secret, database_id) = if dry_run {
            (
                settings.api_secret.clone().unwrap_or_default(),
                settings.database_id.clone().unwrap_or_default(),
            )
        } else {
            (
                required(&settings.api_secret, "notion.api_secret")?.to_string(),
                required(&settings.database_id, "notion.database_id")?.to_string(),
            )
        };
        Ok(Self {
            client,
            pages_url: format!("{}/pages", settings.base_url.trim_end_matches('/')),
            secret,
            database_id,
            version: settings.version.clone(),
            dry_run,
        })
    }
}

#[async_trait]
impl LinkSink for NotionWriter {
    async fn write(&mut self, link: &PaperLink) -> Result<WriteOutcome> {
        link.validate()?;
        let payload = page_payload(&self.database_id, link);

        if self.dry_run {
            let pretty = serde_json::to_string_pretty(&payload)?;
            info!(title = %link.title, "Dry run, page not created");
            println!("Dry run:\n{}", pretty);
            return Ok(WriteOutcome::DryRun);
        }

        let resp = self
            .client
            .post(&self.pages_url)
            .bearer_auth(&self.secret)
            .header("Notion-Version", &self.version)
            .json(&payload)
            .send()
            .await?;
        let page: Value = check_status(resp).await?.json().await?;
        let page_id = created_page_id(&page);
        info!(title = %link.title, page_id, "Created Notion page");
        Ok(WriteOutcome::Written)
    }
}
