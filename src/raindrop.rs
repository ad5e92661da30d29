use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::RaindropSettings;
use crate::error::{check_status, Error, Result};
use crate::model::{priority_from_note, PaperLink};

// ── Wire types ──

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    #[serde(rename = "_id")]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Raindrop {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub link: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

impl Raindrop {
    /// None when the bookmark has no link.
    pub fn to_paper_link(&self) -> Option<PaperLink> {
        let url = self.link.clone()?;
        let note = if self.excerpt.is_empty() {
            self.note.clone()
        } else {
            self.excerpt.clone()
        };
        Some(PaperLink {
            title: self.title.clone(),
            url,
            tags: self.tags.clone(),
            priority: priority_from_note(&self.excerpt),
            note,
            created_at: self.created,
        })
    }
}

// ── API ──

#[async_trait]
pub trait RaindropApi: Send + Sync {
    async fn collections(&self) -> Result<Vec<Collection>>;

    /// One page of a collection, newest first. Pages start at 0.
    async fn raindrops(&self, collection_id: i64, page: u32, per_page: u32) -> Result<Vec<Raindrop>>;

    async fn move_raindrop(&self, id: i64, collection_id: i64) -> Result<()>;

    async fn delete_raindrop(&self, id: i64) -> Result<()>;

    async fn collection_id(&self, name: &str) -> Result<i64> {
        self.collections()
            .await?
            .into_iter()
            .find(|c| c.title == name)
            .map(|c| c.id)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }
}

pub struct RaindropClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RaindropClient {
    pub fn new(client: reqwest::Client, settings: &RaindropSettings, token: String) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl RaindropApi for RaindropClient {
    async fn collections(&self) -> Result<Vec<Collection>> {
        let url = format!("{}/collections", self.base_url);
        let resp = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let body: Items<Collection> = check_status(resp).await?.json().await?;
        Ok(body.items)
    }

    async fn raindrops(&self, collection_id: i64, page: u32, per_page: u32) -> Result<Vec<Raindrop>> {
        let url = format!("{}/raindrops/{}", self.base_url, collection_id);
        debug!(collection_id, page, per_page, "Fetching raindrops");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("perpage", per_page.to_string()),
                ("page", page.to_string()),
                ("sort", "-created".to_string()),
            ])
            .send()
            .await?;
        let body: Items<Raindrop> = check_status(resp).await?.json().await?;
        Ok(body.items)
    }

    async fn move_raindrop(&self, id: i64, collection_id: i64) -> Result<()> {
        let url = format!("{}/raindrop/{}", self.base_url, id);
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "collection": { "$id": collection_id } }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn delete_raindrop(&self, id: i64) -> Result<()> {
        let url = format!("{}/raindrop/{}", self.base_url, id);
        let resp = self.client.delete(&url).bearer_auth(&self.token).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_page() {
        let raw = r#"{"result":true,"items":[
            {"_id":101,"title":"Attention","link":"https://arxiv.org/abs/1706.03762",
             "excerpt":"p1 must read","note":"","tags":["nlp"],"created":"2025-01-05T10:20:30.123Z"},
            {"_id":102,"title":"No link here","excerpt":""}
        ]}"#;
        let page: Items<Raindrop> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.items.len(), 2);

        let link = page.items[0].to_paper_link().unwrap();
        assert_eq!(link.url, "https://arxiv.org/abs/1706.03762");
        assert_eq!(link.priority, 1);
        assert_eq!(link.tags, vec!["nlp".to_string()]);
        assert_eq!(link.note, "p1 must read");
        assert_eq!(
            link.created_at.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2025-01-05 10:20:30"
        );

        assert!(page.items[1].to_paper_link().is_none());
    }

    #[test]
    fn note_falls_back_when_excerpt_empty() {
        let r = Raindrop {
            id: 1,
            title: "T".into(),
            link: Some("https://openreview.net/forum?id=x".into()),
            excerpt: String::new(),
            note: "p4 skim".into(),
            tags: vec![],
            created: None,
        };
        let link = r.to_paper_link().unwrap();
        assert_eq!(link.note, "p4 skim");
        // priority only comes from the excerpt
        assert_eq!(link.priority, 3);
    }

    #[test]
    fn parse_collections() {
        let raw = r#"{"items":[{"_id":1,"title":"論文/unread","count":4},{"_id":2,"title":"論文/read"}]}"#;
        let body: Items<Collection> = serde_json::from_str(raw).unwrap();
        assert_eq!(body.items[0].id, 1);
        assert_eq!(body.items[0].count, 4);
        assert_eq!(body.items[1].count, 0);
    }
}
