//! Lazy record sources.
//!
//! A source hands out one record at a time and is told afterwards, record by
//! record, when it may mark that record as processed. Reading never has a side
//! effect on the remote store; only `relocate` does.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::PaperLink;
use crate::raindrop::RaindropApi;

/// Identifies where a record came from so it can be relocated later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKey {
    Raindrop(i64),
    /// 1-based spreadsheet row as read at the start of the run
    SheetRow(usize),
}

#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub key: SourceKey,
    pub link: PaperLink,
}

#[async_trait]
pub trait LinkSource: Send {
    /// Next record, or None once the source is exhausted.
    async fn next(&mut self) -> Result<Option<SourceRecord>>;

    /// Mark a record as processed on the remote side. False when the source keeps it.
    async fn relocate(&mut self, record: &SourceRecord) -> Result<bool>;
}

/// What happens to a bookmark once it has been written downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Keep,
    MoveTo(String),
    Delete,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Keep,
    Move(i64),
    Delete,
}

pub struct RaindropReader<A: RaindropApi> {
    api: A,
    collection_id: i64,
    target: Target,
    page_size: u32,
    limit: usize,
    page: u32,
    buffer: VecDeque<SourceRecord>,
    /// Ids of every bookmark fetched so far, with or without a link
    seen: HashSet<i64>,
    /// Bookmarks moved or deleted out of the source collection this run
    relocated: usize,
    yielded: usize,
    exhausted: bool,
}

impl<A: RaindropApi> RaindropReader<A> {
    /// Resolves collection names up front, so a missing name fails before any page is read.
    pub async fn open(
        api: A,
        collection: &str,
        relocation: Relocation,
        page_size: u32,
        limit: usize,
    ) -> Result<Self> {
        let collection_id = api.collection_id(collection).await?;
        info!(collection, collection_id, "Reading raindrop collection");

        let target = match relocation {
            Relocation::Keep => Target::Keep,
            Relocation::MoveTo(name) => {
                let id = api.collection_id(&name).await?;
                info!(collection = %name, collection_id = id, "Processed bookmarks will be moved");
                Target::Move(id)
            }
            Relocation::Delete => Target::Delete,
        };

        Ok(Self {
            api,
            collection_id,
            target,
            page_size: page_size.max(1),
            limit,
            page: 0,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            relocated: 0,
            yielded: 0,
            exhausted: limit == 0,
        })
    }

    /// Relocated bookmarks leave the collection and pull later ones forward,
    /// so the page is derived from how many seen bookmarks are still there.
    /// That page may repeat some of them; `seen` filters those out.
    fn next_page(&self) -> u32 {
        match self.target {
            Target::Keep => self.page,
            Target::Move(_) | Target::Delete => {
                let remaining = self.seen.len() - self.relocated;
                (remaining / self.page_size as usize) as u32
            }
        }
    }

    async fn fill(&mut self) -> Result<()> {
        while self.buffer.is_empty() && !self.exhausted {
            let page = self.next_page();
            let items = self.api.raindrops(self.collection_id, page, self.page_size).await?;
            if items.is_empty() {
                debug!(page, "Empty page, stopping");
                self.exhausted = true;
                break;
            }
            self.page = page + 1;

            let mut fresh = 0;
            for item in items {
                if !self.seen.insert(item.id) {
                    continue;
                }
                fresh += 1;
                match item.to_paper_link() {
                    Some(link) => self.buffer.push_back(SourceRecord {
                        key: SourceKey::Raindrop(item.id),
                        link,
                    }),
                    None => debug!(id = item.id, title = %item.title, "Skipping bookmark without link"),
                }
            }
            if fresh == 0 {
                debug!(page, "Only already seen bookmarks left, stopping");
                self.exhausted = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<A: RaindropApi> LinkSource for RaindropReader<A> {
    async fn next(&mut self) -> Result<Option<SourceRecord>> {
        if self.yielded >= self.limit {
            return Ok(None);
        }
        self.fill().await?;
        let record = self.buffer.pop_front();
        if record.is_some() {
            self.yielded += 1;
        }
        Ok(record)
    }

    async fn relocate(&mut self, record: &SourceRecord) -> Result<bool> {
        let SourceKey::Raindrop(id) = record.key else {
            return Ok(false);
        };
        match self.target {
            Target::Keep => return Ok(false),
            Target::Move(collection_id) => {
                self.api.move_raindrop(id, collection_id).await?;
                self.relocated += 1;
                info!(id, collection_id, "Moved bookmark");
            }
            Target::Delete => {
                self.api.delete_raindrop(id).await?;
                self.relocated += 1;
                info!(id, "Deleted bookmark");
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::raindrop::{Collection, Raindrop};
    use std::sync::{Arc, Mutex};

    /// In-memory Raindrop with a call log.
    ///
    /// `pages` are served as given. A `live` fake instead slices one list
    /// into pages and really removes moved or deleted bookmarks from it.
    #[derive(Clone, Default)]
    pub struct FakeRaindrop {
        pub collections: Vec<Collection>,
        pub pages: Vec<Vec<Raindrop>>,
        pub live: Option<Arc<Mutex<Vec<Raindrop>>>>,
        /// Every page request answers with HTTP 500
        pub failing: bool,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRaindrop {
        pub fn with_pages(pages: Vec<Vec<Raindrop>>) -> Self {
            Self {
                collections: vec![
                    Collection { id: 10, title: "論文/unread".into(), count: 0 },
                    Collection { id: 20, title: "論文/read".into(), count: 0 },
                ],
                pages,
                ..Self::default()
            }
        }

        pub fn live(items: Vec<Raindrop>) -> Self {
            Self {
                live: Some(Arc::new(Mutex::new(items))),
                ..Self::with_pages(vec![])
            }
        }

        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::with_pages(vec![])
            }
        }

        pub fn log(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Ids still in the source collection of a live fake.
        pub fn remaining(&self) -> Vec<i64> {
            self.live
                .as_ref()
                .map(|l| l.lock().unwrap().iter().map(|r| r.id).collect())
                .unwrap_or_default()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn take_out(&self, id: i64) {
            if let Some(live) = &self.live {
                live.lock().unwrap().retain(|r| r.id != id);
            }
        }
    }

    #[async_trait]
    impl RaindropApi for FakeRaindrop {
        async fn collections(&self) -> Result<Vec<Collection>> {
            self.record("collections".into());
            Ok(self.collections.clone())
        }

        async fn raindrops(&self, collection_id: i64, page: u32, per_page: u32) -> Result<Vec<Raindrop>> {
            self.record(format!("page {} {} {}", collection_id, page, per_page));
            if self.failing {
                return Err(Error::Http {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    url: format!("https://api.raindrop.io/rest/v1/raindrops/{}", collection_id),
                    body: "{}".into(),
                });
            }
            if let Some(live) = &self.live {
                let items = live.lock().unwrap();
                let start = page as usize * per_page as usize;
                return Ok(items.iter().skip(start).take(per_page as usize).cloned().collect());
            }
            Ok(self.pages.get(page as usize).cloned().unwrap_or_default())
        }

        async fn move_raindrop(&self, id: i64, collection_id: i64) -> Result<()> {
            self.record(format!("move {} {}", id, collection_id));
            self.take_out(id);
            Ok(())
        }

        async fn delete_raindrop(&self, id: i64) -> Result<()> {
            self.record(format!("delete {}", id));
            self.take_out(id);
            Ok(())
        }
    }

    pub fn bookmark(id: i64, link: Option<&str>) -> Raindrop {
        Raindrop {
            id,
            title: format!("Paper {}", id),
            link: link.map(str::to_string),
            excerpt: String::new(),
            note: String::new(),
            tags: vec![],
            created: None,
        }
    }

    async fn drain<S: LinkSource>(source: &mut S) -> Vec<SourceRecord> {
        let mut out = Vec::new();
        while let Some(r) = source.next().await.unwrap() {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn two_items_then_empty_page() {
        let api = FakeRaindrop::with_pages(vec![vec![
            bookmark(1, Some("https://arxiv.org/abs/1")),
            bookmark(2, Some("https://arxiv.org/abs/2")),
        ]]);
        let mut reader = RaindropReader::open(api.clone(), "論文/unread", Relocation::Keep, 20, 10)
            .await
            .unwrap();

        let records = drain(&mut reader).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, SourceKey::Raindrop(1));
        assert_eq!(records[1].key, SourceKey::Raindrop(2));
        // exhausted reader stays exhausted
        assert!(reader.next().await.unwrap().is_none());
        assert_eq!(api.log(), vec!["collections", "page 10 0 20", "page 10 1 20"]);
    }

    #[tokio::test]
    async fn skips_bookmarks_without_link() {
        let api = FakeRaindrop::with_pages(vec![vec![
            bookmark(1, None),
            bookmark(2, Some("https://openreview.net/forum?id=a")),
            bookmark(3, None),
        ]]);
        let mut reader = RaindropReader::open(api, "論文/unread", Relocation::Keep, 20, 10)
            .await
            .unwrap();
        let records = drain(&mut reader).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].link.url, "https://openreview.net/forum?id=a");
    }

    #[tokio::test]
    async fn limit_stops_paging() {
        let api = FakeRaindrop::with_pages(vec![
            vec![bookmark(1, Some("https://a.org")), bookmark(2, Some("https://b.org"))],
            vec![bookmark(3, Some("https://c.org")), bookmark(4, Some("https://d.org"))],
            vec![bookmark(5, Some("https://e.org"))],
        ]);
        let mut reader = RaindropReader::open(api.clone(), "論文/unread", Relocation::Keep, 2, 3)
            .await
            .unwrap();
        let records = drain(&mut reader).await;
        assert_eq!(records.len(), 3);
        assert!(!api.log().contains(&"page 10 2 2".to_string()));
    }

    #[tokio::test]
    async fn reading_never_relocates() {
        let api = FakeRaindrop::with_pages(vec![vec![bookmark(1, Some("https://arxiv.org/abs/1"))]]);
        let mut reader = RaindropReader::open(
            api.clone(),
            "論文/unread",
            Relocation::MoveTo("論文/read".into()),
            20,
            10,
        )
        .await
        .unwrap();
        let records = drain(&mut reader).await;
        assert!(api.log().iter().all(|c| !c.starts_with("move")));

        reader.relocate(&records[0]).await.unwrap();
        assert_eq!(api.log().last().unwrap(), "move 1 20");
    }

    #[tokio::test]
    async fn delete_relocation() {
        let api = FakeRaindrop::with_pages(vec![vec![bookmark(7, Some("https://arxiv.org/abs/7"))]]);
        let mut reader = RaindropReader::open(api.clone(), "論文/unread", Relocation::Delete, 20, 10)
            .await
            .unwrap();
        let record = reader.next().await.unwrap().unwrap();
        reader.relocate(&record).await.unwrap();
        assert_eq!(api.log().last().unwrap(), "delete 7");
    }

    #[tokio::test]
    async fn missing_collection_fails_before_paging() {
        let api = FakeRaindrop::with_pages(vec![vec![bookmark(1, Some("https://arxiv.org/abs/1"))]]);
        let err = RaindropReader::open(api.clone(), "論文/missing", Relocation::Keep, 20, 10)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::CollectionNotFound(name) if name == "論文/missing"));
        assert!(api.log().iter().all(|c| !c.starts_with("page")));
    }

    #[tokio::test]
    async fn missing_destination_fails_before_paging() {
        let api = FakeRaindrop::with_pages(vec![]);
        let err = RaindropReader::open(
            api.clone(),
            "論文/unread",
            Relocation::MoveTo("論文/archive".into()),
            20,
            10,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, Error::CollectionNotFound(_)));
        assert!(api.log().iter().all(|c| !c.starts_with("page")));
    }

    #[tokio::test]
    async fn moving_while_paging_reaches_every_bookmark() {
        let api = FakeRaindrop::live((1..=6).map(|i| bookmark(i, Some("https://arxiv.org/abs/x"))).collect());
        let mut reader = RaindropReader::open(
            api.clone(),
            "論文/unread",
            Relocation::MoveTo("論文/read".into()),
            2,
            10,
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        while let Some(record) = reader.next().await.unwrap() {
            reader.relocate(&record).await.unwrap();
            ids.push(record.key);
        }
        assert_eq!(ids, (1..=6).map(SourceKey::Raindrop).collect::<Vec<_>>());
        assert!(api.remaining().is_empty());
    }

    #[tokio::test]
    async fn deleting_around_kept_bookmarks_skips_nothing() {
        // 2 and 4 have no link, so they stay in the collection
        let api = FakeRaindrop::live(vec![
            bookmark(1, Some("https://a.org")),
            bookmark(2, None),
            bookmark(3, Some("https://c.org")),
            bookmark(4, None),
            bookmark(5, Some("https://e.org")),
        ]);
        let mut reader = RaindropReader::open(api.clone(), "論文/unread", Relocation::Delete, 2, 10)
            .await
            .unwrap();

        let mut ids = Vec::new();
        while let Some(record) = reader.next().await.unwrap() {
            reader.relocate(&record).await.unwrap();
            ids.push(record.key);
        }
        assert_eq!(ids, vec![SourceKey::Raindrop(1), SourceKey::Raindrop(3), SourceKey::Raindrop(5)]);
        assert_eq!(api.remaining(), vec![2, 4]);
    }

    #[tokio::test]
    async fn failing_page_surfaces_http_error() {
        let api = FakeRaindrop::failing();
        let mut reader = RaindropReader::open(api, "論文/unread", Relocation::Keep, 20, 10)
            .await
            .unwrap();
        let err = reader.next().await.unwrap_err();
        assert!(matches!(err, Error::Http { status, .. } if status.as_u16() == 500));
    }
}
