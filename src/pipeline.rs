//! Source → filter → sink → relocate, one record at a time.
//!
//! A record is relocated only after its write returned successfully, and
//! records the filter rejects are left untouched on the source.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::filter::{hostname, SiteFilter};
use crate::model::PaperLink;
use crate::reader::LinkSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    DryRun,
}

#[async_trait]
pub trait LinkSink: Send {
    async fn write(&mut self, link: &PaperLink) -> Result<WriteOutcome>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub seen: usize,
    pub skipped: usize,
    pub written: usize,
    pub relocated: usize,
}

pub async fn run<S, K>(
    source: &mut S,
    filter: &SiteFilter,
    sink: &mut K,
    interval: Duration,
) -> Result<RunStats>
where
    S: LinkSource + ?Sized,
    K: LinkSink + ?Sized,
{
    let mut stats = RunStats::default();

    while let Some(record) = source.next().await? {
        stats.seen += 1;
        let link = &record.link;

        if !filter.accepts(&link.url) {
            info!(
                host = hostname(&link.url).as_deref().unwrap_or("?"),
                url = %link.url,
                "Skip"
            );
            stats.skipped += 1;
            continue;
        }

        if stats.written > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        println!("{}: {}", link.title, link.url);
        match sink.write(link).await {
            Ok(WriteOutcome::Written) => {
                stats.written += 1;
                if source.relocate(&record).await? {
                    stats.relocated += 1;
                }
            }
            // nothing was written, so the source keeps the record
            Ok(WriteOutcome::DryRun) => stats.written += 1,
            Err(e) => {
                warn!(title = %link.title, error = %e, "Write failed, aborting run");
                return Err(e);
            }
        }
    }

    info!(
        seen = stats.seen,
        skipped = stats.skipped,
        written = stats.written,
        relocated = stats.relocated,
        "Run finished"
    );
    Ok(stats)
}
