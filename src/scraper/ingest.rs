use crate::feed::{parse_pub_date, ParsedFeed, ParsedItem};
use crate::storage::{DatabaseError, Feed, NewPost, PostInsert};

use super::FeedGateway;

/// Per-batch counters for one ingested document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub created: usize,
    /// Items whose URL was already stored
    pub duplicates: usize,
    /// Items without a link or with an unparseable publish date
    pub unparseable: usize,
    /// Items whose insert failed for a reason other than a lost connection
    pub failed: usize,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.duplicates + self.unparseable
    }

    pub fn total(&self) -> usize {
        self.created + self.duplicates + self.unparseable + self.failed
    }
}

/// Store every item of `doc` as a post of `feed`.
///
/// Items are handled independently: a bad date, a duplicate URL or a failed
/// insert only affects that item. The batch aborts only when the database
/// connection is lost, since no later insert could succeed either.
pub async fn ingest<G: FeedGateway>(
    gateway: &G,
    feed: &Feed,
    doc: &ParsedFeed,
) -> Result<IngestReport, DatabaseError> {
    let mut report = IngestReport::default();

    for item in &doc.items {
        let Some(post) = build_post(feed, item) else {
            report.unparseable += 1;
            continue;
        };

        match gateway.create_post(&post).await {
            Ok(PostInsert::Created(_)) => report.created += 1,
            Ok(PostInsert::Duplicate) => report.duplicates += 1,
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %post.url,
                    error = %e,
                    "Failed to store post, skipping"
                );
                report.failed += 1;
            }
        }
    }

    tracing::debug!(
        feed_id = feed.id,
        created = report.created,
        duplicates = report.duplicates,
        unparseable = report.unparseable,
        failed = report.failed,
        "Ingested feed items"
    );
    Ok(report)
}

fn build_post(feed: &Feed, item: &ParsedItem) -> Option<NewPost> {
    let url = item.link.trim();
    if url.is_empty() {
        tracing::debug!(feed_id = feed.id, title = %item.title, "Item has no link, skipping");
        return None;
    }

    let published_at = match parse_pub_date(&item.pub_date) {
        Ok(date) => date,
        Err(e) => {
            tracing::debug!(feed_id = feed.id, url = %url, error = %e, "Skipping item");
            return None;
        }
    };

    let description = item.description.trim();
    Some(NewPost {
        feed_id: feed.id,
        title: item.title.clone(),
        url: url.to_string(),
        description: (!description.is_empty()).then(|| description.to_string()),
        published_at,
    })
}
