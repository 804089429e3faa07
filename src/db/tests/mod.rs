use crate::db::*;
use crate::types::{FeedItem, FetchOutcome, FetchedInfo, PersistenceBatch, SourceId};
use tempfile::NamedTempFile;


/// Helper: create a fresh database with migrations applied
async fn setup_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

/// Helper: insert a subscription with a predictable URL, returning its ID
async fn insert_test_subscription(db: &Database, name: &str) -> SourceId {
    db.add_subscription(&NewSubscription {
        service_id: 0,
        url: format!("https://example.com/{}", name.to_lowercase()),
        name: name.to_string(),
    })
    .await
    .unwrap()
}

fn feed_item(url: &str, published_at: Option<chrono::DateTime<chrono::Utc>>) -> FeedItem {
    FeedItem {
        url: url.to_string(),
        title: format!("Title of {}", url),
        uploader: Some("uploader".to_string()),
        published_at,
    }
}

fn success(source_id: SourceId, items: Vec<FeedItem>) -> FetchOutcome {
    FetchOutcome::Success {
        source_id,
        info: FetchedInfo {
            name: String::new(),
            items,
            ..FetchedInfo::default()
        },
    }
}

fn batch_of(outcomes: Vec<FetchOutcome>) -> PersistenceBatch {
    let mut batch = PersistenceBatch::default();
    for outcome in outcomes {
        batch.push(outcome);
    }
    batch
}
