use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{HistoryRecord, HistoryStatus};

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: Uuid,
    pub original_url: String,
    pub restored_url: Option<String>,
    pub colorized_url: Option<String>,
    pub status: HistoryStatus,
    pub created_at: OffsetDateTime,
}

impl From<HistoryRecord> for HistoryItem {
    fn from(r: HistoryRecord) -> Self {
        Self {
            id: r.id,
            original_url: r.original_url,
            restored_url: r.restored_url,
            colorized_url: r.colorized_url,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let item = HistoryItem {
            id: Uuid::new_v4(),
            original_url: "https://fake.local/in.jpg".into(),
            restored_url: Some("https://fake.local/out.jpg".into()),
            colorized_url: None,
            status: HistoryStatus::Done,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"status\":\"done\""));
        assert!(json.contains("\"colorized_url\":null"));
    }

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }
}
