//! Records and the filters applied to them before they are emitted
//!
//! # Components
//!
//! - `RecordExtractor` / `SelectorExtractor`: read reviews out of a listing page
//! - `Fingerprint` / `partition_unseen`: stable identity and duplicate removal
//! - `IncrementalFilter` / `normalize_date`: drop reviews older than a watermark

mod extractor;
mod fingerprint;
mod incremental;

pub(crate) use extractor::element_text;
pub use extractor::{RecordExtractor, SelectorExtractor};
pub use fingerprint::{partition_unseen, Fingerprint, Fingerprinted};
pub use incremental::{normalize_date, IncrementalFilter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One review as read from a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub body: String,
    pub author: String,
    /// Date text exactly as shown on the page
    pub date: Option<String>,
    pub rating: Option<String>,
}

impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}

/// A record tagged with where and when it was collected
///
/// The record content is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedRecord {
    #[serde(flatten)]
    pub record: Record,
    pub fingerprint: Fingerprint,
    pub target_id: String,
    pub source: String,
    pub collected_at: DateTime<Utc>,
}

impl CollectedRecord {
    pub fn new(item: Fingerprinted, target_id: &str, source: &str) -> Self {
        Self {
            record: item.record,
            fingerprint: item.fingerprint,
            target_id: target_id.to_string(),
            source: source.to_string(),
            collected_at: Utc::now(),
        }
    }
}
