use crate::records::Record;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Number of body characters that take part in the fingerprint
const BODY_PREFIX_CHARS: usize = 100;

/// Stable identity of a review
///
/// Two reviews with the same body opening, author and date text are treated as the same
/// review. Edits past the first hundred characters do not change identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a record
    ///
    /// # Examples
    ///
    /// ```
    /// use review_sweep::records::{Fingerprint, Record};
    ///
    /// let record = Record {
    ///     title: "Solid".to_string(),
    ///     body: "Works as described.".to_string(),
    ///     author: "Sam".to_string(),
    ///     date: Some("June 1, 2024".to_string()),
    ///     rating: None,
    /// };
    /// let mut retitled = record.clone();
    /// retitled.title = "Changed".to_string();
    ///
    /// assert_eq!(Fingerprint::of(&record), Fingerprint::of(&retitled));
    /// ```
    pub fn of(record: &Record) -> Self {
        let body: String = record.body.trim().chars().take(BODY_PREFIX_CHARS).collect();
        let date = record.date.as_deref().unwrap_or("").trim();

        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hasher.update("\u{1f}".as_bytes());
        hasher.update(record.author.trim().as_bytes());
        hasher.update("\u{1f}".as_bytes());
        hasher.update(date.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already computed hex digest
    pub fn from_hex(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record paired with its fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprinted {
    pub fingerprint: Fingerprint,
    pub record: Record,
}

impl Fingerprinted {
    pub fn new(record: Record) -> Self {
        Self {
            fingerprint: Fingerprint::of(&record),
            record,
        }
    }
}

impl AsRef<Record> for Fingerprinted {
    fn as_ref(&self) -> &Record {
        &self.record
    }
}

/// Drops records whose fingerprint is in `seen` or repeats earlier on the same page
///
/// Returns the surviving records in page order and the number dropped. `seen` is not
/// modified; callers remember a fingerprint only once its record is actually emitted.
pub fn partition_unseen(
    records: Vec<Record>,
    seen: &HashSet<Fingerprint>,
) -> (Vec<Fingerprinted>, usize) {
    let total = records.len();
    let mut on_page = HashSet::new();

    let fresh: Vec<Fingerprinted> = records
        .into_iter()
        .map(Fingerprinted::new)
        .filter(|item| {
            let unseen = !seen.contains(&item.fingerprint);
            let first_on_page = on_page.insert(item.fingerprint.clone());
            if !(unseen && first_on_page) {
                tracing::trace!("Dropping duplicate record {}", item.fingerprint);
            }
            unseen && first_on_page
        })
        .collect();

    let dropped = total - fresh.len();
    (fresh, dropped)
}
