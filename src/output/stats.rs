//! Status reporting from the crawl database
//!
//! This module gathers the persisted session, the queue and the stored review counts and
//! prints them for the `status` command.

use crate::crawler::QueueEntry;
use crate::output::SqliteSink;
use crate::state::CrawlSession;
use crate::storage::{load_json, SharedStore, QUEUE_KEY, SESSION_KEY};
use crate::SweepError;

/// Everything the status command shows
#[derive(Debug, Clone)]
pub struct SweepStatistics {
    /// The most recent session, live or finished
    pub session: Option<CrawlSession>,

    /// Targets still waiting, in crawl order
    pub queue: Vec<QueueEntry>,

    /// Stored reviews per target
    pub reviews_by_target: Vec<(String, u64)>,
}

impl SweepStatistics {
    pub fn total_reviews(&self) -> u64 {
        self.reviews_by_target.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The key-value store holding session and queue
/// * `sink` - The review table
///
/// # Returns
///
/// * `Ok(SweepStatistics)` - Successfully loaded statistics
/// * `Err(SweepError)` - Failed to query storage
pub fn load_statistics(
    store: &SharedStore,
    sink: &SqliteSink,
) -> Result<SweepStatistics, SweepError> {
    Ok(SweepStatistics {
        session: load_json(store, SESSION_KEY)?,
        queue: load_json(store, QUEUE_KEY)?.unwrap_or_default(),
        reviews_by_target: sink.count_by_target()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SweepStatistics) {
    println!("=== Review-Sweep Status ===\n");

    match &stats.session {
        Some(session) => {
            println!("Session:");
            println!("  Target: {} ({})", session.target_id, session.source);
            println!("  Mode: {}", session.mode);
            println!("  Status: {}", session.status);
            match session.total_pages {
                Some(total) => println!("  Page: {} of ~{}", session.current_page, total),
                None => println!("  Page: {}", session.current_page),
            }
            println!("  Collected: {}", session.collected_count);
            println!(
                "  Dropped: {} duplicates, {} older than watermark",
                session.duplicates_dropped, session.stale_dropped
            );
            if session.incremental_only {
                match session.watermark_date {
                    Some(date) => println!("  Incremental since: {}", date),
                    None => println!("  Incremental since: (no watermark)"),
                }
            }
            if let Some(queue) = &session.queue_name {
                println!("  Queue: {}", queue);
            }
            println!("  Started: {}", session.started_at.to_rfc3339());
            if let Some(finished) = session.finished_at {
                println!("  Finished: {}", finished.to_rfc3339());
            }
            if let Some(reason) = &session.last_error {
                println!("  Note: {}", reason);
            }
        }
        None => println!("Session: none"),
    }
    println!();

    println!("Queue ({}):", stats.queue.len());
    for (position, entry) in stats.queue.iter().enumerate() {
        let title = entry.title.as_deref().unwrap_or("");
        println!("  {}. {} {}", position + 1, entry.url, title);
    }
    println!();

    println!("Stored reviews: {}", stats.total_reviews());
    for (target, count) in &stats.reviews_by_target {
        println!("  {}: {}", target, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CrawlMode;
    use crate::storage::{save_json, shared, MemoryStore};

    #[test]
    fn test_load_statistics() {
        let store = shared(MemoryStore::new());
        let sink = SqliteSink::new_in_memory().unwrap();
        let session = CrawlSession::new("B00TEST123", "shop", CrawlMode::Fetch);
        save_json(&store, SESSION_KEY, &session).unwrap();

        let stats = load_statistics(&store, &sink).unwrap();
        assert_eq!(stats.session, Some(session));
        assert!(stats.queue.is_empty());
        assert_eq!(stats.total_reviews(), 0);
    }
}
