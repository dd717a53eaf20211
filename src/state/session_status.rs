//! Session status and crawl mode definitions
//!
//! A session moves forward through these statuses and never returns to an earlier one, with
//! two exceptions: a redirect settles into collection, and collection alternates with the
//! pause between pages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents where a crawl session currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created but not started
    Idle,

    /// The context was sent from the target's parent page to its first listing page
    Redirecting,

    /// A listing page is being read
    Collecting,

    /// Waiting out the delay before the next listing page
    Paginating,

    // ===== Terminal States =====
    /// No more pages, the watermark was reached, or nothing could be extracted
    Completed,

    /// Stopped on request
    Stopped,

    /// Transport failure or verification challenge
    Failed,
}

impl SessionStatus {
    /// Returns true if the session can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// Returns true while a crawl is in progress for the session
    ///
    /// A live session blocks a new start unless preemption is forced.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Redirecting | Self::Collecting | Self::Paginating)
    }

    /// Checks whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        match (self, next) {
            (Idle, Redirecting | Collecting | Stopped | Failed) => true,
            (Redirecting, Collecting | Stopped | Failed) => true,
            (Collecting, Paginating | Completed | Stopped | Failed) => true,
            (Paginating, Collecting | Completed | Stopped | Failed) => true,
            _ => false,
        }
    }

    /// Converts the status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Redirecting => "redirecting",
            Self::Collecting => "collecting",
            Self::Paginating => "paginating",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stored string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "redirecting" => Some(Self::Redirecting),
            "collecting" => Some(Self::Collecting),
            "paginating" => Some(Self::Paginating),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How successive listing pages are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Each page is a new execution context; state is handed over through the store
    Navigation,

    /// Pages are retrieved in-process
    Fetch,
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation => write!(f, "navigation"),
            Self::Fetch => write!(f, "fetch"),
        }
    }
}
