//! Output module: where collected records and session events go
//!
//! This module handles:
//! - Storing collected reviews (`SqliteSink`, `MemorySink`)
//! - Reporting session progress to observers
//! - Printing status for the command line

mod observers;
mod sqlite_sink;
pub mod stats;
mod traits;

pub use observers::{ChannelObserver, ObserverSet, TracingObserver};
pub use sqlite_sink::{MemorySink, SqliteSink};
pub use stats::{load_statistics, print_statistics, SweepStatistics};
pub use traits::{
    LogLevel, RecordSink, SessionEvent, SessionObserver, SessionSnapshot, SinkError, SinkResult,
};
