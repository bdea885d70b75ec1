//! Per-server log files: writing, enumeration, pruning, tailing and display

pub mod follow;
pub mod store;
pub mod viewer;
pub mod writer;

pub use follow::{follow, FollowedLine, StartAt};
pub use store::{tail_last, LogFile, LogStore, PrunePlan, PruneReport, Removal, RemovalKind};
pub use viewer::{parse_lines, sort_entries, LogEntry, Palette};
pub use writer::RotatingWriter;
