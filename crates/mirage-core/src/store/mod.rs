//! External store accessors.
//!
//! Two stores back the pipeline: an ordered list store (active rules, raw
//! attack log, block log, patch history) and a relational forensic store.
//! Both are injected as collaborators, constructed once at process start.

mod accessor;
mod forensic;
mod list;

pub use accessor::{DefenseStore, StoreCounts};
pub use forensic::{EngagementRow, ForensicStore, CATEGORY_BLOCKED, CATEGORY_DECEPTION};
pub use list::{FileListStore, ListStore, MemoryListStore};
