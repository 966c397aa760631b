//! Segment compaction.
//!
//! [`merger`] combines two segments into one; [`scheduler`] decides which
//! segments to combine and runs the merges on background threads.

pub mod merger;
pub mod scheduler;

pub use merger::{MergeStats, SegmentMerger, merge_segments};
pub use scheduler::{MergeScheduler, SchedulerStats};
