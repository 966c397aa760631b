//! Concurrent merge scheduling.
//!
//! Flushed segments queue up in FIFO order. Whenever two or more are queued
//! and a merge slot is free, the two oldest are handed to a merge task on its
//! own thread. A finished task reports its output over a channel and the
//! output rejoins the back of the queue. Draining runs merges until exactly
//! one segment is left.
//!
//! Only the thread that owns the scheduler touches the queue and the task
//! registry; merge threads only send their result.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::config::IndexConfig;
use crate::error::{HashdexError, Result};
use crate::merge::merger::{MergeStats, merge_segments};
use crate::segment::{self, Segment};
use crate::storage::Storage;

/// Scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Flushed segments handed to the scheduler.
    pub segments_submitted: u64,
    pub merges_started: u64,
    pub merges_completed: u64,
}

struct Completion {
    task_id: u64,
    result: Result<(Segment, MergeStats)>,
}

/// Queues segments and runs merge tasks over them.
pub struct MergeScheduler {
    storage: Arc<dyn Storage>,
    table_size: u64,
    max_concurrent_merges: usize,
    max_pending_segments: usize,

    pending: VecDeque<Segment>,
    /// In-flight merge tasks by task id.
    running: HashMap<u64, thread::JoinHandle<()>>,
    completion_sender: Sender<Completion>,
    completion_receiver: Receiver<Completion>,

    next_segment_id: u64,
    next_task_id: u64,
    failed: bool,
    stats: SchedulerStats,
}

impl std::fmt::Debug for MergeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeScheduler")
            .field("pending", &self.pending.len())
            .field("running", &self.running.len())
            .field("failed", &self.failed)
            .field("stats", &self.stats)
            .finish()
    }
}

impl MergeScheduler {
    pub fn new(storage: Arc<dyn Storage>, config: &IndexConfig) -> Self {
        let (completion_sender, completion_receiver) = unbounded();
        MergeScheduler {
            storage,
            table_size: config.table_size,
            max_concurrent_merges: config.max_concurrent_merges.max(1),
            max_pending_segments: config.max_pending_segments.max(2),
            pending: VecDeque::new(),
            running: HashMap::new(),
            completion_sender,
            completion_receiver,
            next_segment_id: 0,
            next_task_id: 0,
            failed: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Create a new, empty intermediate segment with a fresh name.
    pub fn create_segment(&mut self) -> Result<Segment> {
        let name = segment::segment_name(self.next_segment_id);
        self.next_segment_id += 1;
        Segment::create(Arc::clone(&self.storage), &name, self.table_size)
    }

    /// Queue a flushed segment and start whatever merges are possible.
    ///
    /// Blocks while more than `max_pending_segments` segments are queued,
    /// until running merges bring the queue back under the bound.
    pub fn submit(&mut self, segment: Segment) -> Result<()> {
        self.check_healthy()?;
        log::debug!("Queued {} for merging", segment.name());
        self.pending.push_back(segment);
        self.stats.segments_submitted += 1;

        self.poll()?;
        self.start_merges()?;
        while self.pending.len() > self.max_pending_segments {
            log::debug!(
                "{} segments pending, waiting for one of {} merges",
                self.pending.len(),
                self.running.len()
            );
            self.wait_one()?;
            self.start_merges()?;
        }
        Ok(())
    }

    /// Collect finished merges without blocking.
    pub fn poll(&mut self) -> Result<()> {
        while let Ok(completion) = self.completion_receiver.try_recv() {
            self.complete(completion)?;
        }
        Ok(())
    }

    /// Run merges until a single segment remains and return it.
    pub fn drain(&mut self) -> Result<Segment> {
        self.check_healthy()?;
        loop {
            self.poll()?;
            self.start_merges()?;
            if self.running.is_empty() {
                break;
            }
            self.wait_one()?;
        }

        if self.pending.len() != 1 {
            self.failed = true;
            return Err(HashdexError::invariant(format!(
                "merging finished with {} segments instead of one",
                self.pending.len()
            )));
        }
        self.pending
            .pop_front()
            .ok_or_else(|| HashdexError::invariant("pending queue emptied during drain"))
    }

    /// Segments waiting to be merged.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Segments waiting to be merged, oldest first.
    pub fn pending_segments(&mut self) -> impl Iterator<Item = &mut Segment> {
        self.pending.iter_mut()
    }

    /// Merge tasks in flight.
    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn check_healthy(&self) -> Result<()> {
        if self.failed {
            return Err(HashdexError::invalid_operation(
                "a merge failed earlier; the index build cannot continue",
            ));
        }
        Ok(())
    }

    fn start_merges(&mut self) -> Result<()> {
        while self.pending.len() >= 2 && self.running.len() < self.max_concurrent_merges {
            let (Some(primary), Some(secondary)) = (self.pending.pop_front(), self.pending.pop_front())
            else {
                break;
            };
            let output = self.create_segment()?;
            self.spawn(primary, secondary, output)?;
        }
        Ok(())
    }

    fn spawn(&mut self, primary: Segment, secondary: Segment, output: Segment) -> Result<()> {
        let task_id = self.next_task_id;
        self.next_task_id += 1;
        let sender = self.completion_sender.clone();

        let handle = thread::Builder::new()
            .name(format!("hashdex-merge-{task_id}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    merge_segments(primary, secondary, output)
                }))
                .unwrap_or_else(|payload| {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    Err(HashdexError::ThreadJoin(format!(
                        "merge task {task_id} panicked: {message}"
                    )))
                });
                // The scheduler owns the receiver for as long as tasks run.
                let _ = sender.send(Completion { task_id, result });
            })?;

        self.running.insert(task_id, handle);
        self.stats.merges_started += 1;
        Ok(())
    }

    fn wait_one(&mut self) -> Result<()> {
        if self.running.is_empty() {
            return Err(HashdexError::invariant("waiting for a merge while none is running"));
        }
        let completion = self
            .completion_receiver
            .recv()
            .map_err(|_| HashdexError::invariant("merge completion channel closed"))?;
        self.complete(completion)
    }

    fn complete(&mut self, completion: Completion) -> Result<()> {
        if let Some(handle) = self.running.remove(&completion.task_id) {
            handle.join().map_err(|_| {
                self.failed = true;
                HashdexError::ThreadJoin(format!(
                    "merge task {} could not be joined",
                    completion.task_id
                ))
            })?;
        }

        match completion.result {
            Ok((segment, stats)) => {
                log::debug!(
                    "Merge task {} produced {} ({} entries)",
                    completion.task_id,
                    segment.name(),
                    stats.output_entries()
                );
                self.stats.merges_completed += 1;
                self.pending.push_back(segment);
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                log::warn!("Merge task {} failed: {e}", completion.task_id);
                Err(e)
            }
        }
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        for (task_id, handle) in self.running.drain() {
            if handle.join().is_err() {
                log::warn!("Merge task {task_id} panicked during shutdown");
            }
        }
    }
}
