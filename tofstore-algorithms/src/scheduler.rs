//! Largest-cost-first parallel sorting of many event lists.
//!
//! The lists are cut into contiguous chunks of equal length. Each chunk
//! carries an estimated cost (`n ln n` summed over its lists) and the
//! chunks are handed to workers from a max-heap, so the most expensive
//! chunk still waiting is always dispatched next. Chunks are disjoint
//! mutable slices, which is what lets workers sort them without locking
//! the lists themselves.

use crate::config::SchedulerConfig;
use crate::progress::ProgressSink;
use crate::{Error, Result};
use std::any::Any;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tofstore_core::{EventList, SortOrder};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const PROGRESS_MESSAGE: &str = "Sorting";

/// Estimated sorting cost of a list with `num_events` records.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sort_cost(num_events: usize) -> f64 {
    if num_events < 2 {
        return 0.0;
    }
    let n = num_events as f64;
    n * n.ln()
}

/// A planned contiguous range of lists.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkPlan {
    /// First list index.
    pub start: usize,
    /// One past the last list index.
    pub end: usize,
    /// Summed `n ln n` cost of the lists in the chunk.
    pub cost: f64,
}

impl ChunkPlan {
    /// Number of lists in the chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true for a chunk covering no lists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// How a batch of lists will be sorted.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortPlan {
    /// Target order.
    pub order: SortOrder,
    /// Threads in the worker pool.
    pub workers: usize,
    /// Chunks sorted at the same time; idle pool threads run the sub-sorts.
    pub concurrent_tasks: usize,
    /// Parallel sub-sorts used inside each TOF sort.
    pub cores_per_task: usize,
    /// Lists per chunk (the last chunk may be shorter).
    pub chunk_size: usize,
    /// Chunks in ascending index order.
    pub chunks: Vec<ChunkPlan>,
}

impl SortPlan {
    /// Chunks in the order a single worker would receive them: largest
    /// cost first, ties broken by lower start index.
    #[must_use]
    pub fn dispatch_order(&self) -> Vec<ChunkPlan> {
        let mut heap: BinaryHeap<Ranked> = self.chunks.iter().copied().map(Ranked).collect();
        std::iter::from_fn(|| heap.pop().map(|ranked| ranked.0)).collect()
    }
}

/// One chunk as it was actually executed.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkRecord {
    /// First list index.
    pub start: usize,
    /// One past the last list index.
    pub end: usize,
    /// Estimated cost used for prioritisation.
    pub cost: f64,
    /// Position in the global dispatch sequence.
    pub dispatch_index: usize,
    /// Task slot (`0..concurrent_tasks`) that sorted the chunk.
    pub worker: usize,
}

/// Outcome of a batch sort.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortReport {
    /// Order the lists were sorted into.
    pub order: SortOrder,
    /// True when the batch was already in the requested order and no work ran.
    pub skipped: bool,
    /// Threads in the worker pool.
    pub workers: usize,
    /// Chunks sorted at the same time.
    pub concurrent_tasks: usize,
    /// Parallel sub-sorts used inside each TOF sort.
    pub cores_per_task: usize,
    /// Lists per chunk.
    pub chunk_size: usize,
    /// Lists sorted (or confirmed sorted) by the batch.
    pub lists_sorted: usize,
    /// Executed chunks, in dispatch order.
    pub chunks: Vec<ChunkRecord>,
}

impl SortReport {
    /// Report for a batch that needed no work.
    #[must_use]
    pub fn skipped(order: SortOrder, num_lists: usize) -> Self {
        Self {
            order,
            skipped: true,
            workers: 0,
            concurrent_tasks: 0,
            cores_per_task: 1,
            chunk_size: 0,
            lists_sorted: num_lists,
            chunks: Vec::new(),
        }
    }

    /// Returns true if no list index was covered by two chunks.
    #[must_use]
    pub fn chunks_disjoint(&self) -> bool {
        let mut ranges: Vec<(usize, usize)> =
            self.chunks.iter().map(|chunk| (chunk.start, chunk.end)).collect();
        ranges.sort_unstable();
        ranges.windows(2).all(|pair| pair[0].1 <= pair[1].0)
    }

    /// Number of distinct task slots that executed at least one chunk.
    #[must_use]
    pub fn workers_used(&self) -> usize {
        let mut ids: Vec<usize> = self.chunks.iter().map(|chunk| chunk.worker).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

// Max-heap rank: higher cost first, then lower start index first.
#[derive(Clone, Copy, Debug)]
struct Ranked(ChunkPlan);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .cost
            .total_cmp(&other.0.cost)
            .then_with(|| other.0.start.cmp(&self.0.start))
    }
}

struct SortTask<'a> {
    rank: Ranked,
    lists: &'a mut [EventList],
}

impl PartialEq for SortTask<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl Eq for SortTask<'_> {}

impl PartialOrd for SortTask<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortTask<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

struct TaskQueue<'a> {
    heap: BinaryHeap<SortTask<'a>>,
    dispatched: usize,
}

// State shared by every worker of one batch.
struct Batch<'q, 'a> {
    order: SortOrder,
    cores_per_task: usize,
    queue: Mutex<TaskQueue<'a>>,
    records: Mutex<Vec<ChunkRecord>>,
    failure: Mutex<Option<Error>>,
    abort: AtomicBool,
    completed: AtomicUsize,
    progress: Option<&'q dyn ProgressSink>,
    cancel: Option<&'q AtomicBool>,
}

impl Batch<'_, '_> {
    fn interrupted(&self) -> bool {
        self.abort.load(AtomicOrdering::Relaxed)
            || self
                .cancel
                .is_some_and(|flag| flag.load(AtomicOrdering::Relaxed))
    }

    fn fail(&self, error: Error) {
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            log::warn!("sort batch stopping: {error}");
            *failure = Some(error);
        }
        self.abort.store(true, AtomicOrdering::Relaxed);
    }

    fn work(&self, worker: usize) {
        loop {
            if self.interrupted() {
                return;
            }
            let (task, dispatch_index) = {
                let mut queue = lock(&self.queue);
                let Some(task) = queue.heap.pop() else {
                    return;
                };
                let index = queue.dispatched;
                queue.dispatched += 1;
                (task, index)
            };
            let plan = task.rank.0;
            log::trace!(
                "worker {worker} takes lists {}..{} (cost {:.1})",
                plan.start,
                plan.end,
                plan.cost
            );

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.sort_chunk(task.lists)));
            match outcome {
                Ok(Ok(true)) => lock(&self.records).push(ChunkRecord {
                    start: plan.start,
                    end: plan.end,
                    cost: plan.cost,
                    dispatch_index,
                    worker,
                }),
                Ok(Ok(false)) => return,
                Ok(Err(error)) => {
                    self.fail(error);
                    return;
                }
                Err(payload) => {
                    self.fail(Error::TaskPanicked(panic_message(payload.as_ref())));
                    return;
                }
            }
        }
    }

    // Returns false if the chunk was abandoned because of an interrupt.
    fn sort_chunk(&self, lists: &mut [EventList]) -> Result<bool> {
        for list in lists {
            if self.interrupted() {
                return Ok(false);
            }
            if self.order == SortOrder::TofSort && self.cores_per_task > 1 {
                list.sort_tof_parallel(self.cores_per_task)?;
            } else {
                list.sort(self.order)?;
            }
            self.completed.fetch_add(1, AtomicOrdering::Relaxed);
            if let Some(progress) = self.progress {
                progress.report(PROGRESS_MESSAGE);
            }
        }
        Ok(true)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Sub-sorts started inside a task run on this pool and are stolen by
// threads without a task of their own.
fn build_pool(plan: &SortPlan) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(plan.workers)
        .thread_name(|i| format!("tofstore-sort-{i}"))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))
}

/// Sorts many event lists on a dedicated worker pool.
#[derive(Clone, Debug, Default)]
pub struct SortScheduler {
    config: SchedulerConfig,
}

impl SortScheduler {
    /// Creates a scheduler with the given configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// The scheduler configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Plans a batch sort without running it.
    ///
    /// The chunk size is `len / (workers * tasks_per_worker)`, at least 1.
    /// When the fan-out is automatic and the target is TOF order, batches
    /// with fewer lists than workers use 4 sub-sorts per list, batches with
    /// fewer than ten lists per worker use 2, and both use one list per
    /// chunk. The pool always has one thread per worker; only
    /// `workers / cores_per_task` chunks are in flight at once so the
    /// remaining threads are free to run the sub-sorts.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an invalid configuration.
    pub fn plan(&self, lists: &[EventList], order: SortOrder) -> Result<SortPlan> {
        self.config.validate()?;
        let workers = self.config.effective_workers();
        let num_lists = lists.len();
        let mut chunk_size = (num_lists / (workers * self.config.tasks_per_worker)).max(1);

        let cores_per_task = match self.config.cores_per_task {
            Some(cores) => cores,
            None if order == SortOrder::TofSort && num_lists < workers => {
                chunk_size = 1;
                4
            }
            None if order == SortOrder::TofSort && num_lists < workers * 10 => {
                chunk_size = 1;
                2
            }
            None => 1,
        };
        let concurrent_tasks = (workers / cores_per_task).max(1);

        let chunks = (0..num_lists)
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(num_lists);
                let cost = lists[start..end]
                    .iter()
                    .map(|list| sort_cost(list.num_events()))
                    .sum();
                ChunkPlan { start, end, cost }
            })
            .collect();

        Ok(SortPlan {
            order,
            workers,
            concurrent_tasks,
            cores_per_task,
            chunk_size,
            chunks,
        })
    }

    /// Sorts every list into `order`.
    ///
    /// # Errors
    /// See [`Self::sort_with`].
    pub fn sort(&self, lists: &mut [EventList], order: SortOrder) -> Result<SortReport> {
        self.sort_with(lists, order, None, None)
    }

    /// Sorts every list into `order`, reporting one progress unit per list
    /// and stopping early once `cancel` is set.
    ///
    /// Lists finished before an interrupt or failure stay sorted; the rest
    /// keep their previous order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an invalid configuration
    /// (before any list is touched), [`Error::Cancelled`] if `cancel` stopped
    /// the batch, or the first error or panic raised by a task.
    pub fn sort_with(
        &self,
        lists: &mut [EventList],
        order: SortOrder,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SortReport> {
        let plan = self.plan(lists, order)?;
        let total = lists.len();
        log::debug!(
            "sorting {total} lists into {order}: {} chunks of {}, {} tasks x {} cores on {} workers",
            plan.chunks.len(),
            plan.chunk_size,
            plan.concurrent_tasks,
            plan.cores_per_task,
            plan.workers
        );

        let pool = build_pool(&plan)?;

        let mut heap = BinaryHeap::with_capacity(plan.chunks.len());
        let mut rest = lists;
        for chunk in &plan.chunks {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(chunk.len());
            heap.push(SortTask {
                rank: Ranked(*chunk),
                lists: head,
            });
            rest = tail;
        }

        let batch = Batch {
            order,
            cores_per_task: plan.cores_per_task,
            queue: Mutex::new(TaskQueue {
                heap,
                dispatched: 0,
            }),
            records: Mutex::new(Vec::with_capacity(plan.chunks.len())),
            failure: Mutex::new(None),
            abort: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
            progress,
            cancel,
        };

        pool.scope(|scope| {
            for worker in 0..plan.concurrent_tasks {
                let batch = &batch;
                scope.spawn(move |_| batch.work(worker));
            }
        });

        let Batch {
            records,
            failure,
            completed,
            ..
        } = batch;
        if let Some(error) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(error);
        }
        let completed = completed.into_inner();
        if completed < total {
            log::debug!("sort cancelled after {completed}/{total} lists");
            return Err(Error::Cancelled { completed, total });
        }

        let mut chunks = records.into_inner().unwrap_or_else(PoisonError::into_inner);
        chunks.sort_by_key(|record| record.dispatch_index);
        Ok(SortReport {
            order,
            skipped: false,
            workers: plan.workers,
            concurrent_tasks: plan.concurrent_tasks,
            cores_per_task: plan.cores_per_task,
            chunk_size: plan.chunk_size,
            lists_sorted: completed,
            chunks,
        })
    }
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tofstore_core::{PulseTime, TofEvent};

    fn list_with(n: usize) -> EventList {
        EventList::from(
            (0..n)
                .rev()
                .map(|i| TofEvent::new(i as f64, PulseTime(0)))
                .collect::<Vec<_>>(),
        )
    }

    fn scheduler(workers: usize) -> SortScheduler {
        SortScheduler::new(SchedulerConfig::default().with_workers(workers))
    }

    #[test]
    fn test_sort_cost() {
        assert_eq!(sort_cost(0), 0.0);
        assert_eq!(sort_cost(1), 0.0);
        assert_relative_eq!(sort_cost(100), 100.0 * 100f64.ln());
    }

    #[test]
    fn test_plan_chunk_size() {
        let lists: Vec<EventList> = (0..1000).map(|_| list_with(3)).collect();
        let plan = scheduler(2).plan(&lists, SortOrder::PulseTimeSort).unwrap();
        assert_eq!(plan.chunk_size, 25);
        assert_eq!(plan.chunks.len(), 40);
        assert_eq!(plan.cores_per_task, 1);
        assert_eq!(plan.workers, 2);
        assert_eq!(plan.concurrent_tasks, 2);
        assert_eq!(plan.chunks.last().map(|c| c.end), Some(1000));
    }

    #[test]
    fn test_plan_fanout_selection() {
        let few: Vec<EventList> = (0..3).map(|_| list_with(3)).collect();
        let plan = scheduler(8).plan(&few, SortOrder::TofSort).unwrap();
        assert_eq!((plan.cores_per_task, plan.concurrent_tasks, plan.chunk_size), (4, 2, 1));
        assert_eq!(plan.workers, 8);

        let some: Vec<EventList> = (0..50).map(|_| list_with(3)).collect();
        let plan = scheduler(8).plan(&some, SortOrder::TofSort).unwrap();
        assert_eq!((plan.cores_per_task, plan.concurrent_tasks, plan.chunk_size), (2, 4, 1));
        assert_eq!(plan.workers, 8);

        // fan-out only applies to TOF sorting
        let plan = scheduler(8).plan(&few, SortOrder::PulseTimeSort).unwrap();
        assert_eq!(plan.cores_per_task, 1);
    }

    #[test]
    fn test_fanout_keeps_every_worker_thread() {
        let few: Vec<EventList> = (0..3).map(|_| list_with(3)).collect();
        let plan = scheduler(8).plan(&few, SortOrder::TofSort).unwrap();
        let pool = build_pool(&plan).unwrap();
        // each of the 2 tasks can spread its 4 sub-sorts over the 8 threads
        assert_eq!(pool.install(rayon::current_num_threads), 8);
        assert!(plan.concurrent_tasks * plan.cores_per_task <= pool.current_num_threads());
    }

    #[test]
    fn test_dispatch_order_largest_first() {
        let lists = vec![list_with(10), list_with(1000), list_with(10), list_with(500)];
        let config = SchedulerConfig::default()
            .with_workers(1)
            .with_tasks_per_worker(4)
            .with_cores_per_task(1);
        let plan = SortScheduler::new(config)
            .plan(&lists, SortOrder::TofSort)
            .unwrap();
        let starts: Vec<usize> = plan.dispatch_order().iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_invalid_fanout_touches_nothing() {
        let mut lists = vec![list_with(5)];
        let config = SchedulerConfig::default().with_cores_per_task(3);
        let result = SortScheduler::new(config).sort(&mut lists, SortOrder::TofSort);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(lists[0].sort_order(), SortOrder::Unsorted);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
