#![forbid(unsafe_code)]

//! Frame-coalescing update scheduler.
//!
//! Reactive emissions do not touch the tree directly; they enqueue a patch
//! task keyed by slot. The host drives [`Scheduler::run_frame`] once per
//! animation frame (or a test drives it directly), at which point each
//! slot's **latest** task runs exactly once.
//!
//! # Invariants
//!
//! 1. Last write wins: scheduling twice under one [`SlotKey`] before a flush
//!    replaces the task; the slot mutates once with the final value.
//! 2. Snapshot semantics: tasks scheduled during a flush belong to the next
//!    cycle, never the current one.
//! 3. [`Settled`] handles complete only when a flush snapshot fully drains
//!    (budget carryover defers them together with the remaining tasks).
//! 4. `run_frame` while already flushing is a no-op (re-entrancy guard).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use ahash::AHashMap;
use web_time::{Duration, Instant};

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerConfig {
    /// Maximum time to spend running tasks in one frame. `None` (the
    /// default) drains the whole snapshot; `Some` carries leftover tasks
    /// into the next frame once the slice elapses.
    pub frame_budget: Option<Duration>,
}

impl SchedulerConfig {
    /// The conventional interactive budget: 5 ms per frame.
    #[must_use]
    pub fn budgeted() -> Self {
        Self {
            frame_budget: Some(Duration::from_millis(5)),
        }
    }
}

/// Opaque per-slot coalescing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Scheduled,
    Flushing,
}

type Task = Box<dyn FnOnce()>;

struct SettledInner {
    done: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl SettledInner {
    fn complete(&self) {
        self.done.set(true);
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}

/// Completion handle for a scheduled flush.
///
/// Settles once the flush that was pending (or the next one) fully drains
/// its snapshot. Callbacks chain in registration order.
#[derive(Clone)]
pub struct Settled {
    inner: Rc<SettledInner>,
}

impl std::fmt::Debug for Settled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settled")
            .field("settled", &self.inner.done.get())
            .finish()
    }
}

impl Settled {
    fn pending() -> Self {
        Self {
            inner: Rc::new(SettledInner {
                done: Cell::new(false),
                callbacks: RefCell::new(Vec::new()),
            }),
        }
    }

    fn done() -> Self {
        Self {
            inner: Rc::new(SettledInner {
                done: Cell::new(true),
                callbacks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Whether the awaited flush has completed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.done.get()
    }

    /// Register a completion callback. Runs immediately if already settled.
    pub fn on_settled(&self, callback: impl FnOnce() + 'static) {
        if self.inner.done.get() {
            callback();
        } else {
            self.inner.callbacks.borrow_mut().push(Box::new(callback));
        }
    }
}

struct SchedulerInner {
    phase: Phase,
    tasks: AHashMap<u64, Task>,
    order: Vec<u64>,
    carryover: VecDeque<(u64, Task)>,
    settled: Vec<Rc<SettledInner>>,
    next_key: u64,
    config: SchedulerConfig,
}

/// The frame scheduler. Cloning shares the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("phase", &inner.phase)
            .field("pending", &inner.order.len())
            .field("carryover", &inner.carryover.len())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with the given configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                phase: Phase::Idle,
                tasks: AHashMap::new(),
                order: Vec::new(),
                carryover: VecDeque::new(),
                settled: Vec::new(),
                next_key: 0,
                config,
            })),
        }
    }

    /// Allocate a fresh coalescing key for one reactive slot.
    #[must_use]
    pub fn alloc_key(&self) -> SlotKey {
        let mut inner = self.inner.borrow_mut();
        let key = SlotKey(inner.next_key);
        inner.next_key += 1;
        key
    }

    /// Enqueue `task` under `key`, replacing any task already queued for it.
    ///
    /// The first schedule while idle transitions to the scheduled phase
    /// (the host should drive a frame).
    pub fn schedule(&self, key: SlotKey, task: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.tasks.insert(key.0, Box::new(task)).is_none() {
            inner.order.push(key.0);
        }
        if inner.phase == Phase::Idle {
            inner.phase = Phase::Scheduled;
            tracing::trace!(target: "vireo::scheduler", key = key.0, "frame requested");
        }
    }

    /// Whether the host should drive another frame.
    #[must_use]
    pub fn needs_frame(&self) -> bool {
        self.inner.borrow().phase == Phase::Scheduled
    }

    /// Handle that settles when the pending (or next) flush fully drains.
    ///
    /// Returns an already-settled handle when nothing is pending.
    #[must_use]
    pub fn settled(&self) -> Settled {
        let mut inner = self.inner.borrow_mut();
        let idle = inner.phase == Phase::Idle && inner.order.is_empty() && inner.carryover.is_empty();
        if idle {
            return Settled::done();
        }
        let handle = Settled::pending();
        inner.settled.push(Rc::clone(&handle.inner));
        handle
    }

    /// Run one frame: snapshot the queue and execute each task once.
    ///
    /// With a frame budget configured, stops when the slice elapses and
    /// carries the rest into the next frame. No-op when idle or already
    /// flushing.
    pub fn run_frame(&self) {
        let budget = {
            let mut inner = self.inner.borrow_mut();
            if inner.phase == Phase::Flushing {
                return;
            }
            if inner.order.is_empty() && inner.carryover.is_empty() {
                inner.phase = Phase::Idle;
                return;
            }
            inner.phase = Phase::Flushing;
            if inner.carryover.is_empty() {
                let order = std::mem::take(&mut inner.order);
                let mut tasks = std::mem::take(&mut inner.tasks);
                inner.carryover = order
                    .into_iter()
                    .filter_map(|k| tasks.remove(&k).map(|t| (k, t)))
                    .collect();
            }
            tracing::trace!(
                target: "vireo::scheduler",
                tasks = inner.carryover.len(),
                "flush start"
            );
            inner.config.frame_budget
        };

        let start = Instant::now();
        loop {
            let task = {
                let mut inner = self.inner.borrow_mut();
                match inner.carryover.pop_front() {
                    Some((_, task)) => task,
                    None => break,
                }
            };
            task();

            if let Some(budget) = budget
                && start.elapsed() >= budget
                && !self.inner.borrow().carryover.is_empty()
            {
                self.inner.borrow_mut().phase = Phase::Scheduled;
                tracing::trace!(target: "vireo::scheduler", "frame budget elapsed, carrying over");
                return;
            }
        }

        // Snapshot drained: settle, then decide whether a new cycle is due.
        let settled = {
            let mut inner = self.inner.borrow_mut();
            let settled = std::mem::take(&mut inner.settled);
            inner.phase = if inner.order.is_empty() {
                Phase::Idle
            } else {
                Phase::Scheduled
            };
            settled
        };
        for handle in settled {
            handle.complete();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
