// Copyright 2026 Vega Contributors
// SPDX-License-Identifier: Apache-2.0

//! Single-flight priority scheduler.
//!
//! All upstream traffic funnels through one worker that owns the
//! [`Session`]: at most one task executes at a time, so session mutations
//! (login, expiry recovery, status flags) never race. Pending tasks sit in
//! a binary heap ordered by `(priority, arrival)` — lower priority value
//! runs first, ties run in submission order. The queue is unbounded;
//! callers watch [`Scheduler::queue_depth`] if they want backpressure.

use crate::errors::BotError;
use crate::events::{BotEvent, EventBus};
use crate::session::Session;
use crate::snapshot::{
    AuctionState, OfferOfTheDayState, PendingChallenge, ResourcesState, SessionStatus,
};
use futures::future::BoxFuture;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info};

/// Well-known priority levels. Any `u8` is accepted; these are the values
/// the facade uses.
pub mod priority {
    /// Session recovery and anything that must preempt normal traffic.
    pub const CRITICAL: u8 = 0;
    /// Time-sensitive game actions (bids close to the deadline).
    pub const IMPORTANT: u8 = 2;
    /// Default for reads and ordinary actions.
    pub const NORMAL: u8 = 5;
    /// Background polling.
    pub const LOW: u8 = 9;
}

pub type TaskId = u64;

/// What a finished task hands back through its result channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Unit,
    Page(String),
    Auction(AuctionState),
    Offer(OfferOfTheDayState),
    Resources(ResourcesState),
    Status(SessionStatus),
    Challenge(Option<PendingChallenge>),
}

/// A unit of work executed by the worker with exclusive session access.
///
/// The closure runs on the worker task and may hold the `&mut Session`
/// borrow across its awaits; nothing else can observe the session while
/// it runs.
pub type TaskOp = Box<
    dyn for<'a> FnOnce(&'a mut Session) -> BoxFuture<'a, Result<TaskOutput, BotError>> + Send,
>;

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from the queue; the submitter receives `BotError::Cancelled`.
    Cancelled,
    /// The worker had already picked it up; it runs to completion.
    AlreadyStarted,
    /// No queued or running task has this id (unknown, or already done).
    NotFound,
}

/// A queued task's externally visible shape.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub priority: u8,
    /// Milliseconds spent waiting in the queue so far.
    pub queued_ms: u64,
}

struct QueuedTask {
    id: TaskId,
    priority: u8,
    /// Arrival tiebreaker. Ids are handed out monotonically, so the id
    /// doubles as the sequence number.
    seq: u64,
    queued_at: Instant,
    op: TaskOp,
    reply: oneshot::Sender<Result<TaskOutput, BotError>>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        (self.priority, self.seq) == (other.priority, other.seq)
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum; reverse so the smallest
        // (priority, seq) pair surfaces first.
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

struct SchedState {
    heap: BinaryHeap<QueuedTask>,
    running: Option<TaskId>,
    closed: bool,
}

struct Shared {
    state: Mutex<SchedState>,
    wakeup: Notify,
    next_id: AtomicU64,
    events: Arc<EventBus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the worker. Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Spawn the worker task. The scheduler takes sole ownership of the
    /// session; from here on it is only reachable through task ops.
    pub fn spawn(session: Session, events: Arc<EventBus>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedState {
                heap: BinaryHeap::new(),
                running: None,
                closed: false,
            }),
            wakeup: Notify::new(),
            next_id: AtomicU64::new(1),
            events,
        });
        tokio::spawn(worker_loop(Arc::clone(&shared), session));
        Self { shared }
    }

    /// Queue a task and return its id plus the channel its result will
    /// arrive on. Fails fast once the scheduler is shut down.
    pub fn submit(
        &self,
        priority: u8,
        op: TaskOp,
    ) -> Result<(TaskId, oneshot::Receiver<Result<TaskOutput, BotError>>), BotError> {
        let (reply, rx) = oneshot::channel();
        let id = self.shared.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let depth;
        {
            let mut st = self.shared.lock();
            if st.closed {
                return Err(BotError::SchedulerClosed);
            }
            st.heap.push(QueuedTask {
                id,
                priority,
                seq: id,
                queued_at: Instant::now(),
                op,
                reply,
            });
            depth = st.heap.len();
        }
        self.shared.events.emit(BotEvent::TaskQueued {
            id,
            priority,
            queue_depth: depth,
        });
        self.shared.wakeup.notify_one();
        Ok((id, rx))
    }

    /// Queue a task and wait for its result.
    pub async fn run(&self, priority: u8, op: TaskOp) -> Result<TaskOutput, BotError> {
        let (_id, rx) = self.submit(priority, op)?;
        rx.await.map_err(|_| BotError::SchedulerClosed)?
    }

    /// Cancel a queued task.
    ///
    /// Three outcomes: removed before starting (its submitter receives
    /// `Cancelled`), already started (it runs to completion), or unknown.
    pub fn cancel(&self, id: TaskId) -> CancelOutcome {
        let removed = {
            let mut st = self.shared.lock();
            if st.running == Some(id) {
                return CancelOutcome::AlreadyStarted;
            }
            let mut removed = None;
            let mut kept = Vec::with_capacity(st.heap.len());
            for task in st.heap.drain() {
                if task.id == id {
                    removed = Some(task);
                } else {
                    kept.push(task);
                }
            }
            st.heap = kept.into_iter().collect();
            removed
        };
        match removed {
            Some(task) => {
                let _ = task.reply.send(Err(BotError::Cancelled));
                self.shared.events.emit(BotEvent::TaskCancelled { id });
                debug!(id, "task cancelled before start");
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Number of tasks waiting in the queue (excludes the running one).
    pub fn queue_depth(&self) -> usize {
        self.shared.lock().heap.len()
    }

    /// Snapshot of the queued tasks, best-first.
    pub fn queued_tasks(&self) -> Vec<TaskInfo> {
        let st = self.shared.lock();
        let mut tasks: Vec<TaskInfo> = st
            .heap
            .iter()
            .map(|t| TaskInfo {
                id: t.id,
                priority: t.priority,
                queued_ms: t.queued_at.elapsed().as_millis() as u64,
            })
            .collect();
        tasks.sort_by_key(|t| (t.priority, t.id));
        tasks
    }

    /// Stop accepting work and fail every queued task with
    /// `SchedulerClosed`. The running task (if any) finishes normally.
    pub fn shutdown(&self) {
        let drained = {
            let mut st = self.shared.lock();
            st.closed = true;
            st.heap.drain().collect::<Vec<_>>()
        };
        for task in drained {
            let _ = task.reply.send(Err(BotError::SchedulerClosed));
        }
        self.shared.wakeup.notify_one();
        info!("scheduler shut down");
    }
}

async fn worker_loop(shared: Arc<Shared>, mut session: Session) {
    loop {
        let next = {
            let mut st = shared.lock();
            match st.heap.pop() {
                Some(task) => {
                    st.running = Some(task.id);
                    Some(task)
                }
                None if st.closed => return,
                None => None,
            }
        };

        let Some(task) = next else {
            shared.wakeup.notified().await;
            continue;
        };

        shared.events.emit(BotEvent::TaskStarted { id: task.id });
        let started = Instant::now();
        let result = (task.op)(&mut session).await;
        let success = result.is_ok();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // The submitter may have dropped its receiver; the work is done
        // either way.
        let _ = task.reply.send(result);
        shared.events.emit(BotEvent::TaskComplete {
            id: task.id,
            success,
            elapsed_ms,
        });
        shared.lock().running = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::extract::ExtractorRegistry;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    fn test_scheduler() -> (Scheduler, Arc<EventBus>) {
        let config = BotConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            username: "pilot@example.com".to_string(),
            password: "hunter2".to_string(),
            otp_secret: None,
            language: "en".to_string(),
            timeout_ms: 1_000,
        };
        let events = Arc::new(EventBus::new(64));
        let session = Session::new(
            config,
            Arc::new(ExtractorRegistry::with_known_versions()),
            Arc::clone(&events),
        );
        (Scheduler::spawn(session, Arc::clone(&events)), events)
    }

    /// A task that signals when it starts and blocks until released, so a
    /// test can queue more work behind it deterministically.
    fn blocker_op(
        started: oneshot::Sender<()>,
        release: oneshot::Receiver<()>,
    ) -> TaskOp {
        Box::new(move |_session| {
            async move {
                let _ = started.send(());
                let _ = release.await;
                Ok(TaskOutput::Unit)
            }
            .boxed()
        })
    }

    fn recording_op(log: Arc<StdMutex<Vec<u64>>>, label: u64) -> TaskOp {
        Box::new(move |_session| {
            async move {
                log.lock().unwrap().push(label);
                Ok(TaskOutput::Unit)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_priority_then_arrival_order() {
        let (scheduler, _events) = test_scheduler();
        let log = Arc::new(StdMutex::new(Vec::new()));

        // Hold the worker so the whole batch is queued before any of it runs.
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let (_id, blocker_done) = scheduler
            .submit(priority::CRITICAL, blocker_op(started_tx, release_rx))
            .unwrap();
        started_rx.await.unwrap();

        // Priorities 3, 1, 2, 1 in submission order 1..=4.
        let mut receivers = Vec::new();
        for (label, prio) in [(1u64, 3u8), (2, 1), (3, 2), (4, 1)] {
            let (_id, rx) = scheduler
                .submit(prio, recording_op(Arc::clone(&log), label))
                .unwrap();
            receivers.push(rx);
        }
        assert_eq!(scheduler.queue_depth(), 4);

        release_tx.send(()).unwrap();
        blocker_done.await.unwrap().unwrap();
        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        // Lower priority value first; equal priorities in arrival order.
        assert_eq!(*log.lock().unwrap(), vec![2, 4, 3, 1]);
        assert_eq!(scheduler.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let (scheduler, _events) = test_scheduler();
        let current = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));

        let mut receivers = Vec::new();
        for _ in 0..8 {
            let current = Arc::clone(&current);
            let overlapped = Arc::clone(&overlapped);
            let op: TaskOp = Box::new(move |_session| {
                async move {
                    if current.fetch_add(1, AtomicOrdering::SeqCst) != 0 {
                        overlapped.store(true, AtomicOrdering::SeqCst);
                    }
                    tokio::task::yield_now().await;
                    current.fetch_sub(1, AtomicOrdering::SeqCst);
                    Ok(TaskOutput::Unit)
                }
                .boxed()
            });
            let (_id, rx) = scheduler.submit(priority::NORMAL, op).unwrap();
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.unwrap().unwrap();
        }
        assert!(!overlapped.load(AtomicOrdering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (scheduler, _events) = test_scheduler();

        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let (blocker_id, blocker_done) = scheduler
            .submit(priority::CRITICAL, blocker_op(started_tx, release_rx))
            .unwrap();
        started_rx.await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let op: TaskOp = Box::new(move |_session| {
            async move {
                ran_clone.store(true, AtomicOrdering::SeqCst);
                Ok(TaskOutput::Unit)
            }
            .boxed()
        });
        let (victim_id, victim_rx) = scheduler.submit(priority::NORMAL, op).unwrap();

        assert_eq!(scheduler.cancel(victim_id), CancelOutcome::Cancelled);
        assert_eq!(victim_rx.await.unwrap(), Err(BotError::Cancelled));

        // The running task reports AlreadyStarted and still completes.
        assert_eq!(scheduler.cancel(blocker_id), CancelOutcome::AlreadyStarted);
        release_tx.send(()).unwrap();
        blocker_done.await.unwrap().unwrap();

        assert!(!ran.load(AtomicOrdering::SeqCst));
        assert_eq!(scheduler.cancel(9999), CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_queued_tasks_snapshot_is_best_first() {
        let (scheduler, _events) = test_scheduler();

        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let (_id, blocker_done) = scheduler
            .submit(priority::CRITICAL, blocker_op(started_tx, release_rx))
            .unwrap();
        started_rx.await.unwrap();

        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut ids = Vec::new();
        for (label, prio) in [(1u64, 7u8), (2, 3), (3, 7)] {
            let (id, _rx) = scheduler
                .submit(prio, recording_op(Arc::clone(&log), label))
                .unwrap();
            ids.push(id);
        }

        let snapshot = scheduler.queued_tasks();
        let order: Vec<TaskId> = snapshot.iter().map(|t| t.id).collect();
        assert_eq!(order, vec![ids[1], ids[0], ids[2]]);

        release_tx.send(()).unwrap();
        blocker_done.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_and_rejects_new() {
        let (scheduler, _events) = test_scheduler();

        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let (_id, blocker_done) = scheduler
            .submit(priority::CRITICAL, blocker_op(started_tx, release_rx))
            .unwrap();
        started_rx.await.unwrap();

        let log = Arc::new(StdMutex::new(Vec::new()));
        let (_pending_id, pending_rx) = scheduler
            .submit(priority::NORMAL, recording_op(Arc::clone(&log), 1))
            .unwrap();

        scheduler.shutdown();
        assert_eq!(pending_rx.await.unwrap(), Err(BotError::SchedulerClosed));

        let rejected = scheduler.submit(priority::NORMAL, recording_op(log, 2));
        assert!(matches!(rejected, Err(BotError::SchedulerClosed)));

        // The in-flight task still finishes normally.
        release_tx.send(()).unwrap();
        blocker_done.await.unwrap().unwrap();
    }
}
