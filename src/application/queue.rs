//! Job queue: bounded-concurrency scheduling and retry bookkeeping
//!
//! All queue state sits behind one mutex that is never held across an
//! await. Attempts run as spawned tasks that own their job and hand it
//! back through `settle`.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::ids::JobId;
use crate::domain::job::{InvalidJobError, Job, NewJob};
use crate::domain::transcription::TranscriptionStatus;

use super::processor::{AttemptGuard, JobHandle, ProcessError, QueueProcessor};
use super::retry::RetryPolicy;

/// Default number of jobs processed at once
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default period of the safety-net scheduling tick
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Queue tuning
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub tick_interval: Duration,
    pub retry: RetryPolicy,
    /// Processing time after which a job is forced to `error`; `None` disables the sweep
    pub stuck_after: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            tick_interval: DEFAULT_TICK_INTERVAL,
            retry: RetryPolicy::default(),
            stuck_after: None,
        }
    }
}

/// Last-known in-memory view of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: TranscriptionStatus,
    pub retry_count: u32,
}

/// What follows a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    /// The stuck-job sweep already wrote `error` and compensated
    Superseded,
    Retry(Duration),
    Fail,
}

struct PendingEntry {
    job: Job,
    /// Earliest dispatch time while backing off before a retry
    ready_at: Option<Instant>,
}

struct InFlightEntry {
    handle: JobHandle,
    retry_count: u32,
    started_at: Instant,
    guard: Arc<AttemptGuard>,
    removed: bool,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<JobId, PendingEntry>,
    order: VecDeque<JobId>,
    in_flight: HashMap<JobId, InFlightEntry>,
    finished: HashMap<JobId, JobSnapshot>,
    shut_down: bool,
}

struct Inner {
    processor: Arc<QueueProcessor>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    shutdown: CancellationToken,
}

/// Accepts jobs and runs at most `concurrency` of them at a time.
///
/// Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    /// Create the queue and start its scheduling tick.
    /// Must be called from within a tokio runtime.
    pub fn start(processor: Arc<QueueProcessor>, config: QueueConfig) -> Self {
        let config = QueueConfig {
            concurrency: config.concurrency.max(1),
            ..config
        };
        let queue = Self {
            inner: Arc::new(Inner {
                processor,
                config,
                state: Mutex::new(QueueState::default()),
                shutdown: CancellationToken::new(),
            }),
        };
        queue.spawn_tick();
        info!(
            concurrency = config.concurrency,
            max_retries = config.retry.max_retries,
            "Job queue started"
        );
        queue
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Validate and register a job as pending, then try to dispatch.
    ///
    /// A job whose id is already pending or in flight is rejected.
    pub fn add(&self, new: NewJob) -> Result<JobId, InvalidJobError> {
        let job = Job::from_new(new)?;
        let id = job.id();
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Err(InvalidJobError::ShutDown);
            }
            if state.pending.contains_key(&id) || state.in_flight.contains_key(&id) {
                return Err(InvalidJobError::Duplicate(id));
            }
            state.finished.remove(&id);
            state.pending.insert(id, PendingEntry { job, ready_at: None });
            state.order.push_back(id);
        }
        info!(job_id = %id, "Job queued");
        self.dispatch();
        Ok(id)
    }

    /// Drop a job from all bookkeeping. Idempotent.
    ///
    /// An in-flight call is not cancelled; its slot stays taken until it
    /// returns. It is never retried: a failed call ends in `error` with
    /// compensation, a successful one is simply forgotten.
    ///
    /// # Returns
    /// `true` if this call removed something
    pub fn remove(&self, id: JobId) -> bool {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let was_finished = state.finished.remove(&id).is_some();

        if state.pending.remove(&id).is_some() {
            state.order.retain(|queued| *queued != id);
            info!(job_id = %id, "Pending job removed");
            return true;
        }
        if let Some(entry) = state.in_flight.get_mut(&id) {
            if entry.removed {
                return false;
            }
            entry.removed = true;
            info!(job_id = %id, "In-flight job removed; running call continues");
            return true;
        }
        was_finished
    }

    /// Last-known in-memory status, `None` if the queue does not know the job
    pub fn status_of(&self, id: JobId) -> Option<TranscriptionStatus> {
        self.snapshot(id).map(|s| s.status)
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let state = self.inner.state.lock();
        if let Some(entry) = state.pending.get(&id) {
            return Some(JobSnapshot {
                status: entry.job.status(),
                retry_count: entry.job.retry_count(),
            });
        }
        if let Some(entry) = state.in_flight.get(&id) {
            if entry.removed {
                return None;
            }
            let status = if entry.guard.is_superseded() {
                TranscriptionStatus::Error
            } else {
                TranscriptionStatus::Processing
            };
            return Some(JobSnapshot {
                status,
                retry_count: entry.retry_count,
            });
        }
        state.finished.get(&id).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Occupied slots, including removed jobs whose call has not returned
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.pending.is_empty() && state.in_flight.is_empty()
    }

    /// Stop the tick and pending retries, and clear all bookkeeping.
    /// Running calls finish without retry; a failed one still ends in
    /// `error` with compensation.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut state = self.inner.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        let dropped = state.pending.len();
        let running = state.in_flight.len();
        state.pending.clear();
        state.order.clear();
        state.in_flight.clear();
        state.finished.clear();
        info!(dropped_pending = dropped, running, "Job queue shut down");
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    fn spawn_tick(&self) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.clone();
        let period = self.inner.config.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(queue) = Self::from_weak(&weak) else {
                    break;
                };
                queue.sweep_stuck();
                queue.dispatch();
            }
            debug!("Scheduling tick stopped");
        });
    }

    /// Move ready pending jobs, oldest first, into free slots.
    fn dispatch(&self) {
        let launches = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.shut_down {
                return;
            }

            let now = Instant::now();
            let mut free = self
                .inner
                .config
                .concurrency
                .saturating_sub(state.in_flight.len());
            let mut launches = Vec::new();
            let mut index = 0;

            while free > 0 && index < state.order.len() {
                let id = state.order[index];
                let ready = match state.pending.get(&id) {
                    Some(entry) => entry.ready_at.map_or(true, |at| at <= now),
                    None => {
                        state.order.remove(index);
                        continue;
                    }
                };
                if !ready {
                    index += 1;
                    continue;
                }

                state.order.remove(index);
                let Some(PendingEntry { mut job, .. }) = state.pending.remove(&id) else {
                    continue;
                };
                if let Err(err) = job.transition(TranscriptionStatus::Processing) {
                    warn!(job_id = %id, error = %err, "Job not dispatchable, dropping");
                    continue;
                }

                let attempt_guard = Arc::new(AttemptGuard::new());
                state.in_flight.insert(
                    id,
                    InFlightEntry {
                        handle: JobHandle::from(&job),
                        retry_count: job.retry_count(),
                        started_at: now,
                        guard: attempt_guard.clone(),
                        removed: false,
                    },
                );
                launches.push((job, attempt_guard));
                free -= 1;
            }
            launches
        };

        for (job, attempt_guard) in launches {
            self.spawn_attempt(job, attempt_guard);
        }
    }

    fn spawn_attempt(&self, job: Job, guard: Arc<AttemptGuard>) {
        debug!(job_id = %job.id(), attempt = job.retry_count() + 1, "Dispatching job");
        let queue = self.clone();
        tokio::spawn(async move {
            let result = queue.inner.processor.process(&job, &guard).await;
            queue.settle(job, result).await;
        });
    }

    /// Decide what follows a returned attempt, run the store side of that
    /// decision while the slot is still held, then refill the slot.
    async fn settle(&self, job: Job, result: Result<String, ProcessError>) {
        let err = match result {
            Ok(_) => {
                self.release(&job, TranscriptionStatus::Completed);
                self.dispatch();
                return;
            }
            Err(err) => err,
        };

        let handle = JobHandle::from(&job);
        match self.plan(&job, &err) {
            Settlement::Superseded => self.release(&job, TranscriptionStatus::Error),
            Settlement::Retry(delay) => {
                self.inner.processor.requeue(&job, &err).await;
                match self.try_requeue(job, delay, &err) {
                    Ok(()) => self.schedule_wakeup(delay),
                    Err(job) => {
                        // Removed or shut down while the retry was being recorded
                        self.inner.processor.fail(&handle, &err).await;
                        self.release(&job, TranscriptionStatus::Error);
                    }
                }
            }
            Settlement::Fail => {
                self.inner.processor.fail(&handle, &err).await;
                self.release(&job, TranscriptionStatus::Error);
            }
        }
        self.dispatch();
    }

    /// A retry is only planned for a job that is still wanted.
    fn plan(&self, job: &Job, err: &ProcessError) -> Settlement {
        if matches!(err, ProcessError::Superseded) {
            return Settlement::Superseded;
        }
        let policy = self.inner.config.retry;
        let state = self.inner.state.lock();
        let wanted = !state.shut_down
            && state
                .in_flight
                .get(&job.id())
                .is_some_and(|entry| !entry.removed);

        if wanted && policy.should_retry(err, job.retry_count()) {
            Settlement::Retry(policy.backoff.delay(job.retry_count()))
        } else {
            Settlement::Fail
        }
    }

    /// Move the job from its slot back to the pending queue.
    ///
    /// Hands the job back if it was removed or the queue shut down since
    /// the retry was planned.
    fn try_requeue(&self, mut job: Job, delay: Duration, err: &ProcessError) -> Result<(), Job> {
        let id = job.id();
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let wanted = !state.shut_down
            && state
                .in_flight
                .get(&id)
                .is_some_and(|entry| !entry.removed);
        if !wanted {
            return Err(job);
        }
        if let Err(transition) = job.requeue() {
            warn!(job_id = %id, error = %transition, "Job could not be re-queued");
            return Err(job);
        }

        state.in_flight.remove(&id);
        info!(
            job_id = %id,
            retry_count = job.retry_count(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Job re-queued for retry"
        );
        state.pending.insert(
            id,
            PendingEntry {
                job,
                ready_at: Some(Instant::now() + delay),
            },
        );
        state.order.push_back(id);
        Ok(())
    }

    /// Free the slot and keep a terminal snapshot unless the job was dropped.
    fn release(&self, job: &Job, status: TranscriptionStatus) {
        let id = job.id();
        let mut state = self.inner.state.lock();
        let entry = state.in_flight.remove(&id);
        if state.shut_down || entry.map_or(true, |e| e.removed) {
            debug!(job_id = %id, status = %status, "Removed job finished its last call");
            return;
        }
        state.finished.insert(
            id,
            JobSnapshot {
                status,
                retry_count: job.retry_count(),
            },
        );
    }

    fn schedule_wakeup(&self, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(queue) = Self::from_weak(&weak) {
                        queue.dispatch();
                    }
                }
            }
        });
    }

    /// Supersede attempts that have been processing longer than `stuck_after`.
    fn sweep_stuck(&self) {
        let Some(limit) = self.inner.config.stuck_after else {
            return;
        };
        let now = Instant::now();
        let stuck: Vec<JobHandle> = {
            let state = self.inner.state.lock();
            state
                .in_flight
                .values()
                .filter(|entry| now.duration_since(entry.started_at) >= limit)
                .filter(|entry| entry.guard.supersede())
                .map(|entry| entry.handle.clone())
                .collect()
        };

        for handle in stuck {
            let processor = self.inner.processor.clone();
            tokio::spawn(async move {
                processor.supersede(&handle).await;
            });
        }
    }
}
