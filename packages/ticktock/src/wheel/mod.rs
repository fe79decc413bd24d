//! Single-level hashed timing wheel.
//!
//! All structural mutation (add, cancel, sweep) is serialised through one
//! owner task that selects over a tick signal and two typed request
//! channels, following the Go source's `chan`-based select loop translated
//! to `tokio::select!`. The id -> slot index is a `DashMap` so external
//! readers (e.g. an admin health check reporting live timer count) don't
//! have to round-trip through the channel, even though only the sweep task
//! ever mutates it.

mod bucket;

use bucket::Bucket;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A boxed future produced by firing a [`Task`].
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The zero-argument action a timer runs on fire. Returns a future so task
/// bodies can publish to the broker and write to the store without
/// blocking the sweep task.
pub type Task = Box<dyn FnOnce() -> BoxFuture + Send>;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("invalid wheel configuration: tick must be > 0 and slots must be >= 2")]
    InvalidConfig,
    #[error("stop timed out waiting for the sweep loop to exit")]
    StopTimeout,
}

struct AddRequest {
    id: u64,
    deadline: DateTime<Utc>,
    task: Task,
}

struct CancelRequest {
    id: u64,
    reply: oneshot::Sender<bool>,
}

/// A hashed timing wheel. Cheap to clone (all state is shared via `Arc`);
/// clones refer to the same running sweep task.
pub struct Wheel {
    tick: Duration,
    slots: usize,
    clock: Arc<dyn crate::clock::Clock>,
    id_index: Arc<DashMap<u64, usize>>,
    next_id: Arc<AtomicU64>,
    add_tx: mpsc::Sender<AddRequest>,
    cancel_tx: mpsc::Sender<CancelRequest>,
    shutdown: CancellationToken,
    started: Arc<AtomicBool>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
    add_rx: Arc<Mutex<Option<mpsc::Receiver<AddRequest>>>>,
    cancel_rx: Arc<Mutex<Option<mpsc::Receiver<CancelRequest>>>>,
}

impl Clone for Wheel {
    fn clone(&self) -> Self {
        Self {
            tick: self.tick,
            slots: self.slots,
            clock: self.clock.clone(),
            id_index: self.id_index.clone(),
            next_id: self.next_id.clone(),
            add_tx: self.add_tx.clone(),
            cancel_tx: self.cancel_tx.clone(),
            shutdown: self.shutdown.clone(),
            started: self.started.clone(),
            join: self.join.clone(),
            add_rx: self.add_rx.clone(),
            cancel_rx: self.cancel_rx.clone(),
        }
    }
}

impl Wheel {
    /// Builds a wheel. Fails fast on an invalid configuration; does not
    /// start the sweep task until [`Wheel::start`] is called.
    pub fn new(
        tick: Duration,
        slots: usize,
        clock: Arc<dyn crate::clock::Clock>,
    ) -> Result<Self, WheelError> {
        if tick.is_zero() || slots < 2 {
            return Err(WheelError::InvalidConfig);
        }
        let (add_tx, add_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Self {
            tick,
            slots,
            clock,
            id_index: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            add_tx,
            cancel_tx,
            shutdown: CancellationToken::new(),
            started: Arc::new(AtomicBool::new(false)),
            join: Arc::new(Mutex::new(None)),
            add_rx: Arc::new(Mutex::new(Some(add_rx))),
            cancel_rx: Arc::new(Mutex::new(Some(cancel_rx))),
        })
    }

    /// Starts the sweep task. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let add_rx = self
            .add_rx
            .lock()
            .expect("add_rx mutex poisoned")
            .take()
            .expect("start already consumed the receiver");
        let cancel_rx = self
            .cancel_rx
            .lock()
            .expect("cancel_rx mutex poisoned")
            .take()
            .expect("start already consumed the receiver");
        let buckets: Vec<Mutex<Bucket>> = (0..self.slots).map(|_| Mutex::new(Bucket::default())).collect();

        let handle = tokio::spawn(sweep_loop(
            self.tick,
            self.slots,
            buckets,
            self.id_index.clone(),
            self.clock.clone(),
            add_rx,
            cancel_rx,
            self.shutdown.clone(),
        ));
        *self.join.lock().expect("join mutex poisoned") = Some(handle);
    }

    /// Signals the sweep loop to stop and waits up to `timeout` for it to
    /// exit. Outstanding task runners spawned for already-due timers are
    /// not joined.
    pub async fn stop(&self, timeout: Duration) -> Result<(), WheelError> {
        self.shutdown.cancel();
        let handle = self.join.lock().expect("join mutex poisoned").take();
        let Some(handle) = handle else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => Ok(()),
            Err(_) => Err(WheelError::StopTimeout),
        }
    }

    /// Schedules `task` to run at `deadline`. Returns a freshly assigned
    /// timer id immediately; the add is processed asynchronously by the
    /// sweep task.
    pub async fn at(&self, deadline: DateTime<Utc>, task: Task) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // A full channel means the sweep task is behind; blocking here is
        // the documented backpressure policy, not a bug.
        let _ = self.add_tx.send(AddRequest { id, deadline, task }).await;
        id
    }

    /// Equivalent to `At(now + delay, task)`.
    pub async fn after_func(&self, delay: Duration, task: Task) -> u64 {
        let deadline = self.clock.now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.at(deadline, task).await
    }

    /// Cancels a timer. Returns true if it was found live at the moment of
    /// the call. A cancel racing with a fire may observe either outcome.
    pub async fn cancel(&self, id: u64) -> bool {
        let (reply, reply_rx) = oneshot::channel();
        if self.cancel_tx.send(CancelRequest { id, reply }).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Number of timers currently live (added and not yet fired or
    /// cancelled). Approximate while requests are in flight.
    pub fn live_count(&self) -> usize {
        self.id_index.len()
    }
}

#[allow(clippy::too_many_arguments)]
async fn sweep_loop(
    tick: Duration,
    slots: usize,
    buckets: Vec<Mutex<Bucket>>,
    id_index: Arc<DashMap<u64, usize>>,
    clock: Arc<dyn crate::clock::Clock>,
    mut add_rx: mpsc::Receiver<AddRequest>,
    mut cancel_rx: mpsc::Receiver<CancelRequest>,
    shutdown: CancellationToken,
) {
    let mut cursor: usize = 0;
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_one_tick(&buckets, &id_index, &mut cursor, slots);
                drain_pending(&buckets, &id_index, cursor, slots, tick, &clock, &mut add_rx, &mut cancel_rx);
            }
            Some(req) = add_rx.recv() => {
                place_timer(&buckets, &id_index, cursor, slots, tick, &clock, req);
            }
            Some(req) = cancel_rx.recv() => {
                let found = cancel_timer(&buckets, &id_index, req.id);
                let _ = req.reply.send(found);
            }
            _ = shutdown.cancelled() => {
                return;
            }
        }
    }
}

/// Drains any add/cancel requests queued since the tick just processed,
/// so they're visible no later than the next sweep.
fn drain_pending(
    buckets: &[Mutex<Bucket>],
    id_index: &DashMap<u64, usize>,
    cursor: usize,
    slots: usize,
    tick: Duration,
    clock: &Arc<dyn crate::clock::Clock>,
    add_rx: &mut mpsc::Receiver<AddRequest>,
    cancel_rx: &mut mpsc::Receiver<CancelRequest>,
) {
    while let Ok(req) = add_rx.try_recv() {
        place_timer(buckets, id_index, cursor, slots, tick, clock, req);
    }
    while let Ok(req) = cancel_rx.try_recv() {
        let found = cancel_timer(buckets, id_index, req.id);
        let _ = req.reply.send(found);
    }
}

fn sweep_one_tick(
    buckets: &[Mutex<Bucket>],
    id_index: &DashMap<u64, usize>,
    cursor: &mut usize,
    slots: usize,
) {
    let due = {
        let mut bucket = buckets[*cursor].lock().expect("bucket mutex poisoned");
        bucket.sweep_due()
    };
    *cursor = (*cursor + 1) % slots;
    for (id, task) in due {
        id_index.remove(&id);
        spawn_fire(id, task);
    }
}

fn spawn_fire(id: u64, task: Task) {
    tokio::spawn(async move {
        let fut = task();
        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            tracing::error!(timer_id = id, ?panic, "timer task panicked");
        }
    });
}

fn place_timer(
    buckets: &[Mutex<Bucket>],
    id_index: &DashMap<u64, usize>,
    cursor: usize,
    slots: usize,
    tick: Duration,
    clock: &Arc<dyn crate::clock::Clock>,
    req: AddRequest,
) {
    let now = clock.now();
    let delay_ms = (req.deadline - now).num_milliseconds().max(0) as u64;
    let tick_ms = (tick.as_millis() as u64).max(1);
    let ticks_later = delay_ms.div_ceil(tick_ms);
    let slot = (cursor + (ticks_later % slots as u64) as usize) % slots;
    let rounds = ticks_later / slots as u64;

    {
        let mut bucket = buckets[slot].lock().expect("bucket mutex poisoned");
        bucket.insert(req.id, req.deadline, rounds, req.task);
    }
    id_index.insert(req.id, slot);
}

fn cancel_timer(buckets: &[Mutex<Bucket>], id_index: &DashMap<u64, usize>, id: u64) -> bool {
    let Some((_, slot)) = id_index.remove(&id) else {
        return false;
    };
    let mut bucket = buckets[slot].lock().expect("bucket mutex poisoned");
    bucket.remove(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot as test_oneshot;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_task(counter: Arc<AtomicUsize>) -> Task {
        Box::new(move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[test]
    fn rejects_zero_tick() {
        let clock = Arc::new(ManualClock::new(epoch()));
        assert!(matches!(
            Wheel::new(Duration::from_secs(0), 8, clock),
            Err(WheelError::InvalidConfig)
        ));
    }

    #[test]
    fn rejects_too_few_slots() {
        let clock = Arc::new(ManualClock::new(epoch()));
        assert!(matches!(
            Wheel::new(Duration::from_secs(1), 1, clock),
            Err(WheelError::InvalidConfig)
        ));
    }

    #[tokio::test]
    async fn fires_after_deadline_passes() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let wheel = Wheel::new(Duration::from_millis(10), 8, clock.clone()).unwrap();
        wheel.start();

        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = test_oneshot::channel();
        let done_tx = Arc::new(Mutex::new(Some(done_tx)));
        let task: Task = {
            let counter = counter.clone();
            Box::new(move || {
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if let Some(tx) = done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                })
            })
        };
        wheel.at(clock.now() + chrono::Duration::milliseconds(5), task).await;

        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("timer should fire")
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        wheel.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_on_unknown_id_returns_false() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let wheel = Wheel::new(Duration::from_millis(10), 8, clock).unwrap();
        wheel.start();
        assert!(!wheel.cancel(9999).await);
        wheel.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_on_live_id_returns_true_and_removes_it() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let wheel = Wheel::new(Duration::from_secs(10), 8, clock.clone()).unwrap();
        wheel.start();

        let counter = Arc::new(AtomicUsize::new(0));
        let id = wheel
            .at(clock.now() + chrono::Duration::seconds(100), make_task(counter))
            .await;

        // give the add request a moment to be processed by the sweep task
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(wheel.cancel(id).await);
        assert_eq!(wheel.live_count(), 0);
        wheel.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let wheel = Wheel::new(Duration::from_millis(10), 8, clock).unwrap();
        wheel.start();
        wheel.start();
        wheel.stop(Duration::from_secs(1)).await.unwrap();
    }
}
