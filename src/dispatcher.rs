//! Subscription event dispatch, running on its own task so a slow or
//! panicking listener never stalls the frame-receive path.
//!
//! Grounded on `_SubscriptionES_Dispatcher.run()` in the original
//! implementation: a dedicated worker drains a queue of events and fans
//! each one out to every listener registered for its tag, logging a
//! rate-limited (edge-triggered) warning when the queue backs up, and a
//! per-listener warning when a callback runs unusually long. Per-listener
//! panics are caught so one faulty callback cannot take down the others.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::response::Event;
use crate::subscription::SubscriptionRegistry;

/// Queue depth at which a backlog warning fires.
const EVENTQUEUE_WARNSIZE: usize = 100;
/// Listener runtime at which a slow-callback warning fires.
const CALLBACK_DURATION_WARNLEVEL: Duration = Duration::from_secs(10);
const QUEUE_CAPACITY: usize = 4096;

/// Handle to the background dispatch task. Events pushed here are handed
/// to registered listeners in arrival order, one subscription's listeners
/// at a time.
pub struct Dispatcher {
    sender: mpsc::Sender<Event>,
    depth: Arc<AtomicUsize>,
    armed: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn spawn(registry: Arc<SubscriptionRegistry>, cancel: CancellationToken) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Event>(QUEUE_CAPACITY);
        let depth = Arc::new(AtomicUsize::new(0));
        let armed = Arc::new(AtomicBool::new(false));

        let task_depth = depth.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = receiver.recv() => {
                        let Some(event) = event else { break };
                        task_depth.fetch_sub(1, Ordering::AcqRel);
                        dispatch_one(&registry, event);
                    }
                }
            }
        });

        Self {
            sender,
            depth,
            armed,
        }
    }

    /// Queues an event for dispatch. Never blocks the caller on a slow
    /// listener; backlog is only visible via the warn-level log and the
    /// channel's own backpressure.
    pub async fn push(&self, event: Event) {
        let depth_now = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if depth_now >= EVENTQUEUE_WARNSIZE {
            if !self.armed.swap(true, Ordering::AcqRel) {
                tracing::warn!(
                    depth = depth_now,
                    "subscription event queue backlog exceeds warn threshold"
                );
            }
        } else {
            self.armed.store(false, Ordering::Release);
        }

        if self.sender.send(event).await.is_err() {
            tracing::error!("dispatcher task is gone; dropping subscription event");
        }
    }
}

fn dispatch_one(registry: &SubscriptionRegistry, event: Event) {
    let tag = event.tag.clone();
    for listener in registry.listeners_for(&tag) {
        let event = event.clone();
        let started = Instant::now();
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            tracing::error!(%tag, "subscription listener panicked; isolated from other listeners");
        }
        let elapsed = started.elapsed();
        if elapsed >= CALLBACK_DURATION_WARNLEVEL {
            tracing::warn!(%tag, ?elapsed, "subscription listener took unusually long to run");
        }
    }
}
