//! In-process broker.
//!
//! Queues survive channels, deliveries respect the consumer's prefetch, and
//! messages still unacknowledged when their channel dies go back to the head of
//! the queue. [`MemoryBroker::set_available`] and [`MemoryBroker::drop_channels`]
//! inject the failures a real broker produces.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;

use crate::error::{QueueError, Result};
use crate::transport::{Acknowledger, Channel, Delivery, DeliveryStream, Transport};

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    available: AtomicBool,
    epoch: AtomicU64,
    next_tag: AtomicU64,
    notify: Notify,
}

impl Inner {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Vec<u8>>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        self.notify.notify_waiters();
    }
}

/// A broker living in this process. Clones share the same queues.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// An empty, reachable broker.
    #[must_use]
    pub fn new() -> Self {
        let inner = Inner::default();
        inner.available.store(true, Ordering::SeqCst);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Take the broker down or bring it back. Going down closes every channel.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        if !available {
            self.drop_channels();
        }
    }

    /// Close every open channel while the broker stays reachable.
    pub fn drop_channels(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.wake();
    }

    /// Ready (not in-flight) messages on `queue`.
    #[must_use]
    pub fn ready(&self, queue: &str) -> usize {
        self.inner.queues().get(queue).map_or(0, VecDeque::len)
    }

    /// Put a raw payload on `queue`, bypassing any channel.
    pub fn inject(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.inner
            .queues()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.into());
        self.inner.wake();
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn open(&self) -> Result<Arc<dyn Channel>> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory broker is down".to_string()));
        }
        Ok(Arc::new(MemoryChannel {
            inner: Arc::clone(&self.inner),
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

#[derive(Clone)]
struct Liveness {
    inner: Arc<Inner>,
    epoch: u64,
    closed: Arc<AtomicBool>,
}

impl Liveness {
    fn alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.inner.available.load(Ordering::SeqCst)
            && self.inner.epoch.load(Ordering::SeqCst) == self.epoch
    }
}

struct MemoryChannel {
    inner: Arc<Inner>,
    epoch: u64,
    closed: Arc<AtomicBool>,
}

impl MemoryChannel {
    fn liveness(&self) -> Liveness {
        Liveness {
            inner: Arc::clone(&self.inner),
            epoch: self.epoch,
            closed: Arc::clone(&self.closed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.liveness().alive() {
            Ok(())
        } else {
            Err(QueueError::Closed)
        }
    }
}

type Unacked = Arc<Mutex<Vec<(u64, Vec<u8>)>>>;

fn lock_unacked(unacked: &Unacked) -> MutexGuard<'_, Vec<(u64, Vec<u8>)>> {
    unacked.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ConsumerState {
    live: Liveness,
    queue: String,
    prefetch: usize,
    unacked: Unacked,
    finished: bool,
}

impl ConsumerState {
    /// Return everything in flight to the head of the queue, oldest first.
    fn requeue_unacked(&self) {
        let pending = std::mem::take(&mut *lock_unacked(&self.unacked));
        let mut queues = self.live.inner.queues();
        let queue = queues.entry(self.queue.clone()).or_default();
        for (_, payload) in pending.into_iter().rev() {
            queue.push_front(payload);
        }
    }

    fn try_take(&self) -> Option<(u64, Vec<u8>)> {
        let mut unacked = lock_unacked(&self.unacked);
        if unacked.len() >= self.prefetch {
            return None;
        }
        let payload = self
            .live
            .inner
            .queues()
            .get_mut(&self.queue)
            .and_then(VecDeque::pop_front)?;
        let tag = self.live.inner.next_tag.fetch_add(1, Ordering::SeqCst);
        unacked.push((tag, payload.clone()));
        Some((tag, payload))
    }
}

impl Drop for ConsumerState {
    fn drop(&mut self) {
        self.requeue_unacked();
        self.live.inner.wake();
    }
}

struct MemoryAcker {
    tag: u64,
    live: Liveness,
    queue: String,
    unacked: Unacked,
}

impl MemoryAcker {
    fn settle(&self) -> Result<Vec<u8>> {
        if !self.live.alive() {
            return Err(QueueError::Closed);
        }
        let mut unacked = lock_unacked(&self.unacked);
        let position = unacked
            .iter()
            .position(|(tag, _)| *tag == self.tag)
            .ok_or(QueueError::Closed)?;
        Ok(unacked.remove(position).1)
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.settle()?;
        self.live.inner.wake();
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        let payload = self.settle()?;
        if requeue {
            self.live
                .inner
                .queues()
                .entry(self.queue.clone())
                .or_default()
                .push_front(payload);
        }
        self.live.inner.wake();
        Ok(())
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.ensure_open()?;
        self.inner.queues().entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .queues()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        self.inner.wake();
        Ok(())
    }

    async fn purge(&self, queue: &str) -> Result<u32> {
        self.ensure_open()?;
        let removed = self
            .inner
            .queues()
            .get_mut(queue)
            .map_or(0, |q| std::mem::take(q).len());
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream> {
        self.ensure_open()?;
        let state = ConsumerState {
            live: self.liveness(),
            queue: queue.to_string(),
            prefetch: usize::from(prefetch.max(1)),
            unacked: Arc::new(Mutex::new(Vec::new())),
            finished: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                let inner = Arc::clone(&state.live.inner);
                let notified = inner.notify.notified();
                if !state.live.alive() {
                    state.requeue_unacked();
                    state.finished = true;
                    return Some((Err(QueueError::Closed), state));
                }
                if let Some((tag, payload)) = state.try_take() {
                    let acker = MemoryAcker {
                        tag,
                        live: state.live.clone(),
                        queue: state.queue.clone(),
                        unacked: Arc::clone(&state.unacked),
                    };
                    return Some((Ok(Delivery::new(payload, Box::new(acker))), state));
                }
                notified.await;
            }
        });
        Ok(stream.boxed())
    }

    fn is_open(&self) -> bool {
        self.liveness().alive()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.inner.wake();
        Ok(())
    }
}
