//! Lifecycle events and the multi-subscriber notification channel.
//!
//! State-machine transitions and connection errors are decoupled from any
//! specific listener: the session emits [`LifecycleEvent`]s into an
//! [`EventBus`], and each subscriber receives them over its own channel.
//! A slow or dropped subscriber can never fail the emitter, and handlers
//! that subscribe after an event was emitted never see it.

use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tokio::sync::mpsc;

/// A session lifecycle notification.
///
/// Emitted, never stored beyond the current dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Spawn and handshake both succeeded; remote calls are now permitted.
    Connected,
    /// The session ended, gracefully or not.
    Disconnected { reason: Option<String> },
    /// An unexpected exit is being recovered from; `attempt` starts at 1.
    Reconnecting { attempt: u32 },
    /// A connection-level failure.
    Error { message: String },
}

type Subscriber = (u64, mpsc::UnboundedSender<LifecycleEvent>);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Fan-out channel for [`LifecycleEvent`]s.
///
/// Delivery order is subscription order. There is no queuing or replay of
/// past events.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to future events.
    ///
    /// Dropping the returned [`EventStream`] unsubscribes.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().expect("event bus lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, tx));
            id
        };
        EventStream {
            rx,
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver `event` to every current subscriber, pruning closed ones.
    pub fn emit(&self, event: LifecycleEvent) {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .subscribers
            .len()
    }
}

/// A subscription to session lifecycle events.
///
/// Yields events in emission order via [`recv`](Self::recv) or the
/// [`futures::Stream`] impl. Dropping it unsubscribes.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    bus: Weak<Mutex<BusInner>>,
    id: u64,
}

impl EventStream {
    /// Receive the next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.try_recv().ok()
    }
}

impl futures::Stream for EventStream {
    type Item = LifecycleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            if let Ok(mut inner) = inner.lock() {
                inner.subscribers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
