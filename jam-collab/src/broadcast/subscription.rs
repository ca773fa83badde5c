use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll, Waker},
};

use futures_util::Stream;
use log::warn;
use parking_lot::Mutex;

use crate::{Id, Session, SessionEvent, SessionId};

pub type SubscriberId = Id<Subscriber>;

/// Pending events of one subscriber, with the waker of whoever is polling them
#[derive(Debug)]
struct Inbox {
    pending: Mutex<VecDeque<SessionEvent>>,
    waker: Mutex<Option<Waker>>,
    closed: AtomicBool,
    capacity: usize,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            pending: Default::default(),
            waker: Default::default(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Queues an event. Returns false if the inbox is closed, or was closed because it is full.
    fn push(&self, event: SessionEvent) -> bool {
        if self.is_closed() {
            return false;
        }

        {
            let mut pending = self.pending.lock();

            if pending.len() >= self.capacity {
                drop(pending);
                self.close();
                return false;
            }

            pending.push_back(event);
        }

        self.wake();
        true
    }

    fn pop(&self) -> Option<SessionEvent> {
        self.pending.lock().pop_front()
    }

    fn close(&self) {
        {
            // Taken so a poll between its closed check and storing its waker can't miss this
            let _pending = self.pending.lock();
            self.closed.store(true, Ordering::Release);
        }

        self.wake();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }
}

/// The session side of a [Subscription]
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    inbox: Arc<Inbox>,
}

impl Subscriber {
    fn deliver(&self, event: &SessionEvent) -> bool {
        self.inbox.push(event.clone())
    }
}

/// The subscribers registered on a session
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    list: Vec<Subscriber>,
}

impl Subscribers {
    /// Creates a subscriber whose first event is `first`, and returns the client handle
    pub fn register(
        &mut self,
        session: Weak<Session>,
        session_id: SessionId,
        capacity: usize,
        first: SessionEvent,
    ) -> Subscription {
        let inbox = Arc::new(Inbox::new(capacity.max(1)));
        inbox.push(first);

        let subscriber = Subscriber {
            id: SubscriberId::new(),
            inbox: inbox.clone(),
        };

        let subscription = Subscription {
            id: subscriber.id,
            session_id,
            inbox,
            session,
        };

        self.list.push(subscriber);
        subscription
    }

    pub fn unregister(&mut self, id: SubscriberId) {
        self.list.retain(|s| s.id != id)
    }

    /// Delivers the event to every live subscriber, pruning the ones that are gone or lagging
    pub fn publish(&mut self, event: &SessionEvent) {
        self.list.retain(|subscriber| {
            let delivered = subscriber.deliver(event);

            if !delivered && subscriber.inbox.pending.lock().len() >= subscriber.inbox.capacity {
                warn!(
                    "Subscriber {} of session {} lagged behind and was dropped",
                    subscriber.id, event.session_id
                );
            }

            delivered
        });
    }

    /// Ends every subscription. Already queued events can still be read.
    pub fn close_all(&mut self) {
        for subscriber in self.list.drain(..) {
            subscriber.inbox.close();
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }
}

/// A client's registration on a session.
///
/// Yields a snapshot first, then every committed delta. Dropping it unregisters the subscriber.
/// The stream ends when the session ends, or when the subscriber falls too far behind,
/// after which a fresh subscription is needed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    session_id: SessionId,
    inbox: Arc<Inbox>,
    session: Weak<Session>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the next pending event without waiting
    pub fn try_next(&self) -> Option<SessionEvent> {
        self.inbox.pop()
    }

    /// Takes every pending event
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.inbox.pending.lock().drain(..).collect()
    }

    /// Returns true if no more events will arrive
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// Lets the already queued events be read, then ends the stream
    pub(crate) fn close_after_pending(&self) {
        self.inbox.close()
    }
}

impl Stream for Subscription {
    type Item = SessionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending = self.inbox.pending.lock();

        if let Some(event) = pending.pop_front() {
            return Poll::Ready(Some(event));
        }

        if self.inbox.is_closed() {
            return Poll::Ready(None);
        }

        // Stored while the pending lock is held, so a concurrent push can't miss it
        *self.inbox.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inbox.close();

        if let Some(session) = self.session.upgrade() {
            session.unsubscribe(self.id)
        }
    }
}
