//! Ordered fan-out of events to subscribers.
//!
//! Every subscriber owns an unbounded channel. Publishing pushes the event
//! into each channel in turn, so a subscriber observes events in exactly the
//! order `publish` was called. Callers that need a total order across threads
//! publish while holding their own lock.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub(crate) struct Subscribers<E> {
    senders: Mutex<Vec<mpsc::UnboundedSender<E>>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> Subscribers<E> {
    pub(crate) fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        Subscription { receiver: rx }
    }

    /// Delivers `event` to every live subscriber, pruning the ones that went away.
    pub(crate) fn publish(&self, event: E) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        self.lock().iter().any(|tx| !tx.is_closed())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<E>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A stream of events delivered in publication order.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription<E> {
    receiver: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    /// Waits for the next event. Returns `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Stops receiving events. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
