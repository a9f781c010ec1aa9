//! A thread-safe, append-only, observable sequence.
//!
//! Items live in buckets of doubling size that are allocated once and never
//! moved, so a reference handed out by [`AppendOnlySequence::get`] stays valid
//! for the life of the sequence. Writers serialize on one mutex; readers only
//! load the published length and never block.

use crate::error::{Error, Result};
use crate::subscription::{Subscribers, Subscription};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

const FIRST_BUCKET_BITS: u32 = 5;
const FIRST_BUCKET_LEN: usize = 1 << FIRST_BUCKET_BITS;
const BUCKETS: usize = (usize::BITS - FIRST_BUCKET_BITS) as usize;

type Bucket<T> = Box<[OnceLock<T>]>;

/// Change notification raised after every non-empty append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent<T> {
    /// A batch was appended starting at `start_index`.
    ItemsAdded { start_index: usize, items: Arc<[T]> },
    /// The length changed to `len`. Always follows the matching `ItemsAdded`.
    LengthChanged { len: usize },
}

/// Append-only sequence readable while other threads append to it.
///
/// Appends commit as whole batches in one total order. A batch becomes visible
/// to [`len`](Self::len), [`get`](Self::get) and [`iter`](Self::iter) all at
/// once, and events describing it reach each subscriber in commit order.
pub struct AppendOnlySequence<T> {
    buckets: Box<[OnceLock<Bucket<T>>]>,
    len: AtomicUsize,
    append_lock: Mutex<()>,
    subscribers: Subscribers<SequenceEvent<T>>,
}

impl<T> Default for AppendOnlySequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AppendOnlySequence<T> {
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKETS).map(|_| OnceLock::new()).collect(),
            len: AtomicUsize::new(0),
            append_lock: Mutex::new(()),
            subscribers: Subscribers::default(),
        }
    }

    /// Number of items visible to readers.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the item at `index`, or [`Error::IndexOutOfRange`] past the current end.
    pub fn get(&self, index: usize) -> Result<&T> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        self.slot(index).ok_or(Error::IndexOutOfRange { index, len })
    }

    /// Iterates over the items visible right now.
    ///
    /// The length is captured once; items appended afterwards are not yielded.
    pub fn iter(&self) -> Snapshot<'_, T> {
        Snapshot {
            sequence: self,
            next: 0,
            end: self.len(),
        }
    }

    fn slot(&self, index: usize) -> Option<&T> {
        let (bucket, offset) = locate(index);
        self.buckets[bucket].get()?[offset].get()
    }
}

impl<T: Clone> AppendOnlySequence<T> {
    /// Appends `items` as one batch. An empty batch changes nothing and raises no events.
    pub fn append<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }

        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let start_index = self.len.load(Ordering::Relaxed);
        let len = start_index + items.len();
        let batch: Option<Arc<[T]>> = self
            .subscribers
            .has_subscribers()
            .then(|| Arc::from(items.as_slice()));

        for (index, item) in (start_index..).zip(items) {
            let (bucket_index, offset) = locate(index);
            let bucket = self.buckets[bucket_index].get_or_init(|| new_bucket(bucket_index));
            // Slots past the published length are only ever written here, under the lock.
            let _ = bucket[offset].set(item);
        }

        self.len.store(len, Ordering::Release);

        if let Some(items) = batch {
            self.subscribers.publish(SequenceEvent::ItemsAdded { start_index, items });
            self.subscribers.publish(SequenceEvent::LengthChanged { len });
        }
    }

    /// Subscribes to change events. Drop the subscription to unsubscribe.
    ///
    /// Every batch committed after this call is reported; every batch committed
    /// before it is already counted by [`len`](AppendOnlySequence::len).
    pub fn subscribe(&self) -> Subscription<SequenceEvent<T>> {
        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.subscribers.subscribe()
    }
}

impl<'a, T> IntoIterator for &'a AppendOnlySequence<T> {
    type Item = &'a T;
    type IntoIter = Snapshot<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a fixed-length view of an [`AppendOnlySequence`].
pub struct Snapshot<'a, T> {
    sequence: &'a AppendOnlySequence<T>,
    next: usize,
    end: usize,
}

impl<'a, T> Iterator for Snapshot<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let item = self.sequence.slot(self.next);
        self.next += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Snapshot<'_, T> {}

impl<T> FusedIterator for Snapshot<'_, T> {}

/// Maps a flat index to `(bucket, offset)`. Bucket `b` holds `32 << b` items.
fn locate(index: usize) -> (usize, usize) {
    let shifted = index + FIRST_BUCKET_LEN;
    let bucket = (usize::BITS - 1 - shifted.leading_zeros() - FIRST_BUCKET_BITS) as usize;
    let offset = shifted - (FIRST_BUCKET_LEN << bucket);
    (bucket, offset)
}

fn new_bucket<T>(bucket: usize) -> Bucket<T> {
    (0..FIRST_BUCKET_LEN << bucket).map(|_| OnceLock::new()).collect()
}
