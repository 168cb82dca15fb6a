//! Pooled byte buffers shared across connections.
//!
//! Connections acquire their request, response-header and chunk-framing
//! buffers here instead of allocating per message. Buffers are grouped into
//! power-of-two size classes; a release returns the buffer to its class
//! freelist up to a retention cap, beyond which it is simply dropped.
//!
//! The pool is `Send + Sync` and is shared behind an `Arc`. A connection only
//! ever mutates buffers it has acquired; the freelists are the only shared
//! state and sit behind per-class mutexes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bytes::BytesMut;

const MIN_CLASS_SHIFT: u32 = 10; // 1 KiB
const MAX_CLASS_SHIFT: u32 = 20; // 1 MiB

/// A thread-safe pool of [`BytesMut`] buffers.
pub struct BufferPool {
    classes: Vec<Mutex<Vec<BytesMut>>>,
    retain_per_class: usize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(16)
    }
}

impl BufferPool {
    /// Creates a pool retaining at most `retain_per_class` buffers per size
    /// class.
    pub fn new(retain_per_class: usize) -> Self {
        let num_classes = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;
        let mut classes = Vec::with_capacity(num_classes);
        for _ in 0..num_classes {
            classes.push(Mutex::new(Vec::new()));
        }
        Self { classes, retain_per_class, acquired: AtomicUsize::new(0), released: AtomicUsize::new(0) }
    }

    /// Returns an empty buffer with at least `capacity` bytes of capacity.
    ///
    /// Requests are rounded up to the next size class; requests above the
    /// largest class are served by a plain allocation that will not be
    /// retained on release.
    pub fn acquire(&self, capacity: usize) -> BytesMut {
        self.acquired.fetch_add(1, Ordering::Relaxed);

        match class_index(capacity) {
            Some(index) => {
                if let Some(buf) = self.classes[index].lock().unwrap().pop() {
                    return buf;
                }
                BytesMut::with_capacity(class_capacity(index))
            }
            None => BytesMut::with_capacity(capacity),
        }
    }

    /// Returns a buffer to the pool.
    ///
    /// Buffers whose backing storage is shared (frozen `Bytes` views of it
    /// are still alive) are dropped instead of pooled. `try_reclaim` is the
    /// probe for that: on a cleared buffer it recovers the full allocation
    /// exactly when the buffer is the sole owner, and fails when the
    /// storage is shared. Reclaiming also undoes any consumption the
    /// scatter-write path did, so a pooled buffer always re-enters its
    /// original size class. Buffers above the largest class and buffers
    /// above the retention cap are dropped.
    pub fn release(&self, mut buf: BytesMut) {
        self.released.fetch_add(1, Ordering::Relaxed);

        buf.clear();
        if !buf.try_reclaim(1 << MIN_CLASS_SHIFT) {
            return;
        }
        let index = match retain_class_index(buf.capacity()) {
            Some(index) => index,
            None => return,
        };

        let mut freelist = self.classes[index].lock().unwrap();
        if freelist.len() < self.retain_per_class {
            freelist.push(buf);
        }
    }

    /// Total number of `acquire` calls.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Total number of `release` calls.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }
}

fn class_index(capacity: usize) -> Option<usize> {
    let capacity = capacity.max(1 << MIN_CLASS_SHIFT);
    if capacity > 1 << MAX_CLASS_SHIFT {
        return None;
    }
    let shift = usize::BITS - (capacity - 1).leading_zeros();
    Some((shift.max(MIN_CLASS_SHIFT) - MIN_CLASS_SHIFT) as usize)
}

/// Round down: a reclaimed allocation may be slightly larger than its
/// class, so it is filed under the largest class it can fully serve.
fn retain_class_index(capacity: usize) -> Option<usize> {
    if capacity < 1 << MIN_CLASS_SHIFT {
        return None;
    }
    let shift = usize::BITS - 1 - capacity.leading_zeros();
    if shift > MAX_CLASS_SHIFT {
        return None;
    }
    Some((shift - MIN_CLASS_SHIFT) as usize)
}

fn class_capacity(index: usize) -> usize {
    1 << (MIN_CLASS_SHIFT + index as u32)
}
