//! Reusable buffer and message pools
//!
//! A [`Pool`] hands out items wrapped in a [`Pooled`] guard which gives the
//! item back when dropped.  Pools are shared through `Arc` by whoever needs
//! them; there are no process-wide pools.

use crate::dns::DnsMessage;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Idle items kept per pool; extra returns are dropped
const MAX_IDLE: usize = 64;

type Make<T> = Box<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Box<dyn Fn(&mut T) -> bool + Send + Sync>;

/// Pool of reusable items
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    make: Make<T>,
    reset: Reset<T>,
}

impl<T> Pool<T> {
    /// Create a pool which makes new items with `make` and prepares
    /// returned items with `reset`.  Items for which `reset` returns
    /// false are dropped instead of being kept.
    pub fn new<M, R>(make: M, reset: R) -> Self
    where
        M: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) -> bool + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            make: Box::new(make),
            reset: Box::new(reset),
        }
    }

    /// Take an idle item, or make a new one
    pub fn get(self: &Arc<Self>) -> Pooled<T> {
        let item = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| (self.make)());

        Pooled {
            item: Some(item),
            pool: Arc::clone(self),
        }
    }

    /// Number of idle items
    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    fn put(&self, mut item: T) {
        if !(self.reset)(&mut item) {
            return;
        }
        if let Ok(mut free) = self.free.lock() {
            if free.len() < MAX_IDLE {
                free.push(item);
            }
        }
    }
}

impl Pool<Vec<u8>> {
    /// Pool of `size`-byte buffers
    ///
    /// Buffers come out with a length of `size`.  A buffer whose capacity
    /// has changed while it was out is not taken back.
    pub fn buffers(size: usize) -> Self {
        Self::new(
            move || vec![0u8; size],
            move |buf: &mut Vec<u8>| {
                if buf.capacity() != size {
                    return false;
                }
                buf.resize(size, 0);
                true
            },
        )
    }
}

impl Pool<DnsMessage> {
    /// Pool of DNS messages, cleared on return
    pub fn messages() -> Self {
        Self::new(DnsMessage::default, |msg: &mut DnsMessage| {
            msg.clear();
            true
        })
    }
}

/// Item checked out of a [`Pool`]
///
/// The item goes back to its pool on drop.
pub struct Pooled<T> {
    item: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item present until drop")
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item present until drop")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put(item);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}
