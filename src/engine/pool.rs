//! Fixed-capacity recycle pool.
//!
//! Items are checked out with [`ObjectPool::get`] and handed back with
//! [`ObjectPool::put`]. An empty pool builds a fresh item, a full pool drops
//! the returned one, so the pool never grows past its capacity and never
//! blocks.

use crossbeam::queue::ArrayQueue;
use std::fmt;

pub struct ObjectPool<T> {
    items: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> ObjectPool<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            items: ArrayQueue::new(capacity),
            factory: Box::new(factory),
        }
    }

    /// Take a recycled item, or build one
    pub fn get(&self) -> T {
        self.items.pop().unwrap_or_else(|| (self.factory)())
    }

    /// Return an item; it is dropped when the pool is full
    pub fn put(&self, item: T) {
        let _ = self.items.push(item);
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Number of idle items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.items.capacity())
            .field("idle", &self.items.len())
            .finish()
    }
}
