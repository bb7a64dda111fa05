use std::sync::Arc;

use parking_lot::RwLock;

/// A value that is replaced wholesale and read concurrently.
///
/// Readers clone the `Arc` under a short read lock and keep using their snapshot;
/// `publish` swaps in a fully built value under the write lock. No reader can
/// observe a partially assigned value.
pub struct Published<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(initial: T) -> Self {
        Self { current: RwLock::new(Arc::new(initial)) }
    }

    pub fn get(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// Install `next` and return the value it replaced.
    pub fn publish(&self, next: T) -> Arc<T> {
        let next = Arc::new(next);
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self { Self::new(T::default()) }
}
