// src/core/queue.rs

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// A thread-safe FIFO queue with a "became ready" signal.
///
/// Producers call [`Queue::append`]; a single consumer either pops items one at
/// a time with [`Queue::next`] or drains everything with [`Queue::process`].
/// [`Queue::signal`] resolves once an item has been appended since the last
/// time it resolved, so a consumer never misses a wakeup.
#[derive(Debug)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Notify,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
        }
    }

    pub fn append(&self, item: T) {
        self.items.lock().push_back(item);
        self.ready.notify_one();
    }

    /// Pops the oldest item without waiting. Returns `None` when empty.
    pub fn next(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Removes every queued item and hands each one to `each`, oldest first.
    ///
    /// The lock is released before `each` runs.
    pub fn process<F: FnMut(T)>(&self, mut each: F) {
        let drained: Vec<T> = self.items.lock().drain(..).collect();
        for item in drained {
            each(item);
        }
    }

    /// Waits until something has been appended.
    pub async fn signal(&self) {
        self.ready.notified().await;
    }

    /// Drops every queued item.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn next_pops_in_arrival_order() {
        let queue = Queue::new();
        queue.append(1);
        queue.append(2);

        assert_eq!(queue.next(), Some(1));
        assert_eq!(queue.next(), Some(2));
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn process_drains_everything() {
        let queue = Queue::new();
        for i in 0..5 {
            queue.append(i);
        }

        let mut seen = Vec::new();
        queue.process(|i| seen.push(i));

        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn signal_fires_for_items_appended_before_waiting() {
        let queue = Arc::new(Queue::new());
        queue.append("early");

        tokio::time::timeout(Duration::from_secs(1), queue.signal())
            .await
            .expect("signal should already be pending");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn signal_wakes_a_waiting_consumer() {
        let queue = Arc::new(Queue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue.signal().await;
                queue.next()
            })
        };

        tokio::task::yield_now().await;
        queue.append(42);

        assert_eq!(waiter.await.unwrap(), Some(42));
    }
}
