use serde::Serialize;
use std::collections::VecDeque;

/// FIFO with a fixed capacity. Pushing onto a full queue drops the oldest entry.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    #[serde(skip)]
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Remove and return every entry, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut queue = BoundedQueue::new(3);
        for i in 0..3 {
            assert_eq!(queue.push(i), None);
        }
        assert_eq!(queue.push(3), Some(0));
        assert_eq!(queue.push(4), Some(1));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(queue.latest(), Some(&4));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut queue = BoundedQueue::new(5);
        for i in 0..100 {
            queue.push(i);
            assert!(queue.len() <= queue.capacity());
        }
        assert_eq!(queue.drain(), vec![95, 96, 97, 98, 99]);
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut queue = BoundedQueue::new(0);
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.latest(), Some(&"b"));
    }
}
