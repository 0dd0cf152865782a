//! Bounded FIFO of past embeddings per tracked identity
//!
//! The mean of a queue (its "center") is a temporally smoothed prototype of
//! the identity and serves as the key of the sword contrast.

use crate::error::{MatchError, Result};
use ndarray::prelude::*;
use std::collections::{BTreeMap, VecDeque};

/// Bounded FIFO of embedding vectors
#[derive(Debug, Clone)]
pub struct ObjectQueue {
    capacity: usize,
    items: VecDeque<Array1<f32>>,
}

impl ObjectQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MatchError::config("object queue capacity must be non-zero"));
        }
        Ok(Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        })
    }

    /// Append `embed`, evicting the oldest entry first when full
    pub fn enqueue(&mut self, embed: Array1<f32>) -> Result<()> {
        if let Some(dim) = self.dim() {
            if embed.len() != dim {
                return Err(MatchError::shape(
                    "object queue embedding",
                    vec![dim],
                    vec![embed.len()],
                ));
            }
        }
        if self.items.len() == self.capacity {
            self.dequeue()?;
        }
        self.items.push_back(embed);
        Ok(())
    }

    /// Remove and return the oldest entry
    pub fn dequeue(&mut self) -> Result<Array1<f32>> {
        self.items.pop_front().ok_or(MatchError::EmptyQueue)
    }

    /// Element-wise mean of the stored embeddings, as a fresh array
    pub fn center(&self) -> Result<Array1<f32>> {
        let first = self.items.front().ok_or(MatchError::EmptyQueue)?;
        let mut center = Array1::<f32>::zeros(first.len());
        for embed in &self.items {
            center += embed;
        }
        center /= self.items.len() as f32;
        Ok(center)
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

    /// Embedding dimension, once something has been stored
    pub fn dim(&self) -> Option<usize> {
        self.items.front().map(|e| e.len())
    }

    /// Stored embeddings, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Array1<f32>> {
        self.items.iter()
    }
}

/// One [`ObjectQueue`] per track id, all sharing a capacity
#[derive(Debug, Clone)]
pub struct ObjectQueueBank {
    capacity: usize,
    queues: BTreeMap<u32, ObjectQueue>,
}

impl ObjectQueueBank {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MatchError::config("object queue capacity must be non-zero"));
        }
        Ok(Self {
            capacity,
            queues: BTreeMap::new(),
        })
    }

    /// Push `embed` into the queue of `track_id`, creating the queue on first use
    pub fn enqueue(&mut self, track_id: u32, embed: Array1<f32>) -> Result<()> {
        let queue = match self.queues.entry(track_id) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                log::trace!("Creating object queue for track {}", track_id);
                e.insert(ObjectQueue::new(self.capacity)?)
            }
        };
        queue.enqueue(embed)
    }

    pub fn get(&self, track_id: u32) -> Option<&ObjectQueue> {
        self.queues.get(&track_id)
    }

    pub fn get_mut(&mut self, track_id: u32) -> Option<&mut ObjectQueue> {
        self.queues.get_mut(&track_id)
    }

    pub fn remove(&mut self, track_id: u32) -> Option<ObjectQueue> {
        self.queues.remove(&track_id)
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    /// Number of identities with a queue
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn track_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.queues.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fifo_eviction_center() {
        let mut queue = ObjectQueue::new(3).unwrap();
        for v in [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 2.0]] {
            queue.enqueue(arr1(&v)).unwrap();
        }

        assert_eq!(queue.len(), 3);
        let stored: Vec<Vec<f32>> = queue.iter().map(|e| e.to_vec()).collect();
        assert_eq!(stored, vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 2.0]]);

        let center = queue.center().unwrap();
        assert_abs_diff_eq!(center, array![1.0, 4.0 / 3.0], epsilon = 1e-6);
    }

    #[test]
    fn test_center_matches_last_entries() {
        let capacity = 4;
        let mut queue = ObjectQueue::new(capacity).unwrap();
        let pushed: Vec<Array1<f32>> = (0..11)
            .map(|i| array![i as f32, (i * i) as f32, -(i as f32)])
            .collect();

        for (n, v) in pushed.iter().enumerate() {
            queue.enqueue(v.clone()).unwrap();
            assert!(queue.len() <= capacity);

            let start = (n + 1).saturating_sub(capacity);
            let window = &pushed[start..=n];
            let mut expected = Array1::<f32>::zeros(3);
            for w in window {
                expected += w;
            }
            expected /= window.len() as f32;
            assert_abs_diff_eq!(queue.center().unwrap(), expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_empty_queue_errors() {
        let mut queue = ObjectQueue::new(2).unwrap();
        assert!(matches!(queue.center(), Err(MatchError::EmptyQueue)));
        assert!(matches!(queue.dequeue(), Err(MatchError::EmptyQueue)));
    }

    #[test]
    fn test_dequeue_returns_oldest() {
        let mut queue = ObjectQueue::new(2).unwrap();
        queue.enqueue(array![1.0]).unwrap();
        queue.enqueue(array![2.0]).unwrap();
        assert_eq!(queue.dequeue().unwrap(), array![1.0]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_center_is_detached() {
        let mut queue = ObjectQueue::new(2).unwrap();
        queue.enqueue(array![2.0, 4.0]).unwrap();
        let mut center = queue.center().unwrap();
        center[0] = 100.0;
        assert_eq!(queue.center().unwrap(), array![2.0, 4.0]);
    }

    #[test]
    fn test_invalid_capacity_and_dimension() {
        assert!(matches!(ObjectQueue::new(0), Err(MatchError::Config(_))));

        let mut queue = ObjectQueue::new(2).unwrap();
        queue.enqueue(array![1.0, 2.0]).unwrap();
        let err = queue.enqueue(array![1.0, 2.0, 3.0]);
        assert!(matches!(err, Err(MatchError::ShapeMismatch { .. })));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_bank_per_identity() {
        let mut bank = ObjectQueueBank::new(2).unwrap();
        bank.enqueue(3, array![1.0, 1.0]).unwrap();
        bank.enqueue(3, array![3.0, 3.0]).unwrap();
        bank.enqueue(3, array![5.0, 5.0]).unwrap();
        bank.enqueue(9, array![0.0, 2.0]).unwrap();

        assert_eq!(bank.len(), 2);
        assert_eq!(bank.track_ids().collect::<Vec<_>>(), vec![3, 9]);
        assert_eq!(bank.get(3).unwrap().center().unwrap(), array![4.0, 4.0]);
        assert_eq!(bank.get(3).unwrap().capacity(), 2);

        assert!(bank.remove(9).is_some());
        assert!(bank.get(9).is_none());
        bank.clear();
        assert!(bank.is_empty());
    }
}
