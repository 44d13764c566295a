//! Priority queue for tasks waiting on a free slot.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Queue entry. Ordered by weight, then by insertion sequence so that
/// equal weights come out FIFO.
struct Entry<T> {
    weight: u32,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher weight first, and among equal
        // weights the lower (earlier) sequence number is "greater".
        self.weight
            .cmp(&other.weight)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Stable priority queue.
///
/// - `enqueue` inserts behind every entry of equal weight
/// - `dequeue` returns `None` when empty instead of waiting; the admission
///   loop decides when to look again
pub struct PriorityQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn enqueue(&mut self, item: T, weight: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { weight, seq, item });
    }

    /// Remove and return the highest-priority entry.
    pub fn dequeue(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    /// Remove the first entry (in dequeue order) matching `predicate`.
    ///
    /// Returns the removed item, or `None` if nothing matched.
    pub fn remove(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let mut entries = std::mem::take(&mut self.heap).into_sorted_vec();
        // into_sorted_vec is ascending, so search from the back
        let position = entries.iter().rposition(|entry| predicate(&entry.item));
        let removed = position.map(|p| entries.remove(p).item);
        self.heap = BinaryHeap::from(entries);
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use rstest::rstest;

    fn drain(queue: &mut PriorityQueue<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| queue.dequeue()).collect()
    }

    #[test]
    fn empty_queue_returns_none() {
        let mut queue: PriorityQueue<u32> = PriorityQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn higher_weight_comes_first() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("low", Priority::Low.weight());
        queue.enqueue("critical", Priority::Critical.weight());
        queue.enqueue("normal", Priority::Normal.weight());
        queue.enqueue("high", Priority::High.weight());

        assert_eq!(drain(&mut queue), vec!["critical", "high", "normal", "low"]);
    }

    #[rstest]
    #[case::low(Priority::Low)]
    #[case::normal(Priority::Normal)]
    #[case::critical(Priority::Critical)]
    fn equal_weights_are_fifo(#[case] priority: Priority) {
        let mut queue = PriorityQueue::new();
        for item in ["a", "b", "c", "d", "e"] {
            queue.enqueue(item, priority.weight());
        }

        assert_eq!(drain(&mut queue), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn fifo_holds_across_interleaved_weights() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("n1", 2);
        queue.enqueue("h1", 3);
        queue.enqueue("n2", 2);
        queue.enqueue("h2", 3);
        queue.enqueue("n3", 2);

        assert_eq!(drain(&mut queue), vec!["h1", "h2", "n1", "n2", "n3"]);
    }

    #[test]
    fn remove_takes_matching_entry_and_keeps_order() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("a", 2);
        queue.enqueue("b", 2);
        queue.enqueue("c", 2);
        queue.enqueue("x", 4);

        assert_eq!(queue.remove(|item| *item == "b"), Some("b"));
        assert_eq!(queue.remove(|item| *item == "missing"), None);
        assert_eq!(queue.len(), 3);

        queue.enqueue("d", 2);
        assert_eq!(drain(&mut queue), vec!["x", "a", "c", "d"]);
    }
}
