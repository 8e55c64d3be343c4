//! Binary min-heap ordered by an explicit comparator.

use std::cmp::Ordering;

/// A min-heap: [`pop`](Self::pop) returns the least element under `compare`.
pub struct OrderedHeap<T, C> {
    items: Vec<T>,
    compare: C,
}

impl<T, C> OrderedHeap<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(compare: C) -> Self {
        Self::with_capacity(0, compare)
    }

    pub fn with_capacity(capacity: usize, compare: C) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            compare,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    pub fn pop(&mut self) -> Option<T> {
        let last = self.items.len().checked_sub(1)?;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.compare)(&self.items[a], &self.items[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.items.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == i {
                return;
            }
            self.items.swap(i, smallest);
            i = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pops_in_comparator_order() {
        let mut heap = OrderedHeap::new(|a: &i32, b: &i32| b.cmp(a));
        for n in [3, 9, 1, 7] {
            heap.push(n);
        }
        assert_eq!(heap.peek(), Some(&9));
        let drained: Vec<_> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(drained, vec![9, 7, 3, 1]);
        assert!(heap.is_empty());
        assert_eq!(heap.pop(), None);
    }

    proptest! {
        #[test]
        fn heap_sorts(mut values in proptest::collection::vec(any::<u32>(), 0..200)) {
            let mut heap = OrderedHeap::with_capacity(values.len(), |a: &u32, b: &u32| a.cmp(b));
            for v in &values {
                heap.push(*v);
            }
            let drained: Vec<_> = std::iter::from_fn(|| heap.pop()).collect();
            values.sort_unstable();
            prop_assert_eq!(drained, values);
        }
    }
}
