use std::collections::{VecDeque, vec_deque};

/// Fixed-capacity sliding window over the most recent values.
///
/// Insertion order defines recency: once the window holds `capacity` values,
/// every [`push`](Self::push) evicts the oldest one.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow<T> {
    capacity: usize,
    values: VecDeque<T>,
}

impl<T> RollingWindow<T> {
    /// Creates an empty window holding at most `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a value, returning the evicted oldest value if the window was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        evicted
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` if the window holds `capacity` values.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Changes the capacity, evicting the oldest values that no longer fit.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn resize(&mut self, capacity: usize) {
        assert!(capacity > 0, "window capacity must be positive");
        let excess = self.values.len().saturating_sub(capacity);
        self.values.drain(..excess);
        self.capacity = capacity;
    }

    /// Removes every value, keeping the capacity.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterates from the oldest to the newest value.
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.values.iter()
    }

    /// Returns the newest value.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.values.back()
    }
}

impl<'a, T> IntoIterator for &'a RollingWindow<T> {
    type Item = &'a T;
    type IntoIter = vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut window = RollingWindow::new(3);
        assert!(window.is_empty());
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert!(!window.is_full());
        assert_eq!(window.push(3), None);
        assert!(window.is_full());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut window = RollingWindow::new(2);
        window.push(1);
        window.push(2);
        assert_eq!(window.push(3), Some(1));
        assert_eq!(window.push(4), Some(2));
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(window.latest(), Some(&4));
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut window = RollingWindow::new(2);
        window.push(1.0);
        window.push(2.0);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 2);
        window.push(3.0);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_resize() {
        let mut window = RollingWindow::new(4);
        for value in 1..=4 {
            window.push(value);
        }
        window.resize(2);
        assert!(window.is_full());
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(window.push(5), Some(3));

        window.resize(3);
        assert!(!window.is_full());
        assert_eq!(window.push(6), None);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "window capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _ = RollingWindow::<f64>::new(0);
    }
}
