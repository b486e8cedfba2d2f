//! Growable array with the compiler's growth policy.

/// Append-only vector used for block lists, order lists and use counts.
///
/// Growth doubles below 128 elements and switches to 1.5x above; the storage
/// never shrinks and [`GrowableArray::reset`] only rewinds the use count.
/// Not thread-safe.
#[derive(Debug, Clone)]
pub struct GrowableArray<T: Copy + Default> {
    storage: Vec<T>,
    num_used: usize,
}

impl<T: Copy + Default> GrowableArray<T> {
    /// Create with room for `init_length` elements.
    pub fn new(init_length: usize) -> Self {
        GrowableArray {
            storage: vec![T::default(); init_length.max(1)],
            num_used: 0,
        }
    }

    /// Grow the storage to hold at least `new_length` elements.
    pub fn resize(&mut self, new_length: usize) {
        let allocated = self.storage.len();
        if new_length <= allocated {
            return;
        }
        let target = if allocated < 128 {
            allocated * 2
        } else {
            allocated + (allocated >> 1)
        };
        self.storage.resize(target.max(new_length), T::default());
    }

    /// Rewind the use count; keeps the storage.
    pub fn reset(&mut self) {
        self.num_used = 0;
    }

    /// Append an element, growing if necessary.
    pub fn insert(&mut self, elem: T) {
        if self.num_used == self.storage.len() {
            self.resize(self.num_used + 1);
        }
        self.storage[self.num_used] = elem;
        self.num_used += 1;
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> T {
        debug_assert!(index < self.num_used);
        self.storage[index]
    }

    /// Overwrite the element at `index`; must already be in use.
    pub fn put(&mut self, index: usize, elem: T) {
        debug_assert!(index < self.num_used);
        self.storage[index] = elem;
    }

    /// Number of elements in use.
    pub fn size(&self) -> usize {
        self.num_used
    }

    /// Allocated capacity.
    pub fn num_allocated(&self) -> usize {
        self.storage.len()
    }

    /// True when no element is in use.
    pub fn is_empty(&self) -> bool {
        self.num_used == 0
    }

    /// Iterate the in-use elements.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.storage[..self.num_used].iter().copied()
    }

    /// In-use elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.storage[..self.num_used]
    }
}

impl<T: Copy + Default + PartialEq> GrowableArray<T> {
    /// Remove the first occurrence of `element`, shifting the tail down.
    pub fn delete(&mut self, element: T) {
        let mut found = false;
        for i in 0..self.num_used.saturating_sub(1) {
            if !found && self.storage[i] == element {
                found = true;
            }
            if found {
                self.storage[i] = self.storage[i + 1];
            }
        }
        debug_assert!(found || self.storage[self.num_used - 1] == element);
        self.num_used -= 1;
    }
}

impl GrowableArray<u32> {
    /// Bump the counter at `index`.
    pub fn increment(&mut self, index: usize) {
        debug_assert!(index < self.num_used);
        self.storage[index] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn insert_and_get() {
        let mut a = GrowableArray::new(2);
        a.insert(10u32);
        a.insert(20);
        a.insert(30);
        assert_eq!(a.size(), 3);
        assert_eq!(a.get(2), 30);
    }

    #[test_case(4, 8; "small doubles")]
    #[test_case(128, 192; "large grows by half")]
    fn growth_policy(start: usize, expect: usize) {
        let mut a: GrowableArray<u32> = GrowableArray::new(start);
        a.resize(start + 1);
        assert_eq!(a.num_allocated(), expect);
    }

    #[test]
    fn reset_keeps_storage() {
        let mut a = GrowableArray::new(4);
        for i in 0..10u32 {
            a.insert(i);
        }
        let cap = a.num_allocated();
        a.reset();
        assert_eq!(a.size(), 0);
        assert_eq!(a.num_allocated(), cap);
    }

    #[test]
    fn delete_shifts_tail() {
        let mut a = GrowableArray::new(4);
        for i in [1u32, 2, 3, 4] {
            a.insert(i);
        }
        a.delete(2);
        assert_eq!(a.as_slice(), &[1, 3, 4]);
        a.delete(4);
        assert_eq!(a.as_slice(), &[1, 3]);
    }

    #[test]
    fn increment_counts() {
        let mut a = GrowableArray::new(2);
        a.insert(0u32);
        a.increment(0);
        a.increment(0);
        assert_eq!(a.get(0), 2);
    }
}
