//! Content-addressed interning of produced byte vectors.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

/// Sampling hash over byte vectors.
///
/// Large arrays are hashed from 16 pseudo-random positions (linear
/// congruential step) so interning a multi-megabyte method body never walks
/// the whole array; small arrays fold every byte.
pub fn dedupe_hash(data: &[u8]) -> u64 {
    const SMALL_ARRAY_THRESHOLD: usize = 16;
    const RANDOM_HASH_COUNT: usize = 16;
    let mut hash: u64 = 0;
    if data.len() < SMALL_ARRAY_THRESHOLD {
        for &byte in data {
            hash = hash.wrapping_mul(54).wrapping_add(byte as u64);
        }
    } else {
        for i in 0..RANDOM_HASH_COUNT {
            let r = (i as u64).wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let byte = data[(r % data.len() as u64) as usize];
            hash = hash.wrapping_mul(54).wrapping_add(byte as u64);
        }
    }
    hash
}

/// Thread-safe content-addressed set of byte vectors.
///
/// `add` returns the canonical instance for the given content; concurrent
/// callers inserting equal vectors observe the same instance.  The set owns
/// its canonical values for its whole life.
#[derive(Default)]
pub struct DedupeSet {
    storage: Mutex<HashMap<u64, Vec<Arc<Vec<u8>>>>>,
}

impl DedupeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning the canonical instance.
    pub fn add(&self, value: Vec<u8>) -> Arc<Vec<u8>> {
        let hash = dedupe_hash(&value);
        let mut storage = self.storage.lock().expect("dedupe set poisoned");
        let bucket = storage.entry(hash).or_default();
        if let Some(existing) = bucket.iter().find(|v| ***v == value) {
            return Arc::clone(existing);
        }
        let canonical = Arc::new(value);
        bucket.push(Arc::clone(&canonical));
        canonical
    }

    /// Number of distinct values interned.
    pub fn len(&self) -> usize {
        self.storage
            .lock()
            .expect("dedupe set poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    /// True when nothing was interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn interning_is_idempotent(data: Vec<u8>) -> bool {
        let set = DedupeSet::new();
        let first = set.add(data.clone());
        let second = set.add(data);
        Arc::ptr_eq(&first, &second) && set.len() == 1
    }

    #[test]
    fn equal_content_interns_to_one_instance() {
        let set = DedupeSet::new();
        let a = set.add(vec![1, 2, 3]);
        let b = set.add(vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(set.len(), 1);
        let c = set.add(vec![1, 2, 4]);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn hash_collisions_still_compare_content() {
        // Two vectors sampling identically must still be distinguished.
        let set = DedupeSet::new();
        let mut a = vec![0u8; 64];
        let b = vec![0u8; 64];
        // Perturb a position the sampler never reads for len == 64.
        let sampled: Vec<usize> = (0..16u64)
            .map(|i| ((i.wrapping_mul(1_103_515_245).wrapping_add(12_345)) % 64) as usize)
            .collect();
        let untouched = (0..64).find(|i| !sampled.contains(i)).expect("gap exists");
        a[untouched] = 7;
        assert_eq!(dedupe_hash(&a), dedupe_hash(&b));
        let ia = set.add(a);
        let ib = set.add(b);
        assert!(!Arc::ptr_eq(&ia, &ib));
    }

    #[test]
    fn small_arrays_fold_every_byte() {
        assert_ne!(dedupe_hash(&[1, 2, 3]), dedupe_hash(&[1, 2, 4]));
    }

    #[test]
    fn concurrent_adds_agree() {
        let set = Arc::new(DedupeSet::new());
        let payload: Vec<u8> = (0..255).collect();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let set = Arc::clone(&set);
            let payload = payload.clone();
            handles.push(std::thread::spawn(move || set.add(payload)));
        }
        let canonical: Vec<Arc<Vec<u8>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(canonical.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(set.len(), 1);
    }
}
