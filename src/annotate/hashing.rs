//! Rolling hashes over (k+1)-mer windows.
//!
//! One 64-bit value rolls with the window (rotate-and-xor over a per
//! character seed table), and the h Bloom hash functions derive from it by
//! double hashing. Moving to the forward neighbor of an edge is an
//! `update`, moving to the backward neighbor a `reverse_update`, so a graph
//! walk pays O(1) hashing per step.

const SEED_TABLE: u64 = 0x9e3779b97f4a7c15;
const SEED_A: u64 = 0xbf58476d1ce4e5b9;
const SEED_B: u64 = 0x94d049bb133111eb;

fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

#[inline]
fn table(c: u8) -> u64 {
    mix64((c as u64 + 1).wrapping_mul(SEED_TABLE))
}

/// A rolling hasher positioned on one window of character codes.
#[derive(Clone, Debug)]
pub struct EdgeHasher {
    window: Vec<u8>,
    head: usize, // index of the first window character in the ring
    hash: u64,
    num_hashes: usize,
}

impl EdgeHasher {
    /// Positions the hasher on the given window (the k+1 codes of an edge).
    pub fn new(codes: &[u8], num_hashes: usize) -> Self {
        assert!(!codes.is_empty());
        let len = codes.len();
        let mut hash = 0u64;
        for (j, &c) in codes.iter().enumerate() {
            hash ^= table(c).rotate_left((len - 1 - j) as u32);
        }
        Self { window: codes.to_vec(), head: 0, hash, num_hashes }
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    fn len(&self) -> usize {
        self.window.len()
    }

    /// Slides the window one step forward: drops the first character and
    /// appends `c`.
    pub fn update(&mut self, c: u8) {
        let len = self.len() as u32;
        let out = self.window[self.head];
        self.hash = self.hash.rotate_left(1) ^ table(out).rotate_left(len) ^ table(c);
        self.window[self.head] = c;
        self.head = (self.head + 1) % self.len();
    }

    /// Slides the window one step backward: drops the last character and
    /// prepends `c`.
    pub fn reverse_update(&mut self, c: u8) {
        let len = self.len() as u32;
        let tail = (self.head + self.len() - 1) % self.len();
        let out = self.window[tail];
        self.hash = (self.hash ^ table(out)).rotate_right(1) ^ table(c).rotate_left(len - 1);
        self.window[tail] = c;
        self.head = tail;
    }

    /// A single 64-bit fingerprint of the current window.
    pub fn fingerprint(&self) -> u64 {
        mix64(self.hash ^ SEED_A)
    }

    /// The i-th of the h hash values, derived by double hashing.
    #[inline]
    pub fn hash_value(&self, i: usize) -> u64 {
        let h1 = mix64(self.hash ^ SEED_A);
        let h2 = mix64(self.hash ^ SEED_B) | 1;
        h1.wrapping_add((i as u64).wrapping_mul(h2))
    }

    /// All h hash values of the current window.
    pub fn hashes(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.num_hashes).map(move |i| self.hash_value(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_matches_from_scratch() {
        let seq: Vec<u8> = vec![1, 2, 3, 4, 0, 1, 1, 2, 4, 3, 2, 1];
        let w = 5;
        let mut hasher = EdgeHasher::new(&seq[0..w], 3);
        for start in 1..=seq.len() - w {
            hasher.update(seq[start + w - 1]);
            let fresh = EdgeHasher::new(&seq[start..start + w], 3);
            assert_eq!(hasher.fingerprint(), fresh.fingerprint());
            assert_eq!(
                hasher.hashes().collect::<Vec<u64>>(),
                fresh.hashes().collect::<Vec<u64>>()
            );
        }
    }

    #[test]
    fn reverse_update_matches_from_scratch() {
        let seq: Vec<u8> = vec![1, 2, 3, 4, 0, 1, 1, 2, 4, 3, 2, 1];
        let w = 4;
        let last = seq.len() - w;
        let mut hasher = EdgeHasher::new(&seq[last..], 2);
        for start in (0..last).rev() {
            hasher.reverse_update(seq[start]);
            let fresh = EdgeHasher::new(&seq[start..start + w], 2);
            assert_eq!(hasher.fingerprint(), fresh.fingerprint());
        }
    }

    #[test]
    fn updates_invert_each_other() {
        let codes = [1u8, 4, 2, 2, 3];
        let mut hasher = EdgeHasher::new(&codes, 2);
        let before = hasher.fingerprint();
        hasher.update(3);
        hasher.reverse_update(1);
        assert_eq!(hasher.fingerprint(), before);
    }

    #[test]
    fn distinct_windows_distinct_hashes() {
        let a = EdgeHasher::new(&[1, 2, 3], 2);
        let b = EdgeHasher::new(&[3, 2, 1], 2);
        let c = EdgeHasher::new(&[1, 2, 4], 2);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
