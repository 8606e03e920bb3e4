//! Exact per-label annotation, used as the oracle when measuring the Bloom
//! annotator's false positive rate. Keyed by a single 64-bit rolling
//! fingerprint, so hash collisions are a controlled source of error.

use std::collections::HashMap;

use crate::alphabet::Alphabet;
use crate::annotate::bitset;
use crate::annotate::hashing::EdgeHasher;

pub struct PreciseAnnotator {
    alphabet: Alphabet,
    k: usize,
    map: HashMap<u64, Vec<u64>>,
    num_columns: usize,
}

impl PreciseAnnotator {
    pub fn new(alphabet: Alphabet, k: usize) -> Self {
        Self { alphabet, k, map: HashMap::new(), num_columns: 0 }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Annotates every (k+1)-mer of the sequence with `column`.
    pub fn add_sequence(&mut self, sequence: &[u8], column: usize) {
        let codes = self.alphabet.encode_sequence(sequence);
        if codes.len() < self.k + 1 {
            return;
        }
        self.num_columns = self.num_columns.max(column + 1);

        let mut hasher = EdgeHasher::new(&codes[..self.k + 1], 1);
        self.insert(hasher.fingerprint(), column);
        for &c in &codes[self.k + 1..] {
            hasher.update(c);
            self.insert(hasher.fingerprint(), column);
        }
    }

    pub fn add_column(&mut self, sequence: &[u8]) -> usize {
        let column = self.num_columns;
        self.add_sequence(sequence, column);
        column
    }

    fn insert(&mut self, fingerprint: u64, column: usize) {
        let packed = self.map.entry(fingerprint).or_default();
        if packed.len() < bitset::words_for(column + 1) {
            packed.resize(bitset::words_for(column + 1), 0);
        }
        bitset::set_bit(packed, column);
    }

    /// The exact packed annotation of one (k+1)-mer given as codes, padded
    /// to the annotator's column count.
    pub fn annotation_from_kmer(&self, kmer_codes: &[u8]) -> Vec<u64> {
        assert_eq!(kmer_codes.len(), self.k + 1);
        let fingerprint = EdgeHasher::new(kmer_codes, 1).fingerprint();
        let mut packed = vec![0u64; bitset::words_for(self.num_columns)];
        if let Some(stored) = self.map.get(&fingerprint) {
            packed[..stored.len()].copy_from_slice(stored);
        }
        packed
    }
}
