//! Per-label Bloom filters over the (k+1)-mers of annotated sequences.
//!
//! Lookups are lossy in one direction only: a label that was inserted for a
//! k-mer is always reported (no false negatives), extra labels may appear
//! and are suppressed downstream by the graph-guided
//! [correction](crate::annotate::correct).

use std::io::{Read, Write};
use std::path::Path;

use crate::alphabet::Alphabet;
use crate::annotate::bitset;
use crate::annotate::hashing::EdgeHasher;
use crate::error::{Error, Result};
use crate::serialize;

/// File extension of serialized annotators.
pub const FILE_EXTENSION: &str = ".annot.dbg";

/// One label's bit array. The size is fixed at construction; bit positions
/// are hash values reduced modulo the size.
#[derive(Clone, Debug, Default)]
pub struct BloomFilter {
    bits: Vec<u64>,
    m: usize,
}

impl BloomFilter {
    pub fn new(m: usize) -> Self {
        Self { bits: vec![0; m.div_ceil(64)], m }
    }

    pub fn size(&self) -> usize {
        self.m
    }

    pub fn is_empty(&self) -> bool {
        self.m == 0
    }

    pub fn insert(&mut self, hashes: impl Iterator<Item = u64>) {
        debug_assert!(self.m > 0);
        for h in hashes {
            bitset::set_bit(&mut self.bits, (h % self.m as u64) as usize);
        }
    }

    pub fn contains(&self, hashes: impl Iterator<Item = u64>) -> bool {
        if self.m == 0 {
            return false;
        }
        for h in hashes {
            if !bitset::get_bit(&self.bits, (h % self.m as u64) as usize) {
                return false;
            }
        }
        true
    }
}

/// The per-label Bloom annotation of a graph's (k+1)-mers.
pub struct BloomAnnotator {
    alphabet: Alphabet,
    k: usize,
    num_hash_functions: usize,
    bloom_size_factor: f64,
    columns: Vec<BloomFilter>,
}

impl BloomAnnotator {
    /// `k` is the node length of the annotated graph; annotated items are
    /// its (k+1)-mer edges.
    pub fn new(
        alphabet: Alphabet,
        k: usize,
        num_hash_functions: usize,
        bloom_size_factor: f64,
    ) -> Self {
        assert!(num_hash_functions > 0);
        assert!(bloom_size_factor > 0.0);
        Self {
            alphabet,
            k,
            num_hash_functions,
            bloom_size_factor,
            columns: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_hash_functions(&self) -> usize {
        self.num_hash_functions
    }

    /// A hasher positioned on the given edge k-mer codes.
    pub fn hasher_for(&self, kmer_codes: &[u8]) -> EdgeHasher {
        assert_eq!(kmer_codes.len(), self.k + 1);
        EdgeHasher::new(kmer_codes, self.num_hash_functions)
    }

    /// Annotates every (k+1)-mer of the sequence with `column`. The column's
    /// filter is sized on first insert from the sequence length; sequences
    /// shorter than k+1 are skipped.
    pub fn add_sequence(&mut self, sequence: &[u8], column: usize) {
        let codes = self.alphabet.encode_sequence(sequence);
        if codes.len() < self.k + 1 {
            return;
        }
        if column >= self.columns.len() {
            self.columns.resize(column + 1, BloomFilter::default());
        }
        if self.columns[column].is_empty() {
            let m = (self.bloom_size_factor * (codes.len() - self.k) as f64) as usize + 1;
            self.columns[column] = BloomFilter::new(m);
            log::debug!("Sized Bloom column {} at {} bits", column, m);
        }

        let mut hasher = EdgeHasher::new(&codes[..self.k + 1], self.num_hash_functions);
        self.columns[column].insert(hasher.hashes());
        for &c in &codes[self.k + 1..] {
            hasher.update(c);
            self.columns[column].insert(hasher.hashes());
        }
    }

    /// Annotates the sequence with a fresh label and returns its id.
    pub fn add_column(&mut self, sequence: &[u8]) -> usize {
        let column = self.columns.len();
        self.add_sequence(sequence, column);
        column
    }

    /// The packed set of columns whose filter contains the hasher's window.
    pub fn annotation_from_hasher(&self, hasher: &EdgeHasher) -> Vec<u64> {
        let mut packed = vec![0u64; bitset::words_for(self.columns.len())];
        for (c, filter) in self.columns.iter().enumerate() {
            if filter.contains(hasher.hashes()) {
                bitset::set_bit(&mut packed, c);
            }
        }
        packed
    }

    /// The packed annotation of one (k+1)-mer given as character codes.
    pub fn annotation_from_kmer(&self, kmer_codes: &[u8]) -> Vec<u64> {
        self.annotation_from_hasher(&self.hasher_for(kmer_codes))
    }

    /// Serializes the annotator: a stream of per-column `(m, h, bits)`.
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n = serialize::write_number(out, self.columns.len() as u64)?;
        for filter in self.columns.iter() {
            n += serialize::write_number(out, filter.m as u64)?;
            n += serialize::write_number(out, self.num_hash_functions as u64)?;
            n += serialize::write_number_vector(out, &filter.bits)?;
        }
        Ok(n)
    }

    /// Loads the columns serialized by [`BloomAnnotator::serialize`] into an
    /// annotator configured like `self` (the alphabet, k and sizing policy
    /// are not part of the file).
    pub fn load_columns<R: Read>(&mut self, input: &mut R) -> Result<()> {
        let err = |reason: String| Error::Load { what: "Bloom annotator", reason };
        let n_columns = serialize::read_number(input).map_err(|e| err(e.to_string()))? as usize;
        let mut columns = Vec::with_capacity(n_columns);
        for c in 0..n_columns {
            let m = serialize::read_number(input).map_err(|e| err(e.to_string()))? as usize;
            let h = serialize::read_number(input).map_err(|e| err(e.to_string()))? as usize;
            if h != self.num_hash_functions {
                return Err(err(format!(
                    "column {} uses {} hash functions, annotator uses {}",
                    c, h, self.num_hash_functions
                )));
            }
            let bits = serialize::read_number_vector(input).map_err(|e| err(e.to_string()))?;
            if bits.len() != m.div_ceil(64) {
                return Err(err(format!("column {} bit vector length mismatch", c)));
            }
            columns.push(BloomFilter { bits, m });
        }
        self.columns = columns;
        Ok(())
    }

    pub fn serialize_to_file(&self, path: &Path) -> Result<()> {
        let path = with_extension(path);
        let mut out = std::io::BufWriter::new(std::fs::File::create(&path)?);
        self.serialize(&mut out)?;
        Ok(())
    }

    pub fn load_columns_from_file(&mut self, path: &Path) -> Result<()> {
        let path = with_extension(path);
        let mut input = std::io::BufReader::new(std::fs::File::open(&path).map_err(|e| {
            Error::load("Bloom annotator", format!("{}: {}", path.display(), e))
        })?);
        self.load_columns(&mut input)
    }
}

fn with_extension(path: &Path) -> std::path::PathBuf {
    let s = path.to_string_lossy();
    if s.ends_with(FILE_EXTENSION) {
        path.to_path_buf()
    } else {
        std::path::PathBuf::from(format!("{}{}", s, FILE_EXTENSION))
    }
}
