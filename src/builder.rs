//! A builder pattern interface for constructing a [Boss] graph.

use simple_sds_sbwt::int_vector::IntVector;

use crate::alphabet::Alphabet;
use crate::boss::Boss;
use crate::chunk::BossChunk;
use crate::construct::{self, BuildParams};
use crate::error::{Error, Result};
use crate::kmer::{CountedKmer, PackedKmer};
use crate::SeqStream;

/// Builds a BOSS graph from sequence streams. The packed k-mer width
/// (64/128/256 bits) is selected from `(k+1) * bits_per_char` at run time.
#[derive(Clone, Debug)]
pub struct BossBuilder {
    alphabet: Alphabet,
    k: usize,
    canonical: bool,
    num_threads: usize,
    memory_preallocated: usize,
    count_kmers: bool,
    bits_per_count: u8,
    suffix_bucket_len: usize,
}

impl BossBuilder {
    /// Sets up a builder with default values: non-canonical, one thread, no
    /// preallocation, no k-mer counts, monolithic construction.
    pub fn new(alphabet: Alphabet, k: usize) -> Self {
        Self {
            alphabet,
            k,
            canonical: false,
            num_threads: 1,
            memory_preallocated: 0,
            count_kmers: false,
            bits_per_count: 8,
            suffix_bucket_len: 0,
        }
    }

    /// Whether to also index the reverse complement of every sequence.
    pub fn canonical(mut self, enable: bool) -> Self {
        self.canonical = enable;
        self
    }

    /// Number of k-mer producer threads.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Byte budget to preallocate for the k-mer buffer.
    pub fn memory_preallocated(mut self, bytes: usize) -> Self {
        self.memory_preallocated = bytes;
        self
    }

    /// Whether to track per-k-mer occurrence counts, emitted as the edge
    /// weight array with the given saturating bit width.
    pub fn count_kmers(mut self, enable: bool, bits_per_count: u8) -> Self {
        self.count_kmers = enable;
        self.bits_per_count = bits_per_count;
        self
    }

    /// Partition construction into node-suffix buckets of this length
    /// (0 disables bucketing). Bucketed builds need a re-streamable input;
    /// see [BossBuilder::build_chunk_with_restream].
    pub fn suffix_bucket_len(mut self, len: usize) -> Self {
        self.suffix_bucket_len = len;
        self
    }

    fn params(&self) -> BuildParams {
        let mut params = BuildParams::new(self.alphabet.clone(), self.k);
        params.canonical = self.canonical;
        params.num_threads = self.num_threads;
        params.memory_preallocated = self.memory_preallocated;
        params.bits_per_count = if self.count_kmers { Some(self.bits_per_count) } else { None };
        params
    }

    fn kmer_width(&self) -> Result<usize> {
        let needed = (self.k + 1) * self.alphabet.bits_per_char();
        match needed {
            0..=64 => Ok(1),
            65..=128 => Ok(2),
            129..=256 => Ok(4),
            _ => Err(Error::BadConfig(format!(
                "(k+1) * bits_per_char = {} exceeds the largest (256-bit) k-mer",
                needed
            ))),
        }
    }

    /// Builds the chunk from a single pass over the input stream.
    pub fn build_chunk<S: SeqStream>(&self, input: &mut S) -> Result<BossChunk> {
        if self.suffix_bucket_len != 0 {
            return Err(Error::BadConfig(
                "bucketed construction needs a re-streamable input".to_string(),
            ));
        }
        let params = self.params();
        match (self.kmer_width()?, self.count_kmers) {
            (1, false) => construct::build_chunk::<1, PackedKmer<1>, S>(&params, input),
            (1, true) => construct::build_chunk::<1, CountedKmer<1>, S>(&params, input),
            (2, false) => construct::build_chunk::<2, PackedKmer<2>, S>(&params, input),
            (2, true) => construct::build_chunk::<2, CountedKmer<2>, S>(&params, input),
            (4, false) => construct::build_chunk::<4, PackedKmer<4>, S>(&params, input),
            (4, true) => construct::build_chunk::<4, CountedKmer<4>, S>(&params, input),
            _ => unreachable!(),
        }
    }

    /// Builds the chunk from one stream per suffix bucket (or one stream
    /// total when bucketing is off).
    pub fn build_chunk_with_restream<S, F>(&self, mut make_stream: F) -> Result<BossChunk>
    where
        S: SeqStream,
        F: FnMut() -> S,
    {
        if self.suffix_bucket_len == 0 {
            return self.build_chunk(&mut make_stream());
        }
        let params = self.params();
        let len = self.suffix_bucket_len;
        match (self.kmer_width()?, self.count_kmers) {
            (1, false) => construct::build_chunk_by_suffix_buckets::<1, PackedKmer<1>, S, F>(
                &params,
                make_stream,
                len,
            ),
            (1, true) => construct::build_chunk_by_suffix_buckets::<1, CountedKmer<1>, S, F>(
                &params,
                make_stream,
                len,
            ),
            (2, false) => construct::build_chunk_by_suffix_buckets::<2, PackedKmer<2>, S, F>(
                &params,
                make_stream,
                len,
            ),
            (2, true) => construct::build_chunk_by_suffix_buckets::<2, CountedKmer<2>, S, F>(
                &params,
                make_stream,
                len,
            ),
            (4, false) => construct::build_chunk_by_suffix_buckets::<4, PackedKmer<4>, S, F>(
                &params,
                make_stream,
                len,
            ),
            (4, true) => construct::build_chunk_by_suffix_buckets::<4, CountedKmer<4>, S, F>(
                &params,
                make_stream,
                len,
            ),
            _ => unreachable!(),
        }
    }

    /// Builds the graph (and the weight array, if counting) from a stream.
    pub fn build<S: SeqStream>(&self, input: &mut S) -> Result<(Boss, Option<IntVector>)> {
        Ok(Boss::from_chunk(self.build_chunk(input)?))
    }

    /// Builds the graph from ASCII sequences.
    pub fn build_from_slices(&self, input: &[&[u8]]) -> Result<(Boss, Option<IntVector>)> {
        let chunk = self.build_chunk_with_restream(|| crate::util::SliceSeqStream::new(input))?;
        Ok(Boss::from_chunk(chunk))
    }

    /// Builds the graph from owned ASCII sequences.
    pub fn build_from_vecs(&self, input: &[Vec<u8>]) -> Result<(Boss, Option<IntVector>)> {
        let chunk = self.build_chunk_with_restream(|| crate::util::VecSeqStream::new(input))?;
        Ok(Boss::from_chunk(chunk))
    }
}
