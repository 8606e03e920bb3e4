//! The BOSS construction pipeline: k-mer collection, source dummy recovery
//! and chunk building, monolithic or partitioned by node-suffix buckets.

pub mod collector;
pub mod dummies;
pub mod extract;

pub use collector::KmerCollector;
pub use dummies::recover_source_dummy_kmers;

use rayon::prelude::*;

use crate::alphabet::{Alphabet, SENTINEL_CODE};
use crate::chunk::BossChunk;
use crate::error::{Error, Result};
use crate::kmer::{KmerRecord, PackedKmer};
use crate::SeqStream;

/// Sorts `array[offset..]` by k-mer and removes duplicates, merging counts.
pub(crate) fn sort_and_dedup<const B: usize, T: KmerRecord<B>>(
    array: &mut Vec<T>,
    offset: usize,
) {
    array[offset..].sort_unstable_by(|x, y| x.kmer().cmp(y.kmer()));
    dedup_from(array, offset);
}

/// Parallel variant of [`sort_and_dedup`] for large arrays.
pub(crate) fn par_sort_and_dedup<const B: usize, T: KmerRecord<B>>(
    array: &mut Vec<T>,
    offset: usize,
) {
    array[offset..].par_sort_unstable_by(|x, y| x.kmer().cmp(y.kmer()));
    dedup_from(array, offset);
}

fn dedup_from<const B: usize, T: KmerRecord<B>>(array: &mut Vec<T>, offset: usize) {
    if array.len() <= offset + 1 {
        return;
    }
    let mut write = offset + 1;
    for read in offset + 1..array.len() {
        if array[read].kmer() == array[write - 1].kmer() {
            let r = array[read];
            array[write - 1].absorb(&r);
        } else {
            array[write] = array[read];
            write += 1;
        }
    }
    array.truncate(write);
}

/// Frees space by deduplicating `kmers[offset..]` when capacity runs out.
pub(crate) fn shrink_kmers<const B: usize, T: KmerRecord<B>>(
    kmers: &mut Vec<T>,
    offset: usize,
) {
    let before = kmers.len();
    par_sort_and_dedup(kmers, offset);
    log::debug!(
        "Allocated capacity exceeded, filtered out non-unique k-mers: {} -> {}",
        before,
        kmers.len()
    );
}

/// All node suffixes of the given length in co-lexicographic order, which is
/// the order in which the corresponding buckets concatenate into the global
/// k-mer order.
pub(crate) fn colex_sorted_suffixes(alph_size: usize, len: usize) -> Vec<Vec<u8>> {
    let mut suffixes = Vec::with_capacity(alph_size.pow(len as u32));
    for i in 0..alph_size.pow(len as u32) {
        let mut suffix = Vec::with_capacity(len);
        let mut j = i;
        for _ in 0..len {
            suffix.push((j % alph_size) as u8);
            j /= alph_size;
        }
        suffixes.push(suffix);
    }
    suffixes
}

/// The trailing `len` node characters of a record, as an integer comparable
/// in bucket order (position k is the most significant).
fn suffix_key<const B: usize, T: KmerRecord<B>>(
    record: &T,
    k: usize,
    bits: usize,
    len: usize,
) -> u64 {
    let mut key = 0u64;
    for pos in (k + 1 - len..=k).rev() {
        key = (key << bits) | record.kmer().get(pos, bits) as u64;
    }
    key
}

fn suffix_to_key(suffix: &[u8], bits: usize) -> u64 {
    // suffix[0] is the earliest trailing character, hence least significant.
    let mut key = 0u64;
    for &c in suffix.iter().rev() {
        key = (key << bits) | c as u64;
    }
    key
}

/// Configuration for one chunk build.
#[derive(Clone, Debug)]
pub struct BuildParams {
    pub alphabet: Alphabet,
    /// Node length; the pipeline collects (k+1)-mers.
    pub k: usize,
    pub canonical: bool,
    pub num_threads: usize,
    /// Byte budget preallocated for the k-mer buffer.
    pub memory_preallocated: usize,
    /// Weight width in bits, if k-mer counts are tracked.
    pub bits_per_count: Option<u8>,
    /// Producer chunk size; [`collector::CHUNK_KMERS`] unless testing.
    pub chunk_kmers: usize,
}

impl BuildParams {
    pub fn new(alphabet: Alphabet, k: usize) -> Self {
        Self {
            alphabet,
            k,
            canonical: false,
            num_threads: 1,
            memory_preallocated: 0,
            bits_per_count: None,
            chunk_kmers: collector::CHUNK_KMERS,
        }
    }
}

fn finish_kmers<const B: usize, T: KmerRecord<B>>(
    params: &BuildParams,
    kmers: &mut Vec<T>,
) {
    let bits = params.alphabet.bits_per_char();
    if kmers.is_empty() {
        // An empty input is represented by the all-sentinel edge: the BOSS
        // of size 1.
        kmers.push(T::from_kmer(PackedKmer::pack(
            &vec![SENTINEL_CODE; params.k + 1],
            bits,
        )));
        return;
    }
    log::info!("Reconstructing all required dummy source k-mers");
    recover_source_dummy_kmers(params.k, bits, kmers);
}

/// Builds one BOSS chunk from a sequence stream: collect, recover dummies,
/// run the linear chunk pass.
pub fn build_chunk<const B: usize, T, S>(params: &BuildParams, input: &mut S) -> Result<BossChunk>
where
    T: KmerRecord<B> + 'static,
    S: SeqStream,
{
    let mut collector: KmerCollector<B, T> = KmerCollector::with_chunk_size(
        params.alphabet.clone(),
        params.k,
        params.canonical,
        Vec::new(),
        params.num_threads,
        params.memory_preallocated,
        params.chunk_kmers,
    )?;
    collector.add_sequences(input);
    collector.join()?;
    let mut kmers = collector.into_data();
    finish_kmers(params, &mut kmers);

    Ok(BossChunk::from_sorted_kmers(
        params.alphabet.size(),
        params.alphabet.bits_per_char(),
        params.k,
        params.canonical,
        &kmers,
        params.bits_per_count,
    ))
}

/// Builds the graph partitioned into node-suffix buckets: one collector pass
/// per bucket over a fresh stream, dummy recovery over the bucket
/// concatenation (dummies migrate across buckets, so recovery cannot run on
/// one bucket alone), then one chunk per bucket, concatenated. The result is
/// identical to [`build_chunk`] on the same input.
pub fn build_chunk_by_suffix_buckets<const B: usize, T, S, F>(
    params: &BuildParams,
    mut make_stream: F,
    suffix_len: usize,
) -> Result<BossChunk>
where
    T: KmerRecord<B> + 'static,
    S: SeqStream,
    F: FnMut() -> S,
{
    if suffix_len == 0 || suffix_len >= params.k {
        return Err(Error::BadConfig(format!(
            "suffix bucket length {} must be in 1..{}",
            suffix_len, params.k
        )));
    }
    let alph_size = params.alphabet.size();
    let bits = params.alphabet.bits_per_char();
    let suffixes = colex_sorted_suffixes(alph_size, suffix_len);
    log::info!("Building BOSS chunk in {} suffix buckets", suffixes.len());

    // Buckets arrive in co-lex suffix order, so their concatenation is the
    // globally sorted k-mer array.
    let mut kmers: Vec<T> = Vec::new();
    for suffix in suffixes.iter() {
        let mut collector: KmerCollector<B, T> = KmerCollector::with_chunk_size(
            params.alphabet.clone(),
            params.k,
            params.canonical,
            suffix.clone(),
            params.num_threads,
            params.memory_preallocated / suffixes.len(),
            params.chunk_kmers,
        )?;
        collector.add_sequences(&mut make_stream());
        collector.join()?;
        kmers.extend_from_slice(collector.data());
    }
    debug_assert!(kmers.windows(2).all(|p| p[0].kmer() < p[1].kmer()));

    finish_kmers(params, &mut kmers);

    // Split the recovered array back at the bucket boundaries and build the
    // final chunk as a concatenation of per-bucket chunks.
    let mut result = BossChunk::empty(alph_size, params.k, params.canonical);
    let mut begin = 0usize;
    for suffix in suffixes.iter() {
        let key = suffix_to_key(suffix, bits);
        let end = begin
            + kmers[begin..]
                .partition_point(|r| suffix_key(r, params.k, bits, suffix_len) <= key);
        let chunk = BossChunk::from_sorted_kmers(
            alph_size,
            bits,
            params.k,
            params.canonical,
            &kmers[begin..end],
            params.bits_per_count,
        );
        result.extend(&chunk)?;
        begin = end;
    }
    debug_assert_eq!(begin, kmers.len());
    Ok(result)
}
