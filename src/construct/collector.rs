//! Parallel accumulation of k-mers from many sequences into one shared,
//! growable, sorted buffer.
//!
//! Producers fill thread-local chunks and append them to the shared buffer
//! under two interlocked locks: a resize-serializing mutex that owns the
//! buffer geometry, and a shared/exclusive lock that lets many producers copy
//! into already-reserved ranges concurrently while reallocation takes the
//! buffer exclusively. When capacity runs out, the buffer is first compacted
//! by sort+dedup and only then grown.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crossbeam::channel::{bounded, Sender};

use crate::alphabet::Alphabet;
use crate::construct::{extract, par_sort_and_dedup, sort_and_dedup};
use crate::error::{Error, Result};
use crate::kmer::KmerRecord;

/// Number of k-mers a producer accumulates locally before sorting the chunk
/// and appending it to the shared buffer. Also the byte threshold at which
/// buffered sequences are released to the worker pool.
pub const CHUNK_KMERS: usize = 30_000_000;

/// Retries a reservation with a 2/3 shrink towards `min_size` until it
/// succeeds; reaching `min_size` without success is fatal.
fn try_reserve_retry<T>(v: &mut Vec<T>, size: usize, min_size: usize) -> Result<()> {
    let mut size = size.max(min_size);
    while size > min_size {
        if size <= v.capacity() || v.try_reserve_exact(size - v.len()).is_ok() {
            return Ok(());
        }
        size = min_size + (size - min_size) * 2 / 3;
    }
    if min_size <= v.capacity() || v.try_reserve_exact(min_size - v.len()).is_ok() {
        return Ok(());
    }
    Err(Error::OutOfMemory(min_size))
}

/// Raw geometry of the shared buffer. Only ever touched while holding the
/// mutex that wraps it; the pointer is stable while any shared copy guard is
/// held because reallocation requires the exclusive guard.
struct Parts<T> {
    ptr: *mut T,
    len: usize,
    cap: usize,
}

impl<T> Parts<T> {
    fn from_vec(v: Vec<T>) -> Self {
        let mut v = ManuallyDrop::new(v);
        Self { ptr: v.as_mut_ptr(), len: v.len(), cap: v.capacity() }
    }

    /// Safety: the caller must guarantee no other thread is reading or
    /// writing through `ptr` (i.e. it holds the exclusive copy lock, or the
    /// buffer is no longer shared).
    unsafe fn take_vec(&mut self) -> Vec<T> {
        let v = Vec::from_raw_parts(self.ptr, self.len, self.cap);
        *self = Self::from_vec(Vec::new());
        v
    }
}

pub(crate) struct SharedBuffer<const B: usize, T: KmerRecord<B>> {
    parts: Mutex<Parts<T>>,
    copy_lock: RwLock<()>,
}

// The raw pointer is only dereferenced under the locking protocol above.
unsafe impl<const B: usize, T: KmerRecord<B>> Send for SharedBuffer<B, T> {}
unsafe impl<const B: usize, T: KmerRecord<B>> Sync for SharedBuffer<B, T> {}

impl<const B: usize, T: KmerRecord<B>> SharedBuffer<B, T> {
    fn with_memory_budget(bytes: usize) -> Result<Self> {
        let mut v: Vec<T> = Vec::new();
        try_reserve_retry(&mut v, bytes / std::mem::size_of::<T>(), 0)?;
        log::info!(
            "Preallocated {} Mb for the k-mer storage, capacity: {} k-mers",
            (v.capacity() * std::mem::size_of::<T>()) >> 20,
            v.capacity()
        );
        Ok(Self { parts: Mutex::new(Parts::from_vec(v)), copy_lock: RwLock::new(()) })
    }

    fn append(&self, chunk: &[T]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let mut parts = self.parts.lock().unwrap();

        if parts.len + chunk.len() > parts.cap {
            // Take the buffer exclusively: no producer is copying.
            let excl = self.copy_lock.write().unwrap();
            // Safety: geometry mutex plus exclusive copy lock held.
            let mut v = unsafe { parts.take_vec() };
            let before = v.len();
            par_sort_and_dedup(&mut v, 0);
            log::debug!(
                "Capacity exceeded, filtered out non-unique k-mers: {} -> {}",
                before,
                v.len()
            );
            let v_len = v.len();
            let reserve_result = try_reserve_retry(
                &mut v,
                (v_len + v_len / 2).max(v_len + chunk.len()),
                v_len + chunk.len(),
            );
            *parts = Parts::from_vec(v);
            drop(excl);
            reserve_result?;
        }

        let offset = parts.len;
        parts.len += chunk.len();
        let dst = unsafe { parts.ptr.add(offset) };

        // Hold the shared lock across the copy; release the geometry mutex so
        // other producers can reserve their own ranges meanwhile.
        let _shared = self.copy_lock.read().unwrap();
        drop(parts);
        // Safety: [offset, offset + chunk.len()) was reserved above and no
        // other thread writes into it; reallocation is excluded by _shared.
        unsafe {
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), dst, chunk.len());
        }
        Ok(())
    }

    /// Takes the accumulated contents. Must not race with producers.
    fn take(&self) -> Vec<T> {
        let mut parts = self.parts.lock().unwrap();
        let _excl = self.copy_lock.write().unwrap();
        // Safety: exclusive copy lock held.
        unsafe { parts.take_vec() }
    }
}

impl<const B: usize, T: KmerRecord<B>> Drop for SharedBuffer<B, T> {
    fn drop(&mut self) {
        let parts = self.parts.get_mut().unwrap();
        // Safety: dropping, so the buffer is no longer shared.
        drop(unsafe { parts.take_vec() });
    }
}

struct Inner<const B: usize, T: KmerRecord<B>> {
    alphabet: Alphabet,
    k: usize,
    canonical: bool,
    suffix: Vec<u8>,
    chunk_kmers: usize,
    buffer: SharedBuffer<B, T>,
    failed: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl<const B: usize, T: KmerRecord<B>> Inner<B, T> {
    fn record_error(&self, e: Error) {
        self.failed.store(true, Ordering::SeqCst);
        let mut slot = self.first_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    /// Extracts the k-mers of one batch of encoded sequences into a local
    /// chunk, flushing to the shared buffer at the fill threshold.
    fn run_task(&self, batch: Vec<Vec<u8>>) -> Result<()> {
        let mut temp: Vec<T> = Vec::new();
        try_reserve_retry(&mut temp, self.chunk_kmers + self.chunk_kmers / 10, 0)?;

        for codes in batch {
            extract::sequence_to_kmers(
                &codes,
                self.k + 1,
                &self.alphabet,
                &self.suffix,
                self.canonical,
                &mut temp,
            );
            if temp.len() < self.chunk_kmers {
                continue;
            }
            sort_and_dedup(&mut temp, 0);
            if temp.len() > self.chunk_kmers / 10 * 9 {
                self.buffer.append(&temp)?;
                temp.clear();
            }
        }
        if !temp.is_empty() {
            sort_and_dedup(&mut temp, 0);
            self.buffer.append(&temp)?;
        }
        Ok(())
    }
}

/// Collects the distinct (k+1)-mers of many sequences in parallel. See the
/// module documentation for the locking scheme. After [`KmerCollector::join`]
/// the contents are strictly sorted and duplicate-free.
pub struct KmerCollector<const B: usize, T: KmerRecord<B>> {
    inner: Arc<Inner<B, T>>,
    task_tx: Option<Sender<Vec<Vec<u8>>>>,
    workers: Vec<std::thread::JoinHandle<()>>,
    pending: Vec<Vec<u8>>,
    pending_bytes: usize,
    data: Vec<T>,
    joined: bool,
}

impl<const B: usize, T: KmerRecord<B> + 'static> KmerCollector<B, T> {
    /// `k` is the node length: the collector stores (k+1)-mers. `suffix` is
    /// the encoded node-suffix filter (empty for no filtering) and
    /// `memory_preallocated` a byte budget for the initial reservation.
    pub fn new(
        alphabet: Alphabet,
        k: usize,
        canonical: bool,
        suffix: Vec<u8>,
        num_threads: usize,
        memory_preallocated: usize,
    ) -> Result<Self> {
        Self::with_chunk_size(
            alphabet,
            k,
            canonical,
            suffix,
            num_threads,
            memory_preallocated,
            CHUNK_KMERS,
        )
    }

    /// Like [`KmerCollector::new`] with an explicit producer chunk size.
    pub fn with_chunk_size(
        alphabet: Alphabet,
        k: usize,
        canonical: bool,
        suffix: Vec<u8>,
        num_threads: usize,
        memory_preallocated: usize,
        chunk_kmers: usize,
    ) -> Result<Self> {
        if k < 2 {
            return Err(Error::BadConfig(format!("node length k = {} is too small", k)));
        }
        if (k + 1) * alphabet.bits_per_char() > B * 64 {
            return Err(Error::BadConfig(format!(
                "(k+1) * bits_per_char = {} does not fit a {}-bit k-mer",
                (k + 1) * alphabet.bits_per_char(),
                B * 64
            )));
        }
        if suffix.len() >= k {
            return Err(Error::BadConfig(format!(
                "suffix filter of length {} with node length {}",
                suffix.len(),
                k
            )));
        }

        let inner = Arc::new(Inner {
            alphabet,
            k,
            canonical,
            suffix,
            chunk_kmers: chunk_kmers.max(1),
            buffer: SharedBuffer::with_memory_budget(memory_preallocated)?,
            failed: AtomicBool::new(false),
            first_error: Mutex::new(None),
        });

        let (task_tx, task_rx) = bounded::<Vec<Vec<u8>>>(4);
        let mut workers = Vec::new();
        for _ in 0..num_threads.max(1) {
            let inner = Arc::clone(&inner);
            let rx = task_rx.clone();
            workers.push(std::thread::spawn(move || {
                while let Ok(batch) = rx.recv() {
                    if inner.failed.load(Ordering::SeqCst) {
                        continue; // drain remaining tasks
                    }
                    if let Err(e) = inner.run_task(batch) {
                        inner.record_error(e);
                    }
                }
            }));
        }

        Ok(Self {
            inner,
            task_tx: Some(task_tx),
            workers,
            pending: Vec::new(),
            pending_bytes: 0,
            data: Vec::new(),
            joined: false,
        })
    }

    pub fn k(&self) -> usize {
        self.inner.k
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.inner.alphabet
    }

    pub fn is_canonical(&self) -> bool {
        self.inner.canonical
    }

    pub fn suffix_length(&self) -> usize {
        self.inner.suffix.len()
    }

    /// Buffers one sequence. Sequences shorter than k+1 are silently
    /// skipped. Unknown characters encode to the sentinel.
    pub fn add_sequence(&mut self, sequence: &[u8]) {
        assert!(!self.joined);
        if sequence.len() < self.inner.k + 1 {
            return;
        }
        self.pending_bytes += sequence.len();
        self.pending.push(self.inner.alphabet.encode_sequence(sequence));
        if self.pending_bytes >= self.inner.chunk_kmers {
            self.release_task_to_pool();
        }
    }

    /// Drains a whole sequence stream into the collector.
    pub fn add_sequences<S: crate::SeqStream>(&mut self, stream: &mut S) {
        while let Some(seq) = stream.stream_next() {
            self.add_sequence(seq);
        }
    }

    fn release_task_to_pool(&mut self) {
        let batch = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;
        if !batch.is_empty() {
            self.task_tx.as_ref().unwrap().send(batch).unwrap();
        }
    }

    /// Waits for all pending tasks, then sorts and deduplicates the shared
    /// buffer in place. After this the collector is read-only.
    pub fn join(&mut self) -> Result<()> {
        if self.joined {
            return Ok(());
        }
        self.release_task_to_pool();
        drop(self.task_tx.take()); // close the channel
        for handle in self.workers.drain(..) {
            handle.join().expect("k-mer producer task panicked");
        }
        self.joined = true;
        if let Some(e) = self.inner.first_error.lock().unwrap().take() {
            return Err(e);
        }

        log::info!("Reading data has finished, sorting k-mers");
        let mut data = self.inner.buffer.take();
        par_sort_and_dedup(&mut data, 0);
        log::info!("{} distinct k-mers collected", data.len());
        self.data = data;
        Ok(())
    }

    /// The sorted, deduplicated records. Only valid after [`KmerCollector::join`].
    pub fn data(&self) -> &[T] {
        assert!(self.joined);
        &self.data
    }

    /// Consumes the collector, returning the sorted records.
    pub fn into_data(mut self) -> Vec<T> {
        assert!(self.joined);
        std::mem::take(&mut self.data)
    }
}

impl<const B: usize, T: KmerRecord<B>> Drop for KmerCollector<B, T> {
    fn drop(&mut self) {
        drop(self.task_tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::{CountedKmer, PackedKmer};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn collect_sorted(
        seqs: &[&[u8]],
        k: usize,
        num_threads: usize,
        chunk_kmers: usize,
    ) -> Vec<PackedKmer<1>> {
        let mut collector: KmerCollector<1, PackedKmer<1>> = KmerCollector::with_chunk_size(
            Alphabet::dna(),
            k,
            false,
            Vec::new(),
            num_threads,
            1 << 16,
            chunk_kmers,
        )
        .unwrap();
        for seq in seqs {
            collector.add_sequence(seq);
        }
        collector.join().unwrap();
        collector.into_data()
    }

    #[test]
    fn sorted_and_distinct() {
        let kmers = collect_sorted(&[b"ACGTACGT", b"ACGTACGT", b"TTTT"], 3, 2, 16);
        assert!(kmers.windows(2).all(|p| p[0] < p[1]));
    }

    #[test_log::test]
    fn independent_of_threads_and_chunking() {
        let mut rng = ChaCha20Rng::from_seed([7; 32]);
        let seqs: Vec<Vec<u8>> = (0..50)
            .map(|_| {
                (0..30)
                    .map(|_| b"ACGT"[rng.gen_range(0..4)])
                    .collect::<Vec<u8>>()
            })
            .collect();
        let seq_refs: Vec<&[u8]> = seqs.iter().map(|s| s.as_slice()).collect();

        let reference = collect_sorted(&seq_refs, 5, 1, 1 << 20);
        for (threads, chunk) in [(1, 4), (2, 16), (4, 7), (8, 1024)] {
            assert_eq!(collect_sorted(&seq_refs, 5, threads, chunk), reference);
        }
    }

    #[test]
    fn short_sequences_skipped() {
        let kmers = collect_sorted(&[b"AC", b"", b"ACGT"], 3, 1, 8);
        // Only "ACGT" contributes: windows $ACG, ACGT, CGT$.
        assert_eq!(kmers.len(), 3);
    }

    #[test]
    fn counts_accumulate_saturating() {
        let mut collector: KmerCollector<1, CountedKmer<1>> = KmerCollector::with_chunk_size(
            Alphabet::dna(),
            2,
            false,
            Vec::new(),
            2,
            1 << 14,
            4,
        )
        .unwrap();
        for _ in 0..300 {
            collector.add_sequence(b"ACG");
        }
        collector.join().unwrap();
        let data = collector.into_data();
        assert!(data.windows(2).all(|p| p[0].kmer < p[1].kmer));
        for record in data {
            // 300 insertions saturate the u8 counter.
            assert_eq!(record.count, u8::MAX);
        }
    }

    #[test]
    fn canonical_mode_adds_reverse_complement() {
        let mut fwd: KmerCollector<1, PackedKmer<1>> = KmerCollector::with_chunk_size(
            Alphabet::dna(),
            3,
            true,
            Vec::new(),
            1,
            1 << 14,
            8,
        )
        .unwrap();
        fwd.add_sequence(b"AACGT");
        fwd.join().unwrap();
        let canonical = fwd.into_data();

        let both = collect_sorted(&[b"AACGT", b"ACGTT"], 3, 1, 8);
        assert_eq!(canonical, both);
    }

    #[test]
    fn suffix_filter_restricts_and_partitions() {
        let seqs: Vec<&[u8]> = vec![b"ACGTACGAT", b"GGTACCA"];
        let whole = collect_sorted(&seqs, 3, 2, 8);

        let mut concatenated: Vec<PackedKmer<1>> = Vec::new();
        for c in 0..Alphabet::dna().size() as u8 {
            let mut collector: KmerCollector<1, PackedKmer<1>> =
                KmerCollector::with_chunk_size(
                    Alphabet::dna(),
                    3,
                    false,
                    vec![c],
                    2,
                    1 << 14,
                    8,
                )
                .unwrap();
            for seq in &seqs {
                collector.add_sequence(seq);
            }
            collector.join().unwrap();
            concatenated.extend(collector.into_data());
        }
        // Buckets in co-lex suffix order concatenate to the global order.
        assert_eq!(concatenated, whole);
    }

    #[test]
    fn rejects_bad_configuration() {
        let r: Result<KmerCollector<1, PackedKmer<1>>> =
            KmerCollector::new(Alphabet::dna(), 1, false, Vec::new(), 1, 0);
        assert!(matches!(r, Err(Error::BadConfig(_))));
        // 22 * 3 bits do not fit in 64.
        let r: Result<KmerCollector<1, PackedKmer<1>>> =
            KmerCollector::new(Alphabet::dna(), 21, false, Vec::new(), 1, 0);
        assert!(matches!(r, Err(Error::BadConfig(_))));
    }
}
