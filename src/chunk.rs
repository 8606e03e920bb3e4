//! BOSS graph chunks: the `(W, last, F)` arrays built from a sorted run of
//! (k+1)-mers, an optional aligned weight array, concatenation of chunks
//! built per suffix bucket, and the `.dbg.chunk` file format.

use std::io::{Read, Write};
use std::path::Path;

use bitvec::prelude::*;
use simple_sds_sbwt::int_vector::IntVector;
use simple_sds_sbwt::ops::{Access, Push, Resize, Vector};

use crate::error::{Error, Result};
use crate::kmer::{KmerRecord, PackedKmer};
use crate::serialize;

/// File extension of serialized chunks.
pub const FILE_EXTENSION: &str = ".dbg.chunk";

/// One BOSS chunk. Position 0 of `W` and `last` is a reserved head element;
/// `F[a]` counts the edges whose last node character is smaller than `a`.
///
/// Invariants: `W.len() == last.len()`, `W[0] == 0`, `last[0] == 0`, `F` is
/// non-decreasing with `F[0] == 0`, and the optional weights are aligned to
/// `W` with nonzero entries only on non-dummy edges.
#[derive(Clone, Debug)]
pub struct BossChunk {
    alph_size: usize,
    k: usize,
    canonical: bool,
    w: Vec<u8>,
    last: BitVec,
    f: Vec<u64>,
    weights: Option<IntVector>,
}

impl BossChunk {
    /// An empty chunk: just the head element.
    pub fn empty(alph_size: usize, k: usize, canonical: bool) -> Self {
        assert!(alph_size >= 2 && k >= 1);
        Self {
            alph_size,
            k,
            canonical,
            w: vec![0],
            last: bitvec![0; 1],
            f: vec![0; alph_size],
            weights: None,
        }
    }

    /// Builds a chunk from a strictly sorted, deduplicated run of (k+1)-mer
    /// records in a single linear pass. `bits` is the character width and `k`
    /// the node length. If `bits_per_count` is given, a weight array of that
    /// width is filled from the record counts, saturating.
    pub fn from_sorted_kmers<const B: usize, T: KmerRecord<B>>(
        alph_size: usize,
        bits: usize,
        k: usize,
        canonical: bool,
        kmers: &[T],
        bits_per_count: Option<u8>,
    ) -> Self {
        assert!(alph_size >= 2 && k >= 1);
        assert!(2 * alph_size <= u8::MAX as usize + 1);
        debug_assert!(kmers.windows(2).all(|p| p[0].kmer() < p[1].kmer()));

        let n = kmers.len();
        let mut w = vec![0u8; n + 1];
        let mut last = bitvec![1; n + 1];
        last.set(0, false);
        let mut f = vec![0u64; alph_size];
        let mut weights = bits_per_count
            .map(|width| IntVector::with_len(n + 1, width as usize, 0).unwrap());
        let max_count = bits_per_count
            .map(|width| if width >= 64 { u64::MAX } else { (1u64 << width) - 1 })
            .unwrap_or(0);

        let mut curpos = 1usize;
        let mut last_f = 0u8;

        for (i, record) in kmers.iter().enumerate() {
            let kmer = record.kmer();
            let mut cur_w = kmer.get(0, bits);
            let cur_f = kmer.get(k, bits);
            assert!((cur_w as usize) < alph_size);

            // Check redundancy and set last.
            if i + 1 < n && PackedKmer::compare_suffix(kmer, kmers[i + 1].kmer(), 0, bits) {
                // Skip redundant dummy sink edges: a real outgoing edge of the
                // same node dominates the sentinel-labeled one.
                if cur_w == 0 && cur_f > 0 {
                    continue;
                }
                last.set(curpos, false);
            }

            // Flag duplicate labels: an earlier edge into the same target node
            // already carries this label.
            if i > 0 {
                let mut j = i - 1;
                while PackedKmer::compare_suffix(kmer, kmers[j].kmer(), 1, bits) {
                    if cur_w > 0 && kmers[j].kmer().get(0, bits) == cur_w {
                        cur_w += alph_size as u8;
                        break;
                    }
                    if j == 0 {
                        break;
                    }
                    j -= 1;
                }
            }
            w[curpos] = cur_w;

            while cur_f > last_f && (last_f as usize) + 1 < alph_size {
                last_f += 1;
                f[last_f as usize] = (curpos - 1) as u64;
            }

            if let Some(wv) = weights.as_mut() {
                // Weights only on non-dummy edges.
                if record.count() != 0 && kmer.get(0, bits) != 0 && kmer.get(1, bits) != 0 {
                    wv.set(curpos, (record.count() as u64).min(max_count));
                }
            }

            curpos += 1;
        }
        while (last_f as usize) + 1 < alph_size {
            last_f += 1;
            f[last_f as usize] = (curpos - 1) as u64;
        }

        w.truncate(curpos);
        last.truncate(curpos);
        if let Some(wv) = weights.as_mut() {
            wv.resize(curpos, 0);
        }

        Self { alph_size, k, canonical, w, last, f, weights }
    }

    /// Number of edges, not counting the head element.
    pub fn size(&self) -> usize {
        self.w.len() - 1
    }

    pub fn alph_size(&self) -> usize {
        self.alph_size
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn canonical(&self) -> bool {
        self.canonical
    }

    /// Width of the extended alphabet in bits: one more than the character
    /// width, for the duplicate-label flag.
    pub fn extended_alph_width(&self) -> usize {
        (usize::BITS - (self.alph_size - 1).leading_zeros()) as usize + 1
    }

    pub fn w(&self) -> &[u8] {
        &self.w
    }

    pub fn last(&self) -> &BitVec {
        &self.last
    }

    pub fn f(&self) -> &[u64] {
        &self.f
    }

    pub fn weights(&self) -> Option<&IntVector> {
        self.weights.as_ref()
    }

    /// Concatenates `other` after this chunk, skipping its head element and
    /// adding the `F` arrays elementwise. Chunks must agree on `k`, the
    /// alphabet, the canonical flag and the weight width.
    pub fn extend(&mut self, other: &BossChunk) -> Result<()> {
        if self.alph_size != other.alph_size
            || self.k != other.k
            || self.canonical != other.canonical
        {
            return Err(Error::IncompatibleChunks(format!(
                "(alph_size {}, k {}, canonical {}) vs (alph_size {}, k {}, canonical {})",
                self.alph_size, self.k, self.canonical,
                other.alph_size, other.k, other.canonical,
            )));
        }
        if other.size() == 0 {
            return Ok(());
        }
        if self.size() == 0 {
            *self = other.clone();
            return Ok(());
        }
        match (&mut self.weights, &other.weights) {
            (None, None) => {}
            (Some(a), Some(b)) if a.width() == b.width() => {
                for i in 1..b.len() {
                    a.push(b.get(i));
                }
            }
            (Some(_), Some(_)) => {
                return Err(Error::IncompatibleChunks(
                    "inconsistent weight widths".to_string(),
                ));
            }
            _ => {
                return Err(Error::IncompatibleChunks(
                    "weighted and unweighted chunks".to_string(),
                ));
            }
        }

        self.w.extend_from_slice(&other.w[1..]);
        self.last.extend(other.last[1..].iter().by_vals());
        for (a, b) in self.f.iter_mut().zip(other.f.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Writes the chunk in the `.dbg.chunk` layout.
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n = serialize::write_packed_vector(
            out,
            self.w.iter().map(|&x| x as u64),
            self.extended_alph_width(),
        )?;
        n += serialize::write_byte_bits(out, self.last.iter().by_vals())?;
        n += serialize::write_number_vector(out, &self.f)?;
        match &self.weights {
            Some(wv) => {
                n += serialize::write_packed_vector(
                    out,
                    (0..wv.len()).map(|i| wv.get(i)),
                    wv.width(),
                )?;
            }
            None => {
                n += serialize::write_packed_vector(out, std::iter::empty(), 0)?;
            }
        }
        n += serialize::write_number(out, self.alph_size as u64)?;
        n += serialize::write_number(out, self.k as u64)?;
        n += serialize::write_number(out, self.canonical as u64)?;
        Ok(n)
    }

    /// Loads a chunk written by [`BossChunk::serialize`], validating the
    /// layout.
    pub fn load<R: Read>(input: &mut R) -> Result<Self> {
        let err = |reason: String| Error::Load { what: "BOSS chunk", reason };

        let (w_values, _) = serialize::read_packed_vector(input)
            .map_err(|e| err(format!("W vector: {}", e)))?;
        let last_bits = serialize::read_byte_bits(input)
            .map_err(|e| err(format!("last vector: {}", e)))?;
        let f = serialize::read_number_vector(input)
            .map_err(|e| err(format!("F vector: {}", e)))?;
        let (weight_values, weight_width) = serialize::read_packed_vector(input)
            .map_err(|e| err(format!("weights: {}", e)))?;
        let alph_size = serialize::read_number(input).map_err(|e| err(e.to_string()))? as usize;
        let k = serialize::read_number(input).map_err(|e| err(e.to_string()))? as usize;
        let canonical = serialize::read_number(input).map_err(|e| err(e.to_string()))? != 0;

        if k == 0
            || alph_size < 2
            || w_values.len() != last_bits.len()
            || f.len() != alph_size
            || (!weight_values.is_empty() && weight_values.len() != w_values.len())
        {
            return Err(err("inconsistent vector lengths".to_string()));
        }
        if w_values.iter().any(|&x| x >= 2 * alph_size as u64) {
            return Err(err("W entry out of range".to_string()));
        }

        let weights = if weight_values.is_empty() {
            None
        } else {
            let mut wv = IntVector::with_len(weight_values.len(), weight_width, 0).unwrap();
            for (i, &v) in weight_values.iter().enumerate() {
                wv.set(i, v);
            }
            Some(wv)
        };

        Ok(Self {
            alph_size,
            k,
            canonical,
            w: w_values.into_iter().map(|x| x as u8).collect(),
            last: last_bits.into_iter().collect(),
            f,
            weights,
        })
    }

    /// Serializes to `<path>.dbg.chunk` (the extension is appended unless
    /// already present).
    pub fn serialize_to_file(&self, path: &Path) -> Result<()> {
        let path = with_extension(path);
        let mut out = std::io::BufWriter::new(std::fs::File::create(&path)?);
        self.serialize(&mut out)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let path = with_extension(path);
        let mut input = std::io::BufReader::new(std::fs::File::open(&path).map_err(|e| {
            Error::load("BOSS chunk", format!("{}: {}", path.display(), e))
        })?);
        Self::load(&mut input)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::kmer::CountedKmer;

    fn sorted_kmers(a: &Alphabet, strs: &[&str]) -> Vec<PackedKmer<1>> {
        let mut kmers: Vec<PackedKmer<1>> = strs
            .iter()
            .map(|s| PackedKmer::pack(&a.encode_sequence(s.as_bytes()), a.bits_per_char()))
            .collect();
        kmers.sort_unstable();
        kmers.dedup();
        kmers
    }

    fn chunk_from(a: &Alphabet, k: usize, strs: &[&str]) -> BossChunk {
        let kmers = sorted_kmers(a, strs);
        BossChunk::from_sorted_kmers(a.size(), a.bits_per_char(), k, false, &kmers, None)
    }

    fn decoded_w(a: &Alphabet, chunk: &BossChunk) -> Vec<(u8, bool)> {
        chunk
            .w()
            .iter()
            .map(|&c| {
                let flagged = c as usize >= a.size();
                (a.decode(c % a.size() as u8), flagged)
            })
            .collect()
    }

    #[test]
    fn tiny_boss() {
        // k = 2 over {"ACGT"}: padded windows $AC, ACG, CGT, GT$ plus the
        // recovered dummy $$A.
        let a = Alphabet::dna();
        let chunk = chunk_from(&a, 2, &["$$A", "$AC", "ACG", "CGT", "GT$"]);

        assert_eq!(chunk.size(), 5);
        // Sorted by co-lex node: $$ -> $A -> AC -> CG -> GT.
        assert_eq!(
            decoded_w(&a, &chunk),
            vec![(b'$', false), (b'A', false), (b'C', false), (b'G', false), (b'T', false), (b'$', false)]
        );
        assert_eq!(chunk.last().iter().by_vals().collect::<Vec<bool>>(),
                   vec![false, true, true, true, true, true]);
        assert_eq!(chunk.f(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn duplicate_label_marks_w() {
        // Both ACA and ACC leave node AC; different labels, so neither W entry
        // is flagged and only the last one has the last bit.
        let a = Alphabet::dna();
        let chunk = chunk_from(&a, 2, &["ACA", "ACC"]);
        assert_eq!(decoded_w(&a, &chunk), vec![(b'$', false), (b'A', false), (b'C', false)]);
        assert_eq!(chunk.last().iter().by_vals().collect::<Vec<bool>>(), vec![false, false, true]);

        // TAG and CAG both enter node AG: the second edge labeled G into the
        // same target gets the duplicate flag.
        let chunk = chunk_from(&a, 2, &["CAG", "TAG"]);
        assert_eq!(decoded_w(&a, &chunk), vec![(b'$', false), (b'G', false), (b'G', true)]);
        assert_eq!(chunk.last().iter().by_vals().collect::<Vec<bool>>(), vec![false, true, true]);
    }

    #[test]
    fn redundant_dummy_sink_dropped() {
        // CG$ and CGA share the node CG; the sentinel-labeled edge is
        // dominated by the real one and must be skipped.
        let a = Alphabet::dna();
        let chunk = chunk_from(&a, 2, &["CG$", "CGA"]);
        assert_eq!(chunk.size(), 1);
        assert_eq!(decoded_w(&a, &chunk), vec![(b'$', false), (b'A', false)]);
        assert_eq!(chunk.last().iter().by_vals().collect::<Vec<bool>>(), vec![false, true]);
    }

    #[test]
    fn f_blocks_match_last_counts() {
        // Property: for every a, the number of last-marked edges whose last
        // node character is a equals the size of block a.
        let a = Alphabet::dna();
        let strs = ["$$A", "$AC", "ACG", "ACT", "CGT", "CTA", "GTA", "TAC", "TA$"];
        let chunk = chunk_from(&a, 2, &strs);
        let n = chunk.size() as u64;
        for c in 0..a.size() {
            let begin = chunk.f()[c];
            let end = if c + 1 < a.size() { chunk.f()[c + 1] } else { n };
            assert!(begin <= end);
            let ones: usize = (begin as usize + 1..=end as usize)
                .filter(|&i| chunk.last()[i])
                .count();
            assert_eq!(ones as u64, end - begin, "block {}", c);
        }
    }

    #[test]
    fn duplicate_flag_property() {
        // W[i] is flagged iff an earlier retained edge shares the node
        // suffix above position 1 and carries the same base label.
        let a = Alphabet::dna();
        let bits = a.bits_per_char();
        let strs = [
            "$$C", "$$T", "$CA", "$TA", "CAG", "TAG", "AAG", "AGC", "AGT", "GC$", "GT$",
        ];
        let kmers = sorted_kmers(&a, &strs);
        let chunk = BossChunk::from_sorted_kmers(a.size(), bits, 2, false, &kmers, None);

        // Reconstruct which input k-mer produced each row (no dummy sinks
        // are dropped in this set).
        assert_eq!(chunk.size(), kmers.len());
        for (i, &w) in chunk.w().iter().enumerate().skip(1) {
            let kmer = &kmers[i - 1];
            let expected = (0..i - 1).any(|j| {
                PackedKmer::compare_suffix(kmer, &kmers[j], 1, bits)
                    && kmers[j].get(0, bits) == w % a.size() as u8
                    && w % a.size() as u8 != 0
            });
            assert_eq!(w as usize >= a.size(), expected, "row {}", i);
        }
    }

    #[test]
    fn weights_saturate_and_skip_dummies() {
        let a = Alphabet::dna();
        let bits = a.bits_per_char();
        let mut records: Vec<CountedKmer<1>> = ["$AC", "ACG", "CGT", "GT$"]
            .iter()
            .map(|s| CountedKmer {
                kmer: PackedKmer::pack(&a.encode_sequence(s.as_bytes()), bits),
                count: 200,
            })
            .collect();
        records.sort_unstable_by(|x, y| x.kmer.cmp(&y.kmer));

        let chunk = BossChunk::from_sorted_kmers(a.size(), bits, 2, false, &records, Some(4));
        let wv = chunk.weights().unwrap();
        assert_eq!(wv.len(), chunk.w().len());
        // Row order: head, $AC, ACG, CGT, GT$. The dummy edges carry no
        // weight; real ones saturate at 2^4 - 1.
        let values: Vec<u64> = (0..wv.len()).map(|i| wv.get(i)).collect();
        assert_eq!(values, vec![0, 0, 15, 15, 0]);
    }

    #[test]
    fn merge_splits_equal_monolithic() {
        let a = Alphabet::dna();
        let strs = ["$$A", "$AC", "ACG", "ACT", "CGT", "CTA", "GTA", "TAC", "TA$"];
        let whole = chunk_from(&a, 2, &strs);

        // Split the sorted kmers at a node boundary (no node spans the cut).
        let kmers = sorted_kmers(&a, &strs);
        let bits = a.bits_per_char();
        let cut = kmers
            .windows(2)
            .position(|p| !PackedKmer::compare_suffix(&p[0], &p[1], 0, bits))
            .unwrap()
            + 1;
        let left = BossChunk::from_sorted_kmers(a.size(), bits, 2, false, &kmers[..cut], None);
        let right = BossChunk::from_sorted_kmers(a.size(), bits, 2, false, &kmers[cut..], None);

        let mut merged = BossChunk::empty(a.size(), 2, false);
        merged.extend(&left).unwrap();
        merged.extend(&right).unwrap();

        assert_eq!(merged.w(), whole.w());
        assert_eq!(merged.last(), whole.last());
        assert_eq!(merged.f(), whole.f());
    }

    #[test]
    fn merge_is_associative() {
        let a = Alphabet::dna();
        let parts = [
            chunk_from(&a, 2, &["$$A", "$AC"]),
            chunk_from(&a, 2, &["ACG", "CGT"]),
            chunk_from(&a, 2, &["GTA", "TAC"]),
        ];

        let mut ab = parts[0].clone();
        ab.extend(&parts[1]).unwrap();
        let mut ab_c = ab.clone();
        ab_c.extend(&parts[2]).unwrap();

        let mut bc = parts[1].clone();
        bc.extend(&parts[2]).unwrap();
        let mut a_bc = parts[0].clone();
        a_bc.extend(&bc).unwrap();

        assert_eq!(ab_c.w(), a_bc.w());
        assert_eq!(ab_c.last(), a_bc.last());
        assert_eq!(ab_c.f(), a_bc.f());
    }

    #[test]
    fn merge_rejects_incompatible() {
        let a = Alphabet::dna();
        let mut x = chunk_from(&a, 2, &["ACG"]);
        let y = chunk_from(&a, 3, &["ACGT"]);
        assert!(matches!(x.extend(&y), Err(Error::IncompatibleChunks(_))));

        // Weighted against unweighted.
        let bits = a.bits_per_char();
        let records = [CountedKmer::<1> {
            kmer: PackedKmer::pack(&a.encode_sequence(b"ACG"), bits),
            count: 1,
        }];
        let w = BossChunk::from_sorted_kmers(a.size(), bits, 2, false, &records, Some(8));
        let mut x = chunk_from(&a, 2, &["ACG"]);
        assert!(matches!(x.extend(&w), Err(Error::IncompatibleChunks(_))));
    }

    #[test]
    fn serialize_and_load() {
        let a = Alphabet::dna();
        let chunk = chunk_from(&a, 2, &["$$A", "$AC", "ACG", "CGT", "GT$"]);
        let mut buf = Vec::new();
        chunk.serialize(&mut buf).unwrap();
        let loaded = BossChunk::load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.w(), chunk.w());
        assert_eq!(loaded.last(), chunk.last());
        assert_eq!(loaded.f(), chunk.f());
        assert_eq!(loaded.k(), chunk.k());
        assert_eq!(loaded.alph_size(), chunk.alph_size());
        assert!(loaded.weights().is_none());

        // Truncated input surfaces a load error.
        let truncated = &buf[..buf.len() / 2];
        assert!(matches!(BossChunk::load(&mut &truncated[..]), Err(Error::Load { .. })));
    }
}
