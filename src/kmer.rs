//! Bit-packed (k+1)-mers in BOSS edge order.
//!
//! A BOSS edge is a (k+1)-mer: the first k characters are the source node and
//! the last character is the edge label. Edges are stored sorted by the
//! co-lexicographic order of the source node with ties broken by the edge
//! label, so the packing puts the edge label in the least significant
//! character position and the node characters above it in reverse:
//! position 0 holds the edge label, position i (1 <= i <= k) holds the
//! (i-1)-th node character. Plain integer comparison of the packed words is
//! then exactly the BOSS edge order.

use byteorder::{LittleEndian, ReadBytesExt};

/// A (k+1)-mer packed into B 64-bit words, `data[0]` most significant.
/// Comparison only works for k-mers of the same length and character width
/// because unused high positions are zero-padded.
#[derive(Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Debug)]
pub struct PackedKmer<const B: usize> {
    data: [u64; B],
}

impl<const B: usize> Default for PackedKmer<B> {
    fn default() -> Self {
        Self { data: [0u64; B] }
    }
}

impl<const B: usize> PackedKmer<B> {
    pub fn zero() -> Self {
        Self { data: [0u64; B] }
    }

    /// Packs the character codes of a (k+1)-mer given in string order:
    /// k node characters followed by the edge label.
    pub fn pack(codes: &[u8], bits: usize) -> Self {
        debug_assert!(codes.len() * bits <= B * 64);
        let k = codes.len() - 1;
        let mut kmer = Self::zero().set(0, codes[k], bits);
        for (j, &c) in codes[..k].iter().enumerate() {
            kmer = kmer.set(j + 1, c, bits);
        }
        kmer
    }

    /// Inverse of [`PackedKmer::pack`]: character codes in string order.
    pub fn unpack(&self, k_plus_1: usize, bits: usize) -> Vec<u8> {
        let k = k_plus_1 - 1;
        let mut codes = Vec::with_capacity(k_plus_1);
        for j in 0..k {
            codes.push(self.get(j + 1, bits));
        }
        codes.push(self.get(0, bits));
        codes
    }

    /// The character code at position `pos` (0 = edge label).
    #[inline]
    pub fn get(&self, pos: usize, bits: usize) -> u8 {
        let o = pos * bits;
        let block = B - 1 - o / 64;
        let r = o % 64;
        let mask = (1u64 << bits) - 1;
        let mut v = self.data[block] >> r;
        if r + bits > 64 && block > 0 {
            v |= self.data[block - 1] << (64 - r);
        }
        (v & mask) as u8
    }

    /// Returns a copy with the character at position `pos` replaced by `c`.
    #[inline]
    pub fn set(&self, pos: usize, c: u8, bits: usize) -> Self {
        let o = pos * bits;
        let block = B - 1 - o / 64;
        let r = o % 64;
        let mask = (1u64 << bits) - 1;
        let mut data = self.data;
        data[block] = (data[block] & !(mask << r)) | ((c as u64) << r);
        if r + bits > 64 && block > 0 {
            let hi_mask = (1u64 << (r + bits - 64)) - 1;
            data[block - 1] = (data[block - 1] & !hi_mask) | ((c as u64) >> (64 - r));
        }
        Self { data }
    }

    /// Shifts the whole packed integer left (towards the node end).
    pub fn shl_bits(&self, sh: usize) -> Self {
        let word = sh / 64;
        let bit = sh % 64;
        let mut out = [0u64; B];
        for t in 0..B {
            let src = t + word;
            if src < B {
                out[t] |= self.data[src] << bit;
                if bit > 0 && src + 1 < B {
                    out[t] |= self.data[src + 1] >> (64 - bit);
                }
            }
        }
        Self { data: out }
    }

    /// Shifts the whole packed integer right (towards the edge label).
    pub fn shr_bits(&self, sh: usize) -> Self {
        let word = sh / 64;
        let bit = sh % 64;
        let mut out = [0u64; B];
        for t in word..B {
            let src = t - word;
            out[t] |= self.data[src] >> bit;
            if bit > 0 && src >= 1 {
                out[t] |= self.data[src - 1] << (64 - bit);
            }
        }
        Self { data: out }
    }

    /// A mask with the lowest `n_bits` bits set.
    pub fn low_mask(n_bits: usize) -> Self {
        let mut data = [0u64; B];
        for (t, word) in data.iter_mut().enumerate() {
            let base = (B - 1 - t) * 64;
            if n_bits >= base + 64 {
                *word = u64::MAX;
            } else if n_bits > base {
                *word = (1u64 << (n_bits - base)) - 1;
            }
        }
        Self { data }
    }

    /// True iff `a` and `b` agree on all characters above position `offset`,
    /// i.e. after dropping the `offset + 1` least significant characters.
    /// With `offset == 0` this compares the full source nodes.
    #[inline]
    pub fn compare_suffix(a: &Self, b: &Self, offset: usize, bits: usize) -> bool {
        let sh = (offset + 1) * bits;
        a.shr_bits(sh) == b.shr_bits(sh)
    }

    /// Synthesizes the predecessor edge: the node gains `c` as its new first
    /// character, the old last node character becomes the edge label, and the
    /// old edge label is dropped. Used with the sentinel to build the source
    /// dummy chain.
    pub fn to_prev(&self, k_plus_1: usize, c: u8, bits: usize) -> Self {
        let k = k_plus_1 - 1;
        let head = self.shr_bits(k * bits);
        let mid = self
            .shr_bits(bits)
            .and(&Self::low_mask((k - 1) * bits))
            .shl_bits(2 * bits);
        head.or(&mid).or(&Self::zero().set(1, c, bits))
    }

    #[inline]
    pub fn and(&self, other: &Self) -> Self {
        let mut data = self.data;
        for (a, b) in data.iter_mut().zip(other.data.iter()) {
            *a &= b;
        }
        Self { data }
    }

    #[inline]
    pub fn or(&self, other: &Self) -> Self {
        let mut data = self.data;
        for (a, b) in data.iter_mut().zip(other.data.iter()) {
            *a |= b;
        }
        Self { data }
    }

    pub fn byte_size() -> usize {
        8 * B
    }

    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        for block in self.data.iter() {
            out.write_all(&block.to_le_bytes())?;
        }
        Ok(8 * B)
    }

    pub fn load<R: std::io::Read>(input: &mut R) -> std::io::Result<Self> {
        let mut data = [0u64; B];
        for block in data.iter_mut() {
            *block = input.read_u64::<LittleEndian>()?;
        }
        Ok(Self { data })
    }
}

/// The element type stored by the collector: either a bare k-mer or a k-mer
/// tagged with an occurrence count. Ordering and equality are always on the
/// k-mer alone; counts merge by saturating addition when duplicates collapse.
pub trait KmerRecord<const B: usize>: Copy + Send + Sync {
    fn kmer(&self) -> &PackedKmer<B>;
    fn from_kmer(kmer: PackedKmer<B>) -> Self;
    /// A copy with the k-mer replaced and the count (if any) kept.
    fn with_kmer(&self, kmer: PackedKmer<B>) -> Self;
    fn count(&self) -> u8;
    fn absorb(&mut self, other: &Self);
}

impl<const B: usize> KmerRecord<B> for PackedKmer<B> {
    #[inline]
    fn kmer(&self) -> &PackedKmer<B> {
        self
    }

    #[inline]
    fn from_kmer(kmer: PackedKmer<B>) -> Self {
        kmer
    }

    #[inline]
    fn with_kmer(&self, kmer: PackedKmer<B>) -> Self {
        kmer
    }

    #[inline]
    fn count(&self) -> u8 {
        1
    }

    #[inline]
    fn absorb(&mut self, _other: &Self) {}
}

/// A k-mer with a saturating occurrence counter. The counter does not
/// participate in ordering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CountedKmer<const B: usize> {
    pub kmer: PackedKmer<B>,
    pub count: u8,
}

impl<const B: usize> KmerRecord<B> for CountedKmer<B> {
    #[inline]
    fn kmer(&self) -> &PackedKmer<B> {
        &self.kmer
    }

    #[inline]
    fn from_kmer(kmer: PackedKmer<B>) -> Self {
        Self { kmer, count: 1 }
    }

    #[inline]
    fn with_kmer(&self, kmer: PackedKmer<B>) -> Self {
        Self { kmer, count: self.count }
    }

    #[inline]
    fn count(&self) -> u8 {
        self.count
    }

    #[inline]
    fn absorb(&mut self, other: &Self) {
        self.count = self.count.saturating_add(other.count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;

    fn pack_str<const B: usize>(a: &Alphabet, s: &str) -> PackedKmer<B> {
        PackedKmer::pack(&a.encode_sequence(s.as_bytes()), a.bits_per_char())
    }

    fn unpack_str<const B: usize>(a: &Alphabet, x: &PackedKmer<B>, k_plus_1: usize) -> String {
        let codes = x.unpack(k_plus_1, a.bits_per_char());
        String::from_utf8(codes.iter().map(|&c| a.decode(c)).collect()).unwrap()
    }

    // BOSS edge order on strings: co-lex on the node, then the edge label.
    fn boss_cmp(x: &str, y: &str) -> std::cmp::Ordering {
        let (xn, xw) = x.split_at(x.len() - 1);
        let (yn, yw) = y.split_at(y.len() - 1);
        let rx: String = xn.chars().rev().collect();
        let ry: String = yn.chars().rev().collect();
        rx.cmp(&ry).then(xw.cmp(yw))
    }

    #[test]
    fn pack_roundtrip() {
        let a = Alphabet::dna();
        for s in ["$AC", "ACG", "GT$", "$$A", "TTTT$", "ACGTACGTA"] {
            let x: PackedKmer<1> = pack_str(&a, s);
            assert_eq!(unpack_str(&a, &x, s.len()), s);
        }
    }

    #[test]
    fn packed_order_is_boss_order() {
        let a = Alphabet::dna();
        let mut strs: Vec<String> = Vec::new();
        for c0 in "$ACGT".chars() {
            for c1 in "$ACGT".chars() {
                for c2 in "$ACGT".chars() {
                    strs.push(format!("{}{}{}", c0, c1, c2));
                }
            }
        }
        let mut by_int: Vec<String> = strs.clone();
        by_int.sort_by_key(|s| pack_str::<1>(&a, s));
        let mut by_def = strs;
        by_def.sort_by(|x, y| boss_cmp(x, y));
        assert_eq!(by_int, by_def);
    }

    #[test]
    fn suffix_comparison() {
        let a = Alphabet::dna();
        let bits = a.bits_per_char();
        // Same node, different labels.
        let x: PackedKmer<1> = pack_str(&a, "ACGA");
        let y: PackedKmer<1> = pack_str(&a, "ACGT");
        assert!(PackedKmer::compare_suffix(&x, &y, 0, bits));
        // Nodes differing only in their first character, same label.
        let x: PackedKmer<1> = pack_str(&a, "ACGT");
        let y: PackedKmer<1> = pack_str(&a, "TCGT");
        assert!(!PackedKmer::compare_suffix(&x, &y, 0, bits));
        assert!(PackedKmer::compare_suffix(&x, &y, 1, bits));
        let x: PackedKmer<1> = pack_str(&a, "AAGT");
        assert!(!PackedKmer::compare_suffix(&x, &y, 1, bits));
    }

    #[test]
    fn to_prev_pads_with_sentinel() {
        let a = Alphabet::dna();
        let bits = a.bits_per_char();
        let x: PackedKmer<1> = pack_str(&a, "$AC"); // node $A, label C
        let y = x.to_prev(3, 0, bits);
        assert_eq!(unpack_str(&a, &y, 3), "$$A");

        let x: PackedKmer<1> = pack_str(&a, "GATTC"); // node GATT, label C
        let y = x.to_prev(5, 0, bits);
        assert_eq!(unpack_str(&a, &y, 5), "$GATT");
    }

    #[test]
    fn word_straddling_characters() {
        // With 3-bit characters and B = 2, position 21 occupies bits 63..66
        // and straddles the block boundary.
        let a = Alphabet::dna();
        let bits = a.bits_per_char();
        let s = "ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";
        let x: PackedKmer<2> = pack_str(&a, s);
        assert_eq!(unpack_str(&a, &x, s.len()), s);
        for pos in 0..s.len() {
            let y = x.set(pos, 4, bits);
            let mut expected: Vec<u8> = s.as_bytes().to_vec();
            // Position 0 is the edge label = last character of the string.
            let j = if pos == 0 { s.len() - 1 } else { pos - 1 };
            expected[j] = b'T';
            assert_eq!(unpack_str(&a, &y, s.len()).as_bytes(), &expected);
        }
    }

    #[test]
    fn shifts_against_each_other() {
        let a = Alphabet::dna();
        let x: PackedKmer<2> = pack_str(&a, "TTGCATGCATGCATGCATGCAT");
        for sh in [0, 1, 3, 63, 64, 65, 120] {
            assert_eq!(x.shl_bits(sh).shr_bits(sh).and(&x), x.shl_bits(sh).shr_bits(sh));
            assert_eq!(x.shr_bits(sh).shl_bits(sh).and(&x), x.shr_bits(sh).shl_bits(sh));
        }
        assert_eq!(x.shl_bits(0), x);
        assert_eq!(x.shr_bits(0), x);
    }

    #[test]
    fn serialize_and_load() {
        let a = Alphabet::dna();
        let x: PackedKmer<2> = pack_str(&a, "ACGTACGTACGTACGTACGTACGTACG");
        let mut buf = Vec::new();
        x.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), PackedKmer::<2>::byte_size());
        let y = PackedKmer::<2>::load(&mut buf.as_slice()).unwrap();
        assert_eq!(x, y);
    }
}
