//! Enumerating the (k+1)-mers of an encoded sequence.
//!
//! Sequences are padded with one sentinel on each side, so every read
//! contributes its first source dummy (node `$s[0..k-1]`) and its sink dummy
//! (label `$`) directly; deeper dummy prefixes are synthesized later by
//! [dummy recovery](crate::construct::recover_source_dummy_kmers).

use crate::alphabet::{Alphabet, SENTINEL_CODE};
use crate::kmer::{KmerRecord, PackedKmer};

/// Appends all (k+1)-mers of the encoded sequence to `out`. `edge_len` is
/// k+1. If `suffix` is non-empty, only k-mers whose node ends with those
/// character codes are kept. In canonical mode the reverse complement
/// contributes a second pass. Sequences shorter than `edge_len` produce
/// nothing.
pub fn sequence_to_kmers<const B: usize, T: KmerRecord<B>>(
    codes: &[u8],
    edge_len: usize,
    alphabet: &Alphabet,
    suffix: &[u8],
    canonical: bool,
    out: &mut Vec<T>,
) {
    debug_assert!(edge_len >= 2);
    if codes.len() < edge_len {
        return;
    }
    one_strand_to_kmers(codes, edge_len, alphabet, suffix, out);
    if canonical {
        let mut rc = codes.to_vec();
        alphabet.reverse_complement_in_place(&mut rc);
        one_strand_to_kmers(&rc, edge_len, alphabet, suffix, out);
    }
}

fn one_strand_to_kmers<const B: usize, T: KmerRecord<B>>(
    codes: &[u8],
    edge_len: usize,
    alphabet: &Alphabet,
    suffix: &[u8],
    out: &mut Vec<T>,
) {
    let bits = alphabet.bits_per_char();
    let mut padded = Vec::with_capacity(codes.len() + 2);
    padded.push(SENTINEL_CODE);
    padded.extend_from_slice(codes);
    padded.push(SENTINEL_CODE);

    for window in padded.windows(edge_len) {
        // The node is window[0..edge_len-1]; the filter looks at its tail.
        if !suffix.is_empty() {
            let tail = &window[edge_len - 1 - suffix.len()..edge_len - 1];
            if tail != suffix {
                continue;
            }
        }
        out.push(T::from_kmer(PackedKmer::pack(window, bits)));
    }
}
