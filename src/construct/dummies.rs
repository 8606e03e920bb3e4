//! Recovery of the source dummy edges.
//!
//! BOSS requires every node to have an incoming edge. A read start
//! contributes the source dummy `$s[0..k-1] -> s[k-1]` through padding, but
//! the deeper sentinel-prefixed ancestors (`$$s[0..k-2]`, `$$$s[0..k-3]`, ...)
//! have to be synthesized here. A level-1 source dummy whose target node
//! already has a real incoming edge is redundant and dropped together with
//! its would-be ancestors.

use crate::alphabet::SENTINEL_CODE;
use crate::construct::{par_sort_and_dedup, shrink_kmers};
use crate::kmer::{KmerRecord, PackedKmer};

/// Extends a sorted array of (k+1)-mers with all required source dummy
/// k-mers, in place. `k` is the node length and `bits` the character width.
/// The array is fully sorted and duplicate-free afterwards.
pub fn recover_source_dummy_kmers<const B: usize, T: KmerRecord<B>>(
    k: usize,
    bits: usize,
    kmers: &mut Vec<T>,
) {
    let mut cur_pos = 0usize;
    let mut dummy_begin = kmers.len();
    let mut num_dummy_parents = 0usize;

    for i in 0..dummy_begin {
        let kmer = *kmers[i].kmer();
        // Reads shorter than k+1 never enter the collector.
        debug_assert!(
            kmer.get(1, bits) != 0 || kmer.get(0, bits) != 0 || kmer.get(k, bits) == 0
        );

        let edge_label = kmer.get(0, bits);

        // Not a source dummy: the node starts with a real character, or the
        // edge label itself is the sentinel.
        if kmer.get(1, bits) > 0 || edge_label == 0 {
            kmers[cur_pos] = kmers[i];
            cur_pos += 1;
            continue;
        }

        // The dummy is redundant if a real edge with the same target exists:
        // same node suffix above position 1 and the same label.
        let mut redundant = false;
        let mut j = i + 1;
        while j < dummy_begin && PackedKmer::compare_suffix(&kmer, kmers[j].kmer(), 1, bits) {
            if kmers[j].kmer().get(0, bits) == edge_label {
                redundant = true;
                break;
            }
            j += 1;
        }
        if redundant {
            continue;
        }

        num_dummy_parents += 1;
        kmers[cur_pos] = kmers[i];
        cur_pos += 1;

        if kmers.len() + 1 > kmers.capacity() {
            shrink_kmers(kmers, dummy_begin);
        }
        let record = kmers[i];
        kmers.push(record.with_kmer(record.kmer().to_prev(k + 1, SENTINEL_CODE, bits)));
    }
    log::debug!(
        "Number of dummy k-mers with dummy prefix of length 1: {}",
        num_dummy_parents
    );

    par_sort_and_dedup(kmers, dummy_begin);
    log::debug!(
        "Number of dummy k-mers with dummy prefix of length 2: {}",
        kmers.len() - dummy_begin
    );

    // Close the gap left by the dropped redundant dummies.
    kmers.copy_within(dummy_begin.., cur_pos);
    kmers.truncate(kmers.len() - dummy_begin + cur_pos);
    let mut dummy_begin = cur_pos;

    for c in 3..k + 1 {
        let succ_dummy_begin = dummy_begin;
        dummy_begin = kmers.len();

        for i in succ_dummy_begin..dummy_begin {
            if kmers.len() + 1 > kmers.capacity() {
                shrink_kmers(kmers, dummy_begin);
            }
            let record = kmers[i];
            kmers.push(record.with_kmer(record.kmer().to_prev(k + 1, SENTINEL_CODE, bits)));
        }
        par_sort_and_dedup(kmers, dummy_begin);
        log::debug!(
            "Number of dummy k-mers with dummy prefix of length {}: {}",
            c,
            kmers.len() - dummy_begin
        );
    }

    // Merge the dummy tail back over the non-dummy section.
    par_sort_and_dedup(kmers, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::construct::extract::sequence_to_kmers;

    fn closure(seqs: &[&str], k: usize) -> Vec<String> {
        let a = Alphabet::dna();
        let mut kmers: Vec<PackedKmer<1>> = Vec::new();
        for seq in seqs {
            sequence_to_kmers(&a.encode_sequence(seq.as_bytes()), k + 1, &a, &[], false, &mut kmers);
        }
        par_sort_and_dedup(&mut kmers, 0);
        recover_source_dummy_kmers(k, a.bits_per_char(), &mut kmers);
        kmers
            .iter()
            .map(|x| {
                String::from_utf8(
                    x.unpack(k + 1, a.bits_per_char())
                        .iter()
                        .map(|&c| a.decode(c))
                        .collect(),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn single_read_closure() {
        // "ACGT" at k = 2: the padded windows plus the recovered $$A.
        assert_eq!(closure(&["ACGT"], 2), vec!["$$A", "$AC", "ACG", "CGT", "GT$"]);
    }

    #[test]
    fn deep_dummy_chain() {
        // k = 4: the dummy prefix chain of the single read start runs down
        // to $$$$A.
        let got = closure(&["ACGTA"], 4);
        for expected in ["$$$$A", "$$$AC", "$$ACG", "$ACGT", "ACGTA", "CGTA$"] {
            assert!(got.contains(&expected.to_string()), "{} missing from {:?}", expected, got);
        }
        assert_eq!(got.len(), 6);
    }

    #[test]
    fn redundant_source_dummy_dropped() {
        // The start of "CGA" has a real predecessor in "ACGA": the source
        // dummy $CG -> A is redundant, so neither it nor its ancestors
        // survive.
        let got = closure(&["ACGA", "CGA"], 3);
        assert!(!got.contains(&"$CGA".to_string()));
        assert!(!got.contains(&"$$CG".to_string()));
        // The non-redundant dummy chain of "ACGA" itself is present.
        for expected in ["$$$A", "$$AC", "$ACG", "ACGA", "CGA$"] {
            assert!(got.contains(&expected.to_string()), "{} missing from {:?}", expected, got);
        }
    }

    #[test]
    fn dummy_closure_property() {
        // For every retained k-mer with a sentinel-prefixed node, its
        // to_prev ancestor is present as well.
        let a = Alphabet::dna();
        let bits = a.bits_per_char();
        let k = 3;
        let mut kmers: Vec<PackedKmer<1>> = Vec::new();
        for seq in ["TACGTT", "GGCATT", "CATG"] {
            sequence_to_kmers(&a.encode_sequence(seq.as_bytes()), k + 1, &a, &[], false, &mut kmers);
        }
        par_sort_and_dedup(&mut kmers, 0);
        recover_source_dummy_kmers(k, bits, &mut kmers);

        assert!(kmers.windows(2).all(|p| p[0] < p[1]));
        for x in kmers.iter() {
            if x.get(1, bits) == 0 && x.get(0, bits) != 0 {
                let parent = x.to_prev(k + 1, SENTINEL_CODE, bits);
                // Sentinel-only parents are edges labeled with position k of
                // the child; they were appended unless the child was itself
                // the all-sentinel edge.
                assert!(
                    parent.get(0, bits) == 0 || kmers.binary_search(&parent).is_ok(),
                    "ancestor of a retained source dummy is missing"
                );
            }
        }
    }

    #[test]
    fn grows_under_capacity_pressure() {
        // A vector with no spare capacity forces the shrink path.
        let a = Alphabet::dna();
        let mut kmers: Vec<PackedKmer<1>> = Vec::new();
        for seq in ["ACGTA", "TTACG"] {
            sequence_to_kmers(&a.encode_sequence(seq.as_bytes()), 4, &a, &[], false, &mut kmers);
        }
        par_sort_and_dedup(&mut kmers, 0);
        kmers.shrink_to_fit();
        let before = kmers.len();
        recover_source_dummy_kmers(3, a.bits_per_char(), &mut kmers);
        assert!(kmers.len() > before);
        assert!(kmers.windows(2).all(|p| p[0] < p[1]));
    }
}
