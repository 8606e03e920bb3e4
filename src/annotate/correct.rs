//! Graph-guided correction of Bloom annotations.
//!
//! The raw Bloom lookup at an edge may carry false positive labels. Walking
//! the graph forward and backward along unique-branch paths and intersecting
//! the label sets seen at each step suppresses them: a true label is present
//! in every neighbor's filter along the underlying sequence, so the
//! intersection never loses it, while a false positive survives only if it
//! is also a false positive at every step of the path.

use crate::annotate::bitset::{is_subset, merge_and, popcount};
use crate::annotate::bloom::BloomAnnotator;
use crate::annotate::precise::PreciseAnnotator;
use crate::boss::Boss;

/// The corrected label set of edge `i`: a subset of the raw Bloom bitset and
/// a superset of the true labels. Pure function of the graph and the
/// annotation; it cannot fail.
pub fn annotation_corrected(
    graph: &Boss,
    annotator: &BloomAnnotator,
    i: usize,
    path_cutoff: usize,
) -> Vec<u64> {
    debug_assert_eq!(graph.k(), annotator.k());
    let k = graph.k();

    let kmer = graph.edge_kmer(i);
    let mut hasher = annotator.hasher_for(&kmer);
    let mut cur = annotator.annotation_from_hasher(&hasher);

    // Dummy edges are not supposed to be annotated.
    if kmer.contains(&0) {
        cur.iter_mut().for_each(|w| *w = 0);
        return cur;
    }

    let mut pcount_old = popcount(&cur);
    if pcount_old == 0 {
        return cur;
    }

    // Forward walk.
    let mut cur_edge = kmer[k];
    let mut j = i;
    let mut path = 0;
    while path < path_cutoff {
        path += 1;

        j = match graph.next_edge(j, cur_edge) {
            Some(next) => next,
            None => break,
        };
        cur_edge = graph.edge_label(j);

        if cur_edge == 0 || !graph.has_the_only_outgoing_edge(j) {
            break;
        }
        hasher.update(cur_edge);

        let nextannot = merge_and(&cur, &annotator.annotation_from_hasher(&hasher));
        let pcount_new = popcount(&nextannot);
        debug_assert!(pcount_new <= pcount_old);

        // An empty intersection means the path crossed into a new sequence.
        if pcount_new == 0 {
            break;
        }
        if pcount_new < pcount_old {
            cur = nextannot;
            path = 0;
            pcount_old = pcount_new;
        }
    }

    // Backward walk, over a ring of the k+1 edges spelling the current
    // window: the front edge's label feeds reverse_update.
    let mut indices = vec![0usize; k + 1];
    indices[0] = i;
    let mut back_hasher = annotator.hasher_for(&kmer);
    let mut j = i;
    let mut chain_complete = true;
    for m in 0..k {
        match graph.prev_edge(j) {
            Some(prev) => {
                j = prev;
                indices[m + 1] = j;
            }
            None => {
                chain_complete = false;
                break;
            }
        }
    }

    if chain_complete {
        let mut back = k;
        let mut path = 0;
        while path < path_cutoff {
            let front_slot = (back + 1) % (k + 1);
            if !graph.has_the_only_incoming_edge(indices[front_slot]) {
                break;
            }
            path += 1;

            indices[front_slot] = match graph.prev_edge(indices[back]) {
                Some(prev) => prev,
                None => break,
            };
            back = front_slot;

            let cur_first = graph.edge_label(indices[back]);
            if cur_first == 0 {
                break;
            }
            back_hasher.reverse_update(cur_first);

            let nextannot = merge_and(&cur, &annotator.annotation_from_hasher(&back_hasher));
            let pcount_new = popcount(&nextannot);
            debug_assert!(pcount_new <= pcount_old);

            if pcount_new == 0 {
                break;
            }
            if pcount_new < pcount_old {
                cur = nextannot;
                path = 0;
                pcount_old = pcount_new;
            }
        }
    }

    cur
}

/// Per-edge comparison of the Bloom annotation against the exact oracle:
/// `[fp_before_correction, fp_after_correction, fn_after_correction]`.
///
/// Panics if the Bloom annotation misses a true label (the encoding is
/// broken) or if correction added a label that the raw lookup did not have.
pub fn test_fp(
    graph: &Boss,
    annotator: &BloomAnnotator,
    exact: &PreciseAnnotator,
    i: usize,
    path_cutoff: usize,
) -> [bool; 3] {
    let kmer = graph.edge_kmer(i);
    let raw = annotator.annotation_from_kmer(&kmer);
    let oracle = exact.annotation_from_kmer(&kmer);
    let corrected = annotation_corrected(graph, annotator, i, path_cutoff);

    assert!(
        is_subset(&oracle, &raw),
        "Bloom annotation of edge {} lost a true label",
        i
    );
    assert!(
        is_subset(&corrected, &raw),
        "correction added labels at edge {}",
        i
    );

    [
        !is_subset(&raw, &oracle),
        !is_subset(&corrected, &oracle),
        !is_subset(&oracle, &corrected),
    ]
}

/// Aggregate false positive statistics over the graph's non-dummy edges.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FpStats {
    pub total: usize,
    pub fp_pre: usize,
    pub fp_post: usize,
    pub fn_post: usize,
}

/// Runs [`test_fp`] on every `step`-th non-dummy edge.
pub fn test_fp_all(
    graph: &Boss,
    annotator: &BloomAnnotator,
    exact: &PreciseAnnotator,
    step: usize,
    path_cutoff: usize,
) -> FpStats {
    let mut stats = FpStats::default();
    let mut i = 1;
    while i <= graph.num_edges() {
        if !graph.is_dummy_edge(i) {
            let [pre, post, fn_post] = test_fp(graph, annotator, exact, i, path_cutoff);
            stats.total += 1;
            stats.fp_pre += pre as usize;
            stats.fp_post += post as usize;
            stats.fn_post += fn_post as usize;
        }
        i += step.max(1);
    }
    log::info!(
        "Total: {}, pre-correction FP: {}, post-correction FP: {}, post-correction FN: {}",
        stats.total,
        stats.fp_pre,
        stats.fp_post,
        stats.fn_post
    );
    stats
}
