//! Edge annotation: per-label Bloom filters, the exact oracle, rolling
//! hashing, and graph-guided correction.

pub mod bitset;
pub mod bloom;
pub mod correct;
pub mod hashing;
pub mod precise;

pub use bitset::AnnotationMatrix;
pub use bloom::{BloomAnnotator, BloomFilter};
pub use correct::{annotation_corrected, test_fp, test_fp_all, FpStats};
pub use hashing::EdgeHasher;
pub use precise::PreciseAnnotator;

use crate::boss::Boss;

/// The corrected Bloom annotation as a row-per-edge matrix.
pub struct CorrectedAnnotation<'a> {
    graph: &'a Boss,
    annotator: &'a BloomAnnotator,
    path_cutoff: usize,
}

impl<'a> CorrectedAnnotation<'a> {
    pub fn new(graph: &'a Boss, annotator: &'a BloomAnnotator, path_cutoff: usize) -> Self {
        Self { graph, annotator, path_cutoff }
    }
}

impl AnnotationMatrix for CorrectedAnnotation<'_> {
    fn num_rows(&self) -> usize {
        self.graph.num_edges() + 1
    }

    fn num_labels(&self) -> usize {
        self.annotator.num_columns()
    }

    fn row(&self, row: usize) -> Vec<u64> {
        if row == 0 {
            return vec![0; bitset::words_for(self.num_labels())];
        }
        correct::annotation_corrected(self.graph, self.annotator, row, self.path_cutoff)
    }
}

/// The exact annotation as a row-per-edge matrix.
pub struct ExactAnnotation<'a> {
    graph: &'a Boss,
    annotator: &'a PreciseAnnotator,
}

impl<'a> ExactAnnotation<'a> {
    pub fn new(graph: &'a Boss, annotator: &'a PreciseAnnotator) -> Self {
        Self { graph, annotator }
    }
}

impl AnnotationMatrix for ExactAnnotation<'_> {
    fn num_rows(&self) -> usize {
        self.graph.num_edges() + 1
    }

    fn num_labels(&self) -> usize {
        self.annotator.num_columns()
    }

    fn row(&self, row: usize) -> Vec<u64> {
        if row == 0 {
            return vec![0; bitset::words_for(self.num_labels())];
        }
        self.annotator.annotation_from_kmer(&self.graph.edge_kmer(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::annotate::bitset::is_subset;
    use crate::construct::{build_chunk, BuildParams};
    use crate::kmer::PackedKmer;
    use crate::util::VecSeqStream;

    #[test]
    fn matrix_views_agree_on_shape() {
        let a = Alphabet::dna();
        let seqs = vec![b"ACGTACGT".to_vec(), b"TTGCAACG".to_vec()];
        let params = BuildParams::new(a.clone(), 3);
        let mut stream = VecSeqStream::new(&seqs);
        let chunk = build_chunk::<1, PackedKmer<1>, _>(&params, &mut stream).unwrap();
        let graph = crate::boss::Boss::from_chunk(chunk).0;

        let mut bloom = BloomAnnotator::new(a.clone(), 3, 2, 100.0);
        let mut exact = PreciseAnnotator::new(a.clone(), 3);
        for (c, seq) in seqs.iter().enumerate() {
            bloom.add_sequence(seq, c);
            exact.add_sequence(seq, c);
        }

        let corrected = CorrectedAnnotation::new(&graph, &bloom, 4);
        let oracle = ExactAnnotation::new(&graph, &exact);
        assert_eq!(corrected.num_rows(), oracle.num_rows());
        assert_eq!(corrected.num_labels(), 2);
        assert_eq!(oracle.num_labels(), 2);
        assert!(corrected.row(0).iter().all(|&w| w == 0));

        for i in 1..corrected.num_rows() {
            assert!(is_subset(&oracle.row(i), &corrected.row(i)) || graph.is_dummy_edge(i));
        }
    }
}
