//! # Introduction
//!
//! This crate builds and queries a succinct [BOSS](boss::Boss) representation
//! of the de Bruijn graph of a set of sequences, together with a per-label
//! [Bloom filter annotation](annotate::BloomAnnotator) attached to the graph
//! edges. Every (k+1)-mer of the input becomes a graph edge; the graph
//! supports successor/predecessor traversal and branch queries in
//! near-constant time on three arrays `(W, last, F)`, and each edge can be
//! asked for the set of input labels that contain it.
//!
//! Construction is a parallel pipeline: sequences stream into a
//! [k-mer collector](construct::KmerCollector) that sorts and deduplicates
//! bit-packed (k+1)-mers under a memory budget, the
//! [source dummy edges](construct::recover_source_dummy_kmers) required by
//! BOSS are synthesized, and a linear pass emits the final arrays as a
//! [chunk](chunk::BossChunk). Chunks built independently per node-suffix
//! bucket concatenate into the same graph as a monolithic build.
//!
//! The raw Bloom annotation of an edge can contain false positive labels
//! (never false negatives). The [corrector](annotate::annotation_corrected)
//! suppresses them by walking the graph forward and backward from the edge
//! and intersecting the label sets seen along unique-branch paths.
//!
//! # API Quick start
//!
//! ```
//! use bossdbg::*;
//!
//! let seqs: Vec<&[u8]> = vec![b"TACGTACTGA", b"TACGAACTGA"];
//! let alphabet = Alphabet::dna();
//!
//! // Build the graph.
//! let (graph, _weights) = BossBuilder::new(alphabet.clone(), 4)
//!     .num_threads(2)
//!     .build_from_slices(&seqs)
//!     .unwrap();
//!
//! // Look up an edge.
//! let edge = graph.map_to_edge(&alphabet.encode_sequence(b"TACGT")).unwrap();
//! assert_eq!(graph.edge_label(edge), alphabet.encode(b'T'));
//!
//! // Annotate each input with its own label and query with correction.
//! let mut annotator = BloomAnnotator::new(alphabet.clone(), 4, 2, 10.0);
//! for (column, seq) in seqs.iter().enumerate() {
//!     annotator.add_sequence(seq, column);
//! }
//! let labels = annotation_corrected(&graph, &annotator, edge, 4);
//! assert!(annotate::bitset::get_bit(&labels, 0));
//! ```
//!
//! # Graph construction
//!
//! The collector accepts sequences over an [Alphabet] whose code 0 is the
//! reserved sentinel `$`; unknown characters encode to the sentinel. K-mers
//! pack into 64, 128 or 256-bit integers chosen from
//! `(k+1) * bits_per_char`, ordered so that plain integer comparison is the
//! BOSS edge order. In canonical mode every sequence contributes its
//! reverse complement as well.
//!
//! Very large inputs can be built in node-suffix buckets
//! ([BossBuilder::suffix_bucket_len]): each bucket collects and sorts only
//! the k-mers whose node ends with its suffix, and the per-bucket chunks
//! concatenate with [chunk::BossChunk::extend]. The result is bit-identical
//! to the monolithic build.
//!
//! # Limitations
//!
//! The graph is immutable once constructed. Annotation columns are
//! write-once Bloom filters; the no-false-negative guarantee only holds for
//! k-mers that were actually inserted, and corrected queries are still
//! approximate (false positives are suppressed, not eliminated).

pub mod alphabet;
pub mod annotate;
pub mod boss;
pub mod chunk;
pub mod construct;
pub mod error;
pub mod kmer;
pub mod labels;
pub mod util;

mod builder;
mod serialize;

pub use alphabet::Alphabet;
pub use annotate::{
    annotation_corrected, AnnotationMatrix, BloomAnnotator, CorrectedAnnotation,
    EdgeHasher, ExactAnnotation, PreciseAnnotator,
};
pub use boss::Boss;
pub use builder::BossBuilder;
pub use chunk::BossChunk;
pub use error::{Error, Result};
pub use kmer::{CountedKmer, PackedKmer};
pub use util::{SliceSeqStream, VecSeqStream};

/// A stream of ASCII sequences. This is not a standard Rust iterator because
/// implementations may stream from disk and reuse an internal buffer, which
/// the lifetime constraints of `Iterator` cannot express.
pub trait SeqStream {
    fn stream_next(&mut self) -> Option<&[u8]>;
}
