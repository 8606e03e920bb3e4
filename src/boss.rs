//! The succinct BOSS graph: navigation over the `(W, last, F)` arrays.
//!
//! Edges are rows 1..=n in co-lexicographic order of their source nodes;
//! row 0 is the reserved head element. A node is a maximal run of rows with
//! the same source, delimited by the `last` bits. `F[a]` counts the edges
//! whose last node character is smaller than `a`, so block `a` spans rows
//! `F[a]+1 ..= F[a+1]`.
//!
//! The graph is immutable once constructed; queries need no locking.

use std::io::{Read, Write};

use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::int_vector::IntVector;
use simple_sds_sbwt::ops::*;
use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};
use simple_sds_sbwt::serialize::Serialize as SdsSerialize;

use crate::chunk::BossChunk;
use crate::error::{Error, Result};
use crate::labels::LabelMatrix;
use crate::serialize;

/// Representation state tag stored in the graph file.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u64)]
pub enum State {
    Stat = 1,
}

#[derive(Clone, Debug)]
pub struct Boss {
    alph_size: usize,
    k: usize,
    w: LabelMatrix,
    last: BitVector,
    f: Vec<u64>,
    state: State,
}

impl Boss {
    /// Initializes the graph from a chunk, consuming it. Returns the graph
    /// and the weights array if the chunk carried one.
    pub fn from_chunk(chunk: BossChunk) -> (Self, Option<IntVector>) {
        let alph_size = chunk.alph_size();
        let n_symbols = 2 * alph_size;
        log::info!(
            "Initializing BOSS graph with {} edges (k = {})",
            chunk.size(),
            chunk.k()
        );

        let w = LabelMatrix::from_codes(chunk.w(), n_symbols);

        let mut raw = RawVector::with_len(chunk.last().len(), false);
        for (i, b) in chunk.last().iter().by_vals().enumerate() {
            if b {
                raw.set_bit(i, true);
            }
        }
        let mut last = BitVector::from(raw);
        last.enable_rank();
        last.enable_select();

        let f = chunk.f().to_vec();
        let weights = chunk.weights().cloned();
        let boss = Self { alph_size, k: chunk.k(), w, last, f, state: State::Stat };
        debug_assert!(boss.is_valid());
        (boss, weights)
    }

    fn is_valid(&self) -> bool {
        self.w.len() == self.last.len()
            && self.f.len() == self.alph_size
            && self.f.windows(2).all(|p| p[0] <= p[1])
            && self.w.access(0) == 0
            && !self.last.get(0)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn alph_size(&self) -> usize {
        self.alph_size
    }

    /// Number of edges, not counting the head element.
    pub fn num_edges(&self) -> usize {
        self.w.len() - 1
    }

    /// Number of nodes: the number of last-marked rows.
    pub fn num_nodes(&self) -> usize {
        self.last.count_ones()
    }

    /// The edge label of row i, with the duplicate flag stripped.
    #[inline]
    pub fn edge_label(&self, i: usize) -> u8 {
        self.w.access(i) % self.alph_size as u8
    }

    /// The last character of the source node of row i: the largest c with
    /// `F[c] < i`. Row 0 and the sentinel block report the sentinel.
    pub fn node_last_value(&self, i: usize) -> u8 {
        for c in (0..self.alph_size).rev() {
            if self.f[c] < i as u64 {
                return c as u8;
            }
        }
        0
    }

    /// Follows edge i forward: the row of the last outgoing edge of the
    /// target node. None if the edge is sentinel-labeled.
    pub fn fwd(&self, i: usize) -> Option<usize> {
        let c = self.edge_label(i);
        if c == 0 {
            return None;
        }
        // Flagged copies share the target of the previous unflagged edge, so
        // the unflagged rank up to and including i names the target node.
        let r = self.w.rank(c, i + 1);
        debug_assert!(r > 0);
        let nodes_before = self.last.rank(self.f[c as usize] as usize + 1);
        self.last.select(nodes_before + r - 1)
    }

    /// Follows edge i backward: the row of the first (unflagged) edge into
    /// the source node of i. None on the sentinel block.
    pub fn bwd(&self, i: usize) -> Option<usize> {
        let c = self.node_last_value(i);
        if c == 0 {
            return None;
        }
        let r = self.last.rank(i) - self.last.rank(self.f[c as usize] as usize + 1) + 1;
        self.w.select(c, r - 1)
    }

    /// Row range [start, end] of the node that edge i belongs to.
    fn node_run(&self, i: usize) -> (usize, usize) {
        debug_assert!(i >= 1);
        let r = self.last.rank(i);
        let end = self.last.select(r).unwrap();
        let start = if r == 0 { 1 } else { self.last.select(r - 1).unwrap() + 1 };
        (start, end)
    }

    /// Number of outgoing edges of the source node of edge i.
    pub fn outdegree(&self, i: usize) -> usize {
        let (start, end) = self.node_run(i);
        end - start + 1
    }

    pub fn has_the_only_outgoing_edge(&self, i: usize) -> bool {
        self.outdegree(i) == 1
    }

    /// Number of incoming edges of the source node of edge i; 0 on the
    /// sentinel block.
    pub fn indegree(&self, i: usize) -> usize {
        let c = self.node_last_value(i);
        if c == 0 {
            return 0;
        }
        let p = match self.bwd(i) {
            Some(p) => p,
            None => return 0,
        };
        // Flagged copies between the first incoming edge and the next
        // unflagged occurrence all point at the same node.
        let flag = c + self.alph_size as u8;
        let next = self.w.select(c, self.w.rank(c, p + 1)).unwrap_or(self.w.len());
        1 + self.w.rank(flag, next) - self.w.rank(flag, p + 1)
    }

    pub fn has_the_only_incoming_edge(&self, i: usize) -> bool {
        self.indegree(i) == 1
    }

    /// The outgoing edge of the source node of i labeled c, if present.
    pub fn outgoing(&self, i: usize, c: u8) -> Option<usize> {
        let (start, end) = self.node_run(i);
        (start..=end).find(|&p| self.edge_label(p) == c)
    }

    /// Traverses edge i, whose label must be c. Returns a row of the target
    /// node; if the target has a unique outgoing edge, this is that edge.
    pub fn next_edge(&self, i: usize, c: u8) -> Option<usize> {
        debug_assert_eq!(self.edge_label(i), c);
        self.fwd(i)
    }

    /// The unique incoming edge of the source node of i. Meaningful when
    /// [`Boss::has_the_only_incoming_edge`] holds.
    pub fn prev_edge(&self, i: usize) -> Option<usize> {
        self.bwd(i)
    }

    /// Reconstructs the character codes of the (k+1)-mer of edge i: the k
    /// node characters followed by the edge label. Dummy edges come back
    /// with sentinel padding.
    pub fn push_edge_kmer(&self, i: usize, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.resize(start + self.k + 1, 0);
        buf[start + self.k] = self.edge_label(i);
        let mut cur = i;
        for pos in (0..self.k).rev() {
            let c = self.node_last_value(cur);
            buf[start + pos] = c;
            if c == 0 {
                break;
            }
            match self.bwd(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
    }

    pub fn edge_kmer(&self, i: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.k + 1);
        self.push_edge_kmer(i, &mut buf);
        buf
    }

    /// True iff the (k+1)-mer of edge i contains the sentinel.
    pub fn is_dummy_edge(&self, i: usize) -> bool {
        self.edge_kmer(i).contains(&0)
    }

    /// First row in [lo, hi] whose edge label is c (flagged or not).
    fn succ_w_in(&self, c: u8, lo: usize, hi: usize) -> Option<usize> {
        let mut best: Option<usize> = None;
        for sym in [c, c + self.alph_size as u8] {
            if let Some(j) = self.w.select(sym, self.w.rank(sym, lo)) {
                if j <= hi {
                    best = Some(best.map_or(j, |b| b.min(j)));
                }
            }
        }
        best
    }

    /// Last row in [lo, hi] whose edge label is c (flagged or not).
    fn pred_w_in(&self, c: u8, lo: usize, hi: usize) -> Option<usize> {
        let mut best: Option<usize> = None;
        for sym in [c, c + self.alph_size as u8] {
            let r = self.w.rank(sym, hi + 1);
            if r > self.w.rank(sym, lo) {
                let j = self.w.select(sym, r - 1).unwrap();
                best = Some(best.map_or(j, |b| b.max(j)));
            }
        }
        best
    }

    /// Looks up the row of the edge with the given (k+1)-mer codes, walking
    /// the node characters with forward steps. K-mers with a sentinel at an
    /// interior position are not addressable (there is no edge to follow
    /// through the sentinel) and return None.
    pub fn map_to_edge(&self, codes: &[u8]) -> Option<usize> {
        assert_eq!(codes.len(), self.k + 1);
        let c0 = codes[0] as usize;
        if c0 >= self.alph_size {
            return None;
        }
        let mut rl = self.f[c0] as usize + 1;
        let mut ru = if c0 + 1 < self.alph_size {
            self.f[c0 + 1] as usize
        } else {
            self.num_edges()
        };
        if rl > ru {
            return None;
        }
        for &c in &codes[1..self.k] {
            let lo = self.succ_w_in(c, rl, ru)?;
            let hi = self.pred_w_in(c, rl, ru)?;
            rl = self.node_run(self.fwd(lo)?).0;
            ru = self.fwd(hi)?;
        }
        self.succ_w_in(codes[self.k], rl, ru)
    }

    /// Writes the graph: label matrix, last, F, state, k.
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n = self.w.serialize(out)?;
        self.last.serialize(out)?;
        n += self.last.size_in_bytes();
        n += serialize::write_number_vector(out, &self.f)?;
        n += serialize::write_number(out, self.state as u64)?;
        n += serialize::write_number(out, self.k as u64)?;
        Ok(n)
    }

    pub fn load<R: Read>(input: &mut R) -> Result<Self> {
        let w = LabelMatrix::load(input)?;
        let mut last =
            BitVector::load(input).map_err(|e| Error::load("BOSS graph", e))?;
        last.enable_rank();
        last.enable_select();
        let f = serialize::read_number_vector(input)
            .map_err(|e| Error::load("BOSS graph", e))?;
        let state = serialize::read_number(input).map_err(|e| Error::load("BOSS graph", e))?;
        if state != State::Stat as u64 {
            return Err(Error::load("BOSS graph", format!("unknown state {}", state)));
        }
        let k = serialize::read_number(input).map_err(|e| Error::load("BOSS graph", e))? as usize;

        if w.n_symbols() % 2 != 0 || w.n_symbols() / 2 != f.len() || k == 0 {
            return Err(Error::load("BOSS graph", "inconsistent metadata"));
        }
        let boss = Self {
            alph_size: f.len(),
            k,
            w,
            last,
            f,
            state: State::Stat,
        };
        if !boss.is_valid() {
            return Err(Error::load("BOSS graph", "structural invariants violated"));
        }
        Ok(boss)
    }
}
