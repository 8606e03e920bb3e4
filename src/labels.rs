//! Rank/select support over the BOSS `W` sequence, represented as one
//! indicator bit vector per symbol of the extended alphabet. Rank and select
//! on a symbol reduce to bit vector rank and select on its row, which is all
//! the navigation needs from a wavelet tree.

use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::*;
use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};
use simple_sds_sbwt::serialize::Serialize as SdsSerialize;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct LabelMatrix {
    rows: Vec<BitVector>,
}

impl LabelMatrix {
    /// Builds the matrix from the symbol at each position. Rank and select
    /// supports are enabled on every row.
    pub fn from_codes(codes: &[u8], n_symbols: usize) -> Self {
        let mut rawrows = Vec::<RawVector>::with_capacity(n_symbols);
        for _ in 0..n_symbols {
            rawrows.push(RawVector::with_len(codes.len(), false));
        }
        for (i, &c) in codes.iter().enumerate() {
            assert!((c as usize) < n_symbols);
            rawrows[c as usize].set_bit(i, true);
        }
        let mut rows: Vec<BitVector> = rawrows.into_iter().map(BitVector::from).collect();
        for row in rows.iter_mut() {
            row.enable_rank();
            row.enable_select();
        }
        Self { rows }
    }

    /// Length of the symbol sequence.
    pub fn len(&self) -> usize {
        if self.rows.is_empty() { 0 } else { self.rows[0].len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of symbols in the extended alphabet.
    pub fn n_symbols(&self) -> usize {
        self.rows.len()
    }

    /// The symbol at position i. Positions hold exactly one symbol.
    pub fn access(&self, i: usize) -> u8 {
        for (c, row) in self.rows.iter().enumerate() {
            if row.get(i) {
                return c as u8;
            }
        }
        unreachable!("position {} holds no symbol", i);
    }

    /// Number of occurrences of symbol c in positions [0, i).
    pub fn rank(&self, c: u8, i: usize) -> usize {
        self.rows[c as usize].rank(i)
    }

    /// Position of the occurrence of symbol c with rank r (0-based), if any.
    pub fn select(&self, c: u8, r: usize) -> Option<usize> {
        self.rows[c as usize].select(r)
    }

    /// Total number of occurrences of symbol c.
    pub fn count(&self, c: u8) -> usize {
        self.rows[c as usize].count_ones()
    }

    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let n_rows = self.rows.len() as u64;
        out.write_all(&n_rows.to_le_bytes())?;
        let mut n_written = 8;
        for row in self.rows.iter() {
            row.serialize(out)?;
            n_written += row.size_in_bytes();
        }
        Ok(n_written)
    }

    pub fn load<R: std::io::Read>(input: &mut R) -> Result<Self> {
        let n_rows =
            u64::load(input).map_err(|e| Error::load("label matrix", e))? as usize;
        let mut rows = Vec::<BitVector>::with_capacity(n_rows);
        for _ in 0..n_rows {
            let mut row =
                BitVector::load(input).map_err(|e| Error::load("label matrix", e))?;
            row.enable_rank();
            row.enable_select();
            rows.push(row);
        }
        if rows.windows(2).any(|p| p[0].len() != p[1].len()) {
            return Err(Error::load("label matrix", "rows of unequal length"));
        }
        Ok(Self { rows })
    }
}
