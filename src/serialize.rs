//! Little-endian codecs for the on-disk layouts.
//!
//! We are not using serde because the layouts are positional and shared with
//! other tooling: plain numbers, length-prefixed byte vectors, and
//! width-tagged packed number-vectors.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Write};

pub(crate) fn write_number<W: Write>(out: &mut W, x: u64) -> std::io::Result<usize> {
    out.write_all(&x.to_le_bytes())?;
    Ok(8)
}

pub(crate) fn read_number<R: Read>(input: &mut R) -> std::io::Result<u64> {
    input.read_u64::<LittleEndian>()
}

/// Writes a length-prefixed vector of full 64-bit numbers.
pub(crate) fn write_number_vector<W: Write>(out: &mut W, values: &[u64]) -> std::io::Result<usize> {
    let mut n = write_number(out, values.len() as u64)?;
    for &v in values {
        n += write_number(out, v)?;
    }
    Ok(n)
}

pub(crate) fn read_number_vector<R: Read>(input: &mut R) -> std::io::Result<Vec<u64>> {
    let len = read_number(input)? as usize;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_number(input)?);
    }
    Ok(values)
}

/// Writes a width-tagged packed number-vector: length, width, then the
/// values packed back to back into 64-bit words, least significant bits
/// first. `width == 0` is allowed only for an empty vector.
pub(crate) fn write_packed_vector<W: Write>(
    out: &mut W,
    values: impl ExactSizeIterator<Item = u64>,
    width: usize,
) -> std::io::Result<usize> {
    debug_assert!(width <= 64);
    debug_assert!(width > 0 || values.len() == 0);
    let mut n = write_number(out, values.len() as u64)?;
    n += write_number(out, width as u64)?;

    let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
    let mut word = 0u64;
    let mut filled = 0usize;
    for v in values {
        debug_assert_eq!(v & mask, v);
        word |= (v & mask) << filled;
        filled += width;
        if filled >= 64 {
            n += write_number(out, word)?;
            filled -= 64;
            // The part of v that did not fit in the previous word.
            word = if filled > 0 { (v & mask) >> (width - filled) } else { 0 };
        }
    }
    if filled > 0 {
        n += write_number(out, word)?;
    }
    Ok(n)
}

/// Reads a vector written by [`write_packed_vector`]. Returns the values and
/// the width tag.
pub(crate) fn read_packed_vector<R: Read>(input: &mut R) -> std::io::Result<(Vec<u64>, usize)> {
    let len = read_number(input)? as usize;
    let width = read_number(input)? as usize;
    if width > 64 || (width == 0 && len > 0) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid packed vector width {}", width),
        ));
    }
    let n_words = (len * width).div_ceil(64);
    let mut words = Vec::with_capacity(n_words);
    for _ in 0..n_words {
        words.push(read_number(input)?);
    }

    let mask = if width == 64 { u64::MAX } else { (1u64 << width.max(1)) - 1 };
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        let bit = i * width;
        let mut v = words[bit / 64] >> (bit % 64);
        if bit % 64 + width > 64 {
            v |= words[bit / 64 + 1] << (64 - bit % 64);
        }
        values.push(v & mask);
    }
    Ok((values, width))
}

/// Writes a bit vector one element per byte, length-prefixed.
pub(crate) fn write_byte_bits<W: Write>(
    out: &mut W,
    bits: impl ExactSizeIterator<Item = bool>,
) -> std::io::Result<usize> {
    let mut n = write_number(out, bits.len() as u64)?;
    for b in bits {
        out.write_all(&[b as u8])?;
        n += 1;
    }
    Ok(n)
}

pub(crate) fn read_byte_bits<R: Read>(input: &mut R) -> std::io::Result<Vec<bool>> {
    let len = read_number(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    Ok(buf.into_iter().map(|b| b != 0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_vector_roundtrip() {
        for width in [1usize, 3, 4, 7, 17, 33, 63, 64] {
            let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
            let values: Vec<u64> =
                (0..100u64).map(|i| (i.wrapping_mul(0x9e3779b97f4a7c15)) & mask).collect();
            let mut buf = Vec::new();
            write_packed_vector(&mut buf, values.iter().copied(), width).unwrap();
            let (decoded, w) = read_packed_vector(&mut buf.as_slice()).unwrap();
            assert_eq!(w, width);
            assert_eq!(decoded, values);
        }
    }

    #[test]
    fn empty_packed_vector() {
        let mut buf = Vec::new();
        write_packed_vector(&mut buf, std::iter::empty(), 0).unwrap();
        let (decoded, w) = read_packed_vector(&mut buf.as_slice()).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(w, 0);
    }

    #[test]
    fn byte_bits_roundtrip() {
        let bits = vec![true, false, false, true, true];
        let mut buf = Vec::new();
        write_byte_bits(&mut buf, bits.iter().copied()).unwrap();
        assert_eq!(read_byte_bits(&mut buf.as_slice()).unwrap(), bits);
    }

    #[test]
    fn number_vector_roundtrip() {
        let values = vec![0u64, 1, u64::MAX, 42];
        let mut buf = Vec::new();
        write_number_vector(&mut buf, &values).unwrap();
        assert_eq!(read_number_vector(&mut buf.as_slice()).unwrap(), values);
    }
}
