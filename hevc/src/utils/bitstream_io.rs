//! Bit-level reading over RBSP data.
//!
//! Wraps [`bitstream_io::BitReader`] with the fixed-width, Exp-Golomb and
//! `more_rbsp_data()` primitives used by every HEVC syntax structure. Reads
//! past the end of the payload fail with [`io::ErrorKind::UnexpectedEof`].

use std::io;

use anyhow::{Result, ensure};
use bitstream_io::{BigEndian, BitRead, BitReader, SignedInteger, UnsignedInteger};

use crate::utils::errors::SyntaxError;

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
    /// Bit position of the rbsp_stop_one_bit, or 0 when the payload has none.
    stop_bit: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

fn out_of_bounds(what: &str, n: u32, position: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{what}({n}): out of bounds bits at {position}"),
    )
}

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64, stop_bit: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
            stop_bit,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(out_of_bounds(
                "get_n",
                n,
                self.bs.position_in_bits().unwrap_or(0),
            )),
            Err(e) => Err(e),
        }
    }

    /// Like [`get_n`](Self::get_n) but accepts a zero width, which yields 0.
    #[inline(always)]
    pub fn get_bits(&mut self, n: u32) -> io::Result<u32> {
        if n == 0 { Ok(0) } else { self.get_n(n) }
    }

    #[inline(always)]
    pub fn get_s<S: SignedInteger>(&mut self, n: u32) -> io::Result<S> {
        match self.bs.read_signed_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(out_of_bounds(
                "get_s",
                n,
                self.bs.position_in_bits().unwrap_or(0),
            )),
            Err(e) => Err(e),
        }
    }

    /// ue(v): unsigned Exp-Golomb code.
    pub fn get_ue(&mut self) -> io::Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.get()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "get_ue: more than 31 leading zero bits at {}",
                        self.position()?
                    ),
                ));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.get_n::<u32>(leading_zeros)? as u64;
        Ok(((1u64 << leading_zeros) - 1 + suffix) as u32)
    }

    /// se(v): signed Exp-Golomb code.
    pub fn get_se(&mut self) -> io::Result<i32> {
        let code = self.get_ue()? as i64;
        let value = if code & 1 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };

        Ok(value as i32)
    }

    /// ue(v) constrained to `0..=max`.
    pub fn get_ue_max(&mut self, field: &'static str, max: u32) -> Result<u32> {
        let value = self.get_ue()?;
        ensure!(
            value <= max,
            SyntaxError::OutOfRange {
                field,
                value: value as i64,
                min: 0,
                max: max as i64,
            }
        );

        Ok(value)
    }

    /// se(v) constrained to `min..=max`.
    pub fn get_se_range(&mut self, field: &'static str, min: i32, max: i32) -> Result<i32> {
        let value = self.get_se()?;
        ensure!(
            (min..=max).contains(&value),
            SyntaxError::OutOfRange {
                field,
                value: value as i64,
                min: min as i64,
                max: max as i64,
            }
        );

        Ok(value)
    }

    #[inline(always)]
    pub fn byte_align(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn byte_aligned(&self) -> bool {
        self.bs.byte_aligned()
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n <= 64 {
            return self.bs.skip(n);
        }

        self.available().and_then(|avail| {
            if n as u64 > avail {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "skip_n: out of bounds bits",
                ))
            } else {
                self.bs.skip(n)
            }
        })
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    /// True while syntax data remains before the rbsp_stop_one_bit.
    pub fn more_rbsp_data(&mut self) -> io::Result<bool> {
        Ok(self.position()? < self.stop_bit)
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let stop_bit = buf
            .iter()
            .rposition(|&byte| byte != 0)
            .map(|i| ((i as u64) << 3) + 7 - buf[i].trailing_zeros() as u64)
            .unwrap_or(0);

        Self::new(io::Cursor::new(buf), len, stop_bit)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

/// Smallest `n` with `1 << n >= value`.
#[inline(always)]
pub const fn ceil_log2(value: u32) -> u32 {
    if value <= 1 {
        0
    } else {
        32 - (value - 1).leading_zeros()
    }
}
