//! # Packed Image - The Same Table, as One Blob
//!
//! Binary form of the embedding table for kernels that pull programs in
//! with `include_bytes!` instead of assembling `.incbin` blocks.
//!
//! ## Layout (little-endian)
//!
//! ```text
//! u64 count                 N
//! u64 offsets[N + 1]        from the start of the blob
//! u8  payloads[..]          program i is [offsets[i], offsets[i + 1])
//! ```
//!
//! An empty image is a single zero `u64` with no offsets.

use core::fmt;

const WORD: usize = core::mem::size_of::<u64>();

/// Errors found while reading a packed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedError {
    /// Blob ends before the header or offset table does
    Truncated,
    /// Count does not fit in memory on this host
    CountTooLarge,
    /// An offset points into the header, backwards, or past the end
    BadOffset { index: usize },
}

impl fmt::Display for PackedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackedError::Truncated => write!(f, "packed image is truncated"),
            PackedError::CountTooLarge => write!(f, "packed image program count is too large"),
            PackedError::BadOffset { index } => write!(f, "packed image offset {} is invalid", index),
        }
    }
}

impl std::error::Error for PackedError {}

/// Build a packed image from program payloads, in table order
pub fn pack<B: AsRef<[u8]>>(programs: &[B]) -> Vec<u8> {
    let count = programs.len();
    let markers = if count == 0 { 0 } else { count + 1 };
    let header = WORD * (1 + markers);
    let payload: usize = programs.iter().map(|p| p.as_ref().len()).sum();

    let mut out = Vec::with_capacity(header + payload);
    out.extend_from_slice(&(count as u64).to_le_bytes());

    let mut offset = header;
    for program in programs {
        out.extend_from_slice(&(offset as u64).to_le_bytes());
        offset += program.as_ref().len();
    }
    if count > 0 {
        out.extend_from_slice(&(offset as u64).to_le_bytes());
    }

    for program in programs {
        out.extend_from_slice(program.as_ref());
    }
    out
}

/// Read-only view of a packed image
#[derive(Debug, Clone, Copy)]
pub struct PackedImage<'a> {
    data: &'a [u8],
    count: usize,
}

fn read_word(data: &[u8], index: usize) -> Option<u64> {
    let start = index.checked_mul(WORD)?;
    let bytes = data.get(start..start.checked_add(WORD)?)?;
    let mut word = [0u8; WORD];
    word.copy_from_slice(bytes);
    Some(u64::from_le_bytes(word))
}

impl<'a> PackedImage<'a> {
    /// Validate the header and offset table
    pub fn parse(data: &'a [u8]) -> Result<Self, PackedError> {
        let count = read_word(data, 0).ok_or(PackedError::Truncated)?;
        let count = usize::try_from(count).map_err(|_| PackedError::CountTooLarge)?;
        if count == 0 {
            return Ok(Self { data, count });
        }

        let markers = count.checked_add(1).ok_or(PackedError::CountTooLarge)?;
        let header = markers
            .checked_add(1)
            .and_then(|words| words.checked_mul(WORD))
            .ok_or(PackedError::CountTooLarge)?;
        if header > data.len() {
            return Err(PackedError::Truncated);
        }

        let mut previous = header as u64;
        for index in 0..markers {
            let offset = read_word(data, 1 + index).ok_or(PackedError::Truncated)?;
            if offset < previous || offset > data.len() as u64 {
                return Err(PackedError::BadOffset { index });
            }
            previous = offset;
        }

        Ok(Self { data, count })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Bytes of program `index`
    pub fn program(&self, index: usize) -> Option<&'a [u8]> {
        if index >= self.count {
            return None;
        }
        // Offsets were checked in parse().
        let start = read_word(self.data, 1 + index)? as usize;
        let end = read_word(self.data, 2 + index)? as usize;
        self.data.get(start..end)
    }

    /// Every program, in table order
    pub fn programs(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.count).filter_map(move |i| self.program(i))
    }
}
