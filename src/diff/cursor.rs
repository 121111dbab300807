// Exact-count reads over the diff input stream.
//
// Every field of the format is fixed width or length-prefixed, so the only
// read primitive the stages need is "give me exactly N bytes or fail".
// The cursor counts every byte it pulls off the stream, including the
// prefix of a short read, so error offsets always line up with the input.

use std::io::{self, Read};

/// Reads are staged through this many bytes at a time when the caller asks
/// for a length taken from the stream itself.
const READ_CHUNK: usize = 64 * 1024;

/// Failure of a single exact read.
#[derive(Debug)]
pub enum ReadFailure {
    /// The stream ended after `got` of the `needed` bytes.
    Eof { offset: u64, needed: u64, got: u64 },
    /// The underlying reader failed.
    Io { offset: u64, source: io::Error },
}

/// Buffered exact-count reader that tracks how many bytes were consumed.
#[derive(Debug)]
pub struct ByteCursor<R: Read> {
    reader: R,
    position: u64,
}

impl<R: Read> ByteCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
        }
    }

    /// Total bytes consumed from the stream so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Fill `buf` completely. On a short read `position` still advances by
    /// the bytes that did arrive.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<(), ReadFailure> {
        let start = self.position;
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(ReadFailure::Eof {
                        offset: start,
                        needed: buf.len() as u64,
                        got: filled as u64,
                    });
                }
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(ReadFailure::Io {
                        offset: self.position,
                        source: e,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ReadFailure> {
        let mut buf = [0u8; N];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ReadFailure> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u32_le(&mut self) -> Result<u32, ReadFailure> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u64_le(&mut self) -> Result<u64, ReadFailure> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read exactly `len` bytes into a fresh buffer.
    ///
    /// `len` usually comes from the stream, so the buffer grows as data
    /// actually arrives rather than being sized up front: a bogus length on
    /// a short stream fails with `Eof` instead of a huge allocation.
    pub fn read_exact_vec(&mut self, len: u64) -> Result<Vec<u8>, ReadFailure> {
        let start = self.position;
        let mut out = Vec::with_capacity(len.min(READ_CHUNK as u64) as usize);
        let mut remaining = len;
        while remaining > 0 {
            let step = remaining.min(READ_CHUNK as u64) as usize;
            let filled = out.len();
            out.resize(filled + step, 0);
            match self.read_into(&mut out[filled..]) {
                Ok(()) => remaining -= step as u64,
                Err(ReadFailure::Eof { got, .. }) => {
                    return Err(ReadFailure::Eof {
                        offset: start,
                        needed: len,
                        got: filled as u64 + got,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
