// Positioned writes to the target device.
//
// The applier only ever asks for "put these bytes at this absolute offset".
// `SeekDevice` implements that as seek-then-write over any `Write + Seek`
// handle (a block device, a regular file, or an in-memory cursor in tests).

use std::io::{self, Seek, SeekFrom, Write};

use thiserror::Error;

/// Zero-fill extents are written from a shared buffer of this size.
pub const ZERO_CHUNK: usize = 64 * 1024;

static ZEROES: [u8; ZERO_CHUNK] = [0u8; ZERO_CHUNK];

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to seek device to offset {offset}: {source}")]
    Seek { offset: u64, source: io::Error },
    #[error("short write at device offset {offset}: wrote {written} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        expected: u64,
        written: u64,
    },
    #[error("device write failed at offset {offset}: {source}")]
    Io { offset: u64, source: io::Error },
    #[error("device flush failed: {source}")]
    Flush { source: io::Error },
}

/// Sink for absolute positioned writes.
pub trait DeviceWriter {
    /// Place `data` at `offset` from the start of the device.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Zero `[offset, offset + length)`.
    ///
    /// Equivalent to `write_at(offset, &[0; length])`; the default issues
    /// bounded chunks so large extents do not need a matching allocation.
    fn write_zeroes(&mut self, offset: u64, length: u64) -> Result<(), DeviceError> {
        let mut done = 0u64;
        while done < length {
            let n = (length - done).min(ZERO_CHUNK as u64) as usize;
            self.write_at(offset + done, &ZEROES[..n])?;
            done += n as u64;
        }
        Ok(())
    }

    /// Push buffered writes down to the device.
    fn flush(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl<D: DeviceWriter + ?Sized> DeviceWriter for &mut D {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        (**self).write_at(offset, data)
    }

    fn write_zeroes(&mut self, offset: u64, length: u64) -> Result<(), DeviceError> {
        (**self).write_zeroes(offset, length)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        (**self).flush()
    }
}

// ---------------------------------------------------------------------------
// Seek + Write backend
// ---------------------------------------------------------------------------

/// Seek-then-write device over any `Write + Seek` handle.
#[derive(Debug)]
pub struct SeekDevice<W: Write + Seek> {
    inner: W,
}

impl<W: Write + Seek> SeekDevice<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> DeviceWriter for SeekDevice<W> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        if data.is_empty() {
            return Ok(());
        }
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|source| DeviceError::Seek { offset, source })?;

        let mut written = 0usize;
        while written < data.len() {
            match self.inner.write(&data[written..]) {
                Ok(0) => {
                    return Err(DeviceError::ShortWrite {
                        offset,
                        expected: data.len() as u64,
                        written: written as u64,
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(DeviceError::Io {
                        offset: offset + written as u64,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.inner
            .flush()
            .map_err(|source| DeviceError::Flush { source })
    }
}

// ---------------------------------------------------------------------------
// Discarding backend
// ---------------------------------------------------------------------------

/// Device that accepts and discards every write. Used for `--check-only`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDevice;

impl DeviceWriter for NullDevice {
    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> Result<(), DeviceError> {
        Ok(())
    }

    fn write_zeroes(&mut self, _offset: u64, _length: u64) -> Result<(), DeviceError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
