// Change records.
//
//   'w' offset:u64 length:u64 data[length]   overwrite an extent
//   'z' offset:u64 length:u64                zero an extent
//   'e'                                      end of stream

use std::io::Read;

use super::cursor::ByteCursor;
use super::decoder::{DecodeError, Stage};

pub const TAG_WRITE: u8 = b'w';
pub const TAG_ZERO: u8 = b'z';
pub const TAG_END: u8 = b'e';

/// Tag byte of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Write,
    Zero,
    End,
}

impl RecordTag {
    pub fn from_byte(tag: u8) -> Option<Self> {
        match tag {
            TAG_WRITE => Some(Self::Write),
            TAG_ZERO => Some(Self::Zero),
            TAG_END => Some(Self::End),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Write => TAG_WRITE,
            Self::Zero => TAG_ZERO,
            Self::End => TAG_END,
        }
    }
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    /// Overwrite `[offset, offset + data.len())` with `data`.
    Write { offset: u64, data: Vec<u8> },
    /// Zero `[offset, offset + length)`.
    ZeroFill { offset: u64, length: u64 },
    End,
}

impl ChangeRecord {
    pub fn tag(&self) -> RecordTag {
        match self {
            Self::Write { .. } => RecordTag::Write,
            Self::ZeroFill { .. } => RecordTag::Zero,
            Self::End => RecordTag::End,
        }
    }

    /// `(offset, length)` of the extent this record touches.
    pub fn extent(&self) -> Option<(u64, u64)> {
        match self {
            Self::Write { offset, data } => Some((*offset, data.len() as u64)),
            Self::ZeroFill { offset, length } => Some((*offset, *length)),
            Self::End => None,
        }
    }
}

/// What to do with a record whose extent runs past the declared image size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtentPolicy {
    /// Fail with `ExtentOutOfBounds` before the payload is read.
    #[default]
    Reject,
    /// Apply it anyway.
    Allow,
}

fn check_extent(
    offset: u64,
    length: u64,
    image_size: u64,
    policy: ExtentPolicy,
) -> Result<(), DecodeError> {
    // An empty extent touches nothing, wherever it points.
    if length == 0 {
        return Ok(());
    }
    let out_of_bounds = DecodeError::ExtentOutOfBounds {
        offset,
        length,
        image_size,
    };
    let Some(end) = offset.checked_add(length) else {
        return Err(out_of_bounds);
    };
    if policy == ExtentPolicy::Reject && end > image_size {
        return Err(out_of_bounds);
    }
    Ok(())
}

/// Decode the next record.
///
/// End of stream while waiting for a tag is a truncation: only an explicit
/// `'e'` ends the stream.
pub fn read_record<R: Read>(
    cursor: &mut ByteCursor<R>,
    image_size: u64,
    policy: ExtentPolicy,
) -> Result<ChangeRecord, DecodeError> {
    let read_err = |e| DecodeError::from_read(Stage::Records, e);

    let tag_offset = cursor.position();
    let tag = cursor.read_u8().map_err(read_err)?;
    let Some(kind) = RecordTag::from_byte(tag) else {
        return Err(DecodeError::UnknownTag {
            stage: Stage::Records,
            tag,
            offset: tag_offset,
        });
    };

    Ok(match kind {
        RecordTag::End => ChangeRecord::End,
        RecordTag::Write => {
            let (offset, length) = read_extent(cursor, image_size, policy)?;
            let data = cursor.read_exact_vec(length).map_err(read_err)?;
            ChangeRecord::Write { offset, data }
        }
        RecordTag::Zero => {
            let (offset, length) = read_extent(cursor, image_size, policy)?;
            ChangeRecord::ZeroFill { offset, length }
        }
    })
}

fn read_extent<R: Read>(
    cursor: &mut ByteCursor<R>,
    image_size: u64,
    policy: ExtentPolicy,
) -> Result<(u64, u64), DecodeError> {
    let read_err = |e| DecodeError::from_read(Stage::Records, e);
    let offset = cursor.read_u64_le().map_err(read_err)?;
    let length = cursor.read_u64_le().map_err(read_err)?;
    check_extent(offset, length, image_size, policy)?;
    Ok((offset, length))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
