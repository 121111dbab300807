// Metadata section: optional snapshot names followed by the image size.
//
//   'f' len:u32 name[len]   source snapshot
//   't' len:u32 name[len]   destination snapshot
//   's' size:u64            image size, always last

use std::borrow::Cow;
use std::io::Read;

use super::cursor::ByteCursor;
use super::decoder::{DecodeError, Stage};

pub const TAG_FROM_SNAP: u8 = b'f';
pub const TAG_TO_SNAP: u8 = b't';
pub const TAG_SIZE: u8 = b's';

/// Tag byte of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTag {
    FromSnap,
    ToSnap,
    Size,
}

impl MetadataTag {
    pub fn from_byte(tag: u8) -> Option<Self> {
        match tag {
            TAG_FROM_SNAP => Some(Self::FromSnap),
            TAG_TO_SNAP => Some(Self::ToSnap),
            TAG_SIZE => Some(Self::Size),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::FromSnap => TAG_FROM_SNAP,
            Self::ToSnap => TAG_TO_SNAP,
            Self::Size => TAG_SIZE,
        }
    }
}

/// Decoded metadata section.
///
/// Snapshot names are kept as the raw bytes from the stream. `None` means
/// the field was absent; `Some(vec![])` means it was present with length 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub from_snap: Option<Vec<u8>>,
    pub to_snap: Option<Vec<u8>>,
    /// Size of the image at the destination snapshot, in bytes.
    pub image_size: u64,
}

impl SnapshotMetadata {
    pub fn from_snap_name(&self) -> Option<Cow<'_, str>> {
        self.from_snap.as_deref().map(String::from_utf8_lossy)
    }

    pub fn to_snap_name(&self) -> Option<Cow<'_, str>> {
        self.to_snap.as_deref().map(String::from_utf8_lossy)
    }
}

/// Decode the metadata section. Returns once the size field has been read.
pub fn read_metadata<R: Read>(cursor: &mut ByteCursor<R>) -> Result<SnapshotMetadata, DecodeError> {
    let read_err = |e| DecodeError::from_read(Stage::Metadata, e);
    let mut meta = SnapshotMetadata::default();

    loop {
        let tag_offset = cursor.position();
        let tag = cursor.read_u8().map_err(read_err)?;
        let Some(field) = MetadataTag::from_byte(tag) else {
            return Err(DecodeError::UnknownTag {
                stage: Stage::Metadata,
                tag,
                offset: tag_offset,
            });
        };

        match field {
            MetadataTag::FromSnap | MetadataTag::ToSnap => {
                let slot = if field == MetadataTag::FromSnap {
                    &mut meta.from_snap
                } else {
                    &mut meta.to_snap
                };
                if slot.is_some() {
                    return Err(DecodeError::DuplicateField {
                        tag,
                        offset: tag_offset,
                    });
                }
                let len = cursor.read_u32_le().map_err(read_err)?;
                *slot = Some(cursor.read_exact_vec(u64::from(len)).map_err(read_err)?);
            }
            MetadataTag::Size => {
                meta.image_size = cursor.read_u64_le().map_err(read_err)?;
                return Ok(meta);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
