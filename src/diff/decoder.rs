// Stream decoder: header, then metadata, then records until 'e'.
//
// The decoder is an explicit state machine. Each call to `step()` performs
// exactly one transition and reports what it decoded; any error moves the
// session to `Failed` for good. Nothing here touches the output device or
// logs: the applier and observers sit on top of `step()`.

use std::fmt;
use std::io::{self, Read};

use thiserror::Error;

use super::cursor::{ByteCursor, ReadFailure};
use super::header::read_header;
use super::metadata::{SnapshotMetadata, read_metadata};
use super::record::{ChangeRecord, ExtentPolicy, read_record};
use crate::device::DeviceError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Section of the stream being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Header,
    Metadata,
    Records,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Metadata => "metadata",
            Self::Records => "records",
        })
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated stream in {stage} at offset {offset}: needed {needed} bytes, got {got}")]
    Truncated {
        stage: Stage,
        offset: u64,
        needed: u64,
        got: u64,
    },
    #[error("invalid header: expected \"rbd diff v1\\n\", got {}", .found.escape_ascii())]
    InvalidHeader { found: Vec<u8> },
    #[error("unknown {stage} tag {tag:#04x} at offset {offset}")]
    UnknownTag { stage: Stage, tag: u8, offset: u64 },
    #[error("duplicate metadata field {tag:#04x} at offset {offset}")]
    DuplicateField { tag: u8, offset: u64 },
    #[error("extent [{offset}, +{length}) exceeds image size {image_size}")]
    ExtentOutOfBounds {
        offset: u64,
        length: u64,
        image_size: u64,
    },
    #[error("read error at stream offset {offset}: {source}")]
    Read { offset: u64, source: io::Error },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("decode session already failed")]
    Failed,
}

impl DecodeError {
    pub(crate) fn from_read(stage: Stage, failure: ReadFailure) -> Self {
        match failure {
            ReadFailure::Eof {
                offset,
                needed,
                got,
            } => Self::Truncated {
                stage,
                offset,
                needed,
                got,
            },
            ReadFailure::Io { offset, source } => Self::Read { offset, source },
        }
    }

    /// True for failures caused by the input stream rather than the device.
    pub fn is_stream_error(&self) -> bool {
        !matches!(self, Self::Device(_) | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    AwaitHeader,
    ParsingMetadata,
    ParsingRecords,
    Done,
    Failed,
}

/// Result of one decoder transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The preamble matched.
    Header,
    /// The metadata section is complete.
    Metadata(SnapshotMetadata),
    /// A change record was decoded. `ChangeRecord::End` is reported once,
    /// after which the decoder is `Done`.
    Record(ChangeRecord),
    /// Nothing left to decode.
    Done,
}

/// Pull decoder over a diff stream.
pub struct StreamDecoder<R: Read> {
    cursor: ByteCursor<R>,
    state: DecodeState,
    metadata: Option<SnapshotMetadata>,
    extent_policy: ExtentPolicy,
}

impl<R: Read> StreamDecoder<R> {
    /// Create a decoder that rejects records outside the declared image.
    pub fn new(reader: R) -> Self {
        Self::with_extent_policy(reader, ExtentPolicy::Reject)
    }

    pub fn with_extent_policy(reader: R, extent_policy: ExtentPolicy) -> Self {
        Self {
            cursor: ByteCursor::new(reader),
            state: DecodeState::AwaitHeader,
            metadata: None,
            extent_policy,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes consumed from the input so far.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Metadata, once the metadata section has been decoded.
    pub fn metadata(&self) -> Option<&SnapshotMetadata> {
        self.metadata.as_ref()
    }

    /// Mark the session failed. Used by callers whose own work on a decoded
    /// step (e.g. the device write) failed.
    pub fn fail(&mut self) {
        self.state = DecodeState::Failed;
    }

    /// Perform one transition.
    pub fn step(&mut self) -> Result<Step, DecodeError> {
        let result = match self.state {
            DecodeState::AwaitHeader => self.step_header(),
            DecodeState::ParsingMetadata => self.step_metadata(),
            DecodeState::ParsingRecords => self.step_record(),
            DecodeState::Done => return Ok(Step::Done),
            DecodeState::Failed => return Err(DecodeError::Failed),
        };
        if result.is_err() {
            self.state = DecodeState::Failed;
        }
        result
    }

    fn step_header(&mut self) -> Result<Step, DecodeError> {
        read_header(&mut self.cursor)?;
        self.state = DecodeState::ParsingMetadata;
        Ok(Step::Header)
    }

    fn step_metadata(&mut self) -> Result<Step, DecodeError> {
        let meta = read_metadata(&mut self.cursor)?;
        self.metadata = Some(meta.clone());
        self.state = DecodeState::ParsingRecords;
        Ok(Step::Metadata(meta))
    }

    fn step_record(&mut self) -> Result<Step, DecodeError> {
        let image_size = self.metadata.as_ref().map_or(0, |m| m.image_size);
        let record = read_record(&mut self.cursor, image_size, self.extent_policy)?;
        if record == ChangeRecord::End {
            self.state = DecodeState::Done;
        }
        Ok(Step::Record(record))
    }

    /// Decode the header and metadata, leaving the decoder at the first record.
    pub fn read_preamble(&mut self) -> Result<&SnapshotMetadata, DecodeError> {
        while matches!(
            self.state,
            DecodeState::AwaitHeader | DecodeState::ParsingMetadata
        ) {
            self.step()?;
        }
        if self.state == DecodeState::Failed {
            return Err(DecodeError::Failed);
        }
        self.metadata.as_ref().ok_or(DecodeError::Failed)
    }

    /// Next change record, or `None` after the end marker.
    pub fn next_record(&mut self) -> Result<Option<ChangeRecord>, DecodeError> {
        self.read_preamble()?;
        match self.step()? {
            Step::Record(ChangeRecord::End) | Step::Done => Ok(None),
            Step::Record(record) => Ok(Some(record)),
            Step::Header | Step::Metadata(_) => Err(DecodeError::Failed),
        }
    }

    pub fn into_inner(self) -> R {
        self.cursor.into_inner()
    }
}

// ---------------------------------------------------------------------------
// In-memory decode
// ---------------------------------------------------------------------------

/// Decode a complete stream held in memory. The returned records do not
/// include the end marker.
pub fn decode_memory(
    stream: &[u8],
    extent_policy: ExtentPolicy,
) -> Result<(SnapshotMetadata, Vec<ChangeRecord>), DecodeError> {
    let mut decoder = StreamDecoder::with_extent_policy(stream, extent_policy);
    let meta = decoder.read_preamble()?.clone();
    let mut records = Vec::new();
    while let Some(record) = decoder.next_record()? {
        records.push(record);
    }
    Ok((meta, records))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
