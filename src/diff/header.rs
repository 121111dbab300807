// Stream preamble for the rbd diff v1 format.

use std::io::Read;

use super::cursor::{ByteCursor, ReadFailure};
use super::decoder::DecodeError;

/// Literal preamble of a version 1 diff stream.
pub const RBD_DIFF_V1_MAGIC: [u8; 12] = *b"rbd diff v1\n";

/// Read and validate the preamble.
///
/// A short read is reported the same way as a mismatch: in both cases the
/// input is not a v1 diff stream.
pub fn read_header<R: Read>(cursor: &mut ByteCursor<R>) -> Result<(), DecodeError> {
    let mut found = [0u8; RBD_DIFF_V1_MAGIC.len()];
    match cursor.read_into(&mut found) {
        Ok(()) => {}
        Err(ReadFailure::Eof { got, .. }) => {
            return Err(DecodeError::InvalidHeader {
                found: found[..got as usize].to_vec(),
            });
        }
        Err(ReadFailure::Io { offset, source }) => {
            return Err(DecodeError::Read { offset, source });
        }
    }
    if found != RBD_DIFF_V1_MAGIC {
        return Err(DecodeError::InvalidHeader {
            found: found.to_vec(),
        });
    }
    Ok(())
}
