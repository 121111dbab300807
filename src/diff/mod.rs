// rbd diff v1 stream format.
//
//   header    "rbd diff v1\n"
//   metadata  { 'f' | 't' len:u32 name } * , 's' size:u64
//   records   { 'w' off:u64 len:u64 data | 'z' off:u64 len:u64 } * , 'e'
//
// All integers are little-endian.
//
// # Modules
//
// - `cursor`: exact-count reads with byte accounting
// - `header`: preamble validation
// - `metadata`: snapshot names and image size
// - `record`: change records and extent bounds
// - `decoder`: state machine tying the sections together

pub mod cursor;
pub mod decoder;
pub mod header;
pub mod metadata;
pub mod record;

pub use cursor::ByteCursor;
pub use decoder::{DecodeError, DecodeState, Stage, Step, StreamDecoder, decode_memory};
pub use header::RBD_DIFF_V1_MAGIC;
pub use metadata::{MetadataTag, SnapshotMetadata};
pub use record::{ChangeRecord, ExtentPolicy, RecordTag};
