// Progress checkpoints reported by the applier.
//
// The decoder and applier never log directly; they call an observer at
// fixed points and the binary plugs in `LogObserver`.

use crate::apply::ApplyStats;
use crate::diff::metadata::SnapshotMetadata;
use crate::diff::record::RecordTag;

/// A record that has been written to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordEvent {
    pub kind: RecordTag,
    /// Device offset of the extent.
    pub offset: u64,
    /// Extent length in bytes.
    pub length: u64,
    /// Stream offset just past the record.
    pub stream_offset: u64,
}

/// Callbacks invoked at each checkpoint. All methods default to no-ops.
pub trait ApplyObserver {
    fn header_validated(&mut self) {}

    fn metadata_complete(&mut self, _metadata: &SnapshotMetadata) {}

    fn record_applied(&mut self, _event: &RecordEvent) {}

    fn finished(&mut self, _stats: &ApplyStats) {}
}

impl<O: ApplyObserver + ?Sized> ApplyObserver for &mut O {
    fn header_validated(&mut self) {
        (**self).header_validated()
    }

    fn metadata_complete(&mut self, metadata: &SnapshotMetadata) {
        (**self).metadata_complete(metadata)
    }

    fn record_applied(&mut self, event: &RecordEvent) {
        (**self).record_applied(event)
    }

    fn finished(&mut self, stats: &ApplyStats) {
        (**self).finished(stats)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ApplyObserver for NoopObserver {}

/// Emits progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ApplyObserver for LogObserver {
    fn header_validated(&mut self) {
        log::debug!("header found in input");
    }

    fn metadata_complete(&mut self, m: &SnapshotMetadata) {
        log::info!(
            "metadata: from_snap={:?} to_snap={:?} image_size={}",
            m.from_snap_name(),
            m.to_snap_name(),
            m.image_size
        );
    }

    fn record_applied(&mut self, e: &RecordEvent) {
        log::trace!(
            "record '{}' ended at stream offset {}",
            char::from(e.kind.as_byte()),
            e.stream_offset
        );
        match e.kind {
            RecordTag::Write => log::debug!(
                "wrote {} bytes at device offset {:#x} (stream offset {})",
                e.length,
                e.offset,
                e.stream_offset
            ),
            RecordTag::Zero => log::debug!(
                "zeroed {} bytes at device offset {:#x} (stream offset {})",
                e.length,
                e.offset,
                e.stream_offset
            ),
            RecordTag::End => {}
        }
    }

    fn finished(&mut self, s: &ApplyStats) {
        log::info!(
            "end record reached: {} write records ({} bytes), {} zero records ({} bytes), {} stream bytes",
            s.write_records,
            s.bytes_written,
            s.zero_records,
            s.bytes_zeroed,
            s.stream_bytes
        );
    }
}
