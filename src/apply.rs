// Applying a decoded diff stream to a device.
//
// DiffApplier drives StreamDecoder one transition at a time and turns each
// write/zero record into a positioned device write, in stream order, with
// no batching or reordering. Progress goes to the injected observer.

use std::io::Read;

use crate::device::DeviceWriter;
use crate::diff::decoder::{DecodeError, Step, StreamDecoder};
use crate::diff::metadata::SnapshotMetadata;
use crate::diff::record::{ChangeRecord, ExtentPolicy};
use crate::observer::{ApplyObserver, NoopObserver, RecordEvent};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Summary of an apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Image size declared by the metadata section.
    pub image_size: u64,
    pub from_snap: Option<String>,
    pub to_snap: Option<String>,
    pub write_records: u64,
    pub zero_records: u64,
    /// Payload bytes written by write records.
    pub bytes_written: u64,
    /// Bytes covered by zero-fill records.
    pub bytes_zeroed: u64,
    /// Bytes consumed from the input stream.
    pub stream_bytes: u64,
}

impl ApplyStats {
    /// Number of write and zero-fill records applied.
    pub fn records_applied(&self) -> u64 {
        self.write_records + self.zero_records
    }
}

// ---------------------------------------------------------------------------
// DiffApplier
// ---------------------------------------------------------------------------

/// Streaming applier. Only one record payload is held in memory at a time.
pub struct DiffApplier<R: Read, D: DeviceWriter, O: ApplyObserver = NoopObserver> {
    decoder: StreamDecoder<R>,
    device: D,
    observer: O,
    stats: ApplyStats,
    finished: bool,
}

impl<R: Read, D: DeviceWriter> DiffApplier<R, D, NoopObserver> {
    /// Create an applier with the default extent policy and no observer.
    pub fn new(reader: R, device: D) -> Self {
        Self::with_observer(StreamDecoder::new(reader), device, NoopObserver)
    }
}

impl<R: Read, D: DeviceWriter, O: ApplyObserver> DiffApplier<R, D, O> {
    pub fn with_observer(decoder: StreamDecoder<R>, device: D, observer: O) -> Self {
        Self {
            decoder,
            device,
            observer,
            stats: ApplyStats::default(),
            finished: false,
        }
    }

    /// Apply everything up to and including the end record.
    pub fn apply_all(&mut self) -> Result<&ApplyStats, DecodeError> {
        while self.apply_next()? {}
        Ok(&self.stats)
    }

    /// Advance by one decoder step, applying it if it is a record.
    ///
    /// Returns `Ok(false)` once the end record has been handled.
    pub fn apply_next(&mut self) -> Result<bool, DecodeError> {
        if self.finished {
            return Ok(false);
        }
        let step = self.decoder.step()?;
        self.stats.stream_bytes = self.decoder.position();

        match step {
            Step::Header => self.observer.header_validated(),
            Step::Metadata(meta) => {
                self.stats.image_size = meta.image_size;
                self.stats.from_snap = meta.from_snap_name().map(|s| s.into_owned());
                self.stats.to_snap = meta.to_snap_name().map(|s| s.into_owned());
                self.observer.metadata_complete(&meta);
            }
            Step::Record(ChangeRecord::End) | Step::Done => {
                self.device.flush().inspect_err(|_| self.decoder.fail())?;
                self.finished = true;
                self.observer.finished(&self.stats);
                return Ok(false);
            }
            Step::Record(record) => self.apply_record(record)?,
        }
        Ok(true)
    }

    fn apply_record(&mut self, record: ChangeRecord) -> Result<(), DecodeError> {
        let result = match &record {
            ChangeRecord::Write { offset, data } => self.device.write_at(*offset, data),
            ChangeRecord::ZeroFill { offset, length } => self.device.write_zeroes(*offset, *length),
            ChangeRecord::End => Ok(()),
        };
        if let Err(e) = result {
            self.decoder.fail();
            return Err(e.into());
        }

        let Some((offset, length)) = record.extent() else {
            return Ok(());
        };
        match record {
            ChangeRecord::Write { .. } => {
                self.stats.write_records += 1;
                self.stats.bytes_written += length;
            }
            ChangeRecord::ZeroFill { .. } => {
                self.stats.zero_records += 1;
                self.stats.bytes_zeroed += length;
            }
            ChangeRecord::End => {}
        }
        self.observer.record_applied(&RecordEvent {
            kind: record.tag(),
            offset,
            length,
            stream_offset: self.decoder.position(),
        });
        Ok(())
    }

    pub fn stats(&self) -> &ApplyStats {
        &self.stats
    }

    pub fn metadata(&self) -> Option<&SnapshotMetadata> {
        self.decoder.metadata()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Release the device handle.
    pub fn into_device(self) -> D {
        self.device
    }
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Decode `reader` and apply every record to `device`.
pub fn apply_stream<R: Read, D: DeviceWriter, O: ApplyObserver>(
    reader: R,
    device: D,
    observer: O,
    extent_policy: ExtentPolicy,
) -> Result<ApplyStats, DecodeError> {
    let decoder = StreamDecoder::with_extent_policy(reader, extent_policy);
    let mut applier = DiffApplier::with_observer(decoder, device, observer);
    applier.apply_all()?;
    Ok(applier.stats.clone())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceError, NullDevice, SeekDevice};
    use crate::diff::decoder::Stage;
    use crate::diff::header::RBD_DIFF_V1_MAGIC;
    use crate::diff::record::RecordTag;
    use std::io::Cursor;

    fn stream(size: u64, records: &[u8]) -> Vec<u8> {
        let mut s = RBD_DIFF_V1_MAGIC.to_vec();
        s.push(b's');
        s.extend_from_slice(&size.to_le_bytes());
        s.extend_from_slice(records);
        s
    }

    fn rec(tag: u8, offset: u64, length: u64, data: &[u8]) -> Vec<u8> {
        let mut v = vec![tag];
        v.extend_from_slice(&offset.to_le_bytes());
        v.extend_from_slice(&length.to_le_bytes());
        v.extend_from_slice(data);
        v
    }

    /// Records every checkpoint.
    #[derive(Debug, Default)]
    struct RecordingObserver {
        header_seen: bool,
        metadata: Option<SnapshotMetadata>,
        events: Vec<RecordEvent>,
        finished: bool,
    }

    impl ApplyObserver for RecordingObserver {
        fn header_validated(&mut self) {
            self.header_seen = true;
        }

        fn metadata_complete(&mut self, metadata: &SnapshotMetadata) {
            self.metadata = Some(metadata.clone());
        }

        fn record_applied(&mut self, event: &RecordEvent) {
            self.events.push(*event);
        }

        fn finished(&mut self, _stats: &ApplyStats) {
            self.finished = true;
        }
    }

    fn device(len: usize) -> SeekDevice<Cursor<Vec<u8>>> {
        SeekDevice::new(Cursor::new(vec![0xEEu8; len]))
    }

    /// Records device writes without touching any storage.
    #[derive(Default)]
    struct WriteLog {
        writes: Vec<(u64, Vec<u8>)>,
        fail_at: Option<u64>,
    }

    impl DeviceWriter for WriteLog {
        fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
            if self.fail_at == Some(offset) {
                return Err(DeviceError::ShortWrite {
                    offset,
                    expected: data.len() as u64,
                    written: 0,
                });
            }
            self.writes.push((offset, data.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn write_then_zero() {
        let mut body = rec(b'w', 0, 4, b"DEAD");
        body.extend(rec(b'z', 4, 4, b""));
        body.push(b'e');
        let s = stream(1024, &body);

        let mut applier = DiffApplier::new(&s[..], device(8));
        let stats = applier.apply_all().unwrap().clone();
        assert_eq!(stats.write_records, 1);
        assert_eq!(stats.zero_records, 1);
        assert_eq!(stats.records_applied(), 2);
        assert_eq!(stats.bytes_written, 4);
        assert_eq!(stats.bytes_zeroed, 4);
        assert_eq!(stats.image_size, 1024);
        assert_eq!(stats.stream_bytes, s.len() as u64);
        assert!(applier.is_finished());
        assert_eq!(
            applier.into_device().into_inner().into_inner(),
            [0x44, 0x45, 0x41, 0x44, 0, 0, 0, 0]
        );
    }

    #[test]
    fn later_records_overwrite_earlier_ones() {
        let mut body = rec(b'w', 0, 6, b"AAAAAA");
        body.extend(rec(b'z', 2, 2, b""));
        body.extend(rec(b'w', 3, 2, b"BB"));
        body.push(b'e');
        let s = stream(8, &body);

        let mut applier = DiffApplier::new(&s[..], device(8));
        applier.apply_all().unwrap();
        assert_eq!(
            applier.into_device().into_inner().into_inner(),
            b"AA\0BBA\xEE\xEE"
        );
    }

    #[test]
    fn truncated_payload_writes_nothing_for_that_record() {
        let mut body = rec(b'w', 0, 2, b"ok");
        body.extend(rec(b'w', 4, 4, b""));
        let s = stream(16, &body);

        let mut log = WriteLog::default();
        let mut applier = DiffApplier::new(&s[..], &mut log);
        assert!(matches!(
            applier.apply_all(),
            Err(DecodeError::Truncated {
                stage: Stage::Records,
                needed: 4,
                got: 0,
                ..
            })
        ));
        assert_eq!(log.writes, vec![(0, b"ok".to_vec())]);
    }

    #[test]
    fn device_failure_stops_the_run() {
        let mut body = rec(b'w', 0, 1, b"a");
        body.extend(rec(b'w', 1, 1, b"b"));
        body.extend(rec(b'w', 2, 1, b"c"));
        body.push(b'e');
        let s = stream(16, &body);

        let mut log = WriteLog {
            fail_at: Some(1),
            ..Default::default()
        };
        let mut applier = DiffApplier::new(&s[..], &mut log);
        let err = applier.apply_all().unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Device(DeviceError::ShortWrite { offset: 1, .. })
        ));
        assert!(!err.is_stream_error());
        assert!(matches!(applier.apply_next(), Err(DecodeError::Failed)));
        assert_eq!(log.writes.len(), 1);
    }

    #[test]
    fn observer_sees_every_checkpoint() {
        let mut body = rec(b'z', 0, 3, b"");
        body.extend(rec(b'w', 8, 1, b"x"));
        body.push(b'e');
        let s = stream(64, &body);

        let mut obs = RecordingObserver::default();
        apply_stream(&s[..], NullDevice, &mut obs, ExtentPolicy::Reject).unwrap();
        assert!(obs.header_seen);
        assert_eq!(obs.metadata.as_ref().map(|m| m.image_size), Some(64));
        assert!(obs.finished);
        assert_eq!(
            obs.events,
            vec![
                RecordEvent {
                    kind: RecordTag::Zero,
                    offset: 0,
                    length: 3,
                    stream_offset: 21 + 17,
                },
                RecordEvent {
                    kind: RecordTag::Write,
                    offset: 8,
                    length: 1,
                    stream_offset: 21 + 17 + 18,
                },
            ]
        );
    }

    #[test]
    fn out_of_bounds_policy() {
        let mut body = rec(b'w', 6, 4, b"WXYZ");
        body.push(b'e');
        let s = stream(8, &body);

        assert!(matches!(
            apply_stream(&s[..], device(8), NoopObserver, ExtentPolicy::Reject),
            Err(DecodeError::ExtentOutOfBounds { .. })
        ));

        let stats = apply_stream(&s[..], device(8), NoopObserver, ExtentPolicy::Allow).unwrap();
        assert_eq!(stats.bytes_written, 4);
    }

    #[test]
    fn apply_next_after_end_is_idle() {
        let s = stream(0, b"e");
        let mut applier = DiffApplier::new(&s[..], NullDevice);
        applier.apply_all().unwrap();
        assert!(!applier.apply_next().unwrap());
        assert_eq!(applier.stats().records_applied(), 0);
    }
}
