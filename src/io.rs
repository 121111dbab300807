// File-level helpers: open the device, stream the diff into it.
//
// The device is opened write-only and never created or truncated. It is
// owned by a local for the whole run, so it is closed on every return path,
// including decode failures.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::apply::{ApplyStats, DiffApplier};
use crate::device::{DeviceWriter, NullDevice, SeekDevice};
use crate::diff::decoder::{DecodeError, StreamDecoder};
use crate::diff::record::ExtentPolicy;
use crate::observer::ApplyObserver;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to sync device: {0}")]
    Sync(io::Error),
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Where the diff comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiffInput {
    #[default]
    Stdin,
    File(PathBuf),
}

/// Where decoded records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffTarget {
    Device(PathBuf),
    /// Decode and validate only.
    Discard,
}

#[derive(Debug, Clone)]
pub struct ApplyFileOptions {
    pub input: DiffInput,
    pub target: DiffTarget,
    pub extent_policy: ExtentPolicy,
    /// fsync the device after the end record.
    pub sync: bool,
}

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

fn open_input(input: &DiffInput) -> Result<Box<dyn Read>, IoError> {
    Ok(match input {
        DiffInput::Stdin => Box::new(BufReader::with_capacity(BUF_SIZE, io::stdin().lock())),
        DiffInput::File(path) => {
            let f = File::open(path).map_err(|source| IoError::Open {
                path: path.clone(),
                source,
            })?;
            Box::new(BufReader::with_capacity(BUF_SIZE, f))
        }
    })
}

/// Open an existing device or image file for positioned writes.
pub fn open_device(path: &Path) -> Result<File, IoError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn run<D: DeviceWriter, O: ApplyObserver>(
    reader: Box<dyn Read>,
    device: D,
    observer: O,
    extent_policy: ExtentPolicy,
) -> Result<(ApplyStats, D), DecodeError> {
    let decoder = StreamDecoder::with_extent_policy(reader, extent_policy);
    let mut applier = DiffApplier::with_observer(decoder, device, observer);
    let stats = applier.apply_all()?.clone();
    Ok((stats, applier.into_device()))
}

/// Apply a diff stream to a device according to `opts`.
pub fn apply_file<O: ApplyObserver>(
    opts: &ApplyFileOptions,
    observer: O,
) -> Result<ApplyStats, IoError> {
    let reader = open_input(&opts.input)?;

    match &opts.target {
        DiffTarget::Discard => {
            let (stats, _) = run(reader, NullDevice, observer, opts.extent_policy)?;
            Ok(stats)
        }
        DiffTarget::Device(path) => {
            let file = open_device(path)?;
            // Unbuffered: each record is a single seek-then-write, so device
            // errors surface on the record that caused them.
            let device = SeekDevice::new(file);
            let (stats, device) = run(reader, device, observer, opts.extent_policy)?;
            if opts.sync {
                device.get_ref().sync_all().map_err(IoError::Sync)?;
            }
            Ok(stats)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
