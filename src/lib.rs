//! rbd-diff-apply: replay RBD snapshot diff streams onto a block device.
//!
//! The crate provides:
//! - A decoder for the `rbd diff v1` stream format (`diff`)
//! - Positioned device writers (`device`)
//! - A streaming applier with progress callbacks (`apply`, `observer`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::fs::OpenOptions;
//! use rbd_diff_apply::apply::DiffApplier;
//! use rbd_diff_apply::device::SeekDevice;
//!
//! let disk = OpenOptions::new().write(true).open("/dev/sdb").unwrap();
//! let mut applier = DiffApplier::new(std::io::stdin().lock(), SeekDevice::new(disk));
//! let stats = applier.apply_all().unwrap();
//! println!("applied {} records", stats.records_applied());
//! ```

pub mod apply;
pub mod device;
pub mod diff;
pub mod io;
pub mod observer;

#[cfg(feature = "cli")]
pub mod cli;
