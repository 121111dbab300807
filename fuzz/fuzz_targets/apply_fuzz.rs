#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use rbd_diff_apply::apply::DiffApplier;
use rbd_diff_apply::device::SeekDevice;
use rbd_diff_apply::diff::RBD_DIFF_V1_MAGIC;

const IMAGE: usize = 1 << 16;

fuzz_target!(|data: &[u8]| {
    // Small declared size so every accepted record fits the in-memory image.
    let mut stream = RBD_DIFF_V1_MAGIC.to_vec();
    stream.push(b's');
    stream.extend_from_slice(&(IMAGE as u64).to_le_bytes());
    stream.extend_from_slice(data);

    let dev = SeekDevice::new(Cursor::new(vec![0u8; IMAGE]));
    let mut applier = DiffApplier::new(&stream[..], dev);
    let _ = applier.apply_all();

    // Out-of-bounds extents are rejected, so the image never grows.
    let image = applier.into_device().into_inner().into_inner();
    assert_eq!(image.len(), IMAGE);
});
