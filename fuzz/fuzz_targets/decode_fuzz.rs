#![no_main]
use libfuzzer_sys::fuzz_target;
use rbd_diff_apply::diff::{ExtentPolicy, RBD_DIFF_V1_MAGIC, decode_memory};

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic, only return errors.
    let _ = decode_memory(data, ExtentPolicy::Reject);

    // Most random inputs die at the header; also fuzz past it.
    let mut stream = RBD_DIFF_V1_MAGIC.to_vec();
    stream.extend_from_slice(data);
    let _ = decode_memory(&stream, ExtentPolicy::Allow);
});
