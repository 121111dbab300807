use std::io::Cursor;

use rbd_diff_apply::apply::DiffApplier;
use rbd_diff_apply::device::SeekDevice;
use rbd_diff_apply::diff::DecodeError;

#[derive(Debug)]
struct Vector {
    name: String,
    expect: String,
    device: Vec<u8>,
    stream: Vec<u8>,
    expected_device: Vec<u8>,
}

fn hex_to_bytes(s: &str) -> Vec<u8> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }
    assert!(
        s.len().is_multiple_of(2),
        "hex string must have even length"
    );
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn load_vectors() -> Vec<Vector> {
    let manifest = include_str!("vectors/manifest.tsv");
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let parts: Vec<_> = line.split('|').collect();
            assert_eq!(parts.len(), 5, "invalid vector row: {line}");
            Vector {
                name: parts[0].to_string(),
                expect: parts[1].to_string(),
                device: hex_to_bytes(parts[2]),
                stream: hex_to_bytes(parts[3]),
                expected_device: hex_to_bytes(parts[4]),
            }
        })
        .collect()
}

fn outcome(result: &Result<(), DecodeError>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(DecodeError::Truncated { .. }) => "truncated",
        Err(DecodeError::InvalidHeader { .. }) => "invalid_header",
        Err(DecodeError::UnknownTag { .. }) => "unknown_tag",
        Err(DecodeError::DuplicateField { .. }) => "duplicate",
        Err(DecodeError::ExtentOutOfBounds { .. }) => "out_of_bounds",
        Err(_) => "other",
    }
}

#[test]
fn manifest_is_not_empty() {
    assert!(load_vectors().len() >= 10);
}

#[test]
fn regression_vectors_apply_as_expected() {
    for v in load_vectors() {
        let device = SeekDevice::new(Cursor::new(v.device.clone()));
        let mut applier = DiffApplier::new(&v.stream[..], device);
        let result = applier.apply_all().map(|_| ());
        assert_eq!(
            outcome(&result),
            v.expect,
            "vector {}: got {:?}",
            v.name,
            result
        );

        let out = applier.into_device().into_inner().into_inner();
        assert_eq!(out, v.expected_device, "vector {}: device contents", v.name);
    }
}
