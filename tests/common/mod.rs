#![allow(dead_code)]

use rbd_diff_apply::diff::RBD_DIFF_V1_MAGIC;

/// Builds rbd diff v1 streams for tests.
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    buf: Vec<u8>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self {
            buf: RBD_DIFF_V1_MAGIC.to_vec(),
        }
    }

    pub fn from_snap(mut self, name: &[u8]) -> Self {
        self.name(b'f', name);
        self
    }

    pub fn to_snap(mut self, name: &[u8]) -> Self {
        self.name(b't', name);
        self
    }

    fn name(&mut self, tag: u8, name: &[u8]) {
        self.buf.push(tag);
        self.buf
            .extend_from_slice(&(name.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(name);
    }

    pub fn size(mut self, size: u64) -> Self {
        self.buf.push(b's');
        self.buf.extend_from_slice(&size.to_le_bytes());
        self
    }

    pub fn write(mut self, offset: u64, data: &[u8]) -> Self {
        self.extent(b'w', offset, data.len() as u64);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn zero(mut self, offset: u64, length: u64) -> Self {
        self.extent(b'z', offset, length);
        self
    }

    /// Write record header with no payload following it.
    pub fn write_header_only(mut self, offset: u64, length: u64) -> Self {
        self.extent(b'w', offset, length);
        self
    }

    fn extent(&mut self, tag: u8, offset: u64, length: u64) {
        self.buf.push(tag);
        self.buf.extend_from_slice(&offset.to_le_bytes());
        self.buf.extend_from_slice(&length.to_le_bytes());
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn end(mut self) -> Self {
        self.buf.push(b'e');
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Model of the expected device contents after applying `ops` in order.
pub fn compose(base: &[u8], ops: &[Op]) -> Vec<u8> {
    let mut out = base.to_vec();
    for op in ops {
        let (offset, bytes) = match op {
            Op::Write(offset, data) => (*offset as usize, data.clone()),
            Op::Zero(offset, len) => (*offset as usize, vec![0u8; *len as usize]),
        };
        if out.len() < offset + bytes.len() {
            out.resize(offset + bytes.len(), 0);
        }
        out[offset..offset + bytes.len()].copy_from_slice(&bytes);
    }
    out
}

#[derive(Debug, Clone)]
pub enum Op {
    Write(u64, Vec<u8>),
    Zero(u64, u64),
}

pub fn stream_for(image_size: u64, ops: &[Op]) -> Vec<u8> {
    let mut b = StreamBuilder::new().size(image_size);
    for op in ops {
        b = match op {
            Op::Write(offset, data) => b.write(*offset, data),
            Op::Zero(offset, len) => b.zero(*offset, *len),
        };
    }
    b.end().build()
}
