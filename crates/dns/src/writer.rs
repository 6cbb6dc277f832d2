use anyhow::ensure;
use bytes::{BufMut, Bytes, BytesMut};

use crate::domain_name::{MAX_LABEL_LEN, MAX_NAME_LEN};

/// Largest message that fits a TCP length prefix.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// Bounded big-endian writer for DNS messages.
pub struct DnsMessageWriter {
    buf: BytesMut,
    max_len: usize,
}

impl DnsMessageWriter {
    /// Create a writer that refuses to grow past `max_len` bytes.
    pub fn new_with_max(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_len.min(512)),
            max_len,
        }
    }

    /// Create a writer bounded by the TCP message limit.
    pub fn new() -> Self {
        Self::new_with_max(MAX_MESSAGE_LEN)
    }

    #[inline]
    fn ensure_space(&self, need: usize, what: &str) -> anyhow::Result<()> {
        let cur = self.buf.len();
        let new_len = cur
            .checked_add(need)
            .ok_or_else(|| anyhow::anyhow!("length overflow"))?;
        ensure!(
            new_len <= self.max_len,
            "buffer overflow while writing {}: need={} current_len={} max_len={}",
            what,
            need,
            cur,
            self.max_len
        );
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> anyhow::Result<()> {
        self.ensure_space(1, "u8")?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> anyhow::Result<()> {
        self.ensure_space(2, "u16")?;
        self.buf.put_u16(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> anyhow::Result<()> {
        self.ensure_space(4, "u32")?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Write an uncompressed name.
    pub fn write_qname(&mut self, qname: &str) -> anyhow::Result<()> {
        let name = qname.trim_end_matches('.');
        if name.is_empty() {
            return self.write_u8(0);
        }

        let mut total = 1;
        for label in name.split('.') {
            ensure!(!label.is_empty(), "empty label in qname '{}'", qname);
            ensure!(label.len() <= MAX_LABEL_LEN, "label '{}' exceeds 63 bytes", label);
            total += 1 + label.len();
        }
        ensure!(total <= MAX_NAME_LEN, "qname too long ({} bytes): '{}'", total, qname);

        self.ensure_space(total, "qname")?;
        for label in name.split('.') {
            self.buf.put_u8(label.len() as u8);
            self.buf.extend_from_slice(label.as_bytes());
        }
        self.buf.put_u8(0);
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.ensure_space(data.len(), "raw bytes")?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Overwrite already written bytes, used to backfill RDLENGTH.
    pub fn overwrite_bytes(&mut self, pos: usize, data: &[u8]) -> anyhow::Result<()> {
        let end = pos
            .checked_add(data.len())
            .ok_or_else(|| anyhow::anyhow!("length overflow"))?;
        ensure!(
            end <= self.buf.len(),
            "overwrite out of bounds: pos={} len={} written={}",
            pos,
            data.len(),
            self.buf.len()
        );
        self.buf[pos..end].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for DnsMessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Types that know how to serialize themselves into a DNS message.
pub trait DnsWritable {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()>;
}
