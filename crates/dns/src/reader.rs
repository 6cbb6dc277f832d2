use anyhow::{bail, ensure};

use crate::domain_name::{DomainName, MAX_NAME_LEN, validate_label};

/// Upper bound on compression pointers followed while reading one name.
const MAX_POINTER_HOPS: usize = 64;

/// Bounds-checked cursor over a DNS message.
pub struct DnsMessageReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> DnsMessageReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    #[inline]
    fn need(&self, need: usize, what: &str) -> anyhow::Result<()> {
        let rem = self.remaining();
        ensure!(
            need <= rem,
            "buffer underflow at pos {} while reading {}: need {} bytes, have {}",
            self.position,
            what,
            need,
            rem
        );
        Ok(())
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        self.need(1, "u8")?;
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        self.need(2, "u16")?;
        let b = &self.buffer[self.position..self.position + 2];
        self.position += 2;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        self.need(4, "u32")?;
        let b = &self.buffer[self.position..self.position + 4];
        self.position += 4;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a possibly compressed name.
    ///
    /// The cursor ends up right after the name as it appears at the current
    /// position, regardless of how many pointers were followed.
    pub fn read_qname(&mut self) -> anyhow::Result<DomainName> {
        let mut pos = self.position;
        let mut resume_at: Option<usize> = None;
        let mut hops = 0;
        let mut name = String::new();

        loop {
            let Some(&length) = self.buffer.get(pos) else {
                bail!("qname out of bounds at pos {} (buf len {})", pos, self.buffer.len());
            };

            match length & 0xC0 {
                0xC0 => {
                    let Some(&low) = self.buffer.get(pos + 1) else {
                        bail!("truncated compression pointer at pos {}", pos);
                    };
                    hops += 1;
                    ensure!(hops <= MAX_POINTER_HOPS, "qname compression pointer loop at pos {}", pos);

                    let offset = (((length as usize) & 0x3F) << 8) | low as usize;
                    // pointers may only refer backwards
                    ensure!(offset < pos, "forward compression pointer {} at pos {}", offset, pos);

                    resume_at.get_or_insert(pos + 2);
                    pos = offset;
                }
                0x00 => {
                    pos += 1;
                    if length == 0 {
                        break;
                    }

                    let end = pos + length as usize;
                    let Some(label) = self.buffer.get(pos..end) else {
                        bail!(
                            "label overruns buffer at pos {}: need {} bytes, have {}",
                            pos,
                            length,
                            self.buffer.len().saturating_sub(pos)
                        );
                    };

                    if let Err(e) = validate_label(label) {
                        bail!("invalid label at pos {}: {}", pos, e);
                    }
                    // validated labels are printable ASCII
                    name.extend(label.iter().map(|&b| b as char));
                    name.push('.');
                    ensure!(name.len() <= MAX_NAME_LEN, "qname exceeds {} bytes", MAX_NAME_LEN);
                    pos = end;
                }
                other => bail!("unsupported label type 0x{:02x} at pos {}", other, pos),
            }
        }

        self.position = resume_at.unwrap_or(pos);

        if name.is_empty() {
            return Ok(DomainName::root());
        }
        DomainName::from_ascii(name)
    }

    /// Read `length` raw bytes.
    pub fn read_bytes(&mut self, length: usize) -> anyhow::Result<&'a [u8]> {
        self.need(length, "raw bytes")?;
        let data = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(data)
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

/// Types that can be parsed straight out of a DNS message.
pub trait DnsReadable: Sized {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self>;
}
