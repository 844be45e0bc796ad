use std::borrow::Cow;
use std::ops::Deref;

use anyhow::Context;

/// Upper bound on compression pointers followed while reading a single QNAME
pub const MAX_QNAME_JUMPS: usize = 32;
/// RFC1035: names are limited to 255 octets on the wire
pub const MAX_QNAME_LENGTH: usize = 255;
/// RFC1035: labels are limited to 63 octets
pub const MAX_LABEL_LENGTH: usize = 0x3f;

pub trait FromBuf: Sized {
    fn from_buf(buf: &mut ByteBuf) -> anyhow::Result<Self>;
}

pub trait EncodeToBuf {
    /// Appends the wire representation to `buf` and returns the number of bytes written
    fn encode_to_buf(&self, buf: &mut ByteBuf) -> anyhow::Result<usize>;
}

pub struct ByteBuf<'a> {
    buf: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> Deref for ByteBuf<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buf.as_ref()
    }
}

impl<'a> AsRef<[u8]> for ByteBuf<'a> {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl<'a> ByteBuf<'a> {
    pub fn new(src: &'a impl AsRef<[u8]>) -> ByteBuf<'a> {
        ByteBuf {
            buf: Cow::Borrowed(src.as_ref()),
            pos: 0,
        }
    }

    pub fn new_empty(capacity: Option<usize>) -> ByteBuf<'static> {
        ByteBuf {
            buf: Cow::Owned(Vec::with_capacity(capacity.unwrap_or(512))),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> Cow<'a, [u8]> {
        self.buf
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        self.read_bytes(1)
            .and_then(|bytes| bytes.first().copied().context("bug: should be present"))
    }

    pub fn write_u8(&mut self, data: u8) {
        self.buf.to_mut().push(data);
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        self.read_bytes(2)
            .and_then(|bytes| {
                TryInto::<[u8; 2]>::try_into(bytes).context("bug: should be exactly two bytes in length")
            })
            .map(u16::from_be_bytes)
    }

    pub fn write_u16(&mut self, data: u16) {
        self.write_bytes(&data.to_be_bytes());
    }

    pub fn read_bytes(&mut self, n: usize) -> anyhow::Result<&[u8]> {
        self.ensure_length(n, None)?;
        let pos = self.pos;
        self.pos += n;
        self.buf
            .get(pos..pos + n)
            .ok_or_else(|| anyhow::anyhow!("bug: should be present"))
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.to_mut().extend_from_slice(data);
    }

    /// Reads a possibly compressed QNAME and returns its labels joined with '.'.
    ///
    /// Label bytes are kept as they are on the wire: no UTF-8 validation and no case folding.
    pub fn read_qname(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut jumps = 0;
        let mut pos = self.pos;
        let mut wire_length = 0;
        let mut qname = Vec::new();
        loop {
            self.ensure_length(1, Some(pos))
                .context("malformed packet: expected QNAME label length")?;
            let label_length = self.buf[pos];
            if label_length & 0xC0 == 0xC0 {
                // Jump directive consists of two bytes
                self.ensure_length(2, Some(pos))
                    .context("malformed packet: expected second jump ptr byte in QNAME")?;
                if jumps == MAX_QNAME_JUMPS {
                    anyhow::bail!("malformed packet: too many jumps in QNAME at byte {}", pos);
                }
                let ptr_second_byte = self.buf[pos + 1] as u16;
                // Construct a jump offset by clearing two MSB bits and joining two bytes
                let offset = ((label_length as u16 ^ 0xC0) << 8) | ptr_second_byte;

                if jumps == 0 {
                    // Continue parsing after the pointer once the QNAME is done
                    self.pos = pos + 2;
                }
                jumps += 1;
                pos = offset as usize;
            } else if label_length & 0xC0 != 0 {
                anyhow::bail!(
                    "malformed packet: unsupported label type {:#04x} at byte {}",
                    label_length & 0xC0,
                    pos
                );
            } else {
                pos += 1;
                wire_length += 1 + label_length as usize;
                if wire_length > MAX_QNAME_LENGTH {
                    anyhow::bail!("malformed packet: QNAME exceeds {} bytes", MAX_QNAME_LENGTH);
                }

                if label_length != 0 {
                    let label = self.buf.get(pos..pos + label_length as usize).with_context(|| {
                        format!(
                            "malformed packet: expected label of length {} at byte {}",
                            label_length, pos
                        )
                    })?;
                    if !qname.is_empty() {
                        qname.push(b'.');
                    }
                    qname.extend_from_slice(label);
                    pos += label_length as usize;
                }

                if jumps == 0 {
                    self.pos = pos;
                }

                // Last label, nothing more to parse
                if label_length == 0 {
                    break;
                }
            }
        }

        Ok(qname)
    }

    /// Writes `qname` as uncompressed labels followed by the root label
    pub fn write_qname(&mut self, qname: &[u8]) -> anyhow::Result<usize> {
        let mut total_qname_length = 0;
        for label in qname.split(|byte| *byte == b'.').filter(|label| !label.is_empty()) {
            if label.len() > MAX_LABEL_LENGTH {
                anyhow::bail!(
                    "label is too long ({}): {}",
                    label.len(),
                    String::from_utf8_lossy(label)
                );
            }
            self.write_u8(label.len() as u8);
            self.write_bytes(label);
            total_qname_length += 1 + label.len();
        }
        self.write_u8(0);

        Ok(total_qname_length + 1)
    }

    fn ensure_length(&self, n: usize, pos: Option<usize>) -> anyhow::Result<()> {
        if self.buf.len() < pos.unwrap_or(self.pos) + n {
            anyhow::bail!("underlying buffer is too small")
        }
        Ok(())
    }
}
