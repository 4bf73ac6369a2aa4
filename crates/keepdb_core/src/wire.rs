//! Little-endian binary helpers shared by the WAL, segment and manifest formats.

use crate::error::{CoreError, CoreResult};

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// Cursor over a byte slice that reports short reads with a caller-chosen error.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    error: fn(String) -> CoreError,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], error: fn(String) -> CoreError) -> Self {
        Self {
            data,
            pos: 0,
            error,
        }
    }

    pub(crate) fn bytes(&mut self, len: usize, what: &str) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| (self.error)(format!("unexpected end of data reading {what}")))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &str) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &str) -> CoreResult<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &str) -> CoreResult<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn u32(&mut self, what: &str) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn u64(&mut self, what: &str) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    /// Reads a `u32` length prefix followed by that many bytes.
    pub(crate) fn blob(&mut self, what: &str) -> CoreResult<&'a [u8]> {
        let len = self.u32(what)? as usize;
        self.bytes(len, what)
    }

    /// Fails if any bytes remain.
    pub(crate) fn finish(&self, what: &str) -> CoreResult<()> {
        if self.pos != self.data.len() {
            return Err((self.error)(format!(
                "trailing bytes in {what}: expected {} bytes, got {}",
                self.pos,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// Appends a `u32` length prefix and `data`.
pub(crate) fn put_blob(buf: &mut Vec<u8>, data: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| CoreError::configuration("payload larger than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}
