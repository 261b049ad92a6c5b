//! Payload header of isochronous video packets
//!
//! ```text
//! byte 0      bHeaderLength (includes itself)
//! byte 1      bmHeaderInfo
//!             0x80 EOH  0x40 ERR  0x20 STI  0x10 RES
//!             0x08 SCR  0x04 PTS  0x02 EOF  0x01 FID
//! bytes 2..   PTS (4 bytes, if PTS), SCR (6 bytes, if SCR)
//! ```

use crate::error::PacketError;

/// Frame ID toggle
pub const HEADER_FID: u8 = 0x01;
/// End of frame
pub const HEADER_EOF: u8 = 0x02;
/// Presentation time stamp present
pub const HEADER_PTS: u8 = 0x04;
/// Source clock reference present
pub const HEADER_SCR: u8 = 0x08;
/// Reserved
pub const HEADER_RES: u8 = 0x10;
/// Still image
pub const HEADER_STI: u8 = 0x20;
/// Payload error
pub const HEADER_ERR: u8 = 0x40;
/// End of header
pub const HEADER_EOH: u8 = 0x80;

/// Parsed payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Header length in bytes
    pub length: u8,
    /// Header flag bits
    pub flags: u8,
    /// Presentation time stamp, when present
    pub pts: Option<u32>,
    /// Source clock reference (STC, SOF counter), when present
    pub scr: Option<(u32, u16)>,
}

impl PayloadHeader {
    /// Validate and parse the header at the start of `packet`
    pub fn parse(packet: &[u8]) -> Result<Self, PacketError> {
        if packet.len() < 2 {
            return Err(PacketError::TooShort(packet.len()));
        }

        let length = packet[0];
        let flags = packet[1];
        if length < 2 {
            return Err(PacketError::HeaderTooShort(length));
        }
        if usize::from(length) > packet.len() {
            return Err(PacketError::HeaderOverrun {
                header: length,
                packet: packet.len(),
            });
        }

        let header = &packet[..usize::from(length)];
        let mut cursor = 2;

        let pts = if flags & HEADER_PTS != 0 && header.len() >= cursor + 4 {
            let value = u32::from_le_bytes([
                header[cursor],
                header[cursor + 1],
                header[cursor + 2],
                header[cursor + 3],
            ]);
            cursor += 4;
            Some(value)
        } else {
            None
        };

        let scr = if flags & HEADER_SCR != 0 && header.len() >= cursor + 6 {
            let stc = u32::from_le_bytes([
                header[cursor],
                header[cursor + 1],
                header[cursor + 2],
                header[cursor + 3],
            ]);
            let sof = u16::from_le_bytes([header[cursor + 4], header[cursor + 5]]);
            Some((stc, sof))
        } else {
            None
        };

        let header = Self {
            length,
            flags,
            pts,
            scr,
        };
        if header.is_error() {
            return Err(PacketError::DeviceError);
        }
        Ok(header)
    }

    /// Frame ID bit
    pub fn fid(&self) -> bool {
        self.flags & HEADER_FID != 0
    }

    /// End-of-frame bit
    pub fn eof(&self) -> bool {
        self.flags & HEADER_EOF != 0
    }

    /// Payload error bit
    pub fn is_error(&self) -> bool {
        self.flags & HEADER_ERR != 0
    }

    /// Still-image bit
    pub fn is_still(&self) -> bool {
        self.flags & HEADER_STI != 0
    }

    /// Header length as a slice offset
    pub fn len(&self) -> usize {
        usize::from(self.length)
    }

    /// Never true for a parsed header
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
