//! Video probe and commit control record
//!
//! The record is exchanged with VS_PROBE_CONTROL / VS_COMMIT_CONTROL
//! requests on the streaming interface. All multi-byte fields are
//! little-endian.
//!
//! ```text
//! off  size  field
//!   0   2    bmHint
//!   2   1    bFormatIndex
//!   3   1    bFrameIndex
//!   4   4    dwFrameInterval        (100 ns units)
//!   8   2    wKeyFrameRate
//!  10   2    wPFrameRate
//!  12   2    wCompQuality
//!  14   2    wCompWindowSize
//!  16   2    wDelay
//!  18   4    dwMaxVideoFrameSize
//!  22   4    dwMaxPayloadTransferSize
//! ---- UVC 1.1 and later ----
//!  26   4    dwClockFrequency
//!  30   1    bmFramingInfo
//!  31   1    bPreferedVersion
//!  32   1    bMinVersion
//!  33   1    bMaxVersion
//! ```

use crate::error::{ControlError, Result};

/// Record length for UVC 1.0 devices
pub const RECORD_LEN_V10: usize = 26;

/// Record length for UVC 1.1 and later devices
pub const RECORD_LEN_V11: usize = 34;

/// Device bcdUVC, e.g. `0x0100` for 1.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    /// UVC 1.0
    pub const V1_0: Self = Self(0x0100);
    /// UVC 1.1
    pub const V1_1: Self = Self(0x0110);

    /// Whether the record carries the 1.1 extension fields
    pub fn is_extended(self) -> bool {
        self >= Self::V1_1
    }

    /// Probe/commit record length for this version
    pub fn record_len(self) -> usize {
        if self.is_extended() {
            RECORD_LEN_V11
        } else {
            RECORD_LEN_V10
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02x}", self.0 >> 8, self.0 & 0xFF)
    }
}

/// Probe/commit control record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingControl {
    /// Fields the device must keep fixed (bit 0: frame interval)
    pub hint: u16,
    /// Format descriptor index (1-based)
    pub format_index: u8,
    /// Frame descriptor index (1-based)
    pub frame_index: u8,
    /// Frame interval in 100 ns units
    pub frame_interval: u32,
    /// Key frame rate
    pub key_frame_rate: u16,
    /// P frame rate
    pub p_frame_rate: u16,
    /// Compression quality
    pub comp_quality: u16,
    /// Compression window size
    pub comp_window_size: u16,
    /// Internal latency in ms
    pub delay: u16,
    /// Largest frame the device will send
    pub max_video_frame_size: u32,
    /// Largest payload per (micro)frame
    pub max_payload_transfer_size: u32,
    /// Device clock in Hz (1.1+)
    pub clock_frequency: u32,
    /// Framing info bits (1.1+)
    pub framing_info: u8,
    /// Preferred payload format version (1.1+)
    pub preferred_version: u8,
    /// Minimum payload format version (1.1+)
    pub min_version: u8,
    /// Maximum payload format version (1.1+)
    pub max_version: u8,
}

/// Hint bit requesting a fixed frame interval
pub const HINT_FRAME_INTERVAL: u16 = 0x0001;

impl StreamingControl {
    /// Initial probe for a format/frame/interval triple
    pub fn probe(format_index: u8, frame_index: u8, frame_interval: u32) -> Self {
        Self {
            hint: HINT_FRAME_INTERVAL,
            format_index,
            frame_index,
            frame_interval,
            ..Default::default()
        }
    }

    /// Serialize for `version`
    pub fn encode(&self, version: ProtocolVersion) -> Vec<u8> {
        let mut data = Vec::with_capacity(version.record_len());
        data.extend_from_slice(&self.hint.to_le_bytes());
        data.push(self.format_index);
        data.push(self.frame_index);
        data.extend_from_slice(&self.frame_interval.to_le_bytes());
        data.extend_from_slice(&self.key_frame_rate.to_le_bytes());
        data.extend_from_slice(&self.p_frame_rate.to_le_bytes());
        data.extend_from_slice(&self.comp_quality.to_le_bytes());
        data.extend_from_slice(&self.comp_window_size.to_le_bytes());
        data.extend_from_slice(&self.delay.to_le_bytes());
        data.extend_from_slice(&self.max_video_frame_size.to_le_bytes());
        data.extend_from_slice(&self.max_payload_transfer_size.to_le_bytes());

        if version.is_extended() {
            data.extend_from_slice(&self.clock_frequency.to_le_bytes());
            data.push(self.framing_info);
            data.push(self.preferred_version);
            data.push(self.min_version);
            data.push(self.max_version);
        }

        data
    }

    /// Parse a record of exactly `version.record_len()` bytes
    ///
    /// The 1.1 fields are zero when decoding a 1.0 record.
    pub fn decode(data: &[u8], version: ProtocolVersion) -> Result<Self> {
        let expected = version.record_len();
        if data.len() != expected {
            return Err(ControlError::ShortTransfer {
                expected,
                actual: data.len(),
            });
        }

        let u16_at = |off: usize| u16::from_le_bytes([data[off], data[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
        };

        let mut control = Self {
            hint: u16_at(0),
            format_index: data[2],
            frame_index: data[3],
            frame_interval: u32_at(4),
            key_frame_rate: u16_at(8),
            p_frame_rate: u16_at(10),
            comp_quality: u16_at(12),
            comp_window_size: u16_at(14),
            delay: u16_at(16),
            max_video_frame_size: u32_at(18),
            max_payload_transfer_size: u32_at(22),
            ..Default::default()
        };

        if version.is_extended() {
            control.clock_frequency = u32_at(26);
            control.framing_info = data[30];
            control.preferred_version = data[31];
            control.min_version = data[32];
            control.max_version = data[33];
        }

        Ok(control)
    }

    /// Frames per second implied by the frame interval
    pub fn fps(&self) -> f64 {
        if self.frame_interval == 0 {
            0.0
        } else {
            10_000_000.0 / f64::from(self.frame_interval)
        }
    }
}

/// Parameters the data path is sized from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedParams {
    /// Largest frame the device will send
    pub max_frame_size: u32,
    /// Largest payload per (micro)frame
    pub max_payload_transfer_size: u32,
    /// Streaming endpoint wMaxPacketSize
    pub max_packet_size: u16,
    /// Frame interval in 100 ns units
    pub frame_interval: u32,
}

impl NegotiatedParams {
    /// Combine a committed record with the endpoint packet size
    pub fn from_committed(control: &StreamingControl, max_packet_size: u16) -> Self {
        Self {
            max_frame_size: control.max_video_frame_size,
            max_payload_transfer_size: control.max_payload_transfer_size,
            max_packet_size,
            frame_interval: control.frame_interval,
        }
    }
}
