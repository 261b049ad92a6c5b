//! Vendor-specific framing strategies
//!
//! Most devices toggle the FID header bit at every frame boundary and need
//! nothing special. Some chipsets do not, and some also emit a
//! byte-swapped JPEG start marker. A [`FrameQuirk`] decides the frame ID
//! of each packet and gets a chance to fix up bytes right after they are
//! copied into a frame buffer.

use tracing::trace;

use crate::payload::PayloadHeader;

/// Vendor id of the ip2970/ip2977 bridge chips
pub const IP2970_VENDOR_ID: u16 = 0x1B3B;

/// Offset inside the raw packet where the ip2970 start marker appears
const IP2970_MARKER_OFFSET: usize = 12;

/// Smallest packet that can carry the marker
const IP2970_MIN_PACKET: usize = 16;

const JPEG_SOI_MARKER: [u8; 3] = [0xFF, 0xD8, 0xFF];
const SWAPPED_SOI_MARKER: [u8; 3] = [0xD8, 0xFF, 0xC4];

/// Frame boundary detection and payload repair for one device family
pub trait FrameQuirk: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Frame ID to attribute to `packet`
    ///
    /// `last_fid` is the frame ID of the last packet whose payload was
    /// accepted, `None` before the first one.
    fn frame_id(&mut self, packet: &[u8], header: &PayloadHeader, last_fid: Option<bool>) -> bool;

    /// Fix up `copied` bytes just written at the start of `region`
    ///
    /// `region` runs to the end of the buffer's capacity. Returns the
    /// number of valid bytes now at the start of `region`, never more than
    /// `region.len()`.
    fn repair(&mut self, region: &mut [u8], copied: usize) -> usize {
        let _ = region;
        copied
    }
}

/// Trusts the FID header bit
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFraming;

impl FrameQuirk for StandardFraming {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn frame_id(&mut self, _packet: &[u8], header: &PayloadHeader, _last_fid: Option<bool>) -> bool {
        header.fid()
    }
}

/// ip2970/ip2977: FID bit is unreliable and the SOI marker may be swapped
///
/// A packet carrying a JPEG start marker at raw offset 12 starts a new
/// frame, so the synthetic frame ID flips relative to the last accepted
/// one. Every other packet keeps the current synthetic ID.
#[derive(Debug, Default)]
pub struct Ip2970Quirk {
    fid: bool,
    scratch: Vec<u8>,
}

impl Ip2970Quirk {
    /// Create the strategy with a cleared synthetic frame ID
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameQuirk for Ip2970Quirk {
    fn name(&self) -> &'static str {
        "ip2970"
    }

    fn frame_id(&mut self, packet: &[u8], _header: &PayloadHeader, last_fid: Option<bool>) -> bool {
        if packet.len() >= IP2970_MIN_PACKET {
            let marker = &packet[IP2970_MARKER_OFFSET..IP2970_MARKER_OFFSET + 3];
            if marker == JPEG_SOI_MARKER.as_slice() || marker == SWAPPED_SOI_MARKER.as_slice() {
                // No previous frame counts as a set bit.
                self.fid = !last_fid.unwrap_or(true);
                trace!("ip2970 start marker, synthetic fid {}", self.fid);
            }
        }
        self.fid
    }

    fn repair(&mut self, region: &mut [u8], copied: usize) -> usize {
        if copied < SWAPPED_SOI_MARKER.len() || region[..3] != SWAPPED_SOI_MARKER[..] {
            return copied;
        }

        self.scratch.clear();
        self.scratch.reserve(copied + 1);
        self.scratch.push(0xFF);
        self.scratch.extend_from_slice(&region[..copied]);

        let len = self.scratch.len().min(region.len());
        region[..len].copy_from_slice(&self.scratch[..len]);
        if len < self.scratch.len() {
            trace!(
                "ip2970 restored SOI marker, buffer full: dropped {} trailing byte(s)",
                self.scratch.len() - len
            );
        } else {
            trace!("ip2970 restored SOI marker ({} -> {} bytes)", copied, len);
        }
        len
    }
}

/// Pick the strategy for a device vendor id
pub fn quirk_for_vendor(vendor_id: Option<u16>) -> Box<dyn FrameQuirk> {
    match vendor_id {
        Some(IP2970_VENDOR_ID) => Box::new(Ip2970Quirk::new()),
        _ => Box::new(StandardFraming),
    }
}
