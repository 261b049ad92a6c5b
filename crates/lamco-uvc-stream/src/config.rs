//! Stream configuration
//!
//! # Examples
//!
//! ```rust
//! use lamco_uvc_stream::StreamConfig;
//!
//! // Using builder pattern
//! let config = StreamConfig::builder()
//!     .buffer_count(6)
//!     .vendor_id(0x1B3B)
//!     .build();
//!
//! // Using struct literal with defaults
//! let config = StreamConfig {
//!     max_packet_size: 1024,
//!     ..Default::default()
//! };
//! ```

use lamco_videobuf::MAX_BUFFERS;

use crate::format::FRAME_SIZES;
use crate::transfer::{DEFAULT_TRANSFER_COUNT, MAX_PACKETS_PER_TRANSFER};

/// Streaming endpoint, buffering and format settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Frame buffers allocated by `allocate_buffers` (default: 4)
    pub buffer_count: usize,

    /// Transfers kept in flight (default: 5)
    pub transfer_count: usize,

    /// Packet cap per transfer (default: 32)
    pub max_packets_per_transfer: usize,

    /// Isochronous IN endpoint address (default: 0x82)
    pub endpoint_address: u8,

    /// Alternate setting that enables the endpoint (default: 5)
    pub alternate_setting: u8,

    /// Endpoint polling interval (default: 1)
    pub interval: u8,

    /// Endpoint max packet size in bytes (default: 800)
    pub max_packet_size: u16,

    /// Largest frame in bytes, sizes the buffer pool (default: 77312)
    pub max_frame_size: u32,

    /// Index into the frame size table (default: 1, 320x240)
    pub frame_index: usize,

    /// Frame interval in 100 ns units (default: 333333, 30 fps)
    pub frame_interval: u32,

    /// USB vendor id, selects framing quirks (default: None)
    pub vendor_id: Option<u16>,

    /// Cap on the buffer pool size in bytes (default: None)
    pub memory_limit: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            transfer_count: DEFAULT_TRANSFER_COUNT,
            max_packets_per_transfer: MAX_PACKETS_PER_TRANSFER,
            endpoint_address: 0x82,
            alternate_setting: 5,
            interval: 1,
            max_packet_size: 800,
            max_frame_size: 77_312,
            frame_index: 1,
            frame_interval: 333_333,
            vendor_id: None,
            memory_limit: None,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.buffer_count == 0 || self.buffer_count > MAX_BUFFERS {
            issues.push(format!("buffer_count must be between 1 and {MAX_BUFFERS}"));
        }

        if self.transfer_count == 0 {
            issues.push("transfer_count must be at least 1".to_string());
        }

        if self.max_packets_per_transfer == 0
            || self.max_packets_per_transfer > MAX_PACKETS_PER_TRANSFER
        {
            issues.push(format!(
                "max_packets_per_transfer must be between 1 and {MAX_PACKETS_PER_TRANSFER}"
            ));
        }

        if self.endpoint_address & 0x80 == 0 {
            issues.push(format!(
                "endpoint {:#04x} is not an IN endpoint",
                self.endpoint_address
            ));
        }

        if self.alternate_setting == 0 {
            issues.push("alternate_setting 0 has no bandwidth".to_string());
        }

        if self.max_packet_size == 0 {
            issues.push("max_packet_size must be non-zero".to_string());
        }

        if self.max_frame_size == 0 {
            issues.push("max_frame_size must be non-zero".to_string());
        }

        if self.frame_index >= FRAME_SIZES.len() {
            issues.push(format!(
                "frame_index {} out of range (0..{})",
                self.frame_index,
                FRAME_SIZES.len()
            ));
        }

        if self.frame_interval == 0 {
            issues.push("frame_interval must be non-zero".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`StreamConfig`]
#[derive(Debug, Clone, Default)]
pub struct StreamConfigBuilder {
    buffer_count: Option<usize>,
    transfer_count: Option<usize>,
    max_packets_per_transfer: Option<usize>,
    endpoint_address: Option<u8>,
    alternate_setting: Option<u8>,
    interval: Option<u8>,
    max_packet_size: Option<u16>,
    max_frame_size: Option<u32>,
    frame_index: Option<usize>,
    frame_interval: Option<u32>,
    vendor_id: Option<u16>,
    memory_limit: Option<usize>,
}

impl StreamConfigBuilder {
    /// Set the number of frame buffers
    #[must_use]
    pub fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = Some(count);
        self
    }

    /// Set the number of transfers in flight
    #[must_use]
    pub fn transfer_count(mut self, count: usize) -> Self {
        self.transfer_count = Some(count);
        self
    }

    /// Set the packet cap per transfer
    #[must_use]
    pub fn max_packets_per_transfer(mut self, packets: usize) -> Self {
        self.max_packets_per_transfer = Some(packets);
        self
    }

    /// Set the isochronous endpoint address
    #[must_use]
    pub fn endpoint_address(mut self, address: u8) -> Self {
        self.endpoint_address = Some(address);
        self
    }

    /// Set the streaming alternate setting
    #[must_use]
    pub fn alternate_setting(mut self, alt: u8) -> Self {
        self.alternate_setting = Some(alt);
        self
    }

    /// Set the polling interval
    #[must_use]
    pub fn interval(mut self, interval: u8) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the endpoint max packet size
    #[must_use]
    pub fn max_packet_size(mut self, size: u16) -> Self {
        self.max_packet_size = Some(size);
        self
    }

    /// Set the largest frame size
    #[must_use]
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    /// Set the frame size table index
    #[must_use]
    pub fn frame_index(mut self, index: usize) -> Self {
        self.frame_index = Some(index);
        self
    }

    /// Set the frame interval in 100 ns units
    #[must_use]
    pub fn frame_interval(mut self, interval: u32) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Set the USB vendor id
    #[must_use]
    pub fn vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    /// Set the buffer pool memory cap
    #[must_use]
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> StreamConfig {
        let defaults = StreamConfig::default();
        StreamConfig {
            buffer_count: self.buffer_count.unwrap_or(defaults.buffer_count),
            transfer_count: self.transfer_count.unwrap_or(defaults.transfer_count),
            max_packets_per_transfer: self
                .max_packets_per_transfer
                .unwrap_or(defaults.max_packets_per_transfer),
            endpoint_address: self.endpoint_address.unwrap_or(defaults.endpoint_address),
            alternate_setting: self.alternate_setting.unwrap_or(defaults.alternate_setting),
            interval: self.interval.unwrap_or(defaults.interval),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            max_frame_size: self.max_frame_size.unwrap_or(defaults.max_frame_size),
            frame_index: self.frame_index.unwrap_or(defaults.frame_index),
            frame_interval: self.frame_interval.unwrap_or(defaults.frame_interval),
            vendor_id: self.vendor_id.or(defaults.vendor_id),
            memory_limit: self.memory_limit.or(defaults.memory_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.buffer_count, 4);
        assert_eq!(config.transfer_count, 5);
        assert_eq!(config.max_packets_per_transfer, 32);
        assert_eq!(config.endpoint_address, 0x82);
        assert_eq!(config.alternate_setting, 5);
        assert_eq!(config.max_packet_size, 800);
        assert_eq!(config.max_frame_size, 77_312);
        assert_eq!(config.frame_interval, 333_333);
        assert!(config.vendor_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = StreamConfig::builder()
            .buffer_count(8)
            .vendor_id(0x1B3B)
            .memory_limit(1 << 20)
            .frame_index(0)
            .build();

        assert_eq!(config.buffer_count, 8);
        assert_eq!(config.vendor_id, Some(0x1B3B));
        assert_eq!(config.memory_limit, Some(1 << 20));
        assert_eq!(config.frame_index, 0);
        assert_eq!(config.endpoint_address, 0x82);
    }

    #[test]
    fn test_validation() {
        let config = StreamConfig {
            buffer_count: 0,
            endpoint_address: 0x02,
            alternate_setting: 0,
            max_packet_size: 0,
            frame_index: 7,
            ..Default::default()
        };

        let issues = config.validate().unwrap_err();
        assert_eq!(issues.len(), 5);

        let config = StreamConfig {
            buffer_count: 33,
            max_packets_per_transfer: 64,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 2);
    }
}
