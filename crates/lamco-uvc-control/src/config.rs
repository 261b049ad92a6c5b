//! Control-plane configuration
//!
//! # Examples
//!
//! ```rust
//! use lamco_uvc_control::ControlConfig;
//!
//! // Using builder pattern
//! let config = ControlConfig::builder()
//!     .streaming_interface(1)
//!     .uvc_version(0x0110)
//!     .build();
//!
//! // Using struct literal with defaults
//! let config = ControlConfig {
//!     request_timeout_ms: 1000,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use crate::probe::ProtocolVersion;

/// Addressing and timing of class-specific control requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    /// VideoControl interface number (default: 0)
    pub control_interface: u8,

    /// VideoStreaming interface number (default: 1)
    pub streaming_interface: u8,

    /// Processing unit entity id (default: 3)
    pub processing_unit_id: u8,

    /// bcdUVC of the device (default: 0x0100)
    ///
    /// Selects the 26-byte (1.0) or 34-byte (1.1 and later) probe record.
    pub uvc_version: u16,

    /// Timeout of each control request in milliseconds (default: 5000)
    pub request_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_interface: 0,
            streaming_interface: 1,
            processing_unit_id: 3,
            uvc_version: 0x0100,
            request_timeout_ms: 5000,
        }
    }
}

impl ControlConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ControlConfigBuilder {
        ControlConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.control_interface == self.streaming_interface {
            issues.push("control and streaming interfaces must differ".to_string());
        }

        if self.processing_unit_id == 0 {
            issues.push("processing_unit_id must be non-zero".to_string());
        }

        if self.uvc_version < 0x0100 {
            issues.push(format!("uvc_version {:#06x} is below 1.0", self.uvc_version));
        }

        if self.request_timeout_ms < 100 {
            issues.push("request_timeout_ms should be at least 100ms".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Protocol version for record sizing
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion(self.uvc_version)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Builder for [`ControlConfig`]
#[derive(Debug, Clone, Default)]
pub struct ControlConfigBuilder {
    control_interface: Option<u8>,
    streaming_interface: Option<u8>,
    processing_unit_id: Option<u8>,
    uvc_version: Option<u16>,
    request_timeout_ms: Option<u64>,
}

impl ControlConfigBuilder {
    /// Set the VideoControl interface number
    #[must_use]
    pub fn control_interface(mut self, interface: u8) -> Self {
        self.control_interface = Some(interface);
        self
    }

    /// Set the VideoStreaming interface number
    #[must_use]
    pub fn streaming_interface(mut self, interface: u8) -> Self {
        self.streaming_interface = Some(interface);
        self
    }

    /// Set the processing unit entity id
    #[must_use]
    pub fn processing_unit_id(mut self, id: u8) -> Self {
        self.processing_unit_id = Some(id);
        self
    }

    /// Set the device's bcdUVC
    #[must_use]
    pub fn uvc_version(mut self, version: u16) -> Self {
        self.uvc_version = Some(version);
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = Some(ms);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ControlConfig {
        let defaults = ControlConfig::default();
        ControlConfig {
            control_interface: self.control_interface.unwrap_or(defaults.control_interface),
            streaming_interface: self
                .streaming_interface
                .unwrap_or(defaults.streaming_interface),
            processing_unit_id: self.processing_unit_id.unwrap_or(defaults.processing_unit_id),
            uvc_version: self.uvc_version.unwrap_or(defaults.uvc_version),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControlConfig::default();
        assert_eq!(config.processing_unit_id, 3);
        assert_eq!(config.uvc_version, 0x0100);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ControlConfig::builder()
            .streaming_interface(2)
            .uvc_version(0x0110)
            .build();
        assert_eq!(config.streaming_interface, 2);
        assert_eq!(config.version().record_len(), 34);
        assert_eq!(config.control_interface, 0);
    }

    #[test]
    fn test_validation() {
        let config = ControlConfig {
            streaming_interface: 0,
            processing_unit_id: 0,
            request_timeout_ms: 10,
            ..Default::default()
        };
        let issues = config.validate().unwrap_err();
        assert_eq!(issues.len(), 3);
    }
}
