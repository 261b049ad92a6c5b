//! Class-specific control requests on endpoint 0
//!
//! [`ControlChannel`] is the seam to the USB host stack. Implement it on
//! top of whatever library owns the device handle; this crate only builds
//! the requests and interprets the bytes.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

use crate::error::{ControlError, Result};

/// UVC class-specific request codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestCode {
    /// Set current value
    SetCur = 0x01,
    /// Get current value
    GetCur = 0x81,
    /// Get minimum value
    GetMin = 0x82,
    /// Get maximum value
    GetMax = 0x83,
    /// Get resolution
    GetRes = 0x84,
    /// Get data length
    GetLen = 0x85,
    /// Get capabilities
    GetInfo = 0x86,
    /// Get default value
    GetDef = 0x87,
}

impl RequestCode {
    /// bRequest value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether data flows device-to-host
    pub fn is_in(self) -> bool {
        self.code() & 0x80 != 0
    }
}

/// bmRequestType: class request to an interface, host-to-device
pub const REQUEST_TYPE_OUT: u8 = 0x21;
/// bmRequestType: class request to an interface, device-to-host
pub const REQUEST_TYPE_IN: u8 = 0xA1;

/// One addressed control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    /// Request code
    pub code: RequestCode,
    /// Control selector (high byte of wValue)
    pub selector: u8,
    /// Unit or terminal id, 0 for the interface itself
    pub entity: u8,
    /// Interface number
    pub interface: u8,
}

impl ControlRequest {
    /// Build a request
    pub fn new(code: RequestCode, selector: u8, entity: u8, interface: u8) -> Self {
        Self {
            code,
            selector,
            entity,
            interface,
        }
    }

    /// bmRequestType
    pub fn request_type(&self) -> u8 {
        if self.code.is_in() {
            REQUEST_TYPE_IN
        } else {
            REQUEST_TYPE_OUT
        }
    }

    /// wValue
    pub fn value(&self) -> u16 {
        u16::from(self.selector) << 8
    }

    /// wIndex
    pub fn index(&self) -> u16 {
        (u16::from(self.entity) << 8) | u16::from(self.interface)
    }
}

/// Access to the device's default control pipe
///
/// Both methods return the number of bytes actually moved. A failed
/// exchange should be reported as [`ControlError::IoFault`].
pub trait ControlChannel: Send + Sync {
    /// Device-to-host request filling `buf`
    fn control_in(
        &self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Host-to-device request sending `data`
    fn control_out(
        &self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + Send;
}

/// Run a device-to-host request, bounded by `timeout`
pub(crate) async fn read<C: ControlChannel>(
    channel: &C,
    request: ControlRequest,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize> {
    trace!(
        "control in {:?} wValue={:#06x} wIndex={:#06x} len={}",
        request.code,
        request.value(),
        request.index(),
        buf.len()
    );
    tokio::time::timeout(timeout, channel.control_in(request, buf, timeout))
        .await
        .map_err(|_| ControlError::io_fault(format!("{:?} timed out", request.code)))?
}

/// Run a host-to-device request, bounded by `timeout`
pub(crate) async fn write<C: ControlChannel>(
    channel: &C,
    request: ControlRequest,
    data: &[u8],
    timeout: Duration,
) -> Result<usize> {
    trace!(
        "control out {:?} wValue={:#06x} wIndex={:#06x} len={}",
        request.code,
        request.value(),
        request.index(),
        data.len()
    );
    tokio::time::timeout(timeout, channel.control_out(request, data, timeout))
        .await
        .map_err(|_| ControlError::io_fault(format!("{:?} timed out", request.code)))?
}
