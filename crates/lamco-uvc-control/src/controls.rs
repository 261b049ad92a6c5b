//! Scalar processing-unit controls
//!
//! Only brightness is wired up. Values travel as 16-bit little-endian
//! signed integers and every exchange must move exactly two bytes.

use tracing::debug;

use crate::channel::{self, ControlChannel, ControlRequest, RequestCode};
use crate::config::ControlConfig;
use crate::error::{ControlError, Result};

/// Processing-unit control selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingControl {
    /// PU_BRIGHTNESS_CONTROL
    Brightness,
}

impl ProcessingControl {
    /// Control selector
    pub fn selector(self) -> u8 {
        match self {
            Self::Brightness => 0x02,
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Brightness => "Brightness",
        }
    }
}

/// Range reported by GET_MIN / GET_MAX / GET_RES / GET_DEF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRange {
    /// Minimum value
    pub minimum: i16,
    /// Maximum value
    pub maximum: i16,
    /// Step size
    pub step: i16,
    /// Default value
    pub default: i16,
}

impl ControlRange {
    /// Whether `value` is within the reported bounds
    pub fn contains(&self, value: i16) -> bool {
        (self.minimum..=self.maximum).contains(&value)
    }
}

/// Reads and writes processing-unit controls
pub struct Controls<'a, C> {
    channel: &'a C,
    config: &'a ControlConfig,
}

impl<'a, C: ControlChannel> Controls<'a, C> {
    /// Create a controls handle over `channel`
    pub fn new(channel: &'a C, config: &'a ControlConfig) -> Self {
        Self { channel, config }
    }

    fn request(&self, code: RequestCode, control: ProcessingControl) -> ControlRequest {
        ControlRequest::new(
            code,
            control.selector(),
            self.config.processing_unit_id,
            self.config.control_interface,
        )
    }

    async fn read_value(&self, code: RequestCode, control: ProcessingControl) -> Result<i16> {
        let mut data = [0u8; 2];
        let request = self.request(code, control);
        let read =
            channel::read(self.channel, request, &mut data, self.config.request_timeout()).await?;
        if read != data.len() {
            return Err(ControlError::io_fault(format!(
                "{} {:?} moved {} bytes, expected 2",
                control.name(),
                code,
                read
            )));
        }
        Ok(i16::from_le_bytes(data))
    }

    /// Query the control's range and default
    pub async fn query(&self, control: ProcessingControl) -> Result<ControlRange> {
        let range = ControlRange {
            minimum: self.read_value(RequestCode::GetMin, control).await?,
            maximum: self.read_value(RequestCode::GetMax, control).await?,
            step: self.read_value(RequestCode::GetRes, control).await?,
            default: self.read_value(RequestCode::GetDef, control).await?,
        };
        debug!("{} range: {:?}", control.name(), range);
        Ok(range)
    }

    /// Current value
    pub async fn get(&self, control: ProcessingControl) -> Result<i16> {
        self.read_value(RequestCode::GetCur, control).await
    }

    /// Set the current value
    pub async fn set(&self, control: ProcessingControl, value: i16) -> Result<()> {
        let data = value.to_le_bytes();
        let request = self.request(RequestCode::SetCur, control);
        let written =
            channel::write(self.channel, request, &data, self.config.request_timeout()).await?;
        if written != data.len() {
            return Err(ControlError::io_fault(format!(
                "{} SET_CUR moved {} bytes, expected 2",
                control.name(),
                written
            )));
        }
        debug!("{} set to {}", control.name(), value);
        Ok(())
    }
}
