//! # lamco-uvc-control
//!
//! Control plane for USB video-class cameras: probe/commit negotiation of
//! the streaming parameters and scalar processing-unit controls.
//!
//! This crate is part of the [lamco-uvc](https://github.com/lamco-admin/lamco-uvc)
//! workspace. It does not own a USB stack; implement [`ControlChannel`] on
//! top of the host library you use and hand it in.
//!
//! # Features
//!
//! - **Probe/commit codec**: 26-byte (UVC 1.0) and 34-byte (UVC 1.1+) records
//! - **Negotiation**: SET_CUR probe, GET_CUR probe, SET_CUR commit
//! - **Brightness**: range query, get and set on the processing unit
//! - **Timeouts**: every request is bounded by the configured timeout
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lamco_uvc_control::{ControlConfig, Negotiator, ProbeRequest};
//!
//! # async fn example(channel: impl lamco_uvc_control::ControlChannel) -> lamco_uvc_control::Result<()> {
//! let config = ControlConfig::default();
//! let params = Negotiator::new(&channel, &config)
//!     .negotiate(&ProbeRequest {
//!         format_index: 1,
//!         frame_index: 2,
//!         frame_interval: 333_333,
//!         max_packet_size: 800,
//!     })
//!     .await?;
//!
//! println!("max frame {} bytes", params.max_frame_size);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Every failed or wrongly sized exchange surfaces as a [`ControlError`].
//! A record shorter than the protocol version requires is reported as
//! [`ControlError::ShortTransfer`].

#![cfg_attr(docsrs, feature(doc_cfg))]

mod channel;
mod config;
mod controls;
mod error;
mod negotiate;
mod probe;

pub use channel::{
    ControlChannel, ControlRequest, RequestCode, REQUEST_TYPE_IN, REQUEST_TYPE_OUT,
};
pub use config::{ControlConfig, ControlConfigBuilder};
pub use controls::{ControlRange, Controls, ProcessingControl};
pub use error::{ControlError, Result};
pub use negotiate::{Negotiator, ProbeRequest, VS_COMMIT_CONTROL, VS_PROBE_CONTROL};
pub use probe::{
    NegotiatedParams, ProtocolVersion, StreamingControl, HINT_FRAME_INTERVAL, RECORD_LEN_V10,
    RECORD_LEN_V11,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_request_codes_match_direction() {
        assert!(RequestCode::GetCur.is_in());
        assert!(!RequestCode::SetCur.is_in());
        assert_eq!(REQUEST_TYPE_IN, 0xA1);
        assert_eq!(REQUEST_TYPE_OUT, 0x21);
    }
}
