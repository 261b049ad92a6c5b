//! Probe/commit negotiation
//!
//! ```text
//! host                                device
//!  │  SET_CUR  VS_PROBE_CONTROL  ──────►  │   proposal
//!  │  GET_CUR  VS_PROBE_CONTROL  ◄──────  │   device's answer
//!  │  SET_CUR  VS_COMMIT_CONTROL ──────►  │   answer committed
//! ```

use tracing::{debug, info};

use crate::channel::{self, ControlChannel, ControlRequest, RequestCode};
use crate::config::ControlConfig;
use crate::error::{ControlError, Result};
use crate::probe::{NegotiatedParams, StreamingControl};

/// VS_PROBE_CONTROL selector
pub const VS_PROBE_CONTROL: u8 = 0x01;
/// VS_COMMIT_CONTROL selector
pub const VS_COMMIT_CONTROL: u8 = 0x02;

/// What the host asks the device to stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Format descriptor index (1-based)
    pub format_index: u8,
    /// Frame descriptor index (1-based)
    pub frame_index: u8,
    /// Frame interval in 100 ns units
    pub frame_interval: u32,
    /// wMaxPacketSize of the streaming endpoint in the chosen alt setting
    pub max_packet_size: u16,
}

/// Runs probe/commit exchanges on the streaming interface
pub struct Negotiator<'a, C> {
    channel: &'a C,
    config: &'a ControlConfig,
}

impl<'a, C: ControlChannel> Negotiator<'a, C> {
    /// Create a negotiator over `channel`
    pub fn new(channel: &'a C, config: &'a ControlConfig) -> Self {
        Self { channel, config }
    }

    fn request(&self, code: RequestCode, selector: u8) -> ControlRequest {
        ControlRequest::new(code, selector, 0, self.config.streaming_interface)
    }

    async fn set(&self, selector: u8, control: &StreamingControl) -> Result<()> {
        let data = control.encode(self.config.version());
        let request = self.request(RequestCode::SetCur, selector);
        let written =
            channel::write(self.channel, request, &data, self.config.request_timeout()).await?;
        if written != data.len() {
            return Err(ControlError::ShortTransfer {
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }

    async fn get(&self, selector: u8) -> Result<StreamingControl> {
        let version = self.config.version();
        let mut data = vec![0u8; version.record_len()];
        let request = self.request(RequestCode::GetCur, selector);
        let read =
            channel::read(self.channel, request, &mut data, self.config.request_timeout()).await?;
        StreamingControl::decode(&data[..read.min(data.len())], version)
    }

    /// Propose `control` and return the device's answer
    pub async fn probe(&self, control: &StreamingControl) -> Result<StreamingControl> {
        self.set(VS_PROBE_CONTROL, control).await?;
        self.get(VS_PROBE_CONTROL).await
    }

    /// Commit a record previously returned by [`probe`](Self::probe)
    pub async fn commit(&self, control: &StreamingControl) -> Result<()> {
        self.set(VS_COMMIT_CONTROL, control).await
    }

    /// Full probe, read back, commit sequence
    pub async fn negotiate(&self, request: &ProbeRequest) -> Result<NegotiatedParams> {
        info!(
            "Negotiating format {} frame {} interval {} (UVC {})",
            request.format_index,
            request.frame_index,
            request.frame_interval,
            self.config.version()
        );

        let proposal = StreamingControl::probe(
            request.format_index,
            request.frame_index,
            request.frame_interval,
        );
        let answer = self.probe(&proposal).await?;

        debug!(
            "Device answered: frame {} interval {} ({:.1} fps) max frame {} max payload {}",
            answer.frame_index,
            answer.frame_interval,
            answer.fps(),
            answer.max_video_frame_size,
            answer.max_payload_transfer_size
        );

        if answer.max_video_frame_size == 0 {
            return Err(ControlError::io_fault("device reported a zero max frame size"));
        }

        self.commit(&answer).await?;

        let params = NegotiatedParams::from_committed(&answer, request.max_packet_size);
        debug!("Committed parameters: {:?}", params);
        Ok(params)
    }
}
