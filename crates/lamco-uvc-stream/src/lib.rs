//! # lamco-uvc-stream
//!
//! Isochronous data path for USB video-class cameras: turns completed
//! transfers of fixed-size payload packets into MJPEG frames in a
//! [`lamco_videobuf::VideoQueue`].
//!
//! This crate is part of the [lamco-uvc](https://github.com/lamco-admin/lamco-uvc)
//! workspace. It drives [`lamco-uvc-control`](https://crates.io/crates/lamco-uvc-control)
//! for negotiation and fills buffers owned by
//! [`lamco-videobuf`](https://crates.io/crates/lamco-videobuf).
//!
//! # Features
//!
//! - **Frame reassembly**: FID toggles, EOF markers and full buffers end a frame
//! - **Vendor quirks**: ip2970/ip2977 frame detection and JPEG marker repair
//! - **Transfer scheduling**: a fixed set of transfers kept in flight
//! - **Fatal path**: a failed resubmission fails every waiting buffer and wakes the consumer
//! - **Completion pump**: tokio task for channel-based transports
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lamco_uvc_stream::{spawn_completion_pump, StreamConfig, StreamManager};
//! use lamco_uvc_control::ControlConfig;
//!
//! # async fn example(transport: Arc<MyTransport>, channel: Arc<MyChannel>) -> lamco_uvc_stream::Result<()> {
//! let manager = Arc::new(StreamManager::new(
//!     StreamConfig::default(),
//!     ControlConfig::default(),
//!     transport.clone(),
//!     channel,
//! )?);
//!
//! let count = manager.allocate_buffers()?;
//! let queue = manager.queue();
//! for index in 0..count {
//!     queue.queue_buffer(index)?;
//! }
//!
//! manager.start().await?;
//! let pump = spawn_completion_pump(manager.clone(), transport.completions());
//!
//! loop {
//!     let frame = queue.dequeue().await?;
//!     // frame.bytes_used bytes of MJPEG in slot frame.index
//!     queue.queue_buffer(frame.index)?;
//! }
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  IsoTransfer   ┌─────────────────────────────────────┐
//! │ UsbTransport │ ─────────────► │ StreamManager::complete_transfer    │
//! └──────────────┘                │   ReassemblyEngine                  │
//!        ▲                        │     PayloadHeader ─► FrameQuirk     │
//!        │   resubmit             │     └─► VideoQueue producer         │
//!        └─────────────────────── │   TransferScheduler::resubmit       │
//!                                 └─────────────────────────────────────┘
//! ```
//!
//! The transport owns the USB host stack. Its completions must reach
//! [`StreamManager::complete_transfer`] either directly from its callback
//! or through [`spawn_completion_pump`].

#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod format;
mod manager;
mod payload;
mod quirk;
mod reassembly;
mod transfer;

pub use config::{StreamConfig, StreamConfigBuilder};
pub use error::{PacketError, Result, StreamError};
pub use format::{fourcc, FormatSelector, VideoFormat, FOURCC_MJPEG, FRAME_SIZES};
pub use manager::{spawn_completion_pump, StreamManager, StreamState};
pub use payload::{
    PayloadHeader, HEADER_EOF, HEADER_EOH, HEADER_ERR, HEADER_FID, HEADER_PTS, HEADER_RES,
    HEADER_SCR, HEADER_STI,
};
pub use quirk::{quirk_for_vendor, FrameQuirk, Ip2970Quirk, StandardFraming, IP2970_VENDOR_ID};
pub use reassembly::{ReassemblyEngine, ReassemblyStats};
pub use transfer::{
    IsoPacket, IsoTransfer, PacketStatus, TransferLayout, TransferScheduler, TransferStatus,
    UsbTransport, DEFAULT_TRANSFER_COUNT, MAX_PACKETS_PER_TRANSFER,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
