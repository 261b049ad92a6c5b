//! # lamco-uvc
//!
//! USB video-class capture data path for Rust: isochronous frame
//! reassembly, a zero-copy frame buffer pool, and probe/commit negotiation.
//!
//! This crate provides a unified interface to the lamco UVC libraries:
//!
//! - **[`control`]** - Probe/commit negotiation and processing-unit controls
//! - **[`videobuf`]** - mmap-backed buffer pool with ordered capture/ready queues
//! - **[`stream`]** - Payload reassembly, vendor quirks, transfer scheduling
//!
//! # Features
//!
//! All features are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! lamco-uvc = "0.1"
//!
//! # Buffer queues only
//! lamco-uvc = { version = "0.1", default-features = false, features = ["videobuf"] }
//!
//! # Control plane only
//! lamco-uvc = { version = "0.1", default-features = false, features = ["control"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `control` | Yes | Negotiation and camera controls |
//! | `videobuf` | Yes | Frame buffer pool and queues |
//! | `stream` | Yes | Reassembly and stream management (implies both above) |
//! | `full` | No | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lamco_uvc::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Transport and channel wrap the USB host library of your choice
//!     let (transport, channel) = open_camera()?;
//!
//!     let manager = Arc::new(StreamManager::new(
//!         StreamConfig::default(),
//!         ControlConfig::default(),
//!         transport,
//!         channel,
//!     )?);
//!
//!     let queue = manager.queue();
//!     for index in 0..manager.allocate_buffers()? {
//!         queue.queue_buffer(index)?;
//!     }
//!     manager.start().await?;
//!
//!     let frame = queue.dequeue().await?;
//!     println!("{} bytes of MJPEG", frame.bytes_used);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          lamco-uvc                              │
//! ├─────────────────────┬─────────────────────┬─────────────────────┤
//! │  lamco-uvc-control  │  lamco-uvc-stream   │   lamco-videobuf    │
//! │                     │                     │                     │
//! │  Negotiator         │  StreamManager      │  VideoQueue         │
//! │  Controls           │  ReassemblyEngine   │  MappedRegion       │
//! │  StreamingControl   │  TransferScheduler  │  PoolArena          │
//! └──────────┬──────────┴──────────┬──────────┴──────────┬──────────┘
//!            │                     │                     │
//!            ▼                     ▼                     ▼
//!     ControlChannel          UsbTransport          anonymous mmap
//! ```
//!
//! # Platform Support
//!
//! - **Linux and other Unix systems** - the buffer pool uses `mmap`
//! - **Any USB host library** - through the `UsbTransport` and `ControlChannel` traits
//!
//! # Related Crates
//!
//! You can also use the individual crates directly:
//!
//! - [`lamco-uvc-control`](https://crates.io/crates/lamco-uvc-control) - Control plane only
//! - [`lamco-videobuf`](https://crates.io/crates/lamco-videobuf) - Buffer queues only
//! - [`lamco-uvc-stream`](https://crates.io/crates/lamco-uvc-stream) - Data path

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Probe/commit negotiation and scalar camera controls.
///
/// This module provides:
/// - The 26/34-byte streaming control record
/// - SET_CUR/GET_CUR probe and commit sequencing
/// - Brightness range, get and set
///
/// See [`lamco_uvc_control`] documentation for details.
#[cfg(feature = "control")]
#[cfg_attr(docsrs, doc(cfg(feature = "control")))]
pub use lamco_uvc_control as control;

/// Zero-copy frame buffer pool.
///
/// See [`lamco_videobuf`] documentation for details.
#[cfg(feature = "videobuf")]
#[cfg_attr(docsrs, doc(cfg(feature = "videobuf")))]
pub use lamco_videobuf as videobuf;

/// Isochronous reassembly and stream management.
///
/// This module provides:
/// - Payload header parsing and frame boundary detection
/// - ip2970 frame-start detection and JPEG marker repair
/// - Transfer scheduling and the completion path
///
/// See [`lamco_uvc_stream`] documentation for details.
#[cfg(feature = "stream")]
#[cfg_attr(docsrs, doc(cfg(feature = "stream")))]
pub use lamco_uvc_stream as stream;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use lamco_uvc::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "control")]
    pub use lamco_uvc_control::{ControlChannel, ControlConfig, ControlError, NegotiatedParams};

    #[cfg(feature = "videobuf")]
    pub use lamco_videobuf::{BufferError, BufferState, DequeuedBuffer, MappedRegion, VideoQueue};

    #[cfg(feature = "stream")]
    pub use lamco_uvc_stream::{
        IsoTransfer, StreamConfig, StreamError, StreamManager, StreamState, UsbTransport,
    };
}
