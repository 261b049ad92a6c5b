//! Capture format selection
//!
//! The data path only carries compressed MJPEG. The frame size is chosen
//! once in [`StreamConfig`](crate::StreamConfig); format requests are
//! snapped to it.

use tracing::debug;

use crate::error::{Result, StreamError};

/// Build a little-endian fourcc code
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// Motion-JPEG pixel format
pub const FOURCC_MJPEG: u32 = fourcc(b"MJPG");

/// Frame sizes offered by the device, in descriptor order
pub const FRAME_SIZES: [(u32, u32); 3] = [(640, 480), (320, 240), (160, 120)];

/// A capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    /// Pixel format fourcc
    pub fourcc: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Zero for compressed formats
    pub bytes_per_line: u32,
    /// Largest frame in bytes
    pub size_image: u32,
}

impl VideoFormat {
    /// MJPEG at the given size
    pub fn mjpeg(width: u32, height: u32) -> Self {
        Self {
            fourcc: FOURCC_MJPEG,
            width,
            height,
            bytes_per_line: 0,
            size_image: 0,
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.fourcc.to_le_bytes();
        write!(
            f,
            "{}{}{}{} {}x{} ({} bytes)",
            char::from(code[0]),
            char::from(code[1]),
            char::from(code[2]),
            char::from(code[3]),
            self.width,
            self.height,
            self.size_image
        )
    }
}

/// Tracks the current format of a stream
#[derive(Debug, Clone)]
pub struct FormatSelector {
    frame_index: usize,
    max_frame_size: u32,
    current: VideoFormat,
}

impl FormatSelector {
    /// Selector fixed to `FRAME_SIZES[frame_index]`
    pub fn new(frame_index: usize, max_frame_size: u32) -> Result<Self> {
        let &(width, height) = FRAME_SIZES.get(frame_index).ok_or_else(|| {
            StreamError::InvalidParameter(format!("frame index {frame_index} out of range"))
        })?;

        let current = VideoFormat {
            size_image: max_frame_size,
            ..VideoFormat::mjpeg(width, height)
        };
        Ok(Self {
            frame_index,
            max_frame_size,
            current,
        })
    }

    /// Adjust `requested` to what the device will deliver
    pub fn try_format(&self, requested: &VideoFormat) -> Result<VideoFormat> {
        if requested.fourcc != FOURCC_MJPEG {
            return Err(StreamError::UnsupportedFormat);
        }

        let (width, height) = FRAME_SIZES[self.frame_index];
        Ok(VideoFormat {
            fourcc: FOURCC_MJPEG,
            width,
            height,
            bytes_per_line: 0,
            size_image: self.max_frame_size,
        })
    }

    /// Adjust and store `requested`
    pub fn set_format(&mut self, requested: &VideoFormat) -> Result<VideoFormat> {
        let format = self.try_format(requested)?;
        debug!("Format set to {}", format);
        self.current = format;
        Ok(format)
    }

    /// Current format
    pub fn current(&self) -> VideoFormat {
        self.current
    }

    /// 1-based frame index used in probe requests
    pub fn descriptor_frame_index(&self) -> u8 {
        (self.frame_index + 1) as u8
    }
}
