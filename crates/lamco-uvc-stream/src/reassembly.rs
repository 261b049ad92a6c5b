//! Isochronous reassembly engine
//!
//! Turns the packets of completed transfers into frames in the capture
//! queue. Frame boundaries come from the FID toggle (or the vendor quirk's
//! synthetic FID) and from the EOF bit; a full buffer also ends a frame and
//! the excess is dropped.
//!
//! The engine is built fresh for every streaming session so the FID history
//! and the quirk's scratch state never leak across sessions.

use lamco_videobuf::{BufferState, Completion, Producer, VideoQueue};
use tracing::trace;

use crate::error::PacketError;
use crate::payload::PayloadHeader;
use crate::quirk::{quirk_for_vendor, FrameQuirk};
use crate::transfer::{IsoTransfer, PacketStatus};

/// Counters kept by the engine for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Packets examined
    pub packets: u64,
    /// Packets the host controller reported lost
    pub lost: u64,
    /// Packets with an unusable header
    pub malformed: u64,
    /// Packets with the device error bit set
    pub error_flagged: u64,
    /// Payloads dropped for lack of a buffer or while waiting for a frame edge
    pub discarded: u64,
    /// Payload bytes copied into buffers
    pub bytes_copied: u64,
    /// Buffers completed
    pub frames_completed: u64,
    /// Payloads rewritten by the vendor quirk
    pub quirk_repairs: u64,
}

/// Per-session reassembly state
pub struct ReassemblyEngine {
    quirk: Box<dyn FrameQuirk>,
    last_fid: Option<bool>,
    stats: ReassemblyStats,
}

impl ReassemblyEngine {
    /// Create an engine using `quirk` for frame boundaries
    pub fn new(quirk: Box<dyn FrameQuirk>) -> Self {
        Self {
            quirk,
            last_fid: None,
            stats: ReassemblyStats::default(),
        }
    }

    /// Create an engine with the strategy registered for `vendor_id`
    pub fn for_vendor(vendor_id: Option<u16>) -> Self {
        Self::new(quirk_for_vendor(vendor_id))
    }

    /// Name of the framing strategy
    pub fn quirk_name(&self) -> &'static str {
        self.quirk.name()
    }

    /// Forget the FID history and counters
    pub fn reset(&mut self) {
        self.last_fid = None;
        self.stats = ReassemblyStats::default();
    }

    /// FID of the last accepted packet
    pub fn last_fid(&self) -> Option<bool> {
        self.last_fid
    }

    /// Counters so far
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Apply every packet of `transfer` to the capture queue in order
    ///
    /// Holds the queue lock once for the whole transfer. Returns the number
    /// of buffers completed.
    pub fn process_transfer(&mut self, transfer: &IsoTransfer, queue: &VideoQueue) -> usize {
        let mut producer = queue.producer();
        let mut completed = 0;

        for (index, packet) in transfer.packets().iter().enumerate() {
            self.stats.packets += 1;

            if packet.status == PacketStatus::Lost {
                self.stats.lost += 1;
                trace!("Packet {} of transfer {}: {}", index, transfer.id(), PacketError::Lost);
                continue;
            }

            let Some(data) = transfer.packet_data(index) else {
                continue;
            };
            completed += self.process_packet(data, &mut producer);
        }

        completed
    }

    /// Apply one packet's bytes (header included) to the capture queue
    ///
    /// Returns the number of buffers completed.
    pub fn process_packet(&mut self, packet: &[u8], producer: &mut Producer<'_>) -> usize {
        let header = match PayloadHeader::parse(packet) {
            Ok(header) => header,
            Err(e) => {
                if e == PacketError::DeviceError {
                    self.stats.error_flagged += 1;
                } else {
                    self.stats.malformed += 1;
                }
                trace!("Dropping packet: {}", e);
                return 0;
            }
        };

        let fid = self.quirk.frame_id(packet, &header, self.last_fid);
        let payload = &packet[header.len()..];
        let mut completed = 0;

        loop {
            let Some(state) = producer.head_state() else {
                self.last_fid = Some(fid);
                self.stats.discarded += 1;
                trace!("No buffer queued, dropping {} payload bytes", payload.len());
                return completed;
            };

            let edge = self.last_fid != Some(fid);

            if state != BufferState::Active {
                if !edge {
                    self.stats.discarded += 1;
                    trace!("Waiting for frame start, dropping {} bytes", payload.len());
                    return completed;
                }
                producer.activate_head();
            }

            let filled = producer.head_frame().map_or(0, |frame| frame.filled());
            if edge && filled != 0 {
                self.complete(producer);
                completed += 1;
                continue;
            }

            break;
        }

        let Some(mut frame) = producer.head_frame() else {
            return completed;
        };

        let start = frame.filled();
        let remaining = frame.remaining();
        let copied = frame.append(payload);
        self.last_fid = Some(fid);

        if copied > 0 {
            let repaired = self.quirk.repair(frame.tail_mut(start), copied);
            if repaired != copied {
                frame.set_filled(start + repaired);
                self.stats.quirk_repairs += 1;
            }
        }

        let filled = frame.filled();
        self.stats.bytes_copied += (filled - start) as u64;

        if payload.len() > remaining {
            trace!(
                "Frame full, discarding {} bytes",
                payload.len() - remaining
            );
            self.complete(producer);
            completed += 1;
        } else if header.eof() && filled != 0 {
            self.complete(producer);
            completed += 1;
        }

        completed
    }

    fn complete(&mut self, producer: &mut Producer<'_>) {
        if producer.complete_head(Completion::Done).is_some() {
            self.stats.frames_completed += 1;
        }
    }
}

impl std::fmt::Debug for ReassemblyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReassemblyEngine")
            .field("quirk", &self.quirk.name())
            .field("last_fid", &self.last_fid)
            .field("stats", &self.stats)
            .finish()
    }
}
