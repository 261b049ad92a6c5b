//! Isochronous transfers and their scheduling
//!
//! A fixed number of transfers stay in flight while streaming. Each one
//! carries up to 32 packets of the endpoint's max packet size, enough to
//! hold one maximum-size frame when the device fills every packet.
//!
//! ```text
//!  TransferScheduler::start ──► submit T0..T4 ──► UsbTransport
//!                                                     │ completion
//!  StreamManager::complete_transfer ◄─────────────────┘
//!          │ reassemble packets
//!          └──► TransferScheduler::resubmit ──► UsbTransport
//! ```

use lamco_uvc_control::NegotiatedParams;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};

/// Default number of transfers kept in flight
pub const DEFAULT_TRANSFER_COUNT: usize = 5;

/// Default packet cap per transfer
pub const MAX_PACKETS_PER_TRANSFER: usize = 32;

/// Packet count and size of every transfer in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLayout {
    /// Packets per transfer
    pub packets: usize,
    /// Bytes reserved per packet
    pub packet_size: usize,
}

impl TransferLayout {
    /// `min(ceil(max_frame_size / max_packet_size), max_packets)` packets
    pub fn from_params(params: &NegotiatedParams, max_packets: usize) -> Result<Self> {
        let packet_size = usize::from(params.max_packet_size);
        if packet_size == 0 {
            return Err(StreamError::InvalidParameter(
                "endpoint max packet size is zero".to_string(),
            ));
        }
        if max_packets == 0 {
            return Err(StreamError::InvalidParameter(
                "max packets per transfer is zero".to_string(),
            ));
        }

        let frame_size = params.max_frame_size as usize;
        let packets = frame_size.div_ceil(packet_size).clamp(1, max_packets);
        Ok(Self {
            packets,
            packet_size,
        })
    }

    /// Size of the transfer buffer
    pub fn buffer_len(&self) -> usize {
        self.packets * self.packet_size
    }
}

/// Completion status of one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// Data arrived
    Completed,
    /// The host controller lost the packet (CRC, overrun, missed slot)
    Lost,
}

/// Packet descriptor inside a transfer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoPacket {
    /// Offset into the transfer buffer
    pub offset: usize,
    /// Bytes reserved
    pub length: usize,
    /// Bytes received
    pub actual_length: usize,
    /// Packet status
    pub status: PacketStatus,
}

/// Completion status of a whole transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Packets are ready to process
    Completed,
    /// Cancelled by [`UsbTransport::cancel_all`]
    Cancelled,
    /// The device or host controller went away
    Shutdown,
    /// Any other transfer-level failure
    Error(String),
}

/// One isochronous IN transfer and its buffer
#[derive(Debug, Clone)]
pub struct IsoTransfer {
    id: usize,
    endpoint: u8,
    interval: u8,
    buffer: Vec<u8>,
    packets: Vec<IsoPacket>,
    status: TransferStatus,
}

impl IsoTransfer {
    /// Allocate a transfer shaped by `layout`
    pub fn new(id: usize, layout: TransferLayout, endpoint: u8, interval: u8) -> Self {
        let packets = (0..layout.packets)
            .map(|i| IsoPacket {
                offset: i * layout.packet_size,
                length: layout.packet_size,
                actual_length: 0,
                status: PacketStatus::Completed,
            })
            .collect();

        Self {
            id,
            endpoint,
            interval,
            buffer: vec![0u8; layout.buffer_len()],
            packets,
            status: TransferStatus::Completed,
        }
    }

    /// Slot number within the session
    pub fn id(&self) -> usize {
        self.id
    }

    /// Endpoint address
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// Polling interval
    pub fn interval(&self) -> u8 {
        self.interval
    }

    /// Packet descriptors
    pub fn packets(&self) -> &[IsoPacket] {
        &self.packets
    }

    /// Transfer buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Transfer buffer and packet descriptors, for transports filling them in place
    pub fn parts_mut(&mut self) -> (&mut [u8], &mut [IsoPacket]) {
        (&mut self.buffer, &mut self.packets)
    }

    /// Transfer status
    pub fn status(&self) -> &TransferStatus {
        &self.status
    }

    /// Set the transfer status
    pub fn set_status(&mut self, status: TransferStatus) {
        self.status = status;
    }

    /// Bytes received by packet `index`, bounded by its reservation
    pub fn packet_data(&self, index: usize) -> Option<&[u8]> {
        let packet = self.packets.get(index)?;
        let len = packet.actual_length.min(packet.length);
        self.buffer.get(packet.offset..packet.offset + len)
    }

    /// Store received bytes for packet `index`
    ///
    /// Data beyond the packet's reservation is dropped. Returns the bytes
    /// stored.
    pub fn fill_packet(&mut self, index: usize, data: &[u8], status: PacketStatus) -> usize {
        let Some(packet) = self.packets.get_mut(index) else {
            return 0;
        };
        let len = data.len().min(packet.length);
        self.buffer[packet.offset..packet.offset + len].copy_from_slice(&data[..len]);
        packet.actual_length = len;
        packet.status = status;
        len
    }

    /// Clear completion results before resubmission
    pub fn rearm(&mut self) {
        self.status = TransferStatus::Completed;
        for packet in &mut self.packets {
            packet.actual_length = 0;
            packet.status = PacketStatus::Completed;
        }
    }
}

/// The USB host stack as seen by the data path
///
/// `submit` must not block: it is called from the completion path to keep
/// the pipe fed. Completed transfers come back through
/// [`StreamManager::complete_transfer`](crate::StreamManager::complete_transfer).
pub trait UsbTransport: Send + Sync {
    /// Select an alternate setting of an interface (0 stops bandwidth use)
    fn set_interface(&self, interface: u8, alt_setting: u8) -> Result<()>;

    /// Queue a transfer with the host controller
    fn submit(&self, transfer: IsoTransfer) -> Result<()>;

    /// Cancel every outstanding transfer
    ///
    /// Cancelled transfers may still complete with
    /// [`TransferStatus::Cancelled`]; they are dropped. Called with the
    /// scheduler locked, so it must not deliver other completions inline.
    fn cancel_all(&self) -> Result<()>;
}

/// Keeps the configured number of transfers in flight
#[derive(Debug)]
pub struct TransferScheduler {
    count: usize,
    endpoint: u8,
    interval: u8,
    layout: Option<TransferLayout>,
}

impl TransferScheduler {
    /// Create a scheduler for `count` transfers on `endpoint`
    pub fn new(count: usize, endpoint: u8, interval: u8) -> Self {
        Self {
            count,
            endpoint,
            interval,
            layout: None,
        }
    }

    /// Layout of the running session
    pub fn layout(&self) -> Option<TransferLayout> {
        self.layout
    }

    /// Whether transfers are in flight
    pub fn is_running(&self) -> bool {
        self.layout.is_some()
    }

    /// Allocate, arm and submit every transfer
    ///
    /// If any submission fails the already submitted ones are cancelled and
    /// the error is returned.
    pub fn start<T: UsbTransport + ?Sized>(
        &mut self,
        transport: &T,
        layout: TransferLayout,
    ) -> Result<()> {
        if self.layout.is_some() {
            return Err(StreamError::invalid_state("transfers already running"));
        }

        for id in 0..self.count {
            let transfer = IsoTransfer::new(id, layout, self.endpoint, self.interval);
            if let Err(e) = transport.submit(transfer) {
                warn!("Failed to submit transfer {}: {}", id, e);
                if let Err(cancel) = transport.cancel_all() {
                    warn!("Rollback cancel failed: {}", cancel);
                }
                return Err(e);
            }
        }

        info!(
            "Submitted {} transfers of {} x {} bytes on endpoint {:#04x}",
            self.count, layout.packets, layout.packet_size, self.endpoint
        );
        self.layout = Some(layout);
        Ok(())
    }

    /// Put a completed transfer back in flight
    ///
    /// Returns `false` without submitting when the scheduler has been
    /// stopped; the transfer is retired. Failure to submit leaves the pipe
    /// short of a transfer and is fatal.
    pub fn resubmit<T: UsbTransport + ?Sized>(
        &self,
        transport: &T,
        mut transfer: IsoTransfer,
    ) -> Result<bool> {
        if self.layout.is_none() {
            debug!("Retiring transfer {} after stop", transfer.id());
            return Ok(false);
        }

        transfer.rearm();
        let id = transfer.id();
        transport.submit(transfer).map_err(|e| {
            StreamError::StreamFatal(format!("failed to resubmit transfer {id}: {e}"))
        })?;
        Ok(true)
    }

    /// Cancel everything in flight
    pub fn stop<T: UsbTransport + ?Sized>(&mut self, transport: &T) -> Result<()> {
        if self.layout.take().is_none() {
            return Ok(());
        }
        debug!("Cancelling outstanding transfers");
        transport.cancel_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn params(max_frame_size: u32, max_packet_size: u16) -> NegotiatedParams {
        NegotiatedParams {
            max_frame_size,
            max_payload_transfer_size: u32::from(max_packet_size),
            max_packet_size,
            frame_interval: 333_333,
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        submitted: Mutex<Vec<IsoTransfer>>,
        cancels: Mutex<usize>,
        fail_after: Option<usize>,
    }

    impl UsbTransport for RecordingTransport {
        fn set_interface(&self, _interface: u8, _alt_setting: u8) -> Result<()> {
            Ok(())
        }

        fn submit(&self, transfer: IsoTransfer) -> Result<()> {
            let mut submitted = self.submitted.lock();
            if self.fail_after == Some(submitted.len()) {
                return Err(StreamError::transport("ENOSPC"));
            }
            submitted.push(transfer);
            Ok(())
        }

        fn cancel_all(&self) -> Result<()> {
            *self.cancels.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_layout_rounds_up_and_caps() {
        let layout = TransferLayout::from_params(&params(77_312, 800), 32).unwrap();
        assert_eq!(layout.packets, 32);
        assert_eq!(layout.packet_size, 800);
        assert_eq!(layout.buffer_len(), 25_600);

        let layout = TransferLayout::from_params(&params(8001, 800), 32).unwrap();
        assert_eq!(layout.packets, 11);

        let layout = TransferLayout::from_params(&params(800, 800), 32).unwrap();
        assert_eq!(layout.packets, 1);
    }

    #[test]
    fn test_layout_rejects_zero_packet_size() {
        assert!(TransferLayout::from_params(&params(1000, 0), 32).is_err());
        assert!(TransferLayout::from_params(&params(1000, 800), 0).is_err());
    }

    #[test]
    fn test_transfer_packets() {
        let layout = TransferLayout {
            packets: 3,
            packet_size: 4,
        };
        let mut transfer = IsoTransfer::new(0, layout, 0x82, 1);
        assert_eq!(transfer.packets()[2].offset, 8);

        assert_eq!(transfer.fill_packet(1, &[1, 2, 3, 4, 5, 6], PacketStatus::Completed), 4);
        assert_eq!(transfer.packet_data(1), Some(&[1, 2, 3, 4][..]));
        assert_eq!(transfer.packet_data(0), Some(&[][..]));
        assert_eq!(transfer.packet_data(3), None);
        assert_eq!(transfer.fill_packet(9, &[1], PacketStatus::Completed), 0);

        transfer.set_status(TransferStatus::Error("EPROTO".into()));
        transfer.rearm();
        assert_eq!(transfer.status(), &TransferStatus::Completed);
        assert_eq!(transfer.packets()[1].actual_length, 0);
    }

    #[test]
    fn test_scheduler_submits_all() {
        let transport = RecordingTransport::default();
        let mut scheduler = TransferScheduler::new(DEFAULT_TRANSFER_COUNT, 0x82, 1);
        let layout = TransferLayout::from_params(&params(77_312, 800), 32).unwrap();

        scheduler.start(&transport, layout).unwrap();
        assert!(scheduler.is_running());

        let submitted = transport.submitted.lock();
        assert_eq!(submitted.len(), 5);
        assert!(submitted.iter().all(|t| t.packets().len() == 32 && t.endpoint() == 0x82));
        assert_eq!(
            submitted.iter().map(IsoTransfer::id).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_scheduler_rolls_back_on_submit_failure() {
        let transport = RecordingTransport {
            fail_after: Some(2),
            ..Default::default()
        };
        let mut scheduler = TransferScheduler::new(5, 0x82, 1);
        let layout = TransferLayout::from_params(&params(77_312, 800), 32).unwrap();

        assert!(scheduler.start(&transport, layout).is_err());
        assert!(!scheduler.is_running());
        assert_eq!(*transport.cancels.lock(), 1);
    }

    #[test]
    fn test_resubmit_failure_is_fatal() {
        let transport = RecordingTransport {
            fail_after: Some(2),
            ..Default::default()
        };
        let mut scheduler = TransferScheduler::new(2, 0x82, 1);
        let layout = TransferLayout {
            packets: 1,
            packet_size: 8,
        };
        scheduler.start(&transport, layout).unwrap();

        let err = scheduler
            .resubmit(&transport, IsoTransfer::new(1, layout, 0x82, 1))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resubmit_after_stop_retires_transfer() {
        let transport = RecordingTransport::default();
        let mut scheduler = TransferScheduler::new(2, 0x82, 1);
        let layout = TransferLayout {
            packets: 1,
            packet_size: 8,
        };
        scheduler.start(&transport, layout).unwrap();
        let late = transport.submitted.lock().remove(0);
        scheduler.stop(&transport).unwrap();

        assert!(!scheduler.resubmit(&transport, late).unwrap());
        assert_eq!(transport.submitted.lock().len(), 1);
    }

    #[test]
    fn test_stop_cancels_once() {
        let transport = RecordingTransport::default();
        let mut scheduler = TransferScheduler::new(2, 0x82, 1);
        scheduler
            .start(
                &transport,
                TransferLayout {
                    packets: 1,
                    packet_size: 8,
                },
            )
            .unwrap();

        scheduler.stop(&transport).unwrap();
        scheduler.stop(&transport).unwrap();
        assert_eq!(*transport.cancels.lock(), 1);
        assert!(!scheduler.is_running());
    }
}
