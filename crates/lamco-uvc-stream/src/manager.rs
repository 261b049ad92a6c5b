//! Stream manager
//!
//! Single entry point that ties the control plane, the buffer queue and the
//! transfer path together.
//!
//! # Architecture
//!
//! The manager coordinates:
//! - Buffer pool allocation sized from the current format
//! - Probe/commit negotiation and alternate setting selection
//! - Transfer scheduling and the per-session reassembly engine
//! - Completion handling, including the fatal resubmission path
//!
//! ```text
//!            Idle ──start()──► Starting ──► Streaming
//!             ▲                   │             │
//!             │              (failure)     resubmit fails
//!             │                   ▼             ▼
//!             └──── stop() ◄── Stopping ◄─── Failed
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lamco_uvc_stream::{StreamConfig, StreamManager};
//! use lamco_uvc_control::ControlConfig;
//!
//! # async fn example(transport: Arc<MyTransport>, channel: Arc<MyChannel>) -> lamco_uvc_stream::Result<()> {
//! let manager = StreamManager::new(
//!     StreamConfig::default(),
//!     ControlConfig::default(),
//!     transport,
//!     channel,
//! )?;
//!
//! manager.allocate_buffers()?;
//! let queue = manager.queue();
//! for i in 0..queue.buffer_count() {
//!     queue.queue_buffer(i)?;
//! }
//!
//! manager.start().await?;
//! let frame = queue.dequeue().await?;
//! println!("frame {} with {} bytes", frame.sequence, frame.bytes_used);
//!
//! manager.stop()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use lamco_uvc_control::{ControlChannel, ControlConfig, Controls, NegotiatedParams, Negotiator, ProbeRequest};
use lamco_videobuf::VideoQueue;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::format::{FormatSelector, VideoFormat};
use crate::reassembly::{ReassemblyEngine, ReassemblyStats};
use crate::transfer::{IsoTransfer, TransferLayout, TransferScheduler, TransferStatus, UsbTransport};

/// MJPEG is the first (and only) format descriptor
const MJPEG_FORMAT_INDEX: u8 = 1;

/// Stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No transfers in flight
    Idle,
    /// Negotiating and arming transfers
    Starting,
    /// Transfers in flight, frames being delivered
    Streaming,
    /// Cancelling transfers
    Stopping,
    /// Resubmission failed; call [`StreamManager::stop`] to recover
    Failed,
}

/// Owns one camera's streaming data path
pub struct StreamManager<T, C> {
    /// Stream configuration
    config: StreamConfig,

    /// Control-plane configuration
    control_config: ControlConfig,

    /// USB host stack
    transport: Arc<T>,

    /// Endpoint 0 control requests
    channel: Arc<C>,

    /// Buffer queue shared with the consumer
    queue: Arc<VideoQueue>,

    /// Current format
    format: Mutex<FormatSelector>,

    /// Stream state
    state: Mutex<StreamState>,

    /// Reassembly state of the current (or last) session
    engine: Mutex<Option<ReassemblyEngine>>,

    /// Transfers in flight
    scheduler: Mutex<TransferScheduler>,

    /// Parameters of the current session
    params: Mutex<Option<NegotiatedParams>>,
}

impl<T: UsbTransport, C: ControlChannel> StreamManager<T, C> {
    /// Create a manager for one device
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidParameter`] if either configuration
    /// fails validation.
    pub fn new(
        config: StreamConfig,
        control_config: ControlConfig,
        transport: Arc<T>,
        channel: Arc<C>,
    ) -> Result<Self> {
        let mut issues = Vec::new();
        if let Err(mut stream_issues) = config.validate() {
            issues.append(&mut stream_issues);
        }
        if let Err(mut control_issues) = control_config.validate() {
            issues.append(&mut control_issues);
        }
        if !issues.is_empty() {
            return Err(StreamError::InvalidParameter(issues.join(", ")));
        }

        info!("Creating StreamManager with config: {:?}", config);

        let queue = match config.memory_limit {
            Some(limit) => VideoQueue::with_memory_limit(limit),
            None => VideoQueue::new(),
        };
        let format = FormatSelector::new(config.frame_index, config.max_frame_size)?;
        let scheduler = TransferScheduler::new(
            config.transfer_count,
            config.endpoint_address,
            config.interval,
        );

        Ok(Self {
            config,
            control_config,
            transport,
            channel,
            queue: Arc::new(queue),
            format: Mutex::new(format),
            state: Mutex::new(StreamState::Idle),
            engine: Mutex::new(None),
            scheduler: Mutex::new(scheduler),
            params: Mutex::new(None),
        })
    }

    /// Stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// USB host stack
    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    /// Control channel
    pub fn channel(&self) -> Arc<C> {
        Arc::clone(&self.channel)
    }

    /// Buffer queue shared with the consumer
    pub fn queue(&self) -> Arc<VideoQueue> {
        Arc::clone(&self.queue)
    }

    /// Current stream state
    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Parameters negotiated by the last successful start
    pub fn params(&self) -> Option<NegotiatedParams> {
        *self.params.lock()
    }

    /// Reassembly counters of the current or last session
    pub fn stats(&self) -> Option<ReassemblyStats> {
        self.engine.lock().as_ref().map(ReassemblyEngine::stats)
    }

    /// Processing-unit controls (brightness)
    pub fn controls(&self) -> Controls<'_, C> {
        Controls::new(&*self.channel, &self.control_config)
    }

    fn require_idle(&self, operation: &str) -> Result<()> {
        let state = *self.state.lock();
        if state == StreamState::Idle {
            Ok(())
        } else {
            Err(StreamError::invalid_state(format!(
                "cannot {operation} while {state:?}"
            )))
        }
    }

    // =========================================================================
    // Buffers and format
    // =========================================================================

    /// Allocate `count` buffers sized for the current format
    ///
    /// Returns the number actually allocated, which may be lower.
    pub fn request_buffers(&self, count: usize) -> Result<usize> {
        self.require_idle("reallocate buffers")?;

        let frame_size = self.format.lock().current().size_image as usize;
        let allocated = self.queue.request_buffers(count, frame_size)?;
        info!(
            "Allocated {} of {} buffers for {} byte frames",
            allocated, count, frame_size
        );
        Ok(allocated)
    }

    /// Allocate the configured number of buffers
    pub fn allocate_buffers(&self) -> Result<usize> {
        self.request_buffers(self.config.buffer_count)
    }

    /// Free the buffer pool
    pub fn release_buffers(&self) -> Result<()> {
        self.require_idle("release buffers")?;
        self.queue.release()?;
        Ok(())
    }

    /// Current format
    pub fn format(&self) -> VideoFormat {
        self.format.lock().current()
    }

    /// Format the device would deliver for `requested`
    pub fn try_format(&self, requested: &VideoFormat) -> Result<VideoFormat> {
        self.format.lock().try_format(requested)
    }

    /// Adjust and store the format
    pub fn set_format(&self, requested: &VideoFormat) -> Result<VideoFormat> {
        self.require_idle("change format")?;
        self.format.lock().set_format(requested)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Negotiate, enable the streaming endpoint and arm every transfer
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The stream is not idle or no buffers are allocated
    /// - Negotiation fails
    /// - The transport rejects the alternate setting or a transfer
    pub async fn start(&self) -> Result<NegotiatedParams> {
        {
            let mut state = self.state.lock();
            if *state != StreamState::Idle {
                return Err(StreamError::invalid_state(format!(
                    "cannot start while {:?}",
                    *state
                )));
            }
            if self.queue.buffer_count() == 0 {
                return Err(StreamError::invalid_state("no buffers allocated"));
            }
            *state = StreamState::Starting;
        }

        info!("Starting stream on endpoint {:#04x}", self.config.endpoint_address);

        match self.start_session().await {
            Ok(params) => {
                info!(
                    "Streaming: {} byte frames, {} byte packets",
                    params.max_frame_size, params.max_packet_size
                );
                Ok(params)
            }
            Err(e) => {
                warn!("Failed to start stream: {}", e);
                *self.state.lock() = StreamState::Idle;
                Err(e)
            }
        }
    }

    async fn start_session(&self) -> Result<NegotiatedParams> {
        let request = ProbeRequest {
            format_index: MJPEG_FORMAT_INDEX,
            frame_index: self.format.lock().descriptor_frame_index(),
            frame_interval: self.config.frame_interval,
            max_packet_size: self.config.max_packet_size,
        };
        let params = Negotiator::new(&*self.channel, &self.control_config)
            .negotiate(&request)
            .await?;

        if let Ok(info) = self.queue.query_buffer(0) {
            if params.max_frame_size as usize > info.length {
                warn!(
                    "Device frames up to {} bytes exceed {} byte buffers; large frames will be truncated",
                    params.max_frame_size, info.length
                );
            }
        }

        let layout = TransferLayout::from_params(&params, self.config.max_packets_per_transfer)?;
        let interface = self.control_config.streaming_interface;
        self.transport
            .set_interface(interface, self.config.alternate_setting)?;

        // stop() takes the scheduler after leaving Starting, so it either
        // sees the armed transfers or we see its state change.
        let mut scheduler = self.scheduler.lock();
        {
            let mut state = self.state.lock();
            if *state != StreamState::Starting {
                drop(state);
                drop(scheduler);
                self.reset_interface(interface);
                return Err(StreamError::invalid_state("stopped while starting"));
            }
            *state = StreamState::Streaming;
        }

        let engine = ReassemblyEngine::for_vendor(self.config.vendor_id);
        debug!("Using {} framing", engine.quirk_name());
        *self.engine.lock() = Some(engine);
        *self.params.lock() = Some(params);
        self.queue.clear_fatal();

        if let Err(e) = scheduler.start(&*self.transport, layout) {
            drop(scheduler);
            self.reset_interface(interface);
            return Err(e);
        }

        Ok(params)
    }

    fn reset_interface(&self, interface: u8) {
        if let Err(e) = self.transport.set_interface(interface, 0) {
            warn!("Failed to reset alternate setting: {}", e);
        }
    }

    /// Cancel all transfers and disable the streaming endpoint
    ///
    /// Buffers still waiting for data go back to QUEUED with their partial
    /// contents dropped and are not signalled. A failed stream is cleared so
    /// buffers can be submitted again. Stopping an idle stream is a no-op.
    pub fn stop(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock();
            if *state == StreamState::Idle {
                return Ok(());
            }
            std::mem::replace(&mut *state, StreamState::Stopping)
        };

        // Held across the rewind so no completion refills a buffer in between.
        let (cancelled, rewound) = {
            let mut scheduler = self.scheduler.lock();
            let cancelled = scheduler.stop(&*self.transport);
            let rewound = self.queue.rewind_capture();
            self.queue.clear_fatal();
            (cancelled, rewound)
        };
        let alt = self
            .transport
            .set_interface(self.control_config.streaming_interface, 0);

        *self.params.lock() = None;
        *self.state.lock() = StreamState::Idle;
        info!(
            "Stream stopped (was {:?}, {} partial frames dropped)",
            previous, rewound
        );

        cancelled.and(alt)
    }

    // =========================================================================
    // Completion path
    // =========================================================================

    /// Handle a completed transfer from the transport
    ///
    /// Applies its packets to the capture queue and puts it back in flight.
    /// Cancelled transfers and transfers arriving after stop are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::StreamFatal`] when the transfer cannot be
    /// resubmitted. Every buffer still waiting for data is then completed
    /// with an error and the stream enters [`StreamState::Failed`].
    pub fn complete_transfer(&self, transfer: IsoTransfer) -> Result<()> {
        match transfer.status() {
            TransferStatus::Cancelled | TransferStatus::Shutdown => {
                debug!("Transfer {} retired ({:?})", transfer.id(), transfer.status());
                return Ok(());
            }
            _ => {}
        }

        // The scheduler lock spans check, reassembly and resubmit; stop()
        // cannot cancel and rewind in the middle of a completion.
        let scheduler = self.scheduler.lock();
        if *self.state.lock() != StreamState::Streaming || !scheduler.is_running() {
            debug!("Dropping transfer {} outside streaming", transfer.id());
            return Ok(());
        }

        if let TransferStatus::Error(reason) = transfer.status() {
            warn!("Transfer {} failed: {}", transfer.id(), reason);
        } else if let Some(engine) = self.engine.lock().as_mut() {
            engine.process_transfer(&transfer, &self.queue);
        }

        if let Err(e) = scheduler.resubmit(&*self.transport, transfer) {
            self.fail(&e.to_string());
            return Err(e);
        }
        Ok(())
    }

    fn fail(&self, reason: &str) {
        *self.state.lock() = StreamState::Failed;
        let aborted = self.queue.abort(reason);
        error!("Stream failed: {} ({} buffers aborted)", reason, aborted);
    }
}

impl<T, C> std::fmt::Debug for StreamManager<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Feed transfers from a channel into [`StreamManager::complete_transfer`]
///
/// For transports whose completion callbacks post into a channel. The task
/// ends when the channel closes or the stream fails.
pub fn spawn_completion_pump<T, C>(
    manager: Arc<StreamManager<T, C>>,
    mut completions: mpsc::Receiver<IsoTransfer>,
) -> JoinHandle<Result<()>>
where
    T: UsbTransport + 'static,
    C: ControlChannel + 'static,
{
    tokio::spawn(async move {
        while let Some(transfer) = completions.recv().await {
            manager.complete_transfer(transfer)?;
        }
        debug!("Completion channel closed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{HEADER_EOF, HEADER_EOH, HEADER_FID};
    use crate::transfer::PacketStatus;
    use lamco_uvc_control::ControlRequest;
    use lamco_videobuf::{BufferError, BufferState};
    use std::time::Duration;

    #[derive(Default)]
    struct MockTransport {
        submitted: Mutex<Vec<IsoTransfer>>,
        alt_settings: Mutex<Vec<(u8, u8)>>,
        cancels: Mutex<usize>,
        reject: Mutex<bool>,
    }

    impl MockTransport {
        fn take(&self) -> Vec<IsoTransfer> {
            std::mem::take(&mut *self.submitted.lock())
        }
    }

    impl UsbTransport for MockTransport {
        fn set_interface(&self, interface: u8, alt_setting: u8) -> Result<()> {
            self.alt_settings.lock().push((interface, alt_setting));
            Ok(())
        }

        fn submit(&self, transfer: IsoTransfer) -> Result<()> {
            if *self.reject.lock() {
                return Err(StreamError::transport("ENODEV"));
            }
            self.submitted.lock().push(transfer);
            Ok(())
        }

        fn cancel_all(&self) -> Result<()> {
            *self.cancels.lock() += 1;
            self.submitted.lock().clear();
            Ok(())
        }
    }

    /// Answers every probe with 77312 byte frames
    struct MockCamera;

    impl ControlChannel for MockCamera {
        async fn control_in(
            &self,
            _request: ControlRequest,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> lamco_uvc_control::Result<usize> {
            buf.fill(0);
            buf[3] = 2;
            buf[4..8].copy_from_slice(&333_333u32.to_le_bytes());
            buf[18..22].copy_from_slice(&77_312u32.to_le_bytes());
            buf[22..26].copy_from_slice(&800u32.to_le_bytes());
            Ok(buf.len())
        }

        async fn control_out(
            &self,
            _request: ControlRequest,
            data: &[u8],
            _timeout: Duration,
        ) -> lamco_uvc_control::Result<usize> {
            Ok(data.len())
        }
    }

    /// Answers like [`MockCamera`] after 100 ms on every read
    struct SlowCamera;

    impl ControlChannel for SlowCamera {
        async fn control_in(
            &self,
            request: ControlRequest,
            buf: &mut [u8],
            timeout: Duration,
        ) -> lamco_uvc_control::Result<usize> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            MockCamera.control_in(request, buf, timeout).await
        }

        async fn control_out(
            &self,
            request: ControlRequest,
            data: &[u8],
            timeout: Duration,
        ) -> lamco_uvc_control::Result<usize> {
            MockCamera.control_out(request, data, timeout).await
        }
    }

    fn manager() -> StreamManager<MockTransport, MockCamera> {
        let config = StreamConfig::builder().max_frame_size(4096).build();
        StreamManager::new(
            config,
            ControlConfig::default(),
            Arc::new(MockTransport::default()),
            Arc::new(MockCamera),
        )
        .unwrap()
    }

    fn frame_transfer(template: &IsoTransfer, fid: bool, payload: &[u8]) -> IsoTransfer {
        let mut transfer = template.clone();
        let mut packet = vec![2, HEADER_EOH | HEADER_EOF];
        if fid {
            packet[1] |= HEADER_FID;
        }
        packet.extend_from_slice(payload);
        transfer.fill_packet(0, &packet, PacketStatus::Completed);
        transfer
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = StreamConfig {
            buffer_count: 0,
            ..Default::default()
        };
        let err = StreamManager::new(
            config,
            ControlConfig::default(),
            Arc::new(MockTransport::default()),
            Arc::new(MockCamera),
        )
        .unwrap_err();
        assert!(matches!(err, StreamError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_start_requires_buffers() {
        let manager = manager();
        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidState(_)));
        assert_eq!(manager.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let manager = manager();
        assert_eq!(manager.allocate_buffers().unwrap(), 4);

        let params = manager.start().await.unwrap();
        assert_eq!(params.max_frame_size, 77_312);
        assert_eq!(params.max_packet_size, 800);
        assert_eq!(manager.state(), StreamState::Streaming);
        assert_eq!(manager.transport.submitted.lock().len(), 5);
        assert_eq!(manager.transport.alt_settings.lock()[0], (1, 5));

        assert!(matches!(
            manager.request_buffers(2),
            Err(StreamError::InvalidState(_))
        ));
        assert!(manager.start().await.is_err());

        manager.stop().unwrap();
        assert_eq!(manager.state(), StreamState::Idle);
        assert_eq!(*manager.transport.cancels.lock(), 1);
        assert_eq!(manager.transport.alt_settings.lock()[1], (1, 0));
        assert!(manager.params().is_none());

        manager.stop().unwrap();
        assert_eq!(*manager.transport.cancels.lock(), 1);
    }

    #[tokio::test]
    async fn test_completion_delivers_and_resubmits() {
        let manager = manager();
        manager.allocate_buffers().unwrap();
        let queue = manager.queue();
        queue.queue_buffer(0).unwrap();
        queue.queue_buffer(1).unwrap();
        manager.start().await.unwrap();

        let transfers = manager.transport.take();
        manager
            .complete_transfer(frame_transfer(&transfers[0], true, b"jpeg"))
            .unwrap();

        let frame = queue.dequeue().await.unwrap();
        assert_eq!(frame.index, 0);
        assert_eq!(frame.bytes_used, 4);
        assert_eq!(manager.transport.submitted.lock().len(), 1);
        assert_eq!(manager.stats().unwrap().frames_completed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_and_failed_transfers() {
        let manager = manager();
        manager.allocate_buffers().unwrap();
        manager.queue().queue_buffer(0).unwrap();
        manager.start().await.unwrap();
        let transfers = manager.transport.take();

        let mut cancelled = frame_transfer(&transfers[0], true, b"x");
        cancelled.set_status(TransferStatus::Cancelled);
        manager.complete_transfer(cancelled).unwrap();
        assert!(manager.transport.submitted.lock().is_empty());

        let mut broken = frame_transfer(&transfers[1], true, b"x");
        broken.set_status(TransferStatus::Error("EPROTO".into()));
        manager.complete_transfer(broken).unwrap();
        assert_eq!(manager.transport.submitted.lock().len(), 1);
        assert_eq!(
            manager.queue().query_buffer(0).unwrap().state,
            BufferState::Queued
        );
    }

    #[tokio::test]
    async fn test_resubmit_failure_is_fatal() {
        let manager = manager();
        manager.allocate_buffers().unwrap();
        let queue = manager.queue();
        queue.queue_buffer(0).unwrap();
        queue.queue_buffer(1).unwrap();
        manager.start().await.unwrap();
        let transfers = manager.transport.take();

        *manager.transport.reject.lock() = true;
        let err = manager
            .complete_transfer(frame_transfer(&transfers[0], true, b"abc"))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(manager.state(), StreamState::Failed);

        // The completed frame is still delivered, the waiting one errors out.
        assert_eq!(queue.dequeue().await.unwrap().bytes_used, 3);
        assert_eq!(
            queue.dequeue().await.unwrap_err(),
            BufferError::FrameCorrupted { index: 1 }
        );
        assert!(matches!(
            queue.dequeue().await,
            Err(BufferError::StreamFatal(_))
        ));

        assert!(manager.start().await.is_err());
        manager.stop().unwrap();
        assert_eq!(manager.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_start_rolls_back_on_submit_failure() {
        let manager = manager();
        manager.allocate_buffers().unwrap();
        *manager.transport.reject.lock() = true;

        assert!(manager.start().await.is_err());
        assert_eq!(manager.state(), StreamState::Idle);
        let alts = manager.transport.alt_settings.lock().clone();
        assert_eq!(alts, vec![(1, 5), (1, 0)]);
    }

    #[tokio::test]
    async fn test_stop_during_completion_leaves_nothing_in_flight() {
        let manager = manager();
        manager.allocate_buffers().unwrap();
        let queue = manager.queue();
        queue.queue_buffer(0).unwrap();
        manager.start().await.unwrap();

        let mut partial = manager.transport.take().remove(0);
        partial.fill_packet(0, &[2, HEADER_EOH | HEADER_FID, 1, 2, 3], PacketStatus::Completed);

        // Park the completion inside reassembly, then stop alongside it.
        std::thread::scope(|scope| {
            let engine = manager.engine.lock();
            let completion = scope.spawn(|| manager.complete_transfer(partial));
            std::thread::sleep(Duration::from_millis(20));
            let stopper = scope.spawn(|| manager.stop());
            std::thread::sleep(Duration::from_millis(20));
            drop(engine);

            completion.join().unwrap().unwrap();
            stopper.join().unwrap().unwrap();
        });

        assert_eq!(manager.state(), StreamState::Idle);
        assert!(manager.transport.submitted.lock().is_empty());
        let info = queue.query_buffer(0).unwrap();
        assert_eq!(info.state, BufferState::Queued);
        assert_eq!(info.bytes_used, 0);
    }

    #[tokio::test]
    async fn test_stop_while_negotiating_releases_bandwidth() {
        let manager = StreamManager::new(
            StreamConfig::builder().max_frame_size(4096).build(),
            ControlConfig::default(),
            Arc::new(MockTransport::default()),
            Arc::new(SlowCamera),
        )
        .unwrap();
        manager.allocate_buffers().unwrap();

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            manager.stop()
        };
        let (started, stopped) = tokio::join!(manager.start(), stopper);

        assert!(matches!(started, Err(StreamError::InvalidState(_))));
        stopped.unwrap();
        assert_eq!(manager.state(), StreamState::Idle);
        assert!(manager.params().is_none());
        assert!(manager.transport.submitted.lock().is_empty());
        assert_eq!(manager.transport.alt_settings.lock().last(), Some(&(1, 0)));
    }

    #[tokio::test]
    async fn test_format_and_reallocation() {
        let manager = manager();
        let format = manager
            .set_format(&VideoFormat::mjpeg(640, 480))
            .unwrap();
        assert_eq!((format.width, format.height), (320, 240));
        assert_eq!(format.size_image, 4096);

        assert_eq!(manager.request_buffers(2).unwrap(), 2);
        assert_eq!(manager.queue().query_buffer(1).unwrap().length, 4096);
        manager.release_buffers().unwrap();
        assert_eq!(manager.queue().buffer_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_pump() {
        let manager = Arc::new(manager());
        manager.allocate_buffers().unwrap();
        let queue = manager.queue();
        queue.queue_buffer(0).unwrap();
        manager.start().await.unwrap();
        let transfers = manager.transport.take();

        let (tx, rx) = mpsc::channel(8);
        let pump = spawn_completion_pump(Arc::clone(&manager), rx);
        tx.send(frame_transfer(&transfers[0], false, b"pumped"))
            .await
            .unwrap();

        let frame = queue.dequeue().await.unwrap();
        assert_eq!(frame.bytes_used, 6);

        drop(tx);
        assert!(pump.await.unwrap().is_ok());
    }
}
