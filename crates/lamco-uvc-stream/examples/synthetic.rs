//! Stream synthetic MJPEG frames through the full data path
//!
//! A fake camera answers negotiation and a fake host controller turns every
//! submitted transfer into packets of a generated frame. Completions travel
//! through a channel into the completion pump.
//!
//! ```text
//! cargo run -p lamco-uvc-stream --example synthetic
//! ```

use std::sync::Arc;
use std::time::Duration;

use lamco_uvc_control::{ControlChannel, ControlConfig, ControlRequest};
use lamco_uvc_stream::{
    spawn_completion_pump, IsoTransfer, PacketStatus, StreamConfig, StreamManager, UsbTransport,
    HEADER_EOF, HEADER_EOH, HEADER_FID,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

const MAX_PACKET: u16 = 800;
const FRAME_LEN: usize = 6000;

struct SyntheticHost {
    completions: mpsc::UnboundedSender<IsoTransfer>,
    fid: Mutex<bool>,
}

impl SyntheticHost {
    fn fill(&self, transfer: &mut IsoTransfer) {
        let fid = {
            let mut fid = self.fid.lock();
            *fid = !*fid;
            *fid
        };

        let chunk = usize::from(MAX_PACKET) - 2;
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..2].copy_from_slice(&[0xFF, 0xD8]);
        frame[FRAME_LEN - 2..].copy_from_slice(&[0xFF, 0xD9]);

        let chunks: Vec<&[u8]> = frame.chunks(chunk).collect();
        for (i, data) in chunks.iter().enumerate().take(transfer.packets().len()) {
            let mut flags = HEADER_EOH;
            if fid {
                flags |= HEADER_FID;
            }
            if i == chunks.len() - 1 {
                flags |= HEADER_EOF;
            }
            let mut packet = vec![2, flags];
            packet.extend_from_slice(data);
            transfer.fill_packet(i, &packet, PacketStatus::Completed);
        }
    }
}

impl UsbTransport for SyntheticHost {
    fn set_interface(&self, interface: u8, alt_setting: u8) -> lamco_uvc_stream::Result<()> {
        println!("interface {interface} -> alt {alt_setting}");
        Ok(())
    }

    fn submit(&self, mut transfer: IsoTransfer) -> lamco_uvc_stream::Result<()> {
        self.fill(&mut transfer);
        // The receiver disappears at shutdown; nothing left to complete.
        let _ = self.completions.send(transfer);
        Ok(())
    }

    fn cancel_all(&self) -> lamco_uvc_stream::Result<()> {
        Ok(())
    }
}

struct SyntheticCamera;

impl ControlChannel for SyntheticCamera {
    async fn control_in(
        &self,
        _request: ControlRequest,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> lamco_uvc_control::Result<usize> {
        buf.fill(0);
        buf[2] = 1;
        buf[3] = 2;
        buf[4..8].copy_from_slice(&333_333u32.to_le_bytes());
        buf[18..22].copy_from_slice(&(FRAME_LEN as u32).to_le_bytes());
        buf[22..26].copy_from_slice(&u32::from(MAX_PACKET).to_le_bytes());
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // The pump takes a bounded receiver; bridge the host's unbounded sends.
    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    let (pump_tx, pump_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        while let Some(transfer) = host_rx.recv().await {
            if pump_tx.send(transfer).await.is_err() {
                break;
            }
        }
    });

    let host = Arc::new(SyntheticHost {
        completions: host_tx,
        fid: Mutex::new(false),
    });
    let config = StreamConfig::builder()
        .max_packet_size(MAX_PACKET)
        .max_frame_size(FRAME_LEN as u32)
        .build();
    let manager = Arc::new(StreamManager::new(
        config,
        ControlConfig::default(),
        host,
        Arc::new(SyntheticCamera),
    )?);

    let count = manager.allocate_buffers()?;
    let queue = manager.queue();
    for index in 0..count {
        queue.queue_buffer(index)?;
    }

    let params = manager.start().await?;
    println!(
        "streaming {} byte frames at {:.1} fps",
        params.max_frame_size,
        10_000_000.0 / f64::from(params.frame_interval)
    );
    let pump = spawn_completion_pump(Arc::clone(&manager), pump_rx);

    let mut frame_bytes = Vec::new();
    for _ in 0..10 {
        let frame = queue.dequeue().await?;
        queue.copy_frame(frame.index, &mut frame_bytes)?;
        println!(
            "frame {:>3}: buffer {} {} bytes, SOI {:02X?}",
            frame.sequence,
            frame.index,
            frame.bytes_used,
            &frame_bytes[..2]
        );
        queue.queue_buffer(frame.index)?;
    }

    manager.stop()?;
    pump.abort();
    if let Some(stats) = manager.stats() {
        println!("{stats:?}");
    }
    Ok(())
}
