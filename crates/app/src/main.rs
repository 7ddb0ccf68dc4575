//! Presenter demo - Main Entry Point
//!
//! Runs the multi-buffered frame loop headlessly against the software
//! device: a few hundred frames with simulated GPU latency, one mid-run
//! resize, and a draining shutdown.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use presenter_core::FrameClock;
use presenter_frame::{FramePacer, PacerConfig};
use presenter_rhi::command::DrawPacket;
use presenter_rhi::driver::{GpuQueue, SyncMode};
use presenter_rhi::software::{CompletionMode, SoftwareGpu, SoftwarePresenter};

const FRAMES: u32 = 240;
const RESIZE_AT: u32 = 120;

fn main() -> Result<()> {
    presenter_core::init_logging();
    info!("Starting presenter demo");

    // A software GPU that finishes each frame's work 2ms after submission.
    let gpu = Arc::new(SoftwareGpu::new(CompletionMode::Delayed(
        Duration::from_millis(2),
    )));
    let queue: Arc<dyn GpuQueue> = gpu.clone();
    let presenter = SoftwarePresenter::new(true);

    let config = PacerConfig {
        sync_mode: SyncMode::VsyncOff,
        ..Default::default()
    };
    let mut pacer = FramePacer::new(queue, Box::new(presenter), config, 1280, 720)?;
    info!("Initialization complete, entering frame loop");

    let mut clock = FrameClock::with_sample_window(Duration::from_millis(250));
    for frame in 0..FRAMES {
        let _delta = clock.tick();

        pacer.run_frame(|cmd| cmd.record_draw(DrawPacket::new(frame.to_le_bytes().as_slice())))?;

        if frame == RESIZE_AT {
            info!("Resizing to 1920x1080");
            pacer.resize(1920, 1080)?;
        }

        if let Some(sample) = clock.fps_sample() {
            info!(fps = sample.fps, frames = sample.frames, "frame rate");
        }

        // Simulated per-frame CPU work.
        thread::sleep(Duration::from_millis(2));
    }

    pacer.drain()?;
    info!(
        frames = pacer.frames_submitted(),
        width = pacer.surfaces().width(),
        height = pacer.surfaces().height(),
        "Demo complete, shutting down"
    );
    Ok(())
}
