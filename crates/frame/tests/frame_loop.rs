//! Integration tests for the full frame loop over the software device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use presenter_frame::{FramePacer, PacerConfig};
use presenter_rhi::command::{CommandBuffer, DrawPacket};
use presenter_rhi::driver::{FenceValue, GpuQueue, SyncMode};
use presenter_rhi::software::{CompletionMode, GpuEvent, SoftwareGpu, SoftwarePresenter};
use presenter_rhi::RhiResult;

fn pacer_with(
    mode: CompletionMode,
    config: PacerConfig,
    width: u32,
    height: u32,
) -> (Arc<SoftwareGpu>, SoftwarePresenter, FramePacer) {
    let gpu = Arc::new(SoftwareGpu::new(mode));
    let queue: Arc<dyn GpuQueue> = gpu.clone();
    let presenter = SoftwarePresenter::new(false);
    let probe = presenter.clone();
    let pacer = FramePacer::new(queue, Box::new(presenter), config, width, height).unwrap();
    (gpu, probe, pacer)
}

fn waits(gpu: &SoftwareGpu) -> Vec<FenceValue> {
    gpu.events()
        .into_iter()
        .filter_map(|event| match event {
            GpuEvent::Wait(value) => Some(value),
            _ => None,
        })
        .collect()
}

fn draw(cmd: &mut CommandBuffer) -> RhiResult<()> {
    cmd.record_draw(DrawPacket::new(&[0u8; 4][..]))
}

#[test]
fn scenario_a_third_frame_blocks_on_first_frames_fence() {
    let config = PacerConfig {
        frames_in_flight: 2,
        acquire_timeout: Some(Duration::from_millis(10)),
        ..Default::default()
    };
    let (gpu, _probe, mut pacer) = pacer_with(CompletionMode::Manual, config, 1280, 720);

    // Frames 0 and 1 are first uses of their slots: no waits required.
    let first = pacer.run_frame(draw).unwrap();
    let second = pacer.run_frame(draw).unwrap();
    assert_eq!(first, FenceValue::new(1));
    assert_eq!(second, FenceValue::new(2));
    assert!(waits(&gpu).is_empty());

    // Frame 2 reuses slot 0 and must block until frame 0's value is reached.
    let err = pacer.run_frame(draw).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(waits(&gpu), vec![first]);
    assert_eq!(pacer.frames_submitted(), 2);

    // Once the GPU reaches frame 0's value the same frame goes through.
    gpu.complete_through(first);
    let third = pacer.run_frame(draw).unwrap();
    assert_eq!(third, FenceValue::new(3));
    assert_eq!(pacer.frames_submitted(), 3);
}

#[test]
fn slot_waits_target_the_value_signaled_n_frames_earlier() {
    let slots = 2u64;
    let config = PacerConfig {
        frames_in_flight: slots as usize,
        acquire_timeout: Some(Duration::from_millis(5)),
        ..Default::default()
    };
    let (gpu, _probe, mut pacer) = pacer_with(CompletionMode::Manual, config, 640, 480);

    for frame in 0..6u64 {
        if frame >= slots {
            // Submission i signals value i+1, so the slot reused at frame i
            // holds the value from submission i-N: (i-N)+1.
            let expected = FenceValue::new(frame - slots + 1);

            let err = pacer.run_frame(draw).unwrap_err();
            assert!(err.is_timeout());
            assert_eq!(waits(&gpu).last().copied(), Some(expected));

            gpu.complete_through(expected);
        }
        pacer.run_frame(draw).unwrap();
        assert_eq!(pacer.frames_submitted(), frame + 1);
    }
}

#[test]
fn scenario_b_resize_waits_for_in_flight_frame_before_releasing_images() {
    let config = PacerConfig {
        frames_in_flight: 3,
        ..Default::default()
    };
    let delay = Duration::from_millis(20);
    let (gpu, probe, mut pacer) = pacer_with(CompletionMode::Delayed(delay), config, 1280, 720);

    // One frame in flight; its signal completes `delay` from now.
    let in_flight = pacer.run_frame(draw).unwrap();
    let started = Instant::now();

    pacer.resize(1920, 1080).unwrap();

    // The internal flush had to outwait the in-flight frame.
    assert!(started.elapsed() >= delay);
    let flush_value = in_flight.next();
    assert!(gpu.completed_value() >= flush_value);

    let events = gpu.events();
    let signal_at = events
        .iter()
        .position(|e| *e == GpuEvent::Signal(flush_value))
        .expect("resize issues a flush signal");
    let wait_at = events
        .iter()
        .position(|e| *e == GpuEvent::Wait(flush_value))
        .expect("resize waits on its flush signal");
    assert!(signal_at < wait_at);

    // Post-resize presentation state is whole again.
    assert_eq!(pacer.surfaces().width(), 1920);
    assert_eq!(pacer.surfaces().height(), 1080);
    assert_eq!(pacer.surfaces().populated_images(), 3);
    assert_eq!(probe.outstanding_images(), 3);

    // The loop keeps going against the new images.
    pacer.run_frame(draw).unwrap();
}

#[test]
fn resize_with_unchanged_dimensions_is_a_noop() {
    let (gpu, _probe, mut pacer) =
        pacer_with(CompletionMode::Immediate, PacerConfig::default(), 1024, 768);

    pacer.run_frame(draw).unwrap();
    let signaled = pacer.fence().last_signaled();

    pacer.resize(1024, 768).unwrap();

    assert_eq!(pacer.fence().last_signaled(), signaled);
    assert!(!gpu.events().iter().any(|e| *e == GpuEvent::Signal(signaled.next())));
}

#[test]
fn steady_state_loop_never_blocks_when_gpu_keeps_up() {
    let (gpu, probe, mut pacer) =
        pacer_with(CompletionMode::Immediate, PacerConfig::default(), 800, 600);

    for _ in 0..10 {
        pacer.run_frame(draw).unwrap();
    }

    assert_eq!(pacer.frames_submitted(), 10);
    assert_eq!(probe.presents().len(), 10);
    assert_eq!(pacer.fence().last_signaled(), FenceValue::new(10));
    // A GPU that keeps up means every slot wait is a no-op.
    assert!(waits(&gpu).is_empty());
}

#[test]
fn present_uses_the_configured_sync_mode() {
    let config = PacerConfig {
        sync_mode: SyncMode::VsyncOff,
        ..Default::default()
    };
    let (_gpu, probe, mut pacer) = pacer_with(CompletionMode::Immediate, config, 320, 240);

    pacer.run_frame(draw).unwrap();
    pacer.run_frame(draw).unwrap();

    assert_eq!(probe.presents(), vec![SyncMode::VsyncOff, SyncMode::VsyncOff]);
}

#[test]
fn drain_flushes_and_reclaims_every_slot() {
    let (gpu, _probe, mut pacer) =
        pacer_with(CompletionMode::Immediate, PacerConfig::default(), 640, 480);

    for _ in 0..4 {
        pacer.run_frame(draw).unwrap();
    }
    pacer.drain().unwrap();

    let flush_value = FenceValue::new(5);
    assert!(gpu.events().contains(&GpuEvent::Signal(flush_value)));
    assert!(gpu.completed_value() >= flush_value);

    // Draining twice is harmless.
    pacer.drain().unwrap();
}

#[test]
fn device_loss_during_resize_latches_the_pacer() {
    let (_gpu, probe, mut pacer) =
        pacer_with(CompletionMode::Immediate, PacerConfig::default(), 1280, 720);

    pacer.run_frame(draw).unwrap();
    probe.set_fail_builds(true);

    let err = pacer.resize(1920, 1080).unwrap_err();
    assert!(err.is_device_lost());
    assert!(pacer.is_device_lost());

    // No further fence waits are attempted: everything fails fast.
    assert!(pacer.run_frame(draw).unwrap_err().is_device_lost());
    assert!(pacer.drain().unwrap_err().is_device_lost());
}
