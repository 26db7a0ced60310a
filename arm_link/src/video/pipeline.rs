use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, trace};

use super::{CaptureDevice, Frame};
use crate::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    Skipped,
}

/// Counters shared between the pipeline and whoever displays its output.
#[derive(Debug, Default)]
pub struct PipelineStats {
    published: AtomicU64,
    skipped: AtomicU64,
}

impl PipelineStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Acquire, scale, reorder and publish, one frame per tick.
///
/// The pipeline owns its capture device and releases it exactly once: on
/// [`VideoPipeline::release`], when a spawned loop stops, or on drop.
pub struct VideoPipeline {
    device: Option<Box<dyn CaptureDevice>>,
    width: u32,
    height: u32,
    sequence: u64,
    frames: watch::Sender<Option<Arc<Frame>>>,
    stats: Arc<PipelineStats>,
}

impl VideoPipeline {
    pub fn new(device: Box<dyn CaptureDevice>, width: u32, height: u32) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            device: Some(device),
            width,
            height,
            sequence: 0,
            frames,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Latest published frame; `None` until the first successful tick.
    pub fn frames(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.frames.subscribe()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }

    /// Runs one acquisition. A failed grab or a bad buffer skips the tick and leaves
    /// the previously published frame in place.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(device) = self.device.as_mut() else {
            return TickOutcome::Skipped;
        };
        let frame = device
            .grab()
            .and_then(|raw| Frame::from_raw(raw, self.width, self.height, self.sequence));
        match frame {
            Ok(frame) => {
                self.sequence += 1;
                self.frames.send_replace(Some(Arc::new(frame)));
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Published
            }
            Err(e) => {
                trace!("Skipping video tick: {}", e);
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Skipped
            }
        }
    }

    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            info!("Capture device {} released", device.name());
        }
    }

    /// Moves the pipeline onto its own thread, ticking every `period` until the
    /// returned handle is stopped or dropped.
    pub fn spawn(self, period: Duration) -> Result<PipelineHandle, LinkError> {
        let frames = self.frames();
        let stats = self.stats();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let mut pipeline = self;

        let thread = thread::Builder::new()
            .name("video-pipeline".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                while !stop_flag.load(Ordering::Acquire) {
                    pipeline.tick();
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        // fell behind; don't try to catch up with a burst
                        next = now;
                    }
                }
                pipeline.release();
            })
            .map_err(|e| LinkError::CaptureUnavailable(e.to_string()))?;

        info!("Video pipeline ticking every {:?}", period);
        Ok(PipelineHandle {
            frames,
            stats,
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.release();
    }
}

/// Control over a running pipeline. Stopping (explicitly or by drop) joins the loop,
/// so the device is released by the time this returns.
#[derive(Debug)]
pub struct PipelineHandle {
    frames: watch::Receiver<Option<Arc<Frame>>>,
    stats: Arc<PipelineStats>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn frames(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.frames.clone()
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Video pipeline thread panicked");
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{ChannelOrder, RawFrame};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    // Replays a script of grab results, then fails forever.
    struct ScriptedDevice {
        script: VecDeque<Result<RawFrame, LinkError>>,
        releases: Arc<AtomicUsize>,
    }

    impl ScriptedDevice {
        fn new(script: Vec<Result<RawFrame, LinkError>>) -> (Self, Arc<AtomicUsize>) {
            let releases = Arc::new(AtomicUsize::new(0));
            let device = Self {
                script: script.into(),
                releases: releases.clone(),
            };
            (device, releases)
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn name(&self) -> &str {
            "scripted"
        }

        fn grab(&mut self) -> Result<RawFrame, LinkError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(LinkError::CaptureUnavailable("script exhausted".into())))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bgr(width: u32, height: u32, px: [u8; 3]) -> RawFrame {
        RawFrame {
            data: px.repeat((width * height) as usize),
            width,
            height,
            order: ChannelOrder::Bgr,
        }
    }

    #[test]
    fn failed_grab_keeps_the_previous_frame() {
        let (device, _) = ScriptedDevice::new(vec![
            Ok(bgr(640, 480, [0, 0, 200])),
            Err(LinkError::CaptureUnavailable("unplugged".into())),
        ]);
        let mut pipeline = VideoPipeline::new(Box::new(device), 600, 400);
        let frames = pipeline.frames();
        assert!(frames.borrow().is_none());

        assert_eq!(pipeline.tick(), TickOutcome::Published);
        assert_eq!(pipeline.tick(), TickOutcome::Skipped);

        let latest = frames.borrow().clone().unwrap();
        assert_eq!(latest.sequence, 0);
        assert_eq!((latest.width(), latest.height()), (600, 400));
        assert_eq!(latest.pixels.get_pixel(10, 10).0, [200, 0, 0]);
        assert_eq!(pipeline.stats().published(), 1);
        assert_eq!(pipeline.stats().skipped(), 1);
    }

    #[test]
    fn mismatched_buffer_is_skipped() {
        let broken = RawFrame {
            data: vec![1, 2, 3],
            width: 640,
            height: 480,
            order: ChannelOrder::Bgr,
        };
        let (device, _) = ScriptedDevice::new(vec![Ok(broken)]);
        let mut pipeline = VideoPipeline::new(Box::new(device), 600, 400);
        assert_eq!(pipeline.tick(), TickOutcome::Skipped);
        assert!(pipeline.frames().borrow().is_none());
    }

    #[test]
    fn release_happens_once() {
        let (device, releases) = ScriptedDevice::new(vec![]);
        let mut pipeline = VideoPipeline::new(Box::new(device), 600, 400);
        pipeline.release();
        pipeline.release();
        assert!(pipeline.is_released());
        assert_eq!(pipeline.tick(), TickOutcome::Skipped);
        drop(pipeline);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_an_unspawned_pipeline_releases() {
        let (device, releases) = ScriptedDevice::new(vec![]);
        drop(VideoPipeline::new(Box::new(device), 600, 400));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawned_loop_publishes_and_releases_on_stop() {
        let script = (0..50).map(|_| Ok(bgr(64, 48, [1, 2, 3]))).collect();
        let (device, releases) = ScriptedDevice::new(script);
        let mut handle = VideoPipeline::new(Box::new(device), 600, 400)
            .spawn(Duration::from_millis(10))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.latest().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.latest().is_some());

        handle.stop();
        assert!(!handle.is_running());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        handle.stop();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_handle_releases() {
        let (device, releases) = ScriptedDevice::new(vec![]);
        let handle = VideoPipeline::new(Box::new(device), 600, 400)
            .spawn(Duration::from_millis(10))
            .unwrap();
        drop(handle);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
