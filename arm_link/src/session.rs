use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::ConsoleConfig;
use crate::drivers::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::mode::{GripperState, Mode, ModeController};
use crate::packets::Command;
use crate::video::{open_device, Frame, PipelineHandle, PipelineStats, VideoPipeline};
use crate::LinkError;

/// One operator session: the mode controller, the controller connection and the video
/// pipeline, each exclusively owned here.
///
/// Connection events are drained on the caller's own schedule through
/// [`ConsoleSession::poll_events`], never applied from the I/O task.
pub struct ConsoleSession {
    mode: ModeController,
    link: ConnectionManager,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    video: Option<PipelineHandle>,
}

impl ConsoleSession {
    /// Validates `config`, builds the session from it and starts connecting.
    ///
    /// A capture device that cannot be opened is logged and the session runs without video.
    pub fn start(config: &ConsoleConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let mode = ModeController::new(&config.controls, config.neutral_pose.clone(), config.speed_default)?;
        let (link, events) = ConnectionManager::new(config.connection.clone());

        let video = match open_device(&config.video.source) {
            Ok(device) => {
                info!("Opened capture device {}", device.name());
                let pipeline = VideoPipeline::new(device, config.video.width, config.video.height);
                match pipeline.spawn(config.video.tick_interval()) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!("Video disabled: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("Video disabled: {}", e);
                None
            }
        };

        link.connect_default()?;
        Ok(Self {
            mode,
            link,
            events,
            video,
        })
    }

    /// Assembles a session from parts already built, without connecting.
    pub fn from_parts(
        mode: ModeController,
        link: ConnectionManager,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
        video: Option<PipelineHandle>,
    ) -> Self {
        Self {
            mode,
            link,
            events,
            video,
        }
    }

    /// Every connection event posted since the last call, oldest first.
    pub fn poll_events(&mut self) -> Vec<ConnectionEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn mode(&self) -> &ModeController {
        &self.mode
    }

    pub fn mode_mut(&mut self) -> &mut ModeController {
        &mut self.mode
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.link
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn toggle_calibration(&mut self) -> Result<Mode, LinkError> {
        self.mode.toggle(&self.link)
    }

    pub fn send_targets(&self) -> Result<Command, LinkError> {
        self.mode.send_targets(&self.link)
    }

    pub fn send_xyz(&self) -> Result<Command, LinkError> {
        self.mode.send_xyz(&self.link)
    }

    pub fn send_speed(&self) -> Result<Command, LinkError> {
        self.mode.send_speed(&self.link)
    }

    pub fn toggle_gripper(&mut self) -> Result<GripperState, LinkError> {
        self.mode.toggle_gripper(&self.link)
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.video.as_ref().and_then(PipelineHandle::latest)
    }

    pub fn video_stats(&self) -> Option<&PipelineStats> {
        self.video.as_ref().map(PipelineHandle::stats)
    }

    /// Releases the capture device, then closes the connection.
    ///
    /// Neither step depends on the other succeeding. Joining the capture thread runs on
    /// the blocking pool. If this is never reached the pipeline handle still releases the
    /// device when dropped.
    pub async fn shutdown(mut self) {
        if let Some(mut video) = self.video.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || video.stop()).await {
                error!("Stopping the video pipeline failed: {}", e);
            }
        }
        self.link.close().await;
        info!("Session shut down");
    }
}
