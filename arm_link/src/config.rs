//! Console configuration.
//!
//! Layers, lowest priority first:
//! 1. built-in defaults
//! 2. `console.toml` (optional)
//! 3. `ARM_`-prefixed environment variables, `__` between sections
//!    (e.g. `ARM_CONNECTION__ADDRESS=10.0.0.5:8765`)
//! 4. `WEBSOCKET_URL`, which overrides `connection.address`
//!
//! ```no_run
//! use arm_link::config::ConsoleConfig;
//!
//! let config = ConsoleConfig::load()?;
//! config.validate()?;
//! println!("controller at {}", config.connection.connection_url());
//! # Ok::<(), arm_link::LinkError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::drivers::ConnectionConfig;
use crate::packets::CommandKind;
use crate::targets::ControlLayout;
use crate::video::VideoSource;
use crate::LinkError;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub connection: ConnectionConfig,
    pub controls: ControlLayout,
    /// Joint targets restored when leaving calibration, first joint first.
    pub neutral_pose: Vec<f64>,
    pub speed_default: f64,
    pub video: VideoConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub tick_interval_ms: u64,
    pub source: VideoSource,
}

impl VideoConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
            tick_interval_ms: 10,
            source: VideoSource::Synthetic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// The terminal belongs to the UI, so logs go here.
    pub file: PathBuf,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("arm_console.log"),
            level: "info".to_string(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            controls: ControlLayout::default(),
            neutral_pose: vec![-90.0, 0.0, 0.0, 0.0, 0.0],
            speed_default: 50.0,
            video: VideoConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn load() -> Result<Self, LinkError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads every layer, reading the file layer from `path`. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        Ok(Self::figment(path).extract()?)
    }

    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(ConsoleConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ARM_").split("__"))
            .merge(
                Env::raw()
                    .only(&["WEBSOCKET_URL"])
                    .map(|_| "connection.address".into()),
            )
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        self.connection.validate().map_err(LinkError::Config)?;
        self.controls.validate()?;

        let groups = [
            ("joints", self.controls.joints.len(), CommandKind::JointMove),
            ("xyz", self.controls.xyz.len(), CommandKind::XyzMove),
            ("calibration", self.controls.calibration.len(), CommandKind::CalibrateTargets),
        ];
        for (name, len, kind) in groups {
            if len != kind.arity() {
                return Err(LinkError::Config(format!(
                    "{} group has {} controls but {} takes {}",
                    name,
                    len,
                    kind,
                    kind.arity()
                )));
            }
        }

        if self.neutral_pose.len() != self.controls.joints.len() {
            return Err(LinkError::Config(format!(
                "neutral pose has {} values for {} joints",
                self.neutral_pose.len(),
                self.controls.joints.len()
            )));
        }
        for (control, value) in self.controls.joints.iter().zip(&self.neutral_pose) {
            if !control.contains(*value) {
                warn!(
                    "Neutral pose value {} for {} is outside [{}, {}] and will be clamped",
                    value, control.label, control.min, control.max
                );
            }
        }

        if !self.controls.speed.contains(self.speed_default) {
            return Err(LinkError::Config(format!(
                "default speed {} is outside [{}, {}]",
                self.speed_default, self.controls.speed.min, self.controls.speed.max
            )));
        }

        if self.video.width == 0 || self.video.height == 0 {
            return Err(LinkError::Config("video size must be non-zero".to_string()));
        }
        if self.video.tick_interval_ms == 0 {
            return Err(LinkError::Config("video tick interval must be greater than 0".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log.level.as_str()) {
            return Err(LinkError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log.level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }
}
