//! Operating mode state machine and the session state it owns.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::packets::{Command, CommandKind, CommandSink};
use crate::targets::{ControlLayout, JointTargetSet};
use crate::LinkError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    Calibrating,
}

impl Mode {
    /// Whether a command of `kind` may be sent by the operator in this mode.
    ///
    /// Entering and leaving calibration is reserved for [`ModeController::toggle`].
    pub fn permits(self, kind: CommandKind) -> bool {
        match (self, kind) {
            (_, CommandKind::EnterCalibration | CommandKind::ExitCalibration) => false,
            (Mode::Idle, CommandKind::CalibrateTargets) => false,
            (Mode::Idle, _) => true,
            (Mode::Calibrating, CommandKind::CalibrateTargets) => true,
            (Mode::Calibrating, _) => false,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Idle => write!(f, "idle"),
            Mode::Calibrating => write!(f, "calibrating"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperState {
    Open,
    Closed,
}

/// Everything the operator can change, owned by one [`ModeController`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub mode: Mode,
    pub joints: JointTargetSet,
    pub xyz: JointTargetSet,
    pub calibration: JointTargetSet,
    pub speed: JointTargetSet,
    pub gripper: GripperState,
}

impl SessionState {
    pub fn new(layout: &ControlLayout) -> Self {
        Self {
            mode: Mode::Idle,
            joints: JointTargetSet::new(layout.joints.clone()),
            xyz: JointTargetSet::new(layout.xyz.clone()),
            calibration: JointTargetSet::new(layout.calibration.clone()),
            speed: JointTargetSet::new(vec![layout.speed.clone()]),
            gripper: GripperState::Open,
        }
    }
}

/// Two-state mode machine gating what the operator may send.
///
/// All mutation goes through `&mut self`, so a toggle (emission plus state change)
/// always completes before the next one can start.
#[derive(Debug, Clone)]
pub struct ModeController {
    state: SessionState,
    neutral_pose: Vec<f64>,
}

impl ModeController {
    pub fn new(layout: &ControlLayout, neutral_pose: Vec<f64>, speed_default: f64) -> Result<Self, LinkError> {
        layout.validate()?;
        let mut state = SessionState::new(layout);
        // fails early on a pose of the wrong length; joints still start at zero
        JointTargetSet::new(layout.joints.clone()).apply(&neutral_pose)?;
        state.speed.set(0, speed_default);
        Ok(Self { state, neutral_pose })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn neutral_pose(&self) -> &[f64] {
        &self.neutral_pose
    }

    /// Flips between `Idle` and `Calibrating`.
    ///
    /// Entering emits the enter-calibration command. Leaving emits exit-calibration and
    /// then resets every joint target to the neutral pose. If the emission fails the
    /// mode is left untouched and the error is returned.
    pub fn toggle(&mut self, sink: &impl CommandSink) -> Result<Mode, LinkError> {
        match self.state.mode {
            Mode::Idle => {
                sink.submit(&Command::enter_calibration())?;
                self.state.mode = Mode::Calibrating;
            }
            Mode::Calibrating => {
                sink.submit(&Command::exit_calibration())?;
                self.state.mode = Mode::Idle;
                self.state.joints.apply(&self.neutral_pose)?;
            }
        }
        info!("Mode is now {}", self.state.mode);
        Ok(self.state.mode)
    }

    /// The "send" action: joint targets when idle, calibration targets while calibrating.
    ///
    /// Values are snapshotted at call time.
    pub fn send_targets(&self, sink: &impl CommandSink) -> Result<Command, LinkError> {
        let command = match self.state.mode {
            Mode::Idle => Command::from_values(CommandKind::JointMove, &self.state.joints.snapshot())?,
            Mode::Calibrating => Command::from_values(
                CommandKind::CalibrateTargets,
                &self.state.calibration.snapshot(),
            )?,
        };
        self.submit_permitted(sink, command)
    }

    pub fn send_xyz(&self, sink: &impl CommandSink) -> Result<Command, LinkError> {
        let command = Command::from_values(CommandKind::XyzMove, &self.state.xyz.snapshot())?;
        self.submit_permitted(sink, command)
    }

    pub fn send_speed(&self, sink: &impl CommandSink) -> Result<Command, LinkError> {
        let command = Command::from_values(CommandKind::SetSpeed, &self.state.speed.snapshot())?;
        self.submit_permitted(sink, command)
    }

    /// Closes an open gripper or opens a closed one. The recorded state only flips once
    /// the command has been handed to the sink.
    pub fn toggle_gripper(&mut self, sink: &impl CommandSink) -> Result<GripperState, LinkError> {
        let (command, next) = match self.state.gripper {
            GripperState::Open => (Command::close_gripper(), GripperState::Closed),
            GripperState::Closed => (Command::open_gripper(), GripperState::Open),
        };
        self.submit_permitted(sink, command)?;
        self.state.gripper = next;
        Ok(next)
    }

    /// Label for the send action, reflecting the current mode.
    pub fn send_label(&self) -> &'static str {
        match self.state.mode {
            Mode::Idle => "Send commands",
            Mode::Calibrating => "Send calibration",
        }
    }

    /// Targets the send action currently reads from.
    pub fn active_targets(&self) -> &JointTargetSet {
        match self.state.mode {
            Mode::Idle => &self.state.joints,
            Mode::Calibrating => &self.state.calibration,
        }
    }

    pub fn joints_mut(&mut self) -> &mut JointTargetSet {
        &mut self.state.joints
    }

    pub fn xyz_mut(&mut self) -> &mut JointTargetSet {
        &mut self.state.xyz
    }

    pub fn calibration_mut(&mut self) -> &mut JointTargetSet {
        &mut self.state.calibration
    }

    pub fn speed_mut(&mut self) -> &mut JointTargetSet {
        &mut self.state.speed
    }

    /// Sets every joint target to zero (clamped). Local only, nothing is sent.
    pub fn zero_joints(&mut self) {
        self.state.joints.zero();
    }

    fn submit_permitted(&self, sink: &impl CommandSink, command: Command) -> Result<Command, LinkError> {
        if !self.state.mode.permits(command.kind()) {
            return Err(LinkError::NotPermitted {
                kind: command.kind(),
                mode: self.state.mode,
            });
        }
        sink.submit(&command)?;
        debug!("Submitted {}", command);
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        sent: RefCell<Vec<String>>,
        offline: bool,
    }

    impl CommandSink for RecordingSink {
        fn submit(&self, command: &Command) -> Result<(), LinkError> {
            if self.offline {
                return Err(LinkError::NotConnected);
            }
            self.sent.borrow_mut().push(command.encode());
            Ok(())
        }
    }

    fn controller() -> ModeController {
        ModeController::new(&ControlLayout::default(), vec![-90.0, 0.0, 0.0, 0.0, 0.0], 50.0).unwrap()
    }

    #[test]
    fn calibration_round_trip_emits_six_then_one_and_resets() {
        let sink = RecordingSink::default();
        let mut mode = controller();
        mode.joints_mut().set(2, 45.0);

        assert_eq!(mode.toggle(&sink).unwrap(), Mode::Calibrating);
        assert_eq!(mode.send_label(), "Send calibration");
        assert_eq!(mode.toggle(&sink).unwrap(), Mode::Idle);

        assert_eq!(*sink.sent.borrow(), vec!["6".to_string(), "1".to_string()]);
        // w is clamped to its lower bound of 5
        assert_eq!(mode.state().joints.snapshot(), vec![-90.0, 0.0, 0.0, 0.0, 5.0]);
    }

    #[test]
    fn double_toggle_reproduces_the_same_pose() {
        let sink = RecordingSink::default();
        let mut mode = controller();
        mode.toggle(&sink).unwrap();
        mode.toggle(&sink).unwrap();
        let first = mode.state().joints.snapshot();

        mode.joints_mut().set(0, 100.0);
        mode.toggle(&sink).unwrap();
        mode.toggle(&sink).unwrap();
        assert_eq!(mode.state().joints.snapshot(), first);
        assert_eq!(mode.mode(), Mode::Idle);
    }

    #[test]
    fn send_targets_follows_the_mode() {
        let sink = RecordingSink::default();
        let mut mode = controller();
        mode.joints_mut().set(1, -20.0);
        mode.calibration_mut().set(0, 12.0);

        assert_eq!(mode.send_targets(&sink).unwrap().kind(), CommandKind::JointMove);
        mode.toggle(&sink).unwrap();
        assert_eq!(mode.send_targets(&sink).unwrap().kind(), CommandKind::CalibrateTargets);

        let sent = sink.sent.borrow();
        assert_eq!(sent[0], "3$0$-20$0$0$5");
        assert_eq!(sent[2], "calibrate$12$0$0");
    }

    #[test]
    fn calibrating_gates_motion_and_gripper() {
        let sink = RecordingSink::default();
        let mut mode = controller();
        mode.toggle(&sink).unwrap();

        assert!(matches!(mode.send_speed(&sink), Err(LinkError::NotPermitted { .. })));
        assert!(matches!(mode.send_xyz(&sink), Err(LinkError::NotPermitted { .. })));
        assert!(matches!(mode.toggle_gripper(&sink), Err(LinkError::NotPermitted { .. })));
        assert_eq!(mode.state().gripper, GripperState::Open);
        assert_eq!(sink.sent.borrow().len(), 1);
    }

    #[test]
    fn failed_emission_leaves_mode_untouched() {
        let sink = RecordingSink {
            offline: true,
            ..Default::default()
        };
        let mut mode = controller();
        assert_eq!(mode.toggle(&sink), Err(LinkError::NotConnected));
        assert_eq!(mode.mode(), Mode::Idle);
        assert_eq!(mode.toggle_gripper(&sink), Err(LinkError::NotConnected));
        assert_eq!(mode.state().gripper, GripperState::Open);
    }

    #[test]
    fn gripper_alternates_close_and_open() {
        let sink = RecordingSink::default();
        let mut mode = controller();
        assert_eq!(mode.toggle_gripper(&sink).unwrap(), GripperState::Closed);
        assert_eq!(mode.toggle_gripper(&sink).unwrap(), GripperState::Open);
        assert_eq!(*sink.sent.borrow(), vec!["8".to_string(), "7".to_string()]);
    }

    #[test]
    fn neutral_pose_must_match_joint_count() {
        assert!(ModeController::new(&ControlLayout::default(), vec![0.0; 3], 50.0).is_err());
    }

    #[test]
    fn inverted_joint_range_is_a_config_error() {
        let mut layout = ControlLayout::default();
        layout.joints[4] = crate::targets::ControlDescriptor::new("Joint w", 180.0, 5.0, "w");
        let err = ModeController::new(&layout, vec![-90.0, 0.0, 0.0, 0.0, 0.0], 50.0).unwrap_err();
        assert!(matches!(err, LinkError::Config(_)), "unexpected error: {:?}", err);
    }

    #[test]
    fn zero_joints_is_local() {
        let sink = RecordingSink::default();
        let mut mode = controller();
        mode.joints_mut().set(0, 30.0);
        mode.zero_joints();
        assert_eq!(mode.state().joints.get(0), Some(0.0));
        assert!(sink.sent.borrow().is_empty());
        let _ = mode.send_speed(&sink).unwrap();
        assert_eq!(*sink.sent.borrow(), vec!["4$50".to_string()]);
    }
}
