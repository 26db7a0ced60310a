use std::collections::VecDeque;
use std::time::SystemTime;

use arm_link::drivers::{ConnectionEvent, ConnectionState};
use arm_link::mode::Mode;
use arm_link::session::ConsoleSession;
use arm_link::LinkError;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

const LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    /// Joint targets while idle, calibration targets while calibrating.
    Targets,
    Xyz,
    Speed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: LogLevel,
    pub message: String,
}

pub struct AppState {
    pub selected: usize,
    pub log: VecDeque<LogEntry>,
    pub status_message: String,
    pub connection: ConnectionState,
    pub should_quit: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            selected: 0,
            log: VecDeque::new(),
            status_message: "Connecting...".to_string(),
            connection: ConnectionState::Connecting,
            should_quit: false,
        }
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.log.push_back(LogEntry {
            timestamp: SystemTime::now(),
            level,
            message,
        });
        if self.log.len() > LOG_CAPACITY {
            self.log.pop_front();
        }
    }

    /// Folds one connection event into the diagnostics log.
    pub fn record_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                self.status_message = "Connected".to_string();
                self.add_info("Connection opened");
            }
            ConnectionEvent::Message(text) => match event_reply(&text) {
                Some((true, shown)) => self.add_info(format!("Controller: {}", shown)),
                Some((false, shown)) => self.add_error(format!("Controller: {}", shown)),
                None => self.add_info(format!("Received: {}", text)),
            },
            ConnectionEvent::Error(e) => {
                self.status_message = e.to_string();
                self.add_error(e.to_string());
            }
            ConnectionEvent::Closed => {
                self.status_message = "Connection closed".to_string();
                self.add_error("Connection closed");
            }
        }
    }

    /// The control rows in display order for the current mode.
    pub fn rows(&self, session: &ConsoleSession) -> Vec<(Group, usize)> {
        let mode = session.mode();
        let targets = mode.active_targets().len();
        let xyz = mode.state().xyz.len();
        (0..targets)
            .map(|i| (Group::Targets, i))
            .chain((0..xyz).map(|i| (Group::Xyz, i)))
            .chain(std::iter::once((Group::Speed, 0)))
            .collect()
    }

    pub fn selected_row(&self, session: &ConsoleSession) -> Option<(Group, usize)> {
        let rows = self.rows(session);
        rows.get(self.selected.min(rows.len().saturating_sub(1))).copied()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn event_reply(text: &str) -> Option<(bool, String)> {
    let reply: arm_link::packets::ControllerReply = text.parse().ok()?;
    Some((reply.code.is_ok(), reply.to_string()))
}

fn adjust(session: &mut ConsoleSession, row: (Group, usize), delta: f64) -> Option<f64> {
    let calibrating = session.mode().mode() == Mode::Calibrating;
    let mode = session.mode_mut();
    match row {
        (Group::Targets, i) if calibrating => mode.calibration_mut().nudge(i, delta),
        (Group::Targets, i) => mode.joints_mut().nudge(i, delta),
        (Group::Xyz, i) => mode.xyz_mut().nudge(i, delta),
        (Group::Speed, _) => mode.speed_mut().nudge(0, delta),
    }
}

fn report<T: std::fmt::Display>(state: &mut AppState, action: &str, result: Result<T, LinkError>) {
    match result {
        Ok(done) => {
            info!("{}: {}", action, done);
            state.add_info(format!("{}: {}", action, done));
        }
        Err(e) => {
            warn!("{} failed: {}", action, e);
            state.add_error(format!("{} failed: {}", action, e));
        }
    }
}

pub fn handle_key_event(key: KeyEvent, session: &mut ConsoleSession, state: &mut AppState) {
    let step = if key.modifiers.contains(KeyModifiers::SHIFT) { 10.0 } else { 1.0 };
    let row_count = state.rows(session).len();

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => state.should_quit = true,
        KeyCode::Up => state.selected = state.selected.saturating_sub(1),
        KeyCode::Down => state.selected = (state.selected + 1).min(row_count.saturating_sub(1)),
        KeyCode::Left | KeyCode::Right => {
            let delta = if key.code == KeyCode::Left { -step } else { step };
            if let Some(row) = state.selected_row(session) {
                adjust(session, row, delta);
            }
        }
        KeyCode::Enter => {
            let label = session.mode().send_label();
            let result = session.send_targets();
            report(state, label, result);
        }
        KeyCode::Char('x') => {
            let result = session.send_xyz();
            report(state, "Send xyz", result);
        }
        KeyCode::Char('s') => {
            let result = session.send_speed();
            report(state, "Send speed", result);
        }
        KeyCode::Char('g') => {
            let result = session.toggle_gripper().map(|gripper| format!("{:?}", gripper));
            report(state, "Gripper", result);
        }
        KeyCode::Char('c') => {
            let result = session.toggle_calibration();
            report(state, "Mode", result);
            // the target rows may have changed length
            state.selected = state.selected.min(state.rows(session).len().saturating_sub(1));
        }
        KeyCode::Char('0') => {
            session.mode_mut().zero_joints();
            state.add_info("Joint targets zeroed");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm_link::drivers::{ConnectionConfig, ConnectionManager};
    use arm_link::mode::ModeController;
    use arm_link::targets::ControlLayout;

    fn offline() -> ConsoleSession {
        let mode = ModeController::new(&ControlLayout::default(), vec![-90.0, 0.0, 0.0, 0.0, 0.0], 50.0).unwrap();
        let (link, events) = ConnectionManager::new(ConnectionConfig::default());
        ConsoleSession::from_parts(mode, link, events, None)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn arrows_select_and_adjust() {
        let mut session = offline();
        let mut state = AppState::new();

        handle_key_event(press(KeyCode::Down), &mut session, &mut state);
        handle_key_event(press(KeyCode::Right), &mut session, &mut state);
        handle_key_event(KeyEvent::new(KeyCode::Right, KeyModifiers::SHIFT), &mut session, &mut state);
        assert_eq!(session.mode().state().joints.get(1), Some(11.0));

        // past the last row the selection sticks on speed
        for _ in 0..20 {
            handle_key_event(press(KeyCode::Down), &mut session, &mut state);
        }
        assert_eq!(state.selected_row(&session), Some((Group::Speed, 0)));
        handle_key_event(press(KeyCode::Left), &mut session, &mut state);
        assert_eq!(session.mode().state().speed.get(0), Some(49.0));
    }

    #[test]
    fn offline_send_is_logged_as_error() {
        let mut session = offline();
        let mut state = AppState::new();
        handle_key_event(press(KeyCode::Enter), &mut session, &mut state);
        let last = state.log.back().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.message.contains("Not connected"));
    }

    #[test]
    fn zero_and_quit() {
        let mut session = offline();
        let mut state = AppState::new();
        session.mode_mut().joints_mut().set(0, 90.0);
        handle_key_event(press(KeyCode::Char('0')), &mut session, &mut state);
        assert_eq!(session.mode().state().joints.get(0), Some(0.0));
        handle_key_event(press(KeyCode::Char('q')), &mut session, &mut state);
        assert!(state.should_quit);
    }

    #[test]
    fn replies_are_classified() {
        let mut state = AppState::new();
        state.record_event(ConnectionEvent::Opened);
        state.record_event(ConnectionEvent::Message("0$".into()));
        state.record_event(ConnectionEvent::Message("10$Command with identifier: 2 not found.".into()));
        state.record_event(ConnectionEvent::Message("hello".into()));

        let levels: Vec<LogLevel> = state.log.iter().map(|entry| entry.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Info, LogLevel::Error, LogLevel::Info]);
        assert_eq!(state.log[3].message, "Received: hello");
        assert_eq!(state.status_message, "Connected");
    }

    #[test]
    fn log_is_bounded() {
        let mut state = AppState::new();
        for i in 0..(LOG_CAPACITY + 10) {
            state.add_info(format!("line {}", i));
        }
        assert_eq!(state.log.len(), LOG_CAPACITY);
        assert_eq!(state.log.front().unwrap().message, "line 10");
    }
}
