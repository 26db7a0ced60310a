use std::time::Duration;

use arm_link::drivers::ConnectionState;
use arm_link::mode::{GripperState, Mode};
use arm_link::session::ConsoleSession;
use arm_link::targets::JointTargetSet;
use arm_link::video::Frame as VideoFrame;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{AppState, Group, LogLevel};

const BRIGHTNESS_RAMP: &[u8] = b" .:-=+*#%@";

pub fn ui(f: &mut Frame, session: &ConsoleSession, state: &AppState) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Status bar
            Constraint::Min(12),    // Controls and video
            Constraint::Length(10), // Log and help
        ])
        .split(f.area());

    render_status_bar(f, main_chunks[0], session, state);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(main_chunks[1]);
    render_controls(f, middle[0], session, state);
    render_video(f, middle[1], session);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[2]);
    render_log(f, bottom[0], state);
    render_help_panel(f, bottom[1], session);
}

fn render_status_bar(f: &mut Frame, area: Rect, session: &ConsoleSession, state: &AppState) {
    let mode = session.mode();
    let connection_color = match state.connection {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting | ConnectionState::Closing => Color::Yellow,
        ConnectionState::Disconnected | ConnectionState::Closed => Color::Red,
    };
    let (mode_text, mode_color) = match mode.mode() {
        Mode::Idle => ("Idle", Color::Green),
        Mode::Calibrating => ("Calibrating", Color::Magenta),
    };
    let gripper = match mode.state().gripper {
        GripperState::Open => "Open",
        GripperState::Closed => "Closed",
    };

    let line = Line::from(vec![
        Span::styled("Link: ", Style::default().fg(Color::Cyan)),
        Span::styled(state.connection.to_string(), Style::default().fg(connection_color)),
        Span::raw("  "),
        Span::styled("Mode: ", Style::default().fg(Color::Cyan)),
        Span::styled(mode_text, Style::default().fg(mode_color).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled("Gripper: ", Style::default().fg(Color::Cyan)),
        Span::raw(gripper),
        Span::raw("  "),
        Span::styled("Status: ", Style::default().fg(Color::Cyan)),
        Span::raw(&state.status_message),
    ]);
    let bar = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Arm Console"));
    f.render_widget(bar, area);
}

fn control_lines<'a>(
    title: &'a str,
    group: Group,
    targets: &'a JointTargetSet,
    selected: Option<(Group, usize)>,
) -> Vec<Line<'a>> {
    let mut lines = vec![Line::from(Span::styled(
        title,
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    ))];
    for (i, control) in targets.controls().iter().enumerate() {
        let value = targets.get(i).unwrap_or_default();
        let marker = if selected == Some((group, i)) { "> " } else { "  " };
        let style = if selected == Some((group, i)) {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{}{:<12}", marker, control.label), style),
            Span::styled(format!("{:>8.1}", value), style.add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("  [{}, {}]", control.min, control.max),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }
    lines
}

fn render_controls(f: &mut Frame, area: Rect, session: &ConsoleSession, state: &AppState) {
    let mode = session.mode();
    let selected = state.selected_row(session);
    let title = match mode.mode() {
        Mode::Idle => "Joints",
        Mode::Calibrating => "Calibration",
    };

    let mut lines = control_lines(title, Group::Targets, mode.active_targets(), selected);
    lines.push(Line::from(""));
    lines.extend(control_lines("XYZ", Group::Xyz, &mode.state().xyz, selected));
    lines.push(Line::from(""));
    lines.extend(control_lines("Speed", Group::Speed, &mode.state().speed, selected));

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(mode.send_label())
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(paragraph, area);
}

fn render_video(f: &mut Frame, area: Rect, session: &ConsoleSession) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(video_title(session))
        .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);

    let text = match session.latest_frame() {
        Some(frame) => frame_to_ascii(&frame, usize::from(inner.width), usize::from(inner.height)),
        None => vec!["no frame".to_string()],
    };
    let lines: Vec<Line> = text.into_iter().map(Line::from).collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn video_title(session: &ConsoleSession) -> String {
    match (session.latest_frame(), session.video_stats()) {
        (Some(frame), Some(stats)) => {
            let age = frame.captured_at.elapsed();
            format!(
                "Video #{} ({} ms old, {} skipped)",
                frame.sequence,
                age.min(Duration::from_secs(99)).as_millis(),
                stats.skipped()
            )
        }
        (None, Some(_)) => "Video (waiting)".to_string(),
        _ => "Video (unavailable)".to_string(),
    }
}

/// Samples `frame` onto a `cols` x `rows` grid of brightness characters.
pub fn frame_to_ascii(frame: &VideoFrame, cols: usize, rows: usize) -> Vec<String> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    if width == 0 || height == 0 || cols == 0 || rows == 0 {
        return vec!["no frame".to_string()];
    }

    let max_row = height.saturating_sub(1);
    let row_den = rows.saturating_sub(1).max(1);
    (0..rows)
        .map(|ty| {
            let sy = if rows <= 1 { 0 } else { ty.saturating_mul(max_row) / row_den };
            (0..cols)
                .map(|tx| {
                    let sx = (tx.saturating_mul(width) / cols).min(width.saturating_sub(1));
                    let lum = frame.luma(sx as u32, sy as u32) as usize;
                    let idx = lum * (BRIGHTNESS_RAMP.len() - 1) / 255;
                    BRIGHTNESS_RAMP[idx] as char
                })
                .collect()
        })
        .collect()
}

fn render_log(f: &mut Frame, area: Rect, state: &AppState) {
    let items: Vec<ListItem> = state
        .log
        .iter()
        .rev() // Show newest first
        .map(|entry| {
            let elapsed = entry.timestamp.elapsed().unwrap_or(Duration::ZERO);
            let time_str = if elapsed.as_secs() < 60 {
                format!("{}s", elapsed.as_secs())
            } else {
                format!("{}m", elapsed.as_secs() / 60)
            };
            let (marker, color) = match entry.level {
                LogLevel::Info => ("✓ ", Color::Green),
                LogLevel::Error => ("⚠ ", Color::Red),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", time_str), Style::default().fg(Color::DarkGray)),
                Span::styled(marker, Style::default().fg(color)),
                Span::raw(entry.message.as_str()),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Diagnostics")
            .border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(list, area);
}

fn render_help_panel(f: &mut Frame, area: Rect, session: &ConsoleSession) {
    let help_text = vec![
        Line::from(Span::styled("Controls:", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  ↑/↓ select  ←/→ adjust (Shift ×10)"),
        Line::from(format!("  Enter={}", session.mode().send_label())),
        Line::from("  x=Send xyz  s=Send speed  g=Gripper"),
        Line::from("  c=Toggle calibration  0=Zero joints"),
        Line::from("  q=Quit"),
    ];
    let help = Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm_link::video::{ChannelOrder, RawFrame};

    fn solid(px: [u8; 3]) -> VideoFrame {
        let raw = RawFrame {
            data: px.repeat(16),
            width: 4,
            height: 4,
            order: ChannelOrder::Rgb,
        };
        VideoFrame::from_raw(raw, 4, 4, 0).unwrap()
    }

    #[test]
    fn ascii_grid_has_requested_shape() {
        let art = frame_to_ascii(&solid([255, 255, 255]), 10, 3);
        assert_eq!(art.len(), 3);
        assert!(art.iter().all(|row| row == "@@@@@@@@@@"));
    }

    #[test]
    fn black_is_blank_and_empty_areas_are_handled() {
        let art = frame_to_ascii(&solid([0, 0, 0]), 2, 2);
        assert_eq!(art, vec!["  ".to_string(), "  ".to_string()]);
        assert_eq!(frame_to_ascii(&solid([0, 0, 0]), 0, 5), vec!["no frame".to_string()]);
    }
}
