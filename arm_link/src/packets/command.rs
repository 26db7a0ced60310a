use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LinkError;

/// Field delimiter of the wire format.
pub const DELIMITER: char = '$';

/// Protocol-level discriminator of a command.
///
/// The tag emitted on the wire is fixed by the controller firmware; see [`CommandKind::tag`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    JointMove,
    XyzMove,
    SetSpeed,
    EnterCalibration,
    ExitCalibration,
    OpenGripper,
    CloseGripper,
    CalibrateTargets,
}

impl CommandKind {
    pub const ALL: [CommandKind; 8] = [
        CommandKind::JointMove,
        CommandKind::XyzMove,
        CommandKind::SetSpeed,
        CommandKind::EnterCalibration,
        CommandKind::ExitCalibration,
        CommandKind::OpenGripper,
        CommandKind::CloseGripper,
        CommandKind::CalibrateTargets,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::JointMove => "3",
            CommandKind::XyzMove => "5",
            CommandKind::SetSpeed => "4",
            CommandKind::EnterCalibration => "6",
            CommandKind::ExitCalibration => "1",
            CommandKind::OpenGripper => "7",
            CommandKind::CloseGripper => "8",
            CommandKind::CalibrateTargets => "calibrate",
        }
    }

    /// Number of parameters the controller expects after the tag.
    pub fn arity(self) -> usize {
        match self {
            CommandKind::JointMove => 5,
            CommandKind::XyzMove => 3,
            CommandKind::SetSpeed => 1,
            CommandKind::EnterCalibration
            | CommandKind::ExitCalibration
            | CommandKind::OpenGripper
            | CommandKind::CloseGripper => 0,
            CommandKind::CalibrateTargets => 3,
        }
    }

    pub fn from_tag(tag: &str) -> Option<CommandKind> {
        CommandKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::JointMove => "joint-move",
            CommandKind::XyzMove => "xyz-move",
            CommandKind::SetSpeed => "set-speed",
            CommandKind::EnterCalibration => "enter-calibration",
            CommandKind::ExitCalibration => "exit-calibration",
            CommandKind::OpenGripper => "open-gripper",
            CommandKind::CloseGripper => "close-gripper",
            CommandKind::CalibrateTargets => "calibrate-targets",
        };
        write!(f, "{} ({})", name, self.tag())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Param {
    Number(f64),
    Text(String),
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Number(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Number(value as f64)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Number(value) => write!(f, "{}", canonical_number(*value)),
            Param::Text(text) => write!(f, "{}", text),
        }
    }
}

// Integral values print without a fractional part, everything else uses the
// shortest round-trip representation. Neither depends on locale.
fn canonical_number(value: f64) -> String {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0; // 2^53
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        if value == 0.0 {
            return "0".to_string();
        }
        return format!("{}", value as i64);
    }
    format!("{}", value)
}

/// A single immutable command, validated against its kind's arity on construction.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    params: Vec<Param>,
}

impl Command {
    pub fn new(kind: CommandKind, params: Vec<Param>) -> Result<Self, LinkError> {
        check_params(kind, &params)?;
        Ok(Self { kind, params })
    }

    pub fn joint_move(targets: [f64; 5]) -> Self {
        Self::numeric(CommandKind::JointMove, &targets)
    }

    pub fn xyz_move(targets: [f64; 3]) -> Self {
        Self::numeric(CommandKind::XyzMove, &targets)
    }

    pub fn set_speed(speed: f64) -> Self {
        Self::numeric(CommandKind::SetSpeed, &[speed])
    }

    pub fn calibrate(targets: [f64; 3]) -> Self {
        Self::numeric(CommandKind::CalibrateTargets, &targets)
    }

    pub fn enter_calibration() -> Self {
        Self::numeric(CommandKind::EnterCalibration, &[])
    }

    pub fn exit_calibration() -> Self {
        Self::numeric(CommandKind::ExitCalibration, &[])
    }

    pub fn open_gripper() -> Self {
        Self::numeric(CommandKind::OpenGripper, &[])
    }

    pub fn close_gripper() -> Self {
        Self::numeric(CommandKind::CloseGripper, &[])
    }

    /// Builds a command from a target snapshot whose length is only known at runtime.
    pub fn from_values(kind: CommandKind, values: &[f64]) -> Result<Self, LinkError> {
        check_arity(kind, values.len())?;
        Ok(Self::numeric(kind, values))
    }

    // callers guarantee the arity
    fn numeric(kind: CommandKind, values: &[f64]) -> Self {
        Self {
            kind,
            params: values.iter().copied().map(Param::Number).collect(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn encode(&self) -> String {
        render(self.kind, &self.params)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Command {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.trim_end_matches(&['\r', '\n'][..]).split(DELIMITER);
        let tag = fields.next().unwrap_or_default();
        let kind = CommandKind::from_tag(tag)
            .ok_or_else(|| LinkError::UnknownCommandKind(tag.to_string()))?;

        // every kind the controller knows carries numeric fields only
        let params = fields
            .map(|field| {
                field
                    .parse::<f64>()
                    .map(Param::Number)
                    .map_err(|_| LinkError::MalformedParam(field.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Command::new(kind, params)
    }
}

/// Encodes `kind` and `params` as `"<tag>$<p0>$...$<pn>"`.
///
/// Values are never inspected, only counted: range checks belong to whoever produced them.
///
/// # Errors
///
/// Returns [`LinkError::InvalidCommandArity`] when `params.len()` differs from
/// [`CommandKind::arity`], and [`LinkError::MalformedParam`] when a text param contains
/// the delimiter.
///
/// # Example
///
/// ```
/// use arm_link::packets::{encode, CommandKind, Param};
///
/// let params: Vec<Param> = [0, -90, 0, 0, 0].into_iter().map(Param::from).collect();
/// assert_eq!(encode(CommandKind::JointMove, &params).unwrap(), "3$0$-90$0$0$0");
/// ```
pub fn encode(kind: CommandKind, params: &[Param]) -> Result<String, LinkError> {
    check_params(kind, params)?;
    Ok(render(kind, params))
}

fn render(kind: CommandKind, params: &[Param]) -> String {
    let mut out = String::from(kind.tag());
    for param in params {
        out.push(DELIMITER);
        out.push_str(&param.to_string());
    }
    out
}

// a delimiter inside a text param would add fields on the wire
fn check_params(kind: CommandKind, params: &[Param]) -> Result<(), LinkError> {
    check_arity(kind, params.len())?;
    match params.iter().find(|param| matches!(param, Param::Text(text) if text.contains(DELIMITER))) {
        Some(param) => Err(LinkError::MalformedParam(param.to_string())),
        None => Ok(()),
    }
}

fn check_arity(kind: CommandKind, actual: usize) -> Result<(), LinkError> {
    let expected = kind.arity();
    if expected != actual {
        return Err(LinkError::InvalidCommandArity { kind, expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Vec<Param> {
        values.iter().copied().map(Param::Number).collect()
    }

    #[test]
    fn joint_move_literal() {
        let encoded = encode(CommandKind::JointMove, &numbers(&[0.0, -90.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(encoded, "3$0$-90$0$0$0");
    }

    #[test]
    fn parameterless_kinds_are_just_the_tag() {
        assert_eq!(Command::enter_calibration().encode(), "6");
        assert_eq!(Command::exit_calibration().encode(), "1");
        assert_eq!(Command::open_gripper().encode(), "7");
        assert_eq!(Command::close_gripper().encode(), "8");
    }

    #[test]
    fn calibrate_uses_word_tag() {
        assert_eq!(Command::calibrate([10.0, 20.5, 0.0]).encode(), "calibrate$10$20.5$0");
    }

    #[test]
    fn numbers_render_canonically() {
        assert_eq!(Param::Number(-0.0).to_string(), "0");
        assert_eq!(Param::Number(100.0).to_string(), "100");
        assert_eq!(Param::Number(0.1).to_string(), "0.1");
        assert_eq!(Param::Number(-12.25).to_string(), "-12.25");
        assert_eq!(Param::Number(1e20).to_string(), "100000000000000000000");
    }

    #[test]
    fn arity_mismatch_fails_the_call() {
        let err = encode(CommandKind::SetSpeed, &numbers(&[1.0, 2.0])).unwrap_err();
        assert_eq!(
            err,
            LinkError::InvalidCommandArity {
                kind: CommandKind::SetSpeed,
                expected: 1,
                actual: 2
            }
        );

        assert!(Command::new(CommandKind::JointMove, numbers(&[1.0])).is_err());
        assert!(Command::from_values(CommandKind::CalibrateTargets, &[1.0, 2.0, 3.0, 4.0]).is_err());
    }

    #[test]
    fn text_param_with_delimiter_is_rejected() {
        let err = encode(CommandKind::SetSpeed, &[Param::from("1$2")]).unwrap_err();
        assert_eq!(err, LinkError::MalformedParam("1$2".to_string()));
        assert!(Command::new(CommandKind::SetSpeed, vec![Param::from("1$2")]).is_err());

        // plain text still passes through
        assert_eq!(encode(CommandKind::SetSpeed, &[Param::from("75")]).unwrap(), "4$75");
    }

    #[test]
    fn values_are_never_validated() {
        let encoded = encode(CommandKind::SetSpeed, &numbers(&[1e6])).unwrap();
        assert_eq!(encoded, "4$1000000");
    }

    #[test]
    fn tags_are_unique() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(CommandKind::from_tag("2"), None);
    }

    #[test]
    fn parse_reads_back_wire_text() {
        let command: Command = "3$0$-90$0$0$0".parse().unwrap();
        assert_eq!(command, Command::joint_move([0.0, -90.0, 0.0, 0.0, 0.0]));

        let command: Command = "7\r\n".parse().unwrap();
        assert_eq!(command.kind(), CommandKind::OpenGripper);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "9$1".parse::<Command>().unwrap_err(),
            LinkError::UnknownCommandKind("9".to_string())
        );
        assert_eq!(
            "4$fast".parse::<Command>().unwrap_err(),
            LinkError::MalformedParam("fast".to_string())
        );
        assert!(matches!(
            "3$1$2".parse::<Command>().unwrap_err(),
            LinkError::InvalidCommandArity { expected: 5, actual: 2, .. }
        ));
    }
}
