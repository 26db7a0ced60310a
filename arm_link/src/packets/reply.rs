use std::fmt;
use std::str::FromStr;

use int_enum::IntEnum;
use serde::{Deserialize, Serialize};

use super::DELIMITER;
use crate::LinkError;

/// Status code leading every reply the controller writes back.
#[repr(u8)]
#[derive(Debug, Serialize, Deserialize, IntEnum, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Ok = 0,
    UnknownCommand = 10,
    UnknownError = 11,
}

impl ReplyCode {
    pub fn is_ok(self) -> bool {
        self == ReplyCode::Ok
    }
}

/// A controller reply of the form `"<code>$<context>"`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControllerReply {
    pub code: ReplyCode,
    pub context: String,
}

impl ControllerReply {
    pub fn ok(context: impl Into<String>) -> Self {
        Self {
            code: ReplyCode::Ok,
            context: context.into(),
        }
    }

    pub fn error(code: ReplyCode, err: &LinkError) -> Self {
        Self {
            code,
            context: err.to_string(),
        }
    }

    pub fn to_wire(&self) -> String {
        format!("{}{}{}", u8::from(self.code), DELIMITER, self.context)
    }
}

impl fmt::Display for ControllerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            ReplyCode::Ok if self.context.is_empty() => write!(f, "OK"),
            ReplyCode::Ok => write!(f, "OK: {}", self.context),
            ReplyCode::UnknownCommand => write!(f, "unknown command: {}", self.context),
            ReplyCode::UnknownError => write!(f, "controller error: {}", self.context),
        }
    }
}

impl FromStr for ControllerReply {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, context) = s.split_once(DELIMITER).unwrap_or((s, ""));
        let code = code
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(|raw| ReplyCode::try_from(raw).ok())
            .ok_or_else(|| LinkError::MalformedParam(code.to_string()))?;
        Ok(Self {
            code,
            context: context.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_and_errors() {
        let reply: ControllerReply = "0$".parse().unwrap();
        assert_eq!(reply, ControllerReply::ok(""));
        assert_eq!(reply.to_string(), "OK");

        let reply: ControllerReply = "10$Command with identifier: 9 not found.".parse().unwrap();
        assert_eq!(reply.code, ReplyCode::UnknownCommand);
        assert_eq!(reply.context, "Command with identifier: 9 not found.");

        // context may itself contain the delimiter
        let reply: ControllerReply = "11$bad$input".parse().unwrap();
        assert_eq!(reply.code, ReplyCode::UnknownError);
        assert_eq!(reply.context, "bad$input");
    }

    #[test]
    fn bare_code_has_empty_context() {
        let reply: ControllerReply = "0".parse().unwrap();
        assert!(reply.code.is_ok());
        assert!(reply.context.is_empty());
    }

    #[test]
    fn rejects_unknown_codes_and_free_text() {
        assert!("42$nope".parse::<ControllerReply>().is_err());
        assert!("Output: done".parse::<ControllerReply>().is_err());
    }

    #[test]
    fn wire_form_round_trips() {
        let reply = ControllerReply::error(ReplyCode::UnknownCommand, &LinkError::UnknownCommandKind("9".into()));
        let parsed: ControllerReply = reply.to_wire().parse().unwrap();
        assert_eq!(parsed, reply);
    }
}
