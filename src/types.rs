use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the trigger event's payload reaches the spawned process.
///
/// - `None`: stdin is the null device.
/// - `Argument`: the payload only contributes through argument resolution
///   (default behaviour); stdin is the null device.
/// - `Pipe`: the payload is written to stdin, then stdin is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    None,
    Argument,
    Pipe,
}

impl Default for InputMode {
    fn default() -> Self {
        InputMode::Argument
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(InputMode::None),
            "argument" => Ok(InputMode::Argument),
            "pipe" => Ok(InputMode::Pipe),
            other => Err(format!(
                "invalid input mode: {other} (expected \"none\", \"argument\" or \"pipe\")"
            )),
        }
    }
}

/// Terminal classification of a finished invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Success,
    Warning,
    Error,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Success => f.write_str("success"),
            Classification::Warning => f.write_str("warning"),
            Classification::Error => f.write_str("error"),
        }
    }
}

/// Colour of the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    Grey,
    Blue,
    Green,
    Yellow,
    Red,
}

impl FromStr for StatusFill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grey" | "gray" => Ok(StatusFill::Grey),
            "blue" => Ok(StatusFill::Blue),
            "green" => Ok(StatusFill::Green),
            "yellow" => Ok(StatusFill::Yellow),
            "red" => Ok(StatusFill::Red),
            other => Err(format!("invalid status colour: {other}")),
        }
    }
}

impl From<Classification> for StatusFill {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Success => StatusFill::Green,
            Classification::Warning => StatusFill::Yellow,
            Classification::Error => StatusFill::Red,
        }
    }
}

/// A discrete status update. `Status::cleared()` removes the indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub fill: Option<StatusFill>,
    pub text: String,
}

impl Status {
    pub fn new(fill: StatusFill, text: impl Into<String>) -> Self {
        Self {
            fill: Some(fill),
            text: text.into(),
        }
    }

    pub fn cleared() -> Self {
        Self {
            fill: None,
            text: String::new(),
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.fill.is_none() && self.text.is_empty()
    }
}
