//! Instruction set
//!
//! A [`Block`] is what the authoring side hands over: an action name and a
//! list of loosely typed inputs at fixed positions. The engine never looks at
//! raw inputs; it works on the [`Instruction`] a block decodes to. Decoding is
//! total: unparseable numbers become `0.0`, missing inputs become `0.0` or the
//! empty string, and unknown action names become [`Instruction::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Action kind of a block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Move,
    TurnCw,
    TurnCcw,
    GotoXy,
    SayForSecs,
    ThinkForSecs,
    /// Any name outside the instruction set, kept verbatim
    Unknown(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Move => "move",
            Self::TurnCw => "turn_cw",
            Self::TurnCcw => "turn_ccw",
            Self::GotoXy => "goto_xy",
            Self::SayForSecs => "say_for_secs",
            Self::ThinkForSecs => "think_for_secs",
            Self::Unknown(name) => name,
        }
    }

    /// Turn actions get the extra pacing delay after they complete
    pub fn is_turn(&self) -> bool {
        matches!(self, Self::TurnCw | Self::TurnCcw)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        match name.as_str() {
            "move" => Self::Move,
            "turn_cw" => Self::TurnCw,
            "turn_ccw" => Self::TurnCcw,
            "goto_xy" => Self::GotoXy,
            "say_for_secs" => Self::SayForSecs,
            "think_for_secs" => Self::ThinkForSecs,
            _ => Self::Unknown(name),
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Unknown(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of an input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Number,
    Text,
    /// Fixed caption such as `x:` or `for`; never read by the engine
    Label,
}

/// One input slot of a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInput {
    #[serde(rename = "type")]
    pub kind: InputKind,
    /// Raw value as edited; numbers may arrive as JSON numbers or strings
    #[serde(default)]
    pub value: Value,
}

impl BlockInput {
    pub fn number(value: f64) -> Self {
        Self {
            kind: InputKind::Number,
            value: Value::from(value),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Text,
            value: Value::String(value.into()),
        }
    }

    pub fn label(value: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Label,
            value: Value::String(value.into()),
        }
    }

    /// Read the value as a finite number, degrading to `0.0`
    pub fn as_number(&self) -> f64 {
        let parsed = match &self.value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
    }

    /// Read the value as text
    pub fn as_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Immutable instruction descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(alias = "actionId")]
    pub action: Action,
    #[serde(default)]
    pub inputs: Vec<BlockInput>,
}

/// A block decoded into typed operands
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Move { steps: f64 },
    TurnCw { degrees: f64 },
    TurnCcw { degrees: f64 },
    GotoXy { x: f64, y: f64 },
    Say { text: String, seconds: f64 },
    Think { text: String, seconds: f64 },
    Unknown(String),
}

impl Block {
    pub fn new(action: impl Into<Action>, inputs: Vec<BlockInput>) -> Self {
        Self {
            action: action.into(),
            inputs,
        }
    }

    pub fn move_steps(steps: f64) -> Self {
        Self::new(Action::Move, vec![BlockInput::number(steps)])
    }

    pub fn turn_cw(degrees: f64) -> Self {
        Self::new(Action::TurnCw, vec![BlockInput::number(degrees)])
    }

    pub fn turn_ccw(degrees: f64) -> Self {
        Self::new(Action::TurnCcw, vec![BlockInput::number(degrees)])
    }

    pub fn goto_xy(x: f64, y: f64) -> Self {
        Self::new(
            Action::GotoXy,
            vec![
                BlockInput::label("x:"),
                BlockInput::number(x),
                BlockInput::label("y:"),
                BlockInput::number(y),
            ],
        )
    }

    pub fn say_for_secs(text: impl Into<String>, seconds: f64) -> Self {
        Self::new(
            Action::SayForSecs,
            vec![
                BlockInput::text(text),
                BlockInput::label("for"),
                BlockInput::number(seconds),
            ],
        )
    }

    pub fn think_for_secs(text: impl Into<String>, seconds: f64) -> Self {
        Self::new(
            Action::ThinkForSecs,
            vec![
                BlockInput::text(text),
                BlockInput::label("for"),
                BlockInput::number(seconds),
            ],
        )
    }

    fn number_at(&self, index: usize) -> f64 {
        self.inputs.get(index).map_or(0.0, BlockInput::as_number)
    }

    fn text_at(&self, index: usize) -> String {
        self.inputs
            .get(index)
            .map(BlockInput::as_text)
            .unwrap_or_default()
    }

    /// Decode the block into its typed instruction
    pub fn decode(&self) -> Instruction {
        match &self.action {
            Action::Move => Instruction::Move {
                steps: self.number_at(0),
            },
            Action::TurnCw => Instruction::TurnCw {
                degrees: self.number_at(0),
            },
            Action::TurnCcw => Instruction::TurnCcw {
                degrees: self.number_at(0),
            },
            Action::GotoXy => Instruction::GotoXy {
                x: self.number_at(1),
                y: self.number_at(3),
            },
            Action::SayForSecs => Instruction::Say {
                text: self.text_at(0),
                seconds: self.number_at(2),
            },
            Action::ThinkForSecs => Instruction::Think {
                text: self.text_at(0),
                seconds: self.number_at(2),
            },
            Action::Unknown(name) => Instruction::Unknown(name.clone()),
        }
    }
}
