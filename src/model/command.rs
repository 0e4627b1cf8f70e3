//! Structured commands produced by the parser and consumed by the
//! interpreter.

use serde::{Deserialize, Serialize};

use crate::Params;

/// One operation invocation: an id plus the caller-supplied (partial)
/// parameter set. Resolution to a complete set happens at execution time,
/// against the buffer the operation will actually see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpInvocation {
    pub id: String,
    pub params: Params,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    /// Float comparisons use an epsilon of 1e-4 for the equality forms.
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        const EPSILON: f64 = 1e-4;
        match self {
            Comparator::Gt => lhs > rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Eq => (lhs - rhs).abs() < EPSILON,
            Comparator::Ne => (lhs - rhs).abs() >= EPSILON,
        }
    }
}

impl std::str::FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            other => Err(format!("invalid comparator {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Help,
    /// Unparseable input degrades to a no-op so the console never
    /// hard-fails on a typo. `raw` preserves what the user typed.
    Noop {
        raw: String,
    },
    Op(OpInvocation),
    Pipeline {
        ops: Vec<OpInvocation>,
    },
    Repeat {
        times: u64,
        body: Vec<OpInvocation>,
    },
    If {
        condition: Condition,
        then_body: Vec<OpInvocation>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        else_body: Vec<OpInvocation>,
    },
    Define {
        name: String,
        body: Box<Command>,
    },
    Apply {
        name: String,
    },
    Exec {
        code: String,
    },
}
