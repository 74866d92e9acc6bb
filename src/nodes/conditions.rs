//! Condition node
//!
//! A condition is a typed tree, deserialized from the node config with a
//! `type` tag. Unknown types (nested ones included) fail at construction.
//! Evaluation only reads inputs and the clock; nothing is interpreted as code.

use super::{parse_config, NodeExecutor, NodeKind};
use crate::error::NodeError;
use crate::workflow::{ExecutionContext, NodeInputs, NodeResult};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeCheck {
    #[default]
    Hour,
    /// Monday = 0
    DayOfWeek,
    DayOfMonth,
    /// Inclusive on both ends
    BetweenHours,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
    /// Not all of the nested conditions hold
    Not,
}

fn yes() -> bool {
    true
}

fn last_hour() -> u32 {
    23
}

fn content_field() -> String {
    "content".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Comparison {
        left_field: String,
        #[serde(default)]
        operator: ComparisonOperator,
        #[serde(default)]
        right_value: Value,
    },
    /// Field present and, with `check_empty`, not "" or []
    Exists {
        field_name: String,
        #[serde(default = "yes")]
        check_empty: bool,
    },
    Time {
        #[serde(default)]
        time_type: TimeCheck,
        #[serde(default)]
        target_value: Option<u32>,
        #[serde(default)]
        start_hour: u32,
        #[serde(default = "last_hour")]
        end_hour: u32,
    },
    Logic {
        #[serde(default)]
        logic_type: LogicOperator,
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    /// Checks the `channel` input against allow and deny lists
    Channel {
        #[serde(default)]
        allowed_channels: Vec<String>,
        #[serde(default)]
        blocked_channels: Vec<String>,
    },
    /// Character count of a field within `[min_length, max_length]`
    ContentLength {
        #[serde(default = "content_field")]
        content_field: String,
        #[serde(default)]
        min_length: usize,
        #[serde(default)]
        max_length: Option<usize>,
    },
}

/// Text form used by the string operators
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(left: &Value, operator: ComparisonOperator, right: &Value) -> bool {
    use ComparisonOperator::*;

    let ordering = || match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64().zip(r.as_f64()).and_then(|(l, r)| l.partial_cmp(&r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    };

    match operator {
        Equals => left == right,
        NotEquals => left != right,
        GreaterThan => ordering() == Some(std::cmp::Ordering::Greater),
        LessThan => ordering() == Some(std::cmp::Ordering::Less),
        Contains => as_text(left).contains(&as_text(right)),
        StartsWith => as_text(left).starts_with(&as_text(right)),
        EndsWith => as_text(left).ends_with(&as_text(right)),
    }
}

impl Condition {
    pub fn type_name(&self) -> &'static str {
        match self {
            Condition::Comparison { .. } => "comparison",
            Condition::Exists { .. } => "exists",
            Condition::Time { .. } => "time",
            Condition::Logic { .. } => "logic",
            Condition::Channel { .. } => "channel",
            Condition::ContentLength { .. } => "content_length",
        }
    }

    pub fn evaluate(&self, inputs: &NodeInputs, now: DateTime<Utc>) -> bool {
        match self {
            Condition::Comparison {
                left_field,
                operator,
                right_value,
            } => {
                let left = inputs.get(left_field).unwrap_or(&Value::Null);
                compare(left, *operator, right_value)
            }
            Condition::Exists { field_name, check_empty } => match inputs.get(field_name) {
                None | Some(Value::Null) => false,
                Some(value) if *check_empty => !matches!(value, Value::String(s) if s.is_empty())
                    && !matches!(value, Value::Array(items) if items.is_empty()),
                Some(_) => true,
            },
            Condition::Time {
                time_type,
                target_value,
                start_hour,
                end_hour,
            } => {
                let actual = match time_type {
                    TimeCheck::Hour => now.hour(),
                    TimeCheck::DayOfWeek => now.weekday().num_days_from_monday(),
                    TimeCheck::DayOfMonth => now.day(),
                    TimeCheck::BetweenHours => return (*start_hour..=*end_hour).contains(&now.hour()),
                };
                *target_value == Some(actual)
            }
            Condition::Logic { logic_type, conditions } => {
                let mut results = conditions.iter().map(|c| c.evaluate(inputs, now));
                match logic_type {
                    LogicOperator::And => results.all(|r| r),
                    LogicOperator::Or => results.any(|r| r),
                    LogicOperator::Not => !results.all(|r| r),
                }
            }
            Condition::Channel {
                allowed_channels,
                blocked_channels,
            } => {
                let channel = inputs.get("channel").and_then(Value::as_str);
                let listed = |list: &[String]| channel.is_some_and(|c| list.iter().any(|l| l == c));
                if !blocked_channels.is_empty() && listed(blocked_channels.as_slice()) {
                    return false;
                }
                allowed_channels.is_empty() || listed(allowed_channels.as_slice())
            }
            Condition::ContentLength {
                content_field,
                min_length,
                max_length,
            } => {
                let length = match inputs.get(content_field) {
                    None | Some(Value::Null) => 0,
                    Some(value) => as_text(value).chars().count(),
                };
                length >= *min_length && max_length.map_or(true, |max| length <= max)
            }
        }
    }
}

/// Outputs `{conditionResult, conditionType, ...inputs}`
#[derive(Debug)]
pub struct ConditionNode {
    condition: Condition,
}

impl ConditionNode {
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }

    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self::new(parse_config("condition", config)?))
    }
}

#[async_trait]
impl NodeExecutor for ConditionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let outcome = self.condition.evaluate(&inputs, Utc::now());
        tracing::debug!("🔀 {} condition -> {}", self.condition.type_name(), outcome);

        let mut result = inputs;
        result.insert("conditionResult".into(), json!(outcome));
        result.insert("conditionType".into(), json!(self.condition.type_name()));
        Ok(result)
    }
}
