//! Capabilities the engine consumes from the expression layer
//!
//! The expression language itself lives outside this crate. The engine only
//! needs to render templates against a run context ([`TemplateEvaluator`]) and
//! to treat domain values as comparable, textual, boolean, JSON-serializable
//! primitives ([`ValueType`]).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;

use crate::CoreError;

/// A value the expression layer can reduce to a primitive
pub trait ValueType {
    /// Text form of this value
    fn to_text(&self) -> String;

    /// Truthiness of this value
    fn to_boolean(&self) -> bool;

    /// JSON form used when the value is passed to `json(...)`
    fn to_json(&self) -> serde_json::Value;

    /// Order this value relative to another of the same type
    fn compare(&self, other: &Self) -> Ordering
    where
        Self: Sized,
    {
        self.to_text().cmp(&other.to_text())
    }
}

/// A point in time as seen by the expression layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateValue(Option<DateTime<Utc>>);

impl DateValue {
    /// The zero date, which is falsy and renders as an empty string
    pub const ZERO: DateValue = DateValue(None);

    /// Wrap a UTC timestamp
    pub fn new(value: DateTime<Utc>) -> Self {
        Self(Some(value))
    }

    /// Whether this is the zero date
    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// The wrapped timestamp, if any
    pub fn native(&self) -> Option<DateTime<Utc>> {
        self.0
    }
}

impl ValueType for DateValue {
    fn to_text(&self) -> String {
        self.0
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_default()
    }

    fn to_boolean(&self) -> bool {
        !self.is_zero()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.to_text())
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Renders template strings against a run's evaluation context
///
/// The context is the JSON produced by [`crate::domain::actions::RunView::context`].
pub trait TemplateEvaluator: Debug + Send + Sync {
    /// Render `template`, returning the resulting text or an evaluation error
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, CoreError>;
}

/// Evaluator that treats every template as literal text
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralEvaluator;

impl TemplateEvaluator for LiteralEvaluator {
    fn render(&self, template: &str, _context: &serde_json::Value) -> Result<String, CoreError> {
        Ok(template.to_string())
    }
}
