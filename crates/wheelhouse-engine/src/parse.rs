//! Order parsing seam.
//!
//! Natural-language order parsing lives outside the engine; it plugs in
//! through [`OrderParser`]. [`JsonOrderParser`] covers orders that are
//! already structured.

use serde::{Deserialize, Serialize};

use wheelhouse_core::{ParseError, StepPlan};

/// A parsed order: the raw material for a new mission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedOrder {
    pub title: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub steps: Vec<StepPlan>,
}

pub trait OrderParser: Send + Sync {
    fn parse(&self, request: &str) -> Result<ParsedOrder, ParseError>;
}

/// Accepts an order written as JSON:
///
/// ```json
/// {
///   "title": "Add login endpoint",
///   "objectives": ["POST /login returns a token"],
///   "steps": [
///     {"step_id": 1, "description": "Locate router", "assigned_role": "router"},
///     {"step_id": 2, "description": "Write handler", "assigned_role": "coder", "dependencies": [1]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOrderParser;

impl OrderParser for JsonOrderParser {
    fn parse(&self, request: &str) -> Result<ParsedOrder, ParseError> {
        if request.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let order: ParsedOrder = serde_json::from_str(request)?;

        if order.title.trim().is_empty() {
            return Err(ParseError::Malformed("order title is empty".to_string()));
        }
        if order.steps.is_empty() {
            return Err(ParseError::NoSteps);
        }
        if let Some(step) = order.steps.iter().find(|s| s.description.trim().is_empty()) {
            return Err(ParseError::Malformed(format!(
                "step {} has an empty description",
                step.step_id
            )));
        }

        Ok(order)
    }
}
