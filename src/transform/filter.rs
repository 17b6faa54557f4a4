//! Row filtering on simple column conditions

use crate::config::{FilterCondition, FilterConfig};
use crate::dataset::Dataset;
use crate::error::{FlowError, Result};
use crate::etl::Transformer;
use crate::logger::Logger;
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

/// Comparison applied between a column and a condition value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FromStr for Operator {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equals" => Ok(Self::Equals),
            "not_equals" => Ok(Self::NotEquals),
            "greater_than" => Ok(Self::GreaterThan),
            "less_than" => Ok(Self::LessThan),
            "greater_equal" => Ok(Self::GreaterEqual),
            "less_equal" => Ok(Self::LessEqual),
            "in" => Ok(Self::In),
            "not_in" => Ok(Self::NotIn),
            "is_null" => Ok(Self::IsNull),
            "is_not_null" => Ok(Self::IsNotNull),
            other => Err(FlowError::transformation(
                "filter",
                format!("Unsupported operator: {}", other),
            )),
        }
    }
}

/// Keeps rows that satisfy every condition, evaluated in order
///
/// A condition naming a missing column, an unknown operator, or a value
/// that cannot be compared with the column is skipped with a warning.
pub struct RowFilter {
    conditions: Vec<FilterCondition>,
    logger: Logger,
}

impl RowFilter {
    pub fn new(config: FilterConfig, logger: Logger) -> Self {
        Self {
            conditions: config.conditions,
            logger,
        }
    }

    /// Row mask for one condition, or the reason it has to be skipped
    fn mask(
        &self,
        data: &Dataset,
        condition: &FilterCondition,
    ) -> std::result::Result<Vec<bool>, String> {
        if condition.column.is_empty() || condition.operator.is_empty() {
            return Err(format!("Invalid condition: {:?}", condition));
        }
        let column = data
            .column(&condition.column)
            .ok_or_else(|| format!("Column {} not found in data", condition.column))?;
        let operator: Operator = condition
            .operator
            .parse()
            .map_err(|e: FlowError| e.to_string())?;
        let value = &condition.value;

        let cells = &column.values;
        let mask = match operator {
            Operator::IsNull => cells.iter().map(Value::is_null).collect(),
            Operator::IsNotNull => cells.iter().map(|c| !c.is_null()).collect(),
            Operator::Equals => cells.iter().map(|c| loosely_equal(c, value)).collect(),
            Operator::NotEquals => cells.iter().map(|c| !loosely_equal(c, value)).collect(),
            Operator::In | Operator::NotIn => {
                let Value::Array(options) = value else {
                    return Err(format!(
                        "Operator {} needs a list value, got {}",
                        condition.operator, value
                    ));
                };
                let wanted = operator == Operator::In;
                cells
                    .iter()
                    .map(|c| options.iter().any(|o| loosely_equal(c, o)) == wanted)
                    .collect()
            }
            Operator::GreaterThan
            | Operator::LessThan
            | Operator::GreaterEqual
            | Operator::LessEqual => {
                let mut mask = Vec::with_capacity(cells.len());
                for cell in cells {
                    if cell.is_null() {
                        mask.push(false);
                        continue;
                    }
                    let ordering = compare(cell, value).ok_or_else(|| {
                        format!(
                            "Cannot compare column {} value {} with {}",
                            condition.column, cell, value
                        )
                    })?;
                    mask.push(match operator {
                        Operator::GreaterThan => ordering == Ordering::Greater,
                        Operator::LessThan => ordering == Ordering::Less,
                        Operator::GreaterEqual => ordering != Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    });
                }
                mask
            }
        };
        Ok(mask)
    }
}

impl Transformer for RowFilter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn transform(&self, input: &Dataset) -> Result<Dataset> {
        let before = input.row_count();
        let mut current = input.clone();

        for condition in &self.conditions {
            match self.mask(&current, condition) {
                Ok(mask) => current = current.retain_rows(&mask),
                Err(reason) => self.logger.warn(format!("Skipping filter condition: {}", reason)),
            }
        }

        self.logger.info(format!(
            "Filter transformation completed. Rows: {} -> {}",
            before,
            current.row_count()
        ));
        Ok(current)
    }
}

/// Equality where `1` and `1.0` match
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between numbers, between strings or between booleans
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::CaptureSink;
    use serde_json::json;
    use std::sync::Arc;

    fn people() -> Dataset {
        Dataset::from_rows(
            vec!["name".into(), "age".into(), "city".into()],
            vec![
                vec![json!("kid"), json!(17), json!("Oslo")],
                vec![json!("adult"), json!(18), Value::Null],
                vec![json!("elder"), json!(25.0), json!("Lima")],
            ],
        )
        .unwrap()
    }

    fn filter(conditions: Vec<FilterCondition>) -> (RowFilter, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        (
            RowFilter::new(FilterConfig { conditions }, Logger::new(sink.clone())),
            sink,
        )
    }

    fn ages(data: &Dataset) -> Vec<Value> {
        data.column("age").unwrap().values.clone()
    }

    #[test]
    fn test_greater_equal() {
        let (f, _) = filter(vec![FilterCondition::new("age", "greater_equal", json!(18))]);
        let output = f.transform(&people()).unwrap();
        assert_eq!(ages(&output), vec![json!(18), json!(25.0)]);
    }

    #[test]
    fn test_conditions_are_anded() {
        let (f, _) = filter(vec![
            FilterCondition::new("age", "greater_than", json!(10)),
            FilterCondition::new("city", "is_not_null", Value::Null),
            FilterCondition::new("name", "not_in", json!(["elder"])),
        ]);
        let output = f.transform(&people()).unwrap();
        assert_eq!(ages(&output), vec![json!(17)]);
    }

    #[test]
    fn test_equality_and_membership() {
        let (f, _) = filter(vec![FilterCondition::new("age", "in", json!([25, 17]))]);
        assert_eq!(ages(&f.transform(&people()).unwrap()), vec![json!(17), json!(25.0)]);

        let (f, _) = filter(vec![FilterCondition::new("city", "equals", json!("Lima"))]);
        assert_eq!(f.transform(&people()).unwrap().row_count(), 1);

        let (f, _) = filter(vec![FilterCondition::new("city", "is_null", Value::Null)]);
        assert_eq!(ages(&f.transform(&people()).unwrap()), vec![json!(18)]);
    }

    #[test]
    fn test_bad_conditions_are_skipped() {
        let (f, sink) = filter(vec![
            FilterCondition::new("missing", "equals", json!(1)),
            FilterCondition::new("age", "between", json!(1)),
            FilterCondition::new("age", "less_than", json!("old")),
            FilterCondition::new("age", "in", json!(5)),
            FilterCondition::new("", "equals", json!(1)),
        ]);
        let output = f.transform(&people()).unwrap();
        assert_eq!(output.row_count(), 3);
        assert_eq!(sink.count(log::Level::Warn), 5);
        assert!(sink.contains(log::Level::Warn, "Column missing not found"));
        assert!(sink.contains(log::Level::Warn, "Unsupported operator: between"));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("less_equal".parse::<Operator>().unwrap(), Operator::LessEqual);
        assert!("like".parse::<Operator>().is_err());
    }
}
