//! Variable metadata and type coercion
//!
//! Requests and variable metadata arrive from JSON, where bounds and fixed
//! values may be numbers or strings. Coercion turns them into the numeric
//! type implied by the variable's declared type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Declared type of a dataset column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Categorical,
    Integer,
    Float,
}

impl VariableType {
    /// Whether values of this type carry numeric bounds
    pub fn is_numeric(self) -> bool {
        matches!(self, VariableType::Integer | VariableType::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariableType::Categorical => "categorical",
            VariableType::Integer => "integer",
            VariableType::Float => "float",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw value as it appears in a request or in variable metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Integer(v) => write!(f, "{}", v),
            InputValue::Float(v) => write!(f, "{}", v),
            InputValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        InputValue::Integer(v)
    }
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        InputValue::Float(v)
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        InputValue::Text(v.to_string())
    }
}

/// A value after coercion to the variable's numeric type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Integer(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Integer(v) => write!(f, "{}", v),
            Numeric::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<Numeric> for InputValue {
    fn from(v: Numeric) -> Self {
        match v {
            Numeric::Integer(i) => InputValue::Integer(i),
            Numeric::Float(x) => InputValue::Float(x),
        }
    }
}

/// A value could not be converted to the type the variable requires
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("could not convert {field} `{value}` to {expected}")]
pub struct TypeCoercionError {
    pub field: String,
    pub value: String,
    pub expected: VariableType,
}

/// Convert a raw value to the numeric type of `target`
pub fn coerce_numeric(
    value: &InputValue,
    target: VariableType,
    field: &str,
) -> Result<Numeric, TypeCoercionError> {
    let fail = || TypeCoercionError {
        field: field.to_string(),
        value: value.to_string(),
        expected: target,
    };

    match target {
        VariableType::Integer => match value {
            InputValue::Integer(v) => Ok(Numeric::Integer(*v)),
            InputValue::Float(v) => whole_number(*v).map(Numeric::Integer).ok_or_else(fail),
            InputValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
                    .map(Numeric::Integer)
                    .ok_or_else(fail)
            }
        },
        VariableType::Float => match value {
            InputValue::Integer(v) => Ok(Numeric::Float(*v as f64)),
            InputValue::Float(v) if v.is_finite() => Ok(Numeric::Float(*v)),
            InputValue::Float(_) => Err(fail()),
            InputValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Numeric::Float)
                .ok_or_else(fail),
        },
        VariableType::Categorical => Err(fail()),
    }
}

fn whole_number(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Metadata for one dataset variable, as profiled by the dataset owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    #[serde(default)]
    pub min: Option<InputValue>,
    #[serde(default)]
    pub max: Option<InputValue>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl VariableInfo {
    /// Numeric variable with bounds
    pub fn numeric(
        name: impl Into<String>,
        variable_type: VariableType,
        min: impl Into<InputValue>,
        max: impl Into<InputValue>,
    ) -> Self {
        Self {
            name: name.into(),
            variable_type,
            min: Some(min.into()),
            max: Some(max.into()),
            categories: None,
        }
    }

    /// Categorical variable with its declared categories
    pub fn categorical(name: impl Into<String>, categories: &[&str]) -> Self {
        Self {
            name: name.into(),
            variable_type: VariableType::Categorical,
            min: None,
            max: None,
            categories: Some(categories.iter().map(|c| c.to_string()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integer() {
        let t = VariableType::Integer;
        assert_eq!(coerce_numeric(&InputValue::Integer(4), t, "min"), Ok(Numeric::Integer(4)));
        assert_eq!(coerce_numeric(&InputValue::Float(4.0), t, "min"), Ok(Numeric::Integer(4)));
        assert_eq!(coerce_numeric(&" 12 ".into(), t, "min"), Ok(Numeric::Integer(12)));
        assert_eq!(coerce_numeric(&"7.0".into(), t, "min"), Ok(Numeric::Integer(7)));
        assert!(coerce_numeric(&InputValue::Float(4.5), t, "min").is_err());
        assert!(coerce_numeric(&"seven".into(), t, "min").is_err());
    }

    #[test]
    fn test_coerce_float() {
        let t = VariableType::Float;
        assert_eq!(coerce_numeric(&InputValue::Integer(3), t, "max"), Ok(Numeric::Float(3.0)));
        assert_eq!(coerce_numeric(&"2.5".into(), t, "max"), Ok(Numeric::Float(2.5)));
        assert!(coerce_numeric(&"inf".into(), t, "max").is_err());
        assert!(coerce_numeric(&InputValue::Float(f64::NAN), t, "max").is_err());
    }

    #[test]
    fn test_coercion_error_names_field() {
        let err = coerce_numeric(&"abc".into(), VariableType::Integer, "fixed_value").unwrap_err();
        assert_eq!(err.field, "fixed_value");
        assert_eq!(err.value, "abc");
        assert_eq!(err.expected, VariableType::Integer);
        assert_eq!(err.to_string(), "could not convert fixed_value `abc` to integer");
    }

    #[test]
    fn test_categorical_is_never_numeric() {
        assert!(coerce_numeric(&InputValue::Integer(1), VariableType::Categorical, "min").is_err());
    }

    #[test]
    fn test_variable_info_json() {
        let info: VariableInfo =
            serde_json::from_str(r#"{ "name": "age", "type": "integer", "min": "18", "max": 99 }"#)
                .unwrap();
        assert_eq!(info.variable_type, VariableType::Integer);
        assert_eq!(info.min, Some(InputValue::Text("18".to_string())));
        assert_eq!(info.max, Some(InputValue::Integer(99)));
        assert_eq!(info.categories, None);
    }
}
