//! Dynamic named filters: session-scoped predicates with typed parameters.
//!
//! # Responsibility
//! - Hold filter definitions (condition fragment + declared parameter types).
//! - Bind default-condition text into typed parameter values.
//! - Render enabled filter conditions with positional placeholder expansion.
//!
//! # Invariants
//! - A bound value's shape always matches the declared parameter type.
//! - A condition referencing a declared-but-unbound parameter fails at
//!   render time, never silently.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The only date layout default conditions are parsed with:
/// year/abbreviated-month/day, e.g. `2026/Aug/01`.
pub const DEFAULT_CONDITION_DATE_FORMAT: &str = "%Y/%b/%d";

pub(crate) static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("valid placeholder regex"));

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, PartialEq, Eq)]
pub enum FilterError {
    UnknownFilter(String),
    NotEnabled(String),
    UnknownParameter { filter: String, parameter: String },
    ParameterNotSet { filter: String, parameter: String },
    TypeMismatch { filter: String, parameter: String },
}

impl Display for FilterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFilter(name) => write!(f, "no filter named `{name}` is defined"),
            Self::NotEnabled(name) => write!(f, "filter `{name}` is not enabled on this session"),
            Self::UnknownParameter { filter, parameter } => {
                write!(f, "filter `{filter}` declares no parameter `{parameter}`")
            }
            Self::ParameterNotSet { filter, parameter } => {
                write!(f, "filter `{filter}` parameter `{parameter}` has no bound value")
            }
            Self::TypeMismatch { filter, parameter } => write!(
                f,
                "filter `{filter}` parameter `{parameter}` was bound with a value of the wrong type"
            ),
        }
    }
}

impl Error for FilterError {}

/// Declared type of one filter parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterParamType {
    Text,
    Date,
    Integer,
    Boolean,
}

/// A bound parameter value. Multi-valued by construction; single-value
/// parameters are one-element lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(Vec<String>),
    Date(Vec<NaiveDate>),
}

impl FilterValue {
    fn matches(&self, declared: FilterParamType) -> bool {
        matches!(
            (self, declared),
            (Self::Text(_), FilterParamType::Text) | (Self::Date(_), FilterParamType::Date)
        )
    }

    fn to_sql_values(&self) -> Vec<Value> {
        match self {
            Self::Text(values) => values.iter().cloned().map(Value::Text).collect(),
            Self::Date(values) => values.iter().map(|d| Value::Text(d.to_string())).collect(),
        }
    }
}

/// Registered definition of a named filter.
#[derive(Debug, Clone)]
pub struct FilterDefinition {
    name: String,
    condition: String,
    default_condition: String,
    parameter_types: BTreeMap<String, FilterParamType>,
}

impl FilterDefinition {
    pub fn new(
        name: impl Into<String>,
        condition: impl Into<String>,
        default_condition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
            default_condition: default_condition.into(),
            parameter_types: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, ty: FilterParamType) -> Self {
        self.parameter_types.insert(name.into(), ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn default_condition(&self) -> &str {
        &self.default_condition
    }

    pub fn parameter_types(&self) -> &BTreeMap<String, FilterParamType> {
        &self.parameter_types
    }
}

/// An activated filter on one session, carrying its bound parameter values.
#[derive(Debug, Clone)]
pub struct Filter {
    definition: FilterDefinition,
    parameters: BTreeMap<String, FilterValue>,
}

impl Filter {
    pub(crate) fn new(definition: FilterDefinition) -> Self {
        Self {
            definition,
            parameters: BTreeMap::new(),
        }
    }

    pub fn definition(&self) -> &FilterDefinition {
        &self.definition
    }

    pub fn parameter(&self, name: &str) -> Option<&FilterValue> {
        self.parameters.get(name)
    }

    pub fn bound_count(&self) -> usize {
        self.parameters.len()
    }

    /// Binds one parameter, rejecting undeclared names and mismatched shapes.
    pub fn set_parameter(&mut self, name: &str, value: FilterValue) -> FilterResult<()> {
        let declared = self.definition.parameter_types.get(name).copied().ok_or_else(|| {
            FilterError::UnknownParameter {
                filter: self.definition.name.clone(),
                parameter: name.to_string(),
            }
        })?;
        if !value.matches(declared) {
            return Err(FilterError::TypeMismatch {
                filter: self.definition.name.clone(),
                parameter: name.to_string(),
            });
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    /// Checks every bound value against its declared type. Unbound
    /// parameters are not an error here; they surface at render time.
    pub fn validate(&self) -> FilterResult<()> {
        for (name, value) in &self.parameters {
            let declared = self.definition.parameter_types.get(name).copied().ok_or_else(|| {
                FilterError::UnknownParameter {
                    filter: self.definition.name.clone(),
                    parameter: name.to_string(),
                }
            })?;
            if !value.matches(declared) {
                return Err(FilterError::TypeMismatch {
                    filter: self.definition.name.clone(),
                    parameter: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Renders the condition fragment with `:name` placeholders expanded to
    /// positional markers, returning the fragment and its values in order.
    pub(crate) fn render(&self) -> FilterResult<(String, Vec<Value>)> {
        let condition = &self.definition.condition;
        let mut sql = String::with_capacity(condition.len());
        let mut values = Vec::new();
        let mut last = 0;

        for capture in PLACEHOLDER.captures_iter(condition) {
            let Some(whole) = capture.get(0) else {
                continue;
            };
            let name = &capture[1];

            if !self.definition.parameter_types.contains_key(name) {
                return Err(FilterError::UnknownParameter {
                    filter: self.definition.name.clone(),
                    parameter: name.to_string(),
                });
            }
            let bound = self.parameters.get(name).ok_or_else(|| FilterError::ParameterNotSet {
                filter: self.definition.name.clone(),
                parameter: name.to_string(),
            })?;

            sql.push_str(&condition[last..whole.start()]);
            let expanded = bound.to_sql_values();
            if expanded.is_empty() {
                return Err(FilterError::ParameterNotSet {
                    filter: self.definition.name.clone(),
                    parameter: name.to_string(),
                });
            }
            let markers = vec!["?"; expanded.len()].join(", ");
            sql.push_str(&markers);
            values.extend(expanded);
            last = whole.end();
        }
        sql.push_str(&condition[last..]);

        Ok((sql, values))
    }
}

/// Binds a filter's default-condition text into its declared parameters.
///
/// The default condition is split on `,` into raw values. Text parameters
/// take the whole sequence as a multi-valued binding; date parameters take
/// the values joined back together, parsed against the fixed
/// year/abbreviated-month/day layout, bound as a one-element list only when
/// the parse succeeds. Other parameter types stay unbound.
///
/// Returns `Ok(true)` when at least one parameter was bound, and also when
/// nothing could be usefully bound at all; a no-op activation is not a
/// failure. Validation faults on bound values propagate to the caller.
///
/// Shared by the unit-of-work's internal filter activation and the
/// repository's public one; the two paths must not diverge.
pub fn enable_filter_with_default_condition(filter: &mut Filter) -> FilterResult<bool> {
    let declared: Vec<(String, FilterParamType)> = filter
        .definition
        .parameter_types
        .iter()
        .map(|(name, ty)| (name.clone(), *ty))
        .collect();
    if declared.is_empty() {
        return Ok(true);
    }

    let raw_values: Vec<String> = filter
        .definition
        .default_condition
        .split(',')
        .map(str::to_string)
        .collect();

    let mut bound = 0usize;
    for (name, ty) in declared {
        match ty {
            FilterParamType::Text => {
                filter.set_parameter(&name, FilterValue::Text(raw_values.clone()))?;
                bound += 1;
            }
            FilterParamType::Date => {
                let joined = raw_values.concat();
                if let Ok(date) = NaiveDate::parse_from_str(&joined, DEFAULT_CONDITION_DATE_FORMAT)
                {
                    filter.set_parameter(&name, FilterValue::Date(vec![date]))?;
                    bound += 1;
                }
            }
            // Binding for numeric and boolean parameters is unspecified
            // upstream; they stay unbound until set explicitly.
            FilterParamType::Integer | FilterParamType::Boolean => {}
        }
    }

    filter.validate()?;
    Ok(bound > 0 || filter.parameters.is_empty())
}
