//! Kubernetes label selector expressions, as accepted by the `labelSelector` query parameter.
//!
//! Supported requirement forms: `key`, `!key`, `key=value`, `key==value`, `key!=value`,
//! `key in (a,b)` and `key notin (a,b)`. Requirements are comma-separated and all must match.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
    str::FromStr,
};

use snafu::{ensure, Snafu};
use stackable_operator::kube::core::{self as kube_core, Expression, SelectorExt};

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("empty requirement in label selector"))]
    EmptyRequirement,

    #[snafu(display("unbalanced parentheses in {requirement:?}"))]
    UnbalancedParentheses { requirement: String },

    #[snafu(display("set requirement {requirement:?} must list values in parentheses"))]
    MissingValues { requirement: String },

    #[snafu(display("invalid label key {key:?}"))]
    InvalidKey { key: String },

    #[snafu(display("invalid label value {value:?}"))]
    InvalidValue { value: String },
}

/// A parsed label selector; the empty selector matches everything.
#[derive(Clone, Debug)]
pub struct Selector(kube_core::Selector);

impl Selector {
    pub fn everything() -> Self {
        Self(Vec::<Expression>::new().into_iter().collect())
    }

    pub fn is_everything(&self) -> bool {
        self.0.selects_all()
    }

    /// Objects without labels are matched against an empty label set.
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let empty = BTreeMap::new();
        self.0.matches(labels.unwrap_or(&empty))
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::everything()
    }
}

// Compared by rendered form, which keeps requirement order
impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Selector {}

impl Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::everything());
        }
        let expressions = split_requirements(s)?
            .into_iter()
            .map(parse_requirement)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(expressions.into_iter().collect()))
    }
}

/// Splits on top-level commas, leaving the commas inside `in (...)` value lists alone.
fn split_requirements(s: &str) -> Result<Vec<&str>, Error> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::UnbalancedParentheses {
                        requirement: s.to_string(),
                    }
                })?
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    ensure!(
        depth == 0,
        UnbalancedParenthesesSnafu {
            requirement: s.to_string()
        }
    );
    parts.push(&s[start..]);
    Ok(parts)
}

fn parse_requirement(raw: &str) -> Result<Expression, Error> {
    let raw = raw.trim();
    ensure!(!raw.is_empty(), EmptyRequirementSnafu);
    if raw.contains('(') {
        return parse_set_requirement(raw);
    }
    if let Some(key) = raw.strip_prefix('!') {
        return Ok(Expression::DoesNotExist(validate_key(key.trim())?));
    }
    if let Some((key, value)) = raw.split_once("!=") {
        return Ok(Expression::NotEqual(
            validate_key(key.trim())?,
            validate_value(value.trim())?,
        ));
    }
    if let Some((key, value)) = raw.split_once("==").or_else(|| raw.split_once('=')) {
        return Ok(Expression::Equal(
            validate_key(key.trim())?,
            validate_value(value.trim())?,
        ));
    }
    Ok(Expression::Exists(validate_key(raw)?))
}

fn parse_set_requirement(raw: &str) -> Result<Expression, Error> {
    let missing_values = || Error::MissingValues {
        requirement: raw.to_string(),
    };
    let (key, rest) = raw
        .split_once(char::is_whitespace)
        .ok_or_else(missing_values)?;
    let rest = rest.trim_start();
    let (negated, values) = if let Some(values) = rest.strip_prefix("notin") {
        (true, values)
    } else if let Some(values) = rest.strip_prefix("in") {
        (false, values)
    } else {
        return Err(missing_values());
    };
    let values = values
        .trim()
        .strip_prefix('(')
        .and_then(|values| values.strip_suffix(')'))
        .ok_or_else(missing_values)?;
    let values = values
        .split(',')
        .map(|value| validate_value(value.trim()))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let key = validate_key(key)?;
    Ok(if negated {
        Expression::NotIn(key, values)
    } else {
        Expression::In(key, values)
    })
}

fn validate_key(key: &str) -> Result<String, Error> {
    ensure!(
        !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')),
        InvalidKeySnafu { key }
    );
    Ok(key.to_string())
}

fn validate_value(value: &str) -> Result<String, Error> {
    ensure!(
        value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')),
        InvalidValueSnafu { value }
    );
    Ok(value.to_string())
}
