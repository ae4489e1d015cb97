//! Query-string translation into structured store queries.
//!
//! Turns a raw client query string into a tagged filter/sort/population/
//! projection descriptor. Client text never reaches the store verbatim:
//! operators are a closed enum, field names are validated against a strict
//! identifier pattern, and values are typed before binding.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{JobdeskError, Result};

/// Reserved pagination keys stripped before filter construction.
pub const RESERVED_KEYS: [&str; 2] = ["current", "pageSize"];

/// Field names: dot-separated identifier segments, nothing else.
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)*$").expect("valid field pattern")
});

/// Query keys: a field name optionally followed by a single `[op]` suffix.
static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<field>[^\[\]]+)(?:\[(?P<op>[^\[\]]*)\])?$").expect("valid key pattern"));

/// A typed filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl FilterValue {
    /// Infer the narrowest type for a raw query value.
    pub fn infer(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return FilterValue::Int(n);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return FilterValue::Float(f);
        }
        match raw {
            "true" => FilterValue::Bool(true),
            "false" => FilterValue::Bool(false),
            _ => FilterValue::Str(raw.to_string()),
        }
    }
}

/// Closed set of filter operators. Unknown client operators degrade to
/// equality rather than passing through to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(FilterValue),
    Ne(FilterValue),
    Gt(FilterValue),
    Gte(FilterValue),
    Lt(FilterValue),
    Lte(FilterValue),
    In(Vec<FilterValue>),
    /// Anchored prefix match derived from a `/^prefix/` regex literal.
    Prefix(String),
}

/// One field constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
}

/// Conjunction of field constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(pub Vec<FilterClause>);

impl Filter {
    pub fn new() -> Self {
        Filter(Vec::new())
    }

    /// Single equality clause, used by services for keyed lookups.
    pub fn field_eq(field: &str, value: FilterValue) -> Self {
        Filter(vec![FilterClause {
            field: field.to_string(),
            op: FilterOp::Eq(value),
        }])
    }

    pub fn push(&mut self, field: &str, op: FilterOp) {
        self.0.push(FilterClause {
            field: field.to_string(),
            op,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

/// Structured result of translating a raw query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    pub filter: Filter,
    pub sort: Option<Vec<SortField>>,
    pub population: Option<Vec<String>>,
    pub projection: Option<Vec<String>>,
}

/// Translate a raw query string into a `QueryDescriptor`.
///
/// `current` and `pageSize` are stripped; `sort`, `populate` and `fields`
/// are interpreted; everything else becomes a filter clause. An empty
/// string yields the empty descriptor.
pub fn translate(raw: &str) -> Result<QueryDescriptor> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);

    let mut descriptor = QueryDescriptor::default();
    if raw.is_empty() {
        return Ok(descriptor);
    }

    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (decode(k)?, decode(v)?),
            None => (decode(pair)?, String::new()),
        };

        let (field, op_name) = split_key(&key)?;

        if RESERVED_KEYS.contains(&field.as_str()) {
            continue;
        }

        match field.as_str() {
            "sort" => descriptor.sort = Some(parse_sort(&value)?),
            "populate" => descriptor.population = Some(parse_field_list(&value)?),
            "fields" => descriptor.projection = Some(parse_field_list(&value)?),
            _ => {
                validate_field(&field)?;
                let op = build_op(op_name.as_deref(), &value);
                descriptor.filter.push(&field, op);
            }
        }
    }

    Ok(descriptor)
}

/// Extract the raw `current` and `pageSize` values from a query string,
/// defaulting to page 1 with the engine's default size.
pub fn page_params(raw: &str) -> (i64, i64) {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut current = 1;
    let mut page_size = crate::pagination::DEFAULT_PAGE_SIZE;

    for pair in raw.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            match key {
                "current" => {
                    if let Ok(n) = value.parse::<i64>() {
                        current = n;
                    }
                }
                "pageSize" => {
                    if let Ok(n) = value.parse::<i64>() {
                        page_size = n;
                    }
                }
                _ => {}
            }
        }
    }

    (current, page_size)
}

/// Percent-decode a query component, treating `+` as space.
fn decode(component: &str) -> Result<String> {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|_| JobdeskError::Validation(format!("Malformed query component: {}", component)))
}

/// Split `field[op]` into its parts.
fn split_key(key: &str) -> Result<(String, Option<String>)> {
    let caps = KEY_RE
        .captures(key)
        .ok_or_else(|| JobdeskError::Validation(format!("Malformed query key: {}", key)))?;

    let field = caps["field"].to_string();
    let op = caps.name("op").map(|m| m.as_str().to_string());
    Ok((field, op))
}

fn validate_field(field: &str) -> Result<()> {
    if FIELD_RE.is_match(field) {
        Ok(())
    } else {
        Err(JobdeskError::Validation(format!(
            "Invalid field name: {}",
            field
        )))
    }
}

/// Build the operator for one clause. Unknown bracket operators are
/// deliberately permissive and fall back to equality on the base field.
fn build_op(op_name: Option<&str>, value: &str) -> FilterOp {
    match op_name {
        Some("ne") => FilterOp::Ne(FilterValue::infer(value)),
        Some("gt") => FilterOp::Gt(FilterValue::infer(value)),
        Some("gte") => FilterOp::Gte(FilterValue::infer(value)),
        Some("lt") => FilterOp::Lt(FilterValue::infer(value)),
        Some("lte") => FilterOp::Lte(FilterValue::infer(value)),
        Some("in") => FilterOp::In(parse_value_list(value)),
        Some("eq") | None => build_plain_op(value),
        // Unknown operator: literal equality on the raw value.
        Some(_) => FilterOp::Eq(FilterValue::infer(value)),
    }
}

/// An unbracketed value: comma lists mean "in set", `/^…/` literals mean
/// prefix match, anything else is equality.
fn build_plain_op(value: &str) -> FilterOp {
    if let Some(prefix) = regex_prefix(value) {
        return FilterOp::Prefix(prefix);
    }
    if value.contains(',') {
        return FilterOp::In(parse_value_list(value));
    }
    FilterOp::Eq(FilterValue::infer(value))
}

fn parse_value_list(value: &str) -> Vec<FilterValue> {
    value
        .split(',')
        .map(|part| FilterValue::infer(part.trim()))
        .collect()
}

/// Extract the literal anchored prefix from a `/^prefix/`-style regex
/// value. Returns `None` when the value is not such a literal, or when the
/// pattern has no usable literal prefix.
fn regex_prefix(value: &str) -> Option<String> {
    let inner = value
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))?;
    let inner = inner.strip_suffix('i').unwrap_or(inner);
    let anchored = inner.strip_prefix('^')?;

    let mut prefix = String::new();
    for ch in anchored.chars() {
        if ".*+?()[]{}|\\$".contains(ch) {
            break;
        }
        prefix.push(ch);
    }

    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}

fn parse_sort(value: &str) -> Result<Vec<SortField>> {
    let mut fields = Vec::new();
    for part in value.split([',', ' ']).filter(|p| !p.is_empty()) {
        let (name, descending) = match part.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (part, false),
        };
        validate_field(name)?;
        fields.push(SortField {
            field: name.to_string(),
            descending,
        });
    }
    Ok(fields)
}

fn parse_field_list(value: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let name = part.strip_prefix('-').unwrap_or(part);
        validate_field(name)?;
        fields.push(name.to_string());
    }
    Ok(fields)
}
