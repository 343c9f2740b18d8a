//! Input/output contracts
//!
//! This module provides the schema capability the dispatcher validates
//! against. A [`Schema`] turns a raw JSON value into a validated value or a
//! list of field-level [`Issue`]s. The emitted value only carries fields the
//! schema recognizes, so unknown keys never cross a contract.
//!
//! # Example
//!
//! ```rust,ignore
//! use http_rpc::schema::{Field, ObjectSchema};
//!
//! let create_user = ObjectSchema::new()
//!     .field("name", Field::string().min_length(2).max_length(100))
//!     .field("email", Field::string().email())
//!     .field("age", Field::integer().min(0.0).max(150.0).optional());
//! ```

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{trace, warn};

/// Validation issue for a single location in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Path from the root value to the failing location
    pub path: Vec<String>,
    /// Human-readable error message
    pub message: String,
    /// Error code identifying the type of validation failure
    pub code: String,
}

impl Issue {
    /// Create a new issue at the root.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create a "required" issue.
    pub fn required() -> Self {
        Self::new("Required", "required")
    }

    /// Create an "invalid_type" issue.
    pub fn invalid_type(expected: &str, received: &Value) -> Self {
        Self::new(
            format!("Expected {}, received {}", expected, type_name(received)),
            "invalid_type",
        )
    }

    /// Prefix the issue path with a parent segment.
    pub fn under(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    /// Dotted path, `""` for the root.
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A validator with an introspectable shape.
pub trait Schema: Send + Sync + 'static {
    /// Validate `value`, returning only the recognized parts of it.
    fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>>;

    /// JSON description of the accepted shape.
    fn shape(&self) -> Value;
}

// =============================================================================
// Fields
// =============================================================================

#[derive(Clone)]
enum Kind {
    String,
    Number,
    Integer,
    Boolean,
    Any,
    Array(Box<Field>),
    Object(ObjectSchema),
    Custom(Arc<dyn Schema>),
}

#[derive(Debug, Clone)]
enum Rule {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Pattern(Regex),
    InvalidPattern(String),
    Email,
}

/// One field of an [`ObjectSchema`].
#[derive(Clone)]
pub struct Field {
    kind: Kind,
    optional: bool,
    nullable: bool,
    rules: Vec<Rule>,
}

impl Field {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            optional: false,
            nullable: false,
            rules: Vec::new(),
        }
    }

    /// A JSON string.
    pub fn string() -> Self {
        Self::of(Kind::String)
    }

    /// Any JSON number.
    pub fn number() -> Self {
        Self::of(Kind::Number)
    }

    /// A JSON number without a fractional part.
    pub fn integer() -> Self {
        Self::of(Kind::Integer)
    }

    /// A JSON boolean.
    pub fn boolean() -> Self {
        Self::of(Kind::Boolean)
    }

    /// Any JSON value, passed through untouched.
    pub fn any() -> Self {
        Self::of(Kind::Any)
    }

    /// An array whose items all satisfy `item`.
    pub fn array(item: Field) -> Self {
        Self::of(Kind::Array(Box::new(item)))
    }

    /// A nested object.
    pub fn object(schema: ObjectSchema) -> Self {
        Self::of(Kind::Object(schema))
    }

    /// A field validated by an arbitrary schema.
    pub fn schema(schema: impl Schema) -> Self {
        Self::of(Kind::Custom(Arc::new(schema)))
    }

    /// The field may be absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// The field may be `null`.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Minimum length of a string (in chars) or an array.
    pub fn min_length(mut self, min: usize) -> Self {
        self.rules.push(Rule::MinLength(min));
        self
    }

    /// Maximum length of a string (in chars) or an array.
    pub fn max_length(mut self, max: usize) -> Self {
        self.rules.push(Rule::MaxLength(max));
        self
    }

    /// Inclusive lower bound of a number.
    pub fn min(mut self, min: f64) -> Self {
        self.rules.push(Rule::Min(min));
        self
    }

    /// Inclusive upper bound of a number.
    pub fn max(mut self, max: f64) -> Self {
        self.rules.push(Rule::Max(max));
        self
    }

    /// The string must match `pattern`.
    pub fn pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.rules.push(Rule::Pattern(re)),
            Err(e) => {
                // Invalid regex is a programming error; every value will fail.
                warn!(pattern = %pattern, error = %e, "Invalid validation regex pattern");
                self.rules.push(Rule::InvalidPattern(pattern.to_string()));
            }
        }
        self
    }

    /// The string must look like an email address.
    pub fn email(mut self) -> Self {
        self.rules.push(Rule::Email);
        self
    }

    fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
        let out = match (&self.kind, value) {
            (Kind::Any, v) => v.clone(),
            (Kind::String, Value::String(_))
            | (Kind::Number, Value::Number(_))
            | (Kind::Boolean, Value::Bool(_)) => value.clone(),
            (Kind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => value.clone(),
            (Kind::Integer, Value::Number(_)) => {
                return Err(vec![Issue::new("Expected integer, received float", "invalid_type")]);
            }
            (Kind::Array(item), Value::Array(items)) => {
                let mut issues = Vec::new();
                let mut out = Vec::with_capacity(items.len());
                for (index, entry) in items.iter().enumerate() {
                    match item.validate_slot(Some(entry)) {
                        Ok(Some(v)) => out.push(v),
                        Ok(None) => out.push(Value::Null),
                        Err(errs) => {
                            issues.extend(errs.into_iter().map(|i| i.under(index.to_string())))
                        }
                    }
                }
                if !issues.is_empty() {
                    return Err(issues);
                }
                Value::Array(out)
            }
            (Kind::Object(schema), v) => schema.validate(v)?,
            (Kind::Custom(schema), v) => schema.validate(v)?,
            (kind, v) => return Err(vec![Issue::invalid_type(kind.name(), v)]),
        };

        let issues: Vec<Issue> = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(&out))
            .collect();
        if issues.is_empty() {
            Ok(out)
        } else {
            Err(issues)
        }
    }

    /// Validates a possibly-absent slot. `Ok(None)` means "omit from output".
    fn validate_slot(&self, value: Option<&Value>) -> Result<Option<Value>, Vec<Issue>> {
        match value {
            None if self.optional => Ok(None),
            None => Err(vec![Issue::required()]),
            Some(Value::Null) if self.nullable => Ok(Some(Value::Null)),
            Some(Value::Null) if self.optional && !matches!(self.kind, Kind::Any) => Ok(None),
            Some(v) => self.validate(v).map(Some),
        }
    }

    fn shape(&self) -> Value {
        let mut shape = match &self.kind {
            Kind::Array(item) => json!({ "type": "array", "items": item.shape() }),
            Kind::Object(schema) => schema.shape(),
            Kind::Custom(schema) => schema.shape(),
            kind => json!({ "type": kind.name() }),
        };
        if let Value::Object(map) = &mut shape {
            if self.nullable {
                map.insert("nullable".into(), Value::Bool(true));
            }
            for rule in &self.rules {
                let (key, value) = rule.describe();
                map.insert(key.into(), value);
            }
        }
        shape
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind.name())
            .field("optional", &self.optional)
            .field("nullable", &self.nullable)
            .field("rules", &self.rules)
            .finish()
    }
}

impl Kind {
    fn name(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Integer => "integer",
            Kind::Boolean => "boolean",
            Kind::Any => "any",
            Kind::Array(_) => "array",
            Kind::Object(_) => "object",
            Kind::Custom(_) => "custom",
        }
    }
}

impl Rule {
    fn check(&self, value: &Value) -> Option<Issue> {
        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };
        let issue = match (self, value) {
            (Rule::MinLength(min), _) if len.is_some_and(|l| l < *min) => Issue::new(
                format!("Must contain at least {} element(s)", min),
                "too_small",
            ),
            (Rule::MaxLength(max), _) if len.is_some_and(|l| l > *max) => Issue::new(
                format!("Must contain at most {} element(s)", max),
                "too_big",
            ),
            (Rule::Min(min), Value::Number(n)) if n.as_f64().is_some_and(|v| v < *min) => {
                Issue::new(format!("Must be greater than or equal to {}", min), "too_small")
            }
            (Rule::Max(max), Value::Number(n)) if n.as_f64().is_some_and(|v| v > *max) => {
                Issue::new(format!("Must be less than or equal to {}", max), "too_big")
            }
            (Rule::Pattern(re), Value::String(s)) if !re.is_match(s) => Issue::new(
                format!("Must match pattern: {}", re.as_str()),
                "invalid_string",
            ),
            (Rule::InvalidPattern(pattern), _) => Issue::new(
                format!("Invalid validation pattern: {}", pattern),
                "invalid_pattern",
            ),
            (Rule::Email, Value::String(s)) if !looks_like_email(s) => {
                Issue::new("Invalid email", "invalid_string")
            }
            _ => return None,
        };
        trace!(code = %issue.code, "Validation rule failed");
        Some(issue)
    }

    fn describe(&self) -> (&'static str, Value) {
        match self {
            Rule::MinLength(n) => ("minLength", json!(n)),
            Rule::MaxLength(n) => ("maxLength", json!(n)),
            Rule::Min(n) => ("minimum", json!(n)),
            Rule::Max(n) => ("maximum", json!(n)),
            Rule::Pattern(re) => ("pattern", json!(re.as_str())),
            Rule::InvalidPattern(p) => ("pattern", json!(p)),
            Rule::Email => ("format", json!("email")),
        }
    }
}

// Checks for a single @ with a dotted domain after it.
fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

// =============================================================================
// Object Schema
// =============================================================================

/// An object-shaped contract with an ordered set of fields.
///
/// Keys that are not declared are stripped from the validated value.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Field)>,
}

impl ObjectSchema {
    /// Create an empty object schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Redeclaring a name replaces the earlier definition.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
        self
    }

    /// A new schema holding the fields of both; `other` wins on collisions.
    pub fn merge(&self, other: &ObjectSchema) -> Self {
        other
            .fields
            .iter()
            .fold(self.clone(), |acc, (name, field)| {
                acc.field(name.clone(), field.clone())
            })
    }

    /// Declared field names, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(key, _)| key == name)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
        let Value::Object(input) = value else {
            return Err(vec![Issue::invalid_type("object", value)]);
        };

        let mut out = Map::new();
        let mut issues = Vec::new();
        for (name, field) in &self.fields {
            match field.validate_slot(input.get(name)) {
                Ok(Some(v)) => {
                    out.insert(name.clone(), v);
                }
                Ok(None) => {}
                Err(errs) => issues.extend(errs.into_iter().map(|i| i.under(name.clone()))),
            }
        }

        if issues.is_empty() {
            Ok(Value::Object(out))
        } else {
            Err(issues)
        }
    }

    fn shape(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.shape()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, field)| !field.optional)
            .map(|(name, _)| name.as_str())
            .collect();
        json!({ "type": "object", "properties": properties, "required": required })
    }
}

// =============================================================================
// Typed Schema
// =============================================================================

/// A contract derived from a serde type.
///
/// Validation deserializes into `T` and serializes back, so fields `T` does
/// not declare are dropped.
pub struct Typed<T> {
    _marker: PhantomData<fn() -> T>,
}

/// Build a [`Typed`] contract for `T`.
pub fn typed<T>() -> Typed<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    Typed {
        _marker: PhantomData,
    }
}

impl<T> Schema for Typed<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
        let typed: T = serde_json::from_value(value.clone())
            .map_err(|e| vec![Issue::new(e.to_string(), "invalid_type")])?;
        serde_json::to_value(typed).map_err(|e| vec![Issue::new(e.to_string(), "custom")])
    }

    fn shape(&self) -> Value {
        json!({ "type": "typed", "name": std::any::type_name::<T>() })
    }
}

// =============================================================================
// Contracts
// =============================================================================

/// The input side of an endpoint.
#[derive(Debug, Clone, Default)]
pub enum InputContract {
    /// No input schema was declared; input passes through unvalidated.
    #[default]
    Unset,
    /// Fields accumulated by `.input()` calls.
    Object(ObjectSchema),
}

impl InputContract {
    /// Accumulate `schema` into this contract.
    ///
    /// An unset contract takes `schema` outright.
    pub fn merge(&self, schema: &ObjectSchema) -> Self {
        match self {
            Self::Unset => Self::Object(schema.clone()),
            Self::Object(existing) => Self::Object(existing.merge(schema)),
        }
    }

    /// Validate a decoded input value.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
        match self {
            Self::Unset => Ok(value.clone()),
            Self::Object(schema) => schema.validate(value),
        }
    }

    /// Shape of the contract, `None` when unset.
    pub fn shape(&self) -> Option<Value> {
        match self {
            Self::Unset => None,
            Self::Object(schema) => Some(schema.shape()),
        }
    }
}

/// The output side of an endpoint.
#[derive(Clone, Default)]
pub enum OutputContract {
    /// Any output is accepted and sent as-is.
    #[default]
    Any,
    /// Output is validated (and stripped) by this schema.
    Schema(Arc<dyn Schema>),
}

impl OutputContract {
    /// Validate a handler output value.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
        match self {
            Self::Any => Ok(value.clone()),
            Self::Schema(schema) => schema.validate(value),
        }
    }

    /// Shape of the contract, `None` for any.
    pub fn shape(&self) -> Option<Value> {
        match self {
            Self::Any => None,
            Self::Schema(schema) => Some(schema.shape()),
        }
    }
}

impl fmt::Debug for OutputContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "Any"),
            Self::Schema(schema) => write!(f, "Schema({})", schema.shape()),
        }
    }
}
