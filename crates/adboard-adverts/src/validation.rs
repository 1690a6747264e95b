//! Payload validation for advertisement create and patch requests.
//!
//! Request bodies arrive as untyped JSON. Every known field is checked for
//! presence and coerced to a string: numbers and booleans are accepted and
//! rendered as text, arrays and objects are rejected. The value rules (title
//! length) then run on every field that coerced, and all problems come back
//! together as a list of [`FieldError`]s. Unknown keys are ignored and
//! `null` optional fields are dropped from the cleaned output.

use serde::Serialize;
use serde_json::{Map, Value};
use validator::{Validate, ValidationErrors};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Path to the offending field, e.g. `["title"]`.
    pub loc: Vec<String>,
    /// Human readable description.
    pub msg: String,
    /// Machine readable error code.
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    fn new(field: &str, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: vec![field.to_string()],
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "field required", "value_error.missing")
    }

    fn null(field: &str) -> Self {
        Self::new(field, "none is not an allowed value", "type_error.none.not_allowed")
    }

    fn not_a_string(field: &str) -> Self {
        Self::new(field, "str type expected", "type_error.str")
    }

    /// Error for a value longer than the column allows.
    pub fn too_long(field: &str, limit: usize) -> Self {
        Self::new(
            field,
            format!("ensure this value has at most {} characters", limit),
            "value_error.any_str.max_length",
        )
    }
}

/// Cleaned payload for creating an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewAdvert {
    #[validate(length(max = 32, message = "name is too long"))]
    pub title: String,
}

/// Cleaned payload for patching an advertisement. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Validate)]
pub struct AdvertPatch {
    #[validate(length(max = 32, message = "name is too long"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
}

/// Validates a create payload. `title` is required.
pub fn validate_create(payload: &Value) -> Result<NewAdvert, Vec<FieldError>> {
    let fields = as_object(payload)?;

    let title = required_str(fields, "title").map_err(|e| vec![e])?;
    let advert = NewAdvert { title };

    advert.validate().map_err(value_errors)?;
    Ok(advert)
}

/// Validates a patch payload. `title` is required; `description` and
/// `owner` are optional and may be `null`.
///
/// Type errors and length errors are reported together, in field order.
pub fn validate_patch(payload: &Value) -> Result<AdvertPatch, Vec<FieldError>> {
    let fields = as_object(payload)?;
    let mut errors = Vec::new();

    let title = required_str(fields, "title")
        .map_err(|e| errors.push(e))
        .ok();
    let description = optional_str(fields, "description")
        .map_err(|e| errors.push(e))
        .ok()
        .flatten();
    let owner = optional_str(fields, "owner")
        .map_err(|e| errors.push(e))
        .ok()
        .flatten();

    let patch = AdvertPatch {
        title,
        description,
        owner,
    };
    if let Err(e) = patch.validate() {
        errors.extend(value_errors(e));
    }

    if !errors.is_empty() {
        errors.sort_by_key(|e| field_rank(&e.loc));
        return Err(errors);
    }
    Ok(patch)
}

/// Declaration order of advertisement fields, used to order error lists.
const FIELD_ORDER: &[&str] = &["title", "description", "owner"];

fn field_rank(loc: &[String]) -> usize {
    loc.first()
        .and_then(|field| FIELD_ORDER.iter().position(|f| *f == field.as_str()))
        .unwrap_or(FIELD_ORDER.len())
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, Vec<FieldError>> {
    payload.as_object().ok_or_else(|| {
        vec![FieldError::new(
            "__root__",
            "value is not a valid dict",
            "type_error.dict",
        )]
    })
}

/// Coerces a scalar into a string. Numbers keep their JSON rendering and
/// booleans become `True`/`False`; arrays and objects are rejected.
fn coerce_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn required_str(fields: &Map<String, Value>, name: &str) -> Result<String, FieldError> {
    match fields.get(name) {
        None => Err(FieldError::missing(name)),
        Some(Value::Null) => Err(FieldError::null(name)),
        Some(value) => coerce_str(value).ok_or_else(|| FieldError::not_a_string(name)),
    }
}

fn optional_str(fields: &Map<String, Value>, name: &str) -> Result<Option<String>, FieldError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_str(value)
            .map(Some)
            .ok_or_else(|| FieldError::not_a_string(name)),
    }
}

fn value_errors(errors: ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter()
                .map(|e| {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldError::new(&field, msg, "value_error")
                })
                .collect::<Vec<_>>()
        })
        .collect();
    out.sort_by_key(|e| field_rank(&e.loc));
    out
}
