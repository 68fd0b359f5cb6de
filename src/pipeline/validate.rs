//! Structural validation of page records.
//!
//! Runs in two places: deciding whether an on-disk record can be trusted for
//! skip-on-existing, and gating a freshly assembled record before it is
//! written. Works on arbitrary JSON so that hand-edited or truncated files
//! are judged by their content, not by whether serde happens to accept them.

use crate::output::PageRecord;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use tracing::{debug, error};

/// First structural problem found, with a path such as `plants[1].photoAreas[0].width`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a decoded JSON value against the page-record schema.
pub fn validate_value(value: &Value) -> Result<(), ValidationError> {
    let root = object(value, "root")?;
    non_empty_string(root.get("page"), "page")?;

    let plants = required(root.get("plants"), "plants")?
        .as_array()
        .ok_or_else(|| ValidationError::new("plants", "plants must be an array"))?;

    for (i, plant) in plants.iter().enumerate() {
        validate_plant(plant, &format!("plants[{i}]"))?;
    }
    Ok(())
}

fn validate_plant(plant: &Value, path: &str) -> Result<(), ValidationError> {
    let plant = object(plant, path)?;
    non_empty_string(plant.get("name"), &format!("{path}.name"))?;

    for field in ["photoAreas", "descriptionAreas"] {
        let field_path = format!("{path}.{field}");
        let areas = required(plant.get(field), &field_path)?
            .as_array()
            .ok_or_else(|| ValidationError::new(&field_path, format!("{field} must be an array")))?;
        for (i, area) in areas.iter().enumerate() {
            validate_area(area, &format!("{field_path}[{i}]"))?;
        }
    }
    Ok(())
}

fn validate_area(area: &Value, path: &str) -> Result<(), ValidationError> {
    let area = object(area, path)?;
    let x = number(area.get("x"), &format!("{path}.x"))?;
    let y = number(area.get("y"), &format!("{path}.y"))?;
    let width = number(area.get("width"), &format!("{path}.width"))?;
    let height = number(area.get("height"), &format!("{path}.height"))?;

    if x < 0.0 {
        return Err(ValidationError::new(format!("{path}.x"), "x must be non-negative"));
    }
    if y < 0.0 {
        return Err(ValidationError::new(format!("{path}.y"), "y must be non-negative"));
    }
    if width <= 0.0 {
        return Err(ValidationError::new(format!("{path}.width"), "width must be positive"));
    }
    if height <= 0.0 {
        return Err(ValidationError::new(format!("{path}.height"), "height must be positive"));
    }
    Ok(())
}

fn required<'v>(value: Option<&'v Value>, path: &str) -> Result<&'v Value, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::new(path, format!("{path} is required"))),
        Some(v) => Ok(v),
    }
}

fn object<'v>(value: &'v Value, path: &str) -> Result<&'v Map<String, Value>, ValidationError> {
    required(Some(value), path)?
        .as_object()
        .ok_or_else(|| ValidationError::new(path, format!("{path} must be an object")))
}

fn non_empty_string(value: Option<&Value>, path: &str) -> Result<(), ValidationError> {
    let s = required(value, path)?
        .as_str()
        .ok_or_else(|| ValidationError::new(path, format!("{path} must be a string")))?;
    if s.trim().is_empty() {
        return Err(ValidationError::new(path, format!("{path} cannot be empty")));
    }
    Ok(())
}

fn number(value: Option<&Value>, path: &str) -> Result<f64, ValidationError> {
    required(value, path)?
        .as_f64()
        .ok_or_else(|| ValidationError::new(path, format!("{path} must be a number")))
}

/// Boolean form of [`validate_value`]; logs the failure path.
pub fn is_valid(value: &Value) -> bool {
    match validate_value(value) {
        Ok(()) => true,
        Err(e) => {
            error!("Validation failed at {}: {}", e.path, e.message);
            false
        }
    }
}

/// Validate a typed record through its serialised form.
pub fn validate_record(record: &PageRecord) -> Result<(), ValidationError> {
    let value = serde_json::to_value(record)
        .map_err(|e| ValidationError::new("root", format!("record does not serialise: {e}")))?;
    validate_value(&value)
}

/// What sits at a record path before a page is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExistingRecord {
    /// No file at the path.
    Missing,
    /// A file exists but is unreadable, empty, not JSON or fails validation.
    Invalid(String),
    /// A structurally valid record.
    Valid(Value),
}

/// Read and validate the record at `path`.
///
/// The verdict rests on [`validate_value`] alone; whether the record also
/// fits [`PageRecord`] is left to callers that need the typed form.
pub async fn inspect_record(path: &Path) -> ExistingRecord {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ExistingRecord::Missing,
        Err(e) => return ExistingRecord::Invalid(format!("unreadable: {e}")),
    };
    if content.trim().is_empty() {
        return ExistingRecord::Invalid("file is empty".into());
    }

    let value: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            debug!("Invalid existing layout file {}: {}", path.display(), e);
            return ExistingRecord::Invalid(format!("not JSON: {e}"));
        }
    };

    match validate_value(&value) {
        Ok(()) => ExistingRecord::Valid(value),
        Err(e) => {
            debug!(
                "Existing layout file {} failed validation at {}: {}",
                path.display(),
                e.path,
                e.message
            );
            ExistingRecord::Invalid(e.to_string())
        }
    }
}

/// Load a typed record from disk if it exists and is structurally valid.
///
/// Missing, empty, unparsable and invalid files all yield `None`, as does a
/// valid record whose numbers do not fit [`PageRecord`] (e.g. fractional
/// coordinates).
pub async fn load_valid_record(path: &Path) -> Option<PageRecord> {
    let ExistingRecord::Valid(value) = inspect_record(path).await else {
        return None;
    };
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Existing layout file {} does not fit the record type: {}", path.display(), e);
            None
        }
    }
}
