use serde_json::Value;

use super::fields::{id_field, str_field};
use super::remote::NormalizeError;

const DEFAULT_DISPLAY_NAME: &str = "Student";

/// Identity of the signed-in student, resolved from whichever name fields the
/// login response carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub id: String,
    pub group: String,
    pub display_name: String,
}

impl StudentProfile {
    /// Identity supplied directly by configuration, without a login document.
    pub fn from_ids(id: impl Into<String>, group: impl Into<String>) -> Self {
        Self { id: id.into(), group: group.into(), display_name: DEFAULT_DISPLAY_NAME.to_string() }
    }
}

pub fn student_from_value(payload: &Value) -> Result<StudentProfile, NormalizeError> {
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }

    let id = id_field(payload, &["id", "student_id"]).ok_or(NormalizeError::MissingField("id"))?;
    let group = id_field(payload, &["group", "group_number"])
        .ok_or(NormalizeError::MissingField("group"))?;

    Ok(StudentProfile { id, group, display_name: display_name(payload) })
}

fn display_name(payload: &Value) -> String {
    if let Some(surname) = str_field(payload, &["surname"]) {
        return surname;
    }

    let parts: Vec<String> = ["first_name", "last_name"]
        .iter()
        .filter_map(|key| str_field(payload, &[*key]))
        .collect();
    if !parts.is_empty() {
        return parts.join(" ");
    }

    str_field(payload, &["username", "name"]).unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}
