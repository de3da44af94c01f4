use crate::error::CoreError;

/// Closed vocabularies for class setup. Out-of-vocabulary input is a
/// validation failure, never a silent acceptance.
pub const PROGRAMS: &[&str] = &["BSCS", "BSIT", "BSBA", "BSED"];
pub const SECTION_CODES: &[&str] = &["A", "B", "C", "D", "E", "F"];
pub const SUBJECTS: &[&str] = &["Math", "English", "Science", "Reading", "Writing"];

pub const TEACHER_ROLES: &[&str] = &["teacher", "therapist"];

pub fn validate_program(program: &str) -> Result<(), CoreError> {
    if PROGRAMS.contains(&program) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "unknown program '{}'; expected one of {}",
            program,
            PROGRAMS.join(", ")
        )))
    }
}

pub fn validate_semester(semester: i64) -> Result<(), CoreError> {
    if (1..=8).contains(&semester) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "semester must be between 1 and 8, got {semester}"
        )))
    }
}

pub fn validate_section_code(code: &str) -> Result<(), CoreError> {
    if SECTION_CODES.contains(&code) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "unknown section code '{}'; expected one of {}",
            code,
            SECTION_CODES.join(", ")
        )))
    }
}

pub fn validate_subject(subject: &str) -> Result<(), CoreError> {
    if SUBJECTS.contains(&subject) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "unknown subject '{}'; expected one of {}",
            subject,
            SUBJECTS.join(", ")
        )))
    }
}

pub fn validate_teacher_role(role: &str) -> Result<(), CoreError> {
    if TEACHER_ROLES.contains(&role) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "unknown role '{}'; expected one of {}",
            role,
            TEACHER_ROLES.join(", ")
        )))
    }
}

/// String lists (class sections, class subjects, assignment section sets)
/// are stored as JSON array TEXT columns.
pub fn encode_string_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
