use std::collections::BTreeMap;
use validator::ValidationError;

const MAX_SKILL_LEN: usize = 100;

/// Trims entries and drops blanks, the shape skills are stored in.
pub fn clean_skills(skills: &[String]) -> Vec<String> {
    skills
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn validate_skills(skills: &[String]) -> Result<(), ValidationError> {
    if skills.iter().any(|s| s.trim().len() > MAX_SKILL_LEN) {
        let mut err = ValidationError::new("skill_too_long");
        err.message = Some(format!("skills must be at most {} characters", MAX_SKILL_LEN).into());
        return Err(err);
    }
    Ok(())
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    if !allowed || !(7..=20).contains(&digits) {
        return Err(ValidationError::new("invalid_phone"));
    }
    Ok(())
}

/// Rubric dimensions must be named and scored on a 0-100 scale.
pub fn validate_rubric(rubric: &BTreeMap<String, f64>) -> Result<(), ValidationError> {
    for (dimension, value) in rubric {
        if dimension.trim().is_empty() {
            return Err(ValidationError::new("blank_dimension"));
        }
        if !value.is_finite() || !(0.0..=100.0).contains(value) {
            let mut err = ValidationError::new("rubric_out_of_range");
            err.message = Some(format!("{} must be between 0 and 100", dimension).into());
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_are_trimmed() {
        let cleaned = clean_skills(&[" Rust ".into(), "".into(), "SQL".into()]);
        assert_eq!(cleaned, vec!["Rust".to_string(), "SQL".to_string()]);
    }

    #[test]
    fn phone_rules() {
        assert!(validate_phone("+1-555-123-4567").is_ok());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("123").is_err());
    }

    #[test]
    fn rubric_range() {
        let mut rubric = BTreeMap::new();
        rubric.insert("technical".to_string(), 85.0);
        assert!(validate_rubric(&rubric).is_ok());
        rubric.insert("communication".to_string(), 120.0);
        assert!(validate_rubric(&rubric).is_err());
    }
}
