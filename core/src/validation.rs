/// Local checks on a contact draft before it is submitted
use crate::error::{ChatError, Result};
use crate::models::ContactDraft;
use regex::Regex;
use std::sync::OnceLock;

fn country_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+[1-9]\d{0,3}$").expect("valid country code regex"))
}

fn contact_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[1-9][0-9]{6,14}$").expect("valid contact number regex"))
}

fn invalid(message: &str) -> ChatError {
    ChatError::Validation(message.to_string())
}

pub fn validate_first_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(invalid("First name is required"));
    }
    Ok(())
}

pub fn validate_last_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(invalid("Last name is required"));
    }
    Ok(())
}

/// `+` followed by one to four digits, no leading zero
pub fn validate_country_code(code: &str) -> Result<()> {
    let code = code.trim();
    if code.is_empty() {
        return Err(invalid("Country code is empty"));
    }
    if !country_code_pattern().is_match(code) {
        return Err(invalid("Invalid country code"));
    }
    Ok(())
}

/// Seven to fifteen digits, no leading zero
pub fn validate_contact_number(number: &str) -> Result<()> {
    let number = number.trim();
    if number.is_empty() {
        return Err(invalid("Contact number is required"));
    }
    if !contact_number_pattern().is_match(number) {
        return Err(invalid("Invalid contact number"));
    }
    Ok(())
}

/// First failing field wins, checked in form order
pub fn validate_contact(draft: &ContactDraft) -> Result<()> {
    validate_first_name(&draft.first_name)?;
    validate_last_name(&draft.last_name)?;
    validate_country_code(&draft.country_code)?;
    validate_contact_number(&draft.contact_no)
}
