//! Rules that depend on where this USS operates.

use crate::models::FlightAuthorisationData;

/// Longest flight endurance accepted in an authorisation.
pub const MAX_ENDURANCE_MINUTES: i64 = 24 * 60;

const UAS_CLASSES: [&str; 7] = ["C0", "C1", "C2", "C3", "C4", "C5", "C6"];

const BASE36: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Jurisdiction {
    /// Whether intents of equal priority may overlap.
    pub allow_same_priority_intersections: bool,
    /// Whether flight plans must carry U-space authorisation data.
    pub require_flight_authorisation: bool,
}

impl Jurisdiction {
    #[must_use]
    pub fn with_same_priority_intersections(mut self, allow: bool) -> Self {
        self.allow_same_priority_intersections = allow;
        self
    }

    #[must_use]
    pub fn with_flight_authorisation(mut self, require: bool) -> Self {
        self.require_flight_authorisation = require;
        self
    }

    pub fn allows_same_priority_intersections(&self, _priority: i32) -> bool {
        self.allow_same_priority_intersections
    }
}

/// Every rule `data` breaks, or `Ok` if it is acceptable.
pub fn validate_flight_authorisation(data: &FlightAuthorisationData) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if !is_valid_serial_number(&data.uas_serial_number) {
        problems.push(format!(
            "Invalid serial number: {}",
            data.uas_serial_number
        ));
    }
    if !is_valid_operator_id(&data.operator_id) {
        problems.push(format!("Invalid operator ID: {}", data.operator_id));
    }
    if !UAS_CLASSES.contains(&data.uas_class.as_str()) {
        problems.push(format!("Invalid UAS class: {}", data.uas_class));
    }
    if data.endurance_minutes <= 0 || data.endurance_minutes > MAX_ENDURANCE_MINUTES {
        problems.push(format!(
            "Endurance must be between 1 and {MAX_ENDURANCE_MINUTES} minutes, got {}",
            data.endurance_minutes
        ));
    }
    if data.connectivity_methods.is_empty() {
        problems.push("At least one connectivity method is required".to_string());
    }
    if data.identification_technologies.is_empty() {
        problems.push("At least one identification technology is required".to_string());
    }
    if !is_valid_emergency_url(&data.emergency_procedure_url) {
        problems.push(format!(
            "Invalid emergency procedure URL: {}",
            data.emergency_procedure_url
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// ANSI/CTA-2063-A physical serial number.
///
/// Four-character manufacturer code, one length character (1-9, A-F) and a
/// serial of that length. Letters O and I are not allowed anywhere.
pub fn is_valid_serial_number(value: &str) -> bool {
    fn allowed(c: char) -> bool {
        c.is_ascii_digit() || (c.is_ascii_uppercase() && c != 'O' && c != 'I')
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 6 || !chars[..4].iter().all(|&c| allowed(c)) {
        return false;
    }
    let Some(length) = chars[4].to_digit(16).filter(|&n| n > 0) else {
        return false;
    };
    if chars[4].is_ascii_lowercase() {
        return false;
    }
    let serial = &chars[5..];
    serial.len() == length as usize && serial.iter().all(|&c| allowed(c))
}

/// EN4709-02 operator id: `CCC` + 12-char base id + checksum + `-` + 3-char secret.
pub fn is_valid_operator_id(value: &str) -> bool {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() != 20 || chars[16] != '-' {
        return false;
    }
    if !chars[..3].iter().all(char::is_ascii_uppercase) {
        return false;
    }
    let base: String = chars[3..15].iter().collect();
    let checksum = chars[15];
    let secret: String = chars[17..].iter().collect();
    if !base.chars().chain(secret.chars()).all(|c| BASE36.contains(c)) {
        return false;
    }
    luhn36_check_char(&format!("{base}{secret}")) == Some(checksum)
}

/// Luhn mod 36 check character over lowercase base-36 input.
fn luhn36_check_char(input: &str) -> Option<char> {
    let n = 36u32;
    let mut factor = 2;
    let mut sum = 0;
    for c in input.chars().rev() {
        let code = c.to_digit(36)?;
        let addend = factor * code;
        factor = if factor == 2 { 1 } else { 2 };
        sum += addend / n + addend % n;
    }
    let check = (n - sum % n) % n;
    std::char::from_digit(check, 36)
}

fn is_valid_emergency_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_authorisation() -> FlightAuthorisationData {
        FlightAuthorisationData {
            uas_serial_number: "1AF49UL5CC5J6K".into(),
            operation_mode: "Vlos".into(),
            operation_category: "Open".into(),
            uas_class: "C0".into(),
            identification_technologies: vec!["ASTMNetRID".into()],
            uas_type_certificate: None,
            connectivity_methods: vec!["cellular".into()],
            endurance_minutes: 30,
            emergency_procedure_url: "https://example.com/emergency".into(),
            operator_id: "FIN87astrdge12k8-xyz".into(),
            uas_id: None,
        }
    }

    #[test]
    fn valid_authorisation_passes() {
        assert_eq!(validate_flight_authorisation(&valid_authorisation()), Ok(()));
    }

    #[test]
    fn serial_number_length_code_must_match() {
        assert!(is_valid_serial_number("1AF49UL5CC5J6K"));
        assert!(!is_valid_serial_number("1AF48UL5CC5J6K"));
        assert!(!is_valid_serial_number("1AF40"));
        assert!(!is_valid_serial_number("1OF43ABC"));
        assert!(is_valid_serial_number("ABCDFABCDEFGH123JKLM"));
    }

    #[test]
    fn operator_id_checksum_is_verified() {
        assert!(is_valid_operator_id("FIN87astrdge12k8-xyz"));
        assert!(!is_valid_operator_id("FIN87astrdge12k7-xyz"));
        assert!(!is_valid_operator_id("fin87astrdge12k8-xyz"));
        assert!(!is_valid_operator_id("FIN87astrdge12k8xyz"));
    }

    #[test]
    fn every_violation_is_reported() {
        let mut data = valid_authorisation();
        data.uas_class = "C9".into();
        data.endurance_minutes = 0;
        data.connectivity_methods.clear();
        data.emergency_procedure_url = "ftp://example.com".into();

        let problems = validate_flight_authorisation(&data).unwrap_err();
        assert_eq!(problems.len(), 4);
        assert!(problems[0].contains("UAS class"));
    }

    #[test]
    fn endurance_upper_bound_is_a_day() {
        let mut data = valid_authorisation();
        data.endurance_minutes = MAX_ENDURANCE_MINUTES;
        assert!(validate_flight_authorisation(&data).is_ok());
        data.endurance_minutes += 1;
        assert!(validate_flight_authorisation(&data).is_err());
    }
}
