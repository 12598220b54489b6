use goldrecord_core::MissionResult;

/// Below this, a worker's OCR/vision extraction is considered unreliable
/// enough to flag for a human/secondary verification pass, but not reliable
/// enough to discard outright.
pub const VISION_CONFIDENCE_THRESHOLD: f64 = 0.95;

pub fn needs_olmocr_verification(result: &MissionResult) -> bool {
    result.vision_confidence.is_some_and(|c| c < VISION_CONFIDENCE_THRESHOLD)
}

/// Strips everything but digits, so `"+1 (555) 123-4567"` and
/// `"5551234567"` compare equal.
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn phone_eq(a: &str, b: &str) -> bool {
    normalize_phone(a) == normalize_phone(b)
}

/// Two mission results "differ significantly" when, for any of
/// phone/email/age, the field is absent on both sides (nothing to compare,
/// so skip it) or present on both sides with disagreeing values. A value
/// present on only one side also counts as a disagreement: one provider
/// corroborated something the other didn't surface at all.
pub fn results_differ_significantly(a: &MissionResult, b: &MissionResult) -> bool {
    if field_differs(a.phone.as_deref(), b.phone.as_deref(), phone_eq) {
        return true;
    }
    if field_differs(a.email.as_deref(), b.email.as_deref(), |x, y| {
        x.trim().to_lowercase() == y.trim().to_lowercase()
    }) {
        return true;
    }
    if field_differs(a.age, b.age, |x, y| (x - y).abs() <= f64::EPSILON) {
        return true;
    }
    false
}

/// `None, None` -> no disagreement (nothing to compare). `Some, None` or
/// `None, Some` -> disagreement (one side corroborated, the other didn't).
/// `Some, Some` -> disagreement iff `eq` says the values don't match.
fn field_differs<T>(a: Option<T>, b: Option<T>, eq: impl Fn(T, T) -> bool) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(x), Some(y)) => !eq(x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(phone: Option<&str>, age: Option<f64>) -> MissionResult {
        MissionResult {
            mission_id: uuid::Uuid::new_v4(),
            status: "completed".to_string(),
            phone: phone.map(str::to_string),
            age,
            income: None,
            email: None,
            captcha_solved: None,
            vision_confidence: None,
            error: None,
        }
    }

    #[test]
    fn matching_phones_do_not_differ() {
        let a = result(Some("+1 (555) 123-4567"), None);
        let b = result(Some("5551234567"), None);
        assert!(!results_differ_significantly(&a, &b));
    }

    #[test]
    fn mismatched_phones_differ() {
        let a = result(Some("+15551110000"), None);
        let b = result(Some("+15552220000"), None);
        assert!(results_differ_significantly(&a, &b));
    }

    #[test]
    fn one_sided_value_is_a_disagreement() {
        let a = result(Some("+15551110000"), None);
        let b = result(None, None);
        assert!(results_differ_significantly(&a, &b));
    }

    #[test]
    fn both_sides_absent_is_not_a_disagreement() {
        let a = result(None, None);
        let b = result(None, None);
        assert!(!results_differ_significantly(&a, &b));
    }

    #[test]
    fn low_confidence_flags_olmocr() {
        let mut r = result(None, None);
        r.vision_confidence = Some(0.80);
        assert!(needs_olmocr_verification(&r));
        r.vision_confidence = Some(0.99);
        assert!(!needs_olmocr_verification(&r));
    }
}
