//! Parameter validation helpers.

use crate::error::CoreError;

/// Check that a numeric parameter is positive.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] naming the parameter when `value` is zero.
pub fn positive(name: &str, value: usize) -> Result<usize, CoreError> {
    if value == 0 {
        return Err(CoreError::Validation(format!("{name} must be a positive integer")));
    }
    Ok(value)
}

/// Check that every component of a vector is finite.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] with the offending index otherwise.
pub fn finite(vector: &[f32]) -> Result<(), CoreError> {
    match vector.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(CoreError::Validation(format!("component {i} is not finite ({})", vector[i]))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(positive("k", 0).is_err());
        assert_eq!(positive("k", 3).expect("positive"), 3);
    }

    #[test]
    fn nan_is_rejected() {
        assert!(finite(&[1.0, f32::NAN]).is_err());
        assert!(finite(&[1.0, -2.5]).is_ok());
    }
}
