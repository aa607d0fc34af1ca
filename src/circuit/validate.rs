//! Simulation parameter validation.

use crate::error::{Result, SimError};

/// Check that a time point is finite.
pub fn validate_time(name: &str, t: f64) -> Result<()> {
    if !t.is_finite() {
        return Err(SimError::invalid_param(format!("{name} must be finite, got {t}")));
    }
    Ok(())
}

/// Check a simulation interval `[t1, t2]`.
pub fn validate_interval(t1: f64, t2: f64) -> Result<()> {
    validate_time("t1", t1)?;
    validate_time("t2", t2)?;
    if t2 <= t1 {
        return Err(SimError::invalid_param(format!(
            "t2 ({t2}) must be greater than t1 ({t1})"
        )));
    }
    Ok(())
}

/// Check that a period is finite and positive.
pub fn validate_period(name: &str, period: f64) -> Result<()> {
    if !(period.is_finite() && period > 0.0) {
        return Err(SimError::invalid_param(format!(
            "{name} must be a positive period, got {period}"
        )));
    }
    Ok(())
}

/// Check a step count.
pub fn validate_steps(name: &str, steps: usize) -> Result<()> {
    if steps < 1 {
        return Err(SimError::invalid_param(format!("{name} must be at least 1")));
    }
    Ok(())
}

/// Check an envelope-following skip list.
pub fn validate_skips(skips: &[usize]) -> Result<()> {
    if skips.is_empty() {
        return Err(SimError::invalid_param("skips must contain at least one value"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(validate_interval(0.0, 1.0).is_ok());
        assert!(validate_interval(1.0, 1.0).is_err());
        assert!(validate_interval(0.0, f64::NAN).is_err());
        assert!(validate_period("T", 0.0).is_err());
        assert!(validate_period("T", f64::INFINITY).is_err());
        assert!(validate_steps("steps", 0).is_err());
        assert!(validate_skips(&[]).is_err());
        assert!(validate_skips(&[0]).is_ok());
    }
}
