use serde::Deserialize;

use crate::error::ReconError;

/// Per-document engine configuration.
///
/// Every key is optional in TOML; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Relative tolerance for `nominal × price / 100 ≈ value` and for the
    /// portfolio total.
    pub arithmetic_tolerance: f64,
    /// Weight-sum tolerance as a fraction of 100% (0.01 = one point).
    pub weight_tolerance: f64,
    /// Detail rows without new information before an open record is closed.
    pub max_lookahead: usize,
    /// Hard cap on rows scanned per run.
    pub max_rows: usize,
    /// Confidence lost per disagreeing source.
    pub disagreement_penalty: f64,
    /// Confidence lost per failed validation.
    pub validation_penalty: f64,
    /// Run per-table and per-pass work on the rayon pool.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arithmetic_tolerance: 0.05,
            weight_tolerance: 0.01,
            max_lookahead: 5,
            max_rows: 100_000,
            disagreement_penalty: 0.25,
            validation_penalty: 0.5,
            parallel: true,
        }
    }
}

const MAX_LOOKAHEAD_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        check_fraction("arithmetic_tolerance", self.arithmetic_tolerance)?;
        check_fraction("weight_tolerance", self.weight_tolerance)?;
        check_fraction("disagreement_penalty", self.disagreement_penalty)?;
        check_fraction("validation_penalty", self.validation_penalty)?;

        if self.max_lookahead == 0 || self.max_lookahead > MAX_LOOKAHEAD_LIMIT {
            return Err(ReconError::ConfigValidation(format!(
                "max_lookahead must be between 1 and {MAX_LOOKAHEAD_LIMIT}, got {}",
                self.max_lookahead
            )));
        }

        if self.max_rows == 0 {
            return Err(ReconError::ConfigValidation(
                "max_rows must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ReconError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ReconError::ConfigValidation(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.arithmetic_tolerance, 0.05);
        assert_eq!(config.weight_tolerance, 0.01);
        assert_eq!(config.max_lookahead, 5);
    }

    #[test]
    fn parse_overrides() {
        let config = EngineConfig::from_toml(
            r#"
arithmetic_tolerance = 0.02
max_lookahead = 3
parallel = false
"#,
        )
        .unwrap();
        assert_eq!(config.arithmetic_tolerance, 0.02);
        assert_eq!(config.max_lookahead, 3);
        assert!(!config.parallel);
        assert_eq!(config.weight_tolerance, 0.01);
    }

    #[test]
    fn reject_negative_tolerance() {
        let err = EngineConfig::from_toml("arithmetic_tolerance = -0.1").unwrap_err();
        assert!(err.to_string().contains("arithmetic_tolerance"));
    }

    #[test]
    fn reject_nan_tolerance() {
        let config = EngineConfig {
            weight_tolerance: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_lookahead() {
        let err = EngineConfig::from_toml("max_lookahead = 0").unwrap_err();
        assert!(err.to_string().contains("max_lookahead must be between 1"));
    }

    #[test]
    fn reject_unknown_key() {
        let err = EngineConfig::from_toml("tolerance = 0.05").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_wrong_type() {
        assert!(EngineConfig::from_toml("max_lookahead = \"five\"").is_err());
    }
}
