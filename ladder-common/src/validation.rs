//! Configuration validation.
//!
//! Checks that configured values are present and within valid ranges
//! before the allocator starts.

use thiserror::Error;

use crate::config::{
    AllocatorSection, Config, CrashBrakeSection, ObservabilityConfig, ServerConfig,
    SmallCapCapsSection,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Some(allocator) = &self.allocator {
            if let Err(e) = allocator.validate() {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

fn check_fraction(field: &str, value: Option<f64>) -> ValidationResult<()> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) || v.is_nan() => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("{v} is not a fraction between 0 and 1"),
        }),
        _ => Ok(()),
    }
}

fn check_positive(field: &str, value: Option<f64>) -> ValidationResult<()> {
    match value {
        Some(v) if v <= 0.0 || v.is_nan() => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("{v} must be positive"),
        }),
        _ => Ok(()),
    }
}

impl Validate for AllocatorSection {
    fn validate(&self) -> ValidationResult<()> {
        check_fraction("allocator.bootstrap_cap", self.bootstrap_cap)?;
        check_positive("allocator.price_epsilon", self.price_epsilon)?;

        if let Some(tolerance) = self.banned_zone_tolerance_pct {
            if tolerance <= 0.0 || tolerance >= 50.0 || tolerance.is_nan() {
                return Err(ValidationError::InvalidValue {
                    field: "allocator.banned_zone_tolerance_pct".into(),
                    reason: format!("{tolerance} must be within (0, 50)"),
                });
            }
        }

        if let Some(benchmark) = &self.benchmark_ticker {
            if benchmark.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "allocator.benchmark_ticker".into(),
                });
            }
        }

        if let (Some(crypto), Some(smallcap)) = (&self.crypto_tickers, &self.smallcap_tickers) {
            if let Some(dup) = crypto.iter().find(|t| smallcap.contains(t)) {
                return Err(ValidationError::Conflict {
                    reason: format!("{dup} is listed as both crypto and small cap"),
                });
            }
        }

        if let Some(brakes) = &self.crash_brakes {
            brakes.validate()?;
        }
        if let Some(caps) = &self.smallcap_caps {
            caps.validate()?;
        }

        Ok(())
    }
}

impl Validate for CrashBrakeSection {
    fn validate(&self) -> ValidationResult<()> {
        check_positive(
            "allocator.crash_brakes.stock_max_drawdown_pct",
            self.stock_max_drawdown_pct,
        )?;
        check_positive(
            "allocator.crash_brakes.crypto_max_drawdown_pct",
            self.crypto_max_drawdown_pct,
        )?;
        check_fraction(
            "allocator.crash_brakes.stock_min_sma200_ratio",
            self.stock_min_sma200_ratio,
        )?;
        check_fraction(
            "allocator.crash_brakes.crypto_min_sma200_ratio",
            self.crypto_min_sma200_ratio,
        )
    }
}

impl Validate for SmallCapCapsSection {
    fn validate(&self) -> ValidationResult<()> {
        check_fraction(
            "allocator.smallcap_caps.max_exposure_fraction",
            self.max_exposure_fraction,
        )?;
        check_fraction(
            "allocator.smallcap_caps.max_ladder_fraction",
            self.max_ladder_fraction,
        )?;
        check_fraction(
            "allocator.smallcap_caps.structural_rung_fraction",
            self.structural_rung_fraction,
        )?;
        check_fraction(
            "allocator.smallcap_caps.sniper_rung_fraction",
            self.sniper_rung_fraction,
        )?;
        check_fraction("allocator.smallcap_caps.max_rung_share", self.max_rung_share)?;

        if let (Some(ladder), Some(exposure)) =
            (self.max_ladder_fraction, self.max_exposure_fraction)
        {
            if ladder > exposure {
                return Err(ValidationError::Conflict {
                    reason: format!(
                        "small-cap ladder cap {ladder} exceeds exposure cap {exposure}"
                    ),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = ObservabilityConfig {
            log_level: "verbose".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("observability.log_level"));
    }

    #[test]
    fn test_zero_port_rejected() {
        let server = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(
            server.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_bootstrap_cap_must_be_fraction() {
        let section = AllocatorSection {
            bootstrap_cap: Some(1.5),
            ..Default::default()
        };
        assert!(section.validate().is_err());

        let section = AllocatorSection {
            bootstrap_cap: Some(0.5),
            ..Default::default()
        };
        assert!(section.validate().is_ok());
    }

    #[test]
    fn test_banned_zone_tolerance_range() {
        let section = AllocatorSection {
            banned_zone_tolerance_pct: Some(0.0),
            ..Default::default()
        };
        assert!(section.validate().is_err());
    }

    #[test]
    fn test_conflicting_asset_lists() {
        let section = AllocatorSection {
            crypto_tickers: Some(vec!["SMCI".into()]),
            smallcap_tickers: Some(vec!["SMCI".into()]),
            ..Default::default()
        };
        assert!(matches!(
            section.validate(),
            Err(ValidationError::Conflict { .. })
        ));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let config = Config {
            server: ServerConfig {
                port: 0,
                ..Default::default()
            },
            observability: ObservabilityConfig {
                log_format: "xml".into(),
                ..Default::default()
            },
            allocator: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Multiple(errors)) if errors.len() == 2
        ));
    }
}
