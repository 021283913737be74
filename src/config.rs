//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! All validation happens up front in `validate` so a bad weight triple
//! or constraint range fails before any scan runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::data::Security;
use crate::portfolio::risk::RiskMonitorConfig;
use crate::portfolio::Constraints;
use crate::types::{AdvisorError, FactorWeights, ProfileParams, RiskProfile};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Per-profile factor weight overrides, keyed by profile name.
    #[serde(default)]
    pub weights: HashMap<String, WeightsConfig>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub risk: RiskConfig,
    pub universe: UniverseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdvisorConfig {
    /// conservative | moderate | aggressive
    pub risk_profile: String,
    pub capital: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub concurrency: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WeightsConfig {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RiskConfig {
    pub drawdown_floor: f64,
    pub stop_proximity: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            drawdown_floor: -0.20,
            stop_proximity: 0.03,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UniverseConfig {
    pub securities: Vec<SecurityConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub code: String,
    pub name: String,
}

fn default_min_confidence() -> f64 {
    60.0
}

fn default_lookback_days() -> usize {
    120
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Construction-time validation. Errors here are fatal.
    pub fn validate(&self) -> Result<(), AdvisorError> {
        self.risk_profile()?;
        self.constraints.validate()?;
        self.monitor_config().validate()?;
        if self.advisor.capital <= 0.0 {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "capital must be positive: {}",
                self.advisor.capital
            )));
        }
        if !(0.0..=100.0).contains(&self.advisor.min_confidence) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "min_confidence out of range: {}",
                self.advisor.min_confidence
            )));
        }
        if self.universe.securities.is_empty() {
            return Err(AdvisorError::ConfigurationInvalid(
                "universe.securities must not be empty".to_string(),
            ));
        }
        for (profile, weights) in &self.weights {
            profile
                .parse::<RiskProfile>()
                .map_err(|e| AdvisorError::ConfigurationInvalid(e.to_string()))?;
            FactorWeights {
                technical: weights.technical,
                fundamental: weights.fundamental,
                sentiment: weights.sentiment,
            }
            .validate()?;
        }
        Ok(())
    }

    pub fn risk_profile(&self) -> Result<RiskProfile, AdvisorError> {
        self.advisor
            .risk_profile
            .parse::<RiskProfile>()
            .map_err(|e| AdvisorError::ConfigurationInvalid(e.to_string()))
    }

    /// Profile parameters with any configured weight override applied.
    pub fn profile_params(&self) -> Result<ProfileParams, AdvisorError> {
        let profile = self.risk_profile()?;
        let mut params = profile.params();
        if let Some(w) = self.weights.get(&self.advisor.risk_profile.to_lowercase()) {
            params.weights = FactorWeights {
                technical: w.technical,
                fundamental: w.fundamental,
                sentiment: w.sentiment,
            };
            params.weights.validate()?;
        }
        Ok(params)
    }

    /// Monitor thresholds: position cap and cash reserve come from the
    /// builder constraints so the two layers agree.
    pub fn monitor_config(&self) -> RiskMonitorConfig {
        RiskMonitorConfig {
            max_position_fraction: self.constraints.max_position_fraction,
            drawdown_floor: self.risk.drawdown_floor,
            min_cash_fraction: self.constraints.min_cash_fraction,
            stop_proximity: self.risk.stop_proximity,
        }
    }

    pub fn universe(&self) -> Vec<Security> {
        self.universe
            .securities
            .iter()
            .map(|s| Security::new(s.code.clone(), s.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).unwrap()
    }

    const MINIMAL: &str = r#"
        [advisor]
        risk_profile = "moderate"
        capital = 100000.0

        [universe]
        securities = [
            { code = "600519", name = "Kweichow Moutai" },
            { code = "000001", name = "Ping An Bank" },
        ]
    "#;

    #[test]
    fn test_minimal_config_valid_with_defaults() {
        let cfg = parse(MINIMAL);
        cfg.validate().unwrap();
        assert_eq!(cfg.risk_profile().unwrap(), RiskProfile::Moderate);
        assert_eq!(cfg.advisor.min_confidence, 60.0);
        assert_eq!(cfg.advisor.lookback_days, 120);
        assert_eq!(cfg.scanner.concurrency, 8);
        assert_eq!(cfg.constraints.max_position_count, 10);
        assert_eq!(cfg.universe().len(), 2);
    }

    #[test]
    fn test_weight_override_applied() {
        let cfg = parse(
            r#"
            [advisor]
            risk_profile = "moderate"
            capital = 50000.0

            [weights.moderate]
            technical = 0.5
            fundamental = 0.3
            sentiment = 0.2

            [universe]
            securities = [{ code = "600519", name = "Kweichow Moutai" }]
            "#,
        );
        cfg.validate().unwrap();
        let params = cfg.profile_params().unwrap();
        assert_eq!(params.weights.technical, 0.5);
        // Non-weight parameters stay at the profile defaults.
        assert_eq!(params.stop_loss_fraction, 0.08);
    }

    #[test]
    fn test_bad_weight_override_rejected() {
        let cfg = parse(
            r#"
            [advisor]
            risk_profile = "moderate"
            capital = 50000.0

            [weights.moderate]
            technical = 0.9
            fundamental = 0.9
            sentiment = 0.9

            [universe]
            securities = [{ code = "600519", name = "Kweichow Moutai" }]
            "#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let cfg = parse(
            r#"
            [advisor]
            risk_profile = "reckless"
            capital = 50000.0

            [universe]
            securities = [{ code = "600519", name = "Kweichow Moutai" }]
            "#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_universe_rejected() {
        let cfg = parse(
            r#"
            [advisor]
            risk_profile = "moderate"
            capital = 50000.0

            [universe]
            securities = []
            "#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_negative_capital_rejected() {
        let cfg = parse(
            r#"
            [advisor]
            risk_profile = "moderate"
            capital = -1.0

            [universe]
            securities = [{ code = "600519", name = "Kweichow Moutai" }]
            "#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_monitor_config_mirrors_constraints() {
        let cfg = parse(MINIMAL);
        let monitor = cfg.monitor_config();
        assert_eq!(
            monitor.max_position_fraction,
            cfg.constraints.max_position_fraction
        );
        assert_eq!(monitor.min_cash_fraction, cfg.constraints.min_cash_fraction);
        assert_eq!(monitor.drawdown_floor, -0.20);
    }
}
