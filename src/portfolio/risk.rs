//! Portfolio risk monitoring.
//!
//! Read-only checks against a portfolio snapshot: concentration,
//! drawdown, stop-loss proximity, and cash reserve. Each check is
//! independent; the reported risk level is the maximum severity seen.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{AdvisorError, Portfolio, RiskLevel};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Thresholds the monitor checks against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskMonitorConfig {
    /// Single-position weight above this is a concentration warning.
    pub max_position_fraction: f64,
    /// Return since inception below this escalates to High.
    pub drawdown_floor: f64,
    /// Cash fraction below this draws a liquidity suggestion.
    pub min_cash_fraction: f64,
    /// A position within this fraction of its stop draws an early warning.
    pub stop_proximity: f64,
}

impl Default for RiskMonitorConfig {
    fn default() -> Self {
        Self {
            max_position_fraction: 0.15,
            drawdown_floor: -0.20,
            min_cash_fraction: 0.15,
            stop_proximity: 0.03,
        }
    }
}

impl RiskMonitorConfig {
    pub fn validate(&self) -> Result<(), AdvisorError> {
        if !(0.0..=1.0).contains(&self.max_position_fraction) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "max_position_fraction out of range: {}",
                self.max_position_fraction
            )));
        }
        if !(-1.0..0.0).contains(&self.drawdown_floor) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "drawdown_floor must be in (-1, 0): {}",
                self.drawdown_floor
            )));
        }
        if !(0.0..1.0).contains(&self.min_cash_fraction) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "min_cash_fraction out of range: {}",
                self.min_cash_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.stop_proximity) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "stop_proximity out of range: {}",
                self.stop_proximity
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Result of one monitoring pass.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    /// Maximum severity across all checks.
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl fmt::Display for RiskAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Risk level: {}", self.risk_level)?;
        for w in &self.warnings {
            writeln!(f, "  warning: {w}")?;
        }
        for s in &self.suggestions {
            writeln!(f, "  suggestion: {s}")?;
        }
        Ok(())
    }
}

/// Stateless monitor; `assess` never mutates the portfolio.
#[derive(Debug, Clone)]
pub struct RiskMonitor {
    config: RiskMonitorConfig,
}

impl RiskMonitor {
    pub fn new(config: RiskMonitorConfig) -> Result<Self, AdvisorError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskMonitorConfig {
        &self.config
    }

    /// Run all checks against the snapshot.
    pub fn assess(&self, portfolio: &Portfolio) -> RiskAssessment {
        let mut level = RiskLevel::Low;
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        // (a) Concentration.
        for position in &portfolio.positions {
            if position.weight > self.config.max_position_fraction {
                warnings.push(format!(
                    "{} weight {:.1}% exceeds the {:.1}% position cap",
                    position.code,
                    position.weight * 100.0,
                    self.config.max_position_fraction * 100.0,
                ));
                level = level.max(RiskLevel::Medium);
            }
        }

        // (b) Aggregate drawdown.
        let ret = portfolio.return_fraction();
        if ret < self.config.drawdown_floor {
            warnings.push(format!(
                "portfolio return {:.1}% is below the {:.1}% floor",
                ret * 100.0,
                self.config.drawdown_floor * 100.0,
            ));
            level = RiskLevel::High;
        }

        // (c) Stop-loss proximity.
        for position in &portfolio.positions {
            if position.stop_loss <= 0.0 {
                continue;
            }
            let distance = (position.current_price - position.stop_loss) / position.stop_loss;
            if (0.0..self.config.stop_proximity).contains(&distance) {
                suggestions.push(format!(
                    "{} is within {:.1}% of its stop ({:.2} vs {:.2}), consider reducing",
                    position.code,
                    distance * 100.0,
                    position.current_price,
                    position.stop_loss,
                ));
                level = level.max(RiskLevel::Medium);
            }
        }

        // (d) Cash reserve.
        let cash = portfolio.cash_fraction();
        if cash < self.config.min_cash_fraction {
            suggestions.push(format!(
                "cash at {:.1}% is below the {:.1}% reserve, avoid new positions",
                cash * 100.0,
                self.config.min_cash_fraction * 100.0,
            ));
            level = level.max(RiskLevel::Low);
        }

        debug!(
            risk = %level,
            warnings = warnings.len(),
            suggestions = suggestions.len(),
            "portfolio assessed"
        );
        RiskAssessment {
            risk_level: level,
            warnings,
            suggestions,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
