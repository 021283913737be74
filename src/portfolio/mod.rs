//! Portfolio construction.
//!
//! Turns ranked advice into a capital-weighted `Portfolio` under hard
//! constraints: per-position cap, position count cap, and a minimum
//! cash reserve. Rebalancing (`rebalance`) and ongoing risk checks
//! (`risk`) operate on the snapshots this module produces.

pub mod rebalance;
pub mod risk;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{Advice, AdvisorError, Portfolio, Position};

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Hard allocation constraints, validated at construction time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Constraints {
    /// Cap on any single position as a fraction of capital.
    pub max_position_fraction: f64,
    /// Maximum number of simultaneous positions.
    pub max_position_count: usize,
    /// Fraction of capital always kept in cash.
    pub min_cash_fraction: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_position_fraction: 0.15,
            max_position_count: 10,
            min_cash_fraction: 0.15,
        }
    }
}

impl Constraints {
    pub fn validate(&self) -> Result<(), AdvisorError> {
        if !(0.0..=1.0).contains(&self.max_position_fraction) || self.max_position_fraction == 0.0 {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "max_position_fraction out of range: {}",
                self.max_position_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.min_cash_fraction) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "min_cash_fraction out of range: {}",
                self.min_cash_fraction
            )));
        }
        if self.max_position_count == 0 {
            return Err(AdvisorError::ConfigurationInvalid(
                "max_position_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Allocates capital across buy-eligible advice.
#[derive(Debug, Clone)]
pub struct PortfolioBuilder {
    constraints: Constraints,
}

impl PortfolioBuilder {
    pub fn new(constraints: Constraints) -> Result<Self, AdvisorError> {
        constraints.validate()?;
        Ok(Self { constraints })
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Build a fresh portfolio from ranked advice.
    ///
    /// Selects the top buy-eligible records (the input is assumed to be
    /// already ranked by the scanner), weights them by score share,
    /// confidence, and risk adjustment, normalizes to the investable
    /// fraction, and caps per-position weight with proportional
    /// redistribution. Whole shares only; fractional remainders and any
    /// allocation that would buy zero shares stay in cash.
    pub fn build(&self, advice: &[Advice], capital: f64) -> Result<Portfolio, AdvisorError> {
        if capital <= 0.0 || !capital.is_finite() {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "capital must be positive, got {capital}"
            )));
        }

        let selected: Vec<&Advice> = advice
            .iter()
            .filter(|a| a.is_buy() && a.current_price > 0.0)
            .take(self.constraints.max_position_count)
            .collect();

        if selected.len() < self.constraints.max_position_count {
            info!(
                requested = self.constraints.max_position_count,
                filled = selected.len(),
                "fewer qualifying advice records than requested positions"
            );
        }

        let mut portfolio = Portfolio::all_cash(capital);
        if selected.is_empty() {
            return Ok(portfolio);
        }

        let weights = self.target_weights(&selected);

        for (advice, weight) in selected.iter().zip(&weights) {
            let allocation = capital * weight;
            let shares = (allocation / advice.current_price).floor() as u64;
            if shares == 0 {
                debug!(code = %advice.code, weight, "allocation buys zero shares, returned to cash");
                continue;
            }
            let cost = shares as f64 * advice.current_price;
            portfolio.cash -= cost;
            portfolio.positions.push(Position {
                code: advice.code.clone(),
                name: advice.name.clone(),
                shares,
                entry_price: advice.current_price,
                current_price: advice.current_price,
                weight: cost / capital,
                stop_loss: advice.stop_loss,
                target_price: advice.target_price,
                entry_date: advice.timestamp,
            });
        }

        info!(
            positions = portfolio.position_count(),
            cash = portfolio.cash,
            "portfolio built"
        );
        Ok(portfolio)
    }

    /// Target weight per selected advice record, pre share rounding.
    fn target_weights(&self, selected: &[&Advice]) -> Vec<f64> {
        let score_sum: f64 = selected.iter().map(|a| a.overall_score).sum();
        if score_sum <= 0.0 {
            return vec![0.0; selected.len()];
        }

        let mut weights: Vec<f64> = selected
            .iter()
            .map(|a| {
                (a.overall_score / score_sum)
                    * (a.confidence / 100.0)
                    * a.risk_level.allocation_adjustment()
            })
            .collect();

        // Normalize to the investable fraction.
        let raw_sum: f64 = weights.iter().sum();
        if raw_sum <= 0.0 {
            return vec![0.0; selected.len()];
        }
        let investable = 1.0 - self.constraints.min_cash_fraction;
        for w in weights.iter_mut() {
            *w *= investable / raw_sum;
        }

        cap_and_redistribute(&mut weights, self.constraints.max_position_fraction);
        weights
    }
}

/// Cap each weight, handing the clipped excess proportionally to the
/// uncapped weights. The capped set only grows, so the loop reaches a
/// fixed point within `len + 1` passes; leftover excess that cannot be
/// placed stays in cash.
fn cap_and_redistribute(weights: &mut [f64], cap: f64) {
    for _ in 0..=weights.len() {
        let mut excess = 0.0;
        for w in weights.iter_mut() {
            if *w > cap {
                excess += *w - cap;
                *w = cap;
            }
        }
        if excess <= 1e-12 {
            break;
        }
        let uncapped_sum: f64 = weights.iter().filter(|w| **w < cap).sum();
        if uncapped_sum <= 1e-12 {
            break;
        }
        let scale = excess / uncapped_sum;
        for w in weights.iter_mut() {
            if *w < cap {
                *w += *w * scale;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Horizon, RiskLevel, Signal};
    use chrono::Utc;

    // ---- helpers ----

    fn buy_advice(code: &str, score: f64, confidence: f64, price: f64, risk: RiskLevel) -> Advice {
        Advice {
            code: code.to_string(),
            name: format!("Stock {code}"),
            signal: Signal::from_score(score),
            confidence,
            current_price: price,
            target_price: price * 1.15,
            stop_loss: price * 0.92,
            reasons: vec!["test".to_string()],
            risk_level: risk,
            position_size: 0.1,
            horizon: Horizon::Short,
            technical_score: score,
            fundamental_score: score,
            sentiment_score: score,
            overall_score: score,
            timestamp: Utc::now(),
        }
    }

    fn builder() -> PortfolioBuilder {
        PortfolioBuilder::new(Constraints::default()).unwrap()
    }

    // ---- constraint validation ----

    #[test]
    fn test_constraints_validation() {
        assert!(Constraints::default().validate().is_ok());
        assert!(Constraints {
            max_position_fraction: 0.0,
            ..Constraints::default()
        }
        .validate()
        .is_err());
        assert!(Constraints {
            min_cash_fraction: 1.0,
            ..Constraints::default()
        }
        .validate()
        .is_err());
        assert!(Constraints {
            max_position_count: 0,
            ..Constraints::default()
        }
        .validate()
        .is_err());
    }

    // ---- allocation ----

    #[test]
    fn test_three_way_allocation_respects_cap_and_cash() {
        // Scores 90/75/60, confidences 90/70/60, all Medium risk. The
        // score-60 pick carries an explicit Buy signal so all three are
        // eligible.
        let advice = vec![
            buy_advice("600001", 90.0, 90.0, 1.0, RiskLevel::Medium),
            buy_advice("600002", 75.0, 70.0, 1.0, RiskLevel::Medium),
            Advice {
                signal: Signal::Buy,
                ..buy_advice("600003", 60.0, 60.0, 1.0, RiskLevel::Medium)
            },
        ];
        let portfolio = builder().build(&advice, 100.0).unwrap();

        assert_eq!(portfolio.position_count(), 3);
        for pos in &portfolio.positions {
            assert!(
                pos.weight <= 0.15 + 1e-9,
                "{} weight {} exceeds cap",
                pos.code,
                pos.weight
            );
        }
        // Weights plus cash account for all capital.
        let invested: f64 = portfolio.positions.iter().map(|p| p.weight).sum();
        assert!((invested + portfolio.cash / 100.0 - 1.0).abs() < 1e-9);
        assert!(portfolio.cash_fraction() >= 0.15);
    }

    #[test]
    fn test_redistribution_preserves_total_and_order() {
        // Loose cap so only the top pick clips: its excess must flow to
        // the other two proportionally.
        let constraints = Constraints {
            max_position_fraction: 0.40,
            max_position_count: 10,
            min_cash_fraction: 0.15,
        };
        let builder = PortfolioBuilder::new(constraints).unwrap();
        let advice = vec![
            buy_advice("600001", 90.0, 90.0, 1.0, RiskLevel::Medium),
            buy_advice("600002", 75.0, 70.0, 1.0, RiskLevel::Medium),
            buy_advice("600003", 60.0, 60.0, 1.0, RiskLevel::Medium),
        ];
        let selected: Vec<&Advice> = advice.iter().collect();
        let weights = builder.target_weights(&selected);

        // Uncapped raw weights: 0.4062 / 0.2633 / 0.1805 (sum 0.85).
        assert!((weights[0] - 0.40).abs() < 1e-9, "top pick clipped to cap");
        assert!(weights[1] > 0.2633 && weights[2] > 0.1805, "excess redistributed");
        // Redistribution is proportional: the uncapped pair keep their ratio.
        assert!((weights[1] / weights[2] - 0.2633 / 0.1805).abs() < 1e-3);
        // Total investable fraction is preserved.
        let total: f64 = weights.iter().sum();
        assert!((total - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_all_capped_leaves_excess_in_cash() {
        let advice = vec![
            buy_advice("600001", 90.0, 90.0, 1.0, RiskLevel::Medium),
            buy_advice("600002", 85.0, 85.0, 1.0, RiskLevel::Medium),
        ];
        let portfolio = builder().build(&advice, 100.0).unwrap();
        // Two positions at the 15% cap leave 70% in cash.
        assert!((portfolio.cash - 70.0).abs() < 1.0);
    }

    #[test]
    fn test_position_count_cap() {
        let constraints = Constraints {
            max_position_count: 2,
            ..Constraints::default()
        };
        let builder = PortfolioBuilder::new(constraints).unwrap();
        let advice = vec![
            buy_advice("600001", 90.0, 90.0, 1.0, RiskLevel::Medium),
            buy_advice("600002", 85.0, 85.0, 1.0, RiskLevel::Medium),
            buy_advice("600003", 80.0, 80.0, 1.0, RiskLevel::Medium),
        ];
        let portfolio = builder.build(&advice, 1000.0).unwrap();
        assert_eq!(portfolio.position_count(), 2);
        // Ranked input: the first two codes are taken.
        assert!(portfolio.position("600001").is_some());
        assert!(portfolio.position("600002").is_some());
    }

    #[test]
    fn test_non_buy_advice_excluded() {
        let advice = vec![
            buy_advice("600001", 90.0, 90.0, 1.0, RiskLevel::Medium),
            buy_advice("600002", 50.0, 50.0, 1.0, RiskLevel::Medium), // Hold
            buy_advice("600003", 20.0, 20.0, 1.0, RiskLevel::Medium), // StrongSell
        ];
        let portfolio = builder().build(&advice, 1000.0).unwrap();
        assert_eq!(portfolio.position_count(), 1);
        assert!(portfolio.position("600001").is_some());
    }

    #[test]
    fn test_zero_share_allocation_returned_to_cash() {
        // Price far above the per-position allocation: zero shares.
        let advice = vec![buy_advice("600519", 90.0, 90.0, 1700.0, RiskLevel::Medium)];
        let portfolio = builder().build(&advice, 100.0).unwrap();
        assert_eq!(portfolio.position_count(), 0);
        assert_eq!(portfolio.cash, 100.0);
    }

    #[test]
    fn test_whole_shares_only() {
        let advice = vec![buy_advice("600001", 90.0, 90.0, 7.0, RiskLevel::Medium)];
        let portfolio = builder().build(&advice, 1000.0).unwrap();
        let pos = portfolio.position("600001").unwrap();
        // 15% cap → $150 → 21 whole shares at $7.
        assert_eq!(pos.shares, 21);
        assert!((portfolio.cash - (1000.0 - 147.0)).abs() < 1e-9);
    }

    #[test]
    fn test_high_risk_underweighted() {
        let advice = vec![
            buy_advice("600001", 80.0, 80.0, 1.0, RiskLevel::Low),
            buy_advice("600002", 80.0, 80.0, 1.0, RiskLevel::High),
        ];
        let constraints = Constraints {
            max_position_fraction: 0.60,
            ..Constraints::default()
        };
        let builder = PortfolioBuilder::new(constraints).unwrap();
        let selected: Vec<&Advice> = advice.iter().collect();
        let weights = builder.target_weights(&selected);
        // Same score and confidence, so the 1.2 vs 0.7 adjustment decides.
        assert!((weights[0] / weights[1] - 1.2 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_empty_advice_yields_all_cash() {
        let portfolio = builder().build(&[], 5000.0).unwrap();
        assert_eq!(portfolio.position_count(), 0);
        assert_eq!(portfolio.cash, 5000.0);
        assert_eq!(portfolio.total_capital, 5000.0);
    }

    #[test]
    fn test_invalid_capital_rejected() {
        assert!(builder().build(&[], 0.0).is_err());
        assert!(builder().build(&[], -100.0).is_err());
        assert!(builder().build(&[], f64::NAN).is_err());
    }

    #[test]
    fn test_cap_and_redistribute_fixed_point() {
        // Cascade: redistribution pushes the second weight over the cap
        // in the next pass.
        let mut weights = vec![0.50, 0.28, 0.07];
        cap_and_redistribute(&mut weights, 0.30);
        for w in &weights {
            assert!(*w <= 0.30 + 1e-9, "weight {w} above cap");
        }
        // Mass conserved while uncapped capacity remains.
        let total: f64 = weights.iter().sum();
        assert!(total <= 0.85 + 1e-9);
        assert!(total >= 0.60 - 1e-9);
    }
}
