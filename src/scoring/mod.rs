//! Multi-factor scoring engine.
//!
//! Combines the technical, fundamental, and sentiment factor scores into
//! a weighted composite, maps the composite to a graded signal, and
//! derives the remaining advice fields: price targets, position size,
//! risk level, horizon, and rationale strings.
//!
//! `evaluate` is a pure function of its inputs: the same snapshots and
//! profile always produce the same advice (modulo the timestamp).

pub mod fundamental;
pub mod sentiment;
pub mod technical;

use chrono::Utc;
use tracing::debug;

use crate::types::{
    Advice, AdvisorError, FundamentalSnapshot, Horizon, IndicatorSnapshot, ProfileParams,
    RiskLevel, RiskProfile, Signal, MIN_BARS,
};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless evaluator bound to one risk profile.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    profile: RiskProfile,
    params: ProfileParams,
}

impl ScoringEngine {
    /// Engine with the profile's built-in parameters.
    pub fn new(profile: RiskProfile) -> Self {
        Self {
            profile,
            params: profile.params(),
        }
    }

    /// Engine with overridden parameters (configured weight overrides).
    /// Rejects weight triples that do not sum to 1.0.
    pub fn with_params(profile: RiskProfile, params: ProfileParams) -> Result<Self, AdvisorError> {
        params.validate()?;
        Ok(Self { profile, params })
    }

    pub fn profile(&self) -> RiskProfile {
        self.profile
    }

    pub fn params(&self) -> &ProfileParams {
        &self.params
    }

    /// Evaluate one security and produce a full advice record.
    ///
    /// Fails with `DataInsufficient` when fewer than `MIN_BARS` bars are
    /// present; all other inputs produce a (possibly Hold) advice.
    pub fn evaluate(
        &self,
        code: &str,
        name: &str,
        indicators: &IndicatorSnapshot,
        fundamentals: &FundamentalSnapshot,
    ) -> Result<Advice, AdvisorError> {
        if !indicators.is_sufficient() {
            return Err(AdvisorError::DataInsufficient {
                code: code.to_string(),
                bars: indicators.len(),
                required: MIN_BARS,
            });
        }
        // is_sufficient guarantees a latest bar.
        let latest = indicators.latest().ok_or_else(|| {
            AdvisorError::DataInsufficient {
                code: code.to_string(),
                bars: 0,
                required: MIN_BARS,
            }
        })?;
        let current_price = latest.close;

        let technical_score = technical::score(indicators);
        let fundamental_score = fundamental::score(fundamentals);
        let sentiment_score = sentiment::score(indicators);

        let w = self.params.weights;
        let overall_score = round2(
            technical_score * w.technical
                + fundamental_score * w.fundamental
                + sentiment_score * w.sentiment,
        );

        let signal = Signal::from_score(overall_score);
        let confidence = overall_score;

        let (target_price, stop_loss) =
            self.price_targets(current_price, latest.atr, signal, confidence);
        let risk_level = self.assess_risk(indicators, overall_score);
        let position_size = self.position_size(confidence, risk_level);
        let horizon = determine_horizon(latest.adx, signal, fundamental_score);
        let reasons = generate_reasons(
            indicators,
            technical_score,
            fundamental_score,
            sentiment_score,
        );

        debug!(
            code,
            signal = %signal,
            score = overall_score,
            technical = technical_score,
            fundamental = fundamental_score,
            sentiment = sentiment_score,
            risk = %risk_level,
            "evaluated security"
        );

        Ok(Advice {
            code: code.to_string(),
            name: name.to_string(),
            signal,
            confidence,
            current_price,
            target_price,
            stop_loss,
            reasons,
            risk_level,
            position_size,
            horizon,
            technical_score,
            fundamental_score,
            sentiment_score,
            overall_score,
            timestamp: Utc::now(),
        })
    }

    /// Target and stop prices, rounded to 2 decimals.
    ///
    /// The target offset scales with confidence, bounded to [5%, 25%].
    /// For buys the stop is the tighter of an ATR stop (2x ATR below) and
    /// the profile's fractional stop; sells mirror both levels above the
    /// current price.
    fn price_targets(&self, price: f64, atr: f64, signal: Signal, confidence: f64) -> (f64, f64) {
        let offset = (0.05 + 0.20 * confidence / 100.0).clamp(0.05, 0.25);
        let slf = self.params.stop_loss_fraction;
        let (target, stop) = if signal.is_buy() {
            let atr_stop = price - 2.0 * atr;
            let frac_stop = price * (1.0 - slf);
            (price * (1.0 + offset), atr_stop.max(frac_stop))
        } else if signal.is_sell() {
            let atr_stop = price + 2.0 * atr;
            let frac_stop = price * (1.0 + slf);
            (price * (1.0 - offset), atr_stop.min(frac_stop))
        } else {
            (price, price * (1.0 - slf))
        };
        (round2(target), round2(stop))
    }

    /// Accumulate risk points from volatility, score weakness, and trend
    /// extremity; >=4 is High, >=2 Medium, else Low.
    fn assess_risk(&self, indicators: &IndicatorSnapshot, overall_score: f64) -> RiskLevel {
        let mut points = 0u8;

        if let Some(latest) = indicators.latest() {
            if latest.close > 0.0 {
                let atr_pct = latest.atr / latest.close;
                if atr_pct > 0.05 {
                    points += 2;
                } else if atr_pct > 0.03 {
                    points += 1;
                }
            }
        }

        if overall_score < 50.0 {
            points += 2;
        } else if overall_score < 65.0 {
            points += 1;
        }

        if let (Some(now), Some(then)) = (indicators.latest(), indicators.back(19)) {
            if then.close > 0.0 {
                let r20 = now.close / then.close - 1.0;
                if r20.abs() > 0.2 {
                    points += 1;
                }
            }
        }

        if points >= 4 {
            RiskLevel::High
        } else if points >= 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Confidence-scaled fraction of the profile cap, shrunk by risk
    /// level and never exceeding the cap. Rounded to 3 decimals.
    fn position_size(&self, confidence: f64, risk_level: RiskLevel) -> f64 {
        let cap = self.params.max_position_fraction;
        let base = cap * (confidence / 100.0) * risk_level.sizing_multiplier();
        round3(base.min(cap))
    }
}

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// A strong trend (ADX > 30) supports a medium hold, stretched to long
/// when the signal and fundamentals both back it; everything else is a
/// short-horizon trade.
fn determine_horizon(adx: f64, signal: Signal, fundamental_score: f64) -> Horizon {
    if adx > 30.0 {
        if signal == Signal::StrongBuy && fundamental_score >= 70.0 {
            Horizon::Long
        } else {
            Horizon::Medium
        }
    } else {
        Horizon::Short
    }
}

/// Human-readable rationale lines. Explainability only — nothing
/// downstream parses these.
fn generate_reasons(
    indicators: &IndicatorSnapshot,
    technical_score: f64,
    fundamental_score: f64,
    sentiment_score: f64,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if let Some(latest) = indicators.latest() {
        if technical_score >= 70.0 {
            if latest.ma_short > latest.ma_mid {
                reasons.push("Short-term MA above medium-term MA (golden cross)".to_string());
            }
            if latest.macd > latest.macd_signal {
                reasons.push("MACD shows a bullish crossover".to_string());
            }
            if latest.rsi > 30.0 && latest.rsi < 70.0 {
                reasons.push("RSI in healthy range, neither overbought nor oversold".to_string());
            }
        } else if technical_score < 40.0 {
            if latest.ma_short < latest.ma_mid {
                reasons.push("Short-term MA below medium-term MA (dead cross)".to_string());
            }
            if latest.rsi > 70.0 {
                reasons.push("RSI overbought, pullback risk".to_string());
            }
        }
    }

    if fundamental_score >= 70.0 {
        reasons.push("Strong fundamentals with solid profitability".to_string());
    } else if fundamental_score < 40.0 {
        reasons.push("Weak fundamentals, caution warranted".to_string());
    }

    if sentiment_score >= 70.0 {
        reasons.push("Positive market sentiment, capital flowing in".to_string());
    } else if sentiment_score < 40.0 {
        reasons.push("Depressed market sentiment, capital flowing out".to_string());
    }

    let recent_vol = indicators.mean_volume(5);
    let avg_vol = indicators.mean_volume(60);
    if avg_vol > 0.0 && recent_vol > avg_vol * 1.5 {
        reasons.push("Expanding volume, elevated market attention".to_string());
    }

    if reasons.is_empty() {
        reasons.push("Based on multi-factor quantitative analysis".to_string());
    }
    reasons
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
