//! Shared types for the quant-advisor pipeline.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that data, scoring, scanner,
//! and portfolio modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Bars & snapshots
// ---------------------------------------------------------------------------

/// Minimum number of bars required for a valid analysis.
pub const MIN_BARS: usize = 60;

/// One daily bar with its precomputed indicator fields.
///
/// Indicator fields are filled by the data layer (see `data::indicators`);
/// early bars carry seed values rather than NaN so every field is always
/// safe to read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// 5-day simple moving average.
    pub ma_short: f64,
    /// 20-day simple moving average.
    pub ma_mid: f64,
    /// 60-day simple moving average.
    pub ma_long: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    /// 14-day RSI (0–100).
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub stoch_j: f64,
    pub boll_upper: f64,
    pub boll_middle: f64,
    pub boll_lower: f64,
    /// 14-day average true range.
    pub atr: f64,
    /// 14-day average directional index.
    pub adx: f64,
    pub obv: f64,
    pub cci: f64,
    pub roc: f64,
    pub williams_r: f64,
}

/// Chronologically ordered price history with indicators, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub bars: Vec<Bar>,
}

impl IndicatorSnapshot {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Whether enough history is present for a valid analysis.
    pub fn is_sufficient(&self) -> bool {
        self.bars.len() >= MIN_BARS
    }

    /// The most recent bar. Returns None on an empty snapshot rather
    /// than panicking.
    pub fn latest(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Bar `n` places before the latest (0 = latest).
    pub fn back(&self, n: usize) -> Option<&Bar> {
        if n < self.bars.len() {
            self.bars.get(self.bars.len() - 1 - n)
        } else {
            None
        }
    }

    /// Mean volume over the trailing `n` bars.
    pub fn mean_volume(&self, n: usize) -> f64 {
        mean_of(&self.bars, n, |b| b.volume)
    }

    /// Mean ATR over the trailing `n` bars.
    pub fn mean_atr(&self, n: usize) -> f64 {
        mean_of(&self.bars, n, |b| b.atr)
    }
}

fn mean_of(bars: &[Bar], n: usize, f: impl Fn(&Bar) -> f64) -> f64 {
    if bars.is_empty() || n == 0 {
        return 0.0;
    }
    let take = n.min(bars.len());
    let sum: f64 = bars[bars.len() - take..].iter().map(f).sum();
    sum / take as f64
}

/// Fundamental ratios for one security.
///
/// Percentages are expressed as plain numbers (ROE of 15% is `15.0`);
/// debt ratio and current ratio are fractions/ratios as reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    /// Return on equity, percent.
    pub roe: f64,
    /// Year-on-year revenue growth, percent.
    pub revenue_growth: f64,
    /// Year-on-year net profit growth, percent.
    pub profit_growth: f64,
    pub pe_ratio: f64,
    pub pb_ratio: f64,
    /// Liabilities / assets, fraction.
    pub debt_ratio: f64,
    pub current_ratio: f64,
    /// Earnings per share.
    pub eps: f64,
    /// Book value per share.
    pub bvps: f64,
    /// Gross margin, percent.
    pub gross_margin: f64,
}

impl FundamentalSnapshot {
    /// Neutral fallback used when a provider has no fundamental data.
    /// The values land mid-band in the fundamental factor, so a missing
    /// report neither rewards nor penalizes a security.
    pub fn neutral() -> Self {
        Self {
            roe: 8.0,
            revenue_growth: 5.0,
            profit_growth: 5.0,
            pe_ratio: 20.0,
            pb_ratio: 2.5,
            debt_ratio: 0.6,
            current_ratio: 1.2,
            eps: 0.5,
            bvps: 5.0,
            gross_margin: 25.0,
        }
    }
}

impl Default for FundamentalSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

// ---------------------------------------------------------------------------
// Risk profile
// ---------------------------------------------------------------------------

/// Session-wide risk appetite. Immutable once selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    pub const ALL: &'static [RiskProfile] = &[
        RiskProfile::Conservative,
        RiskProfile::Moderate,
        RiskProfile::Aggressive,
    ];

    /// Built-in parameter tuple for this profile.
    pub fn params(&self) -> ProfileParams {
        match self {
            RiskProfile::Conservative => ProfileParams {
                max_position_fraction: 0.05,
                stop_loss_fraction: 0.05,
                min_acceptable_score: 75.0,
                weights: FactorWeights {
                    technical: 0.30,
                    fundamental: 0.50,
                    sentiment: 0.20,
                },
            },
            RiskProfile::Moderate => ProfileParams {
                max_position_fraction: 0.10,
                stop_loss_fraction: 0.08,
                min_acceptable_score: 65.0,
                weights: FactorWeights {
                    technical: 0.40,
                    fundamental: 0.35,
                    sentiment: 0.25,
                },
            },
            RiskProfile::Aggressive => ProfileParams {
                max_position_fraction: 0.15,
                stop_loss_fraction: 0.12,
                min_acceptable_score: 55.0,
                weights: FactorWeights {
                    technical: 0.50,
                    fundamental: 0.25,
                    sentiment: 0.25,
                },
            },
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::Conservative => write!(f, "Conservative"),
            RiskProfile::Moderate => write!(f, "Moderate"),
            RiskProfile::Aggressive => write!(f, "Aggressive"),
        }
    }
}

impl std::str::FromStr for RiskProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskProfile::Conservative),
            "moderate" | "medium" => Ok(RiskProfile::Moderate),
            "aggressive" => Ok(RiskProfile::Aggressive),
            _ => Err(anyhow::anyhow!("Unknown risk profile: {s}")),
        }
    }
}

/// Factor weight triple. Must sum to 1.0 (see `validate`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
}

impl FactorWeights {
    /// Validate that the weights are non-negative and sum to 1.0.
    pub fn validate(&self) -> Result<(), AdvisorError> {
        if self.technical < 0.0 || self.fundamental < 0.0 || self.sentiment < 0.0 {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "factor weights must be non-negative: {self:?}"
            )));
        }
        let sum = self.technical + self.fundamental + self.sentiment;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "factor weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Parameters bound to a risk profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfileParams {
    /// Hard cap on the fraction of capital in any one position.
    pub max_position_fraction: f64,
    /// Default stop-loss distance as a fraction of entry price.
    pub stop_loss_fraction: f64,
    /// Advisory floor below which a composite score is not Buy-worthy.
    pub min_acceptable_score: f64,
    pub weights: FactorWeights,
}

impl ProfileParams {
    pub fn validate(&self) -> Result<(), AdvisorError> {
        self.weights.validate()?;
        if !(0.0..=1.0).contains(&self.max_position_fraction) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "max_position_fraction out of range: {}",
                self.max_position_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.stop_loss_fraction) {
            return Err(AdvisorError::ConfigurationInvalid(format!(
                "stop_loss_fraction out of range: {}",
                self.stop_loss_fraction
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signal & classification enums
// ---------------------------------------------------------------------------

/// Graded trade signal. Closed set — every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Signal {
    /// Map a composite score to its signal band.
    ///
    /// Bands are fixed and non-overlapping:
    /// [80,100] StrongBuy, [65,80) Buy, [45,65) Hold, [30,45) Sell,
    /// [0,30) StrongSell.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Signal::StrongBuy
        } else if score >= 65.0 {
            Signal::Buy
        } else if score >= 45.0 {
            Signal::Hold
        } else if score >= 30.0 {
            Signal::Sell
        } else {
            Signal::StrongSell
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Signal::StrongBuy | Signal::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, Signal::StrongSell | Signal::Sell)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::StrongBuy => write!(f, "STRONG BUY"),
            Signal::Buy => write!(f, "BUY"),
            Signal::Hold => write!(f, "HOLD"),
            Signal::Sell => write!(f, "SELL"),
            Signal::StrongSell => write!(f, "STRONG SELL"),
        }
    }
}

/// Risk classification. Ordered: Low < Medium < High.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Position-size multiplier applied to the confidence-scaled base size.
    pub fn sizing_multiplier(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 0.8,
            RiskLevel::High => 0.5,
        }
    }

    /// Allocation adjustment used when weighting a portfolio.
    pub fn allocation_adjustment(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.2,
            RiskLevel::Medium => 1.0,
            RiskLevel::High => 0.7,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

/// Suggested holding horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::Short => write!(f, "Short"),
            Horizon::Medium => write!(f, "Medium"),
            Horizon::Long => write!(f, "Long"),
        }
    }
}

// ---------------------------------------------------------------------------
// Advice
// ---------------------------------------------------------------------------

/// A fully computed recommendation for one security.
///
/// Created fresh on every analysis pass and never mutated — when the
/// underlying data changes, the whole record is recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advice {
    pub code: String,
    pub name: String,
    pub signal: Signal,
    /// Confidence in the signal (0–100). Equal to `overall_score` by
    /// design; kept as a separate field because downstream filters are
    /// specified against confidence, not score.
    pub confidence: f64,
    pub current_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    /// Human-readable triggering conditions, for explainability only.
    pub reasons: Vec<String>,
    pub risk_level: RiskLevel,
    /// Suggested position as a fraction of capital, already capped at the
    /// profile's max_position_fraction.
    pub position_size: f64,
    pub horizon: Horizon,
    pub technical_score: f64,
    pub fundamental_score: f64,
    pub sentiment_score: f64,
    /// Weighted composite of the three factor scores (0–100).
    pub overall_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl Advice {
    pub fn is_buy(&self) -> bool {
        self.signal.is_buy()
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | {} score={:.1} (T {:.0} / F {:.0} / S {:.0}) | px={:.2} tgt={:.2} stop={:.2} | pos={:.1}% risk={} {}",
            self.code,
            self.name,
            self.signal,
            self.overall_score,
            self.technical_score,
            self.fundamental_score,
            self.sentiment_score,
            self.current_price,
            self.target_price,
            self.stop_loss,
            self.position_size * 100.0,
            self.risk_level,
            self.horizon,
        )
    }
}

// ---------------------------------------------------------------------------
// Portfolio types
// ---------------------------------------------------------------------------

/// An open holding, owned exclusively by a `Portfolio`.
///
/// Stop and target prices are carried over from the advice that opened the
/// position — the rebalance triggers fire against these stored levels, not
/// against freshly recomputed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub code: String,
    pub name: String,
    pub shares: u64,
    pub entry_price: f64,
    pub current_price: f64,
    /// Fraction of total capital at build time.
    pub weight: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub entry_date: DateTime<Utc>,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.shares as f64 * self.current_price
    }

    /// Unrealized P&L as a fraction of entry cost.
    pub fn pnl_fraction(&self) -> f64 {
        if self.entry_price > 0.0 {
            (self.current_price - self.entry_price) / self.entry_price
        } else {
            0.0
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pnl = self.pnl_fraction() * 100.0;
        let sign = if pnl >= 0.0 { "+" } else { "" };
        write!(
            f,
            "{} {} | {} sh @ {:.2} now {:.2} ({sign}{pnl:.1}%) w={:.1}% stop={:.2} tgt={:.2}",
            self.code,
            self.name,
            self.shares,
            self.entry_price,
            self.current_price,
            self.weight * 100.0,
            self.stop_loss,
            self.target_price,
        )
    }
}

/// A capital-weighted set of positions plus cash.
///
/// Conceptually versioned: each rebalance produces a new snapshot rather
/// than patching this one, so risk checks always run against a fixed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    /// Capital the portfolio was built with.
    pub total_capital: f64,
    pub cash: f64,
    /// Unique by security code.
    pub positions: Vec<Position>,
    /// Highest total value observed across snapshots (for drawdown).
    pub peak_value: f64,
    pub created_at: DateTime<Utc>,
}

impl Portfolio {
    /// Empty portfolio holding only cash.
    pub fn all_cash(capital: f64) -> Self {
        Self {
            total_capital: capital,
            cash: capital,
            positions: Vec::new(),
            peak_value: capital,
            created_at: Utc::now(),
        }
    }

    /// Current total value: cash plus marked-to-market positions.
    pub fn total_value(&self) -> f64 {
        self.cash + self.positions.iter().map(|p| p.market_value()).sum::<f64>()
    }

    /// Return since inception as a fraction of starting capital.
    pub fn return_fraction(&self) -> f64 {
        if self.total_capital > 0.0 {
            (self.total_value() - self.total_capital) / self.total_capital
        } else {
            0.0
        }
    }

    /// Peak-to-current decline as a non-positive fraction.
    pub fn drawdown(&self) -> f64 {
        if self.peak_value > 0.0 {
            ((self.total_value() - self.peak_value) / self.peak_value).min(0.0)
        } else {
            0.0
        }
    }

    /// Cash as a fraction of current total value.
    pub fn cash_fraction(&self) -> f64 {
        let value = self.total_value();
        if value > 0.0 {
            self.cash / value
        } else {
            1.0
        }
    }

    /// Largest single-position weight (concentration).
    pub fn max_weight(&self) -> f64 {
        self.positions.iter().map(|p| p.weight).fold(0.0, f64::max)
    }

    pub fn position(&self, code: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.code == code)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Portfolio: value={:.2} cash={:.2} ({:.1}%) positions={} return={:+.2}% drawdown={:.2}%",
            self.total_value(),
            self.cash,
            self.cash_fraction() * 100.0,
            self.position_count(),
            self.return_fraction() * 100.0,
            self.drawdown() * 100.0,
        )?;
        let mut sorted: Vec<&Position> = self.positions.iter().collect();
        sorted.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for pos in sorted {
            writeln!(f, "  {pos}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy.
///
/// `SecurityUnavailable` and `DataInsufficient` are local to one security
/// and are skipped-and-logged at the scanner level; `DataSourceUnavailable`
/// is systemic and aborts a scan; `ConfigurationInvalid` is fatal at
/// construction time.
#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("insufficient data for {code}: {bars} bars, need {required}")]
    DataInsufficient {
        code: String,
        bars: usize,
        required: usize,
    },

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("data unavailable for {code}: {message}")]
    SecurityUnavailable { code: String, message: String },

    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),
}

impl AdvisorError {
    /// Whether this failure is local to one security (skip-and-continue)
    /// as opposed to systemic (abort the scan).
    pub fn is_per_security(&self) -> bool {
        matches!(
            self,
            AdvisorError::DataInsufficient { .. } | AdvisorError::SecurityUnavailable { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
