//! Market data providers.
//!
//! Defines the `DataSource` trait the scanner consumes and the Eastmoney
//! HTTP implementation. Indicator enrichment (`indicators`) is shared by
//! any provider that only serves raw OHLCV bars.

pub mod eastmoney;
pub mod indicators;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AdvisorError, FundamentalSnapshot, IndicatorSnapshot};

/// A tradable security: exchange code plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub code: String,
    pub name: String,
}

impl Security {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Universe selection passed to `DataSource::get_universe`.
///
/// `codes` restricts the universe to an explicit list; `limit` truncates
/// whatever the provider would otherwise return.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseFilter {
    pub codes: Option<Vec<String>>,
    pub limit: Option<usize>,
}

/// Abstraction over external market data.
///
/// Implementations own their caching and freshness policy; the scanner
/// only requires that repeated reads within one scan pass return the
/// same snapshot content, and that concurrent reads are safe.
///
/// Per-security failures are reported as `SecurityUnavailable` or
/// `DataInsufficient` (skip-and-continue); a systemic outage is
/// `DataSourceUnavailable` and aborts the scan.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Price history with indicators for one security, most recent
    /// `lookback` bars (oldest first).
    async fn get_indicators(
        &self,
        code: &str,
        lookback: usize,
    ) -> Result<IndicatorSnapshot, AdvisorError>;

    /// Fundamental ratios for one security. Providers without fundamental
    /// coverage return `FundamentalSnapshot::neutral()`.
    async fn get_fundamentals(&self, code: &str) -> Result<FundamentalSnapshot, AdvisorError>;

    /// The scannable universe under `filter`.
    async fn get_universe(&self, filter: &UniverseFilter) -> Result<Vec<Security>, AdvisorError>;
}
