//! Eastmoney market data provider.
//!
//! Fetches daily candlesticks from the public Eastmoney push2his kline
//! endpoint (no key required) and enriches them with the full indicator
//! set. Fundamentals fall back to neutral defaults when the provider has
//! no report for a code.
//!
//! API: `https://push2his.eastmoney.com/api/qt/stock/kline/get`
//! Auth: None required.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{indicators, DataSource, Security, UniverseFilter};
use crate::types::{AdvisorError, FundamentalSnapshot, IndicatorSnapshot};

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct KlineResponse {
    #[serde(default)]
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    name: String,
    /// Comma-separated rows: date,open,close,high,low,volume,amount
    #[serde(default)]
    klines: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP-backed `DataSource` over Eastmoney public endpoints.
///
/// The scannable universe is supplied at construction (from config);
/// Eastmoney itself is only queried per security.
pub struct EastmoneyClient {
    http: Client,
    universe: Vec<Security>,
}

impl EastmoneyClient {
    pub fn new(universe: Vec<Security>) -> Result<Self, AdvisorError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("quant-advisor/0.1.0")
            .build()
            .map_err(|e| {
                AdvisorError::DataSourceUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { http, universe })
    }

    /// Exchange-qualified security id: Shanghai codes (6xxxxx) are market
    /// 1, everything else market 0 (Shenzhen).
    fn secid(code: &str) -> String {
        if code.starts_with('6') {
            format!("1.{code}")
        } else {
            format!("0.{code}")
        }
    }

    /// Parse one kline row. Rows are comma-separated:
    /// date,open,close,high,low,volume,amount
    fn parse_kline(code: &str, row: &str) -> Result<indicators::RawBar, AdvisorError> {
        let malformed = |detail: &str| AdvisorError::SecurityUnavailable {
            code: code.to_string(),
            message: format!("malformed kline row ({detail}): {row}"),
        };

        let fields: Vec<&str> = row.split(',').collect();
        if fields.len() < 6 {
            return Err(malformed("too few fields"));
        }
        let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
            .map_err(|_| malformed("bad date"))?;
        let num = |i: usize| -> Result<f64, AdvisorError> {
            fields[i].parse::<f64>().map_err(|_| malformed("bad number"))
        };
        Ok(indicators::RawBar {
            date,
            open: num(1)?,
            close: num(2)?,
            high: num(3)?,
            low: num(4)?,
            volume: num(5)?,
        })
    }
}

#[async_trait]
impl DataSource for EastmoneyClient {
    async fn get_indicators(
        &self,
        code: &str,
        lookback: usize,
    ) -> Result<IndicatorSnapshot, AdvisorError> {
        let url = format!(
            "{KLINE_URL}?secid={}&fields1=f1,f2,f3&fields2=f51,f52,f53,f54,f55,f56,f57\
             &klt=101&fqt=1&end=20500101&lmt={lookback}",
            Self::secid(code),
        );

        let resp = self.http.get(&url).send().await.map_err(|e| {
            // Connectivity loss is systemic, not a property of one code.
            AdvisorError::DataSourceUnavailable(format!("Eastmoney request failed: {e}"))
        })?;

        if !resp.status().is_success() {
            return Err(AdvisorError::SecurityUnavailable {
                code: code.to_string(),
                message: format!("Eastmoney returned {}", resp.status()),
            });
        }

        let body: KlineResponse = resp.json().await.map_err(|e| {
            AdvisorError::SecurityUnavailable {
                code: code.to_string(),
                message: format!("failed to parse kline response: {e}"),
            }
        })?;

        let data = body.data.ok_or_else(|| AdvisorError::SecurityUnavailable {
            code: code.to_string(),
            message: "empty kline payload".to_string(),
        })?;

        let mut raw = Vec::with_capacity(data.klines.len());
        for row in &data.klines {
            raw.push(Self::parse_kline(code, row)?);
        }

        debug!(code, name = %data.name, bars = raw.len(), "fetched klines");
        Ok(IndicatorSnapshot::new(indicators::enrich(&raw)))
    }

    async fn get_fundamentals(&self, code: &str) -> Result<FundamentalSnapshot, AdvisorError> {
        // No stable public fundamentals endpoint; neutral defaults keep
        // the fundamental factor from skewing the composite.
        warn!(code, "no fundamental coverage, using neutral defaults");
        Ok(FundamentalSnapshot::neutral())
    }

    async fn get_universe(&self, filter: &UniverseFilter) -> Result<Vec<Security>, AdvisorError> {
        let mut universe: Vec<Security> = match &filter.codes {
            Some(codes) => self
                .universe
                .iter()
                .filter(|s| codes.contains(&s.code))
                .cloned()
                .collect(),
            None => self.universe.clone(),
        };
        if let Some(limit) = filter.limit {
            universe.truncate(limit);
        }
        Ok(universe)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secid_exchange_routing() {
        assert_eq!(EastmoneyClient::secid("600519"), "1.600519");
        assert_eq!(EastmoneyClient::secid("000001"), "0.000001");
        assert_eq!(EastmoneyClient::secid("300750"), "0.300750");
    }

    #[test]
    fn test_parse_kline_valid_row() {
        let bar =
            EastmoneyClient::parse_kline("600519", "2026-03-02,1700.0,1712.5,1720.0,1695.0,32000,5.4e9")
                .unwrap();
        assert_eq!(bar.date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(bar.open, 1700.0);
        assert_eq!(bar.close, 1712.5);
        assert_eq!(bar.high, 1720.0);
        assert_eq!(bar.low, 1695.0);
        assert_eq!(bar.volume, 32000.0);
    }

    #[test]
    fn test_parse_kline_malformed_rows() {
        for row in ["", "2026-03-02,1,2", "not-a-date,1,2,3,4,5", "2026-03-02,x,2,3,4,5"] {
            let err = EastmoneyClient::parse_kline("600519", row).unwrap_err();
            assert!(err.is_per_security(), "row {row:?} should be per-security");
        }
    }

    #[test]
    fn test_kline_response_deserializes() {
        let payload = r#"{
            "rc": 0,
            "data": {
                "code": "600519",
                "name": "Kweichow Moutai",
                "klines": [
                    "2026-03-02,1700.0,1712.5,1720.0,1695.0,32000,54000000",
                    "2026-03-03,1712.0,1705.0,1715.0,1700.0,28000,48000000"
                ]
            }
        }"#;
        let resp: KlineResponse = serde_json::from_str(payload).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.name, "Kweichow Moutai");
        assert_eq!(data.klines.len(), 2);
    }

    #[test]
    fn test_kline_response_tolerates_empty_payload() {
        let resp: KlineResponse = serde_json::from_str(r#"{"rc": 0, "data": null}"#).unwrap();
        assert!(resp.data.is_none());
    }

    #[tokio::test]
    async fn test_universe_filter_codes_and_limit() {
        let client = EastmoneyClient::new(vec![
            Security::new("600519", "Kweichow Moutai"),
            Security::new("000001", "Ping An Bank"),
            Security::new("300750", "CATL"),
        ])
        .unwrap();

        let all = client.get_universe(&UniverseFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let filtered = client
            .get_universe(&UniverseFilter {
                codes: Some(vec!["600519".to_string()]),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].code, "600519");

        let limited = client
            .get_universe(&UniverseFilter {
                codes: None,
                limit: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
