//! Market scanner.
//!
//! Fans per-security evaluation out across a bounded pool of tokio
//! tasks, fans results back in, and ranks what survives the confidence
//! filter. Per-security failures are skipped and recorded; a systemic
//! data-source failure aborts the scan while preserving everything
//! already computed.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::data::{DataSource, Security};
use crate::scoring::ScoringEngine;
use crate::types::Advice;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scan-wide knobs, independent of the risk profile.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Advice below this confidence is dropped from the report.
    pub min_confidence: f64,
    /// Bars requested per security.
    pub lookback: usize,
    /// Maximum in-flight per-security evaluations.
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_confidence: 60.0,
            lookback: 120,
            concurrency: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// One security the scan could not evaluate, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedSecurity {
    pub code: String,
    pub reason: String,
}

/// Outcome of a scan: ranked advice plus evaluation accounting.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Ranked descending by score, then confidence, then ascending code.
    pub advice: Vec<Advice>,
    /// Securities successfully evaluated (kept or confidence-filtered).
    pub evaluated: usize,
    pub skipped: Vec<SkippedSecurity>,
}

impl ScanReport {
    /// First `n` advice records in ranked order. Pure selection; no
    /// recomputation.
    pub fn top_picks(&self, n: usize) -> Vec<Advice> {
        self.advice.iter().take(n).cloned().collect()
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scan: {} advice, {} evaluated, {} skipped",
            self.advice.len(),
            self.evaluated,
            self.skipped.len(),
        )?;
        for advice in &self.advice {
            writeln!(f, "  {advice}")?;
        }
        for skip in &self.skipped {
            writeln!(f, "  skipped {}: {}", skip.code, skip.reason)?;
        }
        Ok(())
    }
}

/// Systemic scan failure. Already-computed results ride along rather
/// than being discarded.
#[derive(Debug, thiserror::Error)]
#[error("scan aborted: {reason}")]
pub struct ScanAborted {
    pub partial: ScanReport,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

enum Outcome {
    Kept(Box<Advice>),
    Filtered,
    Skipped(SkippedSecurity),
    Fatal(String),
    NotAttempted,
}

/// Applies a `ScoringEngine` across a security universe.
pub struct MarketScanner {
    data: Arc<dyn DataSource>,
    engine: Arc<ScoringEngine>,
    config: ScanConfig,
}

impl MarketScanner {
    pub fn new(data: Arc<dyn DataSource>, engine: Arc<ScoringEngine>, config: ScanConfig) -> Self {
        Self {
            data,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the given universe.
    ///
    /// Every security is evaluated independently under a bounded pool.
    /// A `DataSourceUnavailable` from any task stops new requests from
    /// being issued and aborts the scan; in-flight and completed results
    /// are preserved in the error's `partial` report.
    pub async fn scan(&self, universe: &[Security]) -> Result<ScanReport, ScanAborted> {
        info!(
            universe = universe.len(),
            min_confidence = self.config.min_confidence,
            concurrency = self.config.concurrency,
            "starting market scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let aborting = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(universe.len());
        for security in universe {
            let data = Arc::clone(&self.data);
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let aborting = Arc::clone(&aborting);
            let security = security.clone();
            let lookback = self.config.lookback;
            let min_confidence = self.config.min_confidence;

            handles.push(tokio::spawn(async move {
                // Semaphore is never closed while handles are alive.
                let Ok(_permit) = semaphore.acquire().await else {
                    return Outcome::NotAttempted;
                };
                // Cancellation: once a systemic failure is seen, stop
                // issuing new requests.
                if aborting.load(AtomicOrdering::SeqCst) {
                    return Outcome::NotAttempted;
                }
                let outcome =
                    evaluate_one(&*data, &engine, &security, lookback, min_confidence).await;
                if matches!(outcome, Outcome::Fatal(_)) {
                    aborting.store(true, AtomicOrdering::SeqCst);
                }
                outcome
            }));
        }

        let mut report = ScanReport::default();
        let mut fatal: Option<String> = None;

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Outcome::Kept(advice)) => {
                    report.evaluated += 1;
                    report.advice.push(*advice);
                }
                Ok(Outcome::Filtered) => report.evaluated += 1,
                Ok(Outcome::Skipped(skip)) => {
                    warn!(code = %skip.code, reason = %skip.reason, "security skipped");
                    report.skipped.push(skip);
                }
                Ok(Outcome::Fatal(reason)) => {
                    fatal.get_or_insert(reason);
                }
                Ok(Outcome::NotAttempted) => {}
                Err(e) => {
                    warn!(error = %e, "scan task failed");
                    report.skipped.push(SkippedSecurity {
                        code: "<unknown>".to_string(),
                        reason: format!("task failure: {e}"),
                    });
                }
            }
        }

        rank(&mut report.advice);

        match fatal {
            Some(reason) => {
                warn!(
                    reason = %reason,
                    partial = report.advice.len(),
                    "scan aborted, returning partial results"
                );
                Err(ScanAborted {
                    partial: report,
                    reason,
                })
            }
            None => {
                info!(
                    advice = report.advice.len(),
                    evaluated = report.evaluated,
                    skipped = report.skipped.len(),
                    "market scan complete"
                );
                Ok(report)
            }
        }
    }
}

async fn evaluate_one(
    data: &dyn DataSource,
    engine: &ScoringEngine,
    security: &Security,
    lookback: usize,
    min_confidence: f64,
) -> Outcome {
    let indicators = match data.get_indicators(&security.code, lookback).await {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_per_security() => {
            return Outcome::Skipped(SkippedSecurity {
                code: security.code.clone(),
                reason: e.to_string(),
            })
        }
        Err(e) => return Outcome::Fatal(e.to_string()),
    };

    let fundamentals = match data.get_fundamentals(&security.code).await {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_per_security() => {
            return Outcome::Skipped(SkippedSecurity {
                code: security.code.clone(),
                reason: e.to_string(),
            })
        }
        Err(e) => return Outcome::Fatal(e.to_string()),
    };

    match engine.evaluate(&security.code, &security.name, &indicators, &fundamentals) {
        Ok(advice) if advice.confidence >= min_confidence => Outcome::Kept(Box::new(advice)),
        Ok(advice) => {
            debug!(
                code = %security.code,
                confidence = advice.confidence,
                "below confidence floor"
            );
            Outcome::Filtered
        }
        Err(e) if e.is_per_security() => Outcome::Skipped(SkippedSecurity {
            code: security.code.clone(),
            reason: e.to_string(),
        }),
        Err(e) => Outcome::Fatal(e.to_string()),
    }
}

/// Deterministic ranking: score desc, confidence desc, code asc.
fn rank(advice: &mut [Advice]) {
    advice.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
            .then(
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal),
            )
            .then_with(|| a.code.cmp(&b.code))
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
