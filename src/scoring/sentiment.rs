//! Sentiment factor score.
//!
//! Starts from a neutral 50 and adjusts for short/medium-term price
//! momentum, the direction of the volatility trend (ATR drift), and
//! trend strength (ADX level). Clamped to [0,100].

use crate::types::IndicatorSnapshot;

/// Compute the sentiment score (0–100).
pub fn score(snapshot: &IndicatorSnapshot) -> f64 {
    let mut score: f64 = 50.0;

    // 1. Price momentum: 5-day and 20-day returns in percent.
    if let (Some(r5), Some(r20)) = (trailing_return(snapshot, 4), trailing_return(snapshot, 19)) {
        if r5 > 5.0 && r20 > 10.0 {
            score += 25.0;
        } else if r5 > 0.0 && r20 > 0.0 {
            score += 15.0;
        } else if r5 < -5.0 && r20 < -10.0 {
            score -= 25.0;
        } else if r5 < 0.0 && r20 < 0.0 {
            score -= 15.0;
        }
    }

    // 2. Volatility trend: falling ATR reads as stabilising, a spike as risk.
    let recent_atr = snapshot.mean_atr(5);
    let avg_atr = snapshot.mean_atr(60);
    if avg_atr > 0.0 {
        if recent_atr < avg_atr * 0.8 {
            score += 10.0;
        } else if recent_atr > avg_atr * 1.5 {
            score -= 10.0;
        }
    }

    // 3. Trend strength (ADX).
    if let Some(latest) = snapshot.latest() {
        if latest.adx > 25.0 {
            score += 15.0;
        } else if latest.adx > 20.0 {
            score += 10.0;
        } else {
            score += 5.0;
        }
    }

    score.clamp(0.0, 100.0)
}

/// Return over the last `back` bars in percent, None when history is
/// too short or the reference close is non-positive.
fn trailing_return(snapshot: &IndicatorSnapshot, back: usize) -> Option<f64> {
    let now = snapshot.latest()?.close;
    let then = snapshot.back(back)?.close;
    if then > 0.0 {
        Some((now / then - 1.0) * 100.0)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
