//! Technical factor score.
//!
//! Scores the latest bar of an indicator snapshot in six capped
//! components: moving-average trend stack (30), MACD crossover state (20),
//! RSI zone (15), Bollinger-band position (15), volume-trend confirmation
//! (10), and stochastic K/D/J state (10). The sum is clamped to [0,100].

use crate::types::IndicatorSnapshot;

/// Compute the technical score (0–100).
///
/// Callers guarantee at least `MIN_BARS` bars; an unexpectedly empty
/// snapshot scores a neutral 50 rather than panicking.
pub fn score(snapshot: &IndicatorSnapshot) -> f64 {
    let Some(latest) = snapshot.latest() else {
        return 50.0;
    };

    let mut score: f64 = 0.0;

    // 1. Trend stack (30): a fully ascending MA stack is the bullish
    //    alignment; a fully descending stack scores zero.
    if latest.ma_short > latest.ma_mid && latest.ma_mid > latest.ma_long {
        score += 30.0;
    } else if latest.ma_short > latest.ma_mid {
        score += 20.0;
    } else if latest.ma_short < latest.ma_mid && latest.ma_mid < latest.ma_long {
        score += 0.0;
    } else {
        score += 10.0;
    }

    // 2. MACD crossover (20): a fresh golden cross outranks a persistent
    //    bullish state; a fresh dead cross scores zero.
    let diff = latest.macd - latest.macd_signal;
    let prev_diff = snapshot
        .back(1)
        .map(|b| b.macd - b.macd_signal)
        .unwrap_or(diff);
    if diff > 0.0 {
        score += if prev_diff <= 0.0 { 20.0 } else { 15.0 };
    } else if diff < 0.0 {
        score += if prev_diff >= 0.0 { 0.0 } else { 5.0 };
    }

    // 3. RSI zone (15): healthy midrange scores best; near-oversold keeps
    //    most credit (reversal candidate), deep overbought keeps least.
    let rsi = latest.rsi;
    if rsi > 30.0 && rsi < 70.0 {
        score += 15.0;
    } else if rsi > 20.0 && rsi <= 30.0 {
        score += 12.0;
    } else if rsi <= 20.0 {
        score += 8.0;
    } else if (70.0..80.0).contains(&rsi) {
        score += 8.0;
    } else {
        score += 3.0;
    }

    // 4. Bollinger position (15): position of close within the band,
    //    0 = lower band, 1 = upper band.
    let width = latest.boll_upper - latest.boll_lower;
    if width > 0.0 {
        let position = (latest.close - latest.boll_lower) / width;
        if position > 0.3 && position < 0.7 {
            score += 15.0;
        } else if position <= 0.2 {
            score += 12.0;
        } else if position >= 0.8 {
            score += 8.0;
        } else {
            score += 10.0;
        }
    } else {
        // Degenerate band (no volatility) — treat as mid-band.
        score += 10.0;
    }

    // 5. Volume trend (10): mild expansion confirms, a volume blow-off or
    //    a dry-up does not.
    let ratio = volume_ratio(snapshot);
    if ratio > 1.2 && ratio < 2.5 {
        score += 10.0;
    } else if ratio >= 2.5 {
        score += 7.0;
    } else if ratio < 0.8 {
        score += 5.0;
    } else {
        score += 8.0;
    }

    // 6. Stochastic K/D/J (10).
    let (k, d) = (latest.stoch_k, latest.stoch_d);
    if k > d && k > 20.0 && k < 80.0 {
        score += 10.0;
    } else if k < d && k > 20.0 {
        score += 5.0;
    } else if k < 20.0 {
        score += 7.0;
    } else {
        score += 6.0;
    }

    score.clamp(0.0, 100.0)
}

/// Recent (5-bar) volume relative to the 60-bar average.
pub(crate) fn volume_ratio(snapshot: &IndicatorSnapshot) -> f64 {
    let recent = snapshot.mean_volume(5);
    let average = snapshot.mean_volume(60);
    if average > 0.0 {
        recent / average
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
