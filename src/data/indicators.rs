//! Technical indicator computation.
//!
//! Turns raw OHLCV history into fully enriched `Bar`s. Warm-up bars are
//! seeded from whatever prefix is available (neutral values where no
//! sensible seed exists) so downstream code never sees NaN.
//!
//! Periods match common convention: SMA 5/20/60, MACD 12/26/9, RSI 14,
//! KDJ 9, Bollinger 20/2, ATR 14, ADX 14, CCI 20, ROC 12, Williams %R 14.

use chrono::NaiveDate;

use crate::types::Bar;

const MA_SHORT: usize = 5;
const MA_MID: usize = 20;
const MA_LONG: usize = 60;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const RSI_PERIOD: usize = 14;
const KDJ_PERIOD: usize = 9;
const BOLL_PERIOD: usize = 20;
const BOLL_WIDTH: f64 = 2.0;
const ATR_PERIOD: usize = 14;
const ADX_PERIOD: usize = 14;
const CCI_PERIOD: usize = 20;
const ROC_PERIOD: usize = 12;
const WILLIAMS_PERIOD: usize = 14;

/// One raw daily bar as delivered by a provider, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Enrich raw bars with the full indicator set, preserving order.
pub fn enrich(raw: &[RawBar]) -> Vec<Bar> {
    if raw.is_empty() {
        return Vec::new();
    }

    let closes: Vec<f64> = raw.iter().map(|b| b.close).collect();

    let ma_short = sma(&closes, MA_SHORT);
    let ma_mid = sma(&closes, MA_MID);
    let ma_long = sma(&closes, MA_LONG);

    let ema_fast = ema(&closes, MACD_FAST);
    let ema_slow = ema(&closes, MACD_SLOW);
    let macd: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let macd_signal = ema(&macd, MACD_SIGNAL);

    let rsi = rsi_series(&closes, RSI_PERIOD);
    let (stoch_k, stoch_d, stoch_j) = kdj(raw, KDJ_PERIOD);
    let boll_middle = sma(&closes, BOLL_PERIOD);
    let boll_std = rolling_std(&closes, BOLL_PERIOD);
    let atr = atr_series(raw, ATR_PERIOD);
    let adx = adx_series(raw, ADX_PERIOD);
    let obv = obv_series(raw);
    let cci = cci_series(raw, CCI_PERIOD);
    let williams_r = williams_series(raw, WILLIAMS_PERIOD);

    raw.iter()
        .enumerate()
        .map(|(i, b)| {
            let roc = if i >= ROC_PERIOD && closes[i - ROC_PERIOD] > 0.0 {
                (closes[i] / closes[i - ROC_PERIOD] - 1.0) * 100.0
            } else {
                0.0
            };
            Bar {
                date: b.date,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
                ma_short: ma_short[i],
                ma_mid: ma_mid[i],
                ma_long: ma_long[i],
                macd: macd[i],
                macd_signal: macd_signal[i],
                macd_hist: macd[i] - macd_signal[i],
                rsi: rsi[i],
                stoch_k: stoch_k[i],
                stoch_d: stoch_d[i],
                stoch_j: stoch_j[i],
                boll_upper: boll_middle[i] + BOLL_WIDTH * boll_std[i],
                boll_middle: boll_middle[i],
                boll_lower: boll_middle[i] - BOLL_WIDTH * boll_std[i],
                atr: atr[i],
                adx: adx[i],
                obv: obv[i],
                cci: cci[i],
                roc,
                williams_r: williams_r[i],
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Series helpers
// ---------------------------------------------------------------------------

/// Simple moving average; warm-up bars average the available prefix.
fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        let window = (i + 1).min(period);
        out.push(sum / window as f64);
    }
    out
}

/// Exponential moving average seeded with the first value.
fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    for v in values {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Rolling standard deviation over the trailing window (population).
fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &values[start..=i];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
        out.push(var.sqrt());
    }
    out
}

/// Wilder RSI; warm-up bars hold a neutral 50.
fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![50.0; closes.len()];
    if closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta >= 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        if avg_gain <= 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// KDJ stochastic: RSV over the trailing window, K/D as 1/3-weighted
/// recursions seeded at 50, J = 3K - 2D.
fn kdj(raw: &[RawBar], period: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut ks = Vec::with_capacity(raw.len());
    let mut ds = Vec::with_capacity(raw.len());
    let mut js = Vec::with_capacity(raw.len());
    let mut k = 50.0;
    let mut d = 50.0;

    for i in 0..raw.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &raw[start..=i];
        let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let rsv = if high > low {
            (raw[i].close - low) / (high - low) * 100.0
        } else {
            50.0
        };
        k = (2.0 * k + rsv) / 3.0;
        d = (2.0 * d + k) / 3.0;
        ks.push(k);
        ds.push(d);
        js.push(3.0 * k - 2.0 * d);
    }
    (ks, ds, js)
}

fn true_range(bar: &RawBar, prev_close: f64) -> f64 {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let lc = (bar.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Wilder ATR; warm-up bars use the running mean of true ranges.
fn atr_series(raw: &[RawBar], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(raw.len());
    let mut atr = raw[0].high - raw[0].low;
    for i in 0..raw.len() {
        let tr = if i == 0 {
            raw[0].high - raw[0].low
        } else {
            true_range(&raw[i], raw[i - 1].close)
        };
        if i < period {
            // Running mean during warm-up.
            atr = (atr * i as f64 + tr) / (i as f64 + 1.0);
        } else {
            atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        }
        out.push(atr);
    }
    out
}

/// Wilder ADX from smoothed directional movement; warm-up bars are 0
/// (reads as "no established trend").
fn adx_series(raw: &[RawBar], period: usize) -> Vec<f64> {
    let n = raw.len();
    let mut out = vec![0.0; n];
    if n < 2 {
        return out;
    }

    let mut smooth_tr = 0.0;
    let mut smooth_plus = 0.0;
    let mut smooth_minus = 0.0;
    let mut adx = 0.0;
    let mut dx_count = 0usize;

    for i in 1..n {
        let up = raw[i].high - raw[i - 1].high;
        let down = raw[i - 1].low - raw[i].low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
        let tr = true_range(&raw[i], raw[i - 1].close);

        if i <= period {
            smooth_tr += tr;
            smooth_plus += plus_dm;
            smooth_minus += minus_dm;
            if i < period {
                continue;
            }
        } else {
            smooth_tr = smooth_tr - smooth_tr / period as f64 + tr;
            smooth_plus = smooth_plus - smooth_plus / period as f64 + plus_dm;
            smooth_minus = smooth_minus - smooth_minus / period as f64 + minus_dm;
        }

        if smooth_tr <= 0.0 {
            out[i] = adx;
            continue;
        }
        let di_plus = 100.0 * smooth_plus / smooth_tr;
        let di_minus = 100.0 * smooth_minus / smooth_tr;
        let di_sum = di_plus + di_minus;
        let dx = if di_sum > 0.0 {
            100.0 * (di_plus - di_minus).abs() / di_sum
        } else {
            0.0
        };

        dx_count += 1;
        if dx_count == 1 {
            adx = dx;
        } else if dx_count <= period {
            adx = (adx * (dx_count as f64 - 1.0) + dx) / dx_count as f64;
        } else {
            adx = (adx * (period as f64 - 1.0) + dx) / period as f64;
        }
        out[i] = adx;
    }
    out
}

/// On-balance volume, cumulative from the first bar.
fn obv_series(raw: &[RawBar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(raw.len());
    let mut obv = 0.0;
    for i in 0..raw.len() {
        if i > 0 {
            if raw[i].close > raw[i - 1].close {
                obv += raw[i].volume;
            } else if raw[i].close < raw[i - 1].close {
                obv -= raw[i].volume;
            }
        }
        out.push(obv);
    }
    out
}

/// Commodity channel index over typical prices.
fn cci_series(raw: &[RawBar], period: usize) -> Vec<f64> {
    let tp: Vec<f64> = raw.iter().map(|b| (b.high + b.low + b.close) / 3.0).collect();
    let mut out = Vec::with_capacity(raw.len());
    for i in 0..tp.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &tp[start..=i];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let mean_dev = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / window.len() as f64;
        if mean_dev > 0.0 {
            out.push((tp[i] - mean) / (0.015 * mean_dev));
        } else {
            out.push(0.0);
        }
    }
    out
}

/// Williams %R in [-100, 0]; flat windows read as midrange -50.
fn williams_series(raw: &[RawBar], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(raw.len());
    for i in 0..raw.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &raw[start..=i];
        let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        if high > low {
            out.push((high - raw[i].close) / (high - low) * -100.0);
        } else {
            out.push(-50.0);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(closes: &[f64]) -> Vec<RawBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| RawBar {
                date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: c * 0.995,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 1000.0 + i as f64,
            })
            .collect()
    }

    fn ramp(start: f64, end: f64, n: usize) -> Vec<RawBar> {
        let closes: Vec<f64> = (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect();
        raw(&closes)
    }

    #[test]
    fn test_enrich_preserves_length_and_order() {
        let bars = enrich(&ramp(10.0, 12.0, 80));
        assert_eq!(bars.len(), 80);
        assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_enrich_empty_input() {
        assert!(enrich(&[]).is_empty());
    }

    #[test]
    fn test_sma_flat_series() {
        let values = vec![10.0; 30];
        for v in sma(&values, 5) {
            assert!((v - 10.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_sma_warmup_uses_prefix() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        let out = sma(&values, 3);
        assert!((out[0] - 1.0).abs() < 1e-10);
        assert!((out[1] - 1.5).abs() < 1e-10);
        assert!((out[2] - 2.0).abs() < 1e-10);
        assert!((out[3] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_rsi_uptrend_above_downtrend() {
        let up = enrich(&ramp(10.0, 15.0, 80));
        let down = enrich(&ramp(15.0, 10.0, 80));
        let rsi_up = up.last().unwrap().rsi;
        let rsi_down = down.last().unwrap().rsi;
        assert!(rsi_up > 50.0, "uptrend rsi {rsi_up}");
        assert!(rsi_down < 50.0, "downtrend rsi {rsi_down}");
    }

    #[test]
    fn test_rsi_bounded() {
        for bars in [enrich(&ramp(10.0, 20.0, 80)), enrich(&ramp(20.0, 10.0, 80))] {
            for b in &bars {
                assert!((0.0..=100.0).contains(&b.rsi));
            }
        }
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let bars = enrich(&ramp(10.0, 15.0, 80));
        let last = bars.last().unwrap();
        assert!(last.macd > 0.0);
    }

    #[test]
    fn test_ma_ordering_in_uptrend() {
        // In a steady uptrend the faster average sits above the slower.
        let bars = enrich(&ramp(10.0, 15.0, 80));
        let last = bars.last().unwrap();
        assert!(last.ma_short > last.ma_mid);
        assert!(last.ma_mid > last.ma_long);
    }

    #[test]
    fn test_bollinger_brackets_middle() {
        let bars = enrich(&ramp(10.0, 12.0, 80));
        for b in &bars {
            assert!(b.boll_upper >= b.boll_middle);
            assert!(b.boll_middle >= b.boll_lower);
        }
    }

    #[test]
    fn test_atr_positive() {
        let bars = enrich(&ramp(10.0, 12.0, 80));
        assert!(bars.iter().all(|b| b.atr > 0.0));
    }

    #[test]
    fn test_kdj_high_in_rally() {
        let bars = enrich(&ramp(10.0, 15.0, 80));
        let last = bars.last().unwrap();
        // Closes pinned near the top of the window keep K and its
        // smoothed D well above neutral.
        assert!(last.stoch_k > 50.0, "K {}", last.stoch_k);
        assert!(last.stoch_d > 50.0, "D {}", last.stoch_d);
    }

    #[test]
    fn test_williams_r_range() {
        let bars = enrich(&ramp(10.0, 15.0, 80));
        for b in &bars {
            assert!((-100.0..=0.0).contains(&b.williams_r), "got {}", b.williams_r);
        }
    }

    #[test]
    fn test_obv_rises_with_up_closes() {
        let bars = enrich(&ramp(10.0, 15.0, 80));
        assert!(bars.last().unwrap().obv > 0.0);
    }

    #[test]
    fn test_roc_matches_price_change() {
        let bars = enrich(&ramp(10.0, 15.0, 80));
        let last = bars.last().unwrap();
        assert!(last.roc > 0.0);
        let down = enrich(&ramp(15.0, 10.0, 80));
        assert!(down.last().unwrap().roc < 0.0);
    }

    #[test]
    fn test_adx_strong_trend_beats_chop() {
        let trend = enrich(&ramp(10.0, 20.0, 80));
        let closes: Vec<f64> = (0..80)
            .map(|i| if i % 2 == 0 { 10.0 } else { 10.1 })
            .collect();
        let chop = enrich(&raw(&closes));
        assert!(trend.last().unwrap().adx > chop.last().unwrap().adx);
    }
}
