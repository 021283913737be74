//! Fundamental factor score.
//!
//! Scores a fundamental snapshot in four capped components:
//! profitability (30), growth (25), valuation (25), and financial
//! health (20). All bands are fixed; snapshots built from
//! `FundamentalSnapshot::neutral()` land near the middle of the scale.

use crate::types::FundamentalSnapshot;

/// Compute the fundamental score (0–100).
pub fn score(fundamentals: &FundamentalSnapshot) -> f64 {
    let mut score: f64 = 0.0;

    // 1. Profitability (30): ROE bands.
    let roe = fundamentals.roe;
    if roe > 15.0 {
        score += 30.0;
    } else if roe > 10.0 {
        score += 20.0;
    } else if roe > 5.0 {
        score += 10.0;
    }

    // 2. Growth (25): revenue and profit growth must confirm each other.
    let (rev, profit) = (fundamentals.revenue_growth, fundamentals.profit_growth);
    if rev > 20.0 && profit > 20.0 {
        score += 25.0;
    } else if rev > 10.0 && profit > 10.0 {
        score += 18.0;
    } else if rev > 0.0 && profit > 0.0 {
        score += 10.0;
    }

    // 3. Valuation (25): lower multiples score higher. Non-positive PE
    //    (loss-making) falls through to zero valuation credit.
    let (pe, pb) = (fundamentals.pe_ratio, fundamentals.pb_ratio);
    if pe > 0.0 && pe < 15.0 && pb > 0.0 && pb < 2.0 {
        score += 25.0;
    } else if (15.0..30.0).contains(&pe) && (2.0..4.0).contains(&pb) {
        score += 18.0;
    } else if pe >= 30.0 || pb >= 4.0 {
        score += 8.0;
    }

    // 4. Financial health (20): leverage and liquidity against safe bands.
    let (debt, current) = (fundamentals.debt_ratio, fundamentals.current_ratio);
    if debt < 0.5 && current > 1.5 {
        score += 20.0;
    } else if debt < 0.7 && current > 1.0 {
        score += 15.0;
    } else {
        score += 8.0;
    }

    score.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn excellent() -> FundamentalSnapshot {
        FundamentalSnapshot {
            roe: 22.0,
            revenue_growth: 25.0,
            profit_growth: 30.0,
            pe_ratio: 12.0,
            pb_ratio: 1.5,
            debt_ratio: 0.3,
            current_ratio: 2.0,
            eps: 2.1,
            bvps: 9.5,
            gross_margin: 45.0,
        }
    }

    fn weak() -> FundamentalSnapshot {
        FundamentalSnapshot {
            roe: 2.0,
            revenue_growth: -5.0,
            profit_growth: -12.0,
            pe_ratio: 55.0,
            pb_ratio: 6.0,
            debt_ratio: 0.85,
            current_ratio: 0.8,
            eps: 0.05,
            bvps: 2.0,
            gross_margin: 8.0,
        }
    }

    #[test]
    fn test_excellent_fundamentals_score_full() {
        assert_eq!(score(&excellent()), 100.0);
    }

    #[test]
    fn test_weak_fundamentals_score_low() {
        // Only the overvaluation consolation (8) + health floor (8)
        assert_eq!(score(&weak()), 16.0);
    }

    #[test]
    fn test_neutral_snapshot_scores_mid() {
        let s = score(&FundamentalSnapshot::neutral());
        assert!((40.0..=60.0).contains(&s), "neutral should land mid-band, got {s}");
    }

    #[test]
    fn test_roe_bands() {
        let mut f = FundamentalSnapshot::neutral();
        f.roe = 16.0;
        let high = score(&f);
        f.roe = 11.0;
        let mid = score(&f);
        f.roe = 6.0;
        let low = score(&f);
        f.roe = 0.0;
        let none = score(&f);
        assert!(high > mid && mid > low && low > none);
        assert_eq!(high - none, 30.0);
    }

    #[test]
    fn test_growth_requires_both_legs() {
        let mut f = FundamentalSnapshot::neutral();
        f.revenue_growth = 25.0;
        f.profit_growth = -1.0;
        let one_leg = score(&f);
        f.profit_growth = 25.0;
        let both = score(&f);
        assert!(both > one_leg);
    }

    #[test]
    fn test_loss_making_gets_no_valuation_credit() {
        let mut cheap = FundamentalSnapshot::neutral();
        cheap.pe_ratio = 10.0;
        cheap.pb_ratio = 1.2;
        let mut loss_making = cheap.clone();
        loss_making.pe_ratio = -8.0;
        loss_making.pb_ratio = 1.2;
        assert!(score(&cheap) > score(&loss_making));
    }

    #[test]
    fn test_score_bounded() {
        for f in [excellent(), weak(), FundamentalSnapshot::neutral()] {
            let s = score(&f);
            assert!((0.0..=100.0).contains(&s));
        }
    }
}
