//! Portfolio rebalancing.
//!
//! Diffs an existing portfolio against a fresh advice set and emits
//! per-security actions, then materializes a new portfolio snapshot.
//! The prior snapshot is never mutated.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use tracing::{debug, info};

use crate::portfolio::PortfolioBuilder;
use crate::types::{Advice, AdvisorError, Portfolio, Position};

/// Loss fraction beyond which an unrecommended holding is cut.
const LOSS_EXIT_THRESHOLD: f64 = 0.05;

/// Per-security rebalance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldingAction {
    Hold,
    Sell,
    ReducePosition,
    AddPosition,
    Exit,
}

impl fmt::Display for HoldingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldingAction::Hold => write!(f, "Hold"),
            HoldingAction::Sell => write!(f, "Sell"),
            HoldingAction::ReducePosition => write!(f, "ReducePosition"),
            HoldingAction::AddPosition => write!(f, "AddPosition"),
            HoldingAction::Exit => write!(f, "Exit"),
        }
    }
}

/// Applies exit triggers to holdings and reinvests freed capital.
#[derive(Debug, Clone)]
pub struct RebalanceEngine {
    builder: PortfolioBuilder,
}

impl RebalanceEngine {
    pub fn new(builder: PortfolioBuilder) -> Self {
        Self { builder }
    }

    /// Per-security actions for one rebalance pass.
    ///
    /// Holdings are checked against triggers in strict priority order,
    /// first match wins:
    /// 1. price at or below the stored stop-loss → Exit
    /// 2. price at or above the stored target → Exit (take profit)
    /// 3. fresh Sell/StrongSell signal → Exit
    /// 4. loss of 5%+ while absent from the buy-eligible set → Exit
    /// 5. otherwise → Hold
    ///
    /// Buy-eligible advice for securities not currently held is proposed
    /// as AddPosition.
    pub fn actions(
        &self,
        portfolio: &Portfolio,
        advice: &[Advice],
    ) -> BTreeMap<String, HoldingAction> {
        let mut actions = BTreeMap::new();

        for position in &portfolio.positions {
            let fresh = advice.iter().find(|a| a.code == position.code);
            let price = fresh.map_or(position.current_price, |a| a.current_price);
            let action = holding_action(position, price, fresh);
            debug!(code = %position.code, action = %action, price, "holding action");
            actions.insert(position.code.clone(), action);
        }

        for a in advice {
            if a.is_buy() && portfolio.position(&a.code).is_none() {
                actions.insert(a.code.clone(), HoldingAction::AddPosition);
            }
        }

        actions
    }

    /// Produce the next portfolio snapshot.
    ///
    /// Holdings are marked to the advice prices, exit triggers applied,
    /// and freed capital (prior cash plus exited market value) re-run
    /// through the allocation algorithm over the AddPosition candidates.
    pub fn rebalance(
        &self,
        portfolio: &Portfolio,
        advice: &[Advice],
    ) -> Result<Portfolio, AdvisorError> {
        let actions = self.actions(portfolio, advice);

        let mut kept: Vec<Position> = Vec::new();
        let mut freed = portfolio.cash;

        for position in &portfolio.positions {
            let mut position = position.clone();
            if let Some(fresh) = advice.iter().find(|a| a.code == position.code) {
                position.current_price = fresh.current_price;
            }
            match actions.get(&position.code) {
                Some(HoldingAction::Exit) => {
                    info!(
                        code = %position.code,
                        pnl = position.pnl_fraction(),
                        "exiting position"
                    );
                    freed += position.market_value();
                }
                _ => kept.push(position),
            }
        }

        // Candidates: buy-eligible and not carried over.
        let candidates: Vec<Advice> = advice
            .iter()
            .filter(|a| a.is_buy() && !kept.iter().any(|p| p.code == a.code))
            .cloned()
            .collect();

        let mut next = if freed > 0.0 && !candidates.is_empty() {
            self.builder.build(&candidates, freed)?
        } else {
            Portfolio::all_cash(freed.max(0.0))
        };

        next.total_capital = portfolio.total_capital;
        next.positions.extend(kept);
        next.created_at = Utc::now();

        // Peak ratchets on what the prior snapshot was worth at these prices.
        let marked_prior = marked_value(portfolio, advice);
        next.peak_value = portfolio.peak_value.max(marked_prior).max(next.total_value());

        // Weights are relative to current total value of the new snapshot.
        let total = next.total_value();
        if total > 0.0 {
            for p in next.positions.iter_mut() {
                p.weight = p.market_value() / total;
            }
        }

        info!(
            positions = next.position_count(),
            cash = next.cash,
            value = next.total_value(),
            "rebalance complete"
        );
        Ok(next)
    }
}

/// First-match-wins trigger evaluation for one holding.
fn holding_action(position: &Position, price: f64, fresh: Option<&Advice>) -> HoldingAction {
    if price <= position.stop_loss {
        return HoldingAction::Exit;
    }
    if price >= position.target_price {
        return HoldingAction::Exit;
    }
    if let Some(a) = fresh {
        if a.signal.is_sell() {
            return HoldingAction::Exit;
        }
    }
    let loss = if position.entry_price > 0.0 {
        (position.entry_price - price) / position.entry_price
    } else {
        0.0
    };
    let buy_recommended = fresh.is_some_and(|a| a.is_buy());
    if loss >= LOSS_EXIT_THRESHOLD && !buy_recommended {
        return HoldingAction::Exit;
    }
    HoldingAction::Hold
}

/// Prior portfolio value at the new advice prices.
fn marked_value(portfolio: &Portfolio, advice: &[Advice]) -> f64 {
    let positions: f64 = portfolio
        .positions
        .iter()
        .map(|p| {
            let price = advice
                .iter()
                .find(|a| a.code == p.code)
                .map_or(p.current_price, |a| a.current_price);
            p.shares as f64 * price
        })
        .sum();
    portfolio.cash + positions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
