//! Paper-trading portfolios with average-cost accounting.
//!
//! Each user's portfolio is mutated under its own map shard lock, so
//! trades for different users never block each other and two trades for
//! the same user are applied one after the other.

use std::collections::BTreeMap;

use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::TradeError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub shares: u64,
    #[serde(rename = "avgPrice")]
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
}

impl Portfolio {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::str::FromStr for TradeAction {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            other => Err(TradeError::InvalidTrade(format!("unknown action '{other}'"))),
        }
    }
}

/// Body of `POST /trade`. Every field is optional on the wire so that
/// incomplete requests surface as `InvalidTrade` instead of a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TradeRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub ticker: Option<String>,
    pub action: Option<String>,
    pub shares: Option<i64>,
    pub price: Option<Decimal>,
}

/// A trade that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub user_id: String,
    pub ticker: String,
    pub action: TradeAction,
    pub shares: u64,
    pub price: Decimal,
}

impl TryFrom<TradeRequest> for Trade {
    type Error = TradeError;

    fn try_from(req: TradeRequest) -> Result<Self, Self::Error> {
        let user_id = req
            .user_id
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TradeError::InvalidTrade("userId".into()))?;
        let ticker = req
            .ticker
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TradeError::InvalidTrade("ticker".into()))?;
        let action = req
            .action
            .ok_or_else(|| TradeError::InvalidTrade("action".into()))?
            .parse::<TradeAction>()?;
        let shares = req
            .shares
            .filter(|s| *s > 0)
            .ok_or_else(|| TradeError::InvalidTrade("shares must be a positive integer".into()))?
            as u64;
        let price = req
            .price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| TradeError::InvalidTrade("price must be positive".into()))?;

        Ok(Trade {
            user_id,
            ticker,
            action,
            shares,
            price,
        })
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

pub struct PortfolioBook {
    portfolios: DashMap<String, Portfolio>,
    initial_cash: Decimal,
}

impl Default for PortfolioBook {
    fn default() -> Self {
        Self::new(dec!(100000))
    }
}

impl PortfolioBook {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            portfolios: DashMap::new(),
            initial_cash,
        }
    }

    /// Current portfolio, created with the starting cash if absent.
    pub fn get_or_create(&self, user_id: &str) -> Portfolio {
        self.portfolios
            .entry(user_id.to_string())
            .or_insert_with(|| Portfolio::new(self.initial_cash))
            .clone()
    }

    /// Apply a trade and return the updated portfolio.
    ///
    /// A rejected trade leaves the portfolio untouched.
    pub fn execute(&self, trade: &Trade) -> Result<Portfolio, TradeError> {
        let mut entry = self
            .portfolios
            .entry(trade.user_id.clone())
            .or_insert_with(|| Portfolio::new(self.initial_cash));
        let portfolio = entry.value_mut();
        let value = Decimal::from(trade.shares)
            .checked_mul(trade.price)
            .ok_or_else(out_of_range)?;

        match trade.action {
            TradeAction::Buy => {
                if portfolio.cash < value {
                    return Err(TradeError::InsufficientFunds {
                        needed: value,
                        available: portfolio.cash,
                    });
                }
                let (held, avg_price) = portfolio
                    .positions
                    .get(&trade.ticker)
                    .map(|p| (p.shares, p.avg_price))
                    .unwrap_or((0, Decimal::ZERO));
                let total_shares = held.checked_add(trade.shares).ok_or_else(out_of_range)?;
                let total_cost = Decimal::from(held)
                    .checked_mul(avg_price)
                    .and_then(|cost| cost.checked_add(value))
                    .ok_or_else(out_of_range)?;

                portfolio.cash -= value;
                portfolio.positions.insert(
                    trade.ticker.clone(),
                    Position {
                        shares: total_shares,
                        avg_price: total_cost / Decimal::from(total_shares),
                    },
                );
            }
            TradeAction::Sell => {
                let held = portfolio
                    .positions
                    .get(&trade.ticker)
                    .map(|p| p.shares)
                    .unwrap_or(0);
                if held < trade.shares {
                    return Err(TradeError::InsufficientShares {
                        ticker: trade.ticker.clone(),
                        requested: trade.shares,
                        held,
                    });
                }
                portfolio.cash = portfolio.cash.checked_add(value).ok_or_else(out_of_range)?;
                if held == trade.shares {
                    portfolio.positions.remove(&trade.ticker);
                } else if let Some(position) = portfolio.positions.get_mut(&trade.ticker) {
                    position.shares -= trade.shares;
                }
            }
        }

        info!(
            user = %trade.user_id,
            ticker = %trade.ticker,
            action = ?trade.action,
            shares = trade.shares,
            price = %trade.price,
            cash = format!("${:.2}", portfolio.cash),
            "Trade executed"
        );

        Ok(portfolio.clone())
    }
}

fn out_of_range() -> TradeError {
    TradeError::InvalidTrade("trade value out of range".into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
