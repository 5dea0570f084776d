//! In-process state shared by request handlers: result cache, prediction
//! history and paper-trading portfolios. All three are owned values, so
//! tests build isolated instances.

pub mod cache;
pub mod history;
pub mod portfolio;

pub use cache::ResultCache;
pub use history::HistoryStore;
pub use portfolio::{Portfolio, PortfolioBook, Position, Trade, TradeAction, TradeRequest};
