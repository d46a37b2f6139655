pub mod broker;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod gex;
pub mod risk;
pub mod scanner;
pub mod schedule;
pub mod strategy;
pub mod workflow;

pub use broker::{AccountSource, MarketDataSource, SnapshotSource};
pub use config::AppConfig;
pub use error::{GexDeskError, Result, RiskError};
pub use gex::{build_profile, GexAgent, GexResult};
pub use risk::{assess_portfolio, PortfolioRiskReport, RiskManager};
pub use scanner::{IvrData, Scanner};
pub use schedule::{MarketSchedule, MarketState, SessionStatus};
pub use strategy::{StrategyScreener, StrategyTarget};
pub use workflow::{DeskRun, DeskWorkflow, RunOptions};
