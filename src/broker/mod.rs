pub mod snapshot;
pub mod stream;
mod traits;

pub use snapshot::{AccountSnapshot, DeskSnapshot, SnapshotSource};
pub use stream::{collect_greeks, CollectUntil};
pub use traits::{select_account, AccountSource, GreeksStream, MarketDataSource};
