// Expose the modules
pub mod depth;
pub mod events;
pub mod ledger;
pub mod matching_engine;
pub mod orderbook;
pub mod price_index;
pub mod registry;
pub mod scaling;
pub mod types;

// Re-export key types for easier usage
pub use depth::{DepthLevel, DepthSnapshot};
pub use events::{EngineEvent, EventBus, EventLogger, EventMetadata, Subscription};
pub use ledger::{InMemoryLedger, Ledger, LedgerError};
pub use matching_engine::{EngineError, EngineResult, MAX_BATCH_SIZE, MatchingEngine};
pub use orderbook::{OrderBook, PriceLevel};
pub use price_index::PriceIndex;
pub use registry::{PairHandle, PairRegistry, RegistryError};
pub use scaling::{ScaleError, base_units, quote_units, unit_scale};
pub use types::{AccountId, Asset, AssetId, Order, OrderId, Side, Trade};
