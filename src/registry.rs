//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the registry of trading pairs. It enforces a whitelist of permitted
// quote assets, guarantees that at most one engine exists per unordered asset pair, and hands out
// shared engine handles. Every handle serializes its engine behind one coarse mutex, so each
// engine operation is a single critical section; distinct pairs run fully in parallel.
//
// | Component     | Description                                                               |
// |---------------|---------------------------------------------------------------------------|
// | PairHandle    | One pair's assets plus its serialized engine                              |
// | PairRegistry  | Whitelist, canonical-key uniqueness, insertion-ordered enumeration        |
//--------------------------------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::events::{EngineEvent, EventBus};
use crate::ledger::{Ledger, LedgerError};
use crate::matching_engine::MatchingEngine;
use crate::types::{AccountId, Asset, AssetId};

/// Canonical 32-byte key of an unordered asset pair.
type PairKey = [u8; 32];

/// Errors returned by registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Base and quote are the same asset.
    #[error("base and quote assets are identical")]
    IdenticalTokens,

    /// The base asset identifier is unusable (zero, or its precision is unsupported).
    #[error("invalid base asset")]
    InvalidBaseToken,

    /// The quote asset identifier is unusable.
    #[error("invalid quote asset")]
    InvalidQuoteToken,

    /// An engine already exists for this unordered asset pair.
    #[error("a pair for these assets already exists")]
    PairAlreadyExists,

    /// The quote asset is not on the whitelist.
    #[error("quote asset is not whitelisted")]
    QuoteTokenNotWhitelisted,

    /// The asset is already on the whitelist.
    #[error("quote asset is already whitelisted")]
    QuoteTokenAlreadyWhitelisted,

    /// The caller is not allowed to govern the whitelist.
    #[error("caller is not the registry owner")]
    Unauthorized,

    /// The ledger rejected an asset lookup.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One trading pair: its assets and its serialized matching engine.
///
/// The engine mutex is the pair's concurrency boundary. Locking it for the duration of one
/// operation gives that operation a consistent view; no two operations on the same pair ever
/// observe each other's partial state.
pub struct PairHandle {
    base: Asset,
    quote: Asset,
    engine: Mutex<MatchingEngine>,
}

impl std::fmt::Debug for PairHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairHandle")
            .field("base", &self.base)
            .field("quote", &self.quote)
            .finish()
    }
}

impl PartialEq for PairHandle {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && self.quote == other.quote
    }
}

impl PairHandle {
    /// Returns the pair's base asset.
    pub fn base_asset(&self) -> Asset {
        self.base
    }

    /// Returns the pair's quote asset.
    pub fn quote_asset(&self) -> Asset {
        self.quote
    }

    /// Locks the pair's engine for one operation.
    pub fn engine(&self) -> MutexGuard<'_, MatchingEngine> {
        self.engine.lock()
    }
}

/// The registry of trading pairs.
///
/// Pairs are keyed by a canonical hash of the two sorted asset identifiers, so (A, B) and (B, A)
/// name the same pair; the engine itself keeps the caller-supplied base/quote roles from
/// creation. Enumeration follows insertion order.
pub struct PairRegistry {
    /// Asset-transfer medium shared by every engine.
    ledger: Arc<dyn Ledger>,
    /// Event bus shared by the registry and every engine it creates.
    events: EventBus,
    /// When set, only this account may change the whitelist.
    owner: Option<AccountId>,
    /// Permitted quote assets.
    whitelist: HashSet<AssetId>,
    /// Canonical pair key -> handle.
    pairs: HashMap<PairKey, Arc<PairHandle>>,
    /// Handles in creation order, for enumeration.
    list: Vec<Arc<PairHandle>>,
}

impl PairRegistry {
    /// Creates a registry with an open whitelist (any caller may add quote assets).
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            events: EventBus::new("pair-registry"),
            owner: None,
            whitelist: HashSet::new(),
            pairs: HashMap::new(),
            list: Vec::new(),
        }
    }

    /// Creates a registry whose whitelist only `owner` may change.
    pub fn with_owner(ledger: Arc<dyn Ledger>, owner: AccountId) -> Self {
        let mut registry = Self::new(ledger);
        registry.owner = Some(owner);
        registry
    }

    /// Creates a new trading pair and returns its handle.
    ///
    /// The canonical key is computed over the sorted asset identifiers and guards uniqueness
    /// only; the engine is instantiated with the caller-supplied base/quote roles. Asset
    /// precision comes from the ledger.
    ///
    /// # Errors
    /// * `InvalidBaseToken` / `InvalidQuoteToken` - zero identifier, or an unsupported precision.
    /// * `IdenticalTokens` - base equals quote.
    /// * `QuoteTokenNotWhitelisted` - the quote asset has not been whitelisted.
    /// * `PairAlreadyExists` - an engine for the unordered pair exists.
    /// * `Ledger` - the ledger does not know one of the assets.
    pub fn create(
        &mut self,
        base: AssetId,
        quote: AssetId,
    ) -> Result<Arc<PairHandle>, RegistryError> {
        if base.is_nil() {
            return Err(RegistryError::InvalidBaseToken);
        }
        if quote.is_nil() {
            return Err(RegistryError::InvalidQuoteToken);
        }
        if base == quote {
            return Err(RegistryError::IdenticalTokens);
        }
        if !self.whitelist.contains(&quote) {
            return Err(RegistryError::QuoteTokenNotWhitelisted);
        }
        let key = pair_key(base, quote);
        if self.pairs.contains_key(&key) {
            return Err(RegistryError::PairAlreadyExists);
        }

        let base_asset = Asset::new(base, self.ledger.decimals(base)?);
        let quote_asset = Asset::new(quote, self.ledger.decimals(quote)?);
        let engine = MatchingEngine::new(
            base_asset,
            quote_asset,
            Arc::clone(&self.ledger),
            self.events.clone(),
        )
        .map_err(|_| RegistryError::InvalidBaseToken)?;

        let handle = Arc::new(PairHandle {
            base: base_asset,
            quote: quote_asset,
            engine: Mutex::new(engine),
        });
        self.pairs.insert(key, Arc::clone(&handle));
        self.list.push(Arc::clone(&handle));
        self.events.publish(EngineEvent::PairCreated { base, quote });
        info!(%base, %quote, pairs = self.list.len(), "pair created");
        Ok(handle)
    }

    /// Adds an asset to the quote whitelist.
    ///
    /// When the registry has an owner, only the owner may call this; an ownerless registry
    /// accepts any caller.
    ///
    /// # Errors
    /// * `Unauthorized` - `caller` is not the owner of an owned registry.
    /// * `InvalidQuoteToken` - the asset identifier is zero.
    /// * `QuoteTokenAlreadyWhitelisted` - the asset is already permitted.
    pub fn add_quote(&mut self, caller: AccountId, asset: AssetId) -> Result<(), RegistryError> {
        if let Some(owner) = self.owner {
            if caller != owner {
                return Err(RegistryError::Unauthorized);
            }
        }
        if asset.is_nil() {
            return Err(RegistryError::InvalidQuoteToken);
        }
        if !self.whitelist.insert(asset) {
            return Err(RegistryError::QuoteTokenAlreadyWhitelisted);
        }
        self.events.publish(EngineEvent::QuoteTokenAdded { asset });
        info!(%asset, "quote asset whitelisted");
        Ok(())
    }

    /// Returns true if the asset is a permitted quote asset.
    pub fn is_quote_whitelisted(&self, asset: AssetId) -> bool {
        self.whitelist.contains(&asset)
    }

    /// Returns the number of pairs created so far.
    pub fn count(&self) -> usize {
        self.list.len()
    }

    /// Returns the pair at creation index `index`.
    pub fn by_index(&self, index: usize) -> Option<Arc<PairHandle>> {
        self.list.get(index).cloned()
    }

    /// Returns every pair in creation order.
    pub fn all(&self) -> &[Arc<PairHandle>] {
        &self.list
    }

    /// Looks up the pair for two assets, in either order.
    pub fn get(&self, base: AssetId, quote: AssetId) -> Option<Arc<PairHandle>> {
        self.pairs.get(&pair_key(base, quote)).cloned()
    }

    /// Returns the event bus shared by the registry and its engines.
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

/// Hashes the lexicographically sorted pair of asset identifiers into a canonical 32-byte key.
fn pair_key(a: AssetId, b: AssetId) -> PairKey {
    let (low, high) = if a.as_bytes() <= b.as_bytes() {
        (a, b)
    } else {
        (b, a)
    };
    let mut hasher = Sha256::new();
    hasher.update(low.as_bytes());
    hasher.update(high.as_bytes());
    hasher.finalize().into()
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::types::Side;
    use uuid::Uuid;

    const D: u128 = 1_000_000_000_000_000_000;

    struct Fixture {
        registry: PairRegistry,
        ledger: Arc<InMemoryLedger>,
        admin: AccountId,
        base: AssetId,
        quote: AssetId,
    }

    fn setup() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let base = Uuid::new_v4();
        let quote = Uuid::new_v4();
        ledger.register_asset(base, 18);
        ledger.register_asset(quote, 18);
        let admin = Uuid::new_v4();
        let registry = PairRegistry::new(ledger.clone() as Arc<dyn Ledger>);
        Fixture {
            registry,
            ledger,
            admin,
            base,
            quote,
        }
    }

    #[test]
    fn test_create_pair_keeps_caller_roles() {
        let mut f = setup();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        let handle = f.registry.create(f.base, f.quote).expect("create");
        assert_eq!(handle.base_asset().id, f.base);
        assert_eq!(handle.quote_asset().id, f.quote);
        assert_eq!(handle.base_asset().decimals, 18);
        assert_eq!(f.registry.count(), 1);
    }

    #[test]
    fn test_get_is_order_insensitive() {
        let mut f = setup();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        let created = f.registry.create(f.base, f.quote).expect("create");
        let forward = match f.registry.get(f.base, f.quote) {
            Some(handle) => handle,
            None => panic!("expected the pair to be found"),
        };
        let reversed = match f.registry.get(f.quote, f.base) {
            Some(handle) => handle,
            None => panic!("expected the reversed lookup to succeed"),
        };
        assert!(Arc::ptr_eq(&created, &forward));
        assert!(Arc::ptr_eq(&created, &reversed));
    }

    #[test]
    fn test_duplicate_pair_rejected_in_either_order() {
        let mut f = setup();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        f.registry.add_quote(f.admin, f.base).expect("whitelist");
        f.registry.create(f.base, f.quote).expect("create");
        assert_eq!(
            f.registry.create(f.base, f.quote),
            Err(RegistryError::PairAlreadyExists)
        );
        // The canonical key ignores role order.
        assert_eq!(
            f.registry.create(f.quote, f.base),
            Err(RegistryError::PairAlreadyExists)
        );
    }

    #[test]
    fn test_identical_and_nil_assets_rejected() {
        let mut f = setup();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        assert_eq!(
            f.registry.create(f.quote, f.quote),
            Err(RegistryError::IdenticalTokens)
        );
        assert_eq!(
            f.registry.create(Uuid::nil(), f.quote),
            Err(RegistryError::InvalidBaseToken)
        );
        assert_eq!(
            f.registry.create(f.base, Uuid::nil()),
            Err(RegistryError::InvalidQuoteToken)
        );
    }

    #[test]
    fn test_whitelist_enforced_on_create() {
        let mut f = setup();
        assert_eq!(
            f.registry.create(f.base, f.quote),
            Err(RegistryError::QuoteTokenNotWhitelisted)
        );
    }

    #[test]
    fn test_add_quote_rejects_duplicates_and_nil() {
        let mut f = setup();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        assert_eq!(
            f.registry.add_quote(f.admin, f.quote),
            Err(RegistryError::QuoteTokenAlreadyWhitelisted)
        );
        assert_eq!(
            f.registry.add_quote(f.admin, Uuid::nil()),
            Err(RegistryError::InvalidQuoteToken)
        );
    }

    #[test]
    fn test_owned_registry_gates_whitelist() {
        let ledger = Arc::new(InMemoryLedger::new());
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let asset = Uuid::new_v4();
        ledger.register_asset(asset, 6);
        let mut registry = PairRegistry::with_owner(ledger as Arc<dyn Ledger>, owner);

        assert_eq!(
            registry.add_quote(stranger, asset),
            Err(RegistryError::Unauthorized)
        );
        registry.add_quote(owner, asset).expect("owner may add");
        assert!(registry.is_quote_whitelisted(asset));
    }

    #[test]
    fn test_unknown_asset_precision_propagates() {
        let mut f = setup();
        let phantom = Uuid::new_v4();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        let result = f.registry.create(phantom, f.quote);
        assert_eq!(
            result,
            Err(RegistryError::Ledger(LedgerError::UnknownAsset(phantom)))
        );
    }

    #[test]
    fn test_enumeration_follows_creation_order() {
        let mut f = setup();
        let third_asset = Uuid::new_v4();
        f.ledger.register_asset(third_asset, 8);
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        let first = f.registry.create(f.base, f.quote).expect("create");
        let second = f.registry.create(third_asset, f.quote).expect("create");

        assert_eq!(f.registry.count(), 2);
        let by_index = match f.registry.by_index(0) {
            Some(handle) => handle,
            None => panic!("expected a pair at index 0"),
        };
        assert!(Arc::ptr_eq(&by_index, &first));
        assert_eq!(f.registry.all().len(), 2);
        assert!(Arc::ptr_eq(&f.registry.all()[1], &second));
        assert!(f.registry.by_index(2).is_none());
    }

    #[test]
    fn test_registry_events_published() {
        let mut f = setup();
        let subscription = f.registry.events().subscribe();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        f.registry.create(f.base, f.quote).expect("create");

        let events: Vec<EngineEvent> = subscription
            .drain()
            .into_iter()
            .map(|(event, _)| event)
            .collect();
        assert_eq!(
            events[0],
            EngineEvent::QuoteTokenAdded { asset: f.quote }
        );
        assert_eq!(
            events[1],
            EngineEvent::PairCreated {
                base: f.base,
                quote: f.quote
            }
        );
    }

    #[test]
    fn test_engine_reachable_through_handle() {
        let mut f = setup();
        f.registry.add_quote(f.admin, f.quote).expect("whitelist");
        let handle = f.registry.create(f.base, f.quote).expect("create");

        let trader = Uuid::new_v4();
        f.ledger.fund(trader, f.quote, 100 * D).expect("funding");
        let mut engine = handle.engine();
        engine
            .place(trader, &[2 * D], &[10 * D], Side::Bid)
            .expect("placement");
        assert_eq!(engine.liquidity(Side::Bid, 2 * D), 10 * D);
    }

    #[test]
    fn test_pair_key_is_symmetric() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
        assert_ne!(pair_key(a, b), pair_key(a, Uuid::new_v4()));
    }
}
