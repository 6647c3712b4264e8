//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module defines the asset-transfer boundary of the engine. The engine never holds balances
// itself; it moves units between trader accounts and its own custody through the Ledger trait.
// An in-memory implementation backs the test-suites and serves as the reference semantics.
//
// | Component       | Description                                                            |
// |-----------------|------------------------------------------------------------------------|
// | Ledger          | Trait: debit into custody, credit out of custody, asset precision.     |
// | LedgerError     | Failures surfaced by ledger implementations.                           |
// | InMemoryLedger  | Counter-based implementation for tests and demos.                      |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use crate::types::{AccountId, AssetId};

/// Errors surfaced by ledger implementations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    /// The asset is not known to the ledger.
    #[error("asset {0} is not known to the ledger")]
    UnknownAsset(AssetId),

    /// The account does not hold enough units to cover a debit.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Units requested by the debit.
        requested: u128,
        /// Units actually held by the account.
        available: u128,
    },

    /// Engine custody does not hold enough units to cover a credit.
    #[error("insufficient custody: requested {requested}, available {available}")]
    InsufficientCustody {
        /// Units requested by the credit.
        requested: u128,
        /// Units actually held in custody.
        available: u128,
    },

    /// A balance counter would overflow its 128-bit range.
    #[error("balance counter overflow")]
    BalanceOverflow,
}

/// The asset-transfer medium the engine runs against.
///
/// Units are unsigned integers in the asset's smallest denomination. `debit` moves units from an
/// account into engine custody and may fail on insufficient balance; `credit` moves units from
/// custody back to an account and is infallible under well-formed inputs (the engine never credits
/// more than it previously debited).
///
/// Implementations may block (a remote or transactional store is fine) but are called inside the
/// engine's critical section, so they must not call back into the engine.
pub trait Ledger: Send + Sync {
    /// Moves `units` of `asset` from `account` into engine custody.
    fn debit(&self, account: AccountId, asset: AssetId, units: u128) -> Result<(), LedgerError>;

    /// Moves `units` of `asset` from engine custody to `account`.
    fn credit(&self, account: AccountId, asset: AssetId, units: u128) -> Result<(), LedgerError>;

    /// Returns the number of fractional digits of the asset's smallest unit.
    fn decimals(&self, asset: AssetId) -> Result<u8, LedgerError>;
}

/// Mutable counters guarded by the ledger's mutex.
#[derive(Debug, Default)]
struct LedgerState {
    /// Registered assets and their decimal precision.
    assets: HashMap<AssetId, u8>,
    /// Free balances per (account, asset).
    balances: HashMap<(AccountId, AssetId), u128>,
    /// Units held in engine custody per asset.
    custody: HashMap<AssetId, u128>,
}

/// A counter-based ledger holding balances and custody in memory.
///
/// The reference implementation: exact integer semantics, no fees, no settlement delay. Tests use
/// it to assert conservation of value around matching, and demos use it as a stand-in for a real
/// transfer medium.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Creates an empty ledger with no registered assets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset and its decimal precision. Re-registering overwrites the precision.
    pub fn register_asset(&self, asset: AssetId, decimals: u8) {
        self.inner.lock().assets.insert(asset, decimals);
    }

    /// Adds `units` of `asset` to an account's free balance.
    ///
    /// # Errors
    /// * `UnknownAsset` - the asset has not been registered.
    /// * `BalanceOverflow` - the account balance would exceed the 128-bit range.
    pub fn fund(
        &self,
        account: AccountId,
        asset: AssetId,
        units: u128,
    ) -> Result<(), LedgerError> {
        let mut state = self.inner.lock();
        if !state.assets.contains_key(&asset) {
            return Err(LedgerError::UnknownAsset(asset));
        }
        let balance = state.balances.entry((account, asset)).or_insert(0);
        *balance = balance
            .checked_add(units)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }

    /// Returns the free balance of an account for an asset.
    pub fn balance_of(&self, account: AccountId, asset: AssetId) -> u128 {
        self.inner
            .lock()
            .balances
            .get(&(account, asset))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the units held in engine custody for an asset.
    pub fn custody_of(&self, asset: AssetId) -> u128 {
        self.inner.lock().custody.get(&asset).copied().unwrap_or(0)
    }
}

impl Ledger for InMemoryLedger {
    fn debit(&self, account: AccountId, asset: AssetId, units: u128) -> Result<(), LedgerError> {
        let mut state = self.inner.lock();
        if !state.assets.contains_key(&asset) {
            return Err(LedgerError::UnknownAsset(asset));
        }
        let available = state.balances.get(&(account, asset)).copied().unwrap_or(0);
        if available < units {
            return Err(LedgerError::InsufficientBalance {
                requested: units,
                available,
            });
        }
        let held = state.custody.get(&asset).copied().unwrap_or(0);
        let held = held
            .checked_add(units)
            .ok_or(LedgerError::BalanceOverflow)?;
        state.balances.insert((account, asset), available - units);
        state.custody.insert(asset, held);
        Ok(())
    }

    fn credit(&self, account: AccountId, asset: AssetId, units: u128) -> Result<(), LedgerError> {
        let mut state = self.inner.lock();
        if !state.assets.contains_key(&asset) {
            return Err(LedgerError::UnknownAsset(asset));
        }
        let held = state.custody.get(&asset).copied().unwrap_or(0);
        if held < units {
            return Err(LedgerError::InsufficientCustody {
                requested: units,
                available: held,
            });
        }
        let balance = state.balances.get(&(account, asset)).copied().unwrap_or(0);
        let balance = balance
            .checked_add(units)
            .ok_or(LedgerError::BalanceOverflow)?;
        state.custody.insert(asset, held - units);
        state.balances.insert((account, asset), balance);
        Ok(())
    }

    fn decimals(&self, asset: AssetId) -> Result<u8, LedgerError> {
        self.inner
            .lock()
            .assets
            .get(&asset)
            .copied()
            .ok_or(LedgerError::UnknownAsset(asset))
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn setup() -> (InMemoryLedger, AccountId, AssetId) {
        let ledger = InMemoryLedger::new();
        let account = Uuid::new_v4();
        let asset = Uuid::new_v4();
        ledger.register_asset(asset, 18);
        (ledger, account, asset)
    }

    #[test]
    fn test_fund_and_balance() {
        let (ledger, account, asset) = setup();
        assert_eq!(ledger.balance_of(account, asset), 0);
        ledger.fund(account, asset, 1_000).unwrap();
        assert_eq!(ledger.balance_of(account, asset), 1_000);
    }

    #[test]
    fn test_debit_moves_into_custody() {
        let (ledger, account, asset) = setup();
        ledger.fund(account, asset, 1_000).unwrap();
        ledger.debit(account, asset, 400).unwrap();
        assert_eq!(ledger.balance_of(account, asset), 600);
        assert_eq!(ledger.custody_of(asset), 400);
    }

    #[test]
    fn test_credit_releases_custody() {
        let (ledger, account, asset) = setup();
        let counterparty = Uuid::new_v4();
        ledger.fund(account, asset, 1_000).unwrap();
        ledger.debit(account, asset, 400).unwrap();
        ledger.credit(counterparty, asset, 150).unwrap();
        assert_eq!(ledger.balance_of(counterparty, asset), 150);
        assert_eq!(ledger.custody_of(asset), 250);
    }

    #[test]
    fn test_debit_insufficient_balance() {
        let (ledger, account, asset) = setup();
        ledger.fund(account, asset, 10).unwrap();
        let result = ledger.debit(account, asset, 11);
        assert_eq!(
            result,
            Err(LedgerError::InsufficientBalance {
                requested: 11,
                available: 10
            })
        );
        // Nothing moved.
        assert_eq!(ledger.balance_of(account, asset), 10);
        assert_eq!(ledger.custody_of(asset), 0);
    }

    #[test]
    fn test_credit_insufficient_custody() {
        let (ledger, account, asset) = setup();
        let result = ledger.credit(account, asset, 1);
        assert_eq!(
            result,
            Err(LedgerError::InsufficientCustody {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_unknown_asset_rejected() {
        let (ledger, account, _asset) = setup();
        let stranger = Uuid::new_v4();
        assert_eq!(
            ledger.debit(account, stranger, 1),
            Err(LedgerError::UnknownAsset(stranger))
        );
        assert_eq!(
            ledger.decimals(stranger),
            Err(LedgerError::UnknownAsset(stranger))
        );
    }

    #[test]
    fn test_decimals() {
        let (ledger, _account, asset) = setup();
        assert_eq!(ledger.decimals(asset), Ok(18));
    }
}
