//! Token ledger boundary.
//!
//! The engine never holds balances itself; it instructs a ledger to move tokens out of the game's
//! custody account. Each call is assumed atomic on the ledger side.

use crate::{Amount, ClickpowError, Identity, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// External token ledger as seen by the engine.
pub trait TokenLedger {
    /// Move `amount` from game custody to `to`.
    fn transfer(&mut self, to: &Identity, amount: Amount) -> Result<()>;

    /// Permanently remove `amount` from game custody.
    fn burn(&mut self, amount: Amount) -> Result<()>;

    fn balance_of(&self, id: &Identity) -> Amount;
}

/// A single token movement requested by a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    Transfer { to: Identity, amount: Amount },
    Burn { amount: Amount },
}

impl Movement {
    pub fn amount(&self) -> Amount {
        match self {
            Movement::Transfer { amount, .. } | Movement::Burn { amount } => *amount,
        }
    }
}

/// Apply movements in order, skipping zero amounts.
pub fn apply_movements(ledger: &mut dyn TokenLedger, movements: &[Movement]) -> Result<()> {
    for m in movements {
        match *m {
            Movement::Transfer { amount: 0, .. } | Movement::Burn { amount: 0 } => {}
            Movement::Transfer { to, amount } => ledger.transfer(&to, amount)?,
            Movement::Burn { amount } => ledger.burn(amount)?,
        }
    }
    Ok(())
}

/// In-memory ledger with a single custody account.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InMemoryLedger {
    custody: Identity,
    balances: BTreeMap<Identity, Amount>,
    burned: Amount,
}

impl InMemoryLedger {
    pub fn new(custody: Identity) -> Self {
        Self {
            custody,
            balances: BTreeMap::new(),
            burned: 0,
        }
    }

    pub fn custody(&self) -> Identity {
        self.custody
    }

    /// Credit an account out of thin air (test funding / deposits).
    pub fn mint(&mut self, to: Identity, amount: Amount) -> Result<()> {
        let bal = self.balances.entry(to).or_insert(0);
        *bal = bal
            .checked_add(amount)
            .ok_or_else(|| ClickpowError::LedgerError("balance overflow".into()))?;
        Ok(())
    }

    pub fn total_burned(&self) -> Amount {
        self.burned
    }

    fn debit_custody(&mut self, amount: Amount) -> Result<()> {
        let available = self.balance_of(&self.custody);
        if available < amount {
            return Err(ClickpowError::LedgerError(format!(
                "custody balance {available} below {amount}"
            )));
        }
        self.balances.insert(self.custody, available - amount);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer(&mut self, to: &Identity, amount: Amount) -> Result<()> {
        if *to == self.custody {
            return Ok(());
        }
        let current = self.balance_of(to);
        let next = current
            .checked_add(amount)
            .ok_or_else(|| ClickpowError::LedgerError("balance overflow".into()))?;
        self.debit_custody(amount)?;
        self.balances.insert(*to, next);
        Ok(())
    }

    fn burn(&mut self, amount: Amount) -> Result<()> {
        let next_burned = self
            .burned
            .checked_add(amount)
            .ok_or_else(|| ClickpowError::LedgerError("burn total overflow".into()))?;
        self.debit_custody(amount)?;
        self.burned = next_burned;
        Ok(())
    }

    fn balance_of(&self, id: &Identity) -> Amount {
        self.balances.get(id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_out_of_custody() {
        let custody = Identity([0xCC; 20]);
        let alice = Identity([1; 20]);
        let mut ledger = InMemoryLedger::new(custody);
        ledger.mint(custody, 100).unwrap();

        ledger.transfer(&alice, 40).unwrap();
        ledger.burn(10).unwrap();

        assert_eq!(ledger.balance_of(&alice), 40);
        assert_eq!(ledger.balance_of(&custody), 50);
        assert_eq!(ledger.total_burned(), 10);
    }

    #[test]
    fn overdraft_is_rejected_without_side_effects() {
        let custody = Identity([0xCC; 20]);
        let alice = Identity([1; 20]);
        let mut ledger = InMemoryLedger::new(custody);
        ledger.mint(custody, 5).unwrap();

        assert!(matches!(
            ledger.transfer(&alice, 6),
            Err(ClickpowError::LedgerError(_))
        ));
        assert!(ledger.burn(6).is_err());
        assert_eq!(ledger.balance_of(&alice), 0);
        assert_eq!(ledger.balance_of(&custody), 5);
        assert_eq!(ledger.total_burned(), 0);
    }

    #[test]
    fn zero_movements_are_skipped() {
        let custody = Identity([0xCC; 20]);
        let mut ledger = InMemoryLedger::new(custody);
        apply_movements(
            &mut ledger,
            &[
                Movement::Transfer {
                    to: Identity([1; 20]),
                    amount: 0,
                },
                Movement::Burn { amount: 0 },
            ],
        )
        .unwrap();
        assert_eq!(ledger.total_burned(), 0);
    }
}
