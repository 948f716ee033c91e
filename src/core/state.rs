//! Account state derived from applied transactions

use crate::core::transaction::TransactionError;
use std::collections::HashMap;

/// Balances, stored records and message counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainState {
    balances: HashMap<String, u64>,
    records: HashMap<(String, String), String>,
    messages: u64,
}

impl ChainState {
    pub fn balance(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn record(&self, owner: &str, key: &str) -> Option<&str> {
        self.records
            .get(&(owner.to_string(), key.to_string()))
            .map(String::as_str)
    }

    pub fn message_count(&self) -> u64 {
        self.messages
    }

    /// Number of addresses holding a non-zero balance
    pub fn funded_accounts(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    pub(crate) fn credit(&mut self, address: &str, amount: u64) -> Result<(), TransactionError> {
        let balance = self.balance(address);
        let updated = balance
            .checked_add(amount)
            .ok_or_else(|| TransactionError::BalanceOverflow(address.to_string()))?;
        self.balances.insert(address.to_string(), updated);
        Ok(())
    }

    pub(crate) fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), TransactionError> {
        let balance = self.balance(from);
        if balance < amount {
            return Err(TransactionError::InsufficientFunds {
                address: from.to_string(),
                balance,
                needed: amount,
            });
        }

        if self.balance(to).checked_add(amount).is_none() {
            return Err(TransactionError::BalanceOverflow(to.to_string()));
        }

        self.balances.insert(from.to_string(), balance - amount);
        self.credit(to, amount)
    }

    pub(crate) fn record_message(&mut self) {
        self.messages += 1;
    }

    pub(crate) fn put_record(&mut self, owner: &str, key: &str, data: &str) {
        self.records
            .insert((owner.to_string(), key.to_string()), data.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_transfer() {
        let mut state = ChainState::default();
        state.credit("alice", 10).unwrap();
        state.transfer("alice", "bob", 4).unwrap();

        assert_eq!(state.balance("alice"), 6);
        assert_eq!(state.balance("bob"), 4);
        assert_eq!(state.funded_accounts(), 2);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut state = ChainState::default();
        state.credit("alice", u64::MAX).unwrap();
        assert!(state.credit("alice", 1).is_err());

        state.credit("bob", 1).unwrap();
        assert!(state.transfer("bob", "alice", 1).is_err());
        assert_eq!(state.balance("bob"), 1);
    }

    #[test]
    fn test_records_overwrite() {
        let mut state = ChainState::default();
        state.put_record("alice", "k", "v1");
        state.put_record("alice", "k", "v2");
        assert_eq!(state.record("alice", "k"), Some("v2"));
        assert_eq!(state.record("bob", "k"), None);
    }
}
