//! Transactions carried by blocks
//!
//! Each kind carries its own payload and knows how to apply itself to a
//! [`ChainState`], returning a human-readable description of the effect.

use crate::core::state::ChainState;
use crate::crypto::{sha256, sha256_hex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum size of a message body or record payload in bytes
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024;

/// Transaction-related errors
#[derive(Error, Debug, PartialEq)]
pub enum TransactionError {
    #[error("Missing field: {0}")]
    EmptyField(&'static str),
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Sender and recipient are the same: {0}")]
    SelfTransfer(String),
    #[error("Payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),
    #[error("Insufficient funds for {address}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        address: String,
        balance: u64,
        needed: u64,
    },
    #[error("Balance overflow for {0}")]
    BalanceOverflow(String),
}

/// A transaction waiting for, or included in, a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transaction {
    /// Move funds between two addresses
    Transfer {
        from: String,
        to: String,
        amount: u64,
    },
    /// Free-form message
    Message { sender: String, content: String },
    /// Block reward paid to the miner
    Reward { recipient: String, amount: u64 },
    /// Keyed data stored on chain, overwriting earlier values
    Record {
        owner: String,
        key: String,
        data: String,
    },
}

impl Transaction {
    pub fn transfer(from: &str, to: &str, amount: u64) -> Self {
        Transaction::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }

    pub fn message(sender: &str, content: &str) -> Self {
        Transaction::Message {
            sender: sender.to_string(),
            content: content.to_string(),
        }
    }

    pub fn reward(recipient: &str, amount: u64) -> Self {
        Transaction::Reward {
            recipient: recipient.to_string(),
            amount,
        }
    }

    pub fn record(owner: &str, key: &str, data: &str) -> Self {
        Transaction::Record {
            owner: owner.to_string(),
            key: key.to_string(),
            data: data.to_string(),
        }
    }

    /// Short kind label
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Transfer { .. } => "transfer",
            Transaction::Message { .. } => "message",
            Transaction::Reward { .. } => "reward",
            Transaction::Record { .. } => "record",
        }
    }

    /// Canonical bytes: the JSON encoding, whose field order is fixed by
    /// the type definition.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Digest used for the block's merkle root
    pub fn hash(&self) -> Vec<u8> {
        sha256(&self.canonical_bytes())
    }

    /// Hex transaction identifier
    pub fn id(&self) -> String {
        sha256_hex(&self.canonical_bytes())
    }

    /// Structural checks that need no chain state
    pub fn validate(&self) -> Result<(), TransactionError> {
        match self {
            Transaction::Transfer { from, to, amount } => {
                require("from", from)?;
                require("to", to)?;
                if *amount == 0 {
                    return Err(TransactionError::ZeroAmount);
                }
                if from == to {
                    return Err(TransactionError::SelfTransfer(from.clone()));
                }
            }
            Transaction::Message { sender, content } => {
                require("sender", sender)?;
                require("content", content)?;
                limit(content)?;
            }
            Transaction::Reward { recipient, amount } => {
                require("recipient", recipient)?;
                if *amount == 0 {
                    return Err(TransactionError::ZeroAmount);
                }
            }
            Transaction::Record { owner, key, data } => {
                require("owner", owner)?;
                require("key", key)?;
                limit(data)?;
            }
        }
        Ok(())
    }

    /// Apply the transaction to `state` and describe what happened.
    ///
    /// On error `state` is left untouched.
    pub fn apply(&self, state: &mut ChainState) -> Result<String, TransactionError> {
        match self {
            Transaction::Transfer { from, to, amount } => {
                state.transfer(from, to, *amount)?;
                Ok(format!("{from} sent {amount} to {to}"))
            }
            Transaction::Message { sender, content } => {
                state.record_message();
                Ok(format!("{sender} says: {content}"))
            }
            Transaction::Reward { recipient, amount } => {
                state.credit(recipient, *amount)?;
                Ok(format!("{recipient} rewarded {amount}"))
            }
            Transaction::Record { owner, key, data } => {
                state.put_record(owner, key, data);
                Ok(format!("{owner} stored {} bytes under '{key}'", data.len()))
            }
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), TransactionError> {
    if value.trim().is_empty() {
        Err(TransactionError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn limit(payload: &str) -> Result<(), TransactionError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        Err(TransactionError::PayloadTooLarge(payload.len(), MAX_PAYLOAD_SIZE))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_is_tagged_by_kind() {
        let tx = Transaction::message("alice", "hello");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["sender"], "alice");
    }

    #[test]
    fn test_id_is_stable() {
        let a = Transaction::transfer("alice", "bob", 5);
        let b = Transaction::transfer("alice", "bob", 5);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), Transaction::transfer("alice", "bob", 6).id());
    }

    #[test]
    fn test_validation() {
        assert!(Transaction::transfer("alice", "bob", 1).validate().is_ok());
        assert_eq!(
            Transaction::transfer("alice", "bob", 0).validate(),
            Err(TransactionError::ZeroAmount)
        );
        assert!(matches!(
            Transaction::transfer("alice", "alice", 1).validate(),
            Err(TransactionError::SelfTransfer(_))
        ));
        assert_eq!(
            Transaction::message("", "hi").validate(),
            Err(TransactionError::EmptyField("sender"))
        );
        let huge = "x".repeat(MAX_PAYLOAD_SIZE + 1);
        assert!(Transaction::record("alice", "k", &huge).validate().is_err());
    }

    #[test]
    fn test_apply_and_describe() {
        let mut state = ChainState::default();

        let text = Transaction::reward("miner", 50).apply(&mut state).unwrap();
        assert_eq!(text, "miner rewarded 50");

        let text = Transaction::transfer("miner", "bob", 20)
            .apply(&mut state)
            .unwrap();
        assert_eq!(text, "miner sent 20 to bob");
        assert_eq!(state.balance("miner"), 30);
        assert_eq!(state.balance("bob"), 20);

        Transaction::message("bob", "thanks").apply(&mut state).unwrap();
        Transaction::record("bob", "greeting", "hi").apply(&mut state).unwrap();
        assert_eq!(state.message_count(), 1);
        assert_eq!(state.record("bob", "greeting"), Some("hi"));
    }

    #[test]
    fn test_failed_transfer_leaves_state_alone() {
        let mut state = ChainState::default();
        Transaction::reward("alice", 5).apply(&mut state).unwrap();

        let err = Transaction::transfer("alice", "bob", 10)
            .apply(&mut state)
            .unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientFunds { .. }));
        assert_eq!(state.balance("alice"), 5);
        assert_eq!(state.balance("bob"), 0);
    }
}
