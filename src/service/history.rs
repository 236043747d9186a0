//! Submitted transaction history sink

use crate::types::AccountId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One successfully submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTransactionRecord {
    pub chain_id: String,
    pub tx_hash: String,
    /// Account that signed
    pub sender: AccountId,
    /// Account the transaction acts for, when signed by a proxy
    pub on_behalf_of: Option<AccountId>,
    pub nonce: u64,
    /// Hex encoding of the submitted bytes
    pub encoded: String,
    pub submitted_at: DateTime<Utc>,
}

/// Receives every transaction the node accepted
pub trait TransactionHistoryStore: Send + Sync {
    fn persist(&self, record: SubmittedTransactionRecord);
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<Vec<SubmittedTransactionRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SubmittedTransactionRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl TransactionHistoryStore for InMemoryHistoryStore {
    fn persist(&self, record: SubmittedTransactionRecord) {
        self.records.write().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store_keeps_order() {
        let store = InMemoryHistoryStore::new();
        for nonce in 0..3u64 {
            store.persist(SubmittedTransactionRecord {
                chain_id: "local".to_string(),
                tx_hash: format!("0x{:02x}", nonce),
                sender: AccountId::new(vec![1; 32]),
                on_behalf_of: None,
                nonce,
                encoded: "0x00".to_string(),
                submitted_at: Utc::now(),
            });
        }

        let nonces: Vec<u64> = store.records().iter().map(|r| r.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert_eq!(store.len(), 3);
    }
}
