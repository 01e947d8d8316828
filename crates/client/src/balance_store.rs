//! Last-known on-chain balance of the client's account.

use paychan_types::Amount;
use tokio::sync::Mutex;

/// Mutex-guarded balance. Readers always get a copy.
#[derive(Debug, Default)]
pub struct BalanceStore {
    balance: Mutex<Amount>,
}

impl BalanceStore {
    pub fn new(initial: Amount) -> Self {
        Self {
            balance: Mutex::new(initial),
        }
    }

    pub async fn get(&self) -> Amount {
        *self.balance.lock().await
    }

    /// Replace the stored balance, returning the previous value.
    pub async fn set(&self, value: Amount) -> Amount {
        let mut balance = self.balance.lock().await;
        std::mem::replace(&mut *balance, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_returns_previous() {
        let store = BalanceStore::default();
        assert_eq!(store.get().await, Amount::ZERO);
        assert_eq!(store.set(Amount(5)).await, Amount::ZERO);
        assert_eq!(store.get().await, Amount(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_see_whole_values() {
        let store = Arc::new(BalanceStore::new(Amount(1)));
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..200u128 {
                    store.set(Amount(if i % 2 == 0 { u128::MAX } else { 1 })).await;
                }
            })
        };

        for _ in 0..200 {
            let seen = store.get().await;
            assert!(seen == Amount(1) || seen == Amount(u128::MAX));
        }
        writer.await.unwrap();
    }
}
