//! Store wrappers for exercising concurrent transactions in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::model::{
    ClientAccount, Conversation, ConversationId, FortuneTeller, PaymentId, Purchase, UserId,
};
use crate::store::{DocumentStore, Versioned, Write};

/// Yields to the runtime after every read and before every commit.
///
/// `MemoryStore` never suspends, so futures joined over it run one after
/// another. Wrapping it lets joined transactions read the same version and
/// race to commit. Rejected commits are counted.
pub struct YieldingStore<S> {
    inner: S,
    conflicts: AtomicUsize,
}

impl<S: DocumentStore> YieldingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Commits rejected because another writer got there first
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for YieldingStore<S> {
    async fn client(&self, id: &UserId) -> Result<Option<Versioned<ClientAccount>>> {
        let result = self.inner.client(id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn fortune_teller(&self, id: &UserId) -> Result<Option<Versioned<FortuneTeller>>> {
        let result = self.inner.fortune_teller(id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let result = self.inner.conversation(id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn purchase_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Purchase>> {
        let result = self.inner.purchase_by_payment(payment_id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>> {
        let result = self.inner.purchases_for_user(user_id).await;
        tokio::task::yield_now().await;
        result
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        tokio::task::yield_now().await;
        let result = self.inner.commit(writes).await;
        if matches!(&result, Err(e) if e.is_conflict()) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Precondition, Seed};

    #[tokio::test]
    async fn test_joined_writers_collide() {
        let store = YieldingStore::new(MemoryStore::from_seed(Seed {
            clients: vec![ClientAccount::new("U1", 0)],
            ..Default::default()
        }));

        let store = &store;
        let write = move |points| async move {
            let current = store.client(&"U1".into()).await?.unwrap();
            store
                .commit(vec![Write::Client {
                    doc: ClientAccount::new("U1", points),
                    precondition: Precondition::Version(current.version),
                }])
                .await
        };
        let (a, b) = tokio::join!(write(1), write(2));

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.conflicts(), 1);
    }
}
