//! Point Ledger
//!
//! All balance mutations go through here. Each credit is one optimistic
//! transaction over the client document (plus the purchase insert for paid
//! credits), so concurrent credits to the same user never lose an update and
//! a payment id is credited at most once.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::SharedClock;
use crate::error::{Result, StoreError};
use crate::model::{PaymentId, Purchase, UserId};
use crate::store::{DocumentStore, Precondition, Write};
use crate::transaction::{self, MAX_ATTEMPTS};

/// A confirmed payment to be credited
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseCredit {
    pub user_id: UserId,
    pub points: u64,
    /// Charged amount as reported by the provider
    pub amount: i64,
    pub payment_id: PaymentId,
}

/// What a purchase credit did
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreditOutcome {
    /// Balance updated and purchase recorded
    Credited { purchase: Purchase, new_balance: u64 },
    /// The payment was already reconciled; nothing changed
    AlreadyCredited { purchase: Purchase },
}

/// Transactional balance operations
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    clock: SharedClock,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Credit a completed payment exactly once
    ///
    /// Fails with [`StoreError::UserNotFound`] if the account is missing.
    pub async fn credit_purchase(&self, credit: &PurchaseCredit) -> Result<CreditOutcome> {
        let store = &self.store;
        let clock = &self.clock;

        let outcome = transaction::run(MAX_ATTEMPTS, || async move {
            if let Some(purchase) = store.purchase_by_payment(&credit.payment_id).await? {
                return Ok(CreditOutcome::AlreadyCredited { purchase });
            }

            let Some(current) = store.client(&credit.user_id).await? else {
                return Err(StoreError::UserNotFound(credit.user_id.to_string()));
            };

            let now = clock.utc();
            let mut account = current.doc;
            account.points = account
                .points
                .checked_add(credit.points)
                .ok_or_else(|| StoreError::BalanceOverflow(credit.user_id.to_string()))?;
            account.last_purchase_at = Some(now);
            let new_balance = account.points;

            let purchase = Purchase::completed(
                credit.user_id.clone(),
                credit.amount,
                credit.points,
                credit.payment_id.clone(),
                now,
            );

            store
                .commit(vec![
                    Write::Client {
                        doc: account,
                        precondition: Precondition::Version(current.version),
                    },
                    Write::CreatePurchase(purchase.clone()),
                ])
                .await?;

            Ok(CreditOutcome::Credited {
                purchase,
                new_balance,
            })
        })
        .await?;

        match &outcome {
            CreditOutcome::Credited {
                purchase,
                new_balance,
            } => tracing::info!(
                user_id = %purchase.user_id,
                payment_id = %purchase.payment_id,
                points = purchase.points,
                new_balance,
                "Credited purchase"
            ),
            CreditOutcome::AlreadyCredited { purchase } => tracing::info!(
                user_id = %purchase.user_id,
                payment_id = %purchase.payment_id,
                "Payment already credited, ignoring redelivery"
            ),
        }

        Ok(outcome)
    }

    /// Credit points without a payment (support tool). Returns the new balance.
    pub async fn credit_manual(&self, user_id: &UserId, points: u64) -> Result<u64> {
        let store = &self.store;
        let clock = &self.clock;

        let new_balance = transaction::run(MAX_ATTEMPTS, || async move {
            let Some(current) = store.client(user_id).await? else {
                return Err(StoreError::UserNotFound(user_id.to_string()));
            };

            let mut account = current.doc;
            account.points = account
                .points
                .checked_add(points)
                .ok_or_else(|| StoreError::BalanceOverflow(user_id.to_string()))?;
            account.last_manual_add_at = Some(clock.utc());
            let new_balance = account.points;

            store
                .commit(vec![Write::Client {
                    doc: account,
                    precondition: Precondition::Version(current.version),
                }])
                .await?;

            Ok(new_balance)
        })
        .await?;

        tracing::info!(user_id = %user_id, points, new_balance, "Manually credited points");
        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ClientAccount;
    use crate::store::{MemoryStore, Seed, Versioned};
    use crate::test_support::YieldingStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seeded(balance: u64) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::from_seed(Seed {
            clients: vec![ClientAccount::new("U1", balance)],
            ..Default::default()
        }))
    }

    fn ledger(store: Arc<dyn DocumentStore>) -> Ledger {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        Ledger::new(store, Arc::new(ManualClock::at(now)))
    }

    fn credit(payment: &str, points: u64) -> PurchaseCredit {
        PurchaseCredit {
            user_id: "U1".into(),
            points,
            amount: 5000,
            payment_id: payment.into(),
        }
    }

    #[tokio::test]
    async fn test_credit_purchase_example() {
        let store = seeded(100);
        let ledger = ledger(store.clone());

        let outcome = ledger.credit_purchase(&credit("P1", 50)).await.unwrap();
        let CreditOutcome::Credited { purchase, new_balance } = outcome else {
            panic!("expected a fresh credit");
        };
        assert_eq!(new_balance, 150);
        assert_eq!(purchase.user_id.as_str(), "U1");
        assert_eq!(purchase.points, 50);
        assert_eq!(purchase.payment_id.as_str(), "P1");
        assert_eq!(purchase.status, crate::model::PurchaseStatus::Completed);

        let account = store.client(&"U1".into()).await.unwrap().unwrap().doc;
        assert_eq!(account.points, 150);
        assert!(account.last_purchase_at.is_some());
    }

    #[tokio::test]
    async fn test_redelivery_credits_once() {
        let store = seeded(100);
        let ledger = ledger(store.clone());

        ledger.credit_purchase(&credit("P1", 50)).await.unwrap();
        let second = ledger.credit_purchase(&credit("P1", 50)).await.unwrap();

        assert!(matches!(second, CreditOutcome::AlreadyCredited { .. }));
        assert_eq!(store.client(&"U1".into()).await.unwrap().unwrap().doc.points, 150);
        assert_eq!(store.purchases_for_user(&"U1".into()).await.unwrap().len(), 1);
    }

    fn racing(balance: u64) -> Arc<YieldingStore<MemoryStore>> {
        Arc::new(YieldingStore::new(MemoryStore::from_seed(Seed {
            clients: vec![ClientAccount::new("U1", balance)],
            ..Default::default()
        })))
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_credits_once() {
        let store = racing(100);
        let ledger = ledger(store.clone());
        let c = credit("P1", 50);

        let (a, b) = tokio::join!(ledger.credit_purchase(&c), ledger.credit_purchase(&c));
        let outcomes = [a.unwrap(), b.unwrap()];

        assert!(store.conflicts() >= 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, CreditOutcome::Credited { .. }))
                .count(),
            1
        );
        assert_eq!(store.client(&"U1".into()).await.unwrap().unwrap().doc.points, 150);
        assert_eq!(store.purchases_for_user(&"U1".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_user_aborts() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store.clone());

        let err = ledger.credit_purchase(&credit("P1", 50)).await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
        assert!(store.purchase_by_payment(&"P1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manual_credit() {
        let store = seeded(10);
        let ledger = ledger(store.clone());

        assert_eq!(ledger.credit_manual(&"U1".into(), 5).await.unwrap(), 15);
        let account = store.client(&"U1".into()).await.unwrap().unwrap().doc;
        assert!(account.last_manual_add_at.is_some());
        assert!(account.last_purchase_at.is_none());

        let err = ledger.credit_manual(&"nobody".into(), 5).await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_manual_credits_do_not_lose_updates() {
        let store = racing(0);
        let ledger = ledger(store.clone());
        let user: UserId = "U1".into();

        let (a, b, c) = tokio::join!(
            ledger.credit_manual(&user, 1),
            ledger.credit_manual(&user, 2),
            ledger.credit_manual(&user, 4),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert!(store.conflicts() >= 1);
        assert_eq!(store.client(&user).await.unwrap().unwrap().doc.points, 7);
    }

    /// Lets another writer sneak in before the first commit
    struct InterleavingStore {
        inner: MemoryStore,
        commits: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for InterleavingStore {
        async fn client(&self, id: &UserId) -> Result<Option<Versioned<ClientAccount>>> {
            self.inner.client(id).await
        }

        async fn fortune_teller(
            &self,
            id: &UserId,
        ) -> Result<Option<Versioned<crate::model::FortuneTeller>>> {
            self.inner.fortune_teller(id).await
        }

        async fn conversation(
            &self,
            id: &crate::model::ConversationId,
        ) -> Result<Option<crate::model::Conversation>> {
            self.inner.conversation(id).await
        }

        async fn purchase_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Purchase>> {
            self.inner.purchase_by_payment(payment_id).await
        }

        async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>> {
            self.inner.purchases_for_user(user_id).await
        }

        async fn commit(&self, writes: Vec<Write>) -> Result<()> {
            if self.commits.fetch_add(1, Ordering::SeqCst) == 0 {
                let current = self.inner.client(&"U1".into()).await?.unwrap();
                let mut doc = current.doc;
                doc.points += 1000;
                self.inner
                    .commit(vec![Write::Client {
                        doc,
                        precondition: Precondition::Version(current.version),
                    }])
                    .await?;
            }
            self.inner.commit(writes).await
        }
    }

    #[tokio::test]
    async fn test_conflict_rereads_balance() {
        let store = Arc::new(InterleavingStore {
            inner: MemoryStore::from_seed(Seed {
                clients: vec![ClientAccount::new("U1", 100)],
                ..Default::default()
            }),
            commits: AtomicUsize::new(0),
        });
        let ledger = ledger(store.clone());

        let outcome = ledger.credit_purchase(&credit("P1", 50)).await.unwrap();
        assert!(matches!(outcome, CreditOutcome::Credited { new_balance: 1150, .. }));
    }
}
