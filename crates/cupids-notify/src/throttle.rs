//! Notification Throttle
//!
//! At most one push per recipient per rolling window. The window state is
//! `lastNotificationSentAt` on the recipient's account document.
//!
//! Checking the window and recording the send are a single compare-and-set
//! ("claiming" the window), so two messages arriving together cannot both
//! notify. If the send then fails the claim is released, restoring the
//! previous timestamp, and the next message retries naturally.

use chrono::{DateTime, Duration, Utc};
use cupids_core::transaction::{self, MAX_ATTEMPTS};
use cupids_core::{Account, DocumentStore, Role, UserId, Write};

use crate::error::Result;

/// Window length in hours
pub const WINDOW_HOURS: i64 = 6;

/// Where a recipient stands relative to the window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Throttled { remaining: Duration },
}

/// A successfully claimed window; hand back to [`Throttle::release`] if
/// the send fails.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowClaim {
    /// Recipient as written by the claim
    pub recipient: Account,
    pub previous: Option<DateTime<Utc>>,
    pub claimed_at: DateTime<Utc>,
}

/// Result of trying to claim
#[derive(Clone, Debug, PartialEq)]
pub enum ClaimOutcome {
    Claimed(WindowClaim),
    Throttled { remaining: Duration },
    /// Notifications disabled or no token registered
    Unreachable,
    /// No such account
    Missing,
}

/// Rolling-window throttle
#[derive(Clone, Copy, Debug)]
pub struct Throttle {
    window: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::hours(WINDOW_HOURS))
    }
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Pure window check
    pub fn check(&self, last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Eligibility {
        match last_sent {
            None => Eligibility::Eligible,
            Some(last) => {
                let elapsed = now - last;
                if elapsed >= self.window {
                    Eligibility::Eligible
                } else {
                    Eligibility::Throttled {
                        remaining: self.window - elapsed,
                    }
                }
            }
        }
    }

    /// Atomically check the window and stamp it with `now`
    pub async fn claim(
        &self,
        store: &dyn DocumentStore,
        role: Role,
        id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let outcome = transaction::run(MAX_ATTEMPTS, || async move {
            let Some(current) = store.account(role, id).await? else {
                return Ok(ClaimOutcome::Missing);
            };
            if current.doc.push().deliverable_token().is_none() {
                return Ok(ClaimOutcome::Unreachable);
            }

            let previous = current.doc.push().last_notification_sent_at;
            if let Eligibility::Throttled { remaining } = self.check(previous, now) {
                return Ok(ClaimOutcome::Throttled { remaining });
            }

            let mut recipient = current.doc;
            recipient.push_mut().last_notification_sent_at = Some(now);
            store
                .commit(vec![Write::account(recipient.clone(), current.version)])
                .await?;

            Ok(ClaimOutcome::Claimed(WindowClaim {
                recipient,
                previous,
                claimed_at: now,
            }))
        })
        .await?;

        Ok(outcome)
    }

    /// Undo a claim after a failed send.
    ///
    /// Only restores if the timestamp is still the one this claim wrote.
    /// Returns whether anything was restored.
    pub async fn release(&self, store: &dyn DocumentStore, claim: &WindowClaim) -> Result<bool> {
        let role = claim.recipient.role();
        let id = claim.recipient.id();

        let restored = transaction::run(MAX_ATTEMPTS, || async move {
            let Some(current) = store.account(role, id).await? else {
                return Ok(false);
            };
            if current.doc.push().last_notification_sent_at != Some(claim.claimed_at) {
                return Ok(false);
            }

            let mut recipient = current.doc;
            recipient.push_mut().last_notification_sent_at = claim.previous;
            store
                .commit(vec![Write::account(recipient, current.version)])
                .await?;
            Ok(true)
        })
        .await?;

        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cupids_core::test_support::YieldingStore;
    use cupids_core::{FortuneTeller, MemoryStore, PushRegistration, Seed};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn store_with(last_sent: Option<DateTime<Utc>>, enabled: bool) -> MemoryStore {
        let mut teller = FortuneTeller::new("F1");
        teller.push = PushRegistration {
            fcm_token: Some("tok".into()),
            notifications_enabled: enabled,
            last_notification_sent_at: last_sent,
            ..Default::default()
        };
        MemoryStore::from_seed(Seed {
            fortune_tellers: vec![teller],
            ..Default::default()
        })
    }

    async fn last_sent(store: &MemoryStore) -> Option<DateTime<Utc>> {
        store
            .fortune_teller(&"F1".into())
            .await
            .unwrap()
            .unwrap()
            .doc
            .push
            .last_notification_sent_at
    }

    #[test]
    fn test_window_boundaries() {
        let throttle = Throttle::default();
        assert_eq!(throttle.check(None, now()), Eligibility::Eligible);
        assert_eq!(
            throttle.check(Some(now() - Duration::hours(5)), now()),
            Eligibility::Throttled {
                remaining: Duration::hours(1)
            }
        );
        assert_eq!(throttle.check(Some(now() - Duration::hours(6)), now()), Eligibility::Eligible);
        assert_eq!(throttle.check(Some(now() - Duration::hours(7)), now()), Eligibility::Eligible);
    }

    #[tokio::test]
    async fn test_claim_stamps_window() {
        let store = store_with(Some(now() - Duration::hours(7)), true);
        let outcome = Throttle::default()
            .claim(&store, Role::FortuneTeller, &"F1".into(), now())
            .await
            .unwrap();

        let ClaimOutcome::Claimed(claim) = outcome else {
            panic!("expected claim, got {outcome:?}");
        };
        assert_eq!(claim.previous, Some(now() - Duration::hours(7)));
        assert_eq!(last_sent(&store).await, Some(now()));
    }

    #[tokio::test]
    async fn test_throttled_claim_changes_nothing() {
        let five_hours_ago = now() - Duration::hours(5);
        let store = store_with(Some(five_hours_ago), true);
        let outcome = Throttle::default()
            .claim(&store, Role::FortuneTeller, &"F1".into(), now())
            .await
            .unwrap();

        assert!(matches!(outcome, ClaimOutcome::Throttled { .. }));
        assert_eq!(last_sent(&store).await, Some(five_hours_ago));
    }

    #[tokio::test]
    async fn test_second_claim_in_window_is_throttled() {
        let store = YieldingStore::new(store_with(None, true));
        let throttle = Throttle::default();
        let id: UserId = "F1".into();

        let (a, b) = tokio::join!(
            throttle.claim(&store, Role::FortuneTeller, &id, now()),
            throttle.claim(&store, Role::FortuneTeller, &id, now() + Duration::seconds(1)),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let claimed = outcomes
            .iter()
            .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
            .count();

        assert_eq!(claimed, 1);
        assert!(outcomes.iter().any(|o| matches!(o, ClaimOutcome::Throttled { .. })));
        assert!(store.conflicts() >= 1);
    }

    #[tokio::test]
    async fn test_release_racing_a_new_claim_keeps_the_new_claim() {
        let store = YieldingStore::new(store_with(None, true));
        let throttle = Throttle::default();
        let id: UserId = "F1".into();

        let ClaimOutcome::Claimed(stale) = throttle
            .claim(&store, Role::FortuneTeller, &id, now())
            .await
            .unwrap()
        else {
            panic!("expected claim");
        };

        let later = now() + Duration::hours(7);
        let (claimed, _) = tokio::join!(
            throttle.claim(&store, Role::FortuneTeller, &id, later),
            throttle.release(&store, &stale),
        );

        assert!(matches!(claimed.unwrap(), ClaimOutcome::Claimed(_)));
        assert!(store.conflicts() >= 1);
        assert_eq!(last_sent(store.inner()).await, Some(later));
    }

    #[tokio::test]
    async fn test_release_restores_previous() {
        let store = store_with(None, true);
        let throttle = Throttle::default();
        let ClaimOutcome::Claimed(claim) = throttle
            .claim(&store, Role::FortuneTeller, &"F1".into(), now())
            .await
            .unwrap()
        else {
            panic!("expected claim");
        };

        assert!(throttle.release(&store, &claim).await.unwrap());
        assert_eq!(last_sent(&store).await, None);
        // Second release is a no-op
        assert!(!throttle.release(&store, &claim).await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_or_missing_recipient() {
        let store = store_with(None, false);
        let throttle = Throttle::default();
        assert_eq!(
            throttle
                .claim(&store, Role::FortuneTeller, &"F1".into(), now())
                .await
                .unwrap(),
            ClaimOutcome::Unreachable
        );
        assert_eq!(
            throttle
                .claim(&store, Role::FortuneTeller, &"nobody".into(), now())
                .await
                .unwrap(),
            ClaimOutcome::Missing
        );
        assert_eq!(last_sent(&store).await, None);
    }
}
