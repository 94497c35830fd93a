//! Document Store
//!
//! Storage trait for the collections this backend touches, plus an
//! in-memory implementation for development and tests.
//!
//! Every account document carries a version. Reads hand the version back
//! and [`DocumentStore::commit`] applies a batch of writes atomically, only
//! if every precondition still holds. That is the whole concurrency model:
//! callers build read-modify-write transactions on top of it (see
//! [`crate::transaction`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::model::{
    ClientAccount, Conversation, ConversationId, FortuneTeller, PaymentId, Purchase, PurchaseId,
    PushRegistration, Role, UserId,
};

/// A document together with the version it was read at
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub doc: T,
    pub version: u64,
}

/// Condition a write must satisfy at commit time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional upsert
    Any,
    /// Document must exist at exactly this version
    Version(u64),
    /// Document must not exist yet
    Missing,
}

/// A single write inside a commit
#[derive(Clone, Debug)]
pub enum Write {
    Client {
        doc: ClientAccount,
        precondition: Precondition,
    },
    FortuneTeller {
        doc: FortuneTeller,
        precondition: Precondition,
    },
    /// Insert a purchase. Fails the whole commit if the payment id is taken.
    CreatePurchase(Purchase),
}

impl Write {
    /// Write an account back, guarded by the version it was read at
    pub fn account(account: Account, version: u64) -> Self {
        let precondition = Precondition::Version(version);
        match account {
            Account::Client(doc) => Write::Client { doc, precondition },
            Account::FortuneTeller(doc) => Write::FortuneTeller { doc, precondition },
        }
    }
}

/// Either kind of account, for code that works across roles
#[derive(Clone, Debug, PartialEq)]
pub enum Account {
    Client(ClientAccount),
    FortuneTeller(FortuneTeller),
}

impl Account {
    pub fn role(&self) -> Role {
        match self {
            Account::Client(_) => Role::Client,
            Account::FortuneTeller(_) => Role::FortuneTeller,
        }
    }

    pub fn id(&self) -> &UserId {
        match self {
            Account::Client(c) => &c.id,
            Account::FortuneTeller(f) => &f.id,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Account::Client(c) => c.display_name.as_deref(),
            Account::FortuneTeller(f) => f.display_name.as_deref(),
        }
    }

    pub fn push(&self) -> &PushRegistration {
        match self {
            Account::Client(c) => &c.push,
            Account::FortuneTeller(f) => &f.push,
        }
    }

    pub fn push_mut(&mut self) -> &mut PushRegistration {
        match self {
            Account::Client(c) => &mut c.push,
            Account::FortuneTeller(f) => &mut f.push,
        }
    }
}

/// Document store trait
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get a client account
    async fn client(&self, id: &UserId) -> Result<Option<Versioned<ClientAccount>>>;

    /// Get a fortune teller account
    async fn fortune_teller(&self, id: &UserId) -> Result<Option<Versioned<FortuneTeller>>>;

    /// Get a conversation
    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>>;

    /// Look up the purchase recorded for a payment, if any
    async fn purchase_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Purchase>>;

    /// All purchases of one user, oldest first
    async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>>;

    /// Apply all writes atomically or none of them
    ///
    /// Returns [`StoreError::Conflict`] when a precondition fails and
    /// [`StoreError::DuplicatePayment`] when a purchase's payment id is taken.
    async fn commit(&self, writes: Vec<Write>) -> Result<()>;

    /// Get an account of either role
    async fn account(&self, role: Role, id: &UserId) -> Result<Option<Versioned<Account>>> {
        Ok(match role {
            Role::Client => self.client(id).await?.map(|v| Versioned {
                doc: Account::Client(v.doc),
                version: v.version,
            }),
            Role::FortuneTeller => self.fortune_teller(id).await?.map(|v| Versioned {
                doc: Account::FortuneTeller(v.doc),
                version: v.version,
            }),
        })
    }
}

/// Initial contents for a [`MemoryStore`], loadable from JSON
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    #[serde(default)]
    pub clients: Vec<ClientAccount>,
    #[serde(default)]
    pub fortune_tellers: Vec<FortuneTeller>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl Seed {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Default)]
struct Collections {
    clients: HashMap<UserId, Versioned<ClientAccount>>,
    fortune_tellers: HashMap<UserId, Versioned<FortuneTeller>>,
    conversations: HashMap<ConversationId, Conversation>,
    purchases: HashMap<PurchaseId, Purchase>,
    purchase_by_payment: HashMap<PaymentId, PurchaseId>,
}

/// In-memory document store (for development)
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check(
    current: Option<u64>,
    precondition: Precondition,
    path: impl FnOnce() -> String,
) -> Result<()> {
    let ok = match precondition {
        Precondition::Any => true,
        Precondition::Version(expected) => current == Some(expected),
        Precondition::Missing => current.is_none(),
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::Conflict(path()))
    }
}

fn bump<T>(slot: &mut HashMap<UserId, Versioned<T>>, id: UserId, doc: T) {
    let version = slot.get(&id).map_or(1, |v| v.version + 1);
    slot.insert(id, Versioned { doc, version });
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
        }
    }

    pub fn from_seed(seed: Seed) -> Self {
        let mut collections = Collections::default();
        for client in seed.clients {
            bump(&mut collections.clients, client.id.clone(), client);
        }
        for teller in seed.fortune_tellers {
            bump(&mut collections.fortune_tellers, teller.id.clone(), teller);
        }
        for conversation in seed.conversations {
            collections
                .conversations
                .insert(conversation.id.clone(), conversation);
        }
        Self {
            collections: RwLock::new(collections),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn client(&self, id: &UserId) -> Result<Option<Versioned<ClientAccount>>> {
        Ok(self.read()?.clients.get(id).cloned())
    }

    async fn fortune_teller(&self, id: &UserId) -> Result<Option<Versioned<FortuneTeller>>> {
        Ok(self.read()?.fortune_tellers.get(id).cloned())
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        Ok(self.read()?.conversations.get(id).cloned())
    }

    async fn purchase_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Purchase>> {
        let collections = self.read()?;
        Ok(collections
            .purchase_by_payment
            .get(payment_id)
            .and_then(|id| collections.purchases.get(id))
            .cloned())
    }

    async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>> {
        let collections = self.read()?;
        let mut result: Vec<_> = collections
            .purchases
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        let mut collections = self.write()?;

        // Validate everything before touching anything. Earlier writes in
        // the batch count as already applied.
        let mut pending: HashMap<String, Option<u64>> = HashMap::new();
        let mut payments: HashSet<&PaymentId> = HashSet::new();
        for write in &writes {
            match write {
                Write::Client { doc, precondition } => {
                    let path = format!("clients/{}", doc.id);
                    let current = pending
                        .get(&path)
                        .copied()
                        .unwrap_or_else(|| collections.clients.get(&doc.id).map(|v| v.version));
                    check(current, *precondition, || path.clone())?;
                    pending.insert(path, Some(current.map_or(1, |v| v + 1)));
                }
                Write::FortuneTeller { doc, precondition } => {
                    let path = format!("fortune-tellers/{}", doc.id);
                    let current = pending.get(&path).copied().unwrap_or_else(|| {
                        collections.fortune_tellers.get(&doc.id).map(|v| v.version)
                    });
                    check(current, *precondition, || path.clone())?;
                    pending.insert(path, Some(current.map_or(1, |v| v + 1)));
                }
                Write::CreatePurchase(purchase) => {
                    if collections
                        .purchase_by_payment
                        .contains_key(&purchase.payment_id)
                        || !payments.insert(&purchase.payment_id)
                    {
                        return Err(StoreError::DuplicatePayment(
                            purchase.payment_id.to_string(),
                        ));
                    }
                }
            }
        }

        for write in writes {
            match write {
                Write::Client { doc, .. } => {
                    bump(&mut collections.clients, doc.id.clone(), doc);
                }
                Write::FortuneTeller { doc, .. } => {
                    bump(&mut collections.fortune_tellers, doc.id.clone(), doc);
                }
                Write::CreatePurchase(purchase) => {
                    collections
                        .purchase_by_payment
                        .insert(purchase.payment_id.clone(), purchase.id.clone());
                    collections.purchases.insert(purchase.id.clone(), purchase);
                }
            }
        }

        Ok(())
    }
}
