//! In-memory account registry kept in step with the persistent store.
//!
//! The registry is the only owner of the account map. It hydrates once from
//! the [`AccountStore`], and until hydration has finished no mutation may
//! reach storage: anything submitted earlier is queued and replayed on top of
//! the hydrated data. After hydration every applied mutation rewrites the
//! whole collection. Save failures are logged and otherwise ignored.

use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Account, AccountMap, AccountPatch};
use crate::error::LamError;
use crate::store::{AccountStore, BlobStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistryState {
    Uninitialized,
    Hydrating,
    Ready,
}

/// What a mutation did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Applied,
    /// Nothing to do, e.g. removing an absent account.
    Unchanged,
    /// Held back until hydration completes.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Hydrated { accounts: usize },
    Added(String),
    Removed(String),
    Updated(String),
    Cleared,
    /// A queued mutation failed when it was replayed after hydration.
    Rejected { user_name: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hydration {
    pub loaded: usize,
    /// Set when the stored data could not be read and the registry started empty.
    pub load_error: Option<String>,
    pub replayed: usize,
}

#[derive(Debug)]
enum Mutation {
    Add(Account),
    Remove(String),
    Update(String, AccountPatch),
    Clear,
}

impl Mutation {
    fn subject(&self) -> &str {
        match self {
            Mutation::Add(account) => &account.user_name,
            Mutation::Remove(user_name) | Mutation::Update(user_name, _) => user_name,
            Mutation::Clear => "",
        }
    }
}

pub struct AccountRegistry<B: BlobStore> {
    store: AccountStore<B>,
    accounts: AccountMap,
    state: RegistryState,
    pending: Vec<Mutation>,
    subscribers: Vec<Sender<RegistryEvent>>,
}

impl<B: BlobStore> AccountRegistry<B> {
    pub fn new(store: AccountStore<B>) -> Self {
        Self {
            store,
            accounts: AccountMap::new(),
            state: RegistryState::Uninitialized,
            pending: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Builds a registry over `backend` and hydrates it straight away.
    pub fn open(backend: B) -> Self {
        let mut registry = Self::new(AccountStore::new(backend));
        registry.hydrate();
        registry
    }

    pub fn state(&self) -> RegistryState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == RegistryState::Ready
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn store(&self) -> &AccountStore<B> {
        &self.store
    }

    /// Loads stored accounts exactly once. A missing blob leaves the map
    /// empty; an unreadable one does too, after logging. Mutations queued
    /// before this call are then applied in submission order.
    pub fn hydrate(&mut self) -> Hydration {
        if self.state != RegistryState::Uninitialized {
            warn!(state = ?self.state, "registry already hydrated");
            return Hydration {
                loaded: self.accounts.len(),
                load_error: None,
                replayed: 0,
            };
        }

        self.state = RegistryState::Hydrating;
        let mut load_error = None;
        self.accounts = match self.store.load() {
            Ok(Some(accounts)) => accounts,
            Ok(None) => AccountMap::new(),
            Err(err) => {
                warn!(error = %err, "could not load stored accounts, starting empty");
                load_error = Some(err.to_string());
                AccountMap::new()
            }
        };
        self.state = RegistryState::Ready;

        let loaded = self.accounts.len();
        info!(accounts = loaded, "registry hydrated");
        self.notify(RegistryEvent::Hydrated { accounts: loaded });

        let pending = std::mem::take(&mut self.pending);
        let replayed = pending.len();
        for mutation in pending {
            let subject = mutation.subject().to_string();
            if let Err(err) = self.apply(mutation) {
                self.notify(RegistryEvent::Rejected {
                    user_name: subject,
                    reason: err.to_string(),
                });
            }
        }

        Hydration {
            loaded,
            load_error,
            replayed,
        }
    }

    /// First writer wins: an existing user name is left untouched and
    /// `DuplicateAccount` is returned.
    pub fn add(&mut self, account: Account) -> Result<Outcome, LamError> {
        self.submit(Mutation::Add(account))
    }

    pub fn remove(&mut self, user_name: &str) -> Result<Outcome, LamError> {
        self.submit(Mutation::Remove(user_name.to_string()))
    }

    /// Shallow merge: fields absent from `patch` keep their stored value.
    pub fn update(&mut self, user_name: &str, patch: AccountPatch) -> Result<Outcome, LamError> {
        self.submit(Mutation::Update(user_name.to_string(), patch))
    }

    /// Drops every account and clears the backing store.
    pub fn clear(&mut self) -> Result<Outcome, LamError> {
        self.submit(Mutation::Clear)
    }

    pub fn get_by_username(&self, user_name: &str) -> Option<&Account> {
        self.accounts.get(user_name)
    }

    /// Linear scan; the first account with a matching puuid wins.
    pub fn get_by_puuid(&self, puuid: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|account| account.riot_data.puuid == puuid)
    }

    pub fn contains(&self, user_name: &str) -> bool {
        self.accounts.contains_key(user_name)
    }

    pub fn accounts(&self) -> &AccountMap {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Receives every event emitted after this call. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn submit(&mut self, mutation: Mutation) -> Result<Outcome, LamError> {
        if self.state != RegistryState::Ready {
            debug!(subject = mutation.subject(), "registry not hydrated, queueing mutation");
            self.pending.push(mutation);
            return Ok(Outcome::Queued);
        }
        self.apply(mutation)
    }

    fn apply(&mut self, mutation: Mutation) -> Result<Outcome, LamError> {
        match mutation {
            Mutation::Add(account) => {
                if self.accounts.contains_key(&account.user_name) {
                    warn!(user_name = %account.user_name, "account already exists");
                    return Err(LamError::DuplicateAccount(account.user_name));
                }
                let user_name = account.user_name.clone();
                self.accounts.insert(user_name.clone(), account);
                self.persist();
                self.notify(RegistryEvent::Added(user_name));
                Ok(Outcome::Applied)
            }
            Mutation::Remove(user_name) => {
                if self.accounts.remove(&user_name).is_none() {
                    return Ok(Outcome::Unchanged);
                }
                self.persist();
                self.notify(RegistryEvent::Removed(user_name));
                Ok(Outcome::Applied)
            }
            Mutation::Update(user_name, patch) => {
                let Some(account) = self.accounts.get_mut(&user_name) else {
                    warn!(user_name = %user_name, "account not found");
                    return Err(LamError::AccountNotFound(user_name));
                };
                patch.apply(account);
                self.persist();
                self.notify(RegistryEvent::Updated(user_name));
                Ok(Outcome::Applied)
            }
            Mutation::Clear => {
                self.accounts.clear();
                if let Err(err) = self.store.clear() {
                    warn!(error = %err, "failed to clear account store");
                }
                self.notify(RegistryEvent::Cleared);
                Ok(Outcome::Applied)
            }
        }
    }

    fn persist(&self) {
        match self.store.save_all(&self.accounts) {
            Ok(()) => debug!(accounts = self.accounts.len(), "accounts persisted"),
            Err(err) => warn!(error = %err, "failed to persist accounts"),
        }
    }

    fn notify(&mut self, event: RegistryEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
