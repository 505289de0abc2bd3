//! Authoritative key-value state: accounts keyed by address and per-contract
//! storage keyed by (address, key).
//!
//! Writes flow through forks: the production loop forks the canonical state,
//! executes speculatively against the fork and folds it back in only after
//! the block was appended. A [`StateFork`] reads through to a frozen snapshot
//! of its parent and keeps its own writes locally, so dropping it discards
//! everything it did.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use basalt_types::{Account, Address, Hash256};

/// Storage slot address: contract plus 32-byte key.
type Slot = (Address, Hash256);

/// Read-only view on state.
pub trait ReadState {
    /// Returns the account stored under `address`, if any. Callers treat a
    /// missing account as an empty one.
    fn account(&self, address: &Address) -> Option<Account>;

    /// Returns the raw bytes stored under `(address, key)`, if any.
    fn storage(&self, address: &Address, key: &Hash256) -> Option<Vec<u8>>;
}

/// Mutable state with a canonical root.
pub trait StateDatabase: ReadState {
    fn set_account(&mut self, address: Address, account: Account);
    fn delete_account(&mut self, address: &Address);
    fn set_storage(&mut self, address: Address, key: Hash256, value: Vec<u8>);
    fn delete_storage(&mut self, address: &Address, key: &Hash256);

    /// Deterministic BLAKE3 root over the canonically ordered account and
    /// storage streams.
    fn compute_state_root(&self) -> Hash256;
}

#[derive(Debug, Clone, Default)]
struct StatePages {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<Slot, Vec<u8>>,
}

impl StatePages {
    fn root(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        for (address, account) in &self.accounts {
            hasher.update(address.as_bytes());
            hasher.update(&account.nonce.to_le_bytes());
            hasher.update(&account.balance.to_le_bytes::<32>());
            hasher.update(account.storage_root.as_bytes());
            hasher.update(account.code_hash.as_bytes());
            hasher.update(&[account.account_type.as_byte()]);
            hasher.update(account.compliance_hash.as_bytes());
        }
        for ((address, key), value) in &self.storage {
            hasher.update(address.as_bytes());
            hasher.update(key.as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        Hash256::new(*hasher.finalize().as_bytes())
    }
}

/// Canonical in-memory state. Clones share the underlying pages until one
/// side writes, so handing a copy to readers is cheap.
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    pages: Arc<StatePages>,
}

impl InMemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy-on-write fork for speculative execution. The fork shares the
    /// current pages; its writes stay local until [`InMemoryState::commit_fork`].
    pub fn fork(&self) -> StateFork {
        StateFork {
            base: Arc::clone(&self.pages),
            accounts: HashMap::new(),
            storage: HashMap::new(),
        }
    }

    /// Folds a fork's writes into the canonical pages.
    pub fn commit_fork(&mut self, fork: StateFork) {
        let pages = Arc::make_mut(&mut self.pages);
        for (address, entry) in fork.accounts {
            match entry {
                Some(account) => {
                    pages.accounts.insert(address, account);
                }
                None => {
                    pages.accounts.remove(&address);
                }
            }
        }
        for (slot, entry) in fork.storage {
            match entry {
                Some(value) => {
                    pages.storage.insert(slot, value);
                }
                None => {
                    pages.storage.remove(&slot);
                }
            }
        }
    }
}

impl ReadState for InMemoryState {
    fn account(&self, address: &Address) -> Option<Account> {
        self.pages.accounts.get(address).cloned()
    }

    fn storage(&self, address: &Address, key: &Hash256) -> Option<Vec<u8>> {
        self.pages.storage.get(&(*address, *key)).cloned()
    }
}

impl StateDatabase for InMemoryState {
    fn set_account(&mut self, address: Address, account: Account) {
        Arc::make_mut(&mut self.pages).accounts.insert(address, account);
    }

    fn delete_account(&mut self, address: &Address) {
        Arc::make_mut(&mut self.pages).accounts.remove(address);
    }

    fn set_storage(&mut self, address: Address, key: Hash256, value: Vec<u8>) {
        Arc::make_mut(&mut self.pages)
            .storage
            .insert((address, key), value);
    }

    fn delete_storage(&mut self, address: &Address, key: &Hash256) {
        Arc::make_mut(&mut self.pages).storage.remove(&(*address, *key));
    }

    fn compute_state_root(&self) -> Hash256 {
        self.pages.root()
    }
}

/// Overlay over a frozen snapshot of the parent state. Reads fall through to
/// the base; writes (including deletes, kept as `None` masks) stay local.
#[derive(Debug, Clone)]
pub struct StateFork {
    base: Arc<StatePages>,
    accounts: HashMap<Address, Option<Account>>,
    storage: HashMap<Slot, Option<Vec<u8>>>,
}

impl StateFork {
    pub fn is_dirty(&self) -> bool {
        !self.accounts.is_empty() || !self.storage.is_empty()
    }

    /// Materializes the merged view. The root computation and nested forks
    /// need the overlay applied in canonical order.
    fn merged(&self) -> StatePages {
        let mut pages = StatePages {
            accounts: self.base.accounts.clone(),
            storage: self.base.storage.clone(),
        };
        for (address, entry) in &self.accounts {
            match entry {
                Some(account) => {
                    pages.accounts.insert(*address, account.clone());
                }
                None => {
                    pages.accounts.remove(address);
                }
            }
        }
        for (slot, entry) in &self.storage {
            match entry {
                Some(value) => {
                    pages.storage.insert(*slot, value.clone());
                }
                None => {
                    pages.storage.remove(slot);
                }
            }
        }
        pages
    }
}

impl ReadState for StateFork {
    fn account(&self, address: &Address) -> Option<Account> {
        match self.accounts.get(address) {
            Some(entry) => entry.clone(),
            None => self.base.accounts.get(address).cloned(),
        }
    }

    fn storage(&self, address: &Address, key: &Hash256) -> Option<Vec<u8>> {
        let slot = (*address, *key);
        match self.storage.get(&slot) {
            Some(entry) => entry.clone(),
            None => self.base.storage.get(&slot).cloned(),
        }
    }
}

impl StateDatabase for StateFork {
    fn set_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, Some(account));
    }

    fn delete_account(&mut self, address: &Address) {
        self.accounts.insert(*address, None);
    }

    fn set_storage(&mut self, address: Address, key: Hash256, value: Vec<u8>) {
        self.storage.insert((address, key), Some(value));
    }

    fn delete_storage(&mut self, address: &Address, key: &Hash256) {
        self.storage.insert((*address, *key), None);
    }

    fn compute_state_root(&self) -> Hash256 {
        self.merged().root()
    }
}

/// Scratch overlay over any state, used by the executor to make a single
/// transaction's contract-level mutations atomic: commit on success, drop on
/// failure.
pub struct ScopedState<'a> {
    base: &'a mut dyn StateDatabase,
    accounts: HashMap<Address, Option<Account>>,
    storage: HashMap<Slot, Option<Vec<u8>>>,
}

impl<'a> ScopedState<'a> {
    pub fn new(base: &'a mut dyn StateDatabase) -> Self {
        Self {
            base,
            accounts: HashMap::new(),
            storage: HashMap::new(),
        }
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        match self.accounts.get(address) {
            Some(entry) => entry.clone(),
            None => self.base.account(address),
        }
    }

    pub fn storage(&self, address: &Address, key: &Hash256) -> Option<Vec<u8>> {
        let slot = (*address, *key);
        match self.storage.get(&slot) {
            Some(entry) => entry.clone(),
            None => self.base.storage(address, key),
        }
    }

    pub fn set_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, Some(account));
    }

    pub fn set_storage(&mut self, address: Address, key: Hash256, value: Vec<u8>) {
        self.storage.insert((address, key), Some(value));
    }

    pub fn delete_storage(&mut self, address: &Address, key: &Hash256) {
        self.storage.insert((*address, *key), None);
    }

    /// Applies the scope to the underlying state. Dropping the scope instead
    /// discards every write.
    pub fn commit(self) {
        for (address, entry) in self.accounts {
            match entry {
                Some(account) => self.base.set_account(address, account),
                None => self.base.delete_account(&address),
            }
        }
        for ((address, key), entry) in self.storage {
            match entry {
                Some(value) => self.base.set_storage(address, key, value),
                None => self.base.delete_storage(&address, &key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_types::U256;

    fn address(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn key(byte: u8) -> Hash256 {
        Hash256::new([byte; 32])
    }

    #[test]
    fn missing_account_reads_as_none() {
        let state = InMemoryState::new();
        assert_eq!(state.account(&address(1)), None);
        assert_eq!(state.storage(&address(1), &key(1)), None);
    }

    #[test]
    fn fork_reads_through_to_base() {
        let mut state = InMemoryState::new();
        state.set_account(address(1), Account::with_balance(U256::from(10u64)));
        state.set_storage(address(1), key(1), vec![1, 2, 3]);

        let fork = state.fork();
        assert_eq!(
            fork.account(&address(1)).unwrap().balance,
            U256::from(10u64)
        );
        assert_eq!(fork.storage(&address(1), &key(1)), Some(vec![1, 2, 3]));
    }

    #[test]
    fn fork_writes_stay_local_until_commit() {
        let mut state = InMemoryState::new();
        state.set_account(address(1), Account::with_balance(U256::from(10u64)));

        let mut fork = state.fork();
        fork.set_account(address(1), Account::with_balance(U256::from(99u64)));
        fork.set_storage(address(2), key(2), vec![7]);

        // Canonical state untouched while the fork is live.
        assert_eq!(
            state.account(&address(1)).unwrap().balance,
            U256::from(10u64)
        );
        assert_eq!(state.storage(&address(2), &key(2)), None);

        state.commit_fork(fork);
        assert_eq!(
            state.account(&address(1)).unwrap().balance,
            U256::from(99u64)
        );
        assert_eq!(state.storage(&address(2), &key(2)), Some(vec![7]));
    }

    #[test]
    fn dropped_fork_discards_writes() {
        let mut state = InMemoryState::new();
        state.set_account(address(1), Account::with_balance(U256::from(10u64)));
        let root_before = state.compute_state_root();

        {
            let mut fork = state.fork();
            fork.set_account(address(1), Account::with_balance(U256::from(0u64)));
            fork.delete_account(&address(1));
        }

        assert_eq!(state.compute_state_root(), root_before);
    }

    #[test]
    fn fork_delete_masks_base_entry() {
        let mut state = InMemoryState::new();
        state.set_storage(address(1), key(1), vec![1]);

        let mut fork = state.fork();
        fork.delete_storage(&address(1), &key(1));
        assert_eq!(fork.storage(&address(1), &key(1)), None);
        // Base still has it.
        assert_eq!(state.storage(&address(1), &key(1)), Some(vec![1]));

        state.commit_fork(fork);
        assert_eq!(state.storage(&address(1), &key(1)), None);
    }

    #[test]
    fn fork_root_matches_committed_root() {
        let mut state = InMemoryState::new();
        state.set_account(address(1), Account::with_balance(U256::from(5u64)));

        let mut fork = state.fork();
        fork.set_account(address(2), Account::with_balance(U256::from(6u64)));
        fork.set_storage(address(2), key(9), vec![9, 9]);
        let fork_root = fork.compute_state_root();

        state.commit_fork(fork);
        assert_eq!(state.compute_state_root(), fork_root);
    }

    #[test]
    fn state_root_is_order_independent_of_insertion() {
        let mut a = InMemoryState::new();
        a.set_account(address(1), Account::with_balance(U256::from(1u64)));
        a.set_account(address(2), Account::with_balance(U256::from(2u64)));

        let mut b = InMemoryState::new();
        b.set_account(address(2), Account::with_balance(U256::from(2u64)));
        b.set_account(address(1), Account::with_balance(U256::from(1u64)));

        assert_eq!(a.compute_state_root(), b.compute_state_root());
    }

    #[test]
    fn scoped_state_commit_and_discard() {
        let mut state = InMemoryState::new();
        state.set_account(address(1), Account::with_balance(U256::from(10u64)));

        {
            let mut scope = ScopedState::new(&mut state);
            scope.set_storage(address(1), key(1), vec![1]);
            // Dropped without commit.
        }
        assert_eq!(state.storage(&address(1), &key(1)), None);

        let mut scope = ScopedState::new(&mut state);
        scope.set_storage(address(1), key(1), vec![1]);
        scope.set_account(address(3), Account::with_balance(U256::from(3u64)));
        scope.commit();

        assert_eq!(state.storage(&address(1), &key(1)), Some(vec![1]));
        assert_eq!(
            state.account(&address(3)).unwrap().balance,
            U256::from(3u64)
        );
    }

    #[test]
    fn clones_share_pages_until_write() {
        let mut state = InMemoryState::new();
        state.set_account(address(1), Account::with_balance(U256::from(1u64)));
        let reader = state.clone();

        state.set_account(address(1), Account::with_balance(U256::from(2u64)));
        // The reader still sees the pre-write view.
        assert_eq!(
            reader.account(&address(1)).unwrap().balance,
            U256::from(1u64)
        );
    }
}
