//! End-to-end harness for the sysvm system contracts
//!
//! [`TestNode`] plays the host node: it owns committed state, advances
//! nonce and epoch, and runs every call through a factory-built VM so the
//! contracts see exactly what a chain would hand them.

#![forbid(unsafe_code)]
#![deny(warnings)]

use ed25519_dalek::{Signer, SigningKey};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use sysvm::{ArgsNewSystemScFactory, Ed25519SignVerifier, FactoryError, SystemScFactory};
use sysvm_auction::{select_nodes, AuctionConfig, AuctionData};
use sysvm_eei::{
    BlockchainHook, ContractCallInput, DelegationManagerScConfig, EpochNotifierRegistry, GasCost,
    HookError, PeerList, ReturnCode, SystemContract, SystemEi, SystemVm, ValidatorAccounts,
    VmOutput,
};
use sysvm_primitives::constants::{
    AUCTION_SC_ADDRESS, DELEGATION_MANAGER_SC_ADDRESS, FIRST_DELEGATION_SC_ADDRESS,
    STAKING_SC_ADDRESS,
};
use sysvm_primitives::{u64_to_be, U256};
use tracing::Span;

pub use sysvm_eei::StakingSystemScConfig;

pub const OWNER: [u8; 32] = [0xaa; 32];
pub const GAS: u64 = 10_000_000;

type StorageKey = (Vec<u8>, Vec<u8>);

/// Committed chain state plus the block header fields contracts read.
#[derive(Default)]
pub struct Ledger {
    storage: Mutex<BTreeMap<StorageKey, Vec<u8>>>,
    balances: Mutex<BTreeMap<Vec<u8>, U256>>,
    code: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    nonce: AtomicU64,
    epoch: AtomicU32,
    seed: Mutex<Vec<u8>>,
}

impl Ledger {
    pub fn storage(&self, address: &[u8], key: &[u8]) -> Vec<u8> {
        self.storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(address.to_vec(), key.to_vec()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn balance(&self, address: &[u8]) -> U256 {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub fn code(&self, address: &[u8]) -> Vec<u8> {
        self.code
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub fn credit(&self, address: &[u8], value: U256) {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let b = balances.entry(address.to_vec()).or_default();
        *b = b.saturating_add(value);
    }

    fn debit(&self, address: &[u8], value: U256) {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let b = balances.entry(address.to_vec()).or_default();
        *b = b.saturating_sub(value);
    }

    /// Folds a successful output into committed state.
    fn commit(&self, out: &VmOutput) {
        for (address, account) in &out.output_accounts {
            {
                let mut storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
                for update in account.storage_updates.values() {
                    let key = (address.clone(), update.offset.clone());
                    if update.data.is_empty() {
                        storage.remove(&key);
                    } else {
                        storage.insert(key, update.data.clone());
                    }
                }
            }
            let delta = account.balance_delta;
            if delta.is_negative() {
                self.debit(address, delta.magnitude());
            } else {
                self.credit(address, delta.magnitude());
            }
            if !account.code.is_empty() {
                self.code
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(address.clone(), account.code.clone());
            }
        }
    }
}

impl BlockchainHook for Ledger {
    fn get_storage_data(&self, address: &[u8], key: &[u8]) -> Result<Vec<u8>, HookError> {
        Ok(self.storage(address, key))
    }
    fn get_balance(&self, address: &[u8]) -> Result<U256, HookError> {
        Ok(self.balance(address))
    }
    fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }
    fn current_round(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }
    fn current_epoch(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }
    fn current_random_seed(&self) -> Vec<u8> {
        self.seed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Peer lists as the node's validator accounts store reports them.
#[derive(Default)]
pub struct PeerAccounts {
    lists: Mutex<BTreeMap<Vec<u8>, PeerList>>,
}

impl PeerAccounts {
    pub fn set(&self, bls_key: &[u8], list: PeerList) {
        self.lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bls_key.to_vec(), list);
    }
}

impl ValidatorAccounts for PeerAccounts {
    fn peer_list(&self, bls_key: &[u8]) -> Option<PeerList> {
        self.lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bls_key)
            .copied()
    }
}

/// Minimal delegation implementation deployed from the template address:
/// `_init` stores the owner, `owner` returns it.
pub struct DelegationTemplate;

impl SystemContract for DelegationTemplate {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        match input.function.as_str() {
            "_init" => {
                eei.set_storage(b"owner", &input.caller_addr);
                ReturnCode::Ok
            }
            "owner" => {
                let owner = eei.get_storage(b"owner");
                eei.finish(&owner);
                ReturnCode::Ok
            }
            _ => {
                eei.add_return_message("invalid function to call");
                ReturnCode::UserError
            }
        }
    }
}

/// A validator operator: a funded account owning Ed25519 node keys.
pub struct Operator {
    pub address: Vec<u8>,
    pub keys: Vec<SigningKey>,
}

impl Operator {
    pub fn new(address: [u8; 32], keys: Vec<SigningKey>) -> Self {
        Self {
            address: address.to_vec(),
            keys,
        }
    }

    pub fn bls_keys(&self) -> Vec<Vec<u8>> {
        self.keys
            .iter()
            .map(|k| k.verifying_key().to_bytes().to_vec())
            .collect()
    }

    /// `stake` arguments: node count, then each key with its proof over
    /// the operator address.
    pub fn stake_args(&self) -> Vec<Vec<u8>> {
        let mut args = vec![u64_to_be(self.keys.len() as u64)];
        for k in &self.keys {
            args.push(k.verifying_key().to_bytes().to_vec());
            args.push(k.sign(&self.address).to_bytes().to_vec());
        }
        args
    }
}

pub struct TestNode {
    pub ledger: Arc<Ledger>,
    pub peers: Arc<PeerAccounts>,
    pub notifier: Arc<EpochNotifierRegistry>,
    pub vm: SystemVm,
    staking_config: StakingSystemScConfig,
    num_nodes: u64,
    total_supply: U256,
}

impl TestNode {
    pub fn new(
        staking_config: StakingSystemScConfig,
        delegation_config: DelegationManagerScConfig,
        num_nodes: u64,
    ) -> Result<Self, FactoryError> {
        let ledger = Arc::new(Ledger::default());
        let peers = Arc::new(PeerAccounts::default());
        let notifier = Arc::new(EpochNotifierRegistry::new());
        let total_supply = U256::exp10(12);
        let factory = SystemScFactory::new(ArgsNewSystemScFactory {
            staking_sc_config: staking_config.clone(),
            delegation_mgr_sc_config: delegation_config,
            gas_cost: GasCost::default(),
            num_of_nodes_to_select: num_nodes,
            genesis_total_supply: total_supply,
            sig_verifier: Arc::new(Ed25519SignVerifier),
            epoch_notifier: notifier.clone(),
            span: Span::none(),
        })?;
        let mut vm = factory.create_vm(ledger.clone(), peers.clone())?;
        vm.context_mut()
            .system_contracts_mut()
            .add(&FIRST_DELEGATION_SC_ADDRESS, Arc::new(DelegationTemplate))?;

        let mut node = Self {
            ledger,
            peers,
            notifier,
            vm,
            staking_config,
            num_nodes,
            total_supply,
        };
        for address in [STAKING_SC_ADDRESS, AUCTION_SC_ADDRESS, DELEGATION_MANAGER_SC_ADDRESS] {
            let input = ContractCallInput::new(&OWNER, &address, "_init").with_gas(GAS);
            let out = node.vm.run_smart_contract_create(&input)?;
            node.ledger.commit(&out);
        }
        Ok(node)
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.ledger.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn set_seed(&self, seed: &[u8]) {
        *self.ledger.seed.lock().unwrap_or_else(PoisonError::into_inner) = seed.to_vec();
    }

    /// Moves to `epoch` and tells every contract about it.
    pub fn set_epoch(&self, epoch: u32) {
        self.ledger.epoch.store(epoch, Ordering::SeqCst);
        self.notifier.check_epoch(epoch);
    }

    /// Runs one transaction; state and balances change only on success.
    pub fn call(
        &mut self,
        caller: &[u8],
        recipient: &[u8],
        function: &str,
        args: Vec<Vec<u8>>,
        value: U256,
    ) -> Result<VmOutput, FactoryError> {
        let input = ContractCallInput::new(caller, recipient, function)
            .with_args(args)
            .with_value(value)
            .with_gas(GAS);
        let out = self.vm.run_smart_contract_call(&input)?;
        if out.return_code == ReturnCode::Ok {
            self.ledger.debit(caller, value);
            self.ledger.commit(&out);
        }
        Ok(out)
    }

    pub fn auction(
        &mut self,
        caller: &[u8],
        function: &str,
        args: Vec<Vec<u8>>,
        value: U256,
    ) -> Result<VmOutput, FactoryError> {
        self.call(caller, &AUCTION_SC_ADDRESS, function, args, value)
    }

    pub fn bid(&self, owner: &[u8]) -> Option<AuctionData> {
        AuctionData::decode(&self.ledger.storage(&AUCTION_SC_ADDRESS, owner)).ok()
    }

    /// The base auction config the node was built with.
    pub fn auction_config(&self) -> AuctionConfig {
        let amount = |s: &str| U256::from_dec_str(s).unwrap_or_default();
        let cfg = &self.staking_config;
        AuctionConfig {
            num_nodes: u32::try_from(self.num_nodes).unwrap_or(u32::MAX),
            min_stake_value: amount(&cfg.min_stake_value),
            total_supply: self.total_supply,
            min_step: amount(&cfg.min_step_value),
            node_price: amount(&cfg.genesis_node_price),
            un_jail_price: amount(&cfg.un_jail_value),
        }
    }

    /// Runs validator selection over the committed bids of `owners`.
    pub fn select(&self, owners: &[&[u8]]) -> Result<Vec<Vec<u8>>, sysvm_auction::AuctionError> {
        let bids: Vec<AuctionData> = owners.iter().filter_map(|o| self.bid(o)).collect();
        select_nodes(&self.auction_config(), &bids, &self.ledger.current_random_seed())
    }
}

/// Deterministic node key `i` for tests that do not need fresh randomness.
pub fn node_key(i: u8) -> SigningKey {
    SigningKey::from_bytes(&[i; 32])
}
