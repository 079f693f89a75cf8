#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Staking auction system contract.
//!
//! Owners bid by locking stake against a list of BLS keys. The contract
//! verifies key ownership, registers and activates keys in the staking
//! registry through nested calls, and computes the clearing node price and
//! the selected validator set from the bids.

pub mod data;
pub mod selection;

pub use data::{AuctionConfig, AuctionData};
pub use selection::{
    calc_num_qualified_nodes, calc_total_qualifying_stake, calculate_node_price, select_nodes,
};

use primitive_types::U256;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysvm_eei::{
    build_call_data, ConfigError, ContractCallInput, EeiError,
    EpochNotifier, EpochSubscriber, GasCost, MessageSignVerifier, ReturnCode,
    StakingSystemScConfig, SystemContract, SystemEi, VmOutput,
};
use sysvm_eei::config::parse_positive_amount;
use sysvm_primitives::constants::{INIT_FUNCTION_NAME, KEY_STATUS_FAILED, KEY_STATUS_INVALID_KEY};
use sysvm_primitives::{u256_from_be, u256_to_be, u64_from_be, u64_to_be, CodecError};
use sysvm_staking::StakedData;
use thiserror::Error;
use tracing::{debug, warn, Span};

pub const OWNER_KEY: &[u8] = b"owner";
pub const UN_JAIL_FUNDS_KEY: &[u8] = b"unJailFunds";

const MIN_ARGS_TO_CHANGE_VALIDATOR_KEYS: usize = 4;
const INSUFFICIENT_GAS_LIMIT: &str = "insufficient gas limit";
const VALUE_MUST_BE_ZERO: &str = "transaction value must be zero";
const CANNOT_GET_REGISTRATION_DATA: &str = "cannot get or create registration data: error ";
const CANNOT_GET_ALL_BLS_KEYS: &str = "could not get all blsKeys from registration data: error ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuctionError {
    #[error("invalid staking smart contract address")]
    InvalidStakingAddress,
    #[error("invalid auction smart contract address")]
    InvalidAuctionAddress,
    #[error("invalid number of nodes to select: {0}")]
    InvalidNumNodes(u64),
    #[error("invalid genesis total supply")]
    InvalidGenesisTotalSupply,
    #[error("invalid unjail cost")]
    InvalidUnJailCost,
    #[error("invalid min stake value")]
    InvalidMinStakeValue,
    #[error("invalid node price")]
    InvalidNodePrice,
    #[error("invalid min step value")]
    InvalidMinStepValue,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not enough qualified nodes")]
    NotEnoughQualifiedNodes,
    #[error("auction is not enabled")]
    AuctionNotEnabled,
    #[error("bls public key mismatch, key {0} not found")]
    BlsKeyMismatch(String),
    #[error("bls key already registered")]
    KeyAlreadyRegistered,
    #[error("error on execution at staking smart contract")]
    ExecutionAtStaking,
    #[error("stored data: {0}")]
    Codec(#[from] CodecError),
}

pub struct ArgsStakingAuctionSmartContract {
    pub staking_sc_address: Vec<u8>,
    pub auction_sc_address: Vec<u8>,
    pub num_of_nodes_to_select: u64,
    pub staking_sc_config: StakingSystemScConfig,
    pub genesis_total_supply: U256,
    pub sig_verifier: Arc<dyn MessageSignVerifier>,
    pub gas_cost: GasCost,
    pub epoch_notifier: Arc<dyn EpochNotifier>,
    pub span: Span,
}

pub struct StakingAuctionSc {
    staking_sc_address: Vec<u8>,
    auction_sc_address: Vec<u8>,
    base_config: AuctionConfig,
    sig_verifier: Arc<dyn MessageSignVerifier>,
    gas_cost: GasCost,
    enable_staking_epoch: u32,
    enable_auction_epoch: u32,
    enable_double_key_epoch: u32,
    flag_stake: AtomicBool,
    flag_auction: AtomicBool,
    flag_double_key: AtomicBool,
    span: Span,
}

fn verify_bls_public_keys(data: &AuctionData, keys: &[Vec<u8>]) -> Result<(), AuctionError> {
    match keys.iter().find(|k| !data.has_key(k)) {
        Some(missing) => Err(AuctionError::BlsKeyMismatch(hex::encode(missing))),
        None => Ok(()),
    }
}

fn has_double_keys(keys: &[Vec<u8>]) -> bool {
    let mut seen = BTreeSet::new();
    keys.iter().any(|k| !seen.insert(k.as_slice()))
}

/// `NumNodes, (BlsKey, SignedMessage) x NumNodes, [RewardAddress], [MaxStakePerNode]`
fn num_nodes_if_args_correct(args: &[Vec<u8>]) -> Option<u64> {
    let max_nodes = u64_from_be(args.first()?).ok()?;
    let expected = max_nodes.checked_mul(2)?.checked_add(1)?;
    let len = args.len() as u64;
    (len >= expected && len <= expected + 2).then_some(max_nodes)
}

/// `MinStake, NumNodes, TotalSupply, MinStep, NodePrice, UnJailPrice`
fn config_from_args(args: &[Vec<u8>]) -> Option<AuctionConfig> {
    Some(AuctionConfig {
        min_stake_value: u256_from_be(&args[0]).ok()?,
        num_nodes: u32::try_from(u64_from_be(&args[1]).ok()?).ok()?,
        total_supply: u256_from_be(&args[2]).ok()?,
        min_step: u256_from_be(&args[3]).ok()?,
        node_price: u256_from_be(&args[4]).ok()?,
        un_jail_price: u256_from_be(&args[5]).ok()?,
    })
}

fn finish_key_status(eei: &mut dyn SystemEi, key: &[u8], status: u8) {
    eei.finish(key);
    eei.finish(&[status]);
}

fn u64_of(v: &U256) -> u64 {
    if *v > U256::from(u64::MAX) {
        u64::MAX
    } else {
        v.low_u64()
    }
}

impl StakingAuctionSc {
    pub fn new(args: ArgsStakingAuctionSmartContract) -> Result<Arc<Self>, AuctionError> {
        if args.staking_sc_address.is_empty() {
            return Err(AuctionError::InvalidStakingAddress);
        }
        if args.auction_sc_address.is_empty() {
            return Err(AuctionError::InvalidAuctionAddress);
        }
        let num_nodes = u32::try_from(args.num_of_nodes_to_select)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or(AuctionError::InvalidNumNodes(args.num_of_nodes_to_select))?;
        if args.genesis_total_supply.is_zero() {
            return Err(AuctionError::InvalidGenesisTotalSupply);
        }
        let cfg = &args.staking_sc_config;
        let base_config = AuctionConfig {
            num_nodes,
            min_stake_value: parse_positive_amount("MinStakeValue", &cfg.min_stake_value)?,
            total_supply: args.genesis_total_supply,
            min_step: parse_positive_amount("MinStepValue", &cfg.min_step_value)?,
            node_price: parse_positive_amount("GenesisNodePrice", &cfg.genesis_node_price)?,
            un_jail_price: parse_positive_amount("UnJailValue", &cfg.un_jail_value)?,
        };

        let sc = Arc::new(Self {
            staking_sc_address: args.staking_sc_address,
            auction_sc_address: args.auction_sc_address,
            base_config,
            sig_verifier: args.sig_verifier,
            gas_cost: args.gas_cost,
            enable_staking_epoch: cfg.stake_enable_epoch,
            enable_auction_epoch: cfg.auction_enable_epoch,
            enable_double_key_epoch: cfg.double_key_protection_enable_epoch,
            flag_stake: AtomicBool::new(false),
            flag_auction: AtomicBool::new(false),
            flag_double_key: AtomicBool::new(false),
            span: args.span,
        });
        args.epoch_notifier.register_notify_handler(sc.clone());
        Ok(sc)
    }

    #[must_use]
    pub fn base_config(&self) -> &AuctionConfig {
        &self.base_config
    }

    #[must_use]
    pub fn is_stake_enabled(&self) -> bool {
        self.flag_stake.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_auction_enabled(&self) -> bool {
        self.flag_auction.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_double_key_protection_enabled(&self) -> bool {
        self.flag_double_key.load(Ordering::SeqCst)
    }

    /// Clearing price for `bids` under the current epoch's config.
    pub fn calculate_node_price(&self, eei: &mut dyn SystemEi, bids: &[AuctionData]) -> Result<U256, AuctionError> {
        let epoch = eei.block_chain_hook().current_epoch();
        let config = self.get_config(eei, epoch);
        calculate_node_price(&config, bids)
    }

    /// Validator set for `bids`, seeded by the current block's random seed.
    pub fn select_validators(
        &self,
        eei: &mut dyn SystemEi,
        bids: &[AuctionData],
    ) -> Result<Vec<Vec<u8>>, AuctionError> {
        if !self.is_auction_enabled() {
            return Err(AuctionError::AuctionNotEnabled);
        }
        let epoch = eei.block_chain_hook().current_epoch();
        let config = self.get_config(eei, epoch);
        let seed = eei.block_chain_hook().current_random_seed();
        select_nodes(&config, bids, &seed)
    }

    fn charge(eei: &mut dyn SystemEi, gas: u64) -> bool {
        if eei.use_gas(gas).is_ok() {
            return true;
        }
        eei.add_return_message(INSUFFICIENT_GAS_LIMIT);
        false
    }

    fn require_zero_value(eei: &mut dyn SystemEi, input: &ContractCallInput) -> bool {
        if input.call_value.is_zero() {
            return true;
        }
        eei.add_return_message(VALUE_MUST_BE_ZERO);
        false
    }

    /// Config stored for `epoch`, or the base config.
    ///
    /// A stored config that fails validation is overwritten with the base one.
    pub fn get_config(&self, eei: &mut dyn SystemEi, epoch: u32) -> AuctionConfig {
        let key = u64_to_be(u64::from(epoch));
        let stored = eei.get_storage(&key);
        if stored.is_empty() {
            return self.base_config.clone();
        }
        let config = match AuctionConfig::decode(&stored) {
            Ok(c) => c,
            Err(err) => {
                warn!(parent: &self.span, %err, epoch, "undecodable auction config, using base config");
                return self.base_config.clone();
            }
        };
        if let Err(err) = config.validate() {
            warn!(parent: &self.span, %err, epoch, "invalid auction config, restoring base config");
            eei.set_storage(&key, &self.base_config.encode());
            return self.base_config.clone();
        }
        config
    }

    fn get_or_create_registration_data(&self, eei: &dyn SystemEi, key: &[u8]) -> Result<AuctionData, AuctionError> {
        let stored = eei.get_storage(key);
        if stored.is_empty() {
            return Ok(AuctionData::default());
        }
        AuctionData::decode(&stored).map_err(|err| {
            debug!(parent: &self.span, %err, "undecodable registration data");
            AuctionError::from(err)
        })
    }

    fn registration_data(&self, eei: &mut dyn SystemEi, key: &[u8]) -> Option<AuctionData> {
        match self.get_or_create_registration_data(eei, key) {
            Ok(d) => Some(d),
            Err(err) => {
                eei.add_return_message(&format!("{CANNOT_GET_REGISTRATION_DATA}{err}"));
                None
            }
        }
    }

    fn save_registration_data(eei: &mut dyn SystemEi, key: &[u8], data: &AuctionData) {
        eei.set_storage(key, &data.encode());
    }

    fn get_staked_data(&self, eei: &dyn SystemEi, key: &[u8]) -> Result<StakedData, AuctionError> {
        let stored = eei.get_storage_from_address(&self.staking_sc_address, key);
        if stored.is_empty() {
            return Ok(StakedData::default());
        }
        StakedData::decode(&stored).map_err(|err| {
            debug!(parent: &self.span, %err, "undecodable staked data");
            AuctionError::from(err)
        })
    }

    fn execute_on_staking_sc(
        &self,
        eei: &mut dyn SystemEi,
        function: &str,
        args: &[&[u8]],
    ) -> Result<VmOutput, EeiError> {
        let data = build_call_data(function, args);
        eei.execute_on_dest_context(&self.staking_sc_address, &self.auction_sc_address, U256::zero(), &data)
    }

    /// Runs `function` on the registry and reports whether it returned `Ok`.
    fn staking_call_ok(&self, eei: &mut dyn SystemEi, function: &str, args: &[&[u8]]) -> bool {
        matches!(
            self.execute_on_staking_sc(eei, function, args),
            Ok(out) if out.return_code == ReturnCode::Ok
        )
    }

    fn init(eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !eei.get_storage(OWNER_KEY).is_empty() {
            eei.add_return_message("smart contract was already initialized");
            return ReturnCode::UserError;
        }
        eei.set_storage(OWNER_KEY, &input.caller_addr);
        ReturnCode::Ok
    }

    fn set_config(eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if eei.get_storage(OWNER_KEY) != input.caller_addr {
            eei.add_return_message("setConfig function was not called by the owner address");
            return ReturnCode::UserError;
        }
        let args = &input.arguments;
        if args.len() != 7 {
            eei.add_return_message(&format!(
                "setConfig function called with wrong number of arguments expected 7, got {}",
                args.len()
            ));
            return ReturnCode::UserError;
        }
        let Some(config) = config_from_args(args) else {
            eei.add_return_message("setConfig arguments out of range");
            return ReturnCode::UserError;
        };
        if let Err(err) = config.validate() {
            eei.add_return_message(&err.to_string());
            return ReturnCode::UserError;
        }
        eei.set_storage(&args[6], &config.encode());
        ReturnCode::Ok
    }

    fn get(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        if input.arguments.len() != 1 {
            eei.add_return_message(&format!(
                "invalid number of arguments: expected exactly 1, got {}",
                input.arguments.len()
            ));
            return ReturnCode::UserError;
        }
        if !Self::charge(eei, self.gas_cost.meta_chain_system_scs_cost.get) {
            return ReturnCode::OutOfGas;
        }
        let value = eei.get_storage(&input.arguments[0]);
        eei.finish(&value);
        ReturnCode::Ok
    }

    /// Keys whose proof of possession verifies against the caller address.
    /// Rejected keys are reported as `(key, invalidKey)` pairs.
    fn get_verified_bls_keys_from_args(
        &self,
        eei: &mut dyn SystemEi,
        tx_pub_key: &[u8],
        args: &[Vec<u8>],
        max_nodes: usize,
    ) -> Vec<Vec<u8>> {
        let mut bls_keys = Vec::with_capacity(max_nodes);
        let mut invalid = Vec::new();
        for pair in args[1..=2 * max_nodes].chunks_exact(2) {
            let (bls_key, signed_message) = (&pair[0], &pair[1]);
            if self.sig_verifier.verify(tx_pub_key, signed_message, bls_key).is_err() {
                invalid.push(hex::encode(bls_key));
                finish_key_status(eei, bls_key, KEY_STATUS_INVALID_KEY);
                continue;
            }
            bls_keys.push(bls_key.clone());
        }
        if !invalid.is_empty() {
            eei.add_return_message(&format!("invalid BLS keys: {}", invalid.join(", ")));
        }
        bls_keys
    }

    /// Registers in the staking registry the keys not yet owned by `data`.
    fn register_bls_keys(
        &self,
        eei: &mut dyn SystemEi,
        data: &mut AuctionData,
        bls_keys: &[Vec<u8>],
    ) -> Result<(), AuctionError> {
        let new_keys: Vec<&Vec<u8>> = bls_keys.iter().filter(|k| !data.has_key(k)).collect();
        for key in &new_keys {
            let taken = match self.execute_on_staking_sc(eei, "get", &[key]) {
                Ok(out) => out.return_data.first().is_some_and(|d| !d.is_empty()),
                Err(_) => true,
            };
            if taken {
                return Err(AuctionError::KeyAlreadyRegistered);
            }
        }

        for key in new_keys {
            let code = match self.execute_on_staking_sc(eei, "register", &[key, &data.reward_address]) {
                Ok(out) => out.return_code,
                Err(err) => {
                    eei.add_return_message(&format!("cannot do register: {err}"));
                    finish_key_status(eei, key, KEY_STATUS_FAILED);
                    return Err(AuctionError::ExecutionAtStaking);
                }
            };
            if code != ReturnCode::Ok {
                eei.add_return_message(&format!("cannot do register: {code}"));
                finish_key_status(eei, key, KEY_STATUS_FAILED);
                return Err(AuctionError::KeyAlreadyRegistered);
            }
            data.bls_pub_keys.push(key.clone());
        }
        Ok(())
    }

    /// Stakes up to `num_qualified` keys at `node_price`, skipping keys
    /// already staked. `LockedStake` follows the registered count.
    fn activate_staking_for(
        &self,
        eei: &mut dyn SystemEi,
        bls_keys: &[Vec<u8>],
        num_qualified: u64,
        data: &mut AuctionData,
        node_price: &U256,
    ) {
        let mut num_registered = u64::from(data.num_registered);
        let reward_address = data.reward_address.clone();
        for key in bls_keys {
            if num_registered >= num_qualified {
                break;
            }
            let Ok(staked_data) = self.get_staked_data(eei, key) else {
                continue;
            };
            if staked_data.staked {
                continue;
            }
            let failure = match self.execute_on_staking_sc(eei, "stake", &[key, &reward_address]) {
                Ok(out) if out.return_code == ReturnCode::Ok => None,
                Ok(out) => Some(out.return_code.to_string()),
                Err(err) => Some(err.to_string()),
            };
            if let Some(reason) = failure {
                eei.add_return_message(&format!(
                    "cannot do stake for key {}, error {reason}",
                    hex::encode(key)
                ));
                finish_key_status(eei, key, KEY_STATUS_FAILED);
                continue;
            }
            if staked_data.un_staked_nonce == 0 {
                num_registered += 1;
            }
        }
        data.num_registered = u32::try_from(num_registered).unwrap_or(u32::MAX);
        data.locked_stake = node_price.saturating_mul(U256::from(num_registered));
    }

    #[allow(clippy::cast_possible_truncation)]
    fn stake(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        let stake_cost = self.gas_cost.meta_chain_system_scs_cost.stake;
        if !Self::charge(eei, stake_cost) {
            return ReturnCode::OutOfGas;
        }
        let is_genesis = eei.block_chain_hook().current_nonce() == 0;
        if !is_genesis && !self.is_stake_enabled() {
            eei.add_return_message("stake is not enabled");
            return ReturnCode::UserError;
        }

        let epoch = eei.block_chain_hook().current_epoch();
        let config = self.get_config(eei, epoch);
        let caller = &input.caller_addr;
        let Some(mut data) = self.registration_data(eei, caller) else {
            return ReturnCode::UserError;
        };
        data.total_stake_value = data.total_stake_value.saturating_add(input.call_value);
        if data.total_stake_value < config.node_price {
            eei.add_return_message(&format!(
                "insufficient stake value: expected {}, got {}",
                config.node_price, data.total_stake_value
            ));
            return ReturnCode::UserError;
        }

        let args = &input.arguments;
        if args.is_empty() {
            if data.bls_pub_keys.is_empty() {
                eei.add_return_message("no bls keys has been provided");
                return ReturnCode::UserError;
            }
            Self::save_registration_data(eei, caller, &data);
            return ReturnCode::Ok;
        }

        let Some(max_nodes) = num_nodes_if_args_correct(args) else {
            eei.add_return_message("invalid number of arguments to call stake");
            return ReturnCode::UserError;
        };
        if max_nodes == 0 {
            eei.add_return_message("number of nodes argument must be greater than zero");
            return ReturnCode::UserError;
        }
        if !Self::charge(eei, (max_nodes - 1).saturating_mul(stake_cost)) {
            return ReturnCode::OutOfGas;
        }

        let is_already_registered = !data.reward_address.is_empty();
        if !is_already_registered {
            data.reward_address.clone_from(caller);
            data.register_nonce = eei.block_chain_hook().current_nonce();
        }
        data.max_stake_per_node = data.total_stake_value;
        data.epoch = eei.block_chain_hook().current_epoch();

        // max_nodes <= args.len() / 2 here, so the cast is lossless
        let bls_keys = self.get_verified_bls_keys_from_args(eei, caller, args, max_nodes as usize);
        if self.is_double_key_protection_enabled() && has_double_keys(&bls_keys) {
            eei.add_return_message("invalid arguments, found same bls key twice");
            return ReturnCode::UserError;
        }
        if let Err(err) = self.register_bls_keys(eei, &mut data, &bls_keys) {
            eei.add_return_message(&format!("cannot register bls key: error {err}"));
            return ReturnCode::UserError;
        }

        let num_qualified = u64_of(&(data.total_stake_value / config.node_price));
        if data.bls_pub_keys.len() as u64 > num_qualified {
            eei.add_return_message("insufficient funds");
            return ReturnCode::OutOfFunds;
        }

        for optional in args.iter().skip(2 * max_nodes as usize + 1) {
            if optional.len() == caller.len() {
                if is_already_registered {
                    eei.add_return_message(
                        "reward address after being registered can be changed only through changeRewardAddress",
                    );
                } else {
                    data.reward_address.clone_from(optional);
                }
                continue;
            }
            let Ok(max_stake_per_node) = u256_from_be(optional) else {
                eei.add_return_message("max stake per node does not fit in 256 bits");
                return ReturnCode::UserError;
            };
            data.max_stake_per_node = max_stake_per_node;
        }

        self.activate_staking_for(eei, &bls_keys, num_qualified, &mut data, &config.node_price);
        Self::save_registration_data(eei, caller, &data);
        ReturnCode::Ok
    }

    fn un_stake(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        let keys = &input.arguments;
        if keys.is_empty() {
            eei.add_return_message("invalid number of arguments: expected min 1, got 0");
            return ReturnCode::UserError;
        }
        if !self.is_stake_enabled() {
            eei.add_return_message("unStake is not enabled");
            return ReturnCode::UserError;
        }
        let Some(data) = self.registration_data(eei, &input.caller_addr) else {
            return ReturnCode::UserError;
        };
        let cost = self.gas_cost.meta_chain_system_scs_cost.un_stake;
        if !Self::charge(eei, cost.saturating_mul(keys.len() as u64)) {
            return ReturnCode::OutOfGas;
        }
        if let Err(err) = verify_bls_public_keys(&data, keys) {
            eei.add_return_message(&format!("{CANNOT_GET_ALL_BLS_KEYS}{err}"));
            return ReturnCode::UserError;
        }

        for key in keys {
            let failure = match self.execute_on_staking_sc(eei, "unStake", &[key, &data.reward_address]) {
                Ok(out) if out.return_code == ReturnCode::Ok => None,
                Ok(out) => Some(out.return_code.to_string()),
                Err(err) => Some(err.to_string()),
            };
            if let Some(reason) = failure {
                eei.add_return_message(&format!("cannot do unStake for key {}: {reason}", hex::encode(key)));
                finish_key_status(eei, key, KEY_STATUS_FAILED);
            }
        }
        Self::save_registration_data(eei, &input.caller_addr, &data);
        ReturnCode::Ok
    }

    fn un_bond(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        let keys = &input.arguments;
        if keys.is_empty() {
            eei.add_return_message("invalid number of arguments: expected min 1, got 0");
            return ReturnCode::UserError;
        }
        if !self.is_stake_enabled() {
            eei.add_return_message("unBond is not enabled");
            return ReturnCode::UserError;
        }
        let caller = &input.caller_addr;
        let Some(mut data) = self.registration_data(eei, caller) else {
            return ReturnCode::UserError;
        };
        if let Err(err) = verify_bls_public_keys(&data, keys) {
            eei.add_return_message(&format!("{CANNOT_GET_ALL_BLS_KEYS}{err}"));
            return ReturnCode::UserError;
        }
        let cost = self.gas_cost.meta_chain_system_scs_cost.un_bond;
        if !Self::charge(eei, cost.saturating_mul(keys.len() as u64)) {
            return ReturnCode::OutOfGas;
        }

        let mut un_bonded_keys = Vec::new();
        let mut total_node_price = U256::zero();
        let mut total_slashed = U256::zero();
        for key in keys {
            let node_data = match self.get_staked_data(eei, key) {
                Ok(d) => d,
                Err(err) => {
                    eei.add_return_message(&format!(
                        "cannot do unBond for key: {}, error: {err}",
                        hex::encode(key)
                    ));
                    finish_key_status(eei, key, KEY_STATUS_FAILED);
                    continue;
                }
            };
            if !self.staking_call_ok(eei, "unBond", &[key]) {
                eei.add_return_message(&format!("cannot do unBond for key: {}", hex::encode(key)));
                finish_key_status(eei, key, KEY_STATUS_FAILED);
                continue;
            }
            data.num_registered = data.num_registered.saturating_sub(1);
            let config = self.get_config(eei, node_data.un_staked_epoch);
            un_bonded_keys.push(key.clone());
            total_node_price = total_node_price.saturating_add(config.node_price);
            total_slashed = total_slashed.saturating_add(node_data.slash_value);
        }

        if data.locked_stake < total_node_price || data.total_stake_value < total_node_price {
            eei.add_return_message("contract error on unBond function, lockedStake < totalUnBond");
            return ReturnCode::UserError;
        }
        data.locked_stake -= total_node_price;
        data.total_stake_value -= total_node_price;
        let refund = total_node_price.saturating_sub(total_slashed);
        eei.transfer(caller, &input.recipient_addr, refund, &[], 0);

        if data.locked_stake.is_zero() && data.total_stake_value.is_zero() {
            eei.set_storage(caller, &[]);
        } else {
            for key in &un_bonded_keys {
                if let Some(i) = data.bls_pub_keys.iter().position(|k| k == key) {
                    data.bls_pub_keys.swap_remove(i);
                }
            }
            Self::save_registration_data(eei, caller, &data);
        }
        ReturnCode::Ok
    }

    fn claim(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        let caller = &input.caller_addr;
        let Some(mut data) = self.registration_data(eei, caller) else {
            return ReturnCode::UserError;
        };
        if data.reward_address.is_empty() {
            eei.add_return_message("key is not registered, claim is not possible");
            return ReturnCode::UserError;
        }
        if !Self::charge(eei, self.gas_cost.meta_chain_system_scs_cost.claim) {
            return ReturnCode::OutOfGas;
        }
        if data.total_stake_value <= data.locked_stake {
            return ReturnCode::Ok;
        }
        let claimable = data.total_stake_value - data.locked_stake;
        data.total_stake_value = data.locked_stake;
        Self::save_registration_data(eei, caller, &data);
        eei.transfer(caller, &input.recipient_addr, claimable, &[], 0);
        ReturnCode::Ok
    }

    fn add_to_un_jail_funds(eei: &mut dyn SystemEi, value: U256) {
        let current = u256_from_be(&eei.get_storage(UN_JAIL_FUNDS_KEY)).unwrap_or_default();
        let total = current.saturating_add(value);
        eei.set_storage(UN_JAIL_FUNDS_KEY, &u256_to_be(&total));
    }

    /// Before the stake epoch failed keys are reported but the fee is kept
    /// and not booked as unjail funds.
    fn un_jail(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        let refunding = self.is_stake_enabled();
        let keys = &input.arguments;
        if keys.is_empty() {
            eei.add_return_message(if refunding {
                "invalid number of arguments: expected at least 1"
            } else {
                "invalid number of arguments: expected min 1, got 0"
            });
            return ReturnCode::UserError;
        }
        let num_keys = keys.len() as u64;
        let epoch = eei.block_chain_hook().current_epoch();
        let config = self.get_config(eei, epoch);
        let total_price = config.un_jail_price.checked_mul(U256::from(num_keys));
        if total_price != Some(input.call_value) {
            eei.add_return_message(if refunding {
                "wanted exact unjail price * numNodes"
            } else {
                "insufficient funds sent for unJail"
            });
            return ReturnCode::UserError;
        }
        let cost = self.gas_cost.meta_chain_system_scs_cost.un_jail;
        if !Self::charge(eei, cost.saturating_mul(num_keys)) {
            return ReturnCode::OutOfGas;
        }
        let Some(data) = self.registration_data(eei, &input.caller_addr) else {
            return ReturnCode::UserError;
        };
        if let Err(err) = verify_bls_public_keys(&data, keys) {
            eei.add_return_message(&format!("{CANNOT_GET_ALL_BLS_KEYS}{err}"));
            return ReturnCode::UserError;
        }

        let mut transfer_back = U256::zero();
        for key in keys {
            if !self.staking_call_ok(eei, "unJail", &[key]) {
                transfer_back += config.un_jail_price;
                finish_key_status(eei, key, KEY_STATUS_FAILED);
            }
        }
        if !refunding {
            debug!(parent: &self.span, keys = keys.len(), "auction: unjail without refund");
            return ReturnCode::Ok;
        }
        if !transfer_back.is_zero() {
            eei.transfer(&input.caller_addr, &input.recipient_addr, transfer_back, &[], 0);
        }
        Self::add_to_un_jail_funds(eei, input.call_value - transfer_back);
        ReturnCode::Ok
    }

    fn change_reward_address(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        let Some(new_address) = input.arguments.first() else {
            eei.add_return_message("invalid number of arguments: expected min 1, got 0");
            return ReturnCode::UserError;
        };
        let caller = &input.caller_addr;
        if new_address.len() != caller.len() {
            eei.add_return_message("wrong reward address");
            return ReturnCode::UserError;
        }
        let Some(mut data) = self.registration_data(eei, caller) else {
            return ReturnCode::UserError;
        };
        if data.reward_address.is_empty() {
            eei.add_return_message("cannot change reward address, key is not registered");
            return ReturnCode::UserError;
        }
        if data.reward_address == *new_address {
            eei.add_return_message("new reward address is equal with the old reward address");
            return ReturnCode::UserError;
        }
        let cost = self.gas_cost.meta_chain_system_scs_cost.change_reward_address;
        if !Self::charge(eei, cost.saturating_mul(data.bls_pub_keys.len() as u64)) {
            return ReturnCode::OutOfGas;
        }

        data.reward_address.clone_from(new_address);
        Self::save_registration_data(eei, caller, &data);

        let mut args = vec![data.reward_address.as_slice()];
        args.extend(data.bls_pub_keys.iter().map(Vec::as_slice));
        match self.execute_on_staking_sc(eei, "changeRewardAddress", &args) {
            Ok(out) => out.return_code,
            Err(err) => {
                eei.add_return_message(&format!("cannot change reward address: error {err}"));
                ReturnCode::UserError
            }
        }
    }

    fn replace_bls_key(
        &self,
        eei: &mut dyn SystemEi,
        data: &mut AuctionData,
        old_key: &[u8],
        new_key: &[u8],
    ) -> Result<(), AuctionError> {
        let slot = data
            .bls_pub_keys
            .iter()
            .position(|k| k == old_key)
            .ok_or_else(|| AuctionError::BlsKeyMismatch(hex::encode(old_key)))?;
        if !self.staking_call_ok(eei, "changeValidatorKeys", &[old_key, new_key]) {
            return Err(AuctionError::ExecutionAtStaking);
        }
        new_key.clone_into(&mut data.bls_pub_keys[slot]);
        Ok(())
    }

    /// `NumNodes, (OldKey, NewKey, SignedMessage) x NumNodes`
    #[allow(clippy::cast_possible_truncation)]
    fn change_validator_keys(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        let args = &input.arguments;
        if args.len() < MIN_ARGS_TO_CHANGE_VALIDATOR_KEYS {
            eei.add_return_message(&format!(
                "invalid number of arguments: expected min {MIN_ARGS_TO_CHANGE_VALIDATOR_KEYS}, got {}",
                args.len()
            ));
            return ReturnCode::UserError;
        }
        let expected = u64_from_be(&args[0])
            .ok()
            .and_then(|n| n.checked_mul(3)?.checked_add(1).map(|e| (n, e)))
            .filter(|(_, e)| *e <= args.len() as u64);
        let Some((num_nodes, expected)) = expected else {
            eei.add_return_message("invalid number of arguments for the declared number of nodes");
            return ReturnCode::UserError;
        };
        let cost = self.gas_cost.meta_chain_system_scs_cost.change_validator_keys;
        if !Self::charge(eei, cost.saturating_mul(num_nodes)) {
            return ReturnCode::OutOfGas;
        }
        let caller = &input.caller_addr;
        let Some(mut data) = self.registration_data(eei, caller) else {
            return ReturnCode::UserError;
        };
        if data.bls_pub_keys.is_empty() {
            eei.add_return_message("no bls key in storage");
            return ReturnCode::UserError;
        }

        // expected <= args.len() was checked above
        for triple in args[1..expected as usize].chunks_exact(3) {
            let (old_key, new_key, signed) = (&triple[0], &triple[1], &triple[2]);
            if let Err(err) = self.sig_verifier.verify(caller, signed, new_key) {
                eei.add_return_message(&format!("invalid signature: error {err}"));
                return ReturnCode::UserError;
            }
            if let Err(err) = self.replace_bls_key(eei, &mut data, old_key, new_key) {
                eei.add_return_message(&format!("cannot replace bls key: error {err}"));
                return ReturnCode::UserError;
            }
        }
        Self::save_registration_data(eei, caller, &data);
        ReturnCode::Ok
    }

    fn get_total_staked(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !Self::require_zero_value(eei, input) {
            return ReturnCode::UserError;
        }
        if !Self::charge(eei, self.gas_cost.meta_chain_system_scs_cost.get) {
            return ReturnCode::OutOfGas;
        }
        let Some(data) = self.registration_data(eei, &input.caller_addr) else {
            return ReturnCode::UserError;
        };
        if data.reward_address.is_empty() {
            eei.add_return_message("caller not registered in staking/auction sc");
            return ReturnCode::UserError;
        }
        eei.finish(data.total_stake_value.to_string().as_bytes());
        ReturnCode::Ok
    }

    fn get_bls_keys_status(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if input.caller_addr != self.auction_sc_address {
            eei.add_return_message("this is only a view function");
            return ReturnCode::UserError;
        }
        if input.arguments.len() != 1 {
            eei.add_return_message("number of arguments must be equal to 1");
            return ReturnCode::UserError;
        }
        let Some(data) = self.registration_data(eei, &input.arguments[0]) else {
            return ReturnCode::UserError;
        };
        if data.bls_pub_keys.is_empty() {
            eei.add_return_message("no bls keys");
            return ReturnCode::Ok;
        }

        for key in &data.bls_pub_keys {
            let out = match self.execute_on_staking_sc(eei, "getBLSKeyStatus", &[key]) {
                Ok(out) => out,
                Err(err) => {
                    eei.add_return_message(&format!(
                        "cannot get bls key status: bls key - {} error - {err}",
                        hex::encode(key)
                    ));
                    continue;
                }
            };
            if out.return_code != ReturnCode::Ok {
                eei.add_return_message(&format!(
                    "error in getting bls key status: bls key - {}",
                    hex::encode(key)
                ));
                continue;
            }
            let [status] = out.return_data.as_slice() else {
                eei.add_return_message(&format!("cannot get bls key status for key {}", hex::encode(key)));
                continue;
            };
            eei.finish(key);
            eei.finish(status);
        }
        ReturnCode::Ok
    }

    /// Drops repeated keys from the caller's bid.
    fn clean_registered_data(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_double_key_protection_enabled() {
            eei.add_return_message("invalid method to call");
            return ReturnCode::UserError;
        }
        if !Self::charge(eei, self.gas_cost.meta_chain_system_scs_cost.stake) {
            return ReturnCode::OutOfGas;
        }
        if !input.call_value.is_zero() {
            eei.add_return_message("must be called with 0 value");
            return ReturnCode::UserError;
        }
        if !input.arguments.is_empty() {
            eei.add_return_message("must be called with 0 arguments");
            return ReturnCode::UserError;
        }
        let caller = &input.caller_addr;
        let Some(mut data) = self.registration_data(eei, caller) else {
            return ReturnCode::UserError;
        };

        let before = data.bls_pub_keys.len();
        let mut seen = BTreeSet::new();
        data.bls_pub_keys.retain(|k| seen.insert(k.clone()));
        if data.bls_pub_keys.len() != before {
            Self::save_registration_data(eei, caller, &data);
        }
        ReturnCode::Ok
    }
}

impl EpochSubscriber for StakingAuctionSc {
    fn epoch_confirmed(&self, epoch: u32) {
        let stake = epoch >= self.enable_staking_epoch;
        self.flag_stake.store(stake, Ordering::SeqCst);
        debug!(parent: &self.span, enabled = stake, "auction: stake/unstake/unbond");

        let auction = epoch >= self.enable_auction_epoch;
        self.flag_auction.store(auction, Ordering::SeqCst);
        debug!(parent: &self.span, enabled = auction, "auction: selection");

        let double_key = epoch >= self.enable_double_key_epoch;
        self.flag_double_key.store(double_key, Ordering::SeqCst);
        debug!(parent: &self.span, enabled = double_key, "auction: double key protection");
    }
}

impl SystemContract for StakingAuctionSc {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        match input.function.as_str() {
            INIT_FUNCTION_NAME => Self::init(eei, input),
            "stake" => self.stake(eei, input),
            "unStake" => self.un_stake(eei, input),
            "unBond" => self.un_bond(eei, input),
            "claim" => self.claim(eei, input),
            "get" => self.get(eei, input),
            "setConfig" => Self::set_config(eei, input),
            "changeRewardAddress" => self.change_reward_address(eei, input),
            "changeValidatorKeys" => self.change_validator_keys(eei, input),
            "unJail" => self.un_jail(eei, input),
            "getTotalStaked" => self.get_total_staked(eei, input),
            "getBlsKeysStatus" => self.get_bls_keys_status(eei, input),
            "cleanRegisteredData" => self.clean_registered_data(eei, input),
            _ => {
                eei.add_return_message("invalid method to call");
                ReturnCode::UserError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_argument_shape() {
        let one = vec![1u8];
        let k = b"k".to_vec();
        assert_eq!(num_nodes_if_args_correct(&[one.clone(), k.clone(), k.clone()]), Some(1));
        assert_eq!(
            num_nodes_if_args_correct(&[one.clone(), k.clone(), k.clone(), k.clone(), k.clone()]),
            Some(1)
        );
        assert_eq!(
            num_nodes_if_args_correct(&[one.clone(), k.clone(), k.clone(), k.clone(), k.clone(), k.clone()]),
            None
        );
        assert_eq!(num_nodes_if_args_correct(&[one, k]), None);
        assert_eq!(num_nodes_if_args_correct(&[vec![0xff; 8]]), None);
    }

    #[test]
    fn double_keys_are_detected() {
        assert!(!has_double_keys(&[b"a".to_vec(), b"b".to_vec()]));
        assert!(has_double_keys(&[b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]));
    }

    #[test]
    fn key_ownership_check_names_missing_key() {
        let data = AuctionData {
            bls_pub_keys: vec![vec![1], vec![2]],
            ..AuctionData::default()
        };
        assert_eq!(verify_bls_public_keys(&data, &[vec![2]]), Ok(()));
        assert_eq!(
            verify_bls_public_keys(&data, &[vec![1], vec![3]]),
            Err(AuctionError::BlsKeyMismatch("03".into()))
        );
    }
}
