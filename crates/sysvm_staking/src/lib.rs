#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Staking registry system contract.
//!
//! Tracks every validator key through
//! `Unregistered -> Registered -> Staked <-> Jailed -> Unstaked -> removed`
//! and keeps the global staked/jailed counters that gate leaving the set.
//! Lifecycle calls are accepted only from the trusted auction address;
//! jailing only from the jail-access address.

pub mod data;

pub use data::{StakedData, StakingNodesConfig};

use primitive_types::U256;
use sysvm_eei::{ContractCallInput, ReturnCode, SystemContract, SystemEi};
use sysvm_primitives::constants::INIT_FUNCTION_NAME;
use sysvm_primitives::{percentage_of, u256_from_be, u256_to_be, u64_to_be, CodecError};
use thiserror::Error;
use tracing::{debug, warn, Span};

pub const OWNER_KEY: &[u8] = b"owner";
pub const NODES_CONFIG_KEY: &[u8] = b"nodesConfig";

pub const STATUS_JAILED: &[u8] = b"jailed";
pub const STATUS_STAKED: &[u8] = b"staked";
pub const STATUS_UNSTAKED: &[u8] = b"unStaked";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StakingError {
    #[error("minimum stake value must be positive")]
    NonPositiveMinStake,
    #[error("invalid staking access address")]
    InvalidStakingAccessAddress,
    #[error("invalid jail access address")]
    InvalidJailAccessAddress,
    #[error("invalid bleed percentage {0}")]
    InvalidBleedPercentage(f64),
    #[error("stored data: {0}")]
    Codec(#[from] CodecError),
}

pub struct ArgsNewStakingSmartContract {
    pub min_num_nodes: u32,
    pub min_stake_value: U256,
    pub unbond_period: u64,
    pub staking_access_addr: Vec<u8>,
    pub jail_access_addr: Vec<u8>,
    pub num_rounds_without_bleed: u64,
    pub bleed_percentage_per_round: f64,
    pub maximum_percentage_to_bleed: f64,
    pub span: Span,
}

pub struct StakingSc {
    min_stake_value: U256,
    unbond_period: u64,
    stake_access_addr: Vec<u8>,
    jail_access_addr: Vec<u8>,
    num_rounds_without_bleed: u64,
    bleed_percentage_per_round: f64,
    maximum_percentage_to_bleed: f64,
    min_num_nodes: i64,
    span: Span,
}

fn epoch_key(epoch: u32) -> Vec<u8> {
    format!("epoch_{epoch}").into_bytes()
}

fn valid_percentage(p: f64) -> bool {
    p.is_finite() && p >= 0.0
}

impl StakingSc {
    pub fn new(args: ArgsNewStakingSmartContract) -> Result<Self, StakingError> {
        if args.min_stake_value.is_zero() {
            return Err(StakingError::NonPositiveMinStake);
        }
        if args.staking_access_addr.is_empty() {
            return Err(StakingError::InvalidStakingAccessAddress);
        }
        if args.jail_access_addr.is_empty() {
            return Err(StakingError::InvalidJailAccessAddress);
        }
        for p in [args.bleed_percentage_per_round, args.maximum_percentage_to_bleed] {
            if !valid_percentage(p) {
                return Err(StakingError::InvalidBleedPercentage(p));
            }
        }
        Ok(Self {
            min_stake_value: args.min_stake_value,
            unbond_period: args.unbond_period,
            stake_access_addr: args.staking_access_addr,
            jail_access_addr: args.jail_access_addr,
            num_rounds_without_bleed: args.num_rounds_without_bleed,
            bleed_percentage_per_round: args.bleed_percentage_per_round,
            maximum_percentage_to_bleed: args.maximum_percentage_to_bleed,
            min_num_nodes: i64::from(args.min_num_nodes),
            span: args.span,
        })
    }

    /// Stake left after bleeding a key jailed at `start_round` until `end_round`.
    ///
    /// No penalty inside the grace window; past it the penalty grows linearly
    /// per round up to the configured maximum and never drives stake below zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn calculate_stake_after_bleed(&self, start_round: u64, end_round: u64, stake: &U256) -> U256 {
        if start_round > end_round || end_round - start_round < self.num_rounds_without_bleed {
            return *stake;
        }
        let rounds_to_bleed = end_round - start_round - self.num_rounds_without_bleed;
        let pct = (rounds_to_bleed as f64 * self.bleed_percentage_per_round)
            .min(self.maximum_percentage_to_bleed);
        stake.saturating_sub(percentage_of(stake, pct))
    }

    fn is_stake_access(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> bool {
        if input.caller_addr == self.stake_access_addr {
            return true;
        }
        debug!(parent: &self.span, function = %input.function, caller = %hex::encode(&input.caller_addr), "caller not allowed");
        eei.add_return_message(&format!("{} function not allowed to be called by this address", input.function));
        false
    }

    fn get_config(&self, eei: &dyn SystemEi) -> StakingNodesConfig {
        let base = StakingNodesConfig {
            min_num_nodes: self.min_num_nodes,
            ..StakingNodesConfig::default()
        };
        let data = eei.get_storage(NODES_CONFIG_KEY);
        if data.is_empty() {
            return base;
        }
        StakingNodesConfig::decode(&data).unwrap_or_else(|err| {
            warn!(parent: &self.span, %err, "undecodable nodes config, using base");
            base
        })
    }

    fn update_config(&self, eei: &mut dyn SystemEi, f: impl FnOnce(&mut StakingNodesConfig)) {
        let mut config = self.get_config(eei);
        f(&mut config);
        eei.set_storage(NODES_CONFIG_KEY, &config.encode());
    }

    fn get_or_create_registered_data(
        &self,
        eei: &dyn SystemEi,
        key: &[u8],
    ) -> Result<StakedData, StakingError> {
        let data = eei.get_storage(key);
        if data.is_empty() {
            return Ok(StakedData::default());
        }
        StakedData::decode(&data).map_err(|err| {
            debug!(parent: &self.span, %err, "undecodable staked data");
            StakingError::from(err)
        })
    }

    /// Loads a registered key or reports why it cannot be used.
    fn registered(&self, eei: &mut dyn SystemEi, key: &[u8]) -> Option<StakedData> {
        match self.get_or_create_registered_data(eei, key) {
            Ok(d) if d.is_registered() => Some(d),
            Ok(_) => {
                eei.add_return_message("key is not registered");
                None
            }
            Err(err) => {
                eei.add_return_message(&err.to_string());
                None
            }
        }
    }

    fn stake_value_for_current_epoch(&self, eei: &dyn SystemEi) -> U256 {
        let key = epoch_key(eei.block_chain_hook().current_epoch());
        let stored = u256_from_be(&eei.get_storage(&key)).unwrap_or_default();
        stored.max(self.min_stake_value)
    }

    fn init(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !eei.get_storage(OWNER_KEY).is_empty() {
            eei.add_return_message("smart contract was already initialized");
            return ReturnCode::UserError;
        }
        eei.set_storage(OWNER_KEY, &input.caller_addr);
        let key = epoch_key(eei.block_chain_hook().current_epoch());
        eei.set_storage(&key, &u256_to_be(&self.min_stake_value));
        let config = StakingNodesConfig {
            min_num_nodes: self.min_num_nodes,
            ..StakingNodesConfig::default()
        };
        eei.set_storage(NODES_CONFIG_KEY, &config.encode());
        ReturnCode::Ok
    }

    fn set_stake_value_for_current_epoch(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        let Some(arg) = input.arguments.first() else {
            eei.add_return_message("missing stake value argument");
            return ReturnCode::UserError;
        };
        let Ok(value) = u256_from_be(arg) else {
            eei.add_return_message("stake value does not fit in 256 bits");
            return ReturnCode::UserError;
        };
        let key = epoch_key(eei.block_chain_hook().current_epoch());
        eei.set_storage(&key, &u256_to_be(&value.max(self.min_stake_value)));
        ReturnCode::Ok
    }

    fn stake(&self, eei: &mut dyn SystemEi, input: &ContractCallInput, only_register: bool) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        if input.arguments.len() < 2 {
            eei.add_return_message("not enough arguments, needed BLS key and reward address");
            return ReturnCode::UserError;
        }
        let key = &input.arguments[0];
        let stake_value = self.stake_value_for_current_epoch(eei);
        let mut data = match self.get_or_create_registered_data(eei, key) {
            Ok(d) => d,
            Err(err) => {
                eei.add_return_message(&err.to_string());
                return ReturnCode::UserError;
            }
        };
        data.stake_value = data.stake_value.max(stake_value);

        if !only_register && !data.staked {
            let jailed = data.is_jailed();
            self.update_config(eei, |c| {
                c.staked_nodes += 1;
                if jailed {
                    c.jailed_nodes += 1;
                }
            });
            data.staked = true;
        }
        data.register_nonce = eei.block_chain_hook().current_nonce();
        data.reward_address.clone_from(&input.arguments[1]);
        eei.set_storage(key, &data.encode());
        ReturnCode::Ok
    }

    fn un_stake(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        if input.arguments.len() < 2 {
            eei.add_return_message("not enough arguments, needed BLS key and reward address");
            return ReturnCode::UserError;
        }
        let key = &input.arguments[0];
        let Some(mut data) = self.registered(eei, key) else {
            return ReturnCode::UserError;
        };
        if input.arguments[1] != data.reward_address {
            eei.add_return_message("unStake possible only from staker");
            return ReturnCode::UserError;
        }
        if !data.staked {
            eei.add_return_message("unStake is not possible for key which is already unStaked");
            return ReturnCode::UserError;
        }
        if data.is_jailed() {
            eei.add_return_message("unStake is not possible for jailed nodes");
            return ReturnCode::UserError;
        }
        if self.get_config(eei).num_spare_nodes() <= 0 {
            eei.add_return_message("unStake is not possible as too many left");
            return ReturnCode::UserError;
        }

        self.update_config(eei, |c| c.staked_nodes = (c.staked_nodes - 1).max(0));
        let hook = eei.block_chain_hook();
        data.staked = false;
        data.un_staked_epoch = hook.current_epoch();
        data.un_staked_nonce = hook.current_nonce();
        eei.set_storage(key, &data.encode());
        ReturnCode::Ok
    }

    fn un_bond(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        let Some(key) = input.arguments.first() else {
            eei.add_return_message("not enough arguments, needed BLS key");
            return ReturnCode::UserError;
        };
        let Some(data) = self.registered(eei, key) else {
            return ReturnCode::UserError;
        };
        if data.staked || data.un_staked_nonce <= data.register_nonce {
            eei.add_return_message("unBond is not possible for key which is staked or is not in unBond period");
            return ReturnCode::UserError;
        }
        let current_nonce = eei.block_chain_hook().current_nonce();
        if current_nonce.saturating_sub(data.un_staked_nonce) < self.unbond_period {
            eei.add_return_message("unBond is not possible for key because unBond period did not pass");
            return ReturnCode::UserError;
        }
        if data.is_jailed() {
            eei.add_return_message("unBond is not possible for jailed nodes");
            return ReturnCode::UserError;
        }
        if self.get_config(eei).num_spare_nodes() < 0 || eei.is_validator(key) {
            eei.add_return_message("unBond is not possible as not enough left");
            return ReturnCode::UserError;
        }

        eei.set_storage(key, &[]);
        eei.finish(&u256_to_be(&data.stake_value));
        eei.finish(&u64_to_be(u64::from(data.un_staked_epoch)));
        ReturnCode::Ok
    }

    fn jail(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if input.caller_addr != self.jail_access_addr {
            debug!(parent: &self.span, "jail called by non jail-access address");
            eei.add_return_message("jail function not allowed to be called by this address");
            return ReturnCode::UserError;
        }
        for key in &input.arguments {
            let Some(mut data) = self.registered(eei, key) else {
                return ReturnCode::UserError;
            };
            if data.staked && !data.is_jailed() {
                self.update_config(eei, |c| c.jailed_nodes += 1);
            }
            let hook = eei.block_chain_hook();
            data.jailed_round = hook.current_round();
            data.jailed_nonce = hook.current_nonce();
            eei.set_storage(key, &data.encode());
        }
        ReturnCode::Ok
    }

    fn un_jail(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        for key in &input.arguments {
            let Some(mut data) = self.registered(eei, key) else {
                return ReturnCode::UserError;
            };
            if !data.is_jailed() {
                eei.add_return_message("key is not jailed");
                return ReturnCode::UserError;
            }
            if data.staked {
                self.update_config(eei, |c| c.jailed_nodes = (c.jailed_nodes - 1).max(0));
            }
            let hook = eei.block_chain_hook();
            data.stake_value =
                self.calculate_stake_after_bleed(data.jailed_round, hook.current_round(), &data.stake_value);
            data.jailed_round = u64::MAX;
            data.un_jailed_nonce = hook.current_nonce();
            eei.set_storage(key, &data.encode());
        }
        ReturnCode::Ok
    }

    fn slash(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if eei.get_storage(OWNER_KEY) != input.caller_addr {
            eei.add_return_message("slash function called by not the owners address");
            return ReturnCode::UserError;
        }
        if input.arguments.len() != 2 {
            eei.add_return_message("slash function called by wrong number of arguments");
            return ReturnCode::UserError;
        }
        let key = &input.arguments[0];
        let Some(mut data) = self.registered(eei, key) else {
            return ReturnCode::UserError;
        };
        if !data.staked {
            eei.add_return_message("cannot slash already unstaked or user not staked");
            return ReturnCode::UserError;
        }
        let Ok(amount) = u256_from_be(&input.arguments[1]) else {
            eei.add_return_message("slash value does not fit in 256 bits");
            return ReturnCode::UserError;
        };
        if !data.is_jailed() {
            self.update_config(eei, |c| c.jailed_nodes += 1);
        }
        let taken = amount.min(data.stake_value);
        data.stake_value -= taken;
        data.slash_value = data.slash_value.saturating_add(taken);
        let hook = eei.block_chain_hook();
        data.jailed_round = hook.current_round();
        data.jailed_nonce = hook.current_nonce();
        eei.set_storage(key, &data.encode());
        ReturnCode::Ok
    }

    fn get(eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        let Some(key) = input.arguments.first() else {
            eei.add_return_message("missing key argument");
            return ReturnCode::UserError;
        };
        let value = eei.get_storage(key);
        eei.finish(&value);
        ReturnCode::Ok
    }

    fn is_staked(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        let Some(key) = input.arguments.first() else {
            eei.add_return_message("missing key argument");
            return ReturnCode::UserError;
        };
        match self.registered(eei, key) {
            Some(d) if d.staked => ReturnCode::Ok,
            _ => ReturnCode::UserError,
        }
    }

    fn get_bls_key_status(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        if input.arguments.len() != 1 {
            eei.add_return_message("number of arguments must be equal to 1");
            return ReturnCode::UserError;
        }
        let Some(data) = self.registered(eei, &input.arguments[0]) else {
            return ReturnCode::UserError;
        };
        let status = if data.is_jailed() {
            STATUS_JAILED
        } else if data.staked {
            STATUS_STAKED
        } else {
            STATUS_UNSTAKED
        };
        eei.finish(status);
        ReturnCode::Ok
    }

    fn change_reward_address(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        if input.arguments.len() < 2 {
            eei.add_return_message("not enough arguments, needed reward address and BLS keys");
            return ReturnCode::UserError;
        }
        let new_address = &input.arguments[0];
        if new_address.len() != input.caller_addr.len() {
            eei.add_return_message("wrong reward address length");
            return ReturnCode::UserError;
        }
        for key in &input.arguments[1..] {
            let mut data = match self.get_or_create_registered_data(eei, key) {
                Ok(d) => d,
                Err(err) => {
                    eei.add_return_message(&err.to_string());
                    return ReturnCode::UserError;
                }
            };
            if !data.is_registered() {
                continue;
            }
            data.reward_address.clone_from(new_address);
            eei.set_storage(key, &data.encode());
        }
        ReturnCode::Ok
    }

    fn change_validator_key(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_stake_access(eei, input) {
            return ReturnCode::UserError;
        }
        if input.arguments.len() < 2 {
            eei.add_return_message("not enough arguments, needed old and new BLS key");
            return ReturnCode::UserError;
        }
        let (old_key, new_key) = (&input.arguments[0], &input.arguments[1]);
        if old_key.len() != new_key.len() {
            eei.add_return_message("old and new BLS keys differ in length");
            return ReturnCode::UserError;
        }
        let data = match self.get_or_create_registered_data(eei, old_key) {
            Ok(d) => d,
            Err(err) => {
                eei.add_return_message(&err.to_string());
                return ReturnCode::UserError;
            }
        };
        if !data.is_registered() {
            return ReturnCode::Ok;
        }
        if !eei.get_storage(new_key).is_empty() {
            eei.add_return_message("new BLS key is already registered");
            return ReturnCode::UserError;
        }
        eei.set_storage(old_key, &[]);
        eei.set_storage(new_key, &data.encode());
        ReturnCode::Ok
    }
}

impl SystemContract for StakingSc {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        match input.function.as_str() {
            INIT_FUNCTION_NAME => self.init(eei, input),
            "stake" => self.stake(eei, input, false),
            "register" => self.stake(eei, input, true),
            "unStake" => self.un_stake(eei, input),
            "unBond" => self.un_bond(eei, input),
            "slash" => self.slash(eei, input),
            "get" => Self::get(eei, input),
            "isStaked" => self.is_staked(eei, input),
            "setStakeValue" => self.set_stake_value_for_current_epoch(eei, input),
            "jail" => self.jail(eei, input),
            "unJail" => self.un_jail(eei, input),
            "changeRewardAddress" => self.change_reward_address(eei, input),
            "changeValidatorKeys" => self.change_validator_key(eei, input),
            "getBLSKeyStatus" => self.get_bls_key_status(eei, input),
            _ => {
                eei.add_return_message("invalid method to call");
                ReturnCode::UserError
            }
        }
    }
}
