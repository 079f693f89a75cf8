//! Node configuration consumed by the system contracts.
//!
//! Amounts are decimal strings so that values above `u64::MAX` survive any
//! text format the host loads them from.

use crate::errors::ConfigError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StakingSystemScConfig {
    pub genesis_node_price: String,
    pub min_stake_value: String,
    pub min_step_value: String,
    pub un_jail_value: String,
    pub unbond_period: u64,
    pub stake_enable_epoch: u32,
    pub auction_enable_epoch: u32,
    pub double_key_protection_enable_epoch: u32,
    pub num_rounds_without_bleed: u64,
    pub bleed_percentage_per_round: f64,
    pub maximum_percentage_to_bleed: f64,
    pub min_num_nodes: u32,
}

impl Default for StakingSystemScConfig {
    fn default() -> Self {
        Self {
            genesis_node_price: "2500000000000000000000".into(),
            min_stake_value: "1".into(),
            min_step_value: "100000000000000000000".into(),
            un_jail_value: "2500000000000000000".into(),
            unbond_period: 250_000,
            stake_enable_epoch: 0,
            auction_enable_epoch: 0,
            double_key_protection_enable_epoch: 0,
            num_rounds_without_bleed: 100,
            bleed_percentage_per_round: 0.000_01,
            maximum_percentage_to_bleed: 0.5,
            min_num_nodes: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DelegationManagerScConfig {
    pub base_issuing_cost: String,
    pub min_creation_deposit: String,
    pub enabled_epoch: u32,
}

impl Default for DelegationManagerScConfig {
    fn default() -> Self {
        Self {
            base_issuing_cost: "0".into(),
            min_creation_deposit: "1250000000000000000000".into(),
            enabled_epoch: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaChainSystemScsCost {
    pub stake: u64,
    pub un_stake: u64,
    pub un_bond: u64,
    pub claim: u64,
    pub get: u64,
    pub change_reward_address: u64,
    pub change_validator_keys: u64,
    pub un_jail: u64,
    pub delegation_mgr_ops: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GasCost {
    pub meta_chain_system_scs_cost: MetaChainSystemScsCost,
}

/// Parse a decimal amount, rejecting garbage and values wider than 256 bits.
pub fn parse_amount(field: &'static str, value: &str) -> Result<U256, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::Decimal {
            field,
            value: value.to_owned(),
        });
    }
    U256::from_dec_str(trimmed).map_err(|_| ConfigError::OutOfRange { field })
}

/// Like [`parse_amount`] but zero is rejected.
pub fn parse_positive_amount(field: &'static str, value: &str) -> Result<U256, ConfigError> {
    let v = parse_amount(field, value)?;
    if v.is_zero() {
        return Err(ConfigError::NotPositive { field });
    }
    Ok(v)
}
