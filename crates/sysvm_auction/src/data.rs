//! Storage records of the auction engine.

use crate::AuctionError;
use primitive_types::U256;
use sysvm_primitives::{CodecError, Reader, Writer};

/// An owner's aggregate bid, stored under the owner address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuctionData {
    pub register_nonce: u64,
    pub epoch: u32,
    pub reward_address: Vec<u8>,
    pub total_stake_value: U256,
    pub locked_stake: U256,
    pub max_stake_per_node: U256,
    pub bls_pub_keys: Vec<Vec<u8>>,
    pub num_registered: u32,
}

impl AuctionData {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .u64(self.register_nonce)
            .u32(self.epoch)
            .bytes(&self.reward_address)
            .big(&self.total_stake_value)
            .big(&self.locked_stake)
            .big(&self.max_stake_per_node)
            .list(&self.bls_pub_keys)
            .u32(self.num_registered)
            .finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let d = Self {
            register_nonce: r.u64()?,
            epoch: r.u32()?,
            reward_address: r.bytes()?,
            total_stake_value: r.big()?,
            locked_stake: r.big()?,
            max_stake_per_node: r.big()?,
            bls_pub_keys: r.list()?,
            num_registered: r.u32()?,
        };
        r.finish()?;
        Ok(d)
    }

    #[must_use]
    pub fn has_key(&self, key: &[u8]) -> bool {
        self.bls_pub_keys.iter().any(|k| k == key)
    }
}

/// Economic parameters of one epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionConfig {
    pub num_nodes: u32,
    pub min_stake_value: U256,
    pub total_supply: U256,
    pub min_step: U256,
    pub node_price: U256,
    pub un_jail_price: U256,
}

impl AuctionConfig {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .u32(self.num_nodes)
            .big(&self.min_stake_value)
            .big(&self.total_supply)
            .big(&self.min_step)
            .big(&self.node_price)
            .big(&self.un_jail_price)
            .finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let c = Self {
            num_nodes: r.u32()?,
            min_stake_value: r.big()?,
            total_supply: r.big()?,
            min_step: r.big()?,
            node_price: r.big()?,
            un_jail_price: r.big()?,
        };
        r.finish()?;
        Ok(c)
    }

    /// Every amount must be positive and at least one node selected.
    pub fn validate(&self) -> Result<(), AuctionError> {
        if self.min_stake_value.is_zero() {
            return Err(AuctionError::InvalidMinStakeValue);
        }
        if self.num_nodes < 1 {
            return Err(AuctionError::InvalidNumNodes(u64::from(self.num_nodes)));
        }
        if self.total_supply.is_zero() {
            return Err(AuctionError::InvalidGenesisTotalSupply);
        }
        if self.min_step.is_zero() {
            return Err(AuctionError::InvalidMinStepValue);
        }
        if self.node_price.is_zero() {
            return Err(AuctionError::InvalidNodePrice);
        }
        if self.un_jail_price.is_zero() {
            return Err(AuctionError::InvalidUnJailCost);
        }
        Ok(())
    }
}
