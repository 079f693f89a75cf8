//! Storage records of the staking registry.

use primitive_types::U256;
use sysvm_primitives::{CodecError, Reader, Writer};

/// State of one validator key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakedData {
    pub register_nonce: u64,
    pub staked: bool,
    pub un_staked_nonce: u64,
    pub un_staked_epoch: u32,
    pub reward_address: Vec<u8>,
    pub stake_value: U256,
    pub jailed_round: u64,
    pub jailed_nonce: u64,
    pub un_jailed_nonce: u64,
    pub slash_value: U256,
}

impl Default for StakedData {
    fn default() -> Self {
        Self {
            register_nonce: 0,
            staked: false,
            un_staked_nonce: 0,
            un_staked_epoch: 0,
            reward_address: Vec::new(),
            stake_value: U256::zero(),
            jailed_round: u64::MAX,
            jailed_nonce: 0,
            un_jailed_nonce: 0,
            slash_value: U256::zero(),
        }
    }
}

impl StakedData {
    /// A key is registered once it carries a reward address.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !self.reward_address.is_empty()
    }

    #[must_use]
    pub const fn is_jailed(&self) -> bool {
        self.jailed_round != u64::MAX
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .u64(self.register_nonce)
            .bool(self.staked)
            .u64(self.un_staked_nonce)
            .u32(self.un_staked_epoch)
            .bytes(&self.reward_address)
            .big(&self.stake_value)
            .u64(self.jailed_round)
            .u64(self.jailed_nonce)
            .u64(self.un_jailed_nonce)
            .big(&self.slash_value)
            .finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let d = Self {
            register_nonce: r.u64()?,
            staked: r.bool()?,
            un_staked_nonce: r.u64()?,
            un_staked_epoch: r.u32()?,
            reward_address: r.bytes()?,
            stake_value: r.big()?,
            jailed_round: r.u64()?,
            jailed_nonce: r.u64()?,
            un_jailed_nonce: r.u64()?,
            slash_value: r.big()?,
        };
        r.finish()?;
        Ok(d)
    }
}

/// Global validator-slot counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StakingNodesConfig {
    pub min_num_nodes: i64,
    pub staked_nodes: i64,
    pub jailed_nodes: i64,
}

impl StakingNodesConfig {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .i64(self.min_num_nodes)
            .i64(self.staked_nodes)
            .i64(self.jailed_nodes)
            .finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let c = Self {
            min_num_nodes: r.i64()?,
            staked_nodes: r.i64()?,
            jailed_nodes: r.i64()?,
        };
        r.finish()?;
        Ok(c)
    }

    /// Keys that may leave without breaching the minimum validator count.
    #[must_use]
    pub const fn num_spare_nodes(&self) -> i64 {
        self.staked_nodes - self.jailed_nodes - self.min_num_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staked_data_field_order_is_stable() {
        let d = StakedData {
            register_nonce: 1,
            staked: true,
            un_staked_nonce: 2,
            un_staked_epoch: 3,
            reward_address: vec![0xaa],
            stake_value: U256::from(0x0102u64),
            jailed_round: u64::MAX,
            jailed_nonce: 4,
            un_jailed_nonce: 5,
            slash_value: U256::zero(),
        };
        let enc = d.encode();
        assert_eq!(&enc[..8], &1u64.to_le_bytes());
        assert_eq!(enc[8], 1);
        assert_eq!(StakedData::decode(&enc).unwrap(), d);
        let mut trailing = enc;
        trailing.push(0);
        assert_eq!(StakedData::decode(&trailing), Err(CodecError::Trailing));
    }

    #[test]
    fn fresh_record_is_unregistered_and_free() {
        let d = StakedData::default();
        assert!(!d.is_registered());
        assert!(!d.is_jailed());
    }

    #[test]
    fn spare_nodes_can_go_negative() {
        let c = StakingNodesConfig {
            min_num_nodes: 3,
            staked_nodes: 2,
            jailed_nodes: 1,
        };
        assert_eq!(c.num_spare_nodes(), -2);
        assert_eq!(StakingNodesConfig::decode(&c.encode()).unwrap(), c);
    }
}
