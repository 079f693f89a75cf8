//! Storage records of the delegation manager.

use primitive_types::U256;
use sysvm_primitives::{CodecError, Reader, Writer};

/// Global state of the delegation factory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegationManagement {
    pub number_of_contract: u32,
    pub last_address: Vec<u8>,
    pub min_service_fee: u64,
    pub max_service_fee: u64,
    pub base_issuing_cost: U256,
    pub min_deposit: U256,
}

impl DelegationManagement {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Writer::new()
            .u32(self.number_of_contract)
            .bytes(&self.last_address)
            .u64(self.min_service_fee)
            .u64(self.max_service_fee)
            .big(&self.base_issuing_cost)
            .big(&self.min_deposit)
            .finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let d = Self {
            number_of_contract: r.u32()?,
            last_address: r.bytes()?,
            min_service_fee: r.u64()?,
            max_service_fee: r.u64()?,
            base_issuing_cost: r.big()?,
            min_deposit: r.big()?,
        };
        r.finish()?;
        Ok(d)
    }
}

/// Addresses of every deployed delegation contract, in deployment order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DelegationContractList {
    pub addresses: Vec<Vec<u8>>,
}

impl DelegationContractList {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Writer::new().list(&self.addresses).finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let addresses = r.list()?;
        r.finish()?;
        Ok(Self { addresses })
    }
}

/// Address following `last` when read as a big-endian counter.
///
/// `None` once every byte is `0xff`.
#[must_use]
pub fn next_delegation_address(last: &[u8]) -> Option<Vec<u8>> {
    let mut next = last.to_vec();
    for byte in next.iter_mut().rev() {
        if *byte < u8::MAX {
            *byte += 1;
            return Some(next);
        }
        *byte = 0;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn management_record_survives_storage() {
        let d = DelegationManagement {
            number_of_contract: 3,
            last_address: vec![0, 1, 2],
            min_service_fee: 0,
            max_service_fee: u64::MAX,
            base_issuing_cost: U256::from(7u64),
            min_deposit: U256::exp10(21),
        };
        assert_eq!(DelegationManagement::decode(&d.encode()), Ok(d.clone()));
        let mut long = d.encode();
        long.push(0);
        assert_eq!(DelegationManagement::decode(&long), Err(CodecError::Trailing));
        assert!(DelegationManagement::decode(&d.encode()[..5]).is_err());
    }

    #[test]
    fn empty_contract_list_is_not_empty_storage() {
        let list = DelegationContractList::default();
        let raw = list.encode();
        assert!(!raw.is_empty());
        assert_eq!(DelegationContractList::decode(&raw), Ok(list));
    }

    #[test]
    fn addresses_count_up_with_carry() {
        assert_eq!(next_delegation_address(&[0, 1, 0]), Some(vec![0, 1, 1]));
        assert_eq!(next_delegation_address(&[0, 1, 0xff]), Some(vec![0, 2, 0]));
        assert_eq!(next_delegation_address(&[0xff, 0xff]), None);
        assert_eq!(next_delegation_address(&[]), None);
    }

    proptest! {
        #[test]
        fn next_address_is_the_successor(n in 0u64..u64::MAX) {
            let next = next_delegation_address(&n.to_be_bytes()).unwrap();
            prop_assert_eq!(next, (n + 1).to_be_bytes().to_vec());
        }
    }
}
