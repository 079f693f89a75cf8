use crate::errors::EeiError;
use crate::hooks::BlockchainHook;
use crate::types::{ContractCallInput, ReturnCode, VmOutput};
use primitive_types::U256;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The sandbox surface a system contract is allowed to touch.
pub trait SystemEi {
    /// Buffered value for the current contract, else the committed one.
    fn get_storage(&self, key: &[u8]) -> Vec<u8>;
    fn set_storage(&mut self, key: &[u8], value: &[u8]);
    fn get_storage_from_address(&self, address: &[u8], key: &[u8]) -> Vec<u8>;
    fn get_balance(&mut self, address: &[u8]) -> U256;
    fn transfer(&mut self, destination: &[u8], sender: &[u8], value: U256, data: &[u8], gas_limit: u64);
    fn execute_on_dest_context(
        &mut self,
        destination: &[u8],
        sender: &[u8],
        value: U256,
        data: &[u8],
    ) -> Result<VmOutput, EeiError>;
    /// Registers the implementation at `base` under `new_address` and runs its
    /// init function with `value` moved from the current contract.
    fn deploy_system_sc(
        &mut self,
        base: &[u8],
        new_address: &[u8],
        owner: &[u8],
        value: U256,
        args: &[Vec<u8>],
    ) -> Result<ReturnCode, EeiError>;
    fn finish(&mut self, value: &[u8]);
    fn add_return_message(&mut self, message: &str);
    fn use_gas(&mut self, gas: u64) -> Result<(), EeiError>;
    fn block_chain_hook(&self) -> &dyn BlockchainHook;
    fn is_validator(&self, bls_key: &[u8]) -> bool;
    fn add_code(&mut self, address: &[u8], code: &[u8]);
    fn create_vm_output(&self) -> VmOutput;
}

pub trait SystemContract: Send + Sync {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Address-keyed registry of system contract implementations.
#[derive(Clone, Default)]
pub struct SystemScContainer {
    contracts: BTreeMap<Vec<u8>, Arc<dyn SystemContract>>,
}

impl SystemScContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &[u8]) -> Result<Arc<dyn SystemContract>, EeiError> {
        self.contracts
            .get(address)
            .cloned()
            .ok_or(EeiError::UnknownSystemSmartContract)
    }

    pub fn add(&mut self, address: &[u8], contract: Arc<dyn SystemContract>) -> Result<(), EeiError> {
        if self.contracts.contains_key(address) {
            return Err(EeiError::ContractAlreadyRegistered);
        }
        self.contracts.insert(address.to_vec(), contract);
        Ok(())
    }

    pub fn replace(&mut self, address: &[u8], contract: Arc<dyn SystemContract>) {
        self.contracts.insert(address.to_vec(), contract);
    }

    pub fn remove(&mut self, address: &[u8]) {
        self.contracts.remove(address);
    }

    #[must_use]
    pub fn contains(&self, address: &[u8]) -> bool {
        self.contracts.contains_key(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.contracts.keys().map(Vec::as_slice)
    }
}

impl core::fmt::Debug for SystemScContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.contracts.keys().map(hex::encode))
            .finish()
    }
}
