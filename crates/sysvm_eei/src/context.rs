//! The EEI: per-call storage/balance/gas ledger with nested-call dispatch.
//!
//! One ledger is shared by the whole call tree. A nested call swaps out the
//! caller's return data, return message and active address, runs the callee
//! against the same storage and balance buffers and restores the caller's
//! frame afterwards, appending the callee's messages. Storage writes of the
//! callee are kept whatever its return code; the top-level runner decides
//! whether anything leaves the sandbox.

use crate::contract::{SystemContract, SystemEi, SystemScContainer};
use crate::errors::EeiError;
use crate::hooks::{BlockchainHook, PeerList, ValidatorAccounts};
use crate::parser::parse_call_data;
use crate::types::{ContractCallInput, OutputAccount, ReturnCode, StorageUpdate, VmOutput};
use primitive_types::U256;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use sysvm_primitives::constants::{INIT_FUNCTION_NAME, RETURN_MESSAGE_SEPARATOR};
use sysvm_primitives::BalanceDelta;
use tracing::{debug, Span};

#[derive(Clone, Debug, Default)]
struct LedgerAccount {
    committed: Option<U256>,
    delta: BalanceDelta,
    code: Vec<u8>,
    data: Vec<u8>,
    gas_limit: u64,
}

pub struct ArgsVmContext {
    pub blockchain_hook: Arc<dyn BlockchainHook>,
    pub validator_accounts: Arc<dyn ValidatorAccounts>,
    pub span: Span,
}

pub struct VmContext {
    blockchain_hook: Arc<dyn BlockchainHook>,
    validator_accounts: Arc<dyn ValidatorAccounts>,
    system_contracts: SystemScContainer,
    sc_address: Vec<u8>,

    storage_update: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
    output_accounts: BTreeMap<Vec<u8>, LedgerAccount>,
    gas_remaining: u64,
    return_message: String,
    output: Vec<Vec<u8>>,
    deployed: Vec<Vec<u8>>,
    span: Span,
}

impl VmContext {
    #[must_use]
    pub fn new(args: ArgsVmContext) -> Self {
        Self {
            blockchain_hook: args.blockchain_hook,
            validator_accounts: args.validator_accounts,
            system_contracts: SystemScContainer::new(),
            sc_address: Vec::new(),
            storage_update: BTreeMap::new(),
            output_accounts: BTreeMap::new(),
            gas_remaining: 0,
            return_message: String::new(),
            output: Vec::new(),
            deployed: Vec::new(),
            span: args.span,
        }
    }

    pub fn set_system_sc_container(&mut self, container: SystemScContainer) {
        self.system_contracts = container;
    }

    #[must_use]
    pub const fn system_contracts(&self) -> &SystemScContainer {
        &self.system_contracts
    }

    pub fn system_contracts_mut(&mut self) -> &mut SystemScContainer {
        &mut self.system_contracts
    }

    /// Drops every buffered change; called at the start of each top-level call.
    pub fn clean_cache(&mut self) {
        self.storage_update.clear();
        self.output_accounts.clear();
        self.output.clear();
        self.return_message.clear();
        self.gas_remaining = 0;
        self.deployed.clear();
    }

    pub fn set_gas_provided(&mut self, gas: u64) {
        self.gas_remaining = gas;
    }

    #[must_use]
    pub const fn gas_remaining(&self) -> u64 {
        self.gas_remaining
    }

    pub fn set_sc_address(&mut self, address: &[u8]) {
        self.sc_address = address.to_vec();
    }

    #[must_use]
    pub fn sc_address(&self) -> &[u8] {
        &self.sc_address
    }

    #[must_use]
    pub fn return_message(&self) -> &str {
        &self.return_message
    }

    /// Credits the top-level call value to the called contract.
    pub fn add_tx_value_to_smart_contract(&mut self, value: U256, address: &[u8]) {
        self.account_mut(address).delta.add(value);
    }

    /// Unregisters contracts deployed during the current top-level call.
    pub fn rollback_deployments(&mut self) {
        for address in mem::take(&mut self.deployed) {
            debug!(parent: &self.span, address = %hex::encode(&address), "rolling back deployment");
            self.system_contracts.remove(&address);
        }
    }

    fn account_mut(&mut self, address: &[u8]) -> &mut LedgerAccount {
        self.output_accounts.entry(address.to_vec()).or_default()
    }

    fn create_contract_call_input(
        destination: &[u8],
        sender: &[u8],
        value: U256,
        data: &[u8],
    ) -> Result<ContractCallInput, EeiError> {
        let parsed = parse_call_data(data)?;
        Ok(ContractCallInput {
            caller_addr: sender.to_vec(),
            recipient_addr: destination.to_vec(),
            call_value: value,
            function: parsed.function,
            arguments: parsed.arguments,
            gas_provided: 0,
        })
    }

    /// Runs `input` as a nested frame on `contract`, returning the callee's
    /// output and restoring the caller's frame.
    fn run_nested(&mut self, contract: &Arc<dyn SystemContract>, input: &ContractCallInput, allow_init: bool) -> VmOutput {
        let saved_output = mem::take(&mut self.output);
        let saved_message = mem::take(&mut self.return_message);
        let saved_address = mem::replace(&mut self.sc_address, input.recipient_addr.clone());

        let return_code = if !allow_init && input.function == INIT_FUNCTION_NAME {
            self.add_return_message("cannot call smart contract init function");
            ReturnCode::UserError
        } else {
            contract.execute(self, input)
        };

        let mut vm_output = if return_code == ReturnCode::Ok {
            self.create_vm_output()
        } else {
            VmOutput::default()
        };
        vm_output.return_code = return_code;
        vm_output.return_message.clone_from(&self.return_message);

        self.output = saved_output;
        self.sc_address = saved_address;
        let nested_message = mem::replace(&mut self.return_message, saved_message);
        if !nested_message.is_empty() {
            self.add_return_message(&nested_message);
        }
        vm_output
    }
}

impl SystemEi for VmContext {
    fn get_storage(&self, key: &[u8]) -> Vec<u8> {
        self.get_storage_from_address(&self.sc_address, key)
    }

    fn set_storage(&mut self, key: &[u8], value: &[u8]) {
        self.storage_update
            .entry(self.sc_address.clone())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
    }

    fn get_storage_from_address(&self, address: &[u8], key: &[u8]) -> Vec<u8> {
        if let Some(value) = self.storage_update.get(address).and_then(|m| m.get(key)) {
            return value.clone();
        }
        self.blockchain_hook
            .get_storage_data(address, key)
            .unwrap_or_default()
    }

    fn get_balance(&mut self, address: &[u8]) -> U256 {
        let hook = Arc::clone(&self.blockchain_hook);
        let span = self.span.clone();
        let acc = self.account_mut(address);
        let committed = *acc.committed.get_or_insert_with(|| {
            hook.get_balance(address).unwrap_or_else(|err| {
                debug!(parent: &span, %err, "balance read failed, using zero");
                U256::zero()
            })
        });
        acc.delta.apply_to(committed)
    }

    fn transfer(&mut self, destination: &[u8], sender: &[u8], value: U256, data: &[u8], gas_limit: u64) {
        self.account_mut(sender).delta.sub(value);
        let dest = self.account_mut(destination);
        dest.delta.add(value);
        dest.data.extend_from_slice(data);
        dest.gas_limit = dest.gas_limit.saturating_add(gas_limit);
    }

    fn execute_on_dest_context(
        &mut self,
        destination: &[u8],
        sender: &[u8],
        value: U256,
        data: &[u8],
    ) -> Result<VmOutput, EeiError> {
        let input = Self::create_contract_call_input(destination, sender, value, data)?;
        self.transfer(destination, sender, value, &[], 0);
        let contract = self.system_contracts.get(destination)?;
        debug!(parent: &self.span, function = %input.function, "nested call");
        Ok(self.run_nested(&contract, &input, false))
    }

    fn deploy_system_sc(
        &mut self,
        base: &[u8],
        new_address: &[u8],
        owner: &[u8],
        value: U256,
        args: &[Vec<u8>],
    ) -> Result<ReturnCode, EeiError> {
        let contract = self.system_contracts.get(base)?;
        self.system_contracts.add(new_address, Arc::clone(&contract))?;
        self.deployed.push(new_address.to_vec());
        self.add_code(new_address, base);

        let sender = self.sc_address.clone();
        self.transfer(new_address, &sender, value, &[], 0);
        let input = ContractCallInput {
            caller_addr: owner.to_vec(),
            recipient_addr: new_address.to_vec(),
            call_value: value,
            function: INIT_FUNCTION_NAME.to_owned(),
            arguments: args.to_vec(),
            gas_provided: 0,
        };
        let out = self.run_nested(&contract, &input, true);
        if out.return_code != ReturnCode::Ok {
            debug!(parent: &self.span, code = %out.return_code, "deploy init failed");
            self.system_contracts.remove(new_address);
            self.deployed.retain(|a| a != new_address);
        }
        Ok(out.return_code)
    }

    fn finish(&mut self, value: &[u8]) {
        self.output.push(value.to_vec());
    }

    fn add_return_message(&mut self, message: &str) {
        if self.return_message.is_empty() {
            message.clone_into(&mut self.return_message);
            return;
        }
        self.return_message.push_str(RETURN_MESSAGE_SEPARATOR);
        self.return_message.push_str(message);
    }

    fn use_gas(&mut self, gas: u64) -> Result<(), EeiError> {
        if self.gas_remaining < gas {
            return Err(EeiError::NotEnoughGas);
        }
        self.gas_remaining -= gas;
        Ok(())
    }

    fn block_chain_hook(&self) -> &dyn BlockchainHook {
        self.blockchain_hook.as_ref()
    }

    fn is_validator(&self, bls_key: &[u8]) -> bool {
        matches!(
            self.validator_accounts.peer_list(bls_key),
            Some(PeerList::Eligible | PeerList::Waiting)
        )
    }

    fn add_code(&mut self, address: &[u8], code: &[u8]) {
        code.clone_into(&mut self.account_mut(address).code);
    }

    fn create_vm_output(&self) -> VmOutput {
        let mut accounts: BTreeMap<Vec<u8>, OutputAccount> = BTreeMap::new();
        for (address, updates) in &self.storage_update {
            let acc = accounts.entry(address.clone()).or_insert_with(|| OutputAccount {
                address: address.clone(),
                ..OutputAccount::default()
            });
            for (key, data) in updates {
                acc.storage_updates.insert(
                    key.clone(),
                    StorageUpdate {
                        offset: key.clone(),
                        data: data.clone(),
                    },
                );
            }
        }
        for (address, ledger) in &self.output_accounts {
            let acc = accounts.entry(address.clone()).or_insert_with(|| OutputAccount {
                address: address.clone(),
                ..OutputAccount::default()
            });
            acc.balance_delta = ledger.delta;
            acc.code.clone_from(&ledger.code);
            acc.data.clone_from(&ledger.data);
            acc.gas_limit = ledger.gas_limit;
        }

        VmOutput {
            return_code: ReturnCode::Ok,
            return_message: self.return_message.clone(),
            return_data: self.output.clone(),
            gas_remaining: self.gas_remaining,
            output_accounts: accounts,
        }
    }
}
