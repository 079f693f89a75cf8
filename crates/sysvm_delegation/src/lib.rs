#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Delegation manager system contract.
//!
//! A factory that deploys one delegation contract per owner at
//! sequential addresses after [`FIRST_DELEGATION_SC_ADDRESS`], keeps the
//! list of deployed contracts and the issuing parameters. Parameter changes
//! are accepted only from the manager's own address.

pub mod data;

pub use data::{next_delegation_address, DelegationContractList, DelegationManagement};

use primitive_types::U256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysvm_eei::config::parse_amount;
use sysvm_eei::{
    ConfigError, ContractCallInput, DelegationManagerScConfig, EpochNotifier, EpochSubscriber,
    GasCost, ReturnCode, SystemContract, SystemEi,
};
use sysvm_primitives::constants::{FIRST_DELEGATION_SC_ADDRESS, INIT_FUNCTION_NAME};
use sysvm_primitives::{u256_from_be, CodecError};
use thiserror::Error;
use tracing::{debug, Span};

pub const DELEGATION_MANAGEMENT_KEY: &[u8] = b"delegationManagement";
pub const DELEGATION_CONTRACTS_KEY: &[u8] = b"delegationContracts";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("invalid delegation manager smart contract address")]
    InvalidDelegationManagerAddress,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("data not found under key {0}")]
    DataNotFound(&'static str),
    #[error("delegation address space exhausted")]
    AddressSpaceExhausted,
    #[error("callValue must be 0")]
    CallValueMustBeZero,
    #[error("invalid number of arguments")]
    InvalidNumOfArguments,
    #[error("invalid caller")]
    InvalidCaller,
    #[error("stored data: {0}")]
    Codec(#[from] CodecError),
}

pub struct ArgsNewDelegationManager {
    pub delegation_mgr_sc_config: DelegationManagerScConfig,
    pub delegation_mgr_sc_address: Vec<u8>,
    pub gas_cost: GasCost,
    pub epoch_notifier: Arc<dyn EpochNotifier>,
    pub span: Span,
}

pub struct DelegationManager {
    delegation_mgr_sc_address: Vec<u8>,
    gas_cost: GasCost,
    base_issuing_cost: U256,
    min_creation_deposit: U256,
    enable_delegation_mgr_epoch: u32,
    flag_enabled: AtomicBool,
    span: Span,
}

impl DelegationManager {
    pub fn new(args: ArgsNewDelegationManager) -> Result<Arc<Self>, DelegationError> {
        if args.delegation_mgr_sc_address.is_empty() {
            return Err(DelegationError::InvalidDelegationManagerAddress);
        }
        let cfg = &args.delegation_mgr_sc_config;
        let base_issuing_cost = parse_amount("BaseIssuingCost", &cfg.base_issuing_cost)?;
        let min_creation_deposit = parse_amount("MinCreationDeposit", &cfg.min_creation_deposit)?;

        let sc = Arc::new(Self {
            delegation_mgr_sc_address: args.delegation_mgr_sc_address,
            gas_cost: args.gas_cost,
            base_issuing_cost,
            min_creation_deposit,
            enable_delegation_mgr_epoch: cfg.enabled_epoch,
            flag_enabled: AtomicBool::new(false),
            span: args.span,
        });
        args.epoch_notifier.register_notify_handler(sc.clone());
        Ok(sc)
    }

    fn management_data(eei: &dyn SystemEi) -> Result<DelegationManagement, DelegationError> {
        let raw = eei.get_storage(DELEGATION_MANAGEMENT_KEY);
        if raw.is_empty() {
            return Err(DelegationError::DataNotFound("delegationManagement"));
        }
        Ok(DelegationManagement::decode(&raw)?)
    }

    fn contract_list(eei: &dyn SystemEi) -> Result<DelegationContractList, DelegationError> {
        let raw = eei.get_storage(DELEGATION_CONTRACTS_KEY);
        if raw.is_empty() {
            return Err(DelegationError::DataNotFound("delegationContracts"));
        }
        Ok(DelegationContractList::decode(&raw)?)
    }

    fn registry(eei: &dyn SystemEi) -> Result<(DelegationManagement, DelegationContractList), DelegationError> {
        Ok((Self::management_data(eei)?, Self::contract_list(eei)?))
    }

    fn init(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !input.call_value.is_zero() {
            eei.add_return_message(&DelegationError::CallValueMustBeZero.to_string());
            return ReturnCode::UserError;
        }
        let management = DelegationManagement {
            number_of_contract: 0,
            last_address: FIRST_DELEGATION_SC_ADDRESS.to_vec(),
            min_service_fee: 0,
            max_service_fee: u64::MAX,
            base_issuing_cost: self.base_issuing_cost,
            min_deposit: self.min_creation_deposit,
        };
        eei.set_storage(DELEGATION_MANAGEMENT_KEY, &management.encode());
        eei.set_storage(DELEGATION_CONTRACTS_KEY, &DelegationContractList::default().encode());
        ReturnCode::Ok
    }

    fn create_new_delegation_contract(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if let Err(err) = eei.use_gas(self.gas_cost.meta_chain_system_scs_cost.delegation_mgr_ops) {
            eei.add_return_message(&err.to_string());
            return ReturnCode::OutOfGas;
        }
        let caller = &input.caller_addr;
        if !eei.get_storage(caller).is_empty() {
            eei.add_return_message("caller already deployed a delegation sc");
            return ReturnCode::UserError;
        }
        let (mut management, mut list) = match Self::registry(eei) {
            Ok(v) => v,
            Err(err) => {
                eei.add_return_message(&err.to_string());
                return ReturnCode::UserError;
            }
        };

        let min_value = management.min_deposit.saturating_add(management.base_issuing_cost);
        if input.call_value < min_value {
            eei.add_return_message("not enough call value");
            return ReturnCode::UserError;
        }
        let Some(new_address) = next_delegation_address(&management.last_address) else {
            eei.add_return_message(&DelegationError::AddressSpaceExhausted.to_string());
            return ReturnCode::UserError;
        };
        let deposit = input.call_value - management.base_issuing_cost;

        let code = match eei.deploy_system_sc(
            &FIRST_DELEGATION_SC_ADDRESS,
            &new_address,
            caller,
            deposit,
            &input.arguments,
        ) {
            Ok(code) => code,
            Err(err) => {
                eei.add_return_message(&err.to_string());
                return ReturnCode::UserError;
            }
        };
        if code != ReturnCode::Ok {
            return code;
        }
        debug!(parent: &self.span, address = %hex::encode(&new_address), "delegation contract deployed");

        management.number_of_contract = management.number_of_contract.saturating_add(1);
        management.last_address.clone_from(&new_address);
        list.addresses.push(new_address.clone());

        eei.set_storage(caller, &new_address);
        eei.set_storage(DELEGATION_MANAGEMENT_KEY, &management.encode());
        eei.set_storage(DELEGATION_CONTRACTS_KEY, &list.encode());
        ReturnCode::Ok
    }

    fn check_config_change_input(&self, input: &ContractCallInput) -> Result<(), DelegationError> {
        if !input.call_value.is_zero() {
            return Err(DelegationError::CallValueMustBeZero);
        }
        if input.arguments.len() != 1 {
            return Err(DelegationError::InvalidNumOfArguments);
        }
        if input.caller_addr != self.delegation_mgr_sc_address {
            return Err(DelegationError::InvalidCaller);
        }
        Ok(())
    }

    fn change_management(
        &self,
        eei: &mut dyn SystemEi,
        input: &ContractCallInput,
        apply: impl FnOnce(&mut DelegationManagement, U256),
    ) -> ReturnCode {
        let result = self.check_config_change_input(input).and_then(|()| {
            let mut management = Self::management_data(eei)?;
            let value = u256_from_be(&input.arguments[0]).map_err(|_| DelegationError::InvalidNumOfArguments)?;
            apply(&mut management, value);
            Ok(management)
        });
        match result {
            Ok(management) => {
                eei.set_storage(DELEGATION_MANAGEMENT_KEY, &management.encode());
                ReturnCode::Ok
            }
            Err(err) => {
                eei.add_return_message(&err.to_string());
                ReturnCode::UserError
            }
        }
    }

    fn get_all_contract_addresses(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if input.caller_addr != self.delegation_mgr_sc_address {
            eei.add_return_message(&DelegationError::InvalidCaller.to_string());
            return ReturnCode::UserError;
        }
        let list = match Self::contract_list(eei) {
            Ok(l) => l,
            Err(err) => {
                eei.add_return_message(&err.to_string());
                return ReturnCode::UserError;
            }
        };
        for address in &list.addresses {
            eei.finish(address);
        }
        ReturnCode::Ok
    }
}

impl EpochSubscriber for DelegationManager {
    fn epoch_confirmed(&self, epoch: u32) {
        let enabled = epoch >= self.enable_delegation_mgr_epoch;
        self.flag_enabled.store(enabled, Ordering::SeqCst);
        debug!(parent: &self.span, enabled, "delegationManager");
    }
}

impl SystemContract for DelegationManager {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        if !self.is_enabled() {
            eei.add_return_message("delegation manager contract is not enabled");
            return ReturnCode::UserError;
        }
        match input.function.as_str() {
            INIT_FUNCTION_NAME => self.init(eei, input),
            "createNewDelegationContract" => self.create_new_delegation_contract(eei, input),
            "getAllContractAddresses" => self.get_all_contract_addresses(eei, input),
            "changeBaseIssuingCost" => {
                self.change_management(eei, input, |m, v| m.base_issuing_cost = v)
            }
            "changeMinDeposit" => self.change_management(eei, input, |m, v| m.min_deposit = v),
            _ => {
                eei.add_return_message("invalid function to call");
                ReturnCode::UserError
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.flag_enabled.load(Ordering::SeqCst)
    }
}
