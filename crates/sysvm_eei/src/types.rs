use core::fmt;
use primitive_types::U256;
use std::collections::BTreeMap;
use sysvm_primitives::BalanceDelta;

/// Closed result set of every system-contract call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Ok,
    FunctionWrongSignature,
    UserError,
    OutOfGas,
    OutOfFunds,
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::FunctionWrongSignature => "function wrong signature",
            Self::UserError => "user error",
            Self::OutOfGas => "out of gas",
            Self::OutOfFunds => "out of funds",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractCallInput {
    pub caller_addr: Vec<u8>,
    pub recipient_addr: Vec<u8>,
    pub call_value: U256,
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
    pub gas_provided: u64,
}

impl ContractCallInput {
    #[must_use]
    pub fn new(caller: &[u8], recipient: &[u8], function: &str) -> Self {
        Self {
            caller_addr: caller.to_vec(),
            recipient_addr: recipient.to_vec(),
            function: function.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: U256) -> Self {
        self.call_value = value;
        self
    }

    #[must_use]
    pub fn with_args(mut self, arguments: Vec<Vec<u8>>) -> Self {
        self.arguments = arguments;
        self
    }

    #[must_use]
    pub const fn with_gas(mut self, gas: u64) -> Self {
        self.gas_provided = gas;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageUpdate {
    pub offset: Vec<u8>,
    pub data: Vec<u8>,
}

/// Per-address slice of a flattened call result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputAccount {
    pub address: Vec<u8>,
    pub balance_delta: BalanceDelta,
    pub storage_updates: BTreeMap<Vec<u8>, StorageUpdate>,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub gas_limit: u64,
}

/// Externally consumable result of a call; the trie layer commits it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmOutput {
    pub return_code: ReturnCode,
    pub return_message: String,
    pub return_data: Vec<Vec<u8>>,
    pub gas_remaining: u64,
    pub output_accounts: BTreeMap<Vec<u8>, OutputAccount>,
}

impl Default for VmOutput {
    fn default() -> Self {
        Self {
            return_code: ReturnCode::Ok,
            return_message: String::new(),
            return_data: Vec::new(),
            gas_remaining: 0,
            output_accounts: BTreeMap::new(),
        }
    }
}

impl VmOutput {
    /// Output of a failed call: code and message only, no state changes.
    #[must_use]
    pub fn failed(return_code: ReturnCode, return_message: &str) -> Self {
        Self {
            return_code,
            return_message: return_message.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn storage_at(&self, address: &[u8], key: &[u8]) -> Option<&[u8]> {
        self.output_accounts
            .get(address)?
            .storage_updates
            .get(key)
            .map(|u| u.data.as_slice())
    }
}
