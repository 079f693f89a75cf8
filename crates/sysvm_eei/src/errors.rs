use sysvm_primitives::BigIntError;
use thiserror::Error;

/// Failures surfaced by the execution context itself.
///
/// Contract code never returns these across the sandbox boundary; they are
/// folded into a `ReturnCode` plus a return message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EeiError {
    #[error("not enough gas")]
    NotEnoughGas,
    #[error("unknown system smart contract")]
    UnknownSystemSmartContract,
    #[error("system smart contract already registered at address")]
    ContractAlreadyRegistered,
    #[error("invalid call data: {0}")]
    CallData(#[from] CallDataError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallDataError {
    #[error("empty function name")]
    EmptyFunction,
    #[error("function name is not utf-8")]
    FunctionEncoding,
    #[error("argument {index} is not valid hex")]
    InvalidHexArgument { index: usize },
}

/// Errors reported by the account-store hook.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("account not found")]
    AccountNotFound,
    #[error("storage read failed: {0}")]
    Storage(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature")]
    InvalidSignature,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} is not a decimal integer: {value:?}")]
    Decimal { field: &'static str, value: String },
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("{field} is out of range")]
    OutOfRange { field: &'static str },
    #[error(transparent)]
    BigInt(#[from] BigIntError),
}
