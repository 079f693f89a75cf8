#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! sysvm execution environment (EEI).
//!
//! A deterministic, gas-metered sandbox in which the staking, auction and
//! delegation system contracts run. Side effects are buffered in memory and
//! flattened into a [`VmOutput`] that the host commits.

pub mod config;
pub mod context;
pub mod contract;
pub mod errors;
pub mod hooks;
pub mod parser;
pub mod types;
pub mod vm;

pub use config::{DelegationManagerScConfig, GasCost, MetaChainSystemScsCost, StakingSystemScConfig};
pub use context::{ArgsVmContext, VmContext};
pub use contract::{SystemContract, SystemEi, SystemScContainer};
pub use errors::{CallDataError, ConfigError, EeiError, HookError, VerifyError};
pub use hooks::{
    BlockchainHook, EpochNotifier, EpochNotifierRegistry, EpochSubscriber, MessageSignVerifier,
    PeerList, ValidatorAccounts,
};
pub use parser::{build_call_data, parse_call_data, ParsedCall};
pub use types::{ContractCallInput, OutputAccount, ReturnCode, StorageUpdate, VmOutput};
pub use vm::SystemVm;
