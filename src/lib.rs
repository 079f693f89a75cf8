#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! sysvm: the validator economics engine of a sharded proof-of-stake chain.
//!
//! Three system contracts run inside a deterministic, gas-metered sandbox:
//!
//! - the staking registry (`sysvm_staking`) tracks every validator key,
//! - the auction engine (`sysvm_auction`) takes bids, prices and selects nodes,
//! - the delegation manager (`sysvm_delegation`) deploys delegation contracts.
//!
//! This crate wires them together: [`SystemScFactory`] builds and registers
//! the contracts from one configuration, [`Ed25519SignVerifier`] checks key
//! ownership proofs.

pub mod errors;
pub mod factory;
pub mod signer;

pub use errors::FactoryError;
pub use factory::{ArgsNewSystemScFactory, SystemScFactory};
pub use signer::Ed25519SignVerifier;

pub use sysvm_auction as auction;
pub use sysvm_delegation as delegation;
pub use sysvm_eei as eei;
pub use sysvm_primitives as primitives;
pub use sysvm_staking as staking;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
