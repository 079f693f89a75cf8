use sysvm_auction::AuctionError;
use sysvm_delegation::DelegationError;
use sysvm_eei::{ConfigError, EeiError};
use sysvm_staking::StakingError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactoryError {
    #[error("staking: {0}")]
    Staking(#[from] StakingError),

    #[error("auction: {0}")]
    Auction(#[from] AuctionError),

    #[error("delegation manager: {0}")]
    Delegation(#[from] DelegationError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("container: {0}")]
    Container(#[from] EeiError),
}
