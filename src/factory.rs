//! Builds the system contracts from one configuration bundle.

use crate::errors::FactoryError;
use primitive_types::U256;
use std::sync::Arc;
use sysvm_auction::{ArgsStakingAuctionSmartContract, StakingAuctionSc};
use sysvm_delegation::{ArgsNewDelegationManager, DelegationManager};
use sysvm_eei::config::parse_positive_amount;
use sysvm_eei::{
    ArgsVmContext, BlockchainHook, DelegationManagerScConfig, EpochNotifier, GasCost,
    MessageSignVerifier, StakingSystemScConfig, SystemScContainer, SystemVm, ValidatorAccounts,
    VmContext,
};
use sysvm_primitives::constants::{
    AUCTION_SC_ADDRESS, DELEGATION_MANAGER_SC_ADDRESS, JAILING_ADDRESS, STAKING_SC_ADDRESS,
};
use sysvm_staking::{ArgsNewStakingSmartContract, StakingSc};
use tracing::{debug, Span};

pub struct ArgsNewSystemScFactory {
    pub staking_sc_config: StakingSystemScConfig,
    pub delegation_mgr_sc_config: DelegationManagerScConfig,
    pub gas_cost: GasCost,
    pub num_of_nodes_to_select: u64,
    pub genesis_total_supply: U256,
    pub sig_verifier: Arc<dyn MessageSignVerifier>,
    pub epoch_notifier: Arc<dyn EpochNotifier>,
    pub span: Span,
}

/// Owns the shared configuration and produces fresh contract sets.
///
/// Every contract created here is subscribed to the factory's epoch
/// notifier, so feature flags follow the host's epoch changes.
pub struct SystemScFactory {
    args: ArgsNewSystemScFactory,
    node_price: U256,
}

impl SystemScFactory {
    pub fn new(args: ArgsNewSystemScFactory) -> Result<Self, FactoryError> {
        let node_price = parse_positive_amount("GenesisNodePrice", &args.staking_sc_config.genesis_node_price)?;
        Ok(Self { args, node_price })
    }

    fn create_staking(&self) -> Result<StakingSc, FactoryError> {
        let cfg = &self.args.staking_sc_config;
        Ok(StakingSc::new(ArgsNewStakingSmartContract {
            min_num_nodes: cfg.min_num_nodes,
            min_stake_value: self.node_price,
            unbond_period: cfg.unbond_period,
            staking_access_addr: AUCTION_SC_ADDRESS.to_vec(),
            jail_access_addr: JAILING_ADDRESS.to_vec(),
            num_rounds_without_bleed: cfg.num_rounds_without_bleed,
            bleed_percentage_per_round: cfg.bleed_percentage_per_round,
            maximum_percentage_to_bleed: cfg.maximum_percentage_to_bleed,
            span: self.args.span.clone(),
        })?)
    }

    fn create_auction(&self) -> Result<Arc<StakingAuctionSc>, FactoryError> {
        Ok(StakingAuctionSc::new(ArgsStakingAuctionSmartContract {
            staking_sc_address: STAKING_SC_ADDRESS.to_vec(),
            auction_sc_address: AUCTION_SC_ADDRESS.to_vec(),
            num_of_nodes_to_select: self.args.num_of_nodes_to_select,
            staking_sc_config: self.args.staking_sc_config.clone(),
            genesis_total_supply: self.args.genesis_total_supply,
            sig_verifier: Arc::clone(&self.args.sig_verifier),
            gas_cost: self.args.gas_cost,
            epoch_notifier: Arc::clone(&self.args.epoch_notifier),
            span: self.args.span.clone(),
        })?)
    }

    fn create_delegation_manager(&self) -> Result<Arc<DelegationManager>, FactoryError> {
        Ok(DelegationManager::new(ArgsNewDelegationManager {
            delegation_mgr_sc_config: self.args.delegation_mgr_sc_config.clone(),
            delegation_mgr_sc_address: DELEGATION_MANAGER_SC_ADDRESS.to_vec(),
            gas_cost: self.args.gas_cost,
            epoch_notifier: Arc::clone(&self.args.epoch_notifier),
            span: self.args.span.clone(),
        })?)
    }

    /// Staking registry, auction engine and delegation manager registered
    /// under their system addresses.
    ///
    /// The delegation template at `FIRST_DELEGATION_SC_ADDRESS` is not part
    /// of this set; hosts add their implementation before deployments.
    pub fn create(&self) -> Result<SystemScContainer, FactoryError> {
        let mut container = SystemScContainer::new();
        container.add(&STAKING_SC_ADDRESS, Arc::new(self.create_staking()?))?;
        container.add(&AUCTION_SC_ADDRESS, self.create_auction()?)?;
        container.add(&DELEGATION_MANAGER_SC_ADDRESS, self.create_delegation_manager()?)?;
        debug!(parent: &self.args.span, contracts = container.len(), "system contracts created");
        Ok(container)
    }

    /// A runner over a fresh context holding [`Self::create`]'s contracts.
    pub fn create_vm(
        &self,
        blockchain_hook: Arc<dyn BlockchainHook>,
        validator_accounts: Arc<dyn ValidatorAccounts>,
    ) -> Result<SystemVm, FactoryError> {
        let mut context = VmContext::new(ArgsVmContext {
            blockchain_hook,
            validator_accounts,
            span: self.args.span.clone(),
        });
        context.set_system_sc_container(self.create()?);
        Ok(SystemVm::new(context, self.args.span.clone()))
    }
}
