//! Capabilities the execution context consumes from the host node.

use crate::errors::{HookError, VerifyError};
use primitive_types::U256;
use std::sync::{Arc, Mutex, PoisonError};

/// Read-through view of committed chain state.
pub trait BlockchainHook: Send + Sync {
    fn get_storage_data(&self, address: &[u8], key: &[u8]) -> Result<Vec<u8>, HookError>;
    fn get_balance(&self, address: &[u8]) -> Result<U256, HookError>;
    fn current_nonce(&self) -> u64;
    fn current_round(&self) -> u64;
    fn current_epoch(&self) -> u32;
    fn current_random_seed(&self) -> Vec<u8>;
}

/// Validator list a peer account currently sits in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerList {
    Eligible,
    Waiting,
    New,
    Leaving,
    Inactive,
    Jailed,
}

/// Membership lookup into the peer-accounts store.
pub trait ValidatorAccounts: Send + Sync {
    fn peer_list(&self, bls_key: &[u8]) -> Option<PeerList>;
}

/// Proof-of-possession check for validator keys.
pub trait MessageSignVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signed_message: &[u8], pub_key: &[u8])
        -> Result<(), VerifyError>;
}

pub trait EpochSubscriber: Send + Sync {
    fn epoch_confirmed(&self, epoch: u32);
}

pub trait EpochNotifier: Send + Sync {
    /// Registers `handler`; it is immediately told the current epoch.
    fn register_notify_handler(&self, handler: Arc<dyn EpochSubscriber>);
}

#[derive(Default)]
struct RegistryState {
    current_epoch: u32,
    handlers: Vec<Arc<dyn EpochSubscriber>>,
}

/// In-process epoch notifier: fans `check_epoch` out to every subscriber.
#[derive(Default)]
pub struct EpochNotifierRegistry {
    state: Mutex<RegistryState>,
}

impl EpochNotifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_epoch(&self, epoch: u32) {
        let handlers = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            st.current_epoch = epoch;
            st.handlers.clone()
        };
        for h in handlers {
            h.epoch_confirmed(epoch);
        }
    }

    #[must_use]
    pub fn current_epoch(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_epoch
    }
}

impl EpochNotifier for EpochNotifierRegistry {
    fn register_notify_handler(&self, handler: Arc<dyn EpochSubscriber>) {
        let epoch = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            st.handlers.push(Arc::clone(&handler));
            st.current_epoch
        };
        handler.epoch_confirmed(epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Recorder(AtomicU32);
    impl EpochSubscriber for Recorder {
        fn epoch_confirmed(&self, epoch: u32) {
            self.0.store(epoch, Ordering::SeqCst);
        }
    }

    #[test]
    fn registration_replays_current_epoch() {
        let reg = EpochNotifierRegistry::new();
        reg.check_epoch(4);
        let r = Arc::new(Recorder(AtomicU32::new(0)));
        reg.register_notify_handler(r.clone());
        assert_eq!(r.0.load(Ordering::SeqCst), 4);
        reg.check_epoch(9);
        assert_eq!(r.0.load(Ordering::SeqCst), 9);
        assert_eq!(reg.current_epoch(), 9);
    }
}
