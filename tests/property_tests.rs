//! Property-based tests for the sysvm crate surface

use ed25519_dalek::{Signer, SigningKey};
use proptest::prelude::*;
use rand_core::OsRng;
use sysvm::auction::{AuctionConfig, AuctionData};
use sysvm::delegation::{DelegationContractList, DelegationManagement};
use sysvm::eei::{build_call_data, parse_call_data, MessageSignVerifier, VerifyError};
use sysvm::primitives::{percentage_of, U256};
use sysvm::staking::{StakedData, StakingNodesConfig};
use sysvm::Ed25519SignVerifier;

// Property test: ownership proofs verify only for the signed address
proptest! {
    #[test]
    fn signer_accepts_exact_proof_only(
        address in prop::collection::vec(any::<u8>(), 1..64),
        flip in any::<prop::sample::Index>(),
    ) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let pk = signing_key.verifying_key().to_bytes();
        let sig = signing_key.sign(&address).to_bytes();

        prop_assert!(Ed25519SignVerifier.verify(&address, &sig, &pk).is_ok());

        let mut other = address.clone();
        let i = flip.index(other.len());
        other[i] ^= 0x01;
        prop_assert_eq!(
            Ed25519SignVerifier.verify(&other, &sig, &pk),
            Err(VerifyError::InvalidSignature)
        );
    }
}

proptest! {
    #[test]
    fn signer_rejects_malformed_inputs(
        pk in prop::collection::vec(any::<u8>(), 0..31),
        sig in prop::collection::vec(any::<u8>(), 0..63),
    ) {
        prop_assert_eq!(
            Ed25519SignVerifier.verify(b"owner", &[0u8; 64], &pk),
            Err(VerifyError::InvalidPublicKey)
        );
        let signing_key = SigningKey::generate(&mut OsRng);
        let good_pk = signing_key.verifying_key().to_bytes();
        prop_assert_eq!(
            Ed25519SignVerifier.verify(b"owner", &sig, &good_pk),
            Err(VerifyError::InvalidSignature)
        );
    }
}

// Property test: storage decoders never panic on arbitrary bytes
proptest! {
    #[test]
    fn storage_decoders_are_total(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = StakedData::decode(&data);
        let _ = StakingNodesConfig::decode(&data);
        let _ = AuctionData::decode(&data);
        let _ = AuctionConfig::decode(&data);
        let _ = DelegationManagement::decode(&data);
        let _ = DelegationContractList::decode(&data);
    }
}

proptest! {
    #[test]
    fn staked_record_survives_storage(
        register_nonce in any::<u64>(),
        staked in any::<bool>(),
        jailed_round in any::<u64>(),
        reward in prop::collection::vec(any::<u8>(), 0..40),
        stake in any::<u128>(),
    ) {
        let record = StakedData {
            register_nonce,
            staked,
            reward_address: reward,
            stake_value: U256::from(stake),
            jailed_round,
            ..StakedData::default()
        };
        prop_assert_eq!(StakedData::decode(&record.encode()), Ok(record));
    }
}

// Property test: call data parsing inverts building
proptest! {
    #[test]
    fn call_data_round_trip(
        function in "[a-zA-Z_][a-zA-Z0-9_]{0,20}",
        args in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..6),
    ) {
        let refs: Vec<&[u8]> = args.iter().map(Vec::as_slice).collect();
        let parsed = parse_call_data(&build_call_data(&function, &refs)).unwrap();
        prop_assert_eq!(parsed.function, function);
        prop_assert_eq!(parsed.arguments, args);
    }
}

// Property test: percentages never exceed the base amount
proptest! {
    #[test]
    fn percentage_is_bounded(value in any::<u128>(), pct in 0.0f64..=1.0) {
        let value = U256::from(value);
        let part = percentage_of(&value, pct);
        prop_assert!(part <= value);
        if pct == 1.0 {
            prop_assert_eq!(part, value);
        }
    }
}
