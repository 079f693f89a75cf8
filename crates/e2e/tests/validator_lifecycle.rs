//! Validator lifecycle through the full VM: stake, select, jail, unjail,
//! unstake, unbond, with real Ed25519 proofs of possession.

use e2e::{node_key, Operator, StakingSystemScConfig, TestNode};
use ed25519_dalek::{Signer, SigningKey};
use rand_core::OsRng;
use std::collections::BTreeSet;
use sysvm_auction::UN_JAIL_FUNDS_KEY;
use sysvm_eei::{DelegationManagerScConfig, PeerList, ReturnCode};
use sysvm_primitives::constants::{AUCTION_SC_ADDRESS, JAILING_ADDRESS, STAKING_SC_ADDRESS};
use sysvm_primitives::{u256_to_be, U256};
use sysvm_staking::StakedData;

const ALICE: [u8; 32] = [0x01; 32];
const BOB: [u8; 32] = [0x02; 32];

fn config() -> StakingSystemScConfig {
    StakingSystemScConfig {
        genesis_node_price: "1000".into(),
        min_stake_value: "1".into(),
        min_step_value: "10".into(),
        un_jail_value: "50".into(),
        unbond_period: 5,
        num_rounds_without_bleed: 0,
        bleed_percentage_per_round: 0.0,
        maximum_percentage_to_bleed: 0.0,
        min_num_nodes: 0,
        ..StakingSystemScConfig::default()
    }
}

fn u(v: u64) -> U256 {
    U256::from(v)
}

fn node(num_nodes: u64) -> TestNode {
    let node = TestNode::new(config(), DelegationManagerScConfig::default(), num_nodes).unwrap();
    node.ledger.credit(&ALICE, u(10_000));
    node.ledger.credit(&BOB, u(10_000));
    node.set_nonce(1);
    node
}

fn staked(node: &TestNode, key: &[u8]) -> Option<StakedData> {
    StakedData::decode(&node.ledger.storage(&STAKING_SC_ADDRESS, key)).ok()
}

fn key_status(out: &[Vec<u8>], key: &[u8]) -> Option<u8> {
    out.windows(2)
        .find(|w| w[0] == key && w[1].len() == 1)
        .and_then(|w| w[1].first().copied())
}

#[test]
fn stake_select_unstake_unbond() {
    let mut node = node(3);
    let alice = Operator::new(ALICE, vec![node_key(1), node_key(2)]);
    let bob = Operator::new(BOB, vec![node_key(3), node_key(4)]);

    let out = node.auction(&ALICE, "stake", alice.stake_args(), u(2_000)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok, "{}", out.return_message);
    let out = node.auction(&BOB, "stake", bob.stake_args(), u(3_000)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok, "{}", out.return_message);

    assert_eq!(node.ledger.balance(&ALICE), u(8_000));
    assert_eq!(node.ledger.balance(&AUCTION_SC_ADDRESS), u(5_000));
    let bid = node.bid(&ALICE).unwrap();
    assert_eq!(bid.bls_pub_keys, alice.bls_keys());
    assert_eq!(bid.locked_stake, u(2_000));
    for key in alice.bls_keys().iter().chain(bob.bls_keys().iter()) {
        let d = staked(&node, key).unwrap();
        assert!(d.staked);
        assert!(!d.is_jailed());
    }

    // alice can back one key above 1000, bob two: exactly three qualify
    node.set_seed(&[5u8; 32]);
    let selected = node.select(&[&ALICE, &BOB]).unwrap();
    let got: BTreeSet<Vec<u8>> = selected.iter().cloned().collect();
    let want: BTreeSet<Vec<u8>> = [
        alice.bls_keys()[0].clone(),
        bob.bls_keys()[0].clone(),
        bob.bls_keys()[1].clone(),
    ]
    .into_iter()
    .collect();
    assert_eq!(got, want);
    assert_eq!(node.select(&[&BOB, &ALICE]).unwrap().len(), 3);

    let key = alice.bls_keys()[0].clone();
    node.set_nonce(2);
    let out = node.auction(&ALICE, "unStake", vec![key.clone()], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    let d = staked(&node, &key).unwrap();
    assert!(!d.staked);
    assert_eq!(d.un_staked_nonce, 2);

    // still inside the unbond period
    node.set_nonce(4);
    let out = node.auction(&ALICE, "unBond", vec![key.clone()], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(key_status(&out.return_data, &key), Some(2));
    assert_eq!(node.ledger.balance(&ALICE), u(8_000));

    // an eligible validator cannot leave yet
    node.set_nonce(7);
    node.peers.set(&key, PeerList::Eligible);
    let out = node.auction(&ALICE, "unBond", vec![key.clone()], U256::zero()).unwrap();
    assert_eq!(key_status(&out.return_data, &key), Some(2));
    assert!(staked(&node, &key).is_some());

    node.peers.set(&key, PeerList::Inactive);
    let out = node.auction(&ALICE, "unBond", vec![key.clone()], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(key_status(&out.return_data, &key), None);
    assert_eq!(node.ledger.balance(&ALICE), u(9_000));
    assert!(staked(&node, &key).is_none());
    let bid = node.bid(&ALICE).unwrap();
    assert_eq!(bid.bls_pub_keys, vec![alice.bls_keys()[1].clone()]);
    assert_eq!(bid.total_stake_value, u(1_000));
    assert_eq!(bid.num_registered, 1);
}

#[test]
fn forged_proofs_are_skipped() {
    let mut node = node(2);
    let alice = Operator::new(ALICE, vec![SigningKey::generate(&mut OsRng), SigningKey::generate(&mut OsRng)]);
    let mut args = alice.stake_args();
    // second key signs bob's address instead of alice's
    args[4] = alice.keys[1].sign(&BOB).to_bytes().to_vec();

    let out = node.auction(&ALICE, "stake", args, u(2_000)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    let forged = &alice.bls_keys()[1];
    assert_eq!(key_status(&out.return_data, forged), Some(1));
    assert_eq!(node.bid(&ALICE).unwrap().bls_pub_keys, vec![alice.bls_keys()[0].clone()]);
    assert!(staked(&node, forged).is_none());
}

#[test]
fn jail_and_unjail() {
    let mut node = node(2);
    let alice = Operator::new(ALICE, vec![node_key(9)]);
    let key = alice.bls_keys()[0].clone();
    let out = node.auction(&ALICE, "stake", alice.stake_args(), u(1_000)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);

    // only the jailing address may jail
    let out = node.call(&ALICE, &STAKING_SC_ADDRESS, "jail", vec![key.clone()], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
    node.set_nonce(3);
    let out = node.call(&JAILING_ADDRESS, &STAKING_SC_ADDRESS, "jail", vec![key.clone()], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert!(staked(&node, &key).unwrap().is_jailed());

    let out = node.auction(&ALICE, "unJail", vec![key.clone()], u(10)).unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError, "exact price required");

    node.set_nonce(4);
    let out = node.auction(&ALICE, "unJail", vec![key.clone()], u(50)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    let d = staked(&node, &key).unwrap();
    assert!(!d.is_jailed());
    assert_eq!(d.un_jailed_nonce, 4);
    assert_eq!(d.stake_value, u(1_000));
    assert_eq!(node.ledger.balance(&ALICE), u(8_950));
    assert_eq!(
        node.ledger.storage(&AUCTION_SC_ADDRESS, UN_JAIL_FUNDS_KEY),
        u256_to_be(&u(50))
    );

    // a key that is not jailed gets its fee back
    let out = node.auction(&ALICE, "unJail", vec![key.clone()], u(50)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(key_status(&out.return_data, &key), Some(2));
    assert_eq!(node.ledger.balance(&ALICE), u(8_950));
    assert_eq!(
        node.ledger.storage(&AUCTION_SC_ADDRESS, UN_JAIL_FUNDS_KEY),
        u256_to_be(&u(50))
    );
}

#[test]
fn stake_waits_for_its_epoch() {
    let cfg = StakingSystemScConfig {
        stake_enable_epoch: 2,
        ..config()
    };
    let mut node = TestNode::new(cfg, DelegationManagerScConfig::default(), 2).unwrap();
    node.ledger.credit(&ALICE, u(5_000));
    node.set_nonce(10);
    let alice = Operator::new(ALICE, vec![node_key(7)]);

    let out = node.auction(&ALICE, "stake", alice.stake_args(), u(1_000)).unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
    assert!(out.return_message.contains("stake is not enabled"));
    assert_eq!(node.ledger.balance(&ALICE), u(5_000));

    node.set_epoch(2);
    let out = node.auction(&ALICE, "stake", alice.stake_args(), u(1_000)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(node.bid(&ALICE).unwrap().epoch, 2);
}

#[test]
fn total_staked_view() {
    let mut node = node(2);
    let alice = Operator::new(ALICE, vec![node_key(5)]);
    let out = node.auction(&ALICE, "getTotalStaked", vec![], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);

    let out = node.auction(&ALICE, "stake", alice.stake_args(), u(1_500)).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    let out = node.auction(&ALICE, "getTotalStaked", vec![], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(out.return_data, vec![b"1500".to_vec()]);
}
