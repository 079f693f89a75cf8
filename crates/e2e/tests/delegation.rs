//! Delegation contracts deployed through the manager, end to end.

use e2e::{StakingSystemScConfig, TestNode, OWNER};
use sysvm_delegation::{next_delegation_address, DelegationContractList, DELEGATION_CONTRACTS_KEY};
use sysvm_eei::{DelegationManagerScConfig, ReturnCode};
use sysvm_primitives::constants::{DELEGATION_MANAGER_SC_ADDRESS, FIRST_DELEGATION_SC_ADDRESS};
use sysvm_primitives::{u256_to_be, U256};

const CAROL: [u8; 32] = [0x03; 32];
const DAVE: [u8; 32] = [0x04; 32];

fn node() -> TestNode {
    let delegation = DelegationManagerScConfig {
        base_issuing_cost: "100".into(),
        min_creation_deposit: "1000".into(),
        enabled_epoch: 0,
    };
    let node = TestNode::new(StakingSystemScConfig::default(), delegation, 2).unwrap();
    node.ledger.credit(&CAROL, U256::from(5_000u64));
    node.ledger.credit(&DAVE, U256::from(5_000u64));
    node.set_nonce(1);
    node
}

#[test]
fn creates_and_registers_delegation_contracts() {
    let mut node = node();
    let first = next_delegation_address(&FIRST_DELEGATION_SC_ADDRESS).unwrap();
    let second = next_delegation_address(&first).unwrap();

    let out = node
        .call(&CAROL, &DELEGATION_MANAGER_SC_ADDRESS, "createNewDelegationContract", vec![], U256::from(1_099u64))
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
    assert!(out.return_message.contains("not enough call value"));

    let out = node
        .call(&CAROL, &DELEGATION_MANAGER_SC_ADDRESS, "createNewDelegationContract", vec![], U256::from(1_500u64))
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok, "{}", out.return_message);
    assert_eq!(node.ledger.balance(&CAROL), U256::from(3_500u64));
    assert_eq!(node.ledger.balance(&first), U256::from(1_400u64));
    assert_eq!(node.ledger.balance(&DELEGATION_MANAGER_SC_ADDRESS), U256::from(100u64));
    assert_eq!(node.ledger.code(&first), FIRST_DELEGATION_SC_ADDRESS.to_vec());
    assert_eq!(node.ledger.storage(&DELEGATION_MANAGER_SC_ADDRESS, &CAROL), first);

    // the deployed contract is live and knows its owner
    let out = node.call(&DAVE, &first, "owner", vec![], U256::zero()).unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(out.return_data, vec![CAROL.to_vec()]);

    let out = node
        .call(&CAROL, &DELEGATION_MANAGER_SC_ADDRESS, "createNewDelegationContract", vec![], U256::from(1_500u64))
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);

    let out = node
        .call(&DAVE, &DELEGATION_MANAGER_SC_ADDRESS, "createNewDelegationContract", vec![], U256::from(2_000u64))
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(node.ledger.balance(&second), U256::from(1_900u64));

    let list = DelegationContractList::decode(
        &node.ledger.storage(&DELEGATION_MANAGER_SC_ADDRESS, DELEGATION_CONTRACTS_KEY),
    )
    .unwrap();
    assert_eq!(list.addresses, vec![first, second]);
}

#[test]
fn management_is_closed_to_outside_callers() {
    let mut node = node();
    for function in ["changeBaseIssuingCost", "changeMinDeposit"] {
        let out = node
            .call(&OWNER, &DELEGATION_MANAGER_SC_ADDRESS, function, vec![u256_to_be(&U256::one())], U256::zero())
            .unwrap();
        assert_eq!(out.return_code, ReturnCode::UserError, "{function}");
    }
    let out = node
        .call(&OWNER, &DELEGATION_MANAGER_SC_ADDRESS, "getAllContractAddresses", vec![], U256::zero())
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
}
