use primitive_types::U256;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use sysvm_eei::{
    build_call_data, ArgsVmContext, BlockchainHook, ContractCallInput, EeiError, HookError,
    PeerList, ReturnCode, SystemContract, SystemEi, SystemScContainer, SystemVm,
    ValidatorAccounts, VmContext,
};
use sysvm_primitives::BalanceDelta;
use tracing::Span;

#[derive(Default)]
struct MemHook {
    storage: Mutex<BTreeMap<(Vec<u8>, Vec<u8>), Vec<u8>>>,
    balances: Mutex<BTreeMap<Vec<u8>, U256>>,
}

impl BlockchainHook for MemHook {
    fn get_storage_data(&self, address: &[u8], key: &[u8]) -> Result<Vec<u8>, HookError> {
        Ok(self
            .storage
            .lock()
            .unwrap()
            .get(&(address.to_vec(), key.to_vec()))
            .cloned()
            .unwrap_or_default())
    }
    fn get_balance(&self, address: &[u8]) -> Result<U256, HookError> {
        self.balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .ok_or(HookError::AccountNotFound)
    }
    fn current_nonce(&self) -> u64 {
        1
    }
    fn current_round(&self) -> u64 {
        1
    }
    fn current_epoch(&self) -> u32 {
        0
    }
    fn current_random_seed(&self) -> Vec<u8> {
        vec![0; 32]
    }
}

struct Peers;
impl ValidatorAccounts for Peers {
    fn peer_list(&self, bls_key: &[u8]) -> Option<PeerList> {
        match bls_key {
            b"eligible" => Some(PeerList::Eligible),
            b"waiting" => Some(PeerList::Waiting),
            b"leaving" => Some(PeerList::Leaving),
            _ => None,
        }
    }
}

/// Writes `key -> value`, echoes the value, fails on demand.
struct Store;
impl SystemContract for Store {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        match input.function.as_str() {
            "_init" => {
                eei.set_storage(b"owner", &input.caller_addr);
                ReturnCode::Ok
            }
            "put" => {
                eei.set_storage(&input.arguments[0], &input.arguments[1]);
                eei.finish(&input.arguments[1]);
                ReturnCode::Ok
            }
            "putThenFail" => {
                eei.set_storage(&input.arguments[0], &input.arguments[1]);
                eei.add_return_message("store failed");
                ReturnCode::UserError
            }
            "burn" => match eei.use_gas(10) {
                Ok(()) => ReturnCode::Ok,
                Err(_) => ReturnCode::OutOfGas,
            },
            _ => ReturnCode::FunctionWrongSignature,
        }
    }
}

/// Forwards its raw first argument as call data to `STORE`.
struct Proxy;
impl SystemContract for Proxy {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        eei.finish(b"before");
        eei.add_return_message("proxy");
        match eei.execute_on_dest_context(STORE, PROXY, input.call_value, &input.arguments[0]) {
            Ok(out) => {
                for d in &out.return_data {
                    eei.finish(d);
                }
                out.return_code
            }
            Err(_) => ReturnCode::UserError,
        }
    }
}

/// Deploys a copy of `STORE` at the address given as first argument.
struct Factory;
impl SystemContract for Factory {
    fn execute(&self, eei: &mut dyn SystemEi, input: &ContractCallInput) -> ReturnCode {
        match eei.deploy_system_sc(STORE, &input.arguments[0], &input.caller_addr, input.call_value, &[]) {
            Ok(code) => code,
            Err(_) => ReturnCode::UserError,
        }
    }
}

const STORE: &[u8] = b"store-address-000000000000000000";
const PROXY: &[u8] = b"proxy-address-000000000000000000";
const FACTORY: &[u8] = b"factory-address-0000000000000000";
const ALICE: &[u8] = b"alice-address-000000000000000000";

fn new_context(hook: Arc<MemHook>) -> VmContext {
    let mut ctx = VmContext::new(ArgsVmContext {
        blockchain_hook: hook,
        validator_accounts: Arc::new(Peers),
        span: Span::none(),
    });
    let mut container = SystemScContainer::new();
    container.add(STORE, Arc::new(Store)).unwrap();
    container.add(PROXY, Arc::new(Proxy)).unwrap();
    container.add(FACTORY, Arc::new(Factory)).unwrap();
    ctx.set_system_sc_container(container);
    ctx.set_sc_address(STORE);
    ctx
}

#[test]
fn storage_reads_prefer_buffer_over_hook() {
    let hook = Arc::new(MemHook::default());
    hook.storage
        .lock()
        .unwrap()
        .insert((STORE.to_vec(), b"k".to_vec()), b"committed".to_vec());
    let mut ctx = new_context(hook);
    assert_eq!(ctx.get_storage(b"k"), b"committed");
    assert!(ctx.get_storage(b"missing").is_empty());
    ctx.set_storage(b"k", b"buffered");
    assert_eq!(ctx.get_storage(b"k"), b"buffered");
    assert_eq!(ctx.get_storage_from_address(STORE, b"k"), b"buffered");
    assert!(ctx.get_storage_from_address(PROXY, b"k").is_empty());
}

#[test]
fn balance_caches_committed_and_applies_delta() {
    let hook = Arc::new(MemHook::default());
    hook.balances.lock().unwrap().insert(ALICE.to_vec(), U256::from(100u64));
    let mut ctx = new_context(hook.clone());
    // first touch through transfer, committed balance still read on demand
    ctx.transfer(STORE, ALICE, U256::from(30u64), b"memo", 5);
    assert_eq!(ctx.get_balance(ALICE), U256::from(70u64));
    hook.balances.lock().unwrap().insert(ALICE.to_vec(), U256::from(1_000u64));
    assert_eq!(ctx.get_balance(ALICE), U256::from(70u64), "committed value is cached");
    // unknown accounts read as zero plus delta
    assert_eq!(ctx.get_balance(STORE), U256::from(30u64));

    let out = ctx.create_vm_output();
    let store = &out.output_accounts[STORE];
    assert_eq!(store.balance_delta, BalanceDelta::positive(U256::from(30u64)));
    assert_eq!(store.data, b"memo");
    assert_eq!(store.gas_limit, 5);
    assert!(out.output_accounts[ALICE].balance_delta.is_negative());
}

#[test]
fn gas_is_a_single_counter() {
    let mut ctx = new_context(Arc::new(MemHook::default()));
    ctx.set_gas_provided(15);
    assert_eq!(ctx.use_gas(10), Ok(()));
    assert_eq!(ctx.use_gas(10), Err(EeiError::NotEnoughGas));
    assert_eq!(ctx.gas_remaining(), 5);
}

#[test]
fn return_messages_join_with_at() {
    let mut ctx = new_context(Arc::new(MemHook::default()));
    ctx.add_return_message("a");
    ctx.add_return_message("b");
    assert_eq!(ctx.return_message(), "a@b");
}

#[test]
fn validator_membership_is_eligible_or_waiting() {
    let ctx = new_context(Arc::new(MemHook::default()));
    assert!(ctx.is_validator(b"eligible"));
    assert!(ctx.is_validator(b"waiting"));
    assert!(!ctx.is_validator(b"leaving"));
    assert!(!ctx.is_validator(b"unknown"));
}

#[test]
fn nested_call_switches_address_and_restores_frame() {
    let mut ctx = new_context(Arc::new(MemHook::default()));
    ctx.set_sc_address(PROXY);
    ctx.finish(b"caller-data");
    ctx.add_return_message("caller");
    let data = build_call_data("put", &[b"k", b"v"]);
    let out = ctx
        .execute_on_dest_context(STORE, PROXY, U256::from(3u64), &data)
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(out.return_data, vec![b"v".to_vec()]);
    assert_eq!(out.storage_at(STORE, b"k"), Some(&b"v"[..]));

    assert_eq!(ctx.sc_address(), PROXY);
    assert_eq!(ctx.get_storage_from_address(STORE, b"k"), b"v");
    assert!(ctx.get_storage(b"k").is_empty(), "written under the callee address");
    let own = ctx.create_vm_output();
    assert_eq!(own.return_data, vec![b"caller-data".to_vec()]);
    assert_eq!(own.output_accounts[STORE].balance_delta, BalanceDelta::positive(U256::from(3u64)));
}

#[test]
fn failed_nested_call_keeps_storage_and_appends_message() {
    let mut ctx = new_context(Arc::new(MemHook::default()));
    ctx.set_sc_address(PROXY);
    ctx.add_return_message("caller");
    let data = build_call_data("putThenFail", &[b"k", b"v"]);
    let out = ctx.execute_on_dest_context(STORE, PROXY, U256::zero(), &data).unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
    assert_eq!(out.return_message, "store failed");
    assert!(out.output_accounts.is_empty());
    assert_eq!(ctx.get_storage_from_address(STORE, b"k"), b"v");
    assert_eq!(ctx.return_message(), "caller@store failed");
}

#[test]
fn nested_init_is_forbidden() {
    let mut ctx = new_context(Arc::new(MemHook::default()));
    let out = ctx.execute_on_dest_context(STORE, PROXY, U256::zero(), b"_init").unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
    assert_eq!(out.return_message, "cannot call smart contract init function");
    assert!(ctx.get_storage_from_address(STORE, b"owner").is_empty());
}

#[test]
fn nested_call_errors() {
    let mut ctx = new_context(Arc::new(MemHook::default()));
    assert!(matches!(
        ctx.execute_on_dest_context(STORE, PROXY, U256::zero(), b"put@zz"),
        Err(EeiError::CallData(_))
    ));
    assert_eq!(
        ctx.execute_on_dest_context(b"nobody", PROXY, U256::zero(), b"put"),
        Err(EeiError::UnknownSystemSmartContract)
    );
}

fn vm(hook: Arc<MemHook>) -> SystemVm {
    SystemVm::new(new_context(hook), Span::none())
}

#[test]
fn runner_outputs_state_only_on_ok() {
    let mut vm = vm(Arc::new(MemHook::default()));
    let ok = vm
        .run_smart_contract_call(
            &ContractCallInput::new(ALICE, STORE, "put")
                .with_args(vec![b"k".to_vec(), b"v".to_vec()])
                .with_value(U256::from(9u64))
                .with_gas(100),
        )
        .unwrap();
    assert_eq!(ok.return_code, ReturnCode::Ok);
    assert_eq!(ok.gas_remaining, 100);
    assert_eq!(ok.storage_at(STORE, b"k"), Some(&b"v"[..]));
    assert_eq!(ok.output_accounts[STORE].balance_delta, BalanceDelta::positive(U256::from(9u64)));

    let failed = vm
        .run_smart_contract_call(
            &ContractCallInput::new(ALICE, STORE, "putThenFail")
                .with_args(vec![b"k".to_vec(), b"v".to_vec()]),
        )
        .unwrap();
    assert_eq!(failed.return_code, ReturnCode::UserError);
    assert_eq!(failed.return_message, "store failed");
    assert!(failed.output_accounts.is_empty());
    assert_eq!(failed.gas_remaining, 0);

    let oog = vm
        .run_smart_contract_call(&ContractCallInput::new(ALICE, STORE, "burn").with_gas(3))
        .unwrap();
    assert_eq!(oog.return_code, ReturnCode::OutOfGas);
}

#[test]
fn runner_rejects_init_and_unknown_contracts() {
    let mut vm = vm(Arc::new(MemHook::default()));
    let out = vm
        .run_smart_contract_call(&ContractCallInput::new(ALICE, STORE, "_init"))
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::UserError);
    assert_eq!(
        vm.run_smart_contract_call(&ContractCallInput::new(ALICE, b"nobody", "put")),
        Err(EeiError::UnknownSystemSmartContract)
    );
    let created = vm
        .run_smart_contract_create(&ContractCallInput::new(ALICE, STORE, "anything"))
        .unwrap();
    assert_eq!(created.return_code, ReturnCode::Ok);
    assert_eq!(created.storage_at(STORE, b"owner"), Some(ALICE));
}

#[test]
fn proxy_sees_nested_output_through_runner() {
    let mut vm = vm(Arc::new(MemHook::default()));
    let data = build_call_data("put", &[b"k", b"v"]);
    let out = vm
        .run_smart_contract_call(&ContractCallInput::new(ALICE, PROXY, "forward").with_args(vec![data]))
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert_eq!(out.return_data, vec![b"before".to_vec(), b"v".to_vec()]);
    assert_eq!(out.return_message, "proxy");
    assert_eq!(out.storage_at(STORE, b"k"), Some(&b"v"[..]));
}

#[test]
fn deployment_registers_runs_init_and_moves_value() {
    let mut vm = vm(Arc::new(MemHook::default()));
    let new_addr = b"deployed-address-000000000000000".to_vec();
    let out = vm
        .run_smart_contract_call(
            &ContractCallInput::new(ALICE, FACTORY, "deploy")
                .with_args(vec![new_addr.clone()])
                .with_value(U256::from(50u64)),
        )
        .unwrap();
    assert_eq!(out.return_code, ReturnCode::Ok);
    assert!(vm.context().system_contracts().contains(&new_addr));
    assert_eq!(out.storage_at(&new_addr, b"owner"), Some(ALICE));
    assert_eq!(out.output_accounts[&new_addr].code, STORE);
    assert_eq!(out.output_accounts[&new_addr].balance_delta, BalanceDelta::positive(U256::from(50u64)));
    assert_eq!(out.output_accounts[FACTORY].balance_delta, BalanceDelta::zero());

    // second deployment at the same address is refused
    let again = vm
        .run_smart_contract_call(&ContractCallInput::new(ALICE, FACTORY, "deploy").with_args(vec![new_addr]))
        .unwrap();
    assert_eq!(again.return_code, ReturnCode::UserError);
}
