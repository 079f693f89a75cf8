//! Well-known system addresses, function names and hashing tags.

/// Length of an account address.
pub const ADDRESS_LEN: usize = 32;

/// Deploy/initialisation entry point of every system contract.
pub const INIT_FUNCTION_NAME: &str = "_init";

/// Separator between function name and hex arguments in call data.
pub const ARGS_SEPARATOR: u8 = b'@';

/// Separator used when accumulating return messages.
pub const RETURN_MESSAGE_SEPARATOR: &str = "@";

/// Tag for the Fisher-Yates draws of the selection shuffle.
pub const TAG_SHUFFLE: &str = "sysvm.auction.shuffle";

/// Per-key result codes emitted as `(key, code)` pairs by batch operations.
/// Keys that succeed emit nothing.
pub const KEY_STATUS_INVALID_KEY: u8 = 1;
pub const KEY_STATUS_FAILED: u8 = 2;

const fn system_address(id: u8) -> [u8; ADDRESS_LEN] {
    let mut a = [0u8; ADDRESS_LEN];
    a[9] = 1;
    a[29] = id;
    a[30] = 0xff;
    a[31] = 0xff;
    a
}

pub const STAKING_SC_ADDRESS: [u8; ADDRESS_LEN] = system_address(1);
pub const AUCTION_SC_ADDRESS: [u8; ADDRESS_LEN] = system_address(2);
pub const DELEGATION_MANAGER_SC_ADDRESS: [u8; ADDRESS_LEN] = system_address(4);
/// Caller allowed to jail validators (end-of-epoch processing).
pub const JAILING_ADDRESS: [u8; ADDRESS_LEN] = system_address(0);

/// Template address of the delegation implementation; deployed instances
/// follow it as a big-endian counter.
pub const FIRST_DELEGATION_SC_ADDRESS: [u8; ADDRESS_LEN] = {
    let mut a = [0u8; ADDRESS_LEN];
    a[9] = 1;
    a
};
