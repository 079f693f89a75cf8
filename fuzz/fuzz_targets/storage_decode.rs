#![no_main]

use libfuzzer_sys::fuzz_target;
use sysvm_auction::{AuctionConfig, AuctionData};
use sysvm_delegation::{DelegationContractList, DelegationManagement};
use sysvm_staking::{StakedData, StakingNodesConfig};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must survive a canonical re-encode
    if let Ok(d) = StakedData::decode(data) {
        assert_eq!(StakedData::decode(&d.encode()), Ok(d));
    }
    if let Ok(d) = AuctionData::decode(data) {
        assert_eq!(AuctionData::decode(&d.encode()), Ok(d));
    }
    let _ = StakingNodesConfig::decode(data);
    let _ = AuctionConfig::decode(data);
    let _ = DelegationManagement::decode(data);
    let _ = DelegationContractList::decode(data);
});
