#![no_main]

use libfuzzer_sys::fuzz_target;
use sysvm_eei::{build_call_data, parse_call_data};

fuzz_target!(|data: &[u8]| {
    if let Ok(call) = parse_call_data(data) {
        let args: Vec<&[u8]> = call.arguments.iter().map(Vec::as_slice).collect();
        let rebuilt = build_call_data(&call.function, &args);
        // hex case may differ, the parsed form may not
        assert_eq!(parse_call_data(&rebuilt), Ok(call));
    }
});
