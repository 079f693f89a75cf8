//! Call-data wire form: `function@hex(arg1)@hex(arg2)...`.

use crate::errors::CallDataError;
use sysvm_primitives::constants::ARGS_SEPARATOR;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCall {
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
}

pub fn parse_call_data(data: &[u8]) -> Result<ParsedCall, CallDataError> {
    let mut parts = data.split(|&b| b == ARGS_SEPARATOR);
    let function = parts.next().unwrap_or_default();
    if function.is_empty() {
        return Err(CallDataError::EmptyFunction);
    }
    let function = std::str::from_utf8(function)
        .map_err(|_| CallDataError::FunctionEncoding)?
        .to_owned();
    let arguments = parts
        .enumerate()
        .map(|(index, p)| hex::decode(p).map_err(|_| CallDataError::InvalidHexArgument { index }))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedCall {
        function,
        arguments,
    })
}

/// Inverse of [`parse_call_data`].
#[must_use]
pub fn build_call_data(function: &str, arguments: &[&[u8]]) -> Vec<u8> {
    let mut out = function.as_bytes().to_vec();
    for a in arguments {
        out.push(ARGS_SEPARATOR);
        out.extend_from_slice(hex::encode(a).as_bytes());
    }
    out
}
