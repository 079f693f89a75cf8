use crate::context::VmContext;
use crate::contract::SystemEi;
use crate::errors::EeiError;
use crate::types::{ContractCallInput, ReturnCode, VmOutput};
use sysvm_primitives::constants::INIT_FUNCTION_NAME;
use tracing::{debug, Span};

/// Top-level runner for transactions addressed to system contracts.
///
/// Only an `Ok` call produces state changes; any other code yields an output
/// carrying the code and the accumulated message, and contracts deployed
/// during the call are unregistered again.
pub struct SystemVm {
    context: VmContext,
    span: Span,
}

impl SystemVm {
    #[must_use]
    pub const fn new(context: VmContext, span: Span) -> Self {
        Self { context, span }
    }

    #[must_use]
    pub const fn context(&self) -> &VmContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut VmContext {
        &mut self.context
    }

    pub fn run_smart_contract_call(&mut self, input: &ContractCallInput) -> Result<VmOutput, EeiError> {
        self.prepare(input);
        let contract = self.context.system_contracts().get(&input.recipient_addr)?;
        if input.function == INIT_FUNCTION_NAME {
            return Ok(VmOutput::failed(
                ReturnCode::UserError,
                "cannot call smart contract init function",
            ));
        }
        let code = contract.execute(&mut self.context, input);
        Ok(self.finalize(code))
    }

    /// Runs the init function of the contract registered at the recipient.
    pub fn run_smart_contract_create(&mut self, input: &ContractCallInput) -> Result<VmOutput, EeiError> {
        self.prepare(input);
        let contract = self.context.system_contracts().get(&input.recipient_addr)?;
        let init = ContractCallInput {
            function: INIT_FUNCTION_NAME.to_owned(),
            ..input.clone()
        };
        let code = contract.execute(&mut self.context, &init);
        Ok(self.finalize(code))
    }

    fn prepare(&mut self, input: &ContractCallInput) {
        self.context.clean_cache();
        self.context.set_sc_address(&input.recipient_addr);
        self.context
            .add_tx_value_to_smart_contract(input.call_value, &input.recipient_addr);
        self.context.set_gas_provided(input.gas_provided);
    }

    fn finalize(&mut self, code: ReturnCode) -> VmOutput {
        if code == ReturnCode::Ok {
            let mut out = self.context.create_vm_output();
            out.return_code = code;
            return out;
        }
        debug!(parent: &self.span, %code, message = self.context.return_message(), "system call failed");
        self.context.rollback_deployments();
        VmOutput::failed(code, self.context.return_message())
    }
}
