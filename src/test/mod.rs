use std::collections::HashMap;

use crate::{
    calltarget::{Instruction, InstructionEditor},
    metadata::{
        emit::{MemoryStore, MetadataStore},
        identity::{AssemblyIdentity, AssemblyVersion},
        token::Token,
    },
    Error, Result,
};

/// Identity of the .NET core library used by unit tests
pub fn corlib_identity() -> AssemblyIdentity {
    AssemblyIdentity::new("System.Private.CoreLib", AssemblyVersion::new(8, 0, 0, 0))
        .with_public_key_token([0x7c, 0xec, 0x85, 0xd7, 0xbe, 0xa7, 0x79, 0x8e])
}

/// A [`MemoryStore`] that can be told to reject selected calls.
///
/// Every invocation is counted per operation, including rejected ones. `fail_on("op", n)`
/// makes the n-th invocation (1-based) of `op` fail with [`Error::Definition`]; later
/// invocations succeed again.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: HashMap<&'static str, usize>,
    failures: Vec<(&'static str, usize)>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, operation: &'static str, nth: usize) -> Self {
        self.failures.push((operation, nth));
        self
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.get(operation).copied().unwrap_or_default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&mut self, operation: &'static str) -> Result<()> {
        let count = self.calls.entry(operation).or_default();
        *count += 1;

        let count = *count;
        if self
            .failures
            .iter()
            .any(|(op, nth)| *op == operation && *nth == count)
        {
            return Err(Error::definition(operation, "rejected by test store"));
        }
        Ok(())
    }
}

impl MetadataStore for RecordingStore {
    fn define_assembly_ref(&mut self, identity: &AssemblyIdentity) -> Result<Token> {
        self.check("define_assembly_ref")?;
        self.inner.define_assembly_ref(identity)
    }

    fn define_type_ref_by_name(&mut self, scope: Token, name: &str) -> Result<Token> {
        self.check("define_type_ref_by_name")?;
        self.inner.define_type_ref_by_name(scope, name)
    }

    fn define_member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token> {
        self.check("define_member_ref")?;
        self.inner.define_member_ref(parent, name, signature)
    }

    fn define_method_spec(&mut self, parent: Token, instantiation: &[u8]) -> Result<Token> {
        self.check("define_method_spec")?;
        self.inner.define_method_spec(parent, instantiation)
    }

    fn token_from_signature(&mut self, signature: &[u8]) -> Result<Token> {
        self.check("token_from_signature")?;
        self.inner.token_from_signature(signature)
    }

    fn token_from_type_spec(&mut self, signature: &[u8]) -> Result<Token> {
        self.check("token_from_type_spec")?;
        self.inner.token_from_type_spec(signature)
    }

    fn signature_from_token(&self, token: Token) -> Result<Vec<u8>> {
        self.inner.signature_from_token(token)
    }

    fn type_spec_from_token(&self, token: Token) -> Result<Vec<u8>> {
        self.inner.type_spec_from_token(token)
    }
}

/// An editor that appends every instruction and records local signature changes
#[derive(Debug, Default)]
pub struct RecordingEditor {
    pub instructions: Vec<Instruction>,
    pub local_var_sig: Token,
    pub local_var_sig_updates: Vec<Token>,
}

impl RecordingEditor {
    pub fn new(local_var_sig: Token) -> Self {
        RecordingEditor {
            local_var_sig,
            ..Self::default()
        }
    }

    fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }
}

impl InstructionEditor for RecordingEditor {
    type Handle = usize;

    fn local_var_sig(&self) -> Token {
        self.local_var_sig
    }

    fn set_local_var_sig(&mut self, token: Token) {
        self.local_var_sig = token;
        self.local_var_sig_updates.push(token);
    }

    fn call(&mut self, method: Token) -> usize {
        self.push(Instruction::Call(method))
    }

    fn load_local(&mut self, index: u16) -> usize {
        self.push(Instruction::LoadLocal(index))
    }

    fn store_local(&mut self, index: u16) -> usize {
        self.push(Instruction::StoreLocal(index))
    }

    fn load_null(&mut self) -> usize {
        self.push(Instruction::LoadNull)
    }
}
