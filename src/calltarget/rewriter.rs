//! The instruction editor that receives the injected calls.
//!
//! The token synthesis never touches a method body directly. Everything it emits goes through
//! [`InstructionEditor`], which splices instructions at the editor's current position and
//! exposes the body's local variable signature token. [`InstructionList`] is a simple
//! in-memory editor over [`Instruction`]s that encodes to CIL bytes.
//!
//! # Encoding
//!
//! Local access uses the most compact form for the index:
//!
//! ```text
//! ldloc.0 .. ldloc.3   (1 byte)
//! ldloc.s <uint8>      (2 bytes)
//! ldloc <uint16>       (4 bytes)
//! ```

use std::fmt;

use crate::metadata::token::Token;

/// Splices instructions into one method body.
///
/// Implementations insert every instruction at their current position and advance past it,
/// so consecutive calls produce a contiguous sequence in call order.
pub trait InstructionEditor {
    /// Identifies an inserted instruction
    type Handle: Copy;

    /// Returns the body's local variable signature, [`Token::NIL`] if it has no locals
    fn local_var_sig(&self) -> Token;

    /// Replaces the body's local variable signature
    fn set_local_var_sig(&mut self, token: Token);

    /// Inserts `call <method>`
    fn call(&mut self, method: Token) -> Self::Handle;

    /// Inserts a load of the local at `index`
    fn load_local(&mut self, index: u16) -> Self::Handle;

    /// Inserts a store into the local at `index`
    fn store_local(&mut self, index: u16) -> Self::Handle;

    /// Inserts `ldnull`
    fn load_null(&mut self) -> Self::Handle;
}

/// The instructions injected around an instrumented method body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `call <token>`
    Call(Token),
    /// `ldloc` in its shortest form
    LoadLocal(u16),
    /// `stloc` in its shortest form
    StoreLocal(u16),
    /// `ldnull`
    LoadNull,
}

impl Instruction {
    /// Returns the mnemonic of the encoding selected for this instruction
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Call(_) => "call",
            Instruction::LoadLocal(0) => "ldloc.0",
            Instruction::LoadLocal(1) => "ldloc.1",
            Instruction::LoadLocal(2) => "ldloc.2",
            Instruction::LoadLocal(3) => "ldloc.3",
            Instruction::LoadLocal(x) if *x <= 255 => "ldloc.s",
            Instruction::LoadLocal(_) => "ldloc",
            Instruction::StoreLocal(0) => "stloc.0",
            Instruction::StoreLocal(1) => "stloc.1",
            Instruction::StoreLocal(2) => "stloc.2",
            Instruction::StoreLocal(3) => "stloc.3",
            Instruction::StoreLocal(x) if *x <= 255 => "stloc.s",
            Instruction::StoreLocal(_) => "stloc",
            Instruction::LoadNull => "ldnull",
        }
    }

    /// Returns the encoded size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Instruction::Call(_) => 5,
            Instruction::LoadLocal(x) | Instruction::StoreLocal(x) => match x {
                0..=3 => 1,
                4..=255 => 2,
                _ => 4,
            },
            Instruction::LoadNull => 1,
        }
    }

    /// Appends the CIL encoding to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Instruction::Call(token) => {
                out.push(0x28);
                out.extend_from_slice(&token.value().to_le_bytes());
            }
            Instruction::LoadLocal(index) => encode_local(out, index, 0x06, 0x11, 0x0C),
            Instruction::StoreLocal(index) => encode_local(out, index, 0x0A, 0x13, 0x0E),
            Instruction::LoadNull => out.push(0x14),
        }
    }
}

fn encode_local(out: &mut Vec<u8>, index: u16, short_base: u8, short_form: u8, long_form: u8) {
    match index {
        0..=3 => {
            #[allow(clippy::cast_possible_truncation)]
            out.push(short_base + index as u8);
        }
        4..=255 => {
            #[allow(clippy::cast_possible_truncation)]
            out.extend_from_slice(&[short_form, index as u8]);
        }
        _ => {
            out.extend_from_slice(&[0xFE, long_form]);
            out.extend_from_slice(&index.to_le_bytes());
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Call(token) => write!(f, "call {token}"),
            Instruction::LoadLocal(x) | Instruction::StoreLocal(x) if *x > 3 => {
                write!(f, "{} {x}", self.mnemonic())
            }
            _ => f.write_str(self.mnemonic()),
        }
    }
}

/// An in-memory method body with an insertion cursor.
///
/// Handles are the position an instruction had when it was inserted; inserting before an
/// instruction moves it without updating handles already handed out.
///
/// # Example
///
/// ```rust
/// use dotinject::calltarget::{Instruction, InstructionEditor, InstructionList};
/// use dotinject::metadata::token::Token;
///
/// let mut body = InstructionList::new(Token::NIL);
/// let first = body.load_null();
/// body.store_local(5);
///
/// assert_eq!(first, 0);
/// assert_eq!(body.instructions(), &[Instruction::LoadNull, Instruction::StoreLocal(5)]);
/// assert_eq!(body.encode(), vec![0x14, 0x13, 0x05]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
    cursor: usize,
    local_var_sig: Token,
}

impl InstructionList {
    /// Creates an empty body using `local_var_sig` as its local variable signature
    #[must_use]
    pub fn new(local_var_sig: Token) -> Self {
        InstructionList {
            instructions: Vec::new(),
            cursor: 0,
            local_var_sig,
        }
    }

    /// Creates a body holding `instructions`, with the cursor at the method entry
    #[must_use]
    pub fn with_instructions(local_var_sig: Token, instructions: Vec<Instruction>) -> Self {
        InstructionList {
            instructions,
            cursor: 0,
            local_var_sig,
        }
    }

    /// Moves the insertion cursor, clamped to the end of the body
    pub fn set_cursor(&mut self, position: usize) {
        self.cursor = position.min(self.instructions.len());
    }

    /// Returns the insertion cursor
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns all instructions in body order
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the body holds no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Encodes the body to CIL bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let size = self.instructions.iter().map(Instruction::size).sum();
        let mut out = Vec::with_capacity(size);
        for instruction in &self.instructions {
            instruction.encode(&mut out);
        }
        out
    }

    fn insert(&mut self, instruction: Instruction) -> usize {
        let position = self.cursor;
        self.instructions.insert(position, instruction);
        self.cursor += 1;
        position
    }
}

impl InstructionEditor for InstructionList {
    type Handle = usize;

    fn local_var_sig(&self) -> Token {
        self.local_var_sig
    }

    fn set_local_var_sig(&mut self, token: Token) {
        self.local_var_sig = token;
    }

    fn call(&mut self, method: Token) -> usize {
        self.insert(Instruction::Call(method))
    }

    fn load_local(&mut self, index: u16) -> usize {
        self.insert(Instruction::LoadLocal(index))
    }

    fn store_local(&mut self, index: u16) -> usize {
        self.insert(Instruction::StoreLocal(index))
    }

    fn load_null(&mut self) -> usize {
        self.insert(Instruction::LoadNull)
    }
}
