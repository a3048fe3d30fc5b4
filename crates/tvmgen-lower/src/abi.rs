//! Chain-data encoding and decoding. Values travel in a prefix-then-refs
//! layout: a value is written inline while the running offset plus its
//! worst-case width still fits one cell, otherwise the rest of the list
//! overflows into a fresh reference cell.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use tvmgen_core::consts::{CELL_BIT_LENGTH, MAX_CELL_REFS};
use tvmgen_core::pusher::{add_binary_number_to_string, StackPusher};

use crate::ast::VarDecl;
use crate::types::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundReason {
    RemoteCallInternal,
    FunctionReturnExternal,
    EmitEventExternal,
}

/// 32-bit stable hash of a public signature. Answer ids set the top bit.
pub fn function_id(name: &str, inputs: &[Ty], outputs: &[Ty], reason: OutboundReason) -> u32 {
    let ins: Vec<String> = inputs.iter().map(|t| t.abi_name()).collect();
    let outs: Vec<String> = outputs.iter().map(|t| t.abi_name()).collect();
    let signature = format!("{}({})({})v2", name, ins.join(","), outs.join(","));
    let digest = Sha256::digest(signature.as_bytes());
    let id = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & 0x7FFF_FFFF;
    match reason {
        OutboundReason::FunctionReturnExternal => id | 0x8000_0000,
        OutboundReason::RemoteCallInternal | OutboundReason::EmitEventExternal => id,
    }
}

pub fn function_id_of(
    name: &str,
    inputs: &[VarDecl],
    outputs: &[VarDecl],
    reason: OutboundReason,
) -> u32 {
    let ins: Vec<Ty> = inputs.iter().map(|v| v.ty.clone()).collect();
    let outs: Vec<Ty> = outputs.iter().map(|v| v.ty.clone()).collect();
    function_id(name, &ins, &outs, reason)
}

pub fn constructor_function_id() -> u32 {
    function_id("constructor", &[], &[], OutboundReason::RemoteCallInternal)
}

/// Running bit/ref offsets inside the cell currently being filled.
#[derive(Debug, Clone)]
pub struct EncodePosition {
    used_bits: usize,
    used_refs: usize,
}

impl EncodePosition {
    pub fn new(offset_bits: usize) -> Self {
        Self { used_bits: offset_bits, used_refs: 0 }
    }

    /// Commits `ty` to the current cell if it fits, keeping one reference
    /// spare for overflow chaining.
    pub fn try_fit(&mut self, ty: &Ty) -> bool {
        if self.used_bits + ty.max_bits() <= CELL_BIT_LENGTH
            && self.used_refs + ty.max_refs() <= MAX_CELL_REFS - 1
        {
            self.used_bits += ty.max_bits();
            self.used_refs += ty.max_refs();
            true
        } else {
            false
        }
    }

    fn new_cell(&mut self) {
        self.used_bits = 0;
        self.used_refs = 0;
    }
}

/// Where the 32-bit id of a message body comes from.
pub enum BodyId<'a> {
    Const(u32),
    FromStack(&'a mut dyn FnMut(&mut StackPusher)),
}

pub struct ChainDataEncoder<'a> {
    pub p: &'a mut StackPusher,
}

impl<'a> ChainDataEncoder<'a> {
    pub fn new(p: &'a mut StackPusher) -> Self {
        Self { p }
    }

    /// Stack: `v_n … v_1 builder` with the first value directly under the
    /// builder. Consumes all values, leaving the extended builder.
    pub fn encode_parameters(&mut self, types: &[Ty], position: &mut EncodePosition) {
        let mut i = 0;
        while i < types.len() {
            let ty = &types[i];
            if position.try_fit(ty) {
                store_value(self.p, ty);
                i += 1;
            } else {
                // the rest of the list moves into a child cell
                let rest = types.len() - i;
                self.p.block_swap(rest as i32, 1);
                self.p.push(1, "NEWC");
                position.new_cell();
                self.encode_parameters(&types[i..], position);
                self.p.push(-1, "STBREFR");
                return;
            }
        }
    }

    /// Appends the body-presence bit, the function id and the encoded
    /// parameters to the builder, inlining when everything fits after
    /// `builder_bits`, otherwise branching the body into a reference.
    pub fn create_msg_body_and_append(
        &mut self,
        param_types: &[Ty],
        id: BodyId<'_>,
        builder_bits: usize,
    ) {
        let total_bits: usize = param_types.iter().map(|t| t.max_bits()).sum();
        let total_refs: usize = param_types.iter().map(|t| t.max_refs()).sum();
        let inline = builder_bits + 32 + total_bits <= CELL_BIT_LENGTH
            && total_refs <= MAX_CELL_REFS - 1;

        if inline {
            self.p.append_to_builder("0");
            self.append_id(id);
            let mut position = EncodePosition::new(builder_bits + 1 + 32);
            self.encode_parameters(param_types, &mut position);
        } else {
            self.p.append_to_builder("1");
            self.p.block_swap(param_types.len() as i32, 1);
            self.p.push(1, "NEWC");
            self.append_id(id);
            let mut position = EncodePosition::new(32);
            self.encode_parameters(param_types, &mut position);
            self.p.push(-1, "STBREFR");
        }
    }

    fn append_id(&mut self, id: BodyId<'_>) {
        match id {
            BodyId::Const(value) => {
                let mut bits = String::new();
                add_binary_number_to_string(&mut bits, &BigUint::from(value), 32);
                self.p.append_to_builder(&bits);
            }
            BodyId::FromStack(push_id) => {
                push_id(self.p);
                self.p.push(-1, "STUR 32");
            }
        }
    }
}

/// Stack: `value builder`. Consumes both, leaves the extended builder.
pub fn store_value(p: &mut StackPusher, ty: &Ty) {
    match ty {
        Ty::Bool => p.push(-1, "STI 1"),
        Ty::Uint(bits) => p.push(-1, &format!("STU {bits}")),
        Ty::Int(bits) => p.push(-1, &format!("STI {bits}")),
        Ty::VarUint(_) => {
            p.exchange(1);
            p.push(-1, "STGRAMS");
        }
        Ty::Address | Ty::Slice => p.push(-1, "STSLICE"),
        Ty::Cell | Ty::Bytes | Ty::Str => p.push(-1, "STREF"),
        Ty::Builder => p.push(-1, "STB"),
        Ty::Mapping(_, _) => p.push(-1, "STDICT"),
        Ty::Array(_) => {
            // {length, dict} pair under the builder
            p.exchange(1);
            p.push(-1 + 2, "UNPAIR");
            p.exchange(2);
            p.push(-1, "STU 32");
            p.push(-1, "STDICT");
        }
        Ty::FunctionValue => p.push(-1, "STU 32"),
        Ty::Optional(_) | Ty::Tuple(_) => {
            panic!("unsupported encode of {ty}")
        }
    }
}

pub struct ChainDataDecoder<'a> {
    pub p: &'a mut StackPusher,
}

impl<'a> ChainDataDecoder<'a> {
    pub fn new(p: &'a mut StackPusher) -> Self {
        Self { p }
    }

    /// Stack: `slice`. Loads every value in order (first value deepest),
    /// hopping to the next reference cell at the same offsets the encoder
    /// chose, and closes the last slice with ENDS.
    pub fn decode_data(&mut self, types: &[Ty], offset_bits: usize) {
        let mut position = EncodePosition::new(offset_bits);
        for ty in types {
            if !position.try_fit(ty) {
                self.p.push(-1 + 2, "LDREF");
                self.p.push(-1, "ENDS");
                self.p.push(0, "CTOS");
                position.new_cell();
                let fits = position.try_fit(ty);
                assert!(fits, "{ty} does not fit an empty cell");
            }
            load_value(self.p, ty);
        }
        self.p.push(-1, "ENDS");
    }

    /// Message-body variant: the function id (and the callback id of a
    /// responsible call) have already been consumed.
    pub fn decode_public_function_parameters(
        &mut self,
        types: &[Ty],
        is_responsible: bool,
    ) {
        let offset = 32 + if is_responsible { 32 } else { 0 };
        self.decode_data(types, offset);
    }
}

/// Stack: `slice`. Leaves `value slice'`.
pub fn load_value(p: &mut StackPusher, ty: &Ty) {
    match ty {
        Ty::Bool => p.push(1, "LDI 1"),
        Ty::Uint(bits) => p.push(1, &format!("LDU {bits}")),
        Ty::Int(bits) => p.push(1, &format!("LDI {bits}")),
        Ty::VarUint(_) => p.push(1, "LDVARUINT32"),
        Ty::Address => p.push(1, "LDMSGADDR"),
        Ty::Cell | Ty::Bytes | Ty::Str => p.push(1, "LDREF"),
        Ty::Mapping(_, _) => p.push(1, "LDDICT"),
        Ty::FunctionValue => p.push(1, "LDU 32"),
        Ty::Array(_) => {
            p.push(1, "LDU 32");
            p.push(1, "LDDICT");
            p.rot_rev();
            p.push(-1, "PAIR");
            p.exchange(1);
        }
        Ty::Slice | Ty::Builder | Ty::Optional(_) | Ty::Tuple(_) => {
            panic!("unsupported decode of {ty}")
        }
    }
}

/// Stack: `slice`. Leaves only the decoded `value`.
pub fn preload_value(p: &mut StackPusher, ty: &Ty) {
    match ty {
        Ty::Bool => p.push(0, "PLDI 1"),
        Ty::Uint(bits) => p.push(0, &format!("PLDU {bits}")),
        Ty::Int(bits) => p.push(0, &format!("PLDI {bits}")),
        Ty::Address => {
            p.push(1, "LDMSGADDR");
            p.drop(1);
        }
        Ty::Cell | Ty::Bytes | Ty::Str => p.push(0, "PLDREF"),
        Ty::Mapping(_, _) => p.push(0, "PLDDICT"),
        Ty::FunctionValue => p.push(0, "PLDU 32"),
        Ty::Array(_) => {
            p.push(1, "LDU 32");
            p.push(0, "PLDDICT");
            p.push(-1, "PAIR");
        }
        _ => panic!("unsupported decode of {ty}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_ids_are_stable_and_distinct() {
        let a = function_id("transfer", &[Ty::Address, Ty::Uint(128)], &[], OutboundReason::RemoteCallInternal);
        let b = function_id("transfer", &[Ty::Address, Ty::Uint(128)], &[], OutboundReason::RemoteCallInternal);
        assert_eq!(a, b);
        assert!(a < 0x8000_0000, "call ids keep the top bit clear");

        let other = function_id("transfer", &[Ty::Address, Ty::Uint(64)], &[], OutboundReason::RemoteCallInternal);
        assert_ne!(a, other, "the signature participates in the hash");
    }

    #[test]
    fn test_answer_id_sets_the_top_bit() {
        let call = function_id("getBalance", &[], &[Ty::Uint(128)], OutboundReason::RemoteCallInternal);
        let answer = function_id("getBalance", &[], &[Ty::Uint(128)], OutboundReason::FunctionReturnExternal);
        assert_eq!(answer, call | 0x8000_0000);
    }

    #[test]
    fn test_encode_position_opens_reference_on_overflow() {
        let mut position = EncodePosition::new(900);
        assert!(position.try_fit(&Ty::Uint(64)));
        assert!(!position.try_fit(&Ty::Uint(256)), "964 + 256 exceeds the cell");
        position.new_cell();
        assert!(position.try_fit(&Ty::Uint(256)));
    }

    #[test]
    fn test_encode_position_keeps_a_spare_reference() {
        let mut position = EncodePosition::new(0);
        assert!(position.try_fit(&Ty::Cell));
        assert!(position.try_fit(&Ty::Cell));
        assert!(position.try_fit(&Ty::Cell));
        assert!(!position.try_fit(&Ty::Cell), "the fourth reference is reserved for chaining");
    }
}
