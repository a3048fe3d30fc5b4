//! Table of implicit language-provided identifiers. Magic identifiers get
//! stable negative ids so the resolver can tell them apart from user
//! declarations at a glance.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::ContractDef;
use crate::types::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicKind {
    Abi,
    Block,
    Math,
    Message,
    Rnd,
    Transaction,
    Tvm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMutability {
    Pure,
    View,
    NonPayable,
}

#[derive(Debug, Clone)]
pub struct BuiltinSignature {
    pub params: Vec<Ty>,
    pub results: Vec<Ty>,
    pub takes_arbitrary: bool,
    pub mutability: BuiltinMutability,
}

#[derive(Debug, Clone)]
pub enum MagicBinding {
    Magic(MagicKind),
    Function(BuiltinSignature),
    Value(Ty),
    /// Interface of the named contract; `super_access` selects the base
    /// implementations.
    ContractRef { contract: String, super_access: bool },
}

#[derive(Debug, Clone)]
pub struct MagicDeclaration {
    pub id: i32,
    pub name: String,
    pub binding: MagicBinding,
}

/// Stable identifier of a magic name. The `format`/`rnd` pair shared an
/// id historically; `rnd` now owns the previously unused -107.
pub fn magic_id(name: &str) -> Option<i32> {
    let id = match name {
        "abi" => -1,
        "addmod" => -2,
        "assert" => -3,
        "block" => -4,
        "blockhash" => -5,
        "ecrecover" => -6,
        "gasleft" => -7,
        "keccak256" => -8,
        "log0" => -10,
        "log1" => -11,
        "log2" => -12,
        "log3" => -13,
        "log4" => -14,
        "msg" => -15,
        "mulmod" => -16,
        "now" => -17,
        "require" => -18,
        "revert" => -19,
        "ripemd160" => -20,
        "selfdestruct" => -21,
        "sha256" => -22,
        "sha3" => -23,
        "suicide" => -24,
        "super" => -25,
        "tx" => -26,
        "type" => -27,
        "this" => -28,
        "gasToValue" => -60,
        "valueToGas" => -61,
        "bitSize" => -62,
        "uBitSize" => -63,
        "tvm" => -101,
        "logtvm" => -102,
        "math" => -103,
        "format" => -105,
        "stoi" => -106,
        "rnd" => -107,
        _ => return None,
    };
    Some(id)
}

fn func(
    name: &str,
    params: Vec<Ty>,
    results: Vec<Ty>,
    takes_arbitrary: bool,
    mutability: BuiltinMutability,
) -> MagicDeclaration {
    MagicDeclaration {
        id: magic_id(name).unwrap_or_else(|| panic!("unknown magic variable {name}")),
        name: name.to_string(),
        binding: MagicBinding::Function(BuiltinSignature {
            params,
            results,
            takes_arbitrary,
            mutability,
        }),
    }
}

fn magic(name: &str, kind: MagicKind) -> MagicDeclaration {
    MagicDeclaration {
        id: magic_id(name).unwrap_or_else(|| panic!("unknown magic variable {name}")),
        name: name.to_string(),
        binding: MagicBinding::Magic(kind),
    }
}

/// Every implicit declaration visible in global scope, `this`/`super`
/// excluded (those depend on the current contract).
pub fn declarations() -> Vec<MagicDeclaration> {
    use BuiltinMutability::{Pure, View};

    let u256 = Ty::Uint(256);
    let u128 = Ty::Uint(128);
    vec![
        magic("abi", MagicKind::Abi),
        func("addmod", vec![u256.clone(), u256.clone(), u256.clone()], vec![u256.clone()], false, Pure),
        func("assert", vec![Ty::Bool], vec![], false, Pure),
        magic("block", MagicKind::Block),
        func("blockhash", vec![u256.clone()], vec![u256.clone()], false, View),
        func("gasleft", vec![], vec![u256.clone()], false, View),
        func("keccak256", vec![Ty::Bytes], vec![u256.clone()], false, Pure),
        func("logtvm", vec![Ty::Str], vec![], false, Pure),
        magic("math", MagicKind::Math),
        magic("rnd", MagicKind::Rnd),
        magic("msg", MagicKind::Message),
        func("mulmod", vec![u256.clone(), u256.clone(), u256.clone()], vec![u256.clone()], false, Pure),
        MagicDeclaration {
            id: magic_id("now").expect("now is magic"),
            name: "now".to_string(),
            binding: MagicBinding::Value(Ty::Uint(32)),
        },
        func("require", vec![], vec![], true, Pure),
        func("revert", vec![], vec![], true, Pure),
        func("sha256", vec![Ty::Slice], vec![u256.clone()], false, Pure),
        func("stoi", vec![Ty::Str], vec![u256, Ty::Bool], false, Pure),
        magic("tvm", MagicKind::Tvm),
        magic("tx", MagicKind::Transaction),
        func("format", vec![], vec![Ty::Str], true, Pure),
        func("gasToValue", vec![u128.clone(), Ty::Int(8)], vec![u128.clone()], false, Pure),
        func("valueToGas", vec![u128.clone(), Ty::Int(8)], vec![u128], false, Pure),
        func("bitSize", vec![Ty::Int(257)], vec![Ty::Uint(16)], false, Pure),
        func("uBitSize", vec![Ty::Uint(256)], vec![Ty::Uint(16)], false, Pure),
    ]
}

/// Caches `this`/`super` declarations per contract. The contract is an
/// explicit argument of every lookup; there is no ambient current-contract
/// state.
#[derive(Default)]
pub struct GlobalContext {
    this_cache: HashMap<String, Rc<MagicDeclaration>>,
    super_cache: HashMap<String, Rc<MagicDeclaration>>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_this(&mut self, contract: &ContractDef) -> Rc<MagicDeclaration> {
        self.this_cache
            .entry(contract.name.clone())
            .or_insert_with(|| {
                Rc::new(MagicDeclaration {
                    id: magic_id("this").expect("this is magic"),
                    name: "this".to_string(),
                    binding: MagicBinding::ContractRef {
                        contract: contract.name.clone(),
                        super_access: false,
                    },
                })
            })
            .clone()
    }

    pub fn current_super(&mut self, contract: &ContractDef) -> Rc<MagicDeclaration> {
        self.super_cache
            .entry(contract.name.clone())
            .or_insert_with(|| {
                Rc::new(MagicDeclaration {
                    id: magic_id("super").expect("super is magic"),
                    name: "super".to_string(),
                    binding: MagicBinding::ContractRef {
                        contract: contract.name.clone(),
                        super_access: true,
                    },
                })
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_negative_and_distinct() {
        let decls = declarations();
        let mut seen = std::collections::HashSet::new();
        for d in &decls {
            assert!(d.id < 0, "{} must have a negative id", d.name);
            assert!(seen.insert(d.id), "duplicate id {} for {}", d.id, d.name);
        }
    }

    #[test]
    fn test_format_and_rnd_no_longer_collide() {
        assert_eq!(magic_id("format"), Some(-105));
        assert_eq!(magic_id("rnd"), Some(-107));
    }

    #[test]
    fn test_this_is_cached_per_contract() {
        let contract = ContractDef {
            name: "Wallet".to_string(),
            state_vars: vec![],
            functions: vec![],
            modifiers: vec![],
            events: vec![],
        };
        let mut ctx = GlobalContext::new();
        let a = ctx.current_this(&contract);
        let b = ctx.current_this(&contract);
        assert!(Rc::ptr_eq(&a, &b));
        let s = ctx.current_super(&contract);
        match &s.binding {
            MagicBinding::ContractRef { super_access, .. } => assert!(super_access),
            other => panic!("unexpected binding {other:?}"),
        }
    }
}
