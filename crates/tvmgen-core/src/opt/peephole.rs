//! Library of local rewrites over code-block contents. Each rule must
//! preserve the observable stack effect; location markers between two
//! matched instructions are kept in place.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::catalog;
use crate::function::Contract;
use crate::inst::{
    is_drop, is_pop, is_pure_gen01_or_getglob, is_push, is_swap, make_drop, BlockKind, CodeBlock,
    IfElseKind, Inst, StackOpcode,
};

pub struct Peephole {
    with_unpack_opaque: bool,
}

impl Peephole {
    pub fn new(with_unpack_opaque: bool) -> Self {
        Self { with_unpack_opaque }
    }

    pub fn run(&self, contract: &mut Contract) {
        for f in &mut contract.functions {
            self.optimize_block(&mut f.body);
        }
    }

    fn optimize_block(&self, block: &mut CodeBlock) {
        let mut insts = block.instructions().to_vec();
        for inst in &mut insts {
            self.recurse(inst);
        }
        while self.rewrite_once(&mut insts) {}
        block.upd(insts);
    }

    fn recurse(&self, inst: &mut Inst) {
        if matches!(inst, Inst::Opaque { .. }) && !self.with_unpack_opaque {
            return;
        }
        inst.for_each_block_mut(&mut |b| self.optimize_block(b));
    }

    fn rewrite_once(&self, insts: &mut Vec<Inst>) -> bool {
        let mut i = 0;
        while i < insts.len() {
            if insts[i].is_loc() {
                i += 1;
                continue;
            }
            let Some(j) = Self::next_non_loc(insts, i + 1) else {
                break;
            };
            if let Some(replacement) = Self::match_pair(&insts[i], &insts[j]) {
                insts.remove(j);
                insts.remove(i);
                for (k, inst) in replacement.into_iter().enumerate() {
                    insts.insert(i + k, inst);
                }
                return true;
            }
            i += 1;
        }
        false
    }

    fn next_non_loc(insts: &[Inst], from: usize) -> Option<usize> {
        (from..insts.len()).find(|&k| !insts[k].is_loc())
    }

    /// Returns what the pair `(a, b)` rewrites to, or `None`.
    fn match_pair(a: &Inst, b: &Inst) -> Option<Vec<Inst>> {
        // DROP n; DROP m
        if let (Some(n), Some(m)) = (is_drop(a), is_drop(b)) {
            return Some(vec![make_drop(n + m)]);
        }

        // self-inverse shuffles
        if let (Inst::Stack(sa), Inst::Stack(sb)) = (a, b) {
            if sa == sb
                && matches!(sa.opcode, StackOpcode::Xchg | StackOpcode::Reverse)
            {
                return Some(vec![]);
            }
            if sa.opcode == StackOpcode::BlkSwap
                && sb.opcode == StackOpcode::BlkSwap
                && sa.i == sb.j
                && sa.j == sb.i
            {
                return Some(vec![]);
            }
        }

        // a value produced and immediately discarded
        if is_pure_gen01_or_getglob(a) || is_push(a).is_some() {
            if let Some(n) = is_drop(b) {
                return Some(if n == 1 { vec![] } else { vec![make_drop(n - 1)] });
            }
        }

        // DUP; NIP
        if is_push(a) == Some(0) && is_pop(b) == Some(1) {
            return Some(vec![]);
        }

        if let (Inst::Gen(ga), Inst::Gen(gb)) = (a, b) {
            // NOT; NOT
            if ga.opcode == "NOT" && gb.opcode == "NOT" && ga.arg.is_empty() && gb.arg.is_empty() {
                return Some(vec![]);
            }

            if ga.opcode == "PUSHINT" {
                if let Ok(n) = ga.arg.parse::<BigInt>() {
                    // a small constant folded into the compare form
                    if gb.arg.is_empty() {
                        let small = n >= BigInt::from(-128) && n <= BigInt::from(127);
                        let folded = match gb.opcode.as_str() {
                            "EQUAL" => Some("EQINT"),
                            "NEQ" => Some("NEQINT"),
                            "GREATER" => Some("GTINT"),
                            "LESS" => Some("LESSINT"),
                            _ => None,
                        };
                        if let (Some(mnemonic), true) = (folded, small) {
                            return Some(vec![Inst::Gen(catalog::gen(&format!(
                                "{mnemonic} {n}"
                            )))]);
                        }
                    }

                    // range check on a constant that provably fits
                    if gb.opcode == "UFITS" || gb.opcode == "FITS" {
                        if let Ok(bits) = gb.arg.parse::<u32>() {
                            let fits = if gb.opcode == "UFITS" {
                                !n.lt(&BigInt::zero()) && n < (BigInt::from(1) << (bits as usize))
                            } else {
                                let bound = BigInt::from(1) << ((bits - 1) as usize);
                                n >= -bound.clone() && n < bound
                            };
                            if fits {
                                return Some(vec![a.clone()]);
                            }
                        }
                    }
                }
            }

        }

        // SWAP feeding a commutative binary op
        if let Inst::Gen(gb) = b {
            if gb.arg.is_empty()
                && matches!(
                    gb.opcode.as_str(),
                    "ADD" | "MUL" | "AND" | "OR" | "XOR" | "EQUAL" | "NEQ" | "MIN" | "MAX"
                )
                && is_swap(a)
            {
                return Some(vec![b.clone()]);
            }
        }

        // a constant condition resolves its branch
        if let (Inst::Gen(ga), Inst::IfElse(ie)) = (a, b) {
            let value = match ga.opcode.as_str() {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            };
            let plain = matches!(ie.kind, IfElseKind::If | IfElseKind::IfNot)
                && ie.false_body.is_none()
                && ie.true_body.kind() == BlockKind::PushCont;
            if let (Some(v), true) = (value, plain) {
                let taken = match ie.kind {
                    IfElseKind::If => v,
                    IfElseKind::IfNot => !v,
                    _ => return None,
                };
                if !taken {
                    return Some(vec![]);
                }
                // splicing is only sound when nothing in the body exits
                // the continuation early
                let exits = ie.true_body.instructions().iter().any(|inst| {
                    matches!(inst, Inst::Ret(_) | Inst::RetOrBreakOrCont { .. })
                        || matches!(
                            inst,
                            Inst::IfElse(nested) if matches!(
                                nested.kind,
                                IfElseKind::IfJmp
                                    | IfElseKind::IfNotJmp
                                    | IfElseKind::IfJmpRef
                                    | IfElseKind::IfNotJmpRef
                                    | IfElseKind::IfElseWithJmp
                            )
                        )
                });
                if !exits {
                    return Some(ie.true_body.instructions().to_vec());
                }
                return None;
            }
        }

        // SWAP in front of SWAP
        if is_swap(a) && is_swap(b) {
            return Some(vec![]);
        }

        None
    }
}
