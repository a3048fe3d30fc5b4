//! Replaces short-circuit AND/OR circuits whose bodies are pure with a
//! direct boolean instruction, fusing chains of same-kind circuits.

use crate::catalog;
use crate::function::Contract;
use crate::inst::{is_drop, is_push, make_push, CodeBlock, Inst, LogicOp};

pub struct LogCircuitExpander;

impl LogCircuitExpander {
    pub fn run(contract: &mut Contract) {
        for f in &mut contract.functions {
            Self::expand_block(&mut f.body);
        }
    }

    fn expand_block(block: &mut CodeBlock) {
        let mut insts = block.instructions().to_vec();
        for inst in &mut insts {
            inst.for_each_block_mut(&mut Self::expand_block);
        }

        let mut out: Vec<Inst> = Vec::with_capacity(insts.len());
        for inst in insts {
            if let Inst::LogCircuit(lc) = &inst {
                if lc.can_expand && out.last().map(|prev| is_push(prev) == Some(0)).unwrap_or(false)
                {
                    if let Some(new_inst) = Self::try_expand(lc.op, lc.body.instructions()) {
                        out.pop(); // the operand replica
                        out.extend(new_inst);
                        continue;
                    }
                }
            }
            out.push(inst);
        }
        block.upd(out);
    }

    /// Rebuilds the circuit body without the branch, or `None` when the
    /// body is not provably pure.
    fn try_expand(op: LogicOp, body: &[Inst]) -> Option<Vec<Inst>> {
        let mut stack_size: i32 = 1;
        let mut new_inst: Vec<Inst> = Vec::new();

        for (i, inst) in body.iter().enumerate() {
            if i == 0 {
                if is_drop(inst) != Some(1) {
                    return None;
                }
                continue;
            }
            if matches!(inst, Inst::LogCircuit(_)) && i + 1 != body.len() {
                return None;
            }
            if !Self::is_pure_operation(inst, &mut stack_size, &mut new_inst) {
                return None;
            }
        }
        if stack_size != 2 {
            return None;
        }

        let tail = new_inst.last().cloned();
        let has_tail_circuit = matches!(new_inst.last(), Some(Inst::LogCircuit(_)));
        if has_tail_circuit {
            let tail_kind = match &tail {
                Some(Inst::LogCircuit(lc)) => lc.op,
                _ => return None,
            };
            if tail_kind != op {
                return None;
            }
            new_inst.pop(); // the nested circuit
            new_inst.pop(); // its operand replica
        }

        new_inst.push(Inst::Gen(catalog::gen(match op {
            LogicOp::And => "AND",
            LogicOp::Or => "OR",
        })));

        if has_tail_circuit {
            new_inst.push(make_push(0));
            new_inst.push(tail.expect("tail checked above"));
        }

        Some(new_inst)
    }

    fn is_pure_operation(inst: &Inst, stack_size: &mut i32, new_inst: &mut Vec<Inst>) -> bool {
        match inst {
            Inst::Gen(g) if g.pure => {
                new_inst.push(inst.clone());
                *stack_size += g.ret - g.take;
                true
            }
            Inst::Cell(_) => {
                new_inst.push(inst.clone());
                *stack_size += 1;
                true
            }
            Inst::LogCircuit(_) => {
                new_inst.push(inst.clone());
                *stack_size += -2 + 1;
                true
            }
            _ => {
                if let Some(index) = is_push(inst) {
                    // the extra operand sits one deeper once the leading
                    // DROP is gone
                    if index + 1 < *stack_size {
                        new_inst.push(make_push(index));
                    } else {
                        new_inst.push(make_push(index + 1));
                    }
                    *stack_size += 1;
                    true
                } else {
                    false
                }
            }
        }
    }
}
