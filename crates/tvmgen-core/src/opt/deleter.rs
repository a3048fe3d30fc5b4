use crate::function::Contract;
use crate::inst::{qty_without_loc, CodeBlock, Inst, SubKind};

/// Everything after the first `ReturnOrBreakOrCont` in a block is dead,
/// except location markers, which are kept for source mapping.
pub struct DeleterAfterRet;

impl DeleterAfterRet {
    pub fn run(contract: &mut Contract) {
        for f in &mut contract.functions {
            Self::clean_block(&mut f.body);
        }
    }

    fn clean_block(block: &mut CodeBlock) {
        let mut insts = block.instructions().to_vec();
        for inst in &mut insts {
            inst.for_each_block_mut(&mut Self::clean_block);
        }

        let mut found_ret = false;
        let mut out = Vec::with_capacity(insts.len());
        for inst in insts {
            if !found_ret && matches!(inst, Inst::RetOrBreakOrCont { .. }) {
                found_ret = true;
                out.push(inst);
            } else if !found_ret || inst.is_loc() {
                out.push(inst);
            }
        }
        block.upd(out);
    }
}

/// Tail inlining: a function whose body is a single CALLX sub-program is
/// replaced with that sub-program's contents.
pub struct DeleterCallX;

impl DeleterCallX {
    pub fn run(contract: &mut Contract) {
        for f in &mut contract.functions {
            let insts = f.body.instructions();
            if qty_without_loc(insts) != 1 {
                continue;
            }
            let mut out: Vec<Inst> = Vec::new();
            let mut applies = true;
            for inst in insts {
                match inst {
                    Inst::Loc(_) => out.push(inst.clone()),
                    Inst::Sub(sub) if sub.kind == SubKind::CallX => {
                        out.extend(sub.block.instructions().iter().cloned());
                    }
                    _ => {
                        applies = false;
                        break;
                    }
                }
            }
            if applies {
                f.body.upd(out);
            }
        }
    }
}
