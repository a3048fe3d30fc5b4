//! Collapses runs of source-location markers so at most one `.loc` per
//! `(file, line)` survives next to any other instruction.

use crate::function::Contract;
use crate::inst::{CodeBlock, Inst, Loc};

pub struct LocSquasher;

impl LocSquasher {
    pub fn run(contract: &mut Contract) {
        for f in &mut contract.functions {
            Self::squash_block(&mut f.body);
        }
    }

    pub fn squash_block(block: &mut CodeBlock) {
        let a = block.instructions().to_vec();

        // adjacent Loc-Loc pairs: the later marker wins
        let mut b: Vec<Inst> = Vec::with_capacity(a.len());
        for inst in a {
            if b.last().map(|prev| prev.is_loc()).unwrap_or(false) && inst.is_loc() {
                b.pop();
            }
            b.push(inst);
        }

        // drop repeats of the same (file, line) anywhere in the block
        let mut out: Vec<Inst> = Vec::with_capacity(b.len());
        let mut last_loc: Option<Loc> = None;
        for inst in b {
            if let Inst::Loc(loc) = &inst {
                let same = last_loc
                    .as_ref()
                    .map(|l| l.file == loc.file && l.line == loc.line)
                    .unwrap_or(false);
                last_loc = Some(loc.clone());
                if same {
                    continue;
                }
            }
            out.push(inst);
        }

        for inst in &mut out {
            inst.for_each_block_mut(&mut Self::squash_block);
        }
        block.upd(out);
    }
}
