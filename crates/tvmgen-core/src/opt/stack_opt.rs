//! Location-squashing stack optimizer: walks every code block keeping a
//! scoped model of the stack depth and, at each instruction, asks the
//! simulator whether some stack segment can be proven dead. On success the
//! tail of the block is rewritten; on any doubt the code stays as is.

use crate::consts::ITER_STACK_OPT_QTY;
use crate::function::{Contract, Function, FunctionKind};
use crate::inst::{
    is_blkswap, is_drop, is_pop, is_pure_gen01_or_getglob, is_push, is_reverse, is_swap,
    is_xchg_s0, make_blkswap, make_drop, make_push, CodeBlock, Inst, StackOpcode,
};
use crate::opt::simulator::Simulator;

pub struct StackOptimizer {
    sizes: Vec<i32>,
}

impl StackOptimizer {
    pub fn run(contract: &mut Contract) {
        for f in &mut contract.functions {
            match f.kind {
                FunctionKind::PrivateFunction
                | FunctionKind::Macro
                | FunctionKind::OnCodeUpgrade
                | FunctionKind::OnTickTock => {
                    if f.name == "c7_to_c4_for_await" {
                        continue;
                    }
                    for _ in 0..ITER_STACK_OPT_QTY {
                        Self::run_function(f);
                    }
                }
                FunctionKind::MacroGetter
                | FunctionKind::MainInternal
                | FunctionKind::MainExternal => {}
            }
        }
    }

    fn run_function(f: &mut Function) {
        let mut opt = StackOptimizer { sizes: vec![f.take] };
        opt.walk_block(&mut f.body);
    }

    fn delta(&mut self, d: i32) {
        let last = self.sizes.last_mut().expect("scope stack is never empty");
        *last += d;
    }

    fn size(&self) -> i32 {
        *self.sizes.last().expect("scope stack is never empty")
    }

    /// Depth owned by the innermost scope. May transiently go negative
    /// when values are moved across a scope boundary; blocks restore it.
    fn scope_size(&self) -> i32 {
        let n = self.sizes.len();
        self.sizes[n - 1] - if n == 1 { 0 } else { self.sizes[n - 2] }
    }

    fn start_scope(&mut self) {
        let top = self.size();
        self.sizes.push(top);
    }

    fn end_scope(&mut self) {
        self.sizes.pop();
        assert!(!self.sizes.is_empty());
    }

    fn walk_block(&mut self, block: &mut CodeBlock) {
        let mut insts = block.instructions().to_vec();
        let mut fuel = insts.len() * 8 + 64;
        let mut i = 0;
        while i < insts.len() {
            if fuel > 0 && self.successfully_update(i, &mut insts) {
                fuel -= 1;
            } else {
                self.walk_inst(&mut insts[i]);
                i += 1;
            }
        }
        block.upd(insts);
    }

    fn walk_inst(&mut self, inst: &mut Inst) {
        match inst {
            Inst::Loc(_) => {}
            Inst::DeclRetFlag => self.delta(1),
            Inst::Gen(g) => self.delta(g.ret - g.take),
            Inst::Throw(t) => self.delta(-t.take),
            Inst::HardCode(h) => self.delta(h.ret - h.take),
            Inst::Glob(g) => self.delta(g.ret() - g.take()),
            Inst::Cell(_) => self.delta(1),
            Inst::Asym(_) => {}
            Inst::Ret(kind) => match kind {
                crate::inst::RetKind::Ret => {}
                crate::inst::RetKind::IfRet | crate::inst::RetKind::IfNotRet => self.delta(-1),
            },
            Inst::RetOrBreakOrCont { .. } => {
                let ss = self.scope_size();
                self.delta(-ss);
            }
            Inst::Opaque { take, ret, .. } => self.delta(*ret - *take),
            Inst::Stack(op) => {
                let d = match op.opcode {
                    StackOpcode::Drop | StackOpcode::BlkDrop2 => -op.i,
                    StackOpcode::PopS => -1,
                    StackOpcode::BlkPush => op.i,
                    StackOpcode::Push2S => 2,
                    StackOpcode::Push3S => 3,
                    StackOpcode::PushS | StackOpcode::Tuck | StackOpcode::Puxc => 1,
                    StackOpcode::BlkSwap | StackOpcode::Reverse | StackOpcode::Xchg => 0,
                };
                self.delta(d);
            }
            // A bare continuation literal only pushes one value here; its
            // body runs in an unknown frame, so it is left untouched.
            Inst::Block(_) => self.delta(1),
            Inst::Sub(s) => {
                let saved = self.size();
                self.delta(-s.take);
                self.start_scope();
                self.delta(s.take);
                self.walk_block(&mut s.block);
                self.end_scope();
                self.delta(s.ret);
                assert!(saved - s.take + s.ret == self.size());
            }
            Inst::Cond(c) => {
                let saved = self.size();
                self.delta(-1);
                for body in [&mut c.true_body, &mut c.false_body] {
                    self.start_scope();
                    self.walk_block(body);
                    assert!(saved - 1 + c.ret == self.size());
                    self.end_scope();
                }
                self.delta(c.ret);
            }
            Inst::LogCircuit(lc) => {
                let saved = self.size();
                self.delta(-2);
                self.start_scope();
                self.delta(1);
                self.walk_block(&mut lc.body);
                assert!(saved - 1 == self.size());
                self.end_scope();
                self.delta(1);
                assert!(saved - 1 == self.size());
            }
            Inst::IfElse(ie) => {
                self.delta(-1);
                let saved = self.size();
                {
                    self.start_scope();
                    self.walk_block(&mut ie.true_body);
                    self.end_scope();
                }
                if let Some(fb) = ie.false_body.as_mut() {
                    self.start_scope();
                    self.walk_block(fb);
                    self.end_scope();
                }
                assert!(saved == self.size());
            }
            Inst::Repeat(body) => {
                let saved = self.size();
                self.delta(-1);
                self.start_scope();
                self.walk_block(body);
                self.end_scope();
                assert!(saved - 1 == self.size());
            }
            Inst::Until(body) => {
                let saved = self.size();
                self.start_scope();
                self.walk_block(body);
                self.end_scope();
                assert!(saved == self.size());
            }
            Inst::While { cond, body } => {
                let saved = self.size();
                self.start_scope();
                self.walk_block(cond);
                self.end_scope();
                self.start_scope();
                self.walk_block(body);
                self.end_scope();
                assert!(saved == self.size());
            }
        }
    }

    fn successfully_update(&mut self, index: usize, insts: &mut Vec<Inst>) -> bool {
        let op = insts[index].clone();
        if op.is_loc() {
            return false;
        }

        let mut ok = false;
        let mut commands: Vec<Inst> = Vec::new();

        if let Some(i) = is_pop(&op) {
            if i >= 1 {
                let sim = Simulator::run(&insts[index + 1..], i, 1);
                if sim.was_set() || sim.success() {
                    // dropping instead of popping leaves a value the tail
                    // provably never reads
                    ok = true;
                    commands.push(make_drop(1));
                    commands.extend_from_slice(&insts[index + 1..]);
                }
            }
        }

        if !ok
            && (is_blkswap(&op).is_some() || is_reverse(&op).is_some() || is_xchg_s0(&op).is_some())
        {
            let len = if let Some((n, i)) = is_reverse(&op) {
                n + i
            } else if let Some((down, up)) = is_blkswap(&op) {
                down + up
            } else {
                is_xchg_s0(&op).expect("checked above") + 1
            };

            if len >= 1 {
                let sim = Simulator::run(&insts[index + 1..], len, len);
                if sim.success() {
                    // every reordered value is dead, the shuffle is noise
                    ok = true;
                    commands.extend_from_slice(&insts[index + 1..]);
                }
            }
            if !ok && is_swap(&op) {
                let sim = Simulator::run(&insts[index + 1..], 2, 1);
                if sim.success() {
                    ok = true;
                    commands.push(make_drop(1));
                    commands.extend_from_slice(sim.commands());
                }
            }
        }

        if !ok {
            if let Some(si) = is_push(&op) {
                if si <= self.scope_size() && si > 0 {
                    let sim = Simulator::run(&insts[index + 1..], si + 1, si);
                    if sim.success() {
                        // everything between the copy and its source dies
                        ok = true;
                        commands.push(make_drop(si));
                        commands.push(make_push(0));
                        commands.extend_from_slice(sim.commands());
                    }
                }
                if !ok {
                    let sim = Simulator::run(&insts[index + 1..], si + 2, 1);
                    if sim.success() {
                        // the original dies after the copy, so move it
                        // instead of copying
                        ok = true;
                        if si >= 1 {
                            commands.push(make_blkswap(1, si));
                        }
                        commands.extend_from_slice(sim.commands());
                    }
                }
            }
        }

        if !ok && is_pure_gen01_or_getglob(&op) {
            let sim = Simulator::run(&insts[index + 1..], 1, 1);
            if sim.success() {
                ok = true;
                commands.extend_from_slice(sim.commands());
            }
        }

        if !ok && is_drop(&op).is_none() {
            let is_prev_flag = index > 0 && matches!(insts[index - 1], Inst::DeclRetFlag);
            if self.scope_size() >= 1 && !is_prev_flag {
                let sim = Simulator::run(&insts[index..], 1, 1);
                if sim.success() {
                    ok = true;
                    commands.push(make_drop(1));
                    commands.extend_from_slice(sim.commands());
                }
            }
        }

        if !ok {
            if let Some(n) = is_drop(&op) {
                if index + 1 < insts.len() && self.scope_size() >= n + 1 {
                    let sim = Simulator::run(&insts[index + 1..], 1, 1);
                    if sim.success() {
                        ok = true;
                        commands.push(make_drop(n + 1));
                        commands.extend_from_slice(sim.commands());
                    }
                }
            }
        }

        if !ok {
            return false;
        }

        insts.truncate(index);
        insts.extend(commands);
        true
    }
}
