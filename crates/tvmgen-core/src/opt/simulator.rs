//! Straight-line stack simulator. Given a code slice and a starting depth,
//! it tries to prove that a specific segment of the stack is never read
//! and eventually discarded, producing the slice rewritten as if the
//! segment had never existed. Anything it cannot analyze makes the proof
//! fail; callers then leave the original code untouched.

use crate::inst::{
    is_drop, make_blkdrop2, make_blkswap, make_drop, make_push, Inst, StackOp, StackOpcode,
};

pub struct Simulator {
    segment: i32,
    stack_size: i32,
    was_set: bool,
    unable: bool,
    dropped: bool,
    commands: Vec<Inst>,
}

impl Simulator {
    /// Protects the `segment` cells sitting at depths
    /// `[start_size - segment, start_size)` and walks `insts`.
    pub fn run(insts: &[Inst], start_size: i32, segment: i32) -> Simulator {
        assert!(segment >= 1 && start_size >= segment);
        let mut sim = Simulator {
            segment,
            stack_size: start_size,
            was_set: false,
            unable: false,
            dropped: false,
            commands: Vec::new(),
        };
        for inst in insts {
            if sim.dropped {
                sim.commands.push(inst.clone());
                continue;
            }
            if !sim.step(inst) {
                sim.unable = true;
                break;
            }
        }
        sim
    }

    pub fn success(&self) -> bool {
        self.dropped && !self.unable
    }

    pub fn was_set(&self) -> bool {
        self.was_set && !self.unable
    }

    pub fn commands(&self) -> &[Inst] {
        &self.commands
    }

    /// Values above the protected segment.
    fn above(&self) -> i32 {
        self.stack_size - self.segment
    }

    fn keep(&mut self, inst: &Inst, delta: i32) -> bool {
        self.commands.push(inst.clone());
        self.stack_size += delta;
        true
    }

    fn step(&mut self, inst: &Inst) -> bool {
        match inst {
            Inst::Loc(_) => self.keep(inst, 0),

            Inst::Gen(g) => g.take <= self.above() && self.keep(inst, g.ret - g.take),
            Inst::Throw(t) => t.take <= self.above() && self.keep(inst, t.ret - t.take),
            Inst::HardCode(h) => h.take <= self.above() && self.keep(inst, h.ret - h.take),
            Inst::Glob(g) => g.take() <= self.above() && self.keep(inst, g.ret() - g.take()),
            Inst::Cell(_) => self.keep(inst, 1),
            Inst::DeclRetFlag => self.keep(inst, 1),
            Inst::Opaque { take, ret, .. } => *take <= self.above() && self.keep(inst, ret - take),
            Inst::Sub(s) => s.take <= self.above() && self.keep(inst, s.ret - s.take),

            Inst::Stack(op) => self.step_stack(inst, op),

            // Control flow, asymmetric arity and early exits end the proof.
            _ => false,
        }
    }

    fn step_stack(&mut self, inst: &Inst, op: &StackOp) -> bool {
        let above = self.above();
        let below = above + self.segment;
        match op.opcode {
            StackOpcode::PushS => self.push_index(op.i, 1, |i| make_push(i)),
            StackOpcode::Push2S => {
                let (a, b) = (op.i, op.j);
                match (self.rewrite_index(a), self.rewrite_index(b)) {
                    (Some(a), Some(b)) => {
                        self.commands.push(crate::inst::make_push2(a, b));
                        self.stack_size += 2;
                        true
                    }
                    _ => false,
                }
            }
            StackOpcode::Push3S => {
                match (self.rewrite_index(op.i), self.rewrite_index(op.j), self.rewrite_index(op.k)) {
                    (Some(a), Some(b), Some(c)) => {
                        self.commands.push(crate::inst::make_push3(a, b, c));
                        self.stack_size += 3;
                        true
                    }
                    _ => false,
                }
            }
            StackOpcode::BlkPush => {
                if op.j < above {
                    self.keep(inst, op.i)
                } else {
                    false
                }
            }
            StackOpcode::Xchg => {
                match (self.rewrite_index(op.i), self.rewrite_index(op.j)) {
                    (Some(a), Some(b)) => {
                        self.commands.push(crate::inst::make_xchg_s_s(a, b));
                        true
                    }
                    _ => false,
                }
            }
            StackOpcode::PopS => {
                if above < 1 {
                    return false;
                }
                let i = op.i;
                if i < above {
                    self.keep(inst, -1)
                } else if i >= below {
                    self.commands.push(crate::inst::make_pop(i - self.segment));
                    self.stack_size -= 1;
                    true
                } else if self.segment == 1 && i == above {
                    // the protected cell is overwritten before any read
                    if above - 1 >= 1 {
                        self.commands.push(make_blkswap(above - 1, 1));
                    }
                    self.was_set = true;
                    self.dropped = true;
                    true
                } else {
                    false
                }
            }
            StackOpcode::Drop => {
                let n = is_drop(inst).expect("drop opcode");
                if n <= above {
                    self.keep(inst, -n)
                } else if n >= below {
                    if n - self.segment > 0 {
                        self.commands.push(make_drop(n - self.segment));
                    }
                    self.dropped = true;
                    true
                } else {
                    false
                }
            }
            StackOpcode::BlkDrop2 => {
                let (drop, keep) = (op.i, op.j);
                if keep + drop <= above {
                    self.keep(inst, -drop)
                } else if keep >= below {
                    self.commands.push(make_blkdrop2(drop, keep - self.segment));
                    self.stack_size -= drop;
                    true
                } else if keep <= above && keep + drop >= below {
                    let rest = drop - self.segment;
                    if rest > 0 {
                        if keep == 0 {
                            self.commands.push(make_drop(rest));
                        } else {
                            self.commands.push(make_blkdrop2(rest, keep));
                        }
                    }
                    self.dropped = true;
                    true
                } else {
                    false
                }
            }
            StackOpcode::BlkSwap => op.i + op.j <= above && self.keep(inst, 0),
            StackOpcode::Reverse => {
                let (n, offset) = (op.i, op.j);
                if offset + n <= above {
                    self.keep(inst, 0)
                } else if offset >= below {
                    self.commands.push(crate::inst::make_reverse(n, offset - self.segment));
                    true
                } else {
                    false
                }
            }
            StackOpcode::Tuck | StackOpcode::Puxc => false,
        }
    }

    fn push_index(&mut self, i: i32, delta: i32, make: impl Fn(i32) -> Inst) -> bool {
        match self.rewrite_index(i) {
            Some(i) => {
                self.commands.push(make(i));
                self.stack_size += delta;
                true
            }
            None => false,
        }
    }

    /// Maps a read index into the segment-free world; `None` if it reads
    /// the protected cells.
    fn rewrite_index(&self, i: i32) -> Option<i32> {
        let above = self.above();
        if i < above {
            Some(i)
        } else if i >= above + self.segment {
            Some(i - self.segment)
        } else {
            None
        }
    }
}
