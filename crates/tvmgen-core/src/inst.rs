use serde::{Deserialize, Serialize};

/// Source mapping annotation. `line == 0` marks the end of a source range
/// whose exact line is unknown; the printer still emits it as `.loc file, 0`
/// so downstream debug tooling sees the range close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackOpcode {
    Drop,
    BlkDrop2,
    PopS,
    BlkPush,
    Push2S,
    Push3S,
    PushS,
    BlkSwap,
    Reverse,
    Xchg,
    Tuck,
    Puxc,
}

/// A pure stack-shuffling instruction. Unused index slots stay at `-1`;
/// the printer decides the concrete mnemonic from the populated slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOp {
    pub opcode: StackOpcode,
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl StackOp {
    pub fn new(opcode: StackOpcode, i: i32, j: i32, k: i32) -> Self {
        Self { opcode, i, j, k }
    }
}

/// Opaque generic instruction: one mnemonic, optional argument and comment,
/// and a stack effect declared once on the node. `pure` means the op cannot
/// throw and does not touch any global slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenOp {
    pub opcode: String,
    pub arg: String,
    pub comment: String,
    pub take: i32,
    pub ret: i32,
    pub pure: bool,
}

impl GenOp {
    pub fn full_opcode(&self) -> String {
        let mut s = self.opcode.clone();
        if !self.arg.is_empty() {
            s.push(' ');
            s.push_str(&self.arg);
        }
        s
    }
}

/// Instruction whose return arity depends on runtime state, e.g. a
/// dictionary lookup that leaves a success flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsymOp {
    pub opcode: String,
    pub take: i32,
    pub ret_min: i32,
    pub ret_max: i32,
}

/// Literal assembly lines with an explicitly declared stack effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardCode {
    pub code: Vec<String>,
    pub take: i32,
    pub ret: i32,
    pub pure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobOpcode {
    GetGlob,
    SetGlob,
    PushRoot,
    PopRoot,
    PushC3,
    PopC3,
    PushC7,
    PopC7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobOp {
    pub opcode: GlobOpcode,
    pub index: i32,
}

impl GlobOp {
    pub fn take(&self) -> i32 {
        match self.opcode {
            GlobOpcode::GetGlob | GlobOpcode::PushRoot | GlobOpcode::PushC3 | GlobOpcode::PushC7 => 0,
            GlobOpcode::SetGlob | GlobOpcode::PopRoot | GlobOpcode::PopC3 | GlobOpcode::PopC7 => 1,
        }
    }

    pub fn ret(&self) -> i32 {
        1 - self.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetKind {
    Ret,
    IfRet,
    IfNotRet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    PushRef,
    PushRefSlice,
    Cell,
}

/// A static data cell or slice literal. `child` links form a strict tree;
/// equality is structural over `(kind, blob, child)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCellOrSlice {
    pub kind: CellKind,
    pub blob: String,
    pub child: Option<Box<PushCellOrSlice>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Inlined into the surrounding instruction stream.
    None,
    PushCont,
    PushRefCont,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    kind: BlockKind,
    insts: Vec<Inst>,
}

impl CodeBlock {
    pub fn new(kind: BlockKind, insts: Vec<Inst>) -> Self {
        Self { kind, insts }
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn instructions(&self) -> &[Inst] {
        &self.insts
    }

    pub fn upd(&mut self, insts: Vec<Inst>) {
        self.insts = insts;
    }

    pub fn into_instructions(self) -> Vec<Inst> {
        self.insts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubKind {
    CallRef,
    CallX,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProgram {
    pub take: i32,
    pub ret: i32,
    pub kind: SubKind,
    pub block: CodeBlock,
}

/// Expression-shaped if-else leaving `ret` values on the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub true_body: CodeBlock,
    pub false_body: CodeBlock,
    pub ret: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

/// Short-circuit AND/OR over one stack value. The body starts with a DROP
/// of the replicated operand and leaves exactly one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCircuit {
    pub can_expand: bool,
    pub op: LogicOp,
    pub body: CodeBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IfElseKind {
    If,
    IfNot,
    IfRef,
    IfNotRef,
    IfJmp,
    IfNotJmp,
    IfJmpRef,
    IfNotJmpRef,
    IfElse,
    IfElseWithJmp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfElse {
    pub kind: IfElseKind,
    pub true_body: CodeBlock,
    pub false_body: Option<CodeBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inst {
    Loc(Loc),
    Stack(StackOp),
    Glob(GlobOp),
    DeclRetFlag,
    Gen(GenOp),
    Asym(AsymOp),
    HardCode(HardCode),
    Throw(GenOp),
    Ret(RetKind),
    RetOrBreakOrCont { take: i32, body: CodeBlock },
    Cell(PushCellOrSlice),
    Opaque { take: i32, ret: i32, pure: bool, block: CodeBlock },
    Block(CodeBlock),
    Sub(SubProgram),
    Cond(Condition),
    LogCircuit(LogCircuit),
    IfElse(IfElse),
    Repeat(CodeBlock),
    Until(CodeBlock),
    While { cond: CodeBlock, body: CodeBlock },
}

impl Inst {
    pub fn is_loc(&self) -> bool {
        matches!(self, Inst::Loc(_))
    }

    /// Invokes `f` on every directly nested code block.
    pub fn for_each_block_mut(&mut self, f: &mut dyn FnMut(&mut CodeBlock)) {
        match self {
            Inst::RetOrBreakOrCont { body, .. } => f(body),
            Inst::Opaque { block, .. } => f(block),
            Inst::Block(b) => f(b),
            Inst::Sub(s) => f(&mut s.block),
            Inst::Cond(c) => {
                f(&mut c.true_body);
                f(&mut c.false_body);
            }
            Inst::LogCircuit(lc) => f(&mut lc.body),
            Inst::IfElse(ie) => {
                f(&mut ie.true_body);
                if let Some(fb) = ie.false_body.as_mut() {
                    f(fb);
                }
            }
            Inst::Repeat(b) | Inst::Until(b) => f(b),
            Inst::While { cond, body } => {
                f(cond);
                f(body);
            }
            _ => {}
        }
    }
}

pub fn make_drop(cnt: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Drop, cnt, -1, -1))
}

pub fn make_pop(i: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::PopS, i, -1, -1))
}

pub fn make_blkpush(qty: i32, index: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::BlkPush, qty, index, -1))
}

pub fn make_push(i: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::PushS, i, -1, -1))
}

pub fn make_push2(i: i32, j: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Push2S, i, j, -1))
}

pub fn make_push3(i: i32, j: i32, k: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Push3S, i, j, k))
}

pub fn make_xchg_s(i: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Xchg, 0, i, -1))
}

pub fn make_xchg_s_s(i: i32, j: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Xchg, i, j, -1))
}

pub fn make_blkdrop2(dropped: i32, left: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::BlkDrop2, dropped, left, -1))
}

pub fn make_blkswap(down: i32, top: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::BlkSwap, down, top, -1))
}

pub fn make_reverse(i: i32, j: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Reverse, i, j, -1))
}

pub fn make_rot() -> Inst {
    make_blkswap(1, 2)
}

pub fn make_rot_rev() -> Inst {
    make_blkswap(2, 1)
}

pub fn make_tuck() -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Tuck, -1, -1, -1))
}

pub fn make_puxc(i: i32, j: i32) -> Inst {
    Inst::Stack(StackOp::new(StackOpcode::Puxc, i, j, -1))
}

pub fn make_ret() -> Inst {
    Inst::Ret(RetKind::Ret)
}

pub fn make_ifret() -> Inst {
    Inst::Ret(RetKind::IfRet)
}

pub fn make_ifnotret() -> Inst {
    Inst::Ret(RetKind::IfNotRet)
}

pub fn make_pushref(blob: String) -> Inst {
    Inst::Cell(PushCellOrSlice { kind: CellKind::PushRef, blob, child: None })
}

pub fn is_drop(inst: &Inst) -> Option<i32> {
    match inst {
        Inst::Stack(op) if op.opcode == StackOpcode::Drop => Some(op.i),
        _ => None,
    }
}

pub fn is_pop(inst: &Inst) -> Option<i32> {
    match inst {
        Inst::Stack(op) if op.opcode == StackOpcode::PopS => Some(op.i),
        _ => None,
    }
}

pub fn is_blkswap(inst: &Inst) -> Option<(i32, i32)> {
    match inst {
        Inst::Stack(op) if op.opcode == StackOpcode::BlkSwap => Some((op.i, op.j)),
        _ => None,
    }
}

pub fn is_reverse(inst: &Inst) -> Option<(i32, i32)> {
    match inst {
        Inst::Stack(op) if op.opcode == StackOpcode::Reverse => Some((op.i, op.j)),
        _ => None,
    }
}

pub fn is_push(inst: &Inst) -> Option<i32> {
    match inst {
        Inst::Stack(op) if op.opcode == StackOpcode::PushS => Some(op.i),
        _ => None,
    }
}

/// XCHG S0, Si.
pub fn is_xchg_s0(inst: &Inst) -> Option<i32> {
    match inst {
        Inst::Stack(op) if op.opcode == StackOpcode::Xchg && op.i == 0 => Some(op.j),
        _ => None,
    }
}

pub fn is_swap(inst: &Inst) -> bool {
    is_xchg_s0(inst) == Some(1) || is_blkswap(inst) == Some((1, 1))
}

/// A throw-free producer of exactly one value: a pure `(0, 1)` gen op,
/// a GETGLOB-family read, or a cell literal.
pub fn is_pure_gen01_or_getglob(inst: &Inst) -> bool {
    match inst {
        Inst::Gen(g) => g.take == 0 && g.ret == 1 && g.pure,
        Inst::Cell(_) => true,
        Inst::Glob(g) => matches!(
            g.opcode,
            GlobOpcode::GetGlob | GlobOpcode::PushRoot | GlobOpcode::PushC3 | GlobOpcode::PushC7
        ),
        _ => false,
    }
}

pub fn qty_without_loc(insts: &[Inst]) -> usize {
    insts.iter().filter(|i| !i.is_loc()).count()
}
