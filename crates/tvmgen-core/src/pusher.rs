//! Append-only IR builder that tracks symbolic stack depth and variable
//! bindings while code is generated. Lowering drives this type; the IR it
//! produces is rewritten by the optimizer passes and printed by the
//! emitter crate.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;

use crate::catalog;
use crate::consts;
use crate::inst::{
    make_blkdrop2, make_blkswap, make_drop, make_ifret, make_ifnotret, make_pop, make_push,
    make_push2, make_push3, make_ret, make_reverse, make_rot, make_rot_rev, make_xchg_s,
    BlockKind, CellKind, CodeBlock, Condition, GenOp, GlobOp, GlobOpcode, HardCode, IfElse,
    IfElseKind, Inst, LogCircuit, LogicOp, PushCellOrSlice, RetKind, SubKind, SubProgram,
};
use crate::stack::{DeclId, TvmStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Internal,
    ExternalOut,
    ExternalIn,
}

/// Callback that appends the message body to the builder on top of the
/// stack; receives the bit length accumulated so far so it can decide
/// whether to overflow into a reference cell.
pub type BodyAppender<'a> = &'a mut dyn FnMut(&mut StackPusher, usize);
pub type BuilderAppender<'a> = &'a mut dyn FnMut(&mut StackPusher);

pub struct StackPusher {
    stack: TvmStack,
    blocks: Vec<Vec<Inst>>,
    lock: u32,
}

impl Default for StackPusher {
    fn default() -> Self {
        Self::new()
    }
}

impl StackPusher {
    pub fn new() -> Self {
        Self { stack: TvmStack::default(), blocks: vec![Vec::new()], lock: 0 }
    }

    pub fn with_stack_size(size: i32) -> Self {
        let mut p = Self::new();
        p.stack.change(size);
        p
    }

    fn cur(&mut self) -> &mut Vec<Inst> {
        self.blocks.last_mut().expect("no open instruction block")
    }

    fn append(&mut self, inst: Inst) {
        self.cur().push(inst);
    }

    pub fn stack_size(&self) -> i32 {
        self.stack.size()
    }

    pub fn has_lock(&self) -> bool {
        self.lock > 0
    }

    /// Applies a raw stack delta; suppressed while the model is locked.
    pub fn change(&mut self, delta: i32) {
        if self.lock == 0 {
            self.stack.change(delta);
        }
    }

    fn change_tr(&mut self, take: i32, ret: i32) {
        self.change(ret - take);
    }

    pub fn ensure_size(&self, expected: i32, location: &str) {
        if self.lock == 0 {
            self.stack.ensure_size(expected, location);
        }
    }

    // ---- bindings ----------------------------------------------------

    pub fn bind(&mut self, decl: DeclId, allocate: bool) {
        self.stack.add(decl, allocate);
    }

    pub fn bind_parameters(&mut self, params: &[DeclId]) {
        for p in params {
            self.stack.add(*p, true);
        }
    }

    pub fn offset_of(&self, decl: DeclId) -> Option<i32> {
        self.stack.offset_of(decl)
    }

    /// Writes the stack top into the slot bound to `decl`, if any.
    pub fn try_assign(&mut self, decl: DeclId) -> bool {
        match self.stack.offset_of(decl) {
            Some(0) => true,
            Some(idx) => {
                self.pop_s(idx);
                true
            }
            None => false,
        }
    }

    pub fn take_last(&mut self, n: i32) {
        self.stack.take_last(n);
    }

    // ---- basic emission ----------------------------------------------

    pub fn push_loc(&mut self, file: &str, line: u32) {
        self.append(Inst::Loc(crate::inst::Loc { file: file.to_string(), line }));
    }

    /// Appends `cmd` asserting its declared effect equals `delta`.
    /// An empty `cmd` only adjusts the model ("fix stack").
    pub fn push(&mut self, delta: i32, cmd: &str) {
        if cmd.is_empty() {
            self.change(delta);
            return;
        }
        let op = catalog::gen(cmd);
        assert!(
            delta == op.ret - op.take,
            "declared stack delta {delta} does not match {} for {cmd}",
            op.ret - op.take
        );
        self.change_tr(op.take, op.ret);
        self.append(Inst::Gen(op));
    }

    pub fn push_gen(&mut self, op: GenOp) {
        self.change_tr(op.take, op.ret);
        self.append(Inst::Gen(op));
    }

    /// Asymmetric ops are only legal inside an opaque section, where the
    /// model is locked and the external effect is declared on close.
    pub fn push_asym(&mut self, cmd: &str) {
        assert!(self.lock >= 1, "asymmetric op {cmd} outside an opaque section");
        let op = catalog::asym(cmd);
        self.append(Inst::Asym(op));
    }

    pub fn push_hardcode(&mut self, code: Vec<String>, take: i32, ret: i32, pure: bool) {
        self.change_tr(take, ret);
        self.append(Inst::HardCode(HardCode { code, take, ret, pure }));
    }

    pub fn push_cell(&mut self, cell: PushCellOrSlice) {
        self.append(Inst::Cell(cell));
        self.change(1);
    }

    pub fn push_int<V: Into<BigInt>>(&mut self, value: V) {
        let v: BigInt = value.into();
        self.push(1, &format!("PUSHINT {v}"));
    }

    pub fn push_null(&mut self) {
        self.push(1, "NULL");
    }

    pub fn push_zero_address(&mut self) {
        self.push(
            1,
            "PUSHSLICE x8000000000000000000000000000000000000000000000000000000000000000001_",
        );
    }

    /// Materializes a string literal. Short strings become an inline
    /// PUSHSLICE; longer ones are split into a chain of reference cells,
    /// eight bits per character so no character straddles two cells.
    pub fn push_string(&mut self, data: &[u8], to_slice: bool) {
        let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
        if 4 * hex.len() <= consts::MAX_PUSH_SLICE_BIT_LENGTH && to_slice {
            self.push(1, &format!("PUSHSLICE x{hex}"));
            return;
        }

        let save = self.stack_size();
        let symbol_qty = ((consts::CELL_BIT_LENGTH / 8) * 8) / 4;
        let mut segments: Vec<(CellKind, String)> = Vec::new();
        let mut kind = if to_slice { CellKind::PushRefSlice } else { CellKind::PushRef };
        let mut start = 0;
        loop {
            let end = usize::min(start + symbol_qty, hex.len());
            segments.push((kind, format!(".blob x{}", &hex[start..end])));
            start = end;
            kind = CellKind::Cell;
            if start >= hex.len() {
                break;
            }
        }

        let mut cell: Option<Box<PushCellOrSlice>> = None;
        for (kind, blob) in segments.into_iter().rev() {
            cell = Some(Box::new(PushCellOrSlice { kind, blob, child: cell }));
        }
        let cell = *cell.expect("string chain is never empty");
        self.append(Inst::Cell(cell));
        self.change(1);
        self.ensure_size(save + 1, "push_string");
    }

    // ---- blocks, continuations, opaque sections ----------------------

    pub fn start_continuation(&mut self) {
        self.blocks.push(Vec::new());
    }

    fn end_block(&mut self, kind: BlockKind) -> CodeBlock {
        let insts = self.blocks.pop().expect("no open block to close");
        assert!(!self.blocks.is_empty(), "closed the outermost block");
        CodeBlock::new(kind, insts)
    }

    pub fn end_continuation(&mut self) {
        let b = self.end_block(BlockKind::PushCont);
        self.append(Inst::Block(b));
    }

    pub fn end_continuation_from_ref(&mut self) {
        let b = self.end_block(BlockKind::PushRefCont);
        self.append(Inst::Block(b));
    }

    pub fn start_opaque(&mut self) {
        self.lock += 1;
        self.blocks.push(Vec::new());
    }

    pub fn end_opaque(&mut self, take: i32, ret: i32, pure: bool) {
        self.lock -= 1;
        let block = self.end_block(BlockKind::None);
        self.append(Inst::Opaque { take, ret, pure, block });
        self.change_tr(take, ret);
    }

    pub fn decl_ret_flag(&mut self) {
        self.append(Inst::DeclRetFlag);
        self.change(1);
    }

    pub fn end_ret_or_break_or_cont(&mut self, take: i32) {
        let body = self.end_block(BlockKind::None);
        self.append(Inst::RetOrBreakOrCont { take, body });
    }

    pub fn end_log_circuit(&mut self, can_expand: bool, op: LogicOp) {
        let body = self.end_block(BlockKind::None);
        self.append(Inst::LogCircuit(LogCircuit { can_expand, op, body }));
    }

    fn call_ref_or_call_x(&mut self, take: i32, ret: i32, kind: SubKind) {
        let block = self.end_block(BlockKind::None);
        self.append(Inst::Sub(SubProgram { take, ret, kind, block }));
    }

    pub fn call_ref(&mut self, take: i32, ret: i32) {
        self.call_ref_or_call_x(take, ret, SubKind::CallRef);
    }

    pub fn call_x(&mut self, take: i32, ret: i32) {
        self.call_ref_or_call_x(take, ret, SubKind::CallX);
    }

    fn pop_trailing_block(&mut self) -> CodeBlock {
        match self.cur().pop() {
            Some(Inst::Block(b)) => b,
            other => panic!("expected a trailing code block, found {other:?}"),
        }
    }

    pub fn if_else(&mut self) {
        self.if_else_impl(false);
    }

    pub fn if_else_with_jmp(&mut self) {
        self.if_else_impl(true);
    }

    fn if_else_impl(&mut self, with_jmp: bool) {
        let false_body = self.pop_trailing_block();
        let true_body = self.pop_trailing_block();
        let kind = if with_jmp { IfElseKind::IfElseWithJmp } else { IfElseKind::IfElse };
        self.append(Inst::IfElse(IfElse { kind, true_body, false_body: Some(false_body) }));
    }

    /// Consumes the two trailing blocks into an expression-shaped
    /// conditional leaving `ret` values.
    pub fn push_conditional(&mut self, ret: i32) {
        let false_body = self.pop_trailing_block();
        let true_body = self.pop_trailing_block();
        self.append(Inst::Cond(Condition { true_body, false_body, ret }));
        self.change(ret);
    }

    fn if_or_ifnot(&mut self, kind: IfElseKind) {
        let true_body = self.pop_trailing_block();
        self.append(Inst::IfElse(IfElse { kind, true_body, false_body: None }));
    }

    pub fn if_(&mut self) {
        self.if_or_ifnot(IfElseKind::If);
    }

    pub fn if_not(&mut self) {
        self.if_or_ifnot(IfElseKind::IfNot);
    }

    pub fn if_jmp(&mut self) {
        self.if_or_ifnot(IfElseKind::IfJmp);
    }

    pub fn if_not_jmp(&mut self) {
        self.if_or_ifnot(IfElseKind::IfNotJmp);
    }

    pub fn if_ref(&mut self) {
        self.end_continuation();
        self.if_or_ifnot(IfElseKind::IfRef);
    }

    pub fn if_not_ref(&mut self) {
        self.end_continuation();
        self.if_or_ifnot(IfElseKind::IfNotRef);
    }

    pub fn if_jmp_ref(&mut self) {
        self.end_continuation();
        self.if_or_ifnot(IfElseKind::IfJmpRef);
    }

    pub fn if_not_jmp_ref(&mut self) {
        self.end_continuation();
        self.if_or_ifnot(IfElseKind::IfNotJmpRef);
    }

    pub fn repeat(&mut self) {
        let body = self.pop_trailing_block();
        self.append(Inst::Repeat(body));
    }

    pub fn until(&mut self) {
        let body = self.pop_trailing_block();
        self.append(Inst::Until(body));
    }

    pub fn while_(&mut self) {
        let body = self.pop_trailing_block();
        let cond = self.pop_trailing_block();
        self.append(Inst::While { cond, body });
    }

    pub fn ret(&mut self) {
        self.append(make_ret());
    }

    pub fn ifret(&mut self) {
        self.append(make_ifret());
        self.change(-1);
    }

    pub fn ifnotret(&mut self) {
        self.append(make_ifnotret());
        self.change(-1);
    }

    pub fn throw(&mut self, cmd: &str) {
        let op = catalog::make_throw(cmd);
        self.change_tr(op.take, op.ret);
        self.append(Inst::Throw(op));
    }

    // ---- stack shuffles ----------------------------------------------

    pub fn drop(&mut self, cnt: i32) {
        assert!(cnt >= 0);
        if cnt >= 1 {
            self.change(-cnt);
            self.append(make_drop(cnt));
        }
    }

    /// Drops `dropped` slots situated under the top `left` slots.
    pub fn drop_under(&mut self, dropped: i32, left: i32) {
        assert!(dropped >= 0 && left >= 0);
        if dropped == 0 {
        } else if left == 0 {
            self.drop(dropped);
        } else if dropped == 1 && left == 1 {
            self.pop_s(1);
        } else {
            self.append(make_blkdrop2(dropped, left));
            self.change(-dropped);
        }
    }

    pub fn block_swap(&mut self, down: i32, top: i32) {
        assert!(down >= 0 && top >= 0);
        if down == 0 || top == 0 {
            return;
        }
        self.append(make_blkswap(down, top));
    }

    pub fn reverse(&mut self, i: i32, j: i32) {
        self.append(make_reverse(i, j));
    }

    pub fn exchange(&mut self, i: i32) {
        self.append(make_xchg_s(i));
    }

    pub fn rot(&mut self) {
        self.append(make_rot());
    }

    pub fn rot_rev(&mut self) {
        self.append(make_rot_rev());
    }

    pub fn push_s(&mut self, i: i32) {
        assert!(i >= 0);
        self.append(make_push(i));
        self.change(1);
    }

    pub fn push_s2(&mut self, i: i32, j: i32) {
        assert!(i >= 0 && j >= 0);
        self.append(make_push2(i, j));
        self.change(2);
    }

    pub fn push_s3(&mut self, i: i32, j: i32, k: i32) {
        self.append(make_push3(i, j, k));
        self.change(3);
    }

    pub fn pop_s(&mut self, i: i32) {
        assert!(i >= 1);
        self.append(make_pop(i));
        self.change(-1);
    }

    // ---- tuples and globals ------------------------------------------

    pub fn tuple(&mut self, qty: i32) {
        assert!(qty >= 0);
        if qty <= 15 {
            self.push(-qty + 1, &format!("TUPLE {qty}"));
        } else {
            assert!(qty <= 255);
            self.push_int(qty);
            let op = GenOp {
                opcode: "TUPLEVAR".to_string(),
                arg: String::new(),
                comment: String::new(),
                take: qty + 1,
                ret: 1,
                pure: true,
            };
            self.push_gen(op);
        }
    }

    pub fn untuple(&mut self, n: i32) {
        assert!(n >= 0);
        if n <= 15 {
            self.push(-1 + n, &format!("UNTUPLE {n}"));
        } else {
            assert!(n <= 255);
            self.push_int(n);
            let op = GenOp {
                opcode: "UNTUPLEVAR".to_string(),
                arg: String::new(),
                comment: String::new(),
                take: 2,
                ret: n,
                pure: true,
            };
            self.push_gen(op);
        }
    }

    pub fn index_noexcep(&mut self, index: i32) {
        assert!((0..=254).contains(&index));
        self.push(0, &format!("INDEX_NOEXCEP {index}"));
    }

    pub fn index_excep(&mut self, index: i32) {
        assert!((0..=254).contains(&index));
        self.push(0, &format!("INDEX_EXCEP {index}"));
    }

    pub fn set_index(&mut self, index: i32) {
        assert!(index >= 0);
        if index <= 15 {
            self.push(-1, &format!("SETINDEX {index}"));
        } else {
            assert!(index <= 254);
            self.push_int(index);
            self.push(-2, "SETINDEXVAR");
        }
    }

    pub fn set_index_q(&mut self, index: i32) {
        assert!(index >= 0);
        if index <= 15 {
            self.push(-1, &format!("SETINDEXQ {index}"));
        } else {
            assert!(index <= 254);
            self.push_int(index);
            self.push(-2, "SETINDEXVARQ");
        }
    }

    pub fn get_glob(&mut self, index: i32) {
        assert!(index >= 0);
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::GetGlob, index }));
        self.change(1);
    }

    pub fn set_glob(&mut self, index: i32) {
        assert!(index >= 0);
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::SetGlob, index }));
        self.change(-1);
    }

    pub fn push_c4(&mut self) {
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::PushRoot, index: -1 }));
        self.change(1);
    }

    pub fn pop_root(&mut self) {
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::PopRoot, index: -1 }));
        self.change(-1);
    }

    pub fn push_c3(&mut self) {
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::PushC3, index: -1 }));
        self.change(1);
    }

    pub fn pop_c3(&mut self) {
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::PopC3, index: -1 }));
        self.change(-1);
    }

    pub fn push_c7(&mut self) {
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::PushC7, index: -1 }));
        self.change(1);
    }

    pub fn pop_c7(&mut self) {
        self.append(Inst::Glob(GlobOp { opcode: GlobOpcode::PopC7, index: -1 }));
        self.change(-1);
    }

    // ---- calls -------------------------------------------------------

    pub fn push_call(&mut self, take: i32, ret: i32, name: &str) {
        self.change_tr(take, ret);
        self.append(Inst::Gen(GenOp {
            opcode: "CALL".to_string(),
            arg: format!("${name}$"),
            comment: String::new(),
            take,
            ret,
            pure: false,
        }));
    }

    pub fn push_macro_call_in_callref(&mut self, take: i32, ret: i32, name: &str) {
        self.start_continuation();
        self.push_call(take, ret, name);
        self.call_ref(take, ret);
    }

    /// Splices an already-lowered inline body into the current block.
    pub fn push_inline(&mut self, block: &CodeBlock, take: i32, ret: i32) {
        assert!(block.kind() == BlockKind::None);
        for inst in block.instructions() {
            self.append(inst.clone());
        }
        self.change_tr(take, ret);
    }

    // ---- block surgery -----------------------------------------------

    /// Unwraps a trailing `ReturnOrBreakOrCont` whose body ends in a bare
    /// RET, splicing the body minus the RET back in. Used when the only
    /// return sits in tail position and needs no continuation wrapping.
    pub fn poll_last_ret_opcode(&mut self) {
        let ops = self.cur();
        let mut offset = 0;
        while offset < ops.len() && ops[ops.len() - 1 - offset].is_loc() {
            offset += 1;
        }
        let beg = ops.len() - 1 - offset;
        let node = ops.remove(beg);
        let body = match node {
            Inst::RetOrBreakOrCont { body, .. } => body,
            other => panic!("expected a return wrapper, found {other:?}"),
        };
        let mut insts = body.into_instructions();
        match insts.pop() {
            Some(Inst::Ret(RetKind::Ret)) => {}
            other => panic!("return wrapper does not end in RET: {other:?}"),
        }
        let ops = self.cur();
        for (k, inst) in insts.into_iter().enumerate() {
            ops.insert(beg + k, inst);
        }
    }

    /// Pops a trailing empty continuation, reporting whether one was there.
    pub fn try_poll_empty_push_cont(&mut self) -> bool {
        let ops = self.cur();
        assert!(ops.len() >= 2);
        match ops.last() {
            Some(Inst::Block(b)) if b.instructions().is_empty() => {
                ops.pop();
                true
            }
            Some(Inst::Block(_)) => false,
            other => panic!("expected a trailing continuation, found {other:?}"),
        }
    }

    /// Clones the stack model into a fresh pusher with no instructions.
    pub fn fork(&self) -> StackPusher {
        StackPusher { stack: self.stack.clone(), blocks: vec![Vec::new()], lock: 0 }
    }

    /// Appends another pusher's instructions; the model is left untouched,
    /// callers account for the net effect explicitly.
    pub fn absorb(&mut self, other: StackPusher) {
        let mut blocks = other.blocks;
        assert!(blocks.len() == 1, "absorbed pusher has open blocks");
        let insts = blocks.pop().expect("checked above");
        self.cur().extend(insts);
    }

    pub fn finish(mut self) -> CodeBlock {
        assert!(self.blocks.len() == 1, "unclosed blocks at finish");
        let insts = self.blocks.pop().expect("checked above");
        CodeBlock::new(BlockKind::None, insts)
    }

    // ---- builder helpers ---------------------------------------------

    pub fn st_zeroes(&mut self, qty: usize) {
        if qty > 0 {
            if qty == 1 {
                self.push(0, "STSLICECONST 0");
            } else {
                self.push_int(qty as i64);
                self.push(-1, "STZEROES");
            }
        }
    }

    pub fn st_ones(&mut self, qty: usize) {
        if qty > 0 {
            if qty == 1 {
                self.push(0, "STSLICECONST 1");
            } else {
                self.push_int(qty as i64);
                self.push(-1, "STONES");
            }
        }
    }

    /// Appends a constant bit string to the builder on top of the stack.
    pub fn append_to_builder(&mut self, bits: &str) {
        if bits.is_empty() {
            return;
        }
        if bits.bytes().all(|c| c == b'0') {
            self.st_zeroes(bits.len());
        } else {
            let hex = binary_string_to_slice(bits);
            if hex.len() * 4 <= consts::MAX_STSLICECONST_BITS {
                self.push(0, &format!("STSLICECONST x{hex}"));
            } else {
                self.push(1, &format!("PUSHSLICE x{hex}"));
                self.push(-1, "STSLICER");
            }
        }
    }

    pub fn sendrawmsg(&mut self) {
        self.push(-2, "SENDRAWMSG");
    }

    // ---- message assembly --------------------------------------------

    /// Folds the internal-message header schedule into the builder.
    /// Returns the worst-case bit length written so far.
    fn int_msg_info(
        &mut self,
        on_stack: &BTreeSet<usize>,
        const_params: &BTreeMap<usize, String>,
        is_dest_builder: bool,
    ) -> usize {
        let widths = consts::int_msg::FIELD_WIDTHS;
        let mut bit_string = String::from("0");
        let mut max_bits = 0usize;
        self.push(1, "NEWC");
        for (param, width) in widths.iter().enumerate() {
            assert!(!(const_params.contains_key(&param) && on_stack.contains(&param)));
            if let Some(bits) = const_params.get(&param) {
                bit_string.push_str(bits);
                max_bits += bits.len();
            } else if !on_stack.contains(&param) {
                bit_string.push_str(&"0".repeat(*width));
                max_bits += width;
                assert!(param != consts::int_msg::DEST, "message destination is mandatory");
            } else {
                self.append_to_builder(&bit_string);
                bit_string.clear();
                match param {
                    consts::int_msg::BOUNCE => {
                        self.push(-1, "STI 1");
                        max_bits += 1;
                    }
                    consts::int_msg::DEST => {
                        self.push(-1, if is_dest_builder { "STB" } else { "STSLICE" });
                        max_bits += consts::ADDRESS_MAX_BIT_LENGTH;
                    }
                    consts::int_msg::GRAMS => {
                        self.exchange(1);
                        self.push(-1, "STGRAMS");
                        max_bits += consts::GRAMS_MAX_BIT_LENGTH;
                    }
                    consts::int_msg::CURRENCY => {
                        self.push(-1, "STDICT");
                        max_bits += 1;
                    }
                    _ => panic!("field {param} cannot come from the stack"),
                }
            }
        }
        self.append_to_builder(&bit_string);
        max_bits
    }

    /// External-in (`10`) or external-out (`11`) header.
    fn ext_msg_info(&mut self, on_stack: &BTreeSet<usize>, is_out: bool) -> usize {
        let mut widths: Vec<usize> = vec![2, 2];
        if is_out {
            widths.extend([64, 32]);
        } else {
            widths.push(4);
        }
        let mut bit_string = String::from(if is_out { "11" } else { "10" });
        let mut max_bits = 0usize;
        self.push(1, "NEWC");
        for (param, width) in widths.iter().enumerate() {
            if !on_stack.contains(&param) {
                bit_string.push_str(&"0".repeat(*width));
            } else {
                max_bits += bit_string.len();
                self.append_to_builder(&bit_string);
                bit_string.clear();
                if param == consts::ext_msg::DEST {
                    self.push(-1, "STSLICE");
                    max_bits += consts::ADDRESS_MAX_BIT_LENGTH;
                } else if param == consts::ext_msg::SRC {
                    self.push(-1, "STB");
                    max_bits += consts::EXT_SRC_ADDRESS_BIT_LENGTH;
                } else {
                    panic!("field {param} cannot come from the stack");
                }
            }
        }
        max_bits += bit_string.len();
        self.append_to_builder(&bit_string);
        max_bits
    }

    /// Assembles a full outbound message cell. Runtime header fields are
    /// consumed from the stack in wire order (topmost first).
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_msg(
        &mut self,
        on_stack: &BTreeSet<usize>,
        const_params: &BTreeMap<usize, String>,
        body: Option<BodyAppender>,
        state_init: Option<BuilderAppender>,
        msg_type: MsgType,
        is_dest_builder: bool,
    ) {
        let mut msg_info_size = match msg_type {
            MsgType::Internal => self.int_msg_info(on_stack, const_params, is_dest_builder),
            MsgType::ExternalOut => self.ext_msg_info(on_stack, true),
            MsgType::ExternalIn => self.ext_msg_info(on_stack, false),
        };

        if let Some(init) = state_init {
            self.append_to_builder("1");
            init(self);
            msg_info_size += 1;
        } else {
            self.append_to_builder("0");
        }

        msg_info_size += 1;

        if let Some(body) = body {
            body(self, msg_info_size);
        } else {
            self.append_to_builder("0");
        }

        self.push(0, "ENDC");
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_msg(
        &mut self,
        on_stack: &BTreeSet<usize>,
        const_params: &BTreeMap<usize, String>,
        body: Option<BodyAppender>,
        state_init: Option<BuilderAppender>,
        sendrawmsg_flag: Option<BuilderAppender>,
        msg_type: MsgType,
    ) {
        self.prepare_msg(on_stack, const_params, body, state_init, msg_type, false);
        match sendrawmsg_flag {
            Some(f) => f(self),
            None => self.push_int(consts::SENDRAWMSG_DEFAULT_FLAG),
        }
        self.sendrawmsg();
    }

    // ---- entry-point helpers -----------------------------------------

    /// The pubkey slot doubles as the "was c4_to_c7 run" marker.
    pub fn was_c4_to_c7_called(&mut self) {
        self.get_glob(consts::c7::TVM_PUBKEY);
        self.push(0, "ISNULL");
    }

    pub fn check_ctor_called(&mut self) {
        self.get_glob(consts::c7::CONSTRUCTOR_FLAG);
        self.throw(&format!("THROWIFNOT {}", consts::exc::CALLED_BEFORE_CONSTRUCTOR));
    }

    pub fn check_if_ctor_called(&mut self, if_flag: bool) {
        self.start_continuation();
        self.check_ctor_called();
        if if_flag {
            self.if_jmp_ref();
        } else {
            self.if_not_jmp_ref();
        }
    }
}

// ---- bit-string utilities -------------------------------------------

/// Appends `value` as exactly `bitlen` big-endian binary digits.
pub fn add_binary_number_to_string(s: &mut String, value: &BigUint, bitlen: usize) {
    let mut tmp = String::with_capacity(bitlen);
    let mut v = value.clone();
    let two = BigUint::from(2u32);
    for _ in 0..bitlen {
        tmp.push(if (&v % &two).is_zero() { '0' } else { '1' });
        v /= &two;
    }
    s.extend(tmp.chars().rev());
}

/// Binary digits to the hex slice notation, appending the completion tag
/// when the length is not a multiple of four.
pub fn binary_string_to_slice(bits: &str) -> String {
    let mut s = bits.to_string();
    let mut completion = false;
    if s.len() % 4 != 0 {
        completion = true;
        s.push('1');
        while s.len() % 4 != 0 {
            s.push('0');
        }
    }
    let mut ans = String::new();
    for chunk in s.as_bytes().chunks(4) {
        let text = std::str::from_utf8(chunk).expect("binary digits are ascii");
        let x = u8::from_str_radix(text, 2).expect("binary digits");
        ans.push_str(&format!("{x:x}"));
    }
    if completion {
        ans.push('_');
    }
    ans
}

/// Inverse of [`binary_string_to_slice`] for `x…`-prefixed literals.
pub fn to_bit_string(slice: &str) -> String {
    if let Some(hex) = slice.strip_prefix('x') {
        let chars: Vec<char> = hex.chars().collect();
        let mut bits = String::new();
        let mut i = 0;
        while i < chars.len() {
            let digit = chars[i].to_digit(16).expect("hex digit in slice literal");
            if i + 2 == chars.len() && chars[i + 1] == '_' {
                let mut value = digit;
                let mut bitlen = 4usize;
                loop {
                    let is_one = value % 2 == 1;
                    bitlen -= 1;
                    value /= 2;
                    if is_one {
                        break;
                    }
                }
                add_binary_number_to_string(&mut bits, &BigUint::from(value), bitlen);
                break;
            }
            add_binary_number_to_string(&mut bits, &BigUint::from(digit), 4);
            i += 1;
        }
        bits
    } else if slice == "0" || slice == "1" {
        slice.to_string()
    } else {
        panic!("cannot interpret slice literal {slice}");
    }
}

/// `Grams` wire encoding: 4-bit byte-length prefix, then the amount.
pub fn tons_to_binary_string(value: &BigUint) -> String {
    let mut s = String::new();
    let mut v = value.clone();
    let two = BigUint::from(2u32);
    let mut len = 256;
    for i in 0..256 {
        if v.is_zero() {
            len = i;
            break;
        }
        s.push(if (&v % &two).is_zero() { '0' } else { '1' });
        v /= &two;
    }
    assert!(len < 120, "coin amount must fit 120 bits");
    let mut len = len;
    while len % 8 != 0 {
        s.push('0');
        len += 1;
    }
    let s: String = s.chars().rev().collect();
    let mut byte_len = len / 8;
    let mut prefix = String::new();
    for _ in 0..4 {
        prefix.push(if byte_len % 2 == 0 { '0' } else { '1' });
        byte_len /= 2;
    }
    let prefix: String = prefix.chars().rev().collect();
    prefix + &s
}

pub fn bool_to_binary_string(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
