//! Assembly printer. For every IR variant it picks the shortest mnemonic
//! that encodes the operation, degrading to the variable form whenever an
//! arity exceeds the compact encoding.

use std::io::Write;

use anyhow::Result;
use tvmgen_core::inst::{
    CellKind, CodeBlock, Condition, GenOp, GlobOp, GlobOpcode, IfElse, IfElseKind, Inst,
    LogCircuit, LogicOp, PushCellOrSlice, RetKind, StackOp, StackOpcode, SubKind, SubProgram,
};
use tvmgen_core::function::{Contract, Function, FunctionKind};
use tvmgen_core::inst::BlockKind;

use crate::emitter::{EmitContext, EmitResult, Emitter};

pub struct Printer;

impl Emitter for Printer {
    type Item = Contract;

    fn emit<W: Write>(
        &self,
        contract: &Contract,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        print_contract(contract, writer, context)
    }
}

impl Printer {
    pub fn print_to_string(contract: &Contract) -> Result<String> {
        Printer.emit_to_string(contract)
    }
}

fn line<W: Write>(w: &mut W, ctx: &EmitContext, text: &str) -> EmitResult {
    writeln!(w, "{}{}", ctx.tabs(), text)?;
    Ok(())
}

fn print_contract<W: Write>(contract: &Contract, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    for pragma in &contract.pragmas {
        writeln!(w, "{pragma}")?;
        writeln!(w)?;
    }
    for f in &contract.functions {
        print_function(f, w, ctx)?;
    }
    Ok(())
}

fn print_function<W: Write>(f: &Function, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    match f.kind {
        FunctionKind::PrivateFunction => {
            writeln!(w, ".globl\t{}", f.name)?;
            writeln!(w, ".type\t{}, @function", f.name)?;
        }
        FunctionKind::Macro | FunctionKind::MacroGetter => {
            writeln!(w, ".macro {}", f.name)?;
        }
        FunctionKind::MainInternal => {
            assert!(f.name == "main_internal");
            writeln!(w, ".internal-alias :main_internal, 0")?;
            writeln!(w, ".internal :main_internal")?;
        }
        FunctionKind::MainExternal => {
            assert!(f.name == "main_external");
            writeln!(w, ".internal-alias :main_external, -1")?;
            writeln!(w, ".internal :main_external")?;
        }
        FunctionKind::OnCodeUpgrade => {
            assert!(f.name == "onCodeUpgrade");
            writeln!(w, ".internal-alias :onCodeUpgrade, 2")?;
            writeln!(w, ".internal :onCodeUpgrade")?;
        }
        FunctionKind::OnTickTock => {
            assert!(f.name == "onTickTock");
            writeln!(w, ".internal-alias :onTickTock, -2")?;
            writeln!(w, ".internal :onTickTock")?;
        }
    }
    print_block(&f.body, w, ctx)?;
    writeln!(w)?;
    Ok(())
}

fn print_block<W: Write>(b: &CodeBlock, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    match b.kind() {
        BlockKind::None => {
            for inst in b.instructions() {
                print_inst(inst, w, ctx)?;
            }
        }
        BlockKind::PushCont | BlockKind::PushRefCont => {
            let keyword = if b.kind() == BlockKind::PushCont { "PUSHCONT" } else { "PUSHREFCONT" };
            line(w, ctx, &format!("{keyword} {{"))?;
            ctx.indent();
            for inst in b.instructions() {
                print_inst(inst, w, ctx)?;
            }
            ctx.dedent();
            line(w, ctx, "}")?;
        }
    }
    Ok(())
}

fn print_inst<W: Write>(inst: &Inst, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    match inst {
        Inst::Loc(loc) => line(w, ctx, &format!(".loc {}, {}", loc.file, loc.line)),
        Inst::DeclRetFlag => line(w, ctx, "FALSE ; decl return flag"),
        Inst::Asym(op) => line(w, ctx, &op.opcode),
        Inst::Opaque { block, .. } => print_block(block, w, ctx),
        Inst::HardCode(hard) => {
            for code_line in &hard.code {
                line(w, ctx, code_line)?;
            }
            Ok(())
        }
        Inst::Ret(kind) => line(
            w,
            ctx,
            match kind {
                RetKind::Ret => "RET",
                RetKind::IfRet => "IFRET",
                RetKind::IfNotRet => "IFNOTRET",
            },
        ),
        Inst::RetOrBreakOrCont { body, .. } => {
            line(w, ctx, "; start return")?;
            print_block(body, w, ctx)?;
            line(w, ctx, "; end return")
        }
        Inst::Throw(op) => line(w, ctx, &op.full_opcode()),
        Inst::Gen(op) => print_gen(op, w, ctx),
        Inst::Cell(cell) => print_cell(cell, w, ctx),
        Inst::Glob(op) => print_glob(op, w, ctx),
        Inst::Stack(op) => print_stack(op, w, ctx),
        Inst::Block(b) => print_block(b, w, ctx),
        Inst::Sub(sub) => print_sub(sub, w, ctx),
        Inst::Cond(cond) => print_cond(cond, w, ctx),
        Inst::LogCircuit(lc) => print_log_circuit(lc, w, ctx),
        Inst::IfElse(ie) => print_if_else(ie, w, ctx),
        Inst::Repeat(body) => {
            print_block(body, w, ctx)?;
            line(w, ctx, "REPEAT")
        }
        Inst::Until(body) => {
            print_block(body, w, ctx)?;
            line(w, ctx, "UNTIL")
        }
        Inst::While { cond, body } => {
            print_block(cond, w, ctx)?;
            print_block(body, w, ctx)?;
            line(w, ctx, "WHILE")
        }
    }
}

fn print_gen<W: Write>(op: &GenOp, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    let full = op.full_opcode();
    let text = match full.as_str() {
        "BITNOT" => "NOT".to_string(),
        "TUPLE 1" => "SINGLE".to_string(),
        "TUPLE 2" => "PAIR".to_string(),
        "TUPLE 3" => "TRIPLE".to_string(),
        "UNTUPLE 1" => "UNSINGLE".to_string(),
        "UNTUPLE 2" => "UNPAIR".to_string(),
        "UNTUPLE 3" => "UNTRIPLE".to_string(),
        _ if op.opcode == "INDEX_EXCEP" || op.opcode == "INDEX_NOEXCEP" => {
            let index: i32 = op.arg.parse().expect("tuple index is numeric");
            if index <= 15 {
                format!("INDEX {index}")
            } else {
                line(w, ctx, &format!("PUSHINT {index}"))?;
                "INDEXVAR".to_string()
            }
        }
        _ => full,
    };
    line(w, ctx, &text)
}

fn print_cell<W: Write>(cell: &PushCellOrSlice, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    let header = match cell.kind {
        CellKind::PushRef => "PUSHREF {",
        CellKind::PushRefSlice => "PUSHREFSLICE {",
        CellKind::Cell => ".cell {",
    };
    line(w, ctx, header)?;
    ctx.indent();
    if !cell.blob.is_empty() {
        line(w, ctx, &cell.blob)?;
    }
    if let Some(child) = &cell.child {
        print_cell(child, w, ctx)?;
    }
    ctx.dedent();
    line(w, ctx, "}")
}

fn print_glob<W: Write>(op: &GlobOp, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    match op.opcode {
        GlobOpcode::GetGlob => {
            if (1..=31).contains(&op.index) {
                line(w, ctx, &format!("GETGLOB {}", op.index))
            } else {
                line(w, ctx, &format!("PUSHINT {}", op.index))?;
                line(w, ctx, "GETGLOBVAR")
            }
        }
        GlobOpcode::SetGlob => {
            if (1..=31).contains(&op.index) {
                line(w, ctx, &format!("SETGLOB {}", op.index))
            } else {
                line(w, ctx, &format!("PUSHINT {}", op.index))?;
                line(w, ctx, "SETGLOBVAR")
            }
        }
        GlobOpcode::PushRoot => line(w, ctx, "PUSHROOT"),
        GlobOpcode::PopRoot => line(w, ctx, "POPROOT"),
        GlobOpcode::PushC3 => line(w, ctx, "PUSH C3"),
        GlobOpcode::PopC3 => line(w, ctx, "POP C3"),
        GlobOpcode::PushC7 => line(w, ctx, "PUSH C7"),
        GlobOpcode::PopC7 => line(w, ctx, "POP C7"),
    }
}

fn print_drop<W: Write>(n: i32, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    if n == 1 {
        line(w, ctx, "DROP")
    } else if n == 2 {
        line(w, ctx, "DROP2")
    } else if n <= 15 {
        line(w, ctx, &format!("BLKDROP {n}"))
    } else {
        line(w, ctx, &format!("PUSHINT {n}"))?;
        line(w, ctx, "DROPX")
    }
}

fn print_stack<W: Write>(op: &StackOp, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    let (i, j, k) = (op.i, op.j, op.k);
    match op.opcode {
        StackOpcode::Drop => print_drop(i, w, ctx),
        StackOpcode::PushS => {
            assert!(j == -1);
            match i {
                0 => line(w, ctx, "DUP"),
                1 => line(w, ctx, "OVER"),
                _ => line(w, ctx, &format!("PUSH S{i}")),
            }
        }
        StackOpcode::Xchg => {
            if i == 0 {
                if j == 1 {
                    line(w, ctx, "SWAP")
                } else {
                    line(w, ctx, &format!("XCHG S{j}"))
                }
            } else {
                line(w, ctx, &format!("XCHG S{i}, S{j}"))
            }
        }
        StackOpcode::BlkDrop2 => {
            if i > 15 || j > 15 {
                line(w, ctx, &format!("PUSHINT {i}"))?;
                line(w, ctx, &format!("PUSHINT {j}"))?;
                line(w, ctx, "BLKSWX")?;
                print_drop(i, w, ctx)
            } else {
                assert!((i >= 2 && j >= 1) || (i >= 1 && j >= 2));
                line(w, ctx, &format!("BLKDROP2 {i}, {j}"))
            }
        }
        StackOpcode::Push2S => {
            if i == 1 && j == 0 {
                line(w, ctx, "DUP2")
            } else if i == 3 && j == 2 {
                line(w, ctx, "OVER2")
            } else {
                line(w, ctx, &format!("PUSH2 S{i}, S{j}"))
            }
        }
        StackOpcode::PopS => {
            if i == 1 {
                line(w, ctx, "NIP")
            } else {
                line(w, ctx, &format!("POP S{i}"))
            }
        }
        StackOpcode::BlkSwap => {
            let (bottom, top) = (i, j);
            if bottom == 1 && top == 1 {
                line(w, ctx, "SWAP")
            } else if bottom == 1 && top == 2 {
                line(w, ctx, "ROT")
            } else if bottom == 2 && top == 1 {
                line(w, ctx, "ROTREV")
            } else if bottom == 2 && top == 2 {
                line(w, ctx, "SWAP2")
            } else if (1..=16).contains(&bottom) && (1..=16).contains(&top) {
                if bottom == 1 {
                    line(w, ctx, &format!("ROLL {top}"))
                } else if top == 1 {
                    line(w, ctx, &format!("ROLLREV {bottom}"))
                } else {
                    line(w, ctx, &format!("BLKSWAP {bottom}, {top}"))
                }
            } else {
                line(w, ctx, &format!("PUSHINT {bottom}"))?;
                line(w, ctx, &format!("PUSHINT {top}"))?;
                line(w, ctx, "BLKSWX")
            }
        }
        StackOpcode::Reverse => {
            assert!(i >= 2);
            if i == 2 && j == 0 {
                line(w, ctx, "SWAP")
            } else if i == 3 && j == 0 {
                line(w, ctx, "XCHG S2")
            } else if (2..=17).contains(&i) && (0..=15).contains(&j) {
                line(w, ctx, &format!("REVERSE {i}, {j}"))
            } else {
                line(w, ctx, &format!("PUSHINT {i}"))?;
                line(w, ctx, &format!("PUSHINT {j}"))?;
                line(w, ctx, "REVX")
            }
        }
        StackOpcode::BlkPush => {
            if i == 2 && j == 1 {
                line(w, ctx, "DUP2")
            } else if i == 2 && j == 3 {
                line(w, ctx, "OVER2")
            } else {
                if i > 15 {
                    assert!(j == 0);
                }
                let mut rest = i;
                while rest > 0 {
                    line(w, ctx, &format!("BLKPUSH {}, {j}", rest.min(15)))?;
                    rest -= 15;
                }
                Ok(())
            }
        }
        StackOpcode::Push3S => line(w, ctx, &format!("PUSH3 S{i}, S{j}, S{k}")),
        StackOpcode::Tuck => line(w, ctx, "TUCK"),
        StackOpcode::Puxc => line(w, ctx, &format!("PUXC S{i}, S{j}")),
    }
}

fn print_sub<W: Write>(sub: &SubProgram, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    let header = match sub.kind {
        SubKind::CallX => "PUSHCONT {",
        SubKind::CallRef => "CALLREF {",
    };
    line(w, ctx, header)?;
    ctx.indent();
    print_block(&sub.block, w, ctx)?;
    ctx.dedent();
    line(w, ctx, "}")?;
    if sub.kind == SubKind::CallX {
        line(w, ctx, "CALLX")?;
    }
    Ok(())
}

fn print_cond<W: Write>(cond: &Condition, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    print_block(&cond.true_body, w, ctx)?;
    print_block(&cond.false_body, w, ctx)?;
    line(w, ctx, "IFELSE")
}

fn print_log_circuit<W: Write>(lc: &LogCircuit, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    line(w, ctx, "PUSHCONT {")?;
    ctx.indent();
    print_block(&lc.body, w, ctx)?;
    ctx.dedent();
    line(w, ctx, "}")?;
    line(
        w,
        ctx,
        match lc.op {
            LogicOp::And => "IF",
            LogicOp::Or => "IFNOT",
        },
    )
}

fn print_if_else<W: Write>(ie: &IfElse, w: &mut W, ctx: &mut EmitContext) -> EmitResult {
    match ie.kind {
        IfElseKind::IfRef | IfElseKind::IfNotRef | IfElseKind::IfJmpRef | IfElseKind::IfNotJmpRef => {
            let keyword = match ie.kind {
                IfElseKind::IfRef => "IFREF",
                IfElseKind::IfNotRef => "IFNOTREF",
                IfElseKind::IfJmpRef => "IFJMPREF",
                IfElseKind::IfNotJmpRef => "IFNOTJMPREF",
                _ => unreachable!(),
            };
            line(w, ctx, &format!("{keyword} {{"))?;
            ctx.indent();
            for inst in ie.true_body.instructions() {
                print_inst(inst, w, ctx)?;
            }
            ctx.dedent();
            line(w, ctx, "}")
        }
        _ => {
            print_block(&ie.true_body, w, ctx)?;
            if let Some(false_body) = &ie.false_body {
                print_block(false_body, w, ctx)?;
            }
            match ie.kind {
                IfElseKind::If => line(w, ctx, "IF"),
                IfElseKind::IfNot => line(w, ctx, "IFNOT"),
                IfElseKind::IfJmp => line(w, ctx, "IFJMP"),
                IfElseKind::IfNotJmp => line(w, ctx, "IFNOTJMP"),
                IfElseKind::IfElse => line(w, ctx, "IFELSE"),
                IfElseKind::IfElseWithJmp => {
                    line(w, ctx, "CONDSEL")?;
                    line(w, ctx, "JMPX")
                }
                _ => unreachable!(),
            }
        }
    }
}
