//! Expression lowering. Short-circuit operators become log circuits; a
//! ternary becomes the expression-shaped conditional; internal calls go
//! through a macro wrapped in CALLREF unless the call graph is cyclic.

use tvmgen_core::consts::{c7, exc};
use tvmgen_core::inst::LogicOp;
use tvmgen_core::pusher::StackPusher;

use crate::ast::{BinOp, Builtin, Expr, ExprKind, LValue, UnOp};
use crate::context::CompilerContext;
use crate::error::{LowerError, Result};
use crate::types::Ty;

pub struct ExprLowerer<'a, 'c> {
    pub p: &'a mut StackPusher,
    pub ctx: &'a mut CompilerContext<'c>,
}

impl<'a, 'c> ExprLowerer<'a, 'c> {
    pub fn new(p: &'a mut StackPusher, ctx: &'a mut CompilerContext<'c>) -> Self {
        Self { p, ctx }
    }

    pub fn compile(&mut self, expr: &Expr, result_needed: bool) -> Result<()> {
        self.compile_value(expr)?;
        if !result_needed {
            self.p.drop(self.produced_count(expr));
        }
        Ok(())
    }

    /// Values the expression leaves on the stack; calls answer with their
    /// full return arity.
    fn produced_count(&self, expr: &Expr) -> i32 {
        match &expr.kind {
            ExprKind::Call { function, .. } => {
                self.ctx.contract.functions[*function].returns.len() as i32
            }
            _ => expr.produced() as i32,
        }
    }

    fn compile_value(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::IntLit(value) => {
                self.p.push_int(value.clone());
            }
            ExprKind::BoolLit(value) => {
                self.p.push(1, if *value { "TRUE" } else { "FALSE" });
            }
            ExprKind::StrLit(text) => {
                self.p.push_string(text.as_bytes(), false);
            }
            ExprKind::Null => self.p.push_null(),
            ExprKind::TupleLit(items) => {
                for item in items {
                    self.compile_value(item)?;
                }
            }
            ExprKind::Local(decl) => {
                let offset = self
                    .p
                    .offset_of(*decl)
                    .expect("local variable vanished from the stack model");
                self.p.push_s(offset);
            }
            ExprKind::State(index) => {
                let slot = self.ctx.state_var_slot_by_index(*index);
                self.p.get_glob(slot);
            }
            ExprKind::Binary { op: BinOp::And, lhs, rhs } => {
                self.log_circuit(lhs, rhs, LogicOp::And)?;
            }
            ExprKind::Binary { op: BinOp::Or, lhs, rhs } => {
                self.log_circuit(lhs, rhs, LogicOp::Or)?;
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_value(lhs)?;
                self.compile_value(rhs)?;
                self.binary_op(*op, &expr.ty)?;
            }
            ExprKind::Unary { op, operand } => {
                self.compile_value(operand)?;
                match op {
                    UnOp::Not | UnOp::BitNot => self.p.push(0, "NOT"),
                    UnOp::Neg => {
                        self.p.push(0, "NEGATE");
                        self.check_fit(&expr.ty);
                    }
                }
            }
            ExprKind::Ternary { cond, if_true, if_false } => {
                self.compile_value(cond)?;
                self.p.push(-1, "");
                self.p.start_continuation();
                self.compile_value(if_true)?;
                self.p.push(-1, "");
                self.p.end_continuation();
                self.p.start_continuation();
                self.compile_value(if_false)?;
                self.p.push(-1, "");
                self.p.end_continuation();
                self.p.push_conditional(1);
            }
            ExprKind::Assign { target, value } => {
                self.compile_value(value)?;
                match target {
                    LValue::Local(decl) => {
                        let assigned = self.p.try_assign(*decl);
                        assert!(assigned, "assignment target is not on the stack");
                    }
                    LValue::State(index) => {
                        let var_ty = self.ctx.contract.state_vars[*index].decl.ty.clone();
                        hard_convert(self.p, &var_ty, &value.ty);
                        let slot = self.ctx.state_var_slot_by_index(*index);
                        self.p.set_glob(slot);
                    }
                }
            }
            ExprKind::Call { function, args } => {
                for arg in args {
                    self.compile_value(arg)?;
                }
                let callee = &self.ctx.contract.functions[*function];
                let take = callee.params.len() as i32;
                let ret = callee.returns.len() as i32;
                let name = self.ctx.function_internal_name(callee);
                let caller = self
                    .ctx
                    .current_function_index()
                    .expect("calls happen inside a function");
                let recursive = self.ctx.add_call_and_check_cycle(caller, *function);
                if recursive {
                    self.p.push_call(take, ret, &name);
                } else {
                    self.p.push_macro_call_in_callref(take, ret, &format!("{name}_macro"));
                }
            }
            ExprKind::Builtin { builtin, args } => self.builtin(expr, *builtin, args)?,
        }
        Ok(())
    }

    /// `a && b` / `a || b` with the operand replicated for the circuit.
    fn log_circuit(&mut self, lhs: &Expr, rhs: &Expr, op: LogicOp) -> Result<()> {
        self.compile_value(lhs)?;
        self.p.push_s(0);
        self.p.start_continuation();
        self.p.drop(1);
        self.compile_value(rhs)?;
        self.p.end_log_circuit(rhs.is_pure(), op);
        self.p.push(-1, "");
        Ok(())
    }

    fn binary_op(&mut self, op: BinOp, result_ty: &Ty) -> Result<()> {
        let checked = match op {
            BinOp::Add => {
                self.p.push(-1, "ADD");
                true
            }
            BinOp::Sub => {
                self.p.push(-1, "SUB");
                true
            }
            BinOp::Mul => {
                self.p.push(-1, "MUL");
                true
            }
            BinOp::Div => {
                self.p.push(-1, "DIV");
                false
            }
            BinOp::Mod => {
                self.p.push(-1, "MOD");
                false
            }
            BinOp::BitAnd => {
                self.p.push(-1, "AND");
                false
            }
            BinOp::BitOr => {
                self.p.push(-1, "OR");
                false
            }
            BinOp::BitXor => {
                self.p.push(-1, "XOR");
                false
            }
            BinOp::Shl => {
                self.p.push(-1, "LSHIFT");
                true
            }
            BinOp::Shr => {
                self.p.push(-1, "RSHIFT");
                false
            }
            BinOp::Eq => {
                self.p.push(-1, "EQUAL");
                false
            }
            BinOp::Ne => {
                self.p.push(-1, "NEQ");
                false
            }
            BinOp::Lt => {
                self.p.push(-1, "LESS");
                false
            }
            BinOp::Gt => {
                self.p.push(-1, "GREATER");
                false
            }
            BinOp::Le => {
                self.p.push(-1, "LEQ");
                false
            }
            BinOp::Ge => {
                self.p.push(-1, "GEQ");
                false
            }
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled above"),
        };
        if checked {
            self.check_fit(result_ty);
        }
        Ok(())
    }

    fn check_fit(&mut self, ty: &Ty) {
        if self.ctx.pragma.have_ignore_int_overflow {
            return;
        }
        if let Some((bits, signed)) = ty.numeric_info() {
            if ty == &Ty::Bool {
                return;
            }
            if signed {
                self.p.push(0, &format!("FITS {bits}"));
            } else {
                self.p.push(0, &format!("UFITS {bits}"));
            }
        }
    }

    fn builtin(&mut self, expr: &Expr, builtin: Builtin, args: &[Expr]) -> Result<()> {
        match builtin {
            Builtin::MsgSender => self.p.get_glob(c7::SENDER_ADDRESS),
            Builtin::MsgPubkey => self.p.get_glob(c7::MSG_PUBKEY),
            Builtin::TvmPubkey => self.p.get_glob(c7::TVM_PUBKEY),
            Builtin::Now => self.p.push(1, "NOW"),
            Builtin::Require => {
                let cond = args
                    .first()
                    .ok_or_else(|| LowerError::unsupported(&expr.loc, "require needs a condition"))?;
                self.compile_value(cond)?;
                let code = match args.get(1) {
                    None => exc::REQUIRE_FAILED.into(),
                    Some(Expr { kind: ExprKind::IntLit(value), .. }) => value.clone(),
                    Some(other) => {
                        return Err(LowerError::unsupported(
                            &other.loc,
                            "require error code must be a constant",
                        ))
                    }
                };
                self.p.throw(&format!("THROWIFNOT {code}"));
            }
        }
        Ok(())
    }
}

/// Materializes the zero value of `ty`, wrapped in an opaque section so
/// the optimizer sees a single pure producer.
pub fn push_default_value(p: &mut StackPusher, ty: &Ty) {
    p.start_opaque();
    match ty {
        Ty::Address => p.push_zero_address(),
        Ty::Bool | Ty::Uint(_) | Ty::Int(_) | Ty::VarUint(_) | Ty::FunctionValue => p.push_int(0),
        Ty::Cell | Ty::Bytes | Ty::Str => p.push_cell(tvmgen_core::inst::PushCellOrSlice {
            kind: tvmgen_core::inst::CellKind::PushRef,
            blob: String::new(),
            child: None,
        }),
        Ty::Array(_) => {
            p.push_int(0);
            p.push(1, "NEWDICT");
            p.push(-1, "PAIR");
        }
        Ty::Mapping(_, _) => p.push(1, "NEWDICT"),
        Ty::Optional(_) => p.push_null(),
        Ty::Slice => p.push(1, "PUSHSLICE x8_"),
        Ty::Builder => p.push(1, "NEWC"),
        Ty::Tuple(items) => {
            for item in items {
                push_default_value(p, item);
            }
            p.tuple(items.len() as i32);
        }
    }
    p.end_opaque(0, 1, true);
}

/// Implicit-to-explicit conversion between numeric types: a narrowing
/// conversion gets a range check, everything else passes through.
pub fn hard_convert(p: &mut StackPusher, to: &Ty, from: &Ty) {
    let (Some((to_bits, to_signed)), Some((from_bits, from_signed))) =
        (to.numeric_info(), from.numeric_info())
    else {
        return;
    };
    if to == &Ty::Bool || from == &Ty::Bool {
        return;
    }
    let implicit = to_signed == from_signed && to_bits >= from_bits;
    if !implicit {
        if to_signed {
            p.push(0, &format!("FITS {to_bits}"));
        } else {
            p.push(0, &format!("UFITS {to_bits}"));
        }
    }
}
