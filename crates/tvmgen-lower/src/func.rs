//! Function, modifier and statement lowering. A function is lowered as a
//! chain of modifier wrappers around the body; each wrapper resumes the
//! next one at its placeholder statement. Control flow keeps a stack of
//! frames recording entry depth, loop-ness and whether the frame is
//! entered by jump; the cooperative flag protocol kicks in whenever some
//! enclosing frame is a plain continuation.

use std::collections::{BTreeMap, BTreeSet};

use tvmgen_core::consts::flag;
use tvmgen_core::inst::LogicOp;
use tvmgen_core::pusher::{MsgType, StackPusher};
use tvmgen_core::stack::DeclId;

use crate::abi::{function_id_of, BodyId, ChainDataEncoder, OutboundReason};
use crate::ast::{
    Block, Expr, FunctionDef, LoopKind, SrcLoc, Statement, VarDecl,
};
use crate::context::CompilerContext;
use crate::dict;
use crate::error::{LowerError, Result};
use crate::expr::{hard_convert, push_default_value, ExprLowerer};
use crate::scan::{
    locate_returns, statement_info, with_prelocated_ret_values, ContInfo, LocationReturn,
};
use crate::types::Ty;

#[derive(Debug, Clone, Copy)]
pub struct ControlFlow {
    pub stack_size: i32,
    pub is_loop: bool,
    pub use_jmp: bool,
}

pub struct FunctionLowerer<'c> {
    function: &'c FunctionDef,
    current_modifier: usize,
    start_stack_size: i32,
    push_args: bool,
    control_flow: Vec<ControlFlow>,
}

pub fn push_location(p: &mut StackPusher, loc: &SrcLoc, reset: bool) {
    let line = if reset { 0 } else { loc.line };
    p.push_loc(&loc.file, line);
}

impl<'c> FunctionLowerer<'c> {
    /// Lowers a complete function (modifier chain included) into `p`.
    /// With `push_args` the parameters are assumed absent and modeled as
    /// freshly pushed; otherwise they already occupy the stack top.
    pub fn lower_function_with_modifiers(
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        function: &'c FunctionDef,
        push_args: bool,
    ) -> Result<()> {
        let mut ss = p.stack_size();
        if !push_args {
            ss -= function.params.len() as i32;
        }
        let mut lowerer = FunctionLowerer {
            function,
            current_modifier: 0,
            start_stack_size: ss,
            push_args,
            control_flow: Vec::new(),
        };
        lowerer.visit_function_with_modifiers(p, ctx)
    }

    fn all_jmp(&self) -> bool {
        self.control_flow.iter().all(|info| info.use_jmp)
    }

    fn end_continuation_dropping(&mut self, p: &mut StackPusher, do_drop: bool) {
        let frame = self.control_flow.last().expect("open control-flow frame");
        let delta = p.stack_size() - frame.stack_size;
        if do_drop {
            p.drop(delta);
        } else {
            p.push(-delta, "");
        }
        p.end_continuation();
    }

    fn visit_function_with_modifiers(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
    ) -> Result<()> {
        let arg_qty = self.function.params.len() as i32;
        let ret_qty = self.function.returns.len() as i32;
        let name_ret_qty = if with_prelocated_ret_values(self.function) { ret_qty } else { 0 };

        if self.current_modifier == 0 {
            if self.push_args {
                assert!(self.start_stack_size == 0);
                let ids: Vec<DeclId> = self.function.params.iter().map(|v| v.id).collect();
                p.bind_parameters(&ids);
            } else {
                assert!(self.start_stack_size >= 0);
            }
        }

        if self.current_modifier == self.function.modifiers.len() {
            let mod_size = p.stack_size() - arg_qty;
            p.block_swap(arg_qty, mod_size);

            let mut fork = p.fork();
            fork.push(-mod_size, "");
            {
                let mut inner = FunctionLowerer {
                    function: self.function,
                    current_modifier: self.current_modifier,
                    start_stack_size: 0,
                    push_args: self.push_args,
                    control_flow: Vec::new(),
                };
                inner.visit_modifier_or_function_block(
                    &mut fork,
                    ctx,
                    &self.function.body,
                    arg_qty,
                    ret_qty,
                    name_ret_qty,
                )?;
            }
            p.absorb(fork);

            p.block_swap(mod_size, ret_qty);
        } else {
            let ss = p.stack_size();
            let contract = ctx.contract;
            let invocation = &self.function.modifiers[self.current_modifier];
            let definition = &contract.modifiers[invocation.def_index];
            for (i, arg) in invocation.args.iter().enumerate() {
                ExprLowerer::new(p, ctx).compile(arg, true)?;
                p.bind(definition.params[i].id, false);
            }
            let mut inner = FunctionLowerer {
                function: self.function,
                current_modifier: self.current_modifier,
                start_stack_size: ss,
                push_args: self.push_args,
                control_flow: Vec::new(),
            };
            inner.visit_modifier_or_function_block(
                p,
                ctx,
                &definition.body,
                invocation.args.len() as i32,
                0,
                0,
            )?;
            p.ensure_size(ss, "modifier frame");
        }
        Ok(())
    }

    fn visit_modifier_or_function_block(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        body: &'c Block,
        arg_qty: i32,
        ret_qty: i32,
        name_ret_qty: i32,
    ) -> Result<()> {
        let location_return = locate_returns(&body.statements);
        let do_push_continuation = location_return == LocationReturn::Anywhere;

        if do_push_continuation {
            p.start_continuation();
        }
        if self.current_modifier == self.function.modifiers.len()
            && with_prelocated_ret_values(self.function)
        {
            self.push_default_parameters(p, &self.function.returns);
        }
        self.accept_body(p, ctx, body, Some((arg_qty, name_ret_qty)))?;
        if location_return == LocationReturn::Last {
            p.poll_last_ret_opcode();
        }
        if do_push_continuation {
            push_location(p, &self.function.loc, false);
            p.call_x(arg_qty, ret_qty);
            push_location(p, &self.function.loc, true);
        }
        Ok(())
    }

    fn push_default_parameters(&mut self, p: &mut StackPusher, returns: &[VarDecl]) {
        for ret in returns {
            push_default_value(p, &ret.ty);
            p.bind(ret.id, false);
        }
    }

    fn accept_body(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        block: &'c Block,
        function_block: Option<(i32, i32)>,
    ) -> Result<()> {
        let start_stack_size = p.stack_size();

        for statement in &block.statements {
            push_location(p, statement.loc(), false);
            self.visit_statement(p, ctx, statement)?;
        }

        let last_is_ret = matches!(block.statements.last(), Some(Statement::Return { .. }));

        if let Some((arg_qty, name_ret_qty)) = function_block {
            let fun_trash = p.stack_size() - self.start_stack_size - arg_qty - name_ret_qty;
            assert!(fun_trash >= 0, "function frame lost stack slots");
            if !last_is_ret {
                p.drop(fun_trash);
                p.drop_under(arg_qty, name_ret_qty);
            } else {
                p.push(-fun_trash - arg_qty, "");
            }
        } else {
            let delta = p.stack_size() - start_stack_size;
            assert!(delta >= 0, "block frame lost stack slots");
            if !block.statements.is_empty() && !last_is_ret {
                p.drop(delta);
            } else {
                p.push(-delta, "");
            }
        }

        push_location(p, &block.loc, true);
        Ok(())
    }

    fn visit_statement(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        stmt: &'c Statement,
    ) -> Result<()> {
        match stmt {
            Statement::Block(block) => self.accept_body(p, ctx, block, None),
            Statement::Expression { expr } => self.visit_expression_statement(p, ctx, expr),
            Statement::VarDeclStatement { decls, init, loc } => {
                self.visit_var_decl(p, ctx, decls, init.as_ref(), loc)
            }
            Statement::If { cond, then_branch, else_branch, loc } => {
                self.visit_if(p, ctx, stmt, cond, then_branch.as_ref(), else_branch.as_deref(), loc)
            }
            Statement::While { kind, cond, body, loc } => {
                self.visit_while(p, ctx, *kind, cond, body.as_ref(), loc)
            }
            Statement::For { init, cond, update, body, .. } => {
                self.visit_for(p, ctx, init.as_deref(), cond.as_ref(), update.as_ref(), body.as_ref())
            }
            Statement::ForEach { decls, range, body, loc } => {
                self.visit_for_each(p, ctx, decls, range, body.as_ref(), loc)
            }
            Statement::Return { expr, .. } => self.visit_return(p, ctx, expr.as_ref()),
            Statement::Break { .. } => {
                self.break_or_continue(p, flag::BREAK);
                Ok(())
            }
            Statement::Continue { .. } => {
                self.break_or_continue(p, flag::CONTINUE);
                Ok(())
            }
            Statement::Emit { event_index, args, loc } => {
                self.visit_emit(p, ctx, *event_index, args, loc)
            }
            Statement::Placeholder { .. } => {
                let mut inner = FunctionLowerer {
                    function: self.function,
                    current_modifier: self.current_modifier + 1,
                    start_stack_size: p.stack_size(),
                    push_args: self.push_args,
                    control_flow: Vec::new(),
                };
                inner.visit_function_with_modifiers(p, ctx)
            }
        }
    }

    fn visit_expression_statement(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        expr: &Expr,
    ) -> Result<()> {
        if expr.is_pure() {
            return Ok(());
        }
        push_location(p, &expr.loc, false);
        let saved = p.stack_size();
        ExprLowerer::new(p, ctx).compile(expr, false)?;
        p.ensure_size(saved, "expression statement");
        push_location(p, &expr.loc, true);
        Ok(())
    }

    fn visit_var_decl(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        decls: &[Option<VarDecl>],
        init: Option<&Expr>,
        loc: &SrcLoc,
    ) -> Result<()> {
        use crate::ast::ExprKind;

        let save = p.stack_size();
        let n = decls.len() as i32;
        let mut bad = 0i32;

        match init {
            Some(Expr { kind: ExprKind::TupleLit(items), .. }) if decls.len() == items.len() => {
                for (decl, item) in decls.iter().zip(items) {
                    ExprLowerer::new(p, ctx).compile(item, true)?;
                    match decl {
                        Some(d) => hard_convert(p, &d.ty, &item.ty),
                        None => {
                            bad += 1;
                            p.drop(1);
                        }
                    }
                }
            }
            Some(expr) if decls.len() == 1 => {
                ExprLowerer::new(p, ctx).compile(expr, true)?;
                match &decls[0] {
                    Some(d) => hard_convert(p, &d.ty, &expr.ty),
                    None => {
                        bad += 1;
                        p.drop(1);
                    }
                }
            }
            Some(expr) => {
                return Err(LowerError::unsupported(
                    &expr.loc,
                    "destructuring a non-tuple initializer is not supported",
                ));
            }
            None => {
                for decl in decls {
                    let d = decl
                        .as_ref()
                        .ok_or_else(|| LowerError::unsupported(loc, "unnamed declaration"))?;
                    push_default_value(p, &d.ty);
                }
            }
        }

        p.push(-(n - bad), "");
        for decl in decls.iter().flatten() {
            p.bind(decl.id, true);
        }
        p.ensure_size(save + n - bad, "variable declaration");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_if(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        whole: &'c Statement,
        cond: &Expr,
        then_branch: &'c Statement,
        else_branch: Option<&'c Statement>,
        loc: &SrcLoc,
    ) -> Result<()> {
        let save = p.stack_size();

        let ci = statement_info(whole);
        let can_use_jmp = match else_branch {
            Some(else_branch) => {
                statement_info(then_branch).do_that_always()
                    && statement_info(else_branch).do_that_always()
            }
            None => statement_info(then_branch).do_that_always(),
        };
        if can_use_jmp {
            self.control_flow.push(ControlFlow {
                stack_size: p.stack_size(),
                is_loop: false,
                use_jmp: true,
            });
        } else {
            let info = self.push_control_flow_flag(p, &ci, false);
            self.control_flow.push(info);
        }

        ExprLowerer::new(p, ctx).compile(cond, true)?;
        p.push(-1, "");

        p.start_continuation();
        self.visit_statement(p, ctx, then_branch)?;
        self.end_continuation_dropping(p, !can_use_jmp);

        if let Some(else_branch) = else_branch {
            p.start_continuation();
            self.visit_statement(p, ctx, else_branch)?;
            self.end_continuation_dropping(p, !can_use_jmp);

            if can_use_jmp {
                p.if_else_with_jmp();
            } else {
                p.if_else();
            }
        } else {
            if can_use_jmp {
                p.if_jmp();
            } else {
                p.if_();
            }
            push_location(p, loc, true);
        }

        self.control_flow.pop();

        if !can_use_jmp && ci.may_do_that() {
            p.start_opaque();
            if ci.can_return && self.all_jmp() {
                p.push(0, &format!("EQINT {}", flag::RETURN));
                p.ifret();
            } else {
                p.push_s(0);
                p.ifret();
                p.drop(1);
            }
            p.end_opaque(1, 0, false);
        }
        p.ensure_size(save, "if statement");
        Ok(())
    }

    fn push_control_flow_flag(
        &mut self,
        p: &mut StackPusher,
        ci: &ContInfo,
        is_loop: bool,
    ) -> ControlFlow {
        if ci.may_do_that() {
            p.decl_ret_flag();
        }
        ControlFlow { stack_size: p.stack_size(), is_loop, use_jmp: false }
    }

    fn push_loop_flag(
        &mut self,
        p: &mut StackPusher,
        body: &Statement,
    ) -> (ContInfo, ControlFlow) {
        let ci = statement_info(body);
        let info = self.push_control_flow_flag(p, &ci, true);
        self.control_flow.push(info);
        (ci, info)
    }

    fn visit_while(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        kind: LoopKind,
        cond: &Expr,
        body: &'c Statement,
        loc: &SrcLoc,
    ) -> Result<()> {
        let save_for_while = p.stack_size();

        if kind == LoopKind::DoWhile {
            return self.do_while(p, ctx, cond, body);
        }

        let (ci, info) = self.push_loop_flag(p, body);
        let save = p.stack_size();

        if kind == LoopKind::Repeat {
            if ci.may_do_that() {
                return Err(LowerError::unsupported(
                    loc,
                    "using 'break', 'continue' or 'return' inside REPEAT is not supported yet",
                ));
            }
            ExprLowerer::new(p, ctx).compile(cond, true)?;
            p.push(-1, "");
        } else {
            self.visit_loop_condition(p, ctx, &ci, &info, Some(&mut |_me, p, ctx| {
                ExprLowerer::new(p, ctx).compile(cond, true)
            }))?;
        }
        p.ensure_size(save, "while condition");

        p.start_continuation();
        self.visit_statement(p, ctx, body)?;
        p.drop(p.stack_size() - save);
        p.end_continuation();

        if kind == LoopKind::Repeat {
            p.repeat();
        } else {
            p.while_();
        }

        self.control_flow.pop();
        self.after_loop_check(p, &ci, 0);
        p.ensure_size(save_for_while, "while statement");
        Ok(())
    }

    fn do_while(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        cond: &Expr,
        body: &'c Statement,
    ) -> Result<()> {
        let save = p.stack_size();

        let (ci, _info) = self.push_loop_flag(p, body);

        p.start_continuation();
        let ss = p.stack_size();
        if ci.may_do_that() {
            p.start_continuation();
            self.visit_statement(p, ctx, body)?;
            p.drop(p.stack_size() - ss);
            p.call_x(0, 0);
        } else {
            self.visit_statement(p, ctx, body)?;
            p.drop(p.stack_size() - ss);
        }

        if ci.can_break || ci.can_return {
            p.push_s(0);
            if ci.can_continue {
                p.push(0, &format!("GTINT {}", flag::CONTINUE));
            }
            p.push_s(0);
            p.push(-2, "");

            p.start_continuation();
            p.push(1, "");
            p.drop(1);
            ExprLowerer::new(p, ctx).compile(cond, true)?;
            p.push(0, "NOT");
            p.end_log_circuit(!ci.can_return, LogicOp::Or);
        } else {
            ExprLowerer::new(p, ctx).compile(cond, true)?;
            p.push(0, "NOT");
        }
        p.push(-1, "");
        p.end_continuation();

        p.until();

        self.control_flow.pop();
        self.after_loop_check(p, &ci, 0);
        p.ensure_size(save, "do-while statement");
        Ok(())
    }

    /// Wraps the raw loop condition so an already-raised control-flow flag
    /// short-circuits the test: `flag < 2 && condition`.
    fn visit_loop_condition(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        ci: &ContInfo,
        info: &ControlFlow,
        push_condition: Option<
            &mut dyn FnMut(&mut Self, &mut StackPusher, &mut CompilerContext<'c>) -> Result<()>,
        >,
    ) -> Result<()> {
        let stack_size = p.stack_size();
        p.start_continuation();
        if ci.can_break || ci.can_return {
            p.push_s(p.stack_size() - info.stack_size);
            p.push(0, "LESSINT 2");
            p.push(-1, "");

            if let Some(push_condition) = push_condition {
                p.push_s(0);

                p.start_continuation();
                p.drop(1);
                push_condition(self, p, ctx)?;
                p.end_log_circuit(!ci.can_return, LogicOp::And);

                p.push(-1, "");
            }
        } else if let Some(push_condition) = push_condition {
            push_condition(self, p, ctx)?;
            p.push(-1, "");
        } else {
            p.push(1, "TRUE");
            p.push(-1, "");
        }
        p.end_continuation();
        p.ensure_size(stack_size, "loop condition");
        Ok(())
    }

    fn after_loop_check(&mut self, p: &mut StackPusher, ci: &ContInfo, loop_var_qty: i32) {
        if ci.can_return {
            p.start_opaque();
            if self.all_jmp() {
                p.push(0, &format!("EQINT {}", flag::RETURN));
                p.ifret();
            } else {
                p.push_s(0);
                if ci.can_break || ci.can_continue {
                    p.push(0, &format!("EQINT {}", flag::RETURN));
                }
                p.ifret();
                p.drop(1);
            }
            p.end_opaque(1, 0, false);
        } else if ci.can_break || ci.can_continue {
            p.drop(1);
        }
        p.drop(loop_var_qty);
    }

    fn visit_body_of_for_loop(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        ci: &ContInfo,
        push_start_body: Option<
            &mut dyn FnMut(&mut Self, &mut StackPusher, &mut CompilerContext<'c>) -> Result<()>,
        >,
        body: &'c Statement,
        loop_expression: Option<
            &mut dyn FnMut(&mut Self, &mut StackPusher, &mut CompilerContext<'c>) -> Result<()>,
        >,
    ) -> Result<()> {
        p.start_continuation();
        if let Some(push_start_body) = push_start_body {
            push_start_body(self, p, ctx)?;
        }
        if ci.may_do_that() {
            let ss = p.stack_size();
            p.start_continuation();
            self.visit_statement(p, ctx, body)?;
            p.drop(p.stack_size() - ss);
            p.call_x(0, 0);
            if ci.can_return || ci.can_break {
                p.start_opaque();
                p.push_s(0);
                if ci.can_continue {
                    p.push(0, &format!("GTINT {}", flag::CONTINUE));
                }
                p.ifret();
                p.end_opaque(1, 1, false);
            }
        } else {
            let ss = p.stack_size();
            self.visit_statement(p, ctx, body)?;
            p.drop(p.stack_size() - ss);
        }
        if let Some(loop_expression) = loop_expression {
            loop_expression(self, p, ctx)?;
        }
        p.end_continuation();
        p.while_();
        self.control_flow.pop();
        Ok(())
    }

    fn visit_for(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        init: Option<&'c Statement>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &'c Statement,
    ) -> Result<()> {
        let save = p.stack_size();

        let mut have_decl_loop_var = false;
        if let Some(init) = init {
            let before = p.stack_size();
            self.visit_statement(p, ctx, init)?;
            have_decl_loop_var = p.stack_size() != before;
        }

        let (ci, info) = self.push_loop_flag(p, body);

        match cond {
            Some(cond) => {
                self.visit_loop_condition(p, ctx, &ci, &info, Some(&mut |_me, p, ctx| {
                    ExprLowerer::new(p, ctx).compile(cond, true)
                }))?;
            }
            None => self.visit_loop_condition(p, ctx, &ci, &info, None)?,
        }

        match update {
            Some(update) => {
                self.visit_body_of_for_loop(
                    p,
                    ctx,
                    &ci,
                    None,
                    body,
                    Some(&mut |_me, p, ctx| ExprLowerer::new(p, ctx).compile(update, false)),
                )?;
            }
            None => self.visit_body_of_for_loop(p, ctx, &ci, None, body, None)?,
        }

        self.after_loop_check(p, &ci, i32::from(have_decl_loop_var));
        p.ensure_size(save, "for statement");
        Ok(())
    }

    fn visit_for_each(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        decls: &[Option<VarDecl>],
        range: &Expr,
        body: &'c Statement,
        loc: &SrcLoc,
    ) -> Result<()> {
        let save = p.stack_size();
        ExprLowerer::new(p, ctx).compile(range, true)?;

        enum Shape {
            Bytes,
            Array(Ty),
            Mapping(Ty, Ty),
        }

        let shape = match &range.ty {
            Ty::Bytes | Ty::Str => Shape::Bytes,
            Ty::Array(inner) => Shape::Array((**inner).clone()),
            Ty::Mapping(k, v) => Shape::Mapping((**k).clone(), (**v).clone()),
            other => {
                return Err(LowerError::unsupported(loc, format!("cannot iterate over {other}")))
            }
        };

        let loop_var_qty = match &shape {
            Shape::Bytes => {
                // stack: cell value
                let iter = decls[0]
                    .as_ref()
                    .ok_or_else(|| LowerError::unsupported(loc, "iteration variable is unnamed"))?;
                p.push(0, "CTOS");
                p.push_null();
                p.bind(iter.id, false);
                2
            }
            Shape::Array(_) => {
                // stack: dict index value
                let iter = decls[0]
                    .as_ref()
                    .ok_or_else(|| LowerError::unsupported(loc, "iteration variable is unnamed"))?;
                p.index_noexcep(1);
                p.push_int(0);
                p.push_null();
                p.bind(iter.id, false);
                3
            }
            Shape::Mapping(key, value) => {
                // stack: dict privKey pubKey value
                p.push_s(0);
                dict::dict_min_max(p, key, value, true, loc)?;
                p.push(-2, "");
                match &decls[0] {
                    Some(k) => p.bind(k.id, true),
                    None => p.push(1, ""),
                }
                match decls.get(1).and_then(|d| d.as_ref()) {
                    Some(v) => p.bind(v.id, true),
                    None => p.push(1, ""),
                }
                4
            }
        };
        p.ensure_size(save + loop_var_qty, "for-each init");

        let (ci, info) = self.push_loop_flag(p, body);

        let mut push_condition = |_me: &mut Self, p: &mut StackPusher, _ctx: &mut CompilerContext<'c>| -> Result<()> {
            match &shape {
                Shape::Bytes => {
                    // stack: cell value [flag]
                    p.push_s(p.stack_size() - save - 1);
                    p.push(0, "SEMPTY");
                    p.push(0, "NOT");
                }
                Shape::Array(inner) => {
                    // stack: dict index value [flag]
                    p.push_s(p.stack_size() - save - 2);
                    p.push_s(p.stack_size() - save - 1);
                    dict::dict_fetch(p, &Ty::Uint(32), inner, loc)?;
                    p.push_s(0);
                    p.pop_s(p.stack_size() - save - 3);
                    p.push(0, "ISNULL");
                    p.push(0, "NOT");
                }
                Shape::Mapping(_, _) => {
                    // stack: dict privKey pubKey value [flag]
                    p.push_s(p.stack_size() - save - 2);
                    p.push(0, "ISNULL");
                    p.push(0, "NOT");
                }
            }
            Ok(())
        };
        self.visit_loop_condition(p, ctx, &ci, &info, Some(&mut push_condition))?;

        let mut push_start_body = |_me: &mut Self, p: &mut StackPusher, _ctx: &mut CompilerContext<'c>| -> Result<()> {
            if matches!(shape, Shape::Bytes) {
                // stack: cell value [flag]; pull the next byte, descending
                // into the continuation cell when the slice runs dry
                p.push_s(p.stack_size() - save - 1);

                p.start_opaque();
                p.push_asym("LDUQ 8");
                p.push(1, "");
                p.start_continuation();
                p.push(0, "PLDREF");
                p.push(0, "CTOS");
                p.push(1, "LDU 8");
                p.push(-2, "");
                p.end_continuation();
                p.if_not();
                p.end_opaque(1, 2, false);

                p.pop_s(p.stack_size() - save - 1);
                p.pop_s(p.stack_size() - save - 2);
            }
            Ok(())
        };

        let mut push_loop_expression = |_me: &mut Self, p: &mut StackPusher, _ctx: &mut CompilerContext<'c>| -> Result<()> {
            match &shape {
                Shape::Bytes => {}
                Shape::Array(_) => {
                    // stack: dict index value [flag]
                    p.push_s(p.stack_size() - save - 2);
                    p.push(0, "INC");
                    p.pop_s(p.stack_size() - save - 2);
                }
                Shape::Mapping(key, value) => {
                    // stack: dict privKey pubKey value [flag]
                    p.push_s(p.stack_size() - save - 2);
                    p.push_s(p.stack_size() - save - 1);
                    dict::dict_prev_next(p, key, value, true, loc)?;
                    p.pop_s(p.stack_size() - save - 4);
                    p.pop_s(p.stack_size() - save - 3);
                    p.pop_s(p.stack_size() - save - 2);
                }
            }
            Ok(())
        };

        self.visit_body_of_for_loop(
            p,
            ctx,
            &ci,
            Some(&mut push_start_body),
            body,
            Some(&mut push_loop_expression),
        )?;

        self.after_loop_check(p, &ci, loop_var_qty);
        p.ensure_size(save, "for-each statement");
        Ok(())
    }

    fn visit_return(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        expr: Option<&Expr>,
    ) -> Result<()> {
        if let Some(expr) = expr {
            ExprLowerer::new(p, ctx).compile(expr, true)?;
        }

        let ret_count = self.function.returns.len() as i32;

        p.start_continuation();
        let trash_slots = p.stack_size() - self.start_stack_size;
        let mut revert_delta = trash_slots - ret_count;
        p.drop_under(trash_slots - ret_count, ret_count);
        if !self.all_jmp() {
            p.push_int(flag::RETURN);
            revert_delta -= 1;
            p.push(revert_delta, "");
        } else {
            p.push(revert_delta, "");
        }
        p.ret();
        p.end_ret_or_break_or_cont(ret_count);
        Ok(())
    }

    fn break_or_continue(&mut self, p: &mut StackPusher, code: i32) {
        let frame = *self
            .control_flow
            .iter()
            .rev()
            .find(|info| info.is_loop)
            .expect("break or continue outside any loop");
        let size_delta = p.stack_size() - frame.stack_size;

        p.start_continuation();
        p.drop(size_delta + 1);
        p.push_int(code);
        p.ret();
        p.push(size_delta, "");
        p.end_ret_or_break_or_cont(0);
    }

    fn visit_emit(
        &mut self,
        p: &mut StackPusher,
        ctx: &mut CompilerContext<'c>,
        event_index: usize,
        args: &[Expr],
        loc: &SrcLoc,
    ) -> Result<()> {
        let contract = ctx.contract;
        let event = &contract.events[event_index];
        for param in &event.params {
            if !param.ty.is_encodable() {
                return Err(LowerError::unsupported(
                    loc,
                    format!("cannot encode event parameter of type {}", param.ty),
                ));
            }
        }

        for arg in args.iter().rev() {
            ExprLowerer::new(p, ctx).compile(arg, true)?;
        }

        let event_id =
            function_id_of(&event.name, &event.params, &[], OutboundReason::EmitEventExternal);
        let param_types: Vec<Ty> = event.params.iter().map(|v| v.ty.clone()).collect();

        let mut append_body = |p: &mut StackPusher, builder_bits: usize| {
            ChainDataEncoder::new(p).create_msg_body_and_append(
                &param_types,
                BodyId::Const(event_id),
                builder_bits,
            );
        };
        p.send_msg(
            &BTreeSet::new(),
            &BTreeMap::new(),
            Some(&mut append_body),
            None,
            None,
            MsgType::ExternalOut,
        );
        Ok(())
    }
}
