//! Statement-shape analysis feeding the control-flow lowering decisions,
//! plus the contract-wide usage scan.

use crate::ast::{
    Builtin, ContractDef, Expr, ExprKind, FunctionDef, Statement, UsageFlags,
};

/// How a statement can leave its enclosing frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContInfo {
    pub can_return: bool,
    pub can_break: bool,
    pub can_continue: bool,
    pub always_return: bool,
    pub always_break: bool,
    pub always_continue: bool,
}

impl ContInfo {
    pub fn may_do_that(&self) -> bool {
        self.can_return || self.can_break || self.can_continue
    }

    /// Every path through the statement exits the frame.
    pub fn do_that_always(&self) -> bool {
        self.always_return || self.always_break || self.always_continue
    }
}

/// Computes how `stmt` interacts with return/break/continue. Break and
/// continue do not escape an enclosing loop; return escapes everything.
pub fn statement_info(stmt: &Statement) -> ContInfo {
    let mut info = ContInfo::default();
    match stmt {
        Statement::Return { .. } => {
            info.can_return = true;
            info.always_return = true;
        }
        Statement::Break { .. } => {
            info.can_break = true;
            info.always_break = true;
        }
        Statement::Continue { .. } => {
            info.can_continue = true;
            info.always_continue = true;
        }
        Statement::Block(block) => {
            for s in &block.statements {
                let child = statement_info(s);
                info.can_return |= child.can_return;
                info.can_break |= child.can_break;
                info.can_continue |= child.can_continue;
                info.always_return |= child.always_return;
                info.always_break |= child.always_break;
                info.always_continue |= child.always_continue;
            }
        }
        Statement::If { then_branch, else_branch, .. } => {
            let t = statement_info(then_branch);
            info.can_return = t.can_return;
            info.can_break = t.can_break;
            info.can_continue = t.can_continue;
            if let Some(e) = else_branch {
                let e = statement_info(e);
                info.can_return |= e.can_return;
                info.can_break |= e.can_break;
                info.can_continue |= e.can_continue;
                info.always_return = t.always_return && e.always_return;
                info.always_break = t.always_break && e.always_break;
                info.always_continue = t.always_continue && e.always_continue;
            }
        }
        Statement::While { body, .. } | Statement::For { body, .. } | Statement::ForEach { body, .. } => {
            // break/continue bind to this loop; only return crosses it
            let b = statement_info(body);
            info.can_return = b.can_return;
        }
        Statement::Emit { .. }
        | Statement::Expression { .. }
        | Statement::VarDeclStatement { .. }
        | Statement::Placeholder { .. } => {}
    }
    info
}

/// Where returns appear relative to the end of a function body; decides
/// whether the body needs continuation wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationReturn {
    NoReturn,
    Last,
    Anywhere,
}

pub fn locate_returns(statements: &[Statement]) -> LocationReturn {
    let last_is_ret = matches!(statements.last(), Some(Statement::Return { .. }));
    let mut inner = false;
    for (i, s) in statements.iter().enumerate() {
        let is_last = i + 1 == statements.len();
        if is_last && matches!(s, Statement::Return { .. }) {
            continue;
        }
        if statement_info(s).can_return {
            inner = true;
        }
    }
    if inner {
        LocationReturn::Anywhere
    } else if last_is_ret {
        LocationReturn::Last
    } else {
        LocationReturn::NoReturn
    }
}

pub fn scan_usage(contract: &ContractDef) -> UsageFlags {
    let mut flags = UsageFlags::default();
    flags.has_responsible_function = contract.functions.iter().any(|f| f.is_responsible);
    for f in &contract.functions {
        scan_statements(&f.body.statements, &mut flags);
    }
    for m in &contract.modifiers {
        scan_statements(&m.body.statements, &mut flags);
    }
    flags
}

fn scan_statements(statements: &[Statement], flags: &mut UsageFlags) {
    for s in statements {
        scan_statement(s, flags);
    }
}

fn scan_statement(stmt: &Statement, flags: &mut UsageFlags) {
    match stmt {
        Statement::Block(b) => scan_statements(&b.statements, flags),
        Statement::If { cond, then_branch, else_branch, .. } => {
            scan_expr(cond, flags);
            scan_statement(then_branch, flags);
            if let Some(e) = else_branch {
                scan_statement(e, flags);
            }
        }
        Statement::While { cond, body, .. } => {
            scan_expr(cond, flags);
            scan_statement(body, flags);
        }
        Statement::For { init, cond, update, body, .. } => {
            if let Some(init) = init {
                scan_statement(init, flags);
            }
            if let Some(cond) = cond {
                scan_expr(cond, flags);
            }
            if let Some(update) = update {
                scan_expr(update, flags);
            }
            scan_statement(body, flags);
        }
        Statement::ForEach { range, body, .. } => {
            scan_expr(range, flags);
            scan_statement(body, flags);
        }
        Statement::Return { expr, .. } => {
            if let Some(e) = expr {
                scan_expr(e, flags);
            }
        }
        Statement::Emit { args, .. } => {
            for a in args {
                scan_expr(a, flags);
            }
        }
        Statement::Expression { expr } => scan_expr(expr, flags),
        Statement::VarDeclStatement { init, .. } => {
            if let Some(e) = init {
                scan_expr(e, flags);
            }
        }
        Statement::Break { .. } | Statement::Continue { .. } | Statement::Placeholder { .. } => {}
    }
}

fn scan_expr(expr: &Expr, flags: &mut UsageFlags) {
    match &expr.kind {
        ExprKind::Builtin { builtin, args } => {
            match builtin {
                Builtin::MsgSender => flags.has_msg_sender = true,
                Builtin::MsgPubkey => flags.has_msg_pubkey = true,
                _ => {}
            }
            for a in args {
                scan_expr(a, flags);
            }
        }
        ExprKind::TupleLit(items) => {
            for e in items {
                scan_expr(e, flags);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            scan_expr(lhs, flags);
            scan_expr(rhs, flags);
        }
        ExprKind::Unary { operand, .. } => scan_expr(operand, flags),
        ExprKind::Ternary { cond, if_true, if_false } => {
            scan_expr(cond, flags);
            scan_expr(if_true, flags);
            scan_expr(if_false, flags);
        }
        ExprKind::Assign { value, .. } => scan_expr(value, flags),
        ExprKind::Call { args, .. } => {
            for a in args {
                scan_expr(a, flags);
            }
        }
        _ => {}
    }
}

/// `true` when the function is lowered with named return values pushed up
/// front, before the body runs.
pub fn with_prelocated_ret_values(f: &FunctionDef) -> bool {
    !f.returns.is_empty() && f.returns.iter().all(|r| !r.name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, SrcLoc, Statement};

    fn loc() -> SrcLoc {
        SrcLoc::new("a.sol", 1)
    }

    fn ret() -> Statement {
        Statement::Return { expr: None, loc: loc() }
    }

    fn blk(statements: Vec<Statement>) -> Statement {
        Statement::Block(Block { statements, loc: loc() })
    }

    #[test]
    fn test_return_is_always() {
        let info = statement_info(&ret());
        assert!(info.can_return && info.always_return);
    }

    #[test]
    fn test_loop_absorbs_break_but_not_return() {
        let body = blk(vec![Statement::Break { loc: loc() }, ret()]);
        let lp = Statement::While {
            kind: crate::ast::LoopKind::While,
            cond: crate::ast::Expr {
                kind: crate::ast::ExprKind::BoolLit(true),
                ty: crate::types::Ty::Bool,
                loc: loc(),
            },
            body: Box::new(body),
            loc: loc(),
        };
        let info = statement_info(&lp);
        assert!(info.can_return);
        assert!(!info.can_break, "break binds to the loop itself");
        assert!(!info.do_that_always());
    }

    #[test]
    fn test_if_always_needs_both_branches() {
        let one_sided = Statement::If {
            cond: crate::ast::Expr {
                kind: crate::ast::ExprKind::BoolLit(true),
                ty: crate::types::Ty::Bool,
                loc: loc(),
            },
            then_branch: Box::new(ret()),
            else_branch: None,
            loc: loc(),
        };
        let info = statement_info(&one_sided);
        assert!(info.can_return && !info.always_return);

        let two_sided = Statement::If {
            cond: crate::ast::Expr {
                kind: crate::ast::ExprKind::BoolLit(true),
                ty: crate::types::Ty::Bool,
                loc: loc(),
            },
            then_branch: Box::new(ret()),
            else_branch: Some(Box::new(ret())),
            loc: loc(),
        };
        assert!(statement_info(&two_sided).always_return);
    }

    #[test]
    fn test_locate_returns() {
        assert_eq!(locate_returns(&[]), LocationReturn::NoReturn);
        assert_eq!(locate_returns(&[ret()]), LocationReturn::Last);
        assert_eq!(
            locate_returns(&[blk(vec![ret()]), blk(vec![])]),
            LocationReturn::Anywhere
        );
    }
}
