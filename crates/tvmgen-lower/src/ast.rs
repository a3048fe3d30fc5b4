//! The decorated syntax tree this back-end consumes. The front end has
//! already resolved every name and annotated every expression with its
//! type; nothing here performs semantic checks.

use num_bigint::BigInt;
use tvmgen_core::stack::DeclId;

use crate::types::Ty;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcLoc {
    pub file: String,
    pub line: u32,
}

impl SrcLoc {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiVersion {
    V1,
    V2_1,
}

/// Pragma directives relevant to code generation, pre-digested by the
/// front end.
#[derive(Debug, Clone)]
pub struct PragmaHelper {
    pub abi_version: AbiVersion,
    pub have_pubkey: bool,
    pub have_time: bool,
    pub have_expire: bool,
    pub have_ignore_int_overflow: bool,
}

impl Default for PragmaHelper {
    fn default() -> Self {
        Self {
            abi_version: AbiVersion::V2_1,
            have_pubkey: false,
            have_time: false,
            have_expire: false,
            have_ignore_int_overflow: false,
        }
    }
}

/// What the contract actually touches, as reported by the usage scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageFlags {
    pub has_msg_sender: bool,
    pub has_msg_pubkey: bool,
    pub has_responsible_function: bool,
    pub has_await_call: bool,
    pub has_tvm_code: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Pure,
    View,
    NonPayable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialFunction {
    None,
    Constructor,
    Receive,
    Fallback,
    OnBounce,
    OnTickTock,
    OnCodeUpgrade,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: DeclId,
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone)]
pub struct StateVar {
    pub decl: VarDecl,
    pub is_public: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub struct EventDef {
    pub name: String,
    pub params: Vec<VarDecl>,
}

#[derive(Debug, Clone)]
pub struct ModifierDef {
    pub name: String,
    pub params: Vec<VarDecl>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct ModifierCall {
    pub def_index: usize,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<VarDecl>,
    pub returns: Vec<VarDecl>,
    pub visibility: Visibility,
    pub mutability: Mutability,
    pub special: SpecialFunction,
    pub is_responsible: bool,
    pub modifiers: Vec<ModifierCall>,
    pub body: Block,
    pub loc: SrcLoc,
}

#[derive(Debug, Clone)]
pub struct ContractDef {
    pub name: String,
    pub state_vars: Vec<StateVar>,
    pub functions: Vec<FunctionDef>,
    pub modifiers: Vec<ModifierDef>,
    pub events: Vec<EventDef>,
}

impl ContractDef {
    pub fn constructor(&self) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.special == SpecialFunction::Constructor)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub loc: SrcLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    DoWhile,
    Repeat,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Block(Block),
    If {
        cond: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        loc: SrcLoc,
    },
    While {
        kind: LoopKind,
        cond: Expr,
        body: Box<Statement>,
        loc: SrcLoc,
    },
    For {
        init: Option<Box<Statement>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Statement>,
        loc: SrcLoc,
    },
    ForEach {
        decls: Vec<Option<VarDecl>>,
        range: Expr,
        body: Box<Statement>,
        loc: SrcLoc,
    },
    Return {
        expr: Option<Expr>,
        loc: SrcLoc,
    },
    Break {
        loc: SrcLoc,
    },
    Continue {
        loc: SrcLoc,
    },
    Emit {
        event_index: usize,
        args: Vec<Expr>,
        loc: SrcLoc,
    },
    Expression {
        expr: Expr,
    },
    VarDeclStatement {
        decls: Vec<Option<VarDecl>>,
        init: Option<Expr>,
        loc: SrcLoc,
    },
    /// Marks where a modifier's wrapped body resumes.
    Placeholder {
        loc: SrcLoc,
    },
}

impl Statement {
    pub fn loc(&self) -> &SrcLoc {
        match self {
            Statement::Block(b) => &b.loc,
            Statement::If { loc, .. }
            | Statement::While { loc, .. }
            | Statement::For { loc, .. }
            | Statement::ForEach { loc, .. }
            | Statement::Return { loc, .. }
            | Statement::Break { loc }
            | Statement::Continue { loc }
            | Statement::Emit { loc, .. }
            | Statement::VarDeclStatement { loc, .. }
            | Statement::Placeholder { loc } => loc,
            Statement::Expression { expr } => &expr.loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    BitNot,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    MsgSender,
    MsgPubkey,
    TvmPubkey,
    Now,
    Require,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LValue {
    Local(DeclId),
    State(usize),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
    pub loc: SrcLoc,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(BigInt),
    BoolLit(bool),
    StrLit(String),
    Null,
    TupleLit(Vec<Expr>),
    Local(DeclId),
    State(usize),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, operand: Box<Expr> },
    Ternary { cond: Box<Expr>, if_true: Box<Expr>, if_false: Box<Expr> },
    Assign { target: LValue, value: Box<Expr> },
    Call { function: usize, args: Vec<Expr> },
    Builtin { builtin: Builtin, args: Vec<Expr> },
}

impl Expr {
    /// Statement-level values left on the stack by this expression.
    pub fn produced(&self) -> usize {
        match &self.kind {
            ExprKind::Assign { .. } => 0,
            ExprKind::Builtin { builtin: Builtin::Require, .. } => 0,
            ExprKind::TupleLit(items) => items.len(),
            _ => 1,
        }
    }

    /// No side effects, no calls: evaluating it is observationally void.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExprKind::IntLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::Null
            | ExprKind::Local(_)
            | ExprKind::State(_) => true,
            ExprKind::TupleLit(items) => items.iter().all(|e| e.is_pure()),
            ExprKind::Binary { lhs, rhs, .. } => lhs.is_pure() && rhs.is_pure(),
            ExprKind::Unary { operand, .. } => operand.is_pure(),
            ExprKind::Ternary { cond, if_true, if_false } => {
                cond.is_pure() && if_true.is_pure() && if_false.is_pure()
            }
            ExprKind::Assign { .. } | ExprKind::Call { .. } => false,
            ExprKind::Builtin { builtin, .. } => {
                matches!(builtin, Builtin::MsgSender | Builtin::MsgPubkey | Builtin::TvmPubkey | Builtin::Now)
            }
        }
    }
}
