use num_bigint::BigInt;
use tvmgen_core::consts::c7;
use tvmgen_core::function::FunctionKind;
use tvmgen_core::stack::DeclId;
use tvmgen_emit::Printer;
use tvmgen_lower::ast::*;
use tvmgen_lower::types::Ty;
use tvmgen_lower::{lower_contract, CompilerContext, LowerError, PragmaHelper};

fn loc() -> SrcLoc {
    SrcLoc::new("token.sol", 1)
}

fn expr(kind: ExprKind, ty: Ty) -> Expr {
    Expr { kind, ty, loc: loc() }
}

fn uint_lit(value: i64) -> Expr {
    expr(ExprKind::IntLit(BigInt::from(value)), Ty::Uint(256))
}

fn local(id: u32, ty: Ty) -> Expr {
    expr(ExprKind::Local(DeclId(id)), ty)
}

fn var(id: u32, name: &str, ty: Ty) -> VarDecl {
    VarDecl { id: DeclId(id), name: name.to_string(), ty }
}

fn block(statements: Vec<Statement>) -> Block {
    Block { statements, loc: loc() }
}

fn function(name: &str, params: Vec<VarDecl>, returns: Vec<VarDecl>, body: Vec<Statement>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        params,
        returns,
        visibility: Visibility::Internal,
        mutability: Mutability::NonPayable,
        special: SpecialFunction::None,
        is_responsible: false,
        modifiers: vec![],
        body: block(body),
        loc: loc(),
    }
}

fn contract(functions: Vec<FunctionDef>) -> ContractDef {
    ContractDef {
        name: "Token".to_string(),
        state_vars: vec![],
        functions,
        modifiers: vec![],
        events: vec![],
    }
}

fn pragma() -> PragmaHelper {
    PragmaHelper { have_ignore_int_overflow: true, ..PragmaHelper::default() }
}

fn assembly_of<'a>(text: &'a str, macro_name: &str) -> &'a str {
    let start = text
        .find(&format!(".macro {macro_name}\n"))
        .unwrap_or_else(|| panic!("macro {macro_name} missing from:\n{text}"));
    let rest = &text[start..];
    let end = ["\n.macro ", "\n.globl\t", "\n.internal-alias "]
        .iter()
        .filter_map(|marker| rest[1..].find(marker).map(|i| i + 1))
        .min()
        .unwrap_or(rest.len());
    &rest[..end]
}

#[test]
fn test_increment_body_needs_no_return_flag() {
    // function f(uint a) returns (uint) { return a + 1; }
    let body = vec![Statement::Return {
        expr: Some(expr(
            ExprKind::Binary {
                op: BinOp::Add,
                lhs: Box::new(local(1, Ty::Uint(256))),
                rhs: Box::new(uint_lit(1)),
            },
            Ty::Uint(256),
        )),
        loc: loc(),
    }];
    let f = function("f", vec![var(1, "a", Ty::Uint(256))], vec![var(2, "", Ty::Uint(256))], body);
    let c = contract(vec![f]);

    let lowered = lower_contract(&c, pragma()).unwrap();
    let f_macro = lowered.get_function("f_internal_macro").unwrap();
    assert_eq!((f_macro.take, f_macro.ret), (1, 1));
    assert_eq!(f_macro.kind, FunctionKind::Macro);

    let text = Printer::print_to_string(&lowered).unwrap();
    let body = assembly_of(&text, "f_internal_macro");
    assert!(body.contains("PUSHINT 1"), "missing literal in:\n{body}");
    assert!(body.contains("ADD"), "missing ADD in:\n{body}");
    // tail return in jmp position: no cooperative flag
    assert!(!body.contains("decl return flag"), "unexpected flag in:\n{body}");
    assert!(!body.contains("IFRET"), "unexpected flag check in:\n{body}");
}

#[test]
fn test_early_return_in_jmp_position_uses_ifjmp() {
    // function g(bool c) { if (c) { return; } c = false; }
    let body = vec![
        Statement::If {
            cond: local(1, Ty::Bool),
            then_branch: Box::new(Statement::Block(block(vec![Statement::Return {
                expr: None,
                loc: loc(),
            }]))),
            else_branch: None,
            loc: loc(),
        },
        Statement::Expression {
            expr: expr(
                ExprKind::Assign {
                    target: LValue::Local(DeclId(1)),
                    value: Box::new(expr(ExprKind::BoolLit(false), Ty::Bool)),
                },
                Ty::Bool,
            ),
        },
    ];
    let f = function("g", vec![var(1, "c", Ty::Bool)], vec![], body);
    let lowered = lower_contract(&contract(vec![f]), pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();
    let body = assembly_of(&text, "g_internal_macro");
    assert!(body.contains("IFJMP"), "expected the jmp form in:\n{body}");
    assert!(!body.contains("decl return flag"), "jmp form needs no flag:\n{body}");
}

#[test]
fn test_conditional_return_checks_flag() {
    // function h(bool a, bool b) { if (a) { if (b) { return; } } a = false; }
    let inner = Statement::If {
        cond: local(2, Ty::Bool),
        then_branch: Box::new(Statement::Block(block(vec![Statement::Return {
            expr: None,
            loc: loc(),
        }]))),
        else_branch: None,
        loc: loc(),
    };
    let body = vec![
        Statement::If {
            cond: local(1, Ty::Bool),
            then_branch: Box::new(Statement::Block(block(vec![
                inner,
                Statement::Expression {
                    expr: expr(
                        ExprKind::Assign {
                            target: LValue::Local(DeclId(2)),
                            value: Box::new(expr(ExprKind::BoolLit(false), Ty::Bool)),
                        },
                        Ty::Bool,
                    ),
                },
            ]))),
            else_branch: None,
            loc: loc(),
        },
        Statement::Expression {
            expr: expr(
                ExprKind::Assign {
                    target: LValue::Local(DeclId(1)),
                    value: Box::new(expr(ExprKind::BoolLit(false), Ty::Bool)),
                },
                Ty::Bool,
            ),
        },
    ];
    let f = function("h", vec![var(1, "a", Ty::Bool), var(2, "b", Ty::Bool)], vec![], body);
    let lowered = lower_contract(&contract(vec![f]), pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();
    let body = assembly_of(&text, "h_internal_macro");
    assert!(body.contains("decl return flag"), "outer frame declares the flag:\n{body}");
    assert!(body.contains("IFRET"), "flag must be checked after the join:\n{body}");
}

#[test]
fn test_emit_builds_external_out_message() {
    // event E(uint256 v); function k() { emit E(42); }
    let body = vec![Statement::Emit { event_index: 0, args: vec![uint_lit(42)], loc: loc() }];
    let f = function("k", vec![], vec![], body);
    let mut c = contract(vec![f]);
    c.events.push(EventDef { name: "E".to_string(), params: vec![var(9, "v", Ty::Uint(256))] });

    let lowered = lower_contract(&c, pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();
    let body = assembly_of(&text, "k_internal_macro");
    // ext_out_msg_info$11 with every other header field zeroed
    let header = tvmgen_core::pusher::binary_string_to_slice(&format!("11{}", "0".repeat(100)));
    assert!(
        body.contains(&format!("PUSHSLICE x{header}")),
        "missing external-out header in:\n{body}"
    );
    assert!(body.contains("PUSHINT 42"), "missing argument in:\n{body}");
    assert!(body.contains("STU 256"), "missing body encoding in:\n{body}");
    assert!(body.contains("SENDRAWMSG"), "message must be sent in:\n{body}");
    assert!(body.contains("ENDC"), "missing cell finish in:\n{body}");
}

#[test]
fn test_for_each_over_mapping_walks_dict_keys() {
    // function m(mapping(uint256 => uint256) d) { for ((uint k, uint v) : d) { k; } }
    let map_ty = Ty::Mapping(Box::new(Ty::Uint(256)), Box::new(Ty::Uint(256)));
    let body = vec![Statement::ForEach {
        decls: vec![Some(var(2, "k", Ty::Uint(256))), Some(var(3, "v", Ty::Uint(256)))],
        range: local(1, map_ty.clone()),
        body: Box::new(Statement::Block(block(vec![Statement::Expression {
            expr: expr(
                ExprKind::Assign {
                    target: LValue::Local(DeclId(2)),
                    value: Box::new(local(3, Ty::Uint(256))),
                },
                Ty::Uint(256),
            ),
        }]))),
        loc: loc(),
    }];
    let f = function("m", vec![var(1, "d", map_ty)], vec![], body);
    let lowered = lower_contract(&contract(vec![f]), pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();
    let body = assembly_of(&text, "m_internal_macro");
    assert!(body.contains("DICTUMIN"), "iteration starts at the minimum key:\n{body}");
    assert!(body.contains("DICTUGETNEXT"), "loop expression steps the key:\n{body}");
    assert!(body.contains("PUSHINT 256"), "key width feeds the dict ops:\n{body}");
    assert!(body.contains("WHILE"), "for-each lowers to a while loop:\n{body}");
}

#[test]
fn test_break_inside_repeat_is_rejected() {
    let body = vec![Statement::While {
        kind: LoopKind::Repeat,
        cond: uint_lit(5),
        body: Box::new(Statement::Block(block(vec![Statement::Break { loc: loc() }]))),
        loc: loc(),
    }];
    let f = function("r", vec![], vec![], body);
    let err = lower_contract(&contract(vec![f]), pragma()).unwrap_err();
    match err {
        LowerError::Unsupported { message, .. } => {
            assert!(message.contains("REPEAT"), "unexpected message: {message}")
        }
    }
}

#[test]
fn test_selector_builds_balanced_four_way_tree() {
    let c = contract(vec![]);
    let mut ctx = CompilerContext::new(&c, pragma());
    for (id, name) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")] {
        ctx.add_public_function(id, name);
    }
    let selector = tvmgen_lower::entry::generate_public_function_selector(&mut ctx).unwrap();
    assert_eq!((selector.take, selector.ret), (1, 1));

    let printed = Printer::print_to_string(&tvmgen_core::Contract::new(
        vec![],
        vec![selector],
    ))
    .unwrap();

    // the root compares once, against the id at zero-based index 3
    assert_eq!(printed.matches("LEQ").count(), 1, "one internal node expected:\n{printed}");
    let leq_pos = printed.find("LEQ").unwrap();
    let root = &printed[..leq_pos];
    assert!(root.contains("PUSHINT 4"), "root must compare against id 4:\n{printed}");

    // every function is reachable through an EQUAL leaf
    for name in ["a", "b", "c", "d", "e"] {
        assert!(printed.contains(&format!("CALL ${name}$")), "missing leaf {name}:\n{printed}");
    }
    assert_eq!(printed.matches("EQUAL").count(), 5, "five leaves expected:\n{printed}");
}

#[test]
fn test_storage_marshalling_pools_past_the_cap() {
    // FIRST_VAR_SLOT + 7 state variables exceed the per-slot economy
    let qty = (c7::FIRST_VAR_SLOT + 7) as usize;
    let mut state_vars = Vec::new();
    for i in 0..qty {
        state_vars.push(StateVar {
            decl: var(100 + i as u32, &format!("v{i}"), Ty::Uint(32)),
            is_public: false,
            is_static: false,
        });
    }
    let mut c = contract(vec![]);
    c.state_vars = state_vars;

    let lowered = lower_contract(&c, pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();

    let c4_to_c7 = assembly_of(&text, "c4_to_c7");
    // all variables land in one tuple that replaces the whole register
    assert!(c4_to_c7.contains("POP C7"), "pooled read must rewrite c7:\n{c4_to_c7}");
    assert!(c4_to_c7.contains("TUPLEVAR"), "pooled tuple is oversized:\n{c4_to_c7}");
    assert_eq!(c4_to_c7.matches("LDU 32").count(), qty, "one load per variable:\n{c4_to_c7}");
    assert!(c4_to_c7.contains("LDU 256"), "pubkey prefix:\n{c4_to_c7}");

    let c7_to_c4 = assembly_of(&text, "c7_to_c4");
    assert!(c7_to_c4.contains("PUSH C7"), "pooled write reads the register:\n{c7_to_c4}");
    assert!(c7_to_c4.contains("UNTUPLEVAR"), "pooled tuple is unpacked:\n{c7_to_c4}");
    assert_eq!(c7_to_c4.matches("STU 32").count(), qty, "one store per variable:\n{c7_to_c4}");
    assert!(c7_to_c4.contains("STU 256"), "pubkey prefix:\n{c7_to_c4}");
    assert!(c7_to_c4.contains("POPROOT"), "cell must be written back:\n{c7_to_c4}");
}

#[test]
fn test_storage_layout_without_pooling() {
    let mut c = contract(vec![]);
    c.state_vars = vec![
        StateVar { decl: var(100, "total", Ty::Uint(128)), is_public: false, is_static: false },
        StateVar { decl: var(101, "owner", Ty::Address), is_public: false, is_static: false },
    ];
    let lowered = lower_contract(&c, pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();

    let c4_to_c7 = assembly_of(&text, "c4_to_c7");
    assert!(c4_to_c7.contains(&format!("SETGLOB {}", c7::FIRST_VAR_SLOT)));
    assert!(c4_to_c7.contains(&format!("SETGLOB {}", c7::FIRST_VAR_SLOT + 1)));
    assert!(!c4_to_c7.contains("POP C7"), "no pooling below the cap:\n{c4_to_c7}");

    let c7_to_c4 = assembly_of(&text, "c7_to_c4");
    assert!(c7_to_c4.contains(&format!("GETGLOB {}", c7::FIRST_VAR_SLOT)));
    assert!(c7_to_c4.contains("LDMSGADDR") || c7_to_c4.contains("STSLICE"));
}

#[test]
fn test_whole_contract_prints_entry_points() {
    let f = function(
        "touch",
        vec![],
        vec![],
        vec![Statement::Expression {
            expr: expr(
                ExprKind::Builtin { builtin: Builtin::Require, args: vec![expr(ExprKind::BoolLit(true), Ty::Bool)] },
                Ty::Bool,
            ),
        }],
    );
    let mut c = contract(vec![f]);
    c.functions[0].visibility = Visibility::Public;

    let lowered = lower_contract(&c, pragma()).unwrap();
    let text = Printer::print_to_string(&lowered).unwrap();

    assert!(text.starts_with(".version sol"));
    assert!(text.contains(".internal-alias :main_internal, 0"));
    assert!(text.contains(".internal-alias :main_external, -1"));
    assert!(text.contains(".macro constructor"));
    assert!(text.contains(".macro c4_to_c7"));
    assert!(text.contains(".macro c7_to_c4"));
    assert!(text.contains(".macro public_function_selector"));
    assert!(text.contains(".macro touch"));
    assert!(text.contains(".macro touch_internal_macro"));
    assert!(text.contains(".globl\ttouch_internal"));
    assert!(text.contains("CALL $touch_internal_macro$"));
    assert!(text.contains("THROWIFNOT 100"));
}
