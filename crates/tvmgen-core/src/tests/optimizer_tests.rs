use crate::catalog::gen;
use crate::function::{Contract, Function, FunctionKind};
use crate::inst::{
    is_drop, make_blkswap, make_drop, make_push, make_ret, BlockKind, CodeBlock, IfElse,
    IfElseKind, Inst, LogCircuit, LogicOp, Loc, SubKind, SubProgram,
};
use crate::opt::{
    DeleterAfterRet, DeleterCallX, LocSquasher, LogCircuitExpander, Peephole, Simulator,
    StackOptimizer,
};

fn loc(line: u32) -> Inst {
    Inst::Loc(Loc { file: "a.sol".to_string(), line })
}

fn g(cmd: &str) -> Inst {
    Inst::Gen(gen(cmd))
}

fn macro_fn(take: i32, ret: i32, insts: Vec<Inst>) -> Contract {
    let body = CodeBlock::new(BlockKind::None, insts);
    Contract::new(vec![], vec![Function::new(take, ret, "f_macro", FunctionKind::Macro, body)])
}

#[test]
fn test_loc_squasher_removes_duplicates() {
    let mut c = macro_fn(0, 0, vec![loc(1), loc(2), g("ACCEPT"), loc(2), g("COMMIT")]);
    LocSquasher::run(&mut c);
    let insts = c.functions[0].body.instructions();
    // adjacent pair collapses to the later line, the repeat disappears
    assert_eq!(insts.len(), 3);
    assert_eq!(insts[0], loc(2));
    assert!(matches!(insts[1], Inst::Gen(_)));
    assert!(matches!(insts[2], Inst::Gen(_)));
}

#[test]
fn test_deleter_after_ret_keeps_locs_only() {
    let ret_wrapper = Inst::RetOrBreakOrCont {
        take: 0,
        body: CodeBlock::new(BlockKind::None, vec![make_ret()]),
    };
    let mut c = macro_fn(0, 0, vec![g("ACCEPT"), ret_wrapper, g("COMMIT"), loc(7)]);
    DeleterAfterRet::run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 3);
    assert!(matches!(insts[1], Inst::RetOrBreakOrCont { .. }));
    assert!(insts[2].is_loc());
}

#[test]
fn test_deleter_callx_inlines_single_subprogram() {
    let sub = Inst::Sub(SubProgram {
        take: 0,
        ret: 0,
        kind: SubKind::CallX,
        block: CodeBlock::new(BlockKind::None, vec![g("ACCEPT"), g("COMMIT")]),
    });
    let mut c = macro_fn(0, 0, vec![loc(3), sub]);
    DeleterCallX::run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 3);
    assert!(insts[0].is_loc());
    assert!(matches!(&insts[1], Inst::Gen(op) if op.opcode == "ACCEPT"));
}

#[test]
fn test_log_circuit_expander_rewrites_pure_and() {
    let circuit = Inst::LogCircuit(LogCircuit {
        can_expand: true,
        op: LogicOp::And,
        body: CodeBlock::new(BlockKind::None, vec![make_drop(1), g("PUSHINT 5")]),
    });
    let mut c = macro_fn(0, 1, vec![g("PUSHINT 1"), make_push(0), circuit]);
    LogCircuitExpander::run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 3);
    assert!(matches!(&insts[0], Inst::Gen(op) if op.full_opcode() == "PUSHINT 1"));
    assert!(matches!(&insts[1], Inst::Gen(op) if op.full_opcode() == "PUSHINT 5"));
    assert!(matches!(&insts[2], Inst::Gen(op) if op.opcode == "AND"));
}

#[test]
fn test_log_circuit_expander_leaves_impure_bodies() {
    let circuit = Inst::LogCircuit(LogCircuit {
        can_expand: true,
        op: LogicOp::Or,
        body: CodeBlock::new(BlockKind::None, vec![make_drop(1), g("NOW")]),
    });
    let mut c = macro_fn(0, 1, vec![g("PUSHINT 1"), make_push(0), circuit.clone()]);
    LogCircuitExpander::run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 3);
    assert_eq!(insts[2], circuit);
}

#[test]
fn test_peephole_merges_drops() {
    let mut c = macro_fn(3, 0, vec![make_drop(1), loc(4), make_drop(2)]);
    Peephole::new(false).run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 2);
    assert_eq!(is_drop(&insts[0]), Some(3));
    assert!(insts[1].is_loc());
}

#[test]
fn test_peephole_removes_dead_push() {
    let mut c = macro_fn(0, 0, vec![g("PUSHINT 5"), make_drop(1)]);
    Peephole::new(false).run(&mut c);
    assert!(c.functions[0].body.instructions().is_empty());
}

#[test]
fn test_peephole_folds_constant_condition() {
    let body = CodeBlock::new(BlockKind::PushCont, vec![g("ACCEPT")]);
    let branch = Inst::IfElse(IfElse { kind: IfElseKind::If, true_body: body, false_body: None });
    let mut c = macro_fn(0, 0, vec![g("TRUE"), branch]);
    Peephole::new(false).run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 1);
    assert!(matches!(&insts[0], Inst::Gen(op) if op.opcode == "ACCEPT"));
}

#[test]
fn test_peephole_drops_redundant_fits_check() {
    let mut c = macro_fn(0, 1, vec![g("PUSHINT 3"), g("UFITS 8")]);
    Peephole::new(false).run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 1);
    assert!(matches!(&insts[0], Inst::Gen(op) if op.full_opcode() == "PUSHINT 3"));
}

#[test]
fn test_peephole_swap_before_commutative_op() {
    let mut c = macro_fn(2, 1, vec![make_blkswap(1, 1), g("ADD")]);
    Peephole::new(false).run(&mut c);
    let insts = c.functions[0].body.instructions();
    assert_eq!(insts.len(), 1);
    assert!(matches!(&insts[0], Inst::Gen(op) if op.opcode == "ADD"));
}

#[test]
fn test_simulator_proves_segment_dead() {
    // protected cell one under the top, then everything is dropped
    let sim = Simulator::run(&[make_drop(3)], 2, 1);
    assert!(sim.success());
    assert_eq!(sim.commands(), &[make_drop(2)]);
}

#[test]
fn test_simulator_fails_on_read() {
    let sim = Simulator::run(&[make_push(1), make_drop(3)], 2, 1);
    assert!(!sim.success());
}

#[test]
fn test_stack_optimizer_erases_dead_values() {
    let mut c = macro_fn(0, 0, vec![g("PUSHINT 5"), g("PUSHINT 7"), make_drop(2)]);
    StackOptimizer::run(&mut c);
    assert!(c.functions[0].body.instructions().is_empty());
}
