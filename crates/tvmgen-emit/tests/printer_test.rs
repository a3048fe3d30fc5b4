use tvmgen_core::catalog::gen;
use tvmgen_core::function::{Contract, Function, FunctionKind};
use tvmgen_core::inst::{
    make_blkdrop2, make_blkpush, make_blkswap, make_drop, make_pop, make_push, make_push2,
    make_reverse, make_xchg_s, BlockKind, CellKind, CodeBlock, GlobOp, GlobOpcode, Inst, Loc,
    PushCellOrSlice,
};
use tvmgen_emit::Printer;

fn print_insts(insts: Vec<Inst>) -> String {
    let body = CodeBlock::new(BlockKind::None, insts);
    let f = Function::new(0, 0, "probe", FunctionKind::Macro, body);
    let contract = Contract::new(vec![], vec![f]);
    Printer::print_to_string(&contract).unwrap()
}

fn lines(text: &str) -> Vec<&str> {
    text.lines().filter(|l| !l.is_empty()).collect()
}

#[test]
fn test_drop_mnemonic_selection() {
    let out = print_insts(vec![make_drop(1), make_drop(2), make_drop(5), make_drop(20)]);
    assert_eq!(
        lines(&out),
        vec![".macro probe", "DROP", "DROP2", "BLKDROP 5", "PUSHINT 20", "DROPX"]
    );
}

#[test]
fn test_push_and_pop_aliases() {
    let out = print_insts(vec![make_push(0), make_push(1), make_push(7), make_pop(1), make_pop(3)]);
    assert_eq!(
        lines(&out),
        vec![".macro probe", "DUP", "OVER", "PUSH S7", "NIP", "POP S3"]
    );
}

#[test]
fn test_blkswap_specializations() {
    let out = print_insts(vec![
        make_blkswap(1, 1),
        make_blkswap(1, 2),
        make_blkswap(2, 1),
        make_blkswap(2, 2),
        make_blkswap(1, 5),
        make_blkswap(5, 1),
        make_blkswap(3, 4),
        make_blkswap(20, 3),
    ]);
    assert_eq!(
        lines(&out),
        vec![
            ".macro probe",
            "SWAP",
            "ROT",
            "ROTREV",
            "SWAP2",
            "ROLL 5",
            "ROLLREV 5",
            "BLKSWAP 3, 4",
            "PUSHINT 20",
            "PUSHINT 3",
            "BLKSWX",
        ]
    );
}

#[test]
fn test_reverse_degrades_to_revx() {
    let out = print_insts(vec![make_reverse(2, 0), make_reverse(3, 0), make_reverse(5, 2), make_reverse(20, 0)]);
    assert_eq!(
        lines(&out),
        vec![
            ".macro probe",
            "SWAP",
            "XCHG S2",
            "REVERSE 5, 2",
            "PUSHINT 20",
            "PUSHINT 0",
            "REVX",
        ]
    );
}

#[test]
fn test_blkpush_chunks_past_fifteen() {
    let out = print_insts(vec![make_blkpush(20, 0)]);
    assert_eq!(
        lines(&out),
        vec![".macro probe", "BLKPUSH 15, 0", "BLKPUSH 5, 0"]
    );
}

#[test]
fn test_blkdrop2_variable_form() {
    let out = print_insts(vec![make_blkdrop2(2, 3), make_blkdrop2(17, 1)]);
    assert_eq!(
        lines(&out),
        vec![
            ".macro probe",
            "BLKDROP2 2, 3",
            "PUSHINT 17",
            "PUSHINT 1",
            "BLKSWX",
            "PUSHINT 17",
            "DROPX",
        ]
    );
}

#[test]
fn test_xchg_aliases() {
    let out = print_insts(vec![make_xchg_s(1), make_xchg_s(4)]);
    assert_eq!(lines(&out), vec![".macro probe", "SWAP", "XCHG S4"]);
}

#[test]
fn test_tuple_aliases_and_index_var_form() {
    let out = print_insts(vec![
        Inst::Gen(gen("TUPLE 2")),
        Inst::Gen(gen("UNTUPLE 1")),
        Inst::Gen(gen("INDEX_NOEXCEP 3")),
        Inst::Gen(gen("INDEX_NOEXCEP 20")),
    ]);
    assert_eq!(
        lines(&out),
        vec![
            ".macro probe",
            "PAIR",
            "UNSINGLE",
            "INDEX 3",
            "PUSHINT 20",
            "INDEXVAR",
        ]
    );
}

#[test]
fn test_glob_compact_and_variable_forms() {
    let out = print_insts(vec![
        Inst::Glob(GlobOp { opcode: GlobOpcode::GetGlob, index: 5 }),
        Inst::Glob(GlobOp { opcode: GlobOpcode::SetGlob, index: 40 }),
        Inst::Glob(GlobOp { opcode: GlobOpcode::PushRoot, index: -1 }),
    ]);
    assert_eq!(
        lines(&out),
        vec![
            ".macro probe",
            "GETGLOB 5",
            "PUSHINT 40",
            "SETGLOBVAR",
            "PUSHROOT",
        ]
    );
}

#[test]
fn test_push2_aliases() {
    let out = print_insts(vec![make_push2(1, 0), make_push2(3, 2), make_push2(4, 1)]);
    assert_eq!(
        lines(&out),
        vec![".macro probe", "DUP2", "OVER2", "PUSH2 S4, S1"]
    );
}

#[test]
fn test_cell_tree_printing() {
    let cell = PushCellOrSlice {
        kind: CellKind::PushRef,
        blob: ".blob x61".to_string(),
        child: Some(Box::new(PushCellOrSlice {
            kind: CellKind::Cell,
            blob: ".blob x62".to_string(),
            child: None,
        })),
    };
    let out = print_insts(vec![Inst::Cell(cell)]);
    assert_eq!(
        out.lines().collect::<Vec<_>>(),
        vec![
            ".macro probe",
            "PUSHREF {",
            "\t.blob x61",
            "\t.cell {",
            "\t\t.blob x62",
            "\t}",
            "}",
            "",
        ]
    );
}

#[test]
fn test_loc_directive() {
    let out = print_insts(vec![Inst::Loc(Loc { file: "token.sol".to_string(), line: 42 })]);
    assert!(out.contains(".loc token.sol, 42"));
}

#[test]
fn test_entry_point_directives() {
    let body = CodeBlock::new(BlockKind::None, vec![]);
    let contract = Contract::new(
        vec![".version sol 0.3.0".to_string()],
        vec![
            Function::new(0, 0, "main_internal", FunctionKind::MainInternal, body.clone()),
            Function::new(0, 0, "main_external", FunctionKind::MainExternal, body.clone()),
            Function::new(0, 0, "onCodeUpgrade", FunctionKind::OnCodeUpgrade, body.clone()),
            Function::new(0, 0, "onTickTock", FunctionKind::OnTickTock, body.clone()),
            Function::new(0, 0, "helper", FunctionKind::PrivateFunction, body),
        ],
    );
    let out = Printer::print_to_string(&contract).unwrap();
    assert!(out.starts_with(".version sol 0.3.0\n"));
    assert!(out.contains(".internal-alias :main_internal, 0\n.internal :main_internal"));
    assert!(out.contains(".internal-alias :main_external, -1\n.internal :main_external"));
    assert!(out.contains(".internal-alias :onCodeUpgrade, 2\n.internal :onCodeUpgrade"));
    assert!(out.contains(".internal-alias :onTickTock, -2\n.internal :onTickTock"));
    assert!(out.contains(".globl\thelper\n.type\thelper, @function"));
}
