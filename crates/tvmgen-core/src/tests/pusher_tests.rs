use crate::inst::{CellKind, Inst, StackOpcode};
use crate::pusher::{
    add_binary_number_to_string, binary_string_to_slice, to_bit_string, tons_to_binary_string,
    StackPusher,
};
use crate::stack::DeclId;
use num_bigint::BigUint;

#[test]
fn test_stack_model_tracks_effects() {
    let mut p = StackPusher::new();
    p.push_int(5);
    p.push_int(7);
    p.push(-1, "ADD");
    assert_eq!(p.stack_size(), 1);
}

#[test]
#[should_panic(expected = "declared stack delta")]
fn test_push_rejects_wrong_delta() {
    let mut p = StackPusher::new();
    p.push_int(1);
    p.push_int(2);
    p.push(0, "ADD");
}

#[test]
fn test_short_string_inlines_as_slice() {
    let mut p = StackPusher::new();
    p.push_string(b"abc", true);
    assert_eq!(p.stack_size(), 1);
    let block = p.finish();
    match &block.instructions()[0] {
        Inst::Gen(g) => assert_eq!(g.full_opcode(), "PUSHSLICE x616263"),
        other => panic!("expected a slice literal, got {other:?}"),
    }
}

#[test]
fn test_long_string_chains_cells() {
    let data = vec![b'q'; 200];
    let mut p = StackPusher::new();
    p.push_string(&data, false);
    assert_eq!(p.stack_size(), 1);
    let block = p.finish();
    match &block.instructions()[0] {
        Inst::Cell(cell) => {
            assert_eq!(cell.kind, CellKind::PushRef);
            // 400 hex digits split at the 254-digit cell boundary
            assert_eq!(cell.blob.len(), ".blob x".len() + 254);
            let child = cell.child.as_ref().expect("overflow continues in a child cell");
            assert_eq!(child.kind, CellKind::Cell);
            assert!(child.child.is_none());
        }
        other => panic!("expected a cell chain, got {other:?}"),
    }
}

#[test]
fn test_opaque_section_locks_the_model() {
    let mut p = StackPusher::with_stack_size(3);
    p.start_opaque();
    p.push_asym("DICTUGET");
    p.push_asym("NULLSWAPIFNOT");
    p.end_opaque(3, 1, false);
    // only the declared external effect is applied
    assert_eq!(p.stack_size(), 1);
}

#[test]
fn test_drop_under_picks_compact_forms() {
    let mut p = StackPusher::with_stack_size(5);
    p.drop_under(1, 1);
    assert_eq!(p.stack_size(), 4);
    p.drop_under(2, 2);
    assert_eq!(p.stack_size(), 2);

    let block = p.finish();
    let insts = block.instructions();
    match &insts[0] {
        Inst::Stack(op) => assert_eq!(op.opcode, StackOpcode::PopS),
        other => panic!("unexpected {other:?}"),
    }
    match &insts[1] {
        Inst::Stack(op) => {
            assert_eq!(op.opcode, StackOpcode::BlkDrop2);
            assert_eq!((op.i, op.j), (2, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_try_assign_pops_into_binding() {
    let mut p = StackPusher::new();
    let var = DeclId(1);
    p.push_int(0);
    p.bind(var, false);
    p.push_int(42);
    assert!(p.try_assign(var));
    assert_eq!(p.stack_size(), 1);
    assert_eq!(p.offset_of(var), Some(0));
}

#[test]
fn test_continuation_wraps_trailing_block() {
    let mut p = StackPusher::with_stack_size(1);
    p.push(-1, "");
    p.start_continuation();
    p.push_int(1);
    p.push(-1, "");
    p.end_continuation();
    p.if_();
    assert_eq!(p.stack_size(), 0);
    let block = p.finish();
    assert!(matches!(block.instructions()[0], Inst::IfElse(_)));
}

#[test]
fn test_binary_string_to_slice() {
    assert_eq!(binary_string_to_slice("0000"), "0");
    assert_eq!(binary_string_to_slice("0101"), "5");
    assert_eq!(binary_string_to_slice("1"), "c_");
    assert_eq!(binary_string_to_slice("101"), "b_");
}

#[test]
fn test_bit_string_round_trip() {
    for bits in ["1", "101", "0101", "111111110000"] {
        let slice = binary_string_to_slice(bits);
        assert_eq!(to_bit_string(&format!("x{slice}")), bits);
    }
}

#[test]
fn test_add_binary_number() {
    let mut s = String::new();
    add_binary_number_to_string(&mut s, &BigUint::from(5u32), 4);
    assert_eq!(s, "0101");
}

#[test]
fn test_tons_encoding() {
    assert_eq!(tons_to_binary_string(&BigUint::from(0u32)), "0000");
    assert_eq!(tons_to_binary_string(&BigUint::from(1u32)), "000100000001");
}
