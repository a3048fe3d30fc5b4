use crate::catalog::{asym, gen, make_throw};

#[test]
fn test_gen_effects() {
    let add = gen("ADD");
    assert_eq!((add.take, add.ret), (2, 1));
    assert!(!add.pure);

    let eq = gen("EQUAL");
    assert!(eq.pure);

    let newc = gen("NEWC");
    assert_eq!((newc.take, newc.ret), (0, 1));

    let tuple = gen("TUPLE 3");
    assert_eq!((tuple.take, tuple.ret), (3, 1));

    let untuple = gen("UNTUPLE 4");
    assert_eq!((untuple.take, untuple.ret), (1, 4));
}

#[test]
fn test_gen_parses_arg_and_comment() {
    let op = gen("LDU 256      ; pubkey c4");
    assert_eq!(op.opcode, "LDU");
    assert_eq!(op.arg, "256");
    assert_eq!(op.comment, "pubkey c4");
    assert_eq!((op.take, op.ret), (1, 2));
    assert_eq!(op.full_opcode(), "LDU 256");
}

#[test]
fn test_lshift_arity_depends_on_arg() {
    assert_eq!(gen("LSHIFT 8").take, 1);
    assert_eq!(gen("LSHIFT").take, 2);
}

#[test]
#[should_panic(expected = "unknown mnemonic")]
fn test_gen_rejects_unknown() {
    gen("FRobnicate");
}

#[test]
fn test_asym_table() {
    let get = asym("DICTUGET");
    assert_eq!((get.take, get.ret_min, get.ret_max), (3, 1, 2));

    let next = asym("DICTUGETNEXT");
    assert_eq!((next.take, next.ret_min, next.ret_max), (3, 1, 3));

    let lduq = asym("LDUQ 32  ; funcId body ok");
    assert_eq!((lduq.take, lduq.ret_min, lduq.ret_max), (1, 2, 3));
    assert_eq!(lduq.opcode, "LDUQ 32  ; funcId body ok");

    let min = asym("DICTIMIN");
    assert_eq!((min.take, min.ret_min, min.ret_max), (2, 1, 3));
}

#[test]
fn test_throw_forms() {
    assert_eq!(make_throw("THROW 60").take, 0);
    assert_eq!(make_throw("THROWIF 51").take, 1);
    assert_eq!(make_throw("THROWIFNOT 40 ; bad sign").arg, "40");
}
