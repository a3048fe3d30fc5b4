//! Textual-mnemonic parsing. The stack effect lives on the IR node; this
//! table only exists so the emitter can accept `"LDU 256 ; pubkey"` style
//! command strings and stamp the node with the declared effect.

use crate::inst::{AsymOp, GenOp};

fn split(cmd: &str) -> (String, String, String) {
    let (text, comment) = match cmd.split_once(';') {
        Some((t, c)) => (t.trim(), c.trim().to_string()),
        None => (cmd.trim(), String::new()),
    };
    let mut it = text.splitn(2, char::is_whitespace);
    let opcode = it.next().unwrap_or_default().trim().to_string();
    let arg = it.next().unwrap_or_default().trim().to_string();
    (opcode, arg, comment)
}

fn arg_as_int(opcode: &str, arg: &str) -> i32 {
    arg.split(',')
        .next()
        .and_then(|a| a.trim().parse::<i32>().ok())
        .unwrap_or_else(|| panic!("mnemonic {opcode} expects a numeric argument, got {arg:?}"))
}

/// Parses a command string into a [`GenOp`] with its declared effect.
/// Unknown mnemonics are a back-end bug and abort compilation.
pub fn gen(cmd: &str) -> GenOp {
    let (opcode, arg, comment) = split(cmd);
    let has_arg = !arg.is_empty();

    let (take, ret, pure) = match opcode.as_str() {
        // producers
        "PUSHINT" | "PUSHSLICE" | "NULL" | "TRUE" | "FALSE" | "NEWC" | "NEWDICT" => (0, 1, true),
        "NOW" | "DEPTH" | "GETPARAM" => (0, 1, false),

        "ACCEPT" | "COMMIT" => (0, 0, false),

        // unary, throw-free
        "ISNULL" | "NOT" | "SEMPTY" | "SDEMPTY" | "SBITS" | "SREFS" | "EQINT" | "NEQINT"
        | "GTINT" | "LESSINT" | "MODPOW2" | "HASHCU" | "HASHSU" | "CTOS" | "ENDC" => (1, 1, true),

        // unary, may throw or depends on machine state
        "INC" | "DEC" | "NEGATE" | "UFITS" | "FITS" | "ADDCONST" | "MULCONST" | "PICK"
        | "STRDUMP" | "PLDREF" | "PLDDICT" | "PLDU" | "PLDI" | "INDEX_EXCEP" => (1, 1, false),
        "INDEX_NOEXCEP" => (1, 1, true),
        "STSLICECONST" | "STZERO" | "STONE" => (1, 1, false),
        "ENDS" => (1, 0, false),
        "LSHIFT" | "RSHIFT" => {
            if has_arg {
                (1, 1, false)
            } else {
                (2, 1, false)
            }
        }

        // binary, throw-free
        "MIN" | "MAX" | "AND" | "OR" | "XOR" | "EQUAL" | "NEQ" | "LESS" | "GREATER" | "LEQ"
        | "GEQ" | "SDEQ" | "PAIR" => (2, 1, true),

        // binary, may throw
        "ADD" | "SUB" | "MUL" | "DIV" | "MOD" | "SDSKIPFIRST" | "STGRAMS" | "STVARUINT32"
        | "STU" | "STI" | "STUR" | "STIR" | "STSLICE" | "STSLICER" | "STREF" | "STREFR"
        | "STB" | "STBR" | "STBREF" | "STBREFR" | "STDICT" | "STZEROES" | "STONES"
        | "SETINDEX" | "SETINDEXQ" => (2, 1, false),

        "CHKSIGNU" => (3, 1, true),
        "SETINDEXVAR" | "SETINDEXVARQ" => (3, 1, false),
        "CDATASIZE" => (2, 3, false),

        "LDU" | "LDI" | "LDREF" | "LDMSGADDR" | "LDDICT" | "LDSLICE" | "LDREFRTOS"
        | "LDVARUINT32" => (1, 2, false),
        "LDSLICEX" => (2, 2, false),

        "UNPAIR" => (1, 2, true),
        "TUPLE" => (arg_as_int(&opcode, &arg), 1, true),
        "UNTUPLE" => (1, arg_as_int(&opcode, &arg), true),

        "SENDRAWMSG" => (2, 0, false),

        _ => panic!("unknown mnemonic in catalog: {cmd}"),
    };

    GenOp { opcode, arg, comment, take, ret, pure }
}

/// Parses one of the runtime-arity quasi-instructions, declaring its
/// `(take, ret_min, ret_max)`.
pub fn asym(cmd: &str) -> AsymOp {
    let (opcode, _, _) = split(cmd);

    let is_dict_rem = {
        let mut found = false;
        for key in ["", "I", "U"] {
            for op in ["MIN", "MAX"] {
                for suf in ["", "REF"] {
                    if opcode == format!("DICT{key}REM{op}{suf}") {
                        found = true;
                    }
                }
            }
        }
        found
    };

    let is_dict_some_get = {
        let mut found = false;
        for key in ["", "I", "U"] {
            for op in ["SETGET", "ADDGET", "REPLACEGET"] {
                for suf in ["", "REF", "B"] {
                    if opcode == format!("DICT{key}{op}{suf}") {
                        found = true;
                    }
                }
            }
        }
        found
    };

    let (take, ret_min, ret_max) = match opcode.as_str() {
        "CONFIGPARAM" | "NULLSWAPIF" | "NULLSWAPIFNOT" => (1, 1, 2),

        "LDDICTQ" | "LDIQ" | "LDMSGADDRQ" | "LDUQ" => (1, 2, 3),

        "DICTMIN" | "DICTIMIN" | "DICTUMIN" | "DICTMINREF" | "DICTIMINREF" | "DICTUMINREF"
        | "DICTMAX" | "DICTIMAX" | "DICTUMAX" | "DICTMAXREF" | "DICTIMAXREF" | "DICTUMAXREF" => {
            (2, 1, 3)
        }

        "CDATASIZEQ" | "SDATASIZEQ" => (2, 1, 4),

        "DICTGET" | "DICTIGET" | "DICTUGET" | "DICTGETREF" | "DICTIGETREF" | "DICTUGETREF" => {
            (3, 1, 2)
        }

        "DICTGETNEXT" | "DICTGETNEXTEQ" | "DICTGETPREV" | "DICTGETPREVEQ" | "DICTIGETNEXT"
        | "DICTIGETNEXTEQ" | "DICTIGETPREV" | "DICTIGETPREVEQ" | "DICTUGETNEXT"
        | "DICTUGETNEXTEQ" | "DICTUGETPREV" | "DICTUGETPREVEQ" => (3, 1, 3),

        _ if is_dict_rem => (2, 2, 3),
        _ if is_dict_some_get => (4, 2, 3),

        _ => panic!("unknown asymmetric mnemonic: {cmd}"),
    };

    // the whole command line is kept verbatim, argument and trailing
    // comment included, and printed as-is
    AsymOp { opcode: cmd.trim().to_string(), take, ret_min, ret_max }
}

/// Builds a throw node. THROW has no stack inputs; the conditional forms
/// consume the guard value. The post-state of a plain THROW is unreachable.
pub fn make_throw(cmd: &str) -> GenOp {
    let (opcode, arg, comment) = split(cmd);
    let (take, ret) = match opcode.as_str() {
        "THROW" => (0, 0),
        "THROWIF" | "THROWIFNOT" => (1, 0),
        "THROWANY" => (1, 0),
        _ => panic!("unknown throw mnemonic: {cmd}"),
    };
    GenOp { opcode, arg, comment, take, ret, pure: false }
}
