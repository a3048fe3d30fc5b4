//! Layout constants shared by the emitter, the lowering passes and the
//! optimizer. Values are referenced from exactly one place each, so the
//! whole persistent layout can be retuned here.

/// Data bits a single cell can carry.
pub const CELL_BIT_LENGTH: usize = 1023;

/// Longest slice literal PUSHSLICE can encode inline.
pub const MAX_PUSH_SLICE_BIT_LENGTH: usize = 248;

/// Longest constant STSLICECONST can append in one instruction.
pub const MAX_STSLICECONST_BITS: usize = 8 * 7 + 1;

/// Upper bound of a serialized internal address (`MsgAddressInt`).
pub const ADDRESS_MAX_BIT_LENGTH: usize = 591;

/// Upper bound of a serialized external source address.
pub const EXT_SRC_ADDRESS_BIT_LENGTH: usize = 522;

/// Upper bound of a `Grams` amount: 4-bit length prefix plus 15 bytes.
pub const GRAMS_MAX_BIT_LENGTH: usize = 4 + 120;

/// References a cell may hold; one is kept spare for overflow chaining.
pub const MAX_CELL_REFS: usize = 4;

pub const SENDRAWMSG_DEFAULT_FLAG: u32 = 0;

/// Nanoton amount attached to a responsible-call answer by default.
pub const DEFAULT_MSG_VALUE: u64 = 10_000_000;

/// Iterations of the stack-squeezing optimizer per function.
pub const ITER_STACK_OPT_QTY: usize = 3;

/// Ephemeral register (c7) slot layout.
pub mod c7 {
    pub const TVM_PUBKEY: i32 = 2;
    pub const REPLAY_PROT_TIME: i32 = 3;
    pub const RETURN_PARAMS: i32 = 4;
    pub const SENDER_ADDRESS: i32 = 5;
    pub const MSG_PUBKEY: i32 = 6;
    pub const AWAIT_ANSWER_ID: i32 = 7;
    pub const CONSTRUCTOR_FLAG: i32 = 8;
    /// State variables occupy slots starting here.
    pub const FIRST_VAR_SLOT: i32 = 9;

    /// Element indices of the ReturnParams tuple.
    pub mod ret_param {
        pub const BOUNCE: i32 = 0;
        pub const VALUE: i32 = 1;
        pub const CURRENCIES: i32 = 2;
        pub const FLAG: i32 = 3;
        pub const CALLBACK_FUNCTION_ID: i32 = 4;
    }
}

/// Persistent cell (c4) auxiliary key space used before the first
/// constructor call, when storage still holds the deploy dictionary.
pub mod c4 {
    /// Key 0 holds the deploy public key.
    pub const PERSISTENT_MEMBERS_START_INDEX: u64 = 1;
}

/// Cooperative control-flow flag values consumed by IFRET checks.
pub mod flag {
    pub const RETURN: i32 = 3;
    pub const BREAK: i32 = 2;
    pub const CONTINUE: i32 = 1;
}

/// Runtime exception codes thrown by generated entry code.
pub mod exc {
    pub const BAD_SIGNATURE: u32 = 40;
    pub const CONSTRUCTOR_CALLED_TWICE: u32 = 51;
    pub const REPLAY_PROTECTION: u32 = 52;
    pub const MESSAGE_IS_EXPIRED: u32 = 57;
    pub const MSG_HAS_NO_SIGN_BUT_HAS_PUBKEY: u32 = 58;
    pub const CALLED_BEFORE_CONSTRUCTOR: u32 = 59;
    pub const NO_FALLBACK: u32 = 60;
    pub const NO_PUBKEY_IN_C4: u32 = 61;
    pub const WRONG_AWAIT_ADDRESS: u32 = 62;
    pub const GET_OPTIONAL: u32 = 63;
    pub const BY_EXT_MSG_ONLY: u32 = 71;
    pub const BY_INT_MSG_ONLY: u32 = 72;
    pub const REQUIRE_FAILED: u32 = 100;
}

/// Internal message header: field order and default (all-zero) widths.
pub mod int_msg {
    pub const FIELD_WIDTHS: [usize; 11] = [1, 1, 1, 2, 2, 4, 1, 4, 4, 64, 32];
    pub const IHR_DISABLED: usize = 0;
    pub const BOUNCE: usize = 1;
    pub const BOUNCED: usize = 2;
    pub const SRC: usize = 3;
    pub const DEST: usize = 4;
    pub const GRAMS: usize = 5;
    pub const CURRENCY: usize = 6;
}

/// External message header field indices.
pub mod ext_msg {
    pub const SRC: usize = 0;
    pub const DEST: usize = 1;
}
