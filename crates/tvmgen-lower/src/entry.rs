//! Entry-point lowering: dispatchers, persistent-storage marshalling,
//! the public-function selector and the per-function wrappers the linker
//! expects. Every generator builds one well-known [`Function`].

use std::collections::{BTreeMap, BTreeSet};

use tvmgen_core::consts::{c4, c7, exc, DEFAULT_MSG_VALUE, SENDRAWMSG_DEFAULT_FLAG};
use tvmgen_core::function::{Function, FunctionKind};
use tvmgen_core::pusher::{MsgType, StackPusher};

use crate::abi::{
    constructor_function_id, function_id_of, preload_value, BodyId, ChainDataDecoder,
    ChainDataEncoder, EncodePosition, OutboundReason,
};
use crate::ast::{FunctionDef, Mutability, SpecialFunction};
use crate::context::CompilerContext;
use crate::error::Result;
use crate::expr::push_default_value;
use crate::func::{push_location, FunctionLowerer};
use crate::types::Ty;

fn set_ctor_flag(p: &mut StackPusher) {
    p.push_c4();
    p.push(0, "CTOS");
    p.push(0, "SBITS");
    p.push(0, "NEQINT 1");
    p.set_glob(c7::CONSTRUCTOR_FLAG);
}

fn set_glob_sender_address_if_need(p: &mut StackPusher, ctx: &CompilerContext) {
    if ctx.usage.has_msg_sender {
        p.push_zero_address();
        p.set_glob(c7::SENDER_ADDRESS);
    }
}

fn push_c4_to_c7_if_need(p: &mut StackPusher, f: &FunctionDef) {
    if f.mutability != Mutability::Pure {
        p.was_c4_to_c7_called();
        p.push(-1, "");
        p.start_continuation();
        p.push_call(0, 0, "c4_to_c7");
        p.if_ref();
    }
}

fn push_c7_to_c4_if_need(p: &mut StackPusher, f: &FunctionDef) {
    if f.mutability == Mutability::NonPayable {
        p.push_macro_call_in_callref(0, 0, "c7_to_c4");
    } else {
        // external replay values may still need to be persisted
        p.push_s(0);
        p.start_continuation();
        p.push_call(0, 0, "c7_to_c4");
        p.if_ref();
    }
}

/// Reads the persistent cell into globals:
/// `pubkey(256) [timestamp(64)] ctorFlag(1) [awaitFlag(1)] state-vars…`.
pub fn generate_c4_to_c7(ctx: &mut CompilerContext) -> Result<Function> {
    let mut p = StackPusher::new();

    p.push_c4();
    p.push(0, "CTOS");
    p.push(1, "LDU 256      ; pubkey c4");
    if ctx.store_timestamp_in_c4() {
        p.push(1, "LDU 64       ; pubkey timestamp c4");
    }
    p.push(1, "LDU 1      ; ctor flag");
    p.drop_under(1, 1);
    if ctx.usage.has_await_call {
        p.push(1, "LDI 1       ; await flag");
        p.drop_under(1, 1);
    }

    let types = ctx.state_var_types();
    if !types.is_empty() {
        ChainDataDecoder::new(&mut p).decode_data(&types, ctx.c4_offset());

        let var_qty = types.len() as i32;
        if ctx.too_many_state_vars() {
            for i in 0..c7::FIRST_VAR_SLOT {
                p.get_glob(i);
            }
            p.block_swap(var_qty, c7::FIRST_VAR_SLOT);
            p.tuple(var_qty + c7::FIRST_VAR_SLOT);
            p.pop_c7();
        } else {
            for i in (0..var_qty).rev() {
                p.set_glob(c7::FIRST_VAR_SLOT + i);
            }
        }
    } else {
        p.push(-1, "ENDS");
    }

    if ctx.store_timestamp_in_c4() {
        p.set_glob(c7::REPLAY_PROT_TIME);
    }
    p.set_glob(c7::TVM_PUBKEY);

    p.ensure_size(0, "c4_to_c7");
    Ok(Function::new(0, 0, "c4_to_c7", FunctionKind::Macro, p.finish()))
}

/// First-transaction variant: storage still holds the deploy dictionary,
/// so state variables start from defaults (or their static init entries)
/// and the public key comes from dictionary key 0.
pub fn generate_c4_to_c7_with_init_storage(ctx: &mut CompilerContext) -> Result<Function> {
    let mut p = StackPusher::new();

    p.push_c4();
    p.push(0, "CTOS");
    p.push(0, "SBITS");
    p.push(0, "GTINT 1");

    p.start_continuation();
    p.push_call(0, 0, "c4_to_c7");
    p.end_continuation_from_ref();

    p.start_continuation();
    p.push_int(0);
    p.push_c4();
    p.push(0, "CTOS");
    p.push(0, "PLDDICT   ; D");

    let too_many = ctx.too_many_state_vars();
    let mut var_qty: i32 = 0;
    if too_many {
        for i in 0..c7::FIRST_VAR_SLOT {
            p.get_glob(i);
            var_qty += 1;
        }
    }
    let mut shift: u64 = 0;
    for (index, var) in ctx.contract.state_vars.iter().enumerate() {
        if var.is_static {
            p.push_int((c4::PERSISTENT_MEMBERS_START_INDEX + shift) as i64);
            shift += 1;
            p.push_s(1 + if too_many { var_qty } else { 0 });
            p.push_int(64);
            p.start_opaque();
            p.push_asym("DICTUGET");
            p.throw(&format!("THROWIFNOT {}", exc::NO_PUBKEY_IN_C4));
            p.end_opaque(3, 1, false);
            preload_value(&mut p, &var.decl.ty);
        } else {
            push_default_value(&mut p, &var.decl.ty);
        }
        var_qty += 1;
        if !too_many {
            p.set_glob(c7::FIRST_VAR_SLOT + index as i32);
        }
    }
    if too_many {
        p.tuple(var_qty);
        p.pop_c7();
    }

    p.push_int(64);
    p.start_opaque();
    p.push_asym("DICTUGET");
    p.throw(&format!("THROWIFNOT {}", exc::NO_PUBKEY_IN_C4));
    p.end_opaque(3, 1, false);
    p.push(0, "PLDU 256");
    p.set_glob(c7::TVM_PUBKEY);
    p.push(1, "PUSHINT 0 ; timestamp");
    p.set_glob(c7::REPLAY_PROT_TIME);
    p.end_continuation();

    p.if_else();
    p.push(-1, "");

    p.ensure_size(0, "c4_to_c7_with_init_storage");
    Ok(Function::new(0, 0, "c4_to_c7_with_init_storage", FunctionKind::Macro, p.finish()))
}

/// Writes the globals back into the persistent cell, pooling the whole c7
/// tuple when the state-variable count exceeds the per-slot economy.
pub fn generate_c7_to_c4(ctx: &mut CompilerContext) -> Result<Function> {
    let mut p = StackPusher::new();
    let types = ctx.state_var_types();
    let qty = types.len() as i32;

    if ctx.too_many_state_vars() {
        let save = p.stack_size();
        p.push_c7();
        p.push(1, "FALSE");
        p.set_index_q(qty + c7::FIRST_VAR_SLOT);
        p.untuple(qty + c7::FIRST_VAR_SLOT + 1);
        p.drop(1);
        p.reverse(qty + c7::FIRST_VAR_SLOT, 0);
        p.drop(c7::FIRST_VAR_SLOT);
        p.ensure_size(save + qty, "c7 unpooling");
    } else {
        for i in (0..qty).rev() {
            p.get_glob(c7::FIRST_VAR_SLOT + i);
        }
    }

    if ctx.store_timestamp_in_c4() {
        p.get_glob(c7::REPLAY_PROT_TIME);
    }
    p.get_glob(c7::TVM_PUBKEY);
    p.push(1, "NEWC");
    p.push(-1, "STU 256");
    if ctx.store_timestamp_in_c4() {
        p.push(-1, "STU 64");
    }
    p.push(0, "STONE"); // constructor flag
    if ctx.usage.has_await_call {
        p.push(0, "STZERO");
    }
    if !types.is_empty() {
        let mut position = EncodePosition::new(ctx.c4_offset());
        ChainDataEncoder::new(&mut p).encode_parameters(&types, &mut position);
    }

    p.push(0, "ENDC");
    p.pop_root();

    p.ensure_size(0, "c7_to_c4");
    Ok(Function::new(0, 0, "c7_to_c4", FunctionKind::Macro, p.finish()))
}

/// Storage write-back for a suspended await call: the state is stored
/// together with a continuation cell resuming the caller.
pub fn generate_c7_to_c4_for_await(ctx: &mut CompilerContext) -> Result<Function> {
    let mut p = StackPusher::new();
    let types = ctx.state_var_types();

    if ctx.store_timestamp_in_c4() {
        p.get_glob(c7::REPLAY_PROT_TIME);
    }
    p.get_glob(c7::TVM_PUBKEY);
    p.push(1, "NEWC");
    p.push(-1, "STU 256");
    if ctx.store_timestamp_in_c4() {
        p.push(-1, "STU 64");
    }
    p.push(0, "STONE"); // constructor flag
    p.push(0, "STONE"); // await flag
    p.exchange(1);
    p.push_hardcode(
        vec![
            "NEWC".to_string(),
            "STSLICE".to_string(),
            "PUSH c0".to_string(),
            "PUSH c3".to_string(),
            "PUSHCONT {".to_string(),
            "\t; -- c0 c3 cc".to_string(),
            "\tSETCONT c3".to_string(),
            "\tSETCONT c0".to_string(),
            "\tBLKSWAP 2, 1".to_string(),
            "\tDEPTH".to_string(),
            "\tADDCONST -7 ; 5 system args + 2 bldrs".to_string(),
            "\tPUSHINT 2".to_string(),
            "\tBLKSWX".to_string(),
            format!("\tGETGLOB {}", c7::MSG_PUBKEY),
            format!("\tGETGLOB {}", c7::SENDER_ADDRESS),
            format!("\tGETGLOB {}", c7::AWAIT_ANSWER_ID),
            "\tBLKSWAP 1, 3".to_string(),
            "\tDEPTH".to_string(),
            "\tADDCONST -8 ; 5 system args + 2 bldrs + cont".to_string(),
            "\tPUSHINT -1".to_string(),
            "\tSETCONTVARARGS".to_string(),
            "\tSWAP".to_string(),
            "\tSTCONT".to_string(),
            "\tENDC ; -- suspended-code-cell".to_string(),
            "\tSTREFR".to_string(),
        ],
        0,
        0,
        false,
    );
    if !types.is_empty() {
        let qty = types.len() as i32;
        for i in (0..qty).rev() {
            p.get_glob(c7::FIRST_VAR_SLOT + i);
        }
        p.block_swap(1, qty);
        let mut position = EncodePosition::new(ctx.c4_offset());
        ChainDataEncoder::new(&mut p).encode_parameters(&types, &mut position);
    }
    p.push_hardcode(
        vec![
            "\tENDC".to_string(),
            "\tPOPROOT".to_string(),
            "\tTHROW 0".to_string(),
            "}".to_string(),
            "CALLCC".to_string(),
        ],
        0,
        0,
        false,
    );
    Ok(Function::new(0, 0, "c7_to_c4_for_await", FunctionKind::Macro, p.finish()))
}

/// Rejects a message whose timestamp does not advance the stored replay
/// marker, then stores the new marker.
pub fn generate_replay_protection(_ctx: &mut CompilerContext) -> Result<Function> {
    let mut p = StackPusher::new();
    p.push(1, ""); // timestamp
    p.get_glob(c7::REPLAY_PROT_TIME);
    p.push_s(1);
    p.push(-1, "LESS");
    p.throw(&format!("THROWIFNOT {}", exc::REPLAY_PROTECTION));
    p.set_glob(c7::REPLAY_PROT_TIME);
    Ok(Function::new(1, 0, "replay_protection_macro", FunctionKind::Macro, p.finish()))
}

/// Resumes a suspended await call when the inbound message matches the
/// recorded partner address.
pub fn generate_check_resume(ctx: &mut CompilerContext) -> Result<Function> {
    let offset = 256 + if ctx.store_timestamp_in_c4() { 64 } else { 0 } + 1;
    let mut p = StackPusher::new();
    p.push_hardcode(
        vec![
            "PUSHROOT".to_string(),
            "CTOS".to_string(),
            format!("PUSHINT {offset}"),
            "LDSLICEX  ; beg_slice end_slice".to_string(),
            "LDI 1".to_string(),
            "SWAP".to_string(),
            "PUSHCONT {".to_string(),
            "\tLDREFRTOS   ; beg_slice end_slice ref_slice".to_string(),
            "\tXCHG S2     ; ref_slice end beg".to_string(),
            "\tNEWC".to_string(),
            "\tSTSLICE".to_string(),
            "\tSTZERO".to_string(),
            "\tSTSLICE".to_string(),
            "\tENDC".to_string(),
            "\tPOPROOT".to_string(),
            "\tLDMSGADDR".to_string(),
            "\tROTREV".to_string(),
            "\tSDEQ".to_string(),
            format!("\tTHROWIFNOT {}", exc::WRONG_AWAIT_ADDRESS),
            "\tLDCONT".to_string(),
            "\tDROP".to_string(),
            "\tNIP".to_string(),
            "\tCALLREF {".to_string(),
            "\t\tCALL $c4_to_c7$".to_string(),
            "\t}".to_string(),
            "\tCALLX".to_string(),
            "}".to_string(),
            "PUSHCONT {".to_string(),
            "\tDROP2".to_string(),
            "}".to_string(),
            "IFELSE".to_string(),
        ],
        0,
        0,
        false,
    );
    Ok(Function::new(0, 0, "check_resume", FunctionKind::Macro, p.finish()))
}

fn push_msg_pubkey(p: &mut StackPusher, ctx: &CompilerContext) {
    // signatureSlice msgSlice hashMsgSlice
    if ctx.pragma.have_pubkey {
        p.exchange(1);
        p.push(1, "LDU 1 ; signatureSlice hashMsgSlice havePubkey msgSlice");
        p.exchange(1);

        p.start_continuation();
        p.push(1, "LDU 256       ; signatureSlice hashMsgSlice pubkey msgSlice");
        p.exchange(3);
        p.exchange(1);
        p.end_continuation();

        p.start_continuation();
        p.exchange(2);
        p.get_glob(c7::TVM_PUBKEY);
        p.end_continuation();

        p.if_else();
    } else {
        p.rot();
        p.get_glob(c7::TVM_PUBKEY);
    }

    if ctx.usage.has_msg_pubkey {
        p.push_s(0);
        p.set_glob(c7::MSG_PUBKEY);
    }
    // msgSlice hashMsgSlice signatureSlice pubkey
}

fn check_signature_and_read_public_key(p: &mut StackPusher, ctx: &CompilerContext) {
    // msgSlice
    p.push(1, "LDU 1 ; haveSign msgSlice");
    p.exchange(1);

    p.start_continuation();
    p.push_int(512);
    p.push(0, "LDSLICEX ; signatureSlice msgSlice");
    p.push_s(0);
    p.push(0, "HASHSU   ; signatureSlice msgSlice hashMsgSlice");
    push_msg_pubkey(p, ctx);
    p.push(-2, "CHKSIGNU      ; msgSlice isSigned");
    p.throw(&format!("THROWIFNOT {} ; msgSlice", exc::BAD_SIGNATURE));
    p.end_continuation();

    if ctx.pragma.have_pubkey {
        // unsigned external message carrying a public key is malformed
        p.start_continuation();
        p.push(1, "LDU 1      ; havePubkey msgSlice");
        p.exchange(1);
        p.throw(&format!("THROWIF {} ; msgSlice", exc::MSG_HAS_NO_SIGN_BUT_HAS_PUBKEY));
        p.end_continuation();
        p.if_else();
    } else {
        p.if_();
    }
}

fn default_replay_protection(p: &mut StackPusher) {
    // msgSlice
    p.push(1, "LDU 64                         ; timestamp msgSlice");
    p.exchange(1);
    p.push_call(1, 0, "replay_protection_macro");
}

fn expire(p: &mut StackPusher) {
    p.push(1, "LDU 32  ; expireAt msgSlice");
    p.exchange(1);
    p.push(1, "NOW     ; msgSlice expireAt now");
    p.push(-1, "GREATER ; msgSlice expireAt>now");
    p.throw(&format!("THROWIFNOT {}", exc::MESSAGE_IS_EXPIRED));
}

fn call_public_function_or_fallback(p: &mut StackPusher, ctx: &mut CompilerContext) {
    p.push_macro_call_in_callref(0, 0, "public_function_selector");

    if ctx.fallback_index().is_some() {
        p.drop(2);
        p.start_continuation();
        p.push_call(0, 0, "fallback_macro");
        p.call_ref(0, 0);
    } else {
        p.throw(&format!("THROW {}", exc::NO_FALLBACK));
    }
}

pub fn generate_main_external(ctx: &mut CompilerContext) -> Result<Function> {
    match ctx.pragma.abi_version {
        crate::ast::AbiVersion::V1 => generate_main_external_v1(ctx),
        crate::ast::AbiVersion::V2_1 => generate_main_external_v2(ctx),
    }
}

fn generate_main_external_v1(ctx: &mut CompilerContext) -> Result<Function> {
    // contract_balance msg_balance msg_cell origin_msg_body_slice
    let mut p = StackPusher::new();
    set_ctor_flag(&mut p);
    set_glob_sender_address_if_need(&mut p, ctx);

    p.push_s(1);
    p.push(1, "LDREFRTOS  ; msgBodySlice signSlice");
    p.push_s(0);
    p.push(0, "SDEMPTY    ; msgBodySlice signSlice isSignSliceEmpty");
    p.start_continuation();
    p.drop(1);
    p.end_continuation();
    p.start_continuation();
    p.push_s(0);
    p.push_int(512);
    p.push(-1, "SDSKIPFIRST  ; msgBodySlice signSlice signSlice'");
    p.push(0, "PLDU 256     ; msgBodySlice signSlice pubKey");
    p.push_s(2);
    p.push(0, "HASHSU       ; msgBodySlice signSlice pubKey msgHash");
    p.push_s2(2, 1);
    p.push(-2, "CHKSIGNU     ; msgBodySlice signSlice pubKey isSigned");
    p.throw(&format!("THROWIFNOT {} ; msgBodySlice signSlice pubKey", exc::BAD_SIGNATURE));
    p.set_glob(c7::MSG_PUBKEY);
    p.drop(1);
    p.end_continuation();
    p.if_else();

    p.push_macro_call_in_callref(0, 0, "c4_to_c7_with_init_storage");

    p.push(1, "LDU 32                         ; functionId msgSlice");
    p.push(1, "LDU 64                         ; functionId timestamp msgSlice");
    p.exchange(1);
    p.push_call(1, 0, "replay_protection_macro");
    p.exchange(1);

    call_public_function_or_fallback(&mut p, ctx);

    Ok(Function::new(0, 0, "main_external", FunctionKind::MainExternal, p.finish()))
}

fn generate_main_external_v2(ctx: &mut CompilerContext) -> Result<Function> {
    // contract_balance msg_balance msg_cell msg_body_slice transaction_id
    let mut p = StackPusher::new();
    set_ctor_flag(&mut p);
    set_glob_sender_address_if_need(&mut p, ctx);

    p.push_s(1);
    p.push_macro_call_in_callref(0, 0, "c4_to_c7_with_init_storage");

    check_signature_and_read_public_key(&mut p, ctx);
    if let Some(block) = ctx.after_signature_check.clone() {
        // ... msg_cell msg_body_slice -1 rest_msg_body_slice
        p.push_s(3);
        p.push_inline(&block, 2, 1);
    } else {
        default_replay_protection(&mut p);
        if ctx.pragma.have_expire {
            expire(&mut p);
        }
    }

    p.push(1, "LDU 32 ; funcId body");
    p.exchange(1);

    call_public_function_or_fallback(&mut p, ctx);
    Ok(Function::new(0, 0, "main_external", FunctionKind::MainExternal, p.finish()))
}

pub fn generate_main_internal(ctx: &mut CompilerContext) -> Result<Function> {
    // int_msg_info$0 ihr_disabled:Bool bounce:Bool bounced:Bool
    //                src:MsgAddress dest:MsgAddressInt
    //                value:CurrencyCollection ihr_fee:Grams fwd_fee:Grams
    //                created_lt:uint64 created_at:uint32
    let mut p = StackPusher::new();
    set_ctor_flag(&mut p);

    p.push_s(2);
    p.push(0, "CTOS");

    let usage = ctx.usage;
    if usage.has_msg_sender || usage.has_responsible_function || usage.has_await_call {
        p.push(1, "LDU 4       ; bounced tail");
        p.push(1, "LDMSGADDR   ; bounced src tail");
        p.drop(1);
        if usage.has_await_call {
            p.push_macro_call_in_callref(0, 0, "check_resume");
        }
        p.set_glob(c7::SENDER_ADDRESS);
        p.push(0, "MODPOW2 1");
    } else {
        p.push(0, "PLDU 4");
        p.push(0, "MODPOW2 1");
    }
    // stack: isBounced

    if usage.has_responsible_function {
        p.get_glob(c7::RETURN_PARAMS);
        p.push(1, "TRUE");
        p.set_index_q(c7::ret_param::BOUNCE);
        p.push_int(DEFAULT_MSG_VALUE);
        p.set_index_q(c7::ret_param::VALUE);
        p.push_null();
        p.set_index_q(c7::ret_param::CURRENCIES);
        p.push_int(SENDRAWMSG_DEFAULT_FLAG);
        p.set_index_q(c7::ret_param::FLAG);
        p.set_glob(c7::RETURN_PARAMS);
    }

    if ctx.on_bounce_index().is_some() {
        p.start_continuation();
        p.push_s(1);
        p.push(1, "LDSLICE 32");
        p.drop_under(1, 1);
        p.push_call(0, 0, "on_bounce_macro");
        p.if_jmp_ref();
    } else {
        p.ifret();
    }

    push_receive_or_fallback(&mut p, ctx);

    p.exchange(1);
    call_public_function_or_fallback(&mut p, ctx);

    Ok(Function::new(0, 0, "main_internal", FunctionKind::MainInternal, p.finish()))
}

fn push_fallback_or_reject(p: &mut StackPusher, ctx: &CompilerContext) {
    if ctx.fallback_index().is_some() {
        p.start_continuation();
        p.drop(1);
        p.push_macro_call_in_callref(0, 0, "fallback_macro");
        p.throw("THROW 0");
        p.end_continuation();
        p.if_not();
    } else {
        p.throw(&format!("THROWIFNOT {} ; funcId body'", exc::NO_FALLBACK));
    }
}

fn push_receive_or_fallback(p: &mut StackPusher, ctx: &CompilerContext) {
    // stack: body
    if ctx.receive_index().is_some() {
        p.push_s(1);
        p.push(0, "SEMPTY     ; isEmpty");
        p.push_s(0);
        p.start_continuation();
        {
            p.drop(1);
            p.push_s(1);

            p.start_opaque();
            p.push_asym("LDUQ 32  ; [funcId] body' ok");
            push_fallback_or_reject(p, ctx);
            p.end_opaque(1, 2, false);

            p.push_s(1);
            p.push(0, "EQINT 0 ; funcId body' isZero");
            p.push_s(0);
            p.start_continuation();
            p.drop_under(2, 1);
            p.end_continuation();
            p.if_();
        }
        p.end_continuation();
        p.if_not();
        p.start_continuation();
        p.push_call(0, 0, "receive_macro");
        p.if_jmp_ref();
    } else {
        p.push_s(1);
        p.push(0, "SEMPTY     ; isEmpty");
        p.check_if_ctor_called(true);
        p.push_s(1);

        p.start_opaque();
        p.push_asym("LDUQ 32  ; [funcId] body' ok");
        push_fallback_or_reject(p, ctx);
        p.end_opaque(1, 2, false);

        p.push_s(1);
        p.check_if_ctor_called(false);
    }
}

/// Public entry wrapper: storage load, optional responsible-callback
/// capture, parameter decode, the macro call and the answer emission.
pub fn generate_public_function<'c>(
    ctx: &mut CompilerContext<'c>,
    function: &'c FunctionDef,
) -> Result<Function> {
    let mut p = StackPusher::new();

    p.push(1, ""); // slice with arguments
    p.push(1, ""); // function id
    p.drop(1);
    p.check_ctor_called();
    push_c4_to_c7_if_need(&mut p, function);

    push_location(&mut p, &function.loc, false);
    let is_responsible = function.is_responsible;
    if is_responsible {
        let save = p.stack_size();
        p.push(1, "LDU 32"); // callbackId slice
        p.get_glob(c7::RETURN_PARAMS);
        p.block_swap(1, 2);
        p.set_index_q(c7::ret_param::CALLBACK_FUNCTION_ID);
        p.set_glob(c7::RETURN_PARAMS);
        p.ensure_size(save, "responsible callback id");
    }

    let param_types: Vec<Ty> = function.params.iter().map(|v| v.ty.clone()).collect();
    ChainDataDecoder::new(&mut p).decode_public_function_parameters(&param_types, is_responsible);
    let param_qty = function.params.len() as i32;
    p.push(-param_qty, "");
    for param in &function.params {
        p.bind(param.id, true);
    }
    push_location(&mut p, &function.loc, true);

    let ret_qty = function.returns.len() as i32;
    let internal_name = ctx.function_internal_name(function);
    p.push_macro_call_in_callref(param_qty, ret_qty, &format!("{internal_name}_macro"));

    p.ensure_size(ret_qty, "public function result");
    emit_on_public_function_return(&mut p, function);

    p.ensure_size(0, "public function epilogue");
    push_c7_to_c4_if_need(&mut p, function);
    p.throw("THROW 0");

    Ok(Function::new(2, 0, function.name.clone(), FunctionKind::Macro, p.finish()))
}

/// Answers the caller: external-out message for an external call,
/// responsible internal answer (ReturnParams-driven) for an internal one.
fn emit_on_public_function_return(p: &mut StackPusher, function: &FunctionDef) {
    if function.returns.is_empty() {
        return;
    }
    let ret_qty = function.returns.len() as i32;
    let ret_types: Vec<Ty> = function.returns.iter().map(|v| v.ty.clone()).collect();
    let answer_id = function_id_of(
        &function.name,
        &function.params,
        &function.returns,
        OutboundReason::FunctionReturnExternal,
    );

    p.start_opaque();

    p.push_s(p.stack_size()); // transaction id under the results
    p.push(-1, "");

    // externally-called branch
    p.start_continuation();
    {
        p.push_s(p.stack_size() + 2);
        p.push(0, "CTOS");
        p.push(1, "LDU 2");
        p.push(1, "LDMSGADDR");
        p.drop(1);
        p.pop_s(1);

        let mut append_body = |p: &mut StackPusher, builder_bits: usize| {
            ChainDataEncoder::new(p).create_msg_body_and_append(
                &ret_types,
                BodyId::Const(answer_id),
                builder_bits,
            );
        };
        let mut on_stack = BTreeSet::new();
        on_stack.insert(tvmgen_core::consts::ext_msg::DEST);
        p.send_msg(&on_stack, &BTreeMap::new(), Some(&mut append_body), None, None, MsgType::ExternalOut);
        p.push(ret_qty, "");
    }
    p.end_continuation();

    p.start_continuation();
    if !function.is_responsible {
        p.drop(ret_qty);
    } else {
        p.get_glob(c7::RETURN_PARAMS);
        p.push_s(0);
        p.index_noexcep(c7::ret_param::CURRENCIES);
        p.push_s(1);
        p.index_noexcep(c7::ret_param::VALUE);
        p.get_glob(c7::SENDER_ADDRESS);
        p.push_s(3);
        p.index_noexcep(c7::ret_param::BOUNCE);
        p.drop_under(1, 4);
        // stack: currencies tons dest bounce

        let mut append_body = |p: &mut StackPusher, builder_bits: usize| {
            let mut push_callback_id = |p: &mut StackPusher| {
                p.get_glob(c7::RETURN_PARAMS);
                p.index_noexcep(c7::ret_param::CALLBACK_FUNCTION_ID);
            };
            ChainDataEncoder::new(p).create_msg_body_and_append(
                &ret_types,
                BodyId::FromStack(&mut push_callback_id),
                builder_bits,
            );
        };
        let mut push_flag = |p: &mut StackPusher| {
            p.get_glob(c7::RETURN_PARAMS);
            p.index_noexcep(c7::ret_param::FLAG);
        };
        let mut on_stack = BTreeSet::new();
        on_stack.insert(tvmgen_core::consts::int_msg::BOUNCE);
        on_stack.insert(tvmgen_core::consts::int_msg::DEST);
        on_stack.insert(tvmgen_core::consts::int_msg::GRAMS);
        on_stack.insert(tvmgen_core::consts::int_msg::CURRENCY);
        p.send_msg(
            &on_stack,
            &BTreeMap::new(),
            Some(&mut append_body),
            None,
            Some(&mut push_flag),
            MsgType::Internal,
        );
    }
    p.end_continuation();

    p.if_else();
    p.end_opaque(ret_qty, 0, false);
}

/// Getter macro for a public state variable.
pub fn generate_getter(ctx: &mut CompilerContext, var_index: usize) -> Result<Function> {
    let var = &ctx.contract.state_vars[var_index];
    let answer_id = function_id_of(
        &var.decl.name,
        &[],
        std::slice::from_ref(&var.decl),
        OutboundReason::FunctionReturnExternal,
    );
    let value_ty = var.decl.ty.clone();

    let mut p = StackPusher::new();
    p.push(2, ""); // function id, message body
    p.drop(1);
    p.push(-1, "ENDS");
    p.push_macro_call_in_callref(0, 0, "c4_to_c7");
    p.get_glob(ctx.state_var_slot_by_index(var_index));

    p.push_s(1);
    p.start_continuation();
    p.push(-1, "");
    let mut append_body = |p: &mut StackPusher, builder_bits: usize| {
        ChainDataEncoder::new(p).create_msg_body_and_append(
            std::slice::from_ref(&value_ty),
            BodyId::Const(answer_id),
            builder_bits,
        );
    };
    p.send_msg(&BTreeSet::new(), &BTreeMap::new(), Some(&mut append_body), None, None, MsgType::ExternalOut);
    p.end_continuation();
    p.if_();

    p.throw("THROW 0");
    Ok(Function::new(2, 1, var.decl.name.clone(), FunctionKind::MacroGetter, p.finish()))
}

pub fn generate_private_function(name: &str) -> Result<Function> {
    let mut p = StackPusher::new();
    p.push_call(0, 0, &format!("{name}_macro"));
    Ok(Function::new(0, 0, name.to_string(), FunctionKind::PrivateFunction, p.finish()))
}

pub fn generate_macro<'c>(
    ctx: &mut CompilerContext<'c>,
    function: &'c FunctionDef,
    force_name: Option<String>,
) -> Result<Function> {
    let name = force_name.unwrap_or_else(|| function.name.clone());
    let mut p = StackPusher::new();
    push_location(&mut p, &function.loc, false);
    FunctionLowerer::lower_function_with_modifiers(&mut p, ctx, function, true)?;
    push_location(&mut p, &function.loc, true);
    let take = function.params.len() as i32;
    let ret = function.returns.len() as i32;
    Ok(Function::new(take, ret, name, FunctionKind::Macro, p.finish()))
}

pub fn generate_receive_or_fallback_or_on_bounce<'c>(
    ctx: &mut CompilerContext<'c>,
    function: &'c FunctionDef,
    name: &str,
    take: i32,
) -> Result<Function> {
    let mut p = StackPusher::new();
    p.check_ctor_called();
    push_c4_to_c7_if_need(&mut p, function);
    FunctionLowerer::lower_function_with_modifiers(&mut p, ctx, function, true)?;
    push_c7_to_c4_if_need(&mut p, function);
    Ok(Function::new(take, 0, name.to_string(), FunctionKind::Macro, p.finish()))
}

pub fn generate_on_tick_tock<'c>(
    ctx: &mut CompilerContext<'c>,
    function: &'c FunctionDef,
) -> Result<Function> {
    let mut p = StackPusher::new();

    // hide the -2 entry selector from the optimizer, msg.isTickTock may
    // still read it
    p.start_opaque();
    p.push_int(-2);
    p.end_opaque(0, 0, false);

    assert!(function.params.len() == 1);
    p.push_s(2);
    p.bind(function.params[0].id, false);

    let is_pure = function.mutability == Mutability::Pure;
    if !is_pure {
        p.push_macro_call_in_callref(0, 0, "c4_to_c7");
    }

    set_glob_sender_address_if_need(&mut p, ctx);
    FunctionLowerer::lower_function_with_modifiers(&mut p, ctx, function, false)?;

    if !is_pure {
        p.push_macro_call_in_callref(0, 0, "c7_to_c4");
    }
    Ok(Function::new(0, 0, "onTickTock", FunctionKind::OnTickTock, p.finish()))
}

pub fn generate_on_code_upgrade<'c>(
    ctx: &mut CompilerContext<'c>,
    function: &'c FunctionDef,
) -> Result<Function> {
    let mut p = StackPusher::new();
    FunctionLowerer::lower_function_with_modifiers(&mut p, ctx, function, true)?;

    p.push_macro_call_in_callref(0, 0, "c7_to_c4");
    p.push(0, "COMMIT");
    p.throw("THROW 0");
    let take = function.params.len() as i32;
    Ok(Function::new(take, 0, "onCodeUpgrade", FunctionKind::OnCodeUpgrade, p.finish()))
}

/// The all-constructors wrapper: storage init, double-call protection,
/// parameter decode, the constructor body and the first storage write.
pub fn generate_constructor<'c>(ctx: &mut CompilerContext<'c>) -> Result<Function> {
    let contract = ctx.contract;
    let constructor = contract.constructor();

    let function_id = match constructor {
        Some(c) => function_id_of("constructor", &c.params, &[], OutboundReason::RemoteCallInternal),
        None => constructor_function_id(),
    };
    ctx.add_public_function(function_id, "constructor");

    let mut p = StackPusher::new();
    p.push(1, ""); // encoded constructor parameters
    p.push(1, ""); // function id
    p.drop(1);

    // first-run storage init plus the double-call guard
    p.was_c4_to_c7_called();
    p.push(-1, "");
    p.start_continuation();
    p.push_call(0, 0, "c4_to_c7_with_init_storage");
    p.if_ref();
    p.get_glob(c7::CONSTRUCTOR_FLAG);
    p.throw(&format!("THROWIF {}", exc::CONSTRUCTOR_CALLED_TWICE));

    if let Some(c) = constructor {
        let take = c.params.len() as i32;
        let types: Vec<Ty> = c.params.iter().map(|v| v.ty.clone()).collect();
        ChainDataDecoder::new(&mut p).decode_public_function_parameters(&types, false);
        p.push(-take, "");
        for param in &c.params {
            p.bind(param.id, true);
        }
        p.ensure_size(take, "constructor parameters");

        let index = contract
            .functions
            .iter()
            .position(|f| f.special == SpecialFunction::Constructor)
            .expect("constructor exists");
        ctx.set_current_function(index);

        let mut fork = p.fork();
        fork.take_last(take);
        FunctionLowerer::lower_function_with_modifiers(&mut fork, ctx, c, false)?;
        p.push(-take, "");
        p.absorb(fork);
    } else {
        p.push(-1, "ENDS");
        p.push(0, "ACCEPT");
    }

    p.push_macro_call_in_callref(0, 0, "c7_to_c4");
    p.throw("THROW 0");

    Ok(Function::new(2, 0, "constructor", FunctionKind::Macro, p.finish()))
}

/// Balanced four-way dispatch tree over the sorted public-function table.
pub fn generate_public_function_selector(ctx: &mut CompilerContext) -> Result<Function> {
    let functions = ctx.public_functions();
    let mut p = StackPusher::new();
    build_public_function_selector(&mut p, &functions, 0, functions.len());
    Ok(Function::new(1, 1, "public_function_selector", FunctionKind::Macro, p.finish()))
}

fn push_selector_leaf(p: &mut StackPusher, function_id: u32, name: &str) {
    p.push_s(0);
    p.push_int(function_id);
    p.push(-1, "EQUAL");
    p.push(-1, "");
    p.start_continuation();
    p.push_call(0, 0, name);
    p.if_jmp_ref();
}

fn build_public_function_selector(
    p: &mut StackPusher,
    functions: &[(u32, String)],
    left: usize,
    right: usize,
) {
    let qty = right - left;
    let mut block_size = 1;
    while 4 * block_size < qty {
        block_size *= 4;
    }
    assert!(4 * block_size >= qty);

    // stack: functionId
    if qty <= 4 {
        for (function_id, name) in &functions[left..right] {
            push_selector_leaf(p, *function_id, name);
        }
    } else {
        let mut i = left;
        while i < right {
            let j = usize::min(i + block_size, right);
            let (function_id, name) = &functions[j - 1];
            if j - i == 1 {
                push_selector_leaf(p, *function_id, name);
            } else {
                p.push_s(0);
                p.push_int(*function_id);
                p.push(-1, "LEQ");
                p.start_continuation();
                build_public_function_selector(p, functions, i, j);
                p.if_jmp_ref();
            }
            i += block_size;
        }
    }
}
