use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tvmgen_core::consts::c7;
use tvmgen_core::inst::CodeBlock;
use tvmgen_core::stack::DeclId;

use crate::ast::{ContractDef, FunctionDef, PragmaHelper, SpecialFunction, UsageFlags};
use crate::scan::scan_usage;
use crate::types::Ty;

/// Everything the lowering passes need to know about the compilation:
/// pragma flags, usage facts, state-variable slots, the public-function
/// table and the call graph.
pub struct CompilerContext<'a> {
    pub contract: &'a ContractDef,
    pub pragma: PragmaHelper,
    pub usage: UsageFlags,
    state_var_slots: IndexMap<DeclId, i32>,
    public_functions: Vec<(u32, String)>,
    current_function: Option<usize>,
    call_graph: HashMap<usize, HashSet<usize>>,
    /// Inline hook replacing default replay protection, already lowered.
    pub after_signature_check: Option<CodeBlock>,
}

impl<'a> CompilerContext<'a> {
    pub fn new(contract: &'a ContractDef, pragma: PragmaHelper) -> Self {
        let usage = scan_usage(contract);
        let mut state_var_slots = IndexMap::new();
        for (i, var) in contract.state_vars.iter().enumerate() {
            state_var_slots.insert(var.decl.id, c7::FIRST_VAR_SLOT + i as i32);
        }
        Self {
            contract,
            pragma,
            usage,
            state_var_slots,
            public_functions: Vec::new(),
            current_function: None,
            call_graph: HashMap::new(),
            after_signature_check: None,
        }
    }

    pub fn state_var_slot(&self, decl: DeclId) -> i32 {
        *self.state_var_slots.get(&decl).expect("unknown state variable")
    }

    pub fn state_var_slot_by_index(&self, index: usize) -> i32 {
        c7::FIRST_VAR_SLOT + index as i32
    }

    pub fn state_var_types(&self) -> Vec<Ty> {
        self.contract.state_vars.iter().map(|v| v.decl.ty.clone()).collect()
    }

    pub fn state_var_qty(&self) -> usize {
        self.contract.state_vars.len()
    }

    /// Past this point SETGLOB per variable no longer pays off and the
    /// whole c7 tuple is rebuilt at once.
    pub fn too_many_state_vars(&self) -> bool {
        self.state_var_qty() as i32 >= c7::FIRST_VAR_SLOT + 6
    }

    pub fn has_time_in_abi_header(&self) -> bool {
        match self.pragma.abi_version {
            crate::ast::AbiVersion::V1 => true,
            crate::ast::AbiVersion::V2_1 => {
                self.pragma.have_time || self.after_signature_check.is_none()
            }
        }
    }

    pub fn store_timestamp_in_c4(&self) -> bool {
        self.has_time_in_abi_header() && self.after_signature_check.is_none()
    }

    /// Bit offset of the first state variable inside the storage cell.
    pub fn c4_offset(&self) -> usize {
        256 + if self.store_timestamp_in_c4() { 64 } else { 0 }
            + 1
            + if self.usage.has_await_call { 1 } else { 0 }
    }

    pub fn set_current_function(&mut self, index: usize) {
        self.current_function = Some(index);
    }

    pub fn current_function(&self) -> Option<&'a FunctionDef> {
        self.current_function.map(|i| &self.contract.functions[i])
    }

    pub fn current_function_index(&self) -> Option<usize> {
        self.current_function
    }

    pub fn add_public_function(&mut self, function_id: u32, name: impl Into<String>) {
        self.public_functions.push((function_id, name.into()));
    }

    pub fn public_functions(&mut self) -> Vec<(u32, String)> {
        let mut sorted = self.public_functions.clone();
        sorted.sort();
        sorted
    }

    pub fn function_internal_name(&self, f: &FunctionDef) -> String {
        match f.special {
            SpecialFunction::Fallback => "fallback".to_string(),
            SpecialFunction::OnCodeUpgrade => ":onCodeUpgrade".to_string(),
            _ => format!("{}_internal", f.name),
        }
    }

    /// Records the edge and reports whether it closes a cycle; recursive
    /// call chains cannot be macro-inlined.
    pub fn add_call_and_check_cycle(&mut self, from: usize, to: usize) -> bool {
        self.call_graph.entry(from).or_default().insert(to);
        self.call_graph.entry(to).or_default();

        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Red,
            Black,
        }

        fn dfs(
            v: usize,
            graph: &HashMap<usize, HashSet<usize>>,
            color: &mut HashMap<usize, Color>,
        ) -> bool {
            match color.get(&v).copied().unwrap_or(Color::White) {
                Color::Black => return false,
                Color::Red => return true,
                Color::White => {}
            }
            color.insert(v, Color::Red);
            if let Some(next) = graph.get(&v) {
                for to in next {
                    if dfs(*to, graph, color) {
                        return true;
                    }
                }
            }
            color.insert(v, Color::Black);
            false
        }

        let mut has_loop = false;
        let keys: Vec<usize> = self.call_graph.keys().copied().collect();
        let mut color = HashMap::new();
        for k in &keys {
            color.insert(*k, Color::White);
        }
        for k in keys {
            if dfs(k, &self.call_graph, &mut color) {
                has_loop = true;
                break;
            }
        }
        if has_loop {
            if let Some(edges) = self.call_graph.get_mut(&from) {
                edges.remove(&to);
            }
        }
        has_loop
    }

    pub fn fallback_index(&self) -> Option<usize> {
        self.contract.functions.iter().position(|f| f.special == SpecialFunction::Fallback)
    }

    pub fn receive_index(&self) -> Option<usize> {
        self.contract.functions.iter().position(|f| f.special == SpecialFunction::Receive)
    }

    pub fn on_bounce_index(&self) -> Option<usize> {
        self.contract.functions.iter().position(|f| f.special == SpecialFunction::OnBounce)
    }
}
