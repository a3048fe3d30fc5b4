use serde::{Deserialize, Serialize};

use crate::inst::CodeBlock;

/// How a top-level procedure is linked and dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    PrivateFunction,
    Macro,
    MacroGetter,
    MainInternal,
    MainExternal,
    OnCodeUpgrade,
    OnTickTock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub take: i32,
    pub ret: i32,
    pub name: String,
    pub kind: FunctionKind,
    pub body: CodeBlock,
}

impl Function {
    pub fn new(take: i32, ret: i32, name: impl Into<String>, kind: FunctionKind, body: CodeBlock) -> Self {
        Self { take, ret, name: name.into(), kind, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub pragmas: Vec<String>,
    pub functions: Vec<Function>,
}

impl Contract {
    pub fn new(pragmas: Vec<String>, functions: Vec<Function>) -> Self {
        Self { pragmas, functions }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
