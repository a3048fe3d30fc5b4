use std::fmt;

use tvmgen_core::consts;

/// Resolved annotation type of an expression or declaration, as delivered
/// by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Bool,
    Uint(u16),
    Int(u16),
    /// VarUInteger N; N = 16 is the coin amount type.
    VarUint(u8),
    Address,
    Cell,
    Slice,
    Builder,
    Bytes,
    Str,
    Array(Box<Ty>),
    Mapping(Box<Ty>, Box<Ty>),
    Optional(Box<Ty>),
    Tuple(Vec<Ty>),
    /// First-class function value, stored as its 32-bit id.
    FunctionValue,
}

impl Ty {
    /// Name used inside ABI signatures for function-id hashing.
    pub fn abi_name(&self) -> String {
        match self {
            Ty::Bool => "bool".to_string(),
            Ty::Uint(bits) => format!("uint{bits}"),
            Ty::Int(bits) => format!("int{bits}"),
            Ty::VarUint(n) => format!("varuint{n}"),
            Ty::Address => "address".to_string(),
            Ty::Cell => "cell".to_string(),
            Ty::Slice => "slice".to_string(),
            Ty::Builder => "builder".to_string(),
            Ty::Bytes => "bytes".to_string(),
            Ty::Str => "string".to_string(),
            Ty::Array(inner) => format!("{}[]", inner.abi_name()),
            Ty::Mapping(k, v) => format!("map({},{})", k.abi_name(), v.abi_name()),
            Ty::Optional(inner) => format!("optional({})", inner.abi_name()),
            Ty::Tuple(items) => {
                let names: Vec<String> = items.iter().map(|t| t.abi_name()).collect();
                format!("({})", names.join(","))
            }
            Ty::FunctionValue => "function".to_string(),
        }
    }

    /// Worst-case serialized width in bits, references excluded.
    pub fn max_bits(&self) -> usize {
        match self {
            Ty::Bool => 1,
            Ty::Uint(bits) | Ty::Int(bits) => *bits as usize,
            Ty::VarUint(_) => consts::GRAMS_MAX_BIT_LENGTH,
            Ty::Address => consts::ADDRESS_MAX_BIT_LENGTH,
            Ty::Cell | Ty::Bytes | Ty::Str => 0,
            Ty::Slice | Ty::Builder => consts::CELL_BIT_LENGTH,
            Ty::Array(_) => 32 + 1,
            Ty::Mapping(_, _) => 1,
            Ty::Optional(inner) => 1 + inner.max_bits(),
            Ty::Tuple(items) => items.iter().map(|t| t.max_bits()).sum(),
            Ty::FunctionValue => 32,
        }
    }

    /// Worst-case serialized reference count.
    pub fn max_refs(&self) -> usize {
        match self {
            Ty::Cell | Ty::Bytes | Ty::Str | Ty::Array(_) | Ty::Mapping(_, _) => 1,
            Ty::Optional(inner) => inner.max_refs(),
            Ty::Tuple(items) => items.iter().map(|t| t.max_refs()).sum(),
            _ => 0,
        }
    }

    /// `(bit width, signed)` for the numeric value types.
    pub fn numeric_info(&self) -> Option<(u16, bool)> {
        match self {
            Ty::Bool => Some((1, true)),
            Ty::Uint(bits) => Some((*bits, false)),
            Ty::Int(bits) => Some((*bits, true)),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_info().is_some()
    }

    /// The chain-data encoder can serialize this type.
    pub fn is_encodable(&self) -> bool {
        match self {
            Ty::Optional(_) | Ty::Tuple(_) => false,
            Ty::Array(inner) => inner.is_encodable(),
            Ty::Mapping(k, v) => k.dict_key_bits().is_some() && v.is_encodable(),
            _ => true,
        }
    }

    /// The chain-data decoder can deserialize this type.
    pub fn is_decodable(&self) -> bool {
        match self {
            Ty::Slice | Ty::Builder => false,
            _ => self.is_encodable(),
        }
    }

    /// Key width when this type indexes a dictionary.
    pub fn dict_key_bits(&self) -> Option<(u16, bool)> {
        match self {
            Ty::Uint(bits) => Some((*bits, false)),
            Ty::Int(bits) => Some((*bits, true)),
            Ty::Address => Some((267, false)),
            Ty::Bytes | Ty::Str | Ty::Cell => Some((256, false)),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Mapping(k, v) => write!(f, "mapping({k} => {v})"),
            Ty::Array(inner) => write!(f, "{inner}[]"),
            Ty::Optional(inner) => write!(f, "optional({inner})"),
            _ => write!(f, "{}", self.abi_name()),
        }
    }
}
