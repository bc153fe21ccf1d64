//! Built-in functions
//!
//! Intrinsics are functions the compiler implements directly: memory
//! peek/poke, word splitting, array length, CPU instructions and
//! optimization control. They are seeded into every module scope and lower
//! to dedicated IL instructions rather than calls.

use crate::types::TypeInfo;
use std::sync::OnceLock;

/// Identifies which IL instruction an intrinsic lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    Peek,
    Poke,
    PeekW,
    PokeW,
    Length,
    Lo,
    Hi,
    Sei,
    Cli,
    Nop,
    Brk,
    Pha,
    Pla,
    Php,
    Plp,
    Barrier,
    VolatileRead,
    VolatileWrite,
}

/// Signature and behavior of one intrinsic.
#[derive(Debug, Clone)]
pub struct IntrinsicDef {
    pub kind: IntrinsicKind,
    pub name: &'static str,
    /// Parameter types. `length` is special-cased by the type checker
    /// (its single parameter is "any array") and has an empty list here.
    pub params: Vec<TypeInfo>,
    pub return_type: TypeInfo,
    /// Impure intrinsics touch memory-mapped hardware or CPU state and
    /// disqualify their callers from purity.
    pub is_impure: bool,
}

impl IntrinsicDef {
    fn new(
        kind: IntrinsicKind,
        name: &'static str,
        params: Vec<TypeInfo>,
        return_type: TypeInfo,
        is_impure: bool,
    ) -> Self {
        IntrinsicDef {
            kind,
            name,
            params,
            return_type,
            is_impure,
        }
    }

    /// Function type used when the intrinsic appears as a symbol.
    pub fn function_type(&self) -> TypeInfo {
        TypeInfo::Function {
            params: self.params.clone(),
            param_names: (0..self.params.len()).map(|i| format!("arg{i}")).collect(),
            return_type: Box::new(self.return_type.clone()),
        }
    }

    /// `length` takes any array; its arity/typing is handled specially.
    pub fn takes_any_array(&self) -> bool {
        self.kind == IntrinsicKind::Length
    }
}

static REGISTRY: OnceLock<Vec<IntrinsicDef>> = OnceLock::new();

/// All intrinsic definitions, in a stable order.
pub fn all() -> &'static [IntrinsicDef] {
    REGISTRY.get_or_init(build_registry)
}

/// Look up an intrinsic by source name.
pub fn lookup(name: &str) -> Option<&'static IntrinsicDef> {
    all().iter().find(|def| def.name == name)
}

pub fn is_intrinsic(name: &str) -> bool {
    lookup(name).is_some()
}

fn build_registry() -> Vec<IntrinsicDef> {
    use IntrinsicKind::*;
    use TypeInfo::{Byte, Void, Word};

    vec![
        IntrinsicDef::new(Peek, "peek", vec![Word], Byte, true),
        IntrinsicDef::new(Poke, "poke", vec![Word, Byte], Void, true),
        IntrinsicDef::new(PeekW, "peekw", vec![Word], Word, true),
        IntrinsicDef::new(PokeW, "pokew", vec![Word, Word], Void, true),
        IntrinsicDef::new(Length, "length", vec![], Word, false),
        IntrinsicDef::new(Lo, "lo", vec![Word], Byte, false),
        IntrinsicDef::new(Hi, "hi", vec![Word], Byte, false),
        IntrinsicDef::new(Sei, "sei", vec![], Void, true),
        IntrinsicDef::new(Cli, "cli", vec![], Void, true),
        IntrinsicDef::new(Nop, "nop", vec![], Void, true),
        IntrinsicDef::new(Brk, "brk", vec![], Void, true),
        IntrinsicDef::new(Pha, "pha", vec![], Void, true),
        IntrinsicDef::new(Pla, "pla", vec![], Void, true),
        IntrinsicDef::new(Php, "php", vec![], Void, true),
        IntrinsicDef::new(Plp, "plp", vec![], Void, true),
        IntrinsicDef::new(Barrier, "barrier", vec![], Void, true),
        IntrinsicDef::new(VolatileRead, "volatile_read", vec![Word], Byte, true),
        IntrinsicDef::new(VolatileWrite, "volatile_write", vec![Word, Byte], Void, true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let peek = lookup("peek").unwrap();
        assert_eq!(peek.kind, IntrinsicKind::Peek);
        assert_eq!(peek.params, vec![TypeInfo::Word]);
        assert_eq!(peek.return_type, TypeInfo::Byte);
        assert!(lookup("no_such_intrinsic").is_none());
    }

    #[test]
    fn test_cpu_intrinsics_are_nullary_void() {
        for name in ["sei", "cli", "nop", "brk", "pha", "pla", "php", "plp"] {
            let def = lookup(name).unwrap_or_else(|| panic!("missing {name}"));
            assert!(def.params.is_empty());
            assert_eq!(def.return_type, TypeInfo::Void);
            assert!(def.is_impure);
        }
    }

    #[test]
    fn test_length_special_cased() {
        let length = lookup("length").unwrap();
        assert!(length.takes_any_array());
        assert_eq!(length.return_type, TypeInfo::Word);
        assert!(!length.is_impure);
    }

    #[test]
    fn test_lo_hi_split_words() {
        for name in ["lo", "hi"] {
            let def = lookup(name).unwrap();
            assert_eq!(def.params, vec![TypeInfo::Word]);
            assert_eq!(def.return_type, TypeInfo::Byte);
            assert!(!def.is_impure);
        }
    }

    #[test]
    fn test_function_type_shape() {
        let poke = lookup("poke").unwrap();
        let TypeInfo::Function {
            params,
            return_type,
            ..
        } = poke.function_type()
        else {
            panic!("Expected function type");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(*return_type, TypeInfo::Void);
    }
}
