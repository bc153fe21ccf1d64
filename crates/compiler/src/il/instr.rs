//! IL instructions and virtual registers
//!
//! Instructions are a closed variant set. Every value-producing
//! instruction defines a fresh virtual register; register ids are unique
//! within a function, which is the SSA property the verifier checks.
//! Metadata is additive and never affects semantics.

use crate::source::SourceSpan;

use super::types::IlType;

pub type InstrId = u32;
pub type LabelId = u32;

/// An SSA value: typed, uniquely numbered within its function.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualRegister {
    pub id: u32,
    pub ty: IlType,
    /// Source-level name, when the value corresponds to one.
    pub name: Option<String>,
}

impl VirtualRegister {
    pub fn new(id: u32, ty: IlType) -> Self {
        VirtualRegister { id, ty, name: None }
    }

    pub fn named(id: u32, ty: IlType, name: impl Into<String>) -> Self {
        VirtualRegister {
            id,
            ty,
            name: Some(name.into()),
        }
    }
}

impl std::fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}:{}", self.id, self.ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Raw CPU instructions surfaced as intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuOp {
    Sei,
    Cli,
    Nop,
    Brk,
    Pha,
    Pla,
    Php,
    Plp,
}

impl CpuOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CpuOp::Sei => "sei",
            CpuOp::Cli => "cli",
            CpuOp::Nop => "nop",
            CpuOp::Brk => "brk",
            CpuOp::Pha => "pha",
            CpuOp::Pla => "pla",
            CpuOp::Php => "php",
            CpuOp::Plp => "plp",
        }
    }
}

/// Hardware-map context attached to map accesses.
#[derive(Debug, Clone, PartialEq)]
pub struct MapInfo {
    pub map: String,
    pub field: Option<String>,
    pub base_address: u32,
}

/// The closed instruction set.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// Literal value of the result type
    Const { value: u32 },
    /// Placeholder for a missing value
    Undef,
    Binary {
        op: BinOp,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    },
    Compare {
        op: CmpOp,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    },
    /// Bitwise complement
    Not { operand: VirtualRegister },
    /// Boolean negation (numeric operands test against zero first)
    LogicalNot { operand: VirtualRegister },
    ZeroExtend { operand: VirtualRegister },
    Truncate { operand: VirtualRegister },
    // Control flow
    Jump { target: LabelId },
    Branch {
        cond: VirtualRegister,
        then_target: LabelId,
        else_target: LabelId,
    },
    /// `None` is a void return
    Return { value: Option<VirtualRegister> },
    // Memory
    LoadVar { name: String },
    StoreVar {
        name: String,
        value: VirtualRegister,
    },
    LoadElem {
        array: String,
        index: VirtualRegister,
    },
    StoreElem {
        array: String,
        index: VirtualRegister,
        value: VirtualRegister,
    },
    LoadAddress { name: String },
    // Calls
    Call {
        callee: String,
        args: Vec<VirtualRegister>,
    },
    // SSA
    Phi {
        sources: Vec<(VirtualRegister, LabelId)>,
    },
    // Intrinsics
    Peek { addr: VirtualRegister },
    Poke {
        addr: VirtualRegister,
        value: VirtualRegister,
    },
    PeekW { addr: VirtualRegister },
    PokeW {
        addr: VirtualRegister,
        value: VirtualRegister,
    },
    Length { array: String },
    Lo { operand: VirtualRegister },
    Hi { operand: VirtualRegister },
    // Hardware access at fixed addresses
    HardwareRead { address: u32 },
    HardwareWrite {
        address: u32,
        value: VirtualRegister,
    },
    MapLoadField {
        map: String,
        field: String,
        address: u32,
    },
    MapStoreField {
        map: String,
        field: String,
        address: u32,
        value: VirtualRegister,
    },
    MapLoadRange {
        map: String,
        base: u32,
        index: VirtualRegister,
    },
    MapStoreRange {
        map: String,
        base: u32,
        index: VirtualRegister,
        value: VirtualRegister,
    },
    Cpu { op: CpuOp },
    // Optimization control
    OptBarrier,
    VolatileRead { addr: VirtualRegister },
    VolatileWrite {
        addr: VirtualRegister,
        value: VirtualRegister,
    },
}

impl InstrKind {
    /// Stable opcode name for printing and tests.
    pub fn opcode(&self) -> &'static str {
        match self {
            InstrKind::Const { .. } => "const",
            InstrKind::Undef => "undef",
            InstrKind::Binary { op, .. } => match op {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::Mul => "mul",
                BinOp::Div => "div",
                BinOp::Mod => "mod",
                BinOp::And => "and",
                BinOp::Or => "or",
                BinOp::Xor => "xor",
                BinOp::Shl => "shl",
                BinOp::Shr => "shr",
            },
            InstrKind::Compare { op, .. } => match op {
                CmpOp::Eq => "cmp_eq",
                CmpOp::Ne => "cmp_ne",
                CmpOp::Lt => "cmp_lt",
                CmpOp::Le => "cmp_le",
                CmpOp::Gt => "cmp_gt",
                CmpOp::Ge => "cmp_ge",
            },
            InstrKind::Not { .. } => "not",
            InstrKind::LogicalNot { .. } => "logical_not",
            InstrKind::ZeroExtend { .. } => "zero_extend",
            InstrKind::Truncate { .. } => "truncate",
            InstrKind::Jump { .. } => "jump",
            InstrKind::Branch { .. } => "branch",
            InstrKind::Return { value: Some(_) } => "ret",
            InstrKind::Return { value: None } => "ret_void",
            InstrKind::LoadVar { .. } => "load_var",
            InstrKind::StoreVar { .. } => "store_var",
            InstrKind::LoadElem { .. } => "load_array",
            InstrKind::StoreElem { .. } => "store_array",
            InstrKind::LoadAddress { .. } => "load_address",
            InstrKind::Call { .. } => "call",
            InstrKind::Phi { .. } => "phi",
            InstrKind::Peek { .. } => "peek",
            InstrKind::Poke { .. } => "poke",
            InstrKind::PeekW { .. } => "peekw",
            InstrKind::PokeW { .. } => "pokew",
            InstrKind::Length { .. } => "length",
            InstrKind::Lo { .. } => "lo",
            InstrKind::Hi { .. } => "hi",
            InstrKind::HardwareRead { .. } => "hardware_read",
            InstrKind::HardwareWrite { .. } => "hardware_write",
            InstrKind::MapLoadField { .. } => "map_load_field",
            InstrKind::MapStoreField { .. } => "map_store_field",
            InstrKind::MapLoadRange { .. } => "map_load_range",
            InstrKind::MapStoreRange { .. } => "map_store_range",
            InstrKind::Cpu { op } => op.mnemonic(),
            InstrKind::OptBarrier => "opt_barrier",
            InstrKind::VolatileRead { .. } => "volatile_read",
            InstrKind::VolatileWrite { .. } => "volatile_write",
        }
    }

    /// Terminators must be the last instruction of their block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstrKind::Jump { .. } | InstrKind::Branch { .. } | InstrKind::Return { .. }
        )
    }
}

/// Additive instruction metadata; never semantic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstrMetadata {
    pub span: Option<SourceSpan>,
    /// Original source fragment, for IL dumps.
    pub source_text: Option<String>,
    /// Rough 6502 cycle estimate for scheduling heuristics.
    pub cycle_estimate: Option<u32>,
    /// Emitted inside an interrupt handler; keep timing stable.
    pub raster_critical: bool,
    pub map_info: Option<MapInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub id: InstrId,
    pub kind: InstrKind,
    pub result: Option<VirtualRegister>,
    pub metadata: InstrMetadata,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.result {
            Some(result) => write!(f, "{result} = {}", self.kind.opcode()),
            None => write!(f, "{}", self.kind.opcode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminators() {
        assert!(InstrKind::Jump { target: 0 }.is_terminator());
        assert!(InstrKind::Return { value: None }.is_terminator());
        assert!(!InstrKind::Const { value: 1 }.is_terminator());
        assert!(!InstrKind::OptBarrier.is_terminator());
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(InstrKind::Const { value: 5 }.opcode(), "const");
        assert_eq!(
            InstrKind::Compare {
                op: CmpOp::Ne,
                lhs: VirtualRegister::new(0, IlType::Byte),
                rhs: VirtualRegister::new(1, IlType::Byte),
            }
            .opcode(),
            "cmp_ne"
        );
        assert_eq!(InstrKind::Cpu { op: CpuOp::Sei }.opcode(), "sei");
        assert_eq!(InstrKind::Return { value: None }.opcode(), "ret_void");
    }

    #[test]
    fn test_display() {
        let instr = Instruction {
            id: 0,
            kind: InstrKind::Const { value: 5 },
            result: Some(VirtualRegister::new(0, IlType::Byte)),
            metadata: InstrMetadata::default(),
        };
        assert_eq!(instr.to_string(), "v0:byte = const");
    }
}
