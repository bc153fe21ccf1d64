//! Intermediate language
//!
//! A register-based, SSA-capable IR: modules hold functions and globals,
//! functions hold basic blocks of instructions over virtual registers.
//! Construction goes through [`builder::Builder`]; [`lower`] translates a
//! type-checked AST; [`verify`] checks the SSA register-id invariant.

pub mod builder;
pub mod instr;
pub mod lower;
pub mod types;
pub mod verify;

use std::collections::HashMap;

pub use builder::Builder;
pub use instr::{
    BinOp, CmpOp, CpuOp, InstrId, InstrKind, InstrMetadata, Instruction, LabelId, MapInfo,
    VirtualRegister,
};
pub use lower::lower_program;
pub use types::{IlType, il_type_of};
pub use verify::verify_register_id_uniqueness;

/// Where a global lives on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// Auto-allocated from the zero-page user band
    ZeroPage,
    /// Labeled, bump-allocated, uninitialized
    Ram,
    /// Labeled, bump-allocated, with an initializer image
    Data,
    /// Fixed hardware address; never allocated
    Map,
}

/// A module-level variable with its resolved placement.
#[derive(Debug, Clone, PartialEq)]
pub struct IlGlobal {
    pub name: String,
    pub ty: IlType,
    /// Total size in bytes (element size times count for arrays).
    pub size: u32,
    pub storage: StorageClass,
    /// Allocated zero-page address or fixed map address.
    pub address: Option<u32>,
    /// Assembly label for RAM/Data storage (`_name`).
    pub label: Option<String>,
    /// Initial image for `Data` storage, one entry per element.
    pub initializer: Option<Vec<u32>>,
}

/// A straight-line run of instructions with a single terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: LabelId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub preds: Vec<LabelId>,
    pub succs: Vec<LabelId>,
}

impl BasicBlock {
    fn new(id: LabelId, label: String) -> Self {
        BasicBlock {
            id,
            label,
            instructions: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Only the last instruction may be a terminator.
    pub fn has_terminator(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|i| i.kind.is_terminator())
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.kind.is_terminator())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IlParameter {
    pub name: String,
    pub ty: IlType,
}

/// One compiled function.
#[derive(Debug)]
pub struct IlFunction {
    pub name: String,
    pub params: Vec<IlParameter>,
    pub return_type: IlType,
    pub entry: LabelId,
    blocks: Vec<BasicBlock>,
    pub next_register_id: u32,
    pub next_instruction_id: InstrId,
    pub next_label_id: LabelId,
    /// Interrupt handlers get register save/restore and `rti`.
    pub is_interrupt: bool,
    /// Free-form per-function hints for downstream passes.
    pub metadata: HashMap<String, String>,
}

impl IlFunction {
    pub fn new(name: impl Into<String>, params: Vec<IlParameter>, return_type: IlType) -> Self {
        IlFunction {
            name: name.into(),
            params,
            return_type,
            entry: 0,
            blocks: Vec::new(),
            next_register_id: 0,
            next_instruction_id: 0,
            next_label_id: 0,
            is_interrupt: false,
            metadata: HashMap::new(),
        }
    }

    pub fn add_block(&mut self, label: Option<String>) -> LabelId {
        let id = self.next_label_id;
        self.next_label_id += 1;
        let label = label.unwrap_or_else(|| format!("bb{id}"));
        self.blocks.push(BasicBlock::new(id, label));
        id
    }

    pub fn block(&self, id: LabelId) -> &BasicBlock {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .expect("unknown block id")
    }

    pub fn block_mut(&mut self, id: LabelId) -> &mut BasicBlock {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .expect("unknown block id")
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// All instructions in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Link two blocks, maintaining both edge lists.
    pub fn link(&mut self, from: LabelId, to: LabelId) {
        if !self.block(from).succs.contains(&to) {
            self.block_mut(from).succs.push(to);
            self.block_mut(to).preds.push(from);
        }
    }
}

/// A compiled module: functions plus placed globals plus free-form
/// metadata for cross-pass hints.
#[derive(Debug, Default)]
pub struct IlModule {
    pub name: String,
    pub functions: Vec<IlFunction>,
    pub globals: Vec<IlGlobal>,
    pub metadata: HashMap<String, String>,
}

impl IlModule {
    pub fn new(name: impl Into<String>) -> Self {
        IlModule {
            name: name.into(),
            ..IlModule::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&IlFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&IlGlobal> {
        self.globals.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_bookkeeping() {
        let mut func = IlFunction::new("f", vec![], IlType::Void);
        let a = func.add_block(None);
        let b = func.add_block(Some("loop_header".to_string()));
        assert_eq!(func.block(a).label, "bb0");
        assert_eq!(func.block(b).label, "loop_header");
        func.link(a, b);
        func.link(a, b);
        // Edges are deduplicated and maintained on both sides
        assert_eq!(func.block(a).succs, vec![b]);
        assert_eq!(func.block(b).preds, vec![a]);
    }

    #[test]
    fn test_terminator_detection() {
        let mut func = IlFunction::new("f", vec![], IlType::Void);
        let entry = func.add_block(None);
        assert!(!func.block(entry).has_terminator());
        func.block_mut(entry).instructions.push(Instruction {
            id: 0,
            kind: InstrKind::Return { value: None },
            result: None,
            metadata: InstrMetadata::default(),
        });
        assert!(func.block(entry).has_terminator());
    }

    #[test]
    fn test_module_lookup() {
        let mut module = IlModule::new("test");
        module.functions.push(IlFunction::new("main", vec![], IlType::Void));
        module.globals.push(IlGlobal {
            name: "score".to_string(),
            ty: IlType::Word,
            size: 2,
            storage: StorageClass::Data,
            address: None,
            label: Some("_score".to_string()),
            initializer: Some(vec![0]),
        });
        assert!(module.function("main").is_some());
        assert!(module.function("missing").is_none());
        assert_eq!(module.global("score").unwrap().label.as_deref(), Some("_score"));
    }
}
