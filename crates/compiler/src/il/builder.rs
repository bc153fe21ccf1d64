//! Fluent IL construction
//!
//! The builder owns the function being built and a current block. Every
//! emitted instruction gets a unique instruction id and, when it produces
//! a value, a fresh result register - the SSA invariant is enforced here
//! by construction and double-checked by the verifier. Control-flow
//! emitters maintain block edges on both sides.

use crate::source::SourceSpan;

use super::instr::{
    BinOp, CmpOp, CpuOp, InstrKind, InstrMetadata, Instruction, LabelId, MapInfo, VirtualRegister,
};
use super::types::IlType;
use super::{IlFunction, IlParameter};

pub struct Builder {
    func: Option<IlFunction>,
    current_block: Option<LabelId>,
    /// Span stamped onto subsequently emitted instructions.
    current_span: Option<SourceSpan>,
    /// Mark instructions as timing-sensitive (interrupt handlers).
    raster_critical: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            func: None,
            current_block: None,
            current_span: None,
            raster_critical: false,
        }
    }

    // ------------------------------------------------------------------
    // Function lifecycle
    // ------------------------------------------------------------------

    /// Start a fresh function; the entry block is created and made
    /// current.
    pub fn begin_function(
        &mut self,
        name: &str,
        params: Vec<IlParameter>,
        return_type: IlType,
    ) -> LabelId {
        assert!(self.func.is_none(), "previous function not ended");
        let mut func = IlFunction::new(name, params, return_type);
        let entry = func.add_block(Some("entry".to_string()));
        func.entry = entry;
        self.func = Some(func);
        self.current_block = Some(entry);
        entry
    }

    pub fn end_function(&mut self) -> IlFunction {
        self.current_block = None;
        self.current_span = None;
        self.raster_critical = false;
        self.func.take().expect("no function in progress")
    }

    /// Resume construction of a pre-existing function (from a stub
    /// creation phase). The caller picks the block to continue in.
    pub fn enter_function(&mut self, func: IlFunction) {
        assert!(self.func.is_none(), "previous function not ended");
        self.current_block = Some(func.entry);
        self.func = Some(func);
    }

    pub fn exit_function(&mut self) -> IlFunction {
        self.end_function()
    }

    pub fn set_interrupt(&mut self, is_interrupt: bool) {
        self.func_mut().is_interrupt = is_interrupt;
        self.raster_critical = is_interrupt;
    }

    pub fn set_span(&mut self, span: SourceSpan) {
        self.current_span = Some(span);
    }

    fn func_mut(&mut self) -> &mut IlFunction {
        self.func.as_mut().expect("no function in progress")
    }

    pub fn function(&self) -> &IlFunction {
        self.func.as_ref().expect("no function in progress")
    }

    // ------------------------------------------------------------------
    // Blocks and registers
    // ------------------------------------------------------------------

    pub fn create_block(&mut self, label: Option<&str>) -> LabelId {
        self.func_mut().add_block(label.map(|l| l.to_string()))
    }

    /// Create a block and make it the current insertion point.
    pub fn append_block(&mut self, label: Option<&str>) -> LabelId {
        let block = self.create_block(label);
        self.current_block = Some(block);
        block
    }

    pub fn set_current_block(&mut self, block: LabelId) {
        self.current_block = Some(block);
    }

    pub fn current_block(&self) -> LabelId {
        self.current_block.expect("no current block")
    }

    /// True when the current block already ends in a terminator; further
    /// emission into it is dropped.
    pub fn current_block_terminated(&self) -> bool {
        match self.current_block {
            Some(block) => self.function().block(block).has_terminator(),
            None => true,
        }
    }

    pub fn create_register(&mut self, ty: IlType, name: Option<&str>) -> VirtualRegister {
        let func = self.func_mut();
        let id = func.next_register_id;
        func.next_register_id += 1;
        match name {
            Some(name) => VirtualRegister::named(id, ty, name),
            None => VirtualRegister::new(id, ty),
        }
    }

    // ------------------------------------------------------------------
    // Core emission
    // ------------------------------------------------------------------

    fn push(&mut self, kind: InstrKind, result: Option<VirtualRegister>) {
        // A terminated block accepts nothing further; the statement was
        // already flagged as unreachable upstream
        if self.current_block_terminated() {
            return;
        }
        let cycle_estimate = Some(estimate_cycles(&kind, result.as_ref()));
        let metadata = InstrMetadata {
            span: self.current_span,
            source_text: None,
            cycle_estimate,
            raster_critical: self.raster_critical,
            map_info: None,
        };
        self.push_with_metadata(kind, result, metadata);
    }

    fn push_with_metadata(
        &mut self,
        kind: InstrKind,
        result: Option<VirtualRegister>,
        metadata: InstrMetadata,
    ) {
        let block = self.current_block();
        let func = self.func_mut();
        let id = func.next_instruction_id;
        func.next_instruction_id += 1;
        func.block_mut(block).instructions.push(Instruction {
            id,
            kind,
            result,
            metadata,
        });
    }

    fn emit_value(&mut self, kind: InstrKind, ty: IlType) -> VirtualRegister {
        let result = self.create_register(ty, None);
        self.push(kind, Some(result.clone()));
        result
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    pub fn emit_const(&mut self, ty: IlType, value: u32) -> VirtualRegister {
        self.emit_value(InstrKind::Const { value }, ty)
    }

    pub fn emit_undef(&mut self, ty: IlType) -> VirtualRegister {
        self.emit_value(InstrKind::Undef, ty)
    }

    pub fn emit_binary(
        &mut self,
        op: BinOp,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    ) -> VirtualRegister {
        let ty = if lhs.ty.size().max(rhs.ty.size()) > 1 {
            IlType::Word
        } else {
            IlType::Byte
        };
        self.emit_value(InstrKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn emit_compare(
        &mut self,
        op: CmpOp,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    ) -> VirtualRegister {
        self.emit_value(InstrKind::Compare { op, lhs, rhs }, IlType::Bool)
    }

    pub fn emit_not(&mut self, operand: VirtualRegister) -> VirtualRegister {
        let ty = operand.ty;
        self.emit_value(InstrKind::Not { operand }, ty)
    }

    pub fn emit_logical_not(&mut self, operand: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::LogicalNot { operand }, IlType::Bool)
    }

    pub fn emit_zero_extend(&mut self, operand: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::ZeroExtend { operand }, IlType::Word)
    }

    pub fn emit_truncate(&mut self, operand: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::Truncate { operand }, IlType::Byte)
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    pub fn emit_jump(&mut self, target: LabelId) {
        if self.current_block_terminated() {
            return;
        }
        let from = self.current_block();
        self.push(InstrKind::Jump { target }, None);
        self.func_mut().link(from, target);
    }

    pub fn emit_branch(
        &mut self,
        cond: VirtualRegister,
        then_target: LabelId,
        else_target: LabelId,
    ) {
        if self.current_block_terminated() {
            return;
        }
        let from = self.current_block();
        self.push(
            InstrKind::Branch {
                cond,
                then_target,
                else_target,
            },
            None,
        );
        self.func_mut().link(from, then_target);
        self.func_mut().link(from, else_target);
    }

    pub fn emit_return(&mut self, value: Option<VirtualRegister>) {
        self.push(InstrKind::Return { value }, None);
    }

    pub fn emit_return_void(&mut self) {
        self.emit_return(None);
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    pub fn emit_load_var(&mut self, name: &str, ty: IlType) -> VirtualRegister {
        let result = self.create_register(ty, Some(name));
        self.push(
            InstrKind::LoadVar {
                name: name.to_string(),
            },
            Some(result.clone()),
        );
        result
    }

    pub fn emit_store_var(&mut self, name: &str, value: VirtualRegister) {
        self.push(
            InstrKind::StoreVar {
                name: name.to_string(),
                value,
            },
            None,
        );
    }

    pub fn emit_load_elem(
        &mut self,
        array: &str,
        index: VirtualRegister,
        ty: IlType,
    ) -> VirtualRegister {
        self.emit_value(
            InstrKind::LoadElem {
                array: array.to_string(),
                index,
            },
            ty,
        )
    }

    pub fn emit_store_elem(
        &mut self,
        array: &str,
        index: VirtualRegister,
        value: VirtualRegister,
    ) {
        self.push(
            InstrKind::StoreElem {
                array: array.to_string(),
                index,
                value,
            },
            None,
        );
    }

    pub fn emit_load_address(&mut self, name: &str) -> VirtualRegister {
        self.emit_value(
            InstrKind::LoadAddress {
                name: name.to_string(),
            },
            IlType::Pointer,
        )
    }

    // ------------------------------------------------------------------
    // Calls and phi
    // ------------------------------------------------------------------

    /// Void calls return `None`; value calls return the result register.
    pub fn emit_call(
        &mut self,
        callee: &str,
        args: Vec<VirtualRegister>,
        return_type: IlType,
    ) -> Option<VirtualRegister> {
        let kind = InstrKind::Call {
            callee: callee.to_string(),
            args,
        };
        if return_type.is_value() {
            Some(self.emit_value(kind, return_type))
        } else {
            self.push(kind, None);
            None
        }
    }

    /// Sources are `(value, predecessor block)` pairs. Dominance is not
    /// validated here; that is the verifier's job.
    pub fn emit_phi(
        &mut self,
        ty: IlType,
        sources: Vec<(VirtualRegister, LabelId)>,
    ) -> VirtualRegister {
        self.emit_value(InstrKind::Phi { sources }, ty)
    }

    // ------------------------------------------------------------------
    // Intrinsics and hardware
    // ------------------------------------------------------------------

    pub fn emit_peek(&mut self, addr: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::Peek { addr }, IlType::Byte)
    }

    pub fn emit_poke(&mut self, addr: VirtualRegister, value: VirtualRegister) {
        self.push(InstrKind::Poke { addr, value }, None);
    }

    pub fn emit_peekw(&mut self, addr: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::PeekW { addr }, IlType::Word)
    }

    pub fn emit_pokew(&mut self, addr: VirtualRegister, value: VirtualRegister) {
        self.push(InstrKind::PokeW { addr, value }, None);
    }

    pub fn emit_length(&mut self, array: &str) -> VirtualRegister {
        self.emit_value(
            InstrKind::Length {
                array: array.to_string(),
            },
            IlType::Word,
        )
    }

    pub fn emit_lo(&mut self, operand: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::Lo { operand }, IlType::Byte)
    }

    pub fn emit_hi(&mut self, operand: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::Hi { operand }, IlType::Byte)
    }

    pub fn emit_hardware_read(&mut self, address: u32, ty: IlType, map: Option<MapInfo>) -> VirtualRegister {
        let result = self.create_register(ty, None);
        let metadata = InstrMetadata {
            span: self.current_span,
            source_text: None,
            cycle_estimate: Some(4),
            raster_critical: self.raster_critical,
            map_info: map,
        };
        if !self.current_block_terminated() {
            self.push_with_metadata(
                InstrKind::HardwareRead { address },
                Some(result.clone()),
                metadata,
            );
        }
        result
    }

    pub fn emit_hardware_write(&mut self, address: u32, value: VirtualRegister, map: Option<MapInfo>) {
        let metadata = InstrMetadata {
            span: self.current_span,
            source_text: None,
            cycle_estimate: Some(4),
            raster_critical: self.raster_critical,
            map_info: map,
        };
        if !self.current_block_terminated() {
            self.push_with_metadata(InstrKind::HardwareWrite { address, value }, None, metadata);
        }
    }

    pub fn emit_map_load_field(&mut self, map: &str, field: &str, address: u32) -> VirtualRegister {
        let info = MapInfo {
            map: map.to_string(),
            field: Some(field.to_string()),
            base_address: address,
        };
        let result = self.create_register(IlType::Byte, None);
        let metadata = InstrMetadata {
            span: self.current_span,
            cycle_estimate: Some(4),
            raster_critical: self.raster_critical,
            map_info: Some(info),
            source_text: None,
        };
        if !self.current_block_terminated() {
            self.push_with_metadata(
                InstrKind::MapLoadField {
                    map: map.to_string(),
                    field: field.to_string(),
                    address,
                },
                Some(result.clone()),
                metadata,
            );
        }
        result
    }

    pub fn emit_map_store_field(
        &mut self,
        map: &str,
        field: &str,
        address: u32,
        value: VirtualRegister,
    ) {
        let info = MapInfo {
            map: map.to_string(),
            field: Some(field.to_string()),
            base_address: address,
        };
        let metadata = InstrMetadata {
            span: self.current_span,
            cycle_estimate: Some(4),
            raster_critical: self.raster_critical,
            map_info: Some(info),
            source_text: None,
        };
        if !self.current_block_terminated() {
            self.push_with_metadata(
                InstrKind::MapStoreField {
                    map: map.to_string(),
                    field: field.to_string(),
                    address,
                    value,
                },
                None,
                metadata,
            );
        }
    }

    pub fn emit_map_load_range(
        &mut self,
        map: &str,
        base: u32,
        index: VirtualRegister,
        ty: IlType,
    ) -> VirtualRegister {
        let info = MapInfo {
            map: map.to_string(),
            field: None,
            base_address: base,
        };
        let result = self.create_register(ty, None);
        let metadata = InstrMetadata {
            span: self.current_span,
            cycle_estimate: Some(5),
            raster_critical: self.raster_critical,
            map_info: Some(info),
            source_text: None,
        };
        if !self.current_block_terminated() {
            self.push_with_metadata(
                InstrKind::MapLoadRange {
                    map: map.to_string(),
                    base,
                    index,
                },
                Some(result.clone()),
                metadata,
            );
        }
        result
    }

    pub fn emit_map_store_range(
        &mut self,
        map: &str,
        base: u32,
        index: VirtualRegister,
        value: VirtualRegister,
    ) {
        let info = MapInfo {
            map: map.to_string(),
            field: None,
            base_address: base,
        };
        let metadata = InstrMetadata {
            span: self.current_span,
            cycle_estimate: Some(5),
            raster_critical: self.raster_critical,
            map_info: Some(info),
            source_text: None,
        };
        if !self.current_block_terminated() {
            self.push_with_metadata(
                InstrKind::MapStoreRange {
                    map: map.to_string(),
                    base,
                    index,
                    value,
                },
                None,
                metadata,
            );
        }
    }

    pub fn emit_cpu(&mut self, op: CpuOp) {
        self.push(InstrKind::Cpu { op }, None);
    }

    pub fn emit_opt_barrier(&mut self) {
        self.push(InstrKind::OptBarrier, None);
    }

    pub fn emit_volatile_read(&mut self, addr: VirtualRegister) -> VirtualRegister {
        self.emit_value(InstrKind::VolatileRead { addr }, IlType::Byte)
    }

    pub fn emit_volatile_write(&mut self, addr: VirtualRegister, value: VirtualRegister) {
        self.push(InstrKind::VolatileWrite { addr, value }, None);
    }
}

/// Very rough 6502 cycle cost per instruction, doubled for 16-bit values.
fn estimate_cycles(kind: &InstrKind, result: Option<&VirtualRegister>) -> u32 {
    let base = match kind {
        InstrKind::Const { .. } | InstrKind::Undef => 2,
        InstrKind::Binary { op, .. } => match op {
            BinOp::Mul | BinOp::Div | BinOp::Mod => 40,
            BinOp::Shl | BinOp::Shr => 6,
            _ => 3,
        },
        InstrKind::Compare { .. } => 4,
        InstrKind::Not { .. } | InstrKind::LogicalNot { .. } => 4,
        InstrKind::ZeroExtend { .. } | InstrKind::Truncate { .. } => 2,
        InstrKind::Jump { .. } => 3,
        InstrKind::Branch { .. } => 4,
        InstrKind::Return { .. } => 6,
        InstrKind::LoadVar { .. } | InstrKind::StoreVar { .. } => 4,
        InstrKind::LoadElem { .. } | InstrKind::StoreElem { .. } => 7,
        InstrKind::LoadAddress { .. } => 4,
        InstrKind::Call { .. } => 12,
        InstrKind::Phi { .. } => 0,
        InstrKind::Peek { .. } | InstrKind::Poke { .. } => 4,
        InstrKind::PeekW { .. } | InstrKind::PokeW { .. } => 8,
        InstrKind::Length { .. } => 2,
        InstrKind::Lo { .. } | InstrKind::Hi { .. } => 2,
        InstrKind::HardwareRead { .. } | InstrKind::HardwareWrite { .. } => 4,
        InstrKind::MapLoadField { .. } | InstrKind::MapStoreField { .. } => 4,
        InstrKind::MapLoadRange { .. } | InstrKind::MapStoreRange { .. } => 5,
        InstrKind::Cpu { .. } => 2,
        InstrKind::OptBarrier => 0,
        InstrKind::VolatileRead { .. } | InstrKind::VolatileWrite { .. } => 4,
    };
    match result {
        Some(reg) if reg.ty.size() > 1 => base * 2,
        _ => base,
    }
}
