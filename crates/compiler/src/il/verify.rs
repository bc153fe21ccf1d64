//! IL consistency checks
//!
//! A duplicate result-register id is an implementation bug, not a user
//! error: the verifier reports it as an error diagnostic citing both
//! defining sites so the offending emission path can be found.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticCode, Severity};
use crate::source::SourceSpan;

use super::IlFunction;

/// Check that no two instructions in the function define the same result
/// register id.
pub fn verify_register_id_uniqueness(func: &IlFunction) -> Result<(), Diagnostic> {
    let mut defined: HashMap<u32, (u32, SourceSpan)> = HashMap::new();
    for instr in func.instructions() {
        let Some(result) = &instr.result else {
            continue;
        };
        let span = instr.metadata.span.unwrap_or_else(SourceSpan::unknown);
        if let Some((first_instr, first_span)) = defined.get(&result.id) {
            let diag = Diagnostic::new(
                Severity::Error,
                DiagnosticCode::SsaViolation,
                format!(
                    "register v{} defined twice in '{}' (instructions {} and {})",
                    result.id, func.name, first_instr, instr.id
                ),
                span,
            )
            .with_related(*first_span, "first definition here");
            return Err(diag);
        }
        defined.insert(result.id, (instr.id, span));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::builder::Builder;
    use crate::il::instr::{InstrKind, InstrMetadata, Instruction, VirtualRegister};
    use crate::il::types::IlType;

    #[test]
    fn test_clean_function_passes() {
        let mut builder = Builder::new();
        builder.begin_function("f", vec![], IlType::Byte);
        let v = builder.emit_const(IlType::Byte, 5);
        builder.emit_return(Some(v));
        let func = builder.end_function();
        assert!(verify_register_id_uniqueness(&func).is_ok());
    }

    #[test]
    fn test_duplicate_register_detected() {
        let mut builder = Builder::new();
        let entry = builder.begin_function("f", vec![], IlType::Byte);
        builder.emit_const(IlType::Byte, 1);
        let mut func = builder.end_function();

        // Forge a second definition of v0 behind the builder's back
        func.block_mut(entry).instructions.push(Instruction {
            id: 99,
            kind: InstrKind::Const { value: 2 },
            result: Some(VirtualRegister::new(0, IlType::Byte)),
            metadata: InstrMetadata::default(),
        });

        let err = verify_register_id_uniqueness(&func).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::SsaViolation);
        assert!(err.message.contains("v0"));
        // Both defining sites are cited
        assert!(err.message.contains("instructions 0 and 99"));
        assert_eq!(err.related.len(), 1);
    }
}
