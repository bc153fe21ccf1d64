//! Variable usage analysis (tier 1)
//!
//! Records which symbols are ever read (or have their address taken) and
//! advises on the ones that never are. Loop counters and exported globals
//! are exempt; an unused counter is idiomatic and an export's readers live
//! in other modules.

use crate::ast::Program;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::symbols::{SymbolKind, SymbolTable};
use crate::typechecker::CheckResult;

use super::collect_program_accesses;

pub fn analyze(
    program: &Program,
    table: &SymbolTable,
    check: &CheckResult,
    diagnostics: &mut Diagnostics,
) {
    let accesses = collect_program_accesses(program, check);

    for symbol in table.symbols() {
        let used = accesses.reads.contains(&symbol.id)
            || accesses.address_taken.contains(&symbol.id);
        if used {
            continue;
        }
        match symbol.kind {
            SymbolKind::Parameter => {
                // Unreferenced parameters: not even written
                if !accesses.writes.contains(&symbol.id) {
                    diagnostics.warning(
                        DiagnosticCode::UnusedParameter,
                        format!("Parameter '{}' is never used", symbol.name),
                        symbol.span,
                    );
                }
            }
            SymbolKind::Variable => {
                if symbol.is_loop_counter || symbol.exported {
                    continue;
                }
                // Hardware-mapped globals are observable from outside the
                // program; writes to them are their use
                if symbol.map_address.is_some() && accesses.writes.contains(&symbol.id) {
                    continue;
                }
                diagnostics.warning(
                    DiagnosticCode::UnusedVariable,
                    format!("Variable '{}' is never read", symbol.name),
                    symbol.span,
                );
            }
            SymbolKind::Constant => {
                if symbol.exported {
                    continue;
                }
                diagnostics.warning(
                    DiagnosticCode::UnusedVariable,
                    format!("Constant '{}' is never read", symbol.name),
                    symbol.span,
                );
            }
            SymbolKind::Function
            | SymbolKind::EnumMember
            | SymbolKind::ImportedSymbol
            | SymbolKind::Intrinsic => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::symbols::build_symbol_table;
    use crate::typechecker::{TypeCheckOptions, check_program};
    use crate::typeres::TypeResolver;

    fn run(source: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        let mut table = build_symbol_table(&program, &mut diags);
        let resolver = TypeResolver::run(&program, &mut table, &mut diags);
        let check = check_program(
            &program,
            &table,
            &resolver,
            &mut diags,
            TypeCheckOptions::default(),
        );
        analyze(&program, &table, &check, &mut diags);
        diags
    }

    #[test]
    fn test_used_variables_clean() {
        let diags = run(
            "function f(): byte { let x: byte = 1; return x; }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_unused_local_warns() {
        let diags = run("function f(): void { let dead: byte = 1; }");
        assert_eq!(diags.len(), 1);
        let diag = &diags.items()[0];
        assert_eq!(diag.code, DiagnosticCode::UnusedVariable);
        assert!(diag.message.contains("'dead'"));
    }

    #[test]
    fn test_unused_parameter_warns() {
        let diags = run("function f(unused: byte): void { }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.items()[0].code, DiagnosticCode::UnusedParameter);
    }

    #[test]
    fn test_loop_counter_exempt() {
        let diags = run("function f(): void { for (i = 0 to 7) { nop(); } }");
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_exported_global_exempt() {
        let diags = run("export let shared: byte = 0;");
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_write_only_variable_still_warns() {
        let diags = run("function f(): void { let x: byte = 0; x = 1; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.items()[0].code, DiagnosticCode::UnusedVariable);
    }

    #[test]
    fn test_address_taken_counts_as_use() {
        let diags = run(
            "let buffer: byte[8];\n\
             function f(): word { return @buffer; }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_written_map_global_exempt() {
        let diags = run(
            "@map at $D020 let border: byte;\n\
             function f(): void { border = 0; }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_unused_constant_warns() {
        let diags = run("const UNUSED_LIMIT: byte = 8;");
        assert_eq!(diags.len(), 1);
        assert!(diags.items()[0].message.contains("UNUSED_LIMIT"));
    }
}
