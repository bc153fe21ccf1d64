//! Semantic pass orchestration
//!
//! Runs the fixed pass order over one parsed program: symbol table, type
//! resolution, type checking, CFG construction, call graph, then the
//! configured advanced analysis tiers. Later passes run even when earlier
//! ones reported errors, so one bad declaration does not silence
//! diagnostics elsewhere.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::analysis::{self, AnalysisResult};
use crate::ast::Program;
use crate::call_graph::{self, CallGraph};
use crate::cfg::{self, Cfg};
use crate::config::CompilerConfig;
use crate::diagnostics::Diagnostics;
use crate::symbols::{SymbolTable, build_symbol_table};
use crate::typechecker::{CheckResult, check_program};
use crate::typeres::TypeResolver;

/// Everything the semantic phase produces for one program. Consumers
/// (IL lowering, tooling) read these as immutable artifacts.
pub struct Analysis {
    pub program: Rc<Program>,
    pub symbols: SymbolTable,
    pub types: TypeResolver,
    pub check: CheckResult,
    pub cfgs: HashMap<String, Cfg>,
    pub call_graph: CallGraph,
    pub advanced: AnalysisResult,
}

/// Run passes 1-6 in order.
pub fn analyze(
    program: Program,
    config: &CompilerConfig,
    diagnostics: &mut Diagnostics,
) -> Analysis {
    let program = Rc::new(program);

    debug!(module = %program.module.name, "pass 1: symbol table");
    let mut symbols = build_symbol_table(&program, diagnostics);
    debug!(symbols = symbols.symbol_count(), "pass 1 done");

    debug!("pass 2: type resolution");
    let types = TypeResolver::run(&program, &mut symbols, diagnostics);

    debug!("pass 3: type checking");
    let check = check_program(
        &program,
        &symbols,
        &types,
        diagnostics,
        config.typecheck_options(),
    );

    debug!("pass 4: control flow");
    // When tier 2 runs, it owns the unreachable-code warnings; otherwise
    // CFG construction reports them directly
    let cfg_warnings = config.analysis.report_warnings && !config.analysis.tier2;
    let cfgs = cfg::build_cfgs(&program, diagnostics, cfg_warnings);

    debug!("pass 5: call graph");
    let call_graph =
        call_graph::analyze_call_graph(&program, diagnostics, config.analysis.report_warnings);

    debug!("pass 6: advanced analyses");
    let advanced = analysis::run_analyses(
        &program,
        &symbols,
        &check,
        &cfgs,
        &call_graph,
        diagnostics,
        config.tiers(),
        config.analysis.report_warnings,
    );

    debug!(
        errors = diagnostics.error_count(),
        warnings = diagnostics.warning_count(),
        "semantic phase done"
    );

    Analysis {
        program,
        symbols,
        types,
        check,
        cfgs,
        call_graph,
        advanced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::parser::Parser;

    fn run(source: &str, config: &CompilerConfig) -> (Analysis, Diagnostics) {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        let analysis = analyze(program, config, &mut diags);
        (analysis, diags)
    }

    #[test]
    fn test_full_pipeline_on_clean_program() {
        let (analysis, diags) = run(
            "module test\n\
             let score: word = 0;\n\
             function bump(points: byte): void {\n\
               score += points;\n\
             }\n\
             function main(): void {\n\
               bump(10);\n\
             }",
            &CompilerConfig::new(),
        );
        assert!(!diags.has_errors(), "unexpected: {:?}", diags.items());
        assert_eq!(analysis.cfgs.len(), 2);
        assert!(analysis.call_graph.callees("main").unwrap().contains("bump"));
        assert!(!analysis.advanced.pure_functions.contains("bump"));
    }

    #[test]
    fn test_errors_do_not_stop_later_passes() {
        // The unknown type in the first declaration must not suppress the
        // unreachable-code warning in the second function
        let (_, diags) = run(
            "let bad: mystery = 0;\n\
             function f(): void { return; nop(); }",
            &CompilerConfig::new(),
        );
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::UnknownType));
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UnreachableCode));
    }

    #[test]
    fn test_advanced_analysis_can_be_disabled() {
        let source = "function f(): void { let dead: byte = 1; }";
        let (_, diags) = run(source, &CompilerConfig::new());
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UnusedVariable));

        let (analysis, diags) = run(source, &CompilerConfig::new().without_advanced_analysis());
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
        assert!(analysis.advanced.liveness.is_empty());
    }

    #[test]
    fn test_unreachable_warning_not_duplicated_across_passes() {
        // Both pass 4 and tier 2 know how to report unreachable code; only
        // one of them may
        let source = "function f(): void { return; nop(); }";
        let (_, diags) = run(source, &CompilerConfig::new());
        let count = diags
            .iter()
            .filter(|d| d.code == DiagnosticCode::UnreachableCode)
            .count();
        assert_eq!(count, 1);

        let (_, diags) = run(source, &CompilerConfig::new().with_tiers(true, false, true));
        let count = diags
            .iter()
            .filter(|d| d.code == DiagnosticCode::UnreachableCode)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_warnings_suppressed() {
        let (_, diags) = run(
            "function f(): void { return; nop(); }",
            &CompilerConfig::new().with_warnings(false),
        );
        assert_eq!(diags.warning_count(), 0);
    }
}
