//! Vic Compiler Library
//!
//! Front-end and middle-end for Vic, a statically-typed low-level language
//! for the MOS 6502 (Commodore 64 first). The pipeline takes UTF-8 source
//! to a typed, analyzed IL module; a separate code generator turns that IL
//! into ACME-compatible assembly.
//!
//! # Pipeline
//!
//! ```text
//! source -> lexer -> parser -> semantic passes (symbols, types, checking,
//! CFG, call graph, analyses) -> IL lowering
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vicc::{CompilerConfig, compile_source};
//!
//! let result = compile_source(
//!     "main.vic",
//!     "function main(): void { poke($D020, 0); }",
//!     &CompilerConfig::new(),
//! );
//! assert!(result.success());
//! let il = result.il.expect("clean compiles produce IL");
//! ```
//!
//! The pipeline is stateless between invocations: every call owns its
//! diagnostic sink and produces independent artifacts, so a driver may run
//! compiles for unrelated files in parallel.

pub mod analysis;
pub mod ast;
pub mod call_graph;
pub mod cfg;
pub mod config;
pub mod diagnostics;
pub mod il;
pub mod intrinsics;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod semantic;
pub mod source;
pub mod symbols;
pub mod transform;
pub mod typechecker;
pub mod typeres;
pub mod types;
pub mod walker;

pub use analysis::{AnalysisResult, AnalysisTiers, TargetHints};
pub use ast::Program;
pub use call_graph::CallGraph;
pub use cfg::Cfg;
pub use config::{AnalysisConfig, CompilerConfig, TargetConfig};
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Severity};
pub use il::{Builder, IlModule, verify_register_id_uniqueness};
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::Parser;
pub use registry::{ExportKind, ImportResolver, ModuleRegistry, ResolvedImport};
pub use semantic::Analysis;
pub use source::{SourcePos, SourceSpan};
pub use symbols::{Symbol, SymbolKind, SymbolTable};
pub use transform::{AstTransformer, IdentityTransformer, transform_program};
pub use typechecker::{CheckResult, TypeCheckOptions};
pub use types::TypeInfo;
pub use walker::{AstVisitor, WalkControl, walk_program};

use std::rc::Rc;

use tracing::debug;

/// Everything one compile produces. The IL module is present only when
/// the front-end reported no errors.
pub struct CompileResult {
    pub analysis: Analysis,
    pub il: Option<IlModule>,
    pub diagnostics: Diagnostics,
    /// Cross-module resolutions (empty for single-file compiles).
    pub imports: Vec<ResolvedImport>,
}

impl CompileResult {
    pub fn success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

fn new_sink(name: &str, config: &CompilerConfig) -> Diagnostics {
    let mut diagnostics = match config.analysis.max_errors {
        Some(cap) => Diagnostics::with_max_errors(cap),
        None => Diagnostics::new(),
    };
    diagnostics.set_source_name(name);
    diagnostics
}

/// Run the front-end only: lex, parse and all semantic passes. Useful for
/// tooling that wants diagnostics and symbols without IL.
pub fn analyze_source(name: &str, source: &str, config: &CompilerConfig) -> (Analysis, Diagnostics) {
    let mut diagnostics = new_sink(name, config);
    debug!(file = name, bytes = source.len(), "compiling");
    let program = Parser::new(source, &mut diagnostics).parse();
    let analysis = semantic::analyze(program, config, &mut diagnostics);
    (analysis, diagnostics)
}

/// Full pipeline for one source buffer.
pub fn compile_source(name: &str, source: &str, config: &CompilerConfig) -> CompileResult {
    let (analysis, mut diagnostics) = analyze_source(name, source, config);
    let il = if diagnostics.has_errors() {
        None
    } else {
        Some(il::lower_program(
            &analysis.program,
            &analysis.symbols,
            &analysis.check,
            &mut diagnostics,
            config.lower_options(),
        ))
    };
    CompileResult {
        analysis,
        il,
        diagnostics,
        imports: Vec::new(),
    }
}

/// Compile a set of modules in driver-provided (topological) order.
///
/// Each source is parsed and registered under its declared module name;
/// imports are then validated against the registry before each module runs
/// the rest of the pipeline.
pub fn compile_modules(
    sources: &[(&str, &str)],
    config: &CompilerConfig,
) -> (ModuleRegistry, Vec<CompileResult>) {
    let mut module_registry = ModuleRegistry::new();
    let mut parsed = Vec::new();
    for (name, source) in sources {
        let mut diagnostics = new_sink(name, config);
        let program = Rc::new(Parser::new(source, &mut diagnostics).parse());
        module_registry.register(program.module.name.clone(), Rc::clone(&program));
        parsed.push((program, diagnostics));
    }

    let mut results = Vec::new();
    for (program, mut diagnostics) in parsed {
        let mut resolver = ImportResolver::new(&module_registry);
        let imports = resolver.resolve_imports(&program, &mut diagnostics);
        let analysis = semantic::analyze((*program).clone(), config, &mut diagnostics);
        let il = if diagnostics.has_errors() {
            None
        } else {
            Some(il::lower_program(
                &analysis.program,
                &analysis.symbols,
                &analysis.check,
                &mut diagnostics,
                config.lower_options(),
            ))
        };
        results.push(CompileResult {
            analysis,
            il,
            diagnostics,
            imports,
        });
    }
    (module_registry, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Decl;
    use crate::il::StorageClass;

    fn compile(source: &str) -> CompileResult {
        compile_source("test.vic", source, &CompilerConfig::new())
    }

    #[test]
    fn test_word_global_scenario() {
        let result = compile("let x: word = $D020;");
        assert!(result.success(), "diagnostics: {:?}", result.diagnostics.items());
        assert_eq!(result.analysis.program.decls.len(), 1);

        let symbol = result
            .analysis
            .symbols
            .lookup_from(result.analysis.symbols.module_scope, "x")
            .unwrap();
        assert_eq!(symbol.ty.as_ref().unwrap(), &TypeInfo::Word);
        let Decl::Variable(var) = &*result.analysis.program.decls[0] else {
            panic!("Expected variable");
        };
        assert!(matches!(
            var.init.as_deref(),
            Some(crate::ast::Expr::Number(n)) if n.value == 0xD020
        ));

        let il = result.il.unwrap();
        let global = il.global("x").unwrap();
        assert_eq!(global.storage, StorageClass::Data);
        assert_eq!(global.label.as_deref(), Some("_x"));
    }

    #[test]
    fn test_break_outside_loop_scenario() {
        let source = "function f(): void {\n  break;\n}";
        let result = compile(source);
        assert_eq!(result.diagnostics.len(), 1);
        let diag = &result.diagnostics.items()[0];
        assert_eq!(diag.code, DiagnosticCode::BreakOutsideLoop);
        // The diagnostic spans exactly the break keyword
        assert_eq!(diag.span.start.line, 2);
        assert_eq!(diag.span.start.column, 3);
        assert_eq!(diag.span.end.column, 8);
    }

    #[test]
    fn test_possibly_unassigned_scenario() {
        let result = compile(
            "module test\n\
             function main(): void {\n\
               let i: byte;\n\
               if (true) { i = 1; }\n\
               let j: byte = i;\n\
             }",
        );
        let warnings: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagnosticCode::PossiblyUnassigned)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("'i'"));
        // The warning points at the read in `let j: byte = i;`
        assert_eq!(warnings[0].span.start.line, 5);
    }

    #[test]
    fn test_array_literal_inference_scenarios() {
        // byte + word elements widen to word and satisfy word[3]
        let result = compile("let t: word[3] = [1, 256, 3];");
        assert!(result.success());
        // All-byte hex literals infer byte[3], which word[3] rejects
        let result = compile("let t: word[3] = [$0000, $0000, $0000];");
        assert!(!result.success());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::TypeMismatch));
    }

    #[test]
    fn test_cross_module_partial_resolution() {
        let (_, results) = compile_modules(
            &[
                (
                    "math.vic",
                    "module Lib.Math\nexport function add(a: byte, b: byte): byte { return a + b; }",
                ),
                (
                    "main.vic",
                    "module Game.Main\nimport add, nonExistent from Lib.Math;",
                ),
            ],
            &CompilerConfig::new(),
        );
        let main = &results[1];
        assert_eq!(main.imports.len(), 1);
        assert_eq!(main.imports[0].name, "add");
        assert_eq!(main.imports[0].kind, ExportKind::Function);
        let not_found: Vec<_> = main
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagnosticCode::SymbolNotFound)
            .collect();
        assert_eq!(not_found.len(), 1);
    }

    #[test]
    fn test_constant_function_il_scenario() {
        let result = compile("function foo(): byte { return 5; }");
        assert!(result.success());
        let il = result.il.unwrap();
        let foo = il.function("foo").unwrap();
        assert_eq!(foo.blocks().len(), 1);
        let instrs: Vec<_> = foo.instructions().collect();
        assert_eq!(instrs.len(), 2);
        assert!(matches!(
            instrs[0].kind,
            il::InstrKind::Const { value: 5 }
        ));
        assert_eq!(instrs[0].result.as_ref().unwrap().id, 0);
        assert!(matches!(
            &instrs[1].kind,
            il::InstrKind::Return { value: Some(reg) } if reg.id == 0
        ));
        assert!(verify_register_id_uniqueness(foo).is_ok());
    }

    #[test]
    fn test_errors_suppress_il() {
        let result = compile("let x: byte = 256;");
        assert!(!result.success());
        assert!(result.il.is_none());
    }

    #[test]
    fn test_enum_computation_end_to_end() {
        let result = compile("enum E { A = 3, B, C = 10, D }");
        assert!(result.success());
        let e = result.analysis.types.named_type("E").unwrap();
        assert_eq!(e.enum_member("A"), Some(3));
        assert_eq!(e.enum_member("B"), Some(4));
        assert_eq!(e.enum_member("C"), Some(10));
        assert_eq!(e.enum_member("D"), Some(11));
    }

    #[test]
    fn test_token_stream_ends_with_eof() {
        for source in ["", "let", "function f(): void { }", "\"unterminated"] {
            let mut diags = Diagnostics::new();
            let tokens = tokenize(source, &mut diags);
            assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn test_identity_transform_shares_whole_tree() {
        let result = compile(
            "enum Dir { UP, DOWN }\n\
             let table: byte[4] = [1, 2, 3, 4];\n\
             function main(): void {\n\
               for (i = 0 to 3) {\n\
                 if (table[i] > 2) { poke($0400, table[i]); }\n\
               }\n\
             }",
        );
        assert!(result.success());
        let program = &result.analysis.program;
        let rewritten = transform_program(program, &mut IdentityTransformer);
        for (old, new) in program.decls.iter().zip(rewritten.decls.iter()) {
            assert!(Rc::ptr_eq(old, new));
        }
    }

    #[test]
    fn test_stateless_pipeline_instances() {
        // Two compiles share nothing; an error in one leaves the other clean
        let bad = compile("let x: byte = 256;");
        let good = compile("let x: byte = 255;");
        assert!(!bad.success());
        assert!(good.success());
        assert!(good.diagnostics.is_empty());
    }

    #[test]
    fn test_diagnostic_rendering_includes_file() {
        let result = compile("let x: byte = 256;");
        let rendered = result
            .diagnostics
            .render(&result.diagnostics.items()[0]);
        assert!(rendered.starts_with("test.vic:"), "got: {rendered}");
        assert!(rendered.contains("LITERAL_OUT_OF_RANGE"));
    }

    #[test]
    fn test_wider_program_compiles_clean() {
        let result = compile(
            "module Game.Main\n\
             \n\
             enum State { TITLE, RUNNING, OVER }\n\
             \n\
             @map at $D020 let border: byte;\n\
             @zp let frame: byte = 0;\n\
             let score: word = 0;\n\
             let lives: byte = 3;\n\
             \n\
             function add_score(points: byte): void {\n\
               score += points;\n\
             }\n\
             \n\
             function flash_border(color: byte): void {\n\
               border = color;\n\
             }\n\
             \n\
             callback vblank(): void {\n\
               frame += 1;\n\
               if (frame == 50) {\n\
                 frame = 0;\n\
                 add_score(1);\n\
               }\n\
             }\n\
             \n\
             export function main(): void {\n\
               sei();\n\
               flash_border(0);\n\
               while (lives > 0) {\n\
                 for (i = 0 to 7) {\n\
                   poke($0400 + i, 32);\n\
                 }\n\
                 if (score > 1000) { break; }\n\
               }\n\
               cli();\n\
             }",
        );
        assert!(
            result.success(),
            "diagnostics: {:?}",
            result.diagnostics.items()
        );
        let il = result.il.unwrap();
        assert_eq!(il.functions.len(), 4);
        for func in &il.functions {
            assert!(verify_register_id_uniqueness(func).is_ok());
        }
        assert_eq!(il.global("border").unwrap().storage, StorageClass::Map);
        assert_eq!(il.global("frame").unwrap().storage, StorageClass::ZeroPage);
        let vblank = il.function("vblank").unwrap();
        assert!(vblank.is_interrupt);
    }
}
