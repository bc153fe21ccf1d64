//! Declaration and module-level grammar
//!
//! Top-level forms: module header, imports, functions (and `callback`
//! interrupt handlers), variables/constants with storage classes, type
//! aliases and enums. `export` is a modifier normalized to a flag on the
//! declaration it precedes.

use std::rc::Rc;

use super::{ParseScope, Parser, messages};
use crate::ast::{
    Decl, EnumDecl, EnumMemberDecl, FunctionDecl, ImportDecl, ImportName, ModuleDecl, Param,
    Program, StorageClass, TypeAliasDecl, TypeRef, VarDecl,
};
use crate::diagnostics::DiagnosticCode;
use crate::lexer::TokenKind;
use crate::source::SourceSpan;

impl Parser<'_> {
    pub(crate) fn parse_program(&mut self) -> Program {
        let start = self.here();
        let program_id = self.fresh_id();

        let module = if self.check(TokenKind::Module) {
            self.parse_module_decl()
        } else {
            self.implicit_module()
        };

        let mut decls = Vec::new();
        while !self.at_end() {
            if self.check(TokenKind::Module) {
                self.error_here(
                    DiagnosticCode::UnexpectedToken,
                    "A file may contain only one module declaration".to_string(),
                );
                self.advance();
                self.parse_dotted_name();
                self.eat(TokenKind::Semicolon);
                continue;
            }
            if let Some(decl) = self.parse_declaration() {
                decls.push(Rc::new(decl));
            }
        }

        Program {
            id: program_id,
            span: self.span_from(start),
            module,
            decls,
        }
    }

    fn parse_module_decl(&mut self) -> ModuleDecl {
        let start = self.here();
        self.advance(); // module
        let name = match self.parse_dotted_name() {
            Some((name, _)) => name,
            None => {
                self.error_here(
                    DiagnosticCode::ExpectedToken,
                    messages::module::expected_module_name(),
                );
                self.synchronize();
                "global".to_string()
            }
        };
        // A terminating semicolon is tolerated but not required
        self.eat(TokenKind::Semicolon);
        ModuleDecl {
            id: self.fresh_id(),
            span: self.span_from(start),
            name,
            implicit: false,
        }
    }

    /// `a.b.c` - dotted module path.
    pub(crate) fn parse_dotted_name(&mut self) -> Option<(String, SourceSpan)> {
        let start = self.here();
        let first = self.eat(TokenKind::Identifier)?;
        let mut name = first.text().unwrap_or(&first.lexeme).to_string();
        while self.check(TokenKind::Dot) && self.peek_at(1).kind == TokenKind::Identifier {
            self.advance(); // .
            let part = self.advance();
            name.push('.');
            name.push_str(part.text().unwrap_or(&part.lexeme));
        }
        Some((name, self.span_from(start)))
    }

    fn parse_declaration(&mut self) -> Option<Decl> {
        let start = self.here();
        let exported = self.eat(TokenKind::Export).is_some();

        match self.peek_kind() {
            TokenKind::Import => {
                if exported {
                    self.error_here(
                        DiagnosticCode::UnexpectedToken,
                        "'export' cannot be applied to an import".to_string(),
                    );
                }
                self.parse_import(start)
            }
            TokenKind::Function | TokenKind::Callback => self.parse_function(start, exported),
            TokenKind::Let | TokenKind::Const => {
                let is_const = self.advance().kind == TokenKind::Const;
                self.parse_var_rest(start, is_const, None, exported)
                    .map(Decl::Variable)
            }
            TokenKind::AtZp | TokenKind::AtRam | TokenKind::AtData | TokenKind::AtMap => {
                self.parse_stored_var(start, exported)
            }
            TokenKind::Type => self.parse_type_alias(start, exported),
            TokenKind::Enum => self.parse_enum(start, exported),
            _ => {
                let found = self.describe_current();
                self.error_here(
                    DiagnosticCode::UnexpectedToken,
                    messages::base::expected_but_found("declaration", &found),
                );
                // Guarantee progress even when the offending token is itself
                // a synchronization point
                self.advance();
                self.synchronize();
                None
            }
        }
    }

    /// `import a, b from x.y;` or `import * from x.y;`
    fn parse_import(&mut self, start: SourceSpan) -> Option<Decl> {
        self.advance(); // import
        let mut names = Vec::new();
        let mut wildcard = false;

        if self.eat(TokenKind::Star).is_some() {
            wildcard = true;
        } else {
            loop {
                let span = self.here();
                let Some(token) = self.expect(TokenKind::Identifier, "'import'") else {
                    self.synchronize();
                    return None;
                };
                names.push(ImportName {
                    name: token.text().unwrap_or(&token.lexeme).to_string(),
                    span,
                });
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        if self.expect(TokenKind::From, "import list").is_none() {
            self.synchronize();
            return None;
        }
        let Some((module, module_span)) = self.parse_dotted_name() else {
            self.error_here(
                DiagnosticCode::ExpectedToken,
                messages::module::expected_import_source(),
            );
            self.synchronize();
            return None;
        };
        self.expect(TokenKind::Semicolon, "import declaration");

        Some(Decl::Import(ImportDecl {
            id: self.fresh_id(),
            span: self.span_from(start),
            names,
            wildcard,
            module,
            module_span,
        }))
    }

    /// `[export] (function|callback) name(params): type (block | ;)`
    fn parse_function(&mut self, start: SourceSpan, exported: bool) -> Option<Decl> {
        let is_callback = self.advance().kind == TokenKind::Callback;
        let name_span = self.here();
        let Some(name_token) = self.expect(TokenKind::Identifier, "'function'") else {
            self.synchronize();
            return None;
        };
        let name = name_token
            .text()
            .unwrap_or(&name_token.lexeme)
            .to_string();

        self.expect(TokenKind::LParen, "function name");
        let params = self.parse_params();
        self.expect(TokenKind::RParen, "parameter list");
        self.expect(TokenKind::Colon, "parameter list");
        let return_type = self.parse_type_ref().unwrap_or_else(|| {
            self.error_here(
                DiagnosticCode::ExpectedToken,
                messages::base::expected_after("return type", "':'"),
            );
            self.void_type_ref()
        });

        let body = if self.eat(TokenKind::Semicolon).is_some() {
            // Stub declaration without a body
            None
        } else {
            self.scopes.push(ParseScope::Function {
                return_type: return_type.clone(),
            });
            let braced = self.check(TokenKind::LBrace);
            let body = self.parse_block_or_until("function header", &[TokenKind::End]);
            self.scopes.pop();
            if !braced {
                self.expect_end(TokenKind::Function);
            }
            Some(body)
        };

        Some(Decl::Function(FunctionDecl {
            id: self.fresh_id(),
            span: self.span_from(start),
            name,
            name_span,
            params,
            return_type,
            body,
            exported,
            is_callback,
        }))
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params: Vec<Param> = Vec::new();
        if self.check(TokenKind::RParen) {
            return params;
        }
        loop {
            let start = self.here();
            let Some(name_token) = self.expect(TokenKind::Identifier, "'('") else {
                break;
            };
            let name = name_token
                .text()
                .unwrap_or(&name_token.lexeme)
                .to_string();
            self.expect(TokenKind::Colon, "parameter name");
            let ty = self.parse_type_ref().unwrap_or_else(|| {
                self.error_here(
                    DiagnosticCode::ExpectedToken,
                    messages::base::expected_after("parameter type", "':'"),
                );
                self.void_type_ref()
            });
            if params.iter().any(|p| p.name == name) {
                self.error_at(
                    start,
                    DiagnosticCode::DuplicateParameter,
                    messages::declaration::duplicate_parameter(&name),
                );
            }
            params.push(Param {
                id: self.fresh_id(),
                span: self.span_from(start),
                name,
                ty,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        params
    }

    /// Storage-class-prefixed global: `@zp let x: byte;`,
    /// `@map at $D020 let border: byte;`
    fn parse_stored_var(&mut self, start: SourceSpan, exported: bool) -> Option<Decl> {
        let sigil = self.advance();
        let storage = match sigil.kind {
            TokenKind::AtZp => StorageClass::Zp,
            TokenKind::AtRam => StorageClass::Ram,
            TokenKind::AtData => StorageClass::Data,
            TokenKind::AtMap => StorageClass::Map,
            _ => unreachable!("caller checked for a storage sigil"),
        };

        let map_address = if storage == StorageClass::Map {
            if self.eat(TokenKind::At).is_none() {
                self.error_here(
                    DiagnosticCode::ExpectedToken,
                    messages::declaration::map_requires_address(),
                );
                None
            } else {
                match self.expect(TokenKind::Number, "'at'") {
                    Some(token) => token.number(),
                    None => None,
                }
            }
        } else {
            None
        };

        let is_const = match self.peek_kind() {
            TokenKind::Let => {
                self.advance();
                false
            }
            TokenKind::Const => {
                self.advance();
                true
            }
            _ => {
                let found = self.describe_current();
                self.error_here(
                    DiagnosticCode::ExpectedToken,
                    messages::base::expected_but_found("'let' or 'const'", &found),
                );
                self.synchronize();
                return None;
            }
        };

        let mut decl = self.parse_var_rest(start, is_const, Some(storage), exported)?;
        decl.map_address = map_address;
        Some(Decl::Variable(decl))
    }

    /// The common tail of a variable declaration:
    /// `name: type [= init];` - shared between globals and block locals.
    pub(crate) fn parse_var_rest(
        &mut self,
        start: SourceSpan,
        is_const: bool,
        storage: Option<StorageClass>,
        exported: bool,
    ) -> Option<VarDecl> {
        let name_span = self.here();
        let keyword = if is_const { "'const'" } else { "'let'" };
        let name_token = self.expect(TokenKind::Identifier, keyword)?;
        let name = name_token
            .text()
            .unwrap_or(&name_token.lexeme)
            .to_string();

        self.expect(TokenKind::Colon, "variable name")?;
        let ty = self.parse_type_ref().or_else(|| {
            self.error_here(
                DiagnosticCode::ExpectedToken,
                messages::base::expected_after("type", "':'"),
            );
            None
        })?;

        let init = if self.eat(TokenKind::Assign).is_some() {
            Some(self.parse_expression())
        } else {
            None
        };

        if is_const && init.is_none() {
            self.error_at(
                name_span,
                DiagnosticCode::ExpectedToken,
                messages::declaration::const_requires_initializer(&name),
            );
        }

        self.expect(TokenKind::Semicolon, "variable declaration");

        Some(VarDecl {
            id: self.fresh_id(),
            span: self.span_from(start),
            name,
            name_span,
            is_const,
            storage,
            ty,
            init,
            map_address: None,
            exported,
        })
    }

    /// `type Name = existing;`
    fn parse_type_alias(&mut self, start: SourceSpan, exported: bool) -> Option<Decl> {
        self.advance(); // type
        let name_token = self.expect(TokenKind::Identifier, "'type'")?;
        let name = name_token
            .text()
            .unwrap_or(&name_token.lexeme)
            .to_string();
        self.expect(TokenKind::Assign, "type alias name")?;
        let target = self.parse_type_ref().or_else(|| {
            self.error_here(
                DiagnosticCode::ExpectedToken,
                messages::base::expected_after("type", "'='"),
            );
            self.synchronize();
            None
        })?;
        self.expect(TokenKind::Semicolon, "type alias");
        Some(Decl::TypeAlias(TypeAliasDecl {
            id: self.fresh_id(),
            span: self.span_from(start),
            name,
            target,
            exported,
        }))
    }

    /// `enum Name { A = 3, B, C }` - implicit values continue from the
    /// previous member.
    fn parse_enum(&mut self, start: SourceSpan, exported: bool) -> Option<Decl> {
        self.advance(); // enum
        let name_token = self.expect(TokenKind::Identifier, "'enum'")?;
        let name = name_token
            .text()
            .unwrap_or(&name_token.lexeme)
            .to_string();
        self.expect(TokenKind::LBrace, "enum name")?;

        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            let member_start = self.here();
            let Some(member_token) = self.expect(TokenKind::Identifier, "enum body") else {
                self.synchronize();
                break;
            };
            let member_name = member_token
                .text()
                .unwrap_or(&member_token.lexeme)
                .to_string();
            let value = if self.eat(TokenKind::Assign).is_some() {
                match self.expect(TokenKind::Number, "'='") {
                    Some(token) => token.number(),
                    None => None,
                }
            } else {
                None
            };
            members.push(EnumMemberDecl {
                id: self.fresh_id(),
                span: self.span_from(member_start),
                name: member_name,
                value,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "enum members");

        Some(Decl::Enum(EnumDecl {
            id: self.fresh_id(),
            span: self.span_from(start),
            name,
            members,
            exported,
        }))
    }

    /// A type annotation: built-in or named type, optionally `[]` / `[N]`.
    pub(crate) fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let start = self.here();
        let name = match self.peek_kind() {
            TokenKind::ByteKw
            | TokenKind::WordKw
            | TokenKind::BoolKw
            | TokenKind::VoidKw
            | TokenKind::StringKw => self.advance().lexeme,
            TokenKind::Identifier => {
                let token = self.advance();
                token.text().unwrap_or(&token.lexeme).to_string()
            }
            _ => return None,
        };

        let array_size = if self.eat(TokenKind::LBracket).is_some() {
            let size = if self.check(TokenKind::RBracket) {
                None
            } else {
                match self.expect(TokenKind::Number, "'['") {
                    Some(token) => token.number(),
                    None => None,
                }
            };
            self.expect(TokenKind::RBracket, "array size");
            Some(size)
        } else {
            None
        };

        Some(TypeRef {
            id: self.fresh_id(),
            span: self.span_from(start),
            name,
            array_size,
        })
    }

    pub(crate) fn void_type_ref(&mut self) -> TypeRef {
        TypeRef {
            id: self.fresh_id(),
            span: SourceSpan::unknown(),
            name: "void".to_string(),
            array_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;
    use crate::diagnostics::Diagnostics;

    fn parse(source: &str) -> Program {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(!diags.has_errors(), "errors: {:?}", diags.items());
        program
    }

    fn parse_with_errors(source: &str) -> (Program, Diagnostics) {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        (program, diags)
    }

    #[test]
    fn test_module_declaration() {
        let program = parse("module Game.Main\nlet x: byte = 1;");
        assert_eq!(program.module.name, "Game.Main");
        assert!(!program.module.implicit);
        assert_eq!(program.decls.len(), 1);
    }

    #[test]
    fn test_simple_variable() {
        let program = parse("let x: word = $D020;");
        let Decl::Variable(v) = &*program.decls[0] else {
            panic!("Expected variable");
        };
        assert_eq!(v.name, "x");
        assert_eq!(v.ty.name, "word");
        assert!(matches!(
            v.init.as_deref(),
            Some(crate::ast::Expr::Number(n)) if n.value == 0xD020
        ));
    }

    #[test]
    fn test_const_requires_initializer() {
        let (_, diags) = parse_with_errors("const LIMIT: byte;");
        assert!(diags.has_errors());
        assert!(diags.items()[0].message.contains("requires an initializer"));
    }

    #[test]
    fn test_storage_classes() {
        let program = parse(
            "@zp let fast: byte = 0;\n\
             @ram let buffer: byte[256];\n\
             @data let table: byte[4] = [1, 2, 3, 4];\n\
             @map at $D020 let border: byte;",
        );
        let storages: Vec<Option<StorageClass>> = program
            .decls
            .iter()
            .map(|d| match &**d {
                Decl::Variable(v) => v.storage,
                _ => panic!("Expected variable"),
            })
            .collect();
        assert_eq!(
            storages,
            vec![
                Some(StorageClass::Zp),
                Some(StorageClass::Ram),
                Some(StorageClass::Data),
                Some(StorageClass::Map),
            ]
        );
        let Decl::Variable(border) = &*program.decls[3] else {
            panic!("Expected variable");
        };
        assert_eq!(border.map_address, Some(0xD020));
    }

    #[test]
    fn test_function_with_params() {
        let program = parse(
            "function plot(x: byte, y: byte): void {\n  poke(1024, x);\n}",
        );
        let Decl::Function(f) = &*program.decls[0] else {
            panic!("Expected function");
        };
        assert_eq!(f.name, "plot");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.return_type.name, "void");
        assert!(f.body.is_some());
        assert!(!f.is_callback);
    }

    #[test]
    fn test_function_stub() {
        let program = parse("function external_init(): void;");
        let Decl::Function(f) = &*program.decls[0] else {
            panic!("Expected function");
        };
        assert!(f.body.is_none());
    }

    #[test]
    fn test_function_end_keyword_form() {
        let program = parse("function tick(): void\n  counter += 1;\nend function");
        let Decl::Function(f) = &*program.decls[0] else {
            panic!("Expected function");
        };
        let Some(body) = &f.body else {
            panic!("Expected body");
        };
        assert!(matches!(&**body, Stmt::Block(b) if b.stmts.len() == 1));
    }

    #[test]
    fn test_callback_function() {
        let program = parse("callback raster_irq(): void { }");
        let Decl::Function(f) = &*program.decls[0] else {
            panic!("Expected function");
        };
        assert!(f.is_callback);
    }

    #[test]
    fn test_duplicate_parameter() {
        let (_, diags) = parse_with_errors("function f(a: byte, a: word): void { }");
        assert!(diags.has_errors());
        assert_eq!(diags.items()[0].code, DiagnosticCode::DuplicateParameter);
    }

    #[test]
    fn test_export_modifier() {
        let program = parse("export function api(): void { }\nexport const MAX: byte = 8;");
        assert!(program.decls[0].exported());
        assert!(program.decls[1].exported());
    }

    #[test]
    fn test_imports() {
        let program = parse("import add, mul from Lib.Math;\nimport * from Lib.Screen;");
        let Decl::Import(named) = &*program.decls[0] else {
            panic!("Expected import");
        };
        assert_eq!(named.names.len(), 2);
        assert_eq!(named.module, "Lib.Math");
        assert!(!named.wildcard);
        let Decl::Import(wild) = &*program.decls[1] else {
            panic!("Expected import");
        };
        assert!(wild.wildcard);
        assert!(wild.names.is_empty());
    }

    #[test]
    fn test_type_alias() {
        let program = parse("type Address = word;");
        let Decl::TypeAlias(alias) = &*program.decls[0] else {
            panic!("Expected alias");
        };
        assert_eq!(alias.name, "Address");
        assert_eq!(alias.target.name, "word");
    }

    #[test]
    fn test_enum_with_values() {
        let program = parse("enum Direction { UP = 3, DOWN, LEFT = 10, RIGHT }");
        let Decl::Enum(e) = &*program.decls[0] else {
            panic!("Expected enum");
        };
        assert_eq!(e.members.len(), 4);
        assert_eq!(e.members[0].value, Some(3));
        assert_eq!(e.members[1].value, None);
        assert_eq!(e.members[2].value, Some(10));
    }

    #[test]
    fn test_array_types() {
        let program = parse("let sized: byte[8];\nlet unsized: word[];");
        let Decl::Variable(sized) = &*program.decls[0] else {
            panic!("Expected variable");
        };
        assert_eq!(sized.ty.array_size, Some(Some(8)));
        let Decl::Variable(r#unsized) = &*program.decls[1] else {
            panic!("Expected variable");
        };
        assert_eq!(r#unsized.ty.array_size, Some(None));
    }

    #[test]
    fn test_recovery_continues_after_bad_declaration() {
        let (program, diags) = parse_with_errors(
            "function broken(: void { }\nfunction ok(): void { }",
        );
        assert!(diags.has_errors());
        assert!(program.decls.iter().any(
            |d| matches!(&**d, Decl::Function(f) if f.name == "ok"),
        ));
    }
}
