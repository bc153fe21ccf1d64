//! Lexer for Vic source text
//!
//! Single pass over the buffer, producing a flat token stream with spans and
//! a terminating [`TokenKind::Eof`]. Lexical errors never abort the scan:
//! they are reported through the diagnostic sink and surface as
//! [`TokenKind::Error`] tokens so the parser can keep going.

use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::source::{SourcePos, SourceSpan};

/// The closed set of token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords
    Module,
    Import,
    Export,
    From,
    Function,
    Callback,
    Let,
    Const,
    If,
    Else,
    While,
    Do,
    For,
    To,
    Downto,
    Step,
    Return,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    Match,
    Enum,
    Type,
    End,
    True,
    False,
    ByteKw,
    WordKw,
    BoolKw,
    VoidKw,
    StringKw,
    At,
    // Storage-class sigils
    AtZp,
    AtRam,
    AtData,
    AtMap,
    // Literals and names
    Identifier,
    Number,
    String,
    Char,
    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Comparison
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    AmpAmp,
    PipePipe,
    Bang,
    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    // Assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Question,
    AddressOf,
    // Sentinels
    Error,
    Eof,
}

impl TokenKind {
    /// Human-readable name used in "Expected X but found Y" messages.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Char => "character",
            TokenKind::Eof => "end of input",
            TokenKind::Error => "invalid token",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Assign => "'='",
            _ => "token",
        }
    }
}

/// Extra payload computed at lex time.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    /// Numeric literal value (decimal, $hex, 0x, 0b forms)
    Number(u32),
    /// Processed string/char contents with escapes applied
    Text(String),
}

/// A lexed token. The raw lexeme is preserved so the parser can recover the
/// base and width of numeric literals.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
    pub value: Option<TokenValue>,
}

impl Token {
    pub fn number(&self) -> Option<u32> {
        match self.value {
            Some(TokenValue::Number(n)) => Some(n),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Some(TokenValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// Reclassify an identifier as a keyword where applicable.
fn keyword_kind(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "module" => TokenKind::Module,
        "import" => TokenKind::Import,
        "export" => TokenKind::Export,
        "from" => TokenKind::From,
        "function" => TokenKind::Function,
        "callback" => TokenKind::Callback,
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "to" => TokenKind::To,
        "downto" => TokenKind::Downto,
        "step" => TokenKind::Step,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "match" => TokenKind::Match,
        "enum" => TokenKind::Enum,
        "type" => TokenKind::Type,
        "end" => TokenKind::End,
        "at" => TokenKind::At,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "byte" => TokenKind::ByteKw,
        "word" => TokenKind::WordKw,
        "bool" => TokenKind::BoolKw,
        "void" => TokenKind::VoidKw,
        "string" => TokenKind::StringKw,
        _ => return None,
    };
    Some(kind)
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    src_len: usize,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: &'a mut Diagnostics,
}

/// Tokenize a source buffer.
///
/// Always returns at least one token (`Eof`). Lexical problems are appended
/// to `diagnostics` and represented in-stream as `Error` tokens.
pub fn tokenize(source: &str, diagnostics: &mut Diagnostics) -> Vec<Token> {
    let mut lexer = Lexer {
        src: source,
        chars: source.char_indices().collect(),
        src_len: source.len(),
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
        diagnostics,
    };
    lexer.run();
    lexer.tokens
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        loop {
            self.skip_trivia();
            let start = self.here();
            let Some(c) = self.peek() else {
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: SourceSpan::new(start, start),
                    value: None,
                });
                return;
            };

            if c.is_ascii_digit() || c == '$' {
                self.lex_number(start);
            } else if c == '"' || c == '\'' {
                self.lex_string(start, c);
            } else if c.is_ascii_alphabetic() || c == '_' {
                self.lex_identifier(start);
            } else {
                self.lex_operator(start, c);
            }
        }
    }

    fn here(&self) -> SourcePos {
        let offset = self
            .chars
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.src_len);
        SourcePos::new(self.line, self.column, offset as i64)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, c) = *self.chars.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip whitespace and comments. `//` runs to end of line; `/* */` may
    /// span lines but does not nest.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.here();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.advance() {
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        self.diagnostics.error(
                            DiagnosticCode::UnterminatedComment,
                            "Unterminated block comment",
                            SourceSpan::new(start, self.here()),
                        );
                    }
                }
                _ => return,
            }
        }
    }

    fn lexeme_between(&self, start: &SourcePos, end: &SourcePos) -> String {
        self.src[start.offset as usize..end.offset as usize].to_string()
    }

    fn push(&mut self, kind: TokenKind, start: SourcePos, value: Option<TokenValue>) {
        let end = self.here();
        self.tokens.push(Token {
            kind,
            lexeme: self.lexeme_between(&start, &end),
            span: SourceSpan::new(start, end),
            value,
        });
    }

    fn error_token(&mut self, start: SourcePos, code: DiagnosticCode, message: String) {
        let end = self.here();
        self.diagnostics
            .error(code, message, SourceSpan::new(start, end));
        self.tokens.push(Token {
            kind: TokenKind::Error,
            lexeme: self.lexeme_between(&start, &end),
            span: SourceSpan::new(start, end),
            value: None,
        });
    }

    fn lex_number(&mut self, start: SourcePos) {
        let first = self.advance().unwrap();

        // $FF form
        if first == '$' {
            let digits = self.take_while(|c| c.is_ascii_alphanumeric());
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                self.error_token(
                    start,
                    DiagnosticCode::MalformedNumber,
                    format!("Invalid hex literal '${digits}'"),
                );
                return;
            }
            match u32::from_str_radix(&digits, 16) {
                Ok(value) => self.push(TokenKind::Number, start, Some(TokenValue::Number(value))),
                Err(_) => self.error_token(
                    start,
                    DiagnosticCode::MalformedNumber,
                    format!("Hex literal '${digits}' is out of range"),
                ),
            }
            return;
        }

        // 0x / 0b forms
        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            let digits = self.take_while(|c| c.is_ascii_alphanumeric());
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                self.error_token(
                    start,
                    DiagnosticCode::MalformedNumber,
                    format!("Invalid hex literal '0x{digits}'"),
                );
                return;
            }
            match u32::from_str_radix(&digits, 16) {
                Ok(value) => self.push(TokenKind::Number, start, Some(TokenValue::Number(value))),
                Err(_) => self.error_token(
                    start,
                    DiagnosticCode::MalformedNumber,
                    format!("Hex literal '0x{digits}' is out of range"),
                ),
            }
            return;
        }
        if first == '0' && matches!(self.peek(), Some('b') | Some('B')) {
            self.advance();
            let digits = self.take_while(|c| c.is_ascii_alphanumeric());
            if digits.is_empty() || !digits.chars().all(|c| c == '0' || c == '1') {
                self.error_token(
                    start,
                    DiagnosticCode::MalformedNumber,
                    format!("Invalid binary literal '0b{digits}'"),
                );
                return;
            }
            match u32::from_str_radix(&digits, 2) {
                Ok(value) => self.push(TokenKind::Number, start, Some(TokenValue::Number(value))),
                Err(_) => self.error_token(
                    start,
                    DiagnosticCode::MalformedNumber,
                    format!("Binary literal '0b{digits}' is out of range"),
                ),
            }
            return;
        }

        // Decimal; trailing identifier characters make the literal malformed
        let mut digits = String::from(first);
        digits.push_str(&self.take_while(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            self.error_token(
                start,
                DiagnosticCode::MalformedNumber,
                format!("Invalid number literal '{digits}'"),
            );
            return;
        }
        match digits.parse::<u32>() {
            Ok(value) => self.push(TokenKind::Number, start, Some(TokenValue::Number(value))),
            Err(_) => self.error_token(
                start,
                DiagnosticCode::MalformedNumber,
                format!("Number literal '{digits}' is out of range"),
            ),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    fn lex_string(&mut self, start: SourcePos, quote: char) {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error_token(
                        start,
                        DiagnosticCode::UnterminatedString,
                        "Unterminated string literal - missing closing quote".to_string(),
                    );
                    return;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.lex_escape() {
                        Ok(c) => text.push(c),
                        Err(bad) => {
                            self.error_token(
                                start,
                                DiagnosticCode::InvalidEscape,
                                format!("Unknown escape sequence '\\{bad}'"),
                            );
                            return;
                        }
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        // Single-quoted single characters are char literals, everything else
        // is a string.
        let kind = if quote == '\'' && text.chars().count() == 1 {
            TokenKind::Char
        } else {
            TokenKind::String
        };
        self.push(kind, start, Some(TokenValue::Text(text)));
    }

    fn lex_escape(&mut self) -> Result<char, String> {
        let Some(c) = self.advance() else {
            return Err(String::new());
        };
        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '\\' => Ok('\\'),
            '"' => Ok('"'),
            '\'' => Ok('\''),
            '0' => Ok('\0'),
            'x' => {
                let mut hex = String::new();
                for _ in 0..2 {
                    match self.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(h);
                            self.advance();
                        }
                        _ => return Err(format!("x{hex}")),
                    }
                }
                let byte = u8::from_str_radix(&hex, 16).map_err(|_| format!("x{hex}"))?;
                Ok(byte as char)
            }
            other => Err(other.to_string()),
        }
    }

    fn lex_identifier(&mut self, start: SourcePos) {
        let ident = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        match keyword_kind(&ident) {
            Some(kind) => self.push(kind, start, None),
            None => self.push(TokenKind::Identifier, start, Some(TokenValue::Text(ident))),
        }
    }

    /// Operator lexing is greedy: `>>=` wins over `>>` wins over `>`.
    fn lex_operator(&mut self, start: SourcePos, c: char) {
        self.advance();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            '~' => TokenKind::Tilde,
            '@' => {
                // Storage sigils attach directly to the `@`
                return self.lex_at_sigil(start);
            }
            '+' => self.with_assign(TokenKind::Plus, TokenKind::PlusAssign),
            '-' => self.with_assign(TokenKind::Minus, TokenKind::MinusAssign),
            '*' => self.with_assign(TokenKind::Star, TokenKind::StarAssign),
            '/' => self.with_assign(TokenKind::Slash, TokenKind::SlashAssign),
            '%' => self.with_assign(TokenKind::Percent, TokenKind::PercentAssign),
            '^' => self.with_assign(TokenKind::Caret, TokenKind::CaretAssign),
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::AmpAmp
                } else {
                    self.with_assign(TokenKind::Amp, TokenKind::AmpAssign)
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::PipePipe
                } else {
                    self.with_assign(TokenKind::Pipe, TokenKind::PipeAssign)
                }
            }
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    self.with_assign(TokenKind::Shl, TokenKind::ShlAssign)
                } else if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    self.with_assign(TokenKind::Shr, TokenKind::ShrAssign)
                } else if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                self.error_token(
                    start,
                    DiagnosticCode::UnexpectedToken,
                    format!("Unexpected character '{other}'"),
                );
                return;
            }
        };
        self.push(kind, start, None);
    }

    fn with_assign(&mut self, plain: TokenKind, assign: TokenKind) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            assign
        } else {
            plain
        }
    }

    fn lex_at_sigil(&mut self, start: SourcePos) {
        let rest: String = {
            let mut out = String::new();
            let mut n = 0;
            while let Some(c) = self.peek_at(n) {
                if !c.is_ascii_alphanumeric() && c != '_' {
                    break;
                }
                out.push(c);
                n += 1;
            }
            out
        };
        let kind = match rest.as_str() {
            "zp" => Some(TokenKind::AtZp),
            "ram" => Some(TokenKind::AtRam),
            "data" => Some(TokenKind::AtData),
            "map" => Some(TokenKind::AtMap),
            _ => None,
        };
        match kind {
            Some(kind) => {
                for _ in 0..rest.chars().count() {
                    self.advance();
                }
                self.push(kind, start, None);
            }
            // Bare `@` is the address-of operator
            None => self.push(TokenKind::AddressOf, start, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, &mut diags);
        (tokens, diags)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_always_ends_with_eof() {
        for source in ["", "   ", "let x", "// only a comment", "\"unterminated"] {
            let (tokens, _) = lex(source);
            assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let (tokens, diags) = lex("let x: byte = 1;");
        assert!(!diags.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::ByteKw,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].text(), Some("x"));
    }

    #[test]
    fn test_number_bases() {
        let (tokens, diags) = lex("123 $FF 0xFF 0b1010 $D020");
        assert!(!diags.has_errors());
        let values: Vec<u32> = tokens
            .iter()
            .filter_map(|t| t.number())
            .collect();
        assert_eq!(values, vec![123, 255, 255, 10, 0xD020]);
        // Raw lexemes preserved so the parser can recover the base
        assert_eq!(tokens[1].lexeme, "$FF");
        assert_eq!(tokens[3].lexeme, "0b1010");
    }

    #[test]
    fn test_invalid_hex_literal() {
        let (tokens, diags) = lex("0xGG");
        assert!(diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(
            diags.items()[0].message.contains("Invalid hex literal"),
            "unexpected message: {}",
            diags.items()[0].message
        );
    }

    #[test]
    fn test_invalid_binary_literal() {
        let (_, diags) = lex("0b123");
        assert!(diags.has_errors());
        assert!(diags.items()[0].message.contains("Invalid binary literal"));
    }

    #[test]
    fn test_string_escapes() {
        let (tokens, diags) = lex(r#""Line 1\nLine 2\tTabbed\x41""#);
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text(), Some("Line 1\nLine 2\tTabbed\u{41}"));
    }

    #[test]
    fn test_char_literal() {
        let (tokens, diags) = lex("'A' 'ab'");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Char);
        assert_eq!(tokens[0].text(), Some("A"));
        // Multi-character single-quoted literal is a string
        assert_eq!(tokens[1].kind, TokenKind::String);
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, diags) = lex("\"runs off the end");
        assert!(diags.has_errors());
        assert_eq!(
            diags.items()[0].code,
            crate::diagnostics::DiagnosticCode::UnterminatedString
        );
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_unknown_escape() {
        let (_, diags) = lex(r#""bad \q escape""#);
        assert!(diags.has_errors());
        assert!(diags.items()[0].message.contains("\\q"));
    }

    #[test]
    fn test_greedy_operators() {
        let (tokens, diags) = lex("x >>= y >> z > w <<= v");
        assert!(!diags.has_errors());
        let ops: Vec<TokenKind> = kinds(&tokens)
            .into_iter()
            .filter(|k| !matches!(k, TokenKind::Identifier | TokenKind::Eof))
            .collect();
        assert_eq!(
            ops,
            vec![
                TokenKind::ShrAssign,
                TokenKind::Shr,
                TokenKind::Gt,
                TokenKind::ShlAssign,
            ]
        );
    }

    #[test]
    fn test_storage_sigils_and_address_of() {
        let (tokens, diags) = lex("@zp @ram @data @map @x");
        assert!(!diags.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::AtZp,
                TokenKind::AtRam,
                TokenKind::AtData,
                TokenKind::AtMap,
                TokenKind::AddressOf,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_stripped() {
        let (tokens, diags) = lex("a // line comment\nb /* block\ncomment */ c");
        assert!(!diags.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (_, diags) = lex("a /* never closed");
        assert!(diags.has_errors());
        assert_eq!(
            diags.items()[0].code,
            crate::diagnostics::DiagnosticCode::UnterminatedComment
        );
    }

    #[test]
    fn test_spans_are_monotonic() {
        let (tokens, _) = lex("let counter: word = $D020; // hw\nwhile (counter > 0) { }");
        for token in &tokens {
            assert!(
                token.span.start.offset <= token.span.end.offset,
                "token {:?} has inverted span",
                token
            );
        }
        // Tokens appear in buffer order
        for pair in tokens.windows(2) {
            assert!(pair[0].span.start.offset <= pair[1].span.start.offset);
        }
    }

    #[test]
    fn test_line_and_column_tracking() {
        let (tokens, _) = lex("a\n  b");
        assert_eq!(tokens[0].span.start.line, 1);
        assert_eq!(tokens[1].span.start.line, 2);
        assert_eq!(tokens[1].span.start.column, 3);
    }

    #[test]
    fn test_number_out_of_u32_range() {
        let (_, diags) = lex("99999999999");
        assert!(diags.has_errors());
        assert!(diags.items()[0].message.contains("out of range"));
    }
}
