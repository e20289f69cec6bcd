//! A Go lexer that is just precise enough to find declaration boundaries.
//!
//! It distinguishes identifiers, keywords, literals, operators and brackets,
//! collects comments separately, and performs Go's automatic semicolon
//! insertion: a newline after an identifier, a literal, one of the keywords
//! `break`, `continue`, `fallthrough`, `return`, the operators `++` `--`, or a
//! closing `)` `]` `}` terminates the statement. Inserted semicolons are
//! emitted as zero-width [`TokenKind::Semi`] tokens.

use std::fmt;

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword,
    /// Number, string, raw string or rune literal.
    Literal,
    Operator,
    Open(char),
    Close(char),
    /// Explicit `;` or one inserted at a newline / end of input.
    Semi,
}

/// One token with its byte span in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == keyword
    }

    fn allows_semicolon(&self) -> bool {
        match self.kind {
            TokenKind::Ident | TokenKind::Literal | TokenKind::Close(_) => true,
            TokenKind::Keyword => matches!(
                self.text,
                "break" | "continue" | "fallthrough" | "return"
            ),
            TokenKind::Operator => matches!(self.text, "++" | "--"),
            TokenKind::Open(_) | TokenKind::Semi => false,
        }
    }
}

/// A `//` or `/* */` comment with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Output of [`tokenize`].
#[derive(Debug, Default)]
pub struct Lexed<'a> {
    pub tokens: Vec<Token<'a>>,
    pub comments: Vec<Comment<'a>>,
}

/// A lexing failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub offset: usize,
    pub message: &'static str,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl std::error::Error for LexError {}

const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Longest-first operator table.
const OPERATORS: &[&str] = &[
    "&^=", "<<=", ">>=", "...", "&&", "||", "<-", "++", "--", "==", "!=", "<=", ">=", ":=", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "&^", "~",
];

/// Tokenize Go source text.
pub fn tokenize(src: &str) -> Result<Lexed<'_>, LexError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: Lexed<'a>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            out: Lexed::default(),
        }
    }

    fn run(mut self) -> Result<Lexed<'a>, LexError> {
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'\n' => {
                    self.insert_semicolon(self.pos);
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | b'\x0c' => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.block_comment()?,
                b'"' => self.interpreted_string()?,
                b'`' => self.raw_string()?,
                b'\'' => self.rune()?,
                b'0'..=b'9' => self.number(),
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
                b'(' | b'[' | b'{' => self.single(TokenKind::Open(b as char)),
                b')' | b']' | b'}' => self.single(TokenKind::Close(b as char)),
                b';' => self.single(TokenKind::Semi),
                _ if is_ident_start(self.current_char()) => self.identifier(),
                _ => self.operator(),
            }
        }
        self.insert_semicolon(self.pos);
        Ok(self.out)
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn current_char(&self) -> char {
        self.src[self.pos..].chars().next().unwrap_or('\0')
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.out.tokens.push(Token {
            kind,
            text: &self.src[start..end],
            start,
            end,
        });
    }

    fn single(&mut self, kind: TokenKind) {
        self.push(kind, self.pos, self.pos + 1);
        self.pos += 1;
    }

    fn insert_semicolon(&mut self, at: usize) {
        if self.out.tokens.last().is_some_and(Token::allows_semicolon) {
            self.push(TokenKind::Semi, at, at);
        }
    }

    fn line_comment(&mut self) {
        let start = self.pos;
        let end = self.src[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.src.len());
        self.out.comments.push(Comment {
            text: &self.src[start..end],
            start,
            end,
        });
        self.pos = end;
    }

    fn block_comment(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let close = self.src[start + 2..]
            .find("*/")
            .ok_or(LexError {
                offset: start,
                message: "unterminated block comment",
            })?;
        let end = start + 2 + close + 2;
        let text = &self.src[start..end];
        if text.contains('\n') {
            self.insert_semicolon(start);
        }
        self.out.comments.push(Comment { text, start, end });
        self.pos = end;
        Ok(())
    }

    fn interpreted_string(&mut self) -> Result<(), LexError> {
        self.quoted(b'"', "unterminated string literal")
    }

    fn rune(&mut self) -> Result<(), LexError> {
        self.quoted(b'\'', "unterminated rune literal")
    }

    fn quoted(&mut self, quote: u8, message: &'static str) -> Result<(), LexError> {
        let start = self.pos;
        let mut i = start + 1;
        loop {
            match self.bytes.get(i) {
                Some(b'\\') => i += 2,
                Some(&c) if c == quote => break,
                Some(b'\n') | None => {
                    return Err(LexError {
                        offset: start,
                        message,
                    })
                }
                Some(_) => i += 1,
            }
        }
        self.push(TokenKind::Literal, start, i + 1);
        self.pos = i + 1;
        Ok(())
    }

    fn raw_string(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let close = self.src[start + 1..].find('`').ok_or(LexError {
            offset: start,
            message: "unterminated raw string literal",
        })?;
        let end = start + 1 + close + 1;
        self.push(TokenKind::Literal, start, end);
        self.pos = end;
        Ok(())
    }

    fn number(&mut self) {
        let start = self.pos;
        let hex = self.src[start..].starts_with("0x") || self.src[start..].starts_with("0X");
        let mut i = start;
        while let Some(&c) = self.bytes.get(i) {
            let exponent_sign = (c == b'+' || c == b'-')
                && i > start
                && matches!(
                    (hex, self.bytes[i - 1]),
                    (false, b'e' | b'E') | (true, b'p' | b'P')
                );
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || exponent_sign {
                i += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Literal, start, i);
        self.pos = i;
    }

    fn identifier(&mut self) {
        let start = self.pos;
        let end = self.src[start..]
            .char_indices()
            .find(|&(_, c)| !is_ident_continue(c))
            .map(|(i, _)| start + i)
            .unwrap_or(self.src.len());
        let text = &self.src[start..end];
        let kind = if KEYWORDS.contains(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Ident
        };
        self.push(kind, start, end);
        self.pos = end;
    }

    fn operator(&mut self) {
        let rest = &self.src[self.pos..];
        let len = OPERATORS
            .iter()
            .find(|op| rest.starts_with(*op))
            .map(|op| op.len())
            .unwrap_or_else(|| self.current_char().len_utf8());
        self.push(TokenKind::Operator, self.pos, self.pos + len);
        self.pos += len;
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}
