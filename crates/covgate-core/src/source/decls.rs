//! Index of top-level Go declarations.
//!
//! A declaration runs from its leading keyword to the last token before the
//! semicolon that terminates it at bracket depth zero. Method receivers and
//! grouped `var (...)`/`const (...)`/`type (...)` specs are recognized so that
//! every declaration carries a readable name.

use std::fmt;

use serde::Serialize;

use super::lexer::{tokenize, Comment, LexError, Token, TokenKind};
use crate::text::LineIndex;

/// Kind of a top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Func,
    Method,
    Var,
    Const,
    Type,
    Import,
}

impl DeclKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "func" => Some(DeclKind::Func),
            "var" => Some(DeclKind::Var),
            "const" => Some(DeclKind::Const),
            "type" => Some(DeclKind::Type),
            "import" => Some(DeclKind::Import),
            _ => None,
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeclKind::Func => "func",
            DeclKind::Method => "method",
            DeclKind::Var => "var",
            DeclKind::Const => "const",
            DeclKind::Type => "type",
            DeclKind::Import => "import",
        };
        f.write_str(s)
    }
}

/// One top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclKind,
    /// Declared name; grouped specs are joined with ", ".
    pub name: String,
    /// Receiver base type for methods.
    pub receiver: Option<String>,
    /// Byte offset of the leading keyword.
    pub start: usize,
    /// Byte offset just past the last token.
    pub end: usize,
    pub start_line: u32,
    pub end_line: u32,
    /// Comments inside the declaration plus its doc comment group.
    pub comments: Vec<String>,
}

impl Declaration {
    /// `Receiver.Name` for methods, the plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{}.{}", receiver, self.name),
            None => self.name.clone(),
        }
    }

    pub fn contains(&self, start: usize, end: usize) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Declaration boundaries of one source file, sorted by start offset.
#[derive(Debug, Clone, Default)]
pub struct DeclIndex {
    decls: Vec<Declaration>,
}

impl DeclIndex {
    /// Scan `src` and index its top-level declarations.
    pub fn build(src: &str) -> Result<Self, LexError> {
        let lexed = tokenize(src)?;
        let lines = LineIndex::new(src);
        let tokens = &lexed.tokens;

        let mut decls = Vec::new();
        let mut prev_end = 0usize;
        let mut i = 0usize;
        while i < tokens.len() {
            let tok = tokens[i];
            let kind = match tok.kind {
                TokenKind::Keyword => DeclKind::from_keyword(tok.text),
                _ => None,
            };
            let Some(kind) = kind else {
                // package clause, stray semicolons
                let stop = statement_end(tokens, i);
                if let Some(last) = last_real(tokens, i, stop) {
                    prev_end = last.end;
                }
                i = stop + 1;
                continue;
            };

            let stop = statement_end(tokens, i);
            let body = &tokens[i..stop];
            let Some(last) = last_real(tokens, i, stop) else {
                i = stop + 1;
                continue;
            };
            let (kind, name, receiver) = describe(kind, body);

            let start = tok.start;
            let end = last.end;
            let start_line = lines.position(start).0;
            let end_line = lines.position(end.saturating_sub(1).max(start)).0;

            let mut comments = doc_comments(&lexed.comments, &lines, prev_end, start);
            comments.extend(
                lexed
                    .comments
                    .iter()
                    .filter(|c| c.start >= start && lines.position(c.start).0 <= end_line)
                    .map(|c| c.text.to_string()),
            );

            decls.push(Declaration {
                kind,
                name,
                receiver,
                start,
                end,
                start_line,
                end_line,
                comments,
            });
            prev_end = end;
            i = stop + 1;
        }

        Ok(DeclIndex { decls })
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.decls
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// The declaration containing the byte range `[start, end)`.
    pub fn find_enclosing(&self, start: usize, end: usize) -> Option<&Declaration> {
        let idx = self.decls.partition_point(|d| d.start <= start);
        idx.checked_sub(1)
            .map(|i| &self.decls[i])
            .filter(|d| d.contains(start, end))
    }
}

/// Index of the semicolon ending the statement that begins at `from`, or
/// `tokens.len()` when input ends first.
fn statement_end(tokens: &[Token<'_>], from: usize) -> usize {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Semi if depth == 0 => return i,
            _ => {}
        }
    }
    tokens.len()
}

fn last_real<'a>(tokens: &[Token<'a>], from: usize, stop: usize) -> Option<Token<'a>> {
    tokens[from..stop]
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Semi)
        .copied()
}

fn describe(kind: DeclKind, body: &[Token<'_>]) -> (DeclKind, String, Option<String>) {
    match kind {
        DeclKind::Func => describe_func(body),
        DeclKind::Import => (kind, "import".to_string(), None),
        _ => (kind, spec_names(&body[1..]), None),
    }
}

fn describe_func(body: &[Token<'_>]) -> (DeclKind, String, Option<String>) {
    match body.get(1) {
        Some(t) if t.kind == TokenKind::Open('(') => {
            let close = matching_close(body, 1);
            let receiver = receiver_type(&body[2..close]);
            let name = body
                .get(close + 1)
                .filter(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text.to_string())
                .unwrap_or_default();
            (DeclKind::Method, name, receiver)
        }
        Some(t) if t.kind == TokenKind::Ident => (DeclKind::Func, t.text.to_string(), None),
        _ => (DeclKind::Func, String::new(), None),
    }
}

/// Base type named in a receiver list: `s *Server` and `l *List[T]` both
/// yield the last identifier outside type-parameter brackets.
fn receiver_type(params: &[Token<'_>]) -> Option<String> {
    let mut depth = 0usize;
    let mut found = None;
    for tok in params {
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Ident if depth == 0 => found = Some(tok.text),
            _ => {}
        }
    }
    found.map(str::to_string)
}

/// Names introduced by a `var`/`const`/`type` declaration, without its keyword.
fn spec_names(rest: &[Token<'_>]) -> String {
    match rest.first() {
        Some(t) if t.kind == TokenKind::Open('(') => {
            let close = matching_close(rest, 0);
            let mut names = Vec::new();
            let mut at_spec_start = true;
            let mut depth = 0usize;
            for tok in &rest[1..close] {
                match tok.kind {
                    TokenKind::Open(_) => depth += 1,
                    TokenKind::Close(_) => depth = depth.saturating_sub(1),
                    TokenKind::Semi if depth == 0 => {
                        at_spec_start = true;
                        continue;
                    }
                    TokenKind::Ident if depth == 0 && at_spec_start => {
                        names.push(tok.text);
                    }
                    _ => {}
                }
                at_spec_start = false;
            }
            names.join(", ")
        }
        _ => leading_idents(rest).join(", "),
    }
}

/// `a, b, c` at the start of a spec.
fn leading_idents<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
    let mut names = Vec::new();
    let mut expect_ident = true;
    for tok in tokens {
        match (expect_ident, tok.kind, tok.text) {
            (true, TokenKind::Ident, text) => {
                names.push(text);
                expect_ident = false;
            }
            (false, TokenKind::Operator, ",") => expect_ident = true,
            _ => break,
        }
    }
    names
}

/// Index (relative to `tokens`) of the bracket closing the one at `open`.
fn matching_close(tokens: &[Token<'_>], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// The comment group ending on the line directly above `decl_start`.
fn doc_comments(
    comments: &[Comment<'_>],
    lines: &LineIndex,
    prev_end: usize,
    decl_start: usize,
) -> Vec<String> {
    let prev_line = if prev_end == 0 {
        0
    } else {
        lines.position(prev_end).0
    };
    let mut top_line = lines.position(decl_start).0;
    let mut group = Vec::new();
    for comment in comments.iter().rev().filter(|c| c.end <= decl_start) {
        let (first, _) = lines.position(comment.start);
        let (last, _) = lines.position(comment.end.saturating_sub(1));
        if last + 1 != top_line || first <= prev_line || comment.start < prev_end {
            break;
        }
        group.push(comment.text.to_string());
        top_line = first;
    }
    group.reverse();
    group
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "package a\n\t\t\n\t\t\tfunc Foo(i int) int {\n\t\t\t\ti++ // 1\n\t\t\t\treturn i\n\t\t\t}\n\t\t\t\n\t\t\tfunc Bar(i int) int {\n\t\t\t\ti++ // 0\n\t\t\t\treturn i\n\t\t\t}\n\t\t";

    fn names(index: &DeclIndex) -> Vec<(DeclKind, String)> {
        index
            .declarations()
            .iter()
            .map(|d| (d.kind, d.qualified_name()))
            .collect()
    }

    mod boundaries {
        use super::*;

        #[test]
        fn functions_span_keyword_to_closing_brace() {
            let index = DeclIndex::build(SCENARIO).unwrap();
            let decls = index.declarations();
            assert_eq!(decls.len(), 2);
            assert_eq!((decls[0].start_line, decls[0].end_line), (3, 6));
            assert_eq!((decls[1].start_line, decls[1].end_line), (8, 11));
            assert_eq!(
                SCENARIO[decls[1].start..decls[1].end].lines().next(),
                Some("func Bar(i int) int {")
            );
            assert!(SCENARIO[..decls[1].end].ends_with('}'));
        }

        #[test]
        fn enclosing_lookup_by_offsets() {
            let index = DeclIndex::build(SCENARIO).unwrap();
            let lines = LineIndex::new(SCENARIO);
            let start = lines.offset(8, 24);
            let end = lines.offset(11, 5);
            let decl = index.find_enclosing(start, end).unwrap();
            assert_eq!(decl.name, "Bar");
        }

        #[test]
        fn range_between_declarations_has_no_enclosing() {
            let index = DeclIndex::build(SCENARIO).unwrap();
            let lines = LineIndex::new(SCENARIO);
            assert!(index
                .find_enclosing(lines.offset(7, 1), lines.offset(7, 2))
                .is_none());
        }

        #[test]
        fn range_spilling_past_declaration_has_no_enclosing() {
            let index = DeclIndex::build(SCENARIO).unwrap();
            let lines = LineIndex::new(SCENARIO);
            assert!(index
                .find_enclosing(lines.offset(3, 24), lines.offset(9, 1))
                .is_none());
        }

        #[test]
        fn nested_closures_stay_in_one_declaration() {
            let src = "package p\n\nfunc f() {\n\tg := func() {\n\t\tif true {\n\t\t}\n\t}\n\tg()\n}\n\nvar x = 1\n";
            let index = DeclIndex::build(src).unwrap();
            let decls = index.declarations();
            assert_eq!(decls.len(), 2);
            assert_eq!((decls[0].start_line, decls[0].end_line), (3, 9));
            assert_eq!((decls[1].start_line, decls[1].end_line), (11, 11));
        }

        #[test]
        fn function_literal_in_var_is_enclosed_by_var() {
            let src = "package p\n\nvar handler = func() {\n\tprintln(1)\n}\n";
            let index = DeclIndex::build(src).unwrap();
            let lines = LineIndex::new(src);
            let decl = index
                .find_enclosing(lines.offset(3, 22), lines.offset(5, 2))
                .unwrap();
            assert_eq!(decl.kind, DeclKind::Var);
            assert_eq!(decl.name, "handler");
        }
    }

    mod naming {
        use super::*;

        #[test]
        fn methods_carry_receiver_type() {
            let src = "package p\n\nfunc (s *Server) Start() error {\n\treturn nil\n}\n\nfunc (Server) Stop() {}\n";
            let index = DeclIndex::build(src).unwrap();
            assert_eq!(
                names(&index),
                vec![
                    (DeclKind::Method, "Server.Start".to_string()),
                    (DeclKind::Method, "Server.Stop".to_string()),
                ]
            );
        }

        #[test]
        fn generic_receiver_uses_base_type() {
            let src = "package p\n\nfunc (l *List[T]) Push(v T) {}\n";
            let index = DeclIndex::build(src).unwrap();
            assert_eq!(names(&index), vec![(DeclKind::Method, "List.Push".to_string())]);
        }

        #[test]
        fn grouped_specs_join_names() {
            let src = "package p\n\nconst (\n\tA = iota\n\tB\n\tC\n)\n\nvar x, y int\n\ntype T struct {\n\tf int\n}\n";
            let index = DeclIndex::build(src).unwrap();
            assert_eq!(
                names(&index),
                vec![
                    (DeclKind::Const, "A, B, C".to_string()),
                    (DeclKind::Var, "x, y".to_string()),
                    (DeclKind::Type, "T".to_string()),
                ]
            );
        }

        #[test]
        fn imports_are_indexed() {
            let src = "package p\n\nimport (\n\t\"fmt\"\n)\n\nfunc f() { fmt.Println() }\n";
            let index = DeclIndex::build(src).unwrap();
            assert_eq!(index.declarations()[0].kind, DeclKind::Import);
            assert_eq!(index.declarations()[1].name, "f");
        }
    }

    mod comments {
        use super::*;

        #[test]
        fn doc_comment_group_is_attached() {
            let src = "package p\n\n// Helper does things.\n// notest\nfunc Helper() {}\n";
            let index = DeclIndex::build(src).unwrap();
            assert_eq!(
                index.declarations()[0].comments,
                vec!["// Helper does things.", "// notest"]
            );
        }

        #[test]
        fn comment_separated_by_blank_line_is_not_doc() {
            let src = "package p\n\n// stray\n\nfunc f() {}\n";
            let index = DeclIndex::build(src).unwrap();
            assert!(index.declarations()[0].comments.is_empty());
        }

        #[test]
        fn trailing_comment_of_previous_declaration_is_not_doc() {
            let src = "package p\n\nvar x = 1 // notest\nfunc f() {}\n";
            let index = DeclIndex::build(src).unwrap();
            let decls = index.declarations();
            assert_eq!(decls[0].comments, vec!["// notest"]);
            assert!(decls[1].comments.is_empty());
        }

        #[test]
        fn body_comments_are_collected() {
            let index = DeclIndex::build(SCENARIO).unwrap();
            assert_eq!(index.declarations()[1].comments, vec!["// 0"]);
        }
    }

    #[test]
    fn lex_errors_propagate() {
        assert!(DeclIndex::build("package p\nvar s = \"open\n").is_err());
    }
}
