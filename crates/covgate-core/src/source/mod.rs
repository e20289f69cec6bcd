//! Mapping zero-hit blocks back to the declarations that contain them.
//!
//! [`SourceMapper`] resolves a logical file name through a [`PathResolver`],
//! scans the file once into a [`DeclIndex`], and answers
//! [`SourceMapper::find_enclosing`] queries from that cached index for the
//! rest of the invocation.

pub mod decls;
pub mod lexer;
pub mod resolve;

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{CovError, CovResult};
use crate::profile::BlockRange;
use crate::text::{dedent, LineIndex};

pub use decls::{DeclIndex, DeclKind, Declaration};
pub use resolve::{ChainResolver, LocalResolver, ModuleResolver, PathResolver, StaticResolver};

/// Source text and declaration index of one scanned file.
#[derive(Debug)]
pub struct SourceFile {
    pub logical: String,
    pub text: String,
    pub lines: LineIndex,
    pub decls: DeclIndex,
}

impl SourceFile {
    /// Scan `text` as the contents of `logical`.
    pub fn parse(logical: &str, text: String) -> CovResult<Self> {
        let lines = LineIndex::new(&text);
        let decls = DeclIndex::build(&text).map_err(|e| CovError::SourceSyntax {
            file: logical.to_string(),
            line: lines.position(e.offset).0,
            message: e.message.to_string(),
        })?;
        Ok(SourceFile {
            logical: logical.to_string(),
            text,
            lines,
            decls,
        })
    }

    /// Full source lines `first..=last`, without the trailing newline.
    fn line_text(&self, first: u32, last: u32) -> &str {
        let start = self.lines.line_span(first).map(|(s, _)| s).unwrap_or(0);
        let end = self
            .lines
            .line_span(last)
            .map(|(_, e)| e)
            .unwrap_or(self.text.len());
        &self.text[start..end.max(start)]
    }
}

/// The declaration enclosing a block, ready for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationSpan {
    /// Logical file name, as written in the profile.
    pub file: String,
    pub kind: DeclKind,
    pub name: String,
    pub receiver: Option<String>,
    /// Byte offset of the declaration keyword; identifies the declaration
    /// within its file even when it shares a line with another.
    #[serde(skip)]
    pub start: usize,
    pub start_line: u32,
    pub end_line: u32,
    /// The declaration's full lines with common indentation removed.
    pub text: String,
    #[serde(skip)]
    pub comments: Vec<String>,
}

impl DeclarationSpan {
    /// `Receiver.Name` for methods, the plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{}.{}", receiver, self.name),
            None => self.name.clone(),
        }
    }
}

/// Resolves, reads and scans source files on demand, at most once each.
pub struct SourceMapper<'r> {
    resolver: &'r dyn PathResolver,
    cache: HashMap<String, Arc<SourceFile>>,
}

impl<'r> SourceMapper<'r> {
    pub fn new(resolver: &'r dyn PathResolver) -> Self {
        SourceMapper {
            resolver,
            cache: HashMap::new(),
        }
    }

    /// Number of files scanned so far.
    pub fn cached_files(&self) -> usize {
        self.cache.len()
    }

    /// Load (or fetch from cache) the scanned form of `logical`.
    pub fn file(&mut self, logical: &str) -> CovResult<Arc<SourceFile>> {
        if let Some(file) = self.cache.get(logical) {
            return Ok(Arc::clone(file));
        }

        let path = self
            .resolver
            .resolve(logical)
            .ok_or_else(|| CovError::SourceUnavailable {
                file: logical.to_string(),
                path: logical.into(),
                error: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no resolver knows this file",
                ),
            })?;
        let text = fs::read_to_string(&path).map_err(|error| CovError::SourceUnavailable {
            file: logical.to_string(),
            path: path.clone(),
            error,
        })?;

        let file = Arc::new(SourceFile::parse(logical, text)?);
        debug!(
            file = logical,
            path = %path.display(),
            declarations = file.decls.len(),
            "scanned source"
        );
        self.cache.insert(logical.to_string(), Arc::clone(&file));
        Ok(file)
    }

    /// The top-level declaration containing `range` in `logical`.
    pub fn find_enclosing(
        &mut self,
        logical: &str,
        range: &BlockRange,
    ) -> CovResult<DeclarationSpan> {
        let file = self.file(logical)?;
        let start = file.lines.offset(range.start.line, range.start.col);
        let end = file.lines.offset(range.end.line, range.end.col);

        let decl = file
            .decls
            .find_enclosing(start, end)
            .filter(|_| range.end.line <= file.lines.line_count().max(1))
            .ok_or_else(|| CovError::NoEnclosingDeclaration {
                file: logical.to_string(),
                range: *range,
            })?;

        Ok(DeclarationSpan {
            file: logical.to_string(),
            kind: decl.kind,
            name: decl.name.clone(),
            receiver: decl.receiver.clone(),
            start: decl.start,
            start_line: decl.start_line,
            end_line: decl.end_line,
            text: dedent(file.line_text(decl.start_line, decl.end_line)),
            comments: decl.comments.clone(),
        })
    }
}

impl std::fmt::Debug for SourceMapper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceMapper")
            .field("cached_files", &self.cache.len())
            .finish()
    }
}
