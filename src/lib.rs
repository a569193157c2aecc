//! Compiler for the smart playlist query language.
//!
//! A definition such as
//!
//! ```text
//! smart playlist "Recent rock" {
//!     genre is "Rock" and time_added is in the last 2 weeks
//!     order by artist, album desc
//!     limit 100
//! }
//! ```
//!
//! goes through [`lexer`], [`parser`] and [`sql_compiler`] and comes out as
//! SQLite WHERE, HAVING and ORDER BY fragments plus a row limit.
//!
//! ```
//! use smartpl::{compile, catalog::FieldCatalog, library::NoPlaylists};
//!
//! let catalog = FieldCatalog::media_library();
//! let compiled = compile(r#"smart playlist "X" { genre is "Rock" }"#, &catalog, &NoPlaylists)?;
//! assert_eq!(compiled.where_clause, "f.genre = 'Rock'");
//! # Ok::<(), smartpl::CompileError>(())
//! ```

pub mod ast;
pub mod catalog;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod sql_compiler;
pub mod token;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::ast::Playlist;
use crate::catalog::FieldCatalog;
use crate::lexer::LexError;
use crate::library::{NoPlaylists, PlaylistResolver};
use crate::parser::SyntaxError;
use crate::sql_compiler::SqlCompiler;

pub use crate::sql_compiler::{CompiledPlaylist, SemanticError, StatementError};

/// Any failure between source text and SQL.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Byte offset into the source that the error points at, when there is one.
    pub fn position(&self) -> Option<usize> {
        match self {
            CompileError::Lex(e) => Some(e.position),
            CompileError::Syntax(e) => Some(e.span.start),
            CompileError::Semantic(e) => e.span().map(|span| span.start),
            CompileError::Io { .. } => None,
        }
    }

    /// The error prefixed with its `line:column` in `source`.
    pub fn render(&self, source: &str) -> String {
        match self.position() {
            Some(offset) => {
                let (line, column) = token::line_col(source, offset);
                format!("{}:{}: {}", line, column, self)
            }
            None => self.to_string(),
        }
    }
}

/// Tokenizes and parses a definition without compiling it.
pub fn parse_str(input: &str) -> Result<Playlist, CompileError> {
    let tokens = lexer::tokenize(input)?;
    let playlist = parser::parse(&tokens)?;
    Ok(playlist)
}

/// Compiles one smart playlist definition.
pub fn compile(
    input: &str,
    catalog: &FieldCatalog,
    resolver: &dyn PlaylistResolver,
) -> Result<CompiledPlaylist, CompileError> {
    let playlist = parse_str(input)?;
    debug!(
        title = %playlist.title,
        nodes = playlist.arena.len(),
        "parsed smart playlist"
    );

    let compiled = SqlCompiler::new(catalog, resolver).compile(&playlist)?;
    debug!(
        title = %compiled.title,
        where_clause = %compiled.where_clause,
        having_clause = ?compiled.having_clause,
        order_clause = ?compiled.order_clause,
        limit = ?compiled.limit,
        "compiled smart playlist"
    );
    Ok(compiled)
}

/// Reads and compiles a `.smartpl` file.
pub fn compile_file<P: AsRef<Path>>(
    path: P,
    catalog: &FieldCatalog,
    resolver: &dyn PlaylistResolver,
) -> Result<CompiledPlaylist, CompileError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    compile(&source, catalog, resolver)
}

/// A catalog and resolver bundled for compiling many playlists.
#[derive(Debug, Clone)]
pub struct Compiler<R = NoPlaylists> {
    catalog: FieldCatalog,
    resolver: R,
}

impl Compiler<NoPlaylists> {
    pub fn new(catalog: FieldCatalog) -> Self {
        Self {
            catalog,
            resolver: NoPlaylists,
        }
    }
}

impl Default for Compiler<NoPlaylists> {
    fn default() -> Self {
        Self::new(FieldCatalog::media_library())
    }
}

impl<R: PlaylistResolver> Compiler<R> {
    pub fn with_resolver<S: PlaylistResolver>(self, resolver: S) -> Compiler<S> {
        Compiler {
            catalog: self.catalog,
            resolver,
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn compile(&self, input: &str) -> Result<CompiledPlaylist, CompileError> {
        compile(input, &self.catalog, &self.resolver)
    }

    pub fn compile_file<P: AsRef<Path>>(&self, path: P) -> Result<CompiledPlaylist, CompileError> {
        compile_file(path, &self.catalog, &self.resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::PlaylistLibrary;

    #[test]
    fn test_errors_carry_their_stage() {
        let catalog = FieldCatalog::media_library();
        let lex = compile("smart playlist \"x\" { genre is @ }", &catalog, &NoPlaylists);
        assert!(matches!(lex, Err(CompileError::Lex(_))));

        let syntax = compile("smart playlist \"x\" { genre is }", &catalog, &NoPlaylists);
        assert!(matches!(syntax, Err(CompileError::Syntax(_))));

        let semantic = compile("smart playlist \"x\" { mood is \"sad\" }", &catalog, &NoPlaylists);
        assert!(matches!(semantic, Err(CompileError::Semantic(_))));
    }

    #[test]
    fn test_render_points_at_line_and_column() {
        let source = "smart playlist \"x\" {\n    mood is \"sad\"\n}";
        let err = compile(source, &FieldCatalog::media_library(), &NoPlaylists).unwrap_err();
        assert_eq!(err.position(), Some(25));
        assert_eq!(err.render(source), "2:5: unknown field `mood`");
    }

    #[test]
    fn test_compile_missing_file() {
        let err = Compiler::default().compile_file("missing.smartpl").unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
        assert_eq!(err.position(), None);
    }

    #[test]
    fn test_compiler_with_library() {
        let mut library = PlaylistLibrary::new();
        library
            .insert(r#"smart playlist "Loved" { rating >= 80 }"#)
            .unwrap();
        let compiler = Compiler::default().with_resolver(library);
        let compiled = compiler
            .compile(r#"smart playlist "x" { in playlist "Loved" or play_count > 100 }"#)
            .unwrap();
        assert_eq!(compiled.where_clause, "(f.rating >= 80) OR f.play_count > 100");
        assert_eq!(compiler.resolver().len(), 1);
    }
}
