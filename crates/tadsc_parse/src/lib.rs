//! # tadsc-parse
//!
//! The TADS 3 compiler front end: program-level parser, symbol table, and
//! object-model builder. One forward pass over the token stream, with
//! forward references installed as `external` symbols and upgraded in
//! place when their definitions arrive.
//!
//! The pieces:
//!
//! - [`token`] / [`lexer`] — the lexical vocabulary and its scanner
//! - [`stream`] — the token-source adapter (lookahead, pushback, source
//!   stack)
//! - [`symtab`] — the global symbol table and its registries
//! - [`ast`] — the IR: arena expression/statement trees, object
//!   statements, code bodies
//! - [`parser`] — recursive descent over all of the above
//! - [`fold`] — the constant-folding pass
//!
//! # Example
//!
//! ```
//! use tadsc_base::{Arena, ErrorSink, FileId, Interner};
//! use tadsc_parse::{lexer::Lexer, parser::Parser};
//!
//! let source = "class Thing: object; rock: Thing;";
//! let arena = Arena::new();
//! let mut interner = Interner::new();
//! let mut sink = ErrorSink::new();
//! let tokens = Lexer::new(source, FileId(0), &mut interner).tokenize(&mut sink);
//!
//! let mut parser = Parser::new(&arena, &mut interner, tokens);
//! parser.parse_top();
//! assert!(!parser.diags.has_errors());
//! // Thing, rock, and the auto-generated sourceTextOrder property
//! assert_eq!(parser.symtab.len(), 3);
//! ```

pub mod ast;
pub mod fold;
pub mod lexer;
pub mod parser;
pub mod stream;
pub mod symtab;
pub mod token;

pub use lexer::Lexer;
pub use parser::Parser;
pub use symtab::{SymId, SymbolTable};
pub use token::{Token, TokenKind};

use tadsc_base::{Arena, ErrorSink, FileId, Interner};

/// Lexes and parses one source string as a full translation unit. Lexical
/// diagnostics are merged into the parser's sink.
pub fn parse_source<'a, 'i>(
    arena: &'a Arena,
    interner: &'i mut Interner,
    file: FileId,
    src: &str,
) -> Parser<'a, 'i> {
    let mut lex_sink = ErrorSink::new();
    let tokens = Lexer::new(src, file, &mut *interner).tokenize(&mut lex_sink);
    let mut parser = Parser::new(arena, interner, tokens);
    for d in lex_sink.diagnostics() {
        parser.diags.report(d.clone());
    }
    parser.parse_top();
    parser
}
