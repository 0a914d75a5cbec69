//! The recursive-descent parser.
//!
//! One [`Parser`] instance per translation unit. The submodules split the
//! grammar by domain:
//!
//! - [`expr`] — expressions, embedded strings, argument lists
//! - [`stmt`] — code bodies, statements, lexical scopes
//! - [`program`] — the top-level dispatch loop and simple declarations
//! - [`object`] — object bodies, modify/replace, nesting, finalization
//! - [`template`] — object/string template definitions and matching
//! - [`propset`] — propertyset stacks and token-stream rewriting
//! - [`grammar`] — grammar productions

mod expr;
mod grammar;
mod object;
mod program;
mod propset;
mod stmt;
mod template;

#[cfg(test)]
mod tests;

pub use propset::PropSetDef;

use crate::ast::{ObjStmtId, Program, TopStmt};
use crate::stream::TokenCursor;
use crate::symtab::{
    PropertySym, StringTemplate, SymId, SymKind, Symbol, SymbolTable, Template,
};
use crate::token::{Token, TokenKind};
use std::collections::HashMap;
use tadsc_base::{Arena, ErrorCode, ErrorSink, Fatal, Interner, NameId, Result, SourcePos};

/// Termination-info record for the unterminated-object heuristic: the
/// source location of the outermost object's first token, and the flag the
/// property parser raises when it finds evidence of a new top-level
/// definition.
#[derive(Clone, Copy, Debug, Default)]
pub struct TermInfo {
    pub pos: SourcePos,
    pub unterm: bool,
}

/// Saved per-body state, restored when a nested code body finishes.
pub(crate) struct BodyState {
    pub(crate) scopes_depth: usize,
    pub(crate) next_local: u32,
    pub(crate) max_locals: u32,
    pub(crate) self_ref: bool,
    pub(crate) has_ret: bool,
    pub(crate) full_ctx: bool,
}

pub struct Parser<'a, 'i> {
    pub(crate) arena: &'a Arena,
    pub interner: &'i mut Interner,
    pub(crate) cursor: TokenCursor,
    pub symtab: SymbolTable,
    pub program: Program<'a>,
    pub diags: ErrorSink,

    /// Resynchronization suppression: set after an unrecognized top-level
    /// token so a run of garbage produces one error, not one per token.
    pub(crate) suppress_error: bool,
    /// `+` location stack: slot *d* holds the most recent top-level
    /// non-nested object at depth *d*.
    pub(crate) plus_stack: Vec<Option<ObjStmtId>>,
    /// Templates attached to the anonymous root object.
    pub(crate) root_templates: Vec<Template>,
    pub string_templates: Vec<StringTemplate>,
    /// Top-level statements produced while inside another statement
    /// (nested objects); drained into the program after the current
    /// statement completes.
    pub(crate) nested_tops: Vec<TopStmt>,

    pub(crate) src_order_idx: i64,
    pub(crate) src_group_mode: bool,
    pub(crate) src_group_obj: Option<SymId>,
    pub(crate) self_valid: bool,
    pub(crate) mod_shadow_count: u32,

    // lexical scope state for the code body currently being parsed
    pub(crate) scopes: Vec<HashMap<NameId, u32>>,
    pub(crate) next_local: u32,
    pub(crate) max_locals: u32,
    pub(crate) cur_body_self_ref: bool,
    pub(crate) cur_body_has_ret: bool,
    pub(crate) cur_body_full_ctx: bool,

    // well-known names
    pub(crate) n_lexical_parent: NameId,
    pub(crate) n_source_text_order: NameId,
    pub(crate) n_source_text_group: NameId,
    pub(crate) n_construct: NameId,
    pub(crate) n_grammar_info: NameId,
    pub(crate) n_grammar_tag: NameId,
    pub(crate) n_token: NameId,
    pub(crate) n_badness: NameId,
}

impl<'a, 'i> Parser<'a, 'i> {
    pub fn new(arena: &'a Arena, interner: &'i mut Interner, tokens: Vec<Token>) -> Self {
        let n_lexical_parent = interner.intern("lexicalParent");
        let n_source_text_order = interner.intern("sourceTextOrder");
        let n_source_text_group = interner.intern("sourceTextGroup");
        let n_construct = interner.intern("construct");
        let n_grammar_info = interner.intern("grammarInfo");
        let n_grammar_tag = interner.intern("grammarTag");
        let n_token = interner.intern("token");
        let n_badness = interner.intern("badness");
        Parser {
            arena,
            interner,
            cursor: TokenCursor::new(tokens),
            symtab: SymbolTable::new(),
            program: Program::new(),
            diags: ErrorSink::new(),
            suppress_error: false,
            plus_stack: Vec::new(),
            root_templates: Vec::new(),
            string_templates: Vec::new(),
            nested_tops: Vec::new(),
            src_order_idx: 1,
            src_group_mode: false,
            src_group_obj: None,
            self_valid: false,
            mod_shadow_count: 0,
            scopes: Vec::new(),
            next_local: 0,
            max_locals: 0,
            cur_body_self_ref: false,
            cur_body_has_ret: false,
            cur_body_full_ctx: false,
            n_lexical_parent,
            n_source_text_order,
            n_source_text_group,
            n_construct,
            n_grammar_info,
            n_grammar_tag,
            n_token,
            n_badness,
        }
    }

    /// Turns sourceTextGroup generation on or off.
    pub fn set_source_text_group_mode(&mut self, on: bool) {
        self.src_group_mode = on;
    }

    // ----- cursor helpers -------------------------------------------------

    pub(crate) fn kind(&self) -> TokenKind {
        self.cursor.kind()
    }

    pub(crate) fn pos(&self) -> SourcePos {
        let p = self.cursor.cur().pos;
        if p.is_none() {
            self.cursor.last_pos()
        } else {
            p
        }
    }

    pub(crate) fn advance(&mut self) -> TokenKind {
        self.cursor.next().kind
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.cursor.kind() == kind
    }

    /// Consumes the current token if it matches.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Current identifier payload, if the current token is one.
    pub(crate) fn cur_sym(&self) -> Option<NameId> {
        self.cursor.kind().sym()
    }

    /// Renders the current token for an error message.
    pub(crate) fn describe_cur(&self) -> String {
        match self.cursor.kind() {
            TokenKind::Sym(n) => format!("'{}'", self.interner.resolve(n)),
            TokenKind::Int(v) => format!("'{v}'"),
            other => other.describe().to_string(),
        }
    }

    // ----- diagnostics ----------------------------------------------------

    pub(crate) fn log(&mut self, code: ErrorCode, msg: impl Into<String>) {
        let pos = self.pos();
        self.diags.log(code, pos, msg);
    }

    pub(crate) fn log_at(&mut self, code: ErrorCode, pos: SourcePos, msg: impl Into<String>) {
        self.diags.log(code, pos, msg);
    }

    /// Logs an end-of-file mid-construct and returns the fatal sentinel.
    pub(crate) fn fatal_eof(&mut self) -> Fatal {
        self.log(ErrorCode::UnexpectedEof, "unexpected end of file");
        Fatal
    }

    // ----- recovery -------------------------------------------------------

    /// Requires and consumes a `;`. On anything else, logs the error and
    /// skips ahead to the next `;` (consumed) or brace (left in place).
    pub(crate) fn parse_req_sem(&mut self) -> Result<()> {
        if self.eat(TokenKind::Semi) {
            return Ok(());
        }
        let found = self.describe_cur();
        self.log(ErrorCode::ExpectedSemi, format!("expected ';', found {found}"));
        self.skip_to_sem()
    }

    /// Skips to the next `;` (consuming it), stopping short at braces.
    pub(crate) fn skip_to_sem(&mut self) -> Result<()> {
        loop {
            match self.kind() {
                TokenKind::Semi => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::LBrace | TokenKind::RBrace => return Ok(()),
                TokenKind::Eof => return Err(self.fatal_eof()),
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ----- symbol helpers -------------------------------------------------

    /// Looks up a property symbol, adding it if undefined; logs (when
    /// `show_err`) and returns `None` if the name is bound to another kind.
    pub(crate) fn look_up_prop(&mut self, name: NameId, show_err: bool) -> Option<SymId> {
        if let Some(id) = self.symtab.find(name) {
            match &self.symtab.sym(id).kind {
                SymKind::Property(_) => Some(id),
                other => {
                    if show_err {
                        let text = self.interner.resolve(name).to_string();
                        let what = other.describe();
                        self.log(
                            ErrorCode::RedefAsProp,
                            format!("'{text}' is already defined as {what}; cannot use it as a property"),
                        );
                    }
                    None
                }
            }
        } else {
            let prop_id = self.symtab.new_prop_id();
            let mut sym = Symbol::new(
                name,
                self.pos(),
                SymKind::Property(PropertySym {
                    prop_id,
                    vocab: false,
                    weak: false,
                }),
            );
            sym.referenced = true;
            let id = self.symtab.add(sym).unwrap_or_else(|e| e);
            Some(id)
        }
    }

    /// Drains pending nested statements into the top-level list.
    pub(crate) fn flush_nested_tops(&mut self) {
        let pending = std::mem::take(&mut self.nested_tops);
        self.program.tops.extend(pending);
    }

    /// End-of-parse finalization: merge per-object vocabulary into the
    /// dictionaries.
    pub fn finish(&mut self) {
        self.symtab.build_dictionaries(self.interner);
    }
}
