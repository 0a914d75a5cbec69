//! Propertyset expansion.
//!
//! A `propertyset 'pattern' (formals) { ... }` block batches a name
//! pattern and a formal-parameter skeleton over the property definitions
//! inside it. Property names are expanded through the pattern stack
//! innermost-first; method formal lists are synthesized by splicing each
//! level's formals around its `*` and feeding the result to the parser
//! through a pushed token source.

use super::Parser;
use crate::stream::VecTokenSource;
use crate::token::{Token, TokenKind};
use tadsc_base::{ErrorCode, NameId, Result};

/// Maximum propertyset nesting depth.
pub const MAX_PROPSET_DEPTH: usize = 10;

/// One propertyset level: the name pattern and the raw formal-list tokens
/// (including commas and the `*`).
#[derive(Clone, Debug, Default)]
pub struct PropSetDef {
    pub pattern: String,
    pub formal_toks: Vec<Token>,
}

impl<'a, 'i> Parser<'a, 'i> {
    /// Parses `propertyset 'pattern' (formals)? {`, pushing one level.
    pub(crate) fn parse_propertyset_header(
        &mut self,
        stack: &mut Vec<PropSetDef>,
    ) -> Result<()> {
        if stack.len() == MAX_PROPSET_DEPTH {
            self.log(
                ErrorCode::PropsetTooDeep,
                format!("propertysets nest at most {MAX_PROPSET_DEPTH} deep"),
            );
        }
        let mut def = PropSetDef::default();

        if let TokenKind::SStr(pat) = self.advance() {
            let pattern = self.interner.resolve(pat).to_string();
            let stars = pattern.matches('*').count();
            let mut invalid = pattern
                .chars()
                .any(|c| c != '*' && !(c.is_alphanumeric() || c == '_'));
            match pattern.chars().next() {
                Some('*') => {}
                Some(c) if c.is_alphabetic() || c == '_' => {}
                _ => invalid = true,
            }
            if stars != 1 || invalid {
                self.log(
                    ErrorCode::PropsetInvalidPattern,
                    format!("invalid propertyset pattern '{pattern}': need exactly one '*' in a valid symbol"),
                );
            }
            def.pattern = pattern;
            self.advance();
        } else {
            let found = self.describe_cur();
            self.log(
                ErrorCode::PropsetRequiresString,
                format!("expected pattern string after 'propertyset', found {found}"),
            );
        }

        if self.eat(TokenKind::LParen) {
            // collect the raw formal tokens; 0=start, 1=after item,
            // 2=after comma, 3=done
            let mut state = 0;
            let mut star_cnt = 0;
            while state != 3 {
                match self.kind() {
                    TokenKind::LBrace | TokenKind::RBrace | TokenKind::Semi => {
                        self.log(
                            ErrorCode::MissingRParenFormal,
                            "expected ')' at end of propertyset parameter list",
                        );
                        state = 3;
                    }
                    TokenKind::RParen => {
                        if state == 2 {
                            self.log(
                                ErrorCode::MissingLastFormal,
                                "expected a parameter name before ')'",
                            );
                        }
                        self.advance();
                        state = 3;
                    }
                    TokenKind::Sym(_) | TokenKind::Times => {
                        if state == 1 {
                            self.log(
                                ErrorCode::ExpectedCommaFormal,
                                "expected ',' between parameters",
                            );
                        }
                        state = 1;
                        if self.check(TokenKind::Times) {
                            star_cnt += 1;
                        }
                        def.formal_toks.push(*self.cursor.cur());
                        self.advance();
                    }
                    TokenKind::Comma => {
                        if state == 1 {
                            state = 2;
                            def.formal_toks.push(*self.cursor.cur());
                            self.advance();
                        } else {
                            self.log(
                                ErrorCode::ExpectedFormal,
                                "expected a parameter name, found ','",
                            );
                            self.advance();
                        }
                    }
                    TokenKind::Eof => return Err(self.fatal_eof()),
                    _ => {
                        let found = self.describe_cur();
                        if state == 1 {
                            self.log(
                                ErrorCode::ExpectedCommaFormal,
                                format!("expected ',' between parameters, found {found}"),
                            );
                        } else {
                            self.log(
                                ErrorCode::ExpectedFormal,
                                format!("expected a parameter name, found {found}"),
                            );
                        }
                        self.advance();
                    }
                }
            }
            if star_cnt != 1 {
                self.log(
                    ErrorCode::PropsetInvalidFormals,
                    "a propertyset parameter list needs exactly one '*'",
                );
            }
        }

        if !self.eat(TokenKind::LBrace) {
            self.log(
                ErrorCode::PropsetRequiresLBrace,
                "expected '{' to open the propertyset",
            );
        }
        stack.push(def);
        Ok(())
    }

    /// Expands a property name through the pattern stack, innermost
    /// pattern first.
    pub(crate) fn expand_propset_name(
        &mut self,
        name: NameId,
        stack: &[PropSetDef],
    ) -> NameId {
        let mut out = self.interner.resolve(name).to_string();
        for def in stack.iter().rev() {
            if def.pattern.is_empty() {
                continue;
            }
            out = def.pattern.replacen('*', &out, 1);
        }
        self.interner.intern(&out)
    }

    /// Builds the synthesized formal list for a method defined inside
    /// propertysets with formals, and pushes it in front of the real token
    /// stream. Consumes the method's own `(formals)` if present.
    ///
    /// The combined list is: each level's tokens before its `*`, outermost
    /// first; then the method's own formals; then each level's tokens
    /// after its `*`, innermost first.
    pub(crate) fn insert_propset_expansion(&mut self, stack: &[PropSetDef]) {
        if !stack.iter().any(|d| !d.formal_toks.is_empty()) {
            return;
        }
        let pos = self.pos();
        let mut src = VecTokenSource::new();
        src.push_kind(TokenKind::LParen, pos);
        let mut need_comma = false;

        for def in stack {
            let mut iter = def.formal_toks.iter().peekable();
            while let Some(tok) = iter.next() {
                if need_comma {
                    src.push_kind(TokenKind::Comma, pos);
                    need_comma = false;
                }
                if tok.kind == TokenKind::Comma
                    && iter.peek().map(|t| t.kind) == Some(TokenKind::Times)
                {
                    // the comma just before the star: suppress it, but
                    // remember one is needed before anything added later
                    need_comma = true;
                    break;
                }
                if tok.kind == TokenKind::Times {
                    break;
                }
                src.push(*tok);
            }
        }

        if self.check(TokenKind::LParen) {
            self.advance();
            if !self.check(TokenKind::RParen) {
                if need_comma {
                    src.push_kind(TokenKind::Comma, pos);
                }
                need_comma = true;
            }
            while !matches!(self.kind(), TokenKind::RParen | TokenKind::Eof) {
                src.push(*self.cursor.cur());
                self.advance();
            }
            if self.check(TokenKind::RParen) {
                self.advance();
            }
        }

        for def in stack.iter().rev() {
            let mut iter = def
                .formal_toks
                .iter()
                .skip_while(|t| t.kind != TokenKind::Times);
            // skip the star itself, and a comma right after it
            let mut rest: Vec<Token> = iter.by_ref().skip(1).copied().collect();
            if rest.first().map(|t| t.kind) == Some(TokenKind::Comma) {
                rest.remove(0);
            }
            for tok in rest {
                if need_comma {
                    src.push_kind(TokenKind::Comma, pos);
                    need_comma = false;
                }
                src.push(tok);
            }
        }

        src.push_kind(TokenKind::RParen, pos);

        // re-deliver the current token after the synthesized list, then
        // advance so the list's '(' becomes the current token
        src.push(*self.cursor.cur());
        self.cursor.push_source(Box::new(src));
        self.cursor.next();
    }
}
