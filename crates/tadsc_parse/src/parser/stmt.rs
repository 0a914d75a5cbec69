//! Code bodies, statements, and lexical scopes.
//!
//! A code body is `(formals) { statements }`, a bare `{ statements }`, or
//! the `= expression` short form. Formals and locals share one slot
//! numbering per body; nested bodies (anonymous functions) save and
//! restore the enclosing body's scope state.

use super::{BodyState, Parser};
use crate::ast::{
    BodyId, CatchClause, CodeBody, Expr, Formal, LocalInit, Stmt, SwitchCase,
};
use crate::token::TokenKind;
use tadsc_base::{ErrorCode, NameId, Result};

impl<'a, 'i> Parser<'a, 'i> {
    pub(crate) fn enter_scope(&mut self) {
        self.scopes.push(Default::default());
    }

    pub(crate) fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn find_local(&self, name: NameId) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }

    /// Declares a local in the innermost scope, logging a redefinition in
    /// the same scope.
    pub(crate) fn declare_local(&mut self, name: NameId) -> u32 {
        let slot = self.next_local;
        self.next_local += 1;
        if self.next_local > self.max_locals {
            self.max_locals = self.next_local;
        }
        if let Some(scope) = self.scopes.last_mut() {
            if scope.insert(name, slot).is_some() {
                let text = self.interner.resolve(name).to_string();
                self.log(
                    ErrorCode::LocalRedef,
                    format!("local '{text}' is already defined in this scope"),
                );
            }
        }
        slot
    }

    /// Marks the current body as needing the full method context when an
    /// anonymous function defined inside it references `self`.
    pub(crate) fn cur_body_full_ctx_note(&mut self, body: BodyId) {
        if self.program.body(body).self_referenced {
            self.cur_body_full_ctx = true;
        }
    }

    fn save_body_state(&mut self) -> BodyState {
        let state = BodyState {
            scopes_depth: self.scopes.len(),
            next_local: self.next_local,
            max_locals: self.max_locals,
            self_ref: self.cur_body_self_ref,
            has_ret: self.cur_body_has_ret,
            full_ctx: self.cur_body_full_ctx,
        };
        self.next_local = 0;
        self.max_locals = 0;
        self.cur_body_self_ref = false;
        self.cur_body_has_ret = false;
        self.cur_body_full_ctx = false;
        state
    }

    fn restore_body_state(&mut self, state: BodyState) {
        self.scopes.truncate(state.scopes_depth);
        self.next_local = state.next_local;
        self.max_locals = state.max_locals;
        self.cur_body_self_ref = state.self_ref;
        self.cur_body_has_ret = state.has_ret;
        self.cur_body_full_ctx = state.full_ctx;
    }

    /// Parses a function or method body and registers it with the program.
    ///
    /// Accepts `(formals) { ... }`, a bare `{ ... }`, and the `= expr`
    /// short form. `_is_method` is advisory only; `self` validity is
    /// governed by the object parser.
    pub(crate) fn parse_code_body(&mut self, _is_method: bool) -> Result<BodyId> {
        let pos = self.pos();
        let saved = self.save_body_state();
        self.enter_scope();

        let mut formals = Vec::new();
        let mut varargs = false;
        if self.eat(TokenKind::LParen) {
            let (f, v) = self.parse_formal_list()?;
            formals = f;
            varargs = v;
        }

        let mut body = CodeBody::new(pos);
        body.formals = formals;
        body.varargs = varargs;

        match self.kind() {
            TokenKind::LBrace => {
                let stmt = self.parse_compound()?;
                body.stmts = match stmt {
                    Stmt::Compound(stmts) => stmts,
                    other => self.arena.alloc_slice_fill([other]),
                };
            }
            TokenKind::Assign => {
                // short form: the body evaluates one expression
                self.advance();
                let e = self.parse_expr_or_dstr()?;
                body.is_expr_body = true;
                let stmt = if e.is_void() {
                    Stmt::Expr(e)
                } else {
                    self.cur_body_has_ret = true;
                    Stmt::Return(Some(e))
                };
                body.stmts = self.arena.alloc_slice_fill([stmt]);
            }
            TokenKind::Eof => {
                self.exit_scope();
                self.restore_body_state(saved);
                return Err(self.fatal_eof());
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ExpectedCodeBody,
                    format!("expected a code body, found {found}"),
                );
            }
        }

        body.locals = self.max_locals;
        body.self_referenced = self.cur_body_self_ref;
        body.has_retval = self.cur_body_has_ret;
        body.full_method_ctx = self.cur_body_full_ctx;

        self.exit_scope();
        self.restore_body_state(saved);
        Ok(self.program.add_body(body))
    }

    /// Parses a formal parameter list; the `(` is already consumed.
    /// Returns the formals and the varargs flag.
    pub(crate) fn parse_formal_list(&mut self) -> Result<(Vec<Formal>, bool)> {
        let mut formals = Vec::new();
        let mut varargs = false;
        loop {
            match self.kind() {
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                TokenKind::Ellipsis => {
                    varargs = true;
                    self.advance();
                    if !self.eat(TokenKind::RParen) {
                        self.log(
                            ErrorCode::MissingRParenFormal,
                            "expected ')' after '...' in parameter list",
                        );
                    }
                    break;
                }
                TokenKind::Sym(name) => {
                    let pos = self.pos();
                    self.advance();
                    let opt = self.eat(TokenKind::Question);
                    let mut typ = None;
                    if self.eat(TokenKind::Colon) {
                        match self.cur_sym() {
                            Some(t) => {
                                typ = Some(t);
                                self.advance();
                            }
                            None => {
                                let found = self.describe_cur();
                                self.log(
                                    ErrorCode::BadTypeAnnotation,
                                    format!("expected type name after ':', found {found}"),
                                );
                            }
                        }
                    }
                    self.declare_local(name);
                    formals.push(Formal { name, opt, typ, pos });
                    match self.kind() {
                        TokenKind::Comma => {
                            self.advance();
                        }
                        TokenKind::RParen => {}
                        TokenKind::Sym(_) => {
                            self.log(
                                ErrorCode::ExpectedCommaFormal,
                                "expected ',' between parameters",
                            );
                        }
                        _ => {}
                    }
                }
                TokenKind::LBrace | TokenKind::RBrace | TokenKind::Semi => {
                    self.log(
                        ErrorCode::MissingRParenFormal,
                        "expected ')' at end of parameter list",
                    );
                    break;
                }
                TokenKind::Eof => return Err(self.fatal_eof()),
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::ExpectedFormal,
                        format!("expected parameter name, found {found}"),
                    );
                    self.advance();
                }
            }
        }
        Ok((formals, varargs))
    }

    /// Parses `{ statements }`; the cursor is on the `{`.
    pub(crate) fn parse_compound(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        self.enter_scope();
        let mut stmts = Vec::new();
        loop {
            match self.kind() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => {
                    self.exit_scope();
                    return Err(self.fatal_eof());
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        self.exit_scope();
        Ok(Stmt::Compound(self.arena.alloc_slice_fill(stmts)))
    }

    fn parse_stmt(&mut self) -> Result<Stmt<'a>> {
        match self.kind() {
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::LBrace => self.parse_compound(),
            TokenKind::KwLocal => self.parse_local(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwDo => self.parse_do_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwForeach => self.parse_foreach(),
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwReturn => {
                self.advance();
                let val = if self.check(TokenKind::Semi) {
                    None
                } else {
                    self.cur_body_has_ret = true;
                    Some(self.parse_expr()?)
                };
                self.parse_req_sem()?;
                Ok(Stmt::Return(val))
            }
            TokenKind::KwBreak => {
                self.advance();
                self.parse_req_sem()?;
                Ok(Stmt::Break)
            }
            TokenKind::KwContinue => {
                self.advance();
                self.parse_req_sem()?;
                Ok(Stmt::Continue)
            }
            TokenKind::KwThrow => {
                self.advance();
                let e = self.parse_expr()?;
                self.parse_req_sem()?;
                Ok(Stmt::Throw(e))
            }
            TokenKind::KwTry => self.parse_try(),
            TokenKind::Eof => Err(self.fatal_eof()),
            _ => {
                let e = self.parse_expr_or_dstr()?;
                self.parse_req_sem()?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn parse_local(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        let mut inits: Vec<LocalInit<'a>> = Vec::new();
        loop {
            match self.cur_sym() {
                Some(name) => {
                    let pos = self.pos();
                    self.advance();
                    let init = if self.eat(TokenKind::Assign) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let slot = self.declare_local(name);
                    inits.push(LocalInit { name, slot, init, pos });
                    if self.eat(TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
                None => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::LocalRequiresName,
                        format!("expected variable name in 'local', found {found}"),
                    );
                    break;
                }
            }
        }
        self.parse_req_sem()?;
        Ok(Stmt::Local(self.arena.alloc_slice_fill(inits)))
    }

    fn parse_paren_cond(&mut self) -> Result<&'a Expr<'a>> {
        if !self.eat(TokenKind::LParen) {
            self.log(ErrorCode::ExpectedLParen, "expected '('");
        }
        let cond = self.parse_expr()?;
        if !self.eat(TokenKind::RParen) {
            self.log(ErrorCode::ExpectedRParen, "expected ')'");
        }
        Ok(cond)
    }

    fn parse_if(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        let cond = self.parse_paren_cond()?;
        let then = self.arena.alloc(self.parse_stmt()?);
        let other = if self.eat(TokenKind::KwElse) {
            Some(&*self.arena.alloc(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If { cond, then, other })
    }

    fn parse_while(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        let cond = self.parse_paren_cond()?;
        let body = self.arena.alloc(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        let body = self.arena.alloc(self.parse_stmt()?);
        if !self.eat(TokenKind::KwWhile) {
            self.log(ErrorCode::ExpectedWhile, "expected 'while' after 'do' body");
        }
        let cond = self.parse_paren_cond()?;
        self.parse_req_sem()?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        self.enter_scope();
        if !self.eat(TokenKind::LParen) {
            self.log(ErrorCode::ExpectedLParen, "expected '(' after 'for'");
        }
        let init = if self.check(TokenKind::Semi) {
            None
        } else if self.check(TokenKind::KwLocal) {
            // parse_local consumes the terminator; it accepts the ';' of
            // the for header
            Some(&*self.arena.alloc(self.parse_local()?))
        } else {
            let e = self.parse_expr()?;
            self.parse_req_sem()?;
            Some(&*self.arena.alloc(Stmt::Expr(e)))
        };
        if init.is_none() {
            self.advance();
        }
        let cond = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        if !self.eat(TokenKind::Semi) {
            self.log(ErrorCode::ExpectedSemi, "expected ';' in 'for' header");
        }
        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        if !self.eat(TokenKind::RParen) {
            self.log(ErrorCode::ExpectedRParen, "expected ')' after 'for' header");
        }
        let body = self.arena.alloc(self.parse_stmt()?);
        self.exit_scope();
        Ok(Stmt::For { init, cond, update, body })
    }

    fn parse_foreach(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        self.enter_scope();
        if !self.eat(TokenKind::LParen) {
            self.log(ErrorCode::ExpectedLParen, "expected '(' after 'foreach'");
        }
        let target = if self.eat(TokenKind::KwLocal) {
            match self.cur_sym() {
                Some(name) => {
                    self.advance();
                    let slot = self.declare_local(name);
                    self.expr(Expr::Local { name, slot })
                }
                None => {
                    self.log(ErrorCode::LocalRequiresName, "expected variable after 'local'");
                    self.expr(Expr::Const(crate::ast::Const::Nil))
                }
            }
        } else {
            self.parse_expr()?
        };
        if !self.eat(TokenKind::KwIn) {
            self.log(ErrorCode::ExpectedExpression, "expected 'in' in 'foreach'");
        }
        let coll = self.parse_expr()?;
        if !self.eat(TokenKind::RParen) {
            self.log(ErrorCode::ExpectedRParen, "expected ')' after 'foreach' header");
        }
        let body = self.arena.alloc(self.parse_stmt()?);
        self.exit_scope();
        Ok(Stmt::ForEach { target, coll, body })
    }

    fn parse_switch(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        let ctl = self.parse_paren_cond()?;
        if !self.eat(TokenKind::LBrace) {
            self.log(ErrorCode::ExpectedLBrace, "expected '{' after 'switch'");
        }
        let mut cases: Vec<SwitchCase<'a>> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => return Err(self.fatal_eof()),
                TokenKind::KwCase | TokenKind::KwDefault => {
                    let label = if self.eat(TokenKind::KwCase) {
                        Some(self.parse_expr()?)
                    } else {
                        self.advance();
                        None
                    };
                    if !self.eat(TokenKind::Colon) {
                        self.log(ErrorCode::ExpectedColon, "expected ':' after case label");
                    }
                    let mut body = Vec::new();
                    while !matches!(
                        self.kind(),
                        TokenKind::KwCase | TokenKind::KwDefault | TokenKind::RBrace | TokenKind::Eof
                    ) {
                        body.push(self.parse_stmt()?);
                    }
                    cases.push(SwitchCase {
                        label,
                        body: self.arena.alloc_slice_fill(body),
                    });
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::ExpectedCase,
                        format!("expected 'case' or 'default' in switch body, found {found}"),
                    );
                    self.advance();
                }
            }
        }
        Ok(Stmt::Switch {
            ctl,
            cases: self.arena.alloc_slice_fill(cases),
        })
    }

    fn parse_try(&mut self) -> Result<Stmt<'a>> {
        self.advance();
        if !self.check(TokenKind::LBrace) {
            self.log(ErrorCode::ExpectedLBrace, "expected '{' after 'try'");
        }
        let body = self.arena.alloc(self.parse_compound()?);
        let mut catches: Vec<CatchClause<'a>> = Vec::new();
        while self.eat(TokenKind::KwCatch) {
            if !self.eat(TokenKind::LParen) {
                self.log(ErrorCode::ExpectedLParen, "expected '(' after 'catch'");
            }
            let class = match self.cur_sym() {
                Some(c) => {
                    self.advance();
                    c
                }
                None => {
                    self.log(ErrorCode::CatchRequiresClass, "expected exception class in 'catch'");
                    NameId::EMPTY
                }
            };
            self.enter_scope();
            let (var, var_slot) = match self.cur_sym() {
                Some(v) => {
                    self.advance();
                    let slot = self.declare_local(v);
                    (v, slot)
                }
                None => {
                    self.log(
                        ErrorCode::LocalRequiresName,
                        "expected variable name in 'catch'",
                    );
                    (NameId::EMPTY, 0)
                }
            };
            if !self.eat(TokenKind::RParen) {
                self.log(ErrorCode::ExpectedRParen, "expected ')' after 'catch' clause");
            }
            let cbody = self.arena.alloc(self.parse_compound()?);
            self.exit_scope();
            catches.push(CatchClause {
                class,
                var,
                var_slot,
                body: cbody,
            });
        }
        let finally = if self.eat(TokenKind::KwFinally) {
            Some(&*self.arena.alloc(self.parse_compound()?))
        } else {
            None
        };
        Ok(Stmt::Try {
            body,
            catches: self.arena.alloc_slice_fill(catches),
            finally,
        })
    }
}
