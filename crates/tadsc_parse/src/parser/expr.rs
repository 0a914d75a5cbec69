//! Expression grammar.
//!
//! Precedence-climbing recursive descent: assignment at the bottom, then
//! the conditional operator, logical and bitwise ladders, equality,
//! relational (including `in`), shifts, additive, multiplicative, unary,
//! postfix, primary. Double-quoted strings are only admitted through
//! [`Parser::parse_expr_or_dstr`], since they print rather than yield a
//! value.

use super::Parser;
use crate::ast::{AssignOp, BinOp, Const, DStrPart, Expr, UnOp};
use crate::token::TokenKind;
use tadsc_base::{ErrorCode, NameId, Result};

impl<'a, 'i> Parser<'a, 'i> {
    pub(crate) fn expr(&self, e: Expr<'a>) -> &'a Expr<'a> {
        self.arena.alloc(e)
    }

    /// Parses a value expression.
    pub(crate) fn parse_expr(&mut self) -> Result<&'a Expr<'a>> {
        self.parse_assign()
    }

    /// Parses either a value expression or a double-quoted string (which
    /// has print side effects and no value).
    pub(crate) fn parse_expr_or_dstr(&mut self) -> Result<&'a Expr<'a>> {
        match self.kind() {
            TokenKind::DStr(text) => {
                self.advance();
                Ok(self.expr(Expr::DStr(text)))
            }
            TokenKind::DStrStart(text) => {
                self.advance();
                let parts = self.parse_embed_parts(text, true)?;
                Ok(self.expr(Expr::DStrEmbed(parts)))
            }
            _ => self.parse_expr(),
        }
    }

    fn parse_assign(&mut self) -> Result<&'a Expr<'a>> {
        let lhs = self.parse_cond()?;
        let op = match self.kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::TimesAssign => AssignOp::Mul,
            TokenKind::DivAssign => AssignOp::Div,
            TokenKind::ModAssign => AssignOp::Mod,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_assign()?;
        Ok(self.expr(Expr::Assign { op, lhs, rhs }))
    }

    fn parse_cond(&mut self) -> Result<&'a Expr<'a>> {
        let cond = self.parse_or()?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_assign()?;
        if !self.eat(TokenKind::Colon) {
            self.log(ErrorCode::ExpectedColon, "expected ':' in conditional expression");
        }
        let other = self.parse_assign()?;
        Ok(self.expr(Expr::Cond { cond, then, other }))
    }

    fn parse_or(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.parse_and()?;
            lhs = self.expr(Expr::Binary { op: BinOp::Or, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_bitor()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.parse_bitor()?;
            lhs = self.expr(Expr::Binary { op: BinOp::And, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(TokenKind::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = self.expr(Expr::Binary { op: BinOp::BOr, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(TokenKind::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = self.expr(Expr::Binary { op: BinOp::BXor, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_equality()?;
        while self.eat(TokenKind::Amp) {
            let rhs = self.parse_equality()?;
            lhs = self.expr(Expr::Binary { op: BinOp::BAnd, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = self.expr(Expr::Binary { op, lhs, rhs });
        }
    }

    fn parse_relational(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::KwIn => BinOp::In,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = if op == BinOp::In && self.check(TokenKind::LParen) {
                // `x in (a, b, c)` - the right operand is a value list
                self.advance();
                let args = self.parse_args()?;
                self.expr(Expr::List(args))
            } else {
                self.parse_shift()?
            };
            lhs = self.expr(Expr::Binary { op, lhs, rhs });
        }
    }

    fn parse_shift(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = self.expr(Expr::Binary { op, lhs, rhs });
        }
    }

    fn parse_additive(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.expr(Expr::Binary { op, lhs, rhs });
        }
    }

    fn parse_multiplicative(&mut self) -> Result<&'a Expr<'a>> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Times => BinOp::Mul,
                TokenKind::Div => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.expr(Expr::Binary { op, lhs, rhs });
        }
    }

    fn parse_unary(&mut self) -> Result<&'a Expr<'a>> {
        let op = match self.kind() {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Not => UnOp::Not,
            TokenKind::BNot => UnOp::BNot,
            TokenKind::Inc => UnOp::PreInc,
            TokenKind::Dec => UnOp::PreDec,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(self.expr(Expr::Unary { op, operand }))
    }

    fn parse_postfix(&mut self) -> Result<&'a Expr<'a>> {
        let mut e = self.parse_primary()?;
        loop {
            match self.kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    e = self.expr(Expr::Call { callee: e, args });
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    if !self.eat(TokenKind::RBracket) {
                        self.log(ErrorCode::ExpectedRBracket, "expected ']' after index expression");
                    }
                    e = self.expr(Expr::Index { base: e, index });
                }
                TokenKind::Dot => {
                    self.advance();
                    let prop = match self.cur_sym() {
                        Some(n) => {
                            self.advance();
                            n
                        }
                        None => {
                            let found = self.describe_cur();
                            self.log(
                                ErrorCode::ExpectedExpression,
                                format!("expected property name after '.', found {found}"),
                            );
                            return Ok(e);
                        }
                    };
                    let args = if self.eat(TokenKind::LParen) {
                        Some(self.parse_args()?)
                    } else {
                        None
                    };
                    e = self.expr(Expr::Member { base: e, prop, args });
                }
                TokenKind::Inc => {
                    self.advance();
                    e = self.expr(Expr::Unary { op: UnOp::PostInc, operand: e });
                }
                TokenKind::Dec => {
                    self.advance();
                    e = self.expr(Expr::Unary { op: UnOp::PostDec, operand: e });
                }
                _ => return Ok(e),
            }
        }
    }

    /// Parses a primary expression. Public within the crate because
    /// template-instance parsing consumes leaves through this entry point.
    pub(crate) fn parse_primary(&mut self) -> Result<&'a Expr<'a>> {
        match self.kind() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(self.expr(Expr::Const(Const::Int(v))))
            }
            TokenKind::SStr(text) => {
                self.advance();
                Ok(self.expr(Expr::Const(Const::SStr(text))))
            }
            TokenKind::SStrStart(text) => {
                self.advance();
                let parts = self.parse_embed_parts(text, false)?;
                Ok(self.expr(Expr::SStrEmbed(parts)))
            }
            TokenKind::KwNil => {
                self.advance();
                Ok(self.expr(Expr::Const(Const::Nil)))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(self.expr(Expr::Const(Const::True)))
            }
            TokenKind::KwSelf => {
                self.advance();
                self.cur_body_self_ref = true;
                Ok(self.expr(Expr::SelfRef))
            }
            TokenKind::KwReplaced => {
                self.advance();
                Ok(self.expr(Expr::Replaced))
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(self.expr(Expr::ArgsEllipsis))
            }
            TokenKind::KwInherited => {
                self.advance();
                let sc = self.cur_sym();
                if sc.is_some() {
                    self.advance();
                }
                let args = if self.eat(TokenKind::LParen) {
                    self.parse_args()?
                } else {
                    &[]
                };
                Ok(self.expr(Expr::Inherited { sc, args }))
            }
            TokenKind::KwNew => {
                self.advance();
                let transient = self.eat(TokenKind::KwTransient);
                let class = match self.cur_sym() {
                    Some(n) => {
                        let pos = self.pos();
                        self.advance();
                        self.expr(Expr::Sym { name: n, pos })
                    }
                    None => {
                        let found = self.describe_cur();
                        self.log(
                            ErrorCode::ExpectedExpression,
                            format!("expected class name after 'new', found {found}"),
                        );
                        self.expr(Expr::Const(Const::Nil))
                    }
                };
                let args = if self.eat(TokenKind::LParen) {
                    self.parse_args()?
                } else {
                    &[]
                };
                Ok(self.expr(Expr::New { class, args, transient }))
            }
            TokenKind::KwFunction | TokenKind::KwMethod => {
                self.advance();
                let body = self.parse_code_body(false)?;
                // an anonymous function captures the enclosing method context
                self.cur_body_full_ctx_note(body);
                Ok(self.expr(Expr::AnonFn(body)))
            }
            TokenKind::Sym(name) => {
                let pos = self.pos();
                self.advance();
                if let Some(slot) = self.find_local(name) {
                    Ok(self.expr(Expr::Local { name, slot }))
                } else {
                    if let Some(id) = self.symtab.find(name) {
                        self.symtab.sym_mut(id).referenced = true;
                    }
                    Ok(self.expr(Expr::Sym { name, pos }))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                if !self.eat(TokenKind::RParen) {
                    self.log(ErrorCode::ExpectedRParen, "expected ')'");
                }
                Ok(e)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::Eof => Err(self.fatal_eof()),
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ExpectedExpression,
                    format!("expected expression, found {found}"),
                );
                self.advance();
                Ok(self.expr(Expr::Const(Const::Nil)))
            }
        }
    }

    /// Parses a `[a, b, c]` list literal; the cursor is on the `[`.
    pub(crate) fn parse_list(&mut self) -> Result<&'a Expr<'a>> {
        self.advance();
        let mut items: Vec<&'a Expr<'a>> = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                items.push(self.parse_expr()?);
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        if !self.eat(TokenKind::RBracket) {
            self.log(ErrorCode::ExpectedRBracket, "expected ']' at end of list");
        }
        let items = self.arena.alloc_slice_fill(items);
        Ok(self.expr(Expr::List(items)))
    }

    /// Parses a call argument list; the opening `(` is already consumed.
    pub(crate) fn parse_args(&mut self) -> Result<&'a [&'a Expr<'a>]> {
        let mut args: Vec<&'a Expr<'a>> = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        if !self.eat(TokenKind::RParen) {
            self.log(ErrorCode::ExpectedRParen, "expected ')' after argument list");
        }
        Ok(self.arena.alloc_slice_fill(args))
    }

    /// Parses the remainder of an embedded-expression string, having just
    /// consumed the Start segment. Alternates embedded expressions with
    /// Mid segments until the End segment.
    fn parse_embed_parts(&mut self, head: NameId, dquote: bool) -> Result<&'a [DStrPart<'a>]> {
        let mut parts: Vec<DStrPart<'a>> = vec![DStrPart::Str(head)];
        loop {
            let embed = self.parse_expr()?;
            parts.push(DStrPart::Embed(embed));
            match self.kind() {
                TokenKind::DStrMid(t) | TokenKind::SStrMid(t) => {
                    self.advance();
                    parts.push(DStrPart::Str(t));
                }
                TokenKind::DStrEnd(t) | TokenKind::SStrEnd(t) => {
                    self.advance();
                    parts.push(DStrPart::Str(t));
                    break;
                }
                TokenKind::Eof => return Err(self.fatal_eof()),
                _ => {
                    let found = self.describe_cur();
                    let q = if dquote { '"' } else { '\'' };
                    self.log(
                        ErrorCode::UnterminatedString,
                        format!("expected '>>' to resume the {q}-quoted string, found {found}"),
                    );
                    break;
                }
            }
        }
        Ok(self.arena.alloc_slice_fill(parts))
    }
}
