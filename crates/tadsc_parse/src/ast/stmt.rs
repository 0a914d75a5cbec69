//! Statement nodes and code bodies.

use crate::ast::expr::Expr;
use tadsc_base::{NameId, SourcePos};

/// One formal parameter.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Formal {
    pub name: NameId,
    /// `param?` — optional argument.
    pub opt: bool,
    /// `param: Type` — multi-method type annotation.
    pub typ: Option<NameId>,
    pub pos: SourcePos,
}

/// One declarator of a `local` statement.
#[derive(Clone, Copy, Debug)]
pub struct LocalInit<'a> {
    pub name: NameId,
    pub slot: u32,
    pub init: Option<&'a Expr<'a>>,
    pub pos: SourcePos,
}

#[derive(Clone, Copy, Debug)]
pub struct SwitchCase<'a> {
    /// `None` is the `default:` label.
    pub label: Option<&'a Expr<'a>>,
    pub body: &'a [Stmt<'a>],
}

#[derive(Clone, Copy, Debug)]
pub struct CatchClause<'a> {
    pub class: NameId,
    pub var: NameId,
    pub var_slot: u32,
    pub body: &'a Stmt<'a>,
}

/// A statement node.
#[derive(Clone, Copy, Debug)]
pub enum Stmt<'a> {
    Empty,
    Expr(&'a Expr<'a>),
    Compound(&'a [Stmt<'a>]),
    Local(&'a [LocalInit<'a>]),
    If {
        cond: &'a Expr<'a>,
        then: &'a Stmt<'a>,
        other: Option<&'a Stmt<'a>>,
    },
    While {
        cond: &'a Expr<'a>,
        body: &'a Stmt<'a>,
    },
    DoWhile {
        body: &'a Stmt<'a>,
        cond: &'a Expr<'a>,
    },
    For {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        update: Option<&'a Expr<'a>>,
        body: &'a Stmt<'a>,
    },
    ForEach {
        target: &'a Expr<'a>,
        coll: &'a Expr<'a>,
        body: &'a Stmt<'a>,
    },
    Switch {
        ctl: &'a Expr<'a>,
        cases: &'a [SwitchCase<'a>],
    },
    Return(Option<&'a Expr<'a>>),
    Break,
    Continue,
    Throw(&'a Expr<'a>),
    Try {
        body: &'a Stmt<'a>,
        catches: &'a [CatchClause<'a>],
        finally: Option<&'a Stmt<'a>>,
    },
}

/// A function or method body.
#[derive(Clone, Debug)]
pub struct CodeBody<'a> {
    pub formals: Vec<Formal>,
    pub varargs: bool,
    /// Number of local variable slots used by the body.
    pub locals: u32,
    pub stmts: &'a [Stmt<'a>],
    /// Defined with the `= expr` short form (an implicit return).
    pub is_expr_body: bool,
    pub has_retval: bool,
    /// Body references `self`.
    pub self_referenced: bool,
    /// Body references the full method context (`targetprop`-class state);
    /// set when the body captures anonymous functions.
    pub full_method_ctx: bool,
    /// Superseded by a `replace` definition; no code is generated for it.
    pub replaced: bool,
    pub operator_overload: bool,
    pub pos: SourcePos,
}

impl<'a> CodeBody<'a> {
    pub fn new(pos: SourcePos) -> Self {
        CodeBody {
            formals: Vec::new(),
            varargs: false,
            locals: 0,
            stmts: &[],
            is_expr_body: false,
            has_retval: false,
            self_referenced: false,
            full_method_ctx: false,
            replaced: false,
            operator_overload: false,
            pos,
        }
    }

    /// Fixed (non-optional, non-varargs) argument count.
    pub fn argc(&self) -> u16 {
        self.formals
            .iter()
            .filter(|f| !f.opt)
            .count()
            .min(u16::MAX as usize) as u16
    }

    /// Optional argument count.
    pub fn opt_argc(&self) -> u16 {
        self.formals
            .iter()
            .filter(|f| f.opt)
            .count()
            .min(u16::MAX as usize) as u16
    }

    /// True if any formal carries a multi-method type annotation.
    pub fn has_typed_formals(&self) -> bool {
        self.formals.iter().any(|f| f.typ.is_some())
    }
}
