//! Intermediate representation.
//!
//! Expression and statement trees are arena references (`&'a Expr<'a>`);
//! object statements and code bodies live in [`Program`] vectors and are
//! referenced by integer handles ([`ObjStmtId`], [`BodyId`]) so that
//! symbol ↔ IR cross-links never form owning cycles.

pub mod expr;
pub mod object;
pub mod stmt;

pub use expr::{AssignOp, BinOp, Const, DStrPart, Expr, UnOp};
pub use object::{ObjectProp, ObjectStmt, PropVal, SuperClass};
pub use stmt::{CatchClause, CodeBody, Formal, LocalInit, Stmt, SwitchCase};

use crate::symtab::SymId;

/// Handle to an [`ObjectStmt`] in [`Program::objects`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjStmtId(pub u32);

impl ObjStmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a [`CodeBody`] in [`Program::bodies`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BodyId(pub u32);

impl BodyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One top-level statement, in source order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TopStmt {
    Object(ObjStmtId),
    Function { sym: SymId, body: BodyId },
    Dictionary(SymId),
}

/// The parsed translation unit.
#[derive(Default)]
pub struct Program<'a> {
    /// Top-level statements in source order (nested objects are appended
    /// after the statement that contains them).
    pub tops: Vec<TopStmt>,
    pub objects: Vec<ObjectStmt<'a>>,
    pub bodies: Vec<CodeBody<'a>>,
}

impl<'a> Program<'a> {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn add_object(&mut self, stmt: ObjectStmt<'a>) -> ObjStmtId {
        let id = ObjStmtId(self.objects.len() as u32);
        self.objects.push(stmt);
        id
    }

    pub fn add_body(&mut self, body: CodeBody<'a>) -> BodyId {
        let id = BodyId(self.bodies.len() as u32);
        self.bodies.push(body);
        id
    }

    pub fn object(&self, id: ObjStmtId) -> &ObjectStmt<'a> {
        &self.objects[id.index()]
    }

    pub fn object_mut(&mut self, id: ObjStmtId) -> &mut ObjectStmt<'a> {
        &mut self.objects[id.index()]
    }

    pub fn body(&self, id: BodyId) -> &CodeBody<'a> {
        &self.bodies[id.index()]
    }

    pub fn body_mut(&mut self, id: BodyId) -> &mut CodeBody<'a> {
        &mut self.bodies[id.index()]
    }
}
