//! Object-definition nodes.

use crate::ast::{expr::Expr, BodyId, ObjStmtId};
use crate::symtab::SymId;
use tadsc_base::{NameId, SourcePos};

/// One superclass reference on an object statement. The name is recorded
/// even when the symbol is not yet resolvable; resolution is re-attempted
/// at object-file write.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SuperClass {
    pub name: NameId,
    pub sym: Option<SymId>,
    pub pos: SourcePos,
}

/// The value of one property slot.
#[derive(Clone, Copy, Debug)]
pub enum PropVal<'a> {
    Expr(&'a Expr<'a>),
    Method(BodyId),
    /// Constant reference to a nested object.
    Object(ObjStmtId),
    /// Placeholder slot for a dictionary property (empty vocabulary list);
    /// inherited vocabulary is merged into it at link time.
    VocabPlaceholder,
}

/// One property slot on an object.
#[derive(Clone, Copy, Debug)]
pub struct ObjectProp<'a> {
    pub prop: SymId,
    pub val: PropVal<'a>,
    pub is_static: bool,
    /// Implicitly added slot (`+` location, sourceTextOrder) that an
    /// explicit definition may overwrite.
    pub overwritable: bool,
    /// Defined with the `replace` prefix inside a `modify` body.
    pub replace: bool,
    pub pos: SourcePos,
}

/// A top-level object definition.
///
/// `modify` produces two linked statements: the synthesized base (flagged
/// `is_modified`) holding the original definition, and the visible head
/// whose sole superclass is the base.
#[derive(Clone, Debug)]
pub struct ObjectStmt<'a> {
    pub sym: Option<SymId>,
    pub is_class: bool,
    pub is_transient: bool,
    /// This statement is the synthesized pre-modify base of a `modify`.
    pub is_modified: bool,
    /// Superseded by `replace`; no output is generated for it.
    pub is_replaced: bool,
    pub is_anon: bool,
    pub is_nested: bool,
    /// Template instance failed to match, but a superclass was undescribed;
    /// the definitive error is deferred to code generation.
    pub bad_template: bool,
    pub undesc_sc: bool,
    pub superclasses: Vec<SuperClass>,
    pub props: Vec<ObjectProp<'a>>,
    pub pos: SourcePos,
}

impl<'a> ObjectStmt<'a> {
    pub fn new(sym: Option<SymId>, is_class: bool, pos: SourcePos) -> Self {
        ObjectStmt {
            sym,
            is_class,
            is_transient: false,
            is_modified: false,
            is_replaced: false,
            is_anon: false,
            is_nested: false,
            bad_template: false,
            undesc_sc: false,
            superclasses: Vec::new(),
            props: Vec::new(),
            pos,
        }
    }

    pub fn add_superclass(&mut self, name: NameId, sym: Option<SymId>, pos: SourcePos) {
        self.superclasses.push(SuperClass { name, sym, pos });
    }

    /// Adds a property slot and returns its index.
    pub fn add_prop(&mut self, prop: ObjectProp<'a>) -> usize {
        self.props.push(prop);
        self.props.len() - 1
    }

    pub fn find_prop(&self, prop: SymId) -> Option<&ObjectProp<'a>> {
        self.props.iter().find(|p| p.prop == prop)
    }

    /// Removes a property slot (overwritable slots being replaced by
    /// explicit definitions, link-time deletions).
    pub fn delete_prop(&mut self, prop: SymId) {
        self.props.retain(|p| p.prop != prop);
    }
}
