//! Object definitions: symbol resolution, modify/replace rewiring,
//! superclass lists, the `+` location stack, property lists, nested
//! objects, vocabulary properties, and object finalization.

use super::{Parser, TermInfo};
use crate::ast::{
    Const, Expr, ObjStmtId, ObjectProp, ObjectStmt, PropVal, Stmt, TopStmt,
};
use crate::symtab::{
    MetaclassTag, ObjectSym, SymId, SymKind, Symbol, VocabWord,
};
use crate::token::TokenKind;
use tadsc_base::{ErrorCode, NameId, Result, SourcePos};

impl<'a, 'i> Parser<'a, 'i> {
    /// Synthesizes a hidden symbol for the pre-modify version of an
    /// object. The name begins with a space, so no source identifier can
    /// ever reach it, but it still has a global entry so the object file
    /// carries it.
    pub(crate) fn synthesize_modified_obj_sym(&mut self, pos: SourcePos) -> SymId {
        self.mod_shadow_count += 1;
        let name_text = format!(" obj#{}", self.mod_shadow_count);
        let name = self.interner.intern(&name_text);
        let obj = ObjectSym {
            obj_id: self.symtab.new_obj_id(),
            ..ObjectSym::default()
        };
        let sym = Symbol::new(name, pos, SymKind::Object(obj));
        self.symtab.add(sym).unwrap_or_else(|e| e)
    }

    /// Finds or defines the symbol for a named object definition,
    /// performing the modify/replace rewiring. Returns the symbol for the
    /// (new) definition, the pre-modify base symbol if any, and the
    /// metaclass symbol when this is a `modify` of an intrinsic class.
    pub(crate) fn find_or_def_obj(
        &mut self,
        name: NameId,
        replace: bool,
        modify: bool,
        is_class: &mut bool,
        trans: &mut bool,
    ) -> (Option<SymId>, Option<SymId>, Option<SymId>) {
        let pos = self.pos();
        let existing = self.symtab.find(name);

        // 'modify' applied to an intrinsic class: chain a new
        // IntrinsicClassModifier object onto the metaclass
        if modify {
            if let Some(id) = existing {
                if matches!(self.symtab.sym(id).kind, SymKind::Metaclass(_)) {
                    let old_mod = self
                        .symtab
                        .sym(id)
                        .as_metaclass()
                        .and_then(|m| m.mod_obj);
                    let base = match old_mod {
                        Some(base) => base,
                        None => {
                            // always keep a dummy object at the root of the
                            // chain so the linker can splice chains from
                            // different object files
                            let base = self.synthesize_modified_obj_sym(pos);
                            if let Some(o) = self.symtab.sym_mut(base).as_object_mut() {
                                o.metaclass = MetaclassTag::IntrinsicClassModifier;
                            }
                            let mut stmt = ObjectStmt::new(Some(base), false, pos);
                            stmt.is_modified = true;
                            let stmt_id = self.program.add_object(stmt);
                            if let Some(o) = self.symtab.sym_mut(base).as_object_mut() {
                                o.stmt = Some(stmt_id);
                            }
                            self.nested_tops.push(TopStmt::Object(stmt_id));
                            base
                        }
                    };
                    let new_mod = self.synthesize_modified_obj_sym(pos);
                    if let Some(o) = self.symtab.sym_mut(new_mod).as_object_mut() {
                        o.metaclass = MetaclassTag::IntrinsicClassModifier;
                        o.mod_base = Some(base);
                    }
                    if let Some(m) = self.symtab.sym_mut(id).as_metaclass_mut() {
                        m.mod_obj = Some(new_mod);
                    }
                    return (Some(new_mod), Some(base), Some(id));
                }
            }
        }

        let obj_sym = match existing {
            Some(id) => {
                let is_object = matches!(self.symtab.sym(id).kind, SymKind::Object(_));
                if !is_object {
                    let text = self.interner.resolve(name).to_string();
                    let what = self.symtab.sym(id).kind.describe();
                    self.log(
                        ErrorCode::RedefAsObj,
                        format!("'{text}' is already defined as {what}"),
                    );
                    None
                } else if (modify || replace)
                    && self
                        .symtab
                        .sym(id)
                        .as_object()
                        .map(|o| o.metaclass != MetaclassTag::TadsObject)
                        .unwrap_or(true)
                {
                    self.log(
                        ErrorCode::CannotModOrReplaceType,
                        "only ordinary objects can be modified or replaced",
                    );
                    None
                } else if modify {
                    // synthesize the hidden shadow holding the original
                    // definition; the visible name stays on the new one
                    let shadow = self.synthesize_modified_obj_sym(pos);
                    let (orig_obj, was_external) = {
                        let o = self.symtab.sym(id);
                        (o.as_object().cloned().unwrap_or_default(), o.external)
                    };
                    let (orig_stmt, old_mod_base, old_dict, old_vocab, old_dels) = (
                        orig_obj.stmt,
                        orig_obj.mod_base,
                        orig_obj.dict,
                        orig_obj.vocab.clone(),
                        orig_obj.del_props.clone(),
                    );
                    if let Some(stmt_id) = orig_stmt {
                        let stmt = self.program.object_mut(stmt_id);
                        stmt.sym = Some(shadow);
                        stmt.is_modified = true;
                        *is_class = stmt.is_class;
                        *trans = stmt.is_transient;
                    } else {
                        let o = self.symtab.sym(id).as_object().cloned().unwrap_or_default();
                        *is_class = o.is_class;
                        *trans = o.transient;
                    }
                    {
                        let sh = self.symtab.sym_mut(shadow);
                        sh.external = was_external;
                        if let Some(o) = sh.as_object_mut() {
                            o.stmt = orig_stmt;
                            o.mod_base = old_mod_base;
                            o.dict = old_dict;
                            o.vocab = old_vocab;
                            o.del_props = old_dels;
                            o.transient = *trans;
                            o.is_class = *is_class;
                            // the shadow stands in for the original
                            // definition, so it keeps the original's place
                            // in the class hierarchy; template resolution
                            // runs through it
                            o.sc_names = orig_obj.sc_names.clone();
                            o.sc_is_root = orig_obj.sc_is_root;
                        }
                    }
                    let cur_dict = self.symtab.cur_dict;
                    {
                        let s = self.symtab.sym_mut(id);
                        if was_external {
                            s.external = false;
                        }
                        if let Some(o) = s.as_object_mut() {
                            if was_external {
                                o.ext_modify = true;
                            }
                            o.mod_base = Some(shadow);
                            o.dict = cur_dict;
                            o.vocab = Vec::new();
                            o.del_props = Vec::new();
                            o.stmt = None;
                        }
                    }
                    return (Some(id), Some(shadow), None);
                } else if self.symtab.sym(id).external {
                    let cur_dict = self.symtab.cur_dict;
                    let s = self.symtab.sym_mut(id);
                    s.external = false;
                    if let Some(o) = s.as_object_mut() {
                        o.dict = cur_dict;
                        if replace {
                            o.ext_replace = true;
                        }
                    }
                    Some(id)
                } else if replace {
                    // discard the previous definition; replacement within
                    // one translation unit completes immediately
                    if let Some(stmt_id) = self.symtab.sym(id).as_object().and_then(|o| o.stmt) {
                        self.program.object_mut(stmt_id).is_replaced = true;
                    }
                    Some(id)
                } else {
                    let text = self.interner.resolve(name).to_string();
                    self.log(
                        ErrorCode::ObjRedef,
                        format!("object '{text}' is already defined"),
                    );
                    None
                }
            }
            None => {
                let obj = ObjectSym {
                    obj_id: self.symtab.new_obj_id(),
                    dict: self.symtab.cur_dict,
                    ..ObjectSym::default()
                };
                let sym = Symbol::new(name, pos, SymKind::Object(obj));
                let id = self.symtab.add(sym).unwrap_or_else(|e| e);
                if replace || modify {
                    let text = self.interner.resolve(name).to_string();
                    self.log(
                        ErrorCode::ReplaceModObjUndef,
                        format!("'{text}' must be defined before it can be replaced or modified"),
                    );
                }
                Some(id)
            }
        };

        if let Some(id) = obj_sym {
            if let Some(o) = self.symtab.sym_mut(id).as_object_mut() {
                if *is_class {
                    o.is_class = true;
                }
                if *trans {
                    o.transient = true;
                }
            }
        }
        (obj_sym, None, None)
    }

    /// Parses a named object definition; the cursor is on the object name.
    pub(crate) fn parse_object(
        &mut self,
        replace: bool,
        modify: bool,
        is_class: bool,
        plus_cnt: usize,
        trans: bool,
    ) -> Result<Option<TopStmt>> {
        let name = match self.cur_sym() {
            Some(n) => n,
            None => return Ok(None),
        };
        let mut is_class = is_class;
        let mut trans = trans;
        let (obj_sym, mod_orig, meta_sym) =
            self.find_or_def_obj(name, replace, modify, &mut is_class, &mut trans);
        self.advance();
        self.parse_object_body(
            obj_sym, is_class, false, false, false, modify, mod_orig, plus_cnt, meta_sym, None,
            trans,
        )
        .map(|o| o.map(TopStmt::Object))
    }

    /// Parses an anonymous object definition; the cursor is on the class
    /// list.
    pub(crate) fn parse_anon_object(
        &mut self,
        plus_cnt: usize,
        is_nested: bool,
        term_info: Option<&mut TermInfo>,
        trans: bool,
    ) -> Result<Option<ObjStmtId>> {
        let pos = self.pos();
        let name = self.interner.intern(".anon");
        let obj = ObjectSym {
            obj_id: self.symtab.new_obj_id(),
            dict: self.symtab.cur_dict,
            ..ObjectSym::default()
        };
        let sym = self.symtab.add_unnamed(Symbol::new(name, pos, SymKind::Object(obj)));
        self.parse_object_body(
            Some(sym),
            false,
            true,
            false,
            is_nested,
            false,
            None,
            plus_cnt,
            None,
            term_info,
            trans,
        )
    }

    /// Parses an object body: superclass list, template instance,
    /// property list, finalization.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn parse_object_body(
        &mut self,
        obj_sym: Option<SymId>,
        is_class: bool,
        is_anon: bool,
        is_grammar: bool,
        is_nested: bool,
        modify: bool,
        mod_orig_sym: Option<SymId>,
        plus_cnt: usize,
        meta_sym: Option<SymId>,
        term_info: Option<&mut TermInfo>,
        trans: bool,
    ) -> Result<Option<ObjStmtId>> {
        let mut my_term = TermInfo {
            pos: self.pos(),
            unterm: false,
        };
        // the outermost record wins: any lack of termination is charged to
        // the first object it could apply to
        let own_term = term_info.is_none();
        let term: &mut TermInfo = match term_info {
            Some(t) => t,
            None => &mut my_term,
        };

        let pos = self.pos();
        let mut stmt = ObjectStmt::new(obj_sym, is_class, pos);
        stmt.is_transient = trans;
        stmt.is_anon = is_anon;
        stmt.is_nested = is_nested;
        let stmt_id = self.program.add_object(stmt);
        if let Some(sym) = obj_sym {
            if let Some(o) = self.symtab.sym_mut(sym).as_object_mut() {
                o.stmt = Some(stmt_id);
            }
            if is_anon {
                self.symtab.add_anon_obj(sym);
            }
        }

        let old_self_valid = self.self_valid;
        self.self_valid = true;

        if !modify {
            if is_anon || is_grammar {
                // the caller has already advanced to the class list
            } else if !self.eat(TokenKind::Colon) {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ObjDefRequiresColon,
                    format!("expected ':' after object name, found {found}"),
                );
            }
            // the class list defined here supersedes any list imported
            // from a symbol file
            if let Some(sym) = obj_sym {
                if let Some(o) = self.symtab.sym_mut(sym).as_object_mut() {
                    o.sc_names.clear();
                }
            }
            loop {
                match self.kind() {
                    TokenKind::Sym(sc_name) => {
                        let sc_pos = self.pos();
                        let sc_id = self.symtab.find(sc_name);
                        let circular = match (sc_id, obj_sym) {
                            (Some(sc), Some(me)) => {
                                matches!(self.symtab.sym(sc).kind, SymKind::Object(_))
                                    && (sc == me || self.symtab.descends_from(sc, me))
                            }
                            _ => false,
                        };
                        if circular {
                            let sc_text = self.interner.resolve(sc_name).to_string();
                            let me_text = obj_sym
                                .map(|m| self.interner.resolve(self.symtab.sym(m).name).to_string())
                                .unwrap_or_default();
                            self.log(
                                ErrorCode::CircularClass,
                                format!("circular class definition: '{sc_text}' is a subclass of '{me_text}'"),
                            );
                        } else {
                            self.program
                                .object_mut(stmt_id)
                                .add_superclass(sc_name, sc_id, sc_pos);
                            if let Some(sym) = obj_sym {
                                if let Some(o) = self.symtab.sym_mut(sym).as_object_mut() {
                                    o.sc_names.push(sc_name);
                                }
                            }
                        }
                        if self.advance() == TokenKind::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    TokenKind::KwObject => {
                        if !self.program.object(stmt_id).superclasses.is_empty() {
                            self.log(
                                ErrorCode::ObjDefObjNoSuperclass,
                                "'object' cannot be combined with other superclasses",
                            );
                        }
                        if let Some(sym) = obj_sym {
                            if let Some(o) = self.symtab.sym_mut(sym).as_object_mut() {
                                o.sc_is_root = true;
                            }
                        }
                        self.advance();
                        break;
                    }
                    _ => {
                        let found = self.describe_cur();
                        self.log(
                            ErrorCode::ObjDefRequiresSuperclass,
                            format!("expected a superclass name, found {found}"),
                        );
                        break;
                    }
                }
            }
        } else if let Some(base) = mod_orig_sym {
            // the pre-modify original is the new definition's superclass
            let base_name = self.symtab.sym(base).name;
            self.program
                .object_mut(stmt_id)
                .add_superclass(base_name, Some(base), pos);
        }

        for d in self.symtab.dict_props.iter_mut() {
            d.defined = false;
        }

        if plus_cnt != 0 {
            let loc = self
                .plus_stack
                .get(plus_cnt - 1)
                .copied()
                .flatten()
                .and_then(|loc_id| self.program.object(loc_id).sym);
            match (self.symtab.plus_prop, loc) {
                (Some(plus_prop), Some(loc_sym)) => {
                    let val = self.expr(Expr::Const(Const::Object(loc_sym)));
                    self.program.object_mut(stmt_id).add_prop(ObjectProp {
                        prop: plus_prop,
                        val: PropVal::Expr(val),
                        is_static: false,
                        overwritable: true,
                        replace: false,
                        pos,
                    });
                }
                _ => {
                    self.log(
                        ErrorCode::PlusObjTooDeep,
                        "no object at the enclosing '+' nesting level",
                    );
                }
            }
        }

        // classes stay off the location stack unless they opt in with '+'
        if !is_nested && (!is_class || plus_cnt != 0) {
            if self.plus_stack.len() <= plus_cnt {
                self.plus_stack.resize(plus_cnt + 1, None);
            }
            self.plus_stack[plus_cnt] = Some(stmt_id);
        }

        let mut braces = self.eat(TokenKind::LBrace);

        // template properties may appear before or just inside the brace
        if matches!(
            self.kind(),
            TokenKind::SStr(_)
                | TokenKind::SStrStart(_)
                | TokenKind::DStr(_)
                | TokenKind::DStrStart(_)
                | TokenKind::LBracket
                | TokenKind::At
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Times
                | TokenKind::Div
                | TokenKind::Mod
                | TokenKind::Arrow
                | TokenKind::Amp
                | TokenKind::Not
                | TokenKind::BNot
                | TokenKind::Comma
        ) {
            self.parse_obj_template(stmt_id)?;
        }

        if !braces && self.eat(TokenKind::LBrace) {
            braces = true;
        }

        if is_nested && !braces {
            // a nested object requires braces; the likely truth is that
            // the enclosing object was never terminated
            let at = term.pos;
            self.log_at(
                ErrorCode::UnterminatedObject,
                at,
                "object definition is not terminated",
            );
            term.unterm = true;
        }

        if !is_class && !modify && meta_sym.is_none() {
            let order = self.src_order_idx;
            self.src_order_idx += 1;
            let order_prop = self.look_up_prop(self.n_source_text_order, false);
            if let Some(prop) = order_prop {
                let val = self.expr(Expr::Const(Const::Int(order)));
                self.program.object_mut(stmt_id).add_prop(ObjectProp {
                    prop,
                    val: PropVal::Expr(val),
                    is_static: false,
                    overwritable: true,
                    replace: false,
                    pos,
                });
            }
            if self.src_group_mode {
                let group = self.source_text_group_obj(pos);
                let group_prop = self.look_up_prop(self.n_source_text_group, false);
                if let Some(prop) = group_prop {
                    let val = self.expr(Expr::Const(Const::Object(group)));
                    self.program.object_mut(stmt_id).add_prop(ObjectProp {
                        prop,
                        val: PropVal::Expr(val),
                        is_static: false,
                        overwritable: true,
                        replace: false,
                        pos,
                    });
                }
            }
        }

        // property list
        let mut propset_stack: Vec<super::PropSetDef> = Vec::new();
        loop {
            let mut replace_prop = false;
            match self.kind() {
                TokenKind::KwPropertyset => {
                    self.parse_propertyset_header(&mut propset_stack)?;
                    continue;
                }
                TokenKind::Semi => {
                    // inside braces a stray ';' is ignored; otherwise it
                    // terminates the object body
                    self.advance();
                    if braces || !propset_stack.is_empty() {
                        continue;
                    }
                    break;
                }
                TokenKind::KwClass
                | TokenKind::KwExtern
                | TokenKind::KwModify
                | TokenKind::KwDictionary
                | TokenKind::KwProperty
                | TokenKind::Plus
                | TokenKind::Inc
                | TokenKind::KwIntrinsic
                | TokenKind::KwObject
                | TokenKind::KwGrammar
                | TokenKind::KwEnum => {
                    // a new statement is starting; the terminator was
                    // probably left off
                    if braces || !propset_stack.is_empty() {
                        self.log(ErrorCode::ObjDefRequiresRBrace, "expected '}'");
                    } else {
                        self.log(ErrorCode::ObjDefRequiresSemi, "expected ';'");
                    }
                    break;
                }
                TokenKind::RBrace => {
                    if !propset_stack.is_empty() {
                        propset_stack.pop();
                        self.advance();
                        continue;
                    }
                    if braces {
                        self.advance();
                        break;
                    }
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::ObjDefRequiresProp,
                        format!("expected a property definition, found {found}"),
                    );
                    self.advance();
                    continue;
                }
                TokenKind::KwReplace => {
                    if !modify {
                        self.log(
                            ErrorCode::ReplacePropRequiresModObj,
                            "'replace' on a property is only allowed in 'modify' objects",
                        );
                    }
                    self.advance();
                    replace_prop = true;
                }
                TokenKind::KwOperator => {}
                TokenKind::Sym(name) => {
                    // look ahead one token to tell a property definition
                    // from an unterminated-object error
                    let mut done = false;
                    match self.advance() {
                        TokenKind::LParen
                        | TokenKind::LBrace
                        | TokenKind::Assign
                        | TokenKind::Colon => self.cursor.unget(),
                        TokenKind::Sym(_)
                        | TokenKind::At
                        | TokenKind::Plus
                        | TokenKind::Minus
                        | TokenKind::Times
                        | TokenKind::Div
                        | TokenKind::Mod
                        | TokenKind::Arrow
                        | TokenKind::Amp
                        | TokenKind::Not
                        | TokenKind::BNot
                        | TokenKind::Comma => {
                            self.cursor.unget();
                            // a known class name here is almost certainly a
                            // new object definition
                            if matches!(
                                self.symtab.find(name).map(|id| &self.symtab.sym(id).kind),
                                Some(SymKind::Object(_))
                            ) {
                                if braces || !propset_stack.is_empty() {
                                    self.log(ErrorCode::ObjDefRequiresRBrace, "expected '}'");
                                } else {
                                    self.log(ErrorCode::ObjDefRequiresSemi, "expected ';'");
                                }
                                done = true;
                            }
                        }
                        _ => self.cursor.unget(),
                    }
                    if done {
                        break;
                    }
                }
                TokenKind::Eof => {
                    self.log(
                        ErrorCode::ObjDefRequiresProp,
                        "end of file in object definition",
                    );
                    self.self_valid = old_self_valid;
                    return Err(tadsc_base::Fatal);
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::ObjDefRequiresProp,
                        format!("expected a property definition, found {found}"),
                    );
                    self.advance();
                    continue;
                }
            }

            if own_term {
                term.pos = self.pos();
            }
            self.parse_obj_prop(stmt_id, replace_prop, meta_sym, term, &propset_stack, is_nested)?;
            if term.unterm {
                break;
            }
        }

        // finalize: placeholder slots for every dictionary property not
        // explicitly bound, so inherited vocabulary merges uniformly
        if meta_sym.is_none() {
            let missing: Vec<SymId> = self
                .symtab
                .dict_props
                .iter()
                .filter(|d| !d.defined)
                .map(|d| d.prop)
                .collect();
            for prop in missing {
                self.program.object_mut(stmt_id).add_prop(ObjectProp {
                    prop,
                    val: PropVal::VocabPlaceholder,
                    is_static: false,
                    overwritable: false,
                    replace: false,
                    pos,
                });
            }
        }

        // an object with several superclasses and no explicit constructor
        // forwards construction to each superclass in order
        if !is_class && !modify && meta_sym.is_none() {
            let needs_ctor = {
                let stmt = self.program.object(stmt_id);
                stmt.superclasses.len() > 1
            };
            if needs_ctor {
                if let Some(ctor_prop) = self.look_up_prop(self.n_construct, false) {
                    let already = self.program.object(stmt_id).find_prop(ctor_prop).is_some();
                    if !already {
                        let scs: Vec<NameId> = self
                            .program
                            .object(stmt_id)
                            .superclasses
                            .iter()
                            .map(|sc| sc.name)
                            .collect();
                        let body = self.make_forwarding_ctor(&scs, pos);
                        self.program.object_mut(stmt_id).add_prop(ObjectProp {
                            prop: ctor_prop,
                            val: PropVal::Method(body),
                            is_static: false,
                            overwritable: true,
                            replace: false,
                            pos,
                        });
                    }
                }
            }
        }

        self.self_valid = old_self_valid;
        Ok(Some(stmt_id))
    }

    /// Builds the implicit constructor that forwards `...` to each
    /// superclass constructor in order.
    fn make_forwarding_ctor(&mut self, scs: &[NameId], pos: SourcePos) -> crate::ast::BodyId {
        let mut stmts = Vec::new();
        for &sc in scs {
            let args = self.arena.alloc_slice_fill([&*self.expr(Expr::ArgsEllipsis)]);
            let call = self.expr(Expr::Inherited { sc: Some(sc), args });
            stmts.push(Stmt::Expr(call));
        }
        let mut body = crate::ast::CodeBody::new(pos);
        body.varargs = true;
        body.self_referenced = true;
        body.stmts = self.arena.alloc_slice_fill(stmts);
        self.program.add_body(body)
    }

    /// The per-module anonymous singleton published through
    /// sourceTextGroup, created on first use.
    fn source_text_group_obj(&mut self, pos: SourcePos) -> SymId {
        if let Some(id) = self.src_group_obj {
            return id;
        }
        let name = self.interner.intern(".srcGroup");
        let obj = ObjectSym {
            obj_id: self.symtab.new_obj_id(),
            ..ObjectSym::default()
        };
        let id = self.symtab.add_unnamed(Symbol::new(name, pos, SymKind::Object(obj)));
        let stmt = ObjectStmt::new(Some(id), false, pos);
        let stmt_id = self.program.add_object(stmt);
        if let Some(o) = self.symtab.sym_mut(id).as_object_mut() {
            o.stmt = Some(stmt_id);
        }
        self.symtab.add_anon_obj(id);
        self.nested_tops.push(TopStmt::Object(stmt_id));
        self.src_group_obj = Some(id);
        id
    }

    /// Parses one property definition inside an object body.
    pub(crate) fn parse_obj_prop(
        &mut self,
        stmt_id: ObjStmtId,
        replace: bool,
        meta_sym: Option<SymId>,
        term: &mut TermInfo,
        propset_stack: &[super::PropSetDef],
        obj_is_nested: bool,
    ) -> Result<()> {
        let prop_pos = self.pos();

        // resolve the property name, applying propertyset patterns and the
        // 'operator' syntax
        let mut op_operands = 0usize;
        let mut prop_name = match self.kind() {
            TokenKind::KwOperator => {
                if !propset_stack.is_empty() {
                    self.log(
                        ErrorCode::OperatorInPropset,
                        "operator overloads cannot be defined inside a propertyset",
                    );
                }
                let (name, operands) = self.parse_op_name()?;
                op_operands = operands;
                name
            }
            TokenKind::Sym(n) => n,
            _ => return Ok(()),
        };

        if !propset_stack.is_empty() && op_operands == 0 {
            prop_name = self.expand_propset_name(prop_name, propset_stack);
        }

        // what the name is bound to now, for duplicate detection and the
        // nested-object heuristic
        let sym_before = self.symtab.find(prop_name);

        let prop_slot_before = self.program.object(stmt_id).props.len();
        let mut new_prop_added = false;

        match self.advance() {
            TokenKind::LParen | TokenKind::LBrace => {
                let prop_sym = self.look_up_prop(prop_name, true);
                if let Some(p) = prop_sym {
                    if self.symtab.sym(p).as_property().map(|p| p.vocab) == Some(true) {
                        self.log(
                            ErrorCode::VocabRequiresSstr,
                            "a vocabulary property cannot be a method",
                        );
                    }
                }
                if propset_stack.iter().any(|d| !d.formal_toks.is_empty()) {
                    self.insert_propset_expansion(propset_stack);
                }
                let body = self.parse_code_body(true)?;
                if op_operands != 0 {
                    self.program.body_mut(body).operator_overload = true;
                    let b = self.program.body(body);
                    if b.varargs || b.formals.len() != op_operands - 1 {
                        let expected = op_operands - 1;
                        self.log(
                            ErrorCode::OperatorWrongFormals,
                            format!("this operator takes exactly {expected} operand argument(s)"),
                        );
                    }
                }
                if let Some(prop) = prop_sym {
                    self.program.object_mut(stmt_id).add_prop(ObjectProp {
                        prop,
                        val: PropVal::Method(body),
                        is_static: false,
                        overwritable: false,
                        replace,
                        pos: prop_pos,
                    });
                    new_prop_added = true;
                }
            }

            TokenKind::Semi
            | TokenKind::RBrace
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::Comma => {
                let text = self.interner.resolve(prop_name).to_string();
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ObjDefRequiresPropValue,
                    format!("property '{text}' has no value ({found} found instead)"),
                );
                if !self.check(TokenKind::Semi) {
                    self.advance();
                }
            }

            TokenKind::Colon => {
                // nested object - unless the "property name" is really an
                // object name, in which case the enclosing object was
                // never terminated
                if matches!(
                    sym_before.map(|id| &self.symtab.sym(id).kind),
                    Some(SymKind::Object(_))
                ) {
                    let at = term.pos;
                    self.log_at(
                        ErrorCode::UnterminatedObject,
                        at,
                        "object definition is not terminated",
                    );
                    self.cursor.unget();
                    term.unterm = true;
                    return Ok(());
                }
                self.advance();
                let nested = self.parse_anon_object(0, true, Some(term), false)?;
                if term.unterm {
                    return Ok(());
                }
                let nested_id = match nested {
                    Some(id) => id,
                    None => return Ok(()),
                };
                let prop_sym = self.look_up_prop(prop_name, true);
                if let Some(p) = prop_sym {
                    if self.symtab.sym(p).as_property().map(|p| p.vocab) == Some(true) {
                        self.log(
                            ErrorCode::VocabRequiresSstr,
                            "a vocabulary property cannot be a nested object",
                        );
                    }
                    self.program.object_mut(stmt_id).add_prop(ObjectProp {
                        prop: p,
                        val: PropVal::Object(nested_id),
                        is_static: false,
                        overwritable: false,
                        replace,
                        pos: prop_pos,
                    });
                    new_prop_added = true;
                }
                // the nested object points back at its lexical parent
                if let (Some(parent_sym), Some(lex_prop)) = (
                    self.program.object(stmt_id).sym,
                    self.look_up_prop(self.n_lexical_parent, false),
                ) {
                    let val = self.expr(Expr::Const(Const::Object(parent_sym)));
                    self.program.object_mut(nested_id).add_prop(ObjectProp {
                        prop: lex_prop,
                        val: PropVal::Expr(val),
                        is_static: false,
                        overwritable: false,
                        replace: false,
                        pos: prop_pos,
                    });
                }
                self.nested_tops.push(TopStmt::Object(nested_id));
            }

            TokenKind::Assign => {
                self.advance();
                if self.check(TokenKind::LBrace) {
                    // obsolete TADS 2 notation: method with '='
                    self.log(
                        ErrorCode::EqWithMethodObsolete,
                        "'=' before a method body is obsolete syntax",
                    );
                    let prop_sym = self.look_up_prop(prop_name, true);
                    let body = self.parse_code_body(true)?;
                    if let Some(prop) = prop_sym {
                        self.program.object_mut(stmt_id).add_prop(ObjectProp {
                            prop,
                            val: PropVal::Method(body),
                            is_static: false,
                            overwritable: false,
                            replace,
                            pos: prop_pos,
                        });
                        new_prop_added = true;
                    }
                } else {
                    new_prop_added =
                        self.parse_prop_value(stmt_id, prop_name, replace, prop_pos)?;
                }
            }

            _ => {
                let text = self.interner.resolve(prop_name).to_string();
                self.log(
                    ErrorCode::PropRequiresEq,
                    format!("expected '=' after property name '{text}'"),
                );
                new_prop_added = self.parse_prop_value(stmt_id, prop_name, replace, prop_pos)?;
            }
        }

        // duplicate-property check: explicit redefinition may overwrite an
        // implicitly added slot, nothing else
        if let Some(sym) = sym_before {
            let mut is_dup = false;
            if obj_is_nested && self.symtab.sym(sym).name == self.n_lexical_parent {
                is_dup = true;
            }
            if !is_dup && new_prop_added {
                let new_idx = prop_slot_before;
                let dup = {
                    let stmt = self.program.object(stmt_id);
                    stmt.props
                        .iter()
                        .enumerate()
                        .find(|(i, p)| *i != new_idx && p.prop == sym)
                        .map(|(i, p)| (i, p.overwritable))
                };
                if let Some((_, overwritable)) = dup {
                    if overwritable {
                        // remove the implicit slot; keep the explicit one
                        let stmt = self.program.object_mut(stmt_id);
                        if let Some(old_idx) = stmt
                            .props
                            .iter()
                            .enumerate()
                            .position(|(i, p)| i != new_idx && p.prop == sym)
                        {
                            stmt.props.remove(old_idx);
                        }
                    } else {
                        is_dup = true;
                    }
                }
            }
            if is_dup {
                let text = self.interner.resolve(prop_name).to_string();
                self.log_at(
                    ErrorCode::PropRedefInObj,
                    prop_pos,
                    format!("property '{text}' is already defined for this object"),
                );
            }
        }

        // a 'replace' property deletes the base object's slot: drop it from
        // the pre-modify tree now and queue the link-time deletion
        if replace && new_prop_added {
            if let Some(prop) = self.symtab.find(prop_name) {
                if let Some(obj) = self.program.object(stmt_id).sym {
                    let shadow_stmt = self
                        .symtab
                        .sym(obj)
                        .as_object()
                        .and_then(|o| o.mod_base)
                        .and_then(|sh| self.symtab.sym(sh).as_object().and_then(|o| o.stmt));
                    if let Some(sh_stmt) = shadow_stmt {
                        self.program.object_mut(sh_stmt).delete_prop(prop);
                    }
                    if let Some(o) = self.symtab.sym_mut(obj).as_object_mut() {
                        if !o.del_props.contains(&prop) {
                            o.del_props.push(prop);
                        }
                    }
                }
            }
        }

        // modifying an intrinsic class cannot override its native interface
        if let Some(meta) = meta_sym {
            if let Some(prop) = self.symtab.find(prop_name) {
                let mut cur = Some(meta);
                while let Some(m) = cur {
                    let msym = self.symtab.sym(m).as_metaclass().cloned().unwrap_or_default();
                    if msym.props.iter().any(|mp| mp.prop == prop) {
                        let text = self.interner.resolve(prop_name).to_string();
                        self.log_at(
                            ErrorCode::CannotModMetaProp,
                            prop_pos,
                            format!("'{text}' is part of the intrinsic class's native interface"),
                        );
                        break;
                    }
                    cur = msym.super_meta;
                }
            }
        }

        // record explicit dictionary-property bindings
        if let Some(prop) = self.symtab.find(prop_name) {
            let is_vocab = self.symtab.sym(prop).as_property().map(|p| p.vocab) == Some(true);
            if is_vocab {
                for d in self.symtab.dict_props.iter_mut() {
                    if d.prop == prop {
                        d.defined = true;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Parses a `prop = value` right-hand side (the `=` is consumed).
    /// Returns true if a slot was added.
    fn parse_prop_value(
        &mut self,
        stmt_id: ObjStmtId,
        prop_name: NameId,
        replace: bool,
        prop_pos: SourcePos,
    ) -> Result<bool> {
        let prop_sym = match self.look_up_prop(prop_name, true) {
            Some(p) => p,
            None => {
                // still parse and discard the value for syntax's sake
                let _ = self.parse_expr_or_dstr()?;
                return Ok(false);
            }
        };
        let is_vocab = self.symtab.sym(prop_sym).as_property().map(|p| p.vocab) == Some(true);

        if is_vocab {
            if let TokenKind::SStr(first) = self.kind() {
                // vocabulary list: bare single-quoted strings, no brackets
                if self.symtab.cur_dict.is_none() {
                    self.log(
                        ErrorCode::VocabNoDict,
                        "no dictionary is active for this vocabulary word",
                    );
                }
                let obj_sym = self.program.object(stmt_id).sym;
                let mut word = first;
                loop {
                    if let Some(obj) = obj_sym {
                        if let Some(o) = self.symtab.sym_mut(obj).as_object_mut() {
                            o.vocab.push(VocabWord {
                                word,
                                prop: prop_sym,
                            });
                        }
                    }
                    match self.advance() {
                        TokenKind::SStr(next) => word = next,
                        _ => break,
                    }
                }
                let val = self.expr(Expr::Const(Const::VocabList));
                self.program.object_mut(stmt_id).add_prop(ObjectProp {
                    prop: prop_sym,
                    val: PropVal::Expr(val),
                    is_static: false,
                    overwritable: false,
                    replace,
                    pos: prop_pos,
                });
                return Ok(true);
            }
            self.log(
                ErrorCode::VocabRequiresSstr,
                "a vocabulary property takes single-quoted strings",
            );
        }

        let is_static = self.eat(TokenKind::KwStatic);
        let raw = self.parse_expr_or_dstr()?;
        let folded = crate::fold::fold_expr(self.arena, &self.symtab, self.interner, raw);
        let val = self.prop_val_for_expr(folded, is_static, prop_pos);
        self.program.object_mut(stmt_id).add_prop(ObjectProp {
            prop: prop_sym,
            val,
            is_static,
            overwritable: false,
            replace,
            pos: prop_pos,
        });
        Ok(true)
    }

    /// Classifies a property initializer: constants stay expression slots;
    /// anything else (including `static` initializers and void print
    /// strings) is wrapped in a synthetic code body.
    pub(crate) fn prop_val_for_expr(
        &mut self,
        expr: &'a Expr<'a>,
        is_static: bool,
        pos: SourcePos,
    ) -> PropVal<'a> {
        if expr.is_const() && !is_static {
            return PropVal::Expr(expr);
        }
        let mut body = crate::ast::CodeBody::new(pos);
        let stmt = if expr.is_void() {
            Stmt::Expr(expr)
        } else {
            body.has_retval = true;
            Stmt::Return(Some(expr))
        };
        body.is_expr_body = true;
        body.stmts = self.arena.alloc_slice_fill([stmt]);
        PropVal::Method(self.program.add_body(body))
    }

    /// Parses the operator token(s) after the `operator` keyword, returning
    /// the synthetic property name and the operand count (self included).
    fn parse_op_name(&mut self) -> Result<(NameId, usize)> {
        let (text, operands): (&str, usize) = match self.advance() {
            TokenKind::Plus => ("operator+", 2),
            TokenKind::Minus => ("operator-", 2),
            TokenKind::Times => ("operator*", 2),
            TokenKind::Div => ("operator/", 2),
            TokenKind::Mod => ("operator%", 2),
            TokenKind::Caret => ("operator^", 2),
            TokenKind::Shl => ("operator<<", 2),
            TokenKind::Shr => ("operator>>", 2),
            TokenKind::BNot => ("operator~", 1),
            TokenKind::Amp => ("operator&", 2),
            TokenKind::Pipe => ("operator|", 2),
            TokenKind::LBracket => {
                // 'operator []' or 'operator []='
                if self.advance() != TokenKind::RBracket {
                    self.log(ErrorCode::BadOperatorName, "expected ']' in operator name");
                }
                if self.advance() == TokenKind::Assign {
                    ("operator[]=", 3)
                } else {
                    self.cursor.unget();
                    ("operator[]", 2)
                }
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::BadOperatorName,
                    format!("'{found}' cannot be overloaded"),
                );
                ("operator?", 2)
            }
        };
        // leave the cursor positioned like an ordinary property name token
        let name = self.interner.intern(text);
        Ok((name, operands))
    }
}
