//! Top-level statement dispatch and the simple declarations.
//!
//! The outer loop dispatches on the current token; each handler either
//! produces a top-level IR statement, linked in source order, or directly
//! mutates the symbol table. Unknown tokens log one error and enter the
//! resynchronization-suppression state so a run of garbage does not flood
//! the log.

use super::Parser;
use crate::ast::{BodyId, TopStmt};
use crate::symtab::{
    BuiltinSym, EnumSym, FunctionSym, MetaProp, MetaclassSym, MetaclassTag, ObjectSym, SymId,
    SymKind, Symbol,
};
use crate::token::TokenKind;
use tadsc_base::{ErrorCode, NameId, Result, SourcePos};

impl<'a, 'i> Parser<'a, 'i> {
    /// Parses the whole translation unit. Fatal errors terminate parsing;
    /// everything recoverable has already been logged.
    pub fn parse_top(&mut self) {
        loop {
            self.flush_nested_tops();
            let mut suppress_next = false;
            let step: Result<Option<TopStmt>> = match self.kind() {
                TokenKind::Eof => break,
                TokenKind::KwFunction | TokenKind::KwMethod => {
                    self.parse_function(true, false, false, false)
                }
                TokenKind::KwExtern => self.parse_extern().map(|_| None),
                TokenKind::KwIntrinsic => self.parse_intrinsic().map(|_| None),
                TokenKind::KwTransient | TokenKind::Sym(_) => {
                    self.parse_object_or_func(false, &mut suppress_next)
                }
                TokenKind::KwObject => self.parse_object_stm(false),
                TokenKind::Plus | TokenKind::Inc => self.parse_plus_object(),
                TokenKind::KwClass => self.parse_class(),
                TokenKind::KwReplace => self.parse_replace(),
                TokenKind::KwModify => self.parse_modify(),
                TokenKind::KwProperty => self.parse_property_stmt().map(|_| None),
                TokenKind::KwExport => self.parse_export().map(|_| None),
                TokenKind::KwDictionary => self.parse_dict(),
                TokenKind::KwGrammar => self.parse_grammar(false, false),
                TokenKind::KwEnum => self.parse_enum().map(|_| None),
                TokenKind::Semi => {
                    self.advance();
                    Ok(None)
                }
                _ => {
                    if !self.suppress_error {
                        let found = self.describe_cur();
                        self.log(
                            ErrorCode::ExpectedFunctionOrObject,
                            format!("expected a function or object definition, found {found}"),
                        );
                    }
                    suppress_next = true;
                    self.advance();
                    Ok(None)
                }
            };
            self.suppress_error = suppress_next;
            match step {
                Ok(Some(top)) => self.program.tops.push(top),
                Ok(None) => {}
                Err(_) => break,
            }
        }
        self.flush_nested_tops();
        self.finish();
    }

    // ----- functions ------------------------------------------------------

    /// Parses a function definition or declaration. `func_kw_present` is
    /// true when dispatched from the `function` / `method` keyword.
    pub(crate) fn parse_function(
        &mut self,
        func_kw_present: bool,
        is_extern: bool,
        replace: bool,
        modify: bool,
    ) -> Result<Option<TopStmt>> {
        let mut is_method = false;
        if func_kw_present {
            is_method = self.check(TokenKind::KwMethod);
            self.advance();
        }
        let name = match self.cur_sym() {
            Some(n) => n,
            None => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::FuncRequiresName,
                    format!("expected function name, found {found}"),
                );
                return Ok(None);
            }
        };
        let name_pos = self.pos();
        self.advance();

        match self.kind() {
            TokenKind::Semi => {
                self.advance();
                if is_extern {
                    // extern forward declaration: zero arguments, assume a
                    // return value
                    self.declare_function(
                        name, name_pos, 0, 0, false, true, None, None, true, replace, modify,
                    );
                }
                // a non-extern forward declaration has no effect
                Ok(None)
            }
            TokenKind::LParen | TokenKind::LBrace => {
                if is_extern {
                    if self.eat(TokenKind::LParen) {
                        let saved = self.begin_isolated_formals();
                        let (formals, varargs) = self.parse_formal_list()?;
                        self.end_isolated_formals(saved);
                        if self.check(TokenKind::LBrace) || self.check(TokenKind::Assign) {
                            self.log(
                                ErrorCode::ExternNoCodeBody,
                                "an 'extern' function cannot have a code body",
                            );
                            let body = self.parse_code_body(is_method)?;
                            self.program.body_mut(body).replaced = true;
                            return Ok(None);
                        }
                        self.parse_req_sem()?;
                        let argc = formals.iter().filter(|f| !f.opt).count() as u16;
                        let opt = formals.iter().filter(|f| f.opt).count() as u16;
                        let typed = formals.iter().any(|f| f.typ.is_some());
                        let (decl_name, mm_base) = if typed {
                            (self.decorate_mm_name(name, &formals, varargs), Some(name))
                        } else {
                            (name, None)
                        };
                        self.declare_function(
                            decl_name, name_pos, argc, opt, varargs, true, None, mm_base, true,
                            replace, modify,
                        );
                    } else {
                        self.log(
                            ErrorCode::ExternNoCodeBody,
                            "an 'extern' function cannot have a code body",
                        );
                        let body = self.parse_code_body(is_method)?;
                        self.program.body_mut(body).replaced = true;
                    }
                    Ok(None)
                } else {
                    let body = self.parse_code_body(is_method)?;
                    let (argc, opt, varargs, has_ret, typed) = {
                        let b = self.program.body(body);
                        (
                            b.argc(),
                            b.opt_argc(),
                            b.varargs,
                            b.has_retval,
                            b.has_typed_formals(),
                        )
                    };
                    let (decl_name, mm_base) = if typed {
                        let formals = self.program.body(body).formals.clone();
                        (self.decorate_mm_name(name, &formals, varargs), Some(name))
                    } else {
                        (name, None)
                    };
                    let sym = self.declare_function(
                        decl_name, name_pos, argc, opt, varargs, has_ret, Some(body), mm_base,
                        false, replace, modify,
                    );
                    match sym {
                        Some(sym) => Ok(Some(TopStmt::Function { sym, body })),
                        None => {
                            // declaration rejected: keep the parse, drop the code
                            self.program.body_mut(body).replaced = true;
                            Ok(None)
                        }
                    }
                }
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ExpectedCodeBody,
                    format!("expected a code body, found {found}"),
                );
                Ok(None)
            }
        }
    }

    /// Formals parsed outside any code body (extern and intrinsic
    /// prototypes) still need a scope to land in.
    pub(crate) fn begin_isolated_formals(&mut self) -> super::BodyState {
        let saved = super::BodyState {
            scopes_depth: self.scopes.len(),
            next_local: self.next_local,
            max_locals: self.max_locals,
            self_ref: self.cur_body_self_ref,
            has_ret: self.cur_body_has_ret,
            full_ctx: self.cur_body_full_ctx,
        };
        self.next_local = 0;
        self.enter_scope();
        saved
    }

    pub(crate) fn end_isolated_formals(&mut self, saved: super::BodyState) {
        self.scopes.truncate(saved.scopes_depth);
        self.next_local = saved.next_local;
        self.max_locals = saved.max_locals;
        self.cur_body_self_ref = saved.self_ref;
        self.cur_body_has_ret = saved.has_ret;
        self.cur_body_full_ctx = saved.full_ctx;
    }

    /// Builds the decorated name of one multi-method variant: the base
    /// name, `*`, then each parameter's declared type (or nothing) followed
    /// by `;`, with `...` appended for a varargs variant.
    pub(crate) fn decorate_mm_name(
        &mut self,
        base: NameId,
        formals: &[crate::ast::Formal],
        varargs: bool,
    ) -> NameId {
        let mut out = String::from(self.interner.resolve(base));
        out.push('*');
        for f in formals {
            if let Some(t) = f.typ {
                out.push_str(self.interner.resolve(t));
            }
            out.push(';');
        }
        if varargs {
            out.push_str("...");
        }
        self.interner.intern(&out)
    }

    /// Installs or upgrades a function symbol; the heart of function,
    /// `extern function`, `replace function`, `modify function`, and
    /// multi-method handling. For a multi-method variant, `name` is the
    /// decorated name and `mm_base` the undecorated base name. Returns the
    /// symbol the definition landed on, or `None` if it was rejected.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn declare_function(
        &mut self,
        name: NameId,
        name_pos: SourcePos,
        argc: u16,
        opt_argc: u16,
        varargs: bool,
        has_retval: bool,
        body: Option<BodyId>,
        mm_base: Option<NameId>,
        is_extern: bool,
        replace: bool,
        modify: bool,
    ) -> Option<SymId> {
        let is_multimethod = mm_base.is_some();
        if let Some(base_name) = mm_base {
            // Define the base name as an external multi-method function:
            // the base form is synthesized by the linker, so no source
            // module ever defines it directly.
            match self.symtab.find_delete_weak(base_name) {
                Some(existing) => {
                    let sym = self.symtab.sym(existing);
                    match &sym.kind {
                        SymKind::Function(f) if sym.external && f.is_multimethod => {}
                        SymKind::Function(_) => {
                            let text = self.interner.resolve(base_name).to_string();
                            self.log_at(
                                ErrorCode::FuncRedefAsMultimethod,
                                name_pos,
                                format!("'{text}' is already defined as an ordinary function; it cannot also be a multi-method"),
                            );
                            return None;
                        }
                        other => {
                            let text = self.interner.resolve(base_name).to_string();
                            let what = other.describe();
                            self.log_at(
                                ErrorCode::RedefAsFunc,
                                name_pos,
                                format!("'{text}' is already defined as {what}"),
                            );
                            return None;
                        }
                    }
                }
                None => {
                    let base = Symbol::external(
                        base_name,
                        name_pos,
                        SymKind::Function(FunctionSym {
                            argc: 0,
                            opt_argc: 0,
                            varargs: true,
                            has_retval: true,
                            is_multimethod: true,
                            is_mm_base: true,
                            mm_def: true,
                            ext_replace: false,
                            code_body: None,
                            mod_base: None,
                        }),
                    );
                    let _ = self.symtab.add(base);
                }
            }
        }

        let existing = self.symtab.find_delete_weak(name);
        if let Some(id) = existing {
            let sym = self.symtab.sym(id);
            let incompatible = match &sym.kind {
                SymKind::Function(f) => {
                    (!sym.external && !is_extern && !replace && !modify)
                        || f.argc != argc
                        || f.varargs != varargs
                        || f.is_multimethod != is_multimethod
                }
                _ => true,
            };
            if incompatible {
                let text = self.interner.resolve(name).to_string();
                match &sym.kind {
                    SymKind::Function(f) => {
                        if sym.external || is_extern || replace || modify || f.argc != argc {
                            self.log_at(
                                ErrorCode::IncompatFuncRedef,
                                name_pos,
                                format!("parameter list of '{text}' conflicts with its previous declaration"),
                            );
                        } else {
                            self.log_at(
                                ErrorCode::FuncRedef,
                                name_pos,
                                format!("function '{text}' is already defined"),
                            );
                        }
                    }
                    other => {
                        let what = other.describe();
                        self.log_at(
                            ErrorCode::RedefAsFunc,
                            name_pos,
                            format!("'{text}' is already defined as {what}"),
                        );
                    }
                }
                return None;
            }
        }

        let id = match existing {
            None => {
                let mut sym = Symbol::new(
                    name,
                    name_pos,
                    SymKind::Function(FunctionSym {
                        argc,
                        opt_argc,
                        varargs,
                        has_retval,
                        is_multimethod,
                        is_mm_base: false,
                        mm_def: false,
                        ext_replace: false,
                        code_body: None,
                        mod_base: None,
                    }),
                );
                sym.external = is_extern;
                let id = self.symtab.add(sym).unwrap_or_else(|e| e);
                if replace || modify {
                    let text = self.interner.resolve(name).to_string();
                    self.log_at(
                        ErrorCode::ReplaceFuncUndef,
                        name_pos,
                        format!("'{text}' must be defined before it can be replaced or modified"),
                    );
                }
                id
            }
            Some(id) => {
                if replace {
                    let was_external = self.symtab.sym(id).external;
                    if was_external {
                        if let Some(f) = self.symtab.sym_mut(id).as_function_mut() {
                            f.ext_replace = true;
                        }
                    } else {
                        // replacing a function defined in this unit kills
                        // its code and collapses the modification chain
                        let (old_body, mut chain) = {
                            let f = self.symtab.sym(id).as_function().copied().unwrap_or_default();
                            (f.code_body, f.mod_base)
                        };
                        if let Some(b) = old_body {
                            self.program.body_mut(b).replaced = true;
                        }
                        let mut replaced_extern = false;
                        while let Some(base_id) = chain {
                            let base = self.symtab.sym(base_id);
                            let base_fn = base.as_function().copied().unwrap_or_default();
                            if base.external {
                                replaced_extern = true;
                                if let Some(f) = self.symtab.sym_mut(base_id).as_function_mut() {
                                    f.ext_replace = true;
                                }
                            } else if let Some(b) = base_fn.code_body {
                                self.program.body_mut(b).replaced = true;
                            }
                            chain = base_fn.mod_base;
                        }
                        if let Some(f) = self.symtab.sym_mut(id).as_function_mut() {
                            f.mod_base = None;
                            if replaced_extern {
                                f.ext_replace = true;
                            }
                        }
                    }
                } else if modify {
                    // splice a hidden base symbol carrying the previous
                    // code body into the modification chain
                    let (old_fn, was_external) = {
                        let sym = self.symtab.sym(id);
                        (sym.as_function().copied().unwrap_or_default(), sym.external)
                    };
                    let mut shadow = Symbol::new(
                        NameId::EMPTY,
                        name_pos,
                        SymKind::Function(FunctionSym {
                            argc,
                            opt_argc,
                            varargs,
                            has_retval,
                            is_multimethod: old_fn.is_multimethod,
                            is_mm_base: old_fn.is_mm_base,
                            mm_def: false,
                            ext_replace: false,
                            code_body: old_fn.code_body,
                            mod_base: old_fn.mod_base,
                        }),
                    );
                    shadow.external = was_external;
                    let shadow_id = self.symtab.add_unnamed(shadow);
                    if let Some(f) = self.symtab.sym_mut(id).as_function_mut() {
                        f.mod_base = Some(shadow_id);
                        f.code_body = None;
                    }
                }
                if !is_extern {
                    self.symtab.sym_mut(id).external = false;
                }
                id
            }
        };

        if body.is_some() {
            if let Some(f) = self.symtab.sym_mut(id).as_function_mut() {
                f.code_body = body;
                f.has_retval = has_retval;
            }
        }
        Some(id)
    }

    // ----- extern ---------------------------------------------------------

    pub(crate) fn parse_extern(&mut self) -> Result<()> {
        match self.advance() {
            TokenKind::KwFunction | TokenKind::KwMethod => {
                self.parse_function(true, true, false, false)?;
                Ok(())
            }
            kind @ (TokenKind::KwClass | TokenKind::KwObject) => {
                let is_class = kind == TokenKind::KwClass;
                self.advance();
                match self.cur_sym() {
                    Some(name) => {
                        let pos = self.pos();
                        match self.symtab.find(name) {
                            None => {
                                let mut obj = ObjectSym {
                                    obj_id: self.symtab.new_obj_id(),
                                    is_class,
                                    ..ObjectSym::default()
                                };
                                obj.metaclass = MetaclassTag::TadsObject;
                                let sym = Symbol::external(name, pos, SymKind::Object(obj));
                                let _ = self.symtab.add(sym);
                            }
                            Some(id) => {
                                let sym = self.symtab.sym(id);
                                let redundant = matches!(
                                    sym.as_object(),
                                    Some(o) if o.metaclass == MetaclassTag::TadsObject
                                        && o.is_class == is_class
                                );
                                if !redundant {
                                    let text = self.interner.resolve(name).to_string();
                                    self.log(
                                        ErrorCode::ObjRedef,
                                        format!("'{text}' is already defined"),
                                    );
                                }
                            }
                        }
                        self.advance();
                        self.parse_req_sem()
                    }
                    None => {
                        let found = self.describe_cur();
                        self.log(
                            ErrorCode::ExternObjRequiresName,
                            format!("expected object name after 'extern', found {found}"),
                        );
                        self.skip_to_sem()
                    }
                }
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::InvalidExtern,
                    format!("invalid 'extern' declaration at {found}"),
                );
                self.skip_to_sem()
            }
        }
    }

    // ----- intrinsics -----------------------------------------------------

    pub(crate) fn parse_intrinsic(&mut self) -> Result<()> {
        let fnset = match self.advance() {
            TokenKind::SStr(name) => {
                self.advance();
                self.symtab.find_or_add_fnset(name)
            }
            TokenKind::KwClass => return self.parse_intrinsic_class(),
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::IntrinsicRequiresName,
                    format!("expected function set name string, found {found}"),
                );
                0
            }
        };
        if !self.eat(TokenKind::LBrace) {
            self.log(ErrorCode::IntrinsicRequiresLBrace, "expected '{' in 'intrinsic'");
        }
        let mut index: u16 = 0;
        loop {
            match self.kind() {
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::Eof => {
                    self.log(ErrorCode::EofInIntrinsic, "end of file in 'intrinsic' list");
                    return Err(tadsc_base::Fatal);
                }
                TokenKind::Semi => {
                    self.advance();
                }
                TokenKind::Sym(fn_name) => {
                    let pos = self.pos();
                    self.advance();
                    if !self.eat(TokenKind::LParen) {
                        self.log(
                            ErrorCode::IntrinsicRequiresLParen,
                            "expected '(' after intrinsic function name",
                        );
                    }
                    let saved = self.begin_isolated_formals();
                    let (formals, varargs) = self.parse_formal_list()?;
                    self.end_isolated_formals(saved);
                    self.parse_req_sem()?;
                    let argc = formals.iter().filter(|f| !f.opt).count() as u16;
                    let opt_argc = formals.iter().filter(|f| f.opt).count() as u16;
                    let sym = Symbol::new(
                        fn_name,
                        pos,
                        SymKind::Builtin(BuiltinSym {
                            fnset,
                            index,
                            argc,
                            opt_argc,
                            varargs,
                            has_retval: true,
                        }),
                    );
                    if self.symtab.add(sym).is_err() {
                        let text = self.interner.resolve(fn_name).to_string();
                        self.log_at(
                            ErrorCode::DuplicateSymbol,
                            pos,
                            format!("intrinsic function '{text}' conflicts with an existing symbol"),
                        );
                    }
                    index += 1;
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::IntrinsicRequiresFuncName,
                        format!("expected intrinsic function name, found {found}"),
                    );
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn parse_intrinsic_class(&mut self) -> Result<()> {
        let mut meta_sym: Option<SymId> = None;
        let mut got_name = false;
        let mut meta_name = NameId::EMPTY;
        let mut name_pos = SourcePos::none();
        if let TokenKind::Sym(n) = self.advance() {
            meta_name = n;
            name_pos = self.pos();
            match self.symtab.find(n) {
                Some(id) => {
                    let sym = self.symtab.sym(id);
                    if matches!(sym.kind, SymKind::Metaclass(_)) && sym.external {
                        meta_sym = Some(id);
                        got_name = true;
                    } else {
                        let text = self.interner.resolve(n).to_string();
                        self.log(
                            ErrorCode::IntrinsicClassRedef,
                            format!("intrinsic class '{text}' is already defined"),
                        );
                    }
                }
                None => got_name = true,
            }
            self.advance();
        } else {
            let found = self.describe_cur();
            self.log(
                ErrorCode::IntrinsicClassRequiresName,
                format!("expected intrinsic class name, found {found}"),
            );
        }

        if let TokenKind::SStr(ext_name) = self.kind() {
            if got_name {
                let id = match meta_sym {
                    Some(id) => {
                        self.symtab.sym_mut(id).external = false;
                        id
                    }
                    None => {
                        let sym = Symbol::new(
                            meta_name,
                            name_pos,
                            SymKind::Metaclass(MetaclassSym {
                                ext_name,
                                ..MetaclassSym::default()
                            }),
                        );
                        self.symtab.add(sym).unwrap_or_else(|e| e)
                    }
                };
                meta_sym = Some(id);
                let idx = self.symtab.find_or_add_meta(ext_name);
                match self.symtab.meta_sym(idx) {
                    Some(owner) if owner != id => {
                        let text = self
                            .interner
                            .resolve(self.symtab.sym(owner).name)
                            .to_string();
                        self.log(
                            ErrorCode::MetaclassAlreadyDefined,
                            format!("this metaclass is already defined as '{text}'"),
                        );
                    }
                    _ => self.symtab.set_meta_sym(idx, id),
                }
                if let Some(m) = self.symtab.sym_mut(id).as_metaclass_mut() {
                    m.meta_idx = idx;
                    m.ext_name = ext_name;
                }
            }
            self.advance();
        } else {
            let found = self.describe_cur();
            self.log(
                ErrorCode::IntrinsicClassRequiresNameString,
                format!("expected metaclass name string, found {found}"),
            );
        }

        if self.eat(TokenKind::Colon) {
            match self.cur_sym() {
                Some(sc_name) => {
                    match self.symtab.find(sc_name) {
                        None => {
                            let text = self.interner.resolve(sc_name).to_string();
                            self.log(
                                ErrorCode::IntrinsicSuperclassUndef,
                                format!("intrinsic superclass '{text}' is not defined"),
                            );
                        }
                        Some(sc_id) => {
                            if matches!(self.symtab.sym(sc_id).kind, SymKind::Metaclass(_)) {
                                if let Some(id) = meta_sym {
                                    if let Some(m) = self.symtab.sym_mut(id).as_metaclass_mut() {
                                        m.super_meta = Some(sc_id);
                                    }
                                }
                            } else {
                                let text = self.interner.resolve(sc_name).to_string();
                                self.log(
                                    ErrorCode::IntrinsicSuperclassNotIntrinsic,
                                    format!("'{text}' is not an intrinsic class"),
                                );
                            }
                        }
                    }
                    self.advance();
                }
                None => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::IntrinsicClassRequiresName,
                        format!("expected intrinsic superclass name, found {found}"),
                    );
                }
            }
        }

        if !self.eat(TokenKind::LBrace) {
            self.log(
                ErrorCode::IntrinsicRequiresLBrace,
                "expected '{' in 'intrinsic class'",
            );
        }
        loop {
            match self.kind() {
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::Eof => {
                    self.log(
                        ErrorCode::EofInIntrinsicClass,
                        "end of file in 'intrinsic class' body",
                    );
                    return Err(tadsc_base::Fatal);
                }
                TokenKind::Semi => {
                    self.advance();
                }
                TokenKind::KwStatic | TokenKind::Sym(_) => {
                    let is_static = self.eat(TokenKind::KwStatic);
                    let prop_name = match self.cur_sym() {
                        Some(n) => n,
                        None => {
                            self.log(
                                ErrorCode::IntrinsicClassRequiresProp,
                                "expected property name after 'static'",
                            );
                            continue;
                        }
                    };
                    self.advance();
                    let prop = self.look_up_prop(prop_name, true);
                    if let (Some(id), Some(prop)) = (meta_sym, prop) {
                        if let Some(m) = self.symtab.sym_mut(id).as_metaclass_mut() {
                            m.props.push(MetaProp { prop, is_static });
                        }
                    }
                    if self.eat(TokenKind::LParen) {
                        let saved = self.begin_isolated_formals();
                        let _ = self.parse_formal_list()?;
                        self.end_isolated_formals(saved);
                    }
                    self.parse_req_sem()?;
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::IntrinsicClassRequiresProp,
                        format!("expected property name in 'intrinsic class' body, found {found}"),
                    );
                    self.advance();
                }
            }
        }
    }

    // ----- property / export / enum / dictionary --------------------------

    pub(crate) fn parse_property_stmt(&mut self) -> Result<()> {
        self.advance();
        loop {
            match self.cur_sym() {
                Some(name) => {
                    self.look_up_prop(name, true);
                    match self.advance() {
                        TokenKind::Comma => {
                            self.advance();
                        }
                        TokenKind::Semi => {
                            self.advance();
                            return Ok(());
                        }
                        TokenKind::Sym(_) => {
                            self.log(
                                ErrorCode::PropDeclRequiresComma,
                                "expected ',' between property names",
                            );
                        }
                        TokenKind::LBrace | TokenKind::RBrace => {
                            self.log(ErrorCode::ExpectedSemi, "expected ';'");
                            return Ok(());
                        }
                        TokenKind::Eof => return Err(self.fatal_eof()),
                        _ => {
                            let found = self.describe_cur();
                            self.log(
                                ErrorCode::PropDeclRequiresComma,
                                format!("expected ',' in property list, found {found}"),
                            );
                            self.advance();
                            if self.eat(TokenKind::Comma) {
                                continue;
                            }
                            if self.eat(TokenKind::Semi) {
                                return Ok(());
                            }
                        }
                    }
                }
                None => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::PropDeclRequiresName,
                        format!("expected property name, found {found}"),
                    );
                    match self.kind() {
                        TokenKind::Semi => {
                            self.advance();
                            return Ok(());
                        }
                        TokenKind::LBrace | TokenKind::RBrace => return Ok(()),
                        TokenKind::Eof => return Err(self.fatal_eof()),
                        TokenKind::Comma => {
                            self.advance();
                        }
                        _ => {
                            self.advance();
                            self.eat(TokenKind::Comma);
                        }
                    }
                    if self.eat(TokenKind::Semi) {
                        return Ok(());
                    }
                }
            }
        }
    }

    pub(crate) fn parse_export(&mut self) -> Result<()> {
        match self.advance() {
            TokenKind::Sym(name) => {
                let mut ext = name;
                match self.advance() {
                    TokenKind::Semi => {
                        self.advance();
                    }
                    TokenKind::SStr(ext_name) => {
                        ext = ext_name;
                        if !matches!(self.advance(), TokenKind::Semi) {
                            self.log(ErrorCode::ExpectedSemi, "expected ';' after export");
                        } else {
                            self.advance();
                        }
                    }
                    _ => {
                        self.log(ErrorCode::ExpectedSemi, "expected ';' after export");
                    }
                }
                self.symtab.add_export(name, ext);
                Ok(())
            }
            TokenKind::Semi | TokenKind::LBrace | TokenKind::RBrace | TokenKind::Eof => {
                self.log(ErrorCode::ExportRequiresName, "expected symbol name after 'export'");
                Ok(())
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ExportRequiresName,
                    format!("expected symbol name after 'export', found {found}"),
                );
                self.advance();
                Ok(())
            }
        }
    }

    pub(crate) fn parse_enum(&mut self) -> Result<()> {
        self.advance();
        // 'token' is a context-sensitive keyword here
        let mut is_token = false;
        if let Some(n) = self.cur_sym() {
            if n == self.n_token {
                is_token = true;
                self.advance();
            }
        }
        loop {
            match self.kind() {
                TokenKind::Sym(name) => {
                    let pos = self.pos();
                    match self.symtab.find(name) {
                        Some(id) => {
                            let is_enum = matches!(self.symtab.sym(id).kind, SymKind::Enum(_));
                            if is_enum {
                                if is_token {
                                    if let SymKind::Enum(e) = &mut self.symtab.sym_mut(id).kind {
                                        e.is_token = true;
                                    }
                                }
                            } else {
                                let text = self.interner.resolve(name).to_string();
                                self.log(
                                    ErrorCode::RedefAsEnum,
                                    format!("'{text}' is already defined and cannot be an enum"),
                                );
                            }
                        }
                        None => {
                            let enum_id = self.symtab.new_enum_id();
                            let mut sym = Symbol::new(
                                name,
                                pos,
                                SymKind::Enum(EnumSym { enum_id, is_token }),
                            );
                            sym.referenced = true;
                            let _ = self.symtab.add(sym);
                        }
                    }
                    match self.advance() {
                        TokenKind::Comma => {
                            self.advance();
                        }
                        TokenKind::Semi => {
                            self.advance();
                            return Ok(());
                        }
                        TokenKind::LBrace | TokenKind::RBrace => {
                            self.log(ErrorCode::ExpectedSemi, "expected ';'");
                            return Ok(());
                        }
                        TokenKind::Eof => return Err(self.fatal_eof()),
                        _ => {
                            let found = self.describe_cur();
                            self.log(
                                ErrorCode::EnumRequiresComma,
                                format!("expected ',' in enum list, found {found}"),
                            );
                            self.advance();
                        }
                    }
                }
                TokenKind::LBrace | TokenKind::RBrace => {
                    self.log(ErrorCode::ExpectedSemi, "expected ';'");
                    return Ok(());
                }
                TokenKind::Eof => return Err(self.fatal_eof()),
                TokenKind::Semi => {
                    self.log(ErrorCode::EnumRequiresName, "expected enum constant name");
                    self.advance();
                    return Ok(());
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::EnumRequiresName,
                        format!("expected enum constant name, found {found}"),
                    );
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn parse_dict(&mut self) -> Result<Option<TopStmt>> {
        match self.advance() {
            TokenKind::KwProperty => {
                self.advance();
                loop {
                    match self.cur_sym() {
                        Some(name) => {
                            if let Some(prop) = self.look_up_prop(name, true) {
                                let already = self
                                    .symtab
                                    .sym(prop)
                                    .as_property()
                                    .map(|p| p.vocab)
                                    .unwrap_or(false);
                                if !already {
                                    if let Some(p) = self.symtab.sym_mut(prop).as_property_mut() {
                                        p.vocab = true;
                                    }
                                    self.symtab.add_dict_prop(prop);
                                }
                            }
                            match self.advance() {
                                TokenKind::Comma => {
                                    self.advance();
                                }
                                TokenKind::Semi => {
                                    self.advance();
                                    return Ok(None);
                                }
                                TokenKind::Sym(_) => {
                                    self.log(
                                        ErrorCode::DictPropRequiresComma,
                                        "expected ',' between dictionary property names",
                                    );
                                }
                                TokenKind::LBrace | TokenKind::RBrace => {
                                    self.log(ErrorCode::ExpectedSemi, "expected ';'");
                                    return Ok(None);
                                }
                                TokenKind::Eof => return Err(self.fatal_eof()),
                                _ => {
                                    let found = self.describe_cur();
                                    self.log(
                                        ErrorCode::DictPropRequiresComma,
                                        format!("expected ',' in dictionary property list, found {found}"),
                                    );
                                    self.advance();
                                    if self.eat(TokenKind::Comma) {
                                        continue;
                                    }
                                    if self.eat(TokenKind::Semi) {
                                        return Ok(None);
                                    }
                                }
                            }
                        }
                        None => {
                            let found = self.describe_cur();
                            self.log(
                                ErrorCode::DictPropRequiresName,
                                format!("expected property name, found {found}"),
                            );
                            match self.kind() {
                                TokenKind::Semi => {
                                    self.advance();
                                    return Ok(None);
                                }
                                TokenKind::LBrace | TokenKind::RBrace => return Ok(None),
                                TokenKind::Eof => return Err(self.fatal_eof()),
                                TokenKind::Comma => {
                                    self.advance();
                                }
                                _ => {
                                    self.advance();
                                    self.eat(TokenKind::Comma);
                                }
                            }
                            if self.eat(TokenKind::Semi) {
                                return Ok(None);
                            }
                        }
                    }
                }
            }
            TokenKind::Sym(name) => {
                let dict = self.declare_dict(name);
                self.advance();
                self.parse_req_sem()?;
                Ok(dict.map(TopStmt::Dictionary))
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::DictSyntax,
                    format!("invalid 'dictionary' statement at {found}"),
                );
                Ok(None)
            }
        }
    }

    /// Finds or creates a dictionary object symbol and makes it the active
    /// dictionary.
    pub(crate) fn declare_dict(&mut self, name: NameId) -> Option<SymId> {
        let pos = self.pos();
        let id = match self.symtab.find(name) {
            Some(id) => {
                let usable = {
                    let sym = self.symtab.sym(id);
                    matches!(
                        sym.as_object(),
                        Some(o) if o.metaclass == MetaclassTag::Dictionary
                            || (sym.external && o.metaclass == MetaclassTag::TadsObject)
                    )
                };
                if !usable {
                    let text = self.interner.resolve(name).to_string();
                    self.log(
                        ErrorCode::RedefAsObj,
                        format!("'{text}' is already defined and cannot be a dictionary"),
                    );
                    return None;
                }
                let s = self.symtab.sym_mut(id);
                s.external = false;
                if let Some(o) = s.as_object_mut() {
                    o.metaclass = MetaclassTag::Dictionary;
                }
                id
            }
            None => {
                let obj = ObjectSym {
                    obj_id: self.symtab.new_obj_id(),
                    metaclass: MetaclassTag::Dictionary,
                    ..ObjectSym::default()
                };
                let sym = Symbol::new(name, pos, SymKind::Object(obj));
                self.symtab.add(sym).unwrap_or_else(|e| e)
            }
        };
        self.symtab.dicts.entry(id).or_default();
        self.symtab.cur_dict = Some(id);
        Some(id)
    }

    // ----- class / modify / replace / object dispatch ---------------------

    pub(crate) fn parse_class(&mut self) -> Result<Option<TopStmt>> {
        if !matches!(self.advance(), TokenKind::Sym(_)) {
            let found = self.describe_cur();
            self.log(
                ErrorCode::FuncRequiresName,
                format!("expected class name, found {found}"),
            );
            return Ok(None);
        }
        self.parse_object(false, false, true, 0, false)
    }

    pub(crate) fn parse_modify(&mut self) -> Result<Option<TopStmt>> {
        match self.advance() {
            TokenKind::KwFunction | TokenKind::KwMethod => {
                self.parse_function(true, false, false, true)
            }
            TokenKind::KwGrammar => self.parse_grammar(false, true),
            TokenKind::Sym(_) => self.parse_object(false, true, false, 0, false),
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ExpectedFunctionOrObject,
                    format!("expected a function or object after 'modify', found {found}"),
                );
                Ok(None)
            }
        }
    }

    pub(crate) fn parse_replace(&mut self) -> Result<Option<TopStmt>> {
        match self.advance() {
            TokenKind::KwFunction | TokenKind::KwMethod => {
                self.parse_function(true, false, true, false)
            }
            TokenKind::KwGrammar => self.parse_grammar(true, false),
            TokenKind::KwClass => {
                if !matches!(self.advance(), TokenKind::Sym(_)) {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::FuncRequiresName,
                        format!("expected class name, found {found}"),
                    );
                    return Ok(None);
                }
                self.parse_object(true, false, true, 0, false)
            }
            TokenKind::Sym(_) | TokenKind::KwTransient => {
                let mut ignore = false;
                self.parse_object_or_func(true, &mut ignore)
            }
            _ => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::ExpectedFunctionOrObject,
                    format!("expected a function or object after 'replace', found {found}"),
                );
                Ok(None)
            }
        }
    }

    /// `transient | IDENT ...` — an object definition or a function
    /// definition, disambiguated by the token after the name.
    pub(crate) fn parse_object_or_func(
        &mut self,
        replace: bool,
        suppress_next: &mut bool,
    ) -> Result<Option<TopStmt>> {
        let mut trans = false;
        if self.check(TokenKind::KwTransient) {
            trans = true;
            self.advance();
            if self.check(TokenKind::KwObject) {
                return self.parse_object_stm(true);
            }
        }
        let init_kind = self.kind();
        match self.advance() {
            TokenKind::Colon => {
                self.cursor.unget();
                self.parse_object(replace, false, false, 0, trans)
            }
            TokenKind::LParen => {
                if trans {
                    self.log(ErrorCode::InvalidTransient, "'transient' is not valid here");
                }
                self.cursor.unget();
                self.parse_function(false, false, replace, false)
            }
            TokenKind::KwTemplate => {
                if trans {
                    self.log(ErrorCode::InvalidTransient, "'transient' is not valid here");
                }
                let class_name = init_kind.sym();
                self.parse_template_def(class_name)
            }
            _ => {
                if let Some(name) = init_kind.sym() {
                    // a known object class starting a statement begins an
                    // anonymous instance definition
                    let is_obj = matches!(
                        self.symtab.find(name).map(|id| &self.symtab.sym(id).kind),
                        Some(SymKind::Object(o)) if o.metaclass == MetaclassTag::TadsObject
                    );
                    if is_obj {
                        if replace {
                            self.log(
                                ErrorCode::ReplaceObjRequiresSuperclass,
                                "'replace' requires a named object definition",
                            );
                        }
                        self.cursor.unget();
                        return self
                            .parse_anon_object(0, false, None, trans)
                            .map(|o| o.map(TopStmt::Object));
                    }
                } else if init_kind == TokenKind::KwObject {
                    self.cursor.unget();
                    return self
                        .parse_anon_object(0, false, None, trans)
                        .map(|o| o.map(TopStmt::Object));
                }
                if !self.suppress_error {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::ExpectedFunctionOrObject,
                        format!("expected a function or object definition, found {found}"),
                    );
                }
                *suppress_next = true;
                Ok(None)
            }
        }
    }

    /// `+ | ++ ...` prefixed object definition, or the `+ property`
    /// directive.
    pub(crate) fn parse_plus_object(&mut self) -> Result<Option<TopStmt>> {
        let mut cnt = 0usize;
        loop {
            match self.kind() {
                TokenKind::Plus => cnt += 1,
                TokenKind::Inc => cnt += 2,
                _ => break,
            }
            self.advance();
        }

        if cnt == 1 && self.check(TokenKind::KwProperty) {
            if let TokenKind::Sym(name) = self.advance() {
                let prop = self.look_up_prop(name, true);
                self.symtab.plus_prop = prop;
                self.advance();
            } else {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::PlusPropRequiresName,
                    format!("expected property name after '+ property', found {found}"),
                );
                if !self.check(TokenKind::Semi) {
                    self.advance();
                }
            }
            self.parse_req_sem()?;
            return Ok(None);
        }

        let mut is_class = false;
        let mut trans = false;
        if self.eat(TokenKind::KwClass) {
            is_class = true;
        } else if self.eat(TokenKind::KwTransient) {
            trans = true;
        }

        let mut anon = false;
        if self.check(TokenKind::KwObject) {
            anon = true;
        } else if self.cur_sym().is_some() {
            anon = !matches!(self.advance(), TokenKind::Colon);
            self.cursor.unget();
        }

        if anon {
            self.parse_anon_object(cnt, false, None, trans)
                .map(|o| o.map(TopStmt::Object))
        } else {
            self.parse_object(false, false, is_class, cnt, trans)
        }
    }

    /// `object ...` — an `object template` statement or an anonymous
    /// base-object definition.
    pub(crate) fn parse_object_stm(&mut self, trans: bool) -> Result<Option<TopStmt>> {
        if self.advance() == TokenKind::KwTemplate {
            self.parse_template_def(None)
        } else {
            self.cursor.unget();
            self.parse_anon_object(0, false, None, trans)
                .map(|o| o.map(TopStmt::Object))
        }
    }
}
