//! Object templates and string templates.
//!
//! A template is a positional property-initializer shorthand attached to a
//! class (or to the root object list). Instances are matched against the
//! class chain: the superclass list is searched in order, a match in a
//! subclass overrides one inherited from a more distant ancestor, optional
//! items backtrack (match-then-skip), and alternation groups accept
//! whichever alternative fits the actual's token kind.

use super::Parser;
use crate::ast::{Expr, ObjStmtId, ObjectProp, TopStmt};
use crate::symtab::{
    FunctionSym, MetaclassTag, ObjectSym, StrTplTok, StringTemplate, SymId, SymKind, Symbol,
    Template, TemplateItem, TplTokKind,
};
use crate::token::{is_valid_symbol, TokenKind};
use tadsc_base::{ErrorCode, NameId, Result, SourcePos};

/// One actual value of a template instance: its matching token kind, the
/// parsed expression, and the property the matcher binds it to.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TplActual<'a> {
    pub def_tok: TplTokKind,
    pub expr: &'a Expr<'a>,
    pub prop: Option<SymId>,
    pub pos: SourcePos,
}

/// Result of searching one class chain for a template match.
enum TplSearch {
    Found(Template, SymId),
    NotFound,
}

impl<'a, 'i> Parser<'a, 'i> {
    /// Parses an `object template` / `Class template` / `string template`
    /// definition statement; the cursor is on the `template` keyword.
    pub(crate) fn parse_template_def(
        &mut self,
        class_name: Option<NameId>,
    ) -> Result<Option<TopStmt>> {
        if let Some(name) = class_name {
            if self.interner.resolve(name) == "string" {
                return self.parse_string_template_def();
            }
        }

        let class_sym = match class_name {
            Some(name) => {
                // defining a template for a class does not count as a
                // reference to it
                match self.symtab.find(name) {
                    None => {
                        let obj = ObjectSym {
                            obj_id: self.symtab.new_obj_id(),
                            ..ObjectSym::default()
                        };
                        let pos = self.pos();
                        let sym = Symbol::external(name, pos, SymKind::Object(obj));
                        Some(self.symtab.add(sym).unwrap_or_else(|e| e))
                    }
                    Some(id) => {
                        let ok = matches!(
                            self.symtab.sym(id).as_object(),
                            Some(o) if o.metaclass == MetaclassTag::TadsObject
                        );
                        if ok {
                            Some(id)
                        } else {
                            let text = self.interner.resolve(name).to_string();
                            self.log(
                                ErrorCode::RedefAsObj,
                                format!("'{text}' is not an object class"),
                            );
                            None
                        }
                    }
                }
            }
            None => None,
        };

        self.advance();

        let mut items: Vec<TemplateItem> = Vec::new();
        let mut all_ok = true;
        let mut found_inh = false;
        let mut done = false;
        while !done {
            let mut ok = true;
            let mut item: Option<(Option<NameId>, TplTokKind)> = None;

            match self.kind() {
                TokenKind::Semi => {
                    self.advance();
                    break;
                }
                TokenKind::KwInherited => {
                    found_inh = true;
                    item = Some((None, TplTokKind::Inherited));
                }
                TokenKind::SStr(text) | TokenKind::DStr(text) => {
                    let def = if matches!(self.kind(), TokenKind::SStr(_)) {
                        TplTokKind::SStr
                    } else {
                        TplTokKind::DStr
                    };
                    // the string body must itself be a valid property name
                    if is_valid_symbol(self.interner.resolve(text)) {
                        item = Some((Some(text), def));
                    } else {
                        let lit = self.interner.resolve(text).to_string();
                        self.log(
                            ErrorCode::TemplateStrRequiresProp,
                            format!("'{lit}' is not a valid property name"),
                        );
                        ok = false;
                    }
                }
                TokenKind::LBracket => {
                    match self.advance() {
                        TokenKind::Sym(prop) => {
                            if self.advance() != TokenKind::RBracket {
                                self.log(
                                    ErrorCode::TemplateRequiresRBracket,
                                    "expected ']' after the list property name",
                                );
                                self.cursor.unget();
                            }
                            item = Some((Some(prop), TplTokKind::List));
                        }
                        _ => {
                            let found = self.describe_cur();
                            self.log(
                                ErrorCode::TemplateOpRequiresProp,
                                format!("expected a property name after '[', found {found}"),
                            );
                            ok = false;
                            if matches!(
                                self.kind(),
                                TokenKind::Semi
                                    | TokenKind::Eof
                                    | TokenKind::LBrace
                                    | TokenKind::RBrace
                                    | TokenKind::RBracket
                            ) {
                                self.cursor.unget();
                            }
                        }
                    }
                }
                TokenKind::At
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
                    let def = match self.kind() {
                        TokenKind::At => TplTokKind::At,
                        TokenKind::Plus => TplTokKind::Plus,
                        TokenKind::Minus => TplTokKind::Minus,
                        TokenKind::Times => TplTokKind::Times,
                        TokenKind::Div => TplTokKind::Div,
                        TokenKind::Mod => TplTokKind::Mod,
                        TokenKind::Arrow => TplTokKind::Arrow,
                        TokenKind::Amp => TplTokKind::Amp,
                        TokenKind::Not => TplTokKind::Not,
                        _ => TplTokKind::BNot,
                    };
                    let def = if self.check(TokenKind::Comma) {
                        TplTokKind::Comma
                    } else {
                        def
                    };
                    match self.advance() {
                        TokenKind::Sym(prop) => {
                            item = Some((Some(prop), def));
                        }
                        _ => {
                            let found = self.describe_cur();
                            self.log(
                                ErrorCode::TemplateOpRequiresProp,
                                format!("expected a property name after the operator, found {found}"),
                            );
                            ok = false;
                            self.cursor.unget();
                        }
                    }
                }
                TokenKind::LBrace | TokenKind::RBrace | TokenKind::Eof | TokenKind::KwObject => {
                    self.log(ErrorCode::TemplateBadToken, "expected ';' to end the template");
                    done = true;
                    ok = false;
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::TemplateBadToken,
                        format!("invalid template element {found}"),
                    );
                    ok = false;
                }
            }

            if done {
                break;
            }

            // move past the element and pick up '?' / '|' suffixes
            self.advance();
            let mut is_opt = self.eat(TokenKind::Question);
            let is_alt = self.eat(TokenKind::Pipe);

            // alternative groups share optionality
            if let Some(last) = items.last() {
                let last_is_alt = last.is_alt;
                let last_is_opt = last.is_opt;
                if last_is_alt {
                    if is_opt {
                        // mark the whole pending group optional
                        let start = items
                            .iter()
                            .rposition(|it| !it.is_alt)
                            .map(|i| i + 1)
                            .unwrap_or(0);
                        for it in &mut items[start..] {
                            it.is_opt = true;
                        }
                    }
                    if last_is_opt {
                        is_opt = true;
                    }
                }
            }

            if !ok {
                all_ok = false;
            }
            if !ok {
                continue;
            }

            let (prop_name, def) = item.expect("validated template element");
            let prop = match prop_name {
                None => None,
                Some(name) => {
                    let prop = self.look_up_prop(name, false);
                    match prop {
                        None => {
                            let text = self.interner.resolve(name).to_string();
                            self.log(
                                ErrorCode::TemplateSymNotProp,
                                format!("'{text}' is not usable as a property name"),
                            );
                            all_ok = false;
                            continue;
                        }
                        Some(p) => {
                            if self.symtab.sym(p).as_property().map(|ps| ps.vocab)
                                == Some(true)
                            {
                                let text = self.interner.resolve(name).to_string();
                                self.log(
                                    ErrorCode::TemplateNoVocab,
                                    format!("dictionary property '{text}' is not allowed in a template"),
                                );
                                all_ok = false;
                                continue;
                            }
                            // a duplicate property is only allowed within
                            // the trailing run of alternatives
                            let dup = items.iter().enumerate().any(|(i, it)| {
                                it.prop == Some(p)
                                    && items[i..].iter().any(|later| !later.is_alt)
                            });
                            if dup {
                                let text = self.interner.resolve(name).to_string();
                                self.log(
                                    ErrorCode::TemplatePropDup,
                                    format!("property '{text}' appears twice in the template"),
                                );
                                all_ok = false;
                                continue;
                            }
                            Some(p)
                        }
                    }
                }
            };

            items.push(TemplateItem {
                prop,
                tok: def,
                is_alt,
                is_opt,
            });
        }

        if items.is_empty() {
            self.log(ErrorCode::TemplateEmpty, "template defines no items");
            all_ok = false;
        }

        if all_ok {
            if found_inh {
                self.add_inherited_templates(class_sym, &items);
            } else {
                self.add_template_def(class_sym, Template { items });
            }
        }
        Ok(None)
    }

    fn add_template_def(&mut self, class_sym: Option<SymId>, tpl: Template) {
        match class_sym {
            Some(id) => {
                if let Some(o) = self.symtab.sym_mut(id).as_object_mut() {
                    o.templates.push(tpl);
                }
            }
            None => self.root_templates.push(tpl),
        }
    }

    /// Expands a template containing `inherited` with every template
    /// visible through the class's ancestors (plus the root list), and
    /// also adds the form with the `inherited` marker dropped.
    fn add_inherited_templates(&mut self, class_sym: Option<SymId>, items: &[TemplateItem]) {
        let mut inherited: Vec<Template> = Vec::new();
        if let Some(id) = class_sym {
            let mut seen = Vec::new();
            self.collect_super_templates(id, &mut inherited, &mut seen);
        }
        inherited.extend(self.root_templates.iter().cloned());

        let inh_at = items
            .iter()
            .position(|it| it.tok == TplTokKind::Inherited)
            .unwrap_or(items.len());
        for tpl in &inherited {
            let mut expanded: Vec<TemplateItem> = Vec::new();
            expanded.extend_from_slice(&items[..inh_at]);
            expanded.extend(tpl.items.iter().copied());
            expanded.extend_from_slice(&items[inh_at + 1..]);
            self.add_template_def(class_sym, Template { items: expanded });
        }
        // the bare form, without the inherited part
        let mut bare: Vec<TemplateItem> = Vec::new();
        bare.extend_from_slice(&items[..inh_at]);
        bare.extend_from_slice(&items[inh_at + 1..]);
        if !bare.is_empty() {
            self.add_template_def(class_sym, Template { items: bare });
        }
    }

    /// Collects the templates of every ancestor of `class_sym` (not its
    /// own), superclass order first.
    fn collect_super_templates(&self, class_sym: SymId, out: &mut Vec<Template>, seen: &mut Vec<SymId>) {
        if seen.contains(&class_sym) {
            return;
        }
        seen.push(class_sym);
        let sc_names: Vec<NameId> = self
            .symtab
            .sym(class_sym)
            .as_object()
            .map(|o| o.sc_names.clone())
            .unwrap_or_default();
        for sc_name in sc_names {
            if let Some(sc_id) = self.symtab.find(sc_name) {
                if let Some(o) = self.symtab.sym(sc_id).as_object() {
                    out.extend(o.templates.iter().cloned());
                }
                self.collect_super_templates(sc_id, out, seen);
            }
        }
    }

    /// Parses `string template <<tok ...>> funcName;`.
    pub(crate) fn parse_string_template_def(&mut self) -> Result<Option<TopStmt>> {
        // cursor is on 'template'
        self.advance();
        if !self.eat(TokenKind::Shl) {
            self.log(
                ErrorCode::TemplateBadToken,
                "expected '<<' to open the string template",
            );
        }
        let mut toks: Vec<StrTplTok> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Shr => {
                    self.advance();
                    break;
                }
                TokenKind::Times => {
                    toks.push(StrTplTok::Star);
                    self.advance();
                }
                TokenKind::Sym(w) => {
                    toks.push(StrTplTok::Word(w));
                    self.advance();
                }
                TokenKind::Semi | TokenKind::Eof => {
                    self.log(
                        ErrorCode::TemplateBadToken,
                        "expected '>>' to close the string template",
                    );
                    break;
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::TemplateBadToken,
                        format!("invalid string template element {found}"),
                    );
                    self.advance();
                }
            }
        }
        match self.cur_sym() {
            Some(fname) => {
                let pos = self.pos();
                let func = match self.symtab.find(fname) {
                    Some(id) if matches!(self.symtab.sym(id).kind, SymKind::Function(_)) => {
                        Some(id)
                    }
                    Some(_) => {
                        let text = self.interner.resolve(fname).to_string();
                        self.log(
                            ErrorCode::StringTemplateRequiresFunc,
                            format!("'{text}' is not a function"),
                        );
                        None
                    }
                    None => {
                        let sym = Symbol::external(
                            fname,
                            pos,
                            SymKind::Function(FunctionSym {
                                varargs: true,
                                has_retval: true,
                                ..FunctionSym::default()
                            }),
                        );
                        Some(self.symtab.add(sym).unwrap_or_else(|e| e))
                    }
                };
                self.advance();
                if let Some(func) = func {
                    self.string_templates.push(StringTemplate { toks, func });
                }
            }
            None => {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::StringTemplateRequiresFunc,
                    format!("expected a processor function name, found {found}"),
                );
            }
        }
        self.parse_req_sem()?;
        Ok(None)
    }

    // ----- template instances --------------------------------------------

    /// Parses a template instance at the head of an object body and binds
    /// the matched properties.
    pub(crate) fn parse_obj_template(&mut self, stmt_id: ObjStmtId) -> Result<()> {
        let mut actuals: Vec<TplActual<'a>> = Vec::new();
        loop {
            let pos = self.pos();
            let (def_tok, expr) = match self.kind() {
                TokenKind::SStr(_) | TokenKind::SStrStart(_) => {
                    (TplTokKind::SStr, self.parse_primary()?)
                }
                TokenKind::DStr(_) | TokenKind::DStrStart(_) => {
                    (TplTokKind::DStr, self.parse_expr_or_dstr()?)
                }
                TokenKind::LBracket => (TplTokKind::List, self.parse_list()?),
                TokenKind::At
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
                    let def = match self.kind() {
                        TokenKind::At => TplTokKind::At,
                        TokenKind::Plus => TplTokKind::Plus,
                        TokenKind::Minus => TplTokKind::Minus,
                        TokenKind::Times => TplTokKind::Times,
                        TokenKind::Div => TplTokKind::Div,
                        TokenKind::Mod => TplTokKind::Mod,
                        TokenKind::Arrow => TplTokKind::Arrow,
                        TokenKind::Amp => TplTokKind::Amp,
                        TokenKind::Not => TplTokKind::Not,
                        TokenKind::Comma => TplTokKind::Comma,
                        _ => TplTokKind::BNot,
                    };
                    self.advance();
                    (def, self.parse_primary()?)
                }
                TokenKind::Eof => return Ok(()),
                _ => break,
            };
            let folded = crate::fold::fold_expr(self.arena, &self.symtab, self.interner, expr);
            actuals.push(TplActual {
                def_tok,
                expr: folded,
                prop: None,
                pos,
            });
        }

        if actuals.is_empty() {
            return Ok(());
        }

        let scs: Vec<(NameId, Option<SymId>)> = self
            .program
            .object(stmt_id)
            .superclasses
            .iter()
            .map(|sc| (sc.name, sc.sym))
            .collect();

        let mut undesc = false;
        let tpl = match self.find_class_template(&scs, &mut actuals, &mut undesc) {
            TplSearch::Found(tpl, _) => Some(tpl),
            TplSearch::NotFound if !undesc => {
                let roots = self.root_templates.clone();
                self.find_template_match(&roots, &mut actuals)
            }
            TplSearch::NotFound => None,
        };
        self.program.object_mut(stmt_id).undesc_sc = undesc;

        let tpl = match tpl {
            Some(t) => t,
            None => {
                // defer the error: a missing superclass would make the
                // mismatch a side effect, and code generation can tell
                self.program.object_mut(stmt_id).bad_template = true;
                return Ok(());
            }
        };

        Self::match_template(&tpl.items, &mut actuals);

        for a in actuals {
            if let Some(prop) = a.prop {
                let val = self.prop_val_for_expr(a.expr, false, a.pos);
                self.program.object_mut(stmt_id).add_prop(ObjectProp {
                    prop,
                    val,
                    is_static: false,
                    overwritable: false,
                    replace: false,
                    pos: a.pos,
                });
                // explicit slot for a dictionary property
                for d in self.symtab.dict_props.iter_mut() {
                    if d.prop == prop {
                        d.defined = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Searches a superclass list (in order, then ancestors) for the best
    /// template match. A match found through a subclass overrides a match
    /// from a more distant ancestor.
    fn find_class_template(
        &self,
        scs: &[(NameId, Option<SymId>)],
        actuals: &mut Vec<TplActual<'a>>,
        undesc: &mut bool,
    ) -> TplSearch {
        let mut best: Option<(Template, SymId)> = None;
        for &(sc_name, sc_sym) in scs {
            // an invalid superclass silently ends the search at this
            // level; code generation will report the real problem
            let sc_id = match sc_sym.or_else(|| self.symtab.find(sc_name)) {
                Some(id) => id,
                None => return TplSearch::NotFound,
            };
            let obj = match self.symtab.sym(sc_id).as_object() {
                Some(o) if o.metaclass == MetaclassTag::TadsObject => o.clone(),
                _ => return TplSearch::NotFound,
            };

            let cur = match self.find_template_match(&obj.templates, actuals) {
                Some(tpl) => Some((tpl, sc_id)),
                None => {
                    // a class with no known ancestors that is not rooted at
                    // 'object' is undescribed; templates cannot be resolved
                    // through it
                    if obj.sc_names.is_empty() && !obj.sc_is_root {
                        *undesc = true;
                        return TplSearch::NotFound;
                    }
                    let parents: Vec<(NameId, Option<SymId>)> = obj
                        .sc_names
                        .iter()
                        .map(|&n| (n, self.symtab.find(n)))
                        .collect();
                    match self.find_class_template(&parents, actuals, undesc) {
                        TplSearch::Found(tpl, def) => Some((tpl, def)),
                        TplSearch::NotFound => {
                            if *undesc {
                                return TplSearch::NotFound;
                            }
                            None
                        }
                    }
                }
            };

            if let Some((tpl, def)) = cur {
                best = match best {
                    None => Some((tpl, def)),
                    Some((btpl, bdef)) => {
                        if self.symtab.descends_from(def, bdef) {
                            Some((tpl, def))
                        } else {
                            Some((btpl, bdef))
                        }
                    }
                };
            }
        }
        match best {
            Some((tpl, def)) => TplSearch::Found(tpl, def),
            None => TplSearch::NotFound,
        }
    }

    /// First template in the list that matches the actuals.
    fn find_template_match(
        &self,
        templates: &[Template],
        actuals: &mut Vec<TplActual<'a>>,
    ) -> Option<Template> {
        templates
            .iter()
            .find(|tpl| Self::match_template(&tpl.items, actuals))
            .cloned()
    }

    /// The reference matcher: pairs items with actuals by token kind,
    /// trying optionals both ways (match first, then skip), with
    /// alternation groups accepting any one alternative. Binds the matched
    /// property into each actual.
    pub(crate) fn match_template(items: &[TemplateItem], actuals: &mut [TplActual<'a>]) -> bool {
        let mut ii = 0;
        let mut ai = 0;
        while ii < items.len() && ai < actuals.len() {
            let is_opt = items[ii].is_opt;

            // scan the alternation group (a single item when not grouped)
            let mut matched: Option<Option<SymId>> = None;
            let mut j = ii;
            loop {
                if items[j].tok == actuals[ai].def_tok {
                    matched = Some(items[j].prop);
                }
                if !items[j].is_alt || j + 1 >= items.len() {
                    break;
                }
                j += 1;
            }
            let group_end = j;

            if is_opt {
                if let Some(prop) = matched {
                    actuals[ai].prop = prop;
                    if Self::match_template(&items[group_end + 1..], &mut actuals[ai + 1..]) {
                        return true;
                    }
                }
                // try again with this optional group omitted; the current
                // actual is not consumed
                ii = group_end + 1;
            } else {
                match matched {
                    None => return false,
                    Some(prop) => {
                        actuals[ai].prop = prop;
                        ai += 1;
                        ii = group_end + 1;
                    }
                }
            }
        }

        // trailing optional items match vacuously
        while ii < items.len() && items[ii].is_opt {
            ii += 1;
        }
        ii >= items.len() && ai >= actuals.len()
    }
}
