//! `grammar` statements.
//!
//! A grammar statement names a production (nonterminal), optionally a
//! `(tag)` making the match object a named class with a private rule
//! list, then a rule list of `|`-separated alternatives, then an ordinary
//! object body for the match object. Parenthesized groups containing `|`
//! are flattened into the alternative list; `->prop` arrows feed the
//! auto-generated `grammarInfo` method.

use super::Parser;
use crate::ast::{Const, Expr, ObjectProp, TopStmt};
use crate::symtab::{
    GramAlt, GramProd, GramTok, MetaclassTag, ObjectSym, SymId, SymKind, Symbol,
};
use crate::token::TokenKind;
use tadsc_base::{ErrorCode, NameId, Result};

/// One flattened alternative while the rule list is being parsed.
#[derive(Clone, Default)]
struct GramSeq {
    toks: Vec<GramTok>,
    badness: i16,
}

impl<'a, 'i> Parser<'a, 'i> {
    /// Finds or creates the production object for a nonterminal name and
    /// its master registry entry.
    pub(crate) fn declare_gramprod(&mut self, name: NameId) -> Option<SymId> {
        let pos = self.pos();
        let id = match self.symtab.find(name) {
            Some(id) => {
                let usable = {
                    let sym = self.symtab.sym(id);
                    matches!(
                        sym.as_object(),
                        Some(o) if o.metaclass == MetaclassTag::GrammarProd
                            || (sym.external && o.metaclass == MetaclassTag::TadsObject)
                    )
                };
                if !usable {
                    let text = self.interner.resolve(name).to_string();
                    self.log(
                        ErrorCode::RedefAsObj,
                        format!("'{text}' is already defined and cannot be a grammar production"),
                    );
                    return None;
                }
                let s = self.symtab.sym_mut(id);
                s.external = false;
                if let Some(o) = s.as_object_mut() {
                    o.metaclass = MetaclassTag::GrammarProd;
                }
                id
            }
            None => {
                let obj = ObjectSym {
                    obj_id: self.symtab.new_obj_id(),
                    is_class: true,
                    metaclass: MetaclassTag::GrammarProd,
                    ..ObjectSym::default()
                };
                let sym = Symbol::new(name, pos, SymKind::Object(obj));
                self.symtab.add(sym).unwrap_or_else(|e| e)
            }
        };
        if !self.symtab.gramprods.contains_key(&name) {
            self.symtab.gramprods.insert(
                name,
                GramProd {
                    sym: id,
                    declared: false,
                    alts: Vec::new(),
                },
            );
        }
        Some(id)
    }

    /// Parses a `grammar` statement; the cursor is on the keyword.
    pub(crate) fn parse_grammar(
        &mut self,
        replace: bool,
        modify: bool,
    ) -> Result<Option<TopStmt>> {
        let mut prod_name: Option<NameId> = None;
        let mut prod_sym: Option<SymId> = None;
        if let TokenKind::Sym(n) = self.advance() {
            prod_name = Some(n);
            prod_sym = self.declare_gramprod(n);
        } else {
            let found = self.describe_cur();
            self.log(
                ErrorCode::GrammarRequiresName,
                format!("expected production name after 'grammar', found {found}"),
            );
        }

        let mut sub_tag = NameId::EMPTY;
        let mut name_tag = prod_name.unwrap_or(NameId::EMPTY);
        let mut is_anon = true;
        let mut need_private = false;
        let mut mod_orig: Option<SymId> = None;

        let gram_obj: Option<SymId>;
        if prod_name.is_some() {
            self.advance();
        }
        if self.check(TokenKind::LParen) {
            // tagged rule: the match object is the named class prod(tag)
            self.advance();
            if let Some(tag) = self.cur_sym() {
                sub_tag = tag;
            } else {
                let found = self.describe_cur();
                self.log(
                    ErrorCode::GrammarRequiresName,
                    format!("expected a tag name in 'grammar', found {found}"),
                );
            }
            let tag_text = format!(
                "{}({})",
                self.interner.resolve(name_tag),
                self.interner.resolve(sub_tag)
            );
            name_tag = self.interner.intern(&tag_text);
            if !matches!(self.advance(), TokenKind::RParen) {
                self.log(
                    ErrorCode::GrammarRequiresNameRParen,
                    "expected ')' after the grammar tag",
                );
            } else {
                self.advance();
            }

            let mut is_class = true;
            let mut trans = false;
            let (obj, orig, _) =
                self.find_or_def_obj(name_tag, replace, modify, &mut is_class, &mut trans);
            gram_obj = obj;
            mod_orig = orig;
            is_anon = false;
            // a named match object keeps its rules in a private list so
            // modify/replace can target them at link time
            need_private = true;
        } else if !replace && !modify && self.check(TokenKind::Semi) {
            // bare declaration: 'grammar x;' just marks the production as
            // explicitly declared
            if let Some(name) = prod_name {
                if let Some(prod) = self.symtab.gramprods.get_mut(&name) {
                    prod.declared = true;
                }
            }
            self.advance();
            return Ok(None);
        } else {
            let pos = self.pos();
            let anon_name = self.interner.intern(".anon");
            let obj = ObjectSym {
                obj_id: self.symtab.new_obj_id(),
                dict: self.symtab.cur_dict,
                ..ObjectSym::default()
            };
            gram_obj = Some(
                self.symtab
                    .add_unnamed(Symbol::new(anon_name, pos, SymKind::Object(obj))),
            );
            if replace || modify {
                self.log(
                    ErrorCode::GrammarModRequiresTag,
                    "only tagged grammar rules can be replaced or modified",
                );
            }
        }

        if !self.eat(TokenKind::Colon) {
            let found = self.describe_cur();
            self.log(
                ErrorCode::GrammarRequiresColon,
                format!("expected ':' in 'grammar', found {found}"),
            );
        }

        // the match object is a factory for match-tree instances
        if let Some(obj) = gram_obj {
            if let Some(o) = self.symtab.sym_mut(obj).as_object_mut() {
                o.is_class = true;
            }
        }

        let mut arrows: Vec<SymId> = Vec::new();
        if modify && self.check(TokenKind::Colon) {
            // 'modify' with an empty rule list keeps the original rules
            self.advance();
        } else {
            let alts = self.parse_gram_alts(&mut arrows)?;
            let gram_alts: Vec<GramAlt> = alts
                .into_iter()
                .map(|seq| GramAlt {
                    score: 0,
                    badness: seq.badness,
                    proc_obj: gram_obj,
                    dict: self.symtab.cur_dict,
                    toks: seq.toks,
                })
                .collect();
            if need_private {
                if let (Some(obj), Some(prod)) = (gram_obj, prod_sym) {
                    if let Some(o) = self.symtab.sym_mut(obj).as_object_mut() {
                        o.grammar_entry = Some(Box::new(GramProd {
                            sym: prod,
                            declared: false,
                            alts: gram_alts,
                        }));
                    }
                }
            } else if let Some(name) = prod_name {
                if let Some(prod) = self.symtab.gramprods.get_mut(&name) {
                    prod.alts.extend(gram_alts);
                }
            }
        }

        let stmt = self.parse_object_body(
            gram_obj, true, is_anon, true, false, modify, mod_orig, 0, None, None, false,
        )?;

        if let Some(stmt_id) = stmt {
            // grammarInfo: the name tag plus the arrow-assigned properties
            let mut elems: Vec<&'a Expr<'a>> = Vec::new();
            elems.push(self.expr(Expr::Const(Const::SStr(name_tag))));
            for &prop in &arrows {
                let prop_name = self.symtab.sym(prop).name;
                let pos = self.pos();
                elems.push(self.expr(Expr::Sym {
                    name: prop_name,
                    pos,
                }));
            }
            let info_list = self.expr(Expr::List(self.arena.alloc_slice_fill(elems)));
            let pos = self.pos();
            if let Some(prop) = self.look_up_prop(self.n_grammar_info, false) {
                let val = self.prop_val_for_expr(info_list, false, pos);
                self.program.object_mut(stmt_id).add_prop(ObjectProp {
                    prop,
                    val,
                    is_static: false,
                    overwritable: false,
                    replace: false,
                    pos,
                });
            }
            if let Some(prop) = self.look_up_prop(self.n_grammar_tag, false) {
                let val = self.expr(Expr::Const(Const::SStr(sub_tag)));
                self.program.object_mut(stmt_id).add_prop(ObjectProp {
                    prop,
                    val: crate::ast::PropVal::Expr(val),
                    is_static: false,
                    overwritable: false,
                    replace: false,
                    pos,
                });
            }
        }
        Ok(stmt.map(TopStmt::Object))
    }

    /// Parses the rule list up to and including the ':' that opens the
    /// match object body. Returns the flattened alternatives.
    fn parse_gram_alts(&mut self, arrows: &mut Vec<SymId>) -> Result<Vec<GramSeq>> {
        let alts = self.parse_gram_alt_list(false, arrows)?;
        Ok(alts)
    }

    /// Alternation list: `seq (| seq)*`, ended by ':' at top level or ')'
    /// inside a group (the terminator is consumed).
    fn parse_gram_alt_list(
        &mut self,
        in_group: bool,
        arrows: &mut Vec<SymId>,
    ) -> Result<Vec<GramSeq>> {
        let mut alts: Vec<GramSeq> = Vec::new();
        loop {
            let seqs = self.parse_gram_seq(in_group, arrows)?;
            alts.extend(seqs);
            match self.kind() {
                TokenKind::Pipe => {
                    self.advance();
                }
                TokenKind::Colon if !in_group => {
                    self.advance();
                    return Ok(alts);
                }
                TokenKind::RParen if in_group => {
                    self.advance();
                    return Ok(alts);
                }
                TokenKind::Eof => {
                    self.log(
                        ErrorCode::GrammarInvalidToken,
                        "end of file in grammar rule list",
                    );
                    return Err(tadsc_base::Fatal);
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::GrammarInvalidToken,
                        format!("invalid token {found} in grammar rule"),
                    );
                    self.advance();
                }
            }
        }
    }

    /// One concatenation sequence; parenthesized alternation groups are
    /// flattened by crossing every current prefix with every group branch.
    fn parse_gram_seq(
        &mut self,
        in_group: bool,
        arrows: &mut Vec<SymId>,
    ) -> Result<Vec<GramSeq>> {
        let mut seqs: Vec<GramSeq> = vec![GramSeq::default()];
        loop {
            match self.kind() {
                TokenKind::Pipe | TokenKind::Eof => return Ok(seqs),
                TokenKind::Colon if !in_group => return Ok(seqs),
                TokenKind::RParen if in_group => return Ok(seqs),
                TokenKind::LParen => {
                    self.advance();
                    let group = self.parse_gram_alt_list(true, arrows)?;
                    let mut crossed: Vec<GramSeq> = Vec::new();
                    for prefix in &seqs {
                        for branch in &group {
                            let mut seq = prefix.clone();
                            seq.toks.extend(branch.toks.iter().cloned());
                            seq.badness += branch.badness;
                            crossed.push(seq);
                        }
                    }
                    seqs = crossed;
                }
                TokenKind::LBracket => {
                    // '[badness n]' annotation
                    self.advance();
                    let mut badness: i16 = 1;
                    let ok = matches!(self.kind(), TokenKind::Sym(n) if n == self.n_badness);
                    if ok {
                        self.advance();
                        if let TokenKind::Int(v) = self.kind() {
                            badness = v as i16;
                            self.advance();
                        }
                    } else {
                        let found = self.describe_cur();
                        self.log(
                            ErrorCode::GrammarInvalidToken,
                            format!("expected 'badness' in '[ ]', found {found}"),
                        );
                    }
                    if !self.eat(TokenKind::RBracket) {
                        self.log(ErrorCode::ExpectedRBracket, "expected ']' after 'badness'");
                    }
                    for seq in &mut seqs {
                        seq.badness = badness;
                    }
                }
                TokenKind::Times => {
                    self.advance();
                    for seq in &mut seqs {
                        seq.toks.push(GramTok::Star);
                    }
                }
                TokenKind::SStr(text) => {
                    self.advance();
                    for seq in &mut seqs {
                        seq.toks.push(GramTok::Literal(text));
                    }
                }
                TokenKind::Lt => {
                    // part-of-speech list: <prop prop ...>
                    self.advance();
                    let mut props: Vec<u16> = Vec::new();
                    loop {
                        match self.kind() {
                            TokenKind::Gt => {
                                self.advance();
                                break;
                            }
                            TokenKind::Sym(n) => {
                                if let Some(p) = self.look_up_prop(n, true) {
                                    if let Some(ps) = self.symtab.sym(p).as_property() {
                                        props.push(ps.prop_id);
                                    }
                                }
                                self.advance();
                            }
                            _ => {
                                let found = self.describe_cur();
                                self.log(
                                    ErrorCode::GrammarRequiresGt,
                                    format!("expected '>' to close the part-of-speech list, found {found}"),
                                );
                                break;
                            }
                        }
                    }
                    for seq in &mut seqs {
                        seq.toks.push(GramTok::PartOfSpeechList(props.clone()));
                    }
                }
                TokenKind::Sym(name) => {
                    self.advance();
                    let tok = self.resolve_gram_element(name);
                    if let Some(tok) = tok {
                        for seq in &mut seqs {
                            seq.toks.push(tok.clone());
                        }
                    }
                    // '->prop' arrow after an element
                    if self.eat(TokenKind::Arrow) {
                        match self.cur_sym() {
                            Some(p) => {
                                if let Some(prop) = self.look_up_prop(p, true) {
                                    if !arrows.contains(&prop) {
                                        arrows.push(prop);
                                    }
                                }
                                self.advance();
                            }
                            None => {
                                let found = self.describe_cur();
                                self.log(
                                    ErrorCode::GrammarArrowRequiresProp,
                                    format!("expected a property name after '->', found {found}"),
                                );
                            }
                        }
                    }
                }
                _ => {
                    let found = self.describe_cur();
                    self.log(
                        ErrorCode::GrammarInvalidToken,
                        format!("invalid token {found} in grammar rule"),
                    );
                    self.advance();
                }
            }
        }
    }

    /// Resolves a bare name in a rule: an enum token, a part-of-speech
    /// property, or a (possibly forward) sub-production.
    fn resolve_gram_element(&mut self, name: NameId) -> Option<GramTok> {
        match self.symtab.find(name) {
            Some(id) => match &self.symtab.sym(id).kind {
                SymKind::Enum(e) => {
                    let is_token = e.is_token;
                    let enum_id = e.enum_id;
                    if !is_token {
                        let text = self.interner.resolve(name).to_string();
                        self.log(
                            ErrorCode::GrammarBadEnum,
                            format!("enum '{text}' is not an 'enum token'"),
                        );
                    }
                    Some(GramTok::TokenType(enum_id))
                }
                SymKind::Property(p) => Some(GramTok::PartOfSpeech(p.prop_id)),
                SymKind::Object(_) => {
                    let prod = self.declare_gramprod(name)?;
                    Some(GramTok::Prod(prod))
                }
                other => {
                    let text = self.interner.resolve(name).to_string();
                    let what = other.describe();
                    self.log(
                        ErrorCode::GrammarInvalidToken,
                        format!("'{text}' ({what}) is not valid in a grammar rule"),
                    );
                    None
                }
            },
            None => {
                let prod = self.declare_gramprod(name)?;
                Some(GramTok::Prod(prod))
            }
        }
    }
}
