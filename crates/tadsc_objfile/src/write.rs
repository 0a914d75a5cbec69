//! Object-file writer.
//!
//! A pure walk of the symbol table at end-of-compile. Object-file symbol
//! and dictionary indices are assigned densely from 1 in emission order
//! (0 is the null reference), so cross-references are compact integers.

use crate::format::{
    BifFlags, BuildConfig, EnumFlags, FuncFlags, GramTokKind, MetaTagByte, ObjFlags, ProdFlags,
    PropFlags, SymRecordKind, FILE_VERSION, OBJ_FILE_SIG,
};
use crate::io::{ObjWriter, Result};
use std::collections::HashMap;
use std::io::{Seek, Write};
use tadsc_base::Interner;
use tadsc_parse::symtab::{GramProd, GramTok, MetaclassTag, SymId, SymKind, Symbol, SymbolTable};

pub(crate) struct WriteCtx<'t> {
    pub symtab: &'t SymbolTable,
    pub interner: &'t Interner,
    sym_idx: HashMap<SymId, u32>,
    dict_idx: HashMap<SymId, u32>,
    next_sym: u32,
    next_dict: u32,
}

impl<'t> WriteCtx<'t> {
    pub fn new(symtab: &'t SymbolTable, interner: &'t Interner) -> Self {
        WriteCtx {
            symtab,
            interner,
            sym_idx: HashMap::new(),
            dict_idx: HashMap::new(),
            next_sym: 1,
            next_dict: 1,
        }
    }

    fn assign_sym(&mut self, id: SymId) -> u32 {
        let next = &mut self.next_sym;
        *self.sym_idx.entry(id).or_insert_with(|| {
            let idx = *next;
            *next += 1;
            idx
        })
    }

    fn assign_dict(&mut self, id: SymId) -> u32 {
        let next = &mut self.next_dict;
        *self.dict_idx.entry(id).or_insert_with(|| {
            let idx = *next;
            *next += 1;
            idx
        })
    }

    fn sym_ref(&self, id: Option<SymId>) -> u32 {
        id.and_then(|id| self.sym_idx.get(&id).copied()).unwrap_or(0)
    }

    fn dict_ref(&self, id: Option<SymId>) -> u32 {
        id.and_then(|id| self.dict_idx.get(&id).copied()).unwrap_or(0)
    }
}

/// Writes the complete object file and returns the underlying sink.
pub fn write_object_file<W: Write + Seek>(
    sink: W,
    symtab: &SymbolTable,
    interner: &Interner,
    config: Option<&BuildConfig>,
) -> Result<W> {
    let mut w = ObjWriter::new(sink);
    let mut ctx = WriteCtx::new(symtab, interner);

    w.bytes(OBJ_FILE_SIG)?;
    w.u32(FILE_VERSION)?;

    // opaque build-config blob, length-prefixed (possibly empty)
    match config {
        Some(cfg) => {
            let blob = cfg.to_bytes();
            w.u32(blob.len() as u32)?;
            w.bytes(&blob)?;
        }
        None => w.u32(0)?,
    }

    // intrinsic function sets and intrinsic classes
    w.u32(symtab.fnsets.len() as u32)?;
    for &name in &symtab.fnsets {
        w.str16(interner.resolve(name))?;
    }
    w.u32(symtab.metas.len() as u32)?;
    for &name in &symtab.metas {
        w.str16(interner.resolve(name))?;
    }

    // index-table sizes and the named-symbol count are patched after the
    // bodies are written
    let sym_tab_at = w.placeholder_u32()?;
    let dict_tab_at = w.placeholder_u32()?;
    let sym_cnt_at = w.placeholder_u32()?;

    let mut sym_cnt = 0u32;
    for (id, sym) in symtab.enumerate() {
        write_symbol_record(&mut w, &mut ctx, id, sym)?;
        sym_cnt += 1;
    }

    // anonymous objects, in definition order
    w.u32(symtab.anon_objs.len() as u32)?;
    for &id in &symtab.anon_objs {
        let sym = symtab.sym(id);
        write_symbol_record(&mut w, &mut ctx, id, sym)?;
    }

    // non-symbol object ids
    w.u32(symtab.nonsym_objs.len() as u32)?;
    for &oid in &symtab.nonsym_objs {
        w.u32(oid)?;
    }

    w.patch_u32(sym_tab_at, ctx.next_sym)?;
    w.patch_u32(dict_tab_at, ctx.next_dict)?;
    w.patch_u32(sym_cnt_at, sym_cnt)?;

    // cross-references; written after all bodies so every index is known
    let xref_cnt_at = w.placeholder_u32()?;
    let mut xref_cnt = 0u32;
    for (id, sym) in symtab.enumerate() {
        if write_xref_record(&mut w, &ctx, id, sym)? {
            xref_cnt += 1;
        }
    }
    w.patch_u32(xref_cnt_at, xref_cnt)?;

    w.u32(symtab.anon_objs.len() as u32)?;
    for &id in &symtab.anon_objs {
        let sym = symtab.sym(id);
        if !write_xref_record(&mut w, &ctx, id, sym)? {
            // anonymous entries are always objects; keep the record count
            // aligned with the anon list regardless
            w.u32(0)?;
            w.u32(0)?;
            w.u32(0)?;
            w.u32(0)?;
        }
    }

    // grammar productions: the master (anonymous-rule) list first
    w.u32(symtab.gramprods.len() as u32)?;
    for prod in symtab.gramprods.values() {
        write_prod(&mut w, &ctx, prod)?;
    }

    // then the private rule lists of named match objects
    let named_cnt_at = w.placeholder_u32()?;
    let mut named_cnt = 0u32;
    for (id, sym) in symtab.enumerate() {
        if let SymKind::Object(o) = &sym.kind {
            if let Some(entry) = &o.grammar_entry {
                w.u32(ctx.sym_ref(Some(id)))?;
                write_prod(&mut w, &ctx, entry)?;
                named_cnt += 1;
            }
        }
    }
    w.patch_u32(named_cnt_at, named_cnt)?;

    // exports
    w.u32(symtab.exports.len() as u32)?;
    for exp in &symtab.exports {
        w.str16(interner.resolve(exp.sym))?;
        w.str16(interner.resolve(exp.ext))?;
    }

    Ok(w.into_inner())
}

fn meta_byte(tag: MetaclassTag) -> MetaTagByte {
    match tag {
        MetaclassTag::TadsObject => MetaTagByte::TadsObject,
        MetaclassTag::Dictionary => MetaTagByte::Dictionary,
        MetaclassTag::GrammarProd => MetaTagByte::GrammarProd,
        MetaclassTag::IntrinsicClassModifier => MetaTagByte::IntrinsicClassModifier,
    }
}

/// Writes one symbol record: kind byte, length-prefixed name, kind body.
fn write_symbol_record<W: Write + Seek>(
    w: &mut ObjWriter<W>,
    ctx: &mut WriteCtx<'_>,
    id: SymId,
    sym: &Symbol,
) -> Result<()> {
    ctx.assign_sym(id);
    match &sym.kind {
        SymKind::Function(f) => {
            w.u8(SymRecordKind::Function.into())?;
            w.str16(ctx.interner.resolve(sym.name))?;
            let mut flags = FuncFlags::empty();
            flags.set(FuncFlags::EXTERNAL, sym.external);
            flags.set(FuncFlags::VARARGS, f.varargs);
            flags.set(FuncFlags::HAS_RETVAL, f.has_retval);
            flags.set(FuncFlags::MULTIMETHOD, f.is_multimethod);
            flags.set(FuncFlags::MM_BASE, f.is_mm_base);
            flags.set(FuncFlags::MM_DEF, f.mm_def);
            flags.set(FuncFlags::EXT_REPLACE, f.ext_replace);
            flags.set(FuncFlags::HAS_BODY, f.code_body.is_some());
            w.u16(flags.bits())?;
            w.u16(f.argc)?;
            w.u16(f.opt_argc)?;
        }
        SymKind::Object(o) => {
            if o.metaclass == MetaclassTag::Dictionary {
                ctx.assign_dict(id);
            }
            w.u8(SymRecordKind::Object.into())?;
            w.str16(ctx.interner.resolve(sym.name))?;
            w.u32(o.obj_id)?;
            let mut flags = ObjFlags::empty();
            flags.set(ObjFlags::EXTERNAL, sym.external);
            flags.set(ObjFlags::CLASS, o.is_class);
            flags.set(ObjFlags::TRANSIENT, o.transient);
            flags.set(ObjFlags::EXT_MODIFY, o.ext_modify);
            flags.set(ObjFlags::EXT_REPLACE, o.ext_replace);
            flags.set(ObjFlags::SC_IS_ROOT, o.sc_is_root);
            w.u16(flags.bits())?;
            w.u8(meta_byte(o.metaclass).into())?;
            w.u16(o.sc_names.len() as u16)?;
            for &sc in &o.sc_names {
                w.str16(ctx.interner.resolve(sc))?;
            }
            w.u16(o.vocab.len() as u16)?;
            for word in &o.vocab {
                w.str16(ctx.interner.resolve(word.word))?;
                let prop_id = ctx
                    .symtab
                    .sym(word.prop)
                    .as_property()
                    .map(|p| p.prop_id)
                    .unwrap_or(0);
                w.u16(prop_id)?;
            }
            w.u16(o.del_props.len() as u16)?;
            for &del in &o.del_props {
                let prop_id = ctx
                    .symtab
                    .sym(del)
                    .as_property()
                    .map(|p| p.prop_id)
                    .unwrap_or(0);
                w.u16(prop_id)?;
            }
        }
        SymKind::Property(p) => {
            w.u8(SymRecordKind::Property.into())?;
            w.str16(ctx.interner.resolve(sym.name))?;
            w.u16(p.prop_id)?;
            let mut flags = PropFlags::empty();
            flags.set(PropFlags::VOCAB, p.vocab);
            flags.set(PropFlags::WEAK, p.weak);
            w.u8(flags.bits())?;
        }
        SymKind::Enum(e) => {
            w.u8(SymRecordKind::Enum.into())?;
            w.str16(ctx.interner.resolve(sym.name))?;
            w.u32(e.enum_id)?;
            let mut flags = EnumFlags::empty();
            flags.set(EnumFlags::IS_TOKEN, e.is_token);
            w.u8(flags.bits())?;
        }
        SymKind::Builtin(b) => {
            w.u8(SymRecordKind::Builtin.into())?;
            w.str16(ctx.interner.resolve(sym.name))?;
            w.u16(b.fnset)?;
            w.u16(b.index)?;
            w.u16(b.argc)?;
            w.u16(b.opt_argc)?;
            let mut flags = BifFlags::empty();
            flags.set(BifFlags::VARARGS, b.varargs);
            flags.set(BifFlags::HAS_RETVAL, b.has_retval);
            w.u8(flags.bits())?;
        }
        SymKind::Metaclass(m) => {
            w.u8(SymRecordKind::Metaclass.into())?;
            w.str16(ctx.interner.resolve(sym.name))?;
            w.u16(m.meta_idx)?;
            w.str16(ctx.interner.resolve(m.ext_name))?;
            let super_idx = m
                .super_meta
                .and_then(|s| ctx.symtab.sym(s).as_metaclass())
                .map(|s| s.meta_idx)
                .unwrap_or(u16::MAX);
            w.u16(super_idx)?;
            w.u16(m.props.len() as u16)?;
            for mp in &m.props {
                let prop_id = ctx
                    .symtab
                    .sym(mp.prop)
                    .as_property()
                    .map(|p| p.prop_id)
                    .unwrap_or(0);
                w.u16(prop_id)?;
                w.u8(mp.is_static as u8)?;
            }
        }
    }
    Ok(())
}

/// Writes one cross-reference record for an object symbol: its own index,
/// dictionary index, modification-base index, and resolved superclasses.
fn write_xref_record<W: Write + Seek>(
    w: &mut ObjWriter<W>,
    ctx: &WriteCtx<'_>,
    id: SymId,
    sym: &Symbol,
) -> Result<bool> {
    let obj = match &sym.kind {
        SymKind::Object(o) => o,
        _ => return Ok(false),
    };
    w.u32(ctx.sym_ref(Some(id)))?;
    w.u32(ctx.dict_ref(obj.dict))?;
    w.u32(ctx.sym_ref(obj.mod_base))?;
    let sc_ids: Vec<u32> = obj
        .sc_names
        .iter()
        .map(|&n| ctx.sym_ref(ctx.symtab.find(n)))
        .collect();
    w.u32(sc_ids.len() as u32)?;
    for sc in sc_ids {
        w.u32(sc)?;
    }
    Ok(true)
}

/// Writes one grammar production and its alternatives.
fn write_prod<W: Write + Seek>(
    w: &mut ObjWriter<W>,
    ctx: &WriteCtx<'_>,
    prod: &GramProd,
) -> Result<()> {
    w.u32(ctx.sym_ref(Some(prod.sym)))?;
    let mut flags = ProdFlags::empty();
    flags.set(ProdFlags::DECLARED, prod.declared);
    w.u32(flags.bits())?;
    w.u32(prod.alts.len() as u32)?;
    for alt in &prod.alts {
        w.i16(alt.score)?;
        w.i16(alt.badness)?;
        w.u32(ctx.sym_ref(alt.proc_obj))?;
        w.u32(ctx.dict_ref(alt.dict))?;
        w.u32(alt.toks.len() as u32)?;
        for tok in &alt.toks {
            match tok {
                GramTok::Prod(sub) => {
                    w.u16(GramTokKind::Prod.into())?;
                    w.u32(ctx.sym_ref(Some(*sub)))?;
                }
                GramTok::TokenType(id) => {
                    w.u16(GramTokKind::TokenType.into())?;
                    w.u32(*id)?;
                }
                GramTok::PartOfSpeech(p) => {
                    w.u16(GramTokKind::PartOfSpeech.into())?;
                    w.u16(*p)?;
                }
                GramTok::Literal(text) => {
                    w.u16(GramTokKind::Literal.into())?;
                    w.str16(ctx.interner.resolve(*text))?;
                }
                GramTok::Star => {
                    w.u16(GramTokKind::Star.into())?;
                }
                GramTok::PartOfSpeechList(props) => {
                    w.u16(GramTokKind::PartOfSpeechList.into())?;
                    w.u16(props.len() as u16)?;
                    for p in props {
                        w.u16(*p)?;
                    }
                }
            }
        }
    }
    Ok(())
}
