//! Symbol-export files.
//!
//! A symbol file is the compile-only prelude another module loads to learn
//! this module's global names: same signature/version framing as the
//! object file, the opaque build-config blob, the intrinsic lists, then
//! one lean record per exported symbol. Importing installs symbols as
//! `external` declarations; redefinitions that are not idempotent
//! reimports are reported at pedantic severity.

use crate::format::{
    BifFlags, BuildConfig, EnumFlags, FuncFlags, MetaTagByte, ObjFlags, PropFlags, SymRecordKind,
    FILE_VERSION, SYM_FILE_SIG,
};
use crate::io::{Error, ObjReader, ObjWriter, Result};
use std::io::{Read, Seek, Write};
use tadsc_base::{ErrorCode, ErrorSink, Interner, SourcePos};
use tadsc_parse::symtab::{
    BuiltinSym, EnumSym, FunctionSym, MetaclassSym, MetaclassTag, ObjectSym, PropertySym, SymKind,
    Symbol, SymbolTable,
};

/// True if this symbol belongs in the module's symbol file.
///
/// External declarations are re-exported only for multi-method base
/// symbols (which have no defining module until link time); synthesized
/// names (leading space, leading dot) never escape the module.
fn exports_to_sym_file(sym: &Symbol, interner: &Interner) -> bool {
    let name = interner.resolve(sym.name);
    if name.is_empty() || name.starts_with(' ') || name.starts_with('.') {
        return false;
    }
    if sym.external {
        return matches!(&sym.kind, SymKind::Function(f) if f.mm_def);
    }
    true
}

/// Writes the symbol-export file for a parsed translation unit.
pub fn write_symbol_file<W: Write + Seek>(
    sink: W,
    symtab: &SymbolTable,
    interner: &Interner,
    config: Option<&BuildConfig>,
) -> Result<W> {
    let mut w = ObjWriter::new(sink);
    w.bytes(SYM_FILE_SIG)?;
    w.u32(FILE_VERSION)?;

    match config {
        Some(cfg) => {
            let blob = cfg.to_bytes();
            w.u32(blob.len() as u32)?;
            w.bytes(&blob)?;
        }
        None => w.u32(0)?,
    }

    w.u32(symtab.fnsets.len() as u32)?;
    for &name in &symtab.fnsets {
        w.str16(interner.resolve(name))?;
    }
    w.u32(symtab.metas.len() as u32)?;
    for &name in &symtab.metas {
        w.str16(interner.resolve(name))?;
    }

    let cnt_at = w.placeholder_u32()?;
    let mut cnt = 0u32;
    for (_, sym) in symtab.enumerate() {
        if !exports_to_sym_file(sym, interner) {
            continue;
        }
        write_sym_record(&mut w, interner, sym)?;
        cnt += 1;
    }
    w.patch_u32(cnt_at, cnt)?;
    Ok(w.into_inner())
}

fn write_sym_record<W: Write + Seek>(
    w: &mut ObjWriter<W>,
    interner: &Interner,
    sym: &Symbol,
) -> Result<()> {
    match &sym.kind {
        SymKind::Function(f) => {
            w.u8(SymRecordKind::Function.into())?;
            w.str16(interner.resolve(sym.name))?;
            let mut flags = FuncFlags::empty();
            flags.set(FuncFlags::VARARGS, f.varargs);
            flags.set(FuncFlags::HAS_RETVAL, f.has_retval);
            flags.set(FuncFlags::MULTIMETHOD, f.is_multimethod);
            flags.set(FuncFlags::MM_BASE, f.is_mm_base);
            w.u16(flags.bits())?;
            w.u16(f.argc)?;
            w.u16(f.opt_argc)?;
        }
        SymKind::Object(o) => {
            w.u8(SymRecordKind::Object.into())?;
            w.str16(interner.resolve(sym.name))?;
            let mut flags = ObjFlags::empty();
            flags.set(ObjFlags::CLASS, o.is_class);
            flags.set(ObjFlags::TRANSIENT, o.transient);
            flags.set(ObjFlags::SC_IS_ROOT, o.sc_is_root);
            w.u16(flags.bits())?;
            let meta = match o.metaclass {
                MetaclassTag::TadsObject => MetaTagByte::TadsObject,
                MetaclassTag::Dictionary => MetaTagByte::Dictionary,
                MetaclassTag::GrammarProd => MetaTagByte::GrammarProd,
                MetaclassTag::IntrinsicClassModifier => MetaTagByte::IntrinsicClassModifier,
            };
            w.u8(meta.into())?;
            // the class hierarchy is exported so importing modules can
            // resolve inherited templates
            w.u16(o.sc_names.len() as u16)?;
            for &sc in &o.sc_names {
                w.str16(interner.resolve(sc))?;
            }
        }
        SymKind::Property(p) => {
            w.u8(SymRecordKind::Property.into())?;
            w.str16(interner.resolve(sym.name))?;
            let mut flags = PropFlags::empty();
            flags.set(PropFlags::VOCAB, p.vocab);
            w.u8(flags.bits())?;
        }
        SymKind::Enum(e) => {
            w.u8(SymRecordKind::Enum.into())?;
            w.str16(interner.resolve(sym.name))?;
            let mut flags = EnumFlags::empty();
            flags.set(EnumFlags::IS_TOKEN, e.is_token);
            w.u8(flags.bits())?;
        }
        SymKind::Builtin(b) => {
            w.u8(SymRecordKind::Builtin.into())?;
            w.str16(interner.resolve(sym.name))?;
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
            w.str16(interner.resolve(sym.name))?;
            w.str16(interner.resolve(m.ext_name))?;
        }
    }
    Ok(())
}

/// Skips to the build-configuration blob and returns its size, leaving the
/// reader positioned at its first byte. Returns 0 when the file is not a
/// symbol file.
pub fn seek_build_config<R: Read + Seek>(r: &mut ObjReader<R>) -> Result<u32> {
    if r.expect_signature(SYM_FILE_SIG).is_err() {
        return Ok(0);
    }
    let version = r.u32()?;
    if version != FILE_VERSION {
        return Ok(0);
    }
    r.u32()
}

/// Reads a symbol file into a symbol table, installing imported names as
/// external declarations. Returns the number of symbols read.
pub fn read_symbol_file<R: Read + Seek>(
    source: R,
    symtab: &mut SymbolTable,
    interner: &mut Interner,
    sink: &mut ErrorSink,
) -> Result<usize> {
    let mut r = ObjReader::new(source);
    if r.expect_signature(SYM_FILE_SIG).is_err() {
        sink.log(
            ErrorCode::SymFileInvalidSig,
            SourcePos::none(),
            "invalid symbol file signature",
        );
        return Err(Error::BadSignature);
    }
    let version = r.u32()?;
    if version != FILE_VERSION {
        return Err(Error::BadVersion(version));
    }

    // the build-config block belongs to the build tool; skip it here
    let cfg_len = r.u32()?;
    r.skip(cfg_len as u64)?;

    let fnset_count = r.u32()?;
    for _ in 0..fnset_count {
        let name = r.str16()?;
        let id = interner.intern(&name);
        symtab.find_or_add_fnset(id);
    }
    let meta_count = r.u32()?;
    for _ in 0..meta_count {
        let name = r.str16()?;
        let id = interner.intern(&name);
        symtab.find_or_add_meta(id);
    }

    let count = r.u32()? as usize;
    for _ in 0..count {
        let sym = read_sym_record(&mut r, symtab, interner)?;
        install_imported(symtab, interner, sink, sym);
    }
    Ok(count)
}

fn read_sym_record<R: Read + Seek>(
    r: &mut ObjReader<R>,
    symtab: &mut SymbolTable,
    interner: &mut Interner,
) -> Result<Symbol> {
    let kind_byte = r.u8()?;
    let kind = SymRecordKind::try_from(kind_byte)
        .map_err(|_| Error::BadRecord(format!("unknown symbol kind {kind_byte}")))?;
    let name_text = r.str16()?;
    let name = interner.intern(&name_text);
    let pos = SourcePos::none();
    let sym = match kind {
        SymRecordKind::Function => {
            let flags = FuncFlags::from_bits_truncate(r.u16()?);
            let argc = r.u16()?;
            let opt_argc = r.u16()?;
            Symbol::external(
                name,
                pos,
                SymKind::Function(FunctionSym {
                    argc,
                    opt_argc,
                    varargs: flags.contains(FuncFlags::VARARGS),
                    has_retval: flags.contains(FuncFlags::HAS_RETVAL),
                    is_multimethod: flags.contains(FuncFlags::MULTIMETHOD),
                    is_mm_base: flags.contains(FuncFlags::MM_BASE),
                    ..FunctionSym::default()
                }),
            )
        }
        SymRecordKind::Object => {
            let flags = ObjFlags::from_bits_truncate(r.u16()?);
            let meta_raw = r.u8()?;
            let meta = MetaTagByte::try_from(meta_raw)
                .map_err(|_| Error::BadRecord(format!("unknown metaclass tag {meta_raw}")))?;
            let sc_count = r.u16()?;
            let mut sc_names = Vec::with_capacity(sc_count as usize);
            for _ in 0..sc_count {
                let sc = r.str16()?;
                sc_names.push(interner.intern(&sc));
            }
            Symbol::external(
                name,
                pos,
                SymKind::Object(ObjectSym {
                    obj_id: symtab.new_obj_id(),
                    is_class: flags.contains(ObjFlags::CLASS),
                    transient: flags.contains(ObjFlags::TRANSIENT),
                    sc_is_root: flags.contains(ObjFlags::SC_IS_ROOT),
                    metaclass: match meta {
                        MetaTagByte::TadsObject => MetaclassTag::TadsObject,
                        MetaTagByte::Dictionary => MetaclassTag::Dictionary,
                        MetaTagByte::GrammarProd => MetaclassTag::GrammarProd,
                        MetaTagByte::IntrinsicClassModifier => {
                            MetaclassTag::IntrinsicClassModifier
                        }
                    },
                    sc_names,
                    ..ObjectSym::default()
                }),
            )
        }
        SymRecordKind::Property => {
            let flags = PropFlags::from_bits_truncate(r.u8()?);
            Symbol::new(
                name,
                pos,
                SymKind::Property(PropertySym {
                    prop_id: symtab.new_prop_id(),
                    vocab: flags.contains(PropFlags::VOCAB),
                    weak: false,
                }),
            )
        }
        SymRecordKind::Enum => {
            let flags = EnumFlags::from_bits_truncate(r.u8()?);
            Symbol::new(
                name,
                pos,
                SymKind::Enum(EnumSym {
                    enum_id: symtab.new_enum_id(),
                    is_token: flags.contains(EnumFlags::IS_TOKEN),
                }),
            )
        }
        SymRecordKind::Builtin => {
            let fnset = r.u16()?;
            let index = r.u16()?;
            let argc = r.u16()?;
            let opt_argc = r.u16()?;
            let flags = BifFlags::from_bits_truncate(r.u8()?);
            Symbol::new(
                name,
                pos,
                SymKind::Builtin(BuiltinSym {
                    fnset,
                    index,
                    argc,
                    opt_argc,
                    varargs: flags.contains(BifFlags::VARARGS),
                    has_retval: flags.contains(BifFlags::HAS_RETVAL),
                }),
            )
        }
        SymRecordKind::Metaclass => {
            let ext_text = r.str16()?;
            let ext_name = interner.intern(&ext_text);
            let meta_idx = symtab.find_or_add_meta(ext_name);
            Symbol::external(
                name,
                pos,
                SymKind::Metaclass(MetaclassSym {
                    meta_idx,
                    ext_name,
                    ..MetaclassSym::default()
                }),
            )
        }
    };
    Ok(sym)
}

/// Installs one imported symbol, displacing weak property entries and
/// reporting non-idempotent redefinitions at pedantic severity.
fn install_imported(
    symtab: &mut SymbolTable,
    interner: &Interner,
    sink: &mut ErrorSink,
    sym: Symbol,
) {
    let name = sym.name;
    if let Some(old) = symtab.find(name) {
        let old_sym = symtab.sym(old);
        if matches!(&old_sym.kind, SymKind::Property(p) if p.weak) {
            symtab.remove(old);
        } else {
            let same_kind =
                std::mem::discriminant(&old_sym.kind) == std::mem::discriminant(&sym.kind);
            // property / enum / builtin reimports are inherently
            // idempotent; declarations stay silent too
            let idempotent = same_kind
                && (old_sym.external
                    || matches!(
                        old_sym.kind,
                        SymKind::Property(_) | SymKind::Enum(_) | SymKind::Builtin(_)
                    ));
            if !idempotent {
                // if this is a real conflict it will produce a hard error
                // at link time; here it only rates a pedantic note
                let text = interner.resolve(name).to_string();
                sink.log(
                    ErrorCode::SymFileRedef,
                    SourcePos::none(),
                    format!("symbol '{text}' is already defined; ignoring the reimport"),
                );
            }
            return;
        }
    }
    let _ = symtab.add(sym);
}
