//! Object-file reader.
//!
//! Recovers the full record structure for the linker (and for round-trip
//! verification). Every cross-reference index is validated against the
//! declared symbol-index table size.

use crate::format::{
    BifFlags, EnumFlags, FuncFlags, GramTokKind, MetaTagByte, ObjFlags, ProdFlags, PropFlags,
    SymRecordKind, FILE_VERSION, OBJ_FILE_SIG,
};
use crate::io::{Error, ObjReader, Result};
use std::io::{Read, Seek};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymRecord {
    pub name: String,
    pub body: SymBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymBody {
    Function {
        flags: FuncFlags,
        argc: u16,
        opt_argc: u16,
    },
    Object {
        obj_id: u32,
        flags: ObjFlags,
        meta: MetaTagByte,
        sc_names: Vec<String>,
        vocab: Vec<(String, u16)>,
        del_props: Vec<u16>,
    },
    Property {
        prop_id: u16,
        flags: PropFlags,
    },
    Enum {
        enum_id: u32,
        flags: EnumFlags,
    },
    Builtin {
        fnset: u16,
        index: u16,
        argc: u16,
        opt_argc: u16,
        flags: BifFlags,
    },
    Metaclass {
        meta_idx: u16,
        ext_name: String,
        super_idx: u16,
        props: Vec<(u16, bool)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefRecord {
    pub sym: u32,
    pub dict: u32,
    pub mod_base: u32,
    pub superclasses: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokRecord {
    Prod(u32),
    TokenType(u32),
    PartOfSpeech(u16),
    PartOfSpeechList(Vec<u16>),
    Literal(String),
    Star,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltRecord {
    pub score: i16,
    pub badness: i16,
    pub proc_obj: u32,
    pub dict: u32,
    pub toks: Vec<TokRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProdRecord {
    pub prod_idx: u32,
    pub flags: ProdFlags,
    pub alts: Vec<AltRecord>,
}

/// Everything a linker needs from one object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjFileData {
    pub version: u32,
    pub build_config: Vec<u8>,
    pub fnsets: Vec<String>,
    pub metas: Vec<String>,
    pub sym_index_size: u32,
    pub dict_index_size: u32,
    pub symbols: Vec<SymRecord>,
    pub anon_objs: Vec<SymRecord>,
    pub nonsym_ids: Vec<u32>,
    pub xrefs: Vec<XrefRecord>,
    pub anon_xrefs: Vec<XrefRecord>,
    pub prods: Vec<ProdRecord>,
    pub named_prods: Vec<(u32, ProdRecord)>,
    pub exports: Vec<(String, String)>,
}

/// Reads and validates a complete object file.
pub fn read_object_file<R: Read + Seek>(source: R) -> Result<ObjFileData> {
    let mut r = ObjReader::new(source);
    r.expect_signature(OBJ_FILE_SIG)?;
    let version = r.u32()?;
    if version != FILE_VERSION {
        return Err(Error::BadVersion(version));
    }

    let cfg_len = r.u32()? as usize;
    let build_config = r.bytes(cfg_len)?;

    let fnsets = read_name_list(&mut r)?;
    let metas = read_name_list(&mut r)?;

    let sym_index_size = r.u32()?;
    let dict_index_size = r.u32()?;
    let sym_count = r.u32()?;

    let mut symbols = Vec::with_capacity(sym_count as usize);
    for _ in 0..sym_count {
        symbols.push(read_symbol_record(&mut r)?);
    }

    let anon_count = r.u32()?;
    let mut anon_objs = Vec::with_capacity(anon_count as usize);
    for _ in 0..anon_count {
        anon_objs.push(read_symbol_record(&mut r)?);
    }

    let nonsym_count = r.u32()?;
    let mut nonsym_ids = Vec::with_capacity(nonsym_count as usize);
    for _ in 0..nonsym_count {
        nonsym_ids.push(r.u32()?);
    }

    let xref_count = r.u32()?;
    let mut xrefs = Vec::with_capacity(xref_count as usize);
    for _ in 0..xref_count {
        xrefs.push(read_xref(&mut r, sym_index_size, dict_index_size)?);
    }

    let anon_xref_count = r.u32()?;
    let mut anon_xrefs = Vec::with_capacity(anon_xref_count as usize);
    for _ in 0..anon_xref_count {
        anon_xrefs.push(read_xref(&mut r, sym_index_size, dict_index_size)?);
    }

    let prod_count = r.u32()?;
    let mut prods = Vec::with_capacity(prod_count as usize);
    for _ in 0..prod_count {
        prods.push(read_prod(&mut r, sym_index_size, dict_index_size)?);
    }

    let named_count = r.u32()?;
    let mut named_prods = Vec::with_capacity(named_count as usize);
    for _ in 0..named_count {
        let owner = check_sym_idx(r.u32()?, sym_index_size)?;
        let prod = read_prod(&mut r, sym_index_size, dict_index_size)?;
        named_prods.push((owner, prod));
    }

    let export_count = r.u32()?;
    let mut exports = Vec::with_capacity(export_count as usize);
    for _ in 0..export_count {
        let sym = r.str16()?;
        let ext = r.str16()?;
        exports.push((sym, ext));
    }

    Ok(ObjFileData {
        version,
        build_config,
        fnsets,
        metas,
        sym_index_size,
        dict_index_size,
        symbols,
        anon_objs,
        nonsym_ids,
        xrefs,
        anon_xrefs,
        prods,
        named_prods,
        exports,
    })
}

fn read_name_list<R: Read + Seek>(r: &mut ObjReader<R>) -> Result<Vec<String>> {
    let count = r.u32()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(r.str16()?);
    }
    Ok(out)
}

fn check_sym_idx(idx: u32, size: u32) -> Result<u32> {
    if idx >= size {
        return Err(Error::BadRecord(format!(
            "symbol index {idx} out of range (table size {size})"
        )));
    }
    Ok(idx)
}

fn check_dict_idx(idx: u32, size: u32) -> Result<u32> {
    if idx >= size {
        return Err(Error::BadRecord(format!(
            "dictionary index {idx} out of range (table size {size})"
        )));
    }
    Ok(idx)
}

fn read_symbol_record<R: Read + Seek>(r: &mut ObjReader<R>) -> Result<SymRecord> {
    let kind_byte = r.u8()?;
    let kind = SymRecordKind::try_from(kind_byte)
        .map_err(|_| Error::BadRecord(format!("unknown symbol kind {kind_byte}")))?;
    let name = r.str16()?;
    let body = match kind {
        SymRecordKind::Function => {
            let flags = FuncFlags::from_bits_truncate(r.u16()?);
            let argc = r.u16()?;
            let opt_argc = r.u16()?;
            SymBody::Function {
                flags,
                argc,
                opt_argc,
            }
        }
        SymRecordKind::Object => {
            let obj_id = r.u32()?;
            let flags = ObjFlags::from_bits_truncate(r.u16()?);
            let meta_raw = r.u8()?;
            let meta = MetaTagByte::try_from(meta_raw)
                .map_err(|_| Error::BadRecord(format!("unknown metaclass tag {meta_raw}")))?;
            let sc_count = r.u16()?;
            let mut sc_names = Vec::with_capacity(sc_count as usize);
            for _ in 0..sc_count {
                sc_names.push(r.str16()?);
            }
            let vocab_count = r.u16()?;
            let mut vocab = Vec::with_capacity(vocab_count as usize);
            for _ in 0..vocab_count {
                let word = r.str16()?;
                let prop = r.u16()?;
                vocab.push((word, prop));
            }
            let del_count = r.u16()?;
            let mut del_props = Vec::with_capacity(del_count as usize);
            for _ in 0..del_count {
                del_props.push(r.u16()?);
            }
            SymBody::Object {
                obj_id,
                flags,
                meta,
                sc_names,
                vocab,
                del_props,
            }
        }
        SymRecordKind::Property => {
            let prop_id = r.u16()?;
            let flags = PropFlags::from_bits_truncate(r.u8()?);
            SymBody::Property { prop_id, flags }
        }
        SymRecordKind::Enum => {
            let enum_id = r.u32()?;
            let flags = EnumFlags::from_bits_truncate(r.u8()?);
            SymBody::Enum { enum_id, flags }
        }
        SymRecordKind::Builtin => {
            let fnset = r.u16()?;
            let index = r.u16()?;
            let argc = r.u16()?;
            let opt_argc = r.u16()?;
            let flags = BifFlags::from_bits_truncate(r.u8()?);
            SymBody::Builtin {
                fnset,
                index,
                argc,
                opt_argc,
                flags,
            }
        }
        SymRecordKind::Metaclass => {
            let meta_idx = r.u16()?;
            let ext_name = r.str16()?;
            let super_idx = r.u16()?;
            let prop_count = r.u16()?;
            let mut props = Vec::with_capacity(prop_count as usize);
            for _ in 0..prop_count {
                let prop = r.u16()?;
                let is_static = r.u8()? != 0;
                props.push((prop, is_static));
            }
            SymBody::Metaclass {
                meta_idx,
                ext_name,
                super_idx,
                props,
            }
        }
    };
    Ok(SymRecord { name, body })
}

fn read_xref<R: Read + Seek>(
    r: &mut ObjReader<R>,
    sym_size: u32,
    dict_size: u32,
) -> Result<XrefRecord> {
    let sym = check_sym_idx(r.u32()?, sym_size)?;
    let dict_raw = r.u32()?;
    let dict = if dict_raw == 0 {
        0
    } else {
        check_dict_idx(dict_raw, dict_size)?
    };
    let mod_raw = r.u32()?;
    let mod_base = if mod_raw == 0 {
        0
    } else {
        check_sym_idx(mod_raw, sym_size)?
    };
    let sc_count = r.u32()?;
    let mut superclasses = Vec::with_capacity(sc_count as usize);
    for _ in 0..sc_count {
        let raw = r.u32()?;
        // unresolved superclasses are written as the null reference
        let sc = if raw == 0 {
            0
        } else {
            check_sym_idx(raw, sym_size)?
        };
        superclasses.push(sc);
    }
    Ok(XrefRecord {
        sym,
        dict,
        mod_base,
        superclasses,
    })
}

fn read_prod<R: Read + Seek>(
    r: &mut ObjReader<R>,
    sym_size: u32,
    dict_size: u32,
) -> Result<ProdRecord> {
    let raw_idx = r.u32()?;
    let prod_idx = if raw_idx == 0 {
        0
    } else {
        check_sym_idx(raw_idx, sym_size)?
    };
    let flags = ProdFlags::from_bits_truncate(r.u32()?);
    let alt_count = r.u32()?;
    let mut alts = Vec::with_capacity(alt_count as usize);
    for _ in 0..alt_count {
        let score = r.i16()?;
        let badness = r.i16()?;
        let proc_raw = r.u32()?;
        let proc_obj = if proc_raw == 0 {
            0
        } else {
            check_sym_idx(proc_raw, sym_size)?
        };
        let dict_raw = r.u32()?;
        let dict = if dict_raw == 0 {
            0
        } else {
            check_dict_idx(dict_raw, dict_size)?
        };
        let tok_count = r.u32()?;
        let mut toks = Vec::with_capacity(tok_count as usize);
        for _ in 0..tok_count {
            let kind_raw = r.u16()?;
            let kind = GramTokKind::try_from(kind_raw)
                .map_err(|_| Error::BadRecord(format!("unknown grammar token kind {kind_raw}")))?;
            let tok = match kind {
                GramTokKind::Prod => TokRecord::Prod(check_sym_idx(r.u32()?, sym_size)?),
                GramTokKind::TokenType => TokRecord::TokenType(r.u32()?),
                GramTokKind::PartOfSpeech => TokRecord::PartOfSpeech(r.u16()?),
                GramTokKind::Literal => TokRecord::Literal(r.str16()?),
                GramTokKind::Star => TokRecord::Star,
                GramTokKind::PartOfSpeechList => {
                    let count = r.u16()?;
                    let mut props = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        props.push(r.u16()?);
                    }
                    TokRecord::PartOfSpeechList(props)
                }
            };
            toks.push(tok);
        }
        alts.push(AltRecord {
            score,
            badness,
            proc_obj,
            dict,
            toks,
        });
    }
    Ok(ProdRecord {
        prod_idx,
        flags,
        alts,
    })
}
