//! Write/read round trips over real parsed programs, against both an
//! in-memory cursor and a temporary file.

use pretty_assertions::assert_eq;
use std::io::Cursor;
use tadsc_base::{Arena, ErrorSink, FileId, Interner};
use tadsc_objfile::format::{BuildConfig, FuncFlags, ObjFlags};
use tadsc_objfile::read::{read_object_file, SymBody};
use tadsc_objfile::symfile::{read_symbol_file, write_symbol_file};
use tadsc_objfile::write::write_object_file;
use tadsc_parse::parse_source;
use tadsc_parse::symtab::{SymKind, SymbolTable};

const SOURCE: &str = r#"
    dictionary gDict;
    dictionary property noun, adjective;

    class Thing: object;
    class Room: Thing;

    Thing template 'desc' @location?;

    startRoom: Room 'the starting room'
        north = nil
    ;

    rock: Thing 'a rock' @startRoom
        noun = 'rock' 'stone'
        weight = 2
    ;

    enum token tokWord, tokInt;

    grammar nounPhrase(main): noun->noun1_ | 'the' noun->noun1_ : object;

    checkReach(actor, target) { return nil; }

    export startRoom 'start-room';
    export checkReach;
"#;

fn build_table<'a, 'i>(
    arena: &'a Arena,
    interner: &'i mut Interner,
) -> tadsc_parse::Parser<'a, 'i> {
    let p = parse_source(arena, interner, FileId(0), SOURCE);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    p
}

#[test]
fn object_file_round_trips_in_memory() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let p = build_table(&arena, &mut interner);

    let cfg = BuildConfig {
        tool_version: "0.1.0".into(),
        defines: vec![("LANGUAGE".into(), "en_us".into())],
        source_files: vec!["game.t".into()],
    };
    let sink = write_object_file(Cursor::new(Vec::new()), &p.symtab, p.interner, Some(&cfg))
        .expect("write");
    let data = read_object_file(Cursor::new(sink.into_inner())).expect("read");

    // the same ordered set of names comes back
    let written: Vec<String> = p
        .symtab
        .enumerate()
        .map(|(_, s)| p.interner.resolve(s.name).to_string())
        .collect();
    let read: Vec<String> = data.symbols.iter().map(|s| s.name.clone()).collect();
    assert_eq!(written, read);

    // build config survives the opaque blob
    assert_eq!(BuildConfig::from_bytes(&data.build_config), Some(cfg));

    // the anonymous grammar match objects came back too
    assert_eq!(data.anon_objs.len(), p.symtab.anon_objs.len());

    // grammar productions and exports survive in order
    assert_eq!(data.prods.len(), p.symtab.gramprods.len());
    assert_eq!(data.named_prods.len(), 1);
    assert_eq!(data.exports.len(), 2);
    assert_eq!(data.exports[0].0, "startRoom");
    assert_eq!(data.exports[0].1, "start-room");
    assert_eq!(data.exports[1].1, "checkReach");

    // every cross-reference index fits the declared table size (the
    // reader validates, so reaching here proves it; spot-check anyway)
    for x in data.xrefs.iter().chain(data.anon_xrefs.iter()) {
        assert!(x.sym < data.sym_index_size);
        for &sc in &x.superclasses {
            assert!(sc < data.sym_index_size);
        }
    }
}

#[test]
fn object_file_round_trips_through_a_real_file() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let p = build_table(&arena, &mut interner);

    let file = tempfile::NamedTempFile::new().expect("temp file");
    let handle = file.reopen().expect("reopen");
    write_object_file(handle, &p.symtab, p.interner, None).expect("write");

    let data = read_object_file(file.reopen().expect("reopen")).expect("read");
    assert!(data.build_config.is_empty());
    assert_eq!(data.symbols.len(), p.symtab.len());
}

#[test]
fn object_record_attributes_survive() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let p = build_table(&arena, &mut interner);

    let sink =
        write_object_file(Cursor::new(Vec::new()), &p.symtab, p.interner, None).expect("write");
    let data = read_object_file(Cursor::new(sink.into_inner())).expect("read");

    let rock = data
        .symbols
        .iter()
        .find(|s| s.name == "rock")
        .expect("rock record");
    match &rock.body {
        SymBody::Object {
            flags,
            sc_names,
            vocab,
            ..
        } => {
            assert!(!flags.contains(ObjFlags::CLASS));
            assert_eq!(sc_names, &vec!["Thing".to_string()]);
            let words: Vec<&str> = vocab.iter().map(|(w, _)| w.as_str()).collect();
            assert_eq!(words, vec!["rock", "stone"]);
        }
        other => panic!("expected object body, got {other:?}"),
    }

    let thing = data
        .symbols
        .iter()
        .find(|s| s.name == "Thing")
        .expect("Thing record");
    match &thing.body {
        SymBody::Object { flags, .. } => {
            assert!(flags.contains(ObjFlags::CLASS));
            assert!(flags.contains(ObjFlags::SC_IS_ROOT));
        }
        other => panic!("expected object body, got {other:?}"),
    }

    let check = data
        .symbols
        .iter()
        .find(|s| s.name == "checkReach")
        .expect("function record");
    match &check.body {
        SymBody::Function { flags, argc, .. } => {
            assert!(flags.contains(FuncFlags::HAS_BODY));
            assert!(!flags.contains(FuncFlags::EXTERNAL));
            assert_eq!(*argc, 2);
        }
        other => panic!("expected function body, got {other:?}"),
    }
}

#[test]
fn corrupt_signature_is_rejected() {
    let mut bytes = b"TADS3.WrongMagic".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    assert!(read_object_file(Cursor::new(bytes)).is_err());
}

#[test]
fn symbol_file_round_trips_key_attributes() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let p = build_table(&arena, &mut interner);

    let sink =
        write_symbol_file(Cursor::new(Vec::new()), &p.symtab, p.interner, None).expect("write");
    let bytes = sink.into_inner();

    let mut fresh = SymbolTable::new();
    let mut fresh_interner = Interner::new();
    let mut sink2 = ErrorSink::new();
    let count = read_symbol_file(
        Cursor::new(bytes),
        &mut fresh,
        &mut fresh_interner,
        &mut sink2,
    )
    .expect("read");
    assert!(count > 0);
    assert_eq!(sink2.count_of(tadsc_base::ErrorCode::SymFileRedef), 0);

    // same (name, kind, key attribute) tuples on both sides, for every
    // symbol that exports
    for (_, sym) in p.symtab.enumerate() {
        let name = p.interner.resolve(sym.name);
        if name.starts_with(' ') || name.starts_with('.') {
            continue;
        }
        if sym.external && !matches!(&sym.kind, SymKind::Function(f) if f.mm_def) {
            continue;
        }
        let imported_id = fresh_interner
            .lookup(name)
            .and_then(|n| fresh.find(n))
            .unwrap_or_else(|| panic!("symbol '{name}' missing after reimport"));
        let imported = fresh.sym(imported_id);
        match (&sym.kind, &imported.kind) {
            (SymKind::Object(a), SymKind::Object(b)) => {
                assert_eq!(a.is_class, b.is_class, "class flag of '{name}'");
                assert_eq!(a.sc_names.len(), b.sc_names.len(), "hierarchy of '{name}'");
                assert!(imported.external);
            }
            (SymKind::Property(a), SymKind::Property(b)) => {
                assert_eq!(a.vocab, b.vocab, "vocab flag of '{name}'");
            }
            (SymKind::Enum(a), SymKind::Enum(b)) => {
                assert_eq!(a.is_token, b.is_token, "token flag of '{name}'");
            }
            (SymKind::Function(a), SymKind::Function(b)) => {
                assert_eq!(a.argc, b.argc, "argc of '{name}'");
                assert_eq!(a.varargs, b.varargs, "varargs of '{name}'");
            }
            (SymKind::Builtin(_), SymKind::Builtin(_)) => {}
            (SymKind::Metaclass(_), SymKind::Metaclass(_)) => {}
            (a, b) => panic!(
                "kind mismatch for '{name}': {} vs {}",
                a.describe(),
                b.describe()
            ),
        }
    }

    // a second import of the same file is an idempotent reimport: only
    // pedantic notes, never errors
    let sink3 = write_symbol_file(Cursor::new(Vec::new()), &p.symtab, p.interner, None)
        .expect("write again");
    let mut sink4 = ErrorSink::new();
    read_symbol_file(
        Cursor::new(sink3.into_inner()),
        &mut fresh,
        &mut fresh_interner,
        &mut sink4,
    )
    .expect("reimport");
    assert!(!sink4.has_errors());
}

#[test]
fn symbol_file_bad_signature_reports() {
    let mut table = SymbolTable::new();
    let mut interner = Interner::new();
    let mut sink = ErrorSink::new();
    let mut bytes = b"NotASymbolFile!!".to_vec();
    bytes.extend_from_slice(&[0u8; 16]);
    let res = read_symbol_file(Cursor::new(bytes), &mut table, &mut interner, &mut sink);
    assert!(res.is_err());
    assert_eq!(sink.count_of(tadsc_base::ErrorCode::SymFileInvalidSig), 1);
}
