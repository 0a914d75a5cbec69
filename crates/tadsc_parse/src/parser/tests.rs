use crate::ast::{PropVal, TopStmt};
use crate::symtab::{MetaclassTag, SymKind};
use crate::parse_source;
use tadsc_base::{Arena, ErrorCode, FileId, Interner};

fn find(p: &crate::Parser<'_, '_>, name: &str) -> Option<crate::SymId> {
    p.interner.lookup(name).and_then(|n| p.symtab.find(n))
}

#[test]
fn simple_object_with_value_and_method() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        lamp: object
            brightness = 3
            describe() { "A brass lamp."; }
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let lamp = find(&p, "lamp").unwrap();
    let obj = p.symtab.sym(lamp).as_object().unwrap();
    let stmt = p.program.object(obj.stmt.unwrap());
    assert!(stmt.superclasses.is_empty());
    assert!(p.symtab.sym(lamp).as_object().unwrap().sc_names.is_empty());
    let brightness = find(&p, "brightness").unwrap();
    let describe = find(&p, "describe").unwrap();
    assert!(matches!(
        stmt.find_prop(brightness).unwrap().val,
        PropVal::Expr(_)
    ));
    assert!(matches!(
        stmt.find_prop(describe).unwrap().val,
        PropVal::Method(_)
    ));
}

#[test]
fn forward_referenced_extern_object_is_upgraded() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "extern object lobby; lobby: object;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors());
    let lobby = find(&p, "lobby").unwrap();
    assert!(!p.symtab.sym(lobby).external);
    assert!(p.symtab.sym(lobby).as_object().unwrap().stmt.is_some());
}

#[test]
fn duplicate_object_definition_is_an_error() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "door: object; door: object;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert_eq!(p.diags.count_of(ErrorCode::ObjRedef), 1);
}

#[test]
fn plus_nesting_sets_location() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        + property location;
        hall: object;
        + chest: object;
        ++ coin: object;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let location = find(&p, "location").unwrap();
    let hall = find(&p, "hall").unwrap();
    let chest = find(&p, "chest").unwrap();

    let chest_stmt = p
        .program
        .object(p.symtab.sym(chest).as_object().unwrap().stmt.unwrap());
    let loc_prop = chest_stmt.find_prop(location).unwrap();
    assert!(loc_prop.overwritable);
    match loc_prop.val {
        PropVal::Expr(e) => match e.as_const() {
            Some(crate::ast::Const::Object(s)) => assert_eq!(s, hall),
            other => panic!("expected object constant, got {other:?}"),
        },
        _ => panic!("expected expression value"),
    }

    let coin = find(&p, "coin").unwrap();
    let coin_stmt = p
        .program
        .object(p.symtab.sym(coin).as_object().unwrap().stmt.unwrap());
    match coin_stmt.find_prop(location).unwrap().val {
        PropVal::Expr(e) => match e.as_const() {
            Some(crate::ast::Const::Object(s)) => assert_eq!(s, chest),
            other => panic!("expected object constant, got {other:?}"),
        },
        _ => panic!("expected expression value"),
    }
}

#[test]
fn too_many_plus_signs_is_an_error() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        + property location;
        ++ lost: object;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert_eq!(p.diags.count_of(ErrorCode::PlusObjTooDeep), 1);
}

#[test]
fn nested_object_gets_lexical_parent() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        desk: object
            drawer: object { bulk = 1 }
            bulk = 10
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let desk = find(&p, "desk").unwrap();
    let drawer_prop = find(&p, "drawer").unwrap();
    let lexical_parent = find(&p, "lexicalParent").unwrap();

    let desk_stmt = p
        .program
        .object(p.symtab.sym(desk).as_object().unwrap().stmt.unwrap());
    let nested_id = match desk_stmt.find_prop(drawer_prop).unwrap().val {
        PropVal::Object(id) => id,
        _ => panic!("expected nested object value"),
    };
    let nested = p.program.object(nested_id);
    assert!(nested.is_nested);
    match nested.find_prop(lexical_parent).unwrap().val {
        PropVal::Expr(e) => match e.as_const() {
            Some(crate::ast::Const::Object(s)) => assert_eq!(s, desk),
            other => panic!("expected parent reference, got {other:?}"),
        },
        _ => panic!("expected expression value"),
    }
    // the nested object is also queued as a top-level statement
    assert!(p.program.tops.contains(&TopStmt::Object(nested_id)));
}

#[test]
fn propertyset_expands_names_and_formals() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        actions: object
            propertyset 'verb*' (actor, *)
            {
                Do(target) { return actor; }
                Check() { }
            }
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let verb_do = find(&p, "verbDo").expect("expanded name verbDo");
    let verb_check = find(&p, "verbCheck").expect("expanded name verbCheck");
    let actions = find(&p, "actions").unwrap();
    let stmt = p
        .program
        .object(p.symtab.sym(actions).as_object().unwrap().stmt.unwrap());

    let do_body = match stmt.find_prop(verb_do).unwrap().val {
        PropVal::Method(b) => p.program.body(b),
        _ => panic!("expected method"),
    };
    let do_names: Vec<&str> = do_body
        .formals
        .iter()
        .map(|f| p.interner.resolve(f.name))
        .collect();
    assert_eq!(do_names, vec!["actor", "target"]);

    let check_body = match stmt.find_prop(verb_check).unwrap().val {
        PropVal::Method(b) => p.program.body(b),
        _ => panic!("expected method"),
    };
    let check_names: Vec<&str> = check_body
        .formals
        .iter()
        .map(|f| p.interner.resolve(f.name))
        .collect();
    assert_eq!(check_names, vec!["actor"]);
}

#[test]
fn dictionary_words_reach_the_dictionary() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        dictionary gDict;
        dictionary property noun, adjective;
        book: object noun = 'Tome' 'book' adjective = 'dusty';
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let gdict = find(&p, "gDict").unwrap();
    assert_eq!(
        p.symtab.sym(gdict).as_object().unwrap().metaclass,
        MetaclassTag::Dictionary
    );
    let entry = &p.symtab.dicts[&gdict];
    // case-folded keys, original spelling kept
    assert!(entry.words.contains_key("tome"));
    assert!(entry.words.contains_key("book"));
    assert!(entry.words.contains_key("dusty"));
    assert_eq!(p.interner.resolve(entry.words["tome"].text), "Tome");
}

#[test]
fn unbound_dictionary_props_get_placeholders() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        dictionary gDict;
        dictionary property noun;
        stone: object;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors());
    let noun = find(&p, "noun").unwrap();
    let stone = find(&p, "stone").unwrap();
    let stmt = p
        .program
        .object(p.symtab.sym(stone).as_object().unwrap().stmt.unwrap());
    assert!(matches!(
        stmt.find_prop(noun).unwrap().val,
        PropVal::VocabPlaceholder
    ));
}

#[test]
fn enum_token_attribute_is_recorded() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "enum token tokInt, tokWord; enum red, green;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors());
    let tok_int = find(&p, "tokInt").unwrap();
    let red = find(&p, "red").unwrap();
    assert!(p.symtab.sym(tok_int).as_enum().unwrap().is_token);
    assert!(!p.symtab.sym(red).as_enum().unwrap().is_token);
    assert_ne!(
        p.symtab.sym(tok_int).as_enum().unwrap().enum_id,
        p.symtab.sym(red).as_enum().unwrap().enum_id
    );
}

#[test]
fn intrinsic_function_set() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        intrinsic 't3vm/010006'
        {
            t3RunGC();
            t3SetSay(val);
        }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    assert_eq!(p.symtab.fnsets.len(), 1);
    let gc = find(&p, "t3RunGC").unwrap();
    let say = find(&p, "t3SetSay").unwrap();
    match (&p.symtab.sym(gc).kind, &p.symtab.sym(say).kind) {
        (SymKind::Builtin(a), SymKind::Builtin(b)) => {
            assert_eq!((a.fnset, a.index, a.argc), (0, 0, 0));
            assert_eq!((b.fnset, b.index, b.argc), (0, 1, 1));
        }
        _ => panic!("expected builtin symbols"),
    }
}

#[test]
fn intrinsic_class_definition() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        intrinsic class BigNumber 'bignumber/030001'
        {
            formatString(maxDigits);
            static getPi(digits);
        }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let bn = find(&p, "BigNumber").unwrap();
    let meta = p.symtab.sym(bn).as_metaclass().unwrap();
    assert_eq!(meta.props.len(), 2);
    assert!(meta.props[1].is_static);
    assert_eq!(p.symtab.metas.len(), 1);
    assert_eq!(p.symtab.meta_sym(0), Some(bn));
}

#[test]
fn extern_function_then_definition() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        extern function report(msg);
        report(msg) { return msg; }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let report = find(&p, "report").unwrap();
    let sym = p.symtab.sym(report);
    assert!(!sym.external);
    assert!(sym.as_function().unwrap().code_body.is_some());
}

#[test]
fn conflicting_function_arity_is_an_error() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        extern function report(msg);
        report(msg, extra) { }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert_eq!(p.diags.count_of(ErrorCode::IncompatFuncRedef), 1);
}

#[test]
fn replace_function_discards_old_body() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        greet() { return 1; }
        replace greet() { return 2; }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let greet = find(&p, "greet").unwrap();
    let f = p.symtab.sym(greet).as_function().unwrap();
    let live = f.code_body.unwrap();
    // the live body is the replacement; the original is dead
    assert!(!p.program.body(live).replaced);
    let dead = p
        .program
        .bodies
        .iter()
        .filter(|b| b.replaced)
        .count();
    assert_eq!(dead, 1);
}

#[test]
fn modify_function_keeps_original_reachable() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        greet() { return 1; }
        modify function greet() { return replaced() + 1; }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let greet = find(&p, "greet").unwrap();
    let f = p.symtab.sym(greet).as_function().unwrap();
    let base = f.mod_base.expect("mod base chain");
    let base_fn = p.symtab.sym(base).as_function().unwrap();
    assert!(base_fn.code_body.is_some());
    assert!(!p.program.body(base_fn.code_body.unwrap()).replaced);
    assert_ne!(base_fn.code_body, f.code_body);
}

#[test]
fn unknown_top_level_garbage_reports_once() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "= = = = lamp: object;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert_eq!(p.diags.count_of(ErrorCode::ExpectedFunctionOrObject), 1);
    assert!(find(&p, "lamp").is_some());
}

#[test]
fn exports_are_collected() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "export mainRestore; export mainGlobal 'main-global';";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors());
    assert_eq!(p.symtab.exports.len(), 2);
    assert_eq!(
        p.interner.resolve(p.symtab.exports[1].ext),
        "main-global"
    );
}

#[test]
fn implicit_constructor_for_multiple_superclasses() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Fixture: object;
        class Lightable: object;
        sconce: Fixture, Lightable;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let sconce = find(&p, "sconce").unwrap();
    let construct = find(&p, "construct").unwrap();
    let stmt = p
        .program
        .object(p.symtab.sym(sconce).as_object().unwrap().stmt.unwrap());
    let body = match stmt.find_prop(construct).unwrap().val {
        PropVal::Method(b) => p.program.body(b),
        _ => panic!("expected constructor method"),
    };
    assert!(body.varargs);
    assert_eq!(body.stmts.len(), 2);
}

#[test]
fn transient_object_flag() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "transient scratch: object;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let scratch = find(&p, "scratch").unwrap();
    let obj = p.symtab.sym(scratch).as_object().unwrap();
    assert!(obj.transient);
    assert!(p.program.object(obj.stmt.unwrap()).is_transient);
}

#[test]
fn source_text_order_is_monotonic() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "a1: object; a2: object; a3: object;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    let order_prop = find(&p, "sourceTextOrder").unwrap();
    let mut seen = Vec::new();
    for name in ["a1", "a2", "a3"] {
        let sym = find(&p, name).unwrap();
        let stmt = p
            .program
            .object(p.symtab.sym(sym).as_object().unwrap().stmt.unwrap());
        match stmt.find_prop(order_prop).unwrap().val {
            PropVal::Expr(e) => match e.as_const() {
                Some(crate::ast::Const::Int(v)) => seen.push(v),
                other => panic!("expected int, got {other:?}"),
            },
            _ => panic!("expected expression"),
        }
    }
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn grammar_production_with_alternatives() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        dictionary gDict;
        dictionary property noun;
        grammar nounPhrase(basic): noun->noun1_ | 'the' noun->noun1_ : object
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let tagged = find(&p, "nounPhrase(basic)").expect("named match object");
    let entry = p
        .symtab
        .sym(tagged)
        .as_object()
        .unwrap()
        .grammar_entry
        .as_ref()
        .expect("private rule list");
    assert_eq!(entry.alts.len(), 2);
    assert_eq!(entry.alts[1].toks.len(), 2);
    // the match object carries grammarInfo and grammarTag
    let info = find(&p, "grammarInfo").unwrap();
    let tag = find(&p, "grammarTag").unwrap();
    let stmt = p
        .program
        .object(p.symtab.sym(tagged).as_object().unwrap().stmt.unwrap());
    assert!(stmt.find_prop(info).is_some());
    assert!(stmt.find_prop(tag).is_some());
}

#[test]
fn grammar_group_alternation_is_flattened() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        grammar directionPhrase: ('north' | 'south') 'wall' : object;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    let name = p.interner.lookup("directionPhrase").unwrap();
    let prod = &p.symtab.gramprods[&name];
    assert_eq!(prod.alts.len(), 2);
    for alt in &prod.alts {
        assert_eq!(alt.toks.len(), 2);
    }
}

#[test]
fn bare_grammar_declaration_sets_declared() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "grammar emptyPhrase;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors());
    let name = p.interner.lookup("emptyPhrase").unwrap();
    assert!(p.symtab.gramprods[&name].declared);
    assert!(p.symtab.gramprods[&name].alts.is_empty());
}

#[test]
fn string_template_records_tokens_and_function() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "string template << * dollars >> formatDollars;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());
    assert_eq!(p.string_templates.len(), 1);
    let st = &p.string_templates[0];
    assert_eq!(st.toks.len(), 2);
    let func = p.symtab.sym(st.func);
    assert!(func.external);
}
