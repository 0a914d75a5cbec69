//! End-to-end parses of the front end's trickiest constructs: forward
//! references, modify/replace rewiring, circular classes, template
//! alternation, propertyset expansion, and multi-method decoration.

use pretty_assertions::assert_eq;
use tadsc_base::{Arena, ErrorCode, FileId, Interner};
use tadsc_parse::ast::PropVal;
use tadsc_parse::symtab::SymKind;
use tadsc_parse::{parse_source, Parser, SymId};

fn find(p: &Parser<'_, '_>, name: &str) -> Option<SymId> {
    p.interner.lookup(name).and_then(|n| p.symtab.find(n))
}

#[test]
fn forward_reference_of_object() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Base: object;
        class Derived: Base;
        obj1: Derived;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    let base = find(&p, "Base").unwrap();
    let derived = find(&p, "Derived").unwrap();
    let obj1 = find(&p, "obj1").unwrap();

    let base_obj = p.symtab.sym(base).as_object().unwrap();
    assert!(base_obj.is_class);
    assert!(base_obj.sc_is_root);

    let derived_obj = p.symtab.sym(derived).as_object().unwrap();
    assert!(derived_obj.is_class);
    assert_eq!(derived_obj.sc_names.len(), 1);
    assert_eq!(p.interner.resolve(derived_obj.sc_names[0]), "Base");

    let obj1_obj = p.symtab.sym(obj1).as_object().unwrap();
    assert!(!obj1_obj.is_class);
    let stmt = p.program.object(obj1_obj.stmt.unwrap());
    assert_eq!(stmt.superclasses.len(), 1);
    assert_eq!(stmt.superclasses[0].sym, Some(derived));
    assert!(p.symtab.descends_from(obj1, base));
}

#[test]
fn modify_object_links_shadow_through_mod_base() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Thing: object;
        Thing template 'desc';
        room: Thing 'old desc';
        modify room 'new desc';
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    // "room" resolves to the visible (modified) symbol
    let room = find(&p, "room").unwrap();
    let room_obj = p.symtab.sym(room).as_object().unwrap();
    let shadow = room_obj.mod_base.expect("mod base chain");
    assert_ne!(shadow, room);

    // the shadow is unreachable from source: its name starts with a space
    let shadow_name = p.interner.resolve(p.symtab.sym(shadow).name);
    assert!(shadow_name.starts_with(' '));

    // two linked object statements: the shadow holds the original IR,
    // the visible head holds the replacement
    let head_stmt = p.program.object(room_obj.stmt.unwrap());
    let shadow_obj = p.symtab.sym(shadow).as_object().unwrap();
    let base_stmt = p.program.object(shadow_obj.stmt.unwrap());
    assert!(base_stmt.is_modified);
    assert!(!head_stmt.is_modified);
    assert_eq!(head_stmt.superclasses.len(), 1);
    assert_eq!(head_stmt.superclasses[0].sym, Some(shadow));

    // both carry a desc slot; the template matched on the new definition
    let desc = find(&p, "desc").unwrap();
    let new_val = head_stmt.find_prop(desc).expect("replacement desc");
    match new_val.val {
        PropVal::Expr(e) => match e.as_const() {
            Some(tadsc_parse::ast::Const::SStr(s)) => {
                assert_eq!(p.interner.resolve(s), "new desc");
            }
            other => panic!("expected string constant, got {other:?}"),
        },
        _ => panic!("expected expression value"),
    }
    let old_val = base_stmt.find_prop(desc).expect("original desc");
    match old_val.val {
        PropVal::Expr(e) => match e.as_const() {
            Some(tadsc_parse::ast::Const::SStr(s)) => {
                assert_eq!(p.interner.resolve(s), "old desc");
            }
            other => panic!("expected string constant, got {other:?}"),
        },
        _ => panic!("expected expression value"),
    }
}

#[test]
fn circular_class_is_rejected_without_cascades() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = "class A: B; class B: A;";
    let p = parse_source(&arena, &mut interner, FileId(0), src);

    assert_eq!(p.diags.count_of(ErrorCode::CircularClass), 1);
    assert_eq!(p.diags.error_count(), 1);

    // both symbols are still present
    let a = find(&p, "A").unwrap();
    let b = find(&p, "B").unwrap();
    assert!(matches!(p.symtab.sym(a).kind, SymKind::Object(_)));
    assert!(matches!(p.symtab.sym(b).kind, SymKind::Object(_)));

    // the offending superclass link was dropped
    let b_obj = p.symtab.sym(b).as_object().unwrap();
    assert!(b_obj.sc_names.is_empty());
}

#[test]
fn template_match_with_alternation_and_optional() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Thing: object;
        here: Thing;
        Thing template 'desc' | "desc" @location?;
        x: Thing 'a rock' @here;
        y: Thing 'a pebble';
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    let desc = find(&p, "desc").unwrap();
    let location = find(&p, "location").unwrap();
    let here = find(&p, "here").unwrap();

    let x = find(&p, "x").unwrap();
    let x_stmt = p
        .program
        .object(p.symtab.sym(x).as_object().unwrap().stmt.unwrap());
    match x_stmt.find_prop(desc).unwrap().val {
        PropVal::Expr(e) => match e.as_const() {
            Some(tadsc_parse::ast::Const::SStr(s)) => {
                assert_eq!(p.interner.resolve(s), "a rock");
            }
            other => panic!("expected string, got {other:?}"),
        },
        _ => panic!("expected expression"),
    }
    match x_stmt.find_prop(location).unwrap().val {
        PropVal::Expr(e) => match e.as_const() {
            Some(tadsc_parse::ast::Const::Object(s)) => assert_eq!(s, here),
            other => panic!("expected object ref, got {other:?}"),
        },
        _ => panic!("expected expression"),
    }

    // omitting the optional item is fine
    let y = find(&p, "y").unwrap();
    let y_stmt = p
        .program
        .object(p.symtab.sym(y).as_object().unwrap().stmt.unwrap());
    assert!(y_stmt.find_prop(desc).is_some());
    assert!(y_stmt.find_prop(location).is_none());
    assert!(!y_stmt.bad_template);
}

#[test]
fn propertyset_expansion_defines_prefixed_methods() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        handler: object
            propertyset 'verb*'
            {
                Do(dobj) { return dobj; }
                Check(dobj, iobj) { return iobj; }
            }
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    let verb_do = find(&p, "verbDo").expect("verbDo defined");
    let verb_check = find(&p, "verbCheck").expect("verbCheck defined");
    let handler = find(&p, "handler").unwrap();
    let stmt = p
        .program
        .object(p.symtab.sym(handler).as_object().unwrap().stmt.unwrap());

    let do_body = match stmt.find_prop(verb_do).unwrap().val {
        PropVal::Method(b) => p.program.body(b),
        _ => panic!("expected method"),
    };
    assert_eq!(do_body.formals.len(), 1);
    let check_body = match stmt.find_prop(verb_check).unwrap().val {
        PropVal::Method(b) => p.program.body(b),
        _ => panic!("expected method"),
    };
    assert_eq!(check_body.formals.len(), 2);

    // the bare names were never defined
    assert!(find(&p, "Do").is_none());
    assert!(find(&p, "Check").is_none());
}

#[test]
fn multimethod_function_decorates_variants() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Thing: object;
        class Actor: Thing;
        f(a: Thing) { return 1; }
        f(a: Actor) { return 2; }
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    // the base symbol is an external multi-method placeholder the linker
    // will fill in, but it is still exported from this module
    let base = find(&p, "f").unwrap();
    let base_sym = p.symtab.sym(base);
    assert!(base_sym.external);
    let base_fn = base_sym.as_function().unwrap();
    assert!(base_fn.is_multimethod);
    assert!(base_fn.is_mm_base);
    assert!(base_fn.mm_def);
    assert!(base_fn.varargs);
    assert!(base_fn.has_retval);
    assert!(base_fn.code_body.is_none());

    // the concrete variants live under decorated names
    let v1 = find(&p, "f*Thing;").expect("decorated Thing variant");
    let v2 = find(&p, "f*Actor;").expect("decorated Actor variant");
    for v in [v1, v2] {
        let sym = p.symtab.sym(v);
        assert!(!sym.external);
        let f = sym.as_function().unwrap();
        assert!(f.is_multimethod);
        assert!(!f.is_mm_base);
        assert!(f.code_body.is_some());
    }
}

#[test]
fn unterminated_object_recovers_at_next_definition() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    // 'hall' lacks its ';'; since 'study' is already known as an object,
    // the parser charges the missing terminator to 'hall' and re-parses
    // 'study' as its own definition
    let src = r#"
        class Room: object;
        extern object study;
        hall: Room
        study: Room;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert_eq!(p.diags.count_of(ErrorCode::UnterminatedObject), 1);
    assert!(find(&p, "hall").is_some());
    let study = find(&p, "study").unwrap();
    let study_sym = p.symtab.sym(study);
    assert!(!study_sym.external);
    assert!(study_sym.as_object().unwrap().stmt.is_some());
}

#[test]
fn replace_object_discards_previous_tree() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Thing: object;
        statue: Thing
            weight = 10
        ;
        replace statue: Thing
            weight = 20
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    let statue = find(&p, "statue").unwrap();
    let live_stmt = p.symtab.sym(statue).as_object().unwrap().stmt.unwrap();
    assert!(!p.program.object(live_stmt).is_replaced);

    // exactly one discarded statement for statue remains in the program
    let dead: Vec<_> = p
        .program
        .objects
        .iter()
        .filter(|o| o.is_replaced)
        .collect();
    assert_eq!(dead.len(), 1);

    // replacement completed within the translation unit: no link-time flag
    assert!(!p.symtab.sym(statue).as_object().unwrap().ext_replace);
}

#[test]
fn replace_property_inside_modify_queues_deletion() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        class Thing: object;
        vase: Thing
            weight = 5
        ;
        modify vase
            replace weight = 6
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert!(!p.diags.has_errors(), "{:?}", p.diags.diagnostics());

    let vase = find(&p, "vase").unwrap();
    let weight = find(&p, "weight").unwrap();
    let head = p
        .program
        .object(p.symtab.sym(vase).as_object().unwrap().stmt.unwrap());
    let slot = head.find_prop(weight).unwrap();
    assert!(slot.replace);
}

#[test]
fn replace_prefix_outside_modify_is_an_error() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let src = r#"
        plain: object
            replace weight = 6
        ;
    "#;
    let p = parse_source(&arena, &mut interner, FileId(0), src);
    assert_eq!(p.diags.count_of(ErrorCode::ReplacePropRequiresModObj), 1);
}
