// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Built-in class definitions for the catalog.
//!
//! This module registers the core classes (`Object`, `Integer`, `String`,
//! etc.) that form the foundation of the analyzed language, before any
//! user-defined classes. Each registration also defines the class name as
//! a constant in the global scope.
//!
//! Built-in methods are stubs: a name plus seeded signatures, no body.
//! The inference engine answers calls to them by signature matching. The
//! tables below cover the slice of the core library the analyses exercise;
//! the seed is hand-maintained.

use super::{Catalog, EntityId, MethodKind};
use crate::scope::{Bindings, Scopes};
use crate::types::Ty;

fn t(path: &str) -> Ty {
    Ty::instance(path)
}

fn stubs(catalog: &mut Catalog, owner: EntityId, entries: Vec<(&str, Vec<Ty>, Ty)>) {
    for (name, args, ret) in entries {
        catalog.seed_signature(owner, MethodKind::Instance, name, args, ret);
    }
}

/// Registers the built-in classes and modules and seeds their method
/// stubs. The global scope's `self` is pointed at `Object`, so top-level
/// instance variables land there.
pub fn seed(scopes: &mut Scopes, bindings: &mut Bindings) -> Catalog {
    let mut catalog = Catalog::new();
    let global = scopes.global();

    let object = catalog.define_class(scopes, bindings, "Object", None, global, None);
    scopes.get_mut(global).self_entity = Some(object);

    let module = catalog.define_class(scopes, bindings, "Module", Some(object), global, None);
    catalog.define_class(scopes, bindings, "Class", Some(module), global, None);
    catalog.define_module(scopes, bindings, "Kernel", global, None);
    let comparable = catalog.define_module(scopes, bindings, "Comparable", global, None);

    let numeric = catalog.define_class(scopes, bindings, "Numeric", Some(object), global, None);
    let integer = catalog.define_class(scopes, bindings, "Integer", Some(numeric), global, None);
    let float = catalog.define_class(scopes, bindings, "Float", Some(numeric), global, None);
    let string = catalog.define_class(scopes, bindings, "String", Some(object), global, None);
    let symbol = catalog.define_class(scopes, bindings, "Symbol", Some(object), global, None);
    let array = catalog.define_class(scopes, bindings, "Array", Some(object), global, None);
    let hash = catalog.define_class(scopes, bindings, "Hash", Some(object), global, None);
    let range = catalog.define_class(scopes, bindings, "Range", Some(object), global, None);
    let nil_class = catalog.define_class(scopes, bindings, "NilClass", Some(object), global, None);
    let true_class = catalog.define_class(scopes, bindings, "TrueClass", Some(object), global, None);
    let false_class =
        catalog.define_class(scopes, bindings, "FalseClass", Some(object), global, None);
    catalog.define_class(scopes, bindings, "Proc", Some(object), global, None);
    let exception = catalog.define_class(scopes, bindings, "Exception", Some(object), global, None);
    let standard_error =
        catalog.define_class(scopes, bindings, "StandardError", Some(exception), global, None);
    catalog.define_class(scopes, bindings, "RuntimeError", Some(standard_error), global, None);
    catalog.define_class(scopes, bindings, "ArgumentError", Some(standard_error), global, None);
    catalog.define_class(scopes, bindings, "TypeError", Some(standard_error), global, None);

    // Object carries both its own protocol and the Kernel-style private
    // helpers, so a bare `puts` resolves as an implicit self-send from
    // anywhere.
    stubs(
        &mut catalog,
        object,
        vec![
            ("to_s", vec![], t("String")),
            ("inspect", vec![], t("String")),
            ("==", vec![Ty::Top], Ty::boolean()),
            ("!=", vec![Ty::Top], Ty::boolean()),
            ("equal?", vec![Ty::Top], Ty::boolean()),
            ("eql?", vec![Ty::Top], Ty::boolean()),
            ("!", vec![], Ty::boolean()),
            ("nil?", vec![], t("FalseClass")),
            ("hash", vec![], t("Integer")),
            ("object_id", vec![], t("Integer")),
            ("respond_to?", vec![Ty::Top], Ty::boolean()),
            ("is_a?", vec![Ty::Top], Ty::boolean()),
            ("kind_of?", vec![Ty::Top], Ty::boolean()),
            ("instance_of?", vec![Ty::Top], Ty::boolean()),
            ("frozen?", vec![], Ty::boolean()),
            ("freeze", vec![], Ty::Top),
            ("dup", vec![], Ty::Top),
            ("clone", vec![], Ty::Top),
            ("send", vec![Ty::Top], Ty::Top),
            ("class", vec![], Ty::Top),
            ("block_given?", vec![], Ty::boolean()),
            ("gets", vec![], Ty::union(["String", "NilClass"])),
            ("puts", vec![], t("NilClass")),
            ("puts", vec![Ty::Top], t("NilClass")),
            ("print", vec![Ty::Top], t("NilClass")),
            ("p", vec![Ty::Top], Ty::Top),
            ("rand", vec![], t("Float")),
            ("rand", vec![t("Integer")], t("Integer")),
            ("raise", vec![Ty::Top], Ty::Bottom),
            ("lambda", vec![], t("Proc")),
            ("proc", vec![], t("Proc")),
        ],
    );

    stubs(
        &mut catalog,
        string,
        vec![
            ("to_s", vec![], t("String")),
            ("to_str", vec![], t("String")),
            ("to_i", vec![], t("Integer")),
            ("to_f", vec![], t("Float")),
            ("to_sym", vec![], t("Symbol")),
            ("intern", vec![], t("Symbol")),
            ("strip", vec![], t("String")),
            ("strip!", vec![], Ty::union(["String", "NilClass"])),
            ("chomp", vec![], t("String")),
            ("chomp!", vec![], Ty::union(["String", "NilClass"])),
            ("upcase", vec![], t("String")),
            ("upcase!", vec![], Ty::union(["String", "NilClass"])),
            ("downcase", vec![], t("String")),
            ("downcase!", vec![], Ty::union(["String", "NilClass"])),
            ("capitalize", vec![], t("String")),
            ("reverse", vec![], t("String")),
            ("length", vec![], t("Integer")),
            ("size", vec![], t("Integer")),
            ("empty?", vec![], Ty::boolean()),
            ("include?", vec![t("String")], Ty::boolean()),
            ("start_with?", vec![t("String")], Ty::boolean()),
            ("end_with?", vec![t("String")], Ty::boolean()),
            ("+", vec![t("String")], t("String")),
            ("*", vec![t("Integer")], t("String")),
            ("[]", vec![t("Integer")], Ty::union(["String", "NilClass"])),
            ("slice", vec![t("Integer")], Ty::union(["String", "NilClass"])),
            ("split", vec![], t("Array")),
            ("split", vec![t("String")], t("Array")),
            ("chars", vec![], t("Array")),
            ("succ", vec![], t("String")),
        ],
    );

    stubs(
        &mut catalog,
        integer,
        vec![
            ("+", vec![t("Integer")], t("Integer")),
            ("+", vec![t("Float")], t("Float")),
            ("-", vec![t("Integer")], t("Integer")),
            ("-", vec![t("Float")], t("Float")),
            ("*", vec![t("Integer")], t("Integer")),
            ("*", vec![t("Float")], t("Float")),
            ("/", vec![t("Integer")], t("Integer")),
            ("/", vec![t("Float")], t("Float")),
            ("%", vec![t("Integer")], t("Integer")),
            ("**", vec![t("Integer")], t("Integer")),
            ("-@", vec![], t("Integer")),
            ("to_i", vec![], t("Integer")),
            ("to_int", vec![], t("Integer")),
            ("to_f", vec![], t("Float")),
            ("to_s", vec![], t("String")),
            ("succ", vec![], t("Integer")),
            ("pred", vec![], t("Integer")),
            ("abs", vec![], t("Integer")),
            ("zero?", vec![], Ty::boolean()),
            ("positive?", vec![], Ty::boolean()),
            ("negative?", vec![], Ty::boolean()),
            ("even?", vec![], Ty::boolean()),
            ("odd?", vec![], Ty::boolean()),
            ("times", vec![], t("Integer")),
            ("upto", vec![t("Integer")], t("Integer")),
            ("<", vec![t("Numeric")], Ty::boolean()),
            ("<=", vec![t("Numeric")], Ty::boolean()),
            (">", vec![t("Numeric")], Ty::boolean()),
            (">=", vec![t("Numeric")], Ty::boolean()),
            ("<=>", vec![t("Numeric")], Ty::union(["Integer", "NilClass"])),
        ],
    );

    stubs(
        &mut catalog,
        float,
        vec![
            ("+", vec![t("Numeric")], t("Float")),
            ("-", vec![t("Numeric")], t("Float")),
            ("*", vec![t("Numeric")], t("Float")),
            ("/", vec![t("Numeric")], t("Float")),
            ("-@", vec![], t("Float")),
            ("to_i", vec![], t("Integer")),
            ("to_f", vec![], t("Float")),
            ("to_s", vec![], t("String")),
            ("abs", vec![], t("Float")),
            ("round", vec![], t("Integer")),
            ("ceil", vec![], t("Integer")),
            ("floor", vec![], t("Integer")),
            ("zero?", vec![], Ty::boolean()),
            ("nan?", vec![], Ty::boolean()),
            ("<", vec![t("Numeric")], Ty::boolean()),
            ("<=", vec![t("Numeric")], Ty::boolean()),
            (">", vec![t("Numeric")], Ty::boolean()),
            (">=", vec![t("Numeric")], Ty::boolean()),
        ],
    );

    stubs(
        &mut catalog,
        nil_class,
        vec![
            ("to_s", vec![], t("String")),
            ("to_a", vec![], t("Array")),
            ("to_i", vec![], t("Integer")),
            ("inspect", vec![], t("String")),
            ("nil?", vec![], t("TrueClass")),
            ("!", vec![], t("TrueClass")),
            ("&", vec![Ty::Top], t("FalseClass")),
            ("|", vec![Ty::Top], Ty::boolean()),
        ],
    );

    stubs(
        &mut catalog,
        true_class,
        vec![
            ("!", vec![], t("FalseClass")),
            ("&", vec![Ty::Top], Ty::boolean()),
            ("|", vec![Ty::Top], t("TrueClass")),
            ("to_s", vec![], t("String")),
        ],
    );

    stubs(
        &mut catalog,
        false_class,
        vec![
            ("!", vec![], t("TrueClass")),
            ("&", vec![Ty::Top], t("FalseClass")),
            ("|", vec![Ty::Top], Ty::boolean()),
            ("to_s", vec![], t("String")),
        ],
    );

    stubs(
        &mut catalog,
        symbol,
        vec![
            ("to_s", vec![], t("String")),
            ("to_sym", vec![], t("Symbol")),
            ("to_proc", vec![], t("Proc")),
            ("length", vec![], t("Integer")),
            ("succ", vec![], t("Symbol")),
        ],
    );

    stubs(
        &mut catalog,
        array,
        vec![
            ("length", vec![], t("Integer")),
            ("size", vec![], t("Integer")),
            ("count", vec![], t("Integer")),
            ("first", vec![], Ty::Top),
            ("last", vec![], Ty::Top),
            ("push", vec![Ty::Top], t("Array")),
            ("<<", vec![Ty::Top], t("Array")),
            ("pop", vec![], Ty::Top),
            ("shift", vec![], Ty::Top),
            ("unshift", vec![Ty::Top], t("Array")),
            ("to_a", vec![], t("Array")),
            ("to_ary", vec![], t("Array")),
            ("join", vec![], t("String")),
            ("join", vec![t("String")], t("String")),
            ("empty?", vec![], Ty::boolean()),
            ("include?", vec![Ty::Top], Ty::boolean()),
            ("reverse", vec![], t("Array")),
            ("sort", vec![], t("Array")),
            ("uniq", vec![], t("Array")),
            ("compact", vec![], t("Array")),
            ("flatten", vec![], t("Array")),
            ("map", vec![], t("Array")),
            ("each", vec![], t("Array")),
            ("select", vec![], t("Array")),
            ("reject", vec![], t("Array")),
            ("[]", vec![t("Integer")], Ty::Top),
            ("+", vec![t("Array")], t("Array")),
            ("-", vec![t("Array")], t("Array")),
        ],
    );

    stubs(
        &mut catalog,
        hash,
        vec![
            ("size", vec![], t("Integer")),
            ("length", vec![], t("Integer")),
            ("[]", vec![Ty::Top], Ty::Top),
            ("[]=", vec![Ty::Top, Ty::Top], Ty::Top),
            ("keys", vec![], t("Array")),
            ("values", vec![], t("Array")),
            ("empty?", vec![], Ty::boolean()),
            ("include?", vec![Ty::Top], Ty::boolean()),
            ("key?", vec![Ty::Top], Ty::boolean()),
            ("has_key?", vec![Ty::Top], Ty::boolean()),
            ("to_a", vec![], t("Array")),
            ("each", vec![], t("Hash")),
            ("merge", vec![t("Hash")], t("Hash")),
            ("delete", vec![Ty::Top], Ty::Top),
        ],
    );

    stubs(
        &mut catalog,
        range,
        vec![
            ("to_a", vec![], t("Array")),
            ("first", vec![], Ty::Top),
            ("last", vec![], Ty::Top),
            ("min", vec![], Ty::Top),
            ("max", vec![], Ty::Top),
            ("size", vec![], Ty::union(["Integer", "NilClass"])),
            ("include?", vec![Ty::Top], Ty::boolean()),
            ("each", vec![], t("Range")),
        ],
    );

    stubs(
        &mut catalog,
        exception,
        vec![
            ("message", vec![], t("String")),
            ("to_s", vec![], t("String")),
            ("backtrace", vec![], Ty::union(["Array", "NilClass"])),
        ],
    );

    stubs(
        &mut catalog,
        comparable,
        vec![
            ("between?", vec![Ty::Top, Ty::Top], Ty::boolean()),
            ("clamp", vec![Ty::Top, Ty::Top], Ty::Top),
        ],
    );

    stubs(
        &mut catalog,
        module,
        vec![
            ("name", vec![], Ty::union(["String", "NilClass"])),
            ("to_s", vec![], t("String")),
            ("ancestors", vec![], t("Array")),
            ("instance_methods", vec![], t("Array")),
            ("===", vec![Ty::Top], Ty::boolean()),
        ],
    );

    // Every class object answers `new`; the engine special-cases the
    // return type to an instance of the receiver's class.
    catalog.seed_signature(object, MethodKind::Singleton, "new", vec![], Ty::Top);

    catalog
}
