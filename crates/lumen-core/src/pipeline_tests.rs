// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios over the whole pipeline: raw tree in, findings
//! and signatures out.

use crate::diagnostics::DiagnosticKind;
use crate::entity::MethodKind;
use crate::session::AnalysisSession;
use crate::source::SourceText;
use crate::test_helpers::*;
use crate::tree::RawNode;
use crate::types::Ty;

fn analyze(statements: Vec<RawNode>) -> AnalysisSession {
    AnalysisSession::analyze(program(statements), SourceText::new(""))
}

fn widget(methods: Vec<RawNode>) -> RawNode {
    class_def("Widget", None, methods)
}

fn has_kind(session: &AnalysisSession, kind: DiagnosticKind) -> bool {
    session.diagnostics().any(|(_, d)| d.kind == kind)
}

#[test]
fn improper_to_s_override_is_an_error() {
    let session = analyze(vec![widget(vec![method_def("to_s", &[], vec![int(5)])])]);
    assert!(has_kind(&session, DiagnosticKind::ImproperOverrideType));
    assert!(session.has_errors());
}

#[test]
fn conforming_to_s_override_is_clean() {
    let session = analyze(vec![widget(vec![method_def(
        "to_s",
        &[],
        vec![str_lit("widget")],
    )])]);
    assert!(!has_kind(&session, DiagnosticKind::ImproperOverrideType));
    assert!(!session.has_errors());
}

#[test]
fn negation_must_stay_boolean() {
    let session = analyze(vec![widget(vec![method_def("!", &[], vec![nil()])])]);
    assert!(has_kind(&session, DiagnosticKind::ImproperOverrideType));
}

#[test]
fn method_missing_without_guaranteed_super_is_flagged() {
    let session = analyze(vec![widget(vec![method_def(
        "method_missing",
        &["name"],
        vec![int(1)],
    )])]);
    assert!(has_kind(&session, DiagnosticKind::OverrideWithoutSuper));
    assert!(session.has_errors());
}

#[test]
fn method_missing_with_unconditional_super_is_clean() {
    let session = analyze(vec![widget(vec![method_def(
        "method_missing",
        &["name"],
        vec![super_call(vec![])],
    )])]);
    assert!(!has_kind(&session, DiagnosticKind::OverrideWithoutSuper));
}

#[test]
fn mutating_a_parameter_alias_is_reported() {
    let session = analyze(vec![widget(vec![method_def(
        "tidy",
        &["list"],
        vec![call(Some(ident("list")), "sort!", vec![])],
    )])]);
    assert!(has_kind(&session, DiagnosticKind::MutatedAlias));
    let (_, finding) = session
        .diagnostics()
        .find(|(_, d)| d.kind == DiagnosticKind::MutatedAlias)
        .expect("alias finding");
    assert!(
        finding.message.contains("parameter"),
        "the message names the shared parameter: {}",
        finding.message
    );
}

#[test]
fn dup_severs_the_alias() {
    let session = analyze(vec![widget(vec![method_def(
        "tidy",
        &["list"],
        vec![
            assign_local("fresh", call(Some(ident("list")), "dup", vec![])),
            call(Some(ident("fresh")), "sort!", vec![]),
            ident("fresh"),
        ],
    )])]);
    assert!(!has_kind(&session, DiagnosticKind::MutatedAlias));
}

#[test]
fn code_after_raise_is_flagged_and_retained() {
    let session = analyze(vec![widget(vec![method_def(
        "boom",
        &[],
        vec![raise_expr(None), int(5)],
    )])]);
    assert!(has_kind(&session, DiagnosticKind::UnreachableCode));

    let entity = session.catalog().entity_by_path("Widget").unwrap();
    let mid = session
        .catalog()
        .lookup_method(entity, "boom", MethodKind::Instance)
        .unwrap();
    let graph = session.graph(mid).expect("boom still has a graph");
    assert!(
        graph.block_ids().any(|b| !graph.block(b).reachable),
        "dead blocks are kept in the graph, only flagged"
    );
}

#[test]
fn predicate_seeing_both_polarities_across_shapes_is_not_recorded() {
    let session = analyze(vec![
        widget(vec![method_def("parity?", &["x"], vec![ident("x")])]),
        call(
            Some(call(Some(const_ref("Widget")), "new", vec![])),
            "parity?",
            vec![int(1)],
        ),
        call(
            Some(call(Some(const_ref("Widget")), "new", vec![])),
            "parity?",
            vec![nil()],
        ),
    ]);
    assert_eq!(session.incorrect_predicates().count(), 0);
}

#[test]
fn predicate_answering_both_ways_in_one_shape_is_not_recorded() {
    let session = analyze(vec![
        widget(vec![method_def(
            "has?",
            &["x"],
            vec![if_expr(
                ident("x"),
                vec![true_lit()],
                Some(vec![nil()]),
            )],
        )]),
        call(
            Some(call(Some(const_ref("Widget")), "new", vec![])),
            "has?",
            vec![int(1)],
        ),
    ]);
    assert_eq!(
        session.incorrect_predicates().count(),
        0,
        "one call shape carrying both answers is enough evidence"
    );
}

#[test]
fn recursive_method_converges_with_a_stable_cache() {
    let mut session = analyze(vec![widget(vec![method_def(
        "spin",
        &["n"],
        vec![if_expr(
            ident("n"),
            vec![call(None, "spin", vec![ident("n")])],
            Some(vec![int(1)]),
        )],
    )])]);

    let first = session.return_type_for_types("Widget", "spin", vec![Ty::instance("Integer")]);
    let second = session.return_type_for_types("Widget", "spin", vec![Ty::instance("Integer")]);
    assert_eq!(first, Some(Ty::instance("Integer")));
    assert_eq!(first, second, "the memoized answer does not drift");

    let signatures = session
        .method_signatures("Widget", "spin")
        .expect("signatures recorded");
    assert!(
        signatures.iter().all(|sig| !sig.ret.is_bottom()),
        "the in-flight placeholder never leaks into a recorded signature"
    );
}
