// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Best-effort source spans for nodes the parser left unlocated.
//!
//! Parsers are free to record spans only on tokens they find convenient.
//! When a diagnostic needs a span for a node without one, we take the
//! hull of the subtree's recorded spans, then widen it to the node's
//! delimiters by scanning the source text: backwards for the opening
//! keyword or bracket, forwards for the closer. The widening degrades
//! gracefully; a failed scan keeps the hull, and a subtree with no spans
//! at all yields `None`.

use crate::source::{SourceText, Span};
use crate::tree::{Ast, NodeId, NodeKind};

/// The span covering `node`, from recorded data if present, otherwise
/// reconstructed from its subtree and the source text.
#[must_use]
pub fn source_span(ast: &Ast, source: &SourceText, node: NodeId) -> Option<Span> {
    if let Some(span) = ast.span(node) {
        return Some(span);
    }
    let hull = subtree_hull(ast, node)?;
    Some(widen(ast.kind(node), hull, source))
}

fn subtree_hull(ast: &Ast, node: NodeId) -> Option<Span> {
    let mut hull: Option<Span> = None;
    ast.dfs(node, |id| {
        if let Some(span) = ast.span(id) {
            hull = Some(match hull {
                Some(h) => h.merge(span),
                None => span,
            });
        }
    });
    hull
}

fn widen(kind: NodeKind, hull: Span, source: &SourceText) -> Span {
    let (opener, closer) = match kind {
        NodeKind::MethodDef | NodeKind::SingletonMethodDef => ("def", Some("end")),
        NodeKind::ClassDef => ("class", Some("end")),
        NodeKind::ModuleDef => ("module", Some("end")),
        NodeKind::Begin => ("begin", Some("end")),
        NodeKind::While => ("while", Some("end")),
        NodeKind::ArrayLit => ("[", Some("]")),
        NodeKind::HashLit => ("{", Some("}")),
        NodeKind::Paren => ("(", Some(")")),
        NodeKind::StrLit => ("\"", Some("\"")),
        _ => return hull,
    };
    let start = backtrack(source, hull.start(), opener).unwrap_or_else(|| hull.start());
    let end = closer
        .and_then(|needle| forwardtrack(source, hull.end(), needle))
        .unwrap_or_else(|| hull.end());
    Span::new(start, end.max(start))
}

/// Byte offset where the last occurrence of `needle` before `from`
/// starts, or `None`.
fn backtrack(source: &SourceText, from: u32, needle: &str) -> Option<u32> {
    let text = source.text();
    let mut from = (from as usize).min(text.len());
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    text[..from]
        .rfind(needle)
        .map(|i| u32::try_from(i).unwrap_or(u32::MAX))
}

/// Byte offset just past the first occurrence of `needle` at or after
/// `from`, or `None`.
fn forwardtrack(source: &SourceText, from: u32, needle: &str) -> Option<u32> {
    let text = source.text();
    let mut from = (from as usize).min(text.len());
    while from < text.len() && !text.is_char_boundary(from) {
        from += 1;
    }
    text[from..]
        .find(needle)
        .map(|i| u32::try_from(from + i + needle.len()).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{array, int, method_def};
    use crate::tree::RawNode;

    fn with_ident_span(def: RawNode, span: Span) -> RawNode {
        // Attach a span to the single identifier in the method body.
        let mut def = def;
        def.children[1].children[0].span = Some(span);
        def
    }

    #[test]
    fn recorded_spans_win() {
        let source = SourceText::new("x = 1");
        let ast = Ast::from_raw(int(1).with_span(Span::new(4, 5)));
        assert_eq!(source_span(&ast, &source, ast.root()), Some(Span::new(4, 5)));
    }

    #[test]
    fn method_def_widens_to_its_keywords() {
        let source = SourceText::new("def greet\n  name\nend\n");
        // Only the body identifier carries a span.
        let raw = with_ident_span(
            method_def("greet", &[], vec![crate::test_helpers::ident("name")]),
            Span::new(12, 16),
        );
        let ast = Ast::from_raw(raw);
        let span = source_span(&ast, &source, ast.root()).unwrap();
        assert_eq!(span.start(), 0, "backtracks to the def keyword");
        assert_eq!(span.end(), 20, "forwards past the end keyword");
    }

    #[test]
    fn hull_survives_missing_delimiters() {
        let source = SourceText::new("name");
        let raw = with_ident_span(
            method_def("greet", &[], vec![crate::test_helpers::ident("name")]),
            Span::new(0, 4),
        );
        let ast = Ast::from_raw(raw);
        let span = source_span(&ast, &source, ast.root()).unwrap();
        assert_eq!(span, Span::new(0, 4), "no keywords to find, hull stands");
    }

    #[test]
    fn spanless_subtree_yields_none() {
        let source = SourceText::new("def greet\nend\n");
        let ast = Ast::from_raw(method_def("greet", &[], vec![]));
        assert_eq!(source_span(&ast, &source, ast.root()), None);
    }

    #[test]
    fn array_literal_widens_to_brackets() {
        let source = SourceText::new("xs = [1, 2]");
        let raw = array(vec![
            int(1).with_span(Span::new(6, 7)),
            int(2).with_span(Span::new(9, 10)),
        ]);
        let ast = Ast::from_raw(raw);
        let span = source_span(&ast, &source, ast.root()).unwrap();
        assert_eq!(span, Span::new(5, 11));
    }
}
