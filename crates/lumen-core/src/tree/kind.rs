// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The closed set of syntax node kinds the analyzer understands.
//!
//! The external parser is free to support a richer surface language, but
//! anything it hands to the analyzer must be expressed in these kinds.
//! A construct outside this set inside a method body makes that one method
//! unanalyzable; the rest of the program is still analyzed.

/// The kind tag of a syntax node. Child layouts per kind are documented in
/// [`crate::tree::raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Root of a compilation unit; children are top-level statements.
    Program,
    /// Synthetic statement list; flattened transparently by
    /// [`Ast::children`](crate::tree::Ast::children).
    StmtList,
    /// Argument list of a send, `super`, `yield` or `raise`.
    ArgList,
    /// Parameter list of a method or block definition.
    ParamList,

    // Literals.
    NilLit,
    TrueLit,
    FalseLit,
    IntLit,
    FloatLit,
    StrLit,
    SymLit,
    ArrayLit,
    HashLit,
    /// `lo..hi` (inclusive).
    RangeLit,
    /// `lo...hi` (exclusive).
    RangeExclLit,

    // Keywords that evaluate to values.
    SelfRef,
    FileKeyword,
    LineKeyword,

    // Name references. The referenced name is the node payload; instance,
    // class and global variable names include their sigil.
    Ident,
    ConstRef,
    /// `Outer::Inner`; children are the two path halves.
    ConstPath,
    /// `::Name`, resolved from the root scope.
    TopConst,
    IvarRef,
    CvarRef,
    GvarRef,

    /// `target = value`.
    Assign,

    /// A message send. Operators and `!` are ordinary sends.
    Call,
    SuperCall,
    YieldExpr,
    RaiseExpr,
    ReturnExpr,

    If,
    While,
    /// `begin ... end` with optional rescue/ensure clauses.
    Begin,
    RescueClause,
    EnsureClause,
    /// A literal block attached to a send.
    BlockLit,

    ClassDef,
    ModuleDef,
    MethodDef,
    /// `def self.name`.
    SingletonMethodDef,

    /// Parenthesized expression, transparent to analysis.
    Paren,
}

impl NodeKind {
    /// Returns true for kinds that denote literal values.
    #[must_use]
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            NodeKind::NilLit
                | NodeKind::TrueLit
                | NodeKind::FalseLit
                | NodeKind::IntLit
                | NodeKind::FloatLit
                | NodeKind::StrLit
                | NodeKind::SymLit
                | NodeKind::ArrayLit
                | NodeKind::HashLit
                | NodeKind::RangeLit
                | NodeKind::RangeExclLit
        )
    }

    /// Returns true for kinds that open a definition (class, module, method).
    #[must_use]
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            NodeKind::ClassDef
                | NodeKind::ModuleDef
                | NodeKind::MethodDef
                | NodeKind::SingletonMethodDef
        )
    }

    /// A short lowercase label for diagnostics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Program => "program",
            NodeKind::StmtList => "statements",
            NodeKind::ArgList => "arguments",
            NodeKind::ParamList => "parameters",
            NodeKind::NilLit => "nil",
            NodeKind::TrueLit => "true",
            NodeKind::FalseLit => "false",
            NodeKind::IntLit => "integer literal",
            NodeKind::FloatLit => "float literal",
            NodeKind::StrLit => "string literal",
            NodeKind::SymLit => "symbol literal",
            NodeKind::ArrayLit => "array literal",
            NodeKind::HashLit => "hash literal",
            NodeKind::RangeLit | NodeKind::RangeExclLit => "range literal",
            NodeKind::SelfRef => "self",
            NodeKind::FileKeyword => "__FILE__",
            NodeKind::LineKeyword => "__LINE__",
            NodeKind::Ident => "identifier",
            NodeKind::ConstRef | NodeKind::ConstPath | NodeKind::TopConst => "constant",
            NodeKind::IvarRef => "instance variable",
            NodeKind::CvarRef => "class variable",
            NodeKind::GvarRef => "global variable",
            NodeKind::Assign => "assignment",
            NodeKind::Call => "method call",
            NodeKind::SuperCall => "super",
            NodeKind::YieldExpr => "yield",
            NodeKind::RaiseExpr => "raise",
            NodeKind::ReturnExpr => "return",
            NodeKind::If => "if",
            NodeKind::While => "while",
            NodeKind::Begin => "begin",
            NodeKind::RescueClause => "rescue clause",
            NodeKind::EnsureClause => "ensure clause",
            NodeKind::BlockLit => "block",
            NodeKind::ClassDef => "class definition",
            NodeKind::ModuleDef => "module definition",
            NodeKind::MethodDef | NodeKind::SingletonMethodDef => "method definition",
            NodeKind::Paren => "parenthesized expression",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_classification() {
        assert!(NodeKind::IntLit.is_literal());
        assert!(NodeKind::RangeExclLit.is_literal());
        assert!(!NodeKind::Call.is_literal());
        assert!(!NodeKind::Ident.is_literal());
    }

    #[test]
    fn definition_classification() {
        assert!(NodeKind::ClassDef.is_definition());
        assert!(NodeKind::SingletonMethodDef.is_definition());
        assert!(!NodeKind::Assign.is_definition());
    }
}
