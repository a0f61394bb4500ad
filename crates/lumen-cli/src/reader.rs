// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! A tree reader for the analyzer's input format.
//!
//! Lumen analyzes trees produced by an external parser; this reader is the
//! command line's stand-in for one. It deserializes the documented
//! [`RawNode`] shapes from a parenthesized text format:
//!
//! ```text
//! form := '(' tag item* ')'
//! item := form | atom
//! atom := integer | float | "string" | word
//! ```
//!
//! Tags name node kinds (`program`, `class`, `def`, `call`, ...). Atoms
//! set the node payload: an integer atom becomes an integer payload, an
//! atom with a decimal point becomes a float, a double-quoted string
//! becomes text, and any other word becomes a name. A form carries at
//! most one atom. `;` starts a comment running to the end of the line.
//!
//! ```text
//! (program
//!   (class (const Counter) (stmts
//!     (def step (params (ident n)) (stmts
//!       (assign (ivar @count)
//!         (call (ivar @count) + (args (ident n))))))))
//!   (assign (ident c) (call (const Counter) new (args)))
//!   (call (ident c) step (args (int 1))))
//! ```
//!
//! Every node is stamped with the byte range of its form, so findings
//! point back into the tree file itself. The reader checks syntax and tag
//! names only; a well-formed tree with a bad child layout is the
//! analyzer's problem and degrades to a per-method finding there.

use lumen_core::source::Span;
use lumen_core::tree::{NodeKind, Payload, RawNode};
use miette::{NamedSource, SourceSpan};

/// A syntax error in a tree file.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
#[diagnostic(code(lumen::reader))]
pub struct ReadError {
    pub message: String,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("here")]
    pub span: SourceSpan,
}

/// Reads a whole tree file. A file holding a single `(program ...)` form
/// is taken as is; any other sequence of forms is wrapped in one.
pub fn read_program(path: &str, text: &str) -> Result<RawNode, ReadError> {
    let mut reader = Reader { text, pos: 0 };
    let mut forms = Vec::new();
    loop {
        reader.skip_trivia();
        if reader.at_end() {
            break;
        }
        forms.push(
            reader
                .form()
                .map_err(|err| err.into_read_error(path, text))?,
        );
    }
    if forms.len() == 1 && forms[0].kind == NodeKind::Program {
        return Ok(forms.remove(0));
    }
    Ok(RawNode::new(NodeKind::Program)
        .with_children(forms)
        .with_span(Span::from(0..text.len())))
}

struct SyntaxError {
    message: String,
    span: Span,
}

impl SyntaxError {
    fn into_read_error(self, path: &str, text: &str) -> ReadError {
        ReadError {
            message: self.message,
            src: NamedSource::new(path, text.to_string()),
            span: self.span.into(),
        }
    }
}

struct Reader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b';' => {
                    while let Some(byte) = self.peek() {
                        self.pos += 1;
                        if byte == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn form(&mut self) -> Result<RawNode, SyntaxError> {
        let start = self.pos;
        if self.peek() != Some(b'(') {
            return Err(self.error_here("expected `(`"));
        }
        self.pos += 1;
        self.skip_trivia();
        let tag_start = self.pos;
        let tag = self.word();
        if tag.is_empty() {
            return Err(self.error_here("expected a node tag"));
        }
        let Some(kind) = kind_for_tag(tag) else {
            return Err(SyntaxError {
                message: format!("unknown node tag `{tag}`"),
                span: Span::from(tag_start..self.pos),
            });
        };
        let mut payload = None;
        let mut children = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => {
                    return Err(SyntaxError {
                        message: "unclosed form".to_string(),
                        span: Span::from(start..start + 1),
                    });
                }
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(b'(') => children.push(self.form()?),
                Some(_) => {
                    let atom_start = self.pos;
                    let atom = self.atom()?;
                    if payload.is_some() {
                        return Err(SyntaxError {
                            message: "a form carries at most one atom".to_string(),
                            span: Span::from(atom_start..self.pos),
                        });
                    }
                    payload = Some(atom);
                }
            }
        }
        let mut node = RawNode::new(kind)
            .with_children(children)
            .with_span(Span::from(start..self.pos));
        if let Some(payload) = payload {
            node = node.with_payload(payload);
        }
        Ok(node)
    }

    fn atom(&mut self) -> Result<Payload, SyntaxError> {
        if self.peek() == Some(b'"') {
            return self.string();
        }
        let word = self.word();
        if word.is_empty() {
            return Err(self.error_here("expected an atom"));
        }
        Ok(classify(word))
    }

    /// A run of bytes up to a delimiter. Multibyte characters pass
    /// through whole, so the slice stays on character boundaries.
    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'(' | b')' | b'"' | b';') || byte.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn string(&mut self) -> Result<Payload, SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();
        loop {
            let Some(ch) = self.text[self.pos..].chars().next() else {
                return Err(SyntaxError {
                    message: "unterminated string".to_string(),
                    span: Span::from(start..start + 1),
                });
            };
            self.pos += ch.len_utf8();
            match ch {
                '"' => return Ok(Payload::Text(text.into())),
                '\\' => {
                    let Some(escaped) = self.text[self.pos..].chars().next() else {
                        return Err(SyntaxError {
                            message: "unterminated string".to_string(),
                            span: Span::from(start..start + 1),
                        });
                    };
                    self.pos += escaped.len_utf8();
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        '"' => text.push('"'),
                        '\\' => text.push('\\'),
                        other => {
                            return Err(SyntaxError {
                                message: format!("unknown escape `\\{other}`"),
                                span: Span::from(self.pos - 1 - other.len_utf8()..self.pos),
                            });
                        }
                    }
                }
                other => text.push(other),
            }
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let width = usize::from(!self.at_end());
        SyntaxError {
            message: message.to_string(),
            span: Span::from(self.pos..self.pos + width),
        }
    }
}

/// Integers and dotted floats become numeric payloads; everything else,
/// operators and sigiled variables included, is a name.
fn classify(word: &str) -> Payload {
    if let Ok(value) = word.parse::<i64>() {
        return Payload::Int(value);
    }
    if word.contains('.') {
        if let Ok(value) = word.parse::<f64>() {
            return Payload::Float(value);
        }
    }
    Payload::Name(word.into())
}

fn kind_for_tag(tag: &str) -> Option<NodeKind> {
    let kind = match tag {
        "program" => NodeKind::Program,
        "stmts" => NodeKind::StmtList,
        "args" => NodeKind::ArgList,
        "params" => NodeKind::ParamList,
        "nil" => NodeKind::NilLit,
        "true" => NodeKind::TrueLit,
        "false" => NodeKind::FalseLit,
        "int" => NodeKind::IntLit,
        "float" => NodeKind::FloatLit,
        "str" => NodeKind::StrLit,
        "sym" => NodeKind::SymLit,
        "array" => NodeKind::ArrayLit,
        "hash" => NodeKind::HashLit,
        "range" => NodeKind::RangeLit,
        "xrange" => NodeKind::RangeExclLit,
        "self" => NodeKind::SelfRef,
        "__file__" => NodeKind::FileKeyword,
        "__line__" => NodeKind::LineKeyword,
        "ident" => NodeKind::Ident,
        "const" => NodeKind::ConstRef,
        "const_path" => NodeKind::ConstPath,
        "top_const" => NodeKind::TopConst,
        "ivar" => NodeKind::IvarRef,
        "cvar" => NodeKind::CvarRef,
        "gvar" => NodeKind::GvarRef,
        "assign" => NodeKind::Assign,
        "call" => NodeKind::Call,
        "super" => NodeKind::SuperCall,
        "yield" => NodeKind::YieldExpr,
        "raise" => NodeKind::RaiseExpr,
        "return" => NodeKind::ReturnExpr,
        "if" => NodeKind::If,
        "while" => NodeKind::While,
        "begin" => NodeKind::Begin,
        "rescue" => NodeKind::RescueClause,
        "ensure" => NodeKind::EnsureClause,
        "block" => NodeKind::BlockLit,
        "class" => NodeKind::ClassDef,
        "module" => NodeKind::ModuleDef,
        "def" => NodeKind::MethodDef,
        "defs" => NodeKind::SingletonMethodDef,
        "paren" => NodeKind::Paren,
        _ => return None,
    };
    Some(kind)
}
