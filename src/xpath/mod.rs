//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! YANG-XPath expression compiler and evaluator.
//!
//! Expressions are compiled into a flat, parallel-array token stream: the
//! token kinds, their byte spans in the source (kept for diagnostics) and,
//! per token that starts a sub-expression, the ordered list of operator
//! precedence levels that repeat there. The evaluator descends directly
//! into the levels that actually occur instead of recursing through every
//! grammar production.

use bitflags::bitflags;
use num_derive::FromPrimitive;
use smallvec::SmallVec;

use crate::error::{Error, ErrorKind, Result};

pub(crate) mod eval;
pub(crate) mod functions;
pub(crate) mod lexer;
pub(crate) mod parser;

pub use eval::XPathValue;

/// Maximum accepted expression length, in bytes.
pub const MAX_EXPR_LEN: usize = 65535;

/// Token kinds of the XPath lexical grammar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Token {
    /// `(`
    ParenL,
    /// `)`
    ParenR,
    /// `[`
    BrackL,
    /// `]`
    BrackR,
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `@`
    At,
    /// `,`
    Comma,
    /// Name test, possibly prefixed, possibly a wildcard.
    NameTest,
    /// `node`, `text` or `comment` followed by `(`.
    NodeType,
    /// Function name followed by `(`.
    FuncName,
    /// `and`, `or`
    OperLog,
    /// `=`, `!=`, `<`, `<=`, `>`, `>=`
    OperComp,
    /// `+`, `-`, `*`, `div`, `mod`
    OperMath,
    /// `|`
    OperUni,
    /// `/`, `//`
    OperPath,
    /// Quoted literal.
    Literal,
    /// Number literal.
    Number,
}

/// Operator precedence levels recorded in the repeat annotations, lowest
/// precedence first. Stored as raw `u8` in the compiled expression and
/// recovered through `FromPrimitive`.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[repr(u8)]
pub(crate) enum ExprLevel {
    Or = 1,
    And,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
    Union,
}

bitflags! {
    /// Options driving XPath evaluation.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct XPathOptions: u32 {
        /// Restrict node-set roots to the `config true` subtree.
        const CONFIG_ONLY = 0x01;
        /// Report nodes with undecided `when` as a distinct outcome
        /// instead of an error.
        const WHEN_ENABLED = 0x02;
        /// Evaluate in schema mode.
        const SNODE = 0x04;
        /// In schema mode, descend into RPC output instead of input.
        const SNODE_OUTPUT = 0x08;
        /// Schema-mode evaluation on behalf of a `must` statement.
        const SNODE_MUST = 0x10;
        /// Schema-mode evaluation on behalf of a `when` statement.
        const SNODE_WHEN = 0x20;
    }
}

/// A compiled XPath expression.
///
/// Immutable once compiled; reusable across any number of evaluations and
/// freely shareable between contexts since name resolution happens at
/// evaluation time.
#[derive(Clone, Debug)]
pub struct XPathExpr {
    pub(crate) source: Box<str>,
    pub(crate) tokens: Vec<Token>,
    pub(crate) tok_pos: Vec<u16>,
    pub(crate) tok_len: Vec<u16>,
    /// Precedence levels repeating at each token, outermost first.
    pub(crate) repeat: Vec<SmallVec<[u8; 2]>>,
}

// ===== impl XPathExpr =====

impl XPathExpr {
    /// Compile an expression: lexical scan, then a grammar re-parse that
    /// validates structure, checks function arity and fills the repeat
    /// annotations.
    pub fn compile(source: &str) -> Result<XPathExpr> {
        if source.len() > MAX_EXPR_LEN {
            return Err(Error::new(
                ErrorKind::Syntax,
                "expression too long",
            ));
        }
        let mut expr = lexer::lex(source)?;
        parser::reparse(&mut expr)?;
        Ok(expr)
    }

    /// The source text of the expression.
    pub fn text(&self) -> &str {
        &self.source
    }

    pub(crate) fn tok_str(&self, i: usize) -> &str {
        let start = self.tok_pos[i] as usize;
        let end = start + self.tok_len[i] as usize;
        &self.source[start..end]
    }

    /// Syntax error pointing at the given token.
    pub(crate) fn error_at(&self, i: usize, msg: &str) -> Error {
        let offset = if i < self.tokens.len() {
            self.tok_pos[i] as usize
        } else {
            self.source.len()
        };
        Error::new(
            ErrorKind::Syntax,
            format!("{} at offset {} in \"{}\"", msg, offset, self.source),
        )
    }
}
