//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! XPath grammar re-parse.
//!
//! Walks the token stream along the expression grammar (LocationPath,
//! PathExpr, Unary/Union/Multiplicative/Additive/Relational/Equality/
//! And/Or) without building a syntax tree. The only outputs are syntax
//! and arity diagnostics and the per-token `repeat` annotations that let
//! the evaluator skip empty precedence levels.

use super::{functions, ExprLevel, Token, XPathExpr};
use crate::error::{Error, ErrorKind, Result};

pub(crate) fn reparse(expr: &mut XPathExpr) -> Result<()> {
    let mut pos = 0;
    reparse_or(expr, &mut pos)?;
    if pos != expr.tokens.len() {
        return Err(expr.error_at(pos, "unexpected token"));
    }
    Ok(())
}

fn tok(expr: &XPathExpr, pos: usize) -> Option<Token> {
    expr.tokens.get(pos).copied()
}

fn expect(
    expr: &XPathExpr,
    pos: &mut usize,
    token: Token,
    what: &str,
) -> Result<()> {
    if tok(expr, *pos) != Some(token) {
        return Err(expr.error_at(*pos, what));
    }
    *pos += 1;
    Ok(())
}

/// Record that `level` repeats at the sub-expression starting at `start`.
/// Inner productions run first, so inserting at the front keeps the list
/// ordered outermost level first.
fn record(expr: &mut XPathExpr, start: usize, level: ExprLevel) {
    expr.repeat[start].insert(0, level as u8);
}

fn reparse_or(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_and(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperLog)
        && expr.tok_str(*pos) == "or"
    {
        *pos += 1;
        reparse_and(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::Or);
    }
    Ok(())
}

fn reparse_and(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_equality(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperLog)
        && expr.tok_str(*pos) == "and"
    {
        *pos += 1;
        reparse_equality(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::And);
    }
    Ok(())
}

fn reparse_equality(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_relational(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperComp)
        && matches!(expr.tok_str(*pos), "=" | "!=")
    {
        *pos += 1;
        reparse_relational(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::Equality);
    }
    Ok(())
}

fn reparse_relational(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_additive(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperComp)
        && matches!(expr.tok_str(*pos), "<" | "<=" | ">" | ">=")
    {
        *pos += 1;
        reparse_additive(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::Relational);
    }
    Ok(())
}

fn reparse_additive(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_multiplicative(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperMath)
        && matches!(expr.tok_str(*pos), "+" | "-")
    {
        *pos += 1;
        reparse_multiplicative(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::Additive);
    }
    Ok(())
}

fn reparse_multiplicative(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_unary(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperMath)
        && matches!(expr.tok_str(*pos), "*" | "div" | "mod")
    {
        *pos += 1;
        reparse_unary(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::Multiplicative);
    }
    Ok(())
}

fn reparse_unary(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperMath)
        && expr.tok_str(*pos) == "-"
    {
        *pos += 1;
        repeats = true;
    }
    reparse_union(expr, pos)?;
    if repeats {
        record(expr, start, ExprLevel::Unary);
    }
    Ok(())
}

fn reparse_union(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let start = *pos;
    reparse_path(expr, pos)?;
    let mut repeats = false;
    while tok(expr, *pos) == Some(Token::OperUni) {
        *pos += 1;
        reparse_path(expr, pos)?;
        repeats = true;
    }
    if repeats {
        record(expr, start, ExprLevel::Union);
    }
    Ok(())
}

fn starts_step(token: Option<Token>) -> bool {
    matches!(
        token,
        Some(Token::Dot)
            | Some(Token::DotDot)
            | Some(Token::At)
            | Some(Token::NameTest)
            | Some(Token::NodeType)
    )
}

fn reparse_path(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    match tok(expr, *pos) {
        Some(Token::ParenL)
        | Some(Token::Literal)
        | Some(Token::Number)
        | Some(Token::FuncName) => {
            reparse_filter(expr, pos)?;
            // Optional path continuation after a filter expression.
            if tok(expr, *pos) == Some(Token::OperPath) {
                *pos += 1;
                reparse_relative_location_path(expr, pos)?;
            }
            Ok(())
        }
        Some(Token::OperPath) => {
            let descendants = expr.tok_str(*pos) == "//";
            *pos += 1;
            if starts_step(tok(expr, *pos)) {
                reparse_relative_location_path(expr, pos)
            } else if descendants {
                Err(expr.error_at(*pos, "expected a step after \"//\""))
            } else {
                // `/` on its own selects the root.
                Ok(())
            }
        }
        token if starts_step(token) => {
            reparse_relative_location_path(expr, pos)
        }
        _ => Err(expr.error_at(*pos, "expected an expression")),
    }
}

fn reparse_relative_location_path(
    expr: &mut XPathExpr,
    pos: &mut usize,
) -> Result<()> {
    reparse_step(expr, pos)?;
    while tok(expr, *pos) == Some(Token::OperPath) {
        *pos += 1;
        reparse_step(expr, pos)?;
    }
    Ok(())
}

fn reparse_step(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    match tok(expr, *pos) {
        Some(Token::Dot) | Some(Token::DotDot) => {
            *pos += 1;
            Ok(())
        }
        Some(Token::At) => {
            *pos += 1;
            expect(expr, pos, Token::NameTest, "expected an attribute name")?;
            reparse_predicates(expr, pos)
        }
        Some(Token::NameTest) => {
            *pos += 1;
            reparse_predicates(expr, pos)
        }
        Some(Token::NodeType) => {
            *pos += 1;
            expect(expr, pos, Token::ParenL, "expected \"(\"")?;
            expect(expr, pos, Token::ParenR, "expected \")\"")?;
            reparse_predicates(expr, pos)
        }
        _ => Err(expr.error_at(*pos, "expected a step")),
    }
}

fn reparse_predicates(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    while tok(expr, *pos) == Some(Token::BrackL) {
        *pos += 1;
        reparse_or(expr, pos)?;
        expect(expr, pos, Token::BrackR, "expected \"]\"")?;
    }
    Ok(())
}

fn reparse_filter(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    match tok(expr, *pos) {
        Some(Token::ParenL) => {
            *pos += 1;
            reparse_or(expr, pos)?;
            expect(expr, pos, Token::ParenR, "expected \")\"")?;
        }
        Some(Token::Literal) | Some(Token::Number) => {
            *pos += 1;
        }
        Some(Token::FuncName) => reparse_function_call(expr, pos)?,
        _ => return Err(expr.error_at(*pos, "expected an expression")),
    }
    reparse_predicates(expr, pos)
}

fn reparse_function_call(expr: &mut XPathExpr, pos: &mut usize) -> Result<()> {
    let name = expr.tok_str(*pos).to_string();
    let func = functions::lookup(&name).ok_or_else(|| {
        Error::new(
            ErrorKind::UnknownFunction,
            format!("unknown XPath function \"{}\"", name),
        )
    })?;
    *pos += 1;
    expect(expr, pos, Token::ParenL, "expected \"(\"")?;
    let mut argc = 0;
    if tok(expr, *pos) != Some(Token::ParenR) {
        reparse_or(expr, pos)?;
        argc += 1;
        while tok(expr, *pos) == Some(Token::Comma) {
            *pos += 1;
            reparse_or(expr, pos)?;
            argc += 1;
        }
    }
    expect(expr, pos, Token::ParenR, "expected \")\"")?;
    if argc < func.min_args
        || func.max_args.is_some_and(|max| argc > max)
    {
        return Err(Error::new(
            ErrorKind::UnknownFunction,
            format!(
                "function \"{}\" called with {} argument(s)",
                name, argc
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::XPathExpr;
    use super::*;

    #[test]
    fn repeat_annotations() {
        let expr = XPathExpr::compile("1 + 2 * 3").unwrap();
        // Additive repeats at token 0, multiplicative at token 2.
        assert_eq!(
            expr.repeat[0].as_slice(),
            &[ExprLevel::Additive as u8]
        );
        assert_eq!(
            expr.repeat[2].as_slice(),
            &[ExprLevel::Multiplicative as u8]
        );
    }

    #[test]
    fn nested_levels_outermost_first() {
        let expr = XPathExpr::compile("1 = 2 or 3").unwrap();
        assert_eq!(
            expr.repeat[0].as_slice(),
            &[ExprLevel::Or as u8, ExprLevel::Equality as u8]
        );
    }

    #[test]
    fn unary_and_union() {
        let expr = XPathExpr::compile("-1").unwrap();
        assert_eq!(expr.repeat[0].as_slice(), &[ExprLevel::Unary as u8]);
        let expr = XPathExpr::compile("a | b | c").unwrap();
        assert_eq!(expr.repeat[0].as_slice(), &[ExprLevel::Union as u8]);
    }

    #[test]
    fn syntax_errors() {
        assert!(XPathExpr::compile("1 +").is_err());
        assert!(XPathExpr::compile("(1").is_err());
        assert!(XPathExpr::compile("a[").is_err());
        assert!(XPathExpr::compile("//").is_err());
        assert!(XPathExpr::compile("frobnicate(1)").is_err());
        assert!(XPathExpr::compile("count()").is_err());
        assert!(XPathExpr::compile("count(a, b)").is_err());
        assert!(XPathExpr::compile("true(1)").is_err());
    }

    #[test]
    fn valid_shapes() {
        for source in [
            "/",
            "/a/b/c",
            "../a = 1",
            "a//b[c='x'][2]",
            "current()/../x",
            "concat('a', 'b', 'c')",
            "string(/a/b) != ''",
            "not(/a) and (/b | /c)",
            "-(1 + 2) * 3 mod 4 div 5",
            "@attr = 'v'",
            "text()",
            "deref(.)/../name",
        ] {
            XPathExpr::compile(source)
                .unwrap_or_else(|e| panic!("{}: {}", source, e));
        }
    }
}
