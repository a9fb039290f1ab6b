//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Static table of the XPath 1.0 core library plus the YANG extensions.

/// Arity descriptor of one library function.
#[derive(Clone, Copy, Debug)]
pub(crate) struct XPathFunction {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means unbounded (`concat`).
    pub max_args: Option<usize>,
}

const fn func(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
) -> XPathFunction {
    XPathFunction {
        name,
        min_args,
        max_args,
    }
}

pub(crate) static FUNCTIONS: &[XPathFunction] = &[
    // XPath 1.0 core library.
    func("boolean", 1, Some(1)),
    func("ceiling", 1, Some(1)),
    func("concat", 2, None),
    func("contains", 2, Some(2)),
    func("count", 1, Some(1)),
    func("false", 0, Some(0)),
    func("floor", 1, Some(1)),
    // No-op in YANG contexts.
    func("id", 1, Some(1)),
    func("lang", 1, Some(1)),
    func("last", 0, Some(0)),
    func("local-name", 0, Some(1)),
    // Deviates from XPath 1.0: returns the local name, like local-name().
    func("name", 0, Some(1)),
    func("namespace-uri", 0, Some(1)),
    func("normalize-space", 0, Some(1)),
    func("not", 1, Some(1)),
    func("number", 0, Some(1)),
    func("position", 0, Some(0)),
    func("round", 1, Some(1)),
    func("starts-with", 2, Some(2)),
    func("string", 0, Some(1)),
    func("string-length", 0, Some(1)),
    func("substring", 2, Some(3)),
    func("substring-after", 2, Some(2)),
    func("substring-before", 2, Some(2)),
    func("sum", 1, Some(1)),
    func("translate", 3, Some(3)),
    func("true", 0, Some(0)),
    // YANG function library (RFC 7950 section 10).
    func("bit-is-set", 2, Some(2)),
    func("current", 0, Some(0)),
    func("deref", 1, Some(1)),
    func("derived-from", 2, Some(2)),
    func("derived-from-or-self", 2, Some(2)),
    func("enum-value", 1, Some(1)),
    func("re-match", 2, Some(2)),
];

pub(crate) fn lookup(name: &str) -> Option<&'static XPathFunction> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup() {
        assert!(lookup("current").is_some());
        assert!(lookup("derived-from-or-self").is_some());
        assert!(lookup("document").is_none());
        let concat = lookup("concat").unwrap();
        assert_eq!(concat.min_args, 2);
        assert_eq!(concat.max_args, None);
    }
}
