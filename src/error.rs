//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::context::Context;

/// A convenience wrapper around `Result` for `yangcore::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum listing possible error classes from yangcore.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Unexpected character, unterminated literal or unknown token in an
    /// XPath expression or lexical value.
    Syntax,
    /// Unknown function or wrong number of arguments.
    UnknownFunction,
    /// Unknown module name or prefix.
    UnknownModule,
    /// Value not representable in the target type, or a range/length/pattern
    /// constraint was violated.
    TypeMismatch,
    /// Enum name or bit not present in the (possibly restricted) set.
    InvalidEnum,
    /// Duplicate identifier within a module scope.
    DuplicateIdentifier,
    /// List key missing or, under strict parsing, out of order.
    ListKey,
    /// Duplicate list or leaf-list instance.
    DuplicateInstance,
    /// A `unique` constraint was violated.
    Unique,
    /// `min-elements`/`max-elements` violation.
    MinMaxElements,
    /// Mandatory node missing.
    Mandatory,
    /// Leafref target value not present in the data tree.
    LeafrefNoTarget,
    /// Instance-identifier target missing.
    InstanceIdNoTarget,
    /// Identity is not derived from the required base.
    IdentityNotDerived,
    /// A `when` condition evaluated to false.
    WhenFalse,
    /// A `must` condition evaluated to false.
    MustFalse,
    /// Import or include cycle.
    CircularDependency,
    /// Augment or deviation target not found, or leafref path does not
    /// resolve to a leaf.
    UnresolvedReference,
    /// Reference from a `current` definition to a definition of lower
    /// status.
    StatusDowngrade,
    /// Data not allowed under the given validation options.
    InvalidData,
    /// Operation was cancelled through the caller-provided token.
    Cancelled,
    /// Everything else.
    Other,
}

/// Enum listing possible errors from yangcore.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub msg: Option<String>,
    pub path: Option<String>,
    pub apptag: Option<String>,
}

// ===== impl Error =====

impl Error {
    /// Retrieve the last error recorded on the context's diagnostic
    /// channel, or a generic error if the channel holds none.
    pub fn last(ctx: &Context) -> Error {
        ctx.last_error().unwrap_or_default()
    }

    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Error {
        Error {
            kind,
            msg: Some(msg.into()),
            path: None,
            apptag: None,
        }
    }

    pub fn new_path(
        kind: ErrorKind,
        msg: impl Into<String>,
        path: impl Into<String>,
    ) -> Error {
        Error {
            kind,
            msg: Some(msg.into()),
            path: Some(path.into()),
            apptag: None,
        }
    }

    pub fn other(msg: &str) -> Error {
        Error {
            msg: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn with_path(mut self, path: impl Into<String>) -> Error {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    pub(crate) fn with_apptag(mut self, apptag: Option<String>) -> Error {
        if self.apptag.is_none() {
            self.apptag = apptag;
        }
        self
    }
}

impl Default for Error {
    fn default() -> Self {
        Error {
            kind: ErrorKind::Other,
            msg: None,
            path: None,
            apptag: None,
        }
    }
}

impl std::fmt::Display for Error {
    // Print only the base error message by default.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(msg) = &self.msg {
            write!(f, "{}", msg)
        } else {
            write!(f, "Unknown error: {:?}", self.kind)
        }
    }
}

impl std::error::Error for Error {}
