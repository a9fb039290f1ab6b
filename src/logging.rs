//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Diagnostics channel.
//!
//! Every [`Context`](crate::context::Context) owns its own channel: errors
//! are recorded according to the configured store policy and warnings are
//! forwarded to the registered callback. [`DefaultLogger`] bridges the
//! channel to the `log` crate facade.

use std::borrow::Cow;

use crate::error::Error;

/// Severity of a diagnostic message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd)]
pub enum LogLevel {
    Error,
    Warning,
    Verbose,
    Debug,
}

/// How the context stores errors between calls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ErrorStorePolicy {
    /// Keep every error since the last reset.
    StoreAll,
    /// Keep only the most recent error.
    #[default]
    StoreLast,
    /// Do not store errors at all.
    Discard,
}

/// A custom logger receiving context diagnostics.
pub trait LogCallback: Send + Sync + 'static {
    fn log<'a>(
        &'a self,
        level: LogLevel,
        msg: Cow<'a, str>,
        data_path: Option<Cow<'a, str>>,
        schema_path: Option<Cow<'a, str>>,
    );
}

/// Per-context diagnostics state.
#[derive(Default)]
pub(crate) struct DiagChannel {
    policy: ErrorStorePolicy,
    errors: Vec<Error>,
    callback: Option<Box<dyn LogCallback>>,
}

/// A logger that forwards context diagnostics to the `log` crate.
#[derive(Debug, Default)]
pub struct DefaultLogger {
    _private: (),
}

// ===== impl DiagChannel =====

impl DiagChannel {
    pub(crate) fn new() -> DiagChannel {
        DiagChannel::default()
    }

    pub(crate) fn set_policy(&mut self, policy: ErrorStorePolicy) {
        self.policy = policy;
        self.errors.clear();
    }

    pub(crate) fn set_callback(&mut self, callback: Box<dyn LogCallback>) {
        self.callback = Some(callback);
    }

    pub(crate) fn record(&mut self, error: &Error) {
        match self.policy {
            ErrorStorePolicy::StoreAll => self.errors.push(error.clone()),
            ErrorStorePolicy::StoreLast => {
                self.errors.clear();
                self.errors.push(error.clone());
            }
            ErrorStorePolicy::Discard => (),
        }
        if let Some(cb) = &self.callback {
            cb.log(
                LogLevel::Error,
                Cow::from(error.msg.as_deref().unwrap_or("unknown error")),
                error.path.as_deref().map(Cow::from),
                None,
            );
        }
    }

    /// Warnings, like errors, reach the outside only through the
    /// registered callback; install [`DefaultLogger`] to forward them to
    /// the `log` facade.
    pub(crate) fn warn(&self, msg: &str, schema_path: Option<&str>) {
        if let Some(cb) = &self.callback {
            cb.log(
                LogLevel::Warning,
                Cow::from(msg),
                None,
                schema_path.map(Cow::from),
            );
        }
    }

    pub(crate) fn last_error(&self) -> Option<Error> {
        self.errors.last().cloned()
    }

    pub(crate) fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub(crate) fn reset(&mut self) {
        self.errors.clear();
    }
}

impl std::fmt::Debug for DiagChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagChannel")
            .field("policy", &self.policy)
            .field("errors", &self.errors)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

// ===== impl DefaultLogger =====

impl LogCallback for DefaultLogger {
    fn log<'a>(
        &'a self,
        level: LogLevel,
        msg: Cow<'a, str>,
        data_path: Option<Cow<'a, str>>,
        schema_path: Option<Cow<'a, str>>,
    ) {
        let level = match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Verbose => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        };
        log::log! {
            target: "yangcore",
            level,
            "schema_path={schema_path:?}, data_path={data_path:?}, msg={msg}",
        }
    }
}
