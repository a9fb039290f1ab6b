//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Native Rust engine for the YANG data-modelling language.
//!
//! yangcore implements the semantic core a YANG toolchain rests on: the
//! compiled schema model with its type system and resolver
//! (uses/grouping expansion, augments, deviations, leafref binding,
//! status and feature gating), an XPath 1.0 evaluator extended with the
//! YANG function library that runs against either data trees or the
//! schema tree, and the instance-data validator that drives it.
//!
//! Textual YANG/YIN parsing and XML/JSON serialization are out of scope:
//! parsers feed the engine through the declaration types in [`builder`]
//! and the node factories on [`data::DataTree`], and printers consume
//! the navigation API.
//!
//! ## Design Goals
//! * Model the schema as index-linked arenas owned by the [`context::Context`],
//!   so the compiled schema is immutable, cheaply shareable and free of
//!   reference cycles
//! * Keep handles (`SchemaNode`, `DataNodeRef`) small and `Copy`-cheap,
//!   borrowing the context instead of counting references
//! * Surface every diagnostic through a per-context channel with a
//!   configurable store policy

mod arena;
mod error;
mod resolver;
mod types;
mod validation;

pub mod builder;
pub mod context;
pub mod data;
pub mod iter;
pub mod logging;
pub mod schema;
pub mod xpath;

pub use crate::error::{Error, ErrorKind, Result};
