//! Syntax layer for gqlbind.
//!
//! This crate provides the read-only syntax nodes handed over by a schema
//! parser:
//! - `ast`: directive usages, arguments, literal values and the nodes
//!   attached to type and field definitions

pub mod ast;

pub use ast::*;
