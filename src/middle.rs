//! The middle-end: the IR model, the AST-to-IR builder, CFG construction,
//! the local optimizer, and global liveness analysis (spec.md §§3, 4.1–4.4).

pub mod build;
pub mod cfg;
pub mod dag;
pub mod ir;
pub mod liveness;
pub mod localopt;

pub use ir::*;
