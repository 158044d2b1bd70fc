//! Code generation (spec.md §4.5-§4.10): the location tracker, the
//! per-block driver that walks quadruples and calls into a target
//! backend, the two backends (`quadr` text dump and x86 NASM), the
//! line-buffered output buffer, and the peephole pass.

pub mod backend;
pub mod driver;
pub mod outbuf;
pub mod peephole;
pub mod quadr;
pub mod tracker;
pub mod x86;

pub use backend::Backend;
pub use tracker::{Loc, Tracker};
