//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output and so merges in the
// liveness analysis (spec.md §4.4) stay bounded.
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Interned identifiers, used for function and block display names.
pub type Id = internment::Intern<String>;

/// Index of a variable within its owning function's variable arena
/// (spec.md §3: "Variables are owned by their enclosing function, stored
/// in an append-only arena; pointers remain stable for the compilation's
/// lifetime"). A `Vec` index is stable under push-only mutation, which is
/// this crate's arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

/// Index of a basic block within its owning function.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// Index of a function within the program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(pub u32);

/// A bit-pattern wrapper so `f64` constants can live in ordered
/// collections and be compared for bitwise equality, the way the
/// location tracker needs (spec.md §3, `Double(v)` locations).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FloatBits(pub u64);

impl FloatBits {
    pub fn from_f64(v: f64) -> Self {
        FloatBits(v.to_bits())
    }

    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl std::fmt::Display for FloatBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}
