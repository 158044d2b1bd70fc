//! The quadruple IR model (spec.md §3): variables, quadruples, basic
//! blocks, and functions.

use crate::common::*;
use crate::front::ast::{BOp, Type};

/// The IR-level category of a variable (spec.md §3, "IR category").
/// Distinct from the source [`Type`] because of implicit conversions
/// introduced while lowering (e.g. an `int` literal used to initialize a
/// `double`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarKind {
    Int,
    Double,
    Ptr,
    Array,
    Str,
    Byte,
}

impl VarKind {
    pub fn from_source_type(t: &Type) -> VarKind {
        match t {
            Type::Int => VarKind::Int,
            Type::Double => VarKind::Double,
            Type::Bool => VarKind::Byte,
            Type::Str => VarKind::Str,
            Type::Void => VarKind::Int,
            Type::Array(..) => VarKind::Array,
        }
    }

    pub fn is_fp(self) -> bool {
        matches!(self, VarKind::Double)
    }
}

/// A variable: one entry in a function's append-only arena (spec.md §3).
#[derive(Debug, Clone)]
pub struct VarData {
    pub source_type: Type,
    pub kind: VarKind,
    /// Byte size, fixed once the backend is chosen (set by the driver
    /// before code generation; `0` beforehand).
    pub size: u32,
    /// Transient liveness flag used by the code generator driver
    /// (spec.md §3, "a liveness flag used transiently by the driver").
    pub live: bool,
    /// Debug name, for `quadr`-format output and diagnostics.
    pub name: Option<Id>,
}

impl VarData {
    pub fn new(source_type: Type, name: Option<Id>) -> Self {
        let kind = VarKind::from_source_type(&source_type);
        VarData { source_type, kind, size: 0, live: true, name }
    }
}

/// Quadruple operands (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    None,
    Var(VarId),
    Int(i64),
    Double(f64),
    Label(BlockId),
    Func(FuncId),
}

/// A reference to a string constant, kept out of [`Operand`] proper since
/// it is the only operand requiring owned/interned data and only appears
/// on `Param` for `printString`.
pub type StrRef = Id;

/// Quadruple opcodes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Copy,
    ReadPtr,
    WritePtr,
    GetAddr,
    Return,
    Param,
    Call,
    Goto,
    IfEq,
    IfNe,
    IfLt,
    IfGt,
    IfLe,
    IfGe,
}

impl Op {
    pub fn from_bop(op: BOp) -> Op {
        match op {
            BOp::Add => Op::Add,
            BOp::Sub => Op::Sub,
            BOp::Mul => Op::Mul,
            BOp::Div => Op::Div,
            BOp::Mod => Op::Mod,
            _ => panic!("Op::from_bop called with a non-arithmetic BOp"),
        }
    }

    pub fn is_if(self) -> bool {
        matches!(
            self,
            Op::IfEq | Op::IfNe | Op::IfLt | Op::IfGt | Op::IfLe | Op::IfGe
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, Op::Add | Op::Mul)
    }

    /// The relational opcode obtained by swapping the two operands
    /// (`a < b` becomes `b > a`), used by the local optimizer's DAG
    /// canonicalization and by the x86 backend's branch-direction table.
    pub fn swapped(self) -> Op {
        match self {
            Op::IfLt => Op::IfGt,
            Op::IfGt => Op::IfLt,
            Op::IfLe => Op::IfGe,
            Op::IfGe => Op::IfLe,
            other => other,
        }
    }
}

/// A single three-address instruction (spec.md §3).
#[derive(Debug, Clone)]
pub struct Quadr {
    pub op: Op,
    pub result: Operand,
    pub arg1: Operand,
    pub arg2: Operand,
    /// Only set for a `Param` quadruple whose argument is a string
    /// constant (spec.md §3: "`Q_PARAM` -> arg1.tag == QA_VAR/QA_STR").
    pub str_arg: Option<StrRef>,
}

impl Quadr {
    pub fn new(op: Op, result: Operand, arg1: Operand, arg2: Operand) -> Self {
        Quadr { op, result, arg1, arg2, str_arg: None }
    }

    /// Variables this quadruple *uses* (reads), per spec.md's
    /// `used_in_quadr` helper (note: `WritePtr`'s base lives in `result`
    /// but is a use, not a definition).
    pub fn uses(&self) -> Vec<VarId> {
        let mut out = vec![];
        if let Operand::Var(v) = self.arg1 {
            out.push(v);
        }
        if let Operand::Var(v) = self.arg2 {
            out.push(v);
        }
        if self.op == Op::WritePtr {
            if let Operand::Var(v) = self.result {
                out.push(v);
            }
        }
        out
    }

    /// The variable this quadruple *defines* (assigns), if any, per
    /// spec.md's `assigned_in_quadr` helper.
    pub fn def(&self) -> Option<VarId> {
        if self.op == Op::WritePtr {
            return None;
        }
        match self.result {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }
}

/// Basic-block persistent mark bits (spec.md §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockMark {
    pub generated: bool,
    pub referenced: bool,
}

/// A basic block: a straight-line quadruple sequence with at most two CFG
/// successors (spec.md §3).
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub quadrs: Vec<Quadr>,
    pub child1: Option<BlockId>,
    pub child2: Option<BlockId>,
    pub mark: BlockMark,
    /// Finalized by [`crate::middle::liveness::analyze`]: variables live
    /// at the end of this block, in a stable order.
    pub live_at_end: Vec<VarId>,
    /// Finalized by liveness: variables live at the start of this block,
    /// mapped to their nearest-use distance from the block's first
    /// instruction. Location suggestions (spec.md §4.7) are tracked
    /// separately by the code generator driver, not here, to keep the
    /// middle-end backend-agnostic.
    pub vars_at_start: Map<VarId, u32>,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Block {
            id,
            quadrs: vec![],
            child1: None,
            child2: None,
            mark: BlockMark::default(),
            live_at_end: vec![],
            vars_at_start: Map::new(),
        }
    }

    pub fn push(&mut self, q: Quadr) {
        self.quadrs.push(q);
    }

    pub fn is_empty(&self) -> bool {
        self.quadrs.is_empty()
    }

    /// The block's terminating quadruple, if it has a branch/return/goto
    /// as its last instruction.
    pub fn terminator(&self) -> Option<&Quadr> {
        self.quadrs.last().filter(|q| {
            matches!(q.op, Op::Return | Op::Goto) || q.op.is_if()
        })
    }
}

/// Tags a function as user-defined or one of the fixed built-ins
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    UserDefined,
    PrintInt,
    PrintDouble,
    PrintString,
    ReadInt,
    ReadDouble,
    Error,
}

/// A function: its blocks, its variable arena, and its parameter count
/// (spec.md §3: "If a function has N parameters then its first N
/// variables are the parameters").
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Id,
    pub ret_type: Type,
    pub param_count: usize,
    pub kind: FuncKind,
    pub blocks: Vec<Block>,
    pub vars: Vec<VarData>,
}

impl Function {
    pub fn new(name: Id, ret_type: Type, kind: FuncKind) -> Self {
        Function { name, ret_type, param_count: 0, kind, blocks: vec![], vars: vec![] }
    }

    pub fn declare_var(&mut self, ty: Type, name: Option<Id>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarData::new(ty, name));
        id
    }

    pub fn var(&self, id: VarId) -> &VarData {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VarData {
        &mut self.vars[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id));
        id
    }
}

/// The whole compiled program: every function, in declaration order.
#[derive(Debug, Clone)]
pub struct Program {
    pub funcs: Vec<Function>,
}
