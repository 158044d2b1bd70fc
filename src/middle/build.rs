//! The IR builder: lowers a validated AST into quadruples plus a basic
//! block graph with correct successor edges (spec.md §4.1).

use std::collections::HashMap;

use crate::common::*;
use crate::front::ast::*;
use crate::front::check::CheckedProgram;
use crate::middle::ir::*;

/// Everything the builder needs to know about a call target, resolved
/// once up front so `gen_call` never has to re-derive it.
#[derive(Clone)]
struct FuncInfo {
    id: FuncId,
    kind: FuncKind,
    ret_type: Type,
}

/// Lowers a whole checked program: every user function, plus the fixed
/// set of built-ins the backend needs to recognize as call targets
/// (spec.md §3, `quadr_func_tag_t`).
pub fn lower(checked: &CheckedProgram) -> Program {
    let mut funcs = vec![];
    let mut table: HashMap<String, FuncInfo> = HashMap::new();

    let builtins: &[(&str, FuncKind, Type)] = &[
        ("printInt", FuncKind::PrintInt, Type::Void),
        ("printDouble", FuncKind::PrintDouble, Type::Void),
        ("printString", FuncKind::PrintString, Type::Void),
        ("readInt", FuncKind::ReadInt, Type::Int),
        ("readDouble", FuncKind::ReadDouble, Type::Double),
        ("error", FuncKind::Error, Type::Void),
    ];
    for (name, kind, ret) in builtins {
        let id = FuncId(funcs.len() as u32);
        table.insert((*name).to_string(), FuncInfo { id, kind: *kind, ret_type: ret.clone() });
        funcs.push(Function::new(Id::from(name.to_string()), ret.clone(), *kind));
    }
    for f in &checked.program.functions {
        let id = FuncId(funcs.len() as u32);
        table.insert(
            f.name.clone(),
            FuncInfo { id, kind: FuncKind::UserDefined, ret_type: f.ret_type.clone() },
        );
        funcs.push(Function::new(Id::from(f.name.clone()), f.ret_type.clone(), FuncKind::UserDefined));
    }

    for f in &checked.program.functions {
        let id = table[&f.name].id;
        let mut func = std::mem::replace(
            &mut funcs[id.0 as usize],
            Function::new(Id::from(String::new()), Type::Void, FuncKind::UserDefined),
        );
        lower_function(f, &table, &mut func);
        funcs[id.0 as usize] = func;
    }

    Program { funcs }
}

fn lower_function(f: &FunctionDef, table: &HashMap<String, FuncInfo>, func: &mut Function) {
    let entry = func.new_block();
    let mut b = Builder { func, table, scopes: vec![HashMap::new()], cur: entry };
    for (name, ty) in &f.params {
        let v = b.func.declare_var(ty.clone(), Some(Id::from(name.clone())));
        b.declare(name, v);
    }
    b.func.param_count = f.params.len();
    b.gen_stmts(&f.body);
    // Every function must end in a `return` for the block graph to be
    // well-formed; a fall-off-the-end `void` function gets an implicit one.
    if !matches!(b.func.block(b.cur).terminator().map(|q| q.op), Some(Op::Return)) {
        b.gen_quadr_return(None);
    }
}

struct Builder<'a> {
    func: &'a mut Function,
    table: &'a HashMap<String, FuncInfo>,
    scopes: Vec<HashMap<String, VarId>>,
    cur: BlockId,
}

impl<'a> Builder<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, v: VarId) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), v);
    }

    fn resolve(&self, name: &str) -> VarId {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return *v;
            }
        }
        panic!("internal error: undeclared variable '{name}' reached the IR builder");
    }

    fn emit(&mut self, op: Op, result: Operand, arg1: Operand, arg2: Operand) {
        self.func.block_mut(self.cur).push(Quadr::new(op, result, arg1, arg2));
    }

    fn fresh(&mut self, kind_ty: Type) -> VarId {
        self.func.declare_var(kind_ty, None)
    }

    fn operand_kind(&self, op: &Operand) -> VarKind {
        match op {
            Operand::Var(v) => self.func.var(*v).kind,
            Operand::Int(_) => VarKind::Int,
            Operand::Double(_) => VarKind::Double,
            _ => VarKind::Int,
        }
    }

    /// Splices in a fresh empty block and makes it current — "on finishing
    /// any control construct, the next block is spliced in" (spec.md §4.1).
    fn splice_new_block(&mut self) -> BlockId {
        let b = self.func.new_block();
        self.cur = b;
        b
    }

    fn mark_referenced(&mut self, b: BlockId) {
        self.func.block_mut(b).mark.referenced = true;
    }

    /// Unconditional jump to `to`, terminating the current block.
    fn gen_goto(&mut self, to: BlockId) {
        self.mark_referenced(to);
        self.emit(Op::Goto, Operand::Label(to), Operand::None, Operand::None);
    }

    fn gen_quadr_return(&mut self, value: Option<Operand>) {
        let arg1 = value.unwrap_or(Operand::None);
        self.emit(Op::Return, Operand::None, arg1, Operand::None);
    }

    // ---- statements ----

    fn gen_stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.gen_stmt(s);
        }
    }

    fn gen_stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Decl { items, .. } => {
                for (name, ty, init) in items {
                    let v = self.fresh(ty.clone());
                    self.declare(name, v);
                    if let Some(e) = init {
                        self.gen_assign(v, e);
                    }
                }
            }
            Stmt::Assign(lv, rhs, _line) => match lv {
                Lvalue::Var(name) => {
                    let v = self.resolve(name);
                    self.gen_assign(v, rhs);
                }
                Lvalue::Index(name, idx) => {
                    let arr = self.resolve(name);
                    let elem_ty = match &self.func.var(arr).source_type {
                        Type::Array(t, _) => (**t).clone(),
                        other => other.clone(),
                    };
                    let idx_op = self.gen_expr(idx);
                    let value_op = self.gen_expr_typed(rhs, &elem_ty);
                    let ptr = self.fresh(Type::Int); // ptr category; element type tracked by arr
                    self.emit(Op::GetAddr, Operand::Var(ptr), Operand::Var(arr), Operand::None);
                    self.func.var_mut(ptr).kind = VarKind::Ptr;
                    self.emit(Op::WritePtr, Operand::Var(ptr), idx_op, value_op);
                }
            },
            Stmt::Incr(name, _) => {
                let v = self.resolve(name);
                self.emit(Op::Add, Operand::Var(v), Operand::Var(v), Operand::Int(1));
            }
            Stmt::Decr(name, _) => {
                let v = self.resolve(name);
                self.emit(Op::Sub, Operand::Var(v), Operand::Var(v), Operand::Int(1));
            }
            Stmt::Return(value, _) => {
                let op = value.as_ref().map(|e| self.gen_expr(e));
                self.gen_quadr_return(op);
                self.splice_new_block();
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                let else_block = self.func.new_block();
                let join_block = self.func.new_block();
                self.gen_bool_expr(cond, else_block, false);
                self.push_scope();
                self.gen_stmts(then_branch);
                self.pop_scope();
                self.gen_goto(join_block);
                self.cur = else_block;
                self.push_scope();
                self.gen_stmts(else_branch);
                self.pop_scope();
                self.gen_goto(join_block);
                self.cur = join_block;
            }
            Stmt::While { cond, body, .. } => {
                let head = self.func.new_block();
                let body_block = self.func.new_block();
                let after = self.func.new_block();
                self.gen_goto(head);
                self.cur = head;
                self.gen_bool_expr(cond, body_block, true);
                self.gen_goto(after);
                self.cur = body_block;
                self.push_scope();
                self.gen_stmts(body);
                self.pop_scope();
                self.gen_goto(head);
                self.cur = after;
            }
            Stmt::For { init, cond, step, body, .. } => {
                self.push_scope();
                self.gen_stmt(init);
                let head = self.func.new_block();
                let body_block = self.func.new_block();
                let after = self.func.new_block();
                self.gen_goto(head);
                self.cur = head;
                self.gen_bool_expr(cond, body_block, true);
                self.gen_goto(after);
                self.cur = body_block;
                self.push_scope();
                self.gen_stmts(body);
                self.pop_scope();
                self.gen_stmt(step);
                self.gen_goto(head);
                self.cur = after;
                self.pop_scope();
            }
            Stmt::ExprStmt(e, _) => {
                self.gen_expr(e);
            }
            Stmt::Block(stmts) => {
                self.push_scope();
                self.gen_stmts(stmts);
                self.pop_scope();
            }
        }
    }

    fn gen_assign(&mut self, dst: VarId, expr: &Expr) {
        let elem_ty = self.func.var(dst).source_type.clone();
        let op = self.gen_expr_typed(expr, &elem_ty);
        if op == Operand::Var(dst) {
            return;
        }
        self.emit(Op::Copy, Operand::Var(dst), op, Operand::None);
    }

    // ---- expressions ----

    /// Like [`Builder::gen_expr`], but widens an `int` result to `double`
    /// when `target` is `double` (implicit int-to-double conversion at
    /// assignment/initialization/argument sites).
    fn gen_expr_typed(&mut self, e: &Expr, target: &Type) -> Operand {
        let op = self.gen_expr(e);
        if *target == Type::Double && self.operand_kind(&op) == VarKind::Int {
            return self.widen_to_double(op);
        }
        op
    }

    fn widen_to_double(&mut self, op: Operand) -> Operand {
        match op {
            Operand::Int(v) => Operand::Double(v as f64),
            _ => {
                let tmp = self.fresh(Type::Double);
                self.emit(Op::Copy, Operand::Var(tmp), op, Operand::None);
                Operand::Var(tmp)
            }
        }
    }

    fn gen_expr(&mut self, e: &Expr) -> Operand {
        match e {
            Expr::IntLit(v) => Operand::Int(*v),
            Expr::DoubleLit(v) => Operand::Double(*v),
            Expr::BoolLit(v) => Operand::Int(if *v { 1 } else { 0 }),
            Expr::StrLit(_) => panic!("internal error: string literal used outside printString()"),
            Expr::Var(name) => Operand::Var(self.resolve(name)),
            Expr::Index(base, idx) => {
                let name = match base.as_ref() {
                    Expr::Var(n) => n.clone(),
                    _ => panic!("internal error: array base must be a simple variable"),
                };
                let arr = self.resolve(&name);
                let idx_op = self.gen_expr(idx);
                let elem_ty = match &self.func.var(arr).source_type {
                    Type::Array(t, _) => (**t).clone(),
                    other => other.clone(),
                };
                let ptr = self.fresh(Type::Int);
                self.emit(Op::GetAddr, Operand::Var(ptr), Operand::Var(arr), Operand::None);
                self.func.var_mut(ptr).kind = VarKind::Ptr;
                let result = self.fresh(elem_ty);
                self.emit(Op::ReadPtr, Operand::Var(result), Operand::Var(ptr), idx_op);
                Operand::Var(result)
            }
            Expr::Unary(UnOp::Neg, inner) => {
                let v = self.gen_expr(inner);
                let zero = match self.operand_kind(&v) {
                    VarKind::Double => Operand::Double(0.0),
                    _ => Operand::Int(0),
                };
                let ty = match self.operand_kind(&v) {
                    VarKind::Double => Type::Double,
                    _ => Type::Int,
                };
                let result = self.fresh(ty);
                self.emit(Op::Sub, Operand::Var(result), zero, v);
                Operand::Var(result)
            }
            Expr::Unary(UnOp::Not, inner) => {
                // spec.md §4.1: "logical NOT is lowered to 1 - x".
                let v = self.gen_expr(inner);
                let result = self.fresh(Type::Bool);
                self.emit(Op::Sub, Operand::Var(result), Operand::Int(1), v);
                Operand::Var(result)
            }
            Expr::Binary(BOp::And, ..) | Expr::Binary(BOp::Or, ..) | Expr::Binary(
                BOp::Lt | BOp::Gt | BOp::Le | BOp::Ge | BOp::Eq | BOp::Ne,
                ..,
            ) => self.gen_bool_value(e),
            Expr::Binary(op, lhs, rhs) => {
                let l = self.gen_expr(lhs);
                let r = self.gen_expr(rhs);
                let is_double = self.operand_kind(&l) == VarKind::Double
                    || self.operand_kind(&r) == VarKind::Double;
                let (l, r) = if is_double {
                    (self.widen_to_double(l), self.widen_to_double(r))
                } else {
                    (l, r)
                };
                let ty = if is_double { Type::Double } else { Type::Int };
                let result = self.fresh(ty);
                self.emit(Op::from_bop(*op), Operand::Var(result), l, r);
                Operand::Var(result)
            }
            Expr::Call(name, args) => self.gen_call(name, args),
        }
    }

    /// Materializes a composite boolean expression (relational, `&&`,
    /// `||`) as a 0/1-valued variable via short-circuit jumps to two
    /// basic blocks (spec.md §4.1).
    fn gen_bool_value(&mut self, e: &Expr) -> Operand {
        let result = self.fresh(Type::Bool);
        let true_block = self.func.new_block();
        let join_block = self.func.new_block();
        self.gen_bool_expr(e, true_block, true);
        self.emit(Op::Copy, Operand::Var(result), Operand::Int(0), Operand::None);
        self.gen_goto(join_block);
        self.cur = true_block;
        self.emit(Op::Copy, Operand::Var(result), Operand::Int(1), Operand::None);
        self.gen_goto(join_block);
        self.cur = join_block;
        Operand::Var(result)
    }

    /// Lowers a boolean expression used as a branch condition: arranges
    /// for `target` to be reached iff `e == jump_if_true`, otherwise
    /// control falls through to a freshly spliced block (spec.md §4.1).
    fn gen_bool_expr(&mut self, e: &Expr, target: BlockId, jump_if_true: bool) {
        match e {
            Expr::BoolLit(v) => {
                if *v == jump_if_true {
                    self.gen_goto(target);
                    self.splice_new_block();
                }
            }
            Expr::Unary(UnOp::Not, inner) => {
                self.gen_bool_expr(inner, target, !jump_if_true);
            }
            Expr::Binary(BOp::And, lhs, rhs) => {
                if jump_if_true {
                    // Needs a merge: (a false) and (a true, b false) both
                    // fall through to the same point.
                    let mid = self.func.new_block();
                    self.gen_bool_expr(lhs, mid, true);
                    let merge = self.cur;
                    self.mark_referenced(mid);
                    self.cur = mid;
                    self.gen_bool_expr(rhs, target, true);
                    self.gen_goto(merge);
                    self.cur = merge;
                } else {
                    // "AND jumps on first false" — no merge needed.
                    self.gen_bool_expr(lhs, target, false);
                    self.gen_bool_expr(rhs, target, false);
                }
            }
            Expr::Binary(BOp::Or, lhs, rhs) => {
                if jump_if_true {
                    // "OR jumps on first true" — no merge needed.
                    self.gen_bool_expr(lhs, target, true);
                    self.gen_bool_expr(rhs, target, true);
                } else {
                    let mid = self.func.new_block();
                    self.gen_bool_expr(lhs, mid, false);
                    let merge = self.cur;
                    self.mark_referenced(mid);
                    self.cur = mid;
                    self.gen_bool_expr(rhs, target, false);
                    self.gen_goto(merge);
                    self.cur = merge;
                }
            }
            Expr::Binary(
                rel @ (BOp::Lt | BOp::Gt | BOp::Le | BOp::Ge | BOp::Eq | BOp::Ne),
                lhs,
                rhs,
            ) => {
                let l = self.gen_expr(lhs);
                let r = self.gen_expr(rhs);
                let op = rel_to_if_op(*rel, jump_if_true);
                self.mark_referenced(target);
                self.emit(op, Operand::Label(target), l, r);
                self.splice_new_block();
            }
            other => {
                // A plain value used as a condition: true iff non-zero.
                let v = self.gen_expr(other);
                let op = if jump_if_true { Op::IfNe } else { Op::IfEq };
                self.mark_referenced(target);
                self.emit(op, Operand::Label(target), v, Operand::Int(0));
                self.splice_new_block();
            }
        }
    }

    fn gen_call(&mut self, name: &str, args: &[Expr]) -> Operand {
        let info = self
            .table
            .get(name)
            .unwrap_or_else(|| panic!("internal error: call to undeclared function '{name}'"))
            .clone();

        if info.kind == FuncKind::PrintString {
            let s = match &args[0] {
                Expr::StrLit(s) => s.clone(),
                _ => panic!("internal error: printString() requires a string literal"),
            };
            self.emit(Op::Param, Operand::None, Operand::None, Operand::None);
            self.func.block_mut(self.cur).quadrs.last_mut().unwrap().str_arg = Some(Id::from(s));
            self.emit(Op::Call, Operand::None, Operand::Func(info.id), Operand::None);
            return Operand::None;
        }

        let mut arg_ops = vec![];
        for a in args {
            arg_ops.push(self.gen_expr(a));
        }
        for op in arg_ops {
            self.emit(Op::Param, Operand::None, op, Operand::None);
        }
        if info.ret_type == Type::Void {
            self.emit(Op::Call, Operand::None, Operand::Func(info.id), Operand::None);
            Operand::None
        } else {
            let result = self.fresh(info.ret_type);
            self.emit(Op::Call, Operand::Var(result), Operand::Func(info.id), Operand::None);
            Operand::Var(result)
        }
    }
}

fn rel_to_if_op(rel: BOp, jump_if_true: bool) -> Op {
    let direct = match rel {
        BOp::Lt => Op::IfLt,
        BOp::Gt => Op::IfGt,
        BOp::Le => Op::IfLe,
        BOp::Ge => Op::IfGe,
        BOp::Eq => Op::IfEq,
        BOp::Ne => Op::IfNe,
        _ => unreachable!(),
    };
    if jump_if_true {
        direct
    } else {
        negate_if_op(direct)
    }
}

fn negate_if_op(op: Op) -> Op {
    match op {
        Op::IfLt => Op::IfGe,
        Op::IfGt => Op::IfLe,
        Op::IfLe => Op::IfGt,
        Op::IfGe => Op::IfLt,
        Op::IfEq => Op::IfNe,
        Op::IfNe => Op::IfEq,
        other => other,
    }
}
