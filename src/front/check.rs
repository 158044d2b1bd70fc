//! A minimal semantic checker: resolves function signatures, type-checks
//! expressions and statements, and validates `return` types. This is
//! deliberately small (spec.md §1 puts full semantic checking out of scope
//! for the core) — its only job is to hand the IR builder a
//! [`CheckedProgram`] it can trust.

use std::collections::HashMap;

use super::ast::*;
use super::error::{SourceError, SourceWarning};

/// A `Program` that has passed semantic checking. The IR builder
/// ([`crate::middle::build`]) consumes this, not a raw [`Program`].
pub struct CheckedProgram {
    pub program: Program,
    pub warnings: Vec<SourceWarning>,
}

#[derive(Clone)]
struct Sig {
    ret: Type,
    params: Vec<Type>,
}

fn builtin_sigs() -> HashMap<String, Sig> {
    let mut m = HashMap::new();
    m.insert("printInt".into(), Sig { ret: Type::Void, params: vec![Type::Int] });
    m.insert("printDouble".into(), Sig { ret: Type::Void, params: vec![Type::Double] });
    m.insert("printString".into(), Sig { ret: Type::Void, params: vec![Type::Str] });
    m.insert("readInt".into(), Sig { ret: Type::Int, params: vec![] });
    m.insert("readDouble".into(), Sig { ret: Type::Double, params: vec![] });
    m.insert("error".into(), Sig { ret: Type::Void, params: vec![] });
    m
}

struct Checker<'a> {
    sigs: &'a HashMap<String, Sig>,
    scopes: Vec<HashMap<String, Type>>,
    errors: Vec<SourceError>,
    warnings: Vec<SourceWarning>,
    ret_type: Type,
    file: String,
}

impl<'a> Checker<'a> {
    fn error(&mut self, line: usize, msg: impl Into<String>) {
        self.errors.push(SourceError::new(self.file.clone(), line, msg));
    }

    fn warn(&mut self, line: usize, msg: impl Into<String>) {
        self.warnings.push(SourceWarning { file: self.file.clone(), line, message: msg.into() });
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, ty: Type) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), ty);
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        for scope in self.scopes.iter().rev() {
            if let Some(t) = scope.get(name) {
                return Some(t.clone());
            }
        }
        None
    }

    fn check_function(&mut self, f: &FunctionDef) {
        self.push_scope();
        for (name, ty) in &f.params {
            self.declare(name, ty.clone());
        }
        self.ret_type = f.ret_type.clone();
        self.check_block(&f.body, f.line);
        self.pop_scope();
    }

    fn check_block(&mut self, stmts: &[Stmt], _line: usize) {
        self.push_scope();
        for s in stmts {
            self.check_stmt(s);
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Decl { items, line } => {
                for (name, ty, init) in items {
                    if let Some(e) = init {
                        let et = self.check_expr(e);
                        if et != *ty && !(et == Type::Int && *ty == Type::Double) {
                            self.error(*line, format!(
                                "cannot initialize variable '{name}' of type {ty:?} with value of type {et:?}"
                            ));
                        }
                    }
                    self.declare(name, ty.clone());
                }
            }
            Stmt::Assign(lv, rhs, line) => {
                let rt = self.check_expr(rhs);
                let lt = self.check_lvalue(lv, *line);
                if let Some(lt) = lt {
                    if lt != rt && !(rt == Type::Int && lt == Type::Double) {
                        self.error(*line, format!("type mismatch in assignment: {lt:?} := {rt:?}"));
                    }
                }
            }
            Stmt::Incr(name, line) | Stmt::Decr(name, line) => {
                match self.lookup(name) {
                    Some(Type::Int) => {}
                    Some(other) => self.error(*line, format!("cannot increment/decrement a {other:?}")),
                    None => self.error(*line, format!("undeclared variable '{name}'")),
                }
            }
            Stmt::Return(value, line) => {
                let rt = value.as_ref().map(|e| self.check_expr(e)).unwrap_or(Type::Void);
                let expected = self.ret_type.clone();
                if rt != expected && !(rt == Type::Int && expected == Type::Double) {
                    self.error(*line, format!("return type mismatch: expected {expected:?}, found {rt:?}"));
                }
            }
            Stmt::If { cond, then_branch, else_branch, line } => {
                let ct = self.check_expr(cond);
                if ct != Type::Bool {
                    self.error(*line, "condition of 'if' must be boolean");
                }
                self.check_block(then_branch, *line);
                self.check_block(else_branch, *line);
            }
            Stmt::While { cond, body, line } => {
                let ct = self.check_expr(cond);
                if ct != Type::Bool {
                    self.error(*line, "condition of 'while' must be boolean");
                }
                self.check_block(body, *line);
            }
            Stmt::For { init, cond, step, body, line } => {
                self.push_scope();
                self.check_stmt(init);
                let ct = self.check_expr(cond);
                if ct != Type::Bool {
                    self.error(*line, "condition of 'for' must be boolean");
                }
                self.check_stmt(step);
                self.check_block(body, *line);
                self.pop_scope();
            }
            Stmt::ExprStmt(e, _line) => {
                self.check_expr(e);
            }
            Stmt::Block(stmts) => self.check_block(stmts, 0),
        }
    }

    fn check_lvalue(&mut self, lv: &Lvalue, line: usize) -> Option<Type> {
        match lv {
            Lvalue::Var(name) => {
                let t = self.lookup(name);
                if t.is_none() {
                    self.error(line, format!("undeclared variable '{name}'"));
                }
                t
            }
            Lvalue::Index(name, idx) => {
                let it = self.check_expr(idx);
                if it != Type::Int {
                    self.error(line, "array index must be an int");
                }
                if let Expr::IntLit(n) = idx {
                    if let Some(Type::Array(_, size)) = self.lookup(name) {
                        if *n < 0 || *n as usize >= size {
                            self.warn(line, format!(
                                "constant array index {n} out of range for array '{name}' of size {size}"
                            ));
                        }
                    }
                }
                match self.lookup(name) {
                    Some(Type::Array(elem, _)) => Some(*elem),
                    Some(other) => {
                        self.error(line, format!("cannot index into non-array type {other:?}"));
                        None
                    }
                    None => {
                        self.error(line, format!("undeclared variable '{name}'"));
                        None
                    }
                }
            }
        }
    }

    fn check_expr(&mut self, e: &Expr) -> Type {
        match e {
            Expr::IntLit(_) => Type::Int,
            Expr::DoubleLit(_) => Type::Double,
            Expr::BoolLit(_) => Type::Bool,
            Expr::StrLit(_) => Type::Str,
            Expr::Var(name) => self.lookup(name).unwrap_or_else(|| {
                self.error(0, format!("undeclared variable '{name}'"));
                Type::Int
            }),
            Expr::Index(base, idx) => {
                let it = self.check_expr(idx);
                if it != Type::Int {
                    self.error(0, "array index must be an int");
                }
                match self.check_expr(base) {
                    Type::Array(elem, _) => *elem,
                    other => {
                        self.error(0, format!("cannot index into non-array type {other:?}"));
                        Type::Int
                    }
                }
            }
            Expr::Unary(op, inner) => {
                let it = self.check_expr(inner);
                match op {
                    UnOp::Neg => it,
                    UnOp::Not => {
                        if it != Type::Bool {
                            self.error(0, "'!' requires a boolean operand");
                        }
                        Type::Bool
                    }
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lt = self.check_expr(lhs);
                let rt = self.check_expr(rhs);
                match op {
                    BOp::And | BOp::Or => Type::Bool,
                    BOp::Lt | BOp::Gt | BOp::Le | BOp::Ge | BOp::Eq | BOp::Ne => Type::Bool,
                    BOp::Add | BOp::Sub | BOp::Mul | BOp::Div | BOp::Mod => {
                        if lt == Type::Double || rt == Type::Double {
                            Type::Double
                        } else {
                            lt
                        }
                    }
                }
            }
            Expr::Call(name, args) => {
                let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();
                match self.sigs.get(name).cloned() {
                    Some(sig) => {
                        if sig.params.len() != arg_types.len() {
                            self.error(0, format!(
                                "function '{name}' expects {} argument(s), found {}",
                                sig.params.len(),
                                arg_types.len()
                            ));
                        }
                        sig.ret
                    }
                    None => {
                        self.error(0, format!("call to undeclared function '{name}'"));
                        Type::Int
                    }
                }
            }
        }
    }
}

pub fn check(program: &Program) -> Result<CheckedProgram, Vec<SourceError>> {
    let mut sigs = builtin_sigs();
    for f in &program.functions {
        sigs.insert(
            f.name.clone(),
            Sig { ret: f.ret_type.clone(), params: f.params.iter().map(|(_, t)| t.clone()).collect() },
        );
    }

    let mut checker = Checker {
        sigs: &sigs,
        scopes: vec![],
        errors: vec![],
        warnings: vec![],
        ret_type: Type::Void,
        file: "<input>".to_string(),
    };

    let has_main = program.functions.iter().any(|f| f.name == "main");
    if !has_main {
        checker.error(0, "no 'main' function defined");
    }

    for f in &program.functions {
        checker.check_function(f);
    }

    if checker.errors.is_empty() {
        Ok(CheckedProgram { program: program.clone(), warnings: checker.warnings })
    } else {
        Err(checker.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;

    #[test]
    fn accepts_valid_program() {
        let prog = parse("int main(){ printInt(2+3*4); return 0; }").unwrap();
        assert!(check(&prog).is_ok());
    }

    #[test]
    fn rejects_missing_main() {
        let prog = parse("int f(){ return 0; }").unwrap();
        assert!(check(&prog).is_err());
    }

    #[test]
    fn warns_on_constant_out_of_range_index() {
        let prog = parse("int main(){ int a[3]; a[5]=1; return 0; }").unwrap();
        let checked = check(&prog).unwrap();
        assert!(!checked.warnings.is_empty());
    }
}
