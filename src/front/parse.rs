//! The parser.
//!
//! Javalette's grammar is small enough for a hand-written recursive-descent
//! parser over the full token stream: tokens are collected up front rather
//! than lexed incrementally, giving the parser simple lookahead.

use std::fmt::Debug;

use derive_more::derive::Display;

use super::ast::*;
use super::lex::*;

#[derive(Display)]
#[display("Parse error: {}", self.0)]
pub struct ParseError(pub crate::front::error::SourceError);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        ParseError(crate::front::error::SourceError::new("<input>", line, message))
    }
}

struct Parser<'src> {
    toks: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.toks.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn line(&self) -> usize {
        self.peek().map(|t| t.line).unwrap_or(usize::MAX)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let t = self.toks.get(self.pos).copied();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.advance() {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => Err(ParseError::new(
                t.line,
                format!("expected {kind}, found {}", t.kind),
            )),
            None => Err(ParseError::new(self.line(), format!("expected {kind}, found end of input"))),
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_id(&mut self) -> Result<String, ParseError> {
        let t = self.expect(TokenKind::Id)?;
        Ok(t.text.to_string())
    }

    fn is_type_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::KwInt)
                | Some(TokenKind::KwDouble)
                | Some(TokenKind::KwBoolean)
                | Some(TokenKind::KwVoid)
                | Some(TokenKind::KwString)
        )
    }

    fn parse_base_type(&mut self) -> Result<Type, ParseError> {
        let t = self.advance().ok_or_else(|| ParseError::new(self.line(), "expected a type"))?;
        Ok(match t.kind {
            TokenKind::KwInt => Type::Int,
            TokenKind::KwDouble => Type::Double,
            TokenKind::KwBoolean => Type::Bool,
            TokenKind::KwVoid => Type::Void,
            TokenKind::KwString => Type::Str,
            other => return Err(ParseError::new(t.line, format!("expected a type, found {other}"))),
        })
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut functions = vec![];
        while self.peek().is_some() {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    fn parse_function(&mut self) -> Result<FunctionDef, ParseError> {
        let line = self.line();
        let ret_type = self.parse_base_type()?;
        let name = self.expect_id()?;
        self.expect(TokenKind::LParen)?;
        let mut params = vec![];
        if self.peek_kind() != Some(TokenKind::RParen) {
            loop {
                let ty = self.parse_base_type()?;
                let pname = self.expect_id()?;
                params.push((pname, ty));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDef { name, ret_type, params, body, line })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while self.peek_kind() != Some(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    /// Parses a single statement, or the body of a braced block as a single
    /// `Stmt::Block`, for use as the (possibly brace-less) body of `if`,
    /// `while`, and `for`.
    fn parse_stmt_or_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.peek_kind() == Some(TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            Some(TokenKind::KwReturn) => {
                self.advance();
                let value = if self.peek_kind() == Some(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return(value, line))
            }
            Some(TokenKind::KwIf) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = self.parse_stmt_or_block()?;
                let else_branch = if self.eat(TokenKind::KwElse) {
                    self.parse_stmt_or_block()?
                } else {
                    vec![]
                };
                Ok(Stmt::If { cond, then_branch, else_branch, line })
            }
            Some(TokenKind::KwWhile) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.parse_stmt_or_block()?;
                Ok(Stmt::While { cond, body, line })
            }
            Some(TokenKind::KwFor) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let init = Box::new(self.parse_decl_or_assign_stmt()?);
                self.expect(TokenKind::Semi)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                let step = Box::new(self.parse_decl_or_assign_stmt_no_semi()?);
                self.expect(TokenKind::RParen)?;
                let body = self.parse_stmt_or_block()?;
                Ok(Stmt::For { init, cond, step, body, line })
            }
            _ if self.is_type_start() => {
                let stmt = self.parse_decl_stmt()?;
                self.expect(TokenKind::Semi)?;
                Ok(stmt)
            }
            _ => {
                let stmt = self.parse_decl_or_assign_stmt()?;
                self.expect(TokenKind::Semi)?;
                Ok(stmt)
            }
        }
    }

    fn parse_decl_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let base = self.parse_base_type()?;
        let mut items = vec![];
        loop {
            let name = self.expect_id()?;
            let ty = if self.eat(TokenKind::LBracket) {
                let size_tok = self.expect(TokenKind::IntNum)?;
                let size: usize = size_tok.text.parse().map_err(|_| {
                    ParseError::new(size_tok.line, "invalid array size")
                })?;
                self.expect(TokenKind::RBracket)?;
                Type::Array(Box::new(base.clone()), size)
            } else {
                base.clone()
            };
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            items.push((name, ty, init));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::Decl { items, line })
    }

    /// Parses either a declaration or an assignment/increment/expression
    /// statement, without consuming the trailing `;` — used for the `for`
    /// loop's init and step clauses.
    fn parse_decl_or_assign_stmt_no_semi(&mut self) -> Result<Stmt, ParseError> {
        if self.is_type_start() {
            self.parse_decl_stmt()
        } else {
            self.parse_simple_stmt()
        }
    }

    fn parse_decl_or_assign_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.parse_decl_or_assign_stmt_no_semi()
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let expr = self.parse_lvalue_or_call()?;
        match expr {
            LvalueOrExpr::Lvalue(lv) => {
                if self.eat(TokenKind::PlusPlus) {
                    let name = match lv {
                        Lvalue::Var(n) => n,
                        Lvalue::Index(..) => {
                            return Err(ParseError::new(line, "cannot increment an array element"))
                        }
                    };
                    Ok(Stmt::Incr(name, line))
                } else if self.eat(TokenKind::MinusMinus) {
                    let name = match lv {
                        Lvalue::Var(n) => n,
                        Lvalue::Index(..) => {
                            return Err(ParseError::new(line, "cannot decrement an array element"))
                        }
                    };
                    Ok(Stmt::Decr(name, line))
                } else {
                    self.expect(TokenKind::Assign)?;
                    let rhs = self.parse_expr()?;
                    Ok(Stmt::Assign(lv, rhs, line))
                }
            }
            LvalueOrExpr::Expr(e) => Ok(Stmt::ExprStmt(e, line)),
        }
    }

    fn parse_lvalue_or_call(&mut self) -> Result<LvalueOrExpr, ParseError> {
        let line = self.line();
        let name = self.expect_id()?;
        if self.eat(TokenKind::LParen) {
            let args = self.parse_call_args()?;
            let mut e = Expr::Call(name, args);
            e = self.parse_postfix_from(e)?;
            return Ok(LvalueOrExpr::Expr(e));
        }
        if self.eat(TokenKind::LBracket) {
            let idx = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            return Ok(LvalueOrExpr::Lvalue(Lvalue::Index(name, idx)));
        }
        let _ = line;
        Ok(LvalueOrExpr::Lvalue(Lvalue::Var(name)))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = vec![];
        if self.peek_kind() != Some(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_postfix_from(&mut self, mut e: Expr) -> Result<Expr, ParseError> {
        while self.eat(TokenKind::LBracket) {
            let idx = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            e = Expr::Index(Box::new(e), Box::new(idx));
        }
        Ok(e)
    }

    // Expression grammar, precedence climbing, lowest to highest:
    //   or  ::=  and (|| and)*
    //   and ::=  rel (&& rel)*
    //   rel ::=  add ((< | > | <= | >= | == | !=) add)?
    //   add ::=  mul ((+ | -) mul)*
    //   mul ::=  unary ((* | / | %) unary)*
    //   unary ::= (- | !) unary | postfix
    //   postfix ::= atom ([ expr ])*
    //   atom ::= literal | id | id ( args ) | id [ expr ] | ( expr )

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_rel()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.parse_rel()?;
            lhs = Expr::Binary(BOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_add()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Lt) => BOp::Lt,
            Some(TokenKind::Gt) => BOp::Gt,
            Some(TokenKind::Le) => BOp::Le,
            Some(TokenKind::Ge) => BOp::Ge,
            Some(TokenKind::Eq) => BOp::Eq,
            Some(TokenKind::Ne) => BOp::Ne,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BOp::Add,
                Some(TokenKind::Minus) => BOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BOp::Mul,
                Some(TokenKind::Div) => BOp::Div,
                Some(TokenKind::Mod) => BOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.advance();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.advance();
                self.parse_unary()
            }
            Some(TokenKind::Not) => {
                self.advance();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_atom()?;
        e = self.parse_postfix_from(e)?;
        Ok(e)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let t = self
            .advance()
            .ok_or_else(|| ParseError::new(self.line(), "expected an expression"))?;
        match t.kind {
            TokenKind::IntNum => Ok(Expr::IntLit(t.text.parse().map_err(|_| {
                ParseError::new(t.line, format!("invalid integer literal {:?}", t.text))
            })?)),
            TokenKind::DoubleNum => Ok(Expr::DoubleLit(t.text.parse().map_err(|_| {
                ParseError::new(t.line, format!("invalid double literal {:?}", t.text))
            })?)),
            TokenKind::KwTrue => Ok(Expr::BoolLit(true)),
            TokenKind::KwFalse => Ok(Expr::BoolLit(false)),
            TokenKind::StrLit => {
                let inner = &t.text[1..t.text.len() - 1];
                Ok(Expr::StrLit(unescape(inner)))
            }
            TokenKind::Id => {
                if self.eat(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call(t.text.to_string(), args))
                } else {
                    Ok(Expr::Var(t.text.to_string()))
                }
            }
            TokenKind::LParen => {
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            other => Err(ParseError::new(t.line, format!("unexpected token {other} in expression"))),
        }
    }
}

enum LvalueOrExpr {
    Lvalue(Lvalue),
    Expr(Expr),
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut toks = vec![];
    loop {
        match lexer.next() {
            Ok(Some(t)) => toks.push(t),
            Ok(None) => break,
            Err(e) => return Err(ParseError::new(e.0, e.to_string())),
        }
    }
    let mut parser = Parser { toks, pos: 0 };
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_main() {
        let src = "int main(){ printInt(2+3*4); return 0; }";
        let prog = parse(src).unwrap();
        assert_eq!(prog.functions.len(), 1);
        assert_eq!(prog.functions[0].name, "main");
    }

    #[test]
    fn parses_array_decl_and_index() {
        let src = "int main(){ double a[3]; a[0]=1.5; return 0; }";
        let prog = parse(src).unwrap();
        let body = &prog.functions[0].body;
        assert!(matches!(body[0], Stmt::Decl { .. }));
        assert!(matches!(body[1], Stmt::Assign(Lvalue::Index(..), _, _)));
    }

    #[test]
    fn parses_for_and_while() {
        let src = "int main(){ int i=0; while(i<3){ i++; } for(int j=0;j<3;j++) j=j; return 0; }";
        assert!(parse(src).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("int main(( {} ").is_err());
    }
}
