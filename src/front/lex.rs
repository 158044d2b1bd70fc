//! The lexer.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
    /// 1-based source line the token starts on.
    pub line: usize,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("int-lit")]
    IntNum,
    #[display("double-lit")]
    DoubleNum,
    #[display("string-lit")]
    StrLit,

    #[display("int")]
    KwInt,
    #[display("double")]
    KwDouble,
    #[display("boolean")]
    KwBoolean,
    #[display("void")]
    KwVoid,
    #[display("string")]
    KwString,
    #[display("true")]
    KwTrue,
    #[display("false")]
    KwFalse,
    #[display("if")]
    KwIf,
    #[display("else")]
    KwElse,
    #[display("while")]
    KwWhile,
    #[display("for")]
    KwFor,
    #[display("return")]
    KwReturn,

    #[display(":=")]
    Assign,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
    #[display("&&")]
    AndAnd,
    #[display("||")]
    OrOr,
    #[display("!")]
    Not,
    #[display("++")]
    PlusPlus,
    #[display("--")]
    MinusMinus,

    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
}

pub struct LexError(pub usize, pub char);

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}", self.1, self.0)
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}", self.1, self.0)
    }
}

fn keyword_kind(text: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match text {
        "int" => KwInt,
        "double" => KwDouble,
        "boolean" => KwBoolean,
        "void" => KwVoid,
        "string" => KwString,
        "true" => KwTrue,
        "false" => KwFalse,
        "if" => KwIf,
        "else" => KwElse,
        "while" => KwWhile,
        "for" => KwFor,
        "return" => KwReturn,
        _ => return None,
    })
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: usize,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        use TokenKind::*;
        // Longer/more specific operator patterns must precede shorter
        // prefixes of themselves (`==` before `=`, etc.).
        let matchers = vec![
            (r"\A[A-Za-z_][A-Za-z0-9_]*", Id),
            (r"\A[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", DoubleNum),
            (r"\A[0-9]+", IntNum),
            (r#"\A"([^"\\]|\\.)*""#, StrLit),
            (r"\A==", Eq),
            (r"\A!=", Ne),
            (r"\A<=", Le),
            (r"\A>=", Ge),
            (r"\A<", Lt),
            (r"\A>", Gt),
            (r"\A\+\+", PlusPlus),
            (r"\A--", MinusMinus),
            (r"\A\+", Plus),
            (r"\A-", Minus),
            (r"\A\*", Mul),
            (r"\A/", Div),
            (r"\A%", Mod),
            (r"\A&&", AndAnd),
            (r"\A\|\|", OrOr),
            (r"\A!", Not),
            (r"\A=", Assign),
            (r"\A\(", LParen),
            (r"\A\)", RParen),
            (r"\A\{", LBrace),
            (r"\A\}", RBrace),
            (r"\A\[", LBracket),
            (r"\A\]", RBracket),
            (r"\A;", Semi),
            (r"\A,", Comma),
        ]
        .into_iter()
        .map(|(pat, kind)| (Regex::new(pat).unwrap(), kind))
        .collect();

        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://[^\n]*)|(?:/\*(?:[^*]|\*[^/])*\*/))*")
                .unwrap(),
            matchers,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos >= self.input.len()
    }

    // Skip comments and whitespace, tracking line numbers as we go.
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            let skipped = &self.input[self.pos..self.pos + m.end()];
            self.line += skipped.bytes().filter(|&b| b == b'\n').count();
            self.pos += m.end();
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let rest = &self.input[self.pos..];
        let mut best: Option<(usize, TokenKind)> = None;
        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                let len = m.end();
                if len > 0 && best.map_or(true, |(blen, _)| len > blen) {
                    best = Some((len, *kind));
                }
            }
        }
        match best {
            Some((len, mut kind)) => {
                let text = &rest[..len];
                if kind == TokenKind::Id {
                    if let Some(kw) = keyword_kind(text) {
                        kind = kw;
                    }
                }
                let line = self.line;
                self.pos += len;
                Ok(Some(Token { kind, text, line }))
            }
            None => {
                let ch = rest.chars().next().unwrap();
                Err(LexError(self.pos, ch))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = vec![];
        while let Some(tok) = lexer.next().unwrap() {
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(kinds("int x = 0;"), vec![KwInt, Id, Assign, IntNum, Semi]);
    }

    #[test]
    fn lexes_operators_longest_match() {
        use TokenKind::*;
        assert_eq!(kinds("i++ < 10"), vec![Id, PlusPlus, Lt, IntNum]);
        assert_eq!(kinds("a == b != c"), vec![Id, Eq, Id, Ne, Id]);
    }

    #[test]
    fn skips_line_and_block_comments() {
        use TokenKind::*;
        assert_eq!(kinds("x // comment\n= 1;"), vec![Id, Assign, IntNum, Semi]);
        assert_eq!(kinds("x /* c */ = 1;"), vec![Id, Assign, IntNum, Semi]);
    }

    #[test]
    fn reports_unexpected_character() {
        let mut lexer = Lexer::new("x @ y");
        assert!(lexer.next().unwrap().is_some());
        assert!(lexer.next().unwrap_err().1 == '@');
    }
}
