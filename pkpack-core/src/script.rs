//! pkscript: the line-oriented language of source units and `pack.spec`.
//!
//! Every non-blank line is one statement:
//!
//! ```text
//! # comment (shebang lines are comments too)
//! import app.mod            # binds `app`
//! import app.mod as m       # binds the leaf module
//! X = 'text' + "more"
//! N = 40 + 2
//! print(X, N, app.mod.Y)
//! ```
use crate::error::ScriptErrorKind;
use crate::module::{ModuleRef, Value};
use crate::Error;

/// What a unit needs from the runtime executing it
pub trait Host {
    /// Import a dotted name, including its parents, and return the module
    /// registered under exactly that name.
    fn import(&mut self, name: &str) -> Result<ModuleRef, Error>;

    /// Emit one line of `print` output, without the trailing newline.
    fn print(&mut self, line: &str) -> Result<(), Error>;
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Str(String),
    Int(i64),
    Ident(String),
    Dot,
    Plus,
    Minus,
    Comma,
    LParen,
    RParen,
    Eq,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Lit(Value),
    Path(Vec<String>),
    Add(Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
enum Stmt {
    Assign { name: String, expr: Expr },
    Import { module: String, alias: Option<String> },
    Print(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
struct Line {
    number: usize,
    stmt: Stmt,
}

/// A parsed unit, ready to run any number of times
#[derive(Clone, Debug)]
pub struct Script {
    file: String,
    lines: Vec<Line>,
}

fn syntax(msg: impl Into<String>) -> ScriptErrorKind {
    ScriptErrorKind::Syntax(msg.into())
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn tokenize(line: &str) -> Result<Vec<Token>, ScriptErrorKind> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' => break,
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some('\\') => s.push('\\'),
                            Some('\'') => s.push('\''),
                            Some('"') => s.push('"'),
                            Some(other) => {
                                return Err(syntax(format!("unknown escape '\\{}'", other)))
                            }
                            None => return Err(syntax("unterminated string")),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(syntax("unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let value = digits
                    .parse()
                    .map_err(|_| syntax(format!("integer out of range: {}", digits)))?;
                tokens.push(Token::Int(value));
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if !is_ident_char(d) {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            _ => {
                chars.next();
                tokens.push(match c {
                    '.' => Token::Dot,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '=' => Token::Eq,
                    other => return Err(syntax(format!("unexpected character '{}'", other))),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, want: Token) -> Result<(), ScriptErrorKind> {
        match self.next() {
            Some(ref got) if *got == want => Ok(()),
            Some(got) => Err(syntax(format!("expected {:?}, found {:?}", want, got))),
            None => Err(syntax(format!("expected {:?} at end of line", want))),
        }
    }

    fn ident(&mut self) -> Result<String, ScriptErrorKind> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(syntax(format!("expected a name, found {:?}", other))),
            None => Err(syntax("expected a name at end of line")),
        }
    }

    fn dotted(&mut self) -> Result<Vec<String>, ScriptErrorKind> {
        let mut parts = vec![self.ident()?];
        while self.peek() == Some(&Token::Dot) {
            self.next();
            parts.push(self.ident()?);
        }
        Ok(parts)
    }

    fn finish(&self) -> Result<(), ScriptErrorKind> {
        match self.peek() {
            None => Ok(()),
            Some(extra) => Err(syntax(format!("unexpected {:?}", extra))),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptErrorKind> {
        let head = (self.tokens.first().cloned(), self.tokens.get(1).cloned());
        let stmt = match (&head.0, &head.1) {
            (Some(Token::Ident(kw)), _) if kw == "import" => {
                self.next();
                let module = self.dotted()?.join(".");
                let alias = if self.peek() == Some(&Token::Ident("as".to_string())) {
                    self.next();
                    Some(self.ident()?)
                } else {
                    None
                };
                Stmt::Import { module, alias }
            }
            (Some(Token::Ident(kw)), Some(Token::LParen)) if kw == "print" => {
                self.pos += 2;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.expr()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.next();
                        args.push(self.expr()?);
                    }
                }
                self.expect(Token::RParen)?;
                Stmt::Print(args)
            }
            (Some(Token::Ident(_)), Some(Token::Eq)) => {
                let name = self.ident()?;
                self.next();
                Stmt::Assign {
                    name,
                    expr: self.expr()?,
                }
            }
            _ => return Err(syntax("expected an assignment, import or print")),
        };
        self.finish()?;
        Ok(stmt)
    }

    fn expr(&mut self) -> Result<Expr, ScriptErrorKind> {
        let mut lhs = self.term()?;
        while self.peek() == Some(&Token::Plus) {
            self.next();
            let rhs = self.term()?;
            lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ScriptErrorKind> {
        match self.peek().cloned() {
            Some(Token::Str(s)) => {
                self.next();
                Ok(Expr::Lit(Value::Str(s)))
            }
            Some(Token::Int(i)) => {
                self.next();
                Ok(Expr::Lit(Value::Int(i)))
            }
            Some(Token::Minus) => {
                self.next();
                match self.next() {
                    Some(Token::Int(i)) => Ok(Expr::Lit(Value::Int(-i))),
                    _ => Err(syntax("'-' must be followed by an integer")),
                }
            }
            Some(Token::LParen) => {
                self.next();
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => {
                    self.next();
                    Ok(Expr::Lit(Value::Bool(true)))
                }
                "False" => {
                    self.next();
                    Ok(Expr::Lit(Value::Bool(false)))
                }
                "None" => {
                    self.next();
                    Ok(Expr::Lit(Value::None))
                }
                _ => Ok(Expr::Path(self.dotted()?)),
            },
            Some(other) => Err(syntax(format!("unexpected {:?}", other))),
            None => Err(syntax("expected an expression")),
        }
    }
}

impl Script {
    /// Borrow the raw bytes of a unit as source text. Invalid UTF-8 is an
    /// error on the line it occurs in, never replaced.
    pub fn source_text<'a>(content: &'a [u8], file: &str) -> Result<&'a str, Error> {
        std::str::from_utf8(content).map_err(|err| {
            let valid = &content[..err.valid_up_to()];
            Error::Script {
                file: file.to_string(),
                line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
                kind: ScriptErrorKind::Encoding(err.to_string()),
            }
        })
    }

    /// Parse `code`; `file` names the unit in error messages.
    pub fn parse(code: &str, file: &str) -> Result<Script, Error> {
        let mut lines = Vec::new();
        for (idx, text) in code.lines().enumerate() {
            let number = idx + 1;
            let err = |kind| Error::Script {
                file: file.to_string(),
                line: number,
                kind,
            };

            let tokens = tokenize(text).map_err(err)?;
            if tokens.is_empty() {
                continue;
            }
            let stmt = Parser { tokens, pos: 0 }.statement().map_err(err)?;
            lines.push(Line { number, stmt });
        }
        Ok(Script {
            file: file.to_string(),
            lines,
        })
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Run every statement against `module`'s namespace
    pub fn exec(&self, module: &ModuleRef, host: &mut dyn Host) -> Result<(), Error> {
        for line in &self.lines {
            self.exec_line(line, module, host)?;
        }
        Ok(())
    }

    fn exec_line(&self, line: &Line, module: &ModuleRef, host: &mut dyn Host) -> Result<(), Error> {
        let wrap = |kind| Error::Script {
            file: self.file.clone(),
            line: line.number,
            kind,
        };

        match &line.stmt {
            Stmt::Assign { name, expr } => {
                let value = eval(expr, module).map_err(wrap)?;
                module.borrow_mut().set(name.as_str(), value);
            }
            Stmt::Import { module: name, alias } => {
                let leaf = host.import(name)?;
                let (bind, target) = match alias {
                    Some(alias) => (alias.clone(), leaf),
                    None => {
                        let top = name.split('.').next().unwrap_or(name.as_str());
                        (top.to_string(), host.import(top)?)
                    }
                };
                module.borrow_mut().set(bind, Value::Module(target));
            }
            Stmt::Print(args) => {
                let mut out = String::new();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(&eval(arg, module).map_err(wrap)?.to_string());
                }
                host.print(&out)?;
            }
        }
        Ok(())
    }
}

fn eval(expr: &Expr, scope: &ModuleRef) -> Result<Value, ScriptErrorKind> {
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Path(parts) => {
            let mut value = scope
                .borrow()
                .get(&parts[0])
                .cloned()
                .ok_or_else(|| ScriptErrorKind::UndefinedName(parts[0].clone()))?;
            for attr in &parts[1..] {
                value = match value {
                    Value::Module(module) => {
                        let found = module.borrow().get(attr).cloned();
                        match found {
                            Some(value) => value,
                            None => {
                                return Err(ScriptErrorKind::NoAttribute {
                                    module: module.borrow().name.clone(),
                                    name: attr.clone(),
                                })
                            }
                        }
                    }
                    other => {
                        return Err(ScriptErrorKind::Type(format!(
                            "'{}' value has no attribute '{}'",
                            other.type_name(),
                            attr
                        )))
                    }
                };
            }
            Ok(value)
        }
        Expr::Add(lhs, rhs) => match (eval(lhs, scope)?, eval(rhs, scope)?) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| ScriptErrorKind::Type("integer overflow".to_string())),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (a, b) => Err(ScriptErrorKind::Type(format!(
                "cannot add {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

/// Render `s` as a pkscript string literal
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
