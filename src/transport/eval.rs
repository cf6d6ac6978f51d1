//! transport::eval
//!
//! A small SOQL evaluator for the mock transport.
//!
//! Understands the statements this crate generates and a little more:
//! `SELECT COUNT() | FIELDS(ALL) | f1, f2 FROM T [WHERE expr]
//! [ORDER BY f [ASC|DESC]] [LIMIT n] [OFFSET n]`, where `expr` combines
//! `=`, `!=`, `<`, `<=`, `>`, `>=`, `[NOT] IN (...)`, `LIKE` with `AND`, `OR`,
//! `NOT` and parentheses. String comparison is case-insensitive, as remote.

use std::cmp::Ordering;

use serde_json::Value;

use super::traits::Row;

/// A parsed SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub select: Select,
    pub from: String,
    pub filter: Option<Expr>,
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Select {
    Count,
    AllFields,
    Fields(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp { field: String, op: Op, value: Lit },
    In { field: String, values: Vec<Lit>, negated: bool },
    Like { field: String, pattern: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lit {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Str(String),
    Num(f64),
    Sym(&'static str),
}

fn lex(input: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err("unterminated string literal".into()),
                    Some('\\') => {
                        let escaped = chars.get(i + 1).ok_or("dangling escape")?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => *other,
                        });
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(other) => {
                        text.push(*other);
                        i += 1;
                    }
                }
            }
            tokens.push(Tok::Str(text));
        } else if "(),".contains(c) {
            tokens.push(Tok::Sym(match c {
                '(' => "(",
                ')' => ")",
                _ => ",",
            }));
            i += 1;
        } else if "=!<>".contains(c) {
            let next = chars.get(i + 1).copied();
            let (sym, width) = match (c, next) {
                ('!', Some('=')) => ("!=", 2),
                ('<', Some('>')) => ("!=", 2),
                ('<', Some('=')) => ("<=", 2),
                ('>', Some('=')) => (">=", 2),
                ('<', _) => ("<", 1),
                ('>', _) => (">", 1),
                ('=', _) => ("=", 1),
                _ => return Err(format!("unexpected character '{}'", c)),
            };
            tokens.push(Tok::Sym(sym));
            i += width;
        } else if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || "_-.:".contains(chars[i]))
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.parse::<f64>() {
                Ok(n) => tokens.push(Tok::Num(n)),
                Err(_) => tokens.push(Tok::Word(word)),
            }
        } else {
            return Err(format!("unexpected character '{}'", c));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), String> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {} near {:?}", keyword, self.peek()))
        }
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), String> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(format!("expected '{}' near {:?}", sym, self.peek()))
        }
    }

    fn word(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Tok::Word(w)) => Ok(w),
            other => Err(format!("expected identifier, found {:?}", other)),
        }
    }

    fn count(&mut self) -> Result<usize, String> {
        match self.next() {
            Some(Tok::Num(n)) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
            other => Err(format!("expected a count, found {:?}", other)),
        }
    }

    fn statement(&mut self) -> Result<Statement, String> {
        self.expect_keyword("SELECT")?;
        let select = if self.at_keyword("COUNT") {
            self.pos += 1;
            self.expect_sym("(")?;
            self.expect_sym(")")?;
            Select::Count
        } else if self.at_keyword("FIELDS") {
            self.pos += 1;
            self.expect_sym("(")?;
            self.expect_keyword("ALL")?;
            self.expect_sym(")")?;
            Select::AllFields
        } else {
            let mut fields = vec![self.word()?];
            while self.eat_sym(",") {
                fields.push(self.word()?);
            }
            Select::Fields(fields)
        };

        self.expect_keyword("FROM")?;
        let from = self.word()?;

        let filter = if self.eat_keyword("WHERE") {
            Some(self.or_expr()?)
        } else {
            None
        };

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let field = self.word()?;
            let descending = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            Some((field, descending))
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.count()?)
        } else {
            None
        };
        let offset = if self.eat_keyword("OFFSET") {
            self.count()?
        } else {
            0
        };

        if let Some(tok) = self.peek() {
            return Err(format!("unexpected token {:?}", tok));
        }

        Ok(Statement {
            select,
            from,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        while self.eat_keyword("AND") {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat_sym("(") {
            let inner = self.or_expr()?;
            self.expect_sym(")")?;
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let field = self.word()?;

        if self.eat_keyword("LIKE") {
            return match self.next() {
                Some(Tok::Str(pattern)) => Ok(Expr::Like { field, pattern }),
                other => Err(format!("LIKE expects a string, found {:?}", other)),
            };
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect_sym("(")?;
            let mut values = vec![self.literal()?];
            while self.eat_sym(",") {
                values.push(self.literal()?);
            }
            self.expect_sym(")")?;
            return Ok(Expr::In {
                field,
                values,
                negated,
            });
        }
        if negated {
            return Err("expected IN after NOT".into());
        }

        let op = match self.next() {
            Some(Tok::Sym("=")) => Op::Eq,
            Some(Tok::Sym("!=")) => Op::Ne,
            Some(Tok::Sym("<")) => Op::Lt,
            Some(Tok::Sym("<=")) => Op::Le,
            Some(Tok::Sym(">")) => Op::Gt,
            Some(Tok::Sym(">=")) => Op::Ge,
            other => return Err(format!("expected operator after {}, found {:?}", field, other)),
        };
        let value = self.literal()?;
        Ok(Expr::Cmp { field, op, value })
    }

    fn literal(&mut self) -> Result<Lit, String> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Lit::Str(s)),
            Some(Tok::Num(n)) => Ok(Lit::Num(n)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(Lit::Bool(true)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(Lit::Bool(false)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Lit::Null),
            other => Err(format!("expected a value, found {:?}", other)),
        }
    }
}

/// Parse a SOQL statement.
pub(crate) fn parse(soql: &str) -> Result<Statement, String> {
    let mut parser = Parser {
        tokens: lex(soql)?,
        pos: 0,
    };
    parser.statement()
}

/// Case-insensitive field lookup.
pub(crate) fn lookup<'a>(row: &'a Row, field: &str) -> Option<(&'a String, &'a Value)> {
    row.get_key_value(field)
        .or_else(|| row.iter().find(|(k, _)| k.eq_ignore_ascii_case(field)))
}

fn value_of<'a>(row: &'a Row, field: &str) -> &'a Value {
    lookup(row, field).map(|(_, v)| v).unwrap_or(&Value::Null)
}

/// Compare a stored value with a literal. `None` means incomparable.
fn compare(value: &Value, lit: &Lit) -> Option<Ordering> {
    match (value, lit) {
        (Value::Null, Lit::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Lit::Null) => None,
        (Value::Bool(a), Lit::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Lit::Str(s)) => Some(a.to_string().cmp(&s.to_lowercase())),
        (Value::Number(a), Lit::Num(b)) => a.as_f64()?.partial_cmp(b),
        (Value::Number(a), Lit::Str(s)) => a.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Value::String(a), Lit::Num(b)) => a.parse::<f64>().ok()?.partial_cmp(b),
        (Value::String(a), Lit::Str(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        (Value::String(a), Lit::Bool(b)) => Some(a.to_lowercase().cmp(&b.to_string())),
        _ => None,
    }
}

/// SQL LIKE with `%` and `_`, case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matches[j] is whether text[..i] matches pattern[..j]
    let mut matches = vec![false; pattern.len() + 1];
    matches[0] = true;
    for j in 1..=pattern.len() {
        matches[j] = matches[j - 1] && pattern[j - 1] == '%';
    }
    for c in &text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matches[j],
                '_' => matches[j - 1],
                p => matches[j - 1] && p == *c,
            };
        }
        matches = next;
    }
    matches[pattern.len()]
}

impl Expr {
    /// Evaluate against one row.
    pub(crate) fn matches(&self, row: &Row) -> bool {
        match self {
            Expr::And(a, b) => a.matches(row) && b.matches(row),
            Expr::Or(a, b) => a.matches(row) || b.matches(row),
            Expr::Not(inner) => !inner.matches(row),
            Expr::Cmp { field, op, value } => {
                let ordering = compare(value_of(row, field), value);
                match op {
                    Op::Eq => ordering == Some(Ordering::Equal),
                    Op::Ne => ordering != Some(Ordering::Equal),
                    Op::Lt => ordering == Some(Ordering::Less),
                    Op::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    Op::Gt => ordering == Some(Ordering::Greater),
                    Op::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                }
            }
            Expr::In {
                field,
                values,
                negated,
            } => {
                let value = value_of(row, field);
                let found = values
                    .iter()
                    .any(|lit| compare(value, lit) == Some(Ordering::Equal));
                found != *negated
            }
            Expr::Like { field, pattern } => match value_of(row, field) {
                Value::String(s) => like(s, pattern),
                Value::Number(n) => like(&n.to_string(), pattern),
                _ => false,
            },
        }
    }

    /// Field names referenced by this expression.
    pub(crate) fn fields(&self) -> Vec<&str> {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                let mut fields = a.fields();
                fields.extend(b.fields());
                fields
            }
            Expr::Not(inner) => inner.fields(),
            Expr::Cmp { field, .. } | Expr::In { field, .. } | Expr::Like { field, .. } => {
                vec![field.as_str()]
            }
        }
    }
}

/// Ordering used by ORDER BY: nulls first, numbers numerically.
pub(crate) fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Sort key lookup for ORDER BY.
pub(crate) fn sort_value<'a>(row: &'a Row, field: &str) -> &'a Value {
    value_of(row, field)
}
