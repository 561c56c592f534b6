//! Boolean expression language for condition branches and loop guards.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := comparison ( "&&" comparison )*
//! comparison := unary ( ("===" | "==" | "!==" | "!=" | ">=" | "<=" | ">" | "<") unary )?
//! unary      := "!" unary | primary
//! primary    := number | string | true | false | null | reference | "(" or ")"
//! reference  := "{{" path "}}" | path
//! ```
//!
//! Expressions are parsed into an [`Expr`] tree once and evaluated against an
//! [`ExecutionContext`]; nothing is ever executed as code. Truthiness follows
//! JavaScript conventions (null, false, 0, NaN and "" are falsy).

use serde_json::Value;
use thiserror::Error;

use super::context::ExecutionContext;

/// Errors produced while parsing an expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("unterminated reference starting at position {0}")]
    UnterminatedReference(usize),

    #[error("unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    StrictEq,
    Eq,
    StrictNe,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Reference(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse `source` into an expression tree.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expr),
            Some((token, pos)) => Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                pos: *pos,
            }),
        }
    }

    /// Evaluate to a JSON value. Unresolved references evaluate to null.
    pub fn evaluate(&self, ctx: &ExecutionContext) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Reference(path) => ctx.lookup(path).cloned().unwrap_or(Value::Null),
            Expr::Not(inner) => Value::Bool(!is_truthy(&inner.evaluate(ctx))),
            Expr::And(lhs, rhs) => {
                let left = lhs.evaluate(ctx);
                if is_truthy(&left) { rhs.evaluate(ctx) } else { left }
            }
            Expr::Or(lhs, rhs) => {
                let left = lhs.evaluate(ctx);
                if is_truthy(&left) { left } else { rhs.evaluate(ctx) }
            }
            Expr::Compare(op, lhs, rhs) => {
                Value::Bool(compare(*op, &lhs.evaluate(ctx), &rhs.evaluate(ctx)))
            }
        }
    }
}

/// Parse and evaluate `source`, returning its truthiness.
pub fn evaluate_condition(source: &str, ctx: &ExecutionContext) -> Result<bool, ExpressionError> {
    Ok(is_truthy(&Expr::parse(source)?.evaluate(ctx)))
}

/// JavaScript-style truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::StrictEq => strict_eq(left, right),
        CompareOp::StrictNe => !strict_eq(left, right),
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::Ne => !loose_eq(left, right),
        CompareOp::Gt => ordering(left, right).is_some_and(|o| o.is_gt()),
        CompareOp::Ge => ordering(left, right).is_some_and(|o| o.is_ge()),
        CompareOp::Lt => ordering(left, right).is_some_and(|o| o.is_lt()),
        CompareOp::Le => ordering(left, right).is_some_and(|o| o.is_le()),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_), Value::String(_)) => left == right,
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => strict_eq(left, right),
        },
    }
}

fn ordering(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Some(a.cmp(b));
    }
    as_number(left)?.partial_cmp(&as_number(right)?)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Reference(String),
    Not,
    And,
    Or,
    Compare(CompareOp),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Literal(v) => format!("literal {v}"),
            Token::Reference(p) => format!("reference '{p}'"),
            Token::Not => "'!'".into(),
            Token::And => "'&&'".into(),
            Token::Or => "'||'".into(),
            Token::Compare(op) => format!("operator {op:?}"),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// Operator spellings, longest first so `===` wins over `==` and `!`.
const OPERATORS: &[&str] = &[
    "===", "!==", "==", "!=", ">=", "<=", "&&", "||", ">", "<", "!", "(", ")",
];

fn operator_token(op: &str) -> Option<Token> {
    let token = match op {
        "===" => Token::Compare(CompareOp::StrictEq),
        "!==" => Token::Compare(CompareOp::StrictNe),
        "==" => Token::Compare(CompareOp::Eq),
        "!=" => Token::Compare(CompareOp::Ne),
        ">=" => Token::Compare(CompareOp::Ge),
        "<=" => Token::Compare(CompareOp::Le),
        ">" => Token::Compare(CompareOp::Gt),
        "<" => Token::Compare(CompareOp::Lt),
        "&&" => Token::And,
        "||" => Token::Or,
        "!" => Token::Not,
        "(" => Token::LParen,
        ")" => Token::RParen,
        _ => return None,
    };
    Some(token)
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        if rest.starts_with("{{") {
            let len = rest[2..]
                .find("}}")
                .ok_or(ExpressionError::UnterminatedReference(pos))?;
            let path = rest[2..2 + len].trim().to_string();
            tokens.push((Token::Reference(path), pos));
            pos += 2 + len + 2;
            continue;
        }

        if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(*op)) {
            if let Some(token) = operator_token(op) {
                tokens.push((token, pos));
                pos += op.len();
                continue;
            }
        }

        if ch == '"' || ch == '\'' {
            let (value, consumed) = read_string(rest, ch).ok_or(ExpressionError::UnterminatedString(pos))?;
            tokens.push((Token::Literal(Value::String(value)), pos));
            pos += consumed;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '-' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let len = rest[1..]
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .map_or(rest.len(), |i| i + 1);
            let text = &rest[..len];
            let number: f64 = text
                .parse()
                .map_err(|_| ExpressionError::UnexpectedChar { ch, pos })?;
            let value = serde_json::Number::from_f64(number)
                .map(Value::Number)
                .ok_or(ExpressionError::UnexpectedChar { ch, pos })?;
            tokens.push((Token::Literal(value), pos));
            pos += len;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.'))
                .unwrap_or(rest.len());
            let word = &rest[..len];
            let token = match word {
                "true" => Token::Literal(Value::Bool(true)),
                "false" => Token::Literal(Value::Bool(false)),
                "null" | "undefined" => Token::Literal(Value::Null),
                path => Token::Reference(path.to_string()),
            };
            tokens.push((token, pos));
            pos += len;
            continue;
        }

        return Err(ExpressionError::UnexpectedChar { ch, pos });
    }

    Ok(tokens)
}

/// Read a quoted string starting at `rest[0]`. Returns the unescaped value
/// and the number of bytes consumed including both quotes.
fn read_string(rest: &str, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => return Some((value, i + c.len_utf8())),
            c => value.push(c),
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Token, usize), ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Expr::Or(Box::new(expr), Box::new(self.parse_and()?));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Expr::And(Box::new(expr), Box::new(self.parse_comparison()?));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_unary()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_unary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let (token, pos) = self.next()?;
        match token {
            Token::Literal(v) => Ok(Expr::Literal(v)),
            Token::Reference(path) => Ok(Expr::Reference(path)),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.next()? {
                    (Token::RParen, _) => Ok(inner),
                    (other, pos) => Err(ExpressionError::UnexpectedToken {
                        found: other.describe(),
                        pos,
                    }),
                }
            }
            other => Err(ExpressionError::UnexpectedToken {
                found: other.describe(),
                pos,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn ctx() -> ExecutionContext {
        let variables: HashMap<String, Value> = serde_json::from_value(json!({
            "count": 7,
            "name": "ada",
            "flag": true,
            "empty": "",
            "user": {"role": "admin", "age": "42"},
        }))
        .unwrap();
        let outputs: HashMap<String, Value> =
            serde_json::from_value(json!({"status": "ok", "items": [1, 2, 3]})).unwrap();
        ExecutionContext {
            variables,
            outputs,
            ..ExecutionContext::default()
        }
    }

    fn eval(src: &str) -> bool {
        evaluate_condition(src, &ctx()).unwrap()
    }

    #[test]
    fn test_literals_and_references() {
        assert!(eval("true"));
        assert!(!eval("false"));
        assert!(!eval("null"));
        assert!(eval("{{flag}}"));
        assert!(eval("flag"));
        assert!(!eval("{{empty}}"));
        assert!(!eval("{{missing}}"));
        assert!(eval("items"));
    }

    #[test]
    fn test_comparisons() {
        assert!(eval("{{count}} > 5"));
        assert!(eval("count >= 7"));
        assert!(!eval("{{count}} < 7"));
        assert!(eval("{{name}} === 'ada'"));
        assert!(eval("{{name}} !== \"bob\""));
        assert!(eval("{{status}} == 'ok'"));
        assert!(eval("user.role == 'admin'"));
        assert!(eval("items.2 === 3"));
    }

    #[test]
    fn test_loose_vs_strict_equality() {
        assert!(eval("user.age == 42"));
        assert!(!eval("user.age === 42"));
        assert!(eval("user.age != 41"));
        assert!(eval("flag == 1"));
    }

    #[test]
    fn test_logical_operators_and_precedence() {
        assert!(eval("{{count}} > 5 && {{name}} === 'ada'"));
        assert!(eval("false || {{count}} == 7"));
        // && binds tighter than ||
        assert!(eval("true || false && false"));
        assert!(!eval("(true || false) && false"));
        assert!(eval("!{{empty}}"));
        assert!(eval("!({{count}} < 3)"));
        assert!(!eval("!flag"));
    }

    #[test]
    fn test_negative_and_decimal_numbers() {
        assert!(eval("-1 < 0"));
        assert!(eval("2.5 > 2"));
    }

    #[test]
    fn test_parse_tree_shape() {
        let expr = Expr::parse("a == 1 || !b").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Compare(
                    CompareOp::Eq,
                    Box::new(Expr::Reference("a".into())),
                    Box::new(Expr::Literal(json!(1.0))),
                )),
                Box::new(Expr::Not(Box::new(Expr::Reference("b".into())))),
            )
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Expr::parse("   "), Err(ExpressionError::Empty));
        assert_eq!(
            Expr::parse("'open"),
            Err(ExpressionError::UnterminatedString(0))
        );
        assert_eq!(
            Expr::parse("{{x"),
            Err(ExpressionError::UnterminatedReference(0))
        );
        assert!(matches!(
            Expr::parse("a == 1 )"),
            Err(ExpressionError::UnexpectedToken { pos: 7, .. })
        ));
        assert_eq!(Expr::parse("a &&"), Err(ExpressionError::UnexpectedEnd));
        assert!(matches!(
            Expr::parse("a # b"),
            Err(ExpressionError::UnexpectedChar { ch: '#', pos: 2 })
        ));
        assert!(matches!(
            Expr::parse("(a"),
            Err(ExpressionError::UnexpectedEnd)
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(-2)));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }
}
