//! Dependency expressions and version constraints
//!
//! Policies gate their execution on boolean expressions evaluated against
//! the accumulated assessment context. The evaluator is a trait so callers
//! can plug in a richer language; [`TokenExpression`] is the built-in one:
//!
//! ```text
//! expr    := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | primary
//! primary := "(" expr ")" | operand (("==" | "!=") operand)?
//! operand := 'string' | "string" | number | true | false | null | dotted.path
//! ```

use crate::error::ConfigurationError;
use regex::Regex;
use serde_json::Value;

/// Evaluates a dependency expression against a JSON context
#[cfg_attr(test, mockall::automock)]
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` to a boolean
    ///
    /// # Errors
    /// `ConfigurationError::InvalidExpression` if the expression is malformed.
    fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, ConfigurationError>;
}

/// Resolve a dependency gate; an empty expression is always satisfied
///
/// # Errors
/// Whatever the evaluator reports for a malformed expression.
pub fn resolve_dependency(
    expression: &str,
    context: &Value,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<bool, ConfigurationError> {
    if expression.trim().is_empty() {
        return Ok(true);
    }
    evaluator.evaluate(expression, context)
}

/// Check `current` against an anchored pattern; a blank constraint matches all
///
/// `"1\\.2"` does not match `"1.20"`.
///
/// # Errors
/// `ConfigurationError::InvalidConstraint` if the pattern does not compile.
pub fn match_constraint(current: &str, constraint: &str) -> Result<bool, ConfigurationError> {
    if constraint.trim().is_empty() {
        return Ok(true);
    }
    let pattern = Regex::new(&format!("^(?:{constraint})$")).map_err(|source| {
        ConfigurationError::InvalidConstraint {
            constraint: constraint.to_string(),
            source,
        }
    })?;
    Ok(pattern.is_match(current))
}

static NULL: Value = Value::Null;

/// Look up a dotted path in a JSON value; missing segments yield null
#[must_use]
pub fn lookup_path<'a>(context: &'a Value, path: &str) -> &'a Value {
    let mut current = context;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return &NULL,
        }
    }
    current
}

/// JSON truthiness
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Built-in boolean expression language over the token context
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenExpression;

impl ExpressionEvaluator for TokenExpression {
    fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, ConfigurationError> {
        let tokens = lex(expression).map_err(|reason| invalid(expression, reason))?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            context,
        };
        let result = parser.expr().map_err(|reason| invalid(expression, reason))?;
        if parser.pos != tokens.len() {
            return Err(invalid(
                expression,
                format!("unexpected trailing input at token {}", parser.pos),
            ));
        }
        Ok(result)
    }
}

fn invalid(expression: &str, reason: String) -> ConfigurationError {
    ConfigurationError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Literal(Value),
    Path(String),
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some(&'\\') if chars.get(i + 1).is_some() => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|ch| ch.is_ascii_digit() || *ch == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| text.parse::<f64>().map(Value::from))
                    .map_err(|_| format!("invalid number `{text}`"))?;
                tokens.push(Token::Literal(number));
            }
            c if is_ident_char(c) => {
                let start = i;
                while chars.get(i).is_some_and(|ch| is_ident_char(*ch)) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Path(word),
                });
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | ':')
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    context: &'a Value,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    // Every branch is parsed in full; no short-circuit, so syntax errors
    // surface regardless of the context.
    fn expr(&mut self) -> Result<bool, String> {
        let mut value = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut value = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<bool, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(!self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let value = self.expr()?;
            return match self.next() {
                Some(Token::RParen) => Ok(value),
                _ => Err("expected `)`".to_string()),
            };
        }

        let lhs = self.operand()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.pos += 1;
                let rhs = self.operand()?;
                Ok(values_equal(&lhs, &rhs))
            }
            Some(Token::Ne) => {
                self.pos += 1;
                let rhs = self.operand()?;
                Ok(!values_equal(&lhs, &rhs))
            }
            _ => Ok(is_truthy(&lhs)),
        }
    }

    fn operand(&mut self) -> Result<Value, String> {
        let context = self.context;
        match self.next() {
            Some(Token::Literal(value)) => Ok(value.clone()),
            Some(Token::Path(path)) => Ok(lookup_path(context, path).clone()),
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
