//! # Row Filter
//!
//! A small SQL-style `WHERE` clause over link attributes:
//! conjunctions of `<field> = <literal>`, `<field> <> <literal>`,
//! `<field> IS NULL` and `<field> IS NOT NULL`. Comparisons against a null
//! attribute are false, as in SQL.

use crate::error::NetsyncError;
use crate::model::{FieldValue, LinkRecord};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Int(i64),
    Real(f64),
    Text(String),
}

impl Literal {
    fn matches(&self, value: &FieldValue) -> Option<bool> {
        match (value, self) {
            (FieldValue::Null, _) => None,
            (FieldValue::Int(a), Literal::Int(b)) => Some(a == b),
            (FieldValue::Int(a), Literal::Real(b)) => Some((*a as f64) == *b),
            (FieldValue::Real(a), Literal::Int(b)) => Some(*a == *b as f64),
            (FieldValue::Real(a), Literal::Real(b)) => Some(a == b),
            (FieldValue::Text(a), Literal::Text(b)) => Some(a == b),
            _ => Some(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    IsNull(String),
    IsNotNull(String),
    Equals(String, Literal),
    NotEquals(String, Literal),
}

impl Clause {
    fn matches(&self, link: &LinkRecord) -> bool {
        match self {
            Clause::IsNull(field) => link.attribute(field).is_null(),
            Clause::IsNotNull(field) => !link.attribute(field).is_null(),
            Clause::Equals(field, literal) => literal.matches(link.attribute(field)) == Some(true),
            Clause::NotEquals(field, literal) => {
                literal.matches(link.attribute(field)) == Some(false)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Text(String),
    Number(String),
    Equals,
    NotEquals,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            tokens.push(Token::Equals);
        } else if c == '<' || c == '!' {
            chars.next();
            match (c, chars.next()) {
                ('<', Some('>')) | ('!', Some('=')) => tokens.push(Token::NotEquals),
                _ => return Err(format!("unexpected operator starting with `{}`", c)),
            }
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    // '' escapes a quote inside a literal
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        text.push('\'');
                    }
                    Some('\'') => break,
                    Some(other) => text.push(other),
                    None => return Err("unterminated string literal".to_string()),
                }
            }
            tokens.push(Token::Text(text));
        } else if c.is_ascii_digit() || c == '-' || c == '.' {
            let mut number = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '-' || d == '.' || d == 'e' || d == 'E' {
                    number.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(number));
        } else if c.is_alphanumeric() || c == '_' || c == '"' {
            let quoted = c == '"';
            if quoted {
                chars.next();
            }
            let mut word = String::new();
            while let Some(&d) = chars.peek() {
                if quoted && d == '"' {
                    chars.next();
                    break;
                }
                if !quoted && !(d.is_alphanumeric() || d == '_') {
                    break;
                }
                word.push(d);
                chars.next();
            }
            tokens.push(Token::Word(word));
        } else {
            return Err(format!("unexpected character `{}`", c));
        }
    }
    Ok(tokens)
}

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    matches!(token, Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword))
}

fn parse_literal(token: Option<Token>) -> Result<Literal, String> {
    match token {
        Some(Token::Text(text)) => Ok(Literal::Text(text)),
        Some(Token::Number(number)) => {
            if let Ok(value) = number.parse::<i64>() {
                Ok(Literal::Int(value))
            } else {
                number
                    .parse::<f64>()
                    .map(Literal::Real)
                    .map_err(|_| format!("`{}` is not a number", number))
            }
        }
        Some(other) => Err(format!("expected a literal, found {:?}", other)),
        None => Err("expected a literal at end of input".to_string()),
    }
}

fn parse_clauses(tokens: Vec<Token>) -> Result<Vec<Clause>, String> {
    let mut clauses = Vec::new();
    let mut tokens = tokens.into_iter().peekable();
    loop {
        let field = match tokens.next() {
            Some(Token::Word(word)) => word,
            Some(other) => return Err(format!("expected a field name, found {:?}", other)),
            None => return Err("expected a field name at end of input".to_string()),
        };
        let clause = match tokens.next() {
            Some(Token::Equals) => Clause::Equals(field, parse_literal(tokens.next())?),
            Some(Token::NotEquals) => Clause::NotEquals(field, parse_literal(tokens.next())?),
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("is") => {
                let negated = is_keyword(tokens.peek(), "not");
                if negated {
                    tokens.next();
                }
                if !is_keyword(tokens.next().as_ref(), "null") {
                    return Err("expected NULL after IS".to_string());
                }
                if negated {
                    Clause::IsNotNull(field)
                } else {
                    Clause::IsNull(field)
                }
            }
            Some(other) => return Err(format!("expected an operator, found {:?}", other)),
            None => return Err(format!("missing operator after `{}`", field)),
        };
        clauses.push(clause);

        match tokens.next() {
            None => return Ok(clauses),
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("and") => continue,
            Some(other) => return Err(format!("expected AND, found {:?}", other)),
        }
    }
}

/// Parsed link filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    expression: String,
    clauses: Vec<Clause>,
}

impl RowFilter {
    pub fn parse(expression: &str) -> Result<Self, NetsyncError> {
        let invalid = |reason: String| NetsyncError::InvalidFilter {
            expression: expression.to_string(),
            reason,
        };
        let tokens = tokenize(expression).map_err(invalid)?;
        if tokens.is_empty() {
            return Err(invalid("empty expression".to_string()));
        }
        let clauses = parse_clauses(tokens).map_err(invalid)?;
        Ok(Self {
            expression: expression.trim().to_string(),
            clauses,
        })
    }

    pub fn matches(&self, link: &LinkRecord) -> bool {
        self.clauses.iter().all(|clause| clause.matches(link))
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl FromStr for RowFilter {
    type Err = NetsyncError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        Self::parse(expression)
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// True when `link` is in scope of an optional filter.
pub fn in_scope(filter: Option<&RowFilter>, link: &LinkRecord) -> bool {
    filter.map_or(true, |filter| filter.matches(link))
}
