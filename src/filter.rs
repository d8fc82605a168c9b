//! Constrained predicate grammar for `filter_expr`.
//!
//! A filter is parsed into a [`Filter`] tree and rendered back to SQL with
//! every literal bound as a named parameter. Only column references,
//! comparison operators, `IS [NOT] NULL`, `[NOT] IN`, `[NOT] LIKE`,
//! `[NOT] BETWEEN`, `NOT`, `AND`, `OR` and parentheses are accepted.

use crate::error::TableportError;
use crate::query::{ParameterList, quote_ident};
use serde_json::Value;
use sqlparser::dialect::DatabricksDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

const MAX_DEPTH: usize = 32;
const MAX_PREDICATES: usize = 256;

const RESERVED: &[&str] = &[
    "AND", "OR", "NOT", "IS", "NULL", "IN", "LIKE", "BETWEEN", "TRUE", "FALSE",
];

/// A literal value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    /// Convert a JSON scalar. `Ok(None)` means SQL NULL.
    pub fn from_json(value: &Value) -> Result<Option<Self>, TableportError> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(Literal::Bool(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Some(Literal::Int(i))),
                None => n.as_f64().map(|f| Some(Literal::Float(f))).ok_or_else(|| {
                    TableportError::validation(format!("unsupported numeric value: {}", n))
                }),
            },
            Value::String(s) => Ok(Some(Literal::Text(s.clone()))),
            Value::Array(_) | Value::Object(_) => Err(TableportError::validation(
                "nested arrays and objects are not supported as column values",
            )),
        }
    }

    /// Parameter value text and Statement Execution API type name.
    pub fn to_parameter_parts(&self) -> (String, &'static str) {
        match self {
            Literal::Bool(b) => (b.to_string(), "BOOLEAN"),
            Literal::Int(i) => (i.to_string(), "BIGINT"),
            Literal::Float(f) => (f.to_string(), "DOUBLE"),
            Literal::Text(s) => (s.clone(), "STRING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    fn from_token(token: &Token) -> Option<Self> {
        match token {
            Token::Eq | Token::DoubleEq => Some(CompareOp::Eq),
            Token::Neq => Some(CompareOp::NotEq),
            Token::Lt => Some(CompareOp::Lt),
            Token::LtEq => Some(CompareOp::LtEq),
            Token::Gt => Some(CompareOp::Gt),
            Token::GtEq => Some(CompareOp::GtEq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    InList {
        column: String,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
        negated: bool,
    },
    Between {
        column: String,
        low: Literal,
        high: Literal,
        negated: bool,
    },
    Not(Box<Filter>),
    /// Two or more terms; chains are kept flat.
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn parse(text: &str) -> Result<Self, TableportError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("expression is empty"));
        }

        let dialect = DatabricksDialect {};
        let tokens = Tokenizer::new(&dialect, text)
            .tokenize()
            .map_err(|e| invalid(&e.to_string()))?
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .collect();

        let mut parser = FilterParser {
            tokens,
            pos: 0,
            depth: 0,
            predicates: 0,
        };
        let filter = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(invalid(&format!("unexpected '{}'", token)));
        }
        Ok(filter)
    }

    /// Render as SQL, binding literals into `params`.
    pub fn render(&self, params: &mut ParameterList) -> String {
        match self {
            Filter::Compare { column, op, value } => {
                format!("{} {} {}", quote_ident(column), op.as_sql(), params.bind(value))
            }
            Filter::IsNull { column, negated } => {
                format!("{} IS {}NULL", quote_ident(column), not_prefix(*negated))
            }
            Filter::InList {
                column,
                values,
                negated,
            } => {
                let markers = values
                    .iter()
                    .map(|v| params.bind(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} {}IN ({})", quote_ident(column), not_prefix(*negated), markers)
            }
            Filter::Like {
                column,
                pattern,
                negated,
            } => format!(
                "{} {}LIKE {}",
                quote_ident(column),
                not_prefix(*negated),
                params.bind(&Literal::Text(pattern.clone()))
            ),
            Filter::Between {
                column,
                low,
                high,
                negated,
            } => {
                let low = params.bind(low);
                let high = params.bind(high);
                format!(
                    "{} {}BETWEEN {} AND {}",
                    quote_ident(column),
                    not_prefix(*negated),
                    low,
                    high
                )
            }
            Filter::Not(inner) => format!("NOT ({})", inner.render(params)),
            Filter::And(terms) => terms
                .iter()
                .map(|term| render_and_operand(term, params))
                .collect::<Vec<_>>()
                .join(" AND "),
            Filter::Or(terms) => terms
                .iter()
                .map(|term| term.render(params))
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

fn render_and_operand(filter: &Filter, params: &mut ParameterList) -> String {
    match filter {
        Filter::Or(..) => format!("({})", filter.render(params)),
        _ => filter.render(params),
    }
}

fn combine(mut terms: Vec<Filter>, join: fn(Vec<Filter>) -> Filter) -> Filter {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        join(terms)
    }
}

fn not_prefix(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

fn invalid(reason: &str) -> TableportError {
    TableportError::validation(format!("Invalid filter expression: {}", reason))
}

struct FilterParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    predicates: usize,
}

impl FilterParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek(),
            Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword)
        )
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), TableportError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(invalid(&format!("expected {}, found {}", keyword, self.describe_next())))
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), TableportError> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(invalid(&format!("expected '{}', found {}", expected, self.describe_next()))),
        }
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => format!("'{}'", token),
            None => "end of expression".to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Filter, TableportError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat_keyword("OR") {
            terms.push(self.parse_and()?);
        }
        Ok(combine(terms, Filter::Or))
    }

    fn parse_and(&mut self) -> Result<Filter, TableportError> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat_keyword("AND") {
            terms.push(self.parse_unary()?);
        }
        Ok(combine(terms, Filter::And))
    }

    fn parse_unary(&mut self) -> Result<Filter, TableportError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(invalid("expression is nested too deeply"));
        }

        let result = if self.eat_keyword("NOT") {
            self.parse_unary().map(|inner| Filter::Not(Box::new(inner)))
        } else if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.parse_or()
                .and_then(|inner| self.expect_token(Token::RParen).map(|_| inner))
        } else {
            self.parse_predicate()
        };

        self.depth -= 1;
        result
    }

    fn parse_predicate(&mut self) -> Result<Filter, TableportError> {
        self.predicates += 1;
        if self.predicates > MAX_PREDICATES {
            return Err(invalid(&format!(
                "too many predicates (at most {})",
                MAX_PREDICATES
            )));
        }

        let column = self.parse_column()?;

        if let Some(op) = self.peek().and_then(CompareOp::from_token) {
            self.pos += 1;
            let value = self.parse_literal()?;
            return Ok(Filter::Compare { column, op, value });
        }

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Filter::IsNull { column, negated });
        }

        let negated = self.eat_keyword("NOT");

        if self.eat_keyword("IN") {
            self.expect_token(Token::LParen)?;
            let mut values = vec![self.parse_literal()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.parse_literal()?);
            }
            self.expect_token(Token::RParen)?;
            return Ok(Filter::InList {
                column,
                values,
                negated,
            });
        }

        if self.eat_keyword("LIKE") {
            return match self.parse_literal()? {
                Literal::Text(pattern) => Ok(Filter::Like {
                    column,
                    pattern,
                    negated,
                }),
                _ => Err(invalid("LIKE requires a string pattern")),
            };
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.parse_literal()?;
            self.expect_keyword("AND")?;
            let high = self.parse_literal()?;
            return Ok(Filter::Between {
                column,
                low,
                high,
                negated,
            });
        }

        Err(invalid(&format!(
            "expected an operator after column '{}', found {}",
            column,
            self.describe_next()
        )))
    }

    fn parse_column(&mut self) -> Result<String, TableportError> {
        let column = match self.next_token() {
            Some(Token::Word(w))
                if w.quote_style == Some('`')
                    || (w.quote_style.is_none()
                        && !RESERVED.iter().any(|r| w.value.eq_ignore_ascii_case(r))) =>
            {
                w.value
            }
            Some(token) => {
                return Err(invalid(&format!("expected a column name, found '{}'", token)));
            }
            None => return Err(invalid("expected a column name, found end of expression")),
        };

        if column.is_empty() {
            return Err(invalid("column name must not be empty"));
        }
        match self.peek() {
            Some(Token::LParen) => Err(invalid(&format!(
                "function calls are not allowed ('{}')",
                column
            ))),
            Some(Token::Period) => Err(invalid("qualified column names are not supported")),
            _ => Ok(column),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, TableportError> {
        match self.next_token() {
            Some(Token::Number(text, _)) => parse_number(&text, false),
            Some(Token::Minus) => match self.next_token() {
                Some(Token::Number(text, _)) => parse_number(&text, true),
                _ => Err(invalid("expected a number after '-'")),
            },
            Some(Token::SingleQuotedString(s)) | Some(Token::DoubleQuotedString(s)) => {
                Ok(Literal::Text(s))
            }
            Some(Token::Word(w)) if w.quote_style == Some('"') => Ok(Literal::Text(w.value)),
            Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case("TRUE") => {
                Ok(Literal::Bool(true))
            }
            Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case("FALSE") => {
                Ok(Literal::Bool(false))
            }
            Some(token) => Err(invalid(&format!("expected a literal value, found '{}'", token))),
            None => Err(invalid("expected a literal value, found end of expression")),
        }
    }
}

fn parse_number(text: &str, negative: bool) -> Result<Literal, TableportError> {
    let signed = if negative {
        format!("-{}", text)
    } else {
        text.to_string()
    };

    let is_integral = !signed.contains(['.', 'e', 'E']);
    if is_integral && let Ok(i) = signed.parse::<i64>() {
        return Ok(Literal::Int(i));
    }
    signed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Literal::Float)
        .ok_or_else(|| invalid(&format!("invalid number '{}'", signed)))
}
