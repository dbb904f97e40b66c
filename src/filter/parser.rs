//! Tokenizer and parser for filter expressions.
//!
//! `and` and `or` fold left to right with equal precedence, so
//! `a pr or b pr and c pr` parses as `(a pr or b pr) and c pr`.

use log::{debug, trace};

use super::{FilterNode, Op};
use crate::error::{ScimError, ScimResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Word(String),
    Quoted(String),
}

fn invalid(detail: impl Into<String>) -> ScimError {
    ScimError::invalid_filter(detail)
}

fn tokenize(filter: &str) -> ScimResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = filter.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            '"' => {
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => text.push(c),
                    }
                }
                if !closed {
                    return Err(invalid(format!(
                        "Invalid filter, no ending \" found for the string starting at position {}",
                        pos + 1
                    )));
                }
                tokens.push(Token::Quoted(text));
            }
            _ => {
                let mut word = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '(' | ')' | '[' | ']' | '"') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    trace!("filter tokens {:?}", tokens);
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
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> ScimResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!(
                "Invalid filter, expected {:?} but found {:?}",
                expected, token
            ))),
            None => Err(invalid(format!(
                "Invalid filter, expected {:?} at the end of the filter",
                expected
            ))),
        }
    }

    fn parse_expr(&mut self, parent: Option<&str>) -> ScimResult<FilterNode> {
        let mut node = self.parse_unary(parent)?;

        loop {
            let op = match self.peek() {
                Some(Token::Word(word)) => match Op::from_keyword(word) {
                    Some(op) if op.is_logical() => op,
                    _ => return Err(invalid(format!("Invalid filter, unexpected token {}", word))),
                },
                Some(Token::RParen) | Some(Token::RBracket) | None => return Ok(node),
                Some(token) => {
                    return Err(invalid(format!("Invalid filter, unexpected token {:?}", token)));
                }
            };
            self.next();
            let rhs = self.parse_unary(parent)?;
            node = FilterNode::branch(op, vec![node, rhs]);
        }
    }

    fn parse_unary(&mut self, parent: Option<&str>) -> ScimResult<FilterNode> {
        match self.next() {
            Some(Token::LParen) => {
                let node = self.parse_expr(parent)?;
                self.expect(Token::RParen)?;
                Ok(node)
            }
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("not") => {
                let child = self.parse_unary(parent)?;
                Ok(FilterNode::branch(Op::Not, vec![child]))
            }
            Some(Token::Word(word)) => self.parse_attribute(word, parent),
            Some(token) => Err(invalid(format!(
                "Invalid filter, expected an attribute but found {:?}",
                token
            ))),
            None => Err(invalid("Invalid filter, missing expression")),
        }
    }

    fn parse_attribute(&mut self, word: String, parent: Option<&str>) -> ScimResult<FilterNode> {
        let mut name = word.to_lowercase();
        if let Some(parent) = parent {
            name = format!("{}.{}", parent, name);
        }

        if self.peek() == Some(&Token::LBracket) {
            if parent.is_some() {
                return Err(invalid(format!(
                    "Invalid filter, nested value filter in attribute {}",
                    name
                )));
            }
            self.next();
            let node = self.parse_expr(Some(&name))?;
            self.expect(Token::RBracket)?;
            return Ok(node);
        }

        let op = match self.next() {
            Some(Token::Word(keyword)) => Op::from_keyword(&keyword)
                .filter(|op| op.is_comparison() || *op == Op::Pr)
                .ok_or_else(|| invalid(format!("Invalid operator {} after attribute {}", keyword, name)))?,
            Some(token) => {
                return Err(invalid(format!(
                    "Invalid filter, expected an operator after attribute {} but found {:?}",
                    name, token
                )));
            }
            None => {
                return Err(invalid(format!(
                    "Invalid filter, missing operator after attribute {}",
                    name
                )));
            }
        };

        if op == Op::Pr {
            return Ok(FilterNode::leaf(op, name, None));
        }

        match self.next() {
            Some(Token::Quoted(value)) | Some(Token::Word(value)) => {
                Ok(FilterNode::leaf(op, name, Some(value)))
            }
            _ => Err(invalid(format!(
                "Invalid filter, missing value for attribute {}",
                name
            ))),
        }
    }
}

/// Parse a filter expression.
///
/// Malformed filters are BadRequest errors with scimType `invalidFilter`.
pub fn parse_filter(filter: &str) -> ScimResult<FilterNode> {
    debug!("Parsing filter {}", filter);
    let tokens = tokenize(filter.trim())?;
    if tokens.is_empty() {
        return Err(invalid("Invalid filter, the filter is empty"));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_expr(None)?;
    if let Some(token) = parser.peek() {
        return Err(invalid(format!(
            "Invalid filter, unexpected token {:?} at the end",
            token
        )));
    }
    Ok(node)
}
