//! Recursive-descent parser.
//!
//! One method per grammar rule. Reserved words are identifier tokens
//! matched by literal, so the token stream stays a flat
//! kind/literal/offset contract. All binary levels are left-associative;
//! `^` sits on the multiplicative level.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use thiserror::Error;

use crate::ast::{BinaryOp, Case, Expression, Function, Global, Literal, Source, Statement};
use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (index {index})")]
pub struct ParseError {
    pub message: String,
    pub index: usize,
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    index: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens, index: 0 }
    }

    /// Parses the `source` rule: globals, then functions, then end of input.
    pub fn parse_source(&mut self) -> ParseResult<Source> {
        let mut globals = Vec::new();
        let mut functions = Vec::new();
        while self.peek_literal("LIST") || self.peek_literal("VAR") || self.peek_literal("VAL") {
            globals.push(self.parse_global()?);
        }
        while self.peek_literal("FUN") {
            functions.push(self.parse_function()?);
        }
        if self.has(0) {
            return Err(self.error("Not a global or function."));
        }
        Ok(Source { globals, functions })
    }

    fn parse_global(&mut self) -> ParseResult<Global> {
        let global = if self.match_literal("LIST") {
            self.parse_list()?
        } else if self.match_literal("VAR") {
            self.parse_mutable()?
        } else {
            self.match_literal("VAL");
            self.parse_immutable()?
        };
        if !self.match_literal(";") {
            return Err(self.error("Invalid global."));
        }
        Ok(global)
    }

    fn parse_list(&mut self) -> ParseResult<Global> {
        let name = self.expect_identifier("Invalid list.")?;
        if !self.match_literal(":") {
            return Err(self.error("Invalid list."));
        }
        let type_name = self.expect_identifier("Invalid list.")?;
        if !self.match_literal("=") {
            return Err(self.error("Invalid list."));
        }
        if !self.match_literal("[") {
            return Err(self.error("Invalid list."));
        }
        let mut values = vec![self.parse_expression()?];
        while self.match_literal(",") {
            values.push(self.parse_expression()?);
        }
        if !self.match_literal("]") {
            return Err(self.error("Invalid list."));
        }
        Ok(Global {
            name,
            type_name,
            mutable: true,
            value: Some(Expression::List(values)),
        })
    }

    fn parse_mutable(&mut self) -> ParseResult<Global> {
        let name = self.expect_identifier("Invalid mutable.")?;
        if !self.match_literal(":") {
            return Err(self.error("Invalid mutable."));
        }
        let type_name = self.expect_identifier("Invalid mutable.")?;
        let value = if self.match_literal("=") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Global {
            name,
            type_name,
            mutable: true,
            value,
        })
    }

    fn parse_immutable(&mut self) -> ParseResult<Global> {
        let name = self.expect_identifier("Invalid immutable.")?;
        if !self.match_literal(":") {
            return Err(self.error("Invalid immutable."));
        }
        let type_name = self.expect_identifier("Invalid immutable.")?;
        if !self.match_literal("=") {
            return Err(self.error("Invalid immutable."));
        }
        let value = self.parse_expression()?;
        Ok(Global {
            name,
            type_name,
            mutable: false,
            value: Some(value),
        })
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        self.match_literal("FUN");
        let name = self.expect_identifier("Invalid function.")?;
        if !self.match_literal("(") {
            return Err(self.error("Invalid function."));
        }
        let mut parameters = Vec::new();
        let mut parameter_type_names = Vec::new();
        if self.peek_kind(TokenKind::Identifier) {
            loop {
                parameters.push(self.expect_identifier("Invalid function.")?);
                if !self.match_literal(":") {
                    return Err(self.error("Invalid function."));
                }
                parameter_type_names.push(self.expect_identifier("Invalid function.")?);
                if !self.match_literal(",") {
                    break;
                }
            }
        }
        if !self.match_literal(")") {
            return Err(self.error("Invalid function."));
        }
        let return_type_name = if self.match_literal(":") {
            Some(self.expect_identifier("Invalid function.")?)
        } else {
            None
        };
        if !self.match_literal("DO") {
            return Err(self.error("Invalid function."));
        }
        let body = self.parse_block()?;
        if !self.match_literal("END") {
            return Err(self.error("Invalid function."));
        }
        Ok(Function {
            name,
            parameters,
            parameter_type_names,
            return_type_name,
            body,
        })
    }

    /// Parses statements until one of the block terminators is next.
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        let mut block = Vec::new();
        while !(self.peek_literal("END")
            || self.peek_literal("ELSE")
            || self.peek_literal("CASE")
            || self.peek_literal("DEFAULT"))
        {
            block.push(self.parse_statement()?);
        }
        Ok(block)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        if self.match_literal("LET") {
            return self.parse_declaration_statement();
        }
        if self.match_literal("SWITCH") {
            return self.parse_switch_statement();
        }
        if self.match_literal("IF") {
            return self.parse_if_statement();
        }
        if self.match_literal("WHILE") {
            return self.parse_while_statement();
        }
        if self.match_literal("RETURN") {
            return self.parse_return_statement();
        }
        let left = self.parse_expression()?;
        let statement = if self.match_literal("=") {
            Statement::Assignment {
                receiver: left,
                value: self.parse_expression()?,
            }
        } else {
            Statement::Expression(left)
        };
        if !self.match_literal(";") {
            return Err(self.error("Invalid statement."));
        }
        Ok(statement)
    }

    fn parse_declaration_statement(&mut self) -> ParseResult<Statement> {
        let name = self.expect_identifier("Invalid declaration statement.")?;
        let type_name = if self.match_literal(":") {
            Some(self.expect_identifier("Invalid declaration statement.")?)
        } else {
            None
        };
        let value = if self.match_literal("=") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        if !self.match_literal(";") {
            return Err(self.error("Invalid declaration statement."));
        }
        Ok(Statement::Declaration {
            name,
            type_name,
            value,
        })
    }

    fn parse_if_statement(&mut self) -> ParseResult<Statement> {
        let condition = self.parse_expression()?;
        if !self.match_literal("DO") {
            return Err(self.error("Invalid if statement."));
        }
        let then_body = self.parse_block()?;
        let else_body = if self.match_literal("ELSE") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if !self.match_literal("END") {
            return Err(self.error("Invalid if statement."));
        }
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_switch_statement(&mut self) -> ParseResult<Statement> {
        let condition = self.parse_expression()?;
        let mut cases = Vec::new();
        while self.match_literal("CASE") {
            cases.push(self.parse_case_statement()?);
        }
        if !self.match_literal("DEFAULT") {
            return Err(self.error("Invalid switch statement."));
        }
        cases.push(Case {
            value: None,
            body: self.parse_block()?,
        });
        if !self.match_literal("END") {
            return Err(self.error("Invalid switch statement."));
        }
        Ok(Statement::Switch { condition, cases })
    }

    fn parse_case_statement(&mut self) -> ParseResult<Case> {
        let value = self.parse_expression()?;
        if !self.match_literal(":") {
            return Err(self.error("Invalid case statement."));
        }
        Ok(Case {
            value: Some(value),
            body: self.parse_block()?,
        })
    }

    fn parse_while_statement(&mut self) -> ParseResult<Statement> {
        let condition = self.parse_expression()?;
        if !self.match_literal("DO") {
            return Err(self.error("Invalid while statement."));
        }
        let body = self.parse_block()?;
        if !self.match_literal("END") {
            return Err(self.error("Invalid while statement."));
        }
        Ok(Statement::While { condition, body })
    }

    fn parse_return_statement(&mut self) -> ParseResult<Statement> {
        let value = self.parse_expression()?;
        if !self.match_literal(";") {
            return Err(self.error("Invalid return statement."));
        }
        Ok(Statement::Return(value))
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_comparison()?;
        while let Some(op) =
            self.match_operator(&[("&&", BinaryOp::And), ("||", BinaryOp::Or)])
        {
            let right = self.parse_comparison()?;
            expression = Expression::Binary {
                op,
                left: Box::new(expression),
                right: Box::new(right),
            };
        }
        Ok(expression)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_additive()?;
        while let Some(op) = self.match_operator(&[
            ("<", BinaryOp::LessThan),
            (">", BinaryOp::GreaterThan),
            ("==", BinaryOp::Equal),
            ("!=", BinaryOp::NotEqual),
        ]) {
            let right = self.parse_additive()?;
            expression = Expression::Binary {
                op,
                left: Box::new(expression),
                right: Box::new(right),
            };
        }
        Ok(expression)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_multiplicative()?;
        while let Some(op) =
            self.match_operator(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)])
        {
            let right = self.parse_multiplicative()?;
            expression = Expression::Binary {
                op,
                left: Box::new(expression),
                right: Box::new(right),
            };
        }
        Ok(expression)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary()?;
        while let Some(op) = self.match_operator(&[
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("^", BinaryOp::Pow),
        ]) {
            let right = self.parse_primary()?;
            expression = Expression::Binary {
                op,
                left: Box::new(expression),
                right: Box::new(right),
            };
        }
        Ok(expression)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        if self.match_literal("NIL") {
            return Ok(Expression::Literal(Literal::Nil));
        }
        if self.match_literal("TRUE") {
            return Ok(Expression::Literal(Literal::Boolean(true)));
        }
        if self.match_literal("FALSE") {
            return Ok(Expression::Literal(Literal::Boolean(false)));
        }
        if let Some(literal) = self.match_kind(TokenKind::Integer) {
            // Digits only by the token contract, so this cannot fail.
            let value = BigInt::from_str(literal)
                .map_err(|_| self.error("Invalid integer literal."))?;
            return Ok(Expression::Literal(Literal::Integer(value)));
        }
        if let Some(literal) = self.match_kind(TokenKind::Decimal) {
            let value = BigDecimal::from_str(literal)
                .map_err(|_| self.error("Invalid decimal literal."))?;
            return Ok(Expression::Literal(Literal::Decimal(value)));
        }
        if let Some(literal) = self.match_kind(TokenKind::Character) {
            let value = unescape_character(literal)
                .ok_or_else(|| self.error("Invalid character literal."))?;
            return Ok(Expression::Literal(Literal::Character(value)));
        }
        if let Some(literal) = self.match_kind(TokenKind::String) {
            let value = unescape_string(literal)
                .ok_or_else(|| self.error("Invalid string literal."))?;
            return Ok(Expression::Literal(Literal::String(value)));
        }
        if self.match_literal("(") {
            let inner = self.parse_expression()?;
            if !self.match_literal(")") {
                return Err(self.error("Invalid primary expression."));
            }
            return Ok(Expression::Group(Box::new(inner)));
        }
        if let Some(name) = self.match_kind(TokenKind::Identifier) {
            let name = name.to_string();
            if self.match_literal("(") {
                let mut arguments = Vec::new();
                if !self.match_literal(")") {
                    arguments.push(self.parse_expression()?);
                    while self.match_literal(",") {
                        arguments.push(self.parse_expression()?);
                    }
                    if !self.match_literal(")") {
                        return Err(self.error("Invalid primary expression."));
                    }
                }
                return Ok(Expression::Call { name, arguments });
            }
            if self.match_literal("[") {
                let offset = self.parse_expression()?;
                if !self.match_literal("]") {
                    return Err(self.error("Invalid primary expression."));
                }
                return Ok(Expression::Access {
                    name,
                    offset: Some(Box::new(offset)),
                });
            }
            return Ok(Expression::Access { name, offset: None });
        }
        Err(self.error("Invalid primary expression."))
    }

    fn has(&self, offset: usize) -> bool {
        self.index + offset < self.tokens.len()
    }

    fn peek_literal(&self, literal: &str) -> bool {
        self.has(0) && self.tokens[self.index].literal == literal
    }

    fn peek_kind(&self, kind: TokenKind) -> bool {
        self.has(0) && self.tokens[self.index].kind == kind
    }

    fn match_literal(&mut self, literal: &str) -> bool {
        let matched = self.peek_literal(literal);
        if matched {
            self.index += 1;
        }
        matched
    }

    fn match_kind(&mut self, kind: TokenKind) -> Option<&'a str> {
        if self.peek_kind(kind) {
            let literal = self.tokens[self.index].literal;
            self.index += 1;
            Some(literal)
        } else {
            None
        }
    }

    fn match_operator(&mut self, table: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        for (literal, op) in table {
            if self.peek_kind(TokenKind::Operator) && self.peek_literal(literal) {
                self.index += 1;
                return Some(*op);
            }
        }
        None
    }

    fn expect_identifier(&mut self, message: &str) -> ParseResult<String> {
        self.match_kind(TokenKind::Identifier)
            .map(str::to_string)
            .ok_or_else(|| self.error(message))
    }

    /// Builds a diagnostic at the next token, or one byte past the last
    /// token when the stream is exhausted.
    fn error(&self, message: &str) -> ParseError {
        let index = if self.has(0) {
            self.tokens[self.index].index
        } else {
            self.tokens
                .last()
                .map(|token| token.index + token.literal.len())
                .unwrap_or(0)
        };
        ParseError {
            message: message.to_string(),
            index,
        }
    }
}

/// Expands the escape set `\b \n \r \t \' \" \\` in a single left-to-right
/// scan. Returns `None` for a dangling or unknown escape.
fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'b' => out.push('\u{0008}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }
    Some(out)
}

fn unescape_character(literal: &str) -> Option<char> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    let expanded = unescape(inner)?;
    let mut chars = expanded.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(c)
}

fn unescape_string(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    unescape(inner)
}

/// Parses a full token stream as the `source` rule.
pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Source> {
    Parser::new(tokens).parse_source()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse(source: &str) -> ParseResult<Source> {
        parse_tokens(lexer::tokenize(source).expect("tokenize failed"))
    }

    fn int(value: i64) -> Expression {
        Expression::Literal(Literal::Integer(BigInt::from(value)))
    }

    fn access(name: &str) -> Expression {
        Expression::Access {
            name: name.to_string(),
            offset: None,
        }
    }

    fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn parses_minimal_function() {
        let source = parse("FUN main(): Integer DO RETURN 0; END").expect("parse failed");
        assert_eq!(
            source,
            Source {
                globals: vec![],
                functions: vec![Function {
                    name: "main".to_string(),
                    parameters: vec![],
                    parameter_type_names: vec![],
                    return_type_name: Some("Integer".to_string()),
                    body: vec![Statement::Return(int(0))],
                }],
            }
        );
    }

    #[test]
    fn parses_globals_in_order() {
        let source = parse(
            "LIST xs: Integer = [1, 2];\nVAR x: Integer;\nVAL y: Integer = 3;\n\
             FUN main(): Integer DO RETURN 0; END",
        )
        .expect("parse failed");
        assert_eq!(
            source.globals,
            vec![
                Global {
                    name: "xs".to_string(),
                    type_name: "Integer".to_string(),
                    mutable: true,
                    value: Some(Expression::List(vec![int(1), int(2)])),
                },
                Global {
                    name: "x".to_string(),
                    type_name: "Integer".to_string(),
                    mutable: true,
                    value: None,
                },
                Global {
                    name: "y".to_string(),
                    type_name: "Integer".to_string(),
                    mutable: false,
                    value: Some(int(3)),
                },
            ]
        );
    }

    #[test]
    fn parses_parameters_with_types() {
        let source =
            parse("FUN add(a: Integer, b: Integer): Integer DO RETURN a + b; END")
                .expect("parse failed");
        let function = &source.functions[0];
        assert_eq!(function.parameters, vec!["a", "b"]);
        assert_eq!(function.parameter_type_names, vec!["Integer", "Integer"]);
    }

    #[test]
    fn binary_levels_are_left_associative() {
        let source = parse("FUN main(): Integer DO RETURN 1 - 2 - 3; END").expect("parse failed");
        assert_eq!(
            source.functions[0].body[0],
            Statement::Return(binary(
                BinaryOp::Sub,
                binary(BinaryOp::Sub, int(1), int(2)),
                int(3),
            ))
        );
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let source = parse("FUN main(): Integer DO RETURN 1 + 2 * 3; END").expect("parse failed");
        assert_eq!(
            source.functions[0].body[0],
            Statement::Return(binary(
                BinaryOp::Add,
                int(1),
                binary(BinaryOp::Mul, int(2), int(3)),
            ))
        );
    }

    #[test]
    fn power_parses_on_the_multiplicative_level() {
        let source = parse("FUN main(): Integer DO RETURN 2 ^ 3 * 4; END").expect("parse failed");
        assert_eq!(
            source.functions[0].body[0],
            Statement::Return(binary(
                BinaryOp::Mul,
                binary(BinaryOp::Pow, int(2), int(3)),
                int(4),
            ))
        );
    }

    #[test]
    fn parses_assignment_and_expression_statements() {
        let source = parse("FUN main() DO x = f(); g(x); END").expect("parse failed");
        assert_eq!(
            source.functions[0].body,
            vec![
                Statement::Assignment {
                    receiver: access("x"),
                    value: Expression::Call {
                        name: "f".to_string(),
                        arguments: vec![],
                    },
                },
                Statement::Expression(Expression::Call {
                    name: "g".to_string(),
                    arguments: vec![access("x")],
                }),
            ]
        );
    }

    #[test]
    fn parses_indexed_access() {
        let source = parse("FUN main() DO xs[1] = xs[0]; END").expect("parse failed");
        assert_eq!(
            source.functions[0].body[0],
            Statement::Assignment {
                receiver: Expression::Access {
                    name: "xs".to_string(),
                    offset: Some(Box::new(int(1))),
                },
                value: Expression::Access {
                    name: "xs".to_string(),
                    offset: Some(Box::new(int(0))),
                },
            }
        );
    }

    #[test]
    fn parses_switch_with_cases_and_default() {
        let source = parse(
            "FUN main() DO SWITCH x CASE 1: f(); CASE 2: g(); DEFAULT h(); END END",
        )
        .expect("parse failed");
        match &source.functions[0].body[0] {
            Statement::Switch { cases, .. } => {
                assert_eq!(cases.len(), 3);
                assert_eq!(cases[0].value, Some(int(1)));
                assert_eq!(cases[1].value, Some(int(2)));
                assert_eq!(cases[2].value, None);
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn expands_escapes_in_literals() {
        let source = parse(r#"FUN main() DO print("a\tb\\n"); x = '\n'; END"#)
            .expect("parse failed");
        assert_eq!(
            source.functions[0].body[0],
            Statement::Expression(Expression::Call {
                name: "print".to_string(),
                arguments: vec![Expression::Literal(Literal::String(
                    "a\tb\\n".to_string()
                ))],
            })
        );
        assert_eq!(
            source.functions[0].body[1],
            Statement::Assignment {
                receiver: access("x"),
                value: Expression::Literal(Literal::Character('\n')),
            }
        );
    }

    #[test]
    fn reports_offset_of_offending_token() {
        //               0123456789
        let error = parse("VAR x Integer = 1;").expect_err("expected parse error");
        assert_eq!(error.message, "Invalid mutable.");
        assert_eq!(error.index, 6);
    }

    #[test]
    fn reports_end_of_input_offset_when_exhausted() {
        // The block keeps looking for a statement until END; at end of
        // input the failure lands one byte past the final token.
        let error = parse("FUN main() DO RETURN 0;").expect_err("expected parse error");
        assert_eq!(error.message, "Invalid primary expression.");
        assert_eq!(error.index, 23);
    }

    #[test]
    fn rejects_trailing_tokens_after_functions() {
        let error = parse("FUN main() DO END VAR x: Integer;").expect_err("expected parse error");
        assert_eq!(error.message, "Not a global or function.");
        assert_eq!(error.index, 18);
    }

    #[test]
    fn empty_input_parses_to_empty_source() {
        let source = parse("").expect("parse failed");
        assert_eq!(source.globals, vec![]);
        assert_eq!(source.functions, vec![]);
    }
}
