//! Turns a flat token stream into a [`crate::ast::Statement`] list, one statement per
//! source line. Every statement keyword dispatches to its own small parse routine;
//! there is no operator-precedence machinery because nothing in this grammar needs it
//! (value expressions are "number" or "number `*` identifier", voltage expressions are
//! "identifier `-` identifier").

use crate::ast::*;
use crate::errors::ParseError;
use crate::lexer::{Spanned, Token};

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        self.skip_blank_lines();
        while !self.at_end() {
            statements.push(self.parse_statement()?);
            self.skip_blank_lines();
        }
        Ok(statements)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len() || self.tokens[self.pos..].iter().all(|s| s.token == Token::Newline)
    }

    fn skip_blank_lines(&mut self) {
        while matches!(self.peek_token(), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.line).unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_ident(&mut self, what: &'static str) -> Result<String, ParseError> {
        let line = self.line();
        match self.advance() {
            Some(Spanned { token: Token::Ident(s), .. }) => Ok(s),
            Some(other) => Err(ParseError::Expected(line, what, format!("{:?}", other.token))),
            None => Err(ParseError::UnexpectedEof(line)),
        }
    }

    fn expect_number(&mut self, what: &'static str) -> Result<f64, ParseError> {
        let line = self.line();
        match self.advance() {
            Some(Spanned { token: Token::Number(n), .. }) => Ok(n),
            Some(Spanned { token: Token::Minus, .. }) => {
                let n = self.expect_number(what)?;
                Ok(-n)
            }
            Some(other) => Err(ParseError::Expected(line, what, format!("{:?}", other.token))),
            None => Err(ParseError::UnexpectedEof(line)),
        }
    }

    fn expect(&mut self, token: Token, what: &'static str) -> Result<(), ParseError> {
        let line = self.line();
        match self.advance() {
            Some(s) if s.token == token => Ok(()),
            Some(other) => Err(ParseError::Expected(line, what, format!("{:?}", other.token))),
            None => Err(ParseError::UnexpectedEof(line)),
        }
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        match self.peek_token() {
            None | Some(Token::Newline) => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => {
                let line = self.line();
                Err(ParseError::Expected(line, "end of line", format!("{:?}", self.peek_token())))
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.line();
        let keyword = self.expect_ident("a statement keyword")?;
        match keyword.as_str() {
            "ground" => self.parse_ground(line),
            "voltage" => self.parse_voltage(line),
            "result" => self.parse_result(line),
            _ => {
                if let Some(kind) = DeviceKeyword::from_str(&keyword) {
                    self.parse_device(line, kind)
                } else {
                    Err(ParseError::UnknownStatement(line, keyword))
                }
            }
        }
    }

    fn parse_ground(&mut self, line: usize) -> Result<Statement, ParseError> {
        let node = self.expect_ident("a node name")?;
        self.end_of_statement()?;
        Ok(Statement::Ground(GroundStmt { line, node }))
    }

    fn parse_device(&mut self, line: usize, kind: DeviceKeyword) -> Result<Statement, ParseError> {
        let name = self.expect_ident("a device name")?;
        let from = self.expect_ident("the `from` terminal")?;
        let to = self.expect_ident("the `to` terminal")?;

        let mut output = None;
        let mut ctrl_plus = None;
        let mut ctrl_minus = None;
        let mut ctrl_probe = None;

        if kind == DeviceKeyword::OpAmp {
            output = Some(self.expect_ident("the op-amp output terminal")?);
        }
        if kind.has_sense_pair() || kind.has_probe_ref() {
            let ctrl = self.expect_ident("`ctrl`")?;
            if ctrl != "ctrl" {
                return Err(ParseError::Expected(line, "`ctrl`", ctrl));
            }
            if kind.has_sense_pair() {
                ctrl_plus = Some(self.expect_ident("the sense-pair plus terminal")?);
                ctrl_minus = Some(self.expect_ident("the sense-pair minus terminal")?);
            } else {
                ctrl_probe = Some(self.expect_ident("the referenced probe's name")?);
            }
        }

        let value = if kind.has_value() && matches!(self.peek_token(), Some(Token::Eq)) {
            self.advance();
            Some(self.parse_value_expr()?)
        } else {
            None
        };

        self.end_of_statement()?;
        Ok(Statement::Device(DeviceStmt {
            line,
            kind,
            name,
            from,
            to,
            output,
            ctrl_plus,
            ctrl_minus,
            ctrl_probe,
            value,
        }))
    }

    /// `<number>` or `<number> * <deviceName>`.
    fn parse_value_expr(&mut self) -> Result<ValueExpr, ParseError> {
        let factor = self.expect_number("a value or a relation factor")?;
        if matches!(self.peek_token(), Some(Token::Star)) {
            self.advance();
            let other = self.expect_ident("the referenced device's name")?;
            Ok(ValueExpr::RelationTo { factor, other })
        } else {
            Ok(ValueExpr::Literal(factor))
        }
    }

    /// `voltage <name> = <plusNode> - <minusNode>`.
    fn parse_voltage(&mut self, line: usize) -> Result<Statement, ParseError> {
        let name = self.expect_ident("a user-defined voltage name")?;
        self.expect(Token::Eq, "`=`")?;
        let plus = self.expect_ident("the plus node")?;
        self.expect(Token::Minus, "`-`")?;
        let minus = self.expect_ident("the minus node")?;
        self.end_of_statement()?;
        Ok(Statement::Voltage(VoltageStmt { line, name, plus, minus }))
    }

    /// `result <name> = <dependent> [, <dependent> ...] [/ <independent>]`.
    fn parse_result(&mut self, line: usize) -> Result<Statement, ParseError> {
        let name = self.expect_ident("a result name")?;
        self.expect(Token::Eq, "`=`")?;
        let mut dependents = vec![self.expect_ident("a dependent name")?];
        while matches!(self.peek_token(), Some(Token::Comma)) {
            self.advance();
            dependents.push(self.expect_ident("a dependent name")?);
        }
        let independent = if matches!(self.peek_token(), Some(Token::Slash)) {
            self.advance();
            Some(self.expect_ident("an independent name")?)
        } else {
            None
        };
        self.end_of_statement()?;
        Ok(Statement::Result(ResultStmt { line, name, dependents, independent }))
    }
}
