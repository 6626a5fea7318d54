//! Hand-written lexer over the netlist grammar (no parser-generator dependency — the
//! grammar is small and line-oriented, closer to a config format than an expression
//! language, so a generated parser would cost more than it saves).

use crate::errors::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Eq,
    Star,
    Slash,
    Minus,
    Comma,
    Newline,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { chars: source.char_indices().peekable(), source, line: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut out = Vec::new();
        while let Some(&(start, ch)) = self.chars.peek() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.chars.next();
                }
                '\n' => {
                    self.chars.next();
                    if out.last().map(|s: &Spanned| s.token != Token::Newline).unwrap_or(false) {
                        out.push(Spanned { token: Token::Newline, line: self.line });
                    }
                    self.line += 1;
                }
                '#' => self.skip_line_comment(),
                '/' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '/'))) {
                        self.chars.next();
                        self.skip_line_comment();
                    } else {
                        out.push(Spanned { token: Token::Slash, line: self.line });
                    }
                }
                '=' => {
                    self.chars.next();
                    out.push(Spanned { token: Token::Eq, line: self.line });
                }
                '*' => {
                    self.chars.next();
                    out.push(Spanned { token: Token::Star, line: self.line });
                }
                ',' => {
                    self.chars.next();
                    out.push(Spanned { token: Token::Comma, line: self.line });
                }
                '-' if !self.next_is_digit_after_minus() => {
                    self.chars.next();
                    out.push(Spanned { token: Token::Minus, line: self.line });
                }
                c if c.is_ascii_digit() || c == '-' => {
                    let tok = self.lex_number(start)?;
                    out.push(Spanned { token: tok, line: self.line });
                }
                c if c.is_alphabetic() || c == '_' => {
                    let tok = self.lex_ident(start);
                    out.push(Spanned { token: tok, line: self.line });
                }
                other => return Err(ParseError::UnexpectedChar(self.line, other)),
            }
        }
        out.push(Spanned { token: Token::Newline, line: self.line });
        Ok(out)
    }

    /// `-` only begins a number when immediately followed by a digit; otherwise it's
    /// the binary/unary minus used in `voltage` difference expressions.
    fn next_is_digit_after_minus(&mut self) -> bool {
        let mut clone = self.chars.clone();
        clone.next();
        matches!(clone.peek(), Some((_, c)) if c.is_ascii_digit())
    }

    fn skip_line_comment(&mut self) {
        for (_, c) in self.chars.by_ref() {
            if c == '\n' {
                self.line += 1;
                break;
            }
        }
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut end = start;
        let mut just_saw_exponent_marker = false;
        if matches!(self.chars.peek(), Some((_, '-'))) {
            end += 1;
            self.chars.next();
        }
        while let Some(&(idx, c)) = self.chars.peek() {
            let take = c.is_ascii_digit()
                || c == '.'
                || ((c == 'e' || c == 'E') && !just_saw_exponent_marker)
                || ((c == '+' || c == '-') && just_saw_exponent_marker);
            if !take {
                break;
            }
            just_saw_exponent_marker = c == 'e' || c == 'E';
            end = idx + c.len_utf8();
            self.chars.next();
        }
        let text = &self.source[start..end];
        text.parse::<f64>().map(Token::Number).map_err(|_| ParseError::BadNumber(self.line, text.to_string()))
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                end = idx + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Ident(self.source[start..end].to_string())
    }
}
