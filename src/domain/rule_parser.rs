//! Script parser.
//!
//! Recursive descent over the binding grammar:
//!
//! ```text
//! script  := (binding (('\n' | ';') binding)*)?
//! binding := IDENT '=' (rule | sum)
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := '-' unary | atom
//! atom    := NUMBER | '(' sum ')' | field | snapshot | indicator | PREV(sum, n) | IDENT
//! ```
//!
//! `#` starts a comment that runs to the end of the line. Newlines inside
//! parentheses are whitespace. Errors carry the byte offset of the
//! offending token.

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::rule::{BinOp, Expr, Field, MacdField, NumExpr, Rule, Script, Snapshot};
use std::collections::HashMap;

/// Largest accepted period or bar offset.
pub const MAX_PERIOD: usize = 100_000;

const RULE_KEYWORDS: &[&str] = &[
    "TRUE",
    "FALSE",
    "CROSS_ABOVE",
    "CROSS_BELOW",
    "ABOVE",
    "BELOW",
    "EQUALS",
    "BETWEEN",
    "AND",
    "OR",
    "NOT",
    "CONSECUTIVE",
    "ANY_OF",
    "RISING",
    "CODE_IN",
    "CODE_PREFIX",
];

const NUM_KEYWORDS: &[&str] = &[
    "SMA",
    "EMA",
    "WMA",
    "RSI",
    "ROC",
    "STDDEV",
    "ATR",
    "MACD_LINE",
    "MACD_SIGNAL",
    "MACD_HISTOGRAM",
    "PREV",
];

fn is_reserved(word: &str) -> bool {
    RULE_KEYWORDS.contains(&word)
        || NUM_KEYWORDS.contains(&word)
        || Field::from_name(word).is_some()
        || Snapshot::from_name(word).is_some()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    bindings: HashMap<String, Expr>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            bindings: HashMap::new(),
        }
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Skips blanks and comments; newlines only inside parentheses.
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                '#' => self.skip_comment(),
                '\n' if self.depth == 0 => break,
                c if c.is_whitespace() => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// Skips everything up to the next token, newlines included.
    fn skip_all(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                '#' => self.skip_comment(),
                c if c.is_whitespace() => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            None => "end of input".to_string(),
            Some('\n') => "end of line".to_string(),
            Some(_) => format!("'{}'", self.peek_word()),
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                match expected {
                    '(' => self.depth += 1,
                    ')' => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                Ok(())
            }
            _ => Err(self.error(
                format!("expected '{}', found {}", expected, self.describe_next()),
                self.pos,
            )),
        }
    }

    fn peek_char_is(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        self.peek() == Some(expected)
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            self.peek().map(|c| c.to_string()).unwrap_or_default()
        } else {
            word
        }
    }

    fn take_ident(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => {
                return Err(self.error(
                    format!("expected identifier, found {}", self.describe_next()),
                    start,
                ));
            }
        }
        let word = self.peek_word();
        self.pos += word.len();
        Ok(word)
    }

    fn parse_integer(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let digits: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return Err(self.error(
                format!("expected integer, found {}", self.describe_next()),
                start,
            ));
        }
        self.pos += digits.len();
        match digits.parse::<usize>() {
            Ok(n) if n <= MAX_PERIOD => Ok(n),
            _ => Err(self.error(
                format!("integer {} exceeds the limit of {}", digits, MAX_PERIOD),
                start,
            )),
        }
    }

    fn parse_period(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let n = self.parse_integer()?;
        if n == 0 {
            return Err(self.error("period must be positive", start));
        }
        Ok(n)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        if digits == 0 {
            return Err(self.error("expected number", start));
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {}", text), start))
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.peek() != Some('"') {
            return Err(self.error(
                format!("expected string, found {}", self.describe_next()),
                start,
            ));
        }
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(value),
                Some('\n') | None => return Err(self.error("unterminated string", start)),
                Some(c) => value.push(c),
            }
        }
    }

    // ---- numeric expressions ----

    fn parse_sum(&mut self) -> Result<NumExpr, ParseError> {
        let mut left = self.parse_product()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_product()?;
            left = NumExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_product(&mut self) -> Result<NumExpr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = NumExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<NumExpr, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('-') {
            self.advance();
            return Ok(match self.parse_unary()? {
                NumExpr::Constant(v) => NumExpr::Constant(-v),
                other => NumExpr::Neg(Box::new(other)),
            });
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<NumExpr, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_digit() || c == '.' => {
                return Ok(NumExpr::Constant(self.parse_number()?));
            }
            Some('(') => {
                self.expect_char('(')?;
                let inner = self.parse_sum()?;
                self.expect_char(')')?;
                return Ok(inner);
            }
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => {
                return Err(self.error(
                    format!("expected number or series, found {}", self.describe_next()),
                    start,
                ));
            }
        }

        let word = self.take_ident()?;
        if let Some(field) = Field::from_name(&word) {
            return Ok(NumExpr::Field(field));
        }
        if let Some(snap) = Snapshot::from_name(&word) {
            return Ok(NumExpr::Snapshot(snap));
        }
        match word.as_str() {
            "SMA" => self.parse_indicator(IndicatorKind::Sma),
            "EMA" => self.parse_indicator(IndicatorKind::Ema),
            "WMA" => self.parse_indicator(IndicatorKind::Wma),
            "RSI" => self.parse_indicator(IndicatorKind::Rsi),
            "ROC" => self.parse_indicator(IndicatorKind::Roc),
            "STDDEV" => self.parse_indicator(IndicatorKind::Stddev),
            "ATR" => {
                self.expect_char('(')?;
                let n = self.parse_period()?;
                self.expect_char(')')?;
                Ok(NumExpr::Atr(n))
            }
            "MACD_LINE" => self.parse_macd(MacdField::Line),
            "MACD_SIGNAL" => self.parse_macd(MacdField::Signal),
            "MACD_HISTOGRAM" => self.parse_macd(MacdField::Histogram),
            "PREV" => {
                self.expect_char('(')?;
                let expr = self.parse_sum()?;
                self.expect_char(',')?;
                let bars = self.parse_integer()?;
                self.expect_char(')')?;
                Ok(NumExpr::Prev {
                    expr: Box::new(expr),
                    bars,
                })
            }
            _ => match self.bindings.get(&word) {
                Some(Expr::Num(expr)) => Ok(expr.clone()),
                Some(Expr::Bool(_)) => Err(self.error(
                    format!("'{}' is a signal, expected a number", word),
                    start,
                )),
                None if RULE_KEYWORDS.contains(&word.as_str()) => Err(self.error(
                    format!("'{}' is a signal, expected a number", word),
                    start,
                )),
                None => Err(self.error(format!("unknown identifier '{}'", word), start)),
            },
        }
    }

    /// `NAME(n)` over close, or `NAME(source, n)`.
    fn parse_indicator(
        &mut self,
        make: fn(usize) -> IndicatorKind,
    ) -> Result<NumExpr, ParseError> {
        self.expect_char('(')?;
        let first_pos = self.pos;
        let first = self.parse_sum()?;
        let (source, period) = if self.peek_char_is(')') {
            match first {
                NumExpr::Constant(v) if v >= 1.0 && v.fract() == 0.0 => {
                    (NumExpr::Field(Field::Close), v as usize)
                }
                _ => return Err(self.error("expected positive integer period", first_pos)),
            }
        } else {
            self.expect_char(',')?;
            (first, self.parse_period()?)
        };
        self.expect_char(')')?;
        Ok(NumExpr::Indicator {
            kind: make(period),
            source: Box::new(source),
        })
    }

    fn parse_macd(&mut self, field: MacdField) -> Result<NumExpr, ParseError> {
        self.expect_char('(')?;
        let fast = self.parse_period()?;
        self.expect_char(',')?;
        let slow = self.parse_period()?;
        self.expect_char(',')?;
        let signal = self.parse_period()?;
        self.expect_char(')')?;
        Ok(NumExpr::Macd {
            fast,
            slow,
            signal,
            field,
        })
    }

    // ---- rules ----

    fn starts_rule(&mut self) -> bool {
        self.skip_whitespace();
        let word = self.peek_word();
        RULE_KEYWORDS.contains(&word.as_str())
            || matches!(self.bindings.get(&word), Some(Expr::Bool(_)))
    }

    fn parse_pair(&mut self) -> Result<(NumExpr, NumExpr), ParseError> {
        self.expect_char('(')?;
        let left = self.parse_sum()?;
        self.expect_char(',')?;
        let right = self.parse_sum()?;
        self.expect_char(')')?;
        Ok((left, right))
    }

    fn parse_rule_list(&mut self, keyword: &str, start: usize) -> Result<Vec<Rule>, ParseError> {
        self.expect_char('(')?;
        let mut rules = vec![self.parse_rule()?];
        while !self.peek_char_is(')') {
            self.expect_char(',')?;
            rules.push(self.parse_rule()?);
        }
        self.expect_char(')')?;
        if rules.len() < 2 {
            return Err(self.error(format!("{} requires at least 2 rules", keyword), start));
        }
        Ok(rules)
    }

    fn parse_windowed(&mut self) -> Result<(Box<Rule>, usize), ParseError> {
        self.expect_char('(')?;
        let rule = self.parse_rule()?;
        self.expect_char(',')?;
        let count = self.parse_period()?;
        self.expect_char(')')?;
        Ok((Box::new(rule), count))
    }

    fn parse_strings(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_char('(')?;
        let mut items = vec![self.parse_string()?];
        while !self.peek_char_is(')') {
            self.expect_char(',')?;
            items.push(self.parse_string()?);
        }
        self.expect_char(')')?;
        Ok(items)
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.peek_word();
        if !self.starts_rule() {
            let found = if word.is_empty() {
                "end of input".to_string()
            } else {
                format!("'{}'", word)
            };
            return Err(self.error(format!("expected rule, found {}", found), start));
        }
        self.pos += word.len();

        match word.as_str() {
            "TRUE" => Ok(Rule::Const(true)),
            "FALSE" => Ok(Rule::Const(false)),
            "CROSS_ABOVE" => {
                let (left, right) = self.parse_pair()?;
                Ok(Rule::CrossAbove { left, right })
            }
            "CROSS_BELOW" => {
                let (left, right) = self.parse_pair()?;
                Ok(Rule::CrossBelow { left, right })
            }
            "ABOVE" => {
                let (left, right) = self.parse_pair()?;
                Ok(Rule::Above { left, right })
            }
            "BELOW" => {
                let (left, right) = self.parse_pair()?;
                Ok(Rule::Below { left, right })
            }
            "EQUALS" => {
                let (left, right) = self.parse_pair()?;
                Ok(Rule::Equals { left, right })
            }
            "BETWEEN" => {
                self.expect_char('(')?;
                let operand = self.parse_sum()?;
                self.expect_char(',')?;
                let lower = self.parse_sum()?;
                self.expect_char(',')?;
                let upper = self.parse_sum()?;
                self.expect_char(')')?;
                Ok(Rule::Between {
                    operand,
                    lower,
                    upper,
                })
            }
            "AND" => Ok(Rule::And(self.parse_rule_list("AND", start)?)),
            "OR" => Ok(Rule::Or(self.parse_rule_list("OR", start)?)),
            "NOT" => {
                self.expect_char('(')?;
                let rule = self.parse_rule()?;
                self.expect_char(')')?;
                Ok(Rule::Not(Box::new(rule)))
            }
            "CONSECUTIVE" => {
                let (rule, count) = self.parse_windowed()?;
                Ok(Rule::Consecutive { rule, count })
            }
            "ANY_OF" => {
                let (rule, count) = self.parse_windowed()?;
                Ok(Rule::AnyOf { rule, count })
            }
            "RISING" => {
                self.expect_char('(')?;
                let expr = self.parse_sum()?;
                self.expect_char(',')?;
                let bars = self.parse_period()?;
                self.expect_char(')')?;
                Ok(Rule::Rising { expr, bars })
            }
            "CODE_IN" => Ok(Rule::CodeIn(self.parse_strings()?)),
            "CODE_PREFIX" => Ok(Rule::CodePrefix(self.parse_strings()?)),
            _ => match self.bindings.get(&word) {
                Some(Expr::Bool(rule)) => Ok(rule.clone()),
                _ => Err(self.error(format!("unknown identifier '{}'", word), start)),
            },
        }
    }

    // ---- bindings ----

    fn parse_binding(&mut self) -> Result<(String, Expr), ParseError> {
        let start = self.pos;
        let name = self.take_ident()?;
        if is_reserved(&name) {
            return Err(self.error(format!("'{}' is a reserved name", name), start));
        }
        if self.bindings.contains_key(&name) {
            return Err(self.error(format!("'{}' is already bound", name), start));
        }
        self.expect_char('=')?;
        let expr = if self.starts_rule() {
            Expr::Bool(self.parse_rule()?)
        } else {
            Expr::Num(self.parse_sum()?)
        };
        Ok((name, expr))
    }

    fn parse(&mut self) -> Result<Script, ParseError> {
        let mut script = Script::default();
        self.skip_all();
        while self.pos < self.input.len() {
            let (name, expr) = self.parse_binding()?;
            self.bindings.insert(name.clone(), expr.clone());
            script.bindings.push((name, expr));

            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('\n') | Some(';') => {
                    self.advance();
                    self.skip_all();
                }
                Some(_) => {
                    return Err(self.error(
                        format!("unexpected {} after binding", self.describe_next()),
                        self.pos,
                    ));
                }
            }
        }
        Ok(script)
    }
}

/// Parses a whole script into its bindings.
pub fn parse_script(input: &str) -> Result<Script, ParseError> {
    Parser::new(input).parse()
}

/// Parses a single rule expression, e.g. `ABOVE(close, SMA(20))`.
pub fn parse_rule(input: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser::new(input);
    parser.depth = 1;
    let rule = parser.parse_rule()?;
    parser.skip_all();
    if parser.pos < input.len() {
        return Err(parser.error(
            format!("unexpected input after rule: '{}'", parser.remaining()),
            parser.pos,
        ));
    }
    Ok(rule)
}
