//! Rule evaluation engine.
//!
//! Numeric expressions are evaluated into whole series over the daily bars,
//! memoized per expression, and rules are then checked at a bar index.
//!
//! # Evaluation Semantics
//!
//! - Comparisons read both sides at the given bar; a NaN side is `false`
//! - `CROSS_ABOVE`/`CROSS_BELOW`: require `index >= 1`
//! - `AND` / `OR` short-circuit
//! - `CONSECUTIVE(rule, N)`: child true on each of the N bars ending here
//! - `ANY_OF(rule, N)`: child true at least once in the last N bars
//! - `RISING(x, N)`: x strictly increased on each of the last N steps

use crate::domain::indicator::{atr, macd};
use crate::domain::info::Info;
use crate::domain::kline::Kline;
use crate::domain::rule::{Field, MacdField, NumExpr, Rule, Snapshot};
use std::collections::HashMap;
use std::rc::Rc;

const EPSILON: f64 = 1e-9;

/// Evaluates `rule` at the last bar of `day`.
pub fn evaluate(rule: &Rule, info: &Info, day: &[Kline]) -> bool {
    Evaluator::new(info, day).signal(rule)
}

pub struct Evaluator<'a> {
    info: &'a Info,
    day: &'a [Kline],
    cache: HashMap<String, Rc<[f64]>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(info: &'a Info, day: &'a [Kline]) -> Self {
        Self {
            info,
            day,
            cache: HashMap::new(),
        }
    }

    pub fn signal(&mut self, rule: &Rule) -> bool {
        match self.day.len() {
            0 => false,
            n => self.rule_at(rule, n - 1),
        }
    }

    /// Full series for a numeric expression, one value per daily bar.
    pub fn series(&mut self, expr: &NumExpr) -> Rc<[f64]> {
        let key = expr.to_string();
        if let Some(cached) = self.cache.get(&key) {
            return Rc::clone(cached);
        }
        let n = self.day.len();
        let values: Vec<f64> = match expr {
            NumExpr::Field(field) => self.day.iter().map(|k| field_value(k, *field)).collect(),
            NumExpr::Snapshot(snap) => vec![snapshot_value(self.info, *snap); n],
            NumExpr::Constant(v) => vec![*v; n],
            NumExpr::Indicator { kind, source } => {
                let source = self.series(source);
                kind.compute(&source)
            }
            NumExpr::Atr(period) => atr(self.day, *period),
            NumExpr::Macd {
                fast,
                slow,
                signal,
                field,
            } => {
                let close = self.series(&NumExpr::Field(Field::Close));
                let m = macd(&close, *fast, *slow, *signal);
                match field {
                    MacdField::Line => m.line,
                    MacdField::Signal => m.signal,
                    MacdField::Histogram => m.histogram,
                }
            }
            NumExpr::Prev { expr, bars } => {
                let inner = self.series(expr);
                (0..n)
                    .map(|i| if i >= *bars { inner[i - bars] } else { f64::NAN })
                    .collect()
            }
            NumExpr::Binary { op, left, right } => {
                let l = self.series(left);
                let r = self.series(right);
                l.iter().zip(r.iter()).map(|(a, b)| op.apply(*a, *b)).collect()
            }
            NumExpr::Neg(inner) => self.series(inner).iter().map(|v| -v).collect(),
        };
        let series: Rc<[f64]> = values.into();
        self.cache.insert(key, Rc::clone(&series));
        series
    }

    fn value(&mut self, expr: &NumExpr, index: usize) -> f64 {
        self.series(expr).get(index).copied().unwrap_or(f64::NAN)
    }

    pub fn rule_at(&mut self, rule: &Rule, index: usize) -> bool {
        match rule {
            Rule::Const(value) => *value,
            Rule::CrossAbove { left, right } => {
                if index == 0 {
                    return false;
                }
                let (lc, rc) = (self.value(left, index), self.value(right, index));
                let (lp, rp) = (self.value(left, index - 1), self.value(right, index - 1));
                lc > rc && lp <= rp
            }
            Rule::CrossBelow { left, right } => {
                if index == 0 {
                    return false;
                }
                let (lc, rc) = (self.value(left, index), self.value(right, index));
                let (lp, rp) = (self.value(left, index - 1), self.value(right, index - 1));
                lc < rc && lp >= rp
            }
            Rule::Above { left, right } => self.value(left, index) > self.value(right, index),
            Rule::Below { left, right } => self.value(left, index) < self.value(right, index),
            Rule::Equals { left, right } => {
                (self.value(left, index) - self.value(right, index)).abs() < EPSILON
            }
            Rule::Between {
                operand,
                lower,
                upper,
            } => {
                let v = self.value(operand, index);
                v >= self.value(lower, index) && v <= self.value(upper, index)
            }
            Rule::And(rules) => rules.iter().all(|r| self.rule_at(r, index)),
            Rule::Or(rules) => rules.iter().any(|r| self.rule_at(r, index)),
            Rule::Not(inner) => !self.rule_at(inner, index),
            Rule::Consecutive { rule, count } => {
                if index + 1 < *count {
                    return false;
                }
                ((index + 1 - *count)..=index).all(|i| self.rule_at(rule, i))
            }
            Rule::AnyOf { rule, count } => {
                let start = index.saturating_sub(count.saturating_sub(1));
                (start..=index).any(|i| self.rule_at(rule, i))
            }
            Rule::Rising { expr, bars } => {
                if index < *bars {
                    return false;
                }
                let s = self.series(expr);
                (0..*bars).all(|k| s[index - k] > s[index - k - 1])
            }
            Rule::CodeIn(codes) => codes.iter().any(|c| *c == self.info.code),
            Rule::CodePrefix(prefixes) => prefixes.iter().any(|p| self.info.code.starts_with(p)),
        }
    }
}

fn field_value(bar: &Kline, field: Field) -> f64 {
    match field {
        Field::Open => bar.open,
        Field::High => bar.high,
        Field::Low => bar.low,
        Field::Close => bar.close,
        Field::Volume => bar.volume as f64,
        Field::Amount => bar.amount,
    }
}

fn snapshot_value(info: &Info, snap: Snapshot) -> f64 {
    match snap {
        Snapshot::Price => info.price,
        Snapshot::Turnover => info.turnover,
        Snapshot::FloatValue => info.float_value,
        Snapshot::TotalValue => info.total_value,
    }
}
