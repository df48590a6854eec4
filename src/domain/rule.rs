//! Script AST.
//!
//! A script is a list of bindings. Each bound value is either a numeric
//! series expression ([`NumExpr`]) or a boolean rule ([`Rule`]). References
//! to earlier bindings are inlined by the parser, so a compiled tree never
//! contains names.

use crate::domain::indicator::IndicatorKind;
use std::fmt;

/// Per-bar price fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
    Amount,
}

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "open" => Field::Open,
            "high" => Field::High,
            "low" => Field::Low,
            "close" => Field::Close,
            "volume" => Field::Volume,
            "amount" => Field::Amount,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
            Field::Amount => "amount",
        }
    }
}

/// Values taken from the security snapshot, constant across bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Snapshot {
    Price,
    Turnover,
    FloatValue,
    TotalValue,
}

impl Snapshot {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "price" => Snapshot::Price,
            "turnover" => Snapshot::Turnover,
            "float_value" => Snapshot::FloatValue,
            "total_value" => Snapshot::TotalValue,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Snapshot::Price => "price",
            Snapshot::Turnover => "turnover",
            Snapshot::FloatValue => "float_value",
            Snapshot::TotalValue => "total_value",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacdField {
    Line,
    Signal,
    Histogram,
}

impl MacdField {
    pub fn keyword(&self) -> &'static str {
        match self {
            MacdField::Line => "MACD_LINE",
            MacdField::Signal => "MACD_SIGNAL",
            MacdField::Histogram => "MACD_HISTOGRAM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            // x / 0 is NaN so the comparison using it fails instead of
            // firing on an infinity.
            BinOp::Div if b == 0.0 => f64::NAN,
            BinOp::Div => a / b,
        }
    }

    fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumExpr {
    Field(Field),
    Snapshot(Snapshot),
    Constant(f64),
    Indicator {
        kind: IndicatorKind,
        source: Box<NumExpr>,
    },
    Atr(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
        field: MacdField,
    },
    /// Value `bars` bars before the current one.
    Prev {
        expr: Box<NumExpr>,
        bars: usize,
    },
    Binary {
        op: BinOp,
        left: Box<NumExpr>,
        right: Box<NumExpr>,
    },
    Neg(Box<NumExpr>),
}

impl NumExpr {
    /// Daily bars needed before the expression has a value at the last bar.
    pub fn lookback(&self) -> usize {
        match self {
            NumExpr::Field(_) | NumExpr::Snapshot(_) | NumExpr::Constant(_) => 1,
            NumExpr::Indicator { kind, source } => {
                source.lookback().saturating_add(kind.warmup()) - 1
            }
            NumExpr::Atr(n) => (*n).max(1),
            NumExpr::Macd {
                fast, slow, signal, ..
            } => (*fast).max(*slow).max(1).saturating_add((*signal).max(1)) - 1,
            NumExpr::Prev { expr, bars } => expr.lookback().saturating_add(*bars),
            NumExpr::Binary { left, right, .. } => left.lookback().max(right.lookback()),
            NumExpr::Neg(inner) => inner.lookback(),
        }
    }
}

impl fmt::Display for NumExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumExpr::Field(field) => write!(f, "{}", field.name()),
            NumExpr::Snapshot(snap) => write!(f, "{}", snap.name()),
            NumExpr::Constant(v) => write!(f, "{}", v),
            NumExpr::Indicator { kind, source } => {
                if **source == NumExpr::Field(Field::Close) {
                    write!(f, "{}", kind)
                } else {
                    let name = kind.to_string();
                    let keyword = name.split('(').next().unwrap_or_default();
                    write!(f, "{}({}, {})", keyword, source, kind.period())
                }
            }
            NumExpr::Atr(n) => write!(f, "ATR({})", n),
            NumExpr::Macd {
                fast,
                slow,
                signal,
                field,
            } => write!(f, "{}({}, {}, {})", field.keyword(), fast, slow, signal),
            NumExpr::Prev { expr, bars } => write!(f, "PREV({}, {})", expr, bars),
            NumExpr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            NumExpr::Neg(inner) => write!(f, "-({})", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Const(bool),
    CrossAbove { left: NumExpr, right: NumExpr },
    CrossBelow { left: NumExpr, right: NumExpr },
    Above { left: NumExpr, right: NumExpr },
    Below { left: NumExpr, right: NumExpr },
    Equals { left: NumExpr, right: NumExpr },
    Between {
        operand: NumExpr,
        lower: NumExpr,
        upper: NumExpr,
    },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
    Consecutive { rule: Box<Rule>, count: usize },
    AnyOf { rule: Box<Rule>, count: usize },
    /// Strictly increasing across each of the last `bars` steps.
    Rising { expr: NumExpr, bars: usize },
    CodeIn(Vec<String>),
    CodePrefix(Vec<String>),
}

impl Rule {
    pub fn lookback(&self) -> usize {
        match self {
            Rule::Const(_) | Rule::CodeIn(_) | Rule::CodePrefix(_) => 1,
            Rule::CrossAbove { left, right } | Rule::CrossBelow { left, right } => {
                left.lookback().max(right.lookback()).saturating_add(1)
            }
            Rule::Above { left, right }
            | Rule::Below { left, right }
            | Rule::Equals { left, right } => left.lookback().max(right.lookback()),
            Rule::Between {
                operand,
                lower,
                upper,
            } => operand
                .lookback()
                .max(lower.lookback())
                .max(upper.lookback()),
            Rule::And(rules) | Rule::Or(rules) => {
                rules.iter().map(Rule::lookback).max().unwrap_or(1)
            }
            Rule::Not(rule) => rule.lookback(),
            Rule::Consecutive { rule, count } | Rule::AnyOf { rule, count } => {
                rule.lookback().saturating_add(count.saturating_sub(1))
            }
            Rule::Rising { expr, bars } => expr.lookback().saturating_add(*bars),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_quoted(f: &mut fmt::Formatter<'_>, items: &[String]) -> fmt::Result {
    let quoted: Vec<String> = items.iter().map(|s| format!("\"{}\"", s)).collect();
    write_list(f, &quoted)
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Const(true) => write!(f, "TRUE"),
            Rule::Const(false) => write!(f, "FALSE"),
            Rule::CrossAbove { left, right } => write!(f, "CROSS_ABOVE({}, {})", left, right),
            Rule::CrossBelow { left, right } => write!(f, "CROSS_BELOW({}, {})", left, right),
            Rule::Above { left, right } => write!(f, "ABOVE({}, {})", left, right),
            Rule::Below { left, right } => write!(f, "BELOW({}, {})", left, right),
            Rule::Equals { left, right } => write!(f, "EQUALS({}, {})", left, right),
            Rule::Between {
                operand,
                lower,
                upper,
            } => write!(f, "BETWEEN({}, {}, {})", operand, lower, upper),
            Rule::And(rules) => {
                write!(f, "AND(")?;
                write_list(f, rules)?;
                write!(f, ")")
            }
            Rule::Or(rules) => {
                write!(f, "OR(")?;
                write_list(f, rules)?;
                write!(f, ")")
            }
            Rule::Not(rule) => write!(f, "NOT({})", rule),
            Rule::Consecutive { rule, count } => write!(f, "CONSECUTIVE({}, {})", rule, count),
            Rule::AnyOf { rule, count } => write!(f, "ANY_OF({}, {})", rule, count),
            Rule::Rising { expr, bars } => write!(f, "RISING({}, {})", expr, bars),
            Rule::CodeIn(codes) => {
                write!(f, "CODE_IN(")?;
                write_quoted(f, codes)?;
                write!(f, ")")
            }
            Rule::CodePrefix(prefixes) => {
                write!(f, "CODE_PREFIX(")?;
                write_quoted(f, prefixes)?;
                write!(f, ")")
            }
        }
    }
}

/// A bound script value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(NumExpr),
    Bool(Rule),
}

impl Expr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Num(_) => "a number",
            Expr::Bool(_) => "a signal",
        }
    }
}

/// A parsed script: bindings in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub bindings: Vec<(String, Expr)>,
}

impl Script {
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, expr)| expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close() -> NumExpr {
        NumExpr::Field(Field::Close)
    }

    fn sma(n: usize, source: NumExpr) -> NumExpr {
        NumExpr::Indicator {
            kind: IndicatorKind::Sma(n),
            source: Box::new(source),
        }
    }

    #[test]
    fn display_omits_default_source() {
        assert_eq!(sma(20, close()).to_string(), "SMA(20)");
        assert_eq!(
            sma(5, NumExpr::Field(Field::Volume)).to_string(),
            "SMA(volume, 5)"
        );
    }

    #[test]
    fn display_rules() {
        let rule = Rule::And(vec![
            Rule::CrossAbove {
                left: sma(5, close()),
                right: sma(20, close()),
            },
            Rule::CodePrefix(vec!["sh6".into(), "sz0".into()]),
        ]);
        assert_eq!(
            rule.to_string(),
            r#"AND(CROSS_ABOVE(SMA(5), SMA(20)), CODE_PREFIX("sh6", "sz0"))"#
        );
    }

    #[test]
    fn lookback_of_nested_indicators() {
        assert_eq!(sma(20, close()).lookback(), 20);
        // SMA(SMA(close, 2), 2) is first valid at the third bar
        assert_eq!(sma(2, sma(2, close())).lookback(), 3);
        let macd = NumExpr::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
            field: MacdField::Signal,
        };
        assert_eq!(macd.lookback(), 34);
    }

    #[test]
    fn lookback_of_temporal_rules() {
        let above = Rule::Above {
            left: close(),
            right: sma(10, close()),
        };
        assert_eq!(above.lookback(), 10);
        let cross = Rule::CrossAbove {
            left: close(),
            right: sma(10, close()),
        };
        assert_eq!(cross.lookback(), 11);
        let streak = Rule::Consecutive {
            rule: Box::new(above),
            count: 3,
        };
        assert_eq!(streak.lookback(), 12);
        let rising = Rule::Rising {
            expr: close(),
            bars: 3,
        };
        assert_eq!(rising.lookback(), 4);
        assert_eq!(Rule::CodeIn(vec!["sh600000".into()]).lookback(), 1);
    }

    #[test]
    fn lookback_saturates() {
        let far = NumExpr::Prev {
            expr: Box::new(close()),
            bars: usize::MAX,
        };
        assert_eq!(far.lookback(), usize::MAX);
        let rising = Rule::Rising {
            expr: far,
            bars: usize::MAX,
        };
        assert_eq!(rising.lookback(), usize::MAX);
    }

    #[test]
    fn division_by_zero_is_nan() {
        assert!(BinOp::Div.apply(1.0, 0.0).is_nan());
        assert_eq!(BinOp::Sub.apply(5.0, 2.0), 3.0);
    }

    #[test]
    fn script_lookup_by_name() {
        let script = Script {
            bindings: vec![
                ("fast".into(), Expr::Num(sma(5, close()))),
                ("signal".into(), Expr::Bool(Rule::Const(true))),
            ],
        };
        assert!(matches!(script.get("signal"), Some(Expr::Bool(_))));
        assert_eq!(script.get("fast").map(Expr::type_name), Some("a number"));
        assert!(script.get("slow").is_none());
    }
}
