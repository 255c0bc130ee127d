//! Sandboxed arithmetic formulas for derived variables.
//!
//! A formula is parsed into an [`Expr`] tree and compiled into a closed
//! [`Node`] tree. Compilation is the only validation step: every call
//! target must resolve to a [`Function`], so a compiled formula cannot
//! reach anything outside the allow-list. Evaluation only ever sees
//! numbers bound from the current record.

use crate::data::{coerce_number, Record};
use crate::error::{ChartError, Result};
use crate::parser::{parse_assignment_complete, parse_expression, BinaryOp, Expr, UnaryOp};
use serde_json::Value;
use std::f64::consts::{E, PI, TAU};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::Range(lo, hi) => (lo..=hi).contains(&n),
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Exact(k) => write!(f, "{}", k),
            Arity::Range(lo, hi) => write!(f, "{} to {}", lo, hi),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

/// Functions a formula may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Min,
    Max,
    Round,
    Sqrt,
    Exp,
    Expm1,
    Log,
    Log2,
    Log10,
    Log1p,
    Pow,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Ceil,
    Floor,
    Trunc,
    Fabs,
    Fmod,
    Hypot,
    Degrees,
    Radians,
    Copysign,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        use Function::*;
        Some(match name {
            "abs" => Abs,
            "min" => Min,
            "max" => Max,
            "round" => Round,
            "sqrt" => Sqrt,
            "exp" => Exp,
            "expm1" => Expm1,
            "log" => Log,
            "log2" => Log2,
            "log10" => Log10,
            "log1p" => Log1p,
            "pow" => Pow,
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            "asin" => Asin,
            "acos" => Acos,
            "atan" => Atan,
            "atan2" => Atan2,
            "sinh" => Sinh,
            "cosh" => Cosh,
            "tanh" => Tanh,
            "asinh" => Asinh,
            "acosh" => Acosh,
            "atanh" => Atanh,
            "ceil" => Ceil,
            "floor" => Floor,
            "trunc" => Trunc,
            "fabs" => Fabs,
            "fmod" => Fmod,
            "hypot" => Hypot,
            "degrees" => Degrees,
            "radians" => Radians,
            "copysign" => Copysign,
            _ => return None,
        })
    }

    fn arity(&self) -> Arity {
        use Function::*;
        match self {
            Min | Max | Hypot => Arity::AtLeast(2),
            Round => Arity::Range(1, 2),
            Log => Arity::Range(1, 2),
            Pow | Atan2 | Fmod | Copysign => Arity::Exact(2),
            _ => Arity::Exact(1),
        }
    }

    fn call(&self, args: &[f64]) -> f64 {
        use Function::*;
        let a = args.first().copied().unwrap_or(0.0);
        let b = args.get(1).copied().unwrap_or(0.0);
        match self {
            Abs | Fabs => a.abs(),
            Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Round if args.len() == 2 => {
                let factor = 10f64.powi(b as i32);
                (a * factor).round_ties_even() / factor
            }
            Round => a.round_ties_even(),
            Sqrt => a.sqrt(),
            Exp => a.exp(),
            Expm1 => a.exp_m1(),
            Log if args.len() == 2 => a.ln() / b.ln(),
            Log => a.ln(),
            Log2 => a.log2(),
            Log10 => a.log10(),
            Log1p => a.ln_1p(),
            Pow => a.powf(b),
            Sin => a.sin(),
            Cos => a.cos(),
            Tan => a.tan(),
            Asin => a.asin(),
            Acos => a.acos(),
            Atan => a.atan(),
            Atan2 => a.atan2(b),
            Sinh => a.sinh(),
            Cosh => a.cosh(),
            Tanh => a.tanh(),
            Asinh => a.asinh(),
            Acosh => a.acosh(),
            Atanh => a.atanh(),
            Ceil => a.ceil(),
            Floor => a.floor(),
            Trunc => a.trunc(),
            Fmod => a % b,
            Hypot => args.iter().map(|x| x * x).sum::<f64>().sqrt(),
            Degrees => a.to_degrees(),
            Radians => a.to_radians(),
            Copysign => a.copysign(b),
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(PI),
        "e" => Some(E),
        "tau" => Some(TAU),
        _ => None,
    }
}

/// Deepest expression tree compiled. Long operator chains fold into
/// left-deep trees, so this bounds compile and evaluation recursion.
const MAX_TREE_DEPTH: usize = 256;

/// Validated expression tree. Field references are indices into
/// [`Formula::referenced_names`].
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    Field(usize),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

/// Why one record could not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalFailure {
    /// Domain error or overflow (e.g. `sqrt(-1)`, `log(0)`).
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Node,
    names: Vec<String>,
}

impl Formula {
    /// Parse and validate `source`. Fails with `InvalidFormula` on syntax
    /// outside the arithmetic grammar, calls to anything not allow-listed,
    /// wrong argument counts, or a function name used as a value.
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parse_expression(source).map_err(|r| ChartError::invalid_formula(source, r))?;
        Self::from_expr(source, &expr)
    }

    fn from_expr(source: &str, expr: &Expr) -> Result<Self> {
        if expr.depth() > MAX_TREE_DEPTH {
            return Err(ChartError::invalid_formula(
                source,
                format!("expression nested deeper than {} levels", MAX_TREE_DEPTH),
            ));
        }
        let mut names = Vec::new();
        let root = compile_node(source, expr, &mut names)?;
        Ok(Self {
            source: source.to_string(),
            root,
            names,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names the formula reads, in order of first use.
    pub fn referenced_names(&self) -> &[String] {
        &self.names
    }

    /// Evaluate against one record. Missing, empty or non-numeric fields
    /// read as 0.
    pub fn evaluate(&self, record: &Record) -> std::result::Result<f64, EvalFailure> {
        let bindings: Vec<f64> = self
            .names
            .iter()
            .map(|n| record.get(n).and_then(coerce_number).unwrap_or(0.0))
            .collect();
        eval(&self.root, &bindings)
    }

    /// True when at least one referenced field holds a numeric value, or the
    /// formula references no fields at all.
    fn binds_any(&self, record: &Record) -> bool {
        self.names.is_empty()
            || self
                .names
                .iter()
                .any(|n| record.get(n).and_then(coerce_number).is_some())
    }
}

fn compile_node(source: &str, expr: &Expr, names: &mut Vec<String>) -> Result<Node> {
    Ok(match expr {
        Expr::Number(v) => Node::Const(*v),
        Expr::Name(name) => {
            if let Some(v) = constant(name) {
                Node::Const(v)
            } else if Function::from_name(name).is_some() {
                return Err(ChartError::invalid_formula(
                    source,
                    format!("function '{}' used as a value", name),
                ));
            } else {
                let idx = match names.iter().position(|n| n == name) {
                    Some(idx) => idx,
                    None => {
                        names.push(name.clone());
                        names.len() - 1
                    }
                };
                Node::Field(idx)
            }
        }
        Expr::Unary { op, operand } => {
            let inner = compile_node(source, operand, names)?;
            match op {
                UnaryOp::Neg => Node::Neg(Box::new(inner)),
                UnaryOp::Pos => inner,
            }
        }
        Expr::Binary { op, left, right } => Node::Binary(
            *op,
            Box::new(compile_node(source, left, names)?),
            Box::new(compile_node(source, right, names)?),
        ),
        Expr::Call { function, args } => {
            let f = Function::from_name(function).ok_or_else(|| {
                ChartError::invalid_formula(source, format!("call to '{}' is not allowed", function))
            })?;
            if !f.arity().accepts(args.len()) {
                return Err(ChartError::invalid_formula(
                    source,
                    format!(
                        "'{}' takes {} argument(s), got {}",
                        function,
                        f.arity(),
                        args.len()
                    ),
                ));
            }
            let args = args
                .iter()
                .map(|a| compile_node(source, a, names))
                .collect::<Result<Vec<_>>>()?;
            Node::Call(f, args)
        }
    })
}

fn checked(value: f64) -> std::result::Result<f64, EvalFailure> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalFailure::NonFinite)
    }
}

fn eval(node: &Node, bindings: &[f64]) -> std::result::Result<f64, EvalFailure> {
    match node {
        Node::Const(v) => checked(*v),
        Node::Field(idx) => Ok(bindings.get(*idx).copied().unwrap_or(0.0)),
        Node::Neg(inner) => Ok(-eval(inner, bindings)?),
        Node::Binary(op, left, right) => {
            let a = eval(left, bindings)?;
            let b = eval(right, bindings)?;
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => 0.0,
                BinaryOp::Div => a / b,
                BinaryOp::FloorDiv => (a / b).floor(),
                // result takes the sign of the divisor
                BinaryOp::Mod => a - b * (a / b).floor(),
                BinaryOp::Pow => a.powf(b),
            };
            checked(value)
        }
        Node::Call(function, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, bindings))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            checked(function.call(&values))
        }
    }
}

/// What a record whose evaluation failed receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Zero,
    Null,
}

/// `output = formula`, applied record by record.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedVariable {
    pub output: String,
    pub formula: Formula,
    pub policy: FailurePolicy,
}

impl DerivedVariable {
    /// Parse the assignment form `output = expression`.
    pub fn parse(source: &str) -> Result<Self> {
        let assignment =
            parse_assignment_complete(source).map_err(|r| ChartError::invalid_formula(source, r))?;
        let formula = Formula::from_expr(source, &assignment.expr)?;
        Ok(Self {
            output: assignment.output,
            formula,
            policy: FailurePolicy::default(),
        })
    }

    pub fn new(output: &str, formula: Formula) -> Self {
        Self {
            output: output.to_string(),
            formula,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Copy `records`, adding the derived field to each.
    ///
    /// A record whose evaluation fails gets the policy's fallback. A record
    /// counts as usable when it evaluated and bound at least one real field
    /// value; if no record of a non-empty batch is usable the whole batch
    /// fails with `DegradedFormula`.
    pub fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        let mut usable = 0usize;
        let mut failed = 0usize;

        let out: Vec<Record> = records
            .iter()
            .map(|record| {
                let mut derived = record.clone();
                let value = match self.formula.evaluate(record) {
                    Ok(v) => {
                        if self.formula.binds_any(record) {
                            usable += 1;
                        }
                        Value::from(v)
                    }
                    Err(_) => {
                        failed += 1;
                        match self.policy {
                            FailurePolicy::Zero => Value::from(0.0),
                            FailurePolicy::Null => Value::Null,
                        }
                    }
                };
                derived.insert(self.output.clone(), value);
                derived
            })
            .collect();

        if failed > 0 {
            warn!(
                formula = self.formula.source(),
                failed,
                total = records.len(),
                "derived variable failed for some records"
            );
        }
        debug!(output = %self.output, usable, "derived variable applied");

        if !records.is_empty() && usable == 0 {
            return Err(ChartError::DegradedFormula {
                formula: self.formula.source().to_string(),
                records: records.len(),
            });
        }
        Ok(out)
    }
}
