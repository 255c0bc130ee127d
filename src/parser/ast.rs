// Abstract syntax trees for derived-variable and ratio formulas

/// Arithmetic expression as written. Call targets are still plain names
/// here; they are checked against the function allow-list when compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Call { function: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Height of the tree, a leaf being 1. Walks with an explicit stack.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, level)) = stack.pop() {
            deepest = deepest.max(level);
            match expr {
                Expr::Number(_) | Expr::Name(_) => {}
                Expr::Unary { operand, .. } => stack.push((&**operand, level + 1)),
                Expr::Binary { left, right, .. } => {
                    stack.push((&**left, level + 1));
                    stack.push((&**right, level + 1));
                }
                Expr::Call { args, .. } => stack.extend(args.iter().map(|a| (a, level + 1))),
            }
        }
        deepest
    }
}

/// `output = expression`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub output: String,
    pub expr: Expr,
}

/// Ratio operand: a per-record field or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(f64),
}

/// `numerator / denominator [* multiplier]`
#[derive(Debug, Clone, PartialEq)]
pub struct Ratio {
    pub numerator: Operand,
    pub denominator: Operand,
    pub multiplier: Option<Operand>,
}
