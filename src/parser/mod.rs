// Formula parsers (derived variables and ratio metrics)

pub mod ast;
pub mod expression;
pub mod lexer;
pub mod ratio;

// Public API re-exports
pub use ast::{Assignment, BinaryOp, Expr, Operand, Ratio, UnaryOp};
pub use expression::{parse_assignment_complete, parse_expression};
pub use ratio::parse_ratio_complete;
