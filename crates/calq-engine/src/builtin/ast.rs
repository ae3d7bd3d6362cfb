use std::fmt;

use calq_core::format_number;

/// Parsed expression tree shared by the evaluator and the symbolic passes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Factorial(Box<Expr>),
    Call(String, Vec<Expr>),
    Matrix(Vec<Vec<Expr>>),
}

impl Expr {
    pub fn var(name: &str) -> Self {
        Self::Var(name.to_string())
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Self::Call(name.to_string(), args)
    }

    pub fn neg(a: Expr) -> Self {
        Self::Neg(Box::new(a))
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Self::Add(Box::new(a), Box::new(b))
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Self::Sub(Box::new(a), Box::new(b))
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Self::Mul(Box::new(a), Box::new(b))
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Self::Div(Box::new(a), Box::new(b))
    }

    pub fn pow(a: Expr, b: Expr) -> Self {
        Self::Pow(Box::new(a), Box::new(b))
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_num(&self, value: f64) -> bool {
        self.as_num() == Some(value)
    }

    /// Whether `name` occurs free anywhere in the tree.
    pub fn contains_var(&self, name: &str) -> bool {
        match self {
            Self::Num(_) => false,
            Self::Var(v) => v == name,
            Self::Neg(a) | Self::Factorial(a) => a.contains_var(name),
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) | Self::Div(a, b) | Self::Pow(a, b) => {
                a.contains_var(name) || b.contains_var(name)
            }
            Self::Call(_, args) => args.iter().any(|a| a.contains_var(name)),
            Self::Matrix(rows) => rows.iter().flatten().any(|a| a.contains_var(name)),
        }
    }

    /// Collect variable names in first-occurrence order.
    pub fn variables(&self, out: &mut Vec<String>) {
        match self {
            Self::Num(_) => {}
            Self::Var(v) => {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Self::Neg(a) | Self::Factorial(a) => a.variables(out),
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) | Self::Div(a, b) | Self::Pow(a, b) => {
                a.variables(out);
                b.variables(out);
            }
            Self::Call(_, args) => args.iter().for_each(|a| a.variables(out)),
            Self::Matrix(rows) => rows.iter().flatten().for_each(|a| a.variables(out)),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Add(..) | Self::Sub(..) => 1,
            Self::Mul(..) | Self::Div(..) => 2,
            Self::Neg(_) => 3,
            Self::Num(n) if *n < 0.0 => 3,
            Self::Pow(..) => 4,
            Self::Factorial(_) => 5,
            _ => 6,
        }
    }
}

/// Writes `e` wrapped in parentheses when it binds looser than `min`.
struct Operand<'a>(&'a Expr, u8);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.precedence() < self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => f.write_str(&format_number(*n)),
            Self::Var(v) => f.write_str(v),
            Self::Neg(a) => write!(f, "-{}", Operand(a, 2)),
            Self::Add(a, b) => write!(f, "{} + {}", Operand(a, 1), Operand(b, 1)),
            Self::Sub(a, b) => write!(f, "{} - {}", Operand(a, 1), Operand(b, 2)),
            Self::Mul(a, b) => write!(f, "{} * {}", Operand(a, 2), Operand(b, 2)),
            Self::Div(a, b) => write!(f, "{} / {}", Operand(a, 2), Operand(b, 3)),
            Self::Pow(a, b) => write!(f, "{}^{}", Operand(a, 5), Operand(b, 4)),
            Self::Factorial(a) => write!(f, "{}!", Operand(a, 6)),
            Self::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
            Self::Matrix(rows) => {
                f.write_str("[")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str("[")?;
                    for (j, a) in row.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    f.write_str("]")?;
                }
                f.write_str("]")
            }
        }
    }
}
