//! Condition, bound and forbidden-region expressions.
//!
//! Expressions are immutable trees. Every combinator returns a new node and
//! leaves its operands untouched; [`Expression::render`] turns a tree into the
//! engine's textual grammar (R syntax), deterministically.

use rt_types::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Binary operators understood by the engine grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::And => "&",
            Self::Or => "|",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Comparisons that need an ordering on their operands.
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Scalar),
    ValueOf(String),
    Not(Box<Expression>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `parameter %in% values`, or its negation.
    In {
        parameter: String,
        values: Vec<Scalar>,
        negated: bool,
    },
    Call {
        function: String,
        args: Vec<Expression>,
        named: Vec<(String, Expression)>,
    },
}

/// Reference to the current value of a parameter.
pub fn value_of(name: impl Into<String>) -> Param {
    Param(name.into())
}

/// A literal leaf.
pub fn lit(value: impl Into<Scalar>) -> Expression {
    Expression::Literal(value.into())
}

/// A named parameter, as a starting point for building expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param(String);

impl Param {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_in<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Expression::In {
            parameter: self.0,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Expression::In {
            parameter: self.0,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn eq(self, rhs: impl Into<Expression>) -> Expression {
        Expression::from(self).eq(rhs)
    }

    pub fn ne(self, rhs: impl Into<Expression>) -> Expression {
        Expression::from(self).ne(rhs)
    }

    pub fn lt(self, rhs: impl Into<Expression>) -> Expression {
        Expression::from(self).lt(rhs)
    }

    pub fn le(self, rhs: impl Into<Expression>) -> Expression {
        Expression::from(self).le(rhs)
    }

    pub fn gt(self, rhs: impl Into<Expression>) -> Expression {
        Expression::from(self).gt(rhs)
    }

    pub fn ge(self, rhs: impl Into<Expression>) -> Expression {
        Expression::from(self).ge(rhs)
    }
}

impl Expression {
    fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Or, self, rhs.into())
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn eq(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs.into())
    }

    pub fn ne(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Ne, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs.into())
    }

    /// Function call with positional arguments only.
    pub fn call<I, E>(function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        Self::Call {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
            named: Vec::new(),
        }
    }

    /// Function call with positional and named arguments.
    pub fn call_with<I, E, N, K>(function: impl Into<String>, args: I, named: N) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
        N: IntoIterator<Item = (K, Expression)>,
        K: Into<String>,
    {
        Self::Call {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
            named: named.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn min<I, E>(args: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        Self::call("min", args)
    }

    pub fn max<I, E>(args: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        Self::call("max", args)
    }

    /// Disjunction of all expressions; `None` when there are none.
    pub fn any<I: IntoIterator<Item = Expression>>(exprs: I) -> Option<Self> {
        exprs.into_iter().reduce(Expression::or)
    }

    /// Names of every parameter referenced in the tree, in visiting order.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::ValueOf(name) => names.push(name),
            Self::Not(inner) => inner.collect_references(names),
            Self::Binary { left, right, .. } => {
                left.collect_references(names);
                right.collect_references(names);
            }
            Self::In { parameter, .. } => names.push(parameter),
            Self::Call { args, named, .. } => {
                for arg in args {
                    arg.collect_references(names);
                }
                for (_, arg) in named {
                    arg.collect_references(names);
                }
            }
        }
    }

    /// Text in the engine grammar.
    pub fn render(&self) -> String {
        self.to_string()
    }

    fn is_atomic(&self) -> bool {
        matches!(self, Self::Literal(_) | Self::ValueOf(_) | Self::Call { .. })
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_atomic() {
            write!(f, "{self}")
        } else {
            write!(f, "({self})")
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.write_str(&render_scalar(value)),
            Self::ValueOf(name) => f.write_str(name),
            Self::Not(inner) => {
                f.write_str("!")?;
                inner.fmt_operand(f)
            }
            Self::Binary { op, left, right } => {
                left.fmt_operand(f)?;
                write!(f, " {} ", op.token())?;
                right.fmt_operand(f)
            }
            Self::In {
                parameter,
                values,
                negated,
            } => {
                let set = values.iter().map(render_scalar).collect::<Vec<_>>().join(", ");
                if *negated {
                    write!(f, "!({parameter} %in% c({set}))")
                } else {
                    write!(f, "{parameter} %in% c({set})")
                }
            }
            Self::Call {
                function,
                args,
                named,
            } => {
                let mut rendered: Vec<String> = args.iter().map(Expression::render).collect();
                rendered.extend(named.iter().map(|(k, v)| format!("{k} = {v}")));
                write!(f, "{function}({})", rendered.join(", "))
            }
        }
    }
}

/// Renders a literal with the engine's quoting and number conventions.
pub fn render_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Bool(true) => "TRUE".to_string(),
        Scalar::Bool(false) => "FALSE".to_string(),
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) => format_number(*v),
        Scalar::Str(s) => quote(s),
    }
}

/// Double-quoted string with `\` and `"` escaped.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Locale-independent number text.
///
/// Plain decimal notation for magnitudes in `[1e-4, 1e15)`, shortest
/// scientific notation otherwise (`1e-5`, `2.5e20`: no `+`, no padded exponent).
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NA".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if (1e-4..1e15).contains(&value.abs()) {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}

impl From<Param> for Expression {
    fn from(param: Param) -> Self {
        Self::ValueOf(param.0)
    }
}

impl From<Scalar> for Expression {
    fn from(value: Scalar) -> Self {
        Self::Literal(value)
    }
}

macro_rules! literal_expression {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expression {
                fn from(value: $ty) -> Self {
                    Self::Literal(Scalar::from(value))
                }
            }
        )*
    };
}

literal_expression!(bool, i32, i64, f64, &str, String);

impl<T: Into<Expression>> BitAnd<T> for Expression {
    type Output = Expression;

    fn bitand(self, rhs: T) -> Expression {
        self.and(rhs)
    }
}

impl<T: Into<Expression>> BitOr<T> for Expression {
    type Output = Expression;

    fn bitor(self, rhs: T) -> Expression {
        self.or(rhs)
    }
}

impl Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        self.negate()
    }
}
