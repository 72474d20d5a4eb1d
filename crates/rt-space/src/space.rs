//! The parameter space and its parameter-file rendering.

use indexmap::IndexMap;
use rt_types::{ExpressionError, Scalar, SpaceError};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::expression::{render_scalar, BinaryOp, Expression};
use crate::params::{is_valid_name, Bound, ParameterKind, Subspace};

/// Marker line opening the forbidden section.
pub const FORBIDDEN_MARKER: &str = "[forbidden]";

/// An ordered, validated set of parameter subspaces plus forbidden regions.
///
/// Declaration order is preserved: conditions and dependent bounds may only
/// reference parameters declared before them, which rules out reference
/// cycles. Conditions and forbidden expressions are checked and encoded for
/// the engine once, at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    params: IndexMap<String, Subspace>,
    /// Engine-encoded conditions, keyed by the parameter they gate.
    conditions: IndexMap<String, Expression>,
    forbidden: Vec<Expression>,
    encoded_forbidden: Vec<Expression>,
}

impl ParameterSpace {
    pub fn new<P, F>(params: P, forbidden: F) -> Result<Self, SpaceError>
    where
        P: IntoIterator<Item = Subspace>,
        F: IntoIterator<Item = Expression>,
    {
        let params: Vec<Subspace> = params.into_iter().collect();
        let forbidden: Vec<Expression> = forbidden.into_iter().collect();

        let mut all_names = HashSet::with_capacity(params.len());
        for subspace in &params {
            subspace.validate()?;
            if !all_names.insert(subspace.name.as_str()) {
                return Err(SpaceError::DuplicateName {
                    name: subspace.name.clone(),
                });
            }
        }

        let mut declared: IndexMap<String, Subspace> = IndexMap::with_capacity(params.len());
        let mut conditions = IndexMap::new();

        for subspace in &params {
            let encoder = Encoder {
                declared: &declared,
                all_names: &all_names,
                owner: Some(subspace.name.as_str()),
            };

            for bound in subspace.bound_expressions() {
                encoder
                    .check_bound(bound)
                    .map_err(|source| SpaceError::InvalidBound {
                        parameter: subspace.name.clone(),
                        source,
                    })?;
            }

            if let Some(condition) = &subspace.condition {
                let encoded =
                    encoder
                        .encode_clause(condition)
                        .map_err(|source| SpaceError::InvalidCondition {
                            parameter: subspace.name.clone(),
                            source,
                        })?;
                conditions.insert(subspace.name.clone(), encoded);
            }

            declared.insert(subspace.name.clone(), subspace.clone());
        }

        let encoder = Encoder {
            declared: &declared,
            all_names: &all_names,
            owner: None,
        };
        let encoded_forbidden = forbidden
            .iter()
            .enumerate()
            .map(|(index, expr)| {
                encoder
                    .encode_clause(expr)
                    .map_err(|source| SpaceError::InvalidForbidden { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            parameters = declared.len(),
            forbidden = encoded_forbidden.len(),
            "parameter space built"
        );

        Ok(Self {
            params: declared,
            conditions,
            forbidden,
            encoded_forbidden,
        })
    }

    pub fn builder() -> ParameterSpaceBuilder {
        ParameterSpaceBuilder::default()
    }

    /// The subspace called `name`; `None` for names outside the space, which
    /// callers treat as engine metadata.
    pub fn get_subspace(&self, name: &str) -> Option<&Subspace> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Subspaces in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Subspace> {
        self.params.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Forbidden expressions as declared.
    pub fn forbidden(&self) -> &[Expression] {
        &self.forbidden
    }

    /// Condition of `name` with labels replaced by engine indices.
    pub fn encoded_condition(&self, name: &str) -> Option<&Expression> {
        self.conditions.get(name)
    }

    /// Forbidden expressions with labels replaced by engine indices.
    pub fn encoded_forbidden(&self) -> &[Expression] {
        &self.encoded_forbidden
    }

    /// Parameter-file text: one line per parameter in declaration order, then
    /// the forbidden section if there is anything to forbid.
    pub fn render_space(&self) -> String {
        let mut out = String::new();
        for subspace in self.params.values() {
            let condition = self.conditions.get(&subspace.name).map(Expression::render);
            out.push_str(&subspace.render_line(condition.as_deref()));
            out.push('\n');
        }
        if !self.encoded_forbidden.is_empty() {
            out.push_str(FORBIDDEN_MARKER);
            out.push('\n');
            for expr in &self.encoded_forbidden {
                out.push_str(&expr.render());
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for ParameterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_space())
    }
}

/// Fluent construction of a [`ParameterSpace`]; validation happens in
/// [`ParameterSpaceBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ParameterSpaceBuilder {
    params: Vec<Subspace>,
    forbidden: Vec<Expression>,
}

impl ParameterSpaceBuilder {
    pub fn add(mut self, subspace: Subspace) -> Self {
        self.params.push(subspace);
        self
    }

    pub fn add_real(
        self,
        name: impl Into<String>,
        lower: impl Into<Bound<f64>>,
        upper: impl Into<Bound<f64>>,
    ) -> Self {
        self.add(Subspace::real(name, lower, upper))
    }

    pub fn add_integer(
        self,
        name: impl Into<String>,
        lower: impl Into<Bound<i64>>,
        upper: impl Into<Bound<i64>>,
    ) -> Self {
        self.add(Subspace::integer(name, lower, upper))
    }

    pub fn add_categorical<I, V>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.add(Subspace::categorical(name, values))
    }

    pub fn add_ordinal<I, V>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.add(Subspace::ordinal(name, values))
    }

    pub fn add_bool(self, name: impl Into<String>) -> Self {
        self.add(Subspace::boolean(name))
    }

    pub fn forbid(mut self, expr: impl Into<Expression>) -> Self {
        self.forbidden.push(expr.into());
        self
    }

    pub fn build(self) -> Result<ParameterSpace, SpaceError> {
        ParameterSpace::new(self.params, self.forbidden)
    }
}

/// What an encoded expression evaluates to in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Logical,
    Numeric,
    /// Bare index of a categorical or ordinal parameter.
    Index,
    Text,
}

impl Shape {
    fn of(value: &Scalar) -> Self {
        match value {
            Scalar::Bool(_) => Self::Logical,
            Scalar::Int(_) | Scalar::Float(_) => Self::Numeric,
            Scalar::Str(_) => Self::Text,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Logical => "logical",
            Self::Numeric => "numeric",
            Self::Index => "label index",
            Self::Text => "string",
        }
    }
}

/// Checks references in an expression and rewrites labels of discrete
/// parameters into the index encoding the engine samples.
struct Encoder<'a> {
    /// Parameters visible to the expression.
    declared: &'a IndexMap<String, Subspace>,
    all_names: &'a HashSet<&'a str>,
    /// Parameter whose condition or bound is being checked.
    owner: Option<&'a str>,
}

impl Encoder<'_> {
    fn resolve(&self, name: &str) -> Result<&Subspace, ExpressionError> {
        if self.owner == Some(name) {
            return Err(ExpressionError::SelfReference {
                name: name.to_string(),
            });
        }
        match self.declared.get(name) {
            Some(subspace) => Ok(subspace),
            None if self.all_names.contains(name) => Err(ExpressionError::ForwardReference {
                name: name.to_string(),
            }),
            None => Err(ExpressionError::UnknownParameter {
                name: name.to_string(),
            }),
        }
    }

    /// A dependent bound must reference at least one parameter and be built
    /// from numeric parameters, numeric literals and function calls only.
    fn check_bound(&self, expr: &Expression) -> Result<(), ExpressionError> {
        if expr.references().is_empty() {
            return Err(ExpressionError::ConstantBound {
                expression: expr.render(),
            });
        }
        self.check_numeric_term(expr)
    }

    fn check_numeric_term(&self, expr: &Expression) -> Result<(), ExpressionError> {
        match expr {
            Expression::Literal(value) if value.is_numeric() => Ok(()),
            Expression::Literal(value) => Err(ExpressionError::NonNumericTerm {
                found: value.type_name().to_string(),
            }),
            Expression::ValueOf(name) => {
                if self.resolve(name)?.kind().is_numeric() {
                    Ok(())
                } else {
                    Err(ExpressionError::NonNumericReference { name: name.clone() })
                }
            }
            Expression::Call {
                function,
                args,
                named,
            } => {
                check_function(function)?;
                args.iter()
                    .chain(named.iter().map(|(_, arg)| arg))
                    .try_for_each(|arg| self.check_numeric_term(arg))
            }
            Expression::Not(_) | Expression::Binary { .. } | Expression::In { .. } => {
                Err(ExpressionError::NonNumericTerm {
                    found: Shape::Logical.name().to_string(),
                })
            }
        }
    }

    /// Encodes a condition or forbidden clause, which must be logical.
    fn encode_clause(&self, expr: &Expression) -> Result<Expression, ExpressionError> {
        match self.encode(expr)? {
            (encoded, Shape::Logical) => Ok(encoded),
            (_, shape) => Err(ExpressionError::NotLogical {
                found: shape.name().to_string(),
            }),
        }
    }

    fn encode(&self, expr: &Expression) -> Result<(Expression, Shape), ExpressionError> {
        match expr {
            Expression::Literal(value) => Ok((expr.clone(), Shape::of(value))),
            Expression::ValueOf(name) => match self.resolve(name)?.kind() {
                ParameterKind::Real | ParameterKind::Integer => Ok((expr.clone(), Shape::Numeric)),
                // the engine samples bools as 0/1
                ParameterKind::Bool => Ok((
                    Expression::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(expr.clone()),
                        right: Box::new(Expression::Literal(Scalar::Int(1))),
                    },
                    Shape::Logical,
                )),
                ParameterKind::Categorical | ParameterKind::Ordinal => {
                    Ok((expr.clone(), Shape::Index))
                }
            },
            Expression::Not(inner) => {
                let inner = self.encode_clause(inner)?;
                Ok((Expression::Not(Box::new(inner)), Shape::Logical))
            }
            Expression::Binary { op, left, right } if op.is_logical() => {
                let left = self.encode_clause(left)?;
                let right = self.encode_clause(right)?;
                Ok((
                    Expression::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    Shape::Logical,
                ))
            }
            Expression::Binary { op, left, right } => {
                if let Some(encoded) = self.encode_comparison(*op, left, right)? {
                    return Ok((encoded, Shape::Logical));
                }
                let (left, left_shape) = self.encode(left)?;
                let (right, right_shape) = self.encode(right)?;
                let comparable = match (left_shape, right_shape) {
                    (Shape::Numeric, Shape::Numeric) => true,
                    (Shape::Logical, Shape::Logical) => !op.is_ordering(),
                    _ => false,
                };
                if !comparable {
                    return Err(ExpressionError::OperandMismatch {
                        operator: op.token().to_string(),
                        left: left_shape.name().to_string(),
                        right: right_shape.name().to_string(),
                    });
                }
                Ok((
                    Expression::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    Shape::Logical,
                ))
            }
            Expression::In {
                parameter,
                values,
                negated,
            } => {
                let subspace = self.resolve(parameter)?;
                if values.is_empty() {
                    return Err(ExpressionError::EmptySet {
                        parameter: parameter.clone(),
                    });
                }
                let values = if subspace.kind().is_discrete() {
                    values
                        .iter()
                        .map(|label| encode_label(subspace, label))
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    for value in values {
                        check_numeric_literal(subspace, value)?;
                    }
                    values.clone()
                };
                Ok((
                    Expression::In {
                        parameter: parameter.clone(),
                        values,
                        negated: *negated,
                    },
                    Shape::Logical,
                ))
            }
            Expression::Call {
                function,
                args,
                named,
            } => {
                check_function(function)?;
                let encoded = Expression::Call {
                    function: function.clone(),
                    args: args
                        .iter()
                        .map(|arg| self.encode_argument(arg))
                        .collect::<Result<_, _>>()?,
                    named: named
                        .iter()
                        .map(|(key, arg)| Ok((key.clone(), self.encode_argument(arg)?)))
                        .collect::<Result<_, ExpressionError>>()?,
                };
                Ok((encoded, Shape::Numeric))
            }
        }
    }

    fn encode_argument(&self, arg: &Expression) -> Result<Expression, ExpressionError> {
        match self.encode(arg)? {
            (_, Shape::Index) => Err(ExpressionError::NonNumericTerm {
                found: Shape::Index.name().to_string(),
            }),
            (encoded, _) => Ok(encoded),
        }
    }

    /// `param <op> literal` (either side). Discrete parameters compare by
    /// label; ordinal ordering becomes membership over the qualifying ranks,
    /// since the engine compares sampled ordinal values as text.
    fn encode_comparison(
        &self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Expression>, ExpressionError> {
        let (name, label, op) = match (left, right) {
            (Expression::ValueOf(name), Expression::Literal(label)) => (name, label, op),
            (Expression::Literal(label), Expression::ValueOf(name)) => (name, label, mirror(op)),
            _ => return Ok(None),
        };

        let subspace = self.resolve(name)?;
        if subspace.kind().is_numeric() {
            check_numeric_literal(subspace, label)?;
            return Ok(None);
        }
        if op.is_ordering() && subspace.kind() != ParameterKind::Ordinal {
            return Err(ExpressionError::UnorderedComparison {
                parameter: name.clone(),
                operator: op.token().to_string(),
            });
        }

        let Some(index) = subspace.label_index(label) else {
            return Err(unknown_label(subspace, label));
        };
        if !op.is_ordering() {
            return Ok(Some(Expression::Binary {
                op,
                left: Box::new(Expression::ValueOf(name.clone())),
                right: Box::new(Expression::Literal(Scalar::Int(index as i64))),
            }));
        }

        let ranks = 0..subspace.labels().len();
        let qualifying: Vec<Scalar> = ranks
            .filter(|rank| match op {
                BinaryOp::Lt => *rank < index,
                BinaryOp::Le => *rank <= index,
                BinaryOp::Gt => *rank > index,
                _ => *rank >= index,
            })
            .map(|rank| Scalar::Int(rank as i64))
            .collect();
        if qualifying.is_empty() {
            return Ok(Some(Expression::Literal(Scalar::Bool(false))));
        }
        Ok(Some(Expression::In {
            parameter: name.clone(),
            values: qualifying,
            negated: false,
        }))
    }
}

/// The same comparison with its operands swapped.
fn mirror(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    }
}

fn check_numeric_literal(subspace: &Subspace, value: &Scalar) -> Result<(), ExpressionError> {
    if value.is_numeric() {
        Ok(())
    } else {
        Err(ExpressionError::LiteralType {
            parameter: subspace.name.clone(),
            expected: subspace.kind().name().to_string(),
            found: value.type_name().to_string(),
        })
    }
}

fn unknown_label(subspace: &Subspace, label: &Scalar) -> ExpressionError {
    ExpressionError::UnknownLabel {
        parameter: subspace.name.clone(),
        label: render_scalar(label),
    }
}

fn encode_label(subspace: &Subspace, label: &Scalar) -> Result<Scalar, ExpressionError> {
    subspace
        .label_index(label)
        .map(|index| Scalar::Int(index as i64))
        .ok_or_else(|| unknown_label(subspace, label))
}

fn check_function(name: &str) -> Result<(), ExpressionError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ExpressionError::InvalidFunction {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{lit, value_of};

    #[test]
    fn two_declarations_without_forbidden_section() {
        let space = ParameterSpace::builder()
            .add_categorical("algo", ["a", "b"])
            .add_real("x", 0, 5)
            .build()
            .unwrap();

        let text = space.render_space();
        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains(FORBIDDEN_MARKER));
        assert_eq!(text, "algo \"\" c (0,1)\nx \"\" r (0, 5)\n");
    }

    #[test]
    fn forbidden_section_only_when_needed() {
        let space = ParameterSpace::builder()
            .add_real("x", 0, 5)
            .add_real("y", 0, 5)
            .forbid(value_of("x").eq(0).and(value_of("y").eq(0)))
            .build()
            .unwrap();

        let text = space.render_space();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], FORBIDDEN_MARKER);
        assert_eq!(lines[3], "(x == 0) & (y == 0)");
    }

    #[test]
    fn declaration_order_is_preserved() {
        let space = ParameterSpace::builder()
            .add_real("zeta", 0, 1)
            .add_real("alpha", 0, 1)
            .add_bool("mid")
            .build()
            .unwrap();
        assert_eq!(space.names().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert!(space.get_subspace("alpha").is_some());
        assert!(space.get_subspace(".ID.").is_none());
    }

    #[test]
    fn duplicate_names_fail_at_construction() {
        let err = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .add_integer("x", 0, 1)
            .build()
            .unwrap_err();
        assert_eq!(err, SpaceError::DuplicateName { name: "x".into() });
    }

    #[test]
    fn categorical_conditions_are_encoded_as_indices() {
        let space = ParameterSpace::builder()
            .add_categorical("algorithm", ["as", "mmas", "eas", "ras", "acs"])
            .add(Subspace::integer("rasrank", 1, 100).when(value_of("algorithm").is_in(["ras"])))
            .add(Subspace::real("q0", 0, 1).when(value_of("algorithm").eq("acs")))
            .build()
            .unwrap();

        let text = space.render_space();
        assert!(text.contains("rasrank \"\" i (1, 100) | algorithm %in% c(3)"));
        assert!(text.contains("q0 \"\" r (0, 1) | algorithm == 4"));
        // the declared form is kept as written
        assert_eq!(
            space.get_subspace("q0").unwrap().condition,
            Some(value_of("algorithm").eq("acs"))
        );
    }

    #[test]
    fn unknown_label_fails_at_construction() {
        let err = ParameterSpace::builder()
            .add_categorical("algorithm", ["as", "mmas"])
            .add(Subspace::real("q0", 0, 1).when(value_of("algorithm").is_in(["acs"])))
            .build()
            .unwrap_err();
        match err {
            SpaceError::InvalidCondition { parameter, source } => {
                assert_eq!(parameter, "q0");
                assert_eq!(
                    source,
                    ExpressionError::UnknownLabel {
                        parameter: "algorithm".into(),
                        label: "\"acs\"".into(),
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn references_must_be_declared_earlier() {
        let forward = ParameterSpace::builder()
            .add(Subspace::real("a", 0, 1).when(value_of("b").gt(0.5)))
            .add_real("b", 0, 1)
            .build()
            .unwrap_err();
        assert!(matches!(
            forward,
            SpaceError::InvalidCondition {
                source: ExpressionError::ForwardReference { .. },
                ..
            }
        ));

        let unknown = ParameterSpace::builder()
            .add(Subspace::real("a", 0, 1).when(value_of("nope").gt(0.5)))
            .build()
            .unwrap_err();
        assert!(matches!(
            unknown,
            SpaceError::InvalidCondition {
                source: ExpressionError::UnknownParameter { .. },
                ..
            }
        ));

        let cyclic = ParameterSpace::builder()
            .add(Subspace::integer("a", 0, "a"))
            .build()
            .unwrap_err();
        assert!(matches!(
            cyclic,
            SpaceError::InvalidBound {
                source: ExpressionError::SelfReference { .. },
                ..
            }
        ));
    }

    #[test]
    fn dependent_bounds_pass_through_unresolved() {
        let space = ParameterSpace::builder()
            .add_integer("ants", 5, 100)
            .add_integer("rasrank", 1, "ants")
            .build()
            .unwrap();
        assert!(space.render_space().contains("rasrank \"\" i (1, \"ants\")"));

        let err = ParameterSpace::builder()
            .add_bool("dlb")
            .add_integer("k", 1, "dlb")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SpaceError::InvalidBound {
                source: ExpressionError::NonNumericReference { .. },
                ..
            }
        ));
    }

    #[test]
    fn ordinal_ordering_uses_rank() {
        let space = ParameterSpace::builder()
            .add_ordinal("level", ["low", "mid", "high"])
            .add(Subspace::real("boost", 0, 1).when(value_of("level").ge("mid")))
            .build()
            .unwrap();
        assert_eq!(
            space.encoded_condition("boost").map(Expression::render).as_deref(),
            Some("level %in% c(1, 2)")
        );

        let err = ParameterSpace::builder()
            .add_categorical("algo", ["a", "b"])
            .add(Subspace::real("x", 0, 1).when(value_of("algo").lt("b")))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SpaceError::InvalidCondition {
                source: ExpressionError::UnorderedComparison { .. },
                ..
            }
        ));
    }

    #[test]
    fn bool_comparisons_use_indices() {
        let space = ParameterSpace::builder()
            .add_bool("polish")
            .add_real("tol", 0, 1)
            .forbid(lit(true).eq(value_of("polish")).and(value_of("tol").lt(0.1)))
            .build()
            .unwrap();
        assert_eq!(space.encoded_forbidden()[0].render(), "(polish == 1) & (tol < 0.1)");
        assert_eq!(space.forbidden().len(), 1);
    }

    #[test]
    fn forbidden_may_reference_any_parameter() {
        let space = ParameterSpace::builder()
            .forbid(value_of("b").eq(1))
            .add_integer("a", 0, 3)
            .add_integer("b", 0, 3)
            .build();
        assert!(space.is_ok());

        let err = ParameterSpace::builder()
            .add_integer("a", 0, 3)
            .forbid(value_of("c").eq(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, SpaceError::InvalidForbidden { index: 0, .. }));
    }

    fn condition_error(space: Result<ParameterSpace, SpaceError>) -> ExpressionError {
        match space.unwrap_err() {
            SpaceError::InvalidCondition { source, .. } => source,
            SpaceError::InvalidForbidden { source, .. } => source,
            SpaceError::InvalidBound { source, .. } => source,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clauses_must_be_logical() {
        let constant = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .forbid(lit(3))
            .build();
        assert_eq!(
            condition_error(constant),
            ExpressionError::NotLogical {
                found: "numeric".into()
            }
        );

        let real_value = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .add(Subspace::real("y", 0, 1).when(value_of("x")))
            .build();
        assert!(matches!(
            condition_error(real_value),
            ExpressionError::NotLogical { .. }
        ));

        let call = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .add_real("y", 0, 1)
            .forbid(Expression::max([value_of("x"), value_of("y")]))
            .build();
        assert!(matches!(call, Err(SpaceError::InvalidForbidden { index: 0, .. })));

        let label = ParameterSpace::builder()
            .add_categorical("algo", ["a", "b"])
            .forbid(value_of("algo"))
            .build();
        assert_eq!(
            condition_error(label),
            ExpressionError::NotLogical {
                found: "label index".into()
            }
        );

        let inner = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .forbid(value_of("x").gt(0.5).and(lit(1)))
            .build();
        assert!(matches!(
            condition_error(inner),
            ExpressionError::NotLogical { .. }
        ));
    }

    #[test]
    fn bare_bool_reference_compares_with_one() {
        let space = ParameterSpace::builder()
            .add_bool("dlb")
            .add(Subspace::integer("nnls", 5, 50).when(value_of("dlb")))
            .add_real("x", 0, 1)
            .forbid(!Expression::from(value_of("dlb")) & value_of("x").gt(0.5))
            .build()
            .unwrap();
        assert_eq!(
            space.encoded_condition("nnls").map(Expression::render).as_deref(),
            Some("dlb == 1")
        );
        assert_eq!(space.encoded_forbidden()[0].render(), "(!(dlb == 1)) & (x > 0.5)");
        assert!(space.render_space().contains("nnls \"\" i (5, 50) | dlb == 1"));
    }

    #[test]
    fn numeric_parameters_reject_text_and_bool_literals() {
        let compared = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .forbid(value_of("x").eq("abc"))
            .build();
        assert_eq!(
            condition_error(compared),
            ExpressionError::LiteralType {
                parameter: "x".into(),
                expected: "real".into(),
                found: "string".into(),
            }
        );

        let mirrored = ParameterSpace::builder()
            .add_integer("k", 0, 9)
            .forbid(lit(true).eq(value_of("k")))
            .build();
        assert_eq!(
            condition_error(mirrored),
            ExpressionError::LiteralType {
                parameter: "k".into(),
                expected: "integer".into(),
                found: "bool".into(),
            }
        );

        let member = ParameterSpace::builder()
            .add_real("x", 0, 1)
            .add(Subspace::real("y", 0, 1).when(value_of("x").is_in(["abc"])))
            .build();
        assert!(matches!(
            condition_error(member),
            ExpressionError::LiteralType { .. }
        ));

        let mixed = ParameterSpace::builder()
            .add_categorical("algo", ["a", "b"])
            .add_real("x", 0, 1)
            .forbid(value_of("algo").eq(value_of("x")))
            .build();
        assert_eq!(
            condition_error(mixed),
            ExpressionError::OperandMismatch {
                operator: "==".into(),
                left: "label index".into(),
                right: "numeric".into(),
            }
        );

        let numeric_members = ParameterSpace::builder()
            .add_integer("k", 0, 9)
            .forbid(value_of("k").is_in([1, 3]))
            .build()
            .unwrap();
        assert_eq!(numeric_members.encoded_forbidden()[0].render(), "k %in% c(1, 3)");
    }

    #[test]
    fn bound_functions_are_checked_at_every_depth() {
        let nested = ParameterSpace::builder()
            .add_integer("a", 0, 10)
            .add(Subspace::integer(
                "b",
                0,
                Expression::max([Expression::call("bad name(", [value_of("a")]), lit(1)]),
            ))
            .build();
        assert_eq!(
            condition_error(nested),
            ExpressionError::InvalidFunction {
                name: "bad name(".into()
            }
        );

        let constant = ParameterSpace::builder()
            .add_integer("a", 0, 10)
            .add(Subspace::integer("b", 0, Expression::max([1, 2])))
            .build();
        assert_eq!(
            condition_error(constant),
            ExpressionError::ConstantBound {
                expression: "max(1, 2)".into()
            }
        );

        let text = ParameterSpace::builder()
            .add_integer("a", 0, 10)
            .add(Subspace::integer(
                "b",
                0,
                Expression::max([Expression::from(value_of("a")), lit("ten")]),
            ))
            .build();
        assert_eq!(
            condition_error(text),
            ExpressionError::NonNumericTerm {
                found: "string".into()
            }
        );

        let valid = ParameterSpace::builder()
            .add_integer("a", 0, 10)
            .add_integer("c", 0, 10)
            .add(Subspace::integer(
                "b",
                0,
                Expression::min([Expression::from(value_of("a")), Expression::max([value_of("c")])]),
            ))
            .build();
        assert!(valid.is_ok());
    }

    #[test]
    fn ordinal_ordering_lowers_to_membership_beyond_ten_levels() {
        let levels: Vec<String> = (0..12).map(|i| format!("l{i}")).collect();
        let space = ParameterSpace::builder()
            .add_ordinal("level", levels)
            .add(Subspace::real("hi", 0, 1).when(value_of("level").ge("l10")))
            .add(Subspace::real("lo", 0, 1).when(value_of("level").lt("l2")))
            .add(Subspace::real("mirrored", 0, 1).when(lit("l9").lt(value_of("level"))))
            .add(Subspace::real("never", 0, 1).when(value_of("level").lt("l0")))
            .build()
            .unwrap();

        let rendered = |name: &str| space.encoded_condition(name).map(Expression::render);
        assert_eq!(rendered("hi").as_deref(), Some("level %in% c(10, 11)"));
        assert_eq!(rendered("lo").as_deref(), Some("level %in% c(0, 1)"));
        assert_eq!(rendered("mirrored").as_deref(), Some("level %in% c(10, 11)"));
        assert_eq!(rendered("never").as_deref(), Some("FALSE"));
    }
}
