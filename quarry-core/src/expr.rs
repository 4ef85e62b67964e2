use std::fmt;
use std::marker::PhantomData;

use crate::case::SimpleCaseWhen;
use crate::sql::SelectSpec;
use crate::subquery::SubQuery;
use crate::value::{FromValue, Value};

/// Binary operators understood by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
            BinaryOp::Concat => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Comparisons bind tighter than anything they are nested in; the rest get parentheses.
    pub(crate) fn needs_parens(self) -> bool {
        !matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Like
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFn {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Max => "MAX",
            AggregateFn::Min => "MIN",
        }
    }
}

/// Untyped expression tree.
///
/// Nodes compare structurally, which is what lets a [`Tuple`](crate::Tuple)
/// be addressed by the same expression that was selected.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Column {
        alias: String,
        column: &'static str,
        property: &'static str,
    },
    Entity {
        alias: String,
        table: &'static str,
    },
    Literal(Value),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Not(Box<Node>),
    NullCheck {
        expr: Box<Node>,
        negated: bool,
    },
    Between {
        expr: Box<Node>,
        low: Box<Node>,
        high: Box<Node>,
    },
    InList {
        expr: Box<Node>,
        items: Vec<Node>,
    },
    InSubquery {
        expr: Box<Node>,
        subquery: Box<SelectSpec>,
    },
    Exists(Box<SelectSpec>),
    Aggregate {
        func: AggregateFn,
        arg: Box<Node>,
        distinct: bool,
    },
    CountAll,
    Case {
        operand: Option<Box<Node>>,
        branches: Vec<(Node, Node)>,
        otherwise: Box<Node>,
    },
    CastText(Box<Node>),
    Subquery(Box<SelectSpec>),
    Alias {
        expr: Box<Node>,
        name: String,
    },
}

impl Node {
    pub(crate) fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
        Node::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Name used by name-based projections: the property of a column or an explicit alias.
    pub fn projection_name(&self) -> Option<&str> {
        match self {
            Node::Column { property, .. } => Some(property),
            Node::Alias { name, .. } => Some(name),
            _ => None,
        }
    }

    pub(crate) fn unaliased(&self) -> &Node {
        match self {
            Node::Alias { expr, .. } => expr.unaliased(),
            other => other,
        }
    }
}

/// Typed handle over a [`Node`]. `T` is the Rust type a selected value decodes into.
pub struct Expr<T> {
    node: Node,
    _type: PhantomData<fn() -> T>,
}

/// A boolean expression usable in `filter`, `on` and `having`.
pub type Predicate = Expr<bool>;

impl<T> Clone for Expr<T> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<T> fmt::Debug for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expr").field(&self.node).finish()
    }
}

impl<T> Expr<T> {
    pub fn from_node(node: Node) -> Self {
        Self {
            node,
            _type: PhantomData,
        }
    }

    /// Column `alias.column`, exposed to projections as `property`.
    pub fn column(alias: &str, column: &'static str, property: &'static str) -> Self {
        Self::from_node(Node::Column {
            alias: alias.to_owned(),
            column,
            property,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    fn compare(&self, op: BinaryOp, rhs: Node) -> Predicate {
        Expr::from_node(Node::binary(op, self.node.clone(), rhs))
    }

    pub fn eq(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Eq, rhs.into_operand())
    }

    pub fn ne(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Ne, rhs.into_operand())
    }

    pub fn is_null(&self) -> Predicate {
        Expr::from_node(Node::NullCheck {
            expr: Box::new(self.node.clone()),
            negated: false,
        })
    }

    pub fn is_not_null(&self) -> Predicate {
        Expr::from_node(Node::NullCheck {
            expr: Box::new(self.node.clone()),
            negated: true,
        })
    }

    /// `expr IN (...)`. An empty list matches nothing.
    pub fn in_list<V: Operand<T>>(&self, values: impl IntoIterator<Item = V>) -> Predicate {
        Expr::from_node(Node::InList {
            expr: Box::new(self.node.clone()),
            items: values.into_iter().map(Operand::into_operand).collect(),
        })
    }

    pub fn in_subquery<U>(&self, subquery: SubQuery<U>) -> Predicate {
        Expr::from_node(Node::InSubquery {
            expr: Box::new(self.node.clone()),
            subquery: Box::new(subquery.into_spec()),
        })
    }

    pub fn asc(&self) -> OrderSpecifier {
        OrderSpecifier::new(self.node.clone(), false)
    }

    pub fn desc(&self) -> OrderSpecifier {
        OrderSpecifier::new(self.node.clone(), true)
    }

    /// Names the expression in the select list; bean and field projections match on it.
    pub fn as_(&self, alias: &str) -> Expr<T> {
        Expr::from_node(Node::Alias {
            expr: Box::new(self.node.unaliased().clone()),
            name: alias.to_owned(),
        })
    }

    pub fn count(&self) -> Expr<i64> {
        self.aggregate(AggregateFn::Count, false)
    }

    pub fn count_distinct(&self) -> Expr<i64> {
        self.aggregate(AggregateFn::Count, true)
    }

    pub fn max(&self) -> Expr<T> {
        self.aggregate(AggregateFn::Max, false)
    }

    pub fn min(&self) -> Expr<T> {
        self.aggregate(AggregateFn::Min, false)
    }

    fn aggregate<R>(&self, func: AggregateFn, distinct: bool) -> Expr<R> {
        Expr::from_node(Node::Aggregate {
            func,
            arg: Box::new(self.node.unaliased().clone()),
            distinct,
        })
    }

    /// Starts a simple `CASE expr WHEN value THEN ...`.
    pub fn when(&self, value: impl Operand<T>) -> SimpleCaseWhen<T> {
        SimpleCaseWhen::new(self.node.clone(), value.into_operand())
    }
}

/// Numeric column types: comparable with each other and aggregatable.
pub trait Numeric: FromValue + Send + 'static {
    /// Result type of `SUM` over this type.
    type Sum: Numeric;
}

impl Numeric for i16 {
    type Sum = i64;
}

impl Numeric for i32 {
    type Sum = i64;
}

impl Numeric for i64 {
    type Sum = i64;
}

impl Numeric for f64 {
    type Sum = f64;
}

#[allow(clippy::should_implement_trait)]
impl<T: Numeric> Expr<T> {
    pub fn gt(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Gt, rhs.into_operand())
    }

    /// Greater than or equal.
    pub fn goe(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Ge, rhs.into_operand())
    }

    pub fn lt(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Lt, rhs.into_operand())
    }

    /// Less than or equal.
    pub fn loe(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Le, rhs.into_operand())
    }

    /// Inclusive range.
    pub fn between(&self, low: impl Operand<T>, high: impl Operand<T>) -> Predicate {
        Expr::from_node(Node::Between {
            expr: Box::new(self.node.clone()),
            low: Box::new(low.into_operand()),
            high: Box::new(high.into_operand()),
        })
    }

    pub fn sum(&self) -> Expr<T::Sum> {
        self.aggregate(AggregateFn::Sum, false)
    }

    pub fn avg(&self) -> Expr<f64> {
        self.aggregate(AggregateFn::Avg, false)
    }

    pub fn add(&self, rhs: impl Operand<T>) -> Expr<T> {
        Expr::from_node(Node::binary(BinaryOp::Add, self.node.clone(), rhs.into_operand()))
    }

    pub fn subtract(&self, rhs: impl Operand<T>) -> Expr<T> {
        Expr::from_node(Node::binary(BinaryOp::Sub, self.node.clone(), rhs.into_operand()))
    }

    pub fn multiply(&self, rhs: impl Operand<T>) -> Expr<T> {
        Expr::from_node(Node::binary(BinaryOp::Mul, self.node.clone(), rhs.into_operand()))
    }

    /// The number rendered as text, e.g. for concatenation.
    pub fn string_value(&self) -> Expr<String> {
        Expr::from_node(Node::CastText(Box::new(self.node.unaliased().clone())))
    }
}

impl Expr<String> {
    pub fn concat(&self, rhs: impl Operand<String>) -> Expr<String> {
        Expr::from_node(Node::binary(BinaryOp::Concat, self.node.clone(), rhs.into_operand()))
    }

    pub fn like(&self, pattern: &str) -> Predicate {
        self.compare(BinaryOp::Like, Node::Literal(Value::from(pattern)))
    }

    pub fn contains(&self, needle: &str) -> Predicate {
        self.like(&format!("%{}%", needle))
    }

    pub fn starts_with(&self, prefix: &str) -> Predicate {
        self.like(&format!("{}%", prefix))
    }
}

#[allow(clippy::should_implement_trait)]
impl Expr<bool> {
    pub fn and(self, rhs: Predicate) -> Predicate {
        Expr::from_node(Node::binary(BinaryOp::And, self.node, rhs.node))
    }

    pub fn or(self, rhs: Predicate) -> Predicate {
        Expr::from_node(Node::binary(BinaryOp::Or, self.node, rhs.node))
    }

    pub fn not(self) -> Predicate {
        Expr::from_node(Node::Not(Box::new(self.node)))
    }
}

/// Right-hand side of a comparison against an `Expr<T>`.
pub trait Operand<T> {
    fn into_operand(self) -> Node;
}

macro_rules! impl_numeric_literal {
    ($($ty:ty),*) => {
        $(impl<T: Numeric> Operand<T> for $ty {
            fn into_operand(self) -> Node {
                Node::Literal(Value::from(self))
            }
        })*
    };
}

impl_numeric_literal!(i16, i32, i64, f64);

impl<T: Numeric, U: Numeric> Operand<T> for Expr<U> {
    fn into_operand(self) -> Node {
        self.node
    }
}

impl<T: Numeric, U: Numeric> Operand<T> for &Expr<U> {
    fn into_operand(self) -> Node {
        self.node.clone()
    }
}

impl<T: Numeric, U: Numeric> Operand<T> for SubQuery<U> {
    fn into_operand(self) -> Node {
        Node::Subquery(Box::new(self.into_spec()))
    }
}

impl<T: Numeric, U: Numeric> Operand<T> for &SubQuery<U> {
    fn into_operand(self) -> Node {
        Node::Subquery(Box::new(self.spec().clone()))
    }
}

impl Operand<String> for &str {
    fn into_operand(self) -> Node {
        Node::Literal(Value::from(self))
    }
}

impl Operand<String> for String {
    fn into_operand(self) -> Node {
        Node::Literal(Value::Text(self))
    }
}

impl Operand<String> for &String {
    fn into_operand(self) -> Node {
        Node::Literal(Value::Text(self.clone()))
    }
}

impl Operand<String> for Expr<String> {
    fn into_operand(self) -> Node {
        self.node
    }
}

impl Operand<String> for &Expr<String> {
    fn into_operand(self) -> Node {
        self.node.clone()
    }
}

impl Operand<String> for SubQuery<String> {
    fn into_operand(self) -> Node {
        Node::Subquery(Box::new(self.into_spec()))
    }
}

impl Operand<bool> for bool {
    fn into_operand(self) -> Node {
        Node::Literal(Value::Bool(self))
    }
}

impl Operand<bool> for Predicate {
    fn into_operand(self) -> Node {
        self.node
    }
}

/// A value that becomes a typed expression: literals or existing expressions.
pub trait IntoExpr {
    type Output;
    fn into_expr(self) -> Expr<Self::Output>;
}

macro_rules! impl_into_expr_literal {
    ($($ty:ty => $out:ty),*) => {
        $(impl IntoExpr for $ty {
            type Output = $out;
            fn into_expr(self) -> Expr<$out> {
                Expr::from_node(Node::Literal(Value::from(self)))
            }
        })*
    };
}

impl_into_expr_literal!(i32 => i32, i64 => i64, f64 => f64, bool => bool, &str => String, String => String);

impl<T> IntoExpr for Expr<T> {
    type Output = T;
    fn into_expr(self) -> Expr<T> {
        self
    }
}

impl<T> IntoExpr for &Expr<T> {
    type Output = T;
    fn into_expr(self) -> Expr<T> {
        self.clone()
    }
}

/// Free-standing expression constructors.
pub struct Expressions;

impl Expressions {
    /// A constant select item, returned as-is in every row.
    pub fn constant<V: IntoExpr>(value: V) -> Expr<V::Output> {
        value.into_expr()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpecifier {
    pub(crate) target: Node,
    pub(crate) descending: bool,
    pub(crate) nulls: Option<NullsOrder>,
}

impl OrderSpecifier {
    fn new(target: Node, descending: bool) -> Self {
        Self {
            target,
            descending,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> Expr<i32> {
        Expr::column("member", "age", "age")
    }

    fn username() -> Expr<String> {
        Expr::column("member", "username", "username")
    }

    #[test]
    fn same_expression_builds_equal_nodes() {
        assert_eq!(age().avg().node(), age().avg().node());
        assert_ne!(age().avg().node(), age().sum().node());
    }

    #[test]
    fn numeric_literals_compare_against_any_numeric_path() {
        let p = age().goe(30);
        assert_eq!(
            p.into_node(),
            Node::binary(BinaryOp::Ge, age().into_node(), Node::Literal(Value::Int(30)))
        );
        let q = age().eq(age().max());
        assert!(matches!(q.node(), Node::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn alias_keeps_property_name_for_projections() {
        assert_eq!(username().node().projection_name(), Some("username"));
        assert_eq!(username().as_("name").node().projection_name(), Some("name"));
        assert_eq!(age().avg().node().projection_name(), None);
    }

    #[test]
    fn aggregates_strip_aliases() {
        let aliased = age().as_("years");
        assert_eq!(aliased.max().node(), age().max().node());
    }

    #[test]
    fn constants_are_literals() {
        assert_eq!(
            Expressions::constant("A").into_node(),
            Node::Literal(Value::Text("A".into()))
        );
    }

    #[test]
    fn order_specifier_tracks_null_placement() {
        let order = username().asc().nulls_last();
        assert!(!order.descending);
        assert_eq!(order.nulls, Some(NullsOrder::Last));
    }
}
