//! `CASE` expression builders.
//!
//! A searched case starts from [`CaseBuilder`], a simple case from
//! [`Expr::when`]. The first `then` fixes the result type; later branches
//! and `otherwise` must produce the same type.

use std::marker::PhantomData;

use crate::expr::{Expr, IntoExpr, Node, Operand, Predicate};

/// Entry point for `CASE WHEN <predicate> THEN ... END`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaseBuilder;

impl CaseBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn when(self, condition: Predicate) -> CaseWhen {
        CaseWhen {
            branches: Vec::new(),
            condition: condition.into_node(),
        }
    }
}

pub struct CaseWhen {
    branches: Vec<(Node, Node)>,
    condition: Node,
}

impl CaseWhen {
    pub fn then<V: IntoExpr>(mut self, value: V) -> Cases<V::Output> {
        self.branches
            .push((self.condition, value.into_expr().into_node()));
        Cases {
            branches: self.branches,
            _result: PhantomData,
        }
    }
}

pub struct Cases<R> {
    branches: Vec<(Node, Node)>,
    _result: PhantomData<fn() -> R>,
}

impl<R> Cases<R> {
    pub fn when(self, condition: Predicate) -> CasesWhen<R> {
        CasesWhen {
            branches: self.branches,
            condition: condition.into_node(),
            _result: PhantomData,
        }
    }

    pub fn otherwise(self, value: impl Operand<R>) -> Expr<R> {
        Expr::from_node(Node::Case {
            operand: None,
            branches: self.branches,
            otherwise: Box::new(value.into_operand()),
        })
    }
}

pub struct CasesWhen<R> {
    branches: Vec<(Node, Node)>,
    condition: Node,
    _result: PhantomData<fn() -> R>,
}

impl<R> CasesWhen<R> {
    pub fn then(mut self, value: impl Operand<R>) -> Cases<R> {
        self.branches.push((self.condition, value.into_operand()));
        Cases {
            branches: self.branches,
            _result: PhantomData,
        }
    }
}

/// `CASE operand WHEN value ...`, started by [`Expr::when`].
pub struct SimpleCaseWhen<T> {
    operand: Node,
    branches: Vec<(Node, Node)>,
    pending: Node,
    _operand: PhantomData<fn() -> T>,
}

impl<T> SimpleCaseWhen<T> {
    pub(crate) fn new(operand: Node, pending: Node) -> Self {
        Self {
            operand,
            branches: Vec::new(),
            pending,
            _operand: PhantomData,
        }
    }

    pub fn then<V: IntoExpr>(mut self, value: V) -> SimpleCases<T, V::Output> {
        self.branches
            .push((self.pending, value.into_expr().into_node()));
        SimpleCases {
            operand: self.operand,
            branches: self.branches,
            _types: PhantomData,
        }
    }
}

pub struct SimpleCases<T, R> {
    operand: Node,
    branches: Vec<(Node, Node)>,
    _types: PhantomData<fn() -> (T, R)>,
}

impl<T, R> SimpleCases<T, R> {
    pub fn when(self, value: impl Operand<T>) -> SimpleCasesWhen<T, R> {
        SimpleCasesWhen {
            operand: self.operand,
            branches: self.branches,
            pending: value.into_operand(),
            _types: PhantomData,
        }
    }

    pub fn otherwise(self, value: impl Operand<R>) -> Expr<R> {
        Expr::from_node(Node::Case {
            operand: Some(Box::new(self.operand)),
            branches: self.branches,
            otherwise: Box::new(value.into_operand()),
        })
    }
}

pub struct SimpleCasesWhen<T, R> {
    operand: Node,
    branches: Vec<(Node, Node)>,
    pending: Node,
    _types: PhantomData<fn() -> (T, R)>,
}

impl<T, R> SimpleCasesWhen<T, R> {
    pub fn then(mut self, value: impl Operand<R>) -> SimpleCases<T, R> {
        self.branches.push((self.pending, value.into_operand()));
        SimpleCases {
            operand: self.operand,
            branches: self.branches,
            _types: PhantomData,
        }
    }
}
