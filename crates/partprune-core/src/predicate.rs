//! Search predicates and the comparison operators pruning understands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// Relational operator of a comparison term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelOp {
    /// `=`
    Eq,
    /// `=` with collation-ordered comparison.
    EqTorder,
    /// `<=>`
    NullSafeEq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `= SOME (set)`, i.e. `IN`.
    EqSome,
    /// `<> ALL (set)`, i.e. `NOT IN`.
    NeAll,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `EXISTS (subquery)`
    Exists,
    /// `SUBSETEQ` and the other collection comparisons.
    SubsetEq,
}

/// Quantifier of an element-of-set term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    /// `op SOME (set)`
    Some,
    /// `op ALL (set)`
    All,
}

/// Operator a strategy pruner is asked to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningOp {
    /// key < v
    Lt,
    /// key <= v
    Le,
    /// key > v
    Gt,
    /// key >= v
    Ge,
    /// key = v
    Eq,
    /// key <> v
    Ne,
    /// key IN v
    In,
    /// key NOT IN v
    NotIn,
    /// key IS NULL
    IsNull,
}

impl PruningOp {
    /// Maps a relational operator; `None` for operators pruning ignores.
    #[must_use]
    pub fn from_rel_op(op: RelOp) -> Option<Self> {
        match op {
            RelOp::Eq | RelOp::EqTorder | RelOp::NullSafeEq => Some(Self::Eq),
            RelOp::Ne => Some(Self::Ne),
            RelOp::Gt => Some(Self::Gt),
            RelOp::Ge => Some(Self::Ge),
            RelOp::Lt => Some(Self::Lt),
            RelOp::Le => Some(Self::Le),
            RelOp::EqSome => Some(Self::In),
            RelOp::NeAll => Some(Self::NotIn),
            RelOp::IsNull => Some(Self::IsNull),
            RelOp::IsNotNull | RelOp::Exists | RelOp::SubsetEq => None,
        }
    }

    /// Maps a quantified element-of-set term. Only `= SOME` and `<> ALL`
    /// have a set meaning.
    #[must_use]
    pub fn from_quantified(op: RelOp, quantifier: Quantifier) -> Option<Self> {
        match (Self::from_rel_op(op)?, quantifier) {
            (Self::Eq | Self::In, Quantifier::Some) => Some(Self::In),
            (Self::Ne | Self::NotIn, Quantifier::All) => Some(Self::NotIn),
            _ => None,
        }
    }

    /// Operator seen from the other side: `v < key` is `key > v`.
    ///
    /// Set and null tests have no mirrored form.
    #[must_use]
    pub fn commute(self) -> Option<Self> {
        match self {
            Self::Lt => Some(Self::Gt),
            Self::Le => Some(Self::Ge),
            Self::Gt => Some(Self::Lt),
            Self::Ge => Some(Self::Le),
            Self::Eq | Self::Ne => Some(self),
            Self::In | Self::NotIn | Self::IsNull => None,
        }
    }
}

impl fmt::Display for PruningOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
        };
        f.write_str(text)
    }
}

/// Boolean predicate tree of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Both children hold.
    And(Box<Predicate>, Box<Predicate>),
    /// Either child holds.
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
    /// `lhs op rhs`; `rhs` is absent for unary tests such as `IS NULL`.
    Compare {
        /// Left operand.
        lhs: Expr,
        /// Operator.
        op: RelOp,
        /// Right operand.
        rhs: Option<Expr>,
    },
    /// `element op SOME|ALL (set)`
    ElementOf {
        /// Tested element.
        element: Expr,
        /// Operator applied per member.
        op: RelOp,
        /// Quantifier.
        quantifier: Quantifier,
        /// Collection operand.
        set: Expr,
    },
    /// `source LIKE pattern` or `source RLIKE pattern`.
    Like {
        /// Matched string.
        source: Expr,
        /// Pattern.
        pattern: Expr,
        /// True for RLIKE.
        regex: bool,
    },
}

impl Predicate {
    /// `lhs op rhs`
    #[must_use]
    pub fn compare(lhs: Expr, op: RelOp, rhs: Expr) -> Self {
        Self::Compare {
            lhs,
            op,
            rhs: Some(rhs),
        }
    }

    /// `expr IS NULL`
    #[must_use]
    pub fn is_null(expr: Expr) -> Self {
        Self::Compare {
            lhs: expr,
            op: RelOp::IsNull,
            rhs: None,
        }
    }

    /// `element IN (members)`
    #[must_use]
    pub fn in_list(element: Expr, members: Vec<Expr>) -> Self {
        Self::ElementOf {
            element,
            op: RelOp::Eq,
            quantifier: Quantifier::Some,
            set: Expr::sequence(members),
        }
    }

    /// `element NOT IN (members)`
    #[must_use]
    pub fn not_in_list(element: Expr, members: Vec<Expr>) -> Self {
        Self::ElementOf {
            element,
            op: RelOp::Ne,
            quantifier: Quantifier::All,
            set: Expr::sequence(members),
        }
    }

    /// `left AND right`
    #[must_use]
    pub fn and(left: Predicate, right: Predicate) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    /// `left OR right`
    #[must_use]
    pub fn or(left: Predicate, right: Predicate) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// `NOT inner`
    #[must_use]
    pub fn negate(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }
}
