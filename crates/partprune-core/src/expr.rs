//! Partition expressions and the operand expressions of search predicates.
//!
//! Expressions are owned trees. The partition expression is persisted on the
//! master descriptor as a `bincode` stream and decoded again for every
//! pruning context, so the decoded tree is never shared between operations.

use chrono::{Datelike, Duration, Local, NaiveDateTime, Timelike, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partition::AttrId;
use crate::value::{DbType, DbValue};

/// Attribute values of one row, keyed by attribute id.
pub type Row = FxHashMap<AttrId, DbValue>;

/// Field extracted by [`ArithOp::Extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    /// Calendar year.
    Year,
    /// Month of year (1-12).
    Month,
    /// Day of month (1-31).
    Day,
    /// Hour of day.
    Hour,
    /// Minute of hour.
    Minute,
    /// Second of minute.
    Second,
}

/// Arithmetic and pseudo-constant operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    /// `left + right`
    Add,
    /// `left - right`
    Sub,
    /// `left * right`
    Mul,
    /// `left / right`
    Div,
    /// `left % right`
    Mod,
    /// `-left`
    Neg,
    /// `CAST(left AS ty)`
    Cast(DbType),
    /// `EXTRACT(part FROM left)`
    Extract(DatePart),
    /// `SYS_DATE`
    SysDate,
    /// `SYS_TIME`
    SysTime,
    /// `SYS_TIMESTAMP`
    SysTimestamp,
    /// `UTC_DATE()`
    UtcDate,
    /// `UTC_TIME()`
    UtcTime,
}

impl ArithOp {
    /// Operators whose value depends only on the statement clock.
    #[must_use]
    pub fn is_pseudo_constant(self) -> bool {
        matches!(
            self,
            Self::SysDate | Self::SysTime | Self::SysTimestamp | Self::UtcDate | Self::UtcTime
        )
    }
}

/// Kind of a function node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Multi-column index key; operand `i` is key column `i`.
    MultiKey,
    /// Literal collection, e.g. the right side of `IN (1, 2, ?)`.
    Sequence,
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal value.
    Constant(DbValue),
    /// Positional host variable, resolved from the statement parameters.
    Param(usize),
    /// Column reference.
    Attribute {
        /// Attribute id.
        id: AttrId,
        /// Column domain.
        ty: DbType,
    },
    /// Arithmetic node with up to three operands.
    Arith {
        /// Operator.
        op: ArithOp,
        /// First operand.
        left: Option<Box<Expr>>,
        /// Second operand.
        right: Option<Box<Expr>>,
        /// Third operand.
        third: Option<Box<Expr>>,
    },
    /// Function node.
    Function {
        /// Function kind.
        kind: FunctionKind,
        /// Operands in order.
        operands: Vec<Expr>,
    },
}

impl Expr {
    /// Literal value.
    pub fn constant(value: impl Into<DbValue>) -> Self {
        Self::Constant(value.into())
    }

    /// Positional parameter.
    #[must_use]
    pub fn param(index: usize) -> Self {
        Self::Param(index)
    }

    /// Column reference.
    #[must_use]
    pub fn attr(id: u32, ty: DbType) -> Self {
        Self::Attribute { id: AttrId(id), ty }
    }

    /// Binary arithmetic node.
    #[must_use]
    pub fn binary(op: ArithOp, left: Expr, right: Expr) -> Self {
        Self::Arith {
            op,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            third: None,
        }
    }

    /// Unary arithmetic node (negation, cast, extract).
    #[must_use]
    pub fn unary(op: ArithOp, operand: Expr) -> Self {
        Self::Arith {
            op,
            left: Some(Box::new(operand)),
            right: None,
            third: None,
        }
    }

    /// Operand-less pseudo-constant such as `SYS_DATE`.
    #[must_use]
    pub fn pseudo(op: ArithOp) -> Self {
        Self::Arith {
            op,
            left: None,
            right: None,
            third: None,
        }
    }

    /// Literal collection.
    #[must_use]
    pub fn sequence(operands: Vec<Expr>) -> Self {
        Self::Function {
            kind: FunctionKind::Sequence,
            operands,
        }
    }

    /// Multi-column index key.
    #[must_use]
    pub fn multi_key(operands: Vec<Expr>) -> Self {
        Self::Function {
            kind: FunctionKind::MultiKey,
            operands,
        }
    }

    /// Structural equality used to recognise the partition expression
    /// inside a predicate.
    ///
    /// Constants match when their values compare equal, parameters when they
    /// share a position, attributes when they share an id. Arithmetic and
    /// function nodes match operator-for-operator, operand-for-operand.
    #[must_use]
    pub fn matches(&self, other: &Expr) -> bool {
        match (self, other) {
            (Self::Constant(a), Self::Constant(b)) => a.equals(b),
            (Self::Param(a), Self::Param(b)) => a == b,
            (Self::Attribute { id: a, .. }, Self::Attribute { id: b, .. }) => a == b,
            (
                Self::Arith {
                    op: op_a,
                    left: l_a,
                    right: r_a,
                    third: t_a,
                },
                Self::Arith {
                    op: op_b,
                    left: l_b,
                    right: r_b,
                    third: t_b,
                },
            ) => {
                op_a == op_b
                    && operands_match(l_a.as_deref(), l_b.as_deref())
                    && operands_match(r_a.as_deref(), r_b.as_deref())
                    && operands_match(t_a.as_deref(), t_b.as_deref())
            }
            (
                Self::Function {
                    kind: k_a,
                    operands: o_a,
                },
                Self::Function {
                    kind: k_b,
                    operands: o_b,
                },
            ) => {
                k_a == k_b
                    && o_a.len() == o_b.len()
                    && o_a.iter().zip(o_b).all(|(a, b)| a.matches(b))
            }
            _ => false,
        }
    }

    /// Returns the attribute id if the expression is a bare column.
    #[must_use]
    pub fn bare_attribute(&self) -> Option<AttrId> {
        match self {
            Self::Attribute { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Evaluates the expression against a row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] for missing attributes or parameters and
    /// for arithmetic failures such as division by zero.
    pub fn evaluate(&self, row: &Row, ctx: &EvalContext<'_>) -> Result<DbValue> {
        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Param(index) => ctx.param(*index).cloned(),
            Self::Attribute { id, .. } => row
                .get(id)
                .cloned()
                .ok_or_else(|| Error::Evaluation(format!("row has no value for {id}"))),
            Self::Arith {
                op,
                left,
                right,
                third: _,
            } => {
                let left = left
                    .as_deref()
                    .map(|e| e.evaluate(row, ctx))
                    .transpose()?;
                let right = right
                    .as_deref()
                    .map(|e| e.evaluate(row, ctx))
                    .transpose()?;
                apply_arith(*op, left, right, ctx)
            }
            Self::Function { kind, operands } => {
                let values = operands
                    .iter()
                    .map(|e| e.evaluate(row, ctx))
                    .collect::<Result<Vec<_>>>()?;
                match kind {
                    FunctionKind::Sequence => Ok(DbValue::Set(values)),
                    FunctionKind::MultiKey => Err(Error::Evaluation(
                        "index keys cannot be evaluated as values".to_string(),
                    )),
                }
            }
        }
    }

    /// Reduces the expression to a value without a row.
    ///
    /// Constants, parameters, literal sequences, pseudo-constants and
    /// arithmetic over those fold; anything referencing a column or an index
    /// key does not, and yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if a foldable expression fails to evaluate.
    pub fn fold_constant(&self, ctx: &EvalContext<'_>) -> Result<Option<DbValue>> {
        if !self.is_foldable() {
            return Ok(None);
        }
        self.evaluate(&Row::default(), ctx).map(Some)
    }

    fn is_foldable(&self) -> bool {
        match self {
            Self::Constant(_) | Self::Param(_) => true,
            Self::Attribute { .. } => false,
            Self::Arith {
                left, right, third, ..
            } => [left, right, third]
                .into_iter()
                .flatten()
                .all(|e| e.is_foldable()),
            Self::Function {
                kind: FunctionKind::Sequence,
                operands,
            } => operands.iter().all(Expr::is_foldable),
            Self::Function {
                kind: FunctionKind::MultiKey,
                ..
            } => false,
        }
    }
}

fn operands_match(a: Option<&Expr>, b: Option<&Expr>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    }
}

fn apply_arith(
    op: ArithOp,
    left: Option<DbValue>,
    right: Option<DbValue>,
    ctx: &EvalContext<'_>,
) -> Result<DbValue> {
    match op {
        ArithOp::SysDate => return Ok(DbValue::Date(ctx.now_local.date())),
        ArithOp::SysTime => return Ok(DbValue::Time(ctx.now_local.time())),
        ArithOp::SysTimestamp => return Ok(DbValue::Timestamp(ctx.now_local)),
        ArithOp::UtcDate => return Ok(DbValue::Date(ctx.now_utc.date())),
        ArithOp::UtcTime => return Ok(DbValue::Time(ctx.now_utc.time())),
        _ => {}
    }

    let left = left.ok_or_else(|| Error::Evaluation(format!("{op:?} needs an operand")))?;
    if left.is_null() {
        return Ok(DbValue::Null);
    }

    match op {
        ArithOp::Neg => match left {
            DbValue::Int(i) => i
                .checked_neg()
                .map(DbValue::Int)
                .ok_or_else(|| overflow(op)),
            DbValue::Double(d) => Ok(DbValue::Double(-d)),
            other => Err(type_error(op, &other)),
        },
        ArithOp::Cast(ty) => left.cast_to(ty).ok_or_else(|| {
            Error::TypeMismatch(format!("cannot cast {left} to {ty}"))
        }),
        ArithOp::Extract(part) => extract(part, &left),
        _ => {
            let right =
                right.ok_or_else(|| Error::Evaluation(format!("{op:?} needs two operands")))?;
            if right.is_null() {
                return Ok(DbValue::Null);
            }
            binary_arith(op, left, right)
        }
    }
}

fn binary_arith(op: ArithOp, left: DbValue, right: DbValue) -> Result<DbValue> {
    match (left, right) {
        (DbValue::Int(a), DbValue::Int(b)) => {
            let result = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div | ArithOp::Mod if b == 0 => {
                    return Err(Error::Evaluation("division by zero".to_string()))
                }
                ArithOp::Div => a.checked_div(b),
                ArithOp::Mod => a.checked_rem(b),
                _ => return Err(type_error(op, &DbValue::Int(a))),
            };
            result.map(DbValue::Int).ok_or_else(|| overflow(op))
        }
        (a @ (DbValue::Int(_) | DbValue::Double(_)), b @ (DbValue::Int(_) | DbValue::Double(_))) => {
            let (a, b) = (as_f64(&a), as_f64(&b));
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div | ArithOp::Mod if b == 0.0 => {
                    return Err(Error::Evaluation("division by zero".to_string()))
                }
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
                _ => return Err(Error::Evaluation(format!("{op:?} is not arithmetic"))),
            };
            Ok(DbValue::Double(result))
        }
        (DbValue::Date(d), DbValue::Int(days)) => {
            let delta = match op {
                ArithOp::Add => days,
                ArithOp::Sub => days.checked_neg().ok_or_else(|| overflow(op))?,
                _ => return Err(type_error(op, &DbValue::Date(d))),
            };
            Duration::try_days(delta)
                .and_then(|delta| d.checked_add_signed(delta))
                .map(DbValue::Date)
                .ok_or_else(|| overflow(op))
        }
        (DbValue::Timestamp(ts), DbValue::Int(secs)) => {
            let delta = match op {
                ArithOp::Add => secs,
                ArithOp::Sub => secs.checked_neg().ok_or_else(|| overflow(op))?,
                _ => return Err(type_error(op, &DbValue::Timestamp(ts))),
            };
            Duration::try_seconds(delta)
                .and_then(|delta| ts.checked_add_signed(delta))
                .map(DbValue::Timestamp)
                .ok_or_else(|| overflow(op))
        }
        (a, _) => Err(type_error(op, &a)),
    }
}

fn extract(part: DatePart, value: &DbValue) -> Result<DbValue> {
    let field = match (part, value) {
        (DatePart::Year, DbValue::Date(d)) => d.year(),
        (DatePart::Month, DbValue::Date(d)) => d.month() as i32,
        (DatePart::Day, DbValue::Date(d)) => d.day() as i32,
        (DatePart::Year, DbValue::Timestamp(ts)) => ts.year(),
        (DatePart::Month, DbValue::Timestamp(ts)) => ts.month() as i32,
        (DatePart::Day, DbValue::Timestamp(ts)) => ts.day() as i32,
        (DatePart::Hour, DbValue::Timestamp(ts)) => ts.hour() as i32,
        (DatePart::Minute, DbValue::Timestamp(ts)) => ts.minute() as i32,
        (DatePart::Second, DbValue::Timestamp(ts)) => ts.second() as i32,
        (DatePart::Hour, DbValue::Time(t)) => t.hour() as i32,
        (DatePart::Minute, DbValue::Time(t)) => t.minute() as i32,
        (DatePart::Second, DbValue::Time(t)) => t.second() as i32,
        _ => {
            return Err(Error::TypeMismatch(format!(
                "cannot extract {part:?} from {value}"
            )))
        }
    };
    Ok(DbValue::Int(i64::from(field)))
}

fn as_f64(value: &DbValue) -> f64 {
    match value {
        DbValue::Int(i) => *i as f64,
        DbValue::Double(d) => *d,
        _ => f64::NAN,
    }
}

fn overflow(op: ArithOp) -> Error {
    Error::Evaluation(format!("{op:?} overflowed"))
}

fn type_error(op: ArithOp, value: &DbValue) -> Error {
    Error::TypeMismatch(format!("{op:?} does not apply to {value}"))
}

/// The compiled partitioning expression of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionExpression {
    /// Expression computing the partition key from a row.
    pub root: Expr,
    /// Domain of the partition key; hash pruning coerces values into it.
    pub domain: DbType,
}

impl PartitionExpression {
    /// Creates a partition expression.
    #[must_use]
    pub fn new(root: Expr, domain: DbType) -> Self {
        Self { root, domain }
    }

    /// Partition expression that is a bare column.
    #[must_use]
    pub fn column(id: u32, ty: DbType) -> Self {
        Self::new(Expr::attr(id, ty), ty)
    }

    /// Encodes the expression for storage on the master descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a stored expression stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the stream is corrupt.
    pub fn decode(stream: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(stream)?)
    }

    /// Attribute id when the expression is a bare column, enabling
    /// index-key pruning.
    #[must_use]
    pub fn key_attribute(&self) -> Option<AttrId> {
        self.root.bare_attribute()
    }
}

/// Statement-level inputs for evaluating expressions: bound parameters and
/// the statement clock.
#[derive(Debug, Clone)]
pub struct EvalContext<'a> {
    params: &'a [DbValue],
    now_local: NaiveDateTime,
    now_utc: NaiveDateTime,
}

impl<'a> EvalContext<'a> {
    /// Context reading the system clock once.
    #[must_use]
    pub fn new(params: &'a [DbValue]) -> Self {
        Self {
            params,
            now_local: Local::now().naive_local(),
            now_utc: Utc::now().naive_utc(),
        }
    }

    /// Context with a pinned clock, used for local and UTC time alike.
    #[must_use]
    pub fn with_clock(params: &'a [DbValue], now: NaiveDateTime) -> Self {
        Self {
            params,
            now_local: now,
            now_utc: now,
        }
    }

    /// Bound parameter at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if no parameter is bound there.
    pub fn param(&self, index: usize) -> Result<&'a DbValue> {
        self.params.get(index).ok_or_else(|| {
            Error::Evaluation(format!(
                "parameter {index} is not bound ({} bound)",
                self.params.len()
            ))
        })
    }
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        Self::new(&[])
    }
}
