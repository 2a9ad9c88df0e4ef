//! General (non-equality) join conditions.
//!
//! A [`CondExpr`] is a small expression tree over columns of either side.
//! It is compiled once against both input schemas into a
//! [`CompiledCondition`]; column references become positional and every
//! operator is type-checked, so an invalid condition fails at
//! configuration time rather than mid-probe. Evaluation uses three-valued
//! logic: any comparison or arithmetic touching a null yields unknown, and
//! unknown counts as "no match". `NOT_NA(..)` is the only way to test for
//! null explicitly.
//!
//! Compiled conditions are cached per executor in a [`ConditionCache`]
//! keyed by the condition source and both schemas.

use std::fmt;
use std::num::NonZeroUsize;
use std::ops;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use fframe_error::{FrameError, Result};
use fframe_types::{DataType, Scalar, Schema, StructArray};

/// Input side of a column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl BinaryOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    const fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div)
    }
}

/// Uncompiled condition.
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    Column { side: Side, name: String },
    Literal(Scalar),
    NotNa(Box<CondExpr>),
    Not(Box<CondExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<CondExpr>,
        rhs: Box<CondExpr>,
    },
}

impl CondExpr {
    pub fn left(name: impl Into<String>) -> Self {
        Self::Column {
            side: Side::Left,
            name: name.into(),
        }
    }

    pub fn right(name: impl Into<String>) -> Self {
        Self::Column {
            side: Side::Right,
            name: name.into(),
        }
    }

    pub fn lit(value: impl Into<Scalar>) -> Self {
        Self::Literal(value.into())
    }

    /// `NOT_NA(self)`: true iff the operand is not null.
    #[must_use]
    pub fn not_na(self) -> Self {
        Self::NotNa(Box::new(self))
    }

    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[must_use]
    pub fn equals(self, other: Self) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    #[must_use]
    pub fn not_equals(self, other: Self) -> Self {
        Self::binary(BinaryOp::NotEq, self, other)
    }

    #[must_use]
    pub fn less_than(self, other: Self) -> Self {
        Self::binary(BinaryOp::Lt, self, other)
    }

    #[must_use]
    pub fn less_or_equal(self, other: Self) -> Self {
        Self::binary(BinaryOp::LtEq, self, other)
    }

    #[must_use]
    pub fn greater_than(self, other: Self) -> Self {
        Self::binary(BinaryOp::Gt, self, other)
    }

    #[must_use]
    pub fn greater_or_equal(self, other: Self) -> Self {
        Self::binary(BinaryOp::GtEq, self, other)
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    /// Resolve column references and type-check against both schemas.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Configuration`] naming the offending fragment
    /// when a column is not declared on its side, operand kinds do not fit
    /// an operator, or the whole expression is not boolean.
    pub fn compile(&self, left: &Schema, right: &Schema) -> Result<CompiledCondition> {
        let (root, kind) = self.resolve(left, right)?;
        if !matches!(kind, ValueKind::Bool | ValueKind::Unknown) {
            return Err(FrameError::configuration(
                self.to_string(),
                format!("join condition must be boolean, found {kind}"),
            ));
        }
        Ok(CompiledCondition {
            source: Arc::from(self.to_string()),
            root: Arc::new(root),
        })
    }

    fn resolve(&self, left: &Schema, right: &Schema) -> Result<(Node, ValueKind)> {
        match self {
            Self::Column { side, name } => {
                let schema = match side {
                    Side::Left => left,
                    Side::Right => right,
                };
                let index = schema.index_of(name).ok_or_else(|| {
                    FrameError::configuration(
                        self.to_string(),
                        format!("column `{name}` is not declared on the {} side", side.as_str()),
                    )
                })?;
                let kind = ValueKind::of(schema.fields()[index].data_type());
                Ok((Node::Column { side: *side, index }, kind))
            }
            Self::Literal(value) => Ok((Node::Literal(value.clone()), ValueKind::of_scalar(value))),
            Self::NotNa(inner) => {
                let (node, _) = inner.resolve(left, right)?;
                Ok((Node::NotNa(Box::new(node)), ValueKind::Bool))
            }
            Self::Not(inner) => {
                let (node, kind) = inner.resolve(left, right)?;
                self.expect_kind(kind, ValueKind::Bool)?;
                Ok((Node::Not(Box::new(node)), ValueKind::Bool))
            }
            Self::Binary { op, lhs, rhs } => {
                let (l, lk) = lhs.resolve(left, right)?;
                let (r, rk) = rhs.resolve(left, right)?;
                let kind = if op.is_comparison() {
                    if !lk.comparable_with(rk) {
                        return Err(FrameError::configuration(
                            self.to_string(),
                            format!("cannot compare {lk} with {rk}"),
                        ));
                    }
                    ValueKind::Bool
                } else if op.is_arithmetic() {
                    self.expect_kind(lk, ValueKind::Numeric)?;
                    self.expect_kind(rk, ValueKind::Numeric)?;
                    ValueKind::Numeric
                } else {
                    self.expect_kind(lk, ValueKind::Bool)?;
                    self.expect_kind(rk, ValueKind::Bool)?;
                    ValueKind::Bool
                };
                Ok((
                    Node::Binary {
                        op: *op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    kind,
                ))
            }
        }
    }

    fn expect_kind(&self, found: ValueKind, expected: ValueKind) -> Result<()> {
        if found == expected || found == ValueKind::Unknown {
            Ok(())
        } else {
            Err(FrameError::configuration(
                self.to_string(),
                format!("expected {expected} operand, found {found}"),
            ))
        }
    }
}

impl fmt::Display for CondExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column { side, name } => write!(f, "{}.{name}", side.as_str()),
            Self::Literal(value) => write!(f, "{value}"),
            Self::NotNa(inner) => write!(f, "NOT_NA({inner})"),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
            Self::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

impl ops::Not for CondExpr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

macro_rules! impl_arith_op {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl ops::$trait for CondExpr {
                type Output = Self;

                fn $method(self, rhs: Self) -> Self {
                    Self::binary(BinaryOp::$op, self, rhs)
                }
            }
        )*
    };
}

impl_arith_op!(Add::add => Add, Sub::sub => Sub, Mul::mul => Mul, Div::div => Div);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Numeric,
    Text,
    /// A null literal; fits anywhere.
    Unknown,
}

impl ValueKind {
    const fn of(data_type: DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Bool,
            DataType::Utf8 | DataType::DictUtf8 => Self::Text,
            DataType::Null => Self::Unknown,
            _ => Self::Numeric,
        }
    }

    const fn of_scalar(value: &Scalar) -> Self {
        match value {
            Scalar::Null => Self::Unknown,
            Scalar::Boolean(_) => Self::Bool,
            Scalar::Int(_) | Scalar::UInt(_) | Scalar::Float(_) => Self::Numeric,
            Scalar::Utf8(_) => Self::Text,
        }
    }

    fn comparable_with(self, other: Self) -> bool {
        self == other || self == Self::Unknown || other == Self::Unknown
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "boolean",
            Self::Numeric => "numeric",
            Self::Text => "string",
            Self::Unknown => "null",
        })
    }
}

/// Row access for condition evaluation, independent of array layout.
pub trait TableHandle {
    fn schema(&self) -> &Schema;

    fn num_rows(&self) -> usize;

    /// Whether `column` holds a value at `row`.
    fn is_valid(&self, column: usize, row: usize) -> bool;

    /// Decoded value; `Scalar::Null` for an invalid slot.
    fn scalar(&self, column: usize, row: usize) -> Scalar;
}

impl TableHandle for StructArray {
    fn schema(&self) -> &Schema {
        Self::schema(self)
    }

    fn num_rows(&self) -> usize {
        Self::num_rows(self)
    }

    fn is_valid(&self, column: usize, row: usize) -> bool {
        Self::is_valid(self, row) && self.column(column).is_valid(row)
    }

    fn scalar(&self, column: usize, row: usize) -> Scalar {
        if TableHandle::is_valid(self, column, row) {
            self.column(column).scalar_at(row)
        } else {
            Scalar::Null
        }
    }
}

/// One row of a table handle.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a dyn TableHandle,
    row: usize,
}

impl<'a> RowRef<'a> {
    #[must_use]
    pub fn new(table: &'a dyn TableHandle, row: usize) -> Self {
        Self { table, row }
    }

    #[must_use]
    pub const fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn is_valid(&self, column: usize) -> bool {
        self.table.is_valid(column, self.row)
    }

    #[must_use]
    pub fn value(&self, column: usize) -> Scalar {
        self.table.scalar(column, self.row)
    }
}

impl fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef")
            .field("schema", &self.table.schema().to_string())
            .field("row", &self.row)
            .finish()
    }
}

#[derive(Debug)]
enum Node {
    Column { side: Side, index: usize },
    Literal(Scalar),
    NotNa(Box<Node>),
    Not(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

impl Node {
    fn eval(&self, left: RowRef<'_>, right: RowRef<'_>) -> Scalar {
        match self {
            Self::Column { side, index } => match side {
                Side::Left => left.value(*index),
                Side::Right => right.value(*index),
            },
            Self::Literal(value) => value.clone(),
            Self::NotNa(inner) => Scalar::Boolean(!inner.eval(left, right).is_null()),
            Self::Not(inner) => match inner.eval(left, right) {
                Scalar::Boolean(b) => Scalar::Boolean(!b),
                _ => Scalar::Null,
            },
            Self::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    let l = lhs.eval(left, right);
                    if l == Scalar::Boolean(false) {
                        return l;
                    }
                    kleene_and(&l, &rhs.eval(left, right))
                }
                BinaryOp::Or => {
                    let l = lhs.eval(left, right);
                    if l == Scalar::Boolean(true) {
                        return l;
                    }
                    kleene_or(&l, &rhs.eval(left, right))
                }
                _ => {
                    let l = lhs.eval(left, right);
                    let r = rhs.eval(left, right);
                    if l.is_null() || r.is_null() {
                        return Scalar::Null;
                    }
                    if op.is_comparison() {
                        compare(*op, &l, &r)
                    } else {
                        arithmetic(*op, &l, &r)
                    }
                }
            },
        }
    }
}

fn kleene_and(l: &Scalar, r: &Scalar) -> Scalar {
    match (l, r) {
        (Scalar::Boolean(false), _) | (_, Scalar::Boolean(false)) => Scalar::Boolean(false),
        (Scalar::Boolean(true), Scalar::Boolean(true)) => Scalar::Boolean(true),
        _ => Scalar::Null,
    }
}

fn kleene_or(l: &Scalar, r: &Scalar) -> Scalar {
    match (l, r) {
        (Scalar::Boolean(true), _) | (_, Scalar::Boolean(true)) => Scalar::Boolean(true),
        (Scalar::Boolean(false), Scalar::Boolean(false)) => Scalar::Boolean(false),
        _ => Scalar::Null,
    }
}

fn compare(op: BinaryOp, l: &Scalar, r: &Scalar) -> Scalar {
    use std::cmp::Ordering::{Equal, Greater, Less};

    let Some(ord) = l.compare(r) else {
        // NaN: only inequality holds.
        return Scalar::Boolean(op == BinaryOp::NotEq);
    };
    Scalar::Boolean(match op {
        BinaryOp::Eq => ord == Equal,
        BinaryOp::NotEq => ord != Equal,
        BinaryOp::Lt => ord == Less,
        BinaryOp::LtEq => ord != Greater,
        BinaryOp::Gt => ord == Greater,
        BinaryOp::GtEq => ord != Less,
        _ => false,
    })
}

fn arithmetic(op: BinaryOp, l: &Scalar, r: &Scalar) -> Scalar {
    let exact = match (l, r) {
        (Scalar::Int(a), Scalar::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(*b).map(Scalar::Int),
            BinaryOp::Sub => a.checked_sub(*b).map(Scalar::Int),
            BinaryOp::Mul => a.checked_mul(*b).map(Scalar::Int),
            _ => None,
        },
        (Scalar::UInt(a), Scalar::UInt(b)) => match op {
            BinaryOp::Add => a.checked_add(*b).map(Scalar::UInt),
            BinaryOp::Sub => a.checked_sub(*b).map(Scalar::UInt),
            BinaryOp::Mul => a.checked_mul(*b).map(Scalar::UInt),
            _ => None,
        },
        _ => None,
    };
    if let Some(value) = exact {
        return value;
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Scalar::Null;
    };
    Scalar::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => a / b,
    })
}

/// Type-checked condition with positional column references.
///
/// Cheap to clone; evaluation has no side effects.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    source: Arc<str>,
    root: Arc<Node>,
}

impl CompiledCondition {
    /// Rendered source, e.g. `(left.a < right.b)`.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True only when the condition evaluates to true; unknown is false.
    #[must_use]
    pub fn evaluate(&self, left: RowRef<'_>, right: RowRef<'_>) -> bool {
        matches!(self.root.eval(left, right), Scalar::Boolean(true))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }
}

/// Eviction policy of the per-executor condition cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    NeverEvict,
    Lru {
        capacity: usize,
    },
}

/// Structural identity of a [`CondExpr`]; literals compare by variant and,
/// for floats, by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ExprKey {
    Column(Side, String),
    Null,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(u64),
    Utf8(String),
    NotNa(Box<ExprKey>),
    Not(Box<ExprKey>),
    Binary(BinaryOp, Box<ExprKey>, Box<ExprKey>),
}

impl From<&CondExpr> for ExprKey {
    fn from(expr: &CondExpr) -> Self {
        match expr {
            CondExpr::Column { side, name } => Self::Column(*side, name.clone()),
            CondExpr::Literal(value) => match value {
                Scalar::Null => Self::Null,
                Scalar::Boolean(v) => Self::Boolean(*v),
                Scalar::Int(v) => Self::Int(*v),
                Scalar::UInt(v) => Self::UInt(*v),
                Scalar::Float(v) => Self::Float(v.to_bits()),
                Scalar::Utf8(v) => Self::Utf8(v.clone()),
            },
            CondExpr::NotNa(inner) => Self::NotNa(Box::new(Self::from(&**inner))),
            CondExpr::Not(inner) => Self::Not(Box::new(Self::from(&**inner))),
            CondExpr::Binary { op, lhs, rhs } => Self::Binary(
                *op,
                Box::new(Self::from(&**lhs)),
                Box::new(Self::from(&**rhs)),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    expr: ExprKey,
    left: Schema,
    right: Schema,
}

enum CacheStore {
    Unbounded(HashMap<CacheKey, CompiledCondition>),
    Lru(LruCache<CacheKey, CompiledCondition>),
}

/// Compiled conditions keyed by expression tree and both input schemas.
pub struct ConditionCache {
    policy: CachePolicy,
    store: Mutex<CacheStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ConditionCache {
    /// # Errors
    ///
    /// Returns a configuration error for an LRU capacity of zero.
    pub fn new(policy: CachePolicy) -> Result<Self> {
        let store = match policy {
            CachePolicy::NeverEvict => CacheStore::Unbounded(HashMap::new()),
            CachePolicy::Lru { capacity } => {
                let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
                    FrameError::configuration(
                        "condition_cache.capacity = 0",
                        "LRU condition cache needs a capacity of at least 1",
                    )
                })?;
                CacheStore::Lru(LruCache::new(capacity))
            }
        };
        Ok(Self::with_store(policy, store))
    }

    /// A cache that never evicts.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_store(CachePolicy::NeverEvict, CacheStore::Unbounded(HashMap::new()))
    }

    fn with_store(policy: CachePolicy, store: CacheStore) -> Self {
        Self {
            policy,
            store: Mutex::new(store),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached compilation of `expr` against the two schemas.
    ///
    /// # Errors
    ///
    /// Propagates compilation errors; failures are not cached.
    pub fn get_or_compile(
        &self,
        expr: &CondExpr,
        left: &Schema,
        right: &Schema,
    ) -> Result<CompiledCondition> {
        let key = CacheKey {
            expr: ExprKey::from(expr),
            left: left.clone(),
            right: right.clone(),
        };
        let mut store = self.store.lock();
        let cached = match &mut *store {
            CacheStore::Unbounded(map) => map.get(&key).cloned(),
            CacheStore::Lru(lru) => lru.get(&key).cloned(),
        };
        if let Some(compiled) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(compiled);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = expr.compile(left, right)?;
        tracing::debug!(source = %expr, "compiled join condition");
        match &mut *store {
            CacheStore::Unbounded(map) => {
                map.insert(key, compiled.clone());
            }
            CacheStore::Lru(lru) => {
                lru.put(key, compiled.clone());
            }
        }
        Ok(compiled)
    }

    #[must_use]
    pub const fn policy(&self) -> CachePolicy {
        self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.store.lock() {
            CacheStore::Unbounded(map) => map.len(),
            CacheStore::Lru(lru) => lru.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        match &mut *self.store.lock() {
            CacheStore::Unbounded(map) => map.clear(),
            CacheStore::Lru(lru) => lru.clear(),
        }
    }
}

impl fmt::Debug for ConditionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionCache")
            .field("policy", &self.policy)
            .field("len", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
