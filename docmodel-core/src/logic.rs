//! Logic expressions, default values and virtual field providers
//!
//! The expression language itself lives elsewhere; the engine only needs to
//! know which variables an expression reads and how to evaluate it against
//! the current field values of a document.

use crate::error::ExpressionError;
use crate::values::{FieldValue, LookupValueByIdSupplier};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Outcome of evaluating a boolean logic expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicResult {
    True,
    False,
    /// A referenced variable was missing; callers keep their previous state.
    NoResult,
}

impl LogicResult {
    pub fn from_bool(value: bool) -> Self {
        if value {
            LogicResult::True
        } else {
            LogicResult::False
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LogicResult::True => Some(true),
            LogicResult::False => Some(false),
            LogicResult::NoResult => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, LogicResult::True)
    }
}

/// Named variables an expression is evaluated against
pub trait Evaluatee {
    /// Current value of a variable; `None` if absent or null.
    fn value(&self, name: &str) -> Option<&FieldValue>;

    /// Whether the variable exists at all (it may still be null).
    fn has_variable(&self, name: &str) -> bool;
}

impl Evaluatee for BTreeMap<String, FieldValue> {
    fn value(&self, name: &str) -> Option<&FieldValue> {
        self.get(name)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

/// A boolean expression over named variables
pub trait LogicExpression: Send + Sync + fmt::Debug {
    fn evaluate(&self, ctx: &dyn Evaluatee) -> LogicResult;

    /// Variables this expression reads.
    fn parameters(&self) -> BTreeSet<String>;

    /// `Some` when the expression evaluates the same regardless of input.
    fn constant_value(&self) -> Option<bool> {
        None
    }

    fn is_constant_true(&self) -> bool {
        self.constant_value() == Some(true)
    }

    fn is_constant_false(&self) -> bool {
        self.constant_value() == Some(false)
    }
}

pub type SharedLogic = Arc<dyn LogicExpression>;

/// Constant expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantLogic(bool);

impl ConstantLogic {
    pub const TRUE: ConstantLogic = ConstantLogic(true);
    pub const FALSE: ConstantLogic = ConstantLogic(false);

    pub fn shared(value: bool) -> SharedLogic {
        Arc::new(ConstantLogic(value))
    }
}

impl LogicExpression for ConstantLogic {
    fn evaluate(&self, _ctx: &dyn Evaluatee) -> LogicResult {
        LogicResult::from_bool(self.0)
    }

    fn parameters(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn constant_value(&self) -> Option<bool> {
        Some(self.0)
    }
}

type LogicFn = dyn Fn(&dyn Evaluatee) -> bool + Send + Sync;

/// Expression backed by a closure over declared parameters.
///
/// Returns [`LogicResult::NoResult`] when any declared parameter is missing
/// from the evaluatee.
pub struct FnLogic {
    name: String,
    parameters: BTreeSet<String>,
    eval: Box<LogicFn>,
}

impl FnLogic {
    pub fn new<I, S, F>(name: impl Into<String>, parameters: I, eval: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&dyn Evaluatee) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            eval: Box::new(eval),
        }
    }

    pub fn shared<I, S, F>(name: impl Into<String>, parameters: I, eval: F) -> SharedLogic
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&dyn Evaluatee) -> bool + Send + Sync + 'static,
    {
        Arc::new(Self::new(name, parameters, eval))
    }
}

impl fmt::Debug for FnLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLogic")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl LogicExpression for FnLogic {
    fn evaluate(&self, ctx: &dyn Evaluatee) -> LogicResult {
        if self.parameters.iter().any(|p| !ctx.has_variable(p)) {
            return LogicResult::NoResult;
        }
        LogicResult::from_bool((self.eval)(ctx))
    }

    fn parameters(&self) -> BTreeSet<String> {
        self.parameters.clone()
    }
}

/// Disjunction of two expressions
#[derive(Debug, Clone)]
pub struct OrLogic {
    left: SharedLogic,
    right: SharedLogic,
}

impl LogicExpression for OrLogic {
    fn evaluate(&self, ctx: &dyn Evaluatee) -> LogicResult {
        match (self.left.evaluate(ctx), self.right.evaluate(ctx)) {
            (LogicResult::True, _) | (_, LogicResult::True) => LogicResult::True,
            (LogicResult::False, LogicResult::False) => LogicResult::False,
            _ => LogicResult::NoResult,
        }
    }

    fn parameters(&self) -> BTreeSet<String> {
        let mut parameters = self.left.parameters();
        parameters.extend(self.right.parameters());
        parameters
    }

    fn constant_value(&self) -> Option<bool> {
        match (self.left.constant_value(), self.right.constant_value()) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        }
    }
}

/// `left OR right`, folding constants.
pub fn or(left: SharedLogic, right: SharedLogic) -> SharedLogic {
    if left.is_constant_true() || right.is_constant_false() {
        return left;
    }
    if right.is_constant_true() || left.is_constant_false() {
        return right;
    }
    Arc::new(OrLogic { left, right })
}

/// Computes a field's value for a freshly created document
pub trait DefaultValueExpression: Send + Sync + fmt::Debug {
    fn evaluate(&self, ctx: &dyn Evaluatee) -> Result<Option<FieldValue>, ExpressionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDefault(pub Option<FieldValue>);

impl ConstantDefault {
    pub fn of(value: impl Into<FieldValue>) -> Self {
        Self(Some(value.into()))
    }
}

impl DefaultValueExpression for ConstantDefault {
    fn evaluate(&self, _ctx: &dyn Evaluatee) -> Result<Option<FieldValue>, ExpressionError> {
        Ok(self.0.clone())
    }
}

/// Computes the value of a virtual field from other fields
pub trait FieldValueProvider: Send + Sync + fmt::Debug {
    fn depends_on(&self) -> BTreeSet<String>;

    fn calculate(&self, ctx: &dyn Evaluatee) -> Result<Option<FieldValue>, ExpressionError>;
}

type ProviderResult = Result<Option<FieldValue>, ExpressionError>;

type ProviderFn = dyn Fn(&dyn Evaluatee) -> ProviderResult + Send + Sync;

/// Closure-backed [`FieldValueProvider`]
pub struct FnValueProvider {
    depends_on: BTreeSet<String>,
    calculate: Box<ProviderFn>,
}

impl FnValueProvider {
    pub fn new<I, S, F>(depends_on: I, calculate: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&dyn Evaluatee) -> ProviderResult + Send + Sync + 'static,
    {
        Self {
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            calculate: Box::new(calculate),
        }
    }
}

impl fmt::Debug for FnValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValueProvider")
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

impl FieldValueProvider for FnValueProvider {
    fn depends_on(&self) -> BTreeSet<String> {
        self.depends_on.clone()
    }

    fn calculate(&self, ctx: &dyn Evaluatee) -> Result<Option<FieldValue>, ExpressionError> {
        (self.calculate)(ctx)
    }
}

/// Lookup attached to a field: the fields its option list depends on and an
/// optional resolver for raw ids.
#[derive(Debug, Clone, Default)]
pub struct LookupDescriptor {
    pub depends_on: BTreeSet<String>,
    pub supplier: Option<Arc<dyn LookupValueByIdSupplier>>,
}

impl LookupDescriptor {
    pub fn new<I, S>(depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            supplier: None,
        }
    }

    pub fn with_supplier(mut self, supplier: Arc<dyn LookupValueByIdSupplier>) -> Self {
        self.supplier = Some(supplier);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag_is_set() -> SharedLogic {
        FnLogic::shared("IsDiscounted=Y", ["IsDiscounted"], |ctx| {
            ctx.value("IsDiscounted").and_then(FieldValue::as_bool) == Some(true)
        })
    }

    #[test]
    fn test_fn_logic_missing_variable() {
        let logic = flag_is_set();
        let empty: BTreeMap<String, FieldValue> = BTreeMap::new();
        assert_eq!(logic.evaluate(&empty), LogicResult::NoResult);

        let ctx = BTreeMap::from([("IsDiscounted".to_string(), FieldValue::Boolean(true))]);
        assert_eq!(logic.evaluate(&ctx), LogicResult::True);
        assert_eq!(logic.parameters(), BTreeSet::from(["IsDiscounted".to_string()]));
    }

    #[test]
    fn test_or_folds_constants() {
        let logic = flag_is_set();
        assert!(or(ConstantLogic::shared(true), logic.clone()).is_constant_true());
        assert!(or(ConstantLogic::shared(false), logic.clone()).constant_value().is_none());
        assert!(or(ConstantLogic::shared(false), ConstantLogic::shared(false)).is_constant_false());
    }

    #[test]
    fn test_or_evaluation() {
        let other = FnLogic::shared("Qty>0", ["Qty"], |ctx| {
            ctx.value("Qty").and_then(FieldValue::as_i32).unwrap_or(0) > 0
        });
        let combined = or(flag_is_set(), other);
        assert_eq!(
            combined.parameters(),
            BTreeSet::from(["IsDiscounted".to_string(), "Qty".to_string()])
        );

        let ctx = BTreeMap::from([
            ("IsDiscounted".to_string(), FieldValue::Boolean(false)),
            ("Qty".to_string(), FieldValue::Integer(3)),
        ]);
        assert_eq!(combined.evaluate(&ctx), LogicResult::True);

        let partial = BTreeMap::from([("IsDiscounted".to_string(), FieldValue::Boolean(false))]);
        assert_eq!(combined.evaluate(&partial), LogicResult::NoResult);
    }

    #[test]
    fn test_constant_default() {
        let default = ConstantDefault::of(false);
        let empty: BTreeMap<String, FieldValue> = BTreeMap::new();
        assert_eq!(default.evaluate(&empty), Ok(Some(FieldValue::Boolean(false))));
    }
}
