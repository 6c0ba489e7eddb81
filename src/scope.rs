//! Scope values and layered name resolution for template rendering.
//!
//! A [`Scope`] is an explicit stack of name → [`Value`] layers with
//! innermost-shadows-outer lookup. Loops and content-function calls push a
//! layer for their bindings instead of chaining prototype objects, so scope
//! composition stays an inspectable data structure.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::inject::InjectError;

/// Option maps handed to components and partials.
pub type Options = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A render-time value: the result of evaluating expressions and resolving
/// typed option data.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Version-counted mutable cell shared between renders.
    Shared(SharedValue),
    /// Callable content option produced by `type="function"` injection.
    Func(ContentFn),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Shared(_) => "shared",
            Value::Func(_) => "function",
        }
    }

    /// Truthiness for conditional directives. Empty strings, empty
    /// collections, zero and `Null` are false; functions are always true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Shared(cell) => cell.with(|v| v.is_truthy()),
            Value::Func(_) => true,
        }
    }

    /// Numeric view: numbers pass through, numeric strings parse, shared
    /// cells delegate to their contents. Everything else is `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Shared(cell) => cell.with(|v| v.as_number()),
            _ => None,
        }
    }

    /// Boolean view: booleans pass through, the literal strings
    /// `"true"`/`"false"` parse, shared cells delegate.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Str(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Value::Shared(cell) => cell.with(|v| v.as_bool()),
            _ => None,
        }
    }

    /// Borrow the string contents if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Deep copy with every [`SharedValue`] replaced by its current plain
    /// contents. Used by restricted injection so new component options never
    /// alias live scope cells. Functions are kept: they are callables, not
    /// mutable references.
    pub fn to_plain(&self) -> Value {
        match self {
            Value::Shared(cell) => cell.with(|v| v.to_plain()),
            Value::List(items) => Value::List(items.iter().map(Value::to_plain).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_plain()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Shared cells compare by current contents.
            (Value::Shared(a), Value::Shared(b)) => a.with(|av| b.with(|bv| av == bv)),
            (Value::Shared(a), b) => a.with(|av| av == b),
            (a, Value::Shared(b)) => b.with(|bv| a == bv),
            // Functions compare by identity.
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Shared(cell) => cell.with(|v| f.debug_tuple("Shared").field(v).finish()),
            Value::Func(_) => write!(f, "Func(..)"),
        }
    }
}

/// Interpolation rendering: `Null` is empty, numbers drop a trailing `.0`,
/// lists join with commas.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(_) => f.write_str("[object]"),
            Value::Shared(cell) => cell.with(|v| write!(f, "{v}")),
            Value::Func(_) => f.write_str("[function]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

// ---------------------------------------------------------------------------
// SharedValue
// ---------------------------------------------------------------------------

struct SharedInner {
    value: Value,
    version: u64,
}

/// Interior-mutable value cell with a monotonically increasing version.
///
/// Every write bumps the version; options diffing compares versions instead
/// of deep values when both sides expose the same cell.
#[derive(Clone)]
pub struct SharedValue {
    inner: Rc<RefCell<SharedInner>>,
}

impl SharedValue {
    pub fn new(value: Value) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SharedInner { value, version: 0 })),
        }
    }

    /// Clone out the current contents.
    pub fn get(&self) -> Value {
        self.inner.borrow().value.clone()
    }

    /// Borrow the contents without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the contents, bumping the version.
    pub fn set(&self, value: Value) {
        let mut inner = self.inner.borrow_mut();
        inner.value = value;
        inner.version += 1;
    }

    /// Mutate the contents in place, bumping the version.
    pub fn update(&self, f: impl FnOnce(&mut Value)) {
        let mut inner = self.inner.borrow_mut();
        f(&mut inner.value);
        inner.version += 1;
    }

    /// Current version. Starts at 0 and increases by one per write.
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Whether two handles point at the same cell.
    pub fn ptr_eq(&self, other: &SharedValue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SharedValue")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ContentFn
// ---------------------------------------------------------------------------

type ContentBody = dyn Fn(Options) -> Result<Value, InjectError>;

/// A callable content option: invoking it re-runs the captured sub-template
/// against the defining scope with the call arguments layered on top.
#[derive(Clone)]
pub struct ContentFn {
    body: Rc<ContentBody>,
}

impl ContentFn {
    pub fn new(body: impl Fn(Options) -> Result<Value, InjectError> + 'static) -> Self {
        Self {
            body: Rc::new(body),
        }
    }

    /// Invoke with named arguments.
    pub fn call(&self, args: Options) -> Result<Value, InjectError> {
        (self.body)(args)
    }

    /// Identity comparison; content functions have no value equality.
    pub fn ptr_eq(&self, other: &ContentFn) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for ContentFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentFn(..)")
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Layered name → value mapping. Lookup walks layers innermost-first, so a
/// loop binding shadows an option of the same name without destroying it.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    layers: Vec<BTreeMap<String, Value>>,
}

impl Scope {
    /// Empty scope with a single root layer.
    pub fn new() -> Self {
        Self {
            layers: vec![BTreeMap::new()],
        }
    }

    /// Scope whose root layer is the given map.
    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self { layers: vec![map] }
    }

    /// Push a new innermost layer.
    pub fn push_layer(&mut self, layer: BTreeMap<String, Value>) {
        self.layers.push(layer);
    }

    /// Pop the innermost layer. The root layer cannot be popped.
    pub fn pop_layer(&mut self) -> Option<BTreeMap<String, Value>> {
        if self.layers.len() > 1 {
            self.layers.pop()
        } else {
            None
        }
    }

    /// Clone this scope with an extra innermost layer. Used for loop bodies
    /// and content-function calls.
    pub fn child(&self, layer: BTreeMap<String, Value>) -> Scope {
        let mut scope = self.clone();
        scope.layers.push(layer);
        scope
    }

    /// Look up a name, innermost layer first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|layer| layer.get(name))
    }

    /// Bind a name in the innermost layer.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(layer) = self.layers.last_mut() {
            layer.insert(name.into(), value);
        }
    }

    /// Number of layers (at least 1).
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// All visible names, deduplicated, sorted. Used for diagnostic
    /// snapshots attached to evaluation errors.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .layers
            .iter()
            .flat_map(|layer| layer.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Collapse all layers into one map with shadowing applied.
    pub fn flatten(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for layer in &self.layers {
            for (k, v) in layer {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
