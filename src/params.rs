use crate::{eval::Env, io::Endian, schema::TypeSpec, Error, Value};
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// Identifiers exposed by the lazy evaluator and the runtime surface
///
/// A declared parameter may not shadow any of these; `type` is the one
/// permitted exception.
const RESERVED_EVAL_NAMES: &[&str] = &[
    "get",
    "field",
    "index",
    "parent",
    "offset",
    "rel_offset",
    "num_bytes",
    "num_bits",
    "snapshot",
    "read",
    "write",
    "assign",
    "clear",
    "is_clear",
    "inspect",
];

/// Names that would shadow built-in record operations if used as fields
pub(crate) const RESERVED_FIELD_NAMES: &[&str] = &[
    "read",
    "write",
    "num_bytes",
    "num_bits",
    "snapshot",
    "assign",
    "clear",
    "is_clear",
    "field_names",
    "offset",
    "rel_offset",
    "parent",
    "index",
    "type",
];

/// A deferred expression evaluated against a live node's environment
///
/// ```
/// use binform::{expr, Value};
///
/// let doubled = expr(|env| Ok(Value::from(env.get("len")?.as_u64()? * 2)));
/// ```
#[derive(Clone)]
pub struct Expr(Rc<dyn Fn(&Env<'_>) -> Result<Value, Error>>);

impl Expr {
    /// Wrap a closure as a deferred expression
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Env<'_>) -> Result<Value, Error> + 'static,
    {
        Expr(Rc::new(f))
    }

    pub(crate) fn call(&self, env: &Env<'_>) -> Result<Value, Error> {
        (self.0)(env)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Expr(..)")
    }
}

/// A parameter value: literal, symbolic reference, deferred expression,
/// or a structural payload consumed during sanitization
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// An explicit null, rejected during sanitization
    Null,

    /// A literal scalar
    Lit(Value),

    /// A symbolic reference resolved against the parent chain
    Sym(String),

    /// A deferred expression
    Expr(Expr),

    /// An endian designation
    Endian(Endian),

    /// A nested type reference (an array's `type`)
    Spec(Box<TypeSpec>),

    /// Ordered field declarations (a record's `fields`)
    Fields(Rc<[(String, TypeSpec)]>),

    /// A list of names (a record's `hide`)
    Names(Rc<[String]>),

    /// Selector-to-type pairs (a choice's `choices`)
    Choices(Rc<[(Value, TypeSpec)]>),
}

/// Shorthand for a symbolic reference parameter
pub fn sym(name: impl Into<String>) -> ParamValue {
    ParamValue::Sym(name.into())
}

/// Shorthand for a deferred expression parameter
pub fn expr<F>(f: F) -> ParamValue
where
    F: Fn(&Env<'_>) -> Result<Value, Error> + 'static,
{
    ParamValue::Expr(Expr::new(f))
}

/// The `read_until` policy that reads while the stream has more data
pub fn eof() -> ParamValue {
    ParamValue::Sym("eof".to_string())
}

/// Build a choice's selector-to-type map
pub fn choices<K, I>(arms: I) -> ParamValue
where
    K: Into<Value>,
    I: IntoIterator<Item = (K, TypeSpec)>,
{
    ParamValue::Choices(
        arms.into_iter()
            .map(|(k, spec)| (k.into(), spec))
            .collect::<Vec<_>>()
            .into(),
    )
}

macro_rules! param_from_scalar {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(x: $t) -> Self {
                ParamValue::Lit(Value::from(x))
            }
        })*
    };
}

param_from_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, usize, f32, f64, bool, &str, Vec<u8>);

impl From<Value> for ParamValue {
    fn from(x: Value) -> Self {
        ParamValue::Lit(x)
    }
}

impl From<Endian> for ParamValue {
    fn from(x: Endian) -> Self {
        ParamValue::Endian(x)
    }
}

impl From<TypeSpec> for ParamValue {
    fn from(x: TypeSpec) -> Self {
        ParamValue::Spec(Box::new(x))
    }
}

impl From<Expr> for ParamValue {
    fn from(x: Expr) -> Self {
        ParamValue::Expr(x)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(x: Option<T>) -> Self {
        match x {
            Some(v) => v.into(),
            None => ParamValue::Null,
        }
    }
}

/// User-supplied parameters, in insertion order
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: SmallVec<[(String, ParamValue); 4]>,
}

impl Params {
    /// Create an empty parameter map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value for the name
    pub fn set(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name.into(), value.into());
        self
    }

    pub(crate) fn insert(&mut self, name: String, value: ParamValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &(String, ParamValue)> {
        self.entries.iter()
    }
}

/// Per-type declaration of the legal parameter surface
///
/// Composition accumulates: a type built on another starts from its
/// sets and extends them, deduplicated.
#[derive(Debug, Clone, Default)]
pub struct AcceptedParams {
    mandatory: Vec<&'static str>,
    optional: Vec<&'static str>,
    defaults: Vec<(&'static str, ParamValue)>,
    mutually_exclusive: Vec<(&'static str, &'static str)>,
}

impl AcceptedParams {
    /// Create an empty declaration
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a parameter name
    pub fn mandatory(mut self, name: &'static str) -> Self {
        if !self.mandatory.contains(&name) {
            self.mandatory.push(name);
        }
        self
    }

    /// Permit a parameter name
    pub fn optional(mut self, name: &'static str) -> Self {
        if !self.optional.contains(&name) {
            self.optional.push(name);
        }
        self
    }

    /// Supply a default applied when the user omits the name
    pub fn default_value(mut self, name: &'static str, value: impl Into<ParamValue>) -> Self {
        if !self.defaults.iter().any(|(n, _)| *n == name) {
            self.defaults.push((name, value.into()));
        }
        self
    }

    /// Declare an unordered mutually exclusive pair
    pub fn mutually_exclusive(mut self, first: &'static str, second: &'static str) -> Self {
        let present = self
            .mutually_exclusive
            .iter()
            .any(|&(a, b)| (a == first && b == second) || (a == second && b == first));
        if !present {
            self.mutually_exclusive.push((first, second));
        }
        self
    }

    /// Start from another declaration's sets
    pub fn extend(mut self, other: &AcceptedParams) -> Self {
        for name in &other.mandatory {
            self = self.mandatory(name);
        }
        for name in &other.optional {
            self = self.optional(name);
        }
        for (name, value) in &other.defaults {
            self = self.default_value(name, value.clone());
        }
        for &(a, b) in &other.mutually_exclusive {
            self = self.mutually_exclusive(a, b);
        }
        self
    }

    /// Reject declarations that shadow reserved identifiers
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let names = self
            .mandatory
            .iter()
            .chain(self.optional.iter())
            .chain(self.defaults.iter().map(|(n, _)| n));
        for name in names {
            if *name != "type" && RESERVED_EVAL_NAMES.contains(name) {
                return Err(Error::invalid_name(*name));
            }
        }
        Ok(())
    }

    pub(crate) fn accepts(&self, name: &str) -> bool {
        name == "type"
            || self.mandatory.contains(&name)
            || self.optional.contains(&name)
            || self.defaults.iter().any(|(n, _)| *n == name)
    }

    pub(crate) fn mandatory_names(&self) -> &[&'static str] {
        &self.mandatory
    }

    pub(crate) fn defaults(&self) -> &[(&'static str, ParamValue)] {
        &self.defaults
    }

    pub(crate) fn exclusions(&self) -> &[(&'static str, &'static str)] {
        &self.mutually_exclusive
    }
}
