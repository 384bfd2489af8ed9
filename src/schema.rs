use crate::{
    params::{ParamValue, Params},
    registry::Registry,
    sanitize::{self, Prototype},
    io::Endian,
    Error,
};

/// A reference to a registered type plus its parameters
///
/// The building block of schema declarations. Nothing is validated
/// until the spec is compiled against a [`Registry`].
///
/// ```
/// use binform::{Registry, TypeSpec};
///
/// let reg = Registry::with_builtins();
/// let proto = TypeSpec::new("uint16_be").compile(&reg).unwrap();
/// let mut rec = proto.instantiate();
/// rec.assign(0x1234u16).unwrap();
/// assert_eq!(rec.to_bytes().unwrap(), vec![0x12, 0x34]);
/// ```
#[derive(Debug, Clone)]
pub struct TypeSpec {
    name: String,
    params: Params,
}

impl TypeSpec {
    /// Reference a type by registered name (endian suffixes allowed)
    pub fn new(name: impl Into<String>) -> Self {
        TypeSpec {
            name: name.into(),
            params: Params::new(),
        }
    }

    /// Attach a parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params = self.params.set(name, value);
        self
    }

    /// An array of `elem` elements; pair with `initial_length` or `read_until`
    pub fn array_of(elem: TypeSpec) -> Self {
        TypeSpec::new("array").param("type", elem)
    }

    /// Sanitize this spec into a frozen, instantiable [`Prototype`]
    pub fn compile(&self, registry: &Registry) -> Result<Prototype, Error> {
        sanitize::sanitize_spec(registry, self, None)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn params(&self) -> &Params {
        &self.params
    }
}

/// An ordered record declaration
///
/// Fields keep source order; that order governs reads, writes, and
/// size computation.
///
/// ```
/// use binform::{Endian, Registry, StructSpec, TypeSpec};
///
/// let reg = Registry::with_builtins();
/// let point = StructSpec::new()
///     .endian(Endian::Little)
///     .field("x", TypeSpec::new("int16"))
///     .field("y", TypeSpec::new("int16"));
/// let proto = point.compile(&reg).unwrap();
/// let rec = proto.read_bytes(&[0x01, 0x00, 0xff, 0xff]).unwrap();
/// assert_eq!(rec.field("x").unwrap().value().unwrap().as_i64().unwrap(), 1);
/// assert_eq!(rec.field("y").unwrap().value().unwrap().as_i64().unwrap(), -1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StructSpec {
    endian: Option<Endian>,
    hide: Vec<String>,
    fields: Vec<(String, TypeSpec)>,
    params: Params,
}

impl StructSpec {
    /// Start an empty record declaration
    pub fn new() -> Self {
        Self::default()
    }

    /// Endian inherited by nested multi-byte fields without a suffix
    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    /// Omit the named fields from snapshots and `field_names`
    ///
    /// Hidden fields are still read, written, and reachable by name.
    pub fn hide<N, I>(mut self, names: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = N>,
    {
        self.hide.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare the next field
    pub fn field(mut self, name: impl Into<String>, spec: TypeSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    /// Attach a record-level parameter (such as `onlyif`)
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params = self.params.set(name, value);
        self
    }

    /// Sanitize this record into a frozen, instantiable [`Prototype`]
    pub fn compile(&self, registry: &Registry) -> Result<Prototype, Error> {
        self.to_type_spec().compile(registry)
    }

    /// Lower into the equivalent `struct` type spec, for nesting inside
    /// another declaration
    pub fn to_type_spec(&self) -> TypeSpec {
        let mut spec = TypeSpec {
            name: "struct".to_string(),
            params: self.params.clone(),
        };
        spec.params.insert(
            "fields".to_string(),
            ParamValue::Fields(self.fields.clone().into()),
        );
        if let Some(endian) = self.endian {
            spec.params.insert("endian".to_string(), ParamValue::Endian(endian));
        }
        if !self.hide.is_empty() {
            spec.params
                .insert("hide".to_string(), ParamValue::Names(self.hide.clone().into()));
        }
        spec
    }
}
