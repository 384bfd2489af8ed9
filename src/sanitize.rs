use crate::{
    codec::Codec,
    io::Endian,
    node::Record,
    params::{Expr, ParamValue},
    registry::{Registry, Target},
    schema::TypeSpec,
    Error, Value,
};
use smallvec::SmallVec;
use std::rc::Rc;

/// A validated, normalized parameter bundle
///
/// Every entry is a literal, a symbolic reference, a deferred
/// expression, or a structural payload; null never survives
/// sanitization.
#[derive(Debug, Clone, Default)]
pub struct SanitizedParams {
    entries: SmallVec<[(String, ParamValue); 4]>,
}

impl SanitizedParams {
    pub(crate) fn new(entries: SmallVec<[(String, ParamValue); 4]>) -> Self {
        SanitizedParams { entries }
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Whether the parameter is present
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub(crate) fn merged_over(&self, base: &SanitizedParams) -> SanitizedParams {
        let mut entries = base.entries.clone();
        for (name, value) in &self.entries {
            if let Some(slot) = entries.iter_mut().find(|(n, _)| n == name) {
                slot.1 = value.clone();
            } else {
                entries.push((name.clone(), value.clone()));
            }
        }
        SanitizedParams { entries }
    }
}

/// A frozen pair of node kind and sanitized parameters
///
/// Compiling a [`TypeSpec`](crate::TypeSpec) or
/// [`StructSpec`](crate::StructSpec) produces one; it can be
/// instantiated any number of times.
#[derive(Debug, Clone)]
pub struct Prototype {
    pub(crate) kind: ProtoKind,
    pub(crate) params: Rc<SanitizedParams>,
}

impl Prototype {
    /// Manufacture a clear record from this prototype
    pub fn instantiate(&self) -> Record {
        Record::from_proto(self)
    }

    /// Construct a record and immediately read it from `reader`
    pub fn read<R: std::io::Read>(&self, reader: R) -> Result<Record, Error> {
        let mut record = self.instantiate();
        record.read(reader)?;
        Ok(record)
    }

    /// Construct a record and immediately read it from a byte slice
    pub fn read_bytes(&self, data: &[u8]) -> Result<Record, Error> {
        let mut record = self.instantiate();
        record.read_bytes(data)?;
        Ok(record)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ProtoKind {
    Prim(Rc<dyn Codec>),
    Struct(Rc<StructLayout>),
    Array(Rc<ArrayLayout>),
    Choice(Rc<ChoiceLayout>),
    Skip,
    Rest,
}

#[derive(Debug)]
pub(crate) struct StructLayout {
    pub(crate) fields: Vec<FieldDef>,
}

impl StructLayout {
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug)]
pub(crate) struct FieldDef {
    pub(crate) name: String,
    pub(crate) proto: Prototype,
    pub(crate) hidden: bool,
}

#[derive(Debug)]
pub(crate) struct ArrayLayout {
    pub(crate) elem: Prototype,
    pub(crate) policy: LenPolicy,
}

#[derive(Debug)]
pub(crate) enum LenPolicy {
    Fixed(ParamValue),
    Until(Expr),
    Eof,
}

#[derive(Debug)]
pub(crate) struct ChoiceLayout {
    pub(crate) arms: Vec<(Value, Prototype)>,
    pub(crate) selection: ParamValue,
    pub(crate) copy_on_change: bool,
}

/// Sanitize a type spec against a registry, producing a prototype
pub(crate) fn sanitize_spec(
    registry: &Registry,
    spec: &TypeSpec,
    endian: Option<Endian>,
) -> Result<Prototype, Error> {
    Sanitizer { registry, endian }.sanitize(spec)
}

struct Sanitizer<'r> {
    registry: &'r Registry,
    endian: Option<Endian>,
}

impl Sanitizer<'_> {
    /// Run `f` under a nested endian context, restoring on every exit path
    fn with_endian<T>(
        &mut self,
        endian: Option<Endian>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let prev = self.endian;
        if endian.is_some() {
            self.endian = endian;
        }
        let result = f(self);
        self.endian = prev;
        result
    }

    fn sanitize(&mut self, spec: &TypeSpec) -> Result<Prototype, Error> {
        let resolved = self.registry.lookup(spec.name())?;

        for (name, value) in spec.params().entries() {
            if matches!(value, ParamValue::Null) {
                return Err(Error::nil_parameter(name.clone()));
            }
            if !resolved.accepted.accepts(name) {
                return Err(Error::message(format!(
                    "parameter not accepted by {}: {}",
                    spec.name(),
                    name
                )));
            }
        }

        let mut entries: SmallVec<[(String, ParamValue); 4]> = spec
            .params()
            .entries()
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        for (name, default) in resolved.accepted.defaults() {
            if !entries.iter().any(|(n, _)| n == name) {
                entries.push((name.to_string(), default.clone()));
            }
        }
        let params = SanitizedParams::new(entries);

        let kind = match &resolved.target {
            Target::Factory(factory) => {
                let codec =
                    factory.build(&params, crate::registry::EndianHint {
                        context: self.endian,
                        suffix: resolved.suffix,
                    })?;
                ProtoKind::Prim(codec)
            }
            Target::Struct => self.struct_hook(&params)?,
            Target::Array => self.array_hook(&params)?,
            Target::Choice => self.choice_hook(&params)?,
            Target::Skip => ProtoKind::Skip,
            Target::Rest => ProtoKind::Rest,
            Target::Defined(proto) => {
                let merged = params.merged_over(&proto.params);
                return finish(
                    Prototype {
                        kind: proto.kind.clone(),
                        params: Rc::new(merged),
                    },
                    &resolved,
                );
            }
        };

        finish(
            Prototype {
                kind,
                params: Rc::new(params),
            },
            &resolved,
        )
    }

    fn struct_hook(&mut self, params: &SanitizedParams) -> Result<ProtoKind, Error> {
        let endian = match params.get("endian") {
            None => None,
            Some(ParamValue::Endian(e)) => Some(*e),
            Some(ParamValue::Lit(Value::Bytes(name))) => match name.as_slice() {
                b"little" => Some(Endian::Little),
                b"big" => Some(Endian::Big),
                other => {
                    return Err(Error::unknown_endian(String::from_utf8_lossy(other)))
                }
            },
            Some(other) => {
                return Err(Error::unknown_endian(format!("{:?}", other)));
            }
        };

        let hide: Vec<String> = match params.get("hide") {
            Some(ParamValue::Names(names)) => names.to_vec(),
            _ => Vec::new(),
        };

        let declared = match params.get("fields") {
            Some(ParamValue::Fields(fields)) => fields.clone(),
            _ => return Err(Error::missing_parameter("fields")),
        };

        for (i, (name, _)) in declared.iter().enumerate() {
            if crate::params::RESERVED_FIELD_NAMES.contains(&name.as_str()) {
                return Err(Error::reserved_name(name.clone()));
            }
            if declared[..i].iter().any(|(n, _)| n == name) {
                return Err(Error::duplicate_field(name.clone()));
            }
        }

        let fields = self.with_endian(endian, |s| {
            declared
                .iter()
                .map(|(name, spec)| {
                    Ok(FieldDef {
                        name: name.clone(),
                        hidden: hide.iter().any(|h| h == name),
                        proto: s.sanitize(spec)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()
        })?;

        Ok(ProtoKind::Struct(Rc::new(StructLayout { fields })))
    }

    fn array_hook(&mut self, params: &SanitizedParams) -> Result<ProtoKind, Error> {
        let elem = match params.get("type") {
            Some(ParamValue::Spec(spec)) => self.sanitize(spec)?,
            Some(other) => {
                return Err(Error::message(format!(
                    "array type must be a type spec, found {:?}",
                    other
                )))
            }
            None => return Err(Error::missing_parameter("type")),
        };

        let policy = match (params.get("initial_length"), params.get("read_until")) {
            (Some(_), Some(_)) => {
                return Err(Error::mutual_exclusion("initial_length", "read_until"))
            }
            (Some(len), None) => LenPolicy::Fixed(len.clone()),
            (None, Some(ParamValue::Sym(s))) if s == "eof" => LenPolicy::Eof,
            (None, Some(ParamValue::Expr(pred))) => LenPolicy::Until(pred.clone()),
            (None, Some(other)) => {
                return Err(Error::message(format!(
                    "read_until must be an expression or eof, found {:?}",
                    other
                )))
            }
            (None, None) => return Err(Error::missing_parameter("initial_length")),
        };

        Ok(ProtoKind::Array(Rc::new(ArrayLayout { elem, policy })))
    }

    fn choice_hook(&mut self, params: &SanitizedParams) -> Result<ProtoKind, Error> {
        let declared = match params.get("choices") {
            Some(ParamValue::Choices(arms)) => arms.clone(),
            Some(other) => {
                return Err(Error::message(format!(
                    "choices must be a selector map, found {:?}",
                    other
                )))
            }
            None => return Err(Error::missing_parameter("choices")),
        };

        let arms = declared
            .iter()
            .map(|(key, spec)| Ok((key.clone(), self.sanitize(spec)?)))
            .collect::<Result<Vec<_>, Error>>()?;

        let selection = match params.get("selection") {
            Some(pv) => pv.clone(),
            None => return Err(Error::missing_parameter("selection")),
        };

        let copy_on_change = match params.get("copy_on_change") {
            Some(ParamValue::Lit(Value::Bool(flag))) => *flag,
            _ => false,
        };

        Ok(ProtoKind::Choice(Rc::new(ChoiceLayout {
            arms,
            selection,
            copy_on_change,
        })))
    }
}

fn finish(proto: Prototype, resolved: &crate::registry::Resolved) -> Result<Prototype, Error> {
    for name in resolved.accepted.mandatory_names() {
        if !proto.params.has(name) {
            return Err(Error::missing_parameter(*name));
        }
    }
    for &(first, second) in resolved.accepted.exclusions() {
        if proto.params.has(first) && proto.params.has(second) {
            return Err(Error::mutual_exclusion(first, second));
        }
    }
    Ok(proto)
}
