use crate::{
    codec::{
        BitFactory, CodecFactory, FloatFactory, IntFactory, StringFactory, StringZFactory,
    },
    io::Endian,
    params::AcceptedParams,
    sanitize::Prototype,
    schema::StructSpec,
    Error,
};
use std::collections::HashMap;
use std::rc::Rc;

/// The endian information available when building a codec
#[derive(Debug, Clone, Copy)]
pub struct EndianHint {
    /// Endian inherited from the enclosing declaration
    pub context: Option<Endian>,

    /// Endian demanded by a `_le`/`_be` name suffix
    pub suffix: Option<Endian>,
}

impl EndianHint {
    /// The endian to use: an explicit suffix wins over the context
    pub fn effective(&self) -> Option<Endian> {
        self.suffix.or(self.context)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Target {
    Factory(Rc<dyn CodecFactory>),
    Struct,
    Array,
    Choice,
    Skip,
    Rest,
    Defined(Rc<Prototype>),
}

#[derive(Debug)]
pub(crate) struct Resolved {
    pub(crate) target: Target,
    pub(crate) accepted: Rc<AcceptedParams>,
    pub(crate) suffix: Option<Endian>,
}

/// Maps type names to constructors
///
/// An explicit value threaded through schema declaration; there is no
/// process-wide registry. Integer and bit types of any whole width are
/// recognized without registration: `uint24`, `int16_le`, `bit7`, and
/// so on.
///
/// ```
/// use binform::Registry;
///
/// let reg = Registry::with_builtins();
/// assert!(reg.is_registered("uint48_be"));
/// assert!(reg.is_registered("stringz"));
/// assert!(!reg.is_registered("uint13"));
/// ```
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<String, (Target, Rc<AcceptedParams>)>,
    common: Rc<AcceptedParams>,
    primitive: Rc<AcceptedParams>,
}

fn common_params() -> AcceptedParams {
    AcceptedParams::new()
        .optional("onlyif")
        .optional("check_offset")
        .optional("adjust_offset")
        .mutually_exclusive("check_offset", "adjust_offset")
}

fn primitive_params() -> AcceptedParams {
    AcceptedParams::new()
        .extend(&common_params())
        .optional("initial_value")
        .optional("value")
        .optional("check_value")
        .mutually_exclusive("initial_value", "value")
}

impl Registry {
    /// Create a registry with no builtin types
    pub fn new() -> Self {
        Registry {
            entries: HashMap::new(),
            common: Rc::new(common_params()),
            primitive: Rc::new(primitive_params()),
        }
    }

    /// Create a registry with the builtin type set
    pub fn with_builtins() -> Self {
        let mut reg = Registry::new();
        let string_params = AcceptedParams::new()
            .extend(&primitive_params())
            .optional("length")
            .optional("read_length")
            .optional("pad_char")
            .optional("trim_padding");
        let stringz_params = AcceptedParams::new()
            .extend(&primitive_params())
            .optional("max_length");
        let struct_params = AcceptedParams::new()
            .extend(&common_params())
            .mandatory("fields")
            .optional("endian")
            .optional("hide");
        let array_params = AcceptedParams::new()
            .extend(&common_params())
            .mandatory("type")
            .optional("initial_length")
            .optional("read_until")
            .mutually_exclusive("initial_length", "read_until");
        let choice_params = AcceptedParams::new()
            .extend(&common_params())
            .mandatory("choices")
            .mandatory("selection")
            .optional("copy_on_change");
        let skip_params = AcceptedParams::new()
            .extend(&common_params())
            .mandatory("length");
        let rest_params = AcceptedParams::new()
            .extend(&common_params())
            .optional("initial_value");

        reg.insert("string", Target::Factory(Rc::new(StringFactory)), string_params);
        reg.insert(
            "stringz",
            Target::Factory(Rc::new(StringZFactory)),
            stringz_params,
        );
        reg.insert(
            "float",
            Target::Factory(Rc::new(FloatFactory { double: false })),
            primitive_params(),
        );
        reg.insert(
            "double",
            Target::Factory(Rc::new(FloatFactory { double: true })),
            primitive_params(),
        );
        reg.insert("struct", Target::Struct, struct_params);
        reg.insert("array", Target::Array, array_params);
        reg.insert("choice", Target::Choice, choice_params);
        reg.insert("skip", Target::Skip, skip_params);
        reg.insert("rest", Target::Rest, rest_params);
        reg
    }

    fn insert(&mut self, name: &str, target: Target, accepted: AcceptedParams) {
        self.entries
            .insert(name.to_string(), (target, Rc::new(accepted)));
    }

    /// Register a custom primitive type
    ///
    /// Fails with `InvalidName` if the accepted parameters shadow a
    /// reserved identifier.
    pub fn register<F>(
        &mut self,
        name: &str,
        accepted: AcceptedParams,
        factory: F,
    ) -> Result<(), Error>
    where
        F: CodecFactory + 'static,
    {
        accepted.validate()?;
        self.insert(name, Target::Factory(Rc::new(factory)), accepted);
        Ok(())
    }

    /// Register a named record type usable in nested type references
    ///
    /// The declaration is sanitized eagerly; later references reuse the
    /// frozen result.
    pub fn define(&mut self, name: &str, spec: &StructSpec) -> Result<(), Error> {
        let proto = spec.compile(self)?;
        self.entries.insert(
            name.to_string(),
            (Target::Defined(Rc::new(proto)), self.common.clone()),
        );
        Ok(())
    }

    /// Whether a name resolves, counting dynamic integer and bit widths
    pub fn is_registered(&self, name: &str) -> bool {
        self.lookup(name).is_ok()
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Resolved, Error> {
        if let Some((target, accepted)) = self.entries.get(name) {
            return Ok(Resolved {
                target: target.clone(),
                accepted: accepted.clone(),
                suffix: None,
            });
        }

        let (base, suffix) = split_endian_suffix(name);
        if suffix.is_some() {
            if let Some((target, accepted)) = self.entries.get(base) {
                return Ok(Resolved {
                    target: target.clone(),
                    accepted: accepted.clone(),
                    suffix,
                });
            }
        }
        if let Some(target) = dynamic_target(base) {
            return Ok(Resolved {
                target,
                accepted: self.primitive.clone(),
                suffix,
            });
        }
        Err(Error::unknown_type(name))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

fn split_endian_suffix(name: &str) -> (&str, Option<Endian>) {
    if let Some(base) = name.strip_suffix("_le") {
        (base, Some(Endian::Little))
    } else if let Some(base) = name.strip_suffix("_be") {
        (base, Some(Endian::Big))
    } else {
        (name, None)
    }
}

fn dynamic_target(base: &str) -> Option<Target> {
    if let Some(bits) = base.strip_prefix("uint").and_then(|s| s.parse::<u32>().ok()) {
        if bits % 8 == 0 && (8..=64).contains(&bits) {
            return Some(Target::Factory(Rc::new(IntFactory {
                width: (bits / 8) as u8,
                signed: false,
            })));
        }
    }
    if let Some(bits) = base.strip_prefix("int").and_then(|s| s.parse::<u32>().ok()) {
        if bits % 8 == 0 && (8..=64).contains(&bits) {
            return Some(Target::Factory(Rc::new(IntFactory {
                width: (bits / 8) as u8,
                signed: true,
            })));
        }
    }
    if let Some(bits) = base.strip_prefix("bit").and_then(|s| s.parse::<u32>().ok()) {
        if (1..=64).contains(&bits) {
            return Some(Target::Factory(Rc::new(BitFactory { bits: bits as u8 })));
        }
    }
    None
}
