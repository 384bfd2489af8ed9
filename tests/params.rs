use binform::{
    choices, AcceptedParams, Codec, CodecFactory, Ctx, EndianHint, Error, ErrorKind, ParamValue,
    Registry, SanitizedParams, Sink, Source, StructSpec, TypeSpec, Value,
};
use std::rc::Rc;

#[derive(Debug)]
struct TagCodec;

impl Codec for TagCodec {
    fn decode(&self, io: &mut dyn Source, _cx: &Ctx<'_>) -> Result<Value, Error> {
        let mut byte = [0u8; 1];
        io.read_into(&mut byte)?;
        Ok(Value::UInt(u64::from(byte[0])))
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, _cx: &Ctx<'_>) -> Result<(), Error> {
        io.write_bytes(&[value.as_u64()? as u8])
    }

    fn default_value(&self) -> Value {
        Value::UInt(0)
    }
}

#[derive(Debug)]
struct TagFactory;

impl CodecFactory for TagFactory {
    fn build(
        &self,
        _params: &SanitizedParams,
        _endian: EndianHint,
    ) -> Result<Rc<dyn Codec>, Error> {
        Ok(Rc::new(TagCodec))
    }
}

fn registry_with_tag() -> Registry {
    let mut reg = Registry::with_builtins();
    let accepted = AcceptedParams::new()
        .optional("initial_value")
        .optional("value")
        .mutually_exclusive("initial_value", "value")
        .default_value("initial_value", 7u8);
    reg.register("tag", accepted, TagFactory).unwrap();
    reg
}

#[test]
fn test_custom_codec_round_trips() {
    let reg = registry_with_tag();
    let proto = TypeSpec::new("tag").compile(&reg).unwrap();

    let rec = proto.read_bytes(&[0x2a]).unwrap();
    assert_eq!(rec.root().value().unwrap(), Value::UInt(0x2a));
}

#[test]
fn test_default_applied_only_when_omitted() {
    let reg = registry_with_tag();

    let proto = TypeSpec::new("tag").compile(&reg).unwrap();
    assert_eq!(proto.instantiate().root().value().unwrap(), Value::UInt(7));

    let proto = TypeSpec::new("tag")
        .param("initial_value", 9u8)
        .compile(&reg)
        .unwrap();
    assert_eq!(proto.instantiate().root().value().unwrap(), Value::UInt(9));
}

#[test]
fn test_null_parameter_rejected() {
    let reg = Registry::with_builtins();
    let err = TypeSpec::new("string")
        .param("length", Option::<u8>::None)
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::NilParameter { name } if name == "length"
    ));
}

#[test]
fn test_missing_mandatory_parameter() {
    let reg = Registry::with_builtins();

    let err = TypeSpec::new("array")
        .param("initial_length", 2u8)
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::MissingParameter { name } if name == "type"
    ));

    let err = TypeSpec::new("choice")
        .param("choices", choices([(1u8, TypeSpec::new("uint8"))]))
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::MissingParameter { name } if name == "selection"
    ));
}

#[test]
fn test_array_requires_exactly_one_length_policy() {
    let reg = Registry::with_builtins();

    let err = TypeSpec::array_of(TypeSpec::new("uint8"))
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingParameter { .. }));

    let err = TypeSpec::array_of(TypeSpec::new("uint8"))
        .param("initial_length", 2u8)
        .param("read_until", binform::eof())
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::MutualExclusion { first, second }
            if first == "initial_length" && second == "read_until"
    ));
}

#[test]
fn test_value_and_initial_value_are_mutually_exclusive() {
    let reg = Registry::with_builtins();
    let err = TypeSpec::new("uint8")
        .param("initial_value", 1u8)
        .param("value", 2u8)
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MutualExclusion { .. }));
}

#[test]
fn test_check_offset_and_adjust_offset_are_mutually_exclusive() {
    let reg = Registry::with_builtins();
    let err = TypeSpec::new("uint8")
        .param("check_offset", 0u8)
        .param("adjust_offset", 0u8)
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MutualExclusion { .. }));
}

#[test]
fn test_registering_reserved_parameter_name_fails() {
    let mut reg = Registry::with_builtins();
    let accepted = AcceptedParams::new().optional("offset");
    let err = reg.register("bad", accepted, TagFactory).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::InvalidName { name } if name == "offset"
    ));
}

#[test]
fn test_unknown_type_fails() {
    let reg = Registry::with_builtins();
    let err = TypeSpec::new("quaternion").compile(&reg).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::UnknownType { name } if name == "quaternion"
    ));
}

#[test]
fn test_multibyte_integer_without_endian_fails() {
    let reg = Registry::with_builtins();
    let err = TypeSpec::new("uint16").compile(&reg).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnknownEndian { .. }));
}

#[test]
fn test_invalid_endian_designation_fails() {
    let reg = Registry::with_builtins();
    let err = TypeSpec::new("struct")
        .param("fields", ParamValue::Fields(Vec::new().into()))
        .param("endian", "middle")
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::UnknownEndian { name } if name == "middle"
    ));
}

#[test]
fn test_unaccepted_parameter_rejected() {
    let reg = Registry::with_builtins();
    assert!(TypeSpec::new("uint8")
        .param("wat", 1u8)
        .compile(&reg)
        .is_err());
}

#[test]
fn test_record_level_params_survive_definition() {
    let mut reg = registry_with_tag();
    let header = StructSpec::new().field("id", TypeSpec::new("tag"));
    reg.define("header", &header).unwrap();

    // extra common params merge over the defined prototype
    let proto = StructSpec::new()
        .field("lead", TypeSpec::new("uint8"))
        .field("hdr", TypeSpec::new("header").param("check_offset", 1u8))
        .compile(&reg)
        .unwrap();
    assert!(proto.read_bytes(&[0, 5]).is_ok());
}
