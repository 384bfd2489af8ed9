use binform::{
    expr, sym, Endian, ErrorKind, Registry, Snapshot, Source, StreamInput, StructSpec, TypeSpec,
    Value,
};

fn pascal_string(reg: &Registry) -> binform::Prototype {
    StructSpec::new()
        .field(
            "len",
            TypeSpec::new("uint8")
                .param("value", expr(|env| Ok(Value::from(env.field("data")?.len()?)))),
        )
        .field("data", TypeSpec::new("string").param("read_length", sym("len")))
        .compile(reg)
        .unwrap()
}

#[test]
fn test_pascal_string_write() {
    let reg = Registry::with_builtins();
    let proto = pascal_string(&reg);

    let mut rec = proto.instantiate();
    rec.field_mut("data").unwrap().assign("hello").unwrap();
    assert_eq!(
        rec.to_bytes().unwrap(),
        vec![0x05, 0x68, 0x65, 0x6c, 0x6c, 0x6f]
    );
}

#[test]
fn test_pascal_string_read() {
    let reg = Registry::with_builtins();
    let proto = pascal_string(&reg);

    let data = [0x03, 0x61, 0x62, 0x63, 0xff];
    let mut input = StreamInput::from_slice(&data);
    let mut rec = proto.instantiate();
    rec.read_from(&mut input).unwrap();

    assert_eq!(
        rec.snapshot().unwrap(),
        Snapshot::record([("len", 3u8.into()), ("data", "abc".into())])
    );
    assert_eq!(input.pos(), 4);
}

#[test]
fn test_computed_value_recomputes_after_post_read_mutation() {
    let reg = Registry::with_builtins();
    let proto = pascal_string(&reg);

    let mut rec = proto.read_bytes(&[0x03, 0x61, 0x62, 0x63]).unwrap();
    assert_eq!(rec.field("len").unwrap().value().unwrap(), Value::UInt(3));

    // once the read is done the computed binding tracks the live data,
    // not the decoded wire byte
    rec.field_mut("data").unwrap().assign("longer").unwrap();
    assert_eq!(rec.field("len").unwrap().value().unwrap(), Value::UInt(6));
    assert_eq!(
        rec.to_bytes().unwrap(),
        vec![0x06, 0x6c, 0x6f, 0x6e, 0x67, 0x65, 0x72]
    );
}

#[test]
fn test_endian_inheritance_and_suffix_override() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .endian(Endian::Big)
        .field("a", TypeSpec::new("uint16"))
        .field("b", TypeSpec::new("uint16_le"))
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[0x01, 0x02, 0x03, 0x04]).unwrap();
    assert_eq!(rec.field("a").unwrap().value().unwrap(), Value::UInt(0x0102));
    assert_eq!(rec.field("b").unwrap().value().unwrap(), Value::UInt(0x0403));
}

#[test]
fn test_nested_struct_inherits_endian() {
    let reg = Registry::with_builtins();
    let inner = StructSpec::new().field("v", TypeSpec::new("uint16"));
    let proto = StructSpec::new()
        .endian(Endian::Little)
        .field("head", TypeSpec::new("uint8"))
        .field("inner", inner.to_type_spec())
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[0x09, 0x34, 0x12]).unwrap();
    assert_eq!(
        rec.field("inner")
            .unwrap()
            .field("v")
            .unwrap()
            .value()
            .unwrap(),
        Value::UInt(0x1234)
    );
}

#[test]
fn test_hidden_fields_read_but_absent_from_snapshot() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .hide(["reserved"])
        .field("tag", TypeSpec::new("uint8"))
        .field("reserved", TypeSpec::new("uint8"))
        .field("v", TypeSpec::new("uint8"))
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[1, 0xee, 3]).unwrap();
    assert_eq!(rec.field_names(), vec!["tag", "v"]);
    assert_eq!(
        rec.snapshot().unwrap(),
        Snapshot::record([("tag", 1u8.into()), ("v", 3u8.into())])
    );
    // still reachable by name
    assert_eq!(
        rec.field("reserved").unwrap().value().unwrap(),
        Value::UInt(0xee)
    );
}

#[test]
fn test_duplicate_field_rejected() {
    let reg = Registry::with_builtins();
    let err = StructSpec::new()
        .field("x", TypeSpec::new("uint8"))
        .field("x", TypeSpec::new("uint8"))
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::DuplicateField { name } if name == "x"
    ));
}

#[test]
fn test_reserved_field_name_rejected() {
    let reg = Registry::with_builtins();
    let err = StructSpec::new()
        .field("snapshot", TypeSpec::new("uint8"))
        .compile(&reg)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::ReservedName { name } if name == "snapshot"
    ));
}

#[test]
fn test_clear_is_idempotent() {
    let reg = Registry::with_builtins();
    let proto = pascal_string(&reg);

    let mut rec = proto.instantiate();
    rec.field_mut("data").unwrap().assign("xyz").unwrap();
    assert!(!rec.is_clear());

    rec.clear();
    assert!(rec.is_clear());
    rec.clear();
    assert!(rec.is_clear());
}

#[test]
fn test_assign_same_snapshot_is_stable() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("a", TypeSpec::new("uint8"))
        .field("b", TypeSpec::new("string").param("length", 2u8))
        .compile(&reg)
        .unwrap();

    let snapshot = Snapshot::record([("a", 9u8.into()), ("b", "ok".into())]);
    let mut rec = proto.instantiate();
    rec.assign(snapshot.clone()).unwrap();
    let first = rec.to_bytes().unwrap();
    rec.assign(snapshot).unwrap();
    assert_eq!(rec.to_bytes().unwrap(), first);
}

#[test]
fn test_assign_unknown_field_fails() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("a", TypeSpec::new("uint8"))
        .compile(&reg)
        .unwrap();

    let mut rec = proto.instantiate();
    let err = rec
        .assign(Snapshot::record([("nope", 1u8.into())]))
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Assign { .. }));
}

#[test]
fn test_defined_type_reused_by_name() {
    let mut reg = Registry::with_builtins();
    let point = StructSpec::new()
        .endian(Endian::Little)
        .field("x", TypeSpec::new("int16"))
        .field("y", TypeSpec::new("int16"));
    reg.define("point", &point).unwrap();

    let proto = StructSpec::new()
        .field("a", TypeSpec::new("point"))
        .field("b", TypeSpec::new("point"))
        .compile(&reg)
        .unwrap();

    let rec = proto
        .read_bytes(&[1, 0, 2, 0, 0xff, 0xff, 4, 0])
        .unwrap();
    assert_eq!(
        rec.field("b").unwrap().field("x").unwrap().value().unwrap(),
        Value::Int(-1)
    );
}

#[test]
fn test_check_value_mismatch_fails_read() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field(
            "magic",
            TypeSpec::new("uint8").param("check_value", 0x7fu8),
        )
        .compile(&reg)
        .unwrap();

    assert!(proto.read_bytes(&[0x7f]).is_ok());
    let err = proto.read_bytes(&[0x00]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Validity { .. }));
}
