use binform::{expr, sym, Endian, Registry, Snapshot, StructSpec, TypeSpec, Value};

fn message(reg: &Registry) -> binform::Prototype {
    StructSpec::new()
        .endian(Endian::Little)
        .field("version", TypeSpec::new("uint8"))
        .field(
            "len",
            TypeSpec::new("uint16")
                .param("value", expr(|env| Ok(Value::from(env.field("payload")?.len()?)))),
        )
        .field(
            "payload",
            TypeSpec::new("string").param("read_length", sym("len")),
        )
        .field(
            "crc",
            TypeSpec::array_of(TypeSpec::new("uint16")).param("initial_length", 2u8),
        )
        .compile(reg)
        .unwrap()
}

#[test]
fn test_write_then_read_preserves_snapshot() {
    let reg = Registry::with_builtins();
    let proto = message(&reg);

    let mut rec = proto.instantiate();
    rec.field_mut("version").unwrap().assign(2u8).unwrap();
    rec.field_mut("payload").unwrap().assign("ping").unwrap();
    rec.field_mut("crc")
        .unwrap()
        .assign(Snapshot::list([0x1111u16.into(), 0x2222u16.into()]))
        .unwrap();

    let encoded = rec.to_bytes().unwrap();
    assert_eq!(encoded.len() as u64, rec.num_bytes().unwrap());

    let back = proto.read_bytes(&encoded).unwrap();
    assert_eq!(back.snapshot().unwrap(), rec.snapshot().unwrap());
}

#[test]
fn test_expected_wire_layout() {
    let reg = Registry::with_builtins();
    let proto = message(&reg);

    let mut rec = proto.instantiate();
    rec.field_mut("payload").unwrap().assign("ab").unwrap();

    assert_eq!(
        rec.to_bytes().unwrap(),
        vec![
            0x00, // version
            0x02, 0x00, // len, little endian
            0x61, 0x62, // payload
            0x00, 0x00, 0x00, 0x00, // crc defaults
        ]
    );
}

#[test]
fn test_read_is_replayable_on_same_record() {
    let reg = Registry::with_builtins();
    let proto = message(&reg);

    let mut rec = proto.instantiate();
    rec.read_bytes(&[1, 3, 0, 0x78, 0x79, 0x7a, 0, 0, 0, 0]).unwrap();
    assert_eq!(
        rec.field("payload").unwrap().value().unwrap(),
        Value::from("xyz")
    );

    rec.read_bytes(&[0, 1, 0, 0x21, 0xaa, 0xaa, 0xbb, 0xbb]).unwrap();
    assert_eq!(
        rec.field("payload").unwrap().value().unwrap(),
        Value::from("!")
    );
    assert_eq!(
        rec.field("crc").unwrap().at(1).unwrap().value().unwrap(),
        Value::UInt(0xbbbb)
    );
}

#[test]
fn test_partial_read_leaves_read_fields_decoded() {
    let reg = Registry::with_builtins();
    let proto = message(&reg);

    let mut rec = proto.instantiate();
    // payload claims three bytes but only one follows
    let err = rec.read_bytes(&[1, 3, 0, 0x78]).unwrap_err();
    assert!(matches!(err.kind(), binform::ErrorKind::Eof));
    assert_eq!(
        rec.field("version").unwrap().value().unwrap(),
        Value::UInt(1)
    );
    assert!(rec.field("payload").unwrap().is_clear());
}

#[cfg(feature = "serde")]
#[test]
fn test_snapshot_serializes_to_json() {
    let reg = Registry::with_builtins();
    let proto = message(&reg);

    let mut rec = proto.instantiate();
    rec.field_mut("payload").unwrap().assign("hi").unwrap();

    let json = serde_json::to_string(&rec.snapshot().unwrap()).unwrap();
    assert_eq!(
        json,
        r#"{"version":0,"len":2,"payload":"hi","crc":[0,0]}"#
    );
}
