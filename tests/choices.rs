use binform::{choices, sym, ErrorKind, Registry, Snapshot, StructSpec, TypeSpec, Value};

fn tagged_message(reg: &Registry, copy_on_change: bool) -> binform::Prototype {
    let by_id = StructSpec::new().field("id", TypeSpec::new("uint16_be"));
    let with_extra = StructSpec::new()
        .field("id", TypeSpec::new("uint16_be"))
        .field("extra", TypeSpec::new("uint8"));
    StructSpec::new()
        .field("kind", TypeSpec::new("uint8"))
        .field(
            "body",
            TypeSpec::new("choice")
                .param(
                    "choices",
                    choices([(1u8, with_extra.to_type_spec()), (2u8, by_id.to_type_spec())]),
                )
                .param("selection", sym("kind"))
                .param("copy_on_change", copy_on_change),
        )
        .compile(reg)
        .unwrap()
}

#[test]
fn test_selection_drives_variant_on_read() {
    let reg = Registry::with_builtins();
    let proto = tagged_message(&reg, false);

    let rec = proto.read_bytes(&[1, 0x01, 0x02, 0x07]).unwrap();
    assert_eq!(
        rec.snapshot().unwrap(),
        Snapshot::record([
            ("kind", 1u8.into()),
            (
                "body",
                Snapshot::record([("id", 0x0102u16.into()), ("extra", 7u8.into())])
            ),
        ])
    );

    let rec = proto.read_bytes(&[2, 0x01, 0x02]).unwrap();
    assert_eq!(
        rec.field("body").unwrap().field("id").unwrap().value().unwrap(),
        Value::UInt(0x0102)
    );
}

#[test]
fn test_unknown_selection_fails() {
    let reg = Registry::with_builtins();
    let proto = tagged_message(&reg, false);

    let err = proto.read_bytes(&[9, 0, 0]).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::UnknownChoice { key } if key == "9"
    ));
}

#[test]
fn test_copy_on_change_migrates_shared_fields() {
    let reg = Registry::with_builtins();
    let proto = tagged_message(&reg, true);

    let mut rec = proto.instantiate();
    rec.assign(Snapshot::record([
        ("kind", 1u8.into()),
        (
            "body",
            Snapshot::record([("id", 0x0102u16.into()), ("extra", 7u8.into())]),
        ),
    ]))
    .unwrap();

    // switch variants; the shared `id` migrates, `extra` is dropped
    rec.field_mut("kind").unwrap().assign(2u8).unwrap();
    assert_eq!(rec.to_bytes().unwrap(), vec![2, 0x01, 0x02]);
    assert_eq!(
        rec.field("body").unwrap().field("id").unwrap().value().unwrap(),
        Value::UInt(0x0102)
    );
}

#[test]
fn test_without_copy_on_change_new_variant_is_clear() {
    let reg = Registry::with_builtins();
    let proto = tagged_message(&reg, false);

    let mut rec = proto.instantiate();
    rec.assign(Snapshot::record([
        ("kind", 1u8.into()),
        (
            "body",
            Snapshot::record([("id", 0x0102u16.into()), ("extra", 7u8.into())]),
        ),
    ]))
    .unwrap();

    rec.field_mut("kind").unwrap().assign(2u8).unwrap();
    assert_eq!(rec.to_bytes().unwrap(), vec![2, 0, 0]);
}

#[test]
fn test_choice_num_bytes_follows_selection() {
    let reg = Registry::with_builtins();
    let proto = tagged_message(&reg, false);

    let mut rec = proto.instantiate();
    rec.field_mut("kind").unwrap().assign(1u8).unwrap();
    assert_eq!(rec.num_bytes().unwrap(), 4);
    rec.field_mut("kind").unwrap().assign(2u8).unwrap();
    assert_eq!(rec.num_bytes().unwrap(), 3);
}

#[test]
fn test_choice_round_trip() {
    let reg = Registry::with_builtins();
    let proto = tagged_message(&reg, false);

    let original = proto.read_bytes(&[1, 0xde, 0xad, 0x42]).unwrap();
    let mut copy = proto.instantiate();
    copy.assign(original.snapshot().unwrap()).unwrap();
    assert_eq!(copy.to_bytes().unwrap(), vec![1, 0xde, 0xad, 0x42]);
}
