use binform::{Registry, Snapshot, StructSpec, TypeSpec, Value};

#[test]
fn test_bit_fields_pack_around_byte_field() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("a", TypeSpec::new("bit4"))
        .field("b", TypeSpec::new("uint8"))
        .field("c", TypeSpec::new("bit4"))
        .compile(&reg)
        .unwrap();

    let mut rec = proto.instantiate();
    rec.assign(Snapshot::record([
        ("a", 1u8.into()),
        ("b", 0x42u8.into()),
        ("c", 2u8.into()),
    ]))
    .unwrap();

    // a in the high nibble of byte 0, padded; b forces alignment;
    // c in the high nibble of byte 2, padded by the final flush
    assert_eq!(rec.to_bytes().unwrap(), vec![0x10, 0x42, 0x20]);
    assert_eq!(rec.num_bytes().unwrap(), 3);
    assert_eq!(rec.num_bits().unwrap(), 20);

    let back = proto.read_bytes(&[0x10, 0x42, 0x20]).unwrap();
    assert_eq!(back.snapshot().unwrap(), rec.snapshot().unwrap());
}

#[test]
fn test_adjacent_bit_fields_share_a_byte() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("hi", TypeSpec::new("bit4"))
        .field("lo", TypeSpec::new("bit4"))
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[0xAB]).unwrap();
    assert_eq!(rec.field("hi").unwrap().value().unwrap(), Value::UInt(0xA));
    assert_eq!(rec.field("lo").unwrap().value().unwrap(), Value::UInt(0xB));
    assert_eq!(rec.num_bytes().unwrap(), 1);
}

#[test]
fn test_little_endian_bit_fields_drain_lsb_first() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("lo", TypeSpec::new("bit4_le"))
        .field("hi", TypeSpec::new("bit4_le"))
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[0xAB]).unwrap();
    assert_eq!(rec.field("lo").unwrap().value().unwrap(), Value::UInt(0xB));
    assert_eq!(rec.field("hi").unwrap().value().unwrap(), Value::UInt(0xA));

    let mut out = proto.instantiate();
    out.assign(Snapshot::record([("lo", 0xBu8.into()), ("hi", 0xAu8.into())]))
        .unwrap();
    assert_eq!(out.to_bytes().unwrap(), vec![0xAB]);
}

#[test]
fn test_flag_bits() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("ack", TypeSpec::new("bit1"))
        .field("syn", TypeSpec::new("bit1"))
        .field("fin", TypeSpec::new("bit1"))
        .field("window", TypeSpec::new("bit5"))
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[0b101_10110]).unwrap();
    assert_eq!(rec.field("ack").unwrap().value().unwrap(), Value::UInt(1));
    assert_eq!(rec.field("syn").unwrap().value().unwrap(), Value::UInt(0));
    assert_eq!(rec.field("fin").unwrap().value().unwrap(), Value::UInt(1));
    assert_eq!(
        rec.field("window").unwrap().value().unwrap(),
        Value::UInt(0b10110)
    );
}

#[test]
fn test_bits_spanning_bytes() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("wide", TypeSpec::new("bit12"))
        .field("narrow", TypeSpec::new("bit4"))
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[0x12, 0x34]).unwrap();
    assert_eq!(
        rec.field("wide").unwrap().value().unwrap(),
        Value::UInt(0x123)
    );
    assert_eq!(
        rec.field("narrow").unwrap().value().unwrap(),
        Value::UInt(0x4)
    );
    assert_eq!(rec.num_bytes().unwrap(), 2);
}

#[test]
fn test_bit_value_out_of_range_fails_write() {
    let reg = Registry::with_builtins();
    let proto = TypeSpec::new("bit3").compile(&reg).unwrap();

    let mut rec = proto.instantiate();
    rec.assign(9u8).unwrap();
    assert!(rec.to_bytes().is_err());
}

#[test]
fn test_lone_bit_field_rounds_up_to_a_byte() {
    let reg = Registry::with_builtins();
    let proto = TypeSpec::new("bit3").compile(&reg).unwrap();

    let mut rec = proto.instantiate();
    rec.assign(5u8).unwrap();
    assert_eq!(rec.num_bits().unwrap(), 3);
    assert_eq!(rec.num_bytes().unwrap(), 1);
    assert_eq!(rec.to_bytes().unwrap(), vec![0b1010_0000]);
}
