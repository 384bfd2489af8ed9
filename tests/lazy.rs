use binform::{
    eof, expr, sym, ErrorKind, Registry, Snapshot, StructSpec, TraceLog, TypeSpec, Value,
};

fn flagged(reg: &Registry) -> binform::Prototype {
    StructSpec::new()
        .field("flag", TypeSpec::new("uint8"))
        .field(
            "data",
            TypeSpec::new("string")
                .param("read_length", 3u8)
                .param("onlyif", expr(|env| Ok(Value::Bool(env.get("flag")?.as_u64()? != 0)))),
        )
        .compile(reg)
        .unwrap()
}

#[test]
fn test_onlyif_false_skips_field_entirely() {
    let reg = Registry::with_builtins();
    let proto = flagged(&reg);

    let rec = proto.read_bytes(&[0]).unwrap();
    assert_eq!(rec.snapshot().unwrap(), Snapshot::record([("flag", 0u8.into())]));
    assert_eq!(rec.num_bytes().unwrap(), 1);
}

#[test]
fn test_onlyif_true_reads_normally() {
    let reg = Registry::with_builtins();
    let proto = flagged(&reg);

    let rec = proto.read_bytes(&[1, 0x61, 0x62, 0x63]).unwrap();
    assert_eq!(
        rec.snapshot().unwrap(),
        Snapshot::record([("flag", 1u8.into()), ("data", "abc".into())])
    );
    assert_eq!(rec.num_bytes().unwrap(), 4);
}

#[test]
fn test_symbol_resolves_through_grandparent() {
    let reg = Registry::with_builtins();
    let inner = StructSpec::new().field(
        "payload",
        TypeSpec::new("string").param("read_length", sym("len")),
    );
    let proto = StructSpec::new()
        .field("len", TypeSpec::new("uint8"))
        .field("inner", inner.to_type_spec())
        .compile(&reg)
        .unwrap();

    let rec = proto.read_bytes(&[2, 0x68, 0x69]).unwrap();
    assert_eq!(
        rec.field("inner")
            .unwrap()
            .field("payload")
            .unwrap()
            .value()
            .unwrap(),
        Value::from("hi")
    );
}

#[test]
fn test_unresolved_symbol_fails() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field(
            "data",
            TypeSpec::new("string").param("read_length", sym("no_such_len")),
        )
        .compile(&reg)
        .unwrap();

    let err = proto.read_bytes(&[1, 2, 3]).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::UnresolvedSymbol { name } if name == "no_such_len"
    ));
}

#[test]
fn test_index_resolver_inside_array_elements() {
    let reg = Registry::with_builtins();
    let elem = StructSpec::new().field(
        "slot",
        TypeSpec::new("uint8").param("value", expr(|env| Ok(Value::UInt(env.index()?)))),
    );
    let proto = TypeSpec::array_of(elem.to_type_spec())
        .param("initial_length", 3u8)
        .compile(&reg)
        .unwrap();

    let mut rec = proto.instantiate();
    assert_eq!(rec.to_bytes().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_offset_resolver() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("a", TypeSpec::new("uint16_be"))
        .field(
            "pos",
            TypeSpec::new("uint8").param("value", expr(|env| Ok(Value::UInt(env.offset()?)))),
        )
        .compile(&reg)
        .unwrap();

    let mut rec = proto.instantiate();
    assert_eq!(rec.to_bytes().unwrap(), vec![0, 0, 2]);
}

#[test]
fn test_parent_environment_is_reachable() {
    let reg = Registry::with_builtins();
    let inner = StructSpec::new().field(
        "echo",
        TypeSpec::new("uint8").param(
            "value",
            expr(|env| env.parent().expect("has parent").get("seed")),
        ),
    );
    let proto = StructSpec::new()
        .field("seed", TypeSpec::new("uint8"))
        .field("inner", inner.to_type_spec())
        .compile(&reg)
        .unwrap();

    let mut rec = proto.instantiate();
    rec.field_mut("seed").unwrap().assign(9u8).unwrap();
    assert_eq!(rec.to_bytes().unwrap(), vec![9, 9]);
}

#[test]
fn test_traced_read_reports_fields() {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .field("tag", TypeSpec::new("uint8"))
        .field(
            "items",
            TypeSpec::array_of(TypeSpec::new("uint8")).param("read_until", eof()),
        )
        .compile(&reg)
        .unwrap();

    let mut log = TraceLog::default();
    let mut rec = proto.instantiate();
    rec.read_traced(&[7u8, 1, 2][..], &mut log).unwrap();

    assert!(log.events.iter().any(|e| e.contains("tag = 7")));
    assert!(log.events.iter().any(|e| e.contains("items {")));
    assert!(log.events.iter().any(|e| e.contains("1 = 2")));
}
