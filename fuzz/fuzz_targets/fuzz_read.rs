#![no_main]
use binform::{eof, sym, Endian, Registry, StructSpec, TypeSpec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let reg = Registry::with_builtins();
    let proto = StructSpec::new()
        .endian(Endian::Big)
        .field("tag", TypeSpec::new("uint8"))
        .field("len", TypeSpec::new("uint16"))
        .field("name", TypeSpec::new("string").param("read_length", sym("len")))
        .field(
            "flags",
            TypeSpec::array_of(TypeSpec::new("bit1")).param("initial_length", 8u8),
        )
        .field(
            "rest",
            TypeSpec::array_of(TypeSpec::new("uint8")).param("read_until", eof()),
        )
        .compile(&reg)
        .unwrap();

    // reads must either succeed or fail cleanly, never panic
    if let Ok(mut rec) = proto.read_bytes(data) {
        let _ = rec.snapshot();
        let _ = rec.num_bytes();
        let _ = rec.to_bytes();
    }
});
