#![no_main]
use binform::{Registry, TypeSpec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let reg = Registry::with_builtins();
    let proto = TypeSpec::new("stringz")
        .param("max_length", 16u8)
        .compile(&reg)
        .unwrap();

    if let Ok(mut rec) = proto.read_bytes(data) {
        let encoded = rec.to_bytes().unwrap();
        // the encoded form is bounded and zero terminated
        assert!(encoded.len() <= 16);
        assert_eq!(encoded.last(), Some(&0));
    }
});
