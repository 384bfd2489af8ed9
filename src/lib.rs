/*!

A declarative binary-data framework: describe the structure of a binary
record once and derive both the parser and the serializer from that
description, plus in-memory manipulation of the decoded value.

A schema is an ordered list of typed fields. Fields may depend on
previously declared siblings for their lengths, their presence, or
their selected variant; those dependencies are resolved lazily against
the live record while it reads or writes.

## Quick Start

A length-prefixed string, where the prefix is computed from the payload
on writes and governs the read length on reads:

```rust
use binform::{expr, sym, Registry, StructSpec, TypeSpec, Value};

let reg = Registry::with_builtins();

let pascal = StructSpec::new()
    .field(
        "len",
        TypeSpec::new("uint8")
            .param("value", expr(|env| Ok(Value::from(env.field("data")?.len()?)))),
    )
    .field("data", TypeSpec::new("string").param("read_length", sym("len")));
let proto = pascal.compile(&reg)?;

let rec = proto.read_bytes(&[0x03, b'a', b'b', b'c'])?;
assert_eq!(rec.field("data")?.value()?, Value::from("abc"));

let mut rec = proto.instantiate();
rec.field_mut("data")?.assign("hello")?;
assert_eq!(rec.to_bytes()?, b"\x05hello");
# Ok::<(), binform::Error>(())
```

## Endian inheritance and bit fields

A record declares an endian once; nested multi-byte fields without an
explicit `_le`/`_be` suffix inherit it. Adjacent bit fields pack into
shared bytes; any byte-level field forces alignment to the next byte
boundary.

```rust
use binform::{Endian, Registry, StructSpec, TypeSpec};

let reg = Registry::with_builtins();

let header = StructSpec::new()
    .endian(Endian::Big)
    .field("version", TypeSpec::new("bit4"))
    .field("ihl", TypeSpec::new("bit4"))
    .field("total_len", TypeSpec::new("uint16"));
let rec = header.compile(&reg)?.read_bytes(&[0x45, 0x00, 0x28])?;
assert_eq!(rec.field("version")?.value()?.as_u64()?, 4);
assert_eq!(rec.field("ihl")?.value()?.as_u64()?, 5);
assert_eq!(rec.field("total_len")?.value()?.as_u64()?, 40);
assert_eq!(rec.num_bytes()?, 3);
# Ok::<(), binform::Error>(())
```

## Conditionals, arrays, and choices

`onlyif` skips a field entirely when false. Arrays read a fixed count
(`initial_length`) or until a predicate holds (`read_until`), including
the special end-of-stream policy. Choices switch between variants by a
lazily evaluated selector.

```rust
use binform::{eof, Registry, Snapshot, TypeSpec};

let reg = Registry::with_builtins();

let bytes = TypeSpec::array_of(TypeSpec::new("int8")).param("read_until", eof());
let rec = bytes.compile(&reg)?.read_bytes(&[2, 3, 4, 5, 6, 7])?;
assert_eq!(
    rec.snapshot()?,
    Snapshot::list([2i8.into(), 3i8.into(), 4i8.into(), 5i8.into(), 6i8.into(), 7i8.into()])
);
# Ok::<(), binform::Error>(())
```

## Custom primitives

The wire form of a primitive is a [`Codec`]: decode one scalar, encode
one scalar, provide the clear-state default. Registering a
[`CodecFactory`] under a type name makes the codec available to
declarations like any builtin.

*/
#![warn(missing_docs)]

mod codec;
mod errors;
mod eval;
mod io;
mod node;
mod params;
mod registry;
mod sanitize;
mod schema;
mod trace;
mod value;

pub use self::codec::{
    BitCodec, Codec, CodecFactory, FixedStringCodec, FloatCodec, IntCodec, StringZCodec,
};
pub use self::errors::{Error, ErrorKind};
pub use self::eval::{Ctx, Env, FieldView};
pub use self::io::{BitCounter, BitOrder, Endian, Sink, Source, StreamInput, StreamOutput};
pub use self::node::{Field, FieldMut, Record};
pub use self::params::{choices, eof, expr, sym, AcceptedParams, Expr, ParamValue, Params};
pub use self::registry::{EndianHint, Registry};
pub use self::sanitize::{Prototype, SanitizedParams};
pub use self::schema::{StructSpec, TypeSpec};
pub use self::trace::{NullObserver, ReadObserver, TraceLog};
pub use self::value::{Snapshot, Value};
