use crate::Value;

/// Observer of a traced read
///
/// The driver reports every container boundary and every decoded
/// primitive. All methods default to no-ops so an observer implements
/// only what it wants.
pub trait ReadObserver {
    /// A container field is about to read its children
    fn enter(&mut self, name: &str) {
        let _ = name;
    }

    /// A primitive field decoded a value
    fn value(&mut self, name: &str, value: &Value) {
        let _ = (name, value);
    }

    /// A container field finished reading
    fn leave(&mut self, name: &str) {
        let _ = name;
    }
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl ReadObserver for NullObserver {}

/// Observer that records one line per event
///
/// ```
/// use binform::{Registry, StructSpec, TraceLog, TypeSpec};
///
/// let reg = Registry::with_builtins();
/// let proto = StructSpec::new()
///     .field("tag", TypeSpec::new("uint8"))
///     .compile(&reg)
///     .unwrap();
/// let mut log = TraceLog::default();
/// proto.instantiate().read_traced(&[0x07][..], &mut log).unwrap();
/// assert!(log.events.iter().any(|e| e.contains("tag = 7")));
/// ```
#[derive(Debug, Default)]
pub struct TraceLog {
    /// Recorded events, in read order
    pub events: Vec<String>,
}

impl ReadObserver for TraceLog {
    fn enter(&mut self, name: &str) {
        self.events.push(format!("{} {{", name));
    }

    fn value(&mut self, name: &str, value: &Value) {
        self.events.push(format!("{} = {}", name, value));
    }

    fn leave(&mut self, name: &str) {
        self.events.push(format!("}} {}", name));
    }
}
