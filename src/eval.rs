use crate::{
    node::{driver, NodeId, Tree},
    params::ParamValue,
    Error, Snapshot, Value,
};

/// A name bound in an override map
#[derive(Debug, Clone)]
pub(crate) enum Bound {
    Value(Value),
    Node(NodeId),
}

pub(crate) const NO_OVERRIDES: &[(&str, Bound)] = &[];

/// Resolution environment handed to deferred expressions
///
/// Bound to a live node; symbol lookups consult the override map
/// first, then walk the parent chain, checking each ancestor's
/// parameters before its named fields.
pub struct Env<'a> {
    tree: &'a Tree,
    node: NodeId,
    overrides: &'a [(&'a str, Bound)],
}

impl<'a> Env<'a> {
    pub(crate) fn new(tree: &'a Tree, node: NodeId) -> Env<'a> {
        Env {
            tree,
            node,
            overrides: NO_OVERRIDES,
        }
    }

    pub(crate) fn with_overrides(
        tree: &'a Tree,
        node: NodeId,
        overrides: &'a [(&'a str, Bound)],
    ) -> Env<'a> {
        Env {
            tree,
            node,
            overrides,
        }
    }

    fn bound(&self, name: &str) -> Option<&Bound> {
        self.overrides
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| b)
    }

    /// Resolve a symbol to a scalar value
    ///
    /// Overrides bind literally; otherwise the parent chain is walked,
    /// each ancestor consulted first for a parameter of that name and
    /// then for a named field. Fails with `UnresolvedSymbol` when the
    /// root is passed without a binding.
    pub fn get(&self, sym: &str) -> Result<Value, Error> {
        if let Some(bound) = self.bound(sym) {
            return match bound {
                Bound::Value(v) => Ok(v.clone()),
                Bound::Node(id) => driver::current_value(self.tree, *id),
            };
        }
        match self.tree.parent(self.node) {
            Some(parent) => lookup_symbol(self.tree, parent, sym),
            None => Err(Error::unresolved_symbol(sym)),
        }
    }

    /// Resolve a symbol to a structured view for interrogation
    pub fn field(&self, name: &str) -> Result<FieldView<'a>, Error> {
        if let Some(bound) = self.bound(name) {
            return match bound {
                Bound::Node(id) => Ok(FieldView {
                    tree: self.tree,
                    id: *id,
                }),
                Bound::Value(_) => Err(Error::message(format!(
                    "{} is bound to a plain value, not a field",
                    name
                ))),
            };
        }
        let mut cursor = self.node;
        while let Some(parent) = self.tree.parent(cursor) {
            if let Some(child) = self.tree.child_by_name(parent, name) {
                return Ok(FieldView {
                    tree: self.tree,
                    id: child,
                });
            }
            cursor = parent;
        }
        Err(Error::unresolved_symbol(name))
    }

    /// Position within the nearest containing array
    pub fn index(&self) -> Result<u64, Error> {
        if let Some(bound) = self.bound("index") {
            return match bound {
                Bound::Value(v) => v.as_u64(),
                Bound::Node(_) => Err(Error::message("index is bound to a field")),
            };
        }
        let mut cursor = self.node;
        while let Some(parent) = self.tree.parent(cursor) {
            if let Some(position) = self.tree.array_position(parent, cursor) {
                return Ok(position as u64);
            }
            cursor = parent;
        }
        Err(Error::unresolved_symbol("index"))
    }

    /// Byte offset of the bound node from the root of its tree
    pub fn offset(&self) -> Result<u64, Error> {
        driver::byte_offset_from_root(self.tree, self.node)
    }

    /// Environment bound to the parent node, if any
    pub fn parent(&self) -> Option<Env<'a>> {
        self.tree
            .parent(self.node)
            .map(|p| Env::new(self.tree, p))
    }
}

/// Walk `start` and its ancestors for a binding of `sym`
pub(crate) fn lookup_symbol(tree: &Tree, start: NodeId, sym: &str) -> Result<Value, Error> {
    let mut cursor = Some(start);
    while let Some(node) = cursor {
        if let Some(pv) = tree.params(node).get(sym) {
            return resolve_in(tree, node, pv);
        }
        if let Some(child) = tree.child_by_name(node, sym) {
            return driver::current_value(tree, child);
        }
        cursor = tree.parent(node);
    }
    Err(Error::unresolved_symbol(sym))
}

/// Resolve a parameter value in the context of `node` until a literal
/// is produced
pub(crate) fn resolve_in(tree: &Tree, node: NodeId, pv: &ParamValue) -> Result<Value, Error> {
    match pv {
        ParamValue::Lit(v) => Ok(v.clone()),
        ParamValue::Sym(s) => Env::new(tree, node).get(s),
        ParamValue::Expr(e) => e.call(&Env::new(tree, node)),
        other => Err(Error::message(format!(
            "parameter does not evaluate to a value: {:?}",
            other
        ))),
    }
}

/// Lazy access to the parameters of one node
///
/// Handed to codecs so transfer parameters (lengths, padding) may
/// reference sibling fields.
pub struct Ctx<'a> {
    env: Env<'a>,
}

impl<'a> Ctx<'a> {
    pub(crate) fn new(tree: &'a Tree, node: NodeId) -> Ctx<'a> {
        Ctx {
            env: Env::new(tree, node),
        }
    }

    /// The environment of the owning node
    pub fn env(&self) -> &Env<'a> {
        &self.env
    }

    /// Evaluate one of the owning node's parameters, if present
    pub fn param(&self, name: &str) -> Result<Option<Value>, Error> {
        match self.env.tree.params(self.env.node).get(name) {
            None => Ok(None),
            Some(pv) => resolve_in(self.env.tree, self.env.node, pv).map(Some),
        }
    }

    /// Evaluate a parameter that must be present
    pub fn require(&self, name: &str) -> Result<Value, Error> {
        self.param(name)?
            .ok_or_else(|| Error::missing_parameter(name))
    }
}

/// Structured view of a resolved field, for use inside expressions
///
/// ```no_run
/// use binform::{expr, Value};
///
/// // a length prefix computed from a later sibling
/// let len = expr(|env| Ok(Value::from(env.field("data")?.len()?)));
/// ```
pub struct FieldView<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> FieldView<'a> {
    /// The field's current scalar value (primitives only)
    pub fn value(&self) -> Result<Value, Error> {
        driver::current_value(self.tree, self.id)
    }

    /// The field's snapshot
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        driver::own_snapshot(self.tree, self.id)
    }

    /// Length: bytes of a string, elements of an array, visible fields
    /// of a record
    pub fn len(&self) -> Result<usize, Error> {
        driver::length_of(self.tree, self.id)
    }

    /// Navigate to a named field
    pub fn field(&self, name: &str) -> Result<FieldView<'a>, Error> {
        let child = driver::named_child(self.tree, self.id, name)?;
        Ok(FieldView {
            tree: self.tree,
            id: child,
        })
    }

    /// Navigate to an element by position
    pub fn at(&self, index: usize) -> Result<FieldView<'a>, Error> {
        let child = driver::indexed_child(self.tree, self.id, index)?;
        Ok(FieldView {
            tree: self.tree,
            id: child,
        })
    }

    /// Whether the field is in its initial state
    pub fn is_clear(&self) -> bool {
        driver::is_clear(self.tree, self.id)
    }
}
