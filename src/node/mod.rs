pub(crate) mod driver;

use crate::{
    io::{Sink, Source, StreamInput, StreamOutput},
    sanitize::{LenPolicy, ProtoKind, Prototype, SanitizedParams},
    trace::{NullObserver, ReadObserver},
    Error, Snapshot, Value,
};
use std::fmt;
use std::io::{Read, Write};

/// Index of a node within its owning tree
///
/// Parents are stored as plain indices; ownership lives solely in the
/// arena, so no reference cycles arise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(u32);

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) proto: Prototype,
    pub(crate) slot: Slot,
}

#[derive(Debug)]
pub(crate) enum Slot {
    Prim(Option<Value>),
    Struct(Vec<NodeId>),
    Array(Vec<NodeId>),
    Choice(Option<(usize, NodeId)>),
    Skip,
    Rest(Option<Vec<u8>>),
}

#[derive(Debug, Default)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    // while set, `value`-bound primitives report their decoded value so
    // dependent siblings (read lengths, selections) see the wire data
    pub(crate) reading: bool,
}

impl Tree {
    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub(crate) fn params(&self, id: NodeId) -> &SanitizedParams {
        &self.node(id).proto.params
    }

    pub(crate) fn kind(&self, id: NodeId) -> &ProtoKind {
        &self.node(id).proto.kind
    }

    /// Look up a struct's child by field name
    pub(crate) fn child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        match (&self.node(id).proto.kind, &self.node(id).slot) {
            (ProtoKind::Struct(layout), Slot::Struct(children)) => layout
                .position(name)
                .and_then(|pos| children.get(pos).copied()),
            _ => None,
        }
    }

    /// Position of `child` within `parent` when `parent` is an array
    pub(crate) fn array_position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        match &self.node(parent).slot {
            Slot::Array(elems) => elems.iter().position(|&e| e == child),
            _ => None,
        }
    }

    /// Build a node (and its eager subtree) from a prototype
    ///
    /// Fixed-length arrays and resolvable choices materialize
    /// immediately; unresolvable ones stay empty until the first read,
    /// write, or assignment.
    pub(crate) fn instantiate(&mut self, proto: &Prototype, parent: Option<NodeId>) -> NodeId {
        let slot = match &proto.kind {
            ProtoKind::Prim(_) => Slot::Prim(None),
            ProtoKind::Struct(_) => Slot::Struct(Vec::new()),
            ProtoKind::Array(_) => Slot::Array(Vec::new()),
            ProtoKind::Choice(_) => Slot::Choice(None),
            ProtoKind::Skip => Slot::Skip,
            ProtoKind::Rest => Slot::Rest(None),
        };
        let id = self.push(Node {
            parent,
            proto: proto.clone(),
            slot,
        });
        match &proto.kind {
            ProtoKind::Struct(layout) => {
                let layout = layout.clone();
                let children: Vec<NodeId> = layout
                    .fields
                    .iter()
                    .map(|f| self.instantiate(&f.proto, Some(id)))
                    .collect();
                self.node_mut(id).slot = Slot::Struct(children);
            }
            ProtoKind::Array(layout) => {
                let layout = layout.clone();
                if let LenPolicy::Fixed(pv) = &layout.policy {
                    if let Ok(n) = crate::eval::resolve_in(self, id, pv)
                        .and_then(|v| v.as_u64())
                    {
                        let elems: Vec<NodeId> = (0..n)
                            .map(|_| self.instantiate(&layout.elem, Some(id)))
                            .collect();
                        self.node_mut(id).slot = Slot::Array(elems);
                    }
                }
            }
            ProtoKind::Choice(_) => {
                let _ = driver::materialize_choice(self, id);
            }
            _ => {}
        }
        id
    }
}

/// A live, mutable instance of a compiled schema
///
/// Manufactured from a [`Prototype`](crate::Prototype); owns the whole
/// field tree.
pub struct Record {
    tree: Tree,
    root: NodeId,
}

impl Record {
    pub(crate) fn from_proto(proto: &Prototype) -> Record {
        let mut tree = Tree::default();
        let root = tree.instantiate(proto, None);
        Record { tree, root }
    }

    /// Read the record from a reader, replacing its current contents
    pub fn read<R: Read>(&mut self, reader: R) -> Result<(), Error> {
        let mut io = StreamInput::new(reader);
        self.read_from(&mut io)
    }

    /// Read the record from an in-memory byte slice
    pub fn read_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut io = StreamInput::new(std::io::Cursor::new(data));
        self.read_from(&mut io)
    }

    /// Read from an existing [`Source`], leaving it positioned after
    /// the record's bytes
    pub fn read_from(&mut self, io: &mut dyn Source) -> Result<(), Error> {
        self.read_observed(io, &mut NullObserver)
    }

    /// Read while reporting every decoded field to an observer
    pub fn read_traced<R: Read>(
        &mut self,
        reader: R,
        observer: &mut dyn ReadObserver,
    ) -> Result<(), Error> {
        let mut io = StreamInput::new(reader);
        self.read_observed(&mut io, observer)
    }

    fn read_observed(
        &mut self,
        io: &mut dyn Source,
        observer: &mut dyn ReadObserver,
    ) -> Result<(), Error> {
        let origin = io.pos();
        self.tree.reading = true;
        let result = driver::read_node(&mut self.tree, self.root, io, origin, "", observer);
        self.tree.reading = false;
        result?;
        io.align();
        Ok(())
    }

    /// Write the record's encoded form to a writer
    pub fn write<W: Write>(&mut self, writer: W) -> Result<(), Error> {
        let mut io = StreamOutput::new(writer);
        self.write_to(&mut io)
    }

    /// Write to an existing [`Sink`], padding any trailing bits
    pub fn write_to(&mut self, io: &mut dyn Sink) -> Result<(), Error> {
        driver::write_node(&mut self.tree, self.root, io)?;
        io.align()
    }

    /// The record's encoded form; equal to what [`write`](Self::write)
    /// emits
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Replace the record's contents with a snapshot-shaped value
    pub fn assign(&mut self, value: impl Into<Snapshot>) -> Result<(), Error> {
        let snapshot = value.into();
        driver::assign_node(&mut self.tree, self.root, &snapshot)
    }

    /// Copy a compatible record's contents, by snapshot
    pub fn assign_from(&mut self, other: &Record) -> Result<(), Error> {
        self.assign(other.snapshot()?)
    }

    /// Return to the initial state
    pub fn clear(&mut self) {
        driver::clear_node(&mut self.tree, self.root);
    }

    /// Whether the record is in its initial state
    pub fn is_clear(&self) -> bool {
        driver::is_clear(&self.tree, self.root)
    }

    /// The plain-value projection of the tree
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        driver::own_snapshot(&self.tree, self.root)
    }

    /// Encoded size in bytes (bit fields rounded up at the end)
    pub fn num_bytes(&self) -> Result<u64, Error> {
        Ok((self.num_bits()? + 7) / 8)
    }

    /// Exact encoded size in bits
    pub fn num_bits(&self) -> Result<u64, Error> {
        driver::fold_bits(&self.tree, self.root, 0)
    }

    /// Navigate to a named field of the root record
    pub fn field(&self, name: &str) -> Result<Field<'_>, Error> {
        let id = driver::named_child(&self.tree, self.root, name)?;
        Ok(Field {
            tree: &self.tree,
            id,
        })
    }

    /// Navigate to a named field for mutation
    pub fn field_mut(&mut self, name: &str) -> Result<FieldMut<'_>, Error> {
        let id = driver::named_child(&self.tree, self.root, name)?;
        Ok(FieldMut {
            tree: &mut self.tree,
            id,
        })
    }

    /// Handle on the root node itself
    pub fn root(&self) -> Field<'_> {
        Field {
            tree: &self.tree,
            id: self.root,
        }
    }

    /// Mutable handle on the root node
    pub fn root_mut(&mut self) -> FieldMut<'_> {
        FieldMut {
            tree: &mut self.tree,
            id: self.root,
        }
    }

    /// Names of the root record's visible fields, in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        driver::field_names(&self.tree, self.root)
    }

    /// Byte offset of a named field from the start of the record
    pub fn offset_of(&self, name: &str) -> Result<u64, Error> {
        self.field(name)?.offset()
    }

    /// Byte offset of a named field from its immediate parent
    pub fn rel_offset_of(&self, name: &str) -> Result<u64, Error> {
        self.field(name)?.rel_offset()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snapshot() {
            Ok(snapshot) => f.debug_tuple("Record").field(&snapshot).finish(),
            Err(_) => f.write_str("Record(<unresolved>)"),
        }
    }
}

/// Read-only handle on one field of a record
pub struct Field<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> Field<'a> {
    /// The field's snapshot
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        driver::own_snapshot(self.tree, self.id)
    }

    /// The field's scalar value (primitives only)
    pub fn value(&self) -> Result<Value, Error> {
        driver::current_value(self.tree, self.id)
    }

    /// Encoded size in bytes
    pub fn num_bytes(&self) -> Result<u64, Error> {
        Ok((self.num_bits()? + 7) / 8)
    }

    /// Exact encoded size in bits
    pub fn num_bits(&self) -> Result<u64, Error> {
        driver::fold_bits(self.tree, self.id, 0)
    }

    /// Byte offset from the root of the record
    pub fn offset(&self) -> Result<u64, Error> {
        driver::byte_offset_from_root(self.tree, self.id)
    }

    /// Byte offset from the immediate parent; equals
    /// [`offset`](Self::offset) at the root
    pub fn rel_offset(&self) -> Result<u64, Error> {
        driver::byte_offset_from_parent(self.tree, self.id)
    }

    /// Whether the field is in its initial state
    pub fn is_clear(&self) -> bool {
        driver::is_clear(self.tree, self.id)
    }

    /// Navigate to a named field
    pub fn field(&self, name: &str) -> Result<Field<'a>, Error> {
        let id = driver::named_child(self.tree, self.id, name)?;
        Ok(Field {
            tree: self.tree,
            id,
        })
    }

    /// Navigate to an array element
    pub fn at(&self, index: usize) -> Result<Field<'a>, Error> {
        let id = driver::indexed_child(self.tree, self.id, index)?;
        Ok(Field {
            tree: self.tree,
            id,
        })
    }

    /// Element count of an array, byte length of a string, or visible
    /// field count of a record
    pub fn len(&self) -> Result<usize, Error> {
        driver::length_of(self.tree, self.id)
    }

    /// Whether [`len`](Self::len) is zero
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Names of visible fields, in declaration order
    pub fn field_names(&self) -> Vec<&'a str> {
        driver::field_names(self.tree, self.id)
    }
}

/// Mutable handle on one field of a record
pub struct FieldMut<'a> {
    tree: &'a mut Tree,
    id: NodeId,
}

impl<'a> FieldMut<'a> {
    /// Replace the field's contents with a snapshot-shaped value
    pub fn assign(&mut self, value: impl Into<Snapshot>) -> Result<(), Error> {
        let snapshot = value.into();
        driver::assign_node(self.tree, self.id, &snapshot)
    }

    /// Return the field to its initial state
    pub fn clear(&mut self) {
        driver::clear_node(self.tree, self.id);
    }

    /// Assign an array element, extending with clear elements when the
    /// index is beyond the current length
    pub fn set_at(&mut self, index: usize, value: impl Into<Snapshot>) -> Result<(), Error> {
        let elem = driver::elem_extending(self.tree, self.id, index)?;
        let snapshot = value.into();
        driver::assign_node(self.tree, elem, &snapshot)
    }

    /// Navigate to a named field for mutation
    pub fn field_mut(&mut self, name: &str) -> Result<FieldMut<'_>, Error> {
        let id = driver::named_child(self.tree, self.id, name)?;
        Ok(FieldMut {
            tree: &mut *self.tree,
            id,
        })
    }

    /// Navigate to an array element for mutation
    pub fn at_mut(&mut self, index: usize) -> Result<FieldMut<'_>, Error> {
        let id = driver::indexed_child(self.tree, self.id, index)?;
        Ok(FieldMut {
            tree: &mut *self.tree,
            id,
        })
    }

    /// Downgrade to a read-only handle
    pub fn as_field(&self) -> Field<'_> {
        Field {
            tree: &*self.tree,
            id: self.id,
        }
    }
}
