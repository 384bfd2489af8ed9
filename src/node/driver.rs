use super::{NodeId, Slot, Tree};
use crate::{
    eval::{self, Bound, Ctx, Env},
    io::{Sink, Source},
    sanitize::{ArrayLayout, ChoiceLayout, LenPolicy, ProtoKind, Prototype},
    trace::ReadObserver,
    Error, Snapshot, Value,
};
use std::rc::Rc;

fn align8(bits: u64) -> u64 {
    (bits + 7) / 8 * 8
}

fn passes_onlyif(tree: &Tree, id: NodeId) -> Result<bool, Error> {
    match tree.params(id).get("onlyif") {
        None => Ok(true),
        Some(pv) => eval::resolve_in(tree, id, pv)?.as_bool(),
    }
}

fn array_layout(tree: &Tree, id: NodeId) -> Rc<ArrayLayout> {
    match tree.kind(id) {
        ProtoKind::Array(layout) => layout.clone(),
        _ => unreachable!("node is not an array"),
    }
}

fn choice_layout(tree: &Tree, id: NodeId) -> Rc<ChoiceLayout> {
    match tree.kind(id) {
        ProtoKind::Choice(layout) => layout.clone(),
        _ => unreachable!("node is not a choice"),
    }
}

fn active_choice_child(tree: &Tree, id: NodeId) -> Option<NodeId> {
    match &tree.node(id).slot {
        Slot::Choice(Some((_, child))) => Some(*child),
        _ => None,
    }
}

// ---------------------------------------------------------------- read

pub(crate) fn read_node(
    tree: &mut Tree,
    id: NodeId,
    io: &mut dyn Source,
    origin: u64,
    name: &str,
    observer: &mut dyn ReadObserver,
) -> Result<(), Error> {
    if !passes_onlyif(tree, id)? {
        return Ok(());
    }

    let check = tree.params(id).get("check_offset").cloned();
    let adjust = tree.params(id).get("adjust_offset").cloned();
    let rel = io.pos() - origin;
    if let Some(pv) = check {
        let expected = eval::resolve_in(tree, id, &pv)?.as_u64()?;
        if rel != expected {
            return Err(Error::offset_mismatch(expected, rel));
        }
    } else if let Some(pv) = adjust {
        let target = eval::resolve_in(tree, id, &pv)?.as_u64()?;
        if target < rel {
            return Err(Error::offset_mismatch(target, rel));
        }
        io.skip(target - rel)?;
    }

    clear_node(tree, id);

    match tree.kind(id).clone() {
        ProtoKind::Prim(codec) => {
            let value = {
                let cx = Ctx::new(tree, id);
                codec.decode(io, &cx)?
            };
            observer.value(name, &value);
            set_prim(tree, id, value);
        }
        ProtoKind::Struct(layout) => {
            observer.enter(name);
            let children = struct_children(tree, id);
            for (def, child) in layout.fields.iter().zip(children) {
                read_node(tree, child, io, origin, &def.name, observer)?;
            }
            observer.leave(name);
        }
        ProtoKind::Array(layout) => {
            observer.enter(name);
            match &layout.policy {
                LenPolicy::Fixed(pv) => {
                    let n = eval::resolve_in(tree, id, pv)?.as_u64()? as usize;
                    set_elem_count(tree, id, n);
                    for i in 0..n {
                        let elem = elem_at(tree, id, i);
                        read_node(tree, elem, io, origin, &i.to_string(), observer)?;
                    }
                }
                LenPolicy::Until(pred) => {
                    let mut count = 0usize;
                    loop {
                        let elem = elem_extending(tree, id, count)?;
                        read_node(tree, elem, io, origin, &count.to_string(), observer)?;
                        count += 1;
                        let done = {
                            let overrides = [
                                ("index", Bound::Value(Value::UInt((count - 1) as u64))),
                                ("element", Bound::Node(elem)),
                                ("array", Bound::Node(id)),
                            ];
                            let env = Env::with_overrides(tree, id, &overrides);
                            pred.call(&env)?.as_bool()?
                        };
                        if done {
                            break;
                        }
                    }
                    truncate_elems(tree, id, count);
                }
                LenPolicy::Eof => {
                    let mut count = 0usize;
                    while io.has_data()? {
                        let elem = elem_extending(tree, id, count)?;
                        read_node(tree, elem, io, origin, &count.to_string(), observer)?;
                        count += 1;
                    }
                    truncate_elems(tree, id, count);
                }
            }
            observer.leave(name);
        }
        ProtoKind::Choice(_) => {
            let child = materialize_choice(tree, id)?;
            read_node(tree, child, io, origin, name, observer)?;
        }
        ProtoKind::Skip => {
            let len = {
                let cx = Ctx::new(tree, id);
                cx.require("length")?.as_u64()?
            };
            io.skip(len)?;
        }
        ProtoKind::Rest => {
            let mut data = Vec::new();
            while io.has_data()? {
                let mut byte = [0u8; 1];
                io.read_into(&mut byte)?;
                data.push(byte[0]);
            }
            observer.value(name, &Value::Bytes(data.clone()));
            set_rest(tree, id, data);
        }
    }

    done_read(tree, id)
}

fn done_read(tree: &mut Tree, id: NodeId) -> Result<(), Error> {
    if !matches!(tree.kind(id), ProtoKind::Prim(_)) {
        return Ok(());
    }
    if let Some(pv) = tree.params(id).get("check_value").cloned() {
        let expected = eval::resolve_in(tree, id, &pv)?;
        let actual = stored_value(tree, id)
            .ok_or_else(|| Error::validity("no value was decoded"))?;
        if !actual.matches(&expected) {
            return Err(Error::validity(format!(
                "expected {}, found {}",
                expected, actual
            )));
        }
    }
    Ok(())
}

// --------------------------------------------------------------- write

pub(crate) fn write_node(tree: &mut Tree, id: NodeId, io: &mut dyn Sink) -> Result<(), Error> {
    if !passes_onlyif(tree, id)? {
        return Ok(());
    }

    match tree.kind(id).clone() {
        ProtoKind::Prim(codec) => {
            let value = current_value(tree, id)?;
            let cx = Ctx::new(tree, id);
            codec.encode(&value, io, &cx)?;
        }
        ProtoKind::Struct(_) => {
            for child in struct_children(tree, id) {
                write_node(tree, child, io)?;
            }
        }
        ProtoKind::Array(layout) => {
            if elems(tree, id).is_empty() {
                if let LenPolicy::Fixed(pv) = &layout.policy {
                    let n = eval::resolve_in(tree, id, pv)?.as_u64()? as usize;
                    set_elem_count(tree, id, n);
                }
            }
            for elem in elems(tree, id) {
                write_node(tree, elem, io)?;
            }
        }
        ProtoKind::Choice(_) => {
            let child = materialize_choice(tree, id)?;
            write_node(tree, child, io)?;
        }
        ProtoKind::Skip => {
            let len = {
                let cx = Ctx::new(tree, id);
                cx.require("length")?.as_u64()?
            };
            io.write_bytes(&vec![0u8; len as usize])?;
        }
        ProtoKind::Rest => {
            let value = current_value(tree, id)?;
            io.write_bytes(value.as_bytes()?)?;
        }
    }
    Ok(())
}

// ------------------------------------------------------------- values

pub(crate) fn stored_value(tree: &Tree, id: NodeId) -> Option<Value> {
    match &tree.node(id).slot {
        Slot::Prim(v) => v.clone(),
        Slot::Rest(v) => v.clone().map(Value::Bytes),
        _ => None,
    }
}

fn set_prim(tree: &mut Tree, id: NodeId, value: Value) {
    tree.node_mut(id).slot = Slot::Prim(Some(value));
}

fn set_rest(tree: &mut Tree, id: NodeId, data: Vec<u8>) {
    tree.node_mut(id).slot = Slot::Rest(Some(data));
}

/// The scalar a primitive currently reports: a computed `value` wins,
/// then the stored value, then `initial_value`, then the codec default
pub(crate) fn current_value(tree: &Tree, id: NodeId) -> Result<Value, Error> {
    match tree.kind(id) {
        ProtoKind::Prim(codec) => {
            if let Some(pv) = tree.params(id).get("value") {
                // mid-read, dependent siblings must see the wire value;
                // the computed binding takes over once the read is done
                if tree.reading {
                    if let Some(v) = stored_value(tree, id) {
                        return Ok(v);
                    }
                }
                return eval::resolve_in(tree, id, pv);
            }
            if let Some(v) = stored_value(tree, id) {
                return Ok(v);
            }
            if let Some(pv) = tree.params(id).get("initial_value") {
                return eval::resolve_in(tree, id, pv);
            }
            Ok(codec.default_value())
        }
        ProtoKind::Rest => {
            if let Some(v) = stored_value(tree, id) {
                return Ok(v);
            }
            if let Some(pv) = tree.params(id).get("initial_value") {
                return eval::resolve_in(tree, id, pv);
            }
            Ok(Value::Bytes(Vec::new()))
        }
        ProtoKind::Skip => Ok(Value::Bytes(Vec::new())),
        _ => Err(Error::message("field is not a primitive")),
    }
}

// ----------------------------------------------------------- snapshot

/// A node's own snapshot, ignoring its `onlyif`
pub(crate) fn own_snapshot(tree: &Tree, id: NodeId) -> Result<Snapshot, Error> {
    match tree.kind(id) {
        ProtoKind::Prim(_) | ProtoKind::Skip | ProtoKind::Rest => {
            Ok(Snapshot::Value(current_value(tree, id)?))
        }
        ProtoKind::Struct(layout) => {
            let layout = layout.clone();
            let children = struct_children(tree, id);
            let mut fields = Vec::new();
            for (def, child) in layout.fields.iter().zip(children) {
                if def.hidden {
                    continue;
                }
                if let Some(snapshot) = snapshot_entry(tree, child)? {
                    fields.push((def.name.clone(), snapshot));
                }
            }
            Ok(Snapshot::Record(fields))
        }
        ProtoKind::Array(_) => {
            let mut out = Vec::new();
            for elem in elems(tree, id) {
                if let Some(snapshot) = snapshot_entry(tree, elem)? {
                    out.push(snapshot);
                }
            }
            Ok(Snapshot::List(out))
        }
        ProtoKind::Choice(_) => {
            let (arm, proto) = resolved_arm(tree, id)?;
            match current_arm_child(tree, id, arm) {
                Some(child) => own_snapshot(tree, child),
                None => proto_default_snapshot(tree, id, &proto),
            }
        }
    }
}

/// The materialized child, but only when it still matches the resolved
/// selection
fn current_arm_child(tree: &Tree, id: NodeId, arm: usize) -> Option<NodeId> {
    match &tree.node(id).slot {
        Slot::Choice(Some((current, child))) if *current == arm => Some(*child),
        _ => None,
    }
}

/// A node's snapshot as seen by its container: absent when `onlyif`
/// evaluates to false
fn snapshot_entry(tree: &Tree, id: NodeId) -> Result<Option<Snapshot>, Error> {
    if !passes_onlyif(tree, id)? {
        return Ok(None);
    }
    own_snapshot(tree, id).map(Some)
}

fn proto_default_snapshot(
    tree: &Tree,
    owner: NodeId,
    proto: &Prototype,
) -> Result<Snapshot, Error> {
    match &proto.kind {
        ProtoKind::Prim(codec) => {
            let value = match proto
                .params
                .get("value")
                .or_else(|| proto.params.get("initial_value"))
            {
                Some(pv) => resolve_virtual(tree, owner, pv)?,
                None => codec.default_value(),
            };
            Ok(Snapshot::Value(value))
        }
        ProtoKind::Struct(layout) => {
            let mut fields = Vec::new();
            for def in &layout.fields {
                if def.hidden {
                    continue;
                }
                fields.push((
                    def.name.clone(),
                    proto_default_snapshot(tree, owner, &def.proto)?,
                ));
            }
            Ok(Snapshot::Record(fields))
        }
        ProtoKind::Array(layout) => {
            let mut out = Vec::new();
            if let LenPolicy::Fixed(pv) = &layout.policy {
                let n = resolve_virtual(tree, owner, pv)?.as_u64()?;
                for _ in 0..n {
                    out.push(proto_default_snapshot(tree, owner, &layout.elem)?);
                }
            }
            Ok(Snapshot::List(out))
        }
        ProtoKind::Choice(layout) => {
            let selection = resolve_virtual(tree, owner, &layout.selection)?;
            let arm = layout
                .arms
                .iter()
                .find(|(key, _)| key.matches(&selection))
                .ok_or_else(|| Error::unknown_choice(selection.to_string()))?;
            proto_default_snapshot(tree, owner, &arm.1)
        }
        ProtoKind::Skip | ProtoKind::Rest => Ok(Snapshot::Value(Value::Bytes(Vec::new()))),
    }
}

fn resolve_virtual(
    tree: &Tree,
    owner: NodeId,
    pv: &crate::params::ParamValue,
) -> Result<Value, Error> {
    use crate::params::ParamValue;
    match pv {
        ParamValue::Lit(v) => Ok(v.clone()),
        ParamValue::Sym(s) => eval::lookup_symbol(tree, owner, s),
        ParamValue::Expr(e) => e.call(&Env::new(tree, owner)),
        other => Err(Error::message(format!(
            "parameter does not evaluate to a value: {:?}",
            other
        ))),
    }
}

// --------------------------------------------------------------- size

/// Fold a node's encoded width onto a running bit count
///
/// Byte-level fields align the running count to the next byte boundary
/// first; bit fields pack.
pub(crate) fn fold_bits(tree: &Tree, id: NodeId, acc: u64) -> Result<u64, Error> {
    if !passes_onlyif(tree, id)? {
        return Ok(acc);
    }
    match tree.kind(id) {
        ProtoKind::Prim(codec) => {
            let value = current_value(tree, id)?;
            let cx = Ctx::new(tree, id);
            let bits = codec.bit_len(&value, &cx)?;
            if codec.is_bit_field() {
                Ok(acc + bits)
            } else {
                Ok(align8(acc) + bits)
            }
        }
        ProtoKind::Skip => {
            let cx = Ctx::new(tree, id);
            let len = cx.require("length")?.as_u64()?;
            Ok(align8(acc) + len * 8)
        }
        ProtoKind::Rest => {
            let value = current_value(tree, id)?;
            Ok(align8(acc) + value.as_bytes()?.len() as u64 * 8)
        }
        ProtoKind::Struct(_) => {
            let mut acc = acc;
            for child in struct_children(tree, id) {
                acc = fold_bits(tree, child, acc)?;
            }
            Ok(acc)
        }
        ProtoKind::Array(_) => {
            let mut acc = acc;
            for elem in elems(tree, id) {
                acc = fold_bits(tree, elem, acc)?;
            }
            Ok(acc)
        }
        ProtoKind::Choice(_) => {
            let (arm, proto) = resolved_arm(tree, id)?;
            match current_arm_child(tree, id, arm) {
                Some(child) => fold_bits(tree, child, acc),
                None => fold_bits_proto(tree, id, &proto, acc),
            }
        }
    }
}

fn fold_bits_proto(
    tree: &Tree,
    owner: NodeId,
    proto: &Prototype,
    acc: u64,
) -> Result<u64, Error> {
    match &proto.kind {
        ProtoKind::Prim(codec) => {
            let value = match proto
                .params
                .get("value")
                .or_else(|| proto.params.get("initial_value"))
            {
                Some(pv) => resolve_virtual(tree, owner, pv)?,
                None => codec.default_value(),
            };
            let cx = Ctx::new(tree, owner);
            let bits = codec.bit_len(&value, &cx)?;
            if codec.is_bit_field() {
                Ok(acc + bits)
            } else {
                Ok(align8(acc) + bits)
            }
        }
        ProtoKind::Struct(layout) => {
            let mut acc = acc;
            for def in &layout.fields {
                acc = fold_bits_proto(tree, owner, &def.proto, acc)?;
            }
            Ok(acc)
        }
        ProtoKind::Array(layout) => {
            let mut acc = acc;
            if let LenPolicy::Fixed(pv) = &layout.policy {
                let n = resolve_virtual(tree, owner, pv)?.as_u64()?;
                for _ in 0..n {
                    acc = fold_bits_proto(tree, owner, &layout.elem, acc)?;
                }
            }
            Ok(acc)
        }
        ProtoKind::Choice(layout) => {
            let selection = resolve_virtual(tree, owner, &layout.selection)?;
            let arm = layout
                .arms
                .iter()
                .find(|(key, _)| key.matches(&selection))
                .ok_or_else(|| Error::unknown_choice(selection.to_string()))?;
            fold_bits_proto(tree, owner, &arm.1, acc)
        }
        ProtoKind::Skip => {
            let len = match proto.params.get("length") {
                Some(pv) => resolve_virtual(tree, owner, pv)?.as_u64()?,
                None => 0,
            };
            Ok(align8(acc) + len * 8)
        }
        ProtoKind::Rest => Ok(align8(acc)),
    }
}

// ------------------------------------------------------------- offset

fn is_ancestor_or_self(tree: &Tree, node: NodeId, target: NodeId) -> bool {
    let mut cursor = Some(target);
    while let Some(c) = cursor {
        if c == node {
            return true;
        }
        cursor = tree.parent(c);
    }
    false
}

fn starts_byte_aligned(tree: &Tree, id: NodeId) -> bool {
    match tree.kind(id) {
        ProtoKind::Prim(codec) => !codec.is_bit_field(),
        ProtoKind::Skip | ProtoKind::Rest => true,
        _ => false,
    }
}

/// Find the bit offset where `target` begins inside `cur`
///
/// Hidden siblings that do not contain the target are excluded from the
/// sum, as are siblings whose `onlyif` is false.
fn find_bit_offset(
    tree: &Tree,
    cur: NodeId,
    target: NodeId,
    acc: u64,
) -> Result<Result<u64, u64>, Error> {
    if cur == target {
        let start = if starts_byte_aligned(tree, cur) {
            align8(acc)
        } else {
            acc
        };
        return Ok(Ok(start));
    }
    if !passes_onlyif(tree, cur)? {
        return Ok(Err(acc));
    }
    match tree.kind(cur) {
        ProtoKind::Struct(layout) => {
            let layout = layout.clone();
            let children = struct_children(tree, cur);
            let mut acc = acc;
            for (def, child) in layout.fields.iter().zip(children) {
                if def.hidden && !is_ancestor_or_self(tree, child, target) {
                    continue;
                }
                match find_bit_offset(tree, child, target, acc)? {
                    Ok(found) => return Ok(Ok(found)),
                    Err(after) => acc = after,
                }
            }
            Ok(Err(acc))
        }
        ProtoKind::Array(_) => {
            let mut acc = acc;
            for elem in elems(tree, cur) {
                match find_bit_offset(tree, elem, target, acc)? {
                    Ok(found) => return Ok(Ok(found)),
                    Err(after) => acc = after,
                }
            }
            Ok(Err(acc))
        }
        ProtoKind::Choice(_) => match active_choice_child(tree, cur) {
            Some(child) => find_bit_offset(tree, child, target, acc),
            None => Ok(Err(acc)),
        },
        _ => Ok(Err(fold_bits(tree, cur, acc)?)),
    }
}

pub(crate) fn byte_offset_from_root(tree: &Tree, id: NodeId) -> Result<u64, Error> {
    let mut root = id;
    while let Some(parent) = tree.parent(root) {
        root = parent;
    }
    match find_bit_offset(tree, root, id, 0)? {
        Ok(bits) => Ok(bits / 8),
        Err(_) => Err(Error::message("field is not reachable from its root")),
    }
}

pub(crate) fn byte_offset_from_parent(tree: &Tree, id: NodeId) -> Result<u64, Error> {
    match tree.parent(id) {
        None => byte_offset_from_root(tree, id),
        Some(parent) => match find_bit_offset(tree, parent, id, 0)? {
            Ok(bits) => Ok(bits / 8),
            Err(_) => Err(Error::message("field is not reachable from its parent")),
        },
    }
}

// -------------------------------------------------------- mutation

pub(crate) fn clear_node(tree: &mut Tree, id: NodeId) {
    match tree.kind(id).clone() {
        ProtoKind::Prim(_) => tree.node_mut(id).slot = Slot::Prim(None),
        ProtoKind::Rest => tree.node_mut(id).slot = Slot::Rest(None),
        ProtoKind::Skip => {}
        ProtoKind::Struct(_) => {
            for child in struct_children(tree, id) {
                clear_node(tree, child);
            }
        }
        ProtoKind::Array(layout) => match &layout.policy {
            LenPolicy::Fixed(pv) => {
                let n = eval::resolve_in(tree, id, pv)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize;
                set_elem_count(tree, id, n);
                for elem in elems(tree, id) {
                    clear_node(tree, elem);
                }
            }
            _ => truncate_elems(tree, id, 0),
        },
        ProtoKind::Choice(_) => {
            if let Some(child) = active_choice_child(tree, id) {
                clear_node(tree, child);
            }
        }
    }
}

pub(crate) fn is_clear(tree: &Tree, id: NodeId) -> bool {
    match &tree.node(id).slot {
        Slot::Prim(v) => v.is_none(),
        Slot::Rest(v) => v.is_none(),
        Slot::Skip => true,
        Slot::Struct(children) => children.iter().all(|&c| is_clear(tree, c)),
        Slot::Array(elems) => elems.iter().all(|&e| is_clear(tree, e)),
        Slot::Choice(active) => match active {
            Some((_, child)) => is_clear(tree, *child),
            None => true,
        },
    }
}

pub(crate) fn assign_node(tree: &mut Tree, id: NodeId, snapshot: &Snapshot) -> Result<(), Error> {
    match tree.kind(id).clone() {
        ProtoKind::Prim(_) => match snapshot {
            Snapshot::Value(v) => {
                set_prim(tree, id, v.clone());
                Ok(())
            }
            _ => Err(Error::assign("a primitive takes a scalar")),
        },
        ProtoKind::Rest => match snapshot {
            Snapshot::Value(Value::Bytes(data)) => {
                set_rest(tree, id, data.clone());
                Ok(())
            }
            _ => Err(Error::assign("rest takes a byte string")),
        },
        ProtoKind::Skip => match snapshot {
            Snapshot::Value(Value::Bytes(_)) => Ok(()),
            _ => Err(Error::assign("skip takes a byte string")),
        },
        ProtoKind::Struct(_) => {
            let entries = match snapshot {
                Snapshot::Record(entries) => entries,
                _ => return Err(Error::assign("a record takes name-value pairs")),
            };
            clear_node(tree, id);
            for (name, value) in entries {
                let child = tree.child_by_name(id, name).ok_or_else(|| {
                    Error::assign(format!("no such field: {}", name))
                })?;
                assign_node(tree, child, value)?;
            }
            Ok(())
        }
        ProtoKind::Array(_) => {
            let values = match snapshot {
                Snapshot::List(values) => values.clone(),
                _ => return Err(Error::assign("an array takes a list")),
            };
            set_elem_count(tree, id, values.len());
            for (i, value) in values.iter().enumerate() {
                let elem = elem_at(tree, id, i);
                clear_node(tree, elem);
                assign_node(tree, elem, value)?;
            }
            Ok(())
        }
        ProtoKind::Choice(_) => {
            let child = materialize_choice(tree, id)?;
            assign_node(tree, child, snapshot)
        }
    }
}

// ----------------------------------------------------------- children

fn struct_children(tree: &Tree, id: NodeId) -> Vec<NodeId> {
    match &tree.node(id).slot {
        Slot::Struct(children) => children.clone(),
        _ => Vec::new(),
    }
}

fn elems(tree: &Tree, id: NodeId) -> Vec<NodeId> {
    match &tree.node(id).slot {
        Slot::Array(elems) => elems.clone(),
        _ => Vec::new(),
    }
}

fn elem_at(tree: &Tree, id: NodeId, index: usize) -> NodeId {
    match &tree.node(id).slot {
        Slot::Array(elems) => elems[index],
        _ => unreachable!("node is not an array"),
    }
}

/// Element at `index`, instantiating clear elements up to it
pub(crate) fn elem_extending(tree: &mut Tree, id: NodeId, index: usize) -> Result<NodeId, Error> {
    let layout = match tree.kind(id) {
        ProtoKind::Array(layout) => layout.clone(),
        _ => return Err(Error::message("field is not an array")),
    };
    loop {
        let len = match &tree.node(id).slot {
            Slot::Array(elems) => elems.len(),
            _ => unreachable!(),
        };
        if index < len {
            break;
        }
        let elem = tree.instantiate(&layout.elem, Some(id));
        if let Slot::Array(elems) = &mut tree.node_mut(id).slot {
            elems.push(elem);
        }
    }
    Ok(elem_at(tree, id, index))
}

fn set_elem_count(tree: &mut Tree, id: NodeId, n: usize) {
    let layout = array_layout(tree, id);
    loop {
        let len = match &tree.node(id).slot {
            Slot::Array(elems) => elems.len(),
            _ => return,
        };
        if len >= n {
            break;
        }
        let elem = tree.instantiate(&layout.elem, Some(id));
        if let Slot::Array(elems) = &mut tree.node_mut(id).slot {
            elems.push(elem);
        }
    }
    truncate_elems(tree, id, n);
}

fn truncate_elems(tree: &mut Tree, id: NodeId, n: usize) {
    if let Slot::Array(elems) = &mut tree.node_mut(id).slot {
        elems.truncate(n);
    }
}

pub(crate) fn named_child(tree: &Tree, id: NodeId, name: &str) -> Result<NodeId, Error> {
    match tree.kind(id) {
        ProtoKind::Struct(_) => tree
            .child_by_name(id, name)
            .ok_or_else(|| Error::message(format!("no such field: {}", name))),
        ProtoKind::Choice(_) => match active_choice_child(tree, id) {
            Some(child) => named_child(tree, child, name),
            None => Err(Error::message("choice selection is unresolved")),
        },
        _ => Err(Error::message("field has no named children")),
    }
}

pub(crate) fn indexed_child(tree: &Tree, id: NodeId, index: usize) -> Result<NodeId, Error> {
    match tree.kind(id) {
        ProtoKind::Array(_) => match &tree.node(id).slot {
            Slot::Array(elems) => elems.get(index).copied().ok_or_else(|| {
                Error::message(format!("index {} is out of bounds", index))
            }),
            _ => unreachable!(),
        },
        ProtoKind::Choice(_) => match active_choice_child(tree, id) {
            Some(child) => indexed_child(tree, child, index),
            None => Err(Error::message("choice selection is unresolved")),
        },
        _ => Err(Error::message("field has no indexed children")),
    }
}

pub(crate) fn length_of(tree: &Tree, id: NodeId) -> Result<usize, Error> {
    match tree.kind(id) {
        ProtoKind::Array(_) => Ok(elems(tree, id).len()),
        ProtoKind::Struct(_) => Ok(field_names(tree, id).len()),
        ProtoKind::Prim(_) | ProtoKind::Rest => {
            Ok(current_value(tree, id)?.as_bytes()?.len())
        }
        ProtoKind::Choice(_) => match active_choice_child(tree, id) {
            Some(child) => length_of(tree, child),
            None => Err(Error::message("choice selection is unresolved")),
        },
        ProtoKind::Skip => Ok(0),
    }
}

pub(crate) fn field_names<'a>(tree: &'a Tree, id: NodeId) -> Vec<&'a str> {
    match tree.kind(id) {
        ProtoKind::Struct(layout) => layout
            .fields
            .iter()
            .filter(|def| !def.hidden)
            .map(|def| def.name.as_str())
            .collect(),
        ProtoKind::Choice(_) => match active_choice_child(tree, id) {
            Some(child) => field_names(tree, child),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// -------------------------------------------------------------- choice

fn resolved_arm(tree: &Tree, id: NodeId) -> Result<(usize, Prototype), Error> {
    let layout = choice_layout(tree, id);
    let selection = eval::resolve_in(tree, id, &layout.selection)?;
    let arm = layout
        .arms
        .iter()
        .position(|(key, _)| key.matches(&selection))
        .ok_or_else(|| Error::unknown_choice(selection.to_string()))?;
    Ok((arm, layout.arms[arm].1.clone()))
}

/// Resolve the selection and swap in the matching variant's instance
///
/// With `copy_on_change`, set fields shared by shape migrate from the
/// outgoing variant into the new one.
pub(crate) fn materialize_choice(tree: &mut Tree, id: NodeId) -> Result<NodeId, Error> {
    let (arm, proto) = resolved_arm(tree, id)?;
    let old = match &tree.node(id).slot {
        Slot::Choice(Some((current, child))) => {
            if *current == arm {
                return Ok(*child);
            }
            Some(*child)
        }
        _ => None,
    };
    let copy = choice_layout(tree, id).copy_on_change;
    let new = tree.instantiate(&proto, Some(id));
    if copy {
        if let Some(old) = old {
            migrate(tree, old, new);
        }
    }
    tree.node_mut(id).slot = Slot::Choice(Some((arm, new)));
    Ok(new)
}

fn migrate(tree: &mut Tree, old: NodeId, new: NodeId) {
    match (tree.kind(old).clone(), tree.kind(new).clone()) {
        (ProtoKind::Prim(_), ProtoKind::Prim(_)) => {
            if let Some(v) = stored_value(tree, old) {
                set_prim(tree, new, v);
            }
        }
        (ProtoKind::Struct(old_layout), ProtoKind::Struct(_)) => {
            for def in &old_layout.fields {
                let Some(from) = tree.child_by_name(old, &def.name) else {
                    continue;
                };
                if is_clear(tree, from) {
                    continue;
                }
                let Some(to) = tree.child_by_name(new, &def.name) else {
                    continue;
                };
                if let Ok(snapshot) = own_snapshot(tree, from) {
                    let _ = assign_node(tree, to, &snapshot);
                }
            }
        }
        _ => {}
    }
}
