//! Typed views over tree roots.
//!
//! A [`View`] pairs a [`Schema`] with the root [`Node`] realizing it. Views
//! are values: every update returns a new view and leaves the old one
//! intact, sharing all untouched subtrees with it.

use std::fmt;

use crate::error::ViewError;
use crate::gindex;
use crate::merkle::{length_chunk, pack_bits, pack_bytes, packed_bytes};
use crate::schema::{BasicType, Key, Schema, SchemaKind, Slot};
use crate::tree::{Node, Root, ZERO_CHUNK, zero_node};
use crate::value::{Value, basic_from_le_bytes, basic_to_le_bytes};
use crate::{BYTES_PER_CHUNK, codec};

/// A value of some schema, backed by a persistent tree.
#[derive(Clone)]
pub struct View {
    schema: Schema,
    node: Node,
}

impl View {
    /// Wraps a node that is known to realize `schema`.
    pub(crate) fn from_parts(schema: Schema, node: Node) -> Self {
        Self { schema, node }
    }

    fn with_node(&self, node: Node) -> Self {
        Self {
            schema: self.schema.clone(),
            node,
        }
    }

    /// The default (all-zero) value of `schema`.
    #[must_use]
    pub fn default_of(schema: &Schema) -> Self {
        Self::from_parts(schema.clone(), default_node(schema))
    }

    /// Builds a view from a plain value, checking it against `schema`.
    pub fn from_value(schema: &Schema, value: &Value) -> Result<Self, ViewError> {
        Ok(Self::from_parts(schema.clone(), node_from_value(schema, value)?))
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The 32-byte Merkle commitment of this value.
    #[must_use]
    pub fn hash_tree_root(&self) -> Root {
        self.node.root()
    }

    /// Canonical SSZ serialization.
    pub fn encode(&self) -> Result<Vec<u8>, ViewError> {
        codec::encode(self)
    }

    /// Reads the whole value out of the tree.
    pub fn to_value(&self) -> Result<Value, ViewError> {
        value_from_node(&self.schema, &self.node)
    }

    /// Number of elements, bits, or fields.
    pub fn len(&self) -> Result<u64, ViewError> {
        match self.schema.kind() {
            SchemaKind::Vector { length, .. } | SchemaKind::Bitvector { length } => Ok(*length),
            SchemaKind::List { .. } | SchemaKind::Bitlist { .. } => {
                list_parts(&self.node).map(|(_, len)| len)
            }
            SchemaKind::Container { fields } => Ok(fields.len() as u64),
            kind => Err(ViewError::NotComposite { kind: kind.name() }),
        }
    }

    pub fn is_empty(&self) -> Result<bool, ViewError> {
        self.len().map(|len| len == 0)
    }

    /// Element bound for live lists; `None` means the declared capacity.
    fn bound(&self) -> Result<Option<u64>, ViewError> {
        if self.schema.has_length_mixin() {
            list_parts(&self.node).map(|(_, len)| Some(len))
        } else {
            Ok(None)
        }
    }

    /// The child at `key`: a field, an element, a bit, or the selected
    /// union variant.
    pub fn get(&self, key: Key<'_>) -> Result<View, ViewError> {
        if let SchemaKind::Union { .. } = self.schema.kind() {
            return self.union_variant_at(key);
        }
        match self.schema.slot(key, self.bound()?)? {
            Slot::Subtree { gindex, schema } => Ok(View {
                schema,
                node: self.node.navigate(gindex)?,
            }),
            Slot::Packed {
                gindex,
                offset,
                basic,
            } => {
                let chunk = self.chunk_at(gindex)?;
                Ok(View {
                    schema: Schema::basic(basic),
                    node: Node::leaf_from_bytes(&chunk[offset..offset + basic.byte_len()]),
                })
            }
            Slot::Bit { gindex, bit } => {
                let chunk = self.chunk_at(gindex)?;
                let set = (chunk[bit / 8] >> (bit % 8)) & 1;
                Ok(View {
                    schema: Schema::boolean(),
                    node: Node::leaf_from_bytes(&[set]),
                })
            }
        }
    }

    /// Shorthand for `get(Key::Index(index))`.
    pub fn at(&self, index: u64) -> Result<View, ViewError> {
        self.get(Key::Index(index))
    }

    /// Shorthand for `get(Key::Name(name))`.
    pub fn field(&self, name: &str) -> Result<View, ViewError> {
        self.get(Key::Name(name))
    }

    /// Reads a scalar view as an integer of at most 128 bits.
    pub fn as_uint(&self) -> Result<u128, ViewError> {
        match self.to_value()? {
            Value::Uint(v) => Ok(v),
            Value::Uint256(le) if le[16..].iter().all(|b| *b == 0) => {
                let mut low = [0u8; 16];
                low.copy_from_slice(&le[..16]);
                Ok(u128::from_le_bytes(low))
            }
            _ => Err(ViewError::TypeMismatch {
                expected: "uint of at most 128 bits",
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ViewError> {
        match self.to_value()? {
            Value::Bool(b) => Ok(b),
            _ => Err(ViewError::TypeMismatch {
                expected: "boolean",
            }),
        }
    }

    pub fn get_uint(&self, key: Key<'_>) -> Result<u128, ViewError> {
        self.get(key)?.as_uint()
    }

    pub fn get_bool(&self, key: Key<'_>) -> Result<bool, ViewError> {
        self.get(key)?.as_bool()
    }

    /// A single bit of a bitvector or bitlist.
    pub fn get_bit(&self, index: u64) -> Result<bool, ViewError> {
        self.get_bool(Key::Index(index))
    }

    /// The selector of a union.
    pub fn selector(&self) -> Result<u32, ViewError> {
        let (_, selector) = union_parts(&self.schema, &self.node)?;
        Ok(selector)
    }

    /// The selected variant of a union, `None` for the empty variant.
    pub fn variant(&self) -> Result<Option<View>, ViewError> {
        let SchemaKind::Union { variants } = self.schema.kind() else {
            return Err(ViewError::TypeMismatch { expected: "union" });
        };
        let (variant, selector) = union_parts(&self.schema, &self.node)?;
        Ok(variants[selector as usize].as_ref().map(|schema| View {
            schema: schema.clone(),
            node: variant.clone(),
        }))
    }

    fn union_variant_at(&self, key: Key<'_>) -> Result<View, ViewError> {
        let Key::Index(requested) = key else {
            return Err(ViewError::NotComposite { kind: "union" });
        };
        let selector = self.selector()?;
        if requested != u64::from(selector) {
            return Err(ViewError::TypeMismatch {
                expected: "the currently selected union variant",
            });
        }
        self.variant()?.ok_or(ViewError::TypeMismatch {
            expected: "a union variant with a value",
        })
    }

    /// Returns a view with the child at `key` replaced by `value`.
    ///
    /// On a union, `key` is the selector of the new variant.
    pub fn set(&self, key: Key<'_>, value: &Value) -> Result<View, ViewError> {
        if let SchemaKind::Union { .. } = self.schema.kind() {
            let Key::Index(selector) = key else {
                return Err(ViewError::NotComposite { kind: "union" });
            };
            let selector = u32::try_from(selector).unwrap_or(u32::MAX);
            return self.set_variant(selector, Some(value));
        }
        let slot = self.schema.slot(key, self.bound()?)?;
        let node = self.write_slot(slot, value)?;
        Ok(self.with_node(node))
    }

    /// Like [`View::set`], with a prebuilt child whose schema must match.
    ///
    /// On a union, the child becomes the new variant and its tree is reused.
    pub fn set_view(&self, key: Key<'_>, child: &View) -> Result<View, ViewError> {
        if let SchemaKind::Union { .. } = self.schema.kind() {
            let Key::Index(selector) = key else {
                return Err(ViewError::NotComposite { kind: "union" });
            };
            let selector = u32::try_from(selector).unwrap_or(u32::MAX);
            return self.set_variant_view(selector, Some(child));
        }
        let slot = self.schema.slot(key, self.bound()?)?;
        let node = self.write_slot_view(slot, child)?;
        Ok(self.with_node(node))
    }

    /// Switches a union to `selector`. `None` selects the empty variant,
    /// which only selector 0 may be.
    pub fn set_variant(&self, selector: u32, value: Option<&Value>) -> Result<View, ViewError> {
        let SchemaKind::Union { .. } = self.schema.kind() else {
            return Err(ViewError::TypeMismatch { expected: "union" });
        };
        let union = Value::Union {
            selector,
            value: value.cloned().map(Box::new),
        };
        View::from_value(&self.schema, &union)
    }

    /// Like [`View::set_variant`], with a prebuilt variant view.
    pub fn set_variant_view(
        &self,
        selector: u32,
        child: Option<&View>,
    ) -> Result<View, ViewError> {
        let SchemaKind::Union { variants } = self.schema.kind() else {
            return Err(ViewError::TypeMismatch { expected: "union" });
        };
        let variant = variants
            .get(selector as usize)
            .ok_or(ViewError::UnionSelectorOutOfRange {
                selector,
                variants: variants.len(),
            })?;
        let node = match (variant, child) {
            (None, None) => zero_node(0),
            (Some(schema), Some(child)) if *schema == child.schema => child.node.clone(),
            (Some(_), Some(_)) => return Err(ViewError::SchemaMismatch),
            _ => {
                return Err(ViewError::TypeMismatch {
                    expected: "union value matching the selected variant",
                });
            }
        };
        Ok(self.with_node(with_selector(node, selector)))
    }

    /// Sets a single bit of a bitvector or bitlist.
    pub fn set_bit(&self, index: u64, bit: bool) -> Result<View, ViewError> {
        self.set(Key::Index(index), &Value::Bool(bit))
    }

    /// Appends one element to a list, or one bit to a bitlist.
    pub fn append(&self, value: &Value) -> Result<View, ViewError> {
        let max = match self.schema.kind() {
            SchemaKind::List { max_length, .. } | SchemaKind::Bitlist { max_length } => {
                *max_length
            }
            _ => {
                return Err(ViewError::TypeMismatch {
                    expected: "list or bitlist",
                });
            }
        };
        let (_, len) = list_parts(&self.node)?;
        if len >= max {
            return Err(ViewError::LengthExceedsMax { len: len + 1, max });
        }
        let slot = self.schema.slot(Key::Index(len), Some(len + 1))?;
        let written = self.write_slot(slot, value)?;
        let (content, _) = written
            .children()
            .ok_or(ViewError::GindexOutOfBounds { gindex: 2 })?;
        Ok(self.with_node(Node::branch(
            content.clone(),
            Node::leaf(length_chunk(len + 1)),
        )))
    }

    pub fn append_bit(&self, bit: bool) -> Result<View, ViewError> {
        self.append(&Value::Bool(bit))
    }

    /// Appends every value in order.
    pub fn extend<'a, I>(&self, values: I) -> Result<View, ViewError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        values
            .into_iter()
            .try_fold(self.clone(), |view, value| view.append(value))
    }

    /// Starts a batch of field updates on a container.
    pub fn builder(&self) -> Result<ContainerBuilder<'_>, ViewError> {
        match self.schema.kind() {
            SchemaKind::Container { .. } => Ok(ContainerBuilder {
                base: self,
                updates: Vec::new(),
            }),
            _ => Err(ViewError::TypeMismatch {
                expected: "container",
            }),
        }
    }

    fn chunk_at(&self, gindex: gindex::GeneralizedIndex) -> Result<Root, ViewError> {
        self.node
            .navigate(gindex)?
            .chunk()
            .copied()
            .ok_or(ViewError::GindexOutOfBounds { gindex })
    }

    fn write_slot(&self, slot: Slot, value: &Value) -> Result<Node, ViewError> {
        let (gindex, node) = match slot {
            Slot::Subtree { gindex, schema } => (gindex, node_from_value(&schema, value)?),
            Slot::Packed {
                gindex,
                offset,
                basic,
            } => {
                let bytes = basic_to_le_bytes(basic, value)?;
                (gindex, self.patch_chunk(gindex, offset, &bytes)?)
            }
            Slot::Bit { gindex, bit } => {
                let set = value.as_bool().ok_or(ViewError::TypeMismatch {
                    expected: "boolean",
                })?;
                (gindex, self.patch_bit(gindex, bit, set)?)
            }
        };
        self.node.update(gindex, node)
    }

    fn write_slot_view(&self, slot: Slot, child: &View) -> Result<Node, ViewError> {
        let (gindex, node) = match slot {
            Slot::Subtree { gindex, schema } => {
                if schema != child.schema {
                    return Err(ViewError::SchemaMismatch);
                }
                (gindex, child.node.clone())
            }
            Slot::Packed {
                gindex,
                offset,
                basic,
            } => {
                if child.schema.basic_type() != Some(basic) {
                    return Err(ViewError::SchemaMismatch);
                }
                let chunk = child.chunk_at(gindex::ROOT)?;
                (
                    gindex,
                    self.patch_chunk(gindex, offset, &chunk[..basic.byte_len()])?,
                )
            }
            Slot::Bit { gindex, bit } => {
                if child.schema.basic_type() != Some(BasicType::Boolean) {
                    return Err(ViewError::SchemaMismatch);
                }
                (gindex, self.patch_bit(gindex, bit, child.as_bool()?)?)
            }
        };
        self.node.update(gindex, node)
    }

    fn patch_chunk(
        &self,
        gindex: gindex::GeneralizedIndex,
        offset: usize,
        bytes: &[u8],
    ) -> Result<Node, ViewError> {
        let mut chunk = self.chunk_at(gindex)?;
        chunk[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(Node::leaf(chunk))
    }

    fn patch_bit(
        &self,
        gindex: gindex::GeneralizedIndex,
        bit: usize,
        set: bool,
    ) -> Result<Node, ViewError> {
        let mut chunk = self.chunk_at(gindex)?;
        let mask = 1u8 << (bit % 8);
        if set {
            chunk[bit / 8] |= mask;
        } else {
            chunk[bit / 8] &= !mask;
        }
        Ok(Node::leaf(chunk))
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.node == other.node
    }
}

impl Eq for View {}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("kind", &self.schema.kind().name())
            .field("root", &format_args!("0x{}", hex::encode(self.hash_tree_root())))
            .finish()
    }
}

/// Accumulates field updates on a container and commits them as one tree
/// construction.
///
/// The result equals applying the same [`View::set`] calls in order.
pub struct ContainerBuilder<'a> {
    base: &'a View,
    updates: Vec<(u64, Node)>,
}

impl ContainerBuilder<'_> {
    pub fn set(mut self, key: Key<'_>, value: &Value) -> Result<Self, ViewError> {
        let (index, schema) = self.field_slot(key)?;
        self.updates.push((index, node_from_value(&schema, value)?));
        Ok(self)
    }

    pub fn set_view(mut self, key: Key<'_>, child: &View) -> Result<Self, ViewError> {
        let (index, schema) = self.field_slot(key)?;
        if schema != child.schema {
            return Err(ViewError::SchemaMismatch);
        }
        self.updates.push((index, child.node.clone()));
        Ok(self)
    }

    fn field_slot(&self, key: Key<'_>) -> Result<(u64, Schema), ViewError> {
        match self.base.schema.slot(key, None)? {
            Slot::Subtree { gindex, schema } => Ok((gindex::index_at_depth(gindex), schema)),
            Slot::Packed { .. } | Slot::Bit { .. } => Err(ViewError::TypeMismatch {
                expected: "container",
            }),
        }
    }

    pub fn commit(self) -> Result<View, ViewError> {
        let node = self
            .base
            .node
            .update_many(self.base.schema.depth(), self.updates)?;
        Ok(self.base.with_node(node))
    }
}

/// Splits a list root into its content tree and length.
pub(crate) fn list_parts(node: &Node) -> Result<(&Node, u64), ViewError> {
    let (content, length) = node
        .children()
        .ok_or(ViewError::GindexOutOfBounds { gindex: 2 })?;
    let chunk = length
        .chunk()
        .ok_or(ViewError::GindexOutOfBounds { gindex: 3 })?;
    let mut le = [0u8; 8];
    le.copy_from_slice(&chunk[..8]);
    Ok((content, u64::from_le_bytes(le)))
}

/// Splits a union root into its variant node and selector.
pub(crate) fn union_parts<'n>(
    schema: &Schema,
    node: &'n Node,
) -> Result<(&'n Node, u32), ViewError> {
    let SchemaKind::Union { variants } = schema.kind() else {
        return Err(ViewError::TypeMismatch { expected: "union" });
    };
    let (variant, selector) = node
        .children()
        .ok_or(ViewError::GindexOutOfBounds { gindex: 2 })?;
    let chunk = selector
        .chunk()
        .ok_or(ViewError::GindexOutOfBounds { gindex: 3 })?;
    let mut le = [0u8; 4];
    le.copy_from_slice(&chunk[..4]);
    let selector = u32::from_le_bytes(le);
    if selector as usize >= variants.len() {
        return Err(ViewError::UnionSelectorOutOfRange {
            selector,
            variants: variants.len(),
        });
    }
    Ok((variant, selector))
}

/// The first `byte_len` content bytes of a packed tree of `depth`.
pub(crate) fn packed_content(
    node: &Node,
    depth: u32,
    byte_len: usize,
) -> Result<Vec<u8>, ViewError> {
    let chunks = node.chunks_at_depth(depth, byte_len.div_ceil(BYTES_PER_CHUNK) as u64)?;
    let mut bytes = chunks.concat();
    bytes.truncate(byte_len);
    Ok(bytes)
}

fn leaves_node(bytes: &[u8], depth: u32) -> Result<Node, ViewError> {
    let leaves = pack_bytes(bytes).into_iter().map(Node::leaf).collect();
    Node::fill(leaves, depth)
}

pub(crate) fn with_length(content: Node, len: u64) -> Node {
    Node::branch(content, Node::leaf(length_chunk(len)))
}

pub(crate) fn with_selector(variant: Node, selector: u32) -> Node {
    let mut chunk = ZERO_CHUNK;
    chunk[..4].copy_from_slice(&selector.to_le_bytes());
    Node::branch(variant, Node::leaf(chunk))
}

/// The tree of the default value of `schema`, cached on the schema.
///
/// Schema construction bounds every child count by `1 << depth`, so the
/// zero-subtree fallbacks below are never taken.
pub(crate) fn default_node(schema: &Schema) -> Node {
    schema
        .default_node_cell()
        .get_or_init(|| {
            let depth = schema.depth();
            match schema.kind() {
                SchemaKind::Basic(_) | SchemaKind::Bitvector { .. } => zero_node(depth),
                SchemaKind::List { .. } | SchemaKind::Bitlist { .. } => {
                    with_length(zero_node(depth), 0)
                }
                SchemaKind::Vector { element, length } => match element.basic_type() {
                    Some(_) => zero_node(depth),
                    None => Node::repeat(&default_node(element), *length, depth)
                        .unwrap_or_else(|_| zero_node(depth)),
                },
                SchemaKind::Container { fields } => {
                    let children = fields.iter().map(|f| default_node(&f.schema)).collect();
                    Node::fill(children, depth).unwrap_or_else(|_| zero_node(depth))
                }
                SchemaKind::Union { variants } => {
                    let variant = variants[0]
                        .as_ref()
                        .map_or_else(|| zero_node(0), default_node);
                    with_selector(variant, 0)
                }
            }
        })
        .clone()
}

/// Builds the tree for `value` under `schema`.
pub(crate) fn node_from_value(schema: &Schema, value: &Value) -> Result<Node, ViewError> {
    let depth = schema.depth();
    match (schema.kind(), value) {
        (SchemaKind::Basic(basic), _) => {
            Ok(Node::leaf_from_bytes(&basic_to_le_bytes(*basic, value)?))
        }
        (SchemaKind::Vector { element, length }, Value::Sequence(items)) => {
            if items.len() as u64 != *length {
                return Err(ViewError::TypeMismatch {
                    expected: "vector of declared length",
                });
            }
            sequence_node(element, items, depth)
        }
        (SchemaKind::List { element, max_length }, Value::Sequence(items)) => {
            let len = items.len() as u64;
            if len > *max_length {
                return Err(ViewError::LengthExceedsMax {
                    len,
                    max: *max_length,
                });
            }
            Ok(with_length(sequence_node(element, items, depth)?, len))
        }
        (SchemaKind::Bitvector { length }, Value::Bits(bits)) => {
            if bits.len() as u64 != *length {
                return Err(ViewError::TypeMismatch {
                    expected: "bitvector of declared length",
                });
            }
            leaves_node(&pack_bits(bits), depth)
        }
        (SchemaKind::Bitlist { max_length }, Value::Bits(bits)) => {
            let len = bits.len() as u64;
            if len > *max_length {
                return Err(ViewError::LengthExceedsMax {
                    len,
                    max: *max_length,
                });
            }
            Ok(with_length(leaves_node(&pack_bits(bits), depth)?, len))
        }
        (SchemaKind::Container { fields }, Value::Container(values)) => {
            if values.len() != fields.len() {
                return Err(ViewError::TypeMismatch {
                    expected: "one value per container field",
                });
            }
            let children = fields
                .iter()
                .zip(values)
                .map(|(field, value)| node_from_value(&field.schema, value))
                .collect::<Result<Vec<_>, _>>()?;
            Node::fill(children, depth)
        }
        (SchemaKind::Union { variants }, Value::Union { selector, value }) => {
            let variant = variants.get(*selector as usize).ok_or(
                ViewError::UnionSelectorOutOfRange {
                    selector: *selector,
                    variants: variants.len(),
                },
            )?;
            let node = match (variant, value) {
                (None, None) => zero_node(0),
                (Some(schema), Some(value)) => node_from_value(schema, value)?,
                _ => {
                    return Err(ViewError::TypeMismatch {
                        expected: "union value matching the selected variant",
                    });
                }
            };
            Ok(with_selector(node, *selector))
        }
        (kind, _) => Err(ViewError::TypeMismatch {
            expected: kind.name(),
        }),
    }
}

fn sequence_node(element: &Schema, items: &[Value], depth: u32) -> Result<Node, ViewError> {
    match element.basic_type() {
        Some(basic) => leaves_node(&packed_bytes(basic, items)?, depth),
        None => {
            let children = items
                .iter()
                .map(|item| node_from_value(element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Node::fill(children, depth)
        }
    }
}

/// Reads `value` back out of a tree realizing `schema`.
pub(crate) fn value_from_node(schema: &Schema, node: &Node) -> Result<Value, ViewError> {
    let depth = schema.depth();
    match schema.kind() {
        SchemaKind::Basic(basic) => {
            let chunk = node
                .chunk()
                .ok_or(ViewError::GindexOutOfBounds { gindex: gindex::ROOT })?;
            Ok(basic_from_le_bytes(*basic, &chunk[..basic.byte_len()]))
        }
        SchemaKind::Vector { element, length } => {
            read_sequence(element, node, depth, *length).map(Value::Sequence)
        }
        SchemaKind::List { element, .. } => {
            let (content, len) = list_parts(node)?;
            read_sequence(element, content, depth, len).map(Value::Sequence)
        }
        SchemaKind::Bitvector { length } => read_bits(node, depth, *length).map(Value::Bits),
        SchemaKind::Bitlist { .. } => {
            let (content, len) = list_parts(node)?;
            read_bits(content, depth, len).map(Value::Bits)
        }
        SchemaKind::Container { fields } => {
            let children = node.nodes_at_depth(depth, fields.len() as u64)?;
            fields
                .iter()
                .zip(&children)
                .map(|(field, child)| value_from_node(&field.schema, child))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Container)
        }
        SchemaKind::Union { variants } => {
            let (variant, selector) = union_parts(schema, node)?;
            let value = match &variants[selector as usize] {
                Some(schema) => Some(Box::new(value_from_node(schema, variant)?)),
                None => None,
            };
            Ok(Value::Union { selector, value })
        }
    }
}

fn read_sequence(
    element: &Schema,
    node: &Node,
    depth: u32,
    len: u64,
) -> Result<Vec<Value>, ViewError> {
    match element.basic_type() {
        Some(basic) => {
            let size = basic.byte_len();
            let bytes = packed_content(node, depth, len as usize * size)?;
            Ok(bytes
                .chunks_exact(size)
                .map(|piece| basic_from_le_bytes(basic, piece))
                .collect())
        }
        None => node
            .nodes_at_depth(depth, len)?
            .iter()
            .map(|child| value_from_node(element, child))
            .collect(),
    }
}

fn read_bits(node: &Node, depth: u32, len: u64) -> Result<Vec<bool>, ViewError> {
    let bytes = packed_content(node, depth, (len as usize).div_ceil(8))?;
    Ok((0..len as usize)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect())
}
