//! Schema descriptors: immutable, shareable type definitions.
//!
//! A [`Schema`] is a cheap-to-clone handle. All derived layout facts
//! (fixed size, minimum size, chunk count, tree depth) are computed once
//! at construction time.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, ViewError};
use crate::gindex::{self, GeneralizedIndex};
use crate::tree::Node;
use crate::{BYTES_PER_CHUNK, BYTES_PER_LENGTH_OFFSET, MAX_CHUNK_DEPTH, MAX_UNION_VARIANTS};

/// Scalar types. Everything narrower than a chunk is packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicType {
    Boolean,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint128,
    Uint256,
}

impl BasicType {
    /// Unsigned integer type of the given bit width.
    pub fn uint(bits: u16) -> Result<Self, SchemaError> {
        match bits {
            8 => Ok(Self::Uint8),
            16 => Ok(Self::Uint16),
            32 => Ok(Self::Uint32),
            64 => Ok(Self::Uint64),
            128 => Ok(Self::Uint128),
            256 => Ok(Self::Uint256),
            _ => Err(SchemaError::UnsupportedBitWidth { bits }),
        }
    }

    /// Serialized size in bytes.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Boolean | Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
            Self::Uint64 => 8,
            Self::Uint128 => 16,
            Self::Uint256 => 32,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Uint128 => "uint128",
            Self::Uint256 => "uint256",
        }
    }

    /// Number of values sharing one 32-byte chunk.
    #[must_use]
    pub const fn per_chunk(self) -> u64 {
        (BYTES_PER_CHUNK / self.byte_len()) as u64
    }
}

/// A named container field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

/// The shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaKind {
    Basic(BasicType),
    Vector { element: Schema, length: u64 },
    List { element: Schema, max_length: u64 },
    Bitvector { length: u64 },
    Bitlist { max_length: u64 },
    Container { fields: Vec<Field> },
    /// `None` is the empty variant and may only appear at selector 0.
    Union { variants: Vec<Option<Schema>> },
}

impl SchemaKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Basic(basic) => basic.name(),
            Self::Vector { .. } => "vector",
            Self::List { .. } => "list",
            Self::Bitvector { .. } => "bitvector",
            Self::Bitlist { .. } => "bitlist",
            Self::Container { .. } => "container",
            Self::Union { .. } => "union",
        }
    }
}

/// Addresses a child of a composite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    /// Element index, field position, or union selector.
    Index(u64),
    /// Container field name.
    Name(&'a str),
}

impl From<u64> for Key<'_> {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

/// Where a child lives inside its parent's tree.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    /// The child owns the subtree at `gindex`.
    Subtree { gindex: GeneralizedIndex, schema: Schema },
    /// The child is a scalar packed into the chunk at `gindex`.
    Packed {
        gindex: GeneralizedIndex,
        offset: usize,
        basic: BasicType,
    },
    /// The child is a single bit of the chunk at `gindex`.
    Bit { gindex: GeneralizedIndex, bit: usize },
}

/// An immutable type descriptor, shared by reference.
///
/// Equality is structural: two independently constructed schemas with the
/// same shape compare equal.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaKind", into = "SchemaKind")]
pub struct Schema(Arc<SchemaInner>);

struct SchemaInner {
    kind: SchemaKind,
    fixed_size: Option<usize>,
    min_size: usize,
    chunk_count: u64,
    depth: u32,
    default_node: OnceLock<Node>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.kind == other.0.kind
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.kind.fmt(f)
    }
}

impl TryFrom<SchemaKind> for Schema {
    type Error = SchemaError;

    fn try_from(kind: SchemaKind) -> Result<Self, Self::Error> {
        Self::new(kind)
    }
}

impl From<Schema> for SchemaKind {
    fn from(schema: Schema) -> Self {
        schema.0.kind.clone()
    }
}

fn ceil_log2(n: u64) -> u32 {
    if n <= 1 { 0 } else { 64 - (n - 1).leading_zeros() }
}

fn size_overflow() -> SchemaError {
    SchemaError::SizeOverflow
}

/// Size a field occupies in the fixed part of its parent.
fn fixed_part_len(schema: &Schema) -> usize {
    schema.fixed_size().unwrap_or(BYTES_PER_LENGTH_OFFSET)
}

impl Schema {
    /// Validates `kind` and derives its layout.
    pub fn new(kind: SchemaKind) -> Result<Self, SchemaError> {
        let chunk_count = match &kind {
            SchemaKind::Basic(_) => 1,
            SchemaKind::Vector { element, length } => {
                if *length == 0 {
                    return Err(SchemaError::ZeroLength { kind: "vector" });
                }
                element_chunks(element, *length)?
            }
            SchemaKind::List {
                element,
                max_length,
            } => {
                if *max_length == 0 {
                    return Err(SchemaError::ZeroLength { kind: "list" });
                }
                element_chunks(element, *max_length)?
            }
            SchemaKind::Bitvector { length } => {
                if *length == 0 {
                    return Err(SchemaError::ZeroLength { kind: "bitvector" });
                }
                length.div_ceil(256)
            }
            SchemaKind::Bitlist { max_length } => {
                if *max_length == 0 {
                    return Err(SchemaError::ZeroLength { kind: "bitlist" });
                }
                max_length.div_ceil(256)
            }
            SchemaKind::Container { fields } => {
                if fields.is_empty() {
                    return Err(SchemaError::EmptyContainer);
                }
                for (i, field) in fields.iter().enumerate() {
                    if fields[..i].iter().any(|f| f.name == field.name) {
                        return Err(SchemaError::DuplicateField {
                            name: field.name.clone(),
                        });
                    }
                }
                fields.len() as u64
            }
            SchemaKind::Union { variants } => {
                if variants.is_empty() {
                    return Err(SchemaError::EmptyUnion);
                }
                if variants.len() > MAX_UNION_VARIANTS {
                    return Err(SchemaError::TooManyVariants {
                        count: variants.len(),
                        max: MAX_UNION_VARIANTS,
                    });
                }
                if let Some(selector) = variants.iter().skip(1).position(Option::is_none) {
                    return Err(SchemaError::MisplacedNoneVariant {
                        selector: selector + 1,
                    });
                }
                if variants.len() == 1 && variants[0].is_none() {
                    return Err(SchemaError::NoneOnlyUnion);
                }
                1
            }
        };

        let depth = ceil_log2(chunk_count);
        if depth > MAX_CHUNK_DEPTH {
            return Err(SchemaError::CapacityTooLarge {
                depth,
                max: MAX_CHUNK_DEPTH,
            });
        }

        let fixed_size = compute_fixed_size(&kind)?;
        let min_size = match fixed_size {
            Some(size) => size,
            None => compute_min_size(&kind)?,
        };

        Ok(Self(Arc::new(SchemaInner {
            kind,
            fixed_size,
            min_size,
            chunk_count,
            depth,
            default_node: OnceLock::new(),
        })))
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::basic(BasicType::Boolean)
    }

    pub fn uint(bits: u16) -> Result<Self, SchemaError> {
        Ok(Self::basic(BasicType::uint(bits)?))
    }

    #[must_use]
    pub fn uint8() -> Self {
        Self::basic(BasicType::Uint8)
    }

    #[must_use]
    pub fn uint16() -> Self {
        Self::basic(BasicType::Uint16)
    }

    #[must_use]
    pub fn uint32() -> Self {
        Self::basic(BasicType::Uint32)
    }

    #[must_use]
    pub fn uint64() -> Self {
        Self::basic(BasicType::Uint64)
    }

    #[must_use]
    pub fn uint128() -> Self {
        Self::basic(BasicType::Uint128)
    }

    #[must_use]
    pub fn uint256() -> Self {
        Self::basic(BasicType::Uint256)
    }

    #[must_use]
    pub fn basic(basic: BasicType) -> Self {
        let size = basic.byte_len();
        Self(Arc::new(SchemaInner {
            kind: SchemaKind::Basic(basic),
            fixed_size: Some(size),
            min_size: size,
            chunk_count: 1,
            depth: 0,
            default_node: OnceLock::new(),
        }))
    }

    pub fn vector(element: Schema, length: u64) -> Result<Self, SchemaError> {
        Self::new(SchemaKind::Vector { element, length })
    }

    pub fn list(element: Schema, max_length: u64) -> Result<Self, SchemaError> {
        Self::new(SchemaKind::List {
            element,
            max_length,
        })
    }

    pub fn bitvector(length: u64) -> Result<Self, SchemaError> {
        Self::new(SchemaKind::Bitvector { length })
    }

    pub fn bitlist(max_length: u64) -> Result<Self, SchemaError> {
        Self::new(SchemaKind::Bitlist { max_length })
    }

    /// Container with fields in declaration order.
    pub fn container<I, S>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, Schema)>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(name, schema)| Field {
                name: name.into(),
                schema,
            })
            .collect();
        Self::new(SchemaKind::Container { fields })
    }

    pub fn union(variants: Vec<Option<Schema>>) -> Result<Self, SchemaError> {
        Self::new(SchemaKind::Union { variants })
    }

    /// `Vector[uint8, length]`.
    pub fn bytes_vector(length: u64) -> Result<Self, SchemaError> {
        Self::vector(Self::uint8(), length)
    }

    /// `List[uint8, max_length]`.
    pub fn byte_list(max_length: u64) -> Result<Self, SchemaError> {
        Self::list(Self::uint8(), max_length)
    }

    /// `Vector[uint8, 32]`, the root/hash type.
    #[must_use]
    pub fn bytes32() -> Self {
        static BYTES32: OnceLock<Schema> = OnceLock::new();
        BYTES32
            .get_or_init(|| {
                let element = Schema::uint8();
                Schema(Arc::new(SchemaInner {
                    kind: SchemaKind::Vector {
                        element,
                        length: 32,
                    },
                    fixed_size: Some(32),
                    min_size: 32,
                    chunk_count: 1,
                    depth: 0,
                    default_node: OnceLock::new(),
                }))
            })
            .clone()
    }

    #[must_use]
    pub fn kind(&self) -> &SchemaKind {
        &self.0.kind
    }

    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        self.0.fixed_size.is_some()
    }

    /// Serialized size, if every value of this type has the same size.
    #[must_use]
    pub fn fixed_size(&self) -> Option<usize> {
        self.0.fixed_size
    }

    /// Smallest valid serialization.
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.0.min_size
    }

    /// Number of leaf chunks at full capacity.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.0.chunk_count
    }

    /// Depth of the content tree, `ceil(log2(chunk_count))`.
    ///
    /// Lists and unions carry one extra level above this for the
    /// length/selector mix-in.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.0.depth
    }

    #[must_use]
    pub fn basic_type(&self) -> Option<BasicType> {
        match self.0.kind {
            SchemaKind::Basic(basic) => Some(basic),
            _ => None,
        }
    }

    /// True for lists and vectors whose elements are packed into chunks.
    #[must_use]
    pub fn packed_element(&self) -> Option<BasicType> {
        match &self.0.kind {
            SchemaKind::Vector { element, .. } | SchemaKind::List { element, .. } => {
                element.basic_type()
            }
            _ => None,
        }
    }

    /// Elements per leaf chunk for packed sequences and bitfields.
    #[must_use]
    pub fn elements_per_chunk(&self) -> Option<u64> {
        match &self.0.kind {
            SchemaKind::Bitvector { .. } | SchemaKind::Bitlist { .. } => Some(256),
            _ => self.packed_element().map(BasicType::per_chunk),
        }
    }

    /// True if the tree is `Branch(content, Leaf(length))`.
    #[must_use]
    pub fn has_length_mixin(&self) -> bool {
        matches!(
            self.0.kind,
            SchemaKind::List { .. } | SchemaKind::Bitlist { .. }
        )
    }

    pub fn field_index(&self, name: &str) -> Result<usize, ViewError> {
        match &self.0.kind {
            SchemaKind::Container { fields } => fields
                .iter()
                .position(|f| f.name == name)
                .ok_or_else(|| ViewError::UnknownField {
                    name: name.to_owned(),
                }),
            kind => Err(ViewError::NotComposite { kind: kind.name() }),
        }
    }

    /// Generalized index of a container field relative to the container root.
    pub fn field_gindex(&self, name: &str) -> Result<GeneralizedIndex, ViewError> {
        let index = self.field_index(name)?;
        Ok(gindex::from_depth_index(self.depth(), index as u64))
    }

    /// Generalized index of the chunk holding element `index`.
    pub fn element_gindex(&self, index: u64) -> Result<GeneralizedIndex, ViewError> {
        match self.slot(Key::Index(index), None)? {
            Slot::Subtree { gindex, .. }
            | Slot::Packed { gindex, .. }
            | Slot::Bit { gindex, .. } => Ok(gindex),
        }
    }

    /// Generalized index of the length leaf of a list or bitlist.
    pub fn length_gindex(&self) -> Result<GeneralizedIndex, ViewError> {
        if self.has_length_mixin() {
            Ok(3)
        } else {
            Err(ViewError::TypeMismatch {
                expected: "list or bitlist",
            })
        }
    }

    /// Generalized indices of a union's `(variant, selector)` children.
    pub fn variant_gindex(&self) -> Result<(GeneralizedIndex, GeneralizedIndex), ViewError> {
        match self.0.kind {
            SchemaKind::Union { .. } => Ok((2, 3)),
            _ => Err(ViewError::TypeMismatch { expected: "union" }),
        }
    }

    /// Resolves a path of keys into a generalized index relative to the root
    /// of a value of this schema.
    ///
    /// A packed scalar or a bit resolves to its chunk and must end the path.
    pub fn gindex_of(&self, path: &[Key<'_>]) -> Result<GeneralizedIndex, ViewError> {
        let mut current = self.clone();
        let mut result = gindex::ROOT;
        for (i, key) in path.iter().enumerate() {
            let (step, next) = match current.slot(*key, None)? {
                Slot::Subtree { gindex, schema } => (gindex, Some(schema)),
                Slot::Packed { gindex, .. } | Slot::Bit { gindex, .. } => (gindex, None),
            };
            result = gindex::concat(result, step).ok_or(ViewError::GindexOutOfBounds {
                gindex: result,
            })?;
            match next {
                Some(schema) => current = schema,
                None if i + 1 == path.len() => break,
                None => {
                    return Err(ViewError::NotComposite {
                        kind: current.packed_element().map_or("bitfield", BasicType::name),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Locates a child within a value of this schema.
    ///
    /// `bound` is the exclusive upper limit for element indices; it defaults
    /// to the declared capacity and is the current length for live lists.
    pub(crate) fn slot(&self, key: Key<'_>, bound: Option<u64>) -> Result<Slot, ViewError> {
        let index = match key {
            Key::Index(index) => index,
            Key::Name(name) => self.field_index(name)? as u64,
        };
        let check = |capacity: u64| {
            let bound = bound.unwrap_or(capacity);
            if index < bound {
                Ok(())
            } else {
                Err(ViewError::IndexOutOfBounds { index, bound })
            }
        };
        let depth = self.depth();
        match &self.0.kind {
            SchemaKind::Basic(basic) => Err(ViewError::NotComposite { kind: basic.name() }),
            SchemaKind::Container { fields } => {
                check(fields.len() as u64)?;
                Ok(Slot::Subtree {
                    gindex: gindex::from_depth_index(depth, index),
                    schema: fields[index as usize].schema.clone(),
                })
            }
            SchemaKind::Vector { element, length } => {
                check(*length)?;
                Ok(sequence_slot(element, index, depth))
            }
            SchemaKind::List {
                element,
                max_length,
            } => {
                check(*max_length)?;
                // content is the left child of the list root
                Ok(sequence_slot(element, index, depth + 1))
            }
            SchemaKind::Bitvector { length } => {
                check(*length)?;
                Ok(bit_slot(index, depth))
            }
            SchemaKind::Bitlist { max_length } => {
                check(*max_length)?;
                Ok(bit_slot(index, depth + 1))
            }
            SchemaKind::Union { variants } => match variants.get(index as usize) {
                Some(Some(schema)) => Ok(Slot::Subtree {
                    gindex: 2,
                    schema: schema.clone(),
                }),
                _ => Err(ViewError::UnionSelectorOutOfRange {
                    selector: index as u32,
                    variants: variants.len(),
                }),
            },
        }
    }

    pub(crate) fn default_node_cell(&self) -> &OnceLock<Node> {
        &self.0.default_node
    }
}

fn sequence_slot(element: &Schema, index: u64, depth: u32) -> Slot {
    match element.basic_type() {
        Some(basic) => {
            let per_chunk = basic.per_chunk();
            Slot::Packed {
                gindex: gindex::from_depth_index(depth, index / per_chunk),
                offset: (index % per_chunk) as usize * basic.byte_len(),
                basic,
            }
        }
        None => Slot::Subtree {
            gindex: gindex::from_depth_index(depth, index),
            schema: element.clone(),
        },
    }
}

fn bit_slot(index: u64, depth: u32) -> Slot {
    Slot::Bit {
        gindex: gindex::from_depth_index(depth, index / 256),
        bit: (index % 256) as usize,
    }
}

/// Leaf chunks needed for `count` elements of `element`.
fn element_chunks(element: &Schema, count: u64) -> Result<u64, SchemaError> {
    match element.basic_type() {
        Some(basic) => {
            let bytes = (count as u128) * basic.byte_len() as u128;
            u64::try_from(bytes.div_ceil(BYTES_PER_CHUNK as u128)).map_err(|_| size_overflow())
        }
        None => Ok(count),
    }
}

fn compute_fixed_size(kind: &SchemaKind) -> Result<Option<usize>, SchemaError> {
    let mul = |count: u64, size: usize| -> Result<usize, SchemaError> {
        usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(size))
            .ok_or_else(size_overflow)
    };
    Ok(match kind {
        SchemaKind::Basic(basic) => Some(basic.byte_len()),
        SchemaKind::Vector { element, length } => match element.fixed_size() {
            Some(size) => Some(mul(*length, size)?),
            None => None,
        },
        SchemaKind::Bitvector { length } => Some(mul(length.div_ceil(8), 1)?),
        SchemaKind::Container { fields } => {
            let mut total = 0usize;
            for field in fields {
                match field.schema.fixed_size() {
                    Some(size) => total = total.checked_add(size).ok_or_else(size_overflow)?,
                    None => return Ok(None),
                }
            }
            Some(total)
        }
        SchemaKind::List { .. } | SchemaKind::Bitlist { .. } | SchemaKind::Union { .. } => None,
    })
}

fn compute_min_size(kind: &SchemaKind) -> Result<usize, SchemaError> {
    Ok(match kind {
        SchemaKind::List { .. } => 0,
        // sentinel byte
        SchemaKind::Bitlist { .. } => 1,
        SchemaKind::Vector { element, length } => usize::try_from(*length)
            .ok()
            .and_then(|n| n.checked_mul(BYTES_PER_LENGTH_OFFSET + element.min_size()))
            .ok_or_else(size_overflow)?,
        SchemaKind::Container { fields } => fields.iter().try_fold(0usize, |acc, field| {
            let size = fixed_part_len(&field.schema)
                + if field.schema.is_fixed_size() {
                    0
                } else {
                    field.schema.min_size()
                };
            acc.checked_add(size).ok_or_else(size_overflow)
        })?,
        SchemaKind::Union { variants } => {
            BYTES_PER_LENGTH_OFFSET
                + variants
                    .iter()
                    .map(|v| v.as_ref().map_or(0, Schema::min_size))
                    .min()
                    .unwrap_or(0)
        }
        SchemaKind::Basic(_) | SchemaKind::Bitvector { .. } => {
            unreachable!("fixed-size kinds are handled by compute_fixed_size")
        }
    })
}
