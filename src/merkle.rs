//! Merkleization primitives.
//!
//! The tree store already yields hash tree roots for views. The functions
//! here compute the same roots directly from chunks and plain values,
//! without building nodes; they are the reference the tree is checked
//! against and are handy for callers that only ever need a root.

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::ViewError;
use crate::schema::{BasicType, Schema, SchemaKind};
use crate::tree::{Root, ZERO_CHUNK, zero_node};
use crate::value::{Value, basic_to_le_bytes};
use crate::{BYTES_PER_CHUNK, hashing_config};

/// SHA-256 of the concatenation of two chunks.
#[must_use]
#[inline]
pub fn hash_pair(left: &Root, right: &Root) -> Root {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of an all-zero tree of `depth`, served from the zero-subtree cache.
#[must_use]
pub fn zero_hash(depth: u32) -> Root {
    zero_node(depth).root()
}

/// Root of a depth-`depth` tree whose leftmost leaves are `chunks` and
/// whose remaining leaves are zero.
///
/// Caller must ensure `chunks.len() <= 1 << depth`.
#[must_use]
pub fn merkleize(chunks: &[Root], depth: u32) -> Root {
    assert!(
        depth >= 64 || chunks.len() as u64 <= 1u64 << depth,
        "merkleize: {} chunks do not fit in a tree of depth {depth}",
        chunks.len()
    );
    if chunks.is_empty() {
        return zero_hash(depth);
    }

    let parallel_len = hashing_config().parallel_layer_len();
    let mut layer = chunks.to_vec();
    for level in 0..depth {
        if layer.len() % 2 == 1 {
            layer.push(zero_hash(level));
        }
        layer = if layer.len() >= parallel_len {
            layer
                .par_chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect()
        } else {
            layer
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect()
        };
    }
    layer[0]
}

/// The chunk holding a little-endian `u64` length, zero-padded on the right.
#[must_use]
pub fn length_chunk(length: u64) -> Root {
    let mut chunk = ZERO_CHUNK;
    chunk[..8].copy_from_slice(&length.to_le_bytes());
    chunk
}

/// `hash(root || leftpad32(length))`.
#[must_use]
pub fn mix_in_length(root: &Root, length: u64) -> Root {
    hash_pair(root, &length_chunk(length))
}

/// `hash(root || leftpad32(selector))`.
#[must_use]
pub fn mix_in_selector(root: &Root, selector: u32) -> Root {
    let mut chunk = ZERO_CHUNK;
    chunk[..4].copy_from_slice(&selector.to_le_bytes());
    hash_pair(root, &chunk)
}

/// Splits `bytes` into chunks, zero-padding the last one.
#[must_use]
pub fn pack_bytes(bytes: &[u8]) -> Vec<Root> {
    bytes
        .chunks(BYTES_PER_CHUNK)
        .map(|piece| {
            let mut chunk = ZERO_CHUNK;
            chunk[..piece.len()].copy_from_slice(piece);
            chunk
        })
        .collect()
}

/// Packs bits least-significant first into bytes, without a sentinel.
#[must_use]
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Computes the hash tree root of `value` under `schema` without building
/// a tree.
pub fn hash_tree_root_of_value(schema: &Schema, value: &Value) -> Result<Root, ViewError> {
    match (schema.kind(), value) {
        (SchemaKind::Basic(basic), _) => {
            let bytes = basic_to_le_bytes(*basic, value)?;
            Ok(pack_bytes(&bytes)[0])
        }
        (SchemaKind::Vector { element, length }, Value::Sequence(items)) => {
            if items.len() as u64 != *length {
                return Err(ViewError::TypeMismatch {
                    expected: "vector of declared length",
                });
            }
            sequence_root(element, items, schema.depth())
        }
        (SchemaKind::List { element, max_length }, Value::Sequence(items)) => {
            let len = items.len() as u64;
            if len > *max_length {
                return Err(ViewError::LengthExceedsMax {
                    len,
                    max: *max_length,
                });
            }
            Ok(mix_in_length(&sequence_root(element, items, schema.depth())?, len))
        }
        (SchemaKind::Bitvector { length }, Value::Bits(bits)) => {
            if bits.len() as u64 != *length {
                return Err(ViewError::TypeMismatch {
                    expected: "bitvector of declared length",
                });
            }
            Ok(merkleize(&pack_bytes(&pack_bits(bits)), schema.depth()))
        }
        (SchemaKind::Bitlist { max_length }, Value::Bits(bits)) => {
            let len = bits.len() as u64;
            if len > *max_length {
                return Err(ViewError::LengthExceedsMax {
                    len,
                    max: *max_length,
                });
            }
            let content = merkleize(&pack_bytes(&pack_bits(bits)), schema.depth());
            Ok(mix_in_length(&content, len))
        }
        (SchemaKind::Container { fields }, Value::Container(values)) => {
            if values.len() != fields.len() {
                return Err(ViewError::TypeMismatch {
                    expected: "one value per container field",
                });
            }
            let roots = fields
                .par_iter()
                .zip(values.par_iter())
                .map(|(field, value)| hash_tree_root_of_value(&field.schema, value))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(merkleize(&roots, schema.depth()))
        }
        (SchemaKind::Union { variants }, Value::Union { selector, value }) => {
            let variant = variants.get(*selector as usize).ok_or(
                ViewError::UnionSelectorOutOfRange {
                    selector: *selector,
                    variants: variants.len(),
                },
            )?;
            let root = match (variant, value) {
                (None, None) => ZERO_CHUNK,
                (Some(schema), Some(value)) => hash_tree_root_of_value(schema, value)?,
                _ => {
                    return Err(ViewError::TypeMismatch {
                        expected: "union value matching the selected variant",
                    });
                }
            };
            Ok(mix_in_selector(&root, *selector))
        }
        (kind, _) => Err(ViewError::TypeMismatch {
            expected: kind.name(),
        }),
    }
}

fn sequence_root(element: &Schema, items: &[Value], depth: u32) -> Result<Root, ViewError> {
    match element.basic_type() {
        Some(basic) => {
            let bytes = packed_bytes(basic, items)?;
            Ok(merkleize(&pack_bytes(&bytes), depth))
        }
        None => {
            let roots = items
                .par_iter()
                .map(|item| hash_tree_root_of_value(element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(merkleize(&roots, depth))
        }
    }
}

/// Concatenated little-endian serialization of scalar `items`.
pub(crate) fn packed_bytes(basic: BasicType, items: &[Value]) -> Result<Vec<u8>, ViewError> {
    let mut bytes = Vec::with_capacity(items.len() * basic.byte_len());
    for item in items {
        bytes.extend_from_slice(&basic_to_le_bytes(basic, item)?);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn from_hex(s: &str) -> Root {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_zero_hashes_match_known_values() {
        assert_eq!(zero_hash(0), ZERO_CHUNK);
        assert_eq!(
            zero_hash(1),
            from_hex("f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b")
        );
        assert_eq!(
            zero_hash(2),
            from_hex("db56114e00fdd4c1f85c892bf35ac9a89289aaecb1ebd0a96cde606a748b5d71")
        );
        assert_eq!(
            zero_hash(3),
            from_hex("c78009fdf07fc56a11f122370658a353aaa542ed63e44c4bc15ff4cd105ab33c")
        );
    }

    #[test]
    fn test_merkleize_pads_with_zero_subtrees() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        assert_eq!(merkleize(&[a], 0), a);
        assert_eq!(merkleize(&[a, b], 1), hash_pair(&a, &b));
        assert_eq!(
            merkleize(&[a, b, c], 2),
            hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &ZERO_CHUNK))
        );
        assert_eq!(
            merkleize(&[a], 3),
            hash_pair(
                &hash_pair(&hash_pair(&a, &ZERO_CHUNK), &zero_hash(1)),
                &zero_hash(2)
            )
        );
        assert_eq!(merkleize(&[], 5), zero_hash(5));
    }

    #[test]
    fn test_packing_uint64_list() {
        // List[uint64, 4] = [1, 2, 3]: one chunk, three values, zero tail
        let schema = Schema::list(Schema::uint64(), 4).unwrap();
        let value = Value::uints([1u64, 2, 3]);
        let mut chunk = ZERO_CHUNK;
        chunk[0] = 1;
        chunk[8] = 2;
        chunk[16] = 3;
        assert_eq!(
            hash_tree_root_of_value(&schema, &value).unwrap(),
            mix_in_length(&chunk, 3)
        );
    }

    #[test]
    fn test_pack_bits() {
        assert_eq!(pack_bits(&[true, false, true]), vec![0b101]);
        assert_eq!(pack_bits(&[false; 9]), vec![0, 0]);
        assert_eq!(pack_bits(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_union_root_mixes_selector() {
        let schema = Schema::union(vec![None, Some(Schema::uint16())]).unwrap();
        let none = Value::Union {
            selector: 0,
            value: None,
        };
        assert_eq!(
            hash_tree_root_of_value(&schema, &none).unwrap(),
            mix_in_selector(&ZERO_CHUNK, 0)
        );
        let some = Value::Union {
            selector: 1,
            value: Some(Box::new(Value::Uint(0x0102))),
        };
        let mut chunk = ZERO_CHUNK;
        chunk[0] = 2;
        chunk[1] = 1;
        assert_eq!(
            hash_tree_root_of_value(&schema, &some).unwrap(),
            mix_in_selector(&chunk, 1)
        );
        let bad = Value::Union {
            selector: 2,
            value: None,
        };
        assert!(matches!(
            hash_tree_root_of_value(&schema, &bad),
            Err(ViewError::UnionSelectorOutOfRange { selector: 2, .. })
        ));
    }

    proptest! {
        #[test]
        fn proptest_parallel_layers_match_sequential(n in 1usize..700) {
            let chunks: Vec<Root> = (0..n)
                .map(|i| {
                    let mut c = ZERO_CHUNK;
                    c[..8].copy_from_slice(&(i as u64).to_le_bytes());
                    c
                })
                .collect();
            // reference: pairwise recursion over an explicit padded array
            fn reference(chunks: &[Root], depth: u32) -> Root {
                if depth == 0 {
                    return chunks.first().copied().unwrap_or(ZERO_CHUNK);
                }
                let half = 1usize << (depth - 1);
                let (l, r) = chunks.split_at(chunks.len().min(half));
                hash_pair(&reference(l, depth - 1), &reference(r, depth - 1))
            }
            prop_assert_eq!(merkleize(&chunks, 10), reference(&chunks, 10));
        }
    }
}
