use std::ops::Range;

use tracing::debug;

use super::read_offset;
use crate::BYTES_PER_LENGTH_OFFSET;
use crate::error::DecodeError;
use crate::merkle::pack_bytes;
use crate::schema::{BasicType, Field, Schema, SchemaKind};
use crate::tree::Node;
use crate::view::{View, with_length, with_selector};

/// Decodes untrusted bytes into a view of `schema`.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<View, DecodeError> {
    match read(schema, bytes) {
        Ok(node) => Ok(View::from_parts(schema.clone(), node)),
        Err(err) => {
            debug!(
                kind = schema.kind().name(),
                len = bytes.len(),
                %err,
                "rejected SSZ input"
            );
            Err(err)
        }
    }
}

/// Element count an encoding must carry.
#[derive(Clone, Copy)]
enum Count {
    Exactly(u64),
    AtMost(u64),
}

impl Count {
    fn check(self, count: u64) -> Result<(), DecodeError> {
        match self {
            Self::AtMost(max) if count > max => {
                Err(DecodeError::LengthExceedsMax { len: count, max })
            }
            Self::Exactly(length) if count != length => Err(DecodeError::InvalidOffset {
                offset: count as usize * BYTES_PER_LENGTH_OFFSET,
                reason: "offset table does not match the vector length",
            }),
            _ => Ok(()),
        }
    }
}

fn read(schema: &Schema, bytes: &[u8]) -> Result<Node, DecodeError> {
    let depth = schema.depth();
    if let SchemaKind::Bitlist { max_length } = schema.kind() {
        return read_bitlist(bytes, *max_length, depth);
    }

    if bytes.len() < schema.min_size() {
        return Err(DecodeError::TruncatedInput {
            len: bytes.len(),
            expected: schema.min_size(),
        });
    }
    if let Some(size) = schema.fixed_size() {
        if bytes.len() > size {
            return Err(DecodeError::TrailingBytes {
                remaining: bytes.len() - size,
            });
        }
    }

    match schema.kind() {
        SchemaKind::Basic(basic) => {
            if *basic == BasicType::Boolean {
                check_booleans(bytes)?;
            }
            Ok(Node::leaf_from_bytes(bytes))
        }
        SchemaKind::Vector { element, length } => {
            read_sequence(element, bytes, depth, Count::Exactly(*length)).map(|(node, _)| node)
        }
        SchemaKind::List {
            element,
            max_length,
        } => {
            let (content, len) = read_sequence(element, bytes, depth, Count::AtMost(*max_length))?;
            Ok(with_length(content, len))
        }
        SchemaKind::Bitvector { length } => {
            let spare = (length % 8) as u32;
            if spare != 0 && bytes[bytes.len() - 1] >> spare != 0 {
                return Err(DecodeError::NonZeroPadding { length: *length });
            }
            leaves(bytes, depth)
        }
        SchemaKind::Container { fields } => read_container(fields, bytes, depth),
        SchemaKind::Union { variants } => {
            let selector = read_offset(bytes, 0) as u32;
            let rest = &bytes[BYTES_PER_LENGTH_OFFSET..];
            let variant = match variants.get(selector as usize) {
                Some(Some(variant)) => read(variant, rest)?,
                Some(None) if rest.is_empty() => Node::leaf_from_bytes(&[]),
                Some(None) => {
                    return Err(DecodeError::TrailingBytes {
                        remaining: rest.len(),
                    });
                }
                None => {
                    return Err(DecodeError::UnionSelectorOutOfRange {
                        selector,
                        variants: variants.len(),
                    });
                }
            };
            Ok(with_selector(variant, selector))
        }
        SchemaKind::Bitlist { .. } => unreachable!("bitlists are decoded above"),
    }
}

fn check_booleans(bytes: &[u8]) -> Result<(), DecodeError> {
    match bytes.iter().find(|b| **b > 1) {
        Some(byte) => Err(DecodeError::InvalidBoolean { byte: *byte }),
        None => Ok(()),
    }
}

fn fill(nodes: Vec<Node>, depth: u32) -> Result<Node, DecodeError> {
    let count = nodes.len() as u64;
    Node::fill(nodes, depth).map_err(|_| DecodeError::LengthExceedsMax {
        len: count,
        max: 1 << depth,
    })
}

fn leaves(bytes: &[u8], depth: u32) -> Result<Node, DecodeError> {
    fill(pack_bytes(bytes).into_iter().map(Node::leaf).collect(), depth)
}

fn read_bitlist(bytes: &[u8], max_length: u64, depth: u32) -> Result<Node, DecodeError> {
    let Some((&last, _)) = bytes.split_last() else {
        return Err(DecodeError::InvalidBitlistEncoding);
    };
    if last == 0 {
        return Err(DecodeError::InvalidBitlistEncoding);
    }
    let sentinel = 7 - last.leading_zeros();
    let len = (bytes.len() as u64 - 1) * 8 + u64::from(sentinel);
    if len > max_length {
        return Err(DecodeError::LengthExceedsMax {
            len,
            max: max_length,
        });
    }
    let mut content = bytes.to_vec();
    if let Some(tail) = content.last_mut() {
        *tail ^= 1 << sentinel;
    }
    content.truncate((len as usize).div_ceil(8));
    Ok(with_length(leaves(&content, depth)?, len))
}

/// Decodes a vector or list body, returning its content tree and count.
fn read_sequence(
    element: &Schema,
    bytes: &[u8],
    depth: u32,
    expected: Count,
) -> Result<(Node, u64), DecodeError> {
    if let Some(basic) = element.basic_type() {
        let size = basic.byte_len();
        if bytes.len() % size != 0 {
            return Err(DecodeError::TrailingBytes {
                remaining: bytes.len() % size,
            });
        }
        let count = (bytes.len() / size) as u64;
        expected.check(count)?;
        if basic == BasicType::Boolean {
            check_booleans(bytes)?;
        }
        return Ok((leaves(bytes, depth)?, count));
    }

    let spans: Vec<Range<usize>> = match element.fixed_size() {
        Some(size) => {
            if bytes.len() % size != 0 {
                return Err(DecodeError::TrailingBytes {
                    remaining: bytes.len() % size,
                });
            }
            let count = bytes.len() / size;
            expected.check(count as u64)?;
            (0..count).map(|i| i * size..(i + 1) * size).collect()
        }
        None => variable_spans(bytes, expected)?,
    };
    let count = spans.len() as u64;
    let children = spans
        .into_iter()
        .map(|span| read(element, &bytes[span]))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((fill(children, depth)?, count))
}

/// Splits a sequence of variable-size elements using its offset table.
fn variable_spans(bytes: &[u8], expected: Count) -> Result<Vec<Range<usize>>, DecodeError> {
    if bytes.is_empty() {
        expected.check(0)?;
        return Ok(Vec::new());
    }
    if bytes.len() < BYTES_PER_LENGTH_OFFSET {
        return Err(DecodeError::TruncatedInput {
            len: bytes.len(),
            expected: BYTES_PER_LENGTH_OFFSET,
        });
    }
    let first = read_offset(bytes, 0);
    if first == 0 || first % BYTES_PER_LENGTH_OFFSET != 0 {
        return Err(DecodeError::InvalidOffset {
            offset: first,
            reason: "first offset is not a positive multiple of the offset size",
        });
    }
    if first > bytes.len() {
        return Err(DecodeError::InvalidOffset {
            offset: first,
            reason: "offset points past the end of the input",
        });
    }
    let count = first / BYTES_PER_LENGTH_OFFSET;
    expected.check(count as u64)?;
    let offsets: Vec<usize> = (0..count)
        .map(|i| read_offset(bytes, i * BYTES_PER_LENGTH_OFFSET))
        .collect();
    spans_from_offsets(&offsets, first, bytes.len())
}

/// Validates variable-part offsets and turns them into byte ranges, the
/// last one running to the end of the input.
fn spans_from_offsets(
    offsets: &[usize],
    fixed_end: usize,
    len: usize,
) -> Result<Vec<Range<usize>>, DecodeError> {
    if let Some(&first) = offsets.first() {
        if first != fixed_end {
            return Err(DecodeError::InvalidOffset {
                offset: first,
                reason: "first offset does not point at the end of the fixed part",
            });
        }
    }
    for pair in offsets.windows(2) {
        if pair[1] < pair[0] {
            return Err(DecodeError::InvalidOffset {
                offset: pair[1],
                reason: "offsets are decreasing",
            });
        }
    }
    if let Some(&last) = offsets.last() {
        if last > len {
            return Err(DecodeError::InvalidOffset {
                offset: last,
                reason: "offset points past the end of the input",
            });
        }
    }
    Ok(offsets
        .iter()
        .enumerate()
        .map(|(i, &start)| start..offsets.get(i + 1).copied().unwrap_or(len))
        .collect())
}

fn read_container(fields: &[Field], bytes: &[u8], depth: u32) -> Result<Node, DecodeError> {
    let fixed_end: usize = fields
        .iter()
        .map(|f| f.schema.fixed_size().unwrap_or(BYTES_PER_LENGTH_OFFSET))
        .sum();

    // fixed fields get their span now; variable ones once offsets are checked
    let mut spans: Vec<Option<Range<usize>>> = Vec::with_capacity(fields.len());
    let mut offsets = Vec::new();
    let mut pos = 0;
    for field in fields {
        match field.schema.fixed_size() {
            Some(size) => {
                spans.push(Some(pos..pos + size));
                pos += size;
            }
            None => {
                offsets.push(read_offset(bytes, pos));
                spans.push(None);
                pos += BYTES_PER_LENGTH_OFFSET;
            }
        }
    }
    let mut variable = spans_from_offsets(&offsets, fixed_end, bytes.len())?.into_iter();

    let children = fields
        .iter()
        .zip(spans)
        .map(|(field, span)| {
            let span = match span {
                Some(span) => span,
                None => variable.next().unwrap_or(fixed_end..fixed_end),
            };
            read(&field.schema, &bytes[span])
        })
        .collect::<Result<Vec<_>, _>>()?;
    fill(children, depth)
}
