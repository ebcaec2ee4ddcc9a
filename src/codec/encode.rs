use tracing::error;

use crate::error::ViewError;
use crate::schema::{Schema, SchemaKind};
use crate::tree::Node;
use crate::view::{View, list_parts, packed_content, union_parts};
use crate::{BYTES_PER_LENGTH_OFFSET, MAX_PREALLOCATION, gindex};

/// Serializes `view` into canonical SSZ bytes.
pub fn encode(view: &View) -> Result<Vec<u8>, ViewError> {
    let mut out = Vec::with_capacity(view.schema().min_size().min(MAX_PREALLOCATION));
    write(view.schema(), view.node(), &mut out)?;
    Ok(out)
}

fn write(schema: &Schema, node: &Node, out: &mut Vec<u8>) -> Result<(), ViewError> {
    let depth = schema.depth();
    match schema.kind() {
        SchemaKind::Basic(basic) => {
            let chunk = node
                .chunk()
                .ok_or(ViewError::GindexOutOfBounds { gindex: gindex::ROOT })?;
            out.extend_from_slice(&chunk[..basic.byte_len()]);
        }
        SchemaKind::Vector { element, length } => {
            write_sequence(element, node, depth, *length, out)?;
        }
        SchemaKind::List {
            element,
            max_length,
        } => {
            let (content, len) = list_parts(node)?;
            check_limit(schema, len, *max_length)?;
            write_sequence(element, content, depth, len, out)?;
        }
        SchemaKind::Bitvector { length } => {
            out.extend(packed_content(node, depth, length.div_ceil(8) as usize)?);
        }
        SchemaKind::Bitlist { max_length } => {
            let (content, len) = list_parts(node)?;
            check_limit(schema, len, *max_length)?;
            let len = len as usize;
            let mut bytes = packed_content(content, depth, len.div_ceil(8))?;
            if len % 8 == 0 {
                bytes.push(0);
            }
            bytes[len / 8] |= 1 << (len % 8);
            out.extend(bytes);
        }
        SchemaKind::Container { fields } => {
            let children = node.nodes_at_depth(depth, fields.len() as u64)?;
            let parts: Vec<_> = fields.iter().map(|f| &f.schema).zip(&children).collect();
            write_parts(&parts, out)?;
        }
        SchemaKind::Union { variants } => {
            let (variant, selector) = union_parts(schema, node)?;
            out.extend_from_slice(&selector.to_le_bytes());
            if let Some(variant_schema) = &variants[selector as usize] {
                write(variant_schema, variant, out)?;
            }
        }
    }
    Ok(())
}

fn check_limit(schema: &Schema, len: u64, max: u64) -> Result<(), ViewError> {
    if len > max {
        error!(
            kind = schema.kind().name(),
            len, max, "refusing to encode a list over its limit"
        );
        return Err(ViewError::LengthExceedsMax { len, max });
    }
    Ok(())
}

fn write_sequence(
    element: &Schema,
    node: &Node,
    depth: u32,
    len: u64,
    out: &mut Vec<u8>,
) -> Result<(), ViewError> {
    match element.basic_type() {
        Some(basic) => {
            out.extend(packed_content(node, depth, len as usize * basic.byte_len())?);
            Ok(())
        }
        None => {
            let children = node.nodes_at_depth(depth, len)?;
            let parts: Vec<_> = children.iter().map(|child| (element, child)).collect();
            write_parts(&parts, out)
        }
    }
}

/// Writes the fixed part (inline values and offsets) followed by the
/// variable part.
fn write_parts(parts: &[(&Schema, &Node)], out: &mut Vec<u8>) -> Result<(), ViewError> {
    let fixed_len: usize = parts
        .iter()
        .map(|(schema, _)| schema.fixed_size().unwrap_or(BYTES_PER_LENGTH_OFFSET))
        .sum();
    let mut fixed = Vec::with_capacity(fixed_len.min(MAX_PREALLOCATION));
    let mut variable = Vec::new();
    for (schema, node) in parts {
        if schema.is_fixed_size() {
            write(schema, node, &mut fixed)?;
        } else {
            let position = fixed_len + variable.len();
            let offset = u32::try_from(position).map_err(|_| ViewError::LengthExceedsMax {
                len: position as u64,
                max: u64::from(u32::MAX),
            })?;
            fixed.extend_from_slice(&offset.to_le_bytes());
            write(schema, node, &mut variable)?;
        }
    }
    out.extend(fixed);
    out.extend(variable);
    Ok(())
}
