//! `StackMapTable` decoding and expansion of its delta-compressed frames.

use binrw::binread;

use super::pool::ConstantPool;
use crate::error::{DecompileError, Result};
use crate::types::{JvmType, MethodHeader};
use crate::visitor::{Frame, FrameItem, Label};

#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big)]
pub(crate) enum VerificationType {
    #[br(magic = 0u8)]
    Top,
    #[br(magic = 1u8)]
    Integer,
    #[br(magic = 2u8)]
    Float,
    #[br(magic = 3u8)]
    Double,
    #[br(magic = 4u8)]
    Long,
    #[br(magic = 5u8)]
    Null,
    #[br(magic = 6u8)]
    UninitializedThis,
    #[br(magic = 7u8)]
    Object(u16),
    #[br(magic = 8u8)]
    Uninitialized(u16),
}

#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big, import(frame_type: u8))]
pub(crate) enum FrameBody {
    #[br(pre_assert(frame_type <= 63))]
    Same,
    #[br(pre_assert((64..=127).contains(&frame_type)))]
    SameLocals1Stack(VerificationType),
    #[br(pre_assert(frame_type == 247))]
    SameLocals1StackExtended { offset_delta: u16, stack: VerificationType },
    #[br(pre_assert((248..=250).contains(&frame_type)))]
    Chop { offset_delta: u16 },
    #[br(pre_assert(frame_type == 251))]
    SameExtended { offset_delta: u16 },
    #[br(pre_assert((252..=254).contains(&frame_type)))]
    Append {
        offset_delta: u16,
        #[br(count = frame_type - 251)]
        locals: Vec<VerificationType>,
    },
    #[br(pre_assert(frame_type == 255))]
    Full {
        offset_delta: u16,
        locals_count: u16,
        #[br(count = locals_count)]
        locals: Vec<VerificationType>,
        stack_count: u16,
        #[br(count = stack_count)]
        stack: Vec<VerificationType>,
    },
}

#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big)]
pub(crate) struct StackMapEntry {
    frame_type: u8,
    #[br(args(frame_type))]
    body: FrameBody,
}

#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big)]
pub(crate) struct StackMapTable {
    #[br(temp)]
    count: u16,
    #[br(count = count)]
    pub entries: Vec<StackMapEntry>,
}

impl StackMapEntry {
    fn offset_delta(&self) -> u16 {
        match &self.body {
            FrameBody::Same => u16::from(self.frame_type),
            FrameBody::SameLocals1Stack(_) => u16::from(self.frame_type) - 64,
            FrameBody::SameLocals1StackExtended { offset_delta, .. }
            | FrameBody::Chop { offset_delta }
            | FrameBody::SameExtended { offset_delta }
            | FrameBody::Append { offset_delta, .. }
            | FrameBody::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

/// The implicit frame at offset 0, derived from the method signature.
pub(crate) fn initial_locals(header: &MethodHeader) -> Vec<FrameItem> {
    let mut locals: Vec<FrameItem> = header.entry_locals().iter().map(frame_item_of).collect();
    if header.is_constructor() && !header.is_static() {
        if let Some(this) = locals.first_mut() {
            *this = FrameItem::UninitializedThis;
        }
    }
    locals
}

fn frame_item_of(ty: &JvmType) -> FrameItem {
    match ty {
        JvmType::Long => FrameItem::Long,
        JvmType::Float => FrameItem::Float,
        JvmType::Double => FrameItem::Double,
        JvmType::Reference(name) => FrameItem::Object(name.clone()),
        JvmType::Array(_) => FrameItem::Object(ty.to_descriptor()),
        _ => FrameItem::Integer,
    }
}

fn resolve(item: &VerificationType, pool: &dyn ConstantPool) -> Result<FrameItem> {
    Ok(match item {
        VerificationType::Top => FrameItem::Top,
        VerificationType::Integer => FrameItem::Integer,
        VerificationType::Float => FrameItem::Float,
        VerificationType::Double => FrameItem::Double,
        VerificationType::Long => FrameItem::Long,
        VerificationType::Null => FrameItem::Null,
        VerificationType::UninitializedThis => FrameItem::UninitializedThis,
        VerificationType::Object(index) => FrameItem::Object(pool.class_name(*index)?.to_string()),
        VerificationType::Uninitialized(offset) => FrameItem::Uninitialized(Label(u32::from(*offset))),
    })
}

fn resolve_all(items: &[VerificationType], pool: &dyn ConstantPool) -> Result<Vec<FrameItem>> {
    items.iter().map(|item| resolve(item, pool)).collect()
}

/// Expands the compressed entries into full frames keyed by code offset.
pub(crate) fn expand(
    entries: &[StackMapEntry],
    initial: Vec<FrameItem>,
    pool: &dyn ConstantPool,
) -> Result<Vec<(u32, Frame)>> {
    let mut frames = Vec::with_capacity(entries.len());
    let mut locals = initial;
    let mut offset: Option<u32> = None;
    for entry in entries {
        let delta = u32::from(entry.offset_delta());
        let at = match offset {
            None => delta,
            Some(previous) => previous + delta + 1,
        };
        offset = Some(at);

        let stack = match &entry.body {
            FrameBody::Same | FrameBody::SameExtended { .. } => Vec::new(),
            FrameBody::SameLocals1Stack(item) | FrameBody::SameLocals1StackExtended { stack: item, .. } => {
                vec![resolve(item, pool)?]
            }
            FrameBody::Chop { .. } => {
                let chopped = usize::from(251 - entry.frame_type);
                if chopped > locals.len() {
                    return Err(DecompileError::FrameMismatch {
                        position: at as usize,
                        message: format!("chop of {} locals from {}", chopped, locals.len()),
                    });
                }
                locals.truncate(locals.len() - chopped);
                Vec::new()
            }
            FrameBody::Append { locals: appended, .. } => {
                locals.extend(resolve_all(appended, pool)?);
                Vec::new()
            }
            FrameBody::Full {
                locals: full, stack, ..
            } => {
                locals = resolve_all(full, pool)?;
                resolve_all(stack, pool)?
            }
        };
        frames.push((
            at,
            Frame {
                locals: locals.clone(),
                stack,
            },
        ));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binrw::BinRead;

    use super::*;
    use crate::bytecode::pool::{ConstantTable, PoolEntry};
    use crate::types::MethodAccessFlags;

    fn table(bytes: &[u8]) -> Vec<StackMapEntry> {
        StackMapTable::read(&mut Cursor::new(bytes)).unwrap().entries
    }

    #[test]
    fn test_offsets_accumulate() {
        let entries = table(&[
            0x00, 0x03, //
            7, // same, delta 7
            64 + 2, 1, // same_locals_1_stack_item, delta 2, int
            251, 0x00, 0x04, // same_frame_extended, delta 4
        ]);
        let frames = expand(&entries, vec![FrameItem::Integer], &ConstantTable::new()).unwrap();
        let offsets: Vec<_> = frames.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, vec![7, 10, 15]);
        assert_eq!(frames[1].1.stack, vec![FrameItem::Integer]);
        assert!(frames[2].1.stack.is_empty());
    }

    #[test]
    fn test_append_and_chop() {
        let mut pool = ConstantTable::new();
        let name = pool.push(PoolEntry::Utf8("java/lang/String".into()));
        let class = pool.push(PoolEntry::Class { name_index: name });
        let entries = table(&[
            0x00, 0x02, //
            253, 0x00, 0x02, 4, 7, 0x00, class as u8, // append long, String
            249, 0x00, 0x01, // chop 2
        ]);
        let frames = expand(&entries, vec![FrameItem::Integer], &pool).unwrap();
        assert_eq!(
            frames[0].1.locals,
            vec![
                FrameItem::Integer,
                FrameItem::Long,
                FrameItem::Object("java/lang/String".into())
            ]
        );
        assert_eq!(frames[1].0, 4);
        assert_eq!(frames[1].1.locals, vec![FrameItem::Integer]);
    }

    #[test]
    fn test_reserved_frame_type_is_rejected() {
        assert!(StackMapTable::read(&mut Cursor::new(&[0x00, 0x01, 200][..])).is_err());
    }

    #[test]
    fn test_constructor_receiver_is_uninitialized() {
        let header = MethodHeader::new("a/B", MethodAccessFlags::PUBLIC, "<init>", "(J[I)V").unwrap();
        assert_eq!(
            initial_locals(&header),
            vec![
                FrameItem::UninitializedThis,
                FrameItem::Long,
                FrameItem::Object("[I".into())
            ]
        );
    }
}
