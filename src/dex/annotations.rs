//! Annotation structures: annotation items, annotation sets, set-ref lists
//! and the per-class annotations directory.
//!
//! A directory maps field/method ids to annotation-set offsets; parameter
//! annotations are keyed by method id and fan out to one set per parameter
//! through a set-ref list. A zero offset anywhere means "absent".

use log::warn;

use crate::dex::cursor::Cursor;
use crate::dex::dex_file::DexFile;
use crate::dex::encoded_values::EncodedAnnotation;
use crate::dex::error::{DexError, ErrorKind};
use crate::types::{AnnotationView, Visibility};

pub(crate) const VISIBILITY_BUILD: u8 = 0x00;
pub(crate) const VISIBILITY_RUNTIME: u8 = 0x01;
pub(crate) const VISIBILITY_SYSTEM: u8 = 0x02;

/// One annotation occurrence: a visibility byte followed by an encoded
/// annotation.
pub(crate) fn read_annotation_item(dex: &DexFile, cur: &mut Cursor) -> Result<AnnotationView, DexError> {
    let vis_byte = cur.read_u8()?;
    let visibility = match vis_byte {
        VISIBILITY_BUILD => Visibility::Build,
        VISIBILITY_RUNTIME => Visibility::Runtime,
        VISIBILITY_SYSTEM => Visibility::System,
        other => {
            return Err(DexError::new(
                ErrorKind::UnknownVisibility,
                &format!("visibility byte {:#04x} at {}", other, cur.position()),
            ))
        }
    };
    let annotation = EncodedAnnotation::read(dex, cur)?;
    Ok(AnnotationView {
        visibility,
        type_name: annotation.type_name,
        attributes: annotation.elements,
    })
}

/// annotation_set_item: a u32 count followed by that many absolute offsets
/// to annotation items. Decodes every item in the set.
pub(crate) fn read_annotation_set(dex: &DexFile, off: u32) -> Result<Vec<AnnotationView>, DexError> {
    if off == 0 {
        return Ok(vec![]);
    }
    let mut cur = dex.cursor_at(off as usize)?;
    let size = cur.read_u32()? as usize;
    let mut entries = Vec::with_capacity(cur.table_capacity(size, 4, "annotation set")?);
    for _ in 0..size {
        entries.push(cur.read_u32()?);
    }

    let mut items = Vec::with_capacity(entries.len());
    for entry_off in entries {
        if entry_off == 0 {
            warn!("[annotations] zero entry offset in set at {:#x}", off);
            continue;
        }
        let mut item_cur = dex.cursor_at(entry_off as usize)?;
        items.push(read_annotation_item(dex, &mut item_cur)?);
    }
    Ok(items)
}

/// annotation_set_ref_list: a u32 count followed by one annotation-set
/// offset per method parameter (0 = no annotations on that parameter).
pub(crate) fn read_annotation_set_ref_list(
    dex: &DexFile,
    off: u32,
) -> Result<Vec<Vec<AnnotationView>>, DexError> {
    if off == 0 {
        return Ok(vec![]);
    }
    let mut cur = dex.cursor_at(off as usize)?;
    let size = cur.read_u32()? as usize;
    let mut set_offsets = Vec::with_capacity(cur.table_capacity(size, 4, "set ref list")?);
    for _ in 0..size {
        set_offsets.push(cur.read_u32()?);
    }

    let mut per_param = Vec::with_capacity(set_offsets.len());
    for set_off in set_offsets {
        per_param.push(read_annotation_set(dex, set_off)?);
    }
    Ok(per_param)
}

/// field_annotations_item / method_annotations_item / parameter_annotations_item
/// all share this shape: a member id plus an offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberAnnotations {
    pub member_idx: u32,
    pub annotations_off: u32,
}

impl MemberAnnotations {
    fn read(cur: &mut Cursor) -> Result<MemberAnnotations, DexError> {
        Ok(MemberAnnotations {
            member_idx: cur.read_u32()?,
            annotations_off: cur.read_u32()?,
        })
    }
}

/// annotations_directory_item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct AnnotationsDirectory {
    pub class_annotations_off: u32,
    /// Keyed by field id.
    pub field_annotations: Vec<MemberAnnotations>,
    /// Keyed by method id.
    pub method_annotations: Vec<MemberAnnotations>,
    /// Keyed by method id; the offset points at a set-ref list.
    pub parameter_annotations: Vec<MemberAnnotations>,
}

impl AnnotationsDirectory {
    pub(crate) fn read(cur: &mut Cursor) -> Result<AnnotationsDirectory, DexError> {
        let class_annotations_off = cur.read_u32()?;
        let fields_size = cur.read_u32()? as usize;
        let annotated_methods_size = cur.read_u32()? as usize;
        let annotated_parameters_size = cur.read_u32()? as usize;

        let mut field_annotations =
            Vec::with_capacity(cur.table_capacity(fields_size, 8, "field annotations")?);
        for _ in 0..fields_size {
            field_annotations.push(MemberAnnotations::read(cur)?);
        }

        let mut method_annotations =
            Vec::with_capacity(cur.table_capacity(annotated_methods_size, 8, "method annotations")?);
        for _ in 0..annotated_methods_size {
            method_annotations.push(MemberAnnotations::read(cur)?);
        }

        let mut parameter_annotations =
            Vec::with_capacity(cur.table_capacity(annotated_parameters_size, 8, "parameter annotations")?);
        for _ in 0..annotated_parameters_size {
            parameter_annotations.push(MemberAnnotations::read(cur)?);
        }

        Ok(AnnotationsDirectory {
            class_annotations_off,
            field_annotations,
            method_annotations,
            parameter_annotations,
        })
    }

    pub(crate) fn annotations_for_field(&self, field_idx: usize) -> Option<u32> {
        self.field_annotations
            .iter()
            .find(|fa| fa.member_idx as usize == field_idx)
            .map(|fa| fa.annotations_off)
    }

    pub(crate) fn annotations_for_method(&self, method_idx: usize) -> Option<u32> {
        self.method_annotations
            .iter()
            .find(|ma| ma.member_idx as usize == method_idx)
            .map(|ma| ma.annotations_off)
    }

    pub(crate) fn parameter_annotations_for_method(&self, method_idx: usize) -> Option<u32> {
        self.parameter_annotations
            .iter()
            .find(|pa| pa.member_idx as usize == method_idx)
            .map(|pa| pa.annotations_off)
    }
}
