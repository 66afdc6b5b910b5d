//! Per-class decoding: the class_data block (delta-encoded member ids) and
//! the annotations directory, assembled into an owned `ClassView`.
//!
//! Decoding happens on first access per class and the result is memoized by
//! the owning `DexFile`; everything here reads through cloned cursors and
//! shared references into the immutable index tables.

use crate::dex::annotations::{
    read_annotation_set, read_annotation_set_ref_list, AnnotationsDirectory,
};
use crate::dex::cursor::Cursor;
use crate::dex::dex_file::{ClassDefItem, DexFile, NO_INDEX};
use crate::dex::encoded_values::read_encoded_array;
use crate::dex::error::DexError;
use crate::types::{AccessFlags, ClassView, FieldView, MethodView, ParameterView};

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EncodedField {
    pub field_idx: usize,
    pub access_flags: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EncodedMethod {
    pub method_idx: usize,
    pub access_flags: u32,
    pub code_off: u32,
}

/// The class_data block: four ULEB128 counts, then the member records.
/// Each of the four sublists reconstructs absolute ids from stored diffs,
/// with the running id independently reset to zero per sublist.
#[derive(Debug, Default)]
pub(crate) struct ClassDataItem {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassDataItem {
    pub(crate) fn read(cur: &mut Cursor) -> Result<ClassDataItem, DexError> {
        let static_field_size = cur.read_uleb128()?;
        let instance_field_size = cur.read_uleb128()?;
        let direct_method_size = cur.read_uleb128()?;
        let virtual_method_size = cur.read_uleb128()?;

        Ok(ClassDataItem {
            static_fields: read_fields(cur, static_field_size)?,
            instance_fields: read_fields(cur, instance_field_size)?,
            direct_methods: read_methods(cur, direct_method_size)?,
            virtual_methods: read_methods(cur, virtual_method_size)?,
        })
    }
}

fn read_fields(cur: &mut Cursor, count: u32) -> Result<Vec<EncodedField>, DexError> {
    // Each encoded_field is at least two one-byte ulebs.
    let mut fields = Vec::with_capacity(cur.table_capacity(count as usize, 2, "encoded field")?);
    let mut idx: u32 = 0;
    for _ in 0..count {
        idx = idx.wrapping_add(cur.read_uleb128()?);
        fields.push(EncodedField {
            field_idx: idx as usize,
            access_flags: cur.read_uleb128()?,
        });
    }
    Ok(fields)
}

fn read_methods(cur: &mut Cursor, count: u32) -> Result<Vec<EncodedMethod>, DexError> {
    let mut methods = Vec::with_capacity(cur.table_capacity(count as usize, 3, "encoded method")?);
    let mut idx: u32 = 0;
    for _ in 0..count {
        idx = idx.wrapping_add(cur.read_uleb128()?);
        methods.push(EncodedMethod {
            method_idx: idx as usize,
            access_flags: cur.read_uleb128()?,
            code_off: cur.read_uleb128()?,
        });
    }
    Ok(methods)
}

/// Decode one class-def into an owned view. Called once per class through
/// the memoizing cell on `DexFile`.
pub(crate) fn build_class_view(dex: &DexFile, def: &ClassDefItem) -> Result<ClassView, DexError> {
    let name = dex.type_name(def.class_idx)?.to_string();

    let super_name = if def.superclass_idx != NO_INDEX {
        Some(dex.type_name(def.superclass_idx)?.to_string())
    } else {
        None
    };

    let source_file = if def.source_file_idx != NO_INDEX {
        Some(dex.string(def.source_file_idx)?.to_string())
    } else {
        None
    };

    let mut interfaces = vec![];
    if def.interfaces_off != 0 {
        for t in dex.read_type_list(def.interfaces_off as usize)? {
            interfaces.push(dex.type_name(t)?.to_string());
        }
    }

    let directory = if def.annotations_off != 0 {
        let mut cur = dex.cursor_at(def.annotations_off as usize)?;
        AnnotationsDirectory::read(&mut cur)?
    } else {
        AnnotationsDirectory::default()
    };

    let annotations = read_annotation_set(dex, directory.class_annotations_off)?;

    let class_data = if def.class_data_off != 0 {
        let mut cur = dex.cursor_at(def.class_data_off as usize)?;
        ClassDataItem::read(&mut cur)?
    } else {
        ClassDataItem::default()
    };

    let static_values = if def.static_values_off != 0 {
        let mut cur = dex.cursor_at(def.static_values_off as usize)?;
        read_encoded_array(dex, &mut cur)?
    } else {
        vec![]
    };

    let mut fields = Vec::with_capacity(class_data.static_fields.len() + class_data.instance_fields.len());
    for (i, f) in class_data.static_fields.iter().enumerate() {
        let mut view = build_field_view(dex, &name, &directory, f)?;
        // Initializers line up positionally with the static field list.
        view.initial_value = static_values.get(i).cloned();
        fields.push(view);
    }
    for f in &class_data.instance_fields {
        fields.push(build_field_view(dex, &name, &directory, f)?);
    }

    let mut methods = Vec::with_capacity(class_data.direct_methods.len() + class_data.virtual_methods.len());
    for m in class_data.direct_methods.iter().chain(class_data.virtual_methods.iter()) {
        methods.push(build_method_view(dex, &name, &directory, m)?);
    }

    Ok(ClassView {
        name,
        super_name,
        source_file,
        modifiers: AccessFlags::from_bits_retain(def.access_flags),
        interfaces,
        fields,
        methods,
        annotations,
    })
}

fn build_field_view(
    dex: &DexFile,
    class_name: &str,
    directory: &AnnotationsDirectory,
    f: &EncodedField,
) -> Result<FieldView, DexError> {
    let item = dex.field(f.field_idx)?;
    let annotations = match directory.annotations_for_field(f.field_idx) {
        Some(off) => read_annotation_set(dex, off)?,
        None => vec![],
    };
    Ok(FieldView {
        name: dex.string(item.name_idx)?.to_string(),
        type_name: dex.type_name(item.type_idx)?.to_string(),
        modifiers: AccessFlags::from_bits_retain(f.access_flags),
        declaring_class: class_name.to_string(),
        initial_value: None,
        annotations,
    })
}

fn build_method_view(
    dex: &DexFile,
    class_name: &str,
    directory: &AnnotationsDirectory,
    m: &EncodedMethod,
) -> Result<MethodView, DexError> {
    let item = dex.method(m.method_idx)?;
    let proto = dex.proto(item.proto_idx)?;

    let param_types = if proto.parameters_off != 0 {
        dex.read_type_list(proto.parameters_off as usize)?
    } else {
        vec![]
    };

    let mut param_annotations = match directory.parameter_annotations_for_method(m.method_idx) {
        Some(off) => read_annotation_set_ref_list(dex, off)?,
        None => vec![],
    };
    // Pad so the positional zip below always finds a slot.
    param_annotations.resize_with(param_types.len().max(param_annotations.len()), Vec::new);

    let mut parameters = Vec::with_capacity(param_types.len());
    for (i, t) in param_types.iter().enumerate() {
        parameters.push(ParameterView {
            type_name: dex.type_name(*t)?.to_string(),
            annotations: std::mem::take(&mut param_annotations[i]),
        });
    }

    let annotations = match directory.annotations_for_method(m.method_idx) {
        Some(off) => read_annotation_set(dex, off)?,
        None => vec![],
    };

    Ok(MethodView {
        name: dex.string(item.name_idx)?.to_string(),
        return_type_name: dex.type_name(proto.return_type_idx)?.to_string(),
        modifiers: AccessFlags::from_bits_retain(m.access_flags),
        declaring_class: class_name.to_string(),
        parameters,
        annotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::leb::encode_uleb128;

    fn class_data_bytes(sections: &[Vec<(u32, u32, Option<u32>)>]) -> Vec<u8> {
        // sections: [static fields, instance fields, direct methods, virtual methods]
        // tuples: (diff, access_flags, code_off for methods)
        let mut buf = vec![];
        for s in sections {
            buf.extend(encode_uleb128(s.len() as u32));
        }
        for s in sections {
            for (diff, flags, code) in s {
                buf.extend(encode_uleb128(*diff));
                buf.extend(encode_uleb128(*flags));
                if let Some(c) = code {
                    buf.extend(encode_uleb128(*c));
                }
            }
        }
        buf
    }

    #[test]
    fn test_delta_encoded_field_ids() {
        // static fields: (diff=5, flags=0x1), (diff=3, flags=0x2) -> ids [5, 8]
        let buf = class_data_bytes(&[
            vec![(5, 0x1, None), (3, 0x2, None)],
            vec![],
            vec![],
            vec![],
        ]);
        let mut cur = Cursor::new(buf.into());
        let cd = ClassDataItem::read(&mut cur).expect("read failed");
        assert_eq!(cd.static_fields.len(), 2);
        assert_eq!(cd.static_fields[0].field_idx, 5);
        assert_eq!(cd.static_fields[0].access_flags, 0x1);
        assert_eq!(cd.static_fields[1].field_idx, 8);
        assert_eq!(cd.static_fields[1].access_flags, 0x2);
    }

    #[test]
    fn test_running_id_resets_per_sublist() {
        let buf = class_data_bytes(&[
            vec![(2, 0, None), (1, 0, None)],
            vec![(10, 0, None)],
            vec![(4, 0, Some(0)), (4, 0, Some(0))],
            vec![(1, 0, Some(0))],
        ]);
        let mut cur = Cursor::new(buf.into());
        let cd = ClassDataItem::read(&mut cur).expect("read failed");
        assert_eq!(cd.static_fields.iter().map(|f| f.field_idx).collect::<Vec<_>>(), vec![2, 3]);
        // Each sublist starts its accumulator from zero again.
        assert_eq!(cd.instance_fields[0].field_idx, 10);
        assert_eq!(cd.direct_methods.iter().map(|m| m.method_idx).collect::<Vec<_>>(), vec![4, 8]);
        assert_eq!(cd.virtual_methods[0].method_idx, 1);
    }

    #[test]
    fn test_huge_member_count_is_an_error() {
        // static_fields_size = u32::MAX, the other counts zero, no records.
        let buf = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x00, 0x00, 0x00];
        let mut cur = Cursor::new(buf.into());
        let e = ClassDataItem::read(&mut cur).unwrap_err();
        assert_eq!(e.kind(), crate::dex::error::ErrorKind::TruncatedRead);
    }

    #[test]
    fn test_method_records_carry_code_offset() {
        let buf = class_data_bytes(&[vec![], vec![], vec![(1, 0x8, Some(0x1234))], vec![]]);
        let mut cur = Cursor::new(buf.into());
        let cd = ClassDataItem::read(&mut cur).expect("read failed");
        assert_eq!(cd.direct_methods[0].code_off, 0x1234);
        assert_eq!(cd.direct_methods[0].access_flags, 0x8);
    }
}
