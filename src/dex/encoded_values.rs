//! The encoded_value tagged union used for annotation element values and
//! static field initializers.
//!
//! The tag byte carries the variant in its low 5 bits and `value_arg` in the
//! high 3; for the sized variants exactly `value_arg + 1` payload bytes
//! follow. String, type, field and enum references are resolved against the
//! index tables at decode time, so consumers see text rather than raw ids.

use serde::{Deserialize, Serialize};

use crate::dex::cursor::Cursor;
use crate::dex::dex_file::DexFile;
use crate::dex::error::{DexError, ErrorKind};

/// An encoded annotation: an annotation occurrence without the leading
/// visibility byte. Appears nested inside encoded values and as the payload
/// of annotation items.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EncodedAnnotation {
    pub type_name: String,
    pub elements: Vec<AnnotationElement>,
}

impl EncodedAnnotation {
    pub(crate) fn read(dex: &DexFile, cur: &mut Cursor) -> Result<EncodedAnnotation, DexError> {
        let type_idx = cur.read_uleb128()? as usize;
        let type_name = dex.type_name(type_idx)?.to_string();
        let size = cur.read_uleb128()? as usize;
        // Each element is at least a one-byte name uleb plus a tag byte.
        let mut elements = Vec::with_capacity(cur.table_capacity(size, 2, "annotation element")?);

        // Element order reflects declaration order and must be preserved.
        for _ in 0..size {
            elements.push(AnnotationElement::read(dex, cur)?);
        }

        Ok(EncodedAnnotation { type_name, elements })
    }
}

/// One named attribute of an annotation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AnnotationElement {
    pub name: String,
    pub value: EncodedValue,
}

impl AnnotationElement {
    pub(crate) fn read(dex: &DexFile, cur: &mut Cursor) -> Result<AnnotationElement, DexError> {
        let name_idx = cur.read_uleb128()? as usize;
        let name = dex.string(name_idx)?.to_string();
        let value = EncodedValue::read(dex, cur)?;
        Ok(AnnotationElement { name, value })
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Resolved string pool text.
    String(String),
    /// Resolved type descriptor.
    Type(String),
    /// Field reference rendered as `<type>!<name>`.
    Field(String),
    /// Method references are consumed but deliberately left unresolved;
    /// the raw method id is all that is kept.
    Method(u32),
    /// Enum constant reference rendered as `<type>!<name>`.
    Enum(String),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

impl EncodedValue {
    pub fn as_annotation(&self) -> Option<&EncodedAnnotation> {
        match self {
            EncodedValue::Annotation(ann) => Some(ann),
            _ => None,
        }
    }

    pub(crate) fn read(dex: &DexFile, cur: &mut Cursor) -> Result<EncodedValue, DexError> {
        let header_byte = cur.read_u8()?;
        let value_arg = header_byte >> 5;
        let value_type = header_byte & 0x1F;
        let size = (value_arg + 1) as usize;

        match value_type {
            0x00 => {
                // VALUE_BYTE is fixed width 1; value_arg carries nothing.
                check_no_arg(header_byte, value_arg)?;
                let val = cur.read_u8()? as i8;
                Ok(EncodedValue::Byte(val))
            }
            0x02 => {
                check_width(header_byte, size, 2)?;
                Ok(EncodedValue::Short(cur.read_short(size)?))
            }
            0x03 => {
                check_width(header_byte, size, 2)?;
                Ok(EncodedValue::Char(cur.read_char(size)?))
            }
            0x04 => {
                check_width(header_byte, size, 4)?;
                Ok(EncodedValue::Int(cur.read_int(size)?))
            }
            0x06 => {
                check_width(header_byte, size, 8)?;
                Ok(EncodedValue::Long(cur.read_long(size)?))
            }
            0x10 => {
                check_width(header_byte, size, 4)?;
                Ok(EncodedValue::Float(cur.read_float(size)?))
            }
            0x11 => {
                check_width(header_byte, size, 8)?;
                Ok(EncodedValue::Double(cur.read_double(size)?))
            }
            0x17 => {
                check_width(header_byte, size, 4)?;
                let idx = cur.read_raw_index(size)?;
                Ok(EncodedValue::String(dex.string(idx as usize)?.to_string()))
            }
            0x18 => {
                check_width(header_byte, size, 4)?;
                let idx = cur.read_raw_index(size)?;
                Ok(EncodedValue::Type(dex.type_name(idx as usize)?.to_string()))
            }
            0x19 => {
                check_width(header_byte, size, 4)?;
                let idx = cur.read_raw_index(size)?;
                Ok(EncodedValue::Field(dex.field_display(idx as usize)?))
            }
            0x1A => {
                // VALUE_METHOD: consume the index bytes, keep the value
                // unresolved. Decoding never fails on this variant.
                check_width(header_byte, size, 4)?;
                let idx = cur.read_raw_index(size)?;
                Ok(EncodedValue::Method(idx))
            }
            0x1B => {
                check_width(header_byte, size, 4)?;
                let idx = cur.read_raw_index(size)?;
                Ok(EncodedValue::Enum(dex.field_display(idx as usize)?))
            }
            0x1C => {
                check_no_arg(header_byte, value_arg)?;
                Ok(EncodedValue::Array(read_encoded_array(dex, cur)?))
            }
            0x1D => {
                check_no_arg(header_byte, value_arg)?;
                Ok(EncodedValue::Annotation(EncodedAnnotation::read(dex, cur)?))
            }
            0x1E => {
                check_no_arg(header_byte, value_arg)?;
                Ok(EncodedValue::Null)
            }
            0x1F => Ok(EncodedValue::Boolean(value_arg != 0)),
            _ => Err(DexError::new(
                ErrorKind::UnknownValueType,
                &format!("tag {:#04x} at {}", header_byte, cur.position()),
            )),
        }
    }
}

/// The byte, array, annotation and null tags take no `value_arg`; a nonzero
/// one marks a malformed value.
fn check_no_arg(header_byte: u8, value_arg: u8) -> Result<(), DexError> {
    if value_arg != 0 {
        fail!(UnknownValueType, "tag {:#04x} carries value_arg {}, none is allowed", header_byte, value_arg);
    }
    Ok(())
}

fn check_width(header_byte: u8, size: usize, limit: usize) -> Result<(), DexError> {
    if size > limit {
        fail!(UnknownValueType, "tag {:#04x} declares {} payload bytes, at most {} are valid", header_byte, size, limit);
    }
    Ok(())
}

impl Cursor {
    /// A `value_arg`-sized table index: LE bytes, zero-extended.
    fn read_raw_index(&mut self, size: usize) -> Result<u32, DexError> {
        let mut result: u32 = 0;
        for i in 0..size {
            result |= (self.read_u8()? as u32) << (8 * i);
        }
        Ok(result)
    }
}

pub(crate) fn read_encoded_array(dex: &DexFile, cur: &mut Cursor) -> Result<Vec<EncodedValue>, DexError> {
    let size = cur.read_uleb128()? as usize;
    let mut values = Vec::with_capacity(size.min(1024));
    for _ in 0..size {
        values.push(EncodedValue::read(dex, cur)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::dex_file::tests::tiny_dex;

    fn decode(dex: &DexFile, bytes: &[u8]) -> Result<EncodedValue, DexError> {
        let mut cur = Cursor::new(bytes.to_vec().into());
        EncodedValue::read(dex, &mut cur)
    }

    fn decode_ok(dex: &DexFile, bytes: &[u8]) -> (EncodedValue, usize) {
        let mut cur = Cursor::new(bytes.to_vec().into());
        let v = EncodedValue::read(dex, &mut cur).expect("decode failed");
        (v, cur.position())
    }

    #[test]
    fn test_encoded_value_byte() {
        let dex = tiny_dex();
        let (v, used) = decode_ok(&dex, &[0x00, 0x7F]);
        assert_eq!(v, EncodedValue::Byte(127));
        assert_eq!(used, 2);

        let (v, _) = decode_ok(&dex, &[0x00, 0xFF]);
        assert_eq!(v, EncodedValue::Byte(-1));
    }

    #[test]
    fn test_encoded_value_short_sign_extended() {
        let dex = tiny_dex();
        let (v, used) = decode_ok(&dex, &[0x02, 0x80]);
        assert_eq!(v, EncodedValue::Short(-128));
        assert_eq!(used, 2);

        let (v, used) = decode_ok(&dex, &[0x22, 0x34, 0x12]);
        assert_eq!(v, EncodedValue::Short(0x1234));
        assert_eq!(used, 3);
    }

    #[test]
    fn test_encoded_value_char_zero_extended() {
        let dex = tiny_dex();
        let (v, _) = decode_ok(&dex, &[0x03, 0x80]);
        assert_eq!(v, EncodedValue::Char(0x0080));
    }

    #[test]
    fn test_encoded_value_int_width() {
        let dex = tiny_dex();
        // VALUE_INT with value_arg=3: exactly 4 payload bytes.
        let (v, used) = decode_ok(&dex, &[0x04 | (0x03 << 5), 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(v, EncodedValue::Int(1));
        assert_eq!(used, 5);

        let (v, used) = decode_ok(&dex, &[0x04, 0xFE]);
        assert_eq!(v, EncodedValue::Int(-2));
        assert_eq!(used, 2);
    }

    #[test]
    fn test_encoded_value_long() {
        let dex = tiny_dex();
        let (v, used) = decode_ok(&dex, &[0x06 | (7 << 5), 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(v, EncodedValue::Long(0x0807060504030201));
        assert_eq!(used, 9);

        let (v, _) = decode_ok(&dex, &[0x06, 0xFF]);
        assert_eq!(v, EncodedValue::Long(-1));
    }

    #[test]
    fn test_encoded_value_float_zero_extension() {
        let dex = tiny_dex();
        // 1.0f stored as its two significant bytes.
        let (v, used) = decode_ok(&dex, &[0x10 | (1 << 5), 0x80, 0x3F]);
        assert_eq!(v, EncodedValue::Float(1.0));
        assert_eq!(used, 3);

        let (v, _) = decode_ok(&dex, &[0x11, 0x40]);
        assert_eq!(v, EncodedValue::Double(2.0));
    }

    #[test]
    fn test_encoded_value_refs_resolved() {
        let dex = tiny_dex();
        // tiny_dex strings: 0 = "Ab", 1 = "Cd", 2 = "LFoo;", 3 = "bar", 4 = "I"
        let (v, _) = decode_ok(&dex, &[0x17, 0x00]);
        assert_eq!(v, EncodedValue::String("Ab".to_string()));

        // type 0 resolves through the type table to "LFoo;"
        let (v, _) = decode_ok(&dex, &[0x18, 0x00]);
        assert_eq!(v, EncodedValue::Type("LFoo;".to_string()));

        // field 0 is bar:I defined on LFoo;
        let (v, _) = decode_ok(&dex, &[0x19, 0x00]);
        assert_eq!(v, EncodedValue::Field("I!bar".to_string()));
        let (v, _) = decode_ok(&dex, &[0x1B, 0x00]);
        assert_eq!(v, EncodedValue::Enum("I!bar".to_string()));
    }

    #[test]
    fn test_encoded_value_ref_out_of_range() {
        let dex = tiny_dex();
        let e = decode(&dex, &[0x17, 0x7F]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_encoded_value_method_placeholder() {
        let dex = tiny_dex();
        // A method index far beyond the table still decodes: the index is
        // consumed and kept raw, never resolved.
        let (v, used) = decode_ok(&dex, &[0x1A | (1 << 5), 0x39, 0x30]);
        assert_eq!(v, EncodedValue::Method(0x3039));
        assert_eq!(used, 3);
    }

    #[test]
    fn test_encoded_value_array_nested() {
        let dex = tiny_dex();
        // [ true, null, int 5 ]
        let (v, used) = decode_ok(&dex, &[0x1C, 0x03, 0x1F | (1 << 5), 0x1E, 0x04, 0x05]);
        assert_eq!(
            v,
            EncodedValue::Array(vec![
                EncodedValue::Boolean(true),
                EncodedValue::Null,
                EncodedValue::Int(5),
            ])
        );
        assert_eq!(used, 6);
    }

    #[test]
    fn test_encoded_value_nested_annotation() {
        let dex = tiny_dex();
        // annotation: type_idx=0 ("LFoo;"), one element name_idx=3 ("bar") -> null
        let (v, _) = decode_ok(&dex, &[0x1D, 0x00, 0x01, 0x03, 0x1E]);
        match v {
            EncodedValue::Annotation(ann) => {
                assert_eq!(ann.type_name, "LFoo;");
                assert_eq!(ann.elements.len(), 1);
                assert_eq!(ann.elements[0].name, "bar");
                assert_eq!(ann.elements[0].value, EncodedValue::Null);
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_encoded_value_null_and_booleans() {
        let dex = tiny_dex();
        let (v, used) = decode_ok(&dex, &[0x1E]);
        assert_eq!(v, EncodedValue::Null);
        assert_eq!(used, 1);

        // Booleans live entirely in value_arg: no payload bytes at all.
        let (v, used) = decode_ok(&dex, &[0x1F | (1 << 5)]);
        assert_eq!(v, EncodedValue::Boolean(true));
        assert_eq!(used, 1);

        let (v, used) = decode_ok(&dex, &[0x1F]);
        assert_eq!(v, EncodedValue::Boolean(false));
        assert_eq!(used, 1);
    }

    #[test]
    fn test_encoded_value_unknown_tag() {
        let dex = tiny_dex();
        let e = decode(&dex, &[0x05]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::UnknownValueType);
    }

    #[test]
    fn test_encoded_value_nonzero_arg_on_argless_tags_rejected() {
        let dex = tiny_dex();
        // NULL, ARRAY, ANNOTATION and BYTE take no value_arg at all.
        for tag in [0x1E, 0x1C, 0x1D, 0x00] {
            let e = decode(&dex, &[tag | (1 << 5), 0x00, 0x00]).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::UnknownValueType, "tag {:#04x}", tag);
        }
    }

    #[test]
    fn test_encoded_value_overwide_payload_rejected() {
        let dex = tiny_dex();
        // VALUE_SHORT claiming 3 payload bytes.
        let e = decode(&dex, &[0x02 | (2 << 5), 0x01, 0x02, 0x03]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::UnknownValueType);
    }
}
