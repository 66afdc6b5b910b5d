/* DEX container structures: header, index tables, class definitions */

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use once_cell::sync::OnceCell;

use crate::dex::class::build_class_view;
use crate::dex::cursor::Cursor;
use crate::dex::error::{DexError, ErrorKind};
use crate::types::ClassView;

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 8] = [0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x39, 0x00];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const NO_INDEX: usize = 0xffffffff;

pub(crate) type StringId = usize;
pub(crate) type TypeId = usize;
pub(crate) type ProtoId = usize;

/// The proto_id_item struct. Parameter type lists are resolved lazily from
/// the recorded offset; a zero offset means no parameters.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ProtoItem {
    pub shorty_idx: StringId,
    pub return_type_idx: TypeId,
    pub parameters_off: u32,
}

/// The field_id_item struct. The class and type indices are stored as
/// 2-byte fields, the name index as 4 bytes.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FieldItem {
    pub class_idx: TypeId,
    pub type_idx: TypeId,
    pub name_idx: StringId,
}

impl FieldItem {
    fn read(cur: &mut Cursor) -> Result<FieldItem, DexError> {
        Ok(FieldItem {
            class_idx: cur.read_u16()? as TypeId,
            type_idx: cur.read_u16()? as TypeId,
            name_idx: cur.read_u32()? as StringId,
        })
    }
}

/// The method_id_item struct: identical layout to field_id_item with the
/// proto index in place of the field type.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MethodItem {
    pub class_idx: TypeId,
    pub proto_idx: ProtoId,
    pub name_idx: StringId,
}

impl MethodItem {
    fn read(cur: &mut Cursor) -> Result<MethodItem, DexError> {
        Ok(MethodItem {
            class_idx: cur.read_u16()? as TypeId,
            proto_idx: cur.read_u16()? as ProtoId,
            name_idx: cur.read_u32()? as StringId,
        })
    }
}

/// The class_def_item struct. All substructure offsets are kept raw here;
/// 0 means the section is absent. Decoding happens lazily per class.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ClassDefItem {
    pub class_idx: TypeId,
    pub access_flags: u32,
    pub superclass_idx: TypeId,
    pub interfaces_off: u32,
    pub source_file_idx: StringId,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl ClassDefItem {
    fn read(cur: &mut Cursor) -> Result<ClassDefItem, DexError> {
        Ok(ClassDefItem {
            class_idx: cur.read_u32()? as TypeId,
            access_flags: cur.read_u32()?,
            superclass_idx: cur.read_u32()? as TypeId,
            interfaces_off: cur.read_u32()?,
            source_file_idx: cur.read_u32()? as StringId,
            annotations_off: cur.read_u32()?,
            class_data_off: cur.read_u32()?,
            static_values_off: cur.read_u32()?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header {
    pub(crate) fn read(cur: &mut Cursor) -> Result<Header, DexError> {
        let magic_bytes = cur.read_bytes(8).map_err(|e| {
            DexError::with_context(e, "header magic".to_string())
        })?;
        let magic = <[u8; 8]>::try_from(magic_bytes.as_slice()).unwrap();
        // "dex\n###\0" with ASCII digits for the version.
        if magic[0..4] != DEX_FILE_MAGIC[0..4]
            || !magic[4].is_ascii_digit()
            || !magic[5].is_ascii_digit()
            || !magic[6].is_ascii_digit()
            || magic[7] != 0
        {
            fail!(InvalidMagic, "magic {:02x?}", magic);
        }

        // Checksum and signature are pass-through: retained, never verified.
        let checksum = cur.read_u32()?;
        let signature = <[u8; 20]>::try_from(cur.read_bytes(20)?.as_slice()).unwrap();
        let file_size = cur.read_u32()?;
        let header_size = cur.read_u32()?;

        let endian_tag = cur.read_u32()?;
        if endian_tag != ENDIAN_CONSTANT {
            if endian_tag == REVERSE_ENDIAN_CONSTANT {
                fail!(UnsupportedEndianness, "big-endian files are not supported");
            }
            fail!(UnsupportedEndianness, "endian tag {:#010x}", endian_tag);
        }

        Ok(Header {
            magic,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size: cur.read_u32()?,
            link_off: cur.read_u32()?,
            map_off: cur.read_u32()?,
            string_ids_size: cur.read_u32()?,
            string_ids_off: cur.read_u32()?,
            type_ids_size: cur.read_u32()?,
            type_ids_off: cur.read_u32()?,
            proto_ids_size: cur.read_u32()?,
            proto_ids_off: cur.read_u32()?,
            field_ids_size: cur.read_u32()?,
            field_ids_off: cur.read_u32()?,
            method_ids_size: cur.read_u32()?,
            method_ids_off: cur.read_u32()?,
            class_defs_size: cur.read_u32()?,
            class_defs_off: cur.read_u32()?,
            data_size: cur.read_u32()?,
            data_off: cur.read_u32()?,
        })
    }
}

/// A loaded DEX file: the immutable index tables plus a retained cursor for
/// all later lazy decoding. Table construction is all-or-nothing; class
/// views are decoded on first access and memoized.
#[derive(Debug)]
pub struct DexFile {
    cursor: Cursor,
    pub header: Header,
    strings: Vec<String>,
    types: Vec<StringId>,
    protos: Vec<ProtoItem>,
    fields: Vec<FieldItem>,
    methods: Vec<MethodItem>,
    class_defs: Vec<ClassDefItem>,
    class_views: Vec<OnceCell<ClassView>>,
}

impl DexFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<DexFile, DexError> {
        DexFile::read(Arc::from(bytes))
    }

    pub fn from_file(path: &Path) -> Result<DexFile, DexError> {
        let bytes = fs::read(path)
            .map_err(|e| DexError::new(ErrorKind::TruncatedRead, &format!("io error: {}", e)))?;
        DexFile::read(bytes.into())
    }

    fn read(data: Arc<[u8]>) -> Result<DexFile, DexError> {
        let mut cursor = Cursor::new(data);
        let header = Header::read(&mut cursor)?;

        // String pool: two-level indirection. Each string id is an absolute
        // offset to a ULEB128 byte length followed by the raw data.
        cursor.seek(header.string_ids_off as usize)?;
        let cap = cursor.table_capacity(header.string_ids_size as usize, 4, "string id")?;
        let mut strings = Vec::with_capacity(cap);
        for i in 0..header.string_ids_size {
            let data_off = cursor.read_u32()? as usize;
            let mut sc = cursor.clone_at(data_off).map_err(|e| {
                DexError::with_context(e, format!("string data offset of string {}", i))
            })?;
            let len = sc.read_uleb128()? as usize;
            let raw = sc.read_bytes(len)?;
            let text = match cesu8::from_java_cesu8(&raw) {
                Ok(s) => s.into_owned(),
                Err(_) => {
                    warn!("[dexfile] string {} is not valid MUTF-8, decoding lossily", i);
                    String::from_utf8_lossy(&raw).into_owned()
                }
            };
            strings.push(text);
        }

        // Type ids: string pool indices.
        cursor.seek(header.type_ids_off as usize)?;
        let cap = cursor.table_capacity(header.type_ids_size as usize, 4, "type id")?;
        let mut types = Vec::with_capacity(cap);
        for i in 0..header.type_ids_size {
            let string_idx = cursor.read_u32()? as usize;
            if string_idx >= strings.len() {
                fail!(IndexOutOfRange, "type {} names string {} of {}", i, string_idx, strings.len());
            }
            types.push(string_idx);
        }

        // Proto ids: shorty, return type, parameter list offset.
        cursor.seek(header.proto_ids_off as usize)?;
        let cap = cursor.table_capacity(header.proto_ids_size as usize, 12, "proto id")?;
        let mut protos = Vec::with_capacity(cap);
        for i in 0..header.proto_ids_size {
            let p = ProtoItem {
                shorty_idx: cursor.read_u32()? as StringId,
                return_type_idx: cursor.read_u32()? as TypeId,
                parameters_off: cursor.read_u32()?,
            };
            if p.shorty_idx >= strings.len() || p.return_type_idx >= types.len() {
                fail!(IndexOutOfRange, "proto {} references out-of-range ids", i);
            }
            protos.push(p);
        }

        cursor.seek(header.field_ids_off as usize)?;
        let cap = cursor.table_capacity(header.field_ids_size as usize, 8, "field id")?;
        let mut fields = Vec::with_capacity(cap);
        for i in 0..header.field_ids_size {
            let f = FieldItem::read(&mut cursor)?;
            if f.class_idx >= types.len() || f.type_idx >= types.len() || f.name_idx >= strings.len() {
                fail!(IndexOutOfRange, "field {} references out-of-range ids", i);
            }
            fields.push(f);
        }

        cursor.seek(header.method_ids_off as usize)?;
        let cap = cursor.table_capacity(header.method_ids_size as usize, 8, "method id")?;
        let mut methods = Vec::with_capacity(cap);
        for i in 0..header.method_ids_size {
            let m = MethodItem::read(&mut cursor)?;
            if m.class_idx >= types.len() || m.proto_idx >= protos.len() || m.name_idx >= strings.len() {
                fail!(IndexOutOfRange, "method {} references out-of-range ids", i);
            }
            methods.push(m);
        }

        cursor.seek(header.class_defs_off as usize)?;
        let cap = cursor.table_capacity(header.class_defs_size as usize, 32, "class def")?;
        let mut class_defs = Vec::with_capacity(cap);
        for i in 0..header.class_defs_size {
            let c = ClassDefItem::read(&mut cursor)?;
            if c.class_idx >= types.len()
                || (c.superclass_idx != NO_INDEX && c.superclass_idx >= types.len())
                || (c.source_file_idx != NO_INDEX && c.source_file_idx >= strings.len())
            {
                fail!(IndexOutOfRange, "class def {} references out-of-range ids", i);
            }
            class_defs.push(c);
        }

        debug!(
            "[dexfile] loaded: {} strings, {} types, {} protos, {} fields, {} methods, {} classes",
            strings.len(), types.len(), protos.len(), fields.len(), methods.len(), class_defs.len()
        );

        let class_views = (0..class_defs.len()).map(|_| OnceCell::new()).collect();

        Ok(DexFile {
            cursor,
            header,
            strings,
            types,
            protos,
            fields,
            methods,
            class_defs,
            class_views,
        })
    }

    /// The decoded string pool in string-id order.
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn class_count(&self) -> usize {
        self.class_defs.len()
    }

    /// The numeric DEX version from the header magic, e.g. 35, 39, 41.
    pub fn dex_version(&self) -> u32 {
        let m = &self.header.magic;
        ((m[4] - b'0') as u32) * 100 + ((m[5] - b'0') as u32) * 10 + ((m[6] - b'0') as u32)
    }

    /// All defined classes, in class-def table order. Each class is decoded
    /// at most once; repeated calls return the same memoized views.
    pub fn defined_classes(&self) -> Result<Vec<&ClassView>, DexError> {
        (0..self.class_defs.len()).map(|i| self.class_view(i)).collect()
    }

    /// The decoded view of class-def `index`, memoized on first access.
    /// A failed decode leaves the memo empty and is reported to the caller.
    pub fn class_view(&self, index: usize) -> Result<&ClassView, DexError> {
        let def = self.class_defs.get(index).ok_or_else(|| {
            DexError::new(
                ErrorKind::IndexOutOfRange,
                &format!("class def {} of {}", index, self.class_defs.len()),
            )
        })?;
        self.class_views[index].get_or_try_init(|| {
            build_class_view(self, def).map_err(|e| {
                DexError::with_context(e, format!("class def {}", index))
            })
        })
    }

    pub(crate) fn cursor_at(&self, offset: usize) -> Result<Cursor, DexError> {
        self.cursor.clone_at(offset)
    }

    pub(crate) fn string(&self, idx: StringId) -> Result<&str, DexError> {
        self.strings.get(idx).map(|s| s.as_str()).ok_or_else(|| {
            DexError::new(ErrorKind::IndexOutOfRange, &format!("string {} of {}", idx, self.strings.len()))
        })
    }

    pub(crate) fn type_name(&self, idx: TypeId) -> Result<&str, DexError> {
        let string_idx = *self.types.get(idx).ok_or_else(|| {
            DexError::new(ErrorKind::IndexOutOfRange, &format!("type {} of {}", idx, self.types.len()))
        })?;
        self.string(string_idx)
    }

    pub(crate) fn proto(&self, idx: ProtoId) -> Result<&ProtoItem, DexError> {
        self.protos.get(idx).ok_or_else(|| {
            DexError::new(ErrorKind::IndexOutOfRange, &format!("proto {} of {}", idx, self.protos.len()))
        })
    }

    pub(crate) fn field(&self, idx: usize) -> Result<&FieldItem, DexError> {
        self.fields.get(idx).ok_or_else(|| {
            DexError::new(ErrorKind::IndexOutOfRange, &format!("field {} of {}", idx, self.fields.len()))
        })
    }

    pub(crate) fn method(&self, idx: usize) -> Result<&MethodItem, DexError> {
        self.methods.get(idx).ok_or_else(|| {
            DexError::new(ErrorKind::IndexOutOfRange, &format!("method {} of {}", idx, self.methods.len()))
        })
    }

    /// `<type>!<name>` for a field id, as used by field and enum constant
    /// references inside encoded values.
    pub(crate) fn field_display(&self, idx: usize) -> Result<String, DexError> {
        let f = self.field(idx)?;
        Ok(format!("{}!{}", self.type_name(f.type_idx)?, self.string(f.name_idx)?))
    }

    /// type_list: a u32 count followed by that many u16 type indices.
    pub(crate) fn read_type_list(&self, offset: usize) -> Result<Vec<TypeId>, DexError> {
        let mut cur = self.cursor_at(offset)?;
        let size = cur.read_u32()? as usize;
        let mut v = Vec::with_capacity(cur.table_capacity(size, 2, "type list")?);
        for _ in 0..size {
            let t = cur.read_u16()? as TypeId;
            if t >= self.types.len() {
                fail!(IndexOutOfRange, "type list entry {} of {}", t, self.types.len());
            }
            v.push(t);
        }
        Ok(v)
    }
}
