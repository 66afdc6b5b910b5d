/* Public model: access flags, annotation visibility and the owned view
   structs produced by class decoding. */

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::dex::encoded_values::{AnnotationElement, EncodedValue};

bitflags! {
    /// Member and class access flags, straight from the container format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl Serialize for AccessFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for AccessFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(AccessFlags::from_bits_retain(u32::deserialize(deserializer)?))
    }
}

/// At which lifecycle stage an annotation is retained: build-only,
/// runtime-visible or reserved for system use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Build,
    Runtime,
    System,
}

impl Visibility {
    pub fn to_str(&self) -> &str {
        match self {
            Self::Build => "build",
            Self::Runtime => "runtime",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// One annotation occurrence. Attribute order is declaration order from the
/// file and is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationView {
    pub visibility: Visibility,
    pub type_name: String,
    pub attributes: Vec<AnnotationElement>,
}

/// A decoded class: owned, fully resolved, memoized by the owning
/// `DexFile`. Type names are the raw JNI descriptors as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassView {
    pub name: String,
    pub super_name: Option<String>,
    pub source_file: Option<String>,
    pub modifiers: AccessFlags,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldView>,
    pub methods: Vec<MethodView>,
    pub annotations: Vec<AnnotationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldView {
    pub name: String,
    pub type_name: String,
    pub modifiers: AccessFlags,
    pub declaring_class: String,
    /// For static fields, the positional entry from the class's
    /// static-value initializer array, if one exists.
    pub initial_value: Option<EncodedValue>,
    pub annotations: Vec<AnnotationView>,
}

impl FieldView {
    pub fn is_enum_constant(&self) -> bool {
        self.modifiers.contains(AccessFlags::ENUM)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodView {
    pub name: String,
    pub return_type_name: String,
    pub modifiers: AccessFlags,
    pub declaring_class: String,
    pub parameters: Vec<ParameterView>,
    pub annotations: Vec<AnnotationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterView {
    pub type_name: String,
    pub annotations: Vec<AnnotationView>,
}
