//! # dexview
//!
//! A read-only decoder for the Android DEX class container format.
//!
//! The whole file is loaded into one immutable buffer; the header and the
//! five index tables (strings, types, prototypes, field refs, method refs)
//! are materialized once, and each class definition is decoded lazily into
//! an owned [`ClassView`] on first access.
//!
//! ```no_run
//! use std::path::Path;
//! use dexview::DexFile;
//!
//! let dex = DexFile::from_file(Path::new("classes.dex")).unwrap();
//! for class in dex.defined_classes().unwrap() {
//!     println!("{} ({} methods)", class.name, class.methods.len());
//! }
//! ```

pub mod dex;
pub mod types;

pub use dex::dex_file::DexFile;
pub use dex::encoded_values::{AnnotationElement, EncodedAnnotation, EncodedValue};
pub use dex::error::{DexError, ErrorKind};
pub use types::{
    AccessFlags, AnnotationView, ClassView, FieldView, MethodView, ParameterView, Visibility,
};
