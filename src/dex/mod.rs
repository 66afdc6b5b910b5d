#[macro_use]
pub mod error;

pub mod cursor;
pub(crate) mod leb;
pub mod dex_file;
pub(crate) mod class;
pub(crate) mod annotations;
pub mod encoded_values;
