use std::fmt;

/// Build and return a `DexError` in one go.
#[macro_export]
macro_rules! fail {
    ($kind:ident, $msg:literal) => {
        return Err(DexError::new(ErrorKind::$kind, $msg))
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::new(ErrorKind::$kind, &format!($fmtstr, $($args)*)))
    };
}

/// The stage of decoding that failed. Every kind is fatal for the structure
/// being decoded: there is no partial result and no silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The 8-byte magic did not match the expected DEX signature.
    InvalidMagic,
    /// The endian tag was not the little-endian constant.
    UnsupportedEndianness,
    /// A read ran past the end of the backing buffer.
    TruncatedRead,
    /// A string/type/proto/field/method index exceeded its table size.
    IndexOutOfRange,
    /// An encoded value carried an unrecognized tag byte.
    UnknownValueType,
    /// An annotation carried an unrecognized visibility byte.
    UnknownVisibility,
    /// A ULEB128 had no terminating byte within the 5-byte cap.
    MalformedUleb128,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidMagic => "invalid magic",
            ErrorKind::UnsupportedEndianness => "unsupported endianness",
            ErrorKind::TruncatedRead => "truncated read",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::UnknownValueType => "unknown encoded value type",
            ErrorKind::UnknownVisibility => "unknown annotation visibility",
            ErrorKind::MalformedUleb128 => "malformed uleb128",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DexError {
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl DexError {
    pub(crate) fn new(kind: ErrorKind, msg: &str) -> Self {
        DexError {
            kind,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError { kind: base.kind, msg: base.msg, contexts }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for DexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_contexts() {
        let base = DexError::new(ErrorKind::TruncatedRead, "wanted 4 bytes at 10");
        let e = DexError::with_context(base, "string pool entry 3".to_string());
        let s = format!("{}", e);
        assert!(s.starts_with("truncated read: wanted 4 bytes at 10"));
        assert!(s.contains("for string pool entry 3"));
        assert_eq!(e.kind(), ErrorKind::TruncatedRead);
    }
}
