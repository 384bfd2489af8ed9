use std::fmt;

/// An error that can occur when declaring, reading, or writing records
#[derive(Debug)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error(Box::new(kind))
    }

    #[inline(never)]
    #[cold]
    pub(crate) fn eof() -> Error {
        Self::new(ErrorKind::Eof)
    }

    #[cold]
    pub(crate) fn unknown_type<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::UnknownType { name: name.into() })
    }

    #[cold]
    pub(crate) fn unknown_endian<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::UnknownEndian { name: name.into() })
    }

    #[cold]
    pub(crate) fn invalid_name<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::InvalidName { name: name.into() })
    }

    #[cold]
    pub(crate) fn duplicate_field<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::DuplicateField { name: name.into() })
    }

    #[cold]
    pub(crate) fn reserved_name<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::ReservedName { name: name.into() })
    }

    #[cold]
    pub(crate) fn nil_parameter<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::NilParameter { name: name.into() })
    }

    #[cold]
    pub(crate) fn missing_parameter<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::MissingParameter { name: name.into() })
    }

    #[cold]
    pub(crate) fn mutual_exclusion<T: Into<String>>(first: T, second: T) -> Error {
        Self::new(ErrorKind::MutualExclusion {
            first: first.into(),
            second: second.into(),
        })
    }

    #[cold]
    pub(crate) fn validity<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Validity { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn offset_mismatch(expected: u64, actual: u64) -> Error {
        Self::new(ErrorKind::OffsetMismatch { expected, actual })
    }

    #[cold]
    pub(crate) fn unresolved_symbol<T: Into<String>>(name: T) -> Error {
        Self::new(ErrorKind::UnresolvedSymbol { name: name.into() })
    }

    #[cold]
    pub(crate) fn unknown_choice<T: Into<String>>(key: T) -> Error {
        Self::new(ErrorKind::UnknownChoice { key: key.into() })
    }

    #[cold]
    pub(crate) fn assign<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Assign { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn message<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Message(msg.into()))
    }

    /// Return the specific type of error
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwrap this error into its underlying type
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns the byte offset at which the error occurred (if available)
    pub fn offset(&self) -> Option<u64> {
        self.0.offset()
    }
}

/// Specific type of error
#[derive(Debug)]
pub enum ErrorKind {
    /// Unexpected end of the byte stream
    Eof,

    /// An error occurred when performing IO
    Io(std::io::Error),

    /// A type name was not present in the registry
    UnknownType {
        /// The name that failed to resolve
        name: String,
    },

    /// An endian other than little or big was requested
    UnknownEndian {
        /// The offending endian designation
        name: String,
    },

    /// A declared parameter name shadows a reserved identifier
    InvalidName {
        /// The offending parameter name
        name: String,
    },

    /// Two fields in the same record share a name
    DuplicateField {
        /// The duplicated field name
        name: String,
    },

    /// A field name collides with a built-in record operation
    ReservedName {
        /// The offending field name
        name: String,
    },

    /// A parameter was supplied with a null value
    NilParameter {
        /// The parameter that was null
        name: String,
    },

    /// A mandatory parameter was omitted
    MissingParameter {
        /// The parameter that was missing
        name: String,
    },

    /// Both members of a mutually exclusive parameter pair were supplied
    MutualExclusion {
        /// First member of the pair
        first: String,
        /// Second member of the pair
        second: String,
    },

    /// A value failed a declared validity constraint
    Validity {
        /// Description of the failed constraint
        msg: String,
    },

    /// A declared offset did not match or could not be reached
    OffsetMismatch {
        /// The declared offset
        expected: u64,
        /// The position the stream was actually at
        actual: u64,
    },

    /// A symbolic reference could not be bound to any ancestor
    UnresolvedSymbol {
        /// The symbol that failed to resolve
        name: String,
    },

    /// A selection key has no matching variant
    UnknownChoice {
        /// The selection key
        key: String,
    },

    /// A snapshot could not be assigned to a node of incompatible shape
    Assign {
        /// Description of the mismatch
        msg: String,
    },

    /// A generic evaluation error
    Message(String),
}

impl ErrorKind {
    /// The byte offset where the error was encountered
    pub fn offset(&self) -> Option<u64> {
        match *self {
            ErrorKind::OffsetMismatch { actual, .. } => Some(actual),
            _ => None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self.0 {
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            ErrorKind::Eof => write!(f, "unexpected end of stream"),
            ErrorKind::Io(ref err) => write!(f, "io error: {}", err),
            ErrorKind::UnknownType { ref name } => write!(f, "unknown type: {}", name),
            ErrorKind::UnknownEndian { ref name } => {
                write!(f, "unknown endian: {} (expected little or big)", name)
            }
            ErrorKind::InvalidName { ref name } => {
                write!(f, "parameter name shadows a reserved identifier: {}", name)
            }
            ErrorKind::DuplicateField { ref name } => write!(f, "duplicate field: {}", name),
            ErrorKind::ReservedName { ref name } => {
                write!(f, "field name collides with a record operation: {}", name)
            }
            ErrorKind::NilParameter { ref name } => write!(f, "null parameter: {}", name),
            ErrorKind::MissingParameter { ref name } => {
                write!(f, "missing mandatory parameter: {}", name)
            }
            ErrorKind::MutualExclusion {
                ref first,
                ref second,
            } => write!(
                f,
                "mutually exclusive parameters both present: {} and {}",
                first, second
            ),
            ErrorKind::Validity { ref msg } => write!(f, "validity check failed: {}", msg),
            ErrorKind::OffsetMismatch { expected, actual } => write!(
                f,
                "offset mismatch: declared {} but stream was at {}",
                expected, actual
            ),
            ErrorKind::UnresolvedSymbol { ref name } => {
                write!(f, "unresolved symbol: {}", name)
            }
            ErrorKind::UnknownChoice { ref key } => {
                write!(f, "no variant matches selection: {}", key)
            }
            ErrorKind::Assign { ref msg } => write!(f, "assignment mismatch: {}", msg),
            ErrorKind::Message(ref msg) => write!(f, "{}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::eof(),
            _ => Error::new(ErrorKind::Io(error)),
        }
    }
}
