use thiserror::Error;

use crate::syntax::Location;

/// Fatal diagnostics of one compilation. None of them can be recovered from; the caller is
/// expected to report the error and emit nothing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdlError {
    #[error("syntax error at {location}: {message}")]
    Syntax { location: Location, message: String },

    #[error("duplicate name {name:?} at {location}")]
    DuplicateName { name: String, location: Location },

    #[error("{name:?} at {location} is not a valid C identifier")]
    InvalidName { name: String, location: Location },

    #[error("{name:?} at {location} is reserved for generated code")]
    ReservedName { name: String, location: Location },

    #[error("undefined type {name:?} at {location}")]
    UndefinedType { name: String, location: Location },

    #[error("duplicate `{directive}` directive at {location}")]
    DuplicateDirective {
        directive: &'static str,
        location: Location,
    },

    #[error("invalid realm {name:?} at {location} (expected children, parent, local or global)")]
    InvalidRealm { name: String, location: Location },

    #[error("root interface {name:?} named at {location} is never declared")]
    UndefinedInterface { name: String, location: Location },
}
