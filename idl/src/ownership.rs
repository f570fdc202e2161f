//! Lifecycle rules for values of basic types crossing an invocation boundary.

use crate::types::BasicTypeTag;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ownership {
    /// The value is a reference-counted handle rather than a plain value.
    pub is_refcounted: bool,
    /// Ownership moves into the invocation once the value was attached to an outgoing message.
    pub is_consumed_on_send: bool,
    /// The handle belongs to the transport runtime (`sys_release`) instead of the RPC layer
    /// (`spooky_release`).
    pub is_foreign_runtime_owned: bool,
}

impl Ownership {
    const VALUE: Self = Self {
        is_refcounted: false,
        is_consumed_on_send: false,
        is_foreign_runtime_owned: false,
    };

    /// The runtime function that drops one reference, if the value is reference-counted at all.
    pub const fn release_function(self) -> Option<&'static str> {
        match (self.is_refcounted, self.is_foreign_runtime_owned) {
            (false, _) => None,
            (true, true) => Some("sys_release"),
            (true, false) => Some("spooky_release"),
        }
    }
}

pub const fn classify(tag: BasicTypeTag) -> Ownership {
    use BasicTypeTag::*;
    match tag {
        U8 | U16 | U32 | U64 | I8 | I16 | I32 | I64 | Bool | F32 | F64 => Ownership::VALUE,
        Data | Proxy => Ownership {
            is_refcounted: true,
            is_consumed_on_send: false,
            is_foreign_runtime_owned: false,
        },
        Channel | ServerChannel => Ownership {
            is_refcounted: true,
            is_consumed_on_send: true,
            is_foreign_runtime_owned: true,
        },
    }
}
