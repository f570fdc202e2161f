//! Semantic declarations of a compilation unit.
//!
//! Every type position keeps both its spelling ([`TypeExpr`]) for the public header and the id of
//! the interned structural type for everything that only cares about shape.

use crate::registry::TypeId;
use crate::types::{BasicTypeTag, Decorations, Direction};

/// Naming scope used to resolve a server name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Realm {
    Invalid,
    Children,
    Parent,
    Local,
    Global,
}

impl Realm {
    /// Parses the realm word of a `server_realm` directive. `Invalid` cannot be spelled.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "children" => Some(Self::Children),
            "parent" => Some(Self::Parent),
            "local" => Some(Self::Local),
            "global" => Some(Self::Global),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Children => "children",
            Self::Parent => "parent",
            Self::Local => "local",
            Self::Global => "global",
        }
    }

    /// The realm a client looks in to reach a server that registered itself in `self`.
    pub const fn client_default(self) -> Self {
        match self {
            Self::Children => Self::Parent,
            Self::Parent => Self::Children,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Basic(BasicTypeTag),
    /// A declared structure, by the name used at this position
    Structure(String),
    Function(FunctionSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub decorations: Decorations,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub direction: Direction,
    pub type_: TypeExpr,
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub type_: TypeExpr,
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub name: String,
    pub members: Vec<Member>,
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub signature: FunctionSignature,
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilationUnit {
    pub structures: Vec<Structure>,
    pub interfaces: Vec<Interface>,
    pub root_interface_name: Option<String>,
    pub default_server_name: Option<String>,
    pub default_realm: Option<Realm>,
}

impl CompilationUnit {
    pub fn root_interface(&self) -> Option<&Interface> {
        let name = self.root_interface_name.as_deref()?;
        self.interfaces.iter().find(|interface| interface.name == name)
    }

    pub fn is_root(&self, interface: &Interface) -> bool {
        self.root_interface_name.as_deref() == Some(interface.name.as_str())
    }

    pub fn server_realm(&self) -> Realm {
        self.default_realm.unwrap_or(Realm::Global)
    }

    pub fn client_realm(&self) -> Realm {
        self.server_realm().client_default()
    }
}
