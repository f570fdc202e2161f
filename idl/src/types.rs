use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use lazy_static::lazy_static;

use crate::registry::TypeId;

/// Scalar and handle kinds understood by the runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BasicTypeTag {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    F32,
    F64,
    /// Opaque data handle
    Data,
    Proxy,
    Channel,
    ServerChannel,
}

impl BasicTypeTag {
    pub const ALL: [BasicTypeTag; 15] = [
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::Bool,
        Self::F32,
        Self::F64,
        Self::Data,
        Self::Proxy,
        Self::Channel,
        Self::ServerChannel,
    ];

    /// The IDL spelling of this tag. The runtime uses the same word as the suffix of its typed
    /// accessors (`spooky_invocation_get_<name>`) and descriptor constructors.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Bool => "bool",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Data => "data",
            Self::Proxy => "proxy",
            Self::Channel => "channel",
            Self::ServerChannel => "server_channel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BASIC_TYPE_NAMES.get(name).copied()
    }
}

lazy_static! {
    /// Lookup table from IDL spelling to basic type tag
    static ref BASIC_TYPE_NAMES: HashMap<&'static str, BasicTypeTag> = BasicTypeTag::ALL
        .iter()
        .map(|tag| (tag.name(), *tag))
        .collect();
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// The decoration words attached to a function or function type.
///
/// Decorations take part in structural equality, so `nowait` and the alternative spelling
/// `no-wait` are folded into one word on insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Decorations(BTreeSet<String>);

impl Decorations {
    pub const NO_WAIT: &'static str = "nowait";

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the (canonicalized) word was already present.
    pub fn insert(&mut self, word: &str) -> bool {
        let word = match word {
            "no-wait" => Self::NO_WAIT,
            other => other,
        };
        self.0.insert(word.to_owned())
    }

    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(word)
    }

    /// Whether the caller expects a completion acknowledgment from the peer.
    pub fn waits(&self) -> bool {
        !self.contains(Self::NO_WAIT)
    }
}

impl<'a> FromIterator<&'a str> for Decorations {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut decorations = Self::new();
        for word in iter {
            decorations.insert(word);
        }
        decorations
    }
}

/// A parameter of an interned function type. The name is the one seen first for this shape and
/// does not take part in equality.
#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub name: String,
    pub direction: Direction,
    pub type_id: TypeId,
}

impl PartialEq for FunctionParameter {
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction && self.type_id == other.type_id
    }
}

impl Eq for FunctionParameter {}

impl Hash for FunctionParameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.direction.hash(state);
        self.type_id.hash(state);
    }
}

/// A structure shape. Two structures with the same member sequence are the same type, whatever
/// they were declared as; `name` only picks the native spelling.
#[derive(Debug, Clone)]
pub struct StructureType {
    pub name: String,
    pub members: Vec<TypeId>,
}

impl PartialEq for StructureType {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl Eq for StructureType {}

impl Hash for StructureType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.members.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub decorations: Decorations,
    pub parameters: Vec<FunctionParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Basic(BasicTypeTag),
    Structure(StructureType),
    Function(FunctionType),
}
