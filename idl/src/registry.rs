use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::types::{FunctionType, StructureType, Type};

/// Dense identifier of an interned [`Type`]. Ids start at zero and are handed out in interning
/// order, so they double as indices into the generated type-descriptor table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("Type id space exhausted"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interns type expressions by structural equality.
///
/// Member and parameter types are always interned before the type that contains them, so the id
/// of a nested type is smaller than the id of its container.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<Type>,
    ids: HashMap<Type, TypeId>,
    max_members: usize,
    max_params: usize,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of a structurally equal type if one was interned before, otherwise
    /// allocates the next id.
    pub fn intern(&mut self, type_: Type) -> TypeId {
        if let Some(id) = self.lookup(&type_) {
            return id;
        }

        let id = TypeId::from_index(self.types.len());
        match &type_ {
            Type::Basic(_) => {}
            Type::Structure(structure) => {
                self.max_members = self.max_members.max(structure.members.len());
            }
            Type::Function(function) => {
                self.max_params = self.max_params.max(function.parameters.len());
            }
        }
        trace!(%id, ?type_, "interned new type");

        self.ids.insert(type_.clone(), id);
        self.types.push(type_);
        id
    }

    /// Retrieves an interned type. Panics if the id did not come from this registry.
    pub fn get(&self, id: TypeId) -> &Type {
        self.types
            .get(id.index())
            .expect("Invalid type id (out-of-bounds)")
    }

    pub fn lookup(&self, type_: &Type) -> Option<TypeId> {
        self.ids.get(type_).copied()
    }

    pub fn structure(&self, id: TypeId) -> Option<&StructureType> {
        match self.get(id) {
            Type::Structure(structure) => Some(structure),
            _ => None,
        }
    }

    pub fn function(&self, id: TypeId) -> Option<&FunctionType> {
        match self.get(id) {
            Type::Function(function) => Some(function),
            _ => None,
        }
    }

    /// All interned types in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, type_)| (TypeId::from_index(index), type_))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Largest member count among the interned structures.
    pub fn max_members(&self) -> usize {
        self.max_members
    }

    /// Largest parameter count among the interned functions.
    pub fn max_params(&self) -> usize {
        self.max_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BasicTypeTag, Decorations, Direction, FunctionParameter};

    fn parameter(name: &str, direction: Direction, type_id: TypeId) -> FunctionParameter {
        FunctionParameter {
            name: name.into(),
            direction,
            type_id,
        }
    }

    #[test]
    fn interning_is_idempotent() {
        let mut registry = TypeRegistry::new();
        let a = registry.intern(Type::Basic(BasicTypeTag::I32));
        let b = registry.intern(Type::Basic(BasicTypeTag::I32));
        let c = registry.intern(Type::Basic(BasicTypeTag::U32));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ids_are_dense_and_ordered() {
        let mut registry = TypeRegistry::new();
        for tag in BasicTypeTag::ALL {
            registry.intern(Type::Basic(tag));
        }
        let ids: Vec<usize> = registry.iter().map(|(id, _)| id.index()).collect();
        assert_eq!(ids, (0..BasicTypeTag::ALL.len()).collect::<Vec<_>>());
    }

    #[test]
    fn functions_differ_by_direction_and_decorations() {
        let mut registry = TypeRegistry::new();
        let i32_id = registry.intern(Type::Basic(BasicTypeTag::I32));

        let takes = registry.intern(Type::Function(FunctionType {
            decorations: Decorations::new(),
            parameters: vec![parameter("value", Direction::In, i32_id)],
        }));
        let renamed = registry.intern(Type::Function(FunctionType {
            decorations: Decorations::new(),
            parameters: vec![parameter("other", Direction::In, i32_id)],
        }));
        let gives = registry.intern(Type::Function(FunctionType {
            decorations: Decorations::new(),
            parameters: vec![parameter("value", Direction::Out, i32_id)],
        }));
        let no_wait = registry.intern(Type::Function(FunctionType {
            decorations: ["nowait"].into_iter().collect(),
            parameters: vec![parameter("value", Direction::In, i32_id)],
        }));

        assert_eq!(takes, renamed);
        assert_ne!(takes, gives);
        assert_ne!(takes, no_wait);
        assert_ne!(gives, no_wait);
    }

    #[test]
    fn tracks_member_and_parameter_bounds() {
        let mut registry = TypeRegistry::new();
        let u8_id = registry.intern(Type::Basic(BasicTypeTag::U8));
        let u16_id = registry.intern(Type::Basic(BasicTypeTag::U16));
        assert_eq!(registry.max_members(), 0);
        assert_eq!(registry.max_params(), 0);

        registry.intern(Type::Structure(StructureType {
            name: "Wide".into(),
            members: vec![u8_id, u16_id, u8_id],
        }));
        registry.intern(Type::Structure(StructureType {
            name: "Narrow".into(),
            members: vec![u16_id],
        }));
        registry.intern(Type::Function(FunctionType {
            decorations: Decorations::new(),
            parameters: vec![
                parameter("a", Direction::In, u8_id),
                parameter("b", Direction::Out, u16_id),
            ],
        }));

        assert_eq!(registry.max_members(), 3);
        assert_eq!(registry.max_params(), 2);
    }

    #[test]
    fn structurally_equal_structures_keep_first_name() {
        let mut registry = TypeRegistry::new();
        let i32_id = registry.intern(Type::Basic(BasicTypeTag::I32));
        let first = registry.intern(Type::Structure(StructureType {
            name: "Point".into(),
            members: vec![i32_id, i32_id],
        }));
        let second = registry.intern(Type::Structure(StructureType {
            name: "Size".into(),
            members: vec![i32_id, i32_id],
        }));
        assert_eq!(first, second);
        assert_eq!(registry.structure(first).map(|s| s.name.as_str()), Some("Point"));
    }
}
