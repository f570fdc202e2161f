pub mod ast;
pub mod builder;
pub mod error;
pub mod ownership;
pub mod registry;
pub mod syntax;
pub mod types;

mod lexer;

pub use ast::{
    CompilationUnit, Function, FunctionSignature, Interface, Member, Parameter, Realm, Structure,
    TypeExpr,
};
pub use builder::CompilationContext;
pub use error::IdlError;
pub use ownership::{classify, Ownership};
pub use registry::{TypeId, TypeRegistry};
pub use types::{
    BasicTypeTag, Decorations, Direction, FunctionParameter, FunctionType, StructureType, Type,
};

/// Parses and builds one compilation unit, returning its declarations together with the registry
/// of every type they mention.
pub fn read_unit(source: &str) -> Result<(CompilationUnit, TypeRegistry), IdlError> {
    let tree = syntax::parse(source)?;
    let mut context = CompilationContext::new();
    let unit = context.build(&tree)?;
    Ok((unit, context.into_registry()))
}
