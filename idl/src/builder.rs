use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use tracing::{debug, instrument, warn};

use crate::ast::{
    CompilationUnit, Function, FunctionSignature, Interface, Member, Parameter, Realm, Structure,
    TypeExpr,
};
use crate::error::IdlError;
use crate::registry::{TypeId, TypeRegistry};
use crate::syntax::{
    Directive, DirectiveKind, FunctionNode, Ident, InterfaceNode, Item, Location, ParameterNode,
    StructureNode, SyntaxTree, TypeNode,
};
use crate::types::{
    BasicTypeTag, Decorations, FunctionParameter, FunctionType, StructureType, Type,
};

lazy_static! {
    /// Declared names end up verbatim in C identifiers, so none of them may be a C keyword.
    static ref C_KEYWORDS: HashSet<&'static str> = [
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
        "typedef", "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex",
        "_Imaginary", "bool", "true", "false", "NULL",
    ]
    .into_iter()
    .collect();
}

/// Method names whose `<iface>_<name>` symbol is taken by the bootstrap or proxy functions.
const INTERFACE_SUFFIXES: &[&str] = &[
    "serve",
    "serve_explicit",
    "init",
    "init_explicit",
    "init_explicit_locked",
    "create_proxy",
    "proxy_destructor",
    "proxy_info_t",
];

/// All state of one compilation: the declared names and the type registry that declarations are
/// interned into while the syntax tree is turned into a [`CompilationUnit`].
#[derive(Debug, Default)]
pub struct CompilationContext {
    registry: TypeRegistry,
    names: HashSet<String>,
    structures: HashMap<String, TypeId>,
    interfaces: HashSet<String>,
    root_directive: Option<Ident>,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_registry(self) -> TypeRegistry {
        self.registry
    }

    #[instrument(level = "debug", skip_all, fields(items = tree.items.len()))]
    pub fn build(&mut self, tree: &SyntaxTree) -> Result<CompilationUnit, IdlError> {
        let mut unit = CompilationUnit::default();

        for item in &tree.items {
            match item {
                Item::Directive(directive) => self.apply_directive(&mut unit, directive)?,
                Item::Structure(node) => {
                    let structure = self.build_structure(node)?;
                    unit.structures.push(structure);
                }
                Item::Interface(node) => {
                    let interface = self.build_interface(node)?;
                    unit.interfaces.push(interface);
                }
            }
        }

        if let Some(root) = &self.root_directive {
            if !self.interfaces.contains(&root.text) {
                return Err(IdlError::UndefinedInterface {
                    name: root.text.clone(),
                    location: root.location,
                });
            }
        }

        debug!(
            structures = unit.structures.len(),
            interfaces = unit.interfaces.len(),
            types = self.registry.len(),
            "built compilation unit"
        );
        Ok(unit)
    }

    fn apply_directive(
        &mut self,
        unit: &mut CompilationUnit,
        directive: &Directive,
    ) -> Result<(), IdlError> {
        let duplicate = Err(IdlError::DuplicateDirective {
            directive: directive.kind.name(),
            location: directive.location,
        });

        match directive.kind {
            DirectiveKind::Interface => {
                if unit.root_interface_name.is_some() {
                    return duplicate;
                }
                unit.root_interface_name = Some(directive.argument.text.clone());
                self.root_directive = Some(directive.argument.clone());
            }
            DirectiveKind::ServerName => {
                if unit.default_server_name.is_some() {
                    return duplicate;
                }
                unit.default_server_name = Some(directive.argument.text.clone());
            }
            DirectiveKind::ServerRealm => {
                if unit.default_realm.is_some() {
                    return duplicate;
                }
                let realm = Realm::from_name(&directive.argument.text).ok_or_else(|| {
                    IdlError::InvalidRealm {
                        name: directive.argument.text.clone(),
                        location: directive.argument.location,
                    }
                })?;
                unit.default_realm = Some(realm);
            }
        }
        Ok(())
    }

    fn declare_name(&mut self, name: &Ident) -> Result<(), IdlError> {
        check_identifier(name)?;
        if BasicTypeTag::from_name(&name.text).is_some() || !self.names.insert(name.text.clone())
        {
            return Err(duplicate_name(&name.text, name.location));
        }
        Ok(())
    }

    fn build_structure(&mut self, node: &StructureNode) -> Result<Structure, IdlError> {
        self.declare_name(&node.name)?;

        let mut members = Vec::with_capacity(node.members.len());
        let mut seen = HashSet::new();
        for member in &node.members {
            check_identifier(&member.name)?;
            if !seen.insert(member.name.text.as_str()) {
                return Err(duplicate_name(&member.name.text, member.name.location));
            }
            let (type_, type_id) = self.resolve_named(&member.type_name)?;
            members.push(Member {
                name: member.name.text.clone(),
                type_,
                type_id,
            });
        }

        let type_id = self.registry.intern(Type::Structure(StructureType {
            name: node.name.text.clone(),
            members: members.iter().map(|member| member.type_id).collect(),
        }));
        self.structures.insert(node.name.text.clone(), type_id);

        Ok(Structure {
            name: node.name.text.clone(),
            members,
            type_id,
        })
    }

    fn build_interface(&mut self, node: &InterfaceNode) -> Result<Interface, IdlError> {
        self.declare_name(&node.name)?;
        // Registered up front so that methods can hand out proxies of their own interface.
        self.interfaces.insert(node.name.text.clone());

        let functions = node
            .functions
            .iter()
            .map(|function| self.build_function(function))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Interface {
            name: node.name.text.clone(),
            functions,
        })
    }

    fn build_function(&mut self, node: &FunctionNode) -> Result<Function, IdlError> {
        self.declare_name(&node.name)?;
        if INTERFACE_SUFFIXES.contains(&node.name.text.as_str()) {
            return Err(reserved_name(&node.name));
        }

        // callback typedefs `<iface>_<fn>_<path>_f` must not meet `<iface>_<fn>_impl_f`
        let mut paths = Vec::new();
        collect_callback_paths("", &node.parameters, &mut paths);
        let mut seen = HashSet::new();
        for (path, location) in paths {
            if path == "impl" {
                return Err(IdlError::ReservedName {
                    name: path,
                    location,
                });
            }
            if !seen.insert(path.clone()) {
                return Err(duplicate_name(&path, location));
            }
        }

        let (signature, type_id) = self.build_signature(&node.decorations, &node.parameters)?;
        Ok(Function {
            name: node.name.text.clone(),
            signature,
            type_id,
        })
    }

    fn build_signature(
        &mut self,
        decorations: &[Ident],
        parameters: &[ParameterNode],
    ) -> Result<(FunctionSignature, TypeId), IdlError> {
        for decoration in decorations {
            if !matches!(decoration.text.as_str(), "nowait" | "no-wait") {
                warn!(
                    decoration = %decoration.text,
                    location = %decoration.location,
                    "unknown decoration has no effect"
                );
            }
        }
        let decorations: Decorations = decorations.iter().map(|d| d.text.as_str()).collect();

        let mut built = Vec::with_capacity(parameters.len());
        let mut seen = HashSet::new();
        for parameter in parameters {
            let name = &parameter.name;
            check_identifier(name)?;
            if name.text == "context" || name.text.starts_with("_context") {
                return Err(reserved_name(name));
            }
            if !seen.insert(name.text.as_str()) {
                return Err(duplicate_name(&name.text, name.location));
            }
            let (type_, type_id) = self.resolve_type(&parameter.type_)?;
            built.push(Parameter {
                name: parameter.name.text.clone(),
                direction: parameter.direction,
                type_,
                type_id,
            });
        }

        let type_id = self.registry.intern(Type::Function(FunctionType {
            decorations: decorations.clone(),
            parameters: built
                .iter()
                .map(|parameter| FunctionParameter {
                    name: parameter.name.clone(),
                    direction: parameter.direction,
                    type_id: parameter.type_id,
                })
                .collect(),
        }));

        let signature = FunctionSignature {
            decorations,
            parameters: built,
        };
        Ok((signature, type_id))
    }

    fn resolve_type(&mut self, node: &TypeNode) -> Result<(TypeExpr, TypeId), IdlError> {
        match node {
            TypeNode::Named(name) => self.resolve_named(name),
            TypeNode::Function {
                decorations,
                parameters,
                ..
            } => {
                let (signature, type_id) = self.build_signature(decorations, parameters)?;
                Ok((TypeExpr::Function(signature), type_id))
            }
        }
    }

    fn resolve_named(&mut self, name: &Ident) -> Result<(TypeExpr, TypeId), IdlError> {
        if let Some(tag) = BasicTypeTag::from_name(&name.text) {
            let id = self.registry.intern(Type::Basic(tag));
            return Ok((TypeExpr::Basic(tag), id));
        }
        if self.interfaces.contains(&name.text) {
            let id = self.registry.intern(Type::Basic(BasicTypeTag::Proxy));
            return Ok((TypeExpr::Basic(BasicTypeTag::Proxy), id));
        }
        if let Some(id) = self.structures.get(&name.text) {
            return Ok((TypeExpr::Structure(name.text.clone()), *id));
        }
        Err(undefined_type(&name.text, name.location))
    }
}

fn is_c_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Dashes are only meaningful in decorations; every other word is pasted into C identifiers.
fn check_identifier(name: &Ident) -> Result<(), IdlError> {
    if !is_c_identifier(&name.text) || C_KEYWORDS.contains(name.text.as_str()) {
        return Err(IdlError::InvalidName {
            name: name.text.clone(),
            location: name.location,
        });
    }
    if name.text.starts_with("_spookygen") {
        return Err(reserved_name(name));
    }
    Ok(())
}

/// Suffixes `<param>[_<nested param>...]` of the callback typedefs declared for a method.
fn collect_callback_paths(
    prefix: &str,
    parameters: &[ParameterNode],
    paths: &mut Vec<(String, Location)>,
) {
    for parameter in parameters {
        if let TypeNode::Function { parameters, .. } = &parameter.type_ {
            let path = if prefix.is_empty() {
                parameter.name.text.clone()
            } else {
                format!("{prefix}_{}", parameter.name.text)
            };
            collect_callback_paths(&path, parameters, paths);
            paths.push((path, parameter.name.location));
        }
    }
}

fn duplicate_name(name: &str, location: Location) -> IdlError {
    IdlError::DuplicateName {
        name: name.to_owned(),
        location,
    }
}

fn reserved_name(name: &Ident) -> IdlError {
    IdlError::ReservedName {
        name: name.text.clone(),
        location: name.location,
    }
}

fn undefined_type(name: &str, location: Location) -> IdlError {
    IdlError::UndefinedType {
        name: name.to_owned(),
        location,
    }
}
