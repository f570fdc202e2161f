use std::collections::HashSet;
use std::fmt::{self, Write};

use spooky_idl::{
    BasicTypeTag, CompilationUnit, Direction, FunctionParameter, Interface, Parameter, Type,
    TypeExpr, TypeId, TypeRegistry,
};

use super::Role;

/// The two kinds of callback glue that are emitted once per function type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(super) enum WrapperKind {
    /// `_spookygen_callback_handler_<id>`, run by the runtime when the peer calls a callback
    /// that was handed out from this side.
    IncomingCallback,
    /// `_spookygen_callback_<id>`, given to local code to call a callback the peer handed in.
    OutgoingCallback,
}

pub(super) struct EmitContext<'a> {
    pub(super) unit: &'a CompilationUnit,
    pub(super) registry: &'a TypeRegistry,
    pub(super) role: Role,
    pub(super) header: String,
    pub(super) source: String,
    emitted: HashSet<(WrapperKind, TypeId)>,
}

impl<'a> EmitContext<'a> {
    pub(super) fn new(unit: &'a CompilationUnit, registry: &'a TypeRegistry, role: Role) -> Self {
        Self {
            unit,
            registry,
            role,
            header: String::new(),
            source: String::new(),
            emitted: HashSet::new(),
        }
    }

    /// Marks a callback wrapper as emitted. Returns `false` if it already was, in which case the
    /// caller must not recurse into it again.
    pub(super) fn claim(&mut self, kind: WrapperKind, type_id: TypeId) -> bool {
        self.emitted.insert((kind, type_id))
    }

    /// Whether incoming calls of this interface's methods are dispatched on this side.
    pub(super) fn serves(&self, interface: &Interface) -> bool {
        self.role == Role::Server || !self.unit.is_root(interface)
    }

    /// Whether this side calls out through this interface's methods.
    pub(super) fn calls(&self, interface: &Interface) -> bool {
        self.role == Role::Client || !self.unit.is_root(interface)
    }

    /// Name of the macro every public symbol is prefixed with, letting the includer pick the
    /// storage class (e.g. `static`).
    pub(super) fn storage_macro(&self) -> String {
        match &self.unit.root_interface_name {
            Some(root) => format!("SPOOKYGEN_{root}_STORAGE"),
            None => "SPOOKYGEN_STORAGE".into(),
        }
    }
}

pub(super) fn shadow_struct(type_id: TypeId) -> String {
    format!("_spookygen_struct_{type_id}")
}

pub(super) fn function_typedef(type_id: TypeId) -> String {
    format!("_spookygen_type_{type_id}_f")
}

pub(super) fn callback_handler(type_id: TypeId) -> String {
    format!("_spookygen_callback_handler_{type_id}")
}

pub(super) fn callback_wrapper(type_id: TypeId) -> String {
    format!("_spookygen_callback_{type_id}")
}

pub(super) const fn native_basic_type(tag: BasicTypeTag) -> &'static str {
    match tag {
        BasicTypeTag::U8 => "uint8_t",
        BasicTypeTag::U16 => "uint16_t",
        BasicTypeTag::U32 => "uint32_t",
        BasicTypeTag::U64 => "uint64_t",
        BasicTypeTag::I8 => "int8_t",
        BasicTypeTag::I16 => "int16_t",
        BasicTypeTag::I32 => "int32_t",
        BasicTypeTag::I64 => "int64_t",
        BasicTypeTag::Bool => "bool",
        BasicTypeTag::F32 => "float",
        BasicTypeTag::F64 => "double",
        BasicTypeTag::Data => "sys_data_t*",
        BasicTypeTag::Proxy => "spooky_proxy_t*",
        BasicTypeTag::Channel => "sys_channel_t*",
        BasicTypeTag::ServerChannel => "sys_server_channel_t*",
    }
}

/// Native spelling of an interned type inside the generated source, where structures are always
/// referred to by their shadow definition.
pub(super) fn source_native_type(registry: &TypeRegistry, type_id: TypeId) -> String {
    match registry.get(type_id) {
        Type::Basic(tag) => native_basic_type(*tag).into(),
        Type::Structure(_) => format!("struct {}", shadow_struct(type_id)),
        Type::Function(_) => function_typedef(type_id),
    }
}

/// Quotes `value` as a C string literal. Returns the literal and the byte length of `value`.
pub(super) fn c_string_literal(value: &str) -> (String, usize) {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('"');
    for byte in value.bytes() {
        match byte {
            b'"' => literal.push_str("\\\""),
            b'\\' => literal.push_str("\\\\"),
            b' '..=b'~' => literal.push(char::from(byte)),
            // octal escapes cannot swallow the following characters like hex escapes do
            _ => {
                let _ = write!(literal, "\\{byte:03o}");
            }
        }
    }
    literal.push('"');
    (literal, value.len())
}

pub(super) fn write_status_check(out: &mut String) -> fmt::Result {
    write_nested_status_check(out, 1)
}

pub(super) fn write_nested_status_check(out: &mut String, depth: usize) -> fmt::Result {
    let indent = "\t".repeat(depth);
    writeln!(out, "{indent}if (status != ferr_ok) {{")?;
    writeln!(out, "{indent}\tgoto out;")?;
    writeln!(out, "{indent}}}")
}

/// Writes `, <param>...` for a parameter list of an interned function type, using the generic
/// names `arg<N>` and the shadow/typedef spellings of the generated source.
pub(super) fn write_generic_parameters(
    out: &mut String,
    registry: &TypeRegistry,
    parameters: &[FunctionParameter],
) -> fmt::Result {
    for (index, parameter) in parameters.iter().enumerate() {
        let is_out = parameter.direction == Direction::Out;
        let pointer = if is_out { "*" } else { "" };
        match registry.get(parameter.type_id) {
            Type::Basic(tag) => {
                write!(out, ", {}{pointer} arg{index}", native_basic_type(*tag))?;
            }
            Type::Structure(_) => {
                let constness = if is_out { "" } else { "const " };
                write!(
                    out,
                    ", {constness}struct {}* arg{index}",
                    shadow_struct(parameter.type_id)
                )?;
            }
            Type::Function(_) => {
                write!(
                    out,
                    ", {}{pointer} arg{index}, void*{pointer} _context_arg{index}",
                    function_typedef(parameter.type_id)
                )?;
            }
        }
    }
    Ok(())
}

/// Writes `, <param>...` using the declared names and spellings, as seen by users of the header.
/// Callback parameters use the typedef `<prefix>_<param>_f`.
pub(super) fn write_declared_parameters(
    out: &mut String,
    prefix: &str,
    parameters: &[Parameter],
) -> fmt::Result {
    for parameter in parameters {
        let is_out = parameter.direction == Direction::Out;
        let pointer = if is_out { "*" } else { "" };
        let name = &parameter.name;
        match &parameter.type_ {
            TypeExpr::Basic(tag) => {
                write!(out, ", {}{pointer} {name}", native_basic_type(*tag))?;
            }
            TypeExpr::Structure(structure) => {
                let constness = if is_out { "" } else { "const " };
                write!(out, ", {constness}struct {structure}* {name}")?;
            }
            TypeExpr::Function(_) => {
                write!(
                    out,
                    ", {prefix}_{name}_f{pointer} {name}, void*{pointer} _context_{name}"
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quotes_c_strings() {
        assert_eq!(c_string_literal("echo"), ("\"echo\"".into(), 4));
        assert_eq!(
            c_string_literal("a\"b\\c\n"),
            ("\"a\\\"b\\\\c\\012\"".into(), 6)
        );
    }

    #[test]
    fn writes_both_parameter_spellings() {
        let (unit, registry) = spooky_idl::read_unit(
            "struct Point { x: i32, y: i32 }
             interface Shapes { move(by: in Point, on_done: out fn(code: in i32), count: out u8); }",
        )
        .unwrap();
        let function = &unit.interfaces[0].functions[0];

        let mut declared = String::new();
        write_declared_parameters(&mut declared, "Shapes_move", &function.signature.parameters)
            .unwrap();
        assert_eq!(
            declared,
            ", const struct Point* by, Shapes_move_on_done_f* on_done, void** _context_on_done, uint8_t* count"
        );

        let function_type = registry.function(function.type_id).unwrap();
        let mut generic = String::new();
        write_generic_parameters(&mut generic, &registry, &function_type.parameters).unwrap();
        assert_eq!(
            generic,
            ", const struct _spookygen_struct_1* arg0, _spookygen_type_2_f* arg1, void** _context_arg1, uint8_t* arg2"
        );
    }
}
