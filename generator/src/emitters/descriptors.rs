use std::fmt::{self, Write};

use spooky_idl::{Direction, Type};

use super::common::{function_typedef, shadow_struct, source_native_type, write_generic_parameters, EmitContext};

pub(super) fn write_prelude(ctx: &mut EmitContext, header_include: &str) -> fmt::Result {
    let table_len = ctx.registry.len().max(1);
    let out = &mut ctx.source;
    writeln!(out, "#include \"{header_include}\"")?;
    writeln!(out, "#include <libsys/libsys.h>")?;
    writeln!(out)?;
    writeln!(out, "struct _spookygen_callback_context {{")?;
    writeln!(out, "\tvoid* target;")?;
    writeln!(out, "\tvoid* target_context;")?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out, "static spooky_type_t* _spookygen_types[{table_len}];")?;
    writeln!(out, "static sys_once_t _spookygen_init_token = SYS_ONCE_INITIALIZER;")?;
    writeln!(out)
}

/// Shadow definitions of every structure shape. Members are named by position so that two
/// structures with the same shape share one definition.
pub(super) fn write_shadow_structures(ctx: &mut EmitContext) -> fmt::Result {
    let registry = ctx.registry;
    let out = &mut ctx.source;
    for (type_id, ty) in registry.iter() {
        let Type::Structure(structure) = ty else {
            continue;
        };
        writeln!(out, "struct {} {{", shadow_struct(type_id))?;
        for (index, member) in structure.members.iter().enumerate() {
            writeln!(
                out,
                "\t{} _spookygen_member_{index};",
                source_native_type(registry, *member)
            )?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }
    Ok(())
}

/// `_spookygen_init` builds the runtime descriptor of every interned type, in id order, and
/// `_spookygen_ensure_init` runs it once per process.
pub(super) fn write_initializer(ctx: &mut EmitContext) -> fmt::Result {
    let registry = ctx.registry;
    let out = &mut ctx.source;

    // zero-length arrays are not valid C, so a unit without any structures or parameters passes
    // NULL instead of a scratch array
    let members = if registry.max_members() > 0 { "members" } else { "NULL" };
    let parameters = if registry.max_params() > 0 { "parameters" } else { "NULL" };

    writeln!(out, "static void _spookygen_init(void* context) {{")?;
    if registry.max_members() > 0 {
        writeln!(out, "\tspooky_structure_member_t members[{}];", registry.max_members())?;
    }
    if registry.max_params() > 0 {
        writeln!(out, "\tspooky_function_parameter_t parameters[{}];", registry.max_params())?;
    }
    writeln!(out)?;

    for (type_id, ty) in registry.iter() {
        match ty {
            Type::Basic(tag) => {
                writeln!(out, "\t_spookygen_types[{type_id}] = spooky_type_{}();", tag.name())?;
            }
            Type::Structure(structure) => {
                for (index, member) in structure.members.iter().enumerate() {
                    writeln!(out, "\tmembers[{index}].type = _spookygen_types[{member}];")?;
                    writeln!(
                        out,
                        "\tmembers[{index}].offset = offsetof(struct {}, _spookygen_member_{index});",
                        shadow_struct(type_id)
                    )?;
                }
                writeln!(
                    out,
                    "\tsys_abort_status_log(spooky_structure_create(sizeof(struct {}), {members}, {}, &_spookygen_types[{type_id}]));",
                    shadow_struct(type_id),
                    structure.members.len()
                )?;
            }
            Type::Function(function) => {
                for (index, parameter) in function.parameters.iter().enumerate() {
                    let direction = match parameter.direction {
                        Direction::In => "spooky_function_parameter_direction_in",
                        Direction::Out => "spooky_function_parameter_direction_out",
                    };
                    writeln!(
                        out,
                        "\tparameters[{index}].type = _spookygen_types[{}];",
                        parameter.type_id
                    )?;
                    writeln!(out, "\tparameters[{index}].direction = {direction};")?;
                }
                writeln!(
                    out,
                    "\tsys_abort_status_log(spooky_function_create({}, {parameters}, {}, &_spookygen_types[{type_id}]));",
                    function.decorations.waits(),
                    function.parameters.len()
                )?;
            }
        }
    }

    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "static void _spookygen_ensure_init(void) {{")?;
    writeln!(out, "\tsys_once(&_spookygen_init_token, _spookygen_init, NULL, 0);")?;
    writeln!(out, "}}")?;
    writeln!(out)
}

/// `_spookygen_type_<id>_f` for every function shape. Parameter types always have smaller ids, so
/// id order defines every typedef before its first use.
pub(super) fn write_function_typedefs(ctx: &mut EmitContext) -> fmt::Result {
    let registry = ctx.registry;
    let out = &mut ctx.source;
    for (type_id, ty) in registry.iter() {
        let Type::Function(function) = ty else {
            continue;
        };
        write!(out, "typedef ferr_t (*{})(void* _context", function_typedef(type_id))?;
        write_generic_parameters(out, registry, &function.parameters)?;
        writeln!(out, ");")?;
    }
    writeln!(out)
}
