use std::fmt::{self, Write};

use spooky_idl::{Parameter, TypeExpr};

use super::common::{native_basic_type, write_declared_parameters, EmitContext};
use super::Role;

pub(super) fn write_prelude(ctx: &mut EmitContext) -> fmt::Result {
    let storage = ctx.storage_macro();
    let out = &mut ctx.header;
    writeln!(out, "#pragma once")?;
    writeln!(out)?;
    writeln!(out, "#include <libspooky/libspooky.h>")?;
    writeln!(out)?;
    writeln!(out, "#ifndef {storage}")?;
    writeln!(out, "\t#define {storage}")?;
    writeln!(out, "#endif // {storage}")?;
    writeln!(out)
}

/// Structures in declaration order. A structure can only use structures declared before it, so
/// this order is already a valid C definition order.
pub(super) fn write_structures(ctx: &mut EmitContext) -> fmt::Result {
    let out = &mut ctx.header;
    for structure in &ctx.unit.structures {
        writeln!(out, "struct {} {{", structure.name)?;
        for member in &structure.members {
            match &member.type_ {
                TypeExpr::Basic(tag) => {
                    writeln!(out, "\t{} {};", native_basic_type(*tag), member.name)?
                }
                TypeExpr::Structure(name) => writeln!(out, "\tstruct {name} {};", member.name)?,
                TypeExpr::Function(_) => unreachable!("structure members are always named types"),
            }
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }
    Ok(())
}

/// Typedefs `<prefix>_<param>_f` for a callback parameter, nested callbacks first.
fn write_callback_typedefs(out: &mut String, prefix: &str, parameter: &Parameter) -> fmt::Result {
    let TypeExpr::Function(signature) = &parameter.type_ else {
        return Ok(());
    };

    let nested_prefix = format!("{prefix}_{}", parameter.name);
    for nested in &signature.parameters {
        write_callback_typedefs(out, &nested_prefix, nested)?;
    }

    write!(out, "typedef ferr_t (*{nested_prefix}_f)(void* _context")?;
    write_declared_parameters(out, &nested_prefix, &signature.parameters)?;
    writeln!(out, ");")
}

/// Callback typedefs, implementation prototypes (or typedefs, for proxied interfaces) and the
/// public call prototypes of every method.
pub(super) fn write_function_declarations(ctx: &mut EmitContext) -> fmt::Result {
    let storage = ctx.storage_macro();
    let unit = ctx.unit;

    for interface in &unit.interfaces {
        let is_root = unit.is_root(interface);
        let serves = ctx.serves(interface);
        let calls = ctx.calls(interface);
        let out = &mut ctx.header;

        for function in &interface.functions {
            let prefix = format!("{}_{}", interface.name, function.name);
            let parameters = &function.signature.parameters;

            for parameter in parameters {
                write_callback_typedefs(out, &prefix, parameter)?;
            }

            if serves {
                if is_root {
                    write!(out, "ferr_t {prefix}_impl(void* _context")?;
                } else {
                    write!(out, "typedef ferr_t (*{prefix}_impl_f)(void* _context")?;
                }
                write_declared_parameters(out, &prefix, parameters)?;
                writeln!(out, ");")?;
                writeln!(out)?;
            }

            if calls {
                write!(
                    out,
                    "{storage} LIBSPOOKY_WUR ferr_t {prefix}(void* context"
                )?;
                write_declared_parameters(out, &prefix, parameters)?;
                writeln!(out, ");")?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

/// The implementation table a user fills in to create a proxy for a non-root interface.
pub(super) fn write_proxy_infos(ctx: &mut EmitContext) -> fmt::Result {
    let unit = ctx.unit;
    let out = &mut ctx.header;
    for interface in unit.interfaces.iter().filter(|i| !unit.is_root(i)) {
        writeln!(out, "typedef struct {}_proxy_info {{", interface.name)?;
        writeln!(out, "\tvoid* context;")?;
        writeln!(out, "\tvoid (*destructor)(void*);")?;
        for function in &interface.functions {
            writeln!(
                out,
                "\t{}_{}_impl_f {};",
                interface.name, function.name, function.name
            )?;
        }
        writeln!(out, "}} {}_proxy_info_t;", interface.name)?;
        writeln!(out)?;
    }
    Ok(())
}

pub(super) fn write_bootstrap_declarations(ctx: &mut EmitContext) -> fmt::Result {
    let storage = ctx.storage_macro();
    let unit = ctx.unit;
    let out = &mut ctx.header;

    if let Some(root) = unit.root_interface() {
        let root = &root.name;
        let has_default = unit.default_server_name.is_some();
        match ctx.role {
            Role::Server => {
                writeln!(out, "spooky_interface_t* {root}_interface(void);")?;
                if has_default {
                    writeln!(out, "{storage} LIBSPOOKY_WUR ferr_t {root}_serve(eve_loop_t* loop, eve_server_channel_t** out_server_channel);")?;
                }
                writeln!(out, "{storage} LIBSPOOKY_WUR ferr_t {root}_serve_explicit(const char* name, size_t name_length, sys_channel_realm_t realm, eve_loop_t* loop, eve_server_channel_t** out_server_channel);")?;
            }
            Role::Client => {
                if has_default {
                    writeln!(
                        out,
                        "{storage} LIBSPOOKY_WUR ferr_t {root}_init(eve_loop_t* loop);"
                    )?;
                }
                writeln!(out, "{storage} LIBSPOOKY_WUR ferr_t {root}_init_explicit(const char* name, size_t name_length, sys_channel_realm_t realm, eve_loop_t* loop);")?;
            }
        }
    }

    for interface in unit.interfaces.iter().filter(|i| !unit.is_root(i)) {
        let name = &interface.name;
        writeln!(out)?;
        writeln!(out, "{storage} LIBSPOOKY_WUR ferr_t {name}_create_proxy(const {name}_proxy_info_t* info, spooky_proxy_t** out_proxy);")?;
    }
    Ok(())
}
