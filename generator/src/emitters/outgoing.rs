//! Wrappers local code calls to invoke a function on the peer: interface methods called from
//! this side and callbacks the peer handed in.

use std::fmt::{self, Write};

use spooky_idl::{classify, Direction, Function, FunctionType, Interface, Type, TypeId, TypeExpr};

use super::common::{
    c_string_literal, callback_handler, callback_wrapper, write_declared_parameters,
    write_generic_parameters, write_nested_status_check, write_status_check, EmitContext,
    WrapperKind,
};
use super::incoming;

/// What the `context` argument of an outgoing wrapper is and how the invocation is obtained.
#[derive(Copy, Clone, Debug)]
pub(super) enum OutgoingTarget<'a> {
    /// A root interface method. The context is an optional invocation; without one, the call goes
    /// over the shared client connection.
    RootMethod {
        interface: &'a Interface,
        function: &'a Function,
    },
    /// A method of a proxied interface. The context is an invocation or the proxy to call.
    ProxyMethod {
        interface: &'a Interface,
        function: &'a Function,
    },
    /// A callback received from the peer. The context is the invocation of the callback.
    Callback { type_id: TypeId },
}

impl<'a> OutgoingTarget<'a> {
    fn name(&self) -> String {
        match self {
            Self::RootMethod { interface, function } | Self::ProxyMethod { interface, function } => {
                format!("_spookygen_internal_{}_{}", interface.name, function.name)
            }
            Self::Callback { type_id } => callback_wrapper(*type_id),
        }
    }

    fn type_id(&self) -> TypeId {
        match self {
            Self::RootMethod { function, .. } | Self::ProxyMethod { function, .. } => {
                function.type_id
            }
            Self::Callback { type_id } => *type_id,
        }
    }

    fn method(&self) -> Option<(&'a Interface, &'a Function)> {
        match *self {
            Self::RootMethod { interface, function } | Self::ProxyMethod { interface, function } => {
                Some((interface, function))
            }
            Self::Callback { .. } => None,
        }
    }
}

/// Emits the internal wrapper of a method together with the public function forwarding to it.
pub(super) fn write_method_wrapper(ctx: &mut EmitContext, target: OutgoingTarget) -> fmt::Result {
    write_wrapper(ctx, target)?;
    if let Some((interface, function)) = target.method() {
        write_forwarder(ctx, interface, function)?;
    }
    Ok(())
}

/// Emits `_spookygen_callback_<id>` unless it already exists.
pub(super) fn ensure_callback_wrapper(ctx: &mut EmitContext, type_id: TypeId) -> fmt::Result {
    if !ctx.claim(WrapperKind::OutgoingCallback, type_id) {
        return Ok(());
    }
    write_wrapper(ctx, OutgoingTarget::Callback { type_id })
}

fn function_type<'r>(ctx: &EmitContext<'r>, type_id: TypeId) -> &'r FunctionType {
    ctx.registry
        .function(type_id)
        .expect("callable ids always refer to function types")
}

fn needs_cleanup_flag(ty: &Type) -> bool {
    match ty {
        Type::Basic(tag) => classify(*tag).is_refcounted,
        Type::Structure(_) => true,
        Type::Function(_) => false,
    }
}

fn write_wrapper(ctx: &mut EmitContext, target: OutgoingTarget) -> fmt::Result {
    let registry = ctx.registry;
    let type_id = target.type_id();
    let signature = function_type(ctx, type_id);

    // Callbacks passed to the peer get called back into; callbacks the peer returns are called out
    // through.
    for parameter in &signature.parameters {
        if let Type::Function(_) = registry.get(parameter.type_id) {
            match parameter.direction {
                Direction::In => incoming::ensure_callback_handler(ctx, parameter.type_id)?,
                Direction::Out => ensure_callback_wrapper(ctx, parameter.type_id)?,
            }
        }
    }

    let unit = ctx.unit;
    let out = &mut ctx.source;

    write!(out, "static ferr_t {}(void* context", target.name())?;
    write_generic_parameters(out, registry, &signature.parameters)?;
    writeln!(out, ") {{")?;
    writeln!(out, "\tferr_t status = ferr_ok;")?;
    writeln!(out, "\tspooky_invocation_t* invocation = NULL;")?;
    if let OutgoingTarget::RootMethod { .. } = target {
        writeln!(out, "\teve_channel_t* channel = NULL;")?;
    }

    let mut has_failure_cleanup = false;
    for (index, parameter) in signature.parameters.iter().enumerate() {
        let ty = registry.get(parameter.type_id);
        match (ty, parameter.direction) {
            (Type::Function(_), Direction::In) => {
                writeln!(
                    out,
                    "\tstruct _spookygen_callback_context* arg{index}_callback_context = NULL;"
                )?;
                has_failure_cleanup = true;
            }
            (Type::Function(_), Direction::Out) => {
                writeln!(out, "\tspooky_invocation_t* arg{index}_invocation = NULL;")?;
                has_failure_cleanup = true;
            }
            (Type::Structure(_), Direction::Out) => {
                writeln!(out, "\tsize_t arg{index}_size = sizeof(*arg{index});")?;
            }
            _ => {}
        }
        if parameter.direction == Direction::Out && needs_cleanup_flag(ty) {
            writeln!(out, "\tbool arg{index}_should_cleanup_on_fail = false;")?;
            has_failure_cleanup = true;
        }
    }

    writeln!(out)?;
    writeln!(out, "\t_spookygen_ensure_init();")?;
    writeln!(out)?;

    match target {
        OutgoingTarget::Callback { .. } => {
            writeln!(out, "\tinvocation = context;")?;
            writeln!(out, "\tif (!invocation) {{")?;
            writeln!(out, "\t\tstatus = ferr_invalid_argument;")?;
            writeln!(out, "\t\tgoto out;")?;
            writeln!(out, "\t}}")?;
        }
        OutgoingTarget::RootMethod { function, .. } => {
            writeln!(
                out,
                "\tif (context && spooky_object_class(context) == spooky_object_class_invocation()) {{"
            )?;
            writeln!(out, "\t\tinvocation = context;")?;
            writeln!(out, "\t}}")?;
            writeln!(out)?;
            writeln!(out, "\tif (!invocation) {{")?;
            writeln!(out, "\t\tsys_mutex_lock(&_spookygen_client_mutex);")?;
            writeln!(out, "\t\tif (!_spookygen_channel) {{")?;
            match (&unit.root_interface_name, &unit.default_server_name) {
                (Some(root), Some(server_name)) => {
                    let (literal, length) = c_string_literal(server_name);
                    writeln!(
                        out,
                        "\t\t\tstatus = {root}_init_explicit_locked({literal}, {length}, sys_channel_realm_{}, eve_loop_get_main());",
                        unit.client_realm().name()
                    )?;
                }
                _ => writeln!(out, "\t\t\tstatus = ferr_no_such_resource;")?,
            }
            writeln!(out, "\t\t}}")?;
            writeln!(out, "\t\tif (status == ferr_ok) {{")?;
            writeln!(out, "\t\t\tstatus = eve_retain(_spookygen_channel);")?;
            writeln!(out, "\t\t\tif (status == ferr_ok) {{")?;
            writeln!(out, "\t\t\t\tchannel = _spookygen_channel;")?;
            writeln!(out, "\t\t\t}}")?;
            writeln!(out, "\t\t}}")?;
            writeln!(out, "\t\tsys_mutex_unlock(&_spookygen_client_mutex);")?;
            write_nested_status_check(out, 2)?;
            writeln!(out)?;
            let (literal, length) = c_string_literal(&function.name);
            writeln!(
                out,
                "\t\tstatus = spooky_invocation_create({literal}, {length}, _spookygen_types[{type_id}], channel, &invocation);"
            )?;
            writeln!(out, "\t\teve_release(channel);")?;
            write_nested_status_check(out, 2)?;
            writeln!(out, "\t}}")?;
        }
        OutgoingTarget::ProxyMethod { function, .. } => {
            writeln!(
                out,
                "\tif (context && spooky_object_class(context) == spooky_object_class_invocation()) {{"
            )?;
            writeln!(out, "\t\tinvocation = context;")?;
            writeln!(out, "\t}}")?;
            writeln!(out)?;
            let (literal, length) = c_string_literal(&function.name);
            writeln!(out, "\tif (!invocation) {{")?;
            writeln!(
                out,
                "\t\tstatus = spooky_invocation_create_proxy({literal}, {length}, _spookygen_types[{type_id}], context, &invocation);"
            )?;
            write_nested_status_check(out, 2)?;
            writeln!(out, "\t}}")?;
        }
    }
    writeln!(out)?;

    for (index, parameter) in signature.parameters.iter().enumerate() {
        if parameter.direction == Direction::Out {
            continue;
        }
        match registry.get(parameter.type_id) {
            Type::Basic(tag) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_set_{}(invocation, {index}, arg{index});",
                    tag.name()
                )?;
                write_status_check(out)?;
                if classify(*tag).is_consumed_on_send {
                    writeln!(out, "\targ{index} = NULL;")?;
                }
            }
            Type::Structure(_) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_set_structure(invocation, {index}, arg{index});"
                )?;
                write_status_check(out)?;
            }
            Type::Function(_) => {
                writeln!(
                    out,
                    "\tstatus = sys_mempool_allocate(sizeof(*arg{index}_callback_context), NULL, (void*)&arg{index}_callback_context);"
                )?;
                write_status_check(out)?;
                writeln!(out, "\targ{index}_callback_context->target = (void*)arg{index};")?;
                writeln!(
                    out,
                    "\targ{index}_callback_context->target_context = _context_arg{index};"
                )?;
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_set_function(invocation, {index}, {}, arg{index}_callback_context);",
                    callback_handler(parameter.type_id)
                )?;
                write_status_check(out)?;
                // the invocation passes the box back to the handler, even on teardown
                writeln!(out, "\targ{index}_callback_context = NULL;")?;
            }
        }
    }

    writeln!(out, "\tstatus = spooky_invocation_execute_sync(invocation);")?;
    write_status_check(out)?;

    for (index, parameter) in signature.parameters.iter().enumerate() {
        if parameter.direction == Direction::In {
            continue;
        }
        match registry.get(parameter.type_id) {
            Type::Basic(tag) => {
                let ownership = classify(*tag);
                let retain = if ownership.is_refcounted { ", true" } else { "" };
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_get_{}(invocation, {index}{retain}, arg{index});",
                    tag.name()
                )?;
                write_status_check(out)?;
                if ownership.is_refcounted {
                    writeln!(out, "\targ{index}_should_cleanup_on_fail = true;")?;
                }
            }
            Type::Structure(_) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_get_structure(invocation, {index}, true, arg{index}, &arg{index}_size);"
                )?;
                write_status_check(out)?;
                writeln!(out, "\targ{index}_should_cleanup_on_fail = true;")?;
            }
            Type::Function(_) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_get_invocation(invocation, {index}, &arg{index}_invocation);"
                )?;
                write_status_check(out)?;
                writeln!(out, "\t*arg{index} = {};", callback_wrapper(parameter.type_id))?;
                writeln!(out, "\t*_context_arg{index} = arg{index}_invocation;")?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "out:")?;
    writeln!(out, "\tif (invocation) {{")?;
    writeln!(out, "\t\tspooky_release(invocation);")?;
    writeln!(out, "\t}}")?;

    if has_failure_cleanup {
        writeln!(out)?;
        writeln!(out, "\tif (status != ferr_ok) {{")?;
        for (index, parameter) in signature.parameters.iter().enumerate().rev() {
            match (registry.get(parameter.type_id), parameter.direction) {
                (Type::Basic(tag), Direction::Out) => {
                    if let Some(release) = classify(*tag).release_function() {
                        writeln!(out, "\t\tif (arg{index}_should_cleanup_on_fail) {{")?;
                        writeln!(out, "\t\t\t{release}(*arg{index});")?;
                        writeln!(out, "\t\t}}")?;
                    }
                }
                (Type::Structure(_), Direction::Out) => {
                    writeln!(out, "\t\tif (arg{index}_should_cleanup_on_fail) {{")?;
                    writeln!(
                        out,
                        "\t\t\tspooky_release_object_with_type(arg{index}, _spookygen_types[{}]);",
                        parameter.type_id
                    )?;
                    writeln!(out, "\t\t}}")?;
                }
                (Type::Function(_), Direction::Out) => {
                    writeln!(out, "\t\tif (arg{index}_invocation) {{")?;
                    writeln!(out, "\t\t\tspooky_release(arg{index}_invocation);")?;
                    writeln!(out, "\t\t}}")?;
                }
                (Type::Function(_), Direction::In) => {
                    writeln!(out, "\t\tif (arg{index}_callback_context) {{")?;
                    writeln!(
                        out,
                        "\t\t\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(arg{index}_callback_context));"
                    )?;
                    writeln!(out, "\t\t}}")?;
                }
                (Type::Basic(_) | Type::Structure(_), Direction::In) => {}
            }
        }
        writeln!(out, "\t}}")?;
    }

    writeln!(out)?;
    writeln!(out, "\treturn status;")?;
    writeln!(out, "}}")?;
    writeln!(out)
}

/// The public `<iface>_<fn>` symbol, taking the declared parameter types.
fn write_forwarder(ctx: &mut EmitContext, interface: &Interface, function: &Function) -> fmt::Result {
    let storage = ctx.storage_macro();
    let prefix = format!("{}_{}", interface.name, function.name);
    let out = &mut ctx.source;

    write!(out, "{storage} ferr_t {prefix}(void* _spookygen_context")?;
    write_declared_parameters(out, &prefix, &function.signature.parameters)?;
    writeln!(out, ") {{")?;

    write!(out, "\treturn _spookygen_internal_{prefix}(_spookygen_context")?;
    for parameter in &function.signature.parameters {
        let name = &parameter.name;
        match (&parameter.type_, parameter.direction) {
            (TypeExpr::Basic(_), _) => write!(out, ", {name}")?,
            (TypeExpr::Structure(_), Direction::In) => write!(out, ", (const void*){name}")?,
            (TypeExpr::Structure(_), Direction::Out) => write!(out, ", (void*){name}")?,
            (TypeExpr::Function(_), _) => write!(out, ", (void*){name}, _context_{name}")?,
        }
    }
    writeln!(out, ");")?;
    writeln!(out, "}}")?;
    writeln!(out)
}
