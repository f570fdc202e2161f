//! Trampolines run by the runtime when the peer invokes a function on this side: interface
//! methods that are served here and callbacks that were handed out to the peer.

use std::fmt::{self, Write};

use spooky_idl::{classify, BasicTypeTag, Direction, Function, FunctionType, Interface, Type, TypeId};

use super::common::{
    callback_handler, callback_wrapper, function_typedef, native_basic_type, shadow_struct,
    write_status_check, EmitContext, WrapperKind,
};
use super::outgoing;

/// Where an incoming trampoline finds the function to run.
#[derive(Copy, Clone, Debug)]
pub(super) enum IncomingTarget<'a> {
    /// The `<root>_<fn>_impl` symbol the user links in.
    Static {
        interface: &'a Interface,
        function: &'a Function,
    },
    /// A slot of the `<iface>_proxy_info_t` table the proxy was created with.
    Proxy {
        interface: &'a Interface,
        function: &'a Function,
    },
    /// A heap-allocated `struct _spookygen_callback_context` registered with the invocation the
    /// callback was passed in.
    Boxed { type_id: TypeId },
}

impl IncomingTarget<'_> {
    fn name(&self) -> String {
        match self {
            Self::Static { interface, function } | Self::Proxy { interface, function } => {
                format!("_spookygen_impl_{}_{}", interface.name, function.name)
            }
            Self::Boxed { type_id } => callback_handler(*type_id),
        }
    }

    fn type_id(&self) -> TypeId {
        match self {
            Self::Static { function, .. } | Self::Proxy { function, .. } => function.type_id,
            Self::Boxed { type_id } => *type_id,
        }
    }
}

pub(super) fn write_method_trampoline(ctx: &mut EmitContext, target: IncomingTarget) -> fmt::Result {
    write_trampoline(ctx, target)
}

/// Emits `_spookygen_callback_handler_<id>` unless it already exists.
pub(super) fn ensure_callback_handler(ctx: &mut EmitContext, type_id: TypeId) -> fmt::Result {
    if !ctx.claim(WrapperKind::IncomingCallback, type_id) {
        return Ok(());
    }
    write_trampoline(ctx, IncomingTarget::Boxed { type_id })
}

fn function_type<'r>(ctx: &EmitContext<'r>, type_id: TypeId) -> &'r FunctionType {
    ctx.registry
        .function(type_id)
        .expect("callable ids always refer to function types")
}

fn zero_value(tag: BasicTypeTag) -> &'static str {
    if classify(tag).is_refcounted {
        "NULL"
    } else if tag == BasicTypeTag::Bool {
        "false"
    } else {
        "0"
    }
}

fn write_trampoline(ctx: &mut EmitContext, target: IncomingTarget) -> fmt::Result {
    let registry = ctx.registry;
    let type_id = target.type_id();
    let signature = function_type(ctx, type_id);

    // The implementation calls out through callbacks it receives and the peer calls into
    // callbacks the implementation hands back.
    for parameter in &signature.parameters {
        if let Type::Function(_) = registry.get(parameter.type_id) {
            match parameter.direction {
                Direction::In => outgoing::ensure_callback_wrapper(ctx, parameter.type_id)?,
                Direction::Out => ensure_callback_handler(ctx, parameter.type_id)?,
            }
        }
    }

    let out = &mut ctx.source;
    writeln!(
        out,
        "static void {}(void* context, spooky_invocation_t* invocation) {{",
        target.name()
    )?;
    writeln!(out, "\tferr_t status = ferr_ok;")?;
    writeln!(out, "\t{} target = NULL;", function_typedef(type_id))?;
    writeln!(out, "\tvoid* target_context = NULL;")?;

    for (index, parameter) in signature.parameters.iter().enumerate() {
        match (registry.get(parameter.type_id), parameter.direction) {
            (Type::Basic(tag), _) => {
                writeln!(out, "\t{} arg{index} = {};", native_basic_type(*tag), zero_value(*tag))?;
            }
            (Type::Structure(_), direction) => {
                writeln!(out, "\tstruct {} arg{index};", shadow_struct(parameter.type_id))?;
                if direction == Direction::In {
                    writeln!(out, "\tsize_t arg{index}_size = sizeof(arg{index});")?;
                }
            }
            (Type::Function(_), Direction::In) => {
                writeln!(out, "\tspooky_invocation_t* arg{index}_invocation = NULL;")?;
            }
            (Type::Function(_), Direction::Out) => {
                writeln!(
                    out,
                    "\tstruct _spookygen_callback_context* arg{index}_callback_context = NULL;"
                )?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "\t_spookygen_ensure_init();")?;
    writeln!(out)?;

    let mut zeroed_any = false;
    for (index, parameter) in signature.parameters.iter().enumerate() {
        if let Type::Structure(_) = registry.get(parameter.type_id) {
            writeln!(out, "\tsimple_memset(&arg{index}, 0, sizeof(arg{index}));")?;
            zeroed_any = true;
        }
    }
    if zeroed_any {
        writeln!(out)?;
    }

    writeln!(out, "\tif (!invocation) {{")?;
    if let IncomingTarget::Boxed { .. } = target {
        // the invocation was torn down without ever firing the callback
        writeln!(out, "\t\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(context));")?;
    }
    writeln!(out, "\t\treturn;")?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;

    match target {
        IncomingTarget::Static { interface, function } => {
            writeln!(out, "\ttarget = (void*){}_{}_impl;", interface.name, function.name)?;
        }
        IncomingTarget::Proxy { interface, function } => {
            writeln!(
                out,
                "\ttarget = (void*)(({}_proxy_info_t*)context)->{};",
                interface.name, function.name
            )?;
            writeln!(
                out,
                "\ttarget_context = (({}_proxy_info_t*)context)->context;",
                interface.name
            )?;
        }
        IncomingTarget::Boxed { .. } => {
            writeln!(out, "\ttarget = ((struct _spookygen_callback_context*)context)->target;")?;
            writeln!(
                out,
                "\ttarget_context = ((struct _spookygen_callback_context*)context)->target_context;"
            )?;
            // once fired, the box is not passed again on teardown
            writeln!(out, "\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(context));")?;
        }
    }
    writeln!(out)?;

    for (index, parameter) in signature.parameters.iter().enumerate() {
        match (registry.get(parameter.type_id), parameter.direction) {
            (Type::Basic(tag), Direction::In) => {
                let retain = if classify(*tag).is_refcounted { ", false" } else { "" };
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_get_{}(invocation, {index}{retain}, &arg{index});",
                    tag.name()
                )?;
                write_status_check(out)?;
            }
            (Type::Structure(_), Direction::In) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_get_structure(invocation, {index}, false, &arg{index}, &arg{index}_size);"
                )?;
                write_status_check(out)?;
            }
            (Type::Function(_), Direction::In) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_get_invocation(invocation, {index}, &arg{index}_invocation);"
                )?;
                write_status_check(out)?;
            }
            (Type::Function(_), Direction::Out) => {
                writeln!(
                    out,
                    "\tstatus = sys_mempool_allocate(sizeof(*arg{index}_callback_context), NULL, (void*)&arg{index}_callback_context);"
                )?;
                write_status_check(out)?;
                writeln!(out, "\targ{index}_callback_context->target = NULL;")?;
                writeln!(out, "\targ{index}_callback_context->target_context = NULL;")?;
            }
            (Type::Basic(_) | Type::Structure(_), Direction::Out) => {}
        }
    }

    write!(out, "\tstatus = target(target_context")?;
    for (index, parameter) in signature.parameters.iter().enumerate() {
        match (registry.get(parameter.type_id), parameter.direction) {
            (Type::Basic(_), Direction::In) => write!(out, ", arg{index}")?,
            (Type::Basic(_), Direction::Out) | (Type::Structure(_), _) => {
                write!(out, ", &arg{index}")?
            }
            (Type::Function(_), Direction::In) => write!(
                out,
                ", {}, arg{index}_invocation",
                callback_wrapper(parameter.type_id)
            )?,
            (Type::Function(_), Direction::Out) => write!(
                out,
                ", (void*)&arg{index}_callback_context->target, &arg{index}_callback_context->target_context"
            )?,
        }
    }
    writeln!(out, ");")?;

    // callback invocations belong to the implementation from here on
    for (index, parameter) in signature.parameters.iter().enumerate() {
        if let (Type::Function(_), Direction::In) =
            (registry.get(parameter.type_id), parameter.direction)
        {
            writeln!(out, "\targ{index}_invocation = NULL;")?;
        }
    }
    write_status_check(out)?;
    writeln!(out)?;

    for (index, parameter) in signature.parameters.iter().enumerate() {
        if parameter.direction == Direction::In {
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
                    "\tstatus = spooky_invocation_set_structure(invocation, {index}, &arg{index});"
                )?;
                write_status_check(out)?;
            }
            Type::Function(_) => {
                writeln!(
                    out,
                    "\tstatus = spooky_invocation_set_function(invocation, {index}, {}, arg{index}_callback_context);",
                    callback_handler(parameter.type_id)
                )?;
                write_status_check(out)?;
                writeln!(out, "\targ{index}_callback_context = NULL;")?;
            }
        }
    }

    writeln!(out, "\tstatus = spooky_invocation_complete(invocation);")?;
    writeln!(out)?;
    writeln!(out, "out:")?;
    writeln!(out, "\tif (status != ferr_ok) {{")?;
    writeln!(out, "\t\tLIBSPOOKY_WUR_IGNORE(spooky_invocation_abort(invocation));")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\tspooky_release(invocation);")?;

    for (index, parameter) in signature.parameters.iter().enumerate().rev() {
        match (registry.get(parameter.type_id), parameter.direction) {
            (Type::Basic(tag), Direction::Out) => {
                if let Some(release) = classify(*tag).release_function() {
                    writeln!(out, "\tif (arg{index}) {{")?;
                    writeln!(out, "\t\t{release}(arg{index});")?;
                    writeln!(out, "\t}}")?;
                }
            }
            (Type::Structure(_), Direction::Out) => {
                writeln!(
                    out,
                    "\tspooky_release_object_with_type(&arg{index}, _spookygen_types[{}]);",
                    parameter.type_id
                )?;
            }
            (Type::Function(_), Direction::Out) => {
                writeln!(out, "\tif (arg{index}_callback_context) {{")?;
                writeln!(
                    out,
                    "\t\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(arg{index}_callback_context));"
                )?;
                writeln!(out, "\t}}")?;
            }
            (Type::Function(_), Direction::In) => {
                writeln!(out, "\tif (arg{index}_invocation) {{")?;
                writeln!(out, "\t\tspooky_release(arg{index}_invocation);")?;
                writeln!(out, "\t}}")?;
            }
            (Type::Basic(_) | Type::Structure(_), Direction::In) => {}
        }
    }

    writeln!(out, "}}")?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::{generate, Role};

    fn server_source(idl: &str) -> String {
        let (unit, registry) = spooky_idl::read_unit(idl).unwrap();
        generate(&unit, &registry, Role::Server, "test.h").unwrap().source
    }

    fn function_body<'a>(source: &'a str, signature: &str) -> &'a str {
        let begin = source.find(signature).expect("function not found");
        let end = source[begin..].find("\n}\n").expect("unterminated function") + begin;
        &source[begin..end + 3]
    }

    #[test]
    fn static_trampoline_marshals_every_direction() {
        let source = server_source(
            "@interface Store;
             struct Point { x: i32, y: i32 }
             interface Store { put(key: in data, at: in Point, moved: out Point, link: out channel, count: out u8); }",
        );

        assert_eq!(
            function_body(&source, "static void _spookygen_impl_Store_put("),
            "static void _spookygen_impl_Store_put(void* context, spooky_invocation_t* invocation) {
\tferr_t status = ferr_ok;
\t_spookygen_type_5_f target = NULL;
\tvoid* target_context = NULL;
\tsys_data_t* arg0 = NULL;
\tstruct _spookygen_struct_1 arg1;
\tsize_t arg1_size = sizeof(arg1);
\tstruct _spookygen_struct_1 arg2;
\tsys_channel_t* arg3 = NULL;
\tuint8_t arg4 = 0;

\t_spookygen_ensure_init();

\tsimple_memset(&arg1, 0, sizeof(arg1));
\tsimple_memset(&arg2, 0, sizeof(arg2));

\tif (!invocation) {
\t\treturn;
\t}

\ttarget = (void*)Store_put_impl;

\tstatus = spooky_invocation_get_data(invocation, 0, false, &arg0);
\tif (status != ferr_ok) {
\t\tgoto out;
\t}
\tstatus = spooky_invocation_get_structure(invocation, 1, false, &arg1, &arg1_size);
\tif (status != ferr_ok) {
\t\tgoto out;
\t}
\tstatus = target(target_context, arg0, &arg1, &arg2, &arg3, &arg4);
\tif (status != ferr_ok) {
\t\tgoto out;
\t}

\tstatus = spooky_invocation_set_structure(invocation, 2, &arg2);
\tif (status != ferr_ok) {
\t\tgoto out;
\t}
\tstatus = spooky_invocation_set_channel(invocation, 3, arg3);
\tif (status != ferr_ok) {
\t\tgoto out;
\t}
\targ3 = NULL;
\tstatus = spooky_invocation_set_u8(invocation, 4, arg4);
\tif (status != ferr_ok) {
\t\tgoto out;
\t}
\tstatus = spooky_invocation_complete(invocation);

out:
\tif (status != ferr_ok) {
\t\tLIBSPOOKY_WUR_IGNORE(spooky_invocation_abort(invocation));
\t}
\tspooky_release(invocation);
\tif (arg3) {
\t\tsys_release(arg3);
\t}
\tspooky_release_object_with_type(&arg2, _spookygen_types[1]);
}
"
        );
    }

    #[test]
    fn callback_box_is_freed_exactly_once() {
        let source = server_source(
            "@interface Timer;
             interface Timer { schedule(delay: in u64, fired: out fn(late: in bool)); }",
        );

        let handler = function_body(&source, "static void _spookygen_callback_handler_2(");
        let teardown = "\tif (!invocation) {\n\t\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(context));\n\t\treturn;\n\t}\n";
        assert!(handler.contains(teardown));
        assert!(handler.contains(
            "\ttarget_context = ((struct _spookygen_callback_context*)context)->target_context;\n\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(context));\n"
        ));
        assert_eq!(handler.matches("sys_mempool_free(context)").count(), 2);

        let schedule = function_body(&source, "static void _spookygen_impl_Timer_schedule(");
        assert!(schedule.contains("status = target(target_context, arg0, (void*)&arg1_callback_context->target, &arg1_callback_context->target_context);"));
        assert!(schedule.contains(
            "status = spooky_invocation_set_function(invocation, 1, _spookygen_callback_handler_2, arg1_callback_context);\n\tif (status != ferr_ok) {\n\t\tgoto out;\n\t}\n\targ1_callback_context = NULL;\n"
        ));
        assert!(schedule.ends_with(
            "\tif (arg1_callback_context) {\n\t\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(arg1_callback_context));\n\t}\n}\n"
        ));

        // the handler is defined before the trampoline that registers it
        assert!(source.find("_spookygen_callback_handler_2(void* context").unwrap()
            < source.find("_spookygen_impl_Timer_schedule(void* context").unwrap());
    }

    #[test]
    fn in_callbacks_are_handed_to_the_implementation() {
        let source = server_source(
            "@interface Jobs;
             interface Jobs { run(done: in fn(code: in i32)); }",
        );
        let run = function_body(&source, "static void _spookygen_impl_Jobs_run(");
        assert!(run.contains("\tspooky_invocation_t* arg0_invocation = NULL;\n"));
        assert!(run.contains("status = spooky_invocation_get_invocation(invocation, 0, &arg0_invocation);"));
        assert!(run.contains("status = target(target_context, _spookygen_callback_1, arg0_invocation);\n\targ0_invocation = NULL;\n"));
        assert!(run.contains("\tif (arg0_invocation) {\n\t\tspooky_release(arg0_invocation);\n\t}\n"));
    }

    #[test]
    fn proxy_trampoline_reads_the_info_table() {
        let source = server_source(
            "interface Handle { read(count: in u64, contents: out data); }",
        );
        let read = function_body(&source, "static void _spookygen_impl_Handle_read(");
        assert!(read.contains("\ttarget = (void*)((Handle_proxy_info_t*)context)->read;\n\ttarget_context = ((Handle_proxy_info_t*)context)->context;\n"));
        assert!(read.contains("\tif (arg1) {\n\t\tspooky_release(arg1);\n\t}\n"));
    }
}
