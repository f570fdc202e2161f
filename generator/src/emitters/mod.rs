//! C code generation for a built compilation unit.
//!
//! Every emitter appends to the two output buffers held by an [`EmitContext`]; the order of the
//! calls in [`generate`] is the order of the definitions in the generated files.

mod common;
mod descriptors;
mod header;
mod incoming;
mod interface;
mod outgoing;

use std::fmt;

use spooky_idl::{CompilationUnit, TypeRegistry};
use tracing::{debug, instrument};

use self::common::EmitContext;
use self::incoming::IncomingTarget;
use self::outgoing::OutgoingTarget;

/// Which side of the root interface the generated code is for. Non-root interfaces are always
/// generated for both sides since they are passed around as proxies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub header: String,
    pub source: String,
}

/// Generates the header and the source for `unit`. `header_include` is the name the source uses
/// to include the header.
#[instrument(level = "debug", skip(unit, registry))]
pub fn generate(
    unit: &CompilationUnit,
    registry: &TypeRegistry,
    role: Role,
    header_include: &str,
) -> Result<Output, fmt::Error> {
    let mut ctx = EmitContext::new(unit, registry, role);

    header::write_prelude(&mut ctx)?;
    header::write_structures(&mut ctx)?;
    header::write_function_declarations(&mut ctx)?;
    header::write_proxy_infos(&mut ctx)?;
    header::write_bootstrap_declarations(&mut ctx)?;

    descriptors::write_prelude(&mut ctx, header_include)?;
    interface::write_bootstrap_state(&mut ctx)?;
    descriptors::write_shadow_structures(&mut ctx)?;
    descriptors::write_initializer(&mut ctx)?;
    descriptors::write_function_typedefs(&mut ctx)?;

    for iface in &unit.interfaces {
        let is_root = unit.is_root(iface);
        for function in &iface.functions {
            if ctx.serves(iface) {
                let target = if is_root {
                    IncomingTarget::Static { interface: iface, function }
                } else {
                    IncomingTarget::Proxy { interface: iface, function }
                };
                incoming::write_method_trampoline(&mut ctx, target)?;
            }
            if ctx.calls(iface) {
                let target = if is_root {
                    OutgoingTarget::RootMethod { interface: iface, function }
                } else {
                    OutgoingTarget::ProxyMethod { interface: iface, function }
                };
                outgoing::write_method_wrapper(&mut ctx, target)?;
            }
        }
    }

    interface::write_bootstrap(&mut ctx)?;
    for iface in unit.interfaces.iter().filter(|i| !unit.is_root(i)) {
        interface::write_proxy_constructor(&mut ctx, iface)?;
    }

    debug!(
        header_len = ctx.header.len(),
        source_len = ctx.source.len(),
        "generated bindings"
    );

    Ok(Output {
        header: ctx.header,
        source: ctx.source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_for(source: &str, role: Role) -> Output {
        let (unit, registry) = spooky_idl::read_unit(source).unwrap();
        generate(&unit, &registry, role, "echo.h").unwrap()
    }

    const ECHO: &str = r#"
        @interface Echo;
        @server_name "echo";

        struct Point { x: i32, y: i32 }

        interface Echo {
            get_origin(out_point: out Point);
            [nowait] negate(value: in i32, out_value: out i32);
            start(on_done: in fn(code: in i32));
            again(on_done: in fn(code: in i32));
            fetch(contents: out data);
            send(contents: in data);
        }
    "#;

    #[test]
    fn scenario_structure_out_parameter() {
        let output = generate_for(ECHO, Role::Client);
        assert!(output.header.contains(
            "SPOOKYGEN_Echo_STORAGE LIBSPOOKY_WUR ferr_t Echo_get_origin(void* context, struct Point* out_point);"
        ));
        assert!(output
            .source
            .contains("status = spooky_invocation_get_structure(invocation, 0, true, arg0, &arg0_size);"));
        assert!(output.source.contains(
            "SPOOKYGEN_Echo_STORAGE ferr_t Echo_get_origin(void* _spookygen_context, struct Point* out_point) {\n\treturn _spookygen_internal_Echo_get_origin(_spookygen_context, (void*)out_point);\n}"
        ));
    }

    #[test]
    fn scenario_nowait_descriptor() {
        let output = generate_for(ECHO, Role::Client);
        // negate(in i32, out i32) gets the first id after i32, Point, get_origin
        assert!(output.source.contains(
            "sys_abort_status_log(spooky_function_create(false, parameters, 2, &_spookygen_types[3]));"
        ));
        assert!(output.source.contains(
            "sys_abort_status_log(spooky_function_create(true, parameters, 1, &_spookygen_types[2]));"
        ));

        let negate = output
            .source
            .split("static ferr_t _spookygen_internal_Echo_negate(")
            .nth(1)
            .unwrap();
        let negate = &negate[..negate.find("\n}\n").unwrap()];
        assert!(negate.contains("spooky_invocation_create(\"negate\", 6, _spookygen_types[3], channel, &invocation);"));
        assert!(negate.contains("status = spooky_invocation_execute_sync(invocation);"));
        assert!(negate.contains("status = spooky_invocation_get_i32(invocation, 1, arg1);"));
    }

    #[test]
    fn scenario_callback_parameter() {
        let client = generate_for(ECHO, Role::Client);
        assert!(client.source.contains("static ferr_t _spookygen_internal_Echo_start(void* context, _spookygen_type_4_f arg0, void* _context_arg0) {"));
        assert!(client.source.contains("static void _spookygen_callback_handler_4(void* context, spooky_invocation_t* invocation) {"));
        assert!(client.source.contains("status = spooky_invocation_set_function(invocation, 0, _spookygen_callback_handler_4, arg0_callback_context);"));

        let server = generate_for(ECHO, Role::Server);
        assert!(server.source.contains("static void _spookygen_impl_Echo_start(void* context, spooky_invocation_t* invocation) {"));
        assert!(server.source.contains("static ferr_t _spookygen_callback_4(void* context, int32_t arg0) {"));
        assert!(server.source.contains("\ttarget = (void*)Echo_start_impl;\n"));
        assert!(server.source.contains("status = target(target_context, _spookygen_callback_4, arg0_invocation);"));
    }

    #[test]
    fn callback_glue_is_emitted_once_per_shape() {
        let client = generate_for(ECHO, Role::Client);
        assert_eq!(
            client
                .source
                .matches("static void _spookygen_callback_handler_4(")
                .count(),
            1
        );

        let server = generate_for(ECHO, Role::Server);
        assert_eq!(
            server
                .source
                .matches("static ferr_t _spookygen_callback_4(")
                .count(),
            1
        );
    }

    /// Asserts that the first mention of each glue function is its definition.
    fn assert_defined_before_use(source: &str, definitions: &[&str]) {
        for definition in definitions {
            let name = definition
                .split_whitespace()
                .last()
                .and_then(|name| name.strip_suffix('('))
                .unwrap();
            let defined_at = source.find(definition).expect("missing definition");
            assert_eq!(
                source.find(name),
                Some(defined_at + definition.len() - name.len() - 1),
                "{name} is used before it is defined"
            );
            assert_eq!(source.matches(definition).count(), 1, "{name} is defined twice");
        }
    }

    #[test]
    fn nested_callbacks_recurse_between_directions() {
        // bool = 0, fn(in bool) = 1, fn(out fn(in bool)) = 2
        const WATCH: &str = "@interface F; @server_name \"f\";
            interface F {
                watch(on_change: in fn(ack: out fn(ok: in bool)));
                give(cb: out fn(ok: in bool));
            }";

        let client = generate_for(WATCH, Role::Client).source;
        assert_defined_before_use(
            &client,
            &[
                "static void _spookygen_callback_handler_1(",
                "static void _spookygen_callback_handler_2(",
                "static ferr_t _spookygen_internal_F_watch(",
                "static ferr_t _spookygen_callback_1(",
                "static ferr_t _spookygen_internal_F_give(",
            ],
        );
        assert!(!client.contains("_spookygen_callback_2("));

        let server = generate_for(WATCH, Role::Server).source;
        assert_defined_before_use(
            &server,
            &[
                "static ferr_t _spookygen_callback_1(",
                "static ferr_t _spookygen_callback_2(",
                "static void _spookygen_impl_F_watch(",
                "static void _spookygen_callback_handler_1(",
                "static void _spookygen_impl_F_give(",
            ],
        );
        assert!(!server.contains("_spookygen_callback_handler_2("));

        // the handler for `ack` answers through the wrapper of its own direction
        let handler = &client[client.find("static void _spookygen_callback_handler_2(").unwrap()..];
        assert!(handler[..handler.find("\n}\n").unwrap()].contains("_spookygen_callback_handler_1"));
        let wrapper = &server[server.find("static ferr_t _spookygen_callback_2(").unwrap()..];
        assert!(wrapper[..wrapper.find("\n}\n").unwrap()].contains("_spookygen_callback_1"));
    }

    #[test]
    fn refcounted_values_follow_ownership() {
        let client = generate_for(ECHO, Role::Client);
        let fetch = client
            .source
            .split("static ferr_t _spookygen_internal_Echo_fetch(")
            .nth(1)
            .unwrap();
        let fetch = &fetch[..fetch.find("\n}\n").unwrap()];
        assert!(fetch.contains("status = spooky_invocation_get_data(invocation, 0, true, arg0);"));
        assert!(fetch.contains("\t\tif (arg0_should_cleanup_on_fail) {\n\t\t\tspooky_release(*arg0);\n\t\t}"));

        let server = generate_for(ECHO, Role::Server);
        let send = server
            .source
            .split("static void _spookygen_impl_Echo_send(")
            .nth(1)
            .unwrap();
        let send = &send[..send.find("\n}\n").unwrap()];
        assert!(send.contains("status = spooky_invocation_get_data(invocation, 0, false, &arg0);"));
        assert!(!send.contains("spooky_release(arg0)"));
    }

    #[test]
    fn roles_select_bootstrap() {
        let server = generate_for(ECHO, Role::Server);
        assert!(server.source.contains("static sys_mutex_t _spookygen_server_mutex = SYS_MUTEX_INIT;"));
        assert!(server.source.contains("return Echo_serve_explicit(\"echo\", 4, sys_channel_realm_global, loop, out_server_channel);"));
        assert!(!server.source.contains("_spookygen_client_mutex"));
        assert!(!server.source.contains("_spookygen_internal_Echo_"));

        let client = generate_for(ECHO, Role::Client);
        assert!(client.source.contains("static eve_channel_t* _spookygen_channel = NULL;"));
        assert!(client.source.contains("return Echo_init_explicit(\"echo\", 4, sys_channel_realm_global, loop);"));
        assert!(!client.source.contains("_spookygen_server_mutex"));
        assert!(!client.source.contains("_spookygen_impl_Echo_"));
    }

    #[test]
    fn client_realm_is_mirrored() {
        let output = generate_for(
            "@interface Echo; @server_name \"echo\"; @server_realm children; interface Echo { ping(); }",
            Role::Client,
        );
        assert!(output.source.contains("sys_channel_realm_parent"));
        assert!(!output.source.contains("sys_channel_realm_children"));
    }

    #[test]
    fn proxies_are_generated_for_both_roles() {
        let source = "@interface Files; interface Handle { close(); } interface Files { open(handle: out Handle); }";
        for role in [Role::Client, Role::Server] {
            let output = generate_for(source, role);
            assert!(output.source.contains("static void _spookygen_impl_Handle_close("));
            assert!(output.source.contains("static ferr_t _spookygen_internal_Handle_close("));
            assert!(output.source.contains("ferr_t Handle_create_proxy(const Handle_proxy_info_t* info, spooky_proxy_t** out_proxy) {"));
        }
    }

    #[test]
    fn unit_without_root_interface() {
        let output = generate_for("interface Handle { close(); }", Role::Client);
        assert!(output.header.contains("#ifndef SPOOKYGEN_STORAGE"));
        assert!(output.source.contains("static spooky_type_t* _spookygen_types[1];"));
        assert!(!output.source.contains("_spookygen_client_mutex"));
        assert!(!output.source.contains("_init_explicit"));
        assert!(output.source.contains("Handle_create_proxy"));
    }
}
