//! Process-wide bootstrap of the root interface (serving it or connecting to it) and the proxy
//! constructors of every other interface.

use std::fmt::{self, Write};

use spooky_idl::Interface;

use super::common::{c_string_literal, write_nested_status_check, write_status_check, EmitContext};
use super::Role;

/// Singletons guarding the server listener or the shared client connection.
pub(super) fn write_bootstrap_state(ctx: &mut EmitContext) -> fmt::Result {
    let unit = ctx.unit;
    let Some(root) = unit.root_interface() else {
        return Ok(());
    };
    let out = &mut ctx.source;
    match ctx.role {
        Role::Server => {
            writeln!(out, "static sys_mutex_t _spookygen_server_mutex = SYS_MUTEX_INIT;")?;
            writeln!(out, "static spooky_interface_t* _spookygen_interface = NULL;")?;
            writeln!(out, "static eve_server_channel_t* _spookygen_server_channel = NULL;")?;
            writeln!(out)
        }
        Role::Client => {
            writeln!(out, "static sys_mutex_t _spookygen_client_mutex = SYS_MUTEX_INIT;")?;
            writeln!(out, "static eve_channel_t* _spookygen_channel = NULL;")?;
            writeln!(out)?;
            writeln!(out, "static ferr_t {}_init_explicit_locked(const char* name, size_t name_length, sys_channel_realm_t realm, eve_loop_t* loop);", root.name)?;
            writeln!(out)
        }
    }
}

pub(super) fn write_bootstrap(ctx: &mut EmitContext) -> fmt::Result {
    let unit = ctx.unit;
    let Some(root) = unit.root_interface() else {
        return Ok(());
    };
    match ctx.role {
        Role::Server => write_server_bootstrap(ctx, root),
        Role::Client => write_client_bootstrap(ctx, root),
    }
}

/// Writes `entries[i]` assignments for every method of `interface`. Returns the expression to pass
/// as the entry array.
fn write_entries(out: &mut String, interface: &Interface, with_context: bool) -> Result<&'static str, fmt::Error> {
    if interface.functions.is_empty() {
        return Ok("NULL");
    }
    for (index, function) in interface.functions.iter().enumerate() {
        let (literal, length) = c_string_literal(&function.name);
        writeln!(out, "\tentries[{index}].name = {literal};")?;
        writeln!(out, "\tentries[{index}].name_length = {length};")?;
        writeln!(out, "\tentries[{index}].function = _spookygen_types[{}];", function.type_id)?;
        writeln!(
            out,
            "\tentries[{index}].implementation = _spookygen_impl_{}_{};",
            interface.name, function.name
        )?;
        if with_context {
            writeln!(out, "\tentries[{index}].context = NULL;")?;
        }
    }
    writeln!(out)?;
    Ok("entries")
}

fn write_server_bootstrap(ctx: &mut EmitContext, root: &Interface) -> fmt::Result {
    let storage = ctx.storage_macro();
    let unit = ctx.unit;
    let out = &mut ctx.source;
    let name = &root.name;
    let entry_count = root.functions.len();

    writeln!(out, "static void _spookygen_server_handler(void* context, eve_server_channel_t* server_channel, sys_channel_t* channel) {{")?;
    writeln!(out, "\tLIBSPOOKY_WUR_IGNORE(spooky_interface_adopt(_spookygen_interface, channel, eve_loop_get_current()));")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "spooky_interface_t* {name}_interface(void) {{")?;
    writeln!(out, "\treturn _spookygen_interface;")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    if let Some(server_name) = &unit.default_server_name {
        let (literal, length) = c_string_literal(server_name);
        writeln!(out, "{storage} ferr_t {name}_serve(eve_loop_t* loop, eve_server_channel_t** out_server_channel) {{")?;
        writeln!(
            out,
            "\treturn {name}_serve_explicit({literal}, {length}, sys_channel_realm_{}, loop, out_server_channel);",
            unit.server_realm().name()
        )?;
        writeln!(out, "}}")?;
        writeln!(out)?;
    }

    writeln!(out, "{storage} ferr_t {name}_serve_explicit(const char* name, size_t name_length, sys_channel_realm_t realm, eve_loop_t* loop, eve_server_channel_t** out_server_channel) {{")?;
    writeln!(out, "\tferr_t status = ferr_ok;")?;
    if entry_count > 0 {
        writeln!(out, "\tspooky_interface_entry_t entries[{entry_count}];")?;
    }
    writeln!(out, "\tsys_server_channel_t* sys_server_channel = NULL;")?;
    writeln!(out)?;
    writeln!(out, "\t_spookygen_ensure_init();")?;
    writeln!(out)?;
    writeln!(out, "\tsys_mutex_lock(&_spookygen_server_mutex);")?;
    writeln!(out)?;
    writeln!(out, "\tif (_spookygen_server_channel != NULL) {{")?;
    writeln!(out, "\t\tstatus = ferr_already_in_progress;")?;
    writeln!(out, "\t\tgoto out;")?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;

    let entries = write_entries(out, root, true)?;

    // kept across failed attempts, so a retry reuses it
    writeln!(out, "\tif (!_spookygen_interface) {{")?;
    writeln!(
        out,
        "\t\tstatus = spooky_interface_create({entries}, {entry_count}, &_spookygen_interface);"
    )?;
    write_nested_status_check(out, 2)?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;
    writeln!(out, "\tstatus = sys_server_channel_create_n(name, name_length, realm, &sys_server_channel);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\tstatus = eve_server_channel_create(sys_server_channel, NULL, &_spookygen_server_channel);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\tsys_release(sys_server_channel);")?;
    writeln!(out, "\tsys_server_channel = NULL;")?;
    writeln!(out)?;
    writeln!(out, "\teve_server_channel_set_handler(_spookygen_server_channel, _spookygen_server_handler);")?;
    writeln!(out)?;
    writeln!(out, "\tstatus = eve_loop_add_item(loop, _spookygen_server_channel);")?;
    writeln!(out, "\tif (status != ferr_ok) {{")?;
    writeln!(out, "\t\teve_release(_spookygen_server_channel);")?;
    writeln!(out, "\t\t_spookygen_server_channel = NULL;")?;
    writeln!(out, "\t\tgoto out;")?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;
    writeln!(out, "\tif (out_server_channel) {{")?;
    writeln!(out, "\t\tsys_abort_status_log(eve_retain(_spookygen_server_channel));")?;
    writeln!(out, "\t\t*out_server_channel = _spookygen_server_channel;")?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;
    writeln!(out, "out:")?;
    writeln!(out, "\tsys_mutex_unlock(&_spookygen_server_mutex);")?;
    writeln!(out, "\tif (sys_server_channel) {{")?;
    writeln!(out, "\t\tsys_release(sys_server_channel);")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\treturn status;")?;
    writeln!(out, "}}")?;
    writeln!(out)
}

fn write_client_bootstrap(ctx: &mut EmitContext, root: &Interface) -> fmt::Result {
    let storage = ctx.storage_macro();
    let unit = ctx.unit;
    let out = &mut ctx.source;
    let name = &root.name;

    if let Some(server_name) = &unit.default_server_name {
        let (literal, length) = c_string_literal(server_name);
        writeln!(out, "{storage} ferr_t {name}_init(eve_loop_t* loop) {{")?;
        writeln!(
            out,
            "\treturn {name}_init_explicit({literal}, {length}, sys_channel_realm_{}, loop);",
            unit.client_realm().name()
        )?;
        writeln!(out, "}}")?;
        writeln!(out)?;
    }

    // the server never sends unsolicited messages
    writeln!(out, "static void _spookygen_client_message_handler(void* context, eve_channel_t* channel, sys_channel_message_t* message) {{")?;
    writeln!(out, "\tsys_release(message);")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "static void _spookygen_client_peer_close_handler(void* context, eve_channel_t* channel) {{")?;
    writeln!(out, "\tsys_mutex_lock(&_spookygen_client_mutex);")?;
    writeln!(out, "\tif (_spookygen_channel == channel) {{")?;
    writeln!(out, "\t\tsys_abort_status_log(eve_loop_remove_item(eve_loop_get_current(), channel));")?;
    writeln!(out, "\t\teve_release(_spookygen_channel);")?;
    writeln!(out, "\t\t_spookygen_channel = NULL;")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\tsys_mutex_unlock(&_spookygen_client_mutex);")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "static void _spookygen_message_send_error_handler(void* context, eve_channel_t* channel, sys_channel_message_t* message, ferr_t error) {{")?;
    writeln!(out, "\tsys_release(message);")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "static ferr_t {name}_init_explicit_locked(const char* name, size_t name_length, sys_channel_realm_t realm, eve_loop_t* loop) {{")?;
    writeln!(out, "\tferr_t status = ferr_ok;")?;
    writeln!(out, "\tsys_channel_t* sys_channel = NULL;")?;
    writeln!(out)?;
    writeln!(out, "\t_spookygen_ensure_init();")?;
    writeln!(out)?;
    writeln!(out, "\tif (_spookygen_channel != NULL) {{")?;
    writeln!(out, "\t\tstatus = ferr_already_in_progress;")?;
    writeln!(out, "\t\tgoto out;")?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;
    writeln!(out, "\tstatus = sys_channel_connect_n(name, name_length, realm, sys_channel_connect_flag_recursive_realm, &sys_channel);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\tstatus = eve_channel_create(sys_channel, NULL, &_spookygen_channel);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\tsys_release(sys_channel);")?;
    writeln!(out, "\tsys_channel = NULL;")?;
    writeln!(out)?;
    writeln!(out, "\teve_channel_set_message_handler(_spookygen_channel, _spookygen_client_message_handler);")?;
    writeln!(out, "\teve_channel_set_peer_close_handler(_spookygen_channel, _spookygen_client_peer_close_handler);")?;
    writeln!(out, "\teve_channel_set_message_send_error_handler(_spookygen_channel, _spookygen_message_send_error_handler);")?;
    writeln!(out)?;
    writeln!(out, "\tstatus = eve_loop_add_item(loop, _spookygen_channel);")?;
    writeln!(out, "\tif (status != ferr_ok) {{")?;
    writeln!(out, "\t\teve_release(_spookygen_channel);")?;
    writeln!(out, "\t\t_spookygen_channel = NULL;")?;
    writeln!(out, "\t\tgoto out;")?;
    writeln!(out, "\t}}")?;
    writeln!(out)?;
    writeln!(out, "out:")?;
    writeln!(out, "\tif (sys_channel) {{")?;
    writeln!(out, "\t\tsys_release(sys_channel);")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\treturn status;")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "{storage} ferr_t {name}_init_explicit(const char* name, size_t name_length, sys_channel_realm_t realm, eve_loop_t* loop) {{")?;
    writeln!(out, "\tferr_t status = ferr_ok;")?;
    writeln!(out)?;
    writeln!(out, "\tsys_mutex_lock(&_spookygen_client_mutex);")?;
    writeln!(out, "\tstatus = {name}_init_explicit_locked(name, name_length, realm, loop);")?;
    writeln!(out, "\tsys_mutex_unlock(&_spookygen_client_mutex);")?;
    writeln!(out, "\treturn status;")?;
    writeln!(out, "}}")?;
    writeln!(out)
}

/// `<iface>_create_proxy` copies the caller's info table and hands the copy to the runtime, which
/// owns it until the proxy destructor runs.
pub(super) fn write_proxy_constructor(ctx: &mut EmitContext, interface: &Interface) -> fmt::Result {
    let storage = ctx.storage_macro();
    let out = &mut ctx.source;
    let name = &interface.name;
    let entry_count = interface.functions.len();

    writeln!(out, "static void {name}_proxy_destructor(void* context) {{")?;
    writeln!(out, "\t{name}_proxy_info_t* info = context;")?;
    writeln!(out, "\tif (info->destructor) {{")?;
    writeln!(out, "\t\tinfo->destructor(info->context);")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(context));")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "{storage} ferr_t {name}_create_proxy(const {name}_proxy_info_t* info, spooky_proxy_t** out_proxy) {{")?;
    writeln!(out, "\tferr_t status = ferr_ok;")?;
    writeln!(out, "\tspooky_proxy_interface_t* proxy_interface = NULL;")?;
    if entry_count > 0 {
        writeln!(out, "\tspooky_proxy_interface_entry_t entries[{entry_count}];")?;
    }
    writeln!(out, "\t{name}_proxy_info_t* copy = NULL;")?;
    writeln!(out)?;
    writeln!(out, "\t_spookygen_ensure_init();")?;
    writeln!(out)?;
    writeln!(out, "\tstatus = sys_mempool_allocate(sizeof(*copy), NULL, (void*)&copy);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\tsimple_memcpy(copy, info, sizeof(*copy));")?;
    writeln!(out)?;

    let entries = write_entries(out, interface, false)?;

    writeln!(out, "\tstatus = spooky_proxy_interface_create({entries}, {entry_count}, &proxy_interface);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\tstatus = spooky_proxy_create(proxy_interface, copy, {name}_proxy_destructor, out_proxy);")?;
    write_status_check(out)?;
    writeln!(out)?;
    writeln!(out, "\t// released through the destructor from now on")?;
    writeln!(out, "\tcopy = NULL;")?;
    writeln!(out)?;
    writeln!(out, "out:")?;
    writeln!(out, "\tif (copy) {{")?;
    writeln!(out, "\t\tLIBSPOOKY_WUR_IGNORE(sys_mempool_free(copy));")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\tif (proxy_interface) {{")?;
    writeln!(out, "\t\tspooky_release(proxy_interface);")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\treturn status;")?;
    writeln!(out, "}}")?;
    writeln!(out)
}
