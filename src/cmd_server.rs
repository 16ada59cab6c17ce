//! Server subcommand handlers for mcplink.

use tracing::info;

use mcplink_protocols::ServerDescriptor;

use crate::cli::Commands;
use crate::register::App;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Dispatch one command against the wired-up bridge.
pub(crate) async fn handle_command(app: &App, command: Commands) -> CmdResult {
    match command {
        Commands::Servers { format } => servers_list(app, &format),
        Commands::Test { server_id } => server_test(app, &server_id).await,
        Commands::Tools { server_id } => server_tools(app, &server_id).await,
        Commands::Call {
            server_id,
            tool,
            args,
        } => tool_call(app, &server_id, &tool, &args).await,
        Commands::Sync { user, server_id } => sync(app, &user, server_id.as_deref()).await,
        Commands::Remove { server_id, user } => remove(app, &server_id, &user).await,
    }
}

fn configured<'a>(app: &'a App, server_id: &str) -> Result<&'a ServerDescriptor, Box<dyn std::error::Error>> {
    app.config
        .server(server_id)
        .ok_or_else(|| format!("Server '{}' is not configured", server_id).into())
}

/// List configured servers.
fn servers_list(app: &App, format: &str) -> CmdResult {
    let servers = &app.config.servers;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(servers)?);
        return Ok(());
    }

    if servers.is_empty() {
        println!("No servers configured.");
        return Ok(());
    }

    println!("{:<20} {:<10} {:<16} {:<8} {}", "ID", "TRANSPORT", "SESSION", "ENABLED", "NAME");
    for server in servers {
        println!(
            "{:<20} {:<10} {:<16} {:<8} {}",
            server.id,
            server.transport_kind(),
            server.session,
            server.enabled,
            server.name
        );
    }
    Ok(())
}

/// Probe a server and print the connection status.
async fn server_test(app: &App, server_id: &str) -> CmdResult {
    let descriptor = configured(app, server_id)?;
    let status = app.manager.test_connection(descriptor).await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.is_connected() {
        return Err(status.message.into());
    }
    Ok(())
}

/// Print a server's tools.
async fn server_tools(app: &App, server_id: &str) -> CmdResult {
    let descriptor = configured(app, server_id)?;
    app.manager.connect(descriptor).await?;
    let tools = app.manager.list_tools(server_id).await?;

    println!("Found {} tools on {}:", tools.len(), descriptor.name);
    for tool in tools {
        match tool.description {
            Some(description) if !description.is_empty() => {
                println!("  {} - {}", tool.name, description)
            }
            _ => println!("  {}", tool.name),
        }
    }
    Ok(())
}

/// Invoke one tool and print its text content.
async fn tool_call(app: &App, server_id: &str, tool: &str, args: &str) -> CmdResult {
    let arguments: serde_json::Value = serde_json::from_str(args)?;
    if !arguments.is_object() {
        return Err("--args must be a JSON object".into());
    }

    let result = app.bridge.execute_tool(server_id, tool, arguments).await;
    if !result.success {
        let error = result.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(format!("{} failed: {}", tool, error).into());
    }
    println!("{}", result.content_text());
    Ok(())
}

/// Sync one server, or every enabled server of a user.
async fn sync(app: &App, user: &str, server_id: Option<&str>) -> CmdResult {
    let report = match server_id {
        Some(id) => {
            let descriptor = configured(app, id)?;
            app.bridge.sync_server_tools(descriptor, user).await?
        }
        None => app.bridge.sync_user_tools(user).await?,
    };

    info!(user, synced = report.synced, failed = report.failed, "Sync finished");
    println!("{}", serde_json::to_string_pretty(&report)?);
    for tool in app.registry.list() {
        println!("  {} ({})", tool.name, tool.id);
    }
    Ok(())
}

/// Sync a server's tools into this process's registry, then remove them.
async fn remove(app: &App, server_id: &str, user: &str) -> CmdResult {
    let descriptor = configured(app, server_id)?;
    if let Err(e) = app.bridge.sync_server_tools(descriptor, user).await {
        info!(server_id, error = %e, "Nothing synced before removal");
    }
    let removed = app.bridge.remove_server_tools(server_id, user).await;
    println!("Removed {} tools from {}", removed, server_id);
    Ok(())
}
