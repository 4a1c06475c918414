//! Sextant CLI, a terminal MCP client.

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use sextant_client::{Client, Endpoint, ServerBook, ServerConfig};
use sextant_discovery::DEFAULT_PROBE_TIMEOUT;
use sextant_proto::{ContentBlock, Role, validate_tool};
use std::io;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sextant", version, about = "A command-line MCP client")]
#[command(group(ArgGroup::new("endpoint").args(["tcp", "stdio", "ws", "sse", "http", "server"])))]
struct Cli {
    /// Connect over TCP, given as host:port
    #[arg(long, value_name = "HOST:PORT")]
    tcp: Option<String>,

    /// Spawn a local server command and speak over its stdio
    #[arg(long, value_name = "COMMAND")]
    stdio: Option<String>,

    /// Connect over WebSocket
    #[arg(long, value_name = "URL")]
    ws: Option<String>,

    /// Connect over HTTP SSE (events endpoint at /sse)
    #[arg(long, value_name = "BASE_URL")]
    sse: Option<String>,

    /// Connect over streamable HTTP (endpoint at /mcp)
    #[arg(long, value_name = "BASE_URL")]
    http: Option<String>,

    /// Use a named server from the config file
    #[arg(long, value_name = "NAME", requires = "config")]
    server: Option<String>,

    /// TOML file listing named servers
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Per-request deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe the local network for MCP servers
    Discover {
        #[arg(long, default_value = "localhost")]
        host: String,
        /// First port of the scan window
        #[arg(long, default_value_t = sextant_discovery::DEFAULT_PORT_FROM)]
        from: u16,
        /// Last port of the scan window
        #[arg(long, default_value_t = sextant_discovery::DEFAULT_PORT_TO)]
        to: u16,
    },
    /// List every tool the server advertises
    Tools,
    /// Call a tool and print its output
    Call {
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List resources
    Resources,
    /// Read one resource by URI
    Read { uri: String },
    /// List prompts
    Prompts,
    /// Fetch a prompt with optional JSON arguments
    Prompt {
        name: String,
        #[arg(long)]
        args: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    // discovery needs no endpoint; everything else does
    if let Command::Discover { host, from, to } = &cli.command {
        return discover(host, *from, *to).await;
    }

    let server = resolve_endpoint(&cli)?;
    let client = Client::from_server_config(&server)?;
    client.connect().await.context("connecting")?;
    let info = client.initialize().await.context("handshake")?;
    tracing::debug!("connected to {} {}", info.name, info.version);

    let outcome = run_command(&client, &cli.command).await;
    if let Err(e) = client.disconnect().await {
        tracing::warn!("disconnect: {e}");
    }
    outcome
}

async fn run_command(client: &Client, command: &Command) -> Result<()> {
    match command {
        Command::Discover { .. } => unreachable!("handled before connecting"),
        Command::Tools => {
            let tools = client.list_tools().await?;
            if tools.is_empty() {
                println!("no tools advertised");
                return Ok(());
            }
            for tool in tools {
                let marker = if validate_tool(&tool).is_err() {
                    " [invalid]"
                } else {
                    ""
                };
                match &tool.description {
                    Some(desc) => println!("{}{marker}: {desc}", tool.name),
                    None => println!("{}{marker}", tool.name),
                }
            }
        }
        Command::Call { name, args } => {
            let arguments: serde_json::Value =
                serde_json::from_str(args).context("--args must be valid JSON")?;
            let result = client.call_tool(name, arguments).await?;
            for block in &result.content {
                print_block(block);
            }
            if let Some(structured) = &result.structured_content {
                println!("{}", serde_json::to_string_pretty(structured)?);
            }
            if result.is_error {
                bail!("tool {name} reported an error");
            }
        }
        Command::Resources => {
            let resources = client.list_resources().await?;
            if resources.is_empty() {
                println!("no resources advertised");
                return Ok(());
            }
            for resource in resources {
                println!("{}: {}", resource.uri, resource.name);
            }
        }
        Command::Read { uri } => {
            let result = client.read_resource(uri).await?;
            for contents in &result.contents {
                if let Some(text) = &contents.text {
                    println!("{text}");
                } else if let Some(blob) = &contents.blob {
                    println!("[{}: {} base64 chars]", contents.uri, blob.len());
                }
            }
        }
        Command::Prompts => {
            let prompts = client.list_prompts().await?;
            if prompts.is_empty() {
                println!("no prompts advertised");
                return Ok(());
            }
            for prompt in prompts {
                match &prompt.description {
                    Some(desc) => println!("{}: {desc}", prompt.name),
                    None => println!("{}", prompt.name),
                }
            }
        }
        Command::Prompt { name, args } => {
            let arguments = args
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()
                .context("--args must be valid JSON")?;
            let result = client.get_prompt(name, arguments).await?;
            if let Some(desc) = &result.description {
                println!("# {desc}");
            }
            for message in &result.messages {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                print!("{role}: ");
                print_block(&message.content);
            }
        }
    }
    Ok(())
}

async fn discover(host: &str, from: u16, to: u16) -> Result<()> {
    if from > to {
        bail!("--from must not exceed --to");
    }
    println!("scanning {host} ports {from}..={to}");
    let mut servers = sextant_discovery::scan_tcp(host, from, to, DEFAULT_PROBE_TIMEOUT).await;
    servers.extend(sextant_discovery::probe_http(host, from, to).await);

    if servers.is_empty() {
        println!("no servers found");
        return Ok(());
    }
    for (i, server) in servers.iter().enumerate() {
        println!("{}. {} ({})", i + 1, server.name, server.kind);
        println!("   address: {}", server.address());
        println!("   {}", server.description);
    }
    Ok(())
}

fn print_block(block: &ContentBlock) {
    match block {
        ContentBlock::Text { text } => println!("{text}"),
        ContentBlock::Image { mime_type, data } => {
            println!("[image {mime_type}: {} base64 chars]", data.len());
        }
        ContentBlock::Resource { resource } => println!("[resource {}]", resource.uri),
    }
}

fn resolve_endpoint(cli: &Cli) -> Result<ServerConfig> {
    let endpoint = if let Some(target) = &cli.tcp {
        let (host, port) = parse_host_port(target)?;
        Endpoint::Tcp { host, port }
    } else if let Some(command_line) = &cli.stdio {
        let (command, args) = split_command(command_line)?;
        Endpoint::Stdio {
            command,
            args,
            env: Default::default(),
        }
    } else if let Some(url) = &cli.ws {
        Endpoint::Websocket { url: url.clone() }
    } else if let Some(base_url) = &cli.sse {
        Endpoint::Sse {
            base_url: base_url.clone(),
            events_path: "/sse".to_string(),
        }
    } else if let Some(base_url) = &cli.http {
        Endpoint::Http {
            base_url: base_url.clone(),
            path: "/mcp".to_string(),
        }
    } else if let Some(name) = &cli.server {
        let path = cli
            .config
            .as_deref()
            .context("--server requires --config FILE")?;
        let book = ServerBook::load(path)?;
        let mut server = book.require(name)?.clone();
        if let Some(timeout) = cli.timeout_ms {
            server.timeout_ms = timeout;
        }
        return Ok(server);
    } else {
        bail!("pick a server: --tcp, --stdio, --ws, --sse, --http, or --server with --config");
    };

    let mut server = ServerConfig::new(endpoint);
    if let Some(timeout) = cli.timeout_ms {
        server.timeout_ms = timeout;
    }
    Ok(server)
}

/// Split `host:port`, tolerating colons in the host by taking the last.
fn parse_host_port(target: &str) -> Result<(String, u16)> {
    let Some((host, port)) = target.rsplit_once(':') else {
        bail!("expected host:port, got {target}");
    };
    if host.is_empty() {
        bail!("expected host:port, got {target}");
    }
    let port: u16 = port
        .parse()
        .with_context(|| format!("bad port in {target}"))?;
    Ok((host.to_string(), port))
}

/// Split a command line on whitespace into program and arguments.
fn split_command(command_line: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    let Some(command) = parts.next() else {
        bail!("--stdio needs a command to run");
    };
    Ok((command, parts.collect()))
}
