//! gp-pilot: drive an isolated worker with an LLM decision loop
//!
//! Usage:
//!   gp-pilot --goal "<text>"   - Pursue one goal with the full tool set
//!   gp-pilot --probe           - Connect to the worker, ping and take a screenshot
//!   gp-pilot --tools           - List the canonical tool names
//!   gp-pilot --help            - Show help

mod approve;

use std::path::Path;
use std::sync::Arc;

use gp_agents::{SubworkerManager, SubworkerRunner};
use gp_core::{ClaudeClient, Config, Domain, LlmClient};
use gp_mcp::{McpPluginHost, McpServersConfig};
use gp_rpc::{methods, Transport, UnixSocketConnector};
use gp_tools::{
    catalog, AutoApprove, Command, CommandApprover, ExaDuckDuckGoSearch, InMemoryCredentialStore, ToolExecutor,
};
use tracing_subscriber::EnvFilter;

use crate::approve::StdinApprover;

const DEFAULT_MCP_CONFIG: &str = "mcp.json";

/// Run mode
enum RunMode {
    Goal(String),
    Probe,
    Tools,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = match parse_args(std::env::args().skip(1)) {
        Ok(mode) => mode,
        Err(message) => {
            eprintln!("{}\n", message);
            print_help();
            std::process::exit(2);
        }
    };

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("gp-pilot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Tools => {
            print_tools();
            return Ok(());
        }
        _ => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    let transport = Transport::from_config(UnixSocketConnector::new(&config.worker.socket_path), &config.worker);

    match mode {
        RunMode::Probe => probe(&transport).await,
        RunMode::Goal(goal) => run_goal(config, transport, goal).await,
        _ => Ok(()),
    }
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<RunMode, String> {
    let mut mode = None;

    while let Some(arg) = args.next() {
        let next = match arg.as_str() {
            "--goal" | "-g" => {
                let goal = args.next().filter(|g| !g.trim().is_empty());
                RunMode::Goal(goal.ok_or("--goal needs a goal text")?)
            }
            "--probe" => RunMode::Probe,
            "--tools" => RunMode::Tools,
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            other => return Err(format!("Unknown argument: {}", other)),
        };
        mode = Some(next);
    }

    Ok(mode.unwrap_or(RunMode::Help))
}

fn print_help() {
    println!("gp-pilot - LLM-driven automation of an isolated worker");
    println!();
    println!("Usage:");
    println!("  gp-pilot --goal <text>   Pursue one goal with the full tool set");
    println!("  gp-pilot --probe         Connect to the worker, ping and take a screenshot");
    println!("  gp-pilot --tools         List the canonical tool names");
    println!("  gp-pilot --help          Show this help message");
    println!("  gp-pilot --version       Show version");
    println!();
    println!("Configuration is read from ./guestpilot.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  LLM_API_KEY              API key (required for --goal)");
    println!("  LLM_MODEL                Model name");
    println!("  LLM_BASE_URL             Custom API endpoint");
    println!("  GP_WORKER_SOCKET         Worker socket or device path");
    println!("  GP_CONFIRM_COMMANDS      Ask before each shell command (true/false)");
    println!("  GP_MAX_ITERATIONS        Iteration bound of sub-agent loops");
    println!("  GP_CREDENTIAL_<NAME>     Credential available as {{{{credential:name}}}}");
    println!("  EXA_API_KEY              Exa web search key (DuckDuckGo otherwise)");
    println!("  MCP_ENABLED              Enable MCP plugin tools (default: true)");
    println!("  MCP_CONFIG_PATH          Path to the MCP server list (default: mcp.json)");
}

fn print_tools() {
    for command in Command::ALL {
        let definition = catalog::definition(command);
        println!("{:<20} {}", command.name(), definition.description);
    }
}

/// Connect, ping and report the screen the worker sees
async fn probe(transport: &Transport) -> anyhow::Result<()> {
    transport.connect().await?;
    tracing::info!("Worker answered ping");

    let screen = transport.call_value(methods::SCREENSHOT, None).await;
    transport.disconnect().await;

    let screen = screen?;
    let encoded_len = screen
        .get("image")
        .or_else(|| screen.get("data"))
        .and_then(|v| v.as_str())
        .map_or(0, str::len);
    println!(
        "Worker OK: screenshot {} {}x{} ({} base64 bytes)",
        screen.get("mime_type").and_then(|v| v.as_str()).unwrap_or("image/png"),
        screen.get("width").map_or_else(|| "?".to_string(), |v| v.to_string()),
        screen.get("height").map_or_else(|| "?".to_string(), |v| v.to_string()),
        encoded_len
    );
    Ok(())
}

/// Load MCP plugin tools, if enabled and configured
async fn load_plugins(config: &Config) -> Option<McpPluginHost> {
    if !config.mcp.enabled {
        tracing::info!("MCP integration is disabled");
        return None;
    }

    let path = match &config.mcp.config_path {
        Some(path) => path.clone(),
        None if Path::new(DEFAULT_MCP_CONFIG).exists() => DEFAULT_MCP_CONFIG.to_string(),
        None => {
            tracing::info!("No MCP configuration file found, skipping MCP initialization");
            return None;
        }
    };

    match McpServersConfig::from_file(&path) {
        Ok(servers) => McpPluginHost::connect(&servers).await,
        Err(e) => {
            tracing::warn!("MCP initialization failed: {}", e);
            None
        }
    }
}

async fn run_goal(config: Config, transport: Transport, goal: String) -> anyhow::Result<()> {
    let client: Arc<dyn LlmClient> =
        Arc::new(ClaudeClient::new(&config.llm).map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?);
    tracing::info!("Model: {}", client.model());

    transport.connect().await?;

    let approver: Arc<dyn CommandApprover> = if config.policy.confirm_commands {
        Arc::new(StdinApprover::new())
    } else {
        Arc::new(AutoApprove)
    };
    let credentials = InMemoryCredentialStore::from_pairs(Config::credentials_from_env());
    tracing::info!("Loaded {} credentials", credentials.len());

    let mut base = ToolExecutor::new(transport.clone())
        .with_approver(approver)
        .with_credentials(Arc::new(credentials))
        .with_web_search(Arc::new(ExaDuckDuckGoSearch::new()))
        .with_max_concurrent_waits(config.agents.max_concurrent_waits);

    let plugins = load_plugins(&config).await.map(Arc::new);
    if let Some(host) = &plugins {
        tracing::info!("{} MCP tools from {} servers", host.tool_count(), host.server_count());
        base = base.with_plugins(host.clone());
    }

    let manager = SubworkerManager::new(client.clone(), base.clone(), config.agents.clone(), config.llm.max_tokens);
    let executor = base.with_subworkers(manager.clone());
    tracing::info!("{} tools available", executor.definitions().len());

    let runner = SubworkerRunner::new(goal, Domain::Mixed, client, executor)
        .with_max_iterations(config.agents.max_iterations)
        .with_max_tokens(config.llm.max_tokens)
        .with_min_report_chars(config.agents.min_report_chars);

    let outcome = tokio::select! {
        outcome = runner.run() => Some(outcome),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down...");
            None
        }
    };
    drop(runner);

    let cancelled = manager.cancel_all().await;
    if cancelled > 0 {
        tracing::info!("Cancelled {} running sub-agents", cancelled);
    }
    drop(manager);
    transport.disconnect().await;

    if let Some(host) = plugins {
        match Arc::try_unwrap(host) {
            Ok(host) => host.shutdown().await,
            Err(_) => tracing::warn!("MCP host still in use, skipping graceful shutdown"),
        }
    }

    let Some(outcome) = outcome else {
        return Ok(());
    };
    println!("{}", outcome.summary);
    if let Some(reason) = &outcome.failure_reason {
        eprintln!("\nFailed: {}", reason);
        std::process::exit(1);
    }
    tracing::info!("Goal completed in {} turns", outcome.iterations);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunMode, String> {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse(&[]), Ok(RunMode::Help)));
        assert!(matches!(parse(&["--probe"]), Ok(RunMode::Probe)));
        assert!(matches!(parse(&["--goal", "book a table"]), Ok(RunMode::Goal(g)) if g == "book a table"));
        assert!(matches!(parse(&["--tools", "--version"]), Ok(RunMode::Version)));
        assert!(parse(&["--goal"]).is_err());
        assert!(parse(&["--goal", "  "]).is_err());
        assert!(parse(&["--launch"]).is_err());
    }
}
