use anyhow::{Result, anyhow};
use console::style;
use std::sync::Arc;
use tracing::info;

use crate::core::brain::SqlAgent;
use crate::core::config::{AppConfig, resolve_config_path};
use crate::core::llm::LlmManager;
use crate::core::sql::ConversationTurn;
use crate::core::store::{SqlStore, SqliteStore};
use crate::core::terminal::{self, print_error};
use crate::interfaces::web::ApiServer;
use crate::logging::init_logging;

fn print_help() {
    terminal::print_banner();

    println!("{}", style("Commands").bold().underlined());
    for (cmd, desc) in [
        ("serve", "Start the HTTP API (POST /query, /query/stream, GET /schema, /health)"),
        ("ask", "Answer a single question and print the reply"),
        ("schema", "Print the tables and columns of the movie database"),
        ("help", "Show this help message"),
    ] {
        println!("  {:<10} {}", style(cmd).cyan(), desc);
    }

    println!();
    println!("{}", style("Options").bold().underlined());
    for (flag, desc) in [
        ("--config <path>", "Config file (default: $MOVIEBOT_CONFIG or ./moviebot.toml)"),
        ("--host <addr>", "serve: bind address"),
        ("--port <port>", "serve: bind port"),
        ("--question, -q <text>", "ask: the question"),
        ("--verbose, -v", "ask: also print the SQL and phases to stderr"),
    ] {
        println!("  {:<24} {}", style(flag).cyan(), desc);
    }
    println!();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub config: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> ServeArgs {
    let mut parsed = ServeArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if i + 1 < args.len() {
                    parsed.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    parsed.port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AskArgs {
    pub config: Option<String>,
    pub question: String,
    pub verbose: bool,
}

pub(crate) fn parse_ask_args(args: &[String], start: usize) -> AskArgs {
    let mut parsed = AskArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--question" | "-q" => {
                if i + 1 < args.len() {
                    parsed.question = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    parsed
}

pub(crate) fn parse_config_flag(args: &[String], start: usize) -> Option<String> {
    let mut i = start;
    while i < args.len() {
        if matches!(args[i].as_str(), "--config" | "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

/// Loads the config, then starts logging at its level and reports where it came from.
async fn load_config(flag: Option<&str>, to_stderr: bool) -> Result<AppConfig> {
    let (config, source) = AppConfig::load(resolve_config_path(flag)).await?;
    init_logging(&config.logging.level, to_stderr);
    info!("{}", source.describe());
    Ok(config)
}

fn build_store(config: &AppConfig) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new(
        &config.database.path,
        config.retry_policy(),
    ))
}

fn build_agent(config: &AppConfig) -> Result<SqlAgent> {
    let llm = LlmManager::from_config(&config.llm)?;
    if let (Some(provider), Some(model)) = llm.get_active_info() {
        info!("Using LLM {} ({})", provider, model);
    }
    Ok(SqlAgent::new(
        Arc::new(llm),
        build_store(config),
        config.agent_settings(),
    ))
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref(), false).await?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let agent = Arc::new(build_agent(&config)?);
    let server = ApiServer::new(agent, &config.server);

    terminal::print_banner();
    terminal::print_status("Database", &config.database.path.display().to_string());
    terminal::print_status(
        "Model",
        &format!(
            "{} ({})",
            config.llm.provider,
            config.llm.model.as_deref().unwrap_or("provider default")
        ),
    );
    if !config.database.path.exists() {
        terminal::print_warn("Database file not found yet; queries will fail until it exists.");
    }
    terminal::print_link("API", &format!("http://{}", server.address()));

    server.run().await?;
    terminal::print_goodbye();
    Ok(())
}

async fn run_ask(args: AskArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), true).await?;

    let agent = build_agent(&config)?;
    let outcome = agent
        .answer(&[ConversationTurn::user(args.question)], None)
        .await;
    info!(
        "ask request_id={} executions={} repairs={}",
        outcome.request_id, outcome.executions, outcome.attempts
    );

    if args.verbose {
        terminal::print_trace("SQL", outcome.final_sql.as_deref().unwrap_or("(none)"));
        let phases: Vec<&str> = outcome.phase_trace.iter().map(|p| p.as_str()).collect();
        terminal::print_trace("Phases", &phases.join(" -> "));
        if let Some(result) = &outcome.final_result {
            terminal::print_trace("Rows", &result.row_count().to_string());
        }
    }
    println!("{}", outcome.answer);
    Ok(())
}

async fn run_schema(config_flag: Option<String>) -> Result<()> {
    let config = load_config(config_flag.as_deref(), true).await?;

    let schema = build_store(&config).introspect_schema().await?;
    terminal::print_schema(&schema);
    Ok(())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    run_command(&args).await
}

async fn run_command(args: &[String]) -> Result<()> {
    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match cmd {
        "serve" => run_serve(parse_serve_flags(args, 2)).await,
        "ask" => {
            let parsed = parse_ask_args(args, 2);
            if parsed.question.trim().is_empty() {
                return Err(anyhow!("ask requires --question <text>"));
            }
            run_ask(parsed).await
        }
        "schema" => run_schema(parse_config_flag(args, 2)).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AskArgs, ServeArgs, parse_ask_args, parse_config_flag, parse_serve_flags, run_command,
    };

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_serve_flags_reads_host_port_and_config() {
        let args = argv(&[
            "moviebot", "serve", "--host", "0.0.0.0", "--port", "9000", "--config", "/etc/mb.toml",
        ]);
        assert_eq!(
            parse_serve_flags(&args, 2),
            ServeArgs {
                config: Some("/etc/mb.toml".to_string()),
                host: Some("0.0.0.0".to_string()),
                port: Some(9000),
            }
        );
    }

    #[test]
    fn parse_serve_flags_ignores_bad_port_and_dangling_flag() {
        let args = argv(&["moviebot", "serve", "--port", "ninety", "--host"]);
        let parsed = parse_serve_flags(&args, 2);
        assert_eq!(parsed.port, None);
        assert_eq!(parsed.host, None);
    }

    #[test]
    fn parse_ask_args_reads_question_and_verbose() {
        let args = argv(&["moviebot", "ask", "-v", "--question", "Top rated movie?"]);
        assert_eq!(
            parse_ask_args(&args, 2),
            AskArgs {
                config: None,
                question: "Top rated movie?".to_string(),
                verbose: true,
            }
        );
    }

    #[test]
    fn parse_config_flag_finds_path() {
        let args = argv(&["moviebot", "schema", "-c", "local.toml"]);
        assert_eq!(parse_config_flag(&args, 2).as_deref(), Some("local.toml"));
        assert_eq!(parse_config_flag(&argv(&["moviebot", "schema"]), 2), None);
    }

    #[tokio::test]
    async fn ask_without_question_is_an_error() {
        let err = run_command(&argv(&["moviebot", "ask", "-v"])).await.unwrap_err();
        assert!(err.to_string().contains("--question"));

        let err = run_command(&argv(&["moviebot", "ask", "--question", "   "]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--question"));
    }
}
