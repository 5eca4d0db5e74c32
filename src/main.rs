// Entrypoint for the CLI application.
// - Parses flags, sets up logging and resolves configuration.
// - Probes the server once, then hands the client to the UI layer.

use anyhow::Context;
use clap::Parser;
use crossterm::style::Stylize;
use owui_chat::api::{ApiClient, ChatBackend, ProbeOutcome};
use owui_chat::config::{self, Config};
use owui_chat::interrupt::InterruptFlag;
use owui_chat::ui::{self, Session, TerminalInput};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Open WebUI 聊天客戶端 | Open WebUI chat client
#[derive(Parser, Debug)]
#[command(name = "owui-chat", version, about)]
struct Cli {
    /// Open WebUI 服務 URL | Open WebUI service URL
    #[arg(long, env = config::BASE_URL_ENV, default_value = config::DEFAULT_BASE_URL)]
    url: String,

    /// API 金鑰 | API key
    #[arg(long, env = config::API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// 使用的模型 | Model to use
    #[arg(long, env = config::DEFAULT_MODEL_ENV, default_value = config::DEFAULT_MODEL)]
    model: String,

    /// 要上傳的檔案路徑 | File to upload with --query
    #[arg(long)]
    file: Option<PathBuf>,

    /// 進入互動式聊天模式 | Enter interactive chat mode
    #[arg(long)]
    interactive: bool,

    /// 單次查詢文字 | Ask a single question and exit
    #[arg(long)]
    query: Option<String>,

    /// Wait for the full answer instead of streaming it (single query only)
    #[arg(long)]
    no_stream: bool,

    /// Send the whole conversation with every turn (interactive only)
    #[arg(long)]
    keep_history: bool,

    /// Log filter, e.g. `warn` or `owui_chat=debug`
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    // Env files have to be loaded before clap reads `env = ...` defaults.
    let env_files = config::load_env_files();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
    for path in &env_files {
        debug!(path = %path.display(), "loaded env file");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("❌ 程式執行失敗: {e:#} | Program execution failed: {e:#}").red());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match Config::resolve(Some(cli.url.clone()), cli.api_key.clone(), Some(cli.model.clone())) {
        Ok(config) => config,
        Err(e) => {
            print_config_help(&e);
            std::process::exit(1);
        }
    };
    let interrupt = InterruptFlag::install().context("Failed to install Ctrl-C handler")?;
    let api = ApiClient::new(config)?.with_interrupt(interrupt.clone());

    match api.probe() {
        Ok(ProbeOutcome::Connected) => {
            println!("{}", "✅ 成功連接到 Open WebUI | Successfully connected to Open WebUI".green());
        }
        Ok(ProbeOutcome::UnexpectedStatus(code)) => {
            println!(
                "{}",
                format!("⚠️  連線測試失敗，狀態碼: {0} | Connection test failed, status code: {0}", code).yellow()
            );
        }
        Err(e) => {
            eprintln!("{}", format!("❌ 無法連接到 Open WebUI: {0} | Unable to connect to Open WebUI: {0}", e).red());
            std::process::exit(1);
        }
    }

    let mut stdout = std::io::stdout();
    match api.list_models() {
        Ok(models) if !models.is_empty() => ui::print_models(&mut stdout, &models, false)?,
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not list models"),
    }

    let model = api.config().default_model.clone();
    match (cli.interactive, cli.query) {
        (false, Some(query)) => {
            let answer = ui::simple_chat(
                &api,
                &model,
                &query,
                cli.file.as_deref(),
                !cli.no_stream,
                &mut stdout,
            )?;
            println!("\n🤖 AI 回應 | AI Response: {}", answer);
        }
        _ => {
            if cli.file.is_some() {
                warn!("--file is only used together with --query");
            }
            Session::new(&api, model)
                .keep_history(cli.keep_history)
                .with_interrupt(interrupt)
                .run(&mut TerminalInput, &mut stdout)?;
        }
    }
    Ok(())
}

fn print_config_help(err: &config::ConfigError) {
    eprintln!("{}", format!("❌ 配置錯誤: {0} | Configuration error: {0}", err).red());
    eprintln!("💡 請設定 API 金鑰 | Please set API key:");
    eprintln!("   1. 使用 --api-key 參數 | Use --api-key parameter");
    eprintln!(
        "   2. 或設定 {0} 環境變數 | Or set {0} environment variable",
        config::API_KEY_ENV
    );
    if let Some(path) = config::user_env_file() {
        eprintln!("   3. 或寫入 {0} | Or put it in {0}", path.display());
    }
}
