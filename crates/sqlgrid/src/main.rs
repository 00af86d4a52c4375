use std::env;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

use sqlgrid::app::App;
use sqlgrid::config;
use sqlgrid::context::AppContext;
use sqlgrid::history::History;
use sqlgrid::{logging, server, store};

fn print_version() {
    println!("sqlgrid {}", env!("CARGO_PKG_VERSION"));
}

fn print_usage() {
    eprintln!("sqlgrid - browse and edit a SQLite table");
    eprintln!();
    eprintln!("Usage: sqlgrid [OPTIONS] [DATABASE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [DATABASE]          SQLite database file");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h, --help          Print this help message");
    eprintln!("  -V, --version       Print version information");
    eprintln!("      --port <PORT>   First port tried for the script endpoint");
    eprintln!("      --no-server     Do not start the script endpoint");
    eprintln!();
    eprintln!("Environment Variables:");
    eprintln!("  SQLGRID_DB          Database file if not provided as argument");
    eprintln!("  SQLGRID_LOG         Log filter (e.g. debug, sqlgrid=trace)");
    eprintln!("  SQLGRID_CONFIG_DIR  Directory holding config.toml, history and log");
    eprintln!();
    eprintln!("Configuration:");
    if let Some(path) = config::config_path() {
        eprintln!("  Config file: {}", path.display());
    }
    if let Some(path) = config::log_path() {
        eprintln!("  Log file:    {}", path.display());
    }
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  sqlgrid alarms.db");
    eprintln!("  curl 'http://127.0.0.1:8080/?SQL=select+*+from+alarms'");
}

struct Args {
    database: Option<PathBuf>,
    port: Option<u16>,
    no_server: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        database: None,
        port: None,
        no_server: false,
    };
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--no-server" => parsed.no_server = true,
            "--port" => {
                let value = iter.next().context("--port needs a value")?;
                parsed.port = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid port: {}", value))?,
                );
            }
            other if other.starts_with('-') => bail!("Unknown option: {}", other),
            path => parsed.database = Some(PathBuf::from(path)),
        }
    }
    if parsed.database.is_none() {
        parsed.database = env::var_os("SQLGRID_DB").map(PathBuf::from);
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }

    if args.iter().any(|a| a == "-V" || a == "--version") {
        print_version();
        return Ok(());
    }

    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    let mut cfg = config::load_config().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {:#}", e);
        config::Config::default()
    });
    if let Some(port) = args.port {
        cfg.server.port_start = port;
        cfg.server.port_end = cfg.server.port_end.max(port);
    }
    if args.no_server {
        cfg.server.enabled = false;
    }

    if let Some(path) = config::log_path() {
        if let Err(e) = logging::init(&path) {
            eprintln!("Warning: Failed to open log file: {:#}", e);
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "sqlgrid starting");

    let history = if cfg.history.persist {
        History::load(cfg.history.max_entries).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load history: {:#}", e);
            History::new_empty(cfg.history.max_entries)
        })
    } else {
        History::new_empty(cfg.history.max_entries)
    };

    let rt = Runtime::new().context("failed to initialize tokio runtime")?;
    let ctx = AppContext::new(cfg);

    let flush_interval = Duration::from_millis(ctx.config.queue.flush_interval_ms.max(1));
    let flusher = {
        let _guard = rt.enter();
        store::spawn_flusher(ctx.clone(), flush_interval)
    };

    let mut server_port = None;
    let mut server_task = None;
    if ctx.config.server.enabled {
        match rt.block_on(server::bind(&ctx.config.server)) {
            Ok((listener, port)) => {
                let _guard = rt.enter();
                server_task = Some(server::spawn(ctx.clone(), listener));
                server_port = Some(port);
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "script endpoint disabled");
                eprintln!("Warning: {:#}", e);
            }
        }
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let mut terminal =
        init_terminal().context("failed to initialize terminal; are you running in a real TTY?")?;

    let mut app = App::new(
        ctx.clone(),
        rt.handle().clone(),
        history,
        events_tx,
        events_rx,
        args.database,
        server_port,
    );

    let res = app.run(&mut terminal);

    restore_terminal(terminal)?;
    drop(app);

    if let Some(task) = server_task {
        task.abort();
    }
    flusher.abort();
    if let Some(outcome) = rt.block_on(ctx.close_store()) {
        if outcome.failed > 0 {
            eprintln!(
                "Warning: {} of {} queued statements failed at exit (see log)",
                outcome.failed, outcome.attempted
            );
        }
    }
    info!("sqlgrid stopped");

    res
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;

    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&["sqlgrid", "--port", "9000", "a.db", "--no-server"])).unwrap();
        assert_eq!(parsed.database, Some(PathBuf::from("a.db")));
        assert_eq!(parsed.port, Some(9000));
        assert!(parsed.no_server);
    }

    #[test]
    fn test_parse_args_rejects_unknown() {
        assert!(parse_args(&args(&["sqlgrid", "--bogus"])).is_err());
        assert!(parse_args(&args(&["sqlgrid", "--port"])).is_err());
        assert!(parse_args(&args(&["sqlgrid", "--port", "x"])).is_err());
    }
}
