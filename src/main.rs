//! mshell - shell for document database clusters
//!
//! Reads shell-style commands from `--eval`, a script file, or stdin, and
//! runs them against one endpoint or, with `--all-shards`, against every
//! configured shard at once.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode
//! mshell mongodb://localhost:27017/shop
//!
//! # Fan-out over explicit shards
//! mshell -s --shard s0=mongodb://h0:27018 --shard s1=mongodb://h1:27018 \
//!     --eval 'db.orders.countDocuments({})'
//! ```

use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use mshell::cli::CliInterface;
use mshell::connection::{ConnectionManager, StaticTopology, TopologyProvider};
use mshell::error::{Result, ShellError};
use mshell::executor::ShardExecutor;
use mshell::formatter::Formatter;
use mshell::script::{ScriptLoader, needs_continuation};
use mshell::session::Session;
use mshell::translator::CommandTranslator;
use mshell::transport::{MemoryTransport, Transport};

const PROMPT: &str = "mshell> ";
const CONTINUATION_PROMPT: &str = "... ";

/// Token of the command currently running, if any
type InterruptSlot = Arc<Mutex<Option<CancellationToken>>>;

/// Where commands go
enum Shell {
    Single(Session),
    Sharded(ShardExecutor),
}

impl Shell {
    async fn close(&mut self) {
        match self {
            Shell::Single(session) => {
                if let Err(e) = session.close().await {
                    error!("failed to close session: {}", e);
                }
            }
            Shell::Sharded(executor) => executor.close().await,
        }
    }
}

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or connect and run commands
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    cli.print_banner();

    let display = &cli.config().display;
    let formatter = Formatter::new(display.color_output).with_timing(display.show_timing);

    let mut shell = if cli.args().all_shards {
        Shell::Sharded(build_shard_executor(&cli, formatter).await?)
    } else {
        Shell::Single(build_session(&cli).await?)
    };

    let interrupts: InterruptSlot = Arc::new(Mutex::new(None));
    spawn_interrupt_watcher(Arc::clone(&interrupts));

    let outcome = drive(&cli, &mut shell, formatter, &interrupts).await;
    shell.close().await;
    outcome
}

/// Run `--eval` commands, a script file, or the stdin loop
async fn drive(
    cli: &CliInterface,
    shell: &mut Shell,
    formatter: Formatter,
    interrupts: &InterruptSlot,
) -> Result<()> {
    if !cli.eval_commands().is_empty() {
        for command in cli.eval_commands() {
            execute_and_display(shell, formatter, command, interrupts).await;
        }
        return Ok(());
    }

    if let Some(path) = &cli.args().file {
        let content = ScriptLoader::new().load_file(path)?;
        execute_and_display(shell, formatter, &content, interrupts).await;
        return Ok(());
    }

    run_line_loop(cli, shell, formatter, interrupts).await
}

/// Read commands line by line, joining lines while brackets are open
async fn run_line_loop(
    cli: &CliInterface,
    shell: &mut Shell,
    formatter: Formatter,
    interrupts: &InterruptSlot,
) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer = String::new();

    loop {
        if interactive {
            print!("{}", if buffer.is_empty() { PROMPT } else { CONTINUATION_PROMPT });
            std::io::stdout().flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let trimmed = line.trim();

        if buffer.is_empty() {
            if trimmed == "exit" || trimmed == "quit" {
                break;
            }
            if trimmed.is_empty() {
                continue;
            }
        }

        buffer.push_str(&line);
        buffer.push('\n');
        if needs_continuation(&buffer) {
            continue;
        }

        let command = std::mem::take(&mut buffer);
        execute_and_display(shell, formatter, command.trim(), interrupts).await;
    }

    if !buffer.trim().is_empty() {
        debug!("discarding incomplete input: {}", buffer.trim());
    }
    if !cli.args().quiet {
        println!("Bye!");
    }
    Ok(())
}

/// Run one command and print its output or `ERROR: <message>`
async fn execute_and_display(
    shell: &mut Shell,
    formatter: Formatter,
    command: &str,
    interrupts: &InterruptSlot,
) {
    let cancel = CancellationToken::new();
    *interrupts.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

    let outcome = match shell {
        Shell::Single(session) => {
            let result = tokio::select! {
                result = session.execute(command) => result,
                _ = cancel.cancelled() => Err(ShellError::Interrupted),
            };
            result.map(|result| {
                let text = formatter.format(&result);
                if !text.is_empty() {
                    println!("{}", text);
                }
            })
        }
        Shell::Sharded(executor) => {
            println!("Executing on all shards:");
            executor.execute_on_all_shards(command, &cancel).await
        }
    };

    *interrupts.lock().unwrap_or_else(PoisonError::into_inner) = None;

    if let Err(e) = outcome {
        if matches!(e, ShellError::Interrupted) {
            info!("command interrupted");
        }
        eprintln!("{}", formatter.format_error(&e));
    }
}

/// Ctrl+C cancels the running command; at the prompt it exits.
fn spawn_interrupt_watcher(slot: InterruptSlot) {
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl+C: {}", err);
                return;
            }
            let running = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
            match running {
                Some(token) => token.cancel(),
                None => {
                    println!();
                    std::process::exit(130);
                }
            }
        }
    });
}

/// Session for single-endpoint mode
async fn build_session(cli: &CliInterface) -> Result<Session> {
    let config = cli.config();
    let transport: Arc<dyn Transport> = if cli.args().memory {
        Arc::new(MemoryTransport::new("memory"))
    } else {
        ConnectionManager::new(config.connection.clone())
            .open_transport(&cli.get_connection_uri(), config.display.batch_size)
            .await?
    };
    let name = transport.endpoint().to_string();
    Ok(Session::new(name, translator_for(cli, transport)))
}

/// One session per configured shard
async fn build_shard_executor(cli: &CliInterface, formatter: Formatter) -> Result<ShardExecutor> {
    let config = cli.config();
    let entries = cli.shard_entries()?;
    if entries.is_empty() {
        return Err(ShellError::Generic(
            "no shards configured; use --shard NAME=URI or [[shards]] in the config file".into(),
        ));
    }

    let manager = ConnectionManager::new(config.connection.clone());
    let mut topology = StaticTopology::new(entries, manager, config.display.batch_size)?;
    if cli.args().memory {
        topology = topology.in_memory();
    }

    let sessions: Vec<Session> = topology
        .shards()
        .await?
        .into_iter()
        .map(|target| Session::new(target.name, translator_for(cli, target.transport)))
        .collect();
    info!("fan-out over {} shard(s)", sessions.len());
    Ok(ShardExecutor::new(sessions, formatter))
}

fn translator_for(cli: &CliInterface, transport: Arc<dyn Transport>) -> Arc<CommandTranslator> {
    let translator = CommandTranslator::new(
        transport,
        Some(cli.get_database()),
        cli.config().display.batch_size,
    );
    translator.set_verbose(cli.config().shell.verbose);
    Arc::new(translator)
}

/// Initialize logging from the configured level
///
/// CLI verbosity flags have already been folded into the config.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
