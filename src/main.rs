use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use orchestrator_core::adapters::ledger::FileLedgerSink;
use orchestrator_core::adapters::sqlite::{initialize_database, SqliteCheckpointStore};
use orchestrator_core::cli::{demo_adapters, Cli, ExitCode, Runtime};
use orchestrator_core::infrastructure::{ConfigLoader, LoggerImpl};

#[tokio::main]
async fn main() -> ProcessExitCode {
    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ProcessExitCode::from(ExitCode::ConfigurationError as u8);
        }
    };

    let _logger_guard = match LoggerImpl::init(&config.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            return ProcessExitCode::from(ExitCode::ConfigurationError as u8);
        }
    };

    let pool = match initialize_database(&config.checkpoint_path).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("failed to initialize checkpoint database: {err}");
            return ProcessExitCode::from(ExitCode::ConfigurationError as u8);
        }
    };

    let runtime = Runtime {
        checkpoint_store: Arc::new(SqliteCheckpointStore::new(pool)),
        ledger_sink: Arc::new(FileLedgerSink::new(config.ledger_sink.clone())),
        adapters: demo_adapters(),
        config,
    };

    let cli = Cli::parse();
    let exit_code = runtime.dispatch(cli.command).await;
    ProcessExitCode::from(exit_code as u8)
}
