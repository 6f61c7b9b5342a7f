//! oxidelink - run commands and manage files over a shared SSH route

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use oxidelink::config::{load_connection_override, load_provider_config, StorageError};
use oxidelink::exec::{exec_id, run_command};
use oxidelink::sftp::{file_id, RemoteFiles, SftpError};
use oxidelink::ssh::{AcquiredClient, ConnectionRequest, SshError, SshManager};

#[derive(Parser, Debug)]
#[command(name = "oxidelink")]
#[command(version)]
#[command(about = "Run commands and manage remote files through cached SSH routes", long_about = None)]
struct Cli {
    /// Provider config: the default connection
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Connection override; omit to use the default connection
    #[arg(long, value_name = "FILE")]
    connection: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command and print its combined output
    Exec {
        command: String,

        /// Do not fail when the command exits non-zero
        #[arg(long)]
        allow_nonzero: bool,
    },

    /// Print a remote file
    Read {
        path: String,

        /// Fail when the file does not exist instead of printing nothing
        #[arg(long)]
        fail_if_absent: bool,
    },

    /// Write stdin to a remote file, creating parent directories
    Write {
        path: String,

        /// Octal file mode
        #[arg(long, default_value = "0644")]
        permissions: String,
    },

    /// Delete a remote file
    Rm { path: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] StorageError),

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Sftp(#[from] SftpError),

    #[error("Failed to read stdin: {0}")]
    Stdin(#[from] io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    oxidelink::init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let provider = load_provider_config(&cli.config).await?;
    let request = match &cli.connection {
        Some(path) => load_connection_override(path).await?.into_request(),
        None => ConnectionRequest::default_override(),
    };

    let manager = SshManager::new(
        provider.default_spec(),
        provider.default_bastion(),
        provider.connector(),
    )?;
    manager.connect_default().await?;

    let result = match manager.get_client(request).await {
        Ok(client) => execute(client, cli.command).await,
        Err(e) => Err(e.into()),
    };

    manager.shutdown().await;
    result
}

async fn execute(client: AcquiredClient, command: Command) -> Result<ExitCode, CliError> {
    match command {
        Command::Exec {
            command,
            allow_nonzero,
        } => {
            info!("Execution {}", exec_id(&command, Utc::now()));
            let output = run_command(&client.handle, &command, !allow_nonzero).await?;
            print!("{}", output.output);
            Ok(exit_code(output.exit_code))
        }

        Command::Read {
            path,
            fail_if_absent,
        } => {
            let files = RemoteFiles::open(&client.handle).await?;
            let content = files.read_file_opt(&path, fail_if_absent).await;
            files.close().await;
            println!("{}", content?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Write { path, permissions } => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;

            let files = RemoteFiles::open(&client.handle).await?;
            let written = files.write_file(&path, &content, &permissions).await;
            files.close().await;
            written?;
            info!("File {} written ({})", path, file_id(&path));
            Ok(ExitCode::SUCCESS)
        }

        Command::Rm { path } => {
            let files = RemoteFiles::open(&client.handle).await?;
            let deleted = files.delete_file(&path).await;
            files.close().await;
            deleted?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(code: i64) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
