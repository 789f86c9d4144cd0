//! Command line front end for a remote store (FTP, SFTP or WebDAV)

use clap::{Parser, Subcommand};
use remote_stash::config::parse_seed_ids;
use remote_stash::{
    ConnectionDescriptor, Credentials, Grant, MemoryTransport, RemoteStore, StoreConfig,
    SyncOutcome, Transport, UploadJob,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remote-stash")]
#[command(about = "Store files on FTP, SFTP or WebDAV servers", long_about = None)]
struct Cli {
    /// Remote store: host, ssh-file://host, webdav://host/path or webdav-secure://host/path
    #[arg(long, env = "STORE_HOST")]
    host: Option<String>,

    /// Login user
    #[arg(short, long, env = "STORE_USER", default_value = "")]
    user: String,

    /// Login password
    #[arg(long, env = "STORE_PASS", hide_env_values = true, default_value = "")]
    password: String,

    /// Folder holding user folders and the access list
    #[arg(long, env = "BASE_FOLDER", default_value = "")]
    base_folder: String,

    /// Identities allowed regardless of the remote list (comma separated)
    #[arg(long, env = "ALLOWED_IDS", default_value = "")]
    allowed_ids: String,

    /// Use an in-memory store instead of connecting anywhere
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file into a user folder
    Store {
        /// File to upload
        file: PathBuf,

        /// User folder to store it in
        #[arg(short, long)]
        folder: String,

        /// Remote file name (defaults to the local file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Add an identity to the access list
    Grant { id: i64 },
    /// Check whether an identity is on the access list
    Check { id: i64 },
    /// Print the access list
    List,
    /// Check that the remote store accepts a connection
    Probe,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("remote_stash=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let seed_ids = parse_seed_ids(&cli.allowed_ids)?;

    if cli.dry_run {
        eprintln!("Backend: in-memory (nothing leaves this process)");
        let store = RemoteStore::new(MemoryTransport::new())
            .base_folder(Some(cli.base_folder))
            .seed_ids(seed_ids);
        return run(store, cli.command).await;
    }

    let host = cli.host.ok_or("no remote store configured, set --host or STORE_HOST")?;
    let descriptor = ConnectionDescriptor::parse(&host, Credentials::new(cli.user, cli.password));
    eprintln!("Backend: {}", descriptor);

    let config = StoreConfig::new(descriptor)
        .base_folder(cli.base_folder)
        .seed_ids(seed_ids);
    run(RemoteStore::from_config(config), cli.command).await
}

async fn run<T: Transport>(
    store: RemoteStore<T>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match command {
        Command::Store { file, folder, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or("cannot derive a remote name, pass --name")?,
            };
            let stored = store.store(&UploadJob::new(file, folder, name)).await?;
            println!(
                "Stored {}/{} ({} bytes)",
                stored.folder, stored.file_name, stored.bytes
            );
        }
        Command::Grant { id } => {
            warn_on_failed_sync(store.warm_up().await);
            match store.grant_access(id).await {
                Grant::Persisted => println!("{} added", id),
                Grant::AlreadyPresent => println!("{} already has access", id),
                Grant::LocalOnly(e) => return Err(format!("{} not saved remotely: {}", id, e).into()),
            }
        }
        Command::Check { id } => {
            warn_on_failed_sync(store.warm_up().await);
            if store.has_access(id) {
                println!("{} has access", id);
            } else {
                println!("{} has no access", id);
            }
        }
        Command::List => {
            warn_on_failed_sync(store.warm_up().await);
            for id in store.list_access() {
                println!("{}", id);
            }
        }
        Command::Probe => {
            store.probe().await?;
            println!("Connection established ({})", store.transport().describe());
        }
    }

    Ok(())
}

fn warn_on_failed_sync(outcome: SyncOutcome) {
    if outcome == SyncOutcome::Failed {
        eprintln!("Warning: remote access list could not be loaded, showing configured entries only");
    }
}
