use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::app_state::AppState;
use crate::archive_builder::BackupOptions;
use crate::archive_record::ArchiveSource;
use crate::config_loader::load_config;
use crate::engine::ArchiveEngine;
use crate::loa::LOA;
use crate::request_context::RequestContext;
use crate::restore_launcher::UploadedFiles;
use crate::restore_script::RestoreCredentials;

/// Top-level CLI interface for the backup center
#[derive(Parser)]
#[command(
    name = "backup_center",
    version,
    about = "Create, catalog and restore site backup archives"
)]
pub struct Cli {
    /// Configuration file (defaults to $BACKUP_CENTER_CONFIG or backup_center.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Principal recorded as the creator of archives
    #[arg(long, global = true, default_value = "Administrator")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    #[arg(long)]
    pub db_root_username: Option<String>,
    #[arg(long, env = "BACKUP_CENTER_DB_ROOT_PASSWORD", hide_env_values = true)]
    pub db_root_password: Option<String>,
    #[arg(long, env = "BACKUP_CENTER_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

impl From<CredentialArgs> for RestoreCredentials {
    fn from(args: CredentialArgs) -> Self {
        RestoreCredentials {
            db_root_username: args.db_root_username,
            db_root_password: args.db_root_password,
            admin_password: args.admin_password,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the RPC API
    Serve {
        /// Bind address, overrides `listen` from the configuration
        #[arg(long)]
        listen: Option<String>,
    },

    /// Take a backup and catalog it
    Backup {
        #[arg(long)]
        label: Option<String>,
        /// Database only
        #[arg(long)]
        no_files: bool,
        /// Skip the zip bundle
        #[arg(long)]
        no_bundle: bool,
        #[arg(long, default_value = "Manual")]
        source: String,
    },

    /// List cataloged archives, newest first
    List {
        /// Print the full listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restore the site from a cataloged archive
    Restore {
        archive: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Restore from files already uploaded to the site (/private/... or /files/...)
    RestoreUpload {
        #[arg(long)]
        db_file: String,
        #[arg(long)]
        public_file: Option<String>,
        #[arg(long)]
        private_file: Option<String>,
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Print the restore script an archive would run (passwords masked)
    Script {
        archive: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
}

pub fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let listen_default = config.listen.clone();
    let engine = ArchiveEngine::from_config(config).context("failed to open archive engine")?;

    // The operator running this binary already holds shell access to the site.
    let ctx = RequestContext::new(&cli.user, LOA::Root);

    match cli.command {
        Commands::Serve { listen } => {
            let addr = listen.unwrap_or(listen_default);
            let state = Arc::new(AppState::new(engine));
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build Tokio runtime")?;
            rt.block_on(crate::web::serve(state, &addr))?;
        }
        Commands::Backup {
            label,
            no_files,
            no_bundle,
            source,
        } => {
            let options = BackupOptions {
                label,
                include_files: !no_files,
                bundle: !no_bundle,
                source: ArchiveSource::from_str(&source)?,
            };
            let created = engine.create_backup(&ctx, options)?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::List { json } => {
            let listing = engine.list_archives(&ctx)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for row in &listing {
                    let record = &row.record;
                    println!(
                        "{}  {:<10} {:<12} {:>12}  {}",
                        record.name,
                        record.status.to_string(),
                        record.source.to_string(),
                        record.db_size,
                        record.title
                    );
                }
            }
        }
        Commands::Restore {
            archive,
            credentials,
        } => {
            let started = engine.restore_from_archive(&ctx, &archive, credentials.into())?;
            println!("{}", serde_json::to_string_pretty(&started)?);
        }
        Commands::RestoreUpload {
            db_file,
            public_file,
            private_file,
            credentials,
        } => {
            let uploads = UploadedFiles {
                db_file,
                public_file,
                private_file,
            };
            let started = engine.restore_from_upload(&ctx, &uploads, credentials.into())?;
            println!("{}", serde_json::to_string_pretty(&started)?);
        }
        Commands::Script {
            archive,
            credentials,
        } => {
            print!(
                "{}",
                engine.preview_restore_script(&ctx, &archive, credentials.into())?
            );
        }
    }
    Ok(())
}
