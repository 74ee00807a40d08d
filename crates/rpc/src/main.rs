//! E-Sign CLI - Main entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use esign_core::{NewPolicy, RequestFilter, RequestStatus, SignatureMethod, UserId};
use esign_rpc::commands::{self, CreateRequestArgs, SignArgs};
use esign_rpc::{AppConfig, AppContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "esign")]
#[command(about = "QMS electronic signatures - sign, approve, verify", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, env = "ESIGN_DB")]
    db: Option<PathBuf>,

    /// User directory file (overrides the config file)
    #[arg(long, env = "ESIGN_USERS")]
    users: Option<PathBuf>,

    /// Acting user ID
    #[arg(short, long, env = "ESIGN_USER", global = true)]
    user: Option<UserId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the user directory
    #[command(subcommand)]
    Users(UserCommands),

    /// Apply an electronic signature
    Sign {
        /// Entity type, e.g. NC, CAPA, DOC
        entity_type: String,
        /// Entity ID
        entity_id: i64,
        /// Regulated action, e.g. APPROVE_CLOSURE
        action: String,
        /// Meaning of the signature
        #[arg(long, default_value = "approved")]
        meaning: String,
        /// Optional reason
        #[arg(long)]
        reason: Option<String>,
        /// PASSWORD, BIOMETRIC, TOKEN or CERTIFICATE
        #[arg(long)]
        method: Option<SignatureMethod>,
        /// Signer slot this signature fulfils
        #[arg(long)]
        slot: Option<i64>,
        /// Signer password, re-verified for every signature
        #[arg(long, env = "ESIGN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Decline your slot on an approval request
    Decline {
        /// Signer slot ID
        slot: i64,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Manage approval requests
    #[command(subcommand)]
    Request(RequestCommands),

    /// Verify a signature's digest and validity
    Verify {
        /// Signature ID
        id: i64,
    },

    /// Invalidate a signature (irreversible)
    Invalidate {
        /// Signature ID
        id: i64,
        #[arg(long)]
        reason: String,
    },

    /// List signatures on an entity, newest first
    Signatures {
        entity_type: String,
        entity_id: i64,
    },

    /// Manage signing policies
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Mark overdue approval requests as expired
    Sweep,

    /// Show approval request counts by status
    Stats,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add or replace a user
    Add {
        id: UserId,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "USER")]
        role: String,
        #[arg(long, env = "ESIGN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum RequestCommands {
    /// Open a multi-signer approval request
    Create {
        entity_type: String,
        entity_id: i64,
        action: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Signer user IDs in signing order (comma separated)
        #[arg(long = "signers", value_delimiter = ',', required = true)]
        signers: Vec<UserId>,
        /// Required signatures (default: policy, then all signers)
        #[arg(long)]
        required: Option<u32>,
        /// Enforce signing order (default: policy, then false)
        #[arg(long)]
        sequential: Option<bool>,
        /// Expire after this many hours (default: policy window)
        #[arg(long)]
        expires_in_hours: Option<u32>,
    },

    /// Show a request with its signer slots
    Show { id: i64 },

    /// List requests, newest first
    List {
        #[arg(long)]
        status: Option<RequestStatus>,
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        requested_by: Option<UserId>,
        /// Matches request number or title
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Cancel a request you created
    Cancel { id: i64 },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Create a policy for an (entity type, action) pair
    Create {
        entity_type: String,
        action: String,
        #[arg(long, default_value = "1")]
        required: u32,
        /// Allowed signer roles (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long)]
        sequential: bool,
        #[arg(long)]
        expires_in_hours: Option<u32>,
    },

    /// Update mutable fields from a JSON object
    Update {
        id: i64,
        /// e.g. '{"required_signatures": 2, "is_active": false}'
        fields: String,
    },

    /// List active policies
    List,

    /// Show the active policy for a pair
    Resolve { entity_type: String, action: String },
}

fn actor(user: Option<UserId>) -> anyhow::Result<UserId> {
    user.ok_or_else(|| anyhow::anyhow!("--user (or ESIGN_USER) is required for this command"))
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(users) = cli.users {
        config.users_path = Some(users);
    }

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Users(UserCommands::Add {
            id,
            name,
            role,
            password,
        }) => {
            commands::add_user(&ctx, id, &name, &role, &password)?;
        }

        Commands::Sign {
            entity_type,
            entity_id,
            action,
            meaning,
            reason,
            method,
            slot,
            password,
        } => {
            let args = SignArgs {
                entity_type,
                entity_id,
                action,
                meaning,
                reason,
                method,
                slot,
                password,
            };
            commands::sign(&ctx, actor(cli.user)?, args)?;
        }

        Commands::Decline { slot, reason } => {
            commands::decline(&ctx, actor(cli.user)?, slot, reason)?;
        }

        Commands::Request(RequestCommands::Create {
            entity_type,
            entity_id,
            action,
            title,
            description,
            signers,
            required,
            sequential,
            expires_in_hours,
        }) => {
            let args = CreateRequestArgs {
                entity_type,
                entity_id,
                action,
                title,
                description,
                signers,
                required,
                sequential,
                expires_in_hours,
            };
            commands::create_request(&ctx, actor(cli.user)?, args)?;
        }

        Commands::Request(RequestCommands::Show { id }) => {
            commands::show_request(&ctx, id)?;
        }

        Commands::Request(RequestCommands::List {
            status,
            entity_type,
            action,
            requested_by,
            search,
            page,
            limit,
        }) => {
            let filter = RequestFilter {
                status,
                entity_type,
                action,
                requested_by,
                search,
                page,
                limit,
            };
            commands::list_requests(&ctx, filter)?;
        }

        Commands::Request(RequestCommands::Cancel { id }) => {
            commands::cancel_request(&ctx, actor(cli.user)?, id)?;
        }

        Commands::Verify { id } => {
            commands::verify(&ctx, id)?;
        }

        Commands::Invalidate { id, reason } => {
            commands::invalidate(&ctx, actor(cli.user)?, id, &reason)?;
        }

        Commands::Signatures {
            entity_type,
            entity_id,
        } => {
            commands::signatures(&ctx, &entity_type, entity_id)?;
        }

        Commands::Policy(PolicyCommands::Create {
            entity_type,
            action,
            required,
            roles,
            sequential,
            expires_in_hours,
        }) => {
            let mut new = NewPolicy::new(entity_type, action)
                .required(required)
                .sequential(sequential)
                .roles(roles);
            new.expiration_hours = expires_in_hours;
            commands::create_policy(&ctx, actor(cli.user)?, new)?;
        }

        Commands::Policy(PolicyCommands::Update { id, fields }) => {
            commands::update_policy(&ctx, actor(cli.user)?, id, &fields)?;
        }

        Commands::Policy(PolicyCommands::List) => {
            commands::list_policies(&ctx)?;
        }

        Commands::Policy(PolicyCommands::Resolve {
            entity_type,
            action,
        }) => {
            commands::resolve_policy(&ctx, &entity_type, &action)?;
        }

        Commands::Sweep => {
            commands::sweep(&ctx)?;
        }

        Commands::Stats => {
            commands::stats(&ctx)?;
        }
    }

    Ok(())
}
