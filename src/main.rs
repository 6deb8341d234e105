use clap::{Parser, Subcommand};
use serde_json::Value;
use tasklane::config::Config;
use tasklane::error::{Result, TasklaneError};
use tasklane::logging::{self, Verbosity};
use tasklane::model::Role;
use tasklane::output::{self, Format};
use tasklane::procedures::{auth as auth_procs, users};
use tasklane::rpc::{self, Context};
use tasklane::store::Db;
use tasklane::store::workspace::{Workspace, find_workspace_root};
use tasklane::{server, token};

#[derive(Parser)]
#[command(
    name = "tasklane",
    version,
    about = "Self-hosted project and task tracker with a JSON RPC interface"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// More log output on stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a .tasklane/ workspace in the current directory
    Init,
    /// Run the HTTP server
    Serve {
        /// Address to bind (defaults to server.bind)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (defaults to server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Invoke a procedure against the local workspace
    Call {
        /// Procedure name, e.g. task.create
        procedure: String,
        /// JSON input (defaults to {})
        input: Option<String>,
        /// Session token (falls back to TASKLANE_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
    /// List every procedure
    Procedures,
    /// Operator commands that bypass sessions
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create an account directly
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },
    /// List every account
    ListUsers,
    /// Change an account's role
    SetRole {
        email: String,
        #[arg(value_enum)]
        role: Role,
    },
    /// Set a new password and revoke the account's sessions
    ResetPassword {
        email: String,
        #[arg(long)]
        password: String,
    },
}

fn user_id_for(db: &Db, email: &str) -> Result<i64> {
    let normalized = tasklane::auth::normalize_email(email)?;
    db.find_user_by_email(&normalized)?
        .map(|user| user.id)
        .ok_or_else(|| TasklaneError::invalid(format!("no account with email {normalized}")))
}

fn run_admin(command: AdminCommands, db: &Db, config: &Config, format: Format) -> Result<()> {
    match command {
        AdminCommands::CreateUser {
            email,
            name,
            password,
            admin,
        } => {
            let role = if admin { Role::Admin } else { Role::Member };
            let user = auth_procs::create_account(db, config, &email, &name, &password, role)?;
            output::print_user(&user, format)
        }
        AdminCommands::ListUsers => output::print_users(&db.list_users()?, format),
        AdminCommands::SetRole { email, role } => {
            let user = users::change_role(db, user_id_for(db, &email)?, role)?;
            output::print_user(&user, format)
        }
        AdminCommands::ResetPassword { email, password } => {
            let user_id = user_id_for(db, &email)?;
            users::reset_user_password(db, config, user_id, &password)?;
            output::print_user(&db.get_user(user_id)?, format)
        }
    }
}

fn run(cli: Cli, format: Format) -> Result<()> {
    // Commands that do not need an existing workspace
    match &cli.command {
        Commands::Init => {
            let cwd = std::env::current_dir()?;
            let workspace = Workspace::init(&cwd)?;
            return output::print_json(
                &serde_json::json!({ "ok": true, "workspace": workspace.dir }),
                format,
            );
        }
        Commands::Procedures => return output::print_procedures(rpc::PROCEDURES, format),
        _ => {}
    }

    let root = find_workspace_root()?;
    let workspace = Workspace::open(&root)?;

    match cli.command {
        Commands::Init | Commands::Procedures => unreachable!(),
        Commands::Serve { bind, port } => {
            let bind = bind.unwrap_or_else(|| workspace.config.server.bind.clone());
            let port = port.unwrap_or(workspace.config.server.port);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(workspace, &bind, port))
        }
        Commands::Call {
            procedure,
            input,
            token,
        } => {
            let input: Value = match input {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            };
            let token = token::resolve_token(token);
            let ctx = Context {
                db: &workspace.db,
                config: &workspace.config,
                token: token.as_deref(),
            };
            let result = rpc::dispatch(&ctx, &procedure, input)?;
            output::print_json(&result, format)
        }
        Commands::Admin(command) => run_admin(command, &workspace.db, &workspace.config, format),
    }
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    logging::init(Verbosity::from_flags(cli.quiet, cli.verbose));
    if let Err(e) = run(cli, format) {
        output::print_error(&e, format);
        std::process::exit(1);
    }
}
