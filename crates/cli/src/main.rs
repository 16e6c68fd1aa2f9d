mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// ThingTalk program toolchain.
#[derive(Parser)]
#[command(name = "thingtalk", version, about = "ThingTalk program toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of class definitions, one <kind>.json per class
    #[arg(long, global = true)]
    schemas: Option<PathBuf>,

    /// Base URL of a Thingpedia registry
    #[arg(long, global = true)]
    thingpedia: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Typecheck a program and print it with schemas resolved
    Typecheck {
        /// Path to the program (interchange JSON)
        file: PathBuf,
    },

    /// List the slots of a program
    Slots {
        /// Path to the program (interchange JSON)
        file: PathBuf,
    },

    /// List the device functions a program calls
    Primitives {
        /// Path to the program (interchange JSON)
        file: PathBuf,
        /// Also list calls to local declarations and memory tables
        #[arg(long)]
        include_var_refs: bool,
    },

    /// Simplify the filters of a program
    Optimize {
        /// Path to the program (interchange JSON)
        file: PathBuf,
    },

    /// Derive the permission rule that allows running a program
    Permission {
        /// Path to the program (interchange JSON)
        file: PathBuf,
        /// Contact the rule is granted to
        #[arg(long)]
        principal: String,
        /// Display name of the contact
        #[arg(long)]
        contact_name: Option<String>,
    },

    /// Lower `return` actions of a remote program
    Lower {
        /// Path to the program (interchange JSON)
        file: PathBuf,
        /// Messaging account type results are delivered over
        #[arg(long)]
        messaging_type: String,
        /// Messaging account of the program owner
        #[arg(long)]
        account: String,
    },

    /// Turn a declaration or dataset example into a program
    ToProgram {
        /// Path to the declaration or example (interchange JSON)
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let settings = match config::Settings::resolve(
        cli.config.as_deref(),
        cli.schemas.clone(),
        cli.thingpedia.clone(),
    ) {
        Ok(settings) => settings,
        Err(e) => {
            report_error(&e, cli.output, cli.quiet);
            process::exit(1);
        }
    };

    let (output, quiet) = (cli.output, cli.quiet);
    match cli.command {
        Commands::Typecheck { file } => {
            commands::typecheck::cmd_typecheck(&file, &settings, output, quiet);
        }
        Commands::Slots { file } => {
            commands::slots::cmd_slots(&file, &settings, output, quiet);
        }
        Commands::Primitives {
            file,
            include_var_refs,
        } => {
            commands::primitives::cmd_primitives(&file, include_var_refs, output, quiet);
        }
        Commands::Optimize { file } => {
            commands::optimize::cmd_optimize(&file, output, quiet);
        }
        Commands::Permission {
            file,
            principal,
            contact_name,
        } => {
            commands::permission::cmd_permission(
                &file,
                &principal,
                contact_name.as_deref(),
                &settings,
                output,
                quiet,
            );
        }
        Commands::Lower {
            file,
            messaging_type,
            account,
        } => {
            commands::lower::cmd_lower(&file, &messaging_type, &account, &settings, output, quiet);
        }
        Commands::ToProgram { file } => {
            commands::to_program::cmd_to_program(&file, output, quiet);
        }
    }
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the `warn`
/// default.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Writes `msg` to stderr, as `{"error": msg}` in JSON mode.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
