use anyhow::Context;
use clap::{Parser, Subcommand};
use shellfleet_shared::{CommandRecord, CommandStatus, DispatchClient, FailureKind, MachineSummary};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "fleetctl", version, about = "Operator front end of the fleet dispatcher")]
struct Cli {
    /// Base URL of the dispatch API.
    #[arg(long, env = "FLEET_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List machines seen within the active window
    Machines,
    /// Register a new script
    AddScript {
        name: String,
        /// Script body; read from --file when omitted
        content: Option<String>,
        #[arg(long, conflicts_with = "content")]
        file: Option<PathBuf>,
    },
    /// Show a stored script
    Script { name: String },
    /// Schedule a script on a machine by display name
    Execute { machine: String, script: String },
    /// Show the status and output of a command
    Result { id: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let client = DispatchClient::new(&cli.api_url)?;
    debug!("Using dispatch API at {}", client.base_url());

    match cli.command {
        Command::Machines => {
            let machines = client.list_machines().await?;
            print!("{}", render_machines(&machines));
        }
        Command::AddScript {
            name,
            content,
            file,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("provide the script content or --file"),
            };
            let reply = client.create_script(&name, &content).await?;
            println!("{}", reply.message);
        }
        Command::Script { name } => match client.get_script(&name).await? {
            Some(script) => print!("{}", script.content),
            None => anyhow::bail!("Script not found: {}", name),
        },
        Command::Execute { machine, script } => {
            let scheduled = client.schedule(&machine, &script).await?;
            println!("{} (command {})", scheduled.message, scheduled.command_id);
        }
        Command::Result { id } => {
            let record = client.get_command(id).await?;
            print!("{}", render_record(&record));
        }
    }

    Ok(())
}

fn render_machines(machines: &[MachineSummary]) -> String {
    if machines.is_empty() {
        return "No active machines\n".to_string();
    }
    machines
        .iter()
        .map(|m| format!("{}\t{}\n", m.name, m.id))
        .collect()
}

fn render_record(record: &CommandRecord) -> String {
    let status = match &record.status {
        CommandStatus::Failed {
            failure: FailureKind::NonZeroExit { code },
            ..
        } => format!("failed (exit {})", code),
        CommandStatus::Failed {
            failure: FailureKind::Fault,
            ..
        } => "failed (fault)".to_string(),
        other => other.label().to_string(),
    };

    let mut out = format!(
        "command {} on {}: {} [{}]\n",
        record.id, record.machine_id, record.script_name, status
    );
    if let Some(output) = record.status.output() {
        out.push_str(output);
        if !output.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
