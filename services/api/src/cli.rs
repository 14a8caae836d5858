use crate::demo::{run_demo, run_resume, DemoArgs, ResumeArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lending_ai::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "MSME Underwriting Orchestrator",
    about = "Demonstrate and run the MSME loan underwriting orchestrator from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a synthetic loan application end to end and print the timeline
    Demo(DemoArgs),
    /// Sweep the checkpoint store and drive stalled workflows forward
    Resume(ResumeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Resume(args) => run_resume(args).await,
    }
}
