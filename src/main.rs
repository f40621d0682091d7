use clap::{Parser, Subcommand};
use jupyter_dap_proxy::config::{ProxyConfig, ServeArgs};
use jupyter_dap_proxy::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jupyter_dap_proxy")]
#[command(about = "DAP proxy that maps Jupyter kernel debugger locations onto cells", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy between an editor and a kernel debugger
    Serve(ServeArgs),
}

fn init_logging(args: &ServeArgs) {
    let level = if args.verbose { "debug" } else { &args.log_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout may carry DAP traffic, so logs always go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            init_logging(&args);

            let config = ProxyConfig::from_args(&args)?;
            jupyter_dap_proxy::serve(config).await?;
        }
    }

    Ok(())
}
