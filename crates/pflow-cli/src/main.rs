use clap::Parser;
use pflow_cli::cli::Cli;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: a global tracing subscriber was already installed");
    }

    match pflow_cli::run(&cli) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
