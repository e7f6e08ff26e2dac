use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = logkeeperctl::Cli::parse();
    logkeeperctl::init_tracing(cli.verbose);
    if let Err(err) = logkeeperctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
