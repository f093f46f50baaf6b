// src/main.rs

use execlane::{cli, logging, run};

#[tokio::main]
async fn main() {
    let code = match run_main().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("execlane error: {err:?}");
            1
        }
    };
    // A stdin read still blocked after shutdown would otherwise hold the
    // runtime open.
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
