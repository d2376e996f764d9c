//! CodeAtEase server binary

use clap::Parser;

use codeatease::cli::{Args, EXIT_SUCCESS};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = codeatease::run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
    std::process::exit(EXIT_SUCCESS);
}
