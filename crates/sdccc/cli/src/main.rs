//! SDCcc - conformance test tool for SDC medical device communication

use clap::Parser;
use sdccc_cli::{app, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = app::run(cli).await;
    std::process::exit(code);
}
