use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = fleet::cli::Cli::parse();
    match fleet::app::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fleet: {}", err);
            if let Some(hint) = &err.hint {
                eprintln!("fleet: hint: {}", hint);
            }
            std::process::exit(fleet::constants::process::EXIT_CONFIG);
        }
    }
}
