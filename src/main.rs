use colored::Colorize;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ideaflow=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = ideaflow::run() {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(if err.is_user_correctable() { 2 } else { 1 });
    }
}
