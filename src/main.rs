mod cli;
mod config;
mod error;
mod ipc;
mod landmarks;
mod logging;
mod motion;
mod rules;
mod session;
mod stability;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
