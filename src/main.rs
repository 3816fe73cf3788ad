mod capability;
mod cmdline;
mod config;
mod errors;
mod logging;
mod ops;
mod path;
mod script;
mod template;


use crate::config::Config;
use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cmdline = match cmdline::parse(std::env::args().skip(1)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    let cfg = Config::discover(cmdline.config_path.as_deref()).context("loading config")?;
    cfg.validate().context("validating config")?;
    logging::init(&cfg.logging);

    info!(
        script = %cmdline.script_path,
        destination = %cmdline.destination_path,
        operations = ?script::OPERATIONS,
        "commence starting"
    );

    script::run(&cmdline, &cfg)
}
