use std::{path::PathBuf, process};

use structopt::StructOpt;
use tokio::signal;
use tracing_subscriber::*;

use fedsum_server::{
    aggregator::SubmissionHandler,
    protocol::RoundProtocol,
    rest,
    settings::Settings,
    storage,
    trigger::{self, ManualTrigger},
};

#[macro_use]
extern crate tracing;

#[derive(Debug, StructOpt)]
#[structopt(name = "Coordinator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        api: api_settings,
        log: log_settings,
        protocol: protocol_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    // content addressing of published aggregates uses the crypto layer
    sodiumoxide::init().unwrap();

    let store = storage::memory_store();
    let handler = SubmissionHandler::new(store.clone(), protocol_settings.min_submissions);
    let protocol = RoundProtocol::new(store, protocol_settings.min_submissions);
    let (events, trigger) = ManualTrigger::new();

    tokio::select! {
        _ = trigger::run_advancement_loop(protocol.clone(), events) => {
            warn!("shutting down: advancement loop terminated");
        }
        _ = rest::serve(api_settings, handler, protocol, trigger) => {
            warn!("shutting down: REST server terminated");
        }
        _ = signal::ctrl_c() => {}
    }
}
