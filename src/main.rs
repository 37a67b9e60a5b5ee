use std::process::exit;

use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use drivegate::arg::Settings;
use drivegate::drive::fs::FsProvider;
use drivegate::server::Gateway;

fn main() {
    env_logger::init();

    let settings = Settings::from_args();

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot install signal handler: {}", e);
            exit(1);
        },
    };

    let storage = settings.storage.clone();
    let gateway = match Gateway::start(&settings, Box::new(move || FsProvider::open(&storage))) {
        Ok(v) => v,
        Err(e) => {
            error!("{}", e.report());
            exit(1);
        },
    };

    if let Some(sig) = signals.forever().next() {
        info!("received signal {}", sig);
    }

    info!("Closing");
    if let Err(e) = gateway.close() {
        error!("{}", e.report());
        exit(1);
    }
    info!("Bye!");
}
