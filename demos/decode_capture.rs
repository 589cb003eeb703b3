//! Decodes a hex capture with one of the built-in plugins and prints its records.
//!
//! ```text
//! cargo run --example decode_capture -- yamaha-dx7 "f0 43 00 00 01 1b ... f7"
//! ```

use std::{env, process::ExitCode};

use log::{error, info};
use sysex_librarian::{hex, scan, Registry};

fn main() -> ExitCode {
    simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    let registry = Registry::builtin();
    let mut args = env::args().skip(1);

    let (Some(name), Some(capture)) = (args.next(), args.next()) else {
        error!(
            "usage: decode_capture <device> <hex capture>; devices: {}",
            registry.names().collect::<Vec<_>>().join(", ")
        );
        return ExitCode::FAILURE;
    };

    let Some(device) = registry.get(&name) else {
        error!("no plugin named {name:?}");
        return ExitCode::FAILURE;
    };

    let bytes = hex::decode(&capture);
    let messages = scan(&bytes);
    info!("{} bytes, {} messages", bytes.len(), messages.len());

    for record in device.decode(&messages) {
        println!("{record}");
    }

    ExitCode::SUCCESS
}
