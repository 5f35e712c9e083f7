// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use clap::{Arg, ArgAction};
use std::path::Path;
use tokio::runtime::Runtime;

use super::ServerContext;
use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::log::init_log;

pub const DEFAULT_CONFIG: &str = "/etc/naiad/naiad.toml";
const OPT_CONFIG: &str = "config";
const OPT_TEST: &str = "test";

/// Entry point of the server binary.
///
/// # Errors
///
/// Returns error if the config file is invalid or the server fails to
/// start; the caller maps the error kind to a process exit code.
pub fn run_server() -> Result<(), Error> {
    let matches = clap::Command::new("Naiad")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Single node MQTT v3.1.1 broker")
        .arg(
            Arg::new(OPT_CONFIG)
                .short('c')
                .long(OPT_CONFIG)
                .value_name("config_file")
                .help("Specify config file path"),
        )
        .arg(
            Arg::new(OPT_TEST)
                .short('t')
                .long(OPT_TEST)
                .action(ArgAction::SetTrue)
                .help("Test config file and exit"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>(OPT_CONFIG)
        .map(String::as_str)
        .or_else(|| Path::new(DEFAULT_CONFIG).exists().then_some(DEFAULT_CONFIG));

    let config = if let Some(config_file) = config_file {
        let config_content = std::fs::read_to_string(config_file).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to read config file {config_file}, err: {err}"),
            )
        })?;
        let config = Config::from_toml(&config_content)?;

        if matches.get_flag(OPT_TEST) {
            println!("The configuration file {config_file} syntax is Ok");
            return Ok(());
        }
        config
    } else {
        Config::default()
    };

    run_server_with_config(config)
}

/// Run server with a prepared config.
///
/// Useful for integration tests.
///
/// # Errors
///
/// Returns error if the server fails to start.
pub fn run_server_with_config(config: Config) -> Result<(), Error> {
    init_log(config.log())?;

    let mut server = ServerContext::new(config);
    let runtime = Runtime::new()?;
    runtime.block_on(server.run_loop())
}
