//! `tollbooth` sends a single request to a rate limited REST API and prints
//! the response.
//!
//! The binary is a wrapper around tollbooth-lib, which waits for the limits
//! the server reports, replays requests answered with 429 and retries
//! timeouts and server errors.
//!
//! Fetch the current user:
//! ```sh
//! TOLLBOOTH_TOKEN=... tollbooth get /users/@me
//! ```
//!
//! Post a message:
//! ```sh
//! tollbooth post /channels/123456789012345678/messages --body '{"content":"hi"}'
//! ```
//!
//! Attach a file and leave a note in the audit log:
//! ```sh
//! tollbooth post /channels/123456789012345678/messages --file cat.png --reason "cat"
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use ::log::{error, info};
use tollbooth_lib::ResponseBody;

mod client;
mod log;
mod options;
mod verbosity;

use crate::log::init_logging;
use crate::options::{Config, TOLLBOOTH_CONFIG_FILE, TollboothOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, including a missing token.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<TollboothOptions> {
    let mut opts = TollboothOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, the default one is only used if it exists.
        // An invalid default file is still an error.
        let default_config = PathBuf::from(TOLLBOOTH_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and send the request
fn run_main() -> Result<i32> {
    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            return Ok(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(&opts))
}

/// Send the request described by `opts` and print the response body
async fn run(opts: &TollboothOptions) -> Result<i32> {
    let client = client::create(&opts.config)?;
    let request_options = opts.request.request_options()?;

    info!("{} {}", opts.method, opts.endpoint);

    match client
        .request(opts.method, &opts.endpoint, request_options)
        .await
    {
        Ok(body) => {
            write_body(&mut io::stdout().lock(), body.as_ref())?;
            Ok(ExitCode::Success as i32)
        }
        Err(e) if e.is_configuration() => Err(e.into()),
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::RequestFailure as i32)
        }
    }
}

/// Print a response body. JSON is pretty-printed, text is printed as is and
/// binary content is only summarized.
fn write_body(out: &mut impl Write, body: Option<&ResponseBody>) -> Result<()> {
    match body {
        Some(ResponseBody::Json(value)) => {
            writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
        }
        Some(ResponseBody::Bytes(bytes)) if bytes.is_empty() => {}
        Some(ResponseBody::Bytes(bytes)) => match std::str::from_utf8(bytes) {
            Ok(text) => writeln!(out, "{text}")?,
            Err(_) => writeln!(out, "{} bytes", bytes.len())?,
        },
        None => {}
    }
    Ok(())
}
