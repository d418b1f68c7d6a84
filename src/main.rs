// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use ledgercore::config::LedgerConfig;
use ledgercore::error::LedgerError;
use ledgercore::{cli, commands, db, logging};

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let cfg = LedgerConfig::load(matches.get_one::<String>("config").map(Path::new))?;
    let mut conn = db::open_or_init(&cfg)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path(&cfg)?.display());
        }
        Some(("account", sub)) => commands::accounts::handle(&mut conn, &cfg, sub)?,
        Some(("transfer", sub)) => commands::transfers::handle(&mut conn, &cfg, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&conn, sub)?,
        Some(("fund", sub)) => commands::funds::handle(&mut conn, &cfg, sub)?,
        Some(("deposit", sub)) => commands::deposits::handle(&mut conn, &cfg, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let matches = cli::build_cli().get_matches();
    logging::init(matches.get_count("verbose"), matches.get_flag("log-json"));

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Internal faults were logged in full; print only the public text.
            match err.downcast_ref::<LedgerError>() {
                Some(e) => eprintln!("error[{}]: {}", e.kind(), e.public_message()),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
