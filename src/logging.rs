// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flag.
/// Output goes to stderr so table/JSON output on stdout stays clean.
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => "ledgercore=info",
        1 => "ledgercore=debug",
        _ => "ledgercore=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
