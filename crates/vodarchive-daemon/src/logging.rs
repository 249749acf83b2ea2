//! Structured logging bootstrap, matching `vclip-api`'s conditional JSON/ANSI split:
//! JSON for production log collection, colored text for a developer's terminal.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(log_json: bool) {
    let env_filter = EnvFilter::from_default_env().add_directive("vodarchive=info".parse().unwrap());

    if log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
