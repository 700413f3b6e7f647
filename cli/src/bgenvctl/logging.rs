// cli/src/bgenvctl/logging.rs — stderr diagnostics for the tool and the library
//
// One fmt subscriber on stderr. `log` records from bootguard-env are bridged
// into it, so library and tool messages share one filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default `warn`, or whatever `RUST_LOG` says. `verbose` forces `debug`.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false).without_time();
    // a second init (tests, re-entry) keeps the first subscriber
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
