//! Logging setup
//!
//! Logs go to stderr. `RUST_LOG` overrides the default filter.

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "toggle_light_dark=info";
const VERBOSE_DIRECTIVE: &str = "toggle_light_dark=debug";

pub fn init(verbose: bool, json: bool) -> anyhow::Result<()> {
    let filter = build_filter(verbose)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

fn build_filter(verbose: bool) -> anyhow::Result<EnvFilter> {
    let directive = if verbose {
        VERBOSE_DIRECTIVE
    } else {
        DEFAULT_DIRECTIVE
    };
    Ok(EnvFilter::from_default_env().add_directive(directive.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        assert!(build_filter(false).is_ok());
        assert!(build_filter(true).is_ok());
    }
}
