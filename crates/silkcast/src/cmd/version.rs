use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, Context};
use crate::output::Printer;

#[derive(Debug, Serialize)]
struct VersionReport {
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    features: Vec<&'static str>,
    header_size: usize,
    default_mtu: usize,
}

impl VersionReport {
    fn collect() -> Self {
        let features = [
            ("client", cfg!(feature = "client")),
            ("async", cfg!(feature = "async")),
            ("cli", true),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.then_some(name))
        .collect();

        Self {
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("SILKCAST_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("SILKCAST_BUILD_PROFILE").unwrap_or("unknown"),
            features,
            header_size: silkcast_frame::HEADER_SIZE,
            default_mtu: silkcast_frame::DEFAULT_MTU,
        }
    }
}

pub fn run(args: VersionArgs, printer: &mut Printer) -> CliResult<()> {
    if !args.extended {
        println!("silkcast {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    printer
        .summary("version", &VersionReport::collect())
        .context("failed writing output")
}
