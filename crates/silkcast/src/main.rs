mod cmd;
mod exit;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{LogFormat, LogLevel};
use crate::output::{OutputFormat, Printer};

/// Receive and inspect SilkCast video streams.
#[derive(Parser, Debug)]
#[command(name = "silkcast", version)]
struct Cli {
    /// Output format; defaults to table on a terminal, json otherwise.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log format on stderr.
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Log level on stderr (SILKCAST_LOG overrides).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.log_level);

    let mut printer = Printer::stdout(cli.format.unwrap_or_else(OutputFormat::detect));
    match cmd::run(cli.command, &mut printer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(u8::try_from(err.code).unwrap_or(u8::MAX))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("silkcast").chain(args.iter().copied()))
            .unwrap_or_else(|err| panic!("{args:?} should parse: {err}"))
    }

    #[test]
    fn receive_takes_codec_and_port() {
        let cli = parse(&["receive", "http://127.0.0.1:8080", "--codec", "h264", "--port", "6000"]);
        match cli.command {
            Command::Receive(args) => {
                assert_eq!(args.codec, "h264");
                assert_eq!(args.port, 6000);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_accepts_several_files() {
        let cli = parse(&["send", "127.0.0.1:5000", "a.jpg", "b.jpg", "--mtu", "512"]);
        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.mtu, 512);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_without_file_is_rejected() {
        let err = Cli::try_parse_from(["silkcast", "send", "127.0.0.1:5000"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = parse(&["scan", "-", "--format", "json", "--log-level", "debug"]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }
}
