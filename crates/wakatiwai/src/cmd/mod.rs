use std::time::Duration;

use clap::{Args, Subcommand};
use wakatiwai_object::{parse_object_ids, Channel, ChannelConfig};

use crate::exit::{bridge_error, registry_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod inventory;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the client, bridging objects to the process on stdin/stdout.
    Run(RunArgs),
    /// Read every object's instances from the peer and print them to stderr.
    Inventory(InventoryArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Inventory(args) => inventory::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by every command that talks to the peer process.
#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Client endpoint name.
    #[arg(long, short = 'n', env = "WAKATIWAI_NAME", default_value = "wakatiwai")]
    pub name: String,
    /// Additional object ids (comma-separated); 0, 1, 2 and 3 are always present.
    #[arg(long, short = 'o', env = "WAKATIWAI_OBJECTS", default_value = "")]
    pub objects: String,
    /// Time to wait for each peer response (e.g. 1500ms, 2s).
    #[arg(long, env = "WAKATIWAI_RESPONSE_TIMEOUT", default_value = "1500ms")]
    pub response_timeout: String,
    /// Largest inbound envelope accepted, in bytes.
    #[arg(long, env = "WAKATIWAI_MAX_MESSAGE_SIZE", default_value_t = 65536)]
    pub max_message_size: usize,
}

impl BridgeArgs {
    pub fn object_ids(&self) -> CliResult<Vec<u16>> {
        parse_object_ids(&self.objects).map_err(|err| registry_error("invalid --objects", err))
    }

    pub fn channel_config(&self) -> CliResult<ChannelConfig> {
        if self.max_message_size == 0 {
            return Err(CliError::usage("max message size must be greater than zero"));
        }
        Ok(ChannelConfig {
            response_timeout: parse_duration(&self.response_timeout)?,
            max_message_size: self.max_message_size,
        })
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub bridge: BridgeArgs,
    /// Longest wait between engine steps (e.g. 5s, 250ms).
    #[arg(long, env = "WAKATIWAI_INTERVAL", default_value = "5s")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct InventoryArgs {
    #[command(flatten)]
    pub bridge: BridgeArgs,
    /// Report format. Default: table on a terminal, json otherwise.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Channel over this process's stdin and stdout.
pub fn stdio_channel(
    config: ChannelConfig,
) -> CliResult<Channel<wakatiwai_transport::PollStream<std::fs::File>, std::io::Stdout>> {
    Channel::stdio(config).map_err(|err| bridge_error("failed to open stdio", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    fn bridge(objects: &str, timeout: &str) -> BridgeArgs {
        BridgeArgs {
            name: "test".into(),
            objects: objects.into(),
            response_timeout: timeout.into(),
            max_message_size: 65536,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        for bad in ["", "0s", "0ms", "bad", "1.5s", "-1s", "5m"] {
            assert_eq!(parse_duration(bad).unwrap_err().code, USAGE, "{bad:?}");
        }
    }

    #[test]
    fn channel_config_from_args() {
        let config = bridge("", "250ms").channel_config().unwrap();
        assert_eq!(config.response_timeout, Duration::from_millis(250));
        assert_eq!(config.max_message_size, 65536);
    }

    #[test]
    fn reserved_object_ids_are_usage_errors() {
        assert_eq!(bridge("1024,2", "1s").object_ids().unwrap_err().code, USAGE);
        assert_eq!(bridge("1024,5", "1s").object_ids().unwrap(), vec![1024, 5]);
    }
}
