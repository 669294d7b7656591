use tracing::debug;
use wakatiwai_object::ObjectRegistry;

use crate::cmd::{stdio_channel, InventoryArgs};
use crate::exit::{registry_error, CliResult, SUCCESS};
use crate::output::{print_inventory, OutputFormat};

pub fn run(args: InventoryArgs) -> CliResult<i32> {
    let extra = args.bridge.object_ids()?;
    let mut channel = stdio_channel(args.bridge.channel_config()?)?;

    let registry = ObjectRegistry::bootstrap(&extra, &mut channel)
        .map_err(|err| registry_error("object registration failed", err))?;
    debug!(objects = registry.len(), "inventory complete");

    let format = args.format.unwrap_or_else(OutputFormat::default_for_stderr);
    print_inventory(&args.bridge.name, &registry.summary(), format);
    Ok(SUCCESS)
}
