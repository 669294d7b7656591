use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wakatiwai_object::{ObjectSummary, SyncState};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    /// Reports go to stderr, so the choice follows stderr's terminal state.
    pub fn default_for_stderr() -> Self {
        if std::io::stderr().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct InventoryOutput<'a> {
    client: &'a str,
    object_count: usize,
    objects: &'a [ObjectSummary],
}

pub fn render_inventory(client: &str, objects: &[ObjectSummary], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let out = InventoryOutput {
                client,
                object_count: objects.len(),
                objects,
            };
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OBJECT", "STATE", "INSTANCES"]);
            for object in objects {
                table.add_row(vec![
                    object.object_id.to_string(),
                    state_name(object.state).to_string(),
                    instance_list(&object.instances),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Pretty => objects
            .iter()
            .map(|object| {
                format!(
                    "/{} state={} instances=[{}]",
                    object.object_id,
                    state_name(object.state),
                    instance_list(&object.instances)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn print_inventory(client: &str, objects: &[ObjectSummary], format: OutputFormat) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{}", render_inventory(client, objects, format));
    let _ = err.flush();
}

fn state_name(state: SyncState) -> &'static str {
    match state {
        SyncState::Synchronized => "synchronized",
        SyncState::Unsynchronized => "unsynchronized",
    }
}

fn instance_list(ids: &[u16]) -> String {
    ids.iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
