// Copyright 2025 The NativeLink Authors. All rights reserved.
//
// Licensed under the Functional Source License, Version 1.1, Apache 2.0 Future License (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    See LICENSE file for details
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use pxsnap_error::{Error, ResultExt};
use pxsnap_snapshot::plugin::Plugin;
use pxsnap_util::init_tracing;
use tracing::{Instrument, Level, event, trace_span};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Drives the Portworx snapshot plugin from the command line.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Plugin config file: a JSON5 object of string settings, the same map
    /// the backup orchestrator passes on init.
    #[clap(long, short)]
    config: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshots a volume and prints the snapshot id.
    CreateSnapshot {
        volume_id: String,
        #[clap(long, default_value = "")]
        zone: String,
        /// Tag attached to the snapshot, as `key=value`. May be repeated.
        #[clap(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },
    /// Creates a volume from a snapshot and prints the new volume id.
    Restore {
        snapshot_id: String,
        #[clap(long, default_value = "")]
        volume_type: String,
        #[clap(long, default_value = "")]
        zone: String,
        #[clap(long)]
        iops: Option<i64>,
    },
    Delete {
        snapshot_id: String,
    },
    /// Prints the volume type and IOPS reported for a volume.
    Describe {
        volume_id: String,
        #[clap(long, default_value = "")]
        zone: String,
    },
    /// Prints the storage volume id of a PersistentVolume JSON file.
    GetVolumeId {
        pv_file: String,
    },
    /// Prints the PersistentVolume JSON file rewritten to `volume_id`.
    SetVolumeId {
        pv_file: String,
        volume_id: String,
    },
    /// Prints a control plane token with admin privileges.
    AdminToken,
}

fn parse_tag(tag: &str) -> Result<(String, String), String> {
    tag.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("Tag {tag} is not of the form key=value"))
}

fn read_config(path: &str) -> Result<HashMap<String, String>, Error> {
    let contents = std::fs::read_to_string(path)
        .err_tip(|| format!("Could not open config file {path}"))?;
    serde_json5::from_str(&contents).err_tip(|| format!("Could not parse config file {path}"))
}

fn read_descriptor(path: &str) -> Result<serde_json::Value, Error> {
    let contents = std::fs::read_to_string(path)
        .err_tip(|| format!("Could not open PersistentVolume file {path}"))?;
    serde_json::from_str(&contents)
        .err_tip(|| format!("Could not parse PersistentVolume file {path}"))
}

async fn run(plugin: &Plugin, command: Command) -> Result<String, Error> {
    match command {
        Command::CreateSnapshot {
            volume_id,
            zone,
            tags,
        } => {
            let tags = tags.into_iter().collect();
            plugin.create_snapshot(&volume_id, &zone, &tags).await
        }
        Command::Restore {
            snapshot_id,
            volume_type,
            zone,
            iops,
        } => {
            plugin
                .create_volume_from_snapshot(&snapshot_id, &volume_type, &zone, iops)
                .await
        }
        Command::Delete { snapshot_id } => {
            plugin.delete_snapshot(&snapshot_id).await?;
            Ok(format!("Deleted {snapshot_id}"))
        }
        Command::Describe { volume_id, zone } => {
            let (volume_type, iops) = plugin.describe_volume(&volume_id, &zone)?;
            Ok(match iops {
                Some(iops) => format!("{volume_type} iops={iops}"),
                None => volume_type,
            })
        }
        Command::GetVolumeId { pv_file } => plugin.get_volume_id(&read_descriptor(&pv_file)?),
        Command::SetVolumeId { pv_file, volume_id } => {
            let updated = plugin.set_volume_id(&read_descriptor(&pv_file)?, &volume_id)?;
            Ok(serde_json::to_string_pretty(&updated)?)
        }
        Command::AdminToken => plugin.admin_token(),
    }
}

async fn inner_main(args: Args) -> Result<(), Error> {
    let config = read_config(&args.config)?;
    let mut plugin = Plugin::new();
    plugin
        .initialize(&config)
        .await
        .err_tip(|| "Initializing snapshot plugin")?;
    let plugin = Arc::new(plugin);

    {
        let plugin = plugin.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                event!(Level::WARN, "User interrupted, cancelling pending operations");
                plugin.shutdown();
            }
        });
    }

    let output = run(&plugin, args.command).await?;
    writeln!(std::io::stdout().lock(), "{output}")?;
    Ok(())
}

fn main() -> Result<(), Box<dyn core::error::Error>> {
    init_tracing()?;

    let args = Args::parse();
    #[allow(clippy::disallowed_methods)]
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime
            .block_on(inner_main(args).instrument(trace_span!("main")))
            .err_tip(|| "main() function failed")?;
    }
    Ok(())
}
