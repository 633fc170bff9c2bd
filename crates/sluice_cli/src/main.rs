//! sluice CLI
//!
//! Validates asset manifests, builds reactive scheduling plans against a
//! JSON event log, and reports unsynced partitions. Results go to stdout
//! as JSON; logs go to stderr.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::Serialize;
use sluice_core::{AssetKey, EventId, PartitionKey, Timestamp};
use sluice_log::{InstanceQueryer, MemoryInstance};
use sluice_partition::{PartitionSpace, TimeWindow};
use sluice_plan::{
    AssetGraph, AssetGraphView, AssetManifest, ManifestCache, PlanOptions, SchedulingExecutionContext,
    build_reactive_scheduling_plan_with_options,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "sluice - reactive scheduling for partitioned assets", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an asset manifest
    Validate {
        /// Path to the manifest
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Build a launch plan
    Plan {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        /// Starting slice as `KEY` or `KEY:P1,P2` (repeatable)
        #[arg(short, long, value_parser = parse_selection)]
        asset: Vec<AssetSelection>,
        /// Starting time window as `KEY:START..END` in RFC 3339 (repeatable)
        #[arg(short, long, value_parser = parse_window)]
        window: Vec<WindowSelection>,
        /// Also offer launched slices to downstream assets
        #[arg(long)]
        downstream: bool,
    },
    /// List unsynced partitions of an asset
    Unsynced {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        /// Asset key
        #[arg(short, long)]
        asset: String,
    },
}

/// Where and when to read
#[derive(Args)]
struct SnapshotArgs {
    /// Path to the manifest
    #[arg(short, long)]
    manifest: PathBuf,
    /// Path to a JSON event log
    #[arg(short, long)]
    events: Option<PathBuf>,
    /// Evaluation time (RFC 3339), now if absent
    #[arg(long, value_parser = parse_timestamp)]
    effective_dt: Option<Timestamp>,
    /// Newest event id to consider, the latest if absent
    #[arg(long)]
    last_event_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AssetSelection {
    key: AssetKey,
    partitions: Option<Vec<PartitionKey>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WindowSelection {
    key: AssetKey,
    window: TimeWindow,
}

#[derive(Serialize)]
struct UnsyncedReport {
    asset_key: AssetKey,
    effective_dt: Timestamp,
    last_event_id: Option<EventId>,
    partitions: Vec<Option<PartitionKey>>,
}

fn parse_key(value: &str) -> Result<AssetKey, String> {
    AssetKey::from_user_string(value).map_err(|e| e.to_string())
}

fn parse_timestamp(value: &str) -> Result<Timestamp, String> {
    Timestamp::parse_rfc3339(value).map_err(|e| e.to_string())
}

fn parse_selection(value: &str) -> Result<AssetSelection, String> {
    match value.split_once(':') {
        None => Ok(AssetSelection {
            key: parse_key(value)?,
            partitions: None,
        }),
        Some((key, partitions)) => {
            let partitions: Vec<PartitionKey> = partitions
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if partitions.is_empty() {
                return Err(format!("no partitions listed after `{key}:`"));
            }
            Ok(AssetSelection {
                key: parse_key(key)?,
                partitions: Some(partitions),
            })
        }
    }
}

fn parse_window(value: &str) -> Result<WindowSelection, String> {
    let (key, range) = value
        .split_once(':')
        .ok_or_else(|| format!("expected KEY:START..END, got `{value}`"))?;
    let (start, end) = range
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got `{range}`"))?;
    let window = TimeWindow::new(parse_timestamp(start)?, parse_timestamp(end)?).map_err(|e| e.to_string())?;
    Ok(WindowSelection {
        key: parse_key(key)?,
        window,
    })
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sluice=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_instance(events: Option<&Path>) -> Result<MemoryInstance> {
    let Some(path) = events else {
        return Ok(MemoryInstance::new());
    };
    let json = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let instance =
        MemoryInstance::from_json_str(&json).wrap_err_with(|| format!("loading events from {}", path.display()))?;
    Ok(instance)
}

fn open_context(cache: &mut ManifestCache, args: &SnapshotArgs) -> Result<SchedulingExecutionContext> {
    let graph: Arc<AssetGraph> = cache
        .load_path(&args.manifest)
        .wrap_err_with(|| format!("loading manifest {}", args.manifest.display()))?;
    let instance: Arc<dyn InstanceQueryer> = Arc::new(load_instance(args.events.as_deref())?);
    let effective_dt = args.effective_dt.unwrap_or_else(Timestamp::now);
    let ctx = SchedulingExecutionContext::create(
        graph,
        instance,
        effective_dt,
        args.last_event_id.map(EventId::from_raw),
    )?;
    Ok(ctx)
}

fn starting_slices(
    view: &AssetGraphView<'_>,
    assets: &[AssetSelection],
    windows: &[WindowSelection],
) -> Result<Vec<PartitionSpace>> {
    let mut slices = Vec::with_capacity(assets.len() + windows.len());
    for selection in assets {
        let slice = match &selection.partitions {
            Some(keys) => view.from_partition_keys(&selection.key, keys.iter().cloned())?,
            None => view.get_asset_slice(&selection.key)?,
        };
        slices.push(slice);
    }
    for selection in windows {
        slices.push(view.from_time_window(&selection.key, &selection.window)?);
    }
    Ok(slices)
}

fn validate(manifest: &Path) -> Result<String> {
    let manifest = AssetManifest::from_path(manifest)?;
    let assets = manifest.assets.len();
    let problems = manifest.problems();
    if problems.is_empty() {
        return Ok(format!("ok: {assets} assets"));
    }
    for problem in &problems {
        tracing::error!(%problem, "invalid manifest");
    }
    let listed: Vec<String> = problems.iter().map(ToString::to_string).collect();
    Err(eyre!("{} problem(s):\n  {}", problems.len(), listed.join("\n  ")))
}

fn plan(
    cache: &mut ManifestCache,
    snapshot: &SnapshotArgs,
    assets: &[AssetSelection],
    windows: &[WindowSelection],
    downstream: bool,
) -> Result<String> {
    if assets.is_empty() && windows.is_empty() {
        return Err(eyre!("nothing requested: pass --asset or --window"));
    }
    let ctx = open_context(cache, snapshot)?;
    let view = AssetGraphView::new(&ctx);
    let slices = starting_slices(&view, assets, windows)?;
    let options = PlanOptions::default().with_downstream(downstream);
    let plan = build_reactive_scheduling_plan_with_options(&ctx, &slices, options)?;
    Ok(serde_json::to_string_pretty(&plan)?)
}

fn unsynced(cache: &mut ManifestCache, snapshot: &SnapshotArgs, asset: &str) -> Result<String> {
    let asset_key = parse_key(asset).map_err(|e| eyre!(e))?;
    let ctx = open_context(cache, snapshot)?;
    let view = AssetGraphView::new(&ctx);
    let slice = view.compute_unsynced(&asset_key)?;
    let report = UnsyncedReport {
        asset_key,
        effective_dt: ctx.effective_dt(),
        last_event_id: ctx.last_event_id(),
        partitions: slice
            .materialize_asset_partitions()
            .into_iter()
            .map(|p| p.partition_key)
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut cache = ManifestCache::new();
    let output = match &cli.command {
        Commands::Validate { manifest } => validate(manifest)?,
        Commands::Plan {
            snapshot,
            asset,
            window,
            downstream,
        } => plan(&mut cache, snapshot, asset, window, *downstream)?,
        Commands::Unsynced { snapshot, asset } => unsynced(&mut cache, snapshot, asset)?,
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"{
        "assets": [
            { "key": "up", "partitions": { "type": "static", "keys": ["A", "B", "C"] } },
            { "key": "down",
              "partitions": { "type": "static", "keys": ["1", "2", "3"] },
              "deps": [{ "asset": "up",
                         "mapping": { "type": "static_key_map",
                                      "map": { "A": ["1"], "B": ["2"], "C": ["3"] } } }] }
        ]
    }"#;

    const EVENTS: &str = r#"[
        { "kind": "materialization", "asset_key": "up", "partition": "A", "timestamp": "2024-01-01T00:00:00Z" },
        { "kind": "materialization", "asset_key": "down", "partition": "1", "timestamp": "2024-01-01T01:00:00Z" },
        { "kind": "materialization", "asset_key": "up", "partition": "A", "timestamp": "2024-01-01T02:00:00Z" }
    ]"#;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn snapshot(manifest: &Path, events: Option<&Path>) -> SnapshotArgs {
        SnapshotArgs {
            manifest: manifest.to_path_buf(),
            events: events.map(Path::to_path_buf),
            effective_dt: Some(Timestamp::from_ymd(2024, 1, 2).unwrap()),
            last_event_id: None,
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_selection() {
        let selection = parse_selection("raw/events").unwrap();
        assert_eq!(selection.key.to_string(), "raw/events");
        assert_eq!(selection.partitions, None);

        let selection = parse_selection("down:1, 3").unwrap();
        assert_eq!(selection.partitions, Some(vec!["1".to_string(), "3".to_string()]));

        let selection = parse_selection("hourly:2021-01-01-05:00").unwrap();
        assert_eq!(selection.partitions, Some(vec!["2021-01-01-05:00".to_string()]));

        assert!(parse_selection("down:").is_err());
        assert!(parse_selection("").is_err());
    }

    #[test]
    fn test_parse_window() {
        let selection = parse_window("daily:2021-01-01T00:00:00Z..2021-01-02T00:00:00Z").unwrap();
        assert_eq!(selection.key.to_string(), "daily");
        assert_eq!(selection.window.start, Timestamp::from_ymd(2021, 1, 1).unwrap());
        assert!(parse_window("daily:2021-01-01T00:00:00Z").is_err());
        assert!(parse_window("daily").is_err());
    }

    #[test]
    fn test_validate_command() {
        let good = write_temp(MANIFEST);
        assert_eq!(validate(good.path()).unwrap(), "ok: 2 assets");

        let bad = write_temp(r#"{ "assets": [{ "key": "a", "deps": [{ "asset": "a" }] }] }"#);
        assert!(validate(bad.path()).is_err());
    }

    #[test]
    fn test_plan_command() {
        let manifest = write_temp(MANIFEST);
        let mut cache = ManifestCache::new();
        let selection = [parse_selection("down:1").unwrap()];
        let output = plan(&mut cache, &snapshot(manifest.path(), None), &selection, &[], false).unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        let launch = &value["launch_partition_space"];
        assert_eq!(launch["up"]["subset"]["keys"], serde_json::json!(["A"]));
        assert_eq!(launch["down"]["subset"]["keys"], serde_json::json!(["1"]));

        assert!(plan(&mut cache, &snapshot(manifest.path(), None), &[], &[], false).is_err());
    }

    #[test]
    fn test_unsynced_command() {
        let manifest = write_temp(MANIFEST);
        let events = write_temp(EVENTS);
        let mut cache = ManifestCache::new();
        let output = unsynced(&mut cache, &snapshot(manifest.path(), Some(events.path())), "down").unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["partitions"], serde_json::json!(["1", "2", "3"]));
        assert_eq!(value["last_event_id"], serde_json::json!(3));
        assert_eq!(cache.stats(), (0, 1));
    }
}
