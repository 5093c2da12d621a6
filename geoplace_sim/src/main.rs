//! geoplace Scene Simulator CLI
//!
//! Run deterministic camera-path scenarios over composed scenes.

use clap::Parser;
use geoplace_core::SceneSpec;
use geoplace_sim::scenarios::ScenarioId;
use geoplace_sim::{ScenarioResult, ScenarioRunner, MAP_NAMES};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// geoplace scene simulation CLI
#[derive(Parser, Debug)]
#[command(name = "geoplace-sim")]
#[command(about = "Run deterministic scene placement scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (globe_orbit, prague_approach, late_terrain, label_storm, close_labels, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Frames per scenario
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Viewport width in pixels
    #[arg(long, default_value = "1024")]
    width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value = "768")]
    height: u32,

    /// JSON scene description to use instead of the demo scene
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Map descriptor (globe, globe_paged)
    #[arg(short, long)]
    map: Option<String>,

    /// Load icons and models from this directory
    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export every frame to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn usage_exit(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("Usage: geoplace-sim [--scene <scene.json>] [--map <{}>] [--scenario <name>]", MAP_NAMES.join("|"));
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    if !args.json {
        info!("geoplace Scene Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e: String| usage_exit(&e))]
    };

    let scene = args.scene.as_ref().map(|path| {
        SceneSpec::from_file(path).unwrap_or_else(|e| usage_exit(&format!("{}: {}", path.display(), e)))
    });

    // Reject unknown maps before anything is composed
    let map = args.map.clone().or_else(|| scene.as_ref().map(|s| s.map.clone()));
    if let Some(map) = &map {
        if !MAP_NAMES.contains(&map.as_str()) {
            usage_exit(&format!("No map found: {} (available: {})", map, MAP_NAMES.join(", ")));
        }
    }

    // Determine base seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let mut runner = ScenarioRunner::new(seed)
        .with_frames(args.frames)
        .with_viewport(args.width, args.height);
    if let Some(scene) = scene {
        runner = runner.with_scene(scene);
    }
    if let Some(map) = args.map {
        runner = runner.with_map(map);
    }
    if let Some(root) = args.asset_root {
        runner = runner.with_asset_root(root);
    }

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            usage_exit("--export only supports a single scenario, not 'all'");
        }

        let (result, export) = runner.run_exported(scenarios[0]);
        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }

        if result.passed {
            info!("✓ {} (seed={}) PASSED - exported to {}", result.scenario, seed, export_path);
        } else {
            error!(
                "✗ {} FAILED: {}",
                result.scenario,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let result = runner.run(*scenario);

        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED | mean visible {:.1} | decluttered {} | flicker {}",
                    scenario.name(),
                    seed,
                    result.metrics.mean_visible,
                    result.metrics.total_decluttered,
                    result.metrics.flicker_events
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        all_results.push(result);
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.total_frames,
                    "composed": r.composed,
                    "omitted": r.omitted,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
