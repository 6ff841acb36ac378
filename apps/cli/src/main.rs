// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: Generate SVG construction drawings from tessellated models
//!
//! Takes one or more model documents plus an output path. Every boolean
//! setting has a `--flag` / `--no-flag` pair; typed settings take a value.
//!
//! Usage:
//!   ifcplot <model.json> [model2.json ...] <output.svg> [options]

use std::env;
use std::io::Write;
use std::process;
use std::time::Instant;

use ifcplot_draw::{draw, write_output, DrawSettings, Progress};
use ifcplot_model::Model;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        process::exit(if args.len() < 3 { 1 } else { 0 });
    }

    let mut settings = DrawSettings::default();
    let mut files: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => settings.width = parse_value(&args, &mut i, "width"),
            "--height" => settings.height = parse_value(&args, &mut i, "height"),
            "--scale" => settings.scale = parse_value(&args, &mut i, "scale"),
            "--profile-threshold" => {
                settings.profile_threshold = parse_value(&args, &mut i, "profile-threshold")
            }
            "--storey-heights" => {
                i += 1;
                settings.storey_heights = expect_value(&args, i, "storey-heights").to_string();
            }
            "--include-entities" => {
                i += 1;
                settings.include_entities = expect_value(&args, i, "include-entities").to_string();
            }
            "--exclude-entities" => {
                i += 1;
                settings.exclude_entities = expect_value(&args, i, "exclude-entities").to_string();
            }
            "--cache-dir" => {
                i += 1;
                settings.cache_dir = expect_value(&args, i, "cache-dir").to_string();
            }
            "--auto-elevation" => settings.auto_elevation = true,
            "--no-auto-elevation" => settings.auto_elevation = false,
            "--auto-section" => settings.auto_section = true,
            "--no-auto-section" => settings.auto_section = false,
            "--auto-floorplan" => settings.auto_floorplan = true,
            "--no-auto-floorplan" => settings.auto_floorplan = false,
            "--space-names" => settings.space_names = true,
            "--no-space-names" => settings.space_names = false,
            "--space-areas" => settings.space_areas = true,
            "--no-space-areas" => settings.space_areas = false,
            "--door-arcs" => settings.door_arcs = true,
            "--no-door-arcs" => settings.door_arcs = false,
            "--subtract-before-hlr" => settings.subtract_before_hlr = true,
            "--no-subtract-before-hlr" => settings.subtract_before_hlr = false,
            "--cache" => settings.cache = true,
            "--no-cache" => settings.cache = false,
            "--css" => settings.css = true,
            "--no-css" => settings.css = false,
            "--cells" => settings.cells = true,
            "--no-cells" => settings.cells = false,
            other if other.starts_with("--") => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                process::exit(1);
            }
            file => files.push(file.to_string()),
        }
        i += 1;
    }

    if files.len() < 2 {
        eprintln!("Error: Need at least one input model and an output path");
        print_usage();
        process::exit(1);
    }
    let output = files.pop().expect("checked above");

    let mut times: Vec<(&str, f64)> = Vec::new();
    let mut measure = |task, t0: Instant| times.push((task, t0.elapsed().as_secs_f64()));

    let t0 = Instant::now();
    let mut models = Vec::with_capacity(files.len());
    for file in &files {
        match Model::from_path(file) {
            Ok(model) => models.push(model),
            Err(e) => {
                eprintln!("Error: Cannot open model '{}': {}", file, e);
                process::exit(1);
            }
        }
    }
    measure("open files", t0);

    let t0 = Instant::now();
    let result = draw(&settings, &models, |p| {
        match p {
            Progress::File { index, percent } => {
                print!("\r file {} progress {:.0}%          ", index, percent);
            }
            Progress::HiddenLine => {
                print!("\r hidden line rendering          ");
            }
            Progress::Cells { index } => {
                print!("\r cells for drawing {}          ", index);
            }
            Progress::Classify { group, path } => {
                print!("\r classifying group {} path {}          ", group, path);
            }
        }
        let _ = std::io::stdout().flush();
    });
    measure("processing", t0);

    let svg = match result {
        Ok(svg) => svg,
        Err(e) => {
            eprintln!("\rError: {}", e);
            process::exit(1);
        }
    };

    let t0 = Instant::now();
    if let Err(e) = write_output(&output, &svg) {
        eprintln!("\rError: Cannot write '{}': {}", output, e);
        process::exit(1);
    }
    measure("write output", t0);

    println!("\r Done!                    ");
    for (task, dt) in times {
        println!("{}: {:.3}s", task, dt);
    }
}

fn expect_value<'a>(args: &'a [String], i: usize, name: &str) -> &'a str {
    args.get(i).map(String::as_str).unwrap_or_else(|| {
        eprintln!("Error: --{} needs a value", name);
        process::exit(1);
    })
}

fn parse_value(args: &[String], i: &mut usize, name: &str) -> f64 {
    *i += 1;
    expect_value(args, *i, name).parse().unwrap_or_else(|_| {
        eprintln!("Error: Invalid {} value", name);
        process::exit(1);
    })
}

fn print_usage() {
    let d = DrawSettings::default();
    println!("Usage: ifcplot <model.json> [model2.json ...] <output.svg> [options]");
    println!();
    println!("Options:");
    println!("  --width <mm>                 Paper width (default: {})", d.width);
    println!("  --height <mm>                Paper height (default: {})", d.height);
    println!("  --scale <ratio>              Drawing scale (default: {})", d.scale);
    println!("  --profile-threshold <mm>     Minimum feature size, negative disables (default: {})", d.profile_threshold);
    println!("  --storey-heights <mode>      'none', 'full' or 'left' (default: {})", d.storey_heights);
    println!("  --include-entities <list>    Comma-separated entity types to include");
    println!("  --exclude-entities <list>    Comma-separated entity types to exclude (default: {})", d.exclude_entities);
    println!("  --cache-dir <dir>            Geometry cache directory (default: {})", d.cache_dir);
    println!();
    println!("Boolean options (each accepts a --no- prefix to disable):");
    println!("  --auto-elevation             Derive elevations from the model bounds");
    println!("  --auto-section               Derive sections through the model center");
    println!("  --auto-floorplan             One floorplan per storey (default: on)");
    println!("  --space-names                Annotate space names");
    println!("  --space-areas                Annotate space areas");
    println!("  --door-arcs                  Draw door swing arcs");
    println!("  --subtract-before-hlr        Weld meshes before hidden-line removal");
    println!("  --cache                      Cache resolved geometry on disk");
    println!("  --css                        Emit the default stylesheet (default: on)");
    println!("  --cells                      Reconstruct and merge cells (default: on)");
}
