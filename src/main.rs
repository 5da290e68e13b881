//! Rescue Drill - cross-check, extract and carve ddrescue disc images
//!
//! Loads one or two rescued images with their rescue logs, optionally checks
//! that both rescues agree wherever both have data, then extracts cataloged
//! files or scans for JPEGs in the rescued regions.

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rescue_drill::catalog::load_catalog;
use rescue_drill::cli::{catalog_path, Cli, ImagePair};
use rescue_drill::compare::{compare_with_progress, CompareProgress};
use rescue_drill::config::{generate_sample_config, Config};
use rescue_drill::extract::{ExtractOptions, ExtractProgress, Extractor};
use rescue_drill::image::{Buffers, ImageSource};
use rescue_drill::report::{
    write_report, ExtractSummary, ImageSummary, RunReport, ScanSummary,
};
use rescue_drill::rescue::{load_rescue_log, RescueMap};
use rescue_drill::scan::{JpegScanner, ScanProgress};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", generate_sample_config());
        return Ok(());
    }

    if cli.init_config {
        let path = cli.config.clone().unwrap_or_else(Config::default_path);
        Config::default().save_to(&path)?;
        println!("{} Wrote default config to {}", "✓".green(), path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("rescue_drill={}", level).parse()?),
        )
        .init();

    let mut report = run(&cli, &config)?;
    report.finish();

    if let Some(path) = &cli.report {
        write_report(&report, path, cli.json)?;
        println!("{} Report written to {}", "✓".green(), path.display());
    }

    Ok(())
}

fn run(cli: &Cli, config: &Config) -> Result<RunReport> {
    let base = cli
        .base
        .as_deref()
        .context("No image base name given")?;
    let mut buffers = Buffers::new(cli.buffer_blocks.unwrap_or(config.io.buffer_blocks));

    let primary = ImagePair::from_base(base);
    let (mut map, mut image) = load_pair(&primary)?;
    let mut report = RunReport::new(ImageSummary::new(&primary.image, &primary.log, &map));

    if let Some(second_base) = &cli.compare {
        let secondary = ImagePair::from_base(second_base);
        let (second_map, mut second_image) = load_pair(&secondary)?;
        report.secondary = Some(ImageSummary::new(
            &secondary.image,
            &secondary.log,
            &second_map,
        ));

        let total: u64 = map.intersect_runs(&second_map).map(|o| o.length).sum();
        let pb = byte_bar(total)?;
        let result = compare_with_progress(
            &map,
            &second_map,
            &mut image,
            &mut second_image,
            &mut buffers,
            |progress| match progress {
                CompareProgress::Overlap(overlap) => pb.println(format!(
                    "  Overlap 0x{:x} 0x{:x}",
                    overlap.start, overlap.length
                )),
                CompareProgress::Compared { bytes } => pb.inc(bytes),
            },
        );
        pb.finish_and_clear();

        let result = result?;
        println!(
            "{} Images agree: {} overlaps, {} compared",
            "✓".green(),
            result.overlaps,
            humansize::format_size(result.bytes_compared, humansize::BINARY)
        );
        report.compare = Some(result);
    }

    let merged = map.compact();
    tracing::debug!(merged, runs = map.len(), "Compacted rescue map");
    report.compacted_runs = map.len();

    if let Some(dir) = &cli.extract {
        let catalog = load_catalog(&catalog_path(dir))?;
        let extractor = Extractor::new(ExtractOptions {
            output_dir: dir.clone(),
            write_manifest: cli.manifest || config.extract.manifest,
        });

        let pb = count_bar(catalog.len() as u64)?;
        let result = extractor.extract_with_progress(
            &catalog,
            &map,
            &mut image,
            &mut buffers,
            |progress| {
                match progress {
                    ExtractProgress::Extracted { name, .. } => {
                        pb.println(format!("  {} Extracted file {}", "✓".green(), name))
                    }
                    ExtractProgress::Missing { name } => pb.println(format!(
                        "  {} Missing data for {} can't extract.",
                        "⚠".yellow(),
                        name
                    )),
                    ExtractProgress::Skipped { name } => pb.println(format!(
                        "  {} No file name in {}, skipped.",
                        "⚠".yellow(),
                        name
                    )),
                }
                pb.inc(1);
            },
        );
        pb.finish_and_clear();

        let result = result?;
        println!(
            "{} {} files extracted ({}), {} missing",
            "✓".green(),
            result.extracted.len(),
            humansize::format_size(result.total_bytes, humansize::BINARY),
            result.missing.len()
        );
        if let Some(manifest) = &result.manifest_path {
            println!("  Manifest saved: {}", manifest.display());
        }
        report.extract = Some(ExtractSummary::new(dir, &result));
    }

    if let Some(out_path) = &cli.jpg {
        let file = File::create(out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        let mut out = BufWriter::new(file);
        let scanner = JpegScanner::new(config.scan.to_options());

        let pb = byte_bar(map.total_bytes())?;
        let result = scanner.scan_with_progress(
            &map,
            &mut image,
            &mut buffers,
            &mut out,
            |progress| match progress {
                ScanProgress::FileComplete(hit) => pb.println(format!(
                    "  {} {} at block 0x{:x}, {}",
                    "✓".green(),
                    hit.name,
                    hit.start_block,
                    humansize::format_size(hit.length, humansize::BINARY)
                )),
                ScanProgress::Scanned { bytes } => pb.inc(bytes),
                ScanProgress::HeaderFound { block, .. } => {
                    pb.println(format!("  JPEG header at block number 0x{:x}", block))
                }
            },
        );
        pb.finish_and_clear();

        let result = result?;
        println!(
            "{} {} JPEG files found, catalog written to {}",
            "✓".green(),
            result.hits.len(),
            out_path.display()
        );
        report.scan = Some(ScanSummary::new(out_path, &result));
    }

    Ok(report)
}

/// Parse a rescue log and open its image
fn load_pair(pair: &ImagePair) -> Result<(RescueMap, ImageSource<File>)> {
    let map = load_rescue_log(&pair.log)?;
    println!(
        "{} Total bytes rescued in {}: 0x{:x} ({})",
        "✓".green(),
        pair.image.display(),
        map.total_bytes(),
        humansize::format_size(map.total_bytes(), humansize::BINARY)
    );
    let image = ImageSource::open(&pair.image)?;
    Ok((map, image))
}

fn byte_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("█▓▒░"),
    );
    Ok(pb)
}

fn count_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("█▓▒░"),
    );
    Ok(pb)
}
