#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail, ensure};
use sbd::{
    Bio, Completion, DeviceConfig, Direction, DiskTable, MetricsSnapshot, RamDisk, SECTOR_SIZE,
    SectorNumber, Segment,
};
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sectors covered by the round-trip workload (clamped to the capacity).
const WORKLOAD_SECTORS: u64 = 64;

#[derive(Debug, Serialize)]
struct RunReport {
    name: String,
    capacity_sectors: u64,
    capacity_bytes: u64,
    round_trip: Completion,
    clipped_write: Completion,
    metrics: MetricsSnapshot,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "run" => {
            let (params, json) = split_params(args);
            run_cmd(&params, json)
        }
        "params" => {
            let (params, _) = split_params(args);
            let config = DeviceConfig::from_params(&params).context("invalid parameters")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("serialize config")?
            );
            Ok(())
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("sbd-cli\n");
    println!("USAGE:");
    println!("  sbd-cli run [capacity_mib=N] [name=NAME] [--json]");
    println!("  sbd-cli params [capacity_mib=N] [name=NAME]");
}

/// Join the `key=value` arguments back into one parameter string and pull
/// out `--json`.
fn split_params(args: impl Iterator<Item = String>) -> (String, bool) {
    let mut json = false;
    let mut params = Vec::new();
    for arg in args {
        if arg == "--json" {
            json = true;
        } else {
            params.push(arg);
        }
    }
    (params.join(" "), json)
}

fn run_cmd(params: &str, json: bool) -> Result<()> {
    let config = DeviceConfig::from_params(params).context("invalid parameters")?;
    let table = Arc::new(DiskTable::new());
    let disk = RamDisk::create(&config, table.clone())
        .with_context(|| format!("failed to create device {}", config.name))?;
    let capacity = disk.capacity();

    let round_trip = round_trip(&table, disk.name(), capacity.sectors().min(WORKLOAD_SECTORS))?;
    let clipped_write = clipped_write(&table, disk.name(), capacity.sectors())?;

    let name = disk.name().to_owned();
    let metrics = disk.delete();
    info!(target: "sbd::cli", name = %name, "workload_complete");

    let report = RunReport {
        name,
        capacity_sectors: capacity.sectors(),
        capacity_bytes: capacity.bytes(),
        round_trip,
        clipped_write,
        metrics,
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Write a pattern over `[0, sectors)` in two segments, read it back in one
/// and compare.
fn round_trip(table: &DiskTable, name: &str, sectors: u64) -> Result<Completion> {
    let len = usize::try_from(sectors).context("workload size")? * SECTOR_SIZE;
    let payload: Vec<u8> = (0..len)
        .map(|i| u8::try_from(i % 251).unwrap_or(0))
        .collect();

    let split = (len / SECTOR_SIZE / 2) * SECTOR_SIZE;
    let mut src = payload.clone();
    let (head, tail) = src.split_at_mut(split);
    let mut bio = Bio::new(Direction::Write, SectorNumber::ZERO)
        .with_segment(Segment::new(head)?)
        .with_segment(Segment::new(tail)?);
    let written = table.submit_bio(name, &mut bio).context("write")?;
    ensure!(
        written.sectors == sectors,
        "short write: {} of {sectors} sectors",
        written.sectors
    );

    let mut dst = vec![0_u8; len];
    let mut bio = Bio::read(SectorNumber::ZERO, &mut dst)?;
    let read = table.submit_bio(name, &mut bio).context("read")?;
    ensure!(read.sectors == sectors, "short read: {} of {sectors} sectors", read.sectors);
    ensure!(dst == payload, "read back data differs from what was written");
    Ok(read)
}

/// Write 8 sectors starting 4 before the end; only 4 land.
fn clipped_write(table: &DiskTable, name: &str, capacity_sectors: u64) -> Result<Completion> {
    let start = SectorNumber(capacity_sectors.saturating_sub(4));
    let mut buf = vec![0xA5_u8; 8 * SECTOR_SIZE];
    let mut bio = Bio::write(start, &mut buf)?;
    let done = table.submit_bio(name, &mut bio).context("clipped write")?;
    ensure!(
        done.end().0 == capacity_sectors,
        "clipped write ended at {} instead of {capacity_sectors}",
        done.end()
    );
    Ok(done)
}

fn print_report(report: &RunReport) {
    println!("sbd run");
    println!("name: {}", report.name);
    println!(
        "capacity: {} sectors ({} bytes)",
        report.capacity_sectors, report.capacity_bytes
    );
    println!(
        "round_trip: {} sectors at {}",
        report.round_trip.sectors, report.round_trip.start
    );
    println!(
        "clipped_write: {} sectors at {}",
        report.clipped_write.sectors, report.clipped_write.start
    );
    let m = &report.metrics;
    println!("requests_total: {}", m.requests_total);
    println!("requests_ok: {}", m.requests_ok);
    println!("requests_rejected: {}", m.requests_rejected);
    println!("requests_failed: {}", m.requests_failed);
    println!("sectors_read: {}", m.sectors_read);
    println!("sectors_written: {}", m.sectors_written);
    println!("segments_clipped: {}", m.segments_clipped);
}
