//! Replays a cluster database scan-by-scan, tracking which clusters belong to
//! the same long-lived wildfire, and persists retired wildfires plus merge
//! events to the wildfire database.
//!
//! Documentation for the binary is with the definition of `ConnectFireOptionsInit` below.

use clap::Parser;
use log::{debug, info, LevelFilter};
use satfire::{
    ClusterDatabase, ClusterDatabaseClusterRow, FiresDatabase, SatFireResult, Satellite, Wildfire,
    WildfireList, WildfireListUpdateResult,
};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Replay a cluster database scan by scan, tracking long-lived wildfires and recording merges.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "connectfire")]
#[clap(author, version, about)]
struct ConnectFireOptionsInit {
    /// The path to the cluster database file.
    ///
    /// If this is not specified, then the program will check for it in the "CLUSTER_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_DB")]
    cluster_store_file: PathBuf,

    /// The path to the wildfire database file.
    ///
    /// If this is not specified, then the program will check for it in the "FIRE_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "FIRE_DB")]
    fire_store_file: PathBuf,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct ConnectFireOptionsChecked {
    cluster_store_file: PathBuf,
    fire_store_file: PathBuf,
    verbose: bool,
}

fn parse_args() -> SatFireResult<ConnectFireOptionsChecked> {
    let ConnectFireOptionsInit {
        cluster_store_file,
        fire_store_file,
        verbose,
    } = ConnectFireOptionsInit::parse();

    Ok(ConnectFireOptionsChecked {
        cluster_store_file,
        fire_store_file,
        verbose,
    })
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> SatFireResult<()> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let opts = parse_args()?;

    if opts.verbose {
        info!(target: "startup", "{:#?}", opts);
    }

    let cluster_db = ClusterDatabase::connect(&opts.cluster_store_file)?;
    let fires_db = FiresDatabase::connect(&opts.fire_store_file)?;

    let mut next_id = fires_db.next_wildfire_id()?;
    let mut adder = fires_db.prepare_to_add_fires()?;

    let mut stats = RunStats::default();

    for sat in [Satellite::G16, Satellite::G17] {
        let rows = cluster_db.query_clusters(Some(sat), None, None, None, None)?;
        if rows.is_empty() {
            continue;
        }

        debug!(target: "tracker", "replaying {} cluster rows for {}", rows.len(), sat.name());

        let mut current = WildfireList::new();

        for batch in group_by_scan_start(rows) {
            let t = batch[0].scan_start;

            let mut spawned = WildfireList::new();
            for row in batch {
                match current.try_update(&row) {
                    WildfireListUpdateResult::Matched(_) => stats.updates += 1,
                    WildfireListUpdateResult::NoMatch => {
                        spawned.add(Wildfire::create_from_cluster(next_id, row));
                        next_id += 1;
                        stats.spawned += 1;
                    }
                }
            }
            current.extend(&mut spawned);

            let (merged_away, events) = current.merge_fires_with_events();
            for event in &events {
                fires_db.record_merge(event.survivor_id, event.absorbed_id, t)?;
                stats.merges += 1;
            }
            for fire in merged_away.iter() {
                adder.add(fire)?;
                stats.retired += 1;
            }

            let stale = current.drain_stale(t);
            for fire in stale.iter() {
                adder.add(fire)?;
                stats.retired += 1;
            }
        }

        stats.still_active += current.len() as u64;
    }

    info!(
        target: "summary",
        "spawned {} updated {} merged {} retired {} (still active {})",
        stats.spawned, stats.updates, stats.merges, stats.retired, stats.still_active,
    );

    Ok(())
}

#[derive(Debug, Default)]
struct RunStats {
    spawned: u64,
    updates: u64,
    merges: u64,
    retired: u64,
    still_active: u64,
}

/// Split cluster rows, already ordered by ascending `scan_start`, into
/// consecutive batches sharing the same `scan_start` — one time-step each.
fn group_by_scan_start(rows: Vec<ClusterDatabaseClusterRow>) -> Vec<Vec<ClusterDatabaseClusterRow>> {
    let mut batches: Vec<Vec<ClusterDatabaseClusterRow>> = Vec::new();

    for row in rows {
        match batches.last_mut() {
            Some(batch) if batch[0].scan_start == row.scan_start => batch.push(row),
            _ => batches.push(vec![row]),
        }
    }

    batches
}
