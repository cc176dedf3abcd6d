//! Walks a data archive for FDC scan files, clusters fire pixels in each one,
//! and persists the clusters to the cluster database.
//!
//! Documentation for the binary is with the definition of `FindFireOptionsInit` below.

use clap::Parser;
use log::{debug, info, trace, warn, LevelFilter};
use satfire::{
    decode_scan_file, ClusterDatabase, ClusterList, ClusterListError, Mailbox, SatFireResult,
    Satellite, Sector,
};
use simple_logger::SimpleLogger;
use std::{
    path::PathBuf,
    sync::Arc,
    thread::JoinHandle,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Walk a directory tree of satellite FDC files, cluster the fire pixels found in each scan, and
/// store the clusters in the cluster database.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "findfire")]
#[clap(author, version, about)]
struct FindFireOptionsInit {
    /// The path to the directory tree that will be walked for scan files.
    ///
    /// If this is not specified, then the program will check for it in the "SAT_ARCHIVE"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "SAT_ARCHIVE")]
    data_dir: PathBuf,

    /// The path to the cluster database file.
    ///
    /// If this is not specified, then the program will check for it in the "CLUSTER_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CLUSTER_DB")]
    cluster_store_file: PathBuf,

    /// The number of worker threads to decode and cluster scan files with.
    ///
    /// Defaults to the number of logical CPUs.
    #[clap(short, long)]
    num_threads: Option<usize>,

    /// Only walk files newer than the newest scan already on record for their satellite/sector.
    #[clap(long)]
    new: bool,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct FindFireOptionsChecked {
    data_dir: PathBuf,
    cluster_store_file: PathBuf,
    num_threads: usize,
    new: bool,
    verbose: bool,
}

/// Get the command line arguments and check them, filling in defaults where needed.
fn parse_args() -> SatFireResult<FindFireOptionsChecked> {
    let FindFireOptionsInit {
        data_dir,
        cluster_store_file,
        num_threads,
        new,
        verbose,
    } = FindFireOptionsInit::parse();

    let num_threads = num_threads.unwrap_or_else(num_cpus::get);

    Ok(FindFireOptionsChecked {
        data_dir,
        cluster_store_file,
        num_threads,
        new,
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

    let db = ClusterDatabase::connect(&opts.cluster_store_file)?;

    let cutoff = if opts.new {
        newest_scan_start_cutoff(&db)?
    } else {
        None
    };

    let to_workers: Arc<Mailbox<PathBuf>> = Arc::new(Mailbox::new(128));
    let to_filler: Arc<Mailbox<ClusterList>> = Arc::new(Mailbox::new(128));

    let walker = dir_walker(opts.data_dir.clone(), Arc::clone(&to_workers), cutoff)?;

    let mut workers = Vec::with_capacity(opts.num_threads);
    for _ in 0..opts.num_threads {
        workers.push(cluster_worker(
            Arc::clone(&to_workers),
            Arc::clone(&to_filler),
        )?);
    }

    let filler = db_filler(opts.cluster_store_file.clone(), Arc::clone(&to_filler), opts.verbose)?;

    walker.join().expect("error joining dir-walker thread")?;

    for w in workers {
        w.join().expect("error joining cluster-worker thread")?;
    }

    let stats = filler.join().expect("error joining db-filler thread")?;

    info!(
        target: "summary",
        "decoded {} scans ({} failures), wrote {} cluster rows, {} no-fire rows",
        stats.scans_ok + stats.scans_failed,
        stats.scans_failed,
        stats.cluster_rows,
        stats.no_fire_rows,
    );

    Ok(())
}

fn newest_scan_start_cutoff(db: &ClusterDatabase) -> SatFireResult<Option<chrono::DateTime<chrono::Utc>>> {
    let sats = [Satellite::G16, Satellite::G17];
    let sectors = [Sector::FullDisk, Sector::Conus, Sector::Meso1, Sector::Meso2];

    let mut newest = None;
    for sat in sats {
        for sector in sectors {
            if let Some(t) = db.newest_scan_start(sat, sector)? {
                newest = Some(newest.map_or(t, |n: chrono::DateTime<chrono::Utc>| n.min(t)));
            }
        }
    }

    Ok(newest)
}

/*-------------------------------------------------------------------------------------------------
 *                           Threads - Functions that start threads
 *-----------------------------------------------------------------------------------------------*/
fn dir_walker(
    data_dir: PathBuf,
    to_workers: Arc<Mailbox<PathBuf>>,
    cutoff: Option<chrono::DateTime<chrono::Utc>>,
) -> SatFireResult<JoinHandle<SatFireResult<()>>> {
    let standard_path_filter = create_standard_path_filter();

    let jh = std::thread::Builder::new()
        .name("dir-walker".to_owned())
        .spawn(move || {
            to_workers.register_sender();
            to_workers.wait_until_ready_to_send();

            for entry in walkdir::WalkDir::new(&data_dir)
                .into_iter()
                .filter_entry(standard_path_filter)
                .filter_map(|res| res.ok())
            {
                if !entry.path().is_file() {
                    continue;
                }

                if let Some(cutoff) = cutoff {
                    let fname = entry.file_name().to_string_lossy();
                    if let Some(start) = satfire::parse_satellite_description_from_file_name(&fname)
                        .map(|(_, _, start, _)| start)
                    {
                        if start <= cutoff {
                            trace!(target: "dir-walker", "skipping old scan: {}", entry.path().display());
                            continue;
                        }
                    }
                }

                debug!(target: "dir-walker", "queued: {}", entry.path().display());
                to_workers.send(entry.into_path());
            }

            to_workers.deregister_sender();

            Ok(())
        })?;

    Ok(jh)
}

fn cluster_worker(
    from_walker: Arc<Mailbox<PathBuf>>,
    to_filler: Arc<Mailbox<ClusterList>>,
) -> SatFireResult<JoinHandle<SatFireResult<()>>> {
    let jh = std::thread::Builder::new()
        .name("cluster-worker".to_owned())
        .spawn(move || {
            from_walker.register_receiver();
            to_filler.register_sender();
            to_filler.wait_until_ready_to_send();

            while let Some(path) = from_walker.receive() {
                let clist = decode_scan_file(&path);
                if !clist.is_ok() {
                    if let ClusterListError::DecodeFailure(msg) = clist.error() {
                        warn!(target: "cluster-worker", "failed to decode {}: {}", path.display(), msg);
                    }
                }
                to_filler.send(clist);
            }

            from_walker.deregister_receiver();
            to_filler.deregister_sender();

            Ok(())
        })?;

    Ok(jh)
}

#[derive(Debug, Default)]
struct FillerStats {
    scans_ok: u64,
    scans_failed: u64,
    cluster_rows: u64,
    no_fire_rows: u64,
}

fn db_filler(
    store_file: PathBuf,
    from_workers: Arc<Mailbox<ClusterList>>,
    verbose: bool,
) -> SatFireResult<JoinHandle<SatFireResult<FillerStats>>> {
    let jh = std::thread::Builder::new()
        .name("db-filler".to_owned())
        .spawn(move || {
            from_workers.register_receiver();

            let db = ClusterDatabase::connect(&store_file)?;
            let mut adder = db.prepare_to_add_clusters()?;
            let mut stats = FillerStats::default();

            while let Some(clist) = from_workers.receive() {
                if !clist.is_ok() {
                    stats.scans_failed += 1;
                    continue;
                }

                stats.scans_ok += 1;
                if clist.is_empty() {
                    stats.no_fire_rows += 1;
                } else {
                    stats.cluster_rows += clist.clusters().len() as u64;
                }

                adder.add(&clist)?;

                if verbose {
                    debug!(target: "db-filler", "wrote {} clusters", clist.clusters().len());
                }
            }

            from_workers.deregister_receiver();

            Ok(stats)
        })?;

    Ok(jh)
}

/// Keeps `.nc`/`.zip` scan files and any directory that might still lead to
/// one; assumes the archive is laid out `SATELLITE/SECTOR/YEAR/DAY_OF_YEAR/HOUR/files`.
fn create_standard_path_filter() -> impl FnMut(&walkdir::DirEntry) -> bool {
    move |entry| -> bool {
        if entry.path().is_file() {
            entry
                .path()
                .extension()
                .map(|ex| ex == "nc" || ex == "zip")
                .unwrap_or(false)
        } else {
            true
        }
    }
}
