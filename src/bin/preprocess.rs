// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "preprocess", about = "Timing files, BET and first-level FEAT for every subject, session and run")]
pub struct Cli {

    /// BIDS directory containing the `sub-*` directories
    #[clap(short, long)]
    pub bids: PathBuf,

    /// File listing subject IDs, one per line
    #[clap(short, long)]
    pub subjects: PathBuf,

    /// Sessions to process, comma separated
    #[clap(long, default_value = "baselineYear1Arm1", value_delimiter = ',')]
    pub sessions: Vec<String>,

    #[clap(long, default_value = "sst")]
    pub task: String,

    /// Runs to process, e.g. `1..2`
    #[clap(short, long, default_value = "1..2", value_parser = run_range)]
    pub runs: Runs,

    /// The design.fsf to use as a template. Its subject paths are moved under `--bids`.
    #[clap(short, long)]
    pub design: PathBuf,

    /// Where to write the rendered designs
    #[clap(long)]
    pub designs: PathBuf,

    /// Parent of the FEAT output directories
    #[clap(long, default_value = "/mnt/storage/feat")]
    pub feat_dir: PathBuf,

    /// Only run FEAT with this registration: `linear` or `nonlinear` [default: both]
    #[clap(long)]
    pub registration: Option<Registration>,

    /// Shift every onset by the first one and round to hundredths, instead
    /// of only zeroing the first onset
    #[clap(long)]
    pub offset_timing_files: bool,

    /// Rerun BET and FEAT whose outputs already exist
    #[clap(short, long)]
    pub force: bool,

    /// Number of BET or FEAT jobs run in parallel
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

    /// Print the commands without running them
    #[clap(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[clap(short = 'y', long)]
    pub yes: bool,
}

// Alias to disable clap's type magic
type Runs = std::ops::RangeInclusive<u32>;

fn run_range(s: &str) -> Result<Runs, String> {
    parse_range::<u32>(s).map_err(|e| e.to_string())
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::iproduct;

use featpipe::design;
use featpipe::entities::{Entities, Registration};
use featpipe::events::{write_timing_files, OnsetPolicy};
use featpipe::fsl::{command_line, Tools};
use featpipe::preprocess::{plan_bet, plan_feat, run_bet, run_feat, BetJob, FeatJob};
use featpipe::utils::{confirm, group_digits, parse_range, read_subject_list};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Cli::parse();
    let policy = if args.offset_timing_files { OnsetPolicy::Offset } else { OnsetPolicy::default() };
    let registrations = match args.registration {
        Some(one) => vec![one],
        None      => vec![Registration::Linear, Registration::Nonlinear],
    };

    let subjects = read_subject_list(&args.subjects)?;
    let mut runs: Vec<Entities> = iproduct!(&subjects, &args.sessions, args.runs.clone())
        .map(|(subject, session, run)| Entities::new(subject, session, &args.task, run))
        .collect();
    let base_design = std::fs::read_to_string(&args.design)
        .map_err(|e| format!("{}: {e}", args.design.display()))?;
    let tools = Tools::from_env();

    let bet = plan_bet(&args.bids, &runs, args.force);
    println!("{} runs of {} subjects; BET: {} to run, {} already done, {} structural scans missing",
             group_digits(runs.len()), group_digits(subjects.len()),
             bet.jobs.len(), bet.skipped.len(), bet.missing.len());
    runs.retain(|e| !bet.missing.contains(&BetJob::new(&args.bids, &e.subject, &e.session).input));

    if args.dry_run {
        for job in &bet.jobs { println!("{}", command_line(&tools.bet, &job.args())) }
        for (entities, &registration) in iproduct!(&runs, &registrations) {
            let job = feat_job(&args, entities.clone(), registration);
            println!("{}", command_line(&tools.feat, &job.args()));
        }
        return Ok(());
    }
    if !args.yes && !confirm("Run preprocessing?", std::io::stdin().lock())? {
        println!("Aborted");
        return Ok(());
    }

    // Timing files
    runs.retain(|entities| match write_timing_files(&args.bids, entities, policy) {
        Ok(_)  => true,
        Err(e) => { log::error!("{entities}: {e}"); false }
    });

    // Brain extraction, once per subject and session
    let results = run_bet(&bet.jobs, &tools, args.threads, bar(bet.jobs.len(), "BET")?)?;
    let failed_bet: Vec<&BetJob> = report(&bet.jobs, &results, |job| job.input.display().to_string());
    runs.retain(|e| !failed_bet.contains(&&BetJob::new(&args.bids, &e.subject, &e.session)));

    // Designs
    std::fs::create_dir_all(&args.designs)?;
    let mut feat_jobs = vec![];
    for (entities, &registration) in iproduct!(&runs, &registrations) {
        design::write(&base_design, entities, registration, &args.feat_dir, Some(args.bids.as_path()), &args.designs)?;
        feat_jobs.push(feat_job(&args, entities.clone(), registration));
    }

    // First-level analyses
    let feat = plan_feat(feat_jobs, args.force);
    println!("FEAT: {} to run, {} already done", group_digits(feat.jobs.len()), group_digits(feat.skipped.len()));
    let results = run_feat(&feat.jobs, &tools, args.threads, bar(feat.jobs.len(), "FEAT")?)?;
    let failed_feat = report(&feat.jobs, &results, |job| job.design.display().to_string());

    let total: f64 = results.iter().flatten().map(Duration::as_secs_f64).sum();
    println!("{} / {} FEAT analyses succeeded ({:.1} CPU hours)",
             results.len() - failed_feat.len(), results.len(), total / 3600.0);
    if !failed_bet.is_empty() || !failed_feat.is_empty() {
        return Err(format!("{} BET and {} FEAT jobs failed", failed_bet.len(), failed_feat.len()).into());
    }
    Ok(())
}

fn feat_job(args: &Cli, entities: Entities, registration: Registration) -> FeatJob {
    let design = args.designs.join(design::design_file_name(&entities, registration));
    FeatJob::new(entities, registration, design, &args.feat_dir)
}

fn bar(len: usize, what: &str) -> Result<ProgressBar, Box<dyn Error>> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template(&format!("[{{elapsed_precise}}] {{wide_bar}} {{pos}}/{{len}} {what} ({{eta_precise}})"))?);
    Ok(bar)
}

/// Print every failure, returning the jobs that failed
fn report<'a, J, T>(jobs: &'a [J], results: &[featpipe::Result<T>], name: impl Fn(&J) -> String) -> Vec<&'a J> {
    jobs.iter().zip(results)
        .filter_map(|(job, result)| result.as_ref().err().map(|e| {
            println!("FAILED {}: {e}", name(job));
            job
        }))
        .collect()
}
