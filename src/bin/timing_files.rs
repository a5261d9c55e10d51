// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "timing_files", about = "Write stop-signal task timing files from BIDS events.tsv")]
pub struct Cli {

    /// BIDS directory containing the `sub-*` directories
    #[clap(short, long)]
    pub base: PathBuf,

    /// File listing subject IDs, one per line
    #[clap(short, long)]
    pub subjects: PathBuf,

    #[clap(long, default_value = "baselineYear1Arm1")]
    pub session: String,

    #[clap(long, default_value = "sst")]
    pub task: String,

    /// Runs to process, e.g. `1..2`
    #[clap(short, long, default_value = "1..2", value_parser = run_range)]
    pub runs: Runs,

    /// Shift every onset by the first one and round to hundredths, instead
    /// of only zeroing the first onset
    #[clap(long)]
    pub offset_timing_files: bool,
}

// Alias to disable clap's type magic
type Runs = std::ops::RangeInclusive<u32>;

fn run_range(s: &str) -> Result<Runs, String> {
    parse_range::<u32>(s).map_err(|e| e.to_string())
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::PathBuf;

use env_logger::Env;

use featpipe::entities::Entities;
use featpipe::events::{write_timing_files, OnsetPolicy};
use featpipe::utils::{parse_range, read_subject_list};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Cli::parse();
    let policy = if args.offset_timing_files { OnsetPolicy::Offset } else { OnsetPolicy::default() };

    let subjects = read_subject_list(&args.subjects)?;
    let (mut n_done, mut failed) = (0, vec![]);
    for subject in &subjects {
        for run in args.runs.clone() {
            let entities = Entities::new(subject, &args.session, &args.task, run);
            match write_timing_files(&args.base, &entities, policy) {
                Ok(_)  => n_done += 1,
                Err(e) => {
                    log::error!("{entities}: {e}");
                    failed.push(entities);
                }
            }
        }
    }
    println!("Timing files ready for {n_done} runs of {} subjects; {} runs failed",
             subjects.len(), failed.len());
    Ok(())
}
