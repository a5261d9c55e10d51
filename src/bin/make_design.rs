// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "make_design", about = "Render per-run FEAT design.fsf files from a base design")]
pub struct Cli {

    /// The design.fsf to use as a template
    #[clap(short, long)]
    pub design: PathBuf,

    /// File listing subject IDs, one per line
    #[clap(short, long)]
    pub subjects: PathBuf,

    /// Sessions to render, comma separated
    #[clap(long, default_value = "baselineYear1Arm1", value_delimiter = ',')]
    pub sessions: Vec<String>,

    #[clap(long, default_value = "sst")]
    pub task: String,

    /// Runs to render, e.g. `1..2`
    #[clap(short, long, default_value = "1..2", value_parser = run_range)]
    pub runs: Runs,

    /// Switch on FNIRT in the rendered designs
    #[clap(long)]
    pub nonlinear: bool,

    /// Parent of the FEAT output directories, for linear and nonlinear designs
    #[clap(long, default_value = "/mnt/storage/feat")]
    pub feat_dir: PathBuf,

    /// Move every quoted subject path in the base design under this BIDS directory
    #[clap(long)]
    pub subjects_base: Option<PathBuf>,

    /// Where to write the rendered designs
    #[clap(short, long)]
    pub out: PathBuf,
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
use itertools::iproduct;

use featpipe::design;
use featpipe::entities::{Entities, Registration};
use featpipe::utils::{parse_range, read_subject_list};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Cli::parse();
    let registration = if args.nonlinear { Registration::Nonlinear } else { Registration::Linear };

    let base = std::fs::read_to_string(&args.design)
        .map_err(|e| format!("{}: {e}", args.design.display()))?;
    let subjects = read_subject_list(&args.subjects)?;
    std::fs::create_dir_all(&args.out)?;

    let mut n_written = 0;
    for (subject, session, run) in iproduct!(&subjects, &args.sessions, args.runs.clone()) {
        let entities = Entities::new(subject, session, &args.task, run);
        let path = design::write(&base, &entities, registration, &args.feat_dir,
                                 args.subjects_base.as_deref(), &args.out)?;
        log::debug!("wrote {}", path.display());
        n_written += 1;
    }
    println!("Wrote {n_written} {registration} designs to {}", args.out.display());
    Ok(())
}
