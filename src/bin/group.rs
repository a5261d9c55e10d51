// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "group", about = "One-sample randomise of registered statistical images, per contrast, task, session, run and registration")]
pub struct Cli {

    /// Directory containing the `*.feat` directories
    #[clap(short, long)]
    pub root: PathBuf,

    /// Contrasts to analyse, e.g. `1-6`
    #[clap(short, long, default_value = "1-6", value_parser = contrast_list)]
    pub contrasts: Contrasts,

    /// Path of each registered image relative to `root`
    #[clap(long, default_value = Template::REGISTERED_ZFSTAT)]
    pub template: Template,

    /// Only analyse images registered this way: `linear` or `nonlinear`
    #[clap(long)]
    pub registration: Option<Registration>,

    /// Where to write the merged images and randomise outputs
    #[clap(short, long)]
    pub out: PathBuf,

    /// Brain mask for randomise [default: MNI152 2mm brain under $FSLDIR]
    #[clap(short, long)]
    pub mask: Option<PathBuf>,

    /// Rerun groups whose randomise output already exists
    #[clap(short, long)]
    pub force: bool,

    /// Number of groups analysed in parallel
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

    /// Print the commands without running them
    #[clap(long)]
    pub dry_run: bool,

    /// Only list the subjects of each group, from the registered images present
    #[clap(long)]
    pub list: bool,

    /// Do not ask for confirmation
    #[clap(short = 'y', long)]
    pub yes: bool,
}

// Alias to disable clap's type magic
type Contrasts = Vec<u32>;

fn contrast_list(s: &str) -> Result<Contrasts, String> {
    parse_labels(s).map_err(|e| e.to_string())
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::PathBuf;

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};

use featpipe::discover::{find_stat_images, group_paths, group_subjects, ParameterSpace, REGISTERED_PATTERN};
use featpipe::entities::{Registration, Template};
use featpipe::fsl::{self, Tools};
use featpipe::group::{self, plan};
use featpipe::utils::{confirm, group_digits, parse_labels};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    if args.list {
        let files = find_stat_images(&args.root, REGISTERED_PATTERN)?;
        for (key, subjects) in group_subjects(&files) {
            if !args.contrasts.contains(&key.contrast) { continue }
            println!("{:<32} {:>5} subjects: {}", key.to_string(), subjects.len(), subjects.join(" "));
        }
        return Ok(());
    }

    let space = ParameterSpace::from_root(&args.root, args.contrasts.clone())?;
    let registrations = match args.registration {
        Some(one) => vec![one],
        None      => vec![Registration::Linear, Registration::Nonlinear],
    };
    let mut candidates = vec![];
    for registration in registrations {
        candidates.extend(space.expand(&args.root, &args.template, registration)?);
    }
    let mask = args.mask.clone().unwrap_or_else(fsl::mni152_brain);
    let plan = plan(group_paths(&candidates), &args.out, &mask, args.force);

    println!("randomise: {} groups to run, {} already done, {} with too few subjects",
             group_digits(plan.jobs.len()), group_digits(plan.skipped.len()), group_digits(plan.too_small.len()));
    if plan.jobs.is_empty() { return Ok(()) }

    let tools = Tools::from_env();
    if args.dry_run {
        for job in &plan.jobs {
            for line in job.command_lines(&tools) { println!("{line}") }
        }
        return Ok(());
    }
    if !args.yes && !confirm("Run group analyses?", std::io::stdin().lock())? {
        println!("Aborted");
        return Ok(());
    }

    let bar = ProgressBar::new(plan.jobs.len() as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template("[{elapsed_precise}] {wide_bar} {pos}/{len} groups ({eta_precise})")?);
    let results = group::run(&plan.jobs, &tools, args.threads, bar)?;

    let mut n_failed = 0;
    for (job, result) in plan.jobs.iter().zip(&results) {
        if let Err(e) = result {
            n_failed += 1;
            println!("FAILED {}: {e}", job.key);
        }
    }
    println!("{} / {} group analyses succeeded", results.len() - n_failed, results.len());
    if n_failed > 0 {
        return Err(format!("{n_failed} group analyses failed").into());
    }
    Ok(())
}
