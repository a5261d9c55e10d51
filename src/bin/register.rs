// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "register", about = "Register FEAT filtered_func data or statistical images to the MNI152 template")]
pub struct Cli {

    /// Directory containing the `*.feat` directories
    #[clap(short, long)]
    pub root: PathBuf,

    /// Template to register to [default: MNI152 2mm under $FSLDIR]
    #[clap(long)]
    pub reference: Option<PathBuf>,

    /// Use FNIRT on the `*NL.feat` directories rather than FLIRT on `*LN.feat`
    #[clap(long)]
    pub nonlinear: bool,

    /// Register the statistical images matching this glob (relative to
    /// `root`) instead of filtered_func_data, writing e.g. `zfstat1_LN.nii.gz`
    #[clap(long, num_args = 0..=1, default_missing_value = DEFAULT_PATTERN, value_name = "GLOB")]
    pub stats: Option<String>,

    /// Do not initialize FNIRT with FEAT's affine
    #[clap(long)]
    pub no_affine: bool,

    /// Rerun registrations whose output already exists
    #[clap(short, long)]
    pub force: bool,

    /// Register at most this many images
    #[clap(short = 'n', long)]
    pub limit: Option<usize>,

    /// Number of registrations run in parallel
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

    /// Print the commands without running them
    #[clap(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[clap(short = 'y', long)]
    pub yes: bool,
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::PathBuf;

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};

use featpipe::discover::{find_registration_inputs, find_stat_registration_inputs, DEFAULT_PATTERN};
use featpipe::entities::Registration;
use featpipe::fsl::Tools;
use featpipe::registration::{self, default_reference, plan};
use featpipe::utils::{confirm, group_digits};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    let kind = if args.nonlinear { Registration::Nonlinear } else { Registration::Linear };
    let reference = args.reference.clone().unwrap_or_else(|| default_reference(kind));
    if args.no_affine && kind == Registration::Linear {
        log::warn!("--no-affine only affects FNIRT: ignoring it");
    }

    let mut inputs = match &args.stats {
        Some(pattern) => find_stat_registration_inputs(&args.root, pattern, kind)?,
        None          => find_registration_inputs(&args.root, kind)?,
    };
    if let Some(limit) = args.limit { inputs.truncate(limit) }
    let plan = plan(&inputs, &reference, kind, args.force)?;

    println!("{}: {} to run, {} already done, reference {}",
             kind.tool(), group_digits(plan.jobs.len()), group_digits(plan.skipped.len()), reference.display());
    if plan.jobs.is_empty() { return Ok(()) }

    let tools = Tools::from_env();
    if args.dry_run {
        for job in &plan.jobs {
            println!("{:?}", job.command(&tools, args.no_affine));
        }
        return Ok(());
    }
    if !args.yes && !confirm("Run registrations?", std::io::stdin().lock())? {
        println!("Aborted");
        return Ok(());
    }

    let bar = ProgressBar::new(plan.jobs.len() as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template("[{elapsed_precise}] {wide_bar} {pos}/{len} registrations ({eta_precise})")?);
    let results = registration::run(&plan.jobs, &tools, args.no_affine, args.threads, bar)?;

    let mut n_failed = 0;
    for (job, result) in plan.jobs.iter().zip(&results) {
        if let Err(e) = result {
            n_failed += 1;
            println!("FAILED {}: {e}", job.input.display());
        }
    }
    let total: f64 = results.iter().flatten().map(|d| d.as_secs_f64()).sum();
    println!("{} / {} registrations succeeded ({:.1} CPU minutes)",
             results.len() - n_failed, results.len(), total / 60.0);
    if n_failed > 0 {
        return Err(format!("{n_failed} registrations failed").into());
    }
    Ok(())
}
