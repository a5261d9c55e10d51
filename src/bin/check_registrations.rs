// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "check_registrations", about = "Find nonlinear registrations with extreme Jacobians in a log")]
pub struct Cli {

    /// Registration log files to scan
    #[clap(required = true)]
    pub logs: Vec<PathBuf>,

    /// Only report warps whose Jacobian range leaves `min..max`
    #[clap(long, value_parser = jacobian_bounds)]
    pub within: Option<JacobianBounds>,

    /// Write the offending image paths, one per line, to this file
    #[clap(short, long)]
    pub out: Option<PathBuf>,
}

// Alias to disable clap's type magic
type JacobianBounds = std::ops::RangeInclusive<f64>;

fn jacobian_bounds(s: &str) -> Result<JacobianBounds, String> {
    parse_range::<f64>(s).map_err(|e| e.to_string())
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use env_logger::Env;

use featpipe::reglog::{scan, BadRegistration};
use featpipe::utils::parse_range;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    let mut bad: Vec<BadRegistration> = vec![];
    for path in &args.logs {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        let found = scan(&text);
        log::info!("{}: {} Jacobian warnings", path.display(), found.len());
        bad.extend(found);
    }
    if let Some(bounds) = &args.within {
        bad.retain(|b| !(bounds.contains(&b.jacobian.0) && bounds.contains(&b.jacobian.1)));
    }

    for BadRegistration { jacobian: (lo, hi), image } in &bad {
        println!("{lo:>8.4} -- {hi:<8.4} {}", image.display());
    }
    println!("{} bad registrations", bad.len());

    if let Some(out) = &args.out {
        let mut file = std::io::BufWriter::new(std::fs::File::create(out)?);
        for b in &bad { writeln!(file, "{}", b.image.display())? }
        file.flush()?;
    }
    Ok(())
}
