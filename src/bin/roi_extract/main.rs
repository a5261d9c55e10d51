mod cli;
mod progress;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let settings = Cli::parse().settings()?;
    let mut progress = Progress::new();

    // Before starting the potentially long computation, make sure that we can
    // write the result to the requested destination.
    if let Some(dir) = settings.out.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }

    // --- Regions -------------------------------------------------------------------
    progress.start("Reading mask");
    let mut map = LabelMap::from_mask(&Volume::load(&settings.mask)?)?;
    if !settings.labels.is_empty() {
        map = map.restrict(&settings.labels)?;
    }
    progress.done_with_message(&format!("{} regions in {}", map.len(), settings.mask.display()));

    // --- Images --------------------------------------------------------------------
    progress.start("Finding images");
    let mut files = find_stat_images(&settings.root, &settings.pattern)?;
    if let Some(registration) = settings.registration {
        files.retain(|f| f.registration == registration);
    }
    if let Some(limit) = settings.limit {
        files.truncate(limit);
    }
    progress.done();
    if files.is_empty() {
        return Err(format!("no images matching `{}` under {}", settings.pattern, settings.root.display()).into());
    }

    println!("Extracting {} regions from {} images with {} threads into {}",
             map.len(), group_digits(files.len()), settings.threads, settings.out.display());
    if !settings.yes && !confirm("Run extraction?", std::io::stdin().lock())? {
        println!("Aborted");
        return Ok(());
    }

    // --- Extraction ----------------------------------------------------------------
    let jobs: Vec<Job> = files.into_iter().map(Job::from).collect();
    let bar = progress::images_bar(jobs.len());
    let extraction = extract(&map, &jobs, settings.reduction, settings.threads, bar)?;

    progress.start("Writing CSV");
    extraction.rows.write_csv(&settings.out)?;
    progress.done();

    progress::final_report(jobs.len(), &extraction, &settings.out);
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::error::Error;
use std::fs::create_dir_all;
use clap::Parser;
use env_logger::Env;
use featpipe::{
    discover::find_stat_images,
    extract::{extract, Job},
    roi::LabelMap,
    utils::{confirm, group_digits, timing::Progress},
    volume::Volume,
};
use cli::Cli;
