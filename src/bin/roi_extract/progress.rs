/// Progress bar for the `roi_extract` executable: one tick per image
pub (super) fn images_bar(n_images: usize) -> ProgressBar {
    let bar = ProgressBar::new(n_images as u64).with_message("extracting");
    bar.set_style(ProgressStyle::default_bar()
                  .template("{msg}: [{elapsed_precise}] {wide_bar} {pos}/{len} images ({eta_precise})")
                  .unwrap_or_else(|_| ProgressStyle::default_bar())
    );
    bar.tick();
    bar
}

/// Summary of a finished run, including every image that failed
pub (super) fn final_report(n_images: usize, extraction: &Extraction, out: &Path) {
    let n_failed = extraction.failures.len();
    println!("Wrote {} rows from {} / {} images to {}",
             group_digits(extraction.rows.len()),
             group_digits(n_images - n_failed),
             group_digits(n_images),
             out.display());
    if n_failed > 0 {
        println!("{n_failed} images failed:");
        for (path, error) in &extraction.failures {
            println!("  {}: {error}", path.display());
        }
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::path::Path;
use indicatif::{ProgressBar, ProgressStyle};
use featpipe::{extract::Extraction, utils::group_digits};
