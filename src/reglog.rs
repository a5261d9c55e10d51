//! Scanning registration logs for suspicious nonlinear warps.
//!
//! FNIRT reports when the Jacobian of a warp had to be constrained
//! (`... obtained range is 0.012 -- 5.31`). The image it refers to is named by
//! the next `FNIRT_NODE: <path> -> ...` line.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct BadRegistration {
    pub jacobian: (f64, f64),
    pub image: PathBuf,
}

fn jacobian_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"obtained range is ([\d.]+) -- ([\d.]+)").expect("invalid regex"))
}

fn node_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FNIRT_NODE: (.+?) ->").expect("invalid regex"))
}

/// Every Jacobian range report paired with the first node line after it.
/// Reports with no following node line, or unparsable numbers, are dropped.
pub fn scan(log: &str) -> Vec<BadRegistration> {
    let lines: Vec<&str> = log.lines().collect();
    let mut found = vec![];
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = jacobian_re().captures(line) else { continue };
        let (Ok(lo), Ok(hi)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
            log::warn!("unparsable Jacobian range in: {line}");
            continue
        };
        let image = lines[i + 1..].iter()
            .find_map(|l| node_re().captures(l))
            .map(|c| PathBuf::from(c[1].trim()));
        match image {
            Some(image) => found.push(BadRegistration { jacobian: (lo, hi), image }),
            None        => log::debug!("Jacobian range on line {} has no FNIRT_NODE line after it", i + 1),
        }
    }
    found
}
