use std::io::{BufRead, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::IoContext;
use crate::{Error, Result};

/// Parse `"2..5"` into `2..=5`. A single number `n` means `n..=n`.
pub fn parse_range<T>(s: &str) -> Result<RangeInclusive<T>>
where
    T: std::str::FromStr + Copy,
{
    let bad = || Error::Invalid(format!("`{s}` is not a number or an inclusive range `a..b`"));
    let s = s.trim();
    match s.split_once("..") {
        Some((lo, hi)) => {
            let lo = lo.trim().parse().map_err(|_| bad())?;
            let hi = hi.trim().parse().map_err(|_| bad())?;
            Ok(lo..=hi)
        }
        None => {
            let n = s.parse().map_err(|_| bad())?;
            Ok(n..=n)
        }
    }
}

/// Parse comma-separated numbers and inclusive ranges, such as `"1-3,7,10..12"`,
/// preserving order and dropping duplicates.
pub fn parse_labels(s: &str) -> Result<Vec<u32>> {
    let mut labels = vec![];
    for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        let range = parse_range::<u32>(&item.replacen('-', "..", 1))?;
        if range.is_empty() {
            return Err(Error::Invalid(format!("empty label range `{item}`")));
        }
        for label in range {
            if !labels.contains(&label) { labels.push(label) }
        }
    }
    Ok(labels)
}

/// Subject IDs, one per line, with or without a `sub-` prefix. Blank lines
/// and `#` comments are ignored.
pub fn read_subject_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).at(path)?;
    Ok(text.lines()
       .map(str::trim)
       .filter(|l| !l.is_empty() && !l.starts_with('#'))
       .map(|l| l.strip_prefix("sub-").unwrap_or(l).to_string())
       .collect())
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

/// Ask `question` on stdout and read a yes/no answer from `input`. Anything
/// other than `y` or `yes` counts as no.
pub fn confirm(question: &str, mut input: impl BufRead) -> std::io::Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub mod timing {

    use super::group_digits;
    use std::time::Instant;

    /// Stage timer reporting through the `log` facade
    pub struct Progress {
        previous: Instant,
        message: String,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now(), message: String::new() } }

        /// Announce a stage and start timing it
        pub fn start(&mut self, message: &str) {
            log::info!("{message} ...");
            self.message = message.to_string();
            self.start_timer();
        }

        /// Report the time elapsed since the last start or done
        pub fn done(&mut self) {
            log::info!("{} done: {} ms", self.message,
                       group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        /// Report `message` followed by the time elapsed since the last start or done
        pub fn done_with_message(&mut self, message: &str) {
            log::info!("{message}: {} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[rstest(/**/ text    , expected,
             case("3"     , 3..=3),
             case("2..5"  , 2..=5),
             case(" 1..1 ", 1..=1),
    )]
    fn ranges(text: &str, expected: RangeInclusive<u32>) {
        assert_eq!(parse_range::<u32>(text).unwrap(), expected);
    }

    #[rstest(text, case("x"), case("1..y"), case(".."), case(""))]
    fn bad_ranges(text: &str) {
        assert!(parse_range::<u32>(text).is_err());
    }

    #[rstest(/**/ text         , expected,
             case("1"          , vec![1]),
             case("1-3,7"      , vec![1, 2, 3, 7]),
             case("7, 1..2"    , vec![7, 1, 2]),
             case("2,1-3"      , vec![2, 1, 3]),
             case(""           , vec![]),
    )]
    fn labels(text: &str, expected: Vec<u32>) {
        assert_eq!(parse_labels(text).unwrap(), expected);
    }

    #[test]
    fn backwards_label_range_is_rejected() {
        assert!(parse_labels("5-2").is_err());
    }

    #[rstest(/**/ answer , expected,
             case("y\n"  , true),
             case("YES\n", true),
             case("n\n"  , false),
             case("\n"   , false),
             case(""     , false),
    )]
    fn confirmation(answer: &str, expected: bool) {
        assert_eq!(confirm("Go?", answer.as_bytes()).unwrap(), expected);
    }

    #[test]
    fn subject_list() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("subjects.txt");
        std::fs::write(&path, "sub-NDARINV00BD7VDC\n\n# excluded\nNDARINV00CY2MDM  \n")?;
        assert_eq!(read_subject_list(&path)?, vec!["NDARINV00BD7VDC", "NDARINV00CY2MDM"]);
        Ok(())
    }

    #[test]
    fn digits_are_grouped() {
        assert_eq!(group_digits(1234567), "1,234,567");
    }
}
