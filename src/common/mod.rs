//! Common functionality.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    if let Ok(me) = procfs::process::Process::myself() {
        if let Ok(stat) = me.stat() {
            let page_size = procfs::page_size();
            tracing::debug!(
                "RSS now: {:.2}",
                Byte::from_u64(stat.rss * page_size).get_appropriate_unit(UnitType::Binary)
            );
        }
    }
}

/// Return the version of the `coexpolog-worker` crate and `x.y.z` in tests.
pub fn worker_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Canonical unordered species pair, lexicographically ordered.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    #[test]
    fn trace_rss_now_smoke() {
        super::trace_rss_now();
    }

    #[test]
    fn worker_version_in_tests() {
        assert_eq!(super::worker_version(), "x.y.z");
    }

    #[rstest::rstest]
    #[case("Atha", "Esal", ("Atha", "Esal"))]
    #[case("Esal", "Atha", ("Atha", "Esal"))]
    #[case("Atha", "Atha", ("Atha", "Atha"))]
    fn canonical_pair(#[case] a: &str, #[case] b: &str, #[case] expected: (&str, &str)) {
        assert_eq!(super::canonical_pair(a, b), expected);
    }
}
