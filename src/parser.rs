//! Line-oriented parser for the text a benchmarked program prints.
//!
//! The program under test is not trusted to be well formed: it may interleave
//! debug output, omit lines for some workers, or print garbage. Parsing never
//! fails; anything unrecognised is dropped.

use crate::config::ParserConfig;
use crate::schema::Measurement;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OutputParser {
    timing: String,
    distributed: String,
    serial: String,
    totals: Vec<String>,
    rank_token_index: usize,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}

/// Last token that parses as a number, skipping trailing unit words
/// (`... 0.52 seconds`).
fn final_number<T: std::str::FromStr>(tokens: &[&str]) -> Option<T> {
    let mut rev = tokens.iter().rev();
    let mut last = rev.next()?;
    let word = last.trim_end_matches(|c: char| c.is_ascii_punctuation());
    if !word.is_empty() && word.chars().all(char::is_alphabetic) {
        last = rev.next()?;
    }
    last.trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .ok()
}

impl OutputParser {
    pub fn new(cfg: &ParserConfig) -> Self {
        Self {
            timing: cfg.timing_marker.to_lowercase(),
            distributed: cfg.distributed_marker.to_lowercase(),
            serial: cfg.serial_marker.to_lowercase(),
            totals: cfg.total_markers.iter().map(|m| m.to_lowercase()).collect(),
            rank_token_index: cfg.rank_token_index,
        }
    }

    pub fn parse(&self, raw: &str, worker_count: u32) -> Measurement {
        let mut m = Measurement::default();

        for line in raw.lines() {
            let line = line.trim().to_lowercase();
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();

            if line.contains(&self.timing) {
                if line.contains(&self.distributed) {
                    match self.worker_timing(&tokens) {
                        Some((rank, _)) if rank >= worker_count => {
                            debug!(rank, worker_count, "ignoring timing for out-of-range rank");
                        }
                        // Last write wins for duplicate ranks.
                        Some((rank, time)) => {
                            m.per_worker_time.insert(rank, time);
                        }
                        None => debug!(%line, "skipping malformed worker timing line"),
                    }
                } else if line.contains(&self.serial) {
                    match final_number::<f64>(&tokens).filter(|t| t.is_finite() && *t >= 0.0) {
                        Some(t) => m.serial_time = Some(t),
                        None => debug!(%line, "skipping malformed serial timing line"),
                    }
                }
            } else if self.totals.iter().any(|marker| line.contains(marker.as_str())) {
                match final_number::<i64>(&tokens) {
                    Some(total) => m.total_computed_value = Some(total),
                    None => debug!(%line, "skipping malformed total line"),
                }
            }
        }

        m
    }

    fn worker_timing(&self, tokens: &[&str]) -> Option<(u32, f64)> {
        let rank = tokens
            .get(self.rank_token_index)?
            .trim_end_matches(|c: char| !c.is_ascii_digit())
            .parse::<u32>()
            .ok()?;
        let time = final_number::<f64>(tokens).filter(|t| t.is_finite() && *t >= 0.0)?;
        Some((rank, time))
    }
}
