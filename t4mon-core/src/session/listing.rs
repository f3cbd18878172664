//! Parsing of sftp `ls -l` output

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::RemoteFile;

static LONG_LISTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<kind>[-dlcbps])\S*\s+\d+\s+\S+\s+\S+\s+(?P<size>\d+)\s+(?P<mon>[A-Za-z]{3})\s+(?P<day>\d{1,2})\s+(?P<when>\d{1,2}:\d{2}|\d{4})\s+(?P<name>.+)$",
    )
    .expect("LONG_LISTING is a valid regex pattern")
});

/// Parses regular files out of `ls -l` output
///
/// Names are reduced to their base name since sftp prefixes them with the
/// listed directory. Entries showing `HH:MM` instead of a year are less
/// than six months old; their year is taken from `reference`, or the year
/// before when that would put them in the future.
#[must_use]
pub fn parse_long_listing(output: &str, reference: NaiveDate) -> Vec<RemoteFile> {
    output
        .lines()
        .filter_map(|line| LONG_LISTING.captures(line.trim_end()))
        .filter(|caps| &caps["kind"] == "-")
        .filter_map(|caps| {
            let name = caps["name"].rsplit('/').next()?.to_string();
            Some(RemoteFile {
                name,
                modified: listing_date(&caps["mon"], &caps["day"], &caps["when"], reference),
                size: caps["size"].parse().ok()?,
            })
        })
        .collect()
}

fn listing_date(month: &str, day: &str, when: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let parse = |year: i32| NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %b %Y").ok();
    if when.contains(':') {
        let this_year = parse(reference.year())?;
        if this_year > reference {
            parse(reference.year() - 1)
        } else {
            Some(this_year)
        }
    } else {
        parse(when.parse().ok()?)
    }
}

/// Quotes a path for an sftp batch command
#[must_use]
pub fn quote_sftp_path(path: &str) -> String {
    let escaped = path.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
