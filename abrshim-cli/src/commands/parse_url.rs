//! Parse-url command - show how the shim classifies a fetch URL.

use abrshim::config::ConfigFile;
use abrshim::segment::{is_segment_url, SegmentUrl};

use crate::error::CliError;

/// Run the parse-url command.
pub fn run(config: &ConfigFile, url: &str, max_rates: Option<usize>) -> Result<(), CliError> {
    let max_rates = match max_rates {
        Some(n) => n,
        None => config.ladder()?.len(),
    };
    print!("{}", describe(url, max_rates));
    Ok(())
}

fn describe(url: &str, max_rates: usize) -> String {
    let parsed = SegmentUrl::parse(url, max_rates);
    let show = |value: Option<u64>| match value {
        Some(v) => v.to_string(),
        None => "(none)".to_string(),
    };

    format!(
        "Path:     {}\n\
         Segment:  {}\n\
         Quality:  {}\n\
         Index:    {}\n",
        parsed.path(),
        if is_segment_url(url) { "yes" } else { "no" },
        show(parsed.quality().map(|q| q as u64)),
        show(parsed.index()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_segment() {
        let text = describe("https://cdn.example.org/video2/14.m4s", 6);
        assert!(text.contains("Path:     cdn.example.org/video2/14.m4s"));
        assert!(text.contains("Segment:  yes"));
        assert!(text.contains("Quality:  2"));
        assert!(text.contains("Index:    14"));
    }

    #[test]
    fn test_describe_header_and_out_of_range_quality() {
        let text = describe("https://cdn.example.org/video9/Header.m4s", 6);
        assert!(text.contains("Segment:  no"));
        assert!(text.contains("Quality:  (none)"));
        assert!(text.contains("Index:    (none)"));
    }
}
