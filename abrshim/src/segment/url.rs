//! Segment URL descriptor.
//!
//! Segment fetches follow a single URL shape:
//!
//! ```text
//! https://<host>/video<quality>/<index>.m4s
//! ```
//!
//! Initialization segments share the directory but carry the header marker
//! (`.../video2/Header.m4s`) and are never classified as segments.

use super::{QualityLevel, SegmentIndex};

/// Substring identifying a segment directory; the quality follows it.
pub const SEGMENT_MARKER: &str = "video";

/// File extension carried by every media segment.
pub const SEGMENT_EXTENSION: &str = ".m4s";

/// Substring identifying initialization (header-only) requests.
pub const HEADER_MARKER: &str = "Header";

/// Scheme prefixes stripped before path parsing.
const SCHEME_PREFIXES: [&str; 2] = ["http://", "https://"];

/// Render the header identifier for a quality level.
pub fn make_header(quality: QualityLevel) -> String {
    format!("HEADER{}", quality)
}

/// Whether a URL addresses a media segment (and not a header).
pub fn is_segment_url(url: &str) -> bool {
    url.contains(SEGMENT_MARKER) && url.ends_with(SEGMENT_EXTENSION) && !url.contains(HEADER_MARKER)
}

/// Parsed view of a segment fetch URL.
///
/// Parsing never fails: each field is extracted independently and is `None`
/// when it cannot be read as an integer. Callers treat a `None` index as
/// "not a segment" and leave the request alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUrl {
    /// Number of rungs in the bitrate ladder; bounds the quality field.
    max_rates: usize,
    /// URL with any scheme prefix removed (`host/videoQ/N.m4s`).
    path: String,
}

impl SegmentUrl {
    /// Build a descriptor for `url` against a ladder of `max_rates` entries.
    pub fn parse(url: &str, max_rates: usize) -> Self {
        let mut path = url;
        for prefix in SCHEME_PREFIXES {
            if path.contains(prefix) {
                path = path.split(prefix).nth(1).unwrap_or_default();
            }
        }

        Self {
            max_rates,
            path: path.to_string(),
        }
    }

    /// The URL without its scheme.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Quality level encoded in the segment directory (`videoQ`).
    ///
    /// Levels outside the ladder are reported as `None`.
    pub fn quality(&self) -> Option<QualityLevel> {
        let directory = self.path.split('/').nth(1)?;
        let digits = directory.split(SEGMENT_MARKER).nth(1)?;
        let quality = leading_integer(digits)? as QualityLevel;
        (quality < self.max_rates).then_some(quality)
    }

    /// Segment index encoded in the file name (`N.m4s`).
    pub fn index(&self) -> Option<SegmentIndex> {
        let file = self.path.split('/').nth(2)?;
        let stem = file.split('.').next()?;
        leading_integer(stem)
    }
}

/// Parse the leading decimal digits of `s`, ignoring any trailing text.
fn leading_integer(s: &str) -> Option<u64> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}
