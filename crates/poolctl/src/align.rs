// Segment Aligner: infers which leading segments of a source/transcoded pair
// must be dropped so both sides cover the same time window.

use m3u8_rs::MediaPlaylist;
use tracing::{debug, info};

use crate::config::AlignmentConfig;
use crate::playlist::segment::{segment_id, segment_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Transcoded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentOutcome {
    /// `skip` holds the leading segment identifiers of `side` that precede
    /// the alignment point. The other side skips nothing.
    Aligned { side: Side, skip: Vec<String> },
    /// No timestamp matched in either direction; nothing is skipped.
    Unaligned,
}

impl AlignmentOutcome {
    pub fn skipped(&self, side: Side) -> &[String] {
        match self {
            Self::Aligned { side: s, skip } if *s == side => skip,
            _ => &[],
        }
    }

    /// Per-rendition skip-lists for `renditions` renditions, where rendition 0
    /// is the source and rendition 1 the transcoded side that was aligned.
    pub fn into_skip_lists(self, renditions: usize) -> Vec<Vec<String>> {
        let mut lists = vec![Vec::new(); renditions.max(2)];
        if let Self::Aligned { side, skip } = self {
            let index = match side {
                Side::Source => 0,
                Side::Transcoded => 1,
            };
            lists[index] = skip;
        }
        lists.truncate(renditions);
        lists
    }
}

/// Aligns a source media playlist with one transcoded media playlist.
pub fn align_playlists(
    source: &MediaPlaylist,
    transcoded: &MediaPlaylist,
    config: &AlignmentConfig,
) -> AlignmentOutcome {
    let source: Vec<&str> = source.segments.iter().map(|s| s.uri.as_str()).collect();
    let transcoded: Vec<&str> = transcoded.segments.iter().map(|s| s.uri.as_str()).collect();
    align(&source, &transcoded, config.tolerance)
}

/// Aligns two ordered lists of segment URIs.
///
/// The first transcoded timestamp is searched for among the source segments;
/// failing that, the first source timestamp is searched for among the
/// transcoded segments. The closest segment within tolerance is the
/// alignment point; on equal distance the earlier one wins.
pub fn align<S: AsRef<str>>(source: &[S], transcoded: &[S], tolerance: i64) -> AlignmentOutcome {
    if let Some(skip) = scan(transcoded, source, tolerance) {
        info!(skipped = skip.len(), "Aligned on source side");
        return AlignmentOutcome::Aligned {
            side: Side::Source,
            skip,
        };
    }
    if let Some(skip) = scan(source, transcoded, tolerance) {
        info!(skipped = skip.len(), "Aligned on transcoded side");
        return AlignmentOutcome::Aligned {
            side: Side::Transcoded,
            skip,
        };
    }
    debug!(
        source = source.len(),
        transcoded = transcoded.len(),
        "No segment timestamps within tolerance"
    );
    AlignmentOutcome::Unaligned
}

/// Looks for the segment of `candidates` closest to the first segment of
/// `reference`, strictly within `tolerance`, returning the identifiers of
/// every candidate before it.
fn scan<S: AsRef<str>>(reference: &[S], candidates: &[S], tolerance: i64) -> Option<Vec<String>> {
    let anchor = reference.first().and_then(|s| segment_timestamp(s.as_ref()))?;
    let (position, _) = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, segment)| {
            let distance = segment_timestamp(segment.as_ref())?.abs_diff(anchor);
            (distance < tolerance.unsigned_abs()).then_some((index, distance))
        })
        // `min_by_key` keeps the first of equal minima.
        .min_by_key(|&(_, distance)| distance)?;
    debug!(anchor, position, "Found matching segment");
    Some(
        candidates[..position]
            .iter()
            .map(|s| segment_id(s.as_ref()))
            .collect(),
    )
}
