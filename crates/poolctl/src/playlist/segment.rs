// Segment identifiers and the timestamps the transcoding server embeds in them.

use std::sync::LazyLock;

use regex::Regex;

/// Query parameter the server appends per viewer session. It changes between
/// fetches, so it is never part of a segment identity.
pub const SESSION_PARAM: &str = "sessId";

// `13223899_13225899.ts` -> 13223899
static SEGMENT_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_").unwrap());

/// Start timestamp of a segment, taken from the file name of its URI.
///
/// Returns `None` for names that do not follow the `<start>_<end>` scheme.
pub fn segment_timestamp(uri: &str) -> Option<i64> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    SEGMENT_START_REGEX
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Segment URI with the volatile session parameter removed.
pub fn segment_id(uri: &str) -> String {
    let Some((path, query)) = uri.split_once('?') else {
        return uri.to_owned();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            !pair.is_empty() && key != SESSION_PARAM
        })
        .collect();
    if kept.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{}", kept.join("&"))
    }
}

/// Segment identifiers ordered by embedded timestamp, for diagnostics.
///
/// Identifiers without a timestamp sort first. The returned iterator is
/// finite; call again to restart.
pub fn ordered_by_timestamp<'a, I>(ids: I) -> impl Iterator<Item = &'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keyed: Vec<(Option<i64>, &'a str)> =
        ids.into_iter().map(|id| (segment_timestamp(id), id)).collect();
    keyed.sort_by_key(|(ts, _)| *ts);
    keyed.into_iter().map(|(_, id)| id)
}
