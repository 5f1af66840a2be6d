// Playlist fetching and segment naming.

mod fetcher;
pub mod segment;

pub use fetcher::{
    HttpPlaylistFetcher, PlaylistSource, decode_master, decode_media, decode_playlist,
};

use m3u8_rs::MediaPlaylist;
use url::Url;

/// One rendition advertised by a master playlist.
///
/// Index 0 of a variant list is the untranscoded source; the transcoding
/// server appends its profiles after it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistVariant {
    /// Absolute media playlist URL.
    pub url: Url,
    /// `WIDTHxHEIGHT` when the master advertises it.
    pub resolution: Option<String>,
    pub bandwidth: u64,
}

#[derive(Debug, Clone)]
pub enum FetchedPlaylist {
    Master(Vec<PlaylistVariant>),
    Media(MediaPlaylist),
}
