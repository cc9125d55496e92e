use crate::{config::PlayerConfig, domain::track::TrackCode};

/// path of the playback screen for a track, with the code url-encoded
pub fn player_path(code: &TrackCode) -> String {
    format!("/player?trackCode={}", urlencoding::encode(code.as_str()))
}

/// returns the link handed to the playback layer
pub fn get_player_url(conf: &PlayerConfig, code: &TrackCode) -> String {
    let url = conf.base_url.trim_end_matches('/');
    format!("{url}{}", player_path(code))
}
