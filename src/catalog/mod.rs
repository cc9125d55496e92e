//! Resolution of track codes to catalog records

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::Mutex,
    thread,
};

use log::{debug, warn};

use crate::{
    catalog::{
        error::{RemoteError, ResolutionFailure},
        local::LocalCatalog,
        remote::RemoteCatalog,
    },
    domain::track::{TrackCode, TrackRecord},
};

pub mod error;
pub mod local;
pub mod remote;

/// Outcome of a catalog lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(TrackRecord),
    NotFound,
}

impl Resolution {
    pub fn into_option(self) -> Option<TrackRecord> {
        match self {
            Resolution::Found(track) => Some(track),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Looks up track codes in the local catalog first, then in the remote one.
///
/// Never mutates anything but its own remote cache, so calls may run concurrently.
pub struct CatalogResolver {
    local: LocalCatalog,
    remote: Option<Box<dyn RemoteCatalog>>,
    cache: Option<Mutex<HashMap<TrackCode, TrackRecord>>>,
}

impl CatalogResolver {
    pub fn new(
        local: LocalCatalog,
        remote: Option<Box<dyn RemoteCatalog>>,
        cache_remote: bool,
    ) -> Self {
        Self {
            local,
            remote,
            cache: cache_remote.then(|| Mutex::new(HashMap::new())),
        }
    }

    pub fn local_only(local: LocalCatalog) -> Self {
        Self::new(local, None, false)
    }

    pub fn local(&self) -> &LocalCatalog {
        &self.local
    }

    /// Resolves a code, keeping the reason of a miss.
    pub fn lookup(&self, code: &TrackCode) -> Result<TrackRecord, ResolutionFailure> {
        if let Some(track) = self.local.get(code) {
            debug!("{code}: found in local catalog");
            return Ok(track.clone());
        }

        if let Some(track) = self.cached(code) {
            debug!("{code}: found in remote cache");
            return Ok(track);
        }

        let Some(remote) = &self.remote else {
            debug!("{code}: not in local catalog, no remote configured");
            return Err(ResolutionFailure::NotFound);
        };

        match remote.fetch_track(code) {
            Ok(track) => {
                debug!("{code}: fetched from remote catalog");
                self.remember(&track);
                Ok(track)
            }
            Err(err) => {
                let failure = ResolutionFailure::from(&err);
                match failure {
                    ResolutionFailure::NotFound => debug!("{code}: remote catalog has no such track"),
                    ResolutionFailure::RemoteUnreachable => {
                        warn!("{code}: remote catalog unreachable: {err}")
                    }
                }
                Err(failure)
            }
        }
    }

    /// Resolves a code; every failure collapses to `NotFound`.
    pub fn resolve(&self, code: &TrackCode) -> Resolution {
        match self.lookup(code) {
            Ok(track) => Resolution::Found(track),
            Err(_) => Resolution::NotFound,
        }
    }

    /// Resolves many codes concurrently, at most one thread per available core.
    ///
    /// Codes that fail to resolve are left out of the result.
    pub fn resolve_many(&self, codes: &[TrackCode]) -> HashMap<TrackCode, TrackRecord> {
        let width = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        self.resolve_many_with(codes, width)
    }

    fn resolve_many_with(
        &self,
        codes: &[TrackCode],
        width: usize,
    ) -> HashMap<TrackCode, TrackRecord> {
        let mut seen = HashSet::new();
        let unique: Vec<&TrackCode> = codes.iter().filter(|code| seen.insert(*code)).collect();

        let mut resolved = HashMap::new();
        for chunk in unique.chunks(width.max(1)) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|&code| (code, scope.spawn(move || self.resolve(code))))
                    .collect();

                for (code, handle) in handles {
                    match handle.join() {
                        Ok(Resolution::Found(track)) => {
                            resolved.insert(code.clone(), track);
                        }
                        Ok(Resolution::NotFound) => {}
                        Err(_) => warn!("{code}: resolution thread panicked"),
                    }
                }
            });
        }
        resolved
    }

    /// Lists the remote catalog.
    pub fn list_remote(&self) -> Result<Vec<TrackRecord>, RemoteError> {
        let remote = self.remote.as_ref().ok_or(RemoteError::NotConfigured)?;
        let tracks = remote.fetch_all()?;
        for track in &tracks {
            self.remember(track);
        }
        Ok(tracks)
    }

    fn cached(&self, code: &TrackCode) -> Option<TrackRecord> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(code).cloned()
    }

    fn remember(&self, track: &TrackRecord) {
        if let Some(Ok(mut cache)) = self.cache.as_ref().map(|c| c.lock()) {
            cache.insert(track.code.clone(), track.clone());
        }
    }
}
