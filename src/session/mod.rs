//! Scan-to-session pipeline
//!
//! decode -> resolve (bounded wait) -> record in ledger -> session reference

use std::{
    collections::HashMap,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::{
    catalog::{CatalogResolver, Resolution},
    domain::{
        drop::{DropEntry, DropId, TrackSnapshot},
        track::{TrackCode, TrackRecord},
    },
    public_endpoint::player_path,
    storage::ledger::DropLedger,
    tag::{self, DecodeFailure, NdefRecord},
};

/// Stage of a single scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Decoding,
    Resolving,
    Recording,
    /// metadata could not be resolved, the drop was recorded with placeholders
    RecordedWithoutMetadata,
    Ready,
    Failed(DecodeFailure),
}

impl ScanState {
    pub fn can_advance_to(self, next: ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Idle, Decoding)
                | (Idle, Resolving)
                | (Decoding, Resolving)
                | (Decoding, Failed(_))
                | (Resolving, Recording)
                | (Resolving, RecordedWithoutMetadata)
                | (Recording, Ready)
                | (RecordedWithoutMetadata, Ready)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Ready | ScanState::Failed(_))
    }
}

struct ScanTrace {
    states: Vec<ScanState>,
}

impl ScanTrace {
    fn new() -> Self {
        Self {
            states: vec![ScanState::Idle],
        }
    }

    fn current(&self) -> ScanState {
        *self.states.last().unwrap_or(&ScanState::Idle)
    }

    fn advance(&mut self, next: ScanState) {
        let current = self.current();
        if !current.can_advance_to(next) {
            error!("invalid scan transition {current:?} -> {next:?}");
        }
        debug!("scan: {current:?} -> {next:?}");
        self.states.push(next);
    }
}

/// What the caller navigates to after a successful scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub track_code: TrackCode,
    /// the drop recorded for this scan
    pub drop: DropEntry,
    /// whether catalog metadata was available when the drop was recorded
    pub resolved: bool,
    /// states the scan went through, from `Idle` to `Ready`
    pub states: Vec<ScanState>,
}

impl SessionRef {
    /// url-encoded track code, for the playback screen's query string
    pub fn encoded_code(&self) -> String {
        urlencoding::encode(self.track_code.as_str()).into_owned()
    }

    pub fn player_path(&self) -> String {
        player_path(&self.track_code)
    }
}

/// A recent drop together with its current catalog record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentSession {
    pub drop: DropEntry,
    pub track: TrackRecord,
}

/// Everything the audio engine needs to start streaming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackHandoff {
    pub track_code: TrackCode,
    pub audio_url: String,
    pub title: String,
    pub artist: String,
}

/// Ties the decoder, the catalog and the drop ledger together.
///
/// The ledger is only ever mutated through this type.
pub struct SessionOrchestrator {
    resolver: Arc<CatalogResolver>,
    ledger: DropLedger,
    metadata_timeout: Duration,
}

impl SessionOrchestrator {
    pub fn new(
        resolver: Arc<CatalogResolver>,
        ledger: DropLedger,
        metadata_timeout: Duration,
    ) -> Self {
        if !ledger.is_loaded() {
            ledger.load();
        }
        Self {
            resolver,
            ledger,
            metadata_timeout,
        }
    }

    pub fn resolver(&self) -> &CatalogResolver {
        &self.resolver
    }

    /// Handles a message read from a tag.
    ///
    /// Nothing is recorded when the message holds no usable track code.
    pub fn handle_message(&self, records: &[NdefRecord]) -> Result<SessionRef, DecodeFailure> {
        let mut trace = ScanTrace::new();
        trace.advance(ScanState::Decoding);

        match tag::decode_message(records) {
            Ok(code) => Ok(self.record(code, trace)),
            Err(failure) => {
                trace.advance(ScanState::Failed(failure));
                info!("scan did not yield a valid code: {failure}");
                Err(failure)
            }
        }
    }

    /// Handles a code typed in or picked from the catalog instead of read from a tag
    pub fn handle_code(&self, raw: &str) -> Result<SessionRef, DecodeFailure> {
        let code = TrackCode::parse(raw).ok_or(DecodeFailure::EmptyPayload)?;
        Ok(self.handle_tag_scanned(code))
    }

    /// Records a drop for an already decoded code; always yields a session.
    pub fn handle_tag_scanned(&self, code: TrackCode) -> SessionRef {
        self.record(code, ScanTrace::new())
    }

    fn record(&self, code: TrackCode, mut trace: ScanTrace) -> SessionRef {
        trace.advance(ScanState::Resolving);

        let snapshot = match self.resolve_bounded(&code) {
            Resolution::Found(track) => {
                trace.advance(ScanState::Recording);
                Some(TrackSnapshot::of(&track))
            }
            Resolution::NotFound => {
                trace.advance(ScanState::RecordedWithoutMetadata);
                None
            }
        };
        let resolved = snapshot.is_some();

        let drop = self.ledger.append(code.clone(), snapshot);
        trace.advance(ScanState::Ready);
        info!("scan of {code} recorded as drop {}", drop.id);

        SessionRef {
            track_code: code,
            drop,
            resolved,
            states: trace.states,
        }
    }

    /// Resolves on a worker thread and gives up after `metadata_timeout`
    fn resolve_bounded(&self, code: &TrackCode) -> Resolution {
        let (tx, rx) = mpsc::channel();
        let resolver = Arc::clone(&self.resolver);
        let worker_code = code.clone();

        let spawned = thread::Builder::new()
            .name(format!("resolve-{code}"))
            .spawn(move || {
                // the receiver may be gone after a timeout
                let _ = tx.send(resolver.resolve(&worker_code));
            });
        if let Err(e) = spawned {
            warn!("{code}: could not start resolution: {e}");
            return Resolution::NotFound;
        }

        match rx.recv_timeout(self.metadata_timeout) {
            Ok(resolution) => resolution,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "{code}: no metadata after {:?}, recording without it",
                    self.metadata_timeout
                );
                Resolution::NotFound
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("{code}: resolution thread ended without a result");
                Resolution::NotFound
            }
        }
    }

    /// all drops, newest first
    pub fn drops(&self) -> Vec<DropEntry> {
        self.ledger.entries()
    }

    pub fn recent_drops(&self, limit: usize) -> Vec<DropEntry> {
        self.ledger.recent(limit)
    }

    pub fn drop_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn remove_drop(&self, id: &DropId) {
        self.ledger.remove(id)
    }

    pub fn clear_drops(&self) {
        self.ledger.clear()
    }

    /// Rereads the ledger from storage
    pub fn reload_drops(&self) -> Vec<DropEntry> {
        self.ledger.load()
    }

    /// Newest `limit` drops with their current catalog records.
    ///
    /// Drops whose track cannot be resolved are skipped.
    pub fn recent_sessions(&self, limit: usize) -> Vec<RecentSession> {
        let drops = self.ledger.recent(limit);
        let codes: Vec<TrackCode> = drops.iter().map(|d| d.track_code.clone()).collect();
        let tracks: HashMap<TrackCode, TrackRecord> = self.resolver.resolve_many(&codes);

        drops
            .into_iter()
            .filter_map(|drop| {
                let track = tracks.get(&drop.track_code)?.clone();
                Some(RecentSession { drop, track })
            })
            .collect()
    }

    /// Looks the track up again for the playback layer
    pub fn playback(&self, code: &TrackCode) -> Option<PlaybackHandoff> {
        let track = self.resolver.resolve(code).into_option()?;
        Some(PlaybackHandoff {
            track_code: track.code,
            audio_url: track.audio_url,
            title: track.title,
            artist: track.artist,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::Ordering,
        time::Instant,
    };

    use super::*;
    use crate::{
        catalog::{
            error::RemoteError,
            local::LocalCatalog,
            remote::RemoteCatalog,
            tests::{FakeRemote, code, remote_track},
        },
        storage::ledger::tests::SharedStore,
        tag::TNF_WELL_KNOWN,
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Remote catalog that answers only after a delay
    struct SlowRemote(Duration);

    impl RemoteCatalog for SlowRemote {
        fn fetch_track(&self, code: &TrackCode) -> Result<TrackRecord, RemoteError> {
            thread::sleep(self.0);
            Ok(remote_track(code.as_str(), "TOO LATE"))
        }

        fn fetch_all(&self) -> Result<Vec<TrackRecord>, RemoteError> {
            Ok(vec![])
        }
    }

    fn orchestrator(resolver: CatalogResolver, store: &SharedStore) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Arc::new(resolver),
            DropLedger::new(Box::new(store.clone())),
            TIMEOUT,
        )
    }

    fn demo_orchestrator(store: &SharedStore) -> SessionOrchestrator {
        orchestrator(CatalogResolver::local_only(LocalCatalog::demo()), store)
    }

    fn demo_message() -> Vec<NdefRecord> {
        vec![NdefRecord {
            tnf: TNF_WELL_KNOWN,
            record_type: b"T".to_vec(),
            payload: vec![
                0x02, b'e', b'n', b'U', b'N', b'H', b'D', b'-', b'D', b'E', b'M', b'O', b'-',
                b'0', b'0', b'1',
            ],
        }]
    }

    #[test]
    fn test_scan_demo_tag_end_to_end() -> anyhow::Result<()> {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);

        let session = sessions.handle_message(&demo_message())?;

        assert_eq!(session.track_code.as_str(), "UNHD-DEMO-001");
        assert!(session.resolved);
        assert_eq!(
            session.states,
            vec![
                ScanState::Idle,
                ScanState::Decoding,
                ScanState::Resolving,
                ScanState::Recording,
                ScanState::Ready
            ]
        );

        let drops = sessions.drops();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0], session.drop);
        assert_eq!(drops[0].title, "ROOFTOP CYPHER (DEMO)");
        assert_eq!(drops[0].artist, "UNHEARD CREW");
        assert_eq!(drops[0].cover_color, "#f97316");
        Ok(())
    }

    #[test]
    fn test_decode_failure_records_nothing() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);

        assert_eq!(
            sessions.handle_message(&[]),
            Err(DecodeFailure::NoTextRecord)
        );
        assert_eq!(
            sessions.handle_message(&[NdefRecord::text("en", "  ")]),
            Err(DecodeFailure::EmptyPayload)
        );
        assert_eq!(sessions.handle_code(" "), Err(DecodeFailure::EmptyPayload));

        assert_eq!(sessions.drop_count(), 0);
        assert_eq!(store.document(), None);
    }

    #[test]
    fn test_unknown_code_still_reaches_ready() {
        let store = SharedStore::default();
        let (remote, calls) = FakeRemote::new(vec![]);
        let sessions = orchestrator(
            CatalogResolver::new(LocalCatalog::demo(), Some(Box::new(remote)), true),
            &store,
        );

        let session = sessions.handle_tag_scanned(code("UNHD-NOPE-404"));

        assert!(!session.resolved);
        assert_eq!(
            session.states,
            vec![
                ScanState::Idle,
                ScanState::Resolving,
                ScanState::RecordedWithoutMetadata,
                ScanState::Ready
            ]
        );
        assert_eq!(session.drop.title, "UNKNOWN TRACK");
        assert_eq!(session.drop.artist, "UNKNOWN ARTIST");
        assert_eq!(sessions.drop_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreachable_remote_still_reaches_ready() {
        let store = SharedStore::default();
        let (remote, _) = FakeRemote::unreachable();
        let sessions = orchestrator(
            CatalogResolver::new(LocalCatalog::demo(), Some(Box::new(remote)), true),
            &store,
        );

        let session = sessions.handle_tag_scanned(code("UNHD-LIVE-777"));

        assert_eq!(session.states.last(), Some(&ScanState::Ready));
        assert_eq!(session.drop.title, "UNKNOWN TRACK");
    }

    #[test]
    fn test_local_code_never_contacts_remote() {
        let store = SharedStore::default();
        let (remote, calls) = FakeRemote::new(vec![]);
        let sessions = orchestrator(
            CatalogResolver::new(LocalCatalog::demo(), Some(Box::new(remote)), true),
            &store,
        );

        let session = sessions.handle_tag_scanned(code("UNHD-DEMO-004"));

        assert!(session.resolved);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remote_code_is_snapshotted() {
        let store = SharedStore::default();
        let (remote, _) = FakeRemote::new(vec![remote_track("UNHD-LIVE-777", "LIVE SET")]);
        let sessions = orchestrator(
            CatalogResolver::new(LocalCatalog::demo(), Some(Box::new(remote)), true),
            &store,
        );

        let session = sessions.handle_code(" UNHD-LIVE-777 ").unwrap();

        assert_eq!(session.drop.title, "LIVE SET");
        assert_eq!(session.drop.artist, "REMOTE ARTIST");
    }

    #[test]
    fn test_slow_catalog_does_not_block_recording() {
        let store = SharedStore::default();
        let sessions = SessionOrchestrator::new(
            Arc::new(CatalogResolver::new(
                LocalCatalog::default(),
                Some(Box::new(SlowRemote(Duration::from_secs(3)))),
                false,
            )),
            DropLedger::new(Box::new(store.clone())),
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let session = sessions.handle_tag_scanned(code("UNHD-LIVE-777"));

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!session.resolved);
        assert_eq!(session.drop.title, "UNKNOWN TRACK");
        assert_eq!(sessions.drop_count(), 1);
    }

    #[test]
    fn test_repeated_scans_are_separate_drops() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);

        let first = sessions.handle_message(&demo_message()).unwrap();
        let second = sessions.handle_message(&demo_message()).unwrap();

        assert_ne!(first.drop.id, second.drop.id);
        assert_eq!(sessions.drops(), vec![second.drop, first.drop]);
    }

    #[test]
    fn test_snapshot_survives_catalog_change() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);
        let recorded = sessions.handle_tag_scanned(code("UNHD-DEMO-002")).drop;

        // same ledger, catalog now has different metadata for the code
        let edited = LocalCatalog::from_records(vec![remote_track("UNHD-DEMO-002", "RENAMED")]);
        let sessions = orchestrator(CatalogResolver::local_only(edited), &store);

        assert_eq!(sessions.drops(), vec![recorded.clone()]);
        assert_eq!(sessions.drops()[0].title, "SUBWAY REVERB TAPE");
        assert_eq!(sessions.recent_sessions(3)[0].track.title, "RENAMED");
    }

    #[test]
    fn test_restart_restores_ledger() {
        let store = SharedStore::default();
        let before = {
            let sessions = demo_orchestrator(&store);
            sessions.handle_tag_scanned(code("UNHD-DEMO-001"));
            sessions.handle_tag_scanned(code("UNHD-NOPE"));
            sessions.handle_tag_scanned(code("UNHD-DEMO-003"));
            sessions.drops()
        };

        let sessions = demo_orchestrator(&store);

        assert_eq!(sessions.drops(), before);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);
        let a = sessions.handle_tag_scanned(code("UNHD-DEMO-001"));
        sessions.handle_tag_scanned(code("UNHD-DEMO-002"));

        sessions.remove_drop(&a.drop.id);
        assert_eq!(sessions.drop_count(), 1);

        sessions.clear_drops();
        assert!(sessions.reload_drops().is_empty());
        assert!(demo_orchestrator(&store).drops().is_empty());
    }

    #[test]
    fn test_recent_sessions_skip_unresolved() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);
        sessions.handle_tag_scanned(code("UNHD-DEMO-001"));
        sessions.handle_tag_scanned(code("UNHD-DEMO-002"));
        sessions.handle_tag_scanned(code("UNHD-NOPE"));
        sessions.handle_tag_scanned(code("UNHD-DEMO-005"));

        let recent = sessions.recent_sessions(3);

        let titles: Vec<_> = recent.iter().map(|r| r.track.title.as_str()).collect();
        assert_eq!(titles, vec!["UNDERGROUND ANTHEM", "SUBWAY REVERB TAPE"]);
    }

    #[test]
    fn test_session_ref_encodes_code() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);

        let session = sessions.handle_code("MIX #1 & 2").unwrap();

        assert_eq!(session.encoded_code(), "MIX%20%231%20%26%202");
        assert_eq!(session.player_path(), "/player?trackCode=MIX%20%231%20%26%202");
    }

    #[test]
    fn test_playback_handoff() {
        let store = SharedStore::default();
        let sessions = demo_orchestrator(&store);
        let session = sessions.handle_tag_scanned(code("UNHD-DEMO-003"));

        let handoff = sessions.playback(&session.track_code).unwrap();

        assert_eq!(
            handoff.audio_url,
            "https://actions.google.com/sounds/v1/cartoon/slide_whistle.ogg"
        );
        assert_eq!(handoff.title, "MIDNIGHT FREESTYLE");
        assert!(sessions.playback(&code("UNHD-NOPE")).is_none());
    }

    #[test]
    fn test_state_machine_transitions() {
        use ScanState::*;

        assert!(Resolving.can_advance_to(RecordedWithoutMetadata));
        assert!(RecordedWithoutMetadata.can_advance_to(Ready));
        assert!(Decoding.can_advance_to(Failed(DecodeFailure::NoTextRecord)));

        assert!(!Resolving.can_advance_to(Failed(DecodeFailure::NoTextRecord)));
        assert!(!Recording.can_advance_to(Failed(DecodeFailure::EmptyPayload)));
        assert!(!Idle.can_advance_to(Ready));

        assert!(Ready.is_terminal());
        assert!(Failed(DecodeFailure::EmptyPayload).is_terminal());
        assert!(!RecordedWithoutMetadata.is_terminal());
    }
}
