use api_client::ApiClientError;
use auth::{AuthError, Credentials, MemoryStore, OAuthClient, OAuthConfig, TokenRefresher, TokenStore};
use fetcher::{AlbumOrigin, CollectionSelector, FetchError, MediaFetcher};
use mocks::{album, token_server, video_pages, FakeLibrary};
use player::{
    Gesture, JsonSessionStore, MemorySessionStore, Session, SessionState, ViewStatus, Viewer,
    ViewerError, ViewerInput,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct FakeRefresher {
    token: Option<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl FakeRefresher {
    fn issuing(token: &str) -> Self {
        FakeRefresher {
            token: Some(token.to_string()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenRefresher for &FakeRefresher {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(refresh_token.to_string());
        self.token
            .clone()
            .ok_or_else(|| AuthError::OAuth("invalid_grant".into()))
    }
}

fn signed_in() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Some(Credentials::new(
        "stale",
        Some("refresh".into()),
    ))))
}

fn album_a() -> CollectionSelector {
    CollectionSelector::Album("a".into())
}

fn viewer<'r>(
    library: FakeLibrary,
    refresher: &'r FakeRefresher,
    tokens: Arc<MemoryStore>,
    store: Arc<MemorySessionStore>,
) -> Viewer<FakeLibrary, &'r FakeRefresher> {
    let session = Session::open(tokens, store).unwrap();
    Viewer::new(MediaFetcher::new(library), refresher, session)
}

#[tokio::test]
async fn load_requires_credentials() {
    let refresher = FakeRefresher::default();
    let mut viewer = viewer(
        FakeLibrary::new(),
        &refresher,
        Arc::new(MemoryStore::default()),
        Arc::new(MemorySessionStore::default()),
    );
    assert!(matches!(
        viewer.load(None).await,
        Err(ViewerError::NotSignedIn)
    ));
    assert_eq!(viewer.status(), &ViewStatus::Idle);
}

#[tokio::test]
async fn load_requires_selection() {
    let refresher = FakeRefresher::default();
    let mut viewer = viewer(
        FakeLibrary::new(),
        &refresher,
        signed_in(),
        Arc::new(MemorySessionStore::default()),
    );
    assert!(matches!(
        viewer.load(None).await,
        Err(ViewerError::NoSelection)
    ));
}

#[tokio::test]
async fn opening_album_installs_collection() {
    let refresher = FakeRefresher::default();
    let store = Arc::new(MemorySessionStore::default());
    let mut viewer = viewer(
        FakeLibrary::new().with_media_pages(video_pages(2, 3)),
        &refresher,
        signed_in(),
        store.clone(),
    );

    assert_eq!(viewer.open(album_a(), None).await.unwrap(), 6);
    assert_eq!(viewer.status(), &ViewStatus::Ready);
    assert_eq!(viewer.navigator().position(), Some(0));
    assert_eq!(viewer.current().unwrap().id(), "v0-0");
    assert_eq!(
        store.snapshot(),
        Some(SessionState {
            selector: Some(album_a()),
            position: 0,
        })
    );
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn saved_position_is_restored() {
    let refresher = FakeRefresher::default();
    let store = Arc::new(MemorySessionStore::new(Some(SessionState {
        selector: Some(album_a()),
        position: 2,
    })));
    let mut viewer = viewer(
        FakeLibrary::new().with_media_pages(video_pages(1, 5)),
        &refresher,
        signed_in(),
        store.clone(),
    );

    viewer.load(None).await.unwrap();
    assert_eq!(viewer.navigator().position(), Some(2));
    assert_eq!(viewer.current().unwrap().id(), "v0-2");
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn stale_position_falls_back_to_start() {
    let refresher = FakeRefresher::default();
    let store = Arc::new(MemorySessionStore::new(Some(SessionState {
        selector: Some(album_a()),
        position: 9,
    })));
    let mut viewer = viewer(
        FakeLibrary::new().with_media_pages(video_pages(1, 3)),
        &refresher,
        signed_in(),
        store.clone(),
    );

    viewer.load(None).await.unwrap();
    assert_eq!(viewer.navigator().position(), Some(0));
    assert_eq!(store.snapshot().unwrap().position, 0);
}

#[tokio::test]
async fn zero_videos_is_empty_not_failed() {
    let refresher = FakeRefresher::default();
    let mut viewer = viewer(
        FakeLibrary::new(),
        &refresher,
        signed_in(),
        Arc::new(MemorySessionStore::default()),
    );

    assert_eq!(viewer.open(CollectionSelector::Library, None).await.unwrap(), 0);
    assert_eq!(viewer.status(), &ViewStatus::Empty);
    assert_eq!(viewer.navigator().position(), None);
}

#[tokio::test]
async fn refreshed_token_is_written_back() {
    let refresher = FakeRefresher::issuing("fresh");
    let tokens = signed_in();
    let mut viewer = viewer(
        FakeLibrary::new()
            .with_media_pages(video_pages(1, 2))
            .accepting_token("fresh"),
        &refresher,
        tokens.clone(),
        Arc::new(MemorySessionStore::default()),
    );

    assert_eq!(viewer.open(album_a(), None).await.unwrap(), 2);
    assert_eq!(refresher.calls(), 1);
    assert_eq!(*refresher.seen.lock().unwrap(), vec!["refresh".to_string()]);

    let stored = tokens.load().unwrap().unwrap();
    assert_eq!(stored, Credentials::new("fresh", Some("refresh".into())));
    assert_eq!(viewer.session().credentials(), Some(&stored));
}

#[tokio::test]
async fn missing_refresh_token_fails_load() {
    let refresher = FakeRefresher::issuing("fresh");
    let tokens = Arc::new(MemoryStore::new(Some(Credentials::new("stale", None))));
    let mut viewer = viewer(
        FakeLibrary::new()
            .with_media_pages(video_pages(1, 2))
            .accepting_token("fresh"),
        &refresher,
        tokens,
        Arc::new(MemorySessionStore::default()),
    );

    let err = viewer.open(album_a(), None).await.unwrap_err();
    assert!(matches!(err, ViewerError::Fetch(FetchError::Refresh(_))));
    assert_eq!(refresher.calls(), 0);
    assert!(matches!(
        viewer.status(),
        ViewStatus::Failed {
            permission: false,
            ..
        }
    ));
}

#[tokio::test]
async fn permission_failure_is_flagged() {
    let refresher = FakeRefresher::default();
    let mut viewer = viewer(
        FakeLibrary::new().failing_search(ApiClientError::PermissionDenied("disabled".into())),
        &refresher,
        signed_in(),
        Arc::new(MemorySessionStore::default()),
    );

    assert!(viewer.open(album_a(), None).await.is_err());
    match viewer.status() {
        ViewStatus::Failed {
            message,
            permission,
        } => {
            assert!(*permission);
            assert!(message.contains("Google Cloud Console"));
        }
        other => panic!("unexpected status: {:?}", other),
    }
}

#[tokio::test]
async fn inputs_move_and_persist_position() {
    let refresher = FakeRefresher::default();
    let store = Arc::new(MemorySessionStore::default());
    let mut viewer = viewer(
        FakeLibrary::new().with_media_pages(video_pages(1, 3)),
        &refresher,
        signed_in(),
        store.clone(),
    );
    viewer.open(album_a(), None).await.unwrap();
    let writes = store.writes();

    assert_eq!(viewer.handle(ViewerInput::Next).unwrap(), Some(1));
    assert_eq!(
        viewer
            .handle(ViewerInput::Gesture(Gesture::Swipe { dy: -120.0 }))
            .unwrap(),
        Some(2)
    );
    assert_eq!(store.snapshot().unwrap().position, 2);
    assert_eq!(store.writes(), writes + 2);

    // no movement, no write
    assert_eq!(viewer.handle(ViewerInput::Ended).unwrap(), Some(2));
    assert_eq!(viewer.handle(ViewerInput::Tap(7)).unwrap(), Some(2));
    assert_eq!(store.writes(), writes + 2);

    assert_eq!(viewer.handle(ViewerInput::Tap(0)).unwrap(), Some(0));
    assert_eq!(viewer.handle(ViewerInput::Previous).unwrap(), Some(0));
    assert_eq!(viewer.session().position(), 0);

    viewer.logout().unwrap();
    assert!(viewer.navigator().is_empty());
    assert_eq!(viewer.status(), &ViewStatus::Idle);
    assert!(store.snapshot().is_none());
    assert!(matches!(
        viewer.load(None).await,
        Err(ViewerError::NotSignedIn)
    ));
}

#[tokio::test]
async fn album_listing_refreshes_once() {
    let refresher = FakeRefresher::issuing("fresh");
    let tokens = signed_in();
    let mut viewer = viewer(
        FakeLibrary::new()
            .with_owned_albums(vec![vec![album("o1", "Trips", Some("4"))]])
            .accepting_token("fresh"),
        &refresher,
        tokens.clone(),
        Arc::new(MemorySessionStore::default()),
    );

    let listing = viewer.albums().await.unwrap();
    assert_eq!(listing.albums.len(), 1);
    assert!(listing.failures.is_empty());
    assert_eq!(refresher.calls(), 1);
    assert_eq!(tokens.load().unwrap().unwrap().access_token, "fresh");
}

#[tokio::test]
async fn failed_refresh_keeps_partial_album_listing() {
    let refresher = FakeRefresher::default();
    let tokens = signed_in();
    let mut viewer = viewer(
        FakeLibrary::new()
            .with_owned_albums(vec![vec![album("o1", "Trips", Some("4"))]])
            .failing_shared(ApiClientError::Unauthorized("expired".into())),
        &refresher,
        tokens.clone(),
        Arc::new(MemorySessionStore::default()),
    );

    let listing = viewer.albums().await.unwrap();
    assert_eq!(refresher.calls(), 1);
    assert_eq!(listing.albums.len(), 1);
    assert_eq!(listing.albums[0].album.id, "o1");
    assert_eq!(listing.failures.len(), 1);
    assert!(matches!(
        listing.failures[0],
        (AlbumOrigin::Shared, FetchError::Refresh(_))
    ));
    assert_eq!(tokens.load().unwrap().unwrap().access_token, "stale");
}

#[tokio::test]
async fn failed_open_drops_previous_collection() {
    let refresher = FakeRefresher::default();
    let store = Arc::new(MemorySessionStore::default());
    let mut viewer = viewer(
        FakeLibrary::new()
            .with_media_pages(video_pages(1, 3))
            .failing_album("b", ApiClientError::GoogleApiError {
                status: 500,
                message: "backend".into(),
            }),
        &refresher,
        signed_in(),
        store.clone(),
    );
    assert_eq!(viewer.open(album_a(), None).await.unwrap(), 3);

    let b = CollectionSelector::Album("b".into());
    assert!(viewer.open(b.clone(), None).await.is_err());
    assert!(viewer.navigator().is_empty());
    assert!(viewer.current().is_none());

    let writes = store.writes();
    assert_eq!(viewer.handle(ViewerInput::Next).unwrap(), None);
    assert_eq!(store.writes(), writes);
    assert_eq!(
        store.snapshot(),
        Some(SessionState {
            selector: Some(b),
            position: 0,
        })
    );
}

#[tokio::test]
async fn session_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let tokens = Arc::new(MemoryStore::default());

    let mut session =
        Session::open(tokens.clone(), JsonSessionStore::in_dir(dir.path())).unwrap();
    session
        .set_credentials(Credentials::new("a", Some("r".into())))
        .unwrap();
    session.select(album_a()).unwrap();
    session.set_position(3).unwrap();
    drop(session);

    let mut reopened =
        Session::open(tokens.clone(), JsonSessionStore::in_dir(dir.path())).unwrap();
    assert_eq!(reopened.selector(), Some(&album_a()));
    assert_eq!(reopened.position(), 3);
    assert!(reopened.is_signed_in());

    reopened.logout().unwrap();
    assert!(!dir.path().join("session.json").exists());
    assert!(tokens.load().unwrap().is_none());
    assert!(reopened.selector().is_none());
}

#[tokio::test]
async fn oauth_client_refreshes_for_viewer() {
    let server = token_server("fresh");
    let client = OAuthClient::new(&OAuthConfig {
        client_id: "id".into(),
        client_secret: "secret".into(),
        redirect_port: 8080,
        token_url: server.url_str("/token"),
    })
    .unwrap();
    let session = Session::open(signed_in(), MemorySessionStore::default()).unwrap();
    let mut viewer = Viewer::new(
        MediaFetcher::new(
            FakeLibrary::new()
                .with_media_pages(video_pages(1, 4))
                .accepting_token("fresh"),
        ),
        client,
        session,
    );

    assert_eq!(viewer.open(CollectionSelector::Library, None).await.unwrap(), 4);
    assert_eq!(
        viewer.session().credentials().unwrap().access_token,
        "fresh"
    );
}
