//! Client side of the vote counter: show the count, let a visitor vote
//! once, let them take it back.
//!
//! The "already voted" flag is local and advisory. Clearing it (or using
//! another machine) allows voting again; the server does not track voters.

use async_trait::async_trait;
use log::{error, warn};
use reqwest::Url;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{ErrorResponse, VoteResponse, VotesResponse};
use crate::votes::FALLBACK_COUNT;

pub const DEFAULT_API: &str = "http://127.0.0.1:8080";
pub const DEFAULT_FLAG_FILE: &str = ".china_voted";
pub const VOTE_FAILED_ALERT: &str = "Failed to record your vote. Please try again!";

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("Vote API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Could not save vote flag: {0}")]
    Flag(#[from] std::io::Error),
}

#[async_trait]
pub trait VoteApi: Send + Sync {
    async fn fetch_count(&self) -> Result<u64, WidgetError>;
    async fn cast_vote(&self) -> Result<u64, WidgetError>;
}

/// Browser-local "has voted" marker.
pub trait VotedFlag: Send + Sync {
    fn is_set(&self) -> bool;
    fn set(&self) -> Result<(), WidgetError>;
    fn clear(&self) -> Result<(), WidgetError>;
}

pub struct HttpVoteApi {
    http: reqwest::Client,
    base: Url,
}

impl HttpVoteApi {
    pub fn new(base: &str) -> Result<Self, WidgetError> {
        let base = Url::parse(base).map_err(|e| WidgetError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, WidgetError> {
        self.base
            .join(path)
            .map_err(|e| WidgetError::InvalidUrl(e.to_string()))
    }
}

async fn rejection(response: reqwest::Response) -> WidgetError {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => WidgetError::Rejected(body.message),
        Err(_) => WidgetError::Rejected(format!("vote API returned {}", status)),
    }
}

#[async_trait]
impl VoteApi for HttpVoteApi {
    async fn fetch_count(&self) -> Result<u64, WidgetError> {
        let response = self.http.get(self.endpoint("/api/votes")?).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<VotesResponse>().await?.count)
    }

    async fn cast_vote(&self) -> Result<u64, WidgetError> {
        let response = self
            .http
            .post(self.endpoint("/api/vote")?)
            .header("content-type", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<VoteResponse>().await?.count)
    }
}

/// Flag persisted as a file containing `true`.
pub struct FileFlag {
    path: PathBuf,
}

impl FileFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VotedFlag for FileFlag {
    fn is_set(&self) -> bool {
        std::fs::read_to_string(&self.path)
            .map(|s| s.trim() == "true")
            .unwrap_or(false)
    }

    fn set(&self) -> Result<(), WidgetError> {
        std::fs::write(&self.path, "true")?;
        Ok(())
    }

    fn clear(&self) -> Result<(), WidgetError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Unvoted,
    Voting,
    Voted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded(u64),
    AlreadyVoted,
    /// The vote did not land; carries the message to show the visitor.
    Failed(String),
}

pub struct VoteWidget<A, F> {
    api: A,
    flag: F,
    state: WidgetState,
    count: u64,
}

impl<A: VoteApi, F: VotedFlag> VoteWidget<A, F> {
    pub fn new(api: A, flag: F) -> Self {
        let state = if flag.is_set() {
            WidgetState::Voted
        } else {
            WidgetState::Unvoted
        };
        Self {
            api,
            flag,
            state,
            count: FALLBACK_COUNT,
        }
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Fetches the current count; keeps the fallback on failure.
    pub async fn load(&mut self) -> u64 {
        match self.api.fetch_count().await {
            Ok(count) => self.count = count,
            Err(e) => {
                error!("Failed to fetch vote count: {}", e);
                self.count = FALLBACK_COUNT;
            }
        }
        self.count
    }

    pub async fn count_in(&mut self) -> VoteOutcome {
        if self.state != WidgetState::Unvoted {
            return VoteOutcome::AlreadyVoted;
        }

        self.state = WidgetState::Voting;
        match self.api.cast_vote().await {
            Ok(count) => {
                self.count = count;
                self.state = WidgetState::Voted;
                // The vote already landed; a lost flag only allows a repeat
                if let Err(e) = self.flag.set() {
                    warn!("Vote recorded but flag not saved: {}", e);
                }
                VoteOutcome::Recorded(count)
            }
            Err(e) => {
                error!("Failed to record vote: {}", e);
                self.state = WidgetState::Unvoted;
                VoteOutcome::Failed(VOTE_FAILED_ALERT.to_string())
            }
        }
    }

    /// "Cancel my move". The server count is not decremented.
    pub fn cancel(&mut self) -> Result<(), WidgetError> {
        self.flag.clear()?;
        self.state = WidgetState::Unvoted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::AppState;
    use crate::votes::SheetVoteStore;
    use crate::votes::tests::FakeSheet;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        count: Mutex<u64>,
        down: bool,
        votes: AtomicUsize,
    }

    impl FakeApi {
        fn at(count: u64) -> Self {
            Self {
                count: Mutex::new(count),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl VoteApi for FakeApi {
        async fn fetch_count(&self) -> Result<u64, WidgetError> {
            if self.down {
                return Err(WidgetError::Rejected("Failed to fetch vote count".into()));
            }
            Ok(*self.count.lock().unwrap())
        }

        async fn cast_vote(&self) -> Result<u64, WidgetError> {
            self.votes.fetch_add(1, Ordering::SeqCst);
            if self.down {
                return Err(WidgetError::Rejected("Quota exceeded".into()));
            }
            let mut count = self.count.lock().unwrap();
            *count += 1;
            Ok(*count)
        }
    }

    #[derive(Default)]
    struct MemoryFlag(AtomicBool);

    impl VotedFlag for MemoryFlag {
        fn is_set(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn set(&self) -> Result<(), WidgetError> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn clear(&self) -> Result<(), WidgetError> {
            self.0.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn load_adopts_server_count() {
        let mut widget = VoteWidget::new(FakeApi::at(1300), MemoryFlag::default());
        assert_eq!(widget.load().await, 1300);
        assert_eq!(widget.state(), WidgetState::Unvoted);
    }

    #[tokio::test]
    async fn load_failure_keeps_fallback() {
        let api = FakeApi {
            down: true,
            ..Default::default()
        };
        let mut widget = VoteWidget::new(api, MemoryFlag::default());
        assert_eq!(widget.load().await, FALLBACK_COUNT);
    }

    #[tokio::test]
    async fn voting_once_sets_flag_and_count() {
        let mut widget = VoteWidget::new(FakeApi::at(1300), MemoryFlag::default());

        assert_eq!(widget.count_in().await, VoteOutcome::Recorded(1301));
        assert_eq!(widget.state(), WidgetState::Voted);
        assert_eq!(widget.count(), 1301);
        assert!(widget.flag.is_set());
    }

    #[tokio::test]
    async fn second_vote_is_ignored() {
        let mut widget = VoteWidget::new(FakeApi::at(5), MemoryFlag::default());
        widget.count_in().await;

        assert_eq!(widget.count_in().await, VoteOutcome::AlreadyVoted);
        assert_eq!(widget.api.votes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_flag_skips_voting() {
        let flag = MemoryFlag::default();
        flag.set().unwrap();
        let mut widget = VoteWidget::new(FakeApi::at(5), flag);

        assert_eq!(widget.state(), WidgetState::Voted);
        assert_eq!(widget.count_in().await, VoteOutcome::AlreadyVoted);
        assert_eq!(widget.api.votes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_vote_reverts_and_alerts() {
        let api = FakeApi {
            count: Mutex::new(9),
            down: true,
            ..Default::default()
        };
        let mut widget = VoteWidget::new(api, MemoryFlag::default());

        assert_eq!(
            widget.count_in().await,
            VoteOutcome::Failed(VOTE_FAILED_ALERT.to_string())
        );
        assert_eq!(widget.state(), WidgetState::Unvoted);
        assert!(!widget.flag.is_set());
    }

    #[tokio::test]
    async fn cancel_allows_voting_again() {
        let mut widget = VoteWidget::new(FakeApi::at(10), MemoryFlag::default());
        widget.count_in().await;
        widget.cancel().unwrap();

        assert_eq!(widget.state(), WidgetState::Unvoted);
        assert_eq!(widget.count_in().await, VoteOutcome::Recorded(12));
    }

    #[tokio::test]
    async fn cancel_never_calls_the_api() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voted");
        FileFlag::new(&path).set().unwrap();

        let mut widget = VoteWidget::new(FakeApi::at(3), FileFlag::new(&path));
        assert_eq!(widget.state(), WidgetState::Voted);
        widget.cancel().unwrap();

        assert_eq!(widget.state(), WidgetState::Unvoted);
        assert!(!path.exists());
        assert_eq!(widget.api.votes.load(Ordering::SeqCst), 0);
        assert_eq!(*widget.api.count.lock().unwrap(), 3);
    }

    #[test]
    fn file_flag_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let flag = FileFlag::new(dir.path().join("voted"));

        assert!(!flag.is_set());
        flag.set().unwrap();
        assert!(flag.is_set());
        flag.clear().unwrap();
        assert!(!flag.is_set());
        flag.clear().unwrap();
    }

    #[test]
    fn file_flag_ignores_other_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voted");
        std::fs::write(&path, "yes").unwrap();

        assert!(!FileFlag::new(path).is_set());
    }

    async fn serve_sheet(sheet: Arc<FakeSheet>) -> String {
        let app = crate::server::router(AppState {
            store: Arc::new(SheetVoteStore::new(sheet)),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn http_api_reads_and_votes_through_server() {
        let base = serve_sheet(Arc::new(FakeSheet::holding("1300"))).await;
        let api = HttpVoteApi::new(&base).unwrap();

        assert_eq!(api.fetch_count().await.unwrap(), 1300);
        assert_eq!(api.cast_vote().await.unwrap(), 1301);
        assert_eq!(api.fetch_count().await.unwrap(), 1301);
    }

    #[tokio::test]
    async fn http_api_surfaces_server_message() {
        let base = serve_sheet(Arc::new(FakeSheet {
            fail_writes: true,
            ..Default::default()
        }))
        .await;
        let api = HttpVoteApi::new(&base).unwrap();

        match api.cast_vote().await {
            Err(WidgetError::Rejected(message)) => assert!(message.contains("Quota exceeded")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_api_is_transport_error() {
        let api = HttpVoteApi::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(api.fetch_count().await, Err(WidgetError::Transport(_))));
    }

    #[test]
    fn http_api_rejects_bad_base() {
        assert!(matches!(
            HttpVoteApi::new("::nope"),
            Err(WidgetError::InvalidUrl(_))
        ));
    }
}
