//! Session state machine for the shared game login.
//!
//! Exactly one `Session` exists per bot instance. It owns the credentials,
//! the cookie jar, the detected client version and the derived status
//! flags, and it is mutated only by the scheduler's worker — callers never
//! touch it directly.
//!
//! States: `Unauthenticated → Authenticating → Authenticated →
//! (Expired | ChallengeRequired) → Authenticating`. Expiry is recoverable
//! (one automatic re-login per operation); a challenge is recoverable via
//! the out-of-band solve flow; bad credentials are terminal.

use crate::config::BotConfig;
use crate::errors::{BotError, DecodeError};
use crate::events::{BotEvent, EventBus};
use crate::extract::{detect_version, Extractor, ExtractorRegistry};
use crate::http::{HttpClient, HttpResponse};
use crate::snapshot::{PageMarkers, PendingChallenge, SessionStatus};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use totp_lite::{totp_custom, Sha1};
use tracing::{debug, info, warn};

/// How recently the session must have seen a successful page for
/// `ensure_authenticated` to skip the login round trip.
const RECENT_ACTIVITY: Duration = Duration::from_secs(5 * 60);

/// One-time-code period and length. Codes are computed fresh per attempt.
const OTP_PERIOD: u64 = 30;
const OTP_DIGITS: u32 = 6;

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    /// A fetched page showed the upstream dropped the login.
    Expired,
    /// Login is blocked on an interactive challenge.
    ChallengeRequired,
}

/// The one shared session. See the module docs for ownership rules.
pub struct Session {
    config: BotConfig,
    http: HttpClient,
    registry: Arc<ExtractorRegistry>,
    events: Arc<EventBus>,
    state: SessionState,
    version: Option<String>,
    extractor: Option<Arc<dyn Extractor>>,
    last_activity: Option<Instant>,
    pending_challenge: Option<PendingChallenge>,
    under_attack: bool,
    vacation_mode: bool,
}

impl Session {
    /// Create an unauthenticated session. No network traffic happens here.
    pub fn new(config: BotConfig, registry: Arc<ExtractorRegistry>, events: Arc<EventBus>) -> Self {
        let http = HttpClient::new(config.timeout_ms);
        Self {
            config,
            http,
            registry,
            events,
            state: SessionState::Unauthenticated,
            version: None,
            extractor: None,
            last_activity: None,
            pending_challenge: None,
            under_attack: false,
            vacation_mode: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Consistent status snapshot; the scheduler only exposes this between
    /// tasks, never mid-request.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            logged_in: self.state == SessionState::Authenticated,
            under_attack: self.under_attack,
            vacation_mode: self.vacation_mode,
            version: self.version.clone(),
        }
    }

    /// The challenge handle from the last conflicted login attempt.
    pub fn pending_challenge(&self) -> Option<&PendingChallenge> {
        self.pending_challenge.as_ref()
    }

    /// The extractor matching the session's detected client version.
    pub fn extractor(&self) -> Result<Arc<dyn Extractor>, BotError> {
        self.extractor.clone().ok_or(BotError::NotLoggedIn)
    }

    pub fn vacation_mode(&self) -> bool {
        self.vacation_mode
    }

    // ── Login flow ───────────────────────────────────────────────────────

    /// Authenticate against the upstream and detect the client version.
    ///
    /// A conflict response transitions to `ChallengeRequired` and returns
    /// the challenge id in the error; resolve it with [`solve_challenge`]
    /// (Session::solve_challenge). Bad credentials are terminal.
    pub async fn login(&mut self) -> Result<(), BotError> {
        self.state = SessionState::Authenticating;
        self.events.emit(BotEvent::LoginStarted {
            username: self.config.username.clone(),
        });

        let result = self.login_inner().await;
        match &result {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                info!(version = ?self.version, "login succeeded");
            }
            Err(BotError::ChallengeRequired { .. }) => {
                self.state = SessionState::ChallengeRequired;
            }
            Err(e) => {
                self.state = SessionState::Unauthenticated;
                warn!("login failed: {e}");
            }
        }
        self.events.emit(BotEvent::LoginComplete {
            success: result.is_ok(),
        });
        result
    }

    async fn login_inner(&mut self) -> Result<(), BotError> {
        let codes = self.otp_codes()?;
        let (current, previous) = match codes {
            Some((c, p)) => (Some(c), Some(p)),
            None => (None, None),
        };

        let resp = self.post_credentials(current).await?;
        match resp.status {
            409 => return Err(self.challenge_from(&resp).await),
            400 | 401 | 403 => {
                // One step of clock-skew tolerance: retry once with the
                // previous period's code before giving up.
                let Some(previous) = previous else {
                    return Err(BotError::BadCredentials);
                };
                debug!("login rejected, retrying once with previous-step code");
                let retry = self.post_credentials(Some(previous)).await?;
                match retry.status {
                    409 => return Err(self.challenge_from(&retry).await),
                    s if (200..300).contains(&s) => {}
                    _ => return Err(BotError::BadCredentials),
                }
            }
            s if (200..300).contains(&s) => {}
            s => return Err(BotError::Transport(format!("login returned HTTP {s}"))),
        }

        self.bootstrap().await
    }

    /// Fetch the landing page, detect the client version and bind the
    /// matching extractor. An unknown version is surfaced here, at login
    /// time, and is never mapped to a "closest" extractor.
    async fn bootstrap(&mut self) -> Result<(), BotError> {
        let url = self.game_url();
        let page = self
            .http
            .get(&url, &[("page", "ingame"), ("component", "overview")])
            .await?;

        let tag =
            detect_version(&page.body).ok_or_else(|| DecodeError::missing("gameVersion"))?;
        let extractor = self.registry.extractor_for(&tag)?;

        let markers = extractor.page_markers(&page.body);
        if !markers.logged_in {
            return Err(BotError::NotLoggedIn);
        }
        self.apply_markers(&markers);
        self.version = Some(tag);
        self.extractor = Some(extractor);
        self.last_activity = Some(Instant::now());
        self.pending_challenge = None;
        Ok(())
    }

    async fn post_credentials(&self, otp: Option<String>) -> Result<HttpResponse, BotError> {
        let url = format!("{}/api/users", self.config.server_url);
        let form = vec![
            ("email".to_string(), self.config.username.clone()),
            ("password".to_string(), self.config.password.clone()),
            ("language".to_string(), self.config.language.clone()),
        ];
        let headers: Vec<(String, String)> = otp
            .map(|code| vec![("x-otp-code".to_string(), code)])
            .unwrap_or_default();
        self.http.post_form(&url, &[], &form, &headers).await
    }

    /// Turn a login conflict into a pending-challenge handle, fetching the
    /// challenge artifacts eagerly so the out-of-band solver needs no
    /// direct upstream access.
    async fn challenge_from(&mut self, resp: &HttpResponse) -> BotError {
        let Some(id) = resp.header("gf-challenge-id").map(str::to_string) else {
            return BotError::Transport("login conflict without challenge id".to_string());
        };
        let url = format!("{}/challenge/{}", self.config.server_url, id);
        let image_base64 = match self.http.get(&url, &[]).await {
            Ok(resp) => serde_json::from_str::<serde_json::Value>(&resp.body)
                .ok()
                .and_then(|v| v["question"].as_str().map(str::to_string)),
            Err(e) => {
                warn!("failed to fetch challenge artifacts: {e}");
                None
            }
        };
        self.pending_challenge = Some(PendingChallenge {
            id: id.clone(),
            image_base64,
        });
        self.events.emit(BotEvent::ChallengeRequired {
            challenge_id: id.clone(),
        });
        BotError::ChallengeRequired { challenge_id: id }
    }

    /// Submit a challenge answer, then re-attempt login.
    pub async fn solve_challenge(
        &mut self,
        challenge_id: &str,
        answer: &str,
    ) -> Result<(), BotError> {
        let url = format!("{}/challenge/{}", self.config.server_url, challenge_id);
        let resp = self
            .http
            .post_json(&url, &serde_json::json!({ "answer": answer }))
            .await?;
        let success = (200..300).contains(&resp.status);
        self.events.emit(BotEvent::ChallengeSolved {
            challenge_id: challenge_id.to_string(),
            success,
        });
        if !success {
            return Err(BotError::ChallengeFailed {
                challenge_id: challenge_id.to_string(),
            });
        }
        self.pending_challenge = None;
        self.login().await
    }

    /// Drop the upstream session (best effort) and forget all derived state.
    pub async fn logout(&mut self) -> Result<(), BotError> {
        if self.state == SessionState::Authenticated {
            let url = self.game_url();
            if let Err(e) = self.http.get(&url, &[("page", "logout")]).await {
                warn!("logout request failed: {e}");
            }
        }
        self.state = SessionState::Unauthenticated;
        self.version = None;
        self.extractor = None;
        self.last_activity = None;
        self.events.emit(BotEvent::LoggedOut);
        Ok(())
    }

    /// No-op when authenticated and recently active; otherwise a full login.
    pub async fn ensure_authenticated(&mut self) -> Result<(), BotError> {
        let recent = self
            .last_activity
            .map(|t| t.elapsed() < RECENT_ACTIVITY)
            .unwrap_or(false);
        if self.state == SessionState::Authenticated && recent {
            return Ok(());
        }
        self.login().await
    }

    // ── Page traffic ─────────────────────────────────────────────────────

    /// GET a game page by `page`/`component` query parameters.
    pub async fn fetch_page(&mut self, params: &[(&str, &str)]) -> Result<String, BotError> {
        self.page_request(params, None).await
    }

    /// Replay one of the site's forms against a game page.
    pub async fn post_page(
        &mut self,
        params: &[(&str, &str)],
        payload: &[(String, String)],
    ) -> Result<String, BotError> {
        self.page_request(params, Some(payload)).await
    }

    /// Shared request path. An authentication-required response triggers
    /// exactly one re-login, after which the operation is retried exactly
    /// once; a second expiry surfaces `NotLoggedIn`.
    ///
    /// The session markers only exist on rendered documents. Action
    /// endpoints (`asJson=1`) answer with a JSON body, and treating one as
    /// an expired page would re-login and replay a state-mutating POST, so
    /// expiry detection is gated on the response being an HTML document.
    async fn page_request(
        &mut self,
        params: &[(&str, &str)],
        payload: Option<&[(String, String)]>,
    ) -> Result<String, BotError> {
        self.ensure_authenticated().await?;

        let mut reauthenticated = false;
        loop {
            let url = self.game_url();
            let resp = match payload {
                None => self.http.get(&url, params).await?,
                Some(form) => self.http.post_form(&url, params, form, &[]).await?,
            };

            if is_html_document(&resp.body) {
                let extractor = self.extractor()?;
                let markers = extractor.page_markers(&resp.body);
                if !markers.logged_in {
                    if reauthenticated {
                        return Err(BotError::NotLoggedIn);
                    }
                    warn!("session expired mid-operation, re-authenticating once");
                    self.state = SessionState::Expired;
                    self.events.emit(BotEvent::SessionExpired);
                    self.login().await?;
                    reauthenticated = true;
                    continue;
                }
                self.apply_markers(&markers);
            }

            self.last_activity = Some(Instant::now());
            return Ok(resp.body);
        }
    }

    /// Update status flags from page markers, without a dedicated request.
    /// Absent markers leave the previous values untouched.
    fn apply_markers(&mut self, markers: &PageMarkers) {
        let mut changed = false;
        if let Some(under_attack) = markers.under_attack {
            changed |= under_attack != self.under_attack;
            self.under_attack = under_attack;
        }
        if let Some(vacation_mode) = markers.vacation_mode {
            changed |= vacation_mode != self.vacation_mode;
            self.vacation_mode = vacation_mode;
        }
        if changed {
            self.events.emit(BotEvent::StatusFlags {
                under_attack: self.under_attack,
                vacation_mode: self.vacation_mode,
            });
        }
    }

    fn game_url(&self) -> String {
        format!("{}/game/index.php", self.config.server_url)
    }

    // ── One-time codes ───────────────────────────────────────────────────

    /// Current and previous-step codes, computed fresh for this attempt.
    fn otp_codes(&self) -> Result<Option<(String, String)>, BotError> {
        let Some(secret) = &self.config.otp_secret else {
            return Ok(None);
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let current = totp_at(secret, now)?;
        let previous = totp_at(secret, now.saturating_sub(OTP_PERIOD))?;
        Ok(Some((current, previous)))
    }
}

/// Whether a response body is a rendered document, as opposed to the JSON
/// bodies that action endpoints answer with.
fn is_html_document(body: &str) -> bool {
    body.trim_start().starts_with('<')
}

/// Compute the one-time code for a base32 secret at a given unix time.
pub(crate) fn totp_at(secret_b32: &str, unix_secs: u64) -> Result<String, BotError> {
    let normalized = secret_b32.replace(' ', "").to_uppercase();
    let key = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &normalized)
        .ok_or_else(|| BotError::Config("OTP secret is not valid base32".to_string()))?;
    Ok(totp_custom::<Sha1>(OTP_PERIOD, OTP_DIGITS, &key, unix_secs))
}
