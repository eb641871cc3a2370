// Copyright 2026 Vega Contributors
// SPDX-License-Identifier: Apache-2.0

//! Public facade over the session and the scheduler.
//!
//! Every public method is one queued task: the facade never touches the
//! [`Session`](crate::session::Session) directly, it only describes work
//! for the worker. Methods therefore compose safely from any number of
//! caller tasks — ordering and exclusivity come from the scheduler.

use crate::config::BotConfig;
use crate::errors::BotError;
use crate::events::{BotEvent, EventBus};
use crate::extract::ExtractorRegistry;
use crate::scheduler::{
    priority, CancelOutcome, Scheduler, TaskId, TaskInfo, TaskOp, TaskOutput,
};
use crate::session::Session;
use crate::snapshot::{
    AuctionState, OfferOfTheDayState, PendingChallenge, ResourceAmounts, ResourcesState,
    SessionStatus,
};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The bot runtime: one game server, one player, one session.
///
/// Cheap to clone; all clones share the same worker and queue.
#[derive(Clone)]
pub struct Bot {
    scheduler: Scheduler,
    events: Arc<EventBus>,
}

impl Bot {
    /// Build a runtime with every client version this build supports.
    pub fn new(config: BotConfig) -> Self {
        Self::with_registry(config, ExtractorRegistry::with_known_versions())
    }

    /// Build a runtime with an explicit extractor registry.
    pub fn with_registry(config: BotConfig, registry: ExtractorRegistry) -> Self {
        let events = Arc::new(EventBus::new(256));
        let session = Session::new(config, Arc::new(registry), Arc::clone(&events));
        let scheduler = Scheduler::spawn(session, Arc::clone(&events));
        Self { scheduler, events }
    }

    /// Subscribe to the runtime's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.events.subscribe()
    }

    // ── Session lifecycle ────────────────────────────────────────────────

    /// Log in. A `ChallengeRequired` error carries the challenge id;
    /// resolve it with [`Bot::solve_challenge`] and the login resumes.
    pub async fn login(&self) -> Result<(), BotError> {
        let op: TaskOp =
            Box::new(|session| async move { session.login().await.map(|_| TaskOutput::Unit) }.boxed());
        self.expect_unit(priority::CRITICAL, op).await
    }

    /// Log out and forget the session's derived state.
    pub async fn logout(&self) -> Result<(), BotError> {
        let op: TaskOp = Box::new(|session| {
            async move { session.logout().await.map(|_| TaskOutput::Unit) }.boxed()
        });
        self.expect_unit(priority::CRITICAL, op).await
    }

    /// Submit an answer to a pending login challenge, then retry the login.
    pub async fn solve_challenge(
        &self,
        challenge_id: &str,
        answer: &str,
    ) -> Result<(), BotError> {
        let challenge_id = challenge_id.to_string();
        let answer = answer.to_string();
        let op: TaskOp = Box::new(move |session| {
            async move {
                session
                    .solve_challenge(&challenge_id, &answer)
                    .await
                    .map(|_| TaskOutput::Unit)
            }
            .boxed()
        });
        self.expect_unit(priority::CRITICAL, op).await
    }

    /// Artifacts of the pending login challenge, when there is one.
    pub async fn pending_challenge(&self) -> Result<Option<PendingChallenge>, BotError> {
        let op: TaskOp = Box::new(|session| {
            async move { Ok(TaskOutput::Challenge(session.pending_challenge().cloned())) }.boxed()
        });
        match self.scheduler.run(priority::CRITICAL, op).await? {
            TaskOutput::Challenge(pending) => Ok(pending),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    // ── Status ───────────────────────────────────────────────────────────

    /// Consistent status snapshot, taken between tasks.
    pub async fn status(&self) -> Result<SessionStatus, BotError> {
        let op: TaskOp =
            Box::new(|session| async move { Ok(TaskOutput::Status(session.status())) }.boxed());
        match self.scheduler.run(priority::NORMAL, op).await? {
            TaskOutput::Status(status) => Ok(status),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    pub async fn is_logged_in(&self) -> Result<bool, BotError> {
        Ok(self.status().await?.logged_in)
    }

    pub async fn is_under_attack(&self) -> Result<bool, BotError> {
        Ok(self.status().await?.under_attack)
    }

    pub async fn is_vacation_mode(&self) -> Result<bool, BotError> {
        Ok(self.status().await?.vacation_mode)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Fetch and decode the auctioneer page.
    pub async fn auction(&self) -> Result<AuctionState, BotError> {
        let op: TaskOp = Box::new(|session| {
            async move {
                let html = session
                    .fetch_page(&[("page", "ajax"), ("component", "traderauctioneer")])
                    .await?;
                let auction = session.extractor()?.auction(&html)?;
                Ok(TaskOutput::Auction(auction))
            }
            .boxed()
        });
        match self.scheduler.run(priority::NORMAL, op).await? {
            TaskOutput::Auction(auction) => Ok(auction),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    /// Fetch and decode the daily import offer page.
    pub async fn offer_of_the_day(&self) -> Result<OfferOfTheDayState, BotError> {
        let op: TaskOp = Box::new(|session| {
            async move {
                let html = session
                    .fetch_page(&[("page", "ajax"), ("component", "traderimportexport")])
                    .await?;
                let offer = session.extractor()?.offer_of_the_day(&html)?;
                Ok(TaskOutput::Offer(offer))
            }
            .boxed()
        });
        match self.scheduler.run(priority::NORMAL, op).await? {
            TaskOutput::Offer(offer) => Ok(offer),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    /// Fetch the overview page and decode the resource bar.
    pub async fn resources(&self) -> Result<ResourcesState, BotError> {
        let op: TaskOp = Box::new(|session| {
            async move {
                let html = session
                    .fetch_page(&[("page", "ingame"), ("component", "overview")])
                    .await?;
                let resources = session.extractor()?.resources(&html)?;
                Ok(TaskOutput::Resources(resources))
            }
            .boxed()
        });
        match self.scheduler.run(priority::NORMAL, op).await? {
            TaskOutput::Resources(resources) => Ok(resources),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    /// Raw page passthrough for callers that decode markup themselves.
    pub async fn page_content(&self, params: Vec<(String, String)>) -> Result<String, BotError> {
        let op: TaskOp = Box::new(move |session| {
            async move {
                let borrowed: Vec<(&str, &str)> =
                    params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                let html = session.fetch_page(&borrowed).await?;
                Ok(TaskOutput::Page(html))
            }
            .boxed()
        });
        match self.scheduler.run(priority::NORMAL, op).await? {
            TaskOutput::Page(html) => Ok(html),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    /// Raw form replay against a game page, returning the response body.
    pub async fn post_page_content(
        &self,
        params: Vec<(String, String)>,
        payload: Vec<(String, String)>,
    ) -> Result<String, BotError> {
        let op: TaskOp = Box::new(move |session| {
            async move {
                let borrowed: Vec<(&str, &str)> =
                    params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                let html = session.post_page(&borrowed, &payload).await?;
                Ok(TaskOutput::Page(html))
            }
            .boxed()
        });
        match self.scheduler.run(priority::NORMAL, op).await? {
            TaskOutput::Page(html) => Ok(html),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }

    // ── Actions ──────────────────────────────────────────────────────────

    /// Place a bid on the running auction, offering resources from the
    /// given celestials.
    ///
    /// Fetches the auction page first for a fresh form token, so the bid
    /// and the token it depends on happen inside one task. How much to bid
    /// is caller policy: the decoded state exposes `minimum_bid`,
    /// `already_bid` and the raw `deficit_bid` cell.
    pub async fn place_auction_bid(
        &self,
        offers: HashMap<String, ResourceAmounts>,
    ) -> Result<(), BotError> {
        let mut total: i64 = 0;
        for amounts in offers.values() {
            if amounts.metal < 0 || amounts.crystal < 0 || amounts.deuterium < 0 {
                return Err(BotError::InvalidParameters("negative resource amount"));
            }
            total += amounts.metal + amounts.crystal + amounts.deuterium;
        }
        if total == 0 {
            return Err(BotError::InvalidParameters("no resources offered"));
        }
        let op: TaskOp = Box::new(move |session| {
            async move {
                if session.vacation_mode() {
                    return Err(BotError::PlayerInVacationMode);
                }
                let params = [("page", "ajax"), ("component", "traderauctioneer")];
                let html = session.fetch_page(&params).await?;
                let auction = session.extractor()?.auction(&html)?;
                if auction.has_finished {
                    return Err(BotError::InvalidParameters("auction already finished"));
                }

                let mut form: Vec<(String, String)> = vec![
                    ("token".to_string(), auction.token.clone()),
                    ("bid[honor]".to_string(), "0".to_string()),
                ];
                for (celestial, amounts) in &offers {
                    form.push((
                        format!("bid[planets][{celestial}][metal]"),
                        amounts.metal.to_string(),
                    ));
                    form.push((
                        format!("bid[planets][{celestial}][crystal]"),
                        amounts.crystal.to_string(),
                    ));
                    form.push((
                        format!("bid[planets][{celestial}][deuterium]"),
                        amounts.deuterium.to_string(),
                    ));
                }
                let post_params = [
                    ("page", "ajax"),
                    ("component", "traderauctioneer"),
                    ("action", "submitBid"),
                    ("asJson", "1"),
                ];
                session.post_page(&post_params, &form).await?;
                Ok(TaskOutput::Unit)
            }
            .boxed()
        });
        self.expect_unit(priority::IMPORTANT, op).await
    }

    /// Buy the daily import offer at its listed price.
    pub async fn buy_offer_of_the_day(&self) -> Result<(), BotError> {
        let op: TaskOp = Box::new(|session| {
            async move {
                if session.vacation_mode() {
                    return Err(BotError::PlayerInVacationMode);
                }
                let params = [("page", "ajax"), ("component", "traderimportexport")];
                let html = session.fetch_page(&params).await?;
                let offer = session.extractor()?.offer_of_the_day(&html)?;

                let form = vec![
                    ("token".to_string(), offer.import_token.clone()),
                    ("price".to_string(), offer.price.to_string()),
                ];
                let post_params = [
                    ("page", "ajax"),
                    ("component", "traderimportexport"),
                    ("action", "trade"),
                    ("asJson", "1"),
                ];
                session.post_page(&post_params, &form).await?;
                Ok(TaskOutput::Unit)
            }
            .boxed()
        });
        self.expect_unit(priority::IMPORTANT, op).await
    }

    // ── Queue management ─────────────────────────────────────────────────

    /// Snapshot of the queued tasks, best-first.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.scheduler.queued_tasks()
    }

    pub fn queue_depth(&self) -> usize {
        self.scheduler.queue_depth()
    }

    /// Cancel a queued task. See [`CancelOutcome`] for the three outcomes.
    pub fn cancel_task(&self, id: TaskId) -> CancelOutcome {
        self.scheduler.cancel(id)
    }

    /// Stop accepting work and fail everything still queued.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Direct scheduler access for callers composing their own task ops.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    async fn expect_unit(&self, prio: u8, op: TaskOp) -> Result<(), BotError> {
        match self.scheduler.run(prio, op).await? {
            TaskOutput::Unit => Ok(()),
            _ => Err(BotError::Internal("unexpected task output")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bot() -> Bot {
        Bot::new(BotConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            username: "pilot@example.com".to_string(),
            password: "hunter2".to_string(),
            otp_secret: None,
            language: "en".to_string(),
            timeout_ms: 250,
        })
    }

    #[tokio::test]
    async fn test_status_without_login() {
        let bot = test_bot();
        let status = bot.status().await.unwrap();
        assert!(!status.logged_in);
        assert_eq!(status.version, None);
        assert!(!bot.is_under_attack().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_bid_is_rejected_without_traffic() {
        let bot = test_bot();
        let err = bot.place_auction_bid(HashMap::new()).await.unwrap_err();
        assert_eq!(err, BotError::InvalidParameters("no resources offered"));

        let mut zero = HashMap::new();
        zero.insert("33620484".to_string(), ResourceAmounts::default());
        let err = bot.place_auction_bid(zero).await.unwrap_err();
        assert_eq!(err, BotError::InvalidParameters("no resources offered"));

        let mut negative = HashMap::new();
        negative.insert(
            "33620484".to_string(),
            ResourceAmounts {
                metal: -5,
                crystal: 0,
                deuterium: 0,
            },
        );
        let err = bot.place_auction_bid(negative).await.unwrap_err();
        assert_eq!(err, BotError::InvalidParameters("negative resource amount"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let bot = test_bot();
        bot.shutdown();
        let err = bot.status().await.unwrap_err();
        assert_eq!(err, BotError::SchedulerClosed);
    }

    #[tokio::test]
    async fn test_no_pending_challenge_initially() {
        let bot = test_bot();
        assert_eq!(bot.pending_challenge().await.unwrap(), None);
    }
}
