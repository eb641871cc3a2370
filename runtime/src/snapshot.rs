//! Immutable decoded views of upstream game state.
//!
//! A snapshot is what an extractor produces from one fetched page: plain
//! data, no behavior. Every field is required unless it is an `Option` —
//! a missing required field is a decode failure in the extractor, never a
//! silently defaulted value here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-resource multiplier applied to auction bids, rendered by the
/// upstream as an inline-script JSON assignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Multiplier {
    pub metal: f64,
    pub crystal: f64,
    pub deuterium: f64,
    #[serde(default)]
    pub honor: f64,
}

/// Raw metal/crystal/deuterium amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceAmounts {
    pub metal: i64,
    pub crystal: i64,
    pub deuterium: i64,
}

/// Resources available on one planet or moon, as the upstream renders them
/// in the `planetResources` inline-script JSON blob.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CelestialResources {
    pub input: ResourceAmounts,
    #[serde(default)]
    pub output: ResourceAmounts,
    #[serde(rename = "isMoon", default)]
    pub is_moon: bool,
    #[serde(default)]
    pub name: String,
}

/// Decoded state of the auctioneer page.
///
/// `deficit_bid` is a raw passthrough of the upstream's numeric cell,
/// including the placeholder constant it shows when the auction is
/// uncontested. The correct next bid is a caller-side policy:
/// `max(deficit_bid, minimum_bid - already_bid)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionState {
    /// True when the current auction already finished; `endtime` is then
    /// the countdown until the next auction starts.
    pub has_finished: bool,
    /// Seconds until the auction ends (or until the next one starts).
    pub endtime: i64,
    pub highest_bidder: String,
    pub highest_bidder_id: i64,
    pub num_bids: i64,
    /// Current total bid, thousands separators stripped.
    pub current_bid: i64,
    /// What this player already bid; 0 when the page reports no bid.
    pub already_bid: i64,
    pub inventory: i64,
    pub current_item: String,
    pub current_item_long: String,
    pub resource_multiplier: Multiplier,
    /// Bid-able resources per celestial id.
    pub resources: HashMap<String, CelestialResources>,
    /// Form token required to place a bid.
    pub token: String,
    pub minimum_bid: i64,
    pub deficit_bid: i64,
}

/// Decoded state of the daily import offer page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferOfTheDayState {
    /// Price of the offer, thousands separators stripped.
    pub price: i64,
    /// Form token required to buy the offer.
    pub import_token: String,
    pub planet_resources: HashMap<String, CelestialResources>,
    pub multiplier: Multiplier,
}

/// Resource bar amounts from any in-game page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesState {
    pub metal: i64,
    pub crystal: i64,
    pub deuterium: i64,
    pub energy: i64,
    pub dark_matter: i64,
}

/// Consistent view of the session taken between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub logged_in: bool,
    pub under_attack: bool,
    pub vacation_mode: bool,
    /// Detected client version tag, once authenticated.
    pub version: Option<String>,
}

/// Handle returned when login hits an interactive challenge.
///
/// The caller resolves it out of band and calls `solve_challenge` with the
/// id and the chosen answer; artifacts are carried here so the solver needs
/// no direct upstream access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChallenge {
    pub id: String,
    /// Base64-encoded challenge image, when the upstream provided one.
    pub image_base64: Option<String>,
}

impl PendingChallenge {
    /// Decoded challenge image bytes. `None` when the upstream sent no
    /// image or the payload is not valid base64.
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        use base64::Engine;
        self.image_base64
            .as_deref()
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
    }
}

/// Session markers parsed opportunistically from any fetched page.
///
/// `None` means the marker was absent and the corresponding flag must keep
/// its previous value; a dedicated request is never issued for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageMarkers {
    pub logged_in: bool,
    pub under_attack: Option<bool>,
    pub vacation_mode: Option<bool>,
}
