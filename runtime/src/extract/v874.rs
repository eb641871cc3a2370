//! Extractor for the 8.7.4 markup family.
//!
//! Field sources on the auction page, for the record: current bid and the
//! minimum/deficit cells are numeric DOM cells; the multiplier, bid-able
//! planet resources and the player's own bid are inline-script JSON
//! assignments; the end time is either a literal countdown (`#nextAuction`,
//! present once the auction finished) or derived from the free-text
//! "approx. N minutes" sentence. All of them are required — if one is
//! missing the whole extraction fails with that field's name.

use super::{parse_amount, script_var, select_text, Extractor};
use crate::errors::DecodeError;
use crate::snapshot::{
    AuctionState, CelestialResources, Multiplier, OfferOfTheDayState, PageMarkers, ResourcesState,
};
use scraper::{Html, Selector};
use std::collections::HashMap;

/// Markup version 8.7.4.
pub struct V874;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector is valid")
}

impl Extractor for V874 {
    fn version(&self) -> &'static str {
        "8.7.4"
    }

    fn auction(&self, html: &str) -> Result<AuctionState, DecodeError> {
        let document = Html::parse_document(html);

        // A present #nextAuction block means the current auction already
        // finished and its text is the countdown to the next one.
        let (has_finished, endtime) =
            if let Some(text) = select_text(&document, &selector("#nextAuction")) {
                (true, parse_amount(&text).unwrap_or(0))
            } else {
                let approx = select_text(&document, &selector("p.auction_info b"))
                    .ok_or_else(|| DecodeError::missing("endtime"))?;
                let re = regex::Regex::new(r"[^\d]*(\d+)").expect("minutes pattern is valid");
                let minutes = re
                    .captures(&approx)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<i64>().ok())
                    .ok_or_else(|| {
                        DecodeError::new("endtime", format!("no minute count in {approx:?}"))
                    })?;
                (false, minutes * 60)
            };

        let current_bid = select_text(&document, &selector("div.currentSum"))
            .and_then(|t| parse_amount(&t))
            .ok_or_else(|| DecodeError::missing("currentBid"))?;

        let bidder_sel = selector("a.currentPlayer");
        let highest_bidder = select_text(&document, &bidder_sel).unwrap_or_default();
        let highest_bidder_id = document
            .select(&bidder_sel)
            .next()
            .and_then(|el| el.value().attr("data-player-id"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let num_bids = select_text(&document, &selector("div.numberOfBids"))
            .and_then(|t| parse_amount(&t))
            .unwrap_or(0);
        let inventory = select_text(&document, &selector("span.level.amount"))
            .and_then(|t| parse_amount(&t))
            .unwrap_or(0);

        let current_item = document
            .select(&selector("img"))
            .next()
            .and_then(|el| el.value().attr("alt"))
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        let current_item_long = document
            .select(&selector("div.image_140px a"))
            .next()
            .and_then(|el| el.value().attr("title"))
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        let resource_multiplier: Multiplier = decode_script_json(
            html,
            r"multiplier\s?=\s?([^;]+);",
            "multiplier",
        )?;

        let token = script_var(html, r#"token\s?=\s?"([^"]+)";"#)
            .ok_or_else(|| DecodeError::missing("token"))?;

        let resources: HashMap<String, CelestialResources> = decode_script_json(
            html,
            r"planetResources\s?=\s?([^;]+);",
            "planetResources",
        )?;

        // `var playerBid = false;` when this player has not bid yet.
        let player_bid = script_var(html, r"var playerBid\s?=\s?([^;]+);")
            .ok_or_else(|| DecodeError::missing("playerBid"))?;
        let already_bid = if player_bid.trim() == "false" {
            0
        } else {
            parse_amount(&player_bid).unwrap_or(0)
        };

        let minimum_bid =
            select_text(&document, &selector("table.table_ressources_sum tr td.auctionInfo.js_price"))
                .and_then(|t| parse_amount(&t))
                .ok_or_else(|| DecodeError::missing("minimumBid"))?;

        // Raw passthrough: the upstream fills this cell with a placeholder
        // constant when nobody outbid the player. Bidding policy belongs to
        // the caller: max(deficit_bid, minimum_bid - already_bid).
        let deficit_bid =
            select_text(&document, &selector("table.table_ressources_sum tr td.auctionInfo.js_deficit"))
                .and_then(|t| parse_amount(&t))
                .ok_or_else(|| DecodeError::missing("deficitBid"))?;

        Ok(AuctionState {
            has_finished,
            endtime,
            highest_bidder,
            highest_bidder_id,
            num_bids,
            current_bid,
            already_bid,
            inventory,
            current_item,
            current_item_long,
            resource_multiplier,
            resources,
            token,
            minimum_bid,
            deficit_bid,
        })
    }

    fn offer_of_the_day(&self, html: &str) -> Result<OfferOfTheDayState, DecodeError> {
        let document = Html::parse_document(html);

        let price = select_text(&document, &selector("div.js_import_price"))
            .and_then(|t| parse_amount(&t))
            .ok_or_else(|| DecodeError::missing("price"))?;

        let import_token = script_var(html, r#"var token\s?=\s?"([^"]*)";"#)
            .ok_or_else(|| DecodeError::missing("importToken"))?;

        let planet_resources: HashMap<String, CelestialResources> = decode_script_json(
            html,
            r"var planetResources\s?=\s?(\{[^;]*\});",
            "planetResources",
        )?;

        let multiplier: Multiplier = decode_script_json(
            html,
            r"var multiplier\s?=\s?(\{[^;]*\});",
            "multiplier",
        )?;

        Ok(OfferOfTheDayState {
            price,
            import_token,
            planet_resources,
            multiplier,
        })
    }

    fn resources(&self, html: &str) -> Result<ResourcesState, DecodeError> {
        let document = Html::parse_document(html);
        let cell = |id: &str, field: &'static str| -> Result<i64, DecodeError> {
            select_text(&document, &selector(&format!("span#resources_{id}")))
                .and_then(|t| parse_amount(&t))
                .ok_or_else(|| DecodeError::missing(field))
        };
        Ok(ResourcesState {
            metal: cell("metal", "metal")?,
            crystal: cell("crystal", "crystal")?,
            deuterium: cell("deuterium", "deuterium")?,
            energy: cell("energy", "energy")?,
            dark_matter: cell("darkmatter", "darkMatter")?,
        })
    }

    fn page_markers(&self, html: &str) -> PageMarkers {
        let document = Html::parse_document(html);

        let logged_in = document
            .select(&selector(r#"meta[name="game-session"]"#))
            .next()
            .is_some();

        // The attack alert is rendered on every in-game page; "soon" means
        // an incoming fleet was detected.
        let under_attack = document
            .select(&selector("#attack_alert"))
            .next()
            .map(|el| el.value().classes().any(|c| c == "soon"));

        let vacation_mode = document
            .select(&selector("#advice-bar"))
            .next()
            .map(|el| el.select(&selector("div.vacation")).next().is_some());

        PageMarkers {
            logged_in,
            under_attack,
            vacation_mode,
        }
    }
}

/// Decode an inline-script JSON assignment into a typed value, reporting
/// both "assignment missing" and "invalid JSON" against the same field.
fn decode_script_json<T: serde::de::DeserializeOwned>(
    html: &str,
    pattern: &str,
    field: &'static str,
) -> Result<T, DecodeError> {
    let raw = script_var(html, pattern).ok_or_else(|| DecodeError::missing(field))?;
    serde_json::from_str(&raw).map_err(|e| DecodeError::new(field, e.to_string()))
}
