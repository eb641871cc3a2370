//! End-to-end runtime tests against a mock upstream.
//!
//! Covers the full login → fetch → decode path over real HTTP:
//! - login, version detection and auction decoding
//! - credential rejection and the interactive challenge flow
//! - mid-operation session expiry with exactly one automatic re-login
//! - unknown-client-version hard failure
//! - form replay for the auction bid action

use std::collections::HashMap;
use vega_runtime::bot::Bot;
use vega_runtime::config::BotConfig;
use vega_runtime::errors::BotError;
use vega_runtime::events::BotEvent;
use vega_runtime::snapshot::ResourceAmounts;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Page Fixtures ──

fn overview_page(version: &str, vacation: bool) -> String {
    let vacation_block = if vacation {
        r#"<div id="advice-bar"><div class="vacation"></div></div>"#
    } else {
        r#"<div id="advice-bar"></div>"#
    };
    format!(
        r#"<html><head>
        <meta name="game-version" content="{version}"/>
        <meta name="game-session" content="sess-tok"/>
        </head><body>
        <div id="attack_alert" class="tooltip"></div>
        {vacation_block}
        <span id="resources_metal">10,000</span>
        <span id="resources_crystal">5,000</span>
        <span id="resources_deuterium">2,500</span>
        <span id="resources_energy">120</span>
        <span id="resources_darkmatter">8,000</span>
        </body></html>"#
    )
}

fn auction_page() -> String {
    r#"<html><head>
    <meta name="game-session" content="sess-tok"/>
    </head><body>
    <p class="auction_info">Approximately ends in <b>5 minutes</b></p>
    <a class="currentPlayer" data-player-id="106734">Scrap collector</a>
    <div class="numberOfBids">7</div>
    <div class="currentSum">1,234</div>
    <table class="table_ressources_sum"><tr>
        <td class="auctionInfo js_price">1,500</td>
        <td class="auctionInfo js_deficit">1,000</td>
    </tr></table>
    <script>
    var multiplier = {"metal":1,"crystal":2,"deuterium":3};
    var token = "abc";
    var planetResources = {"33620484":{"input":{"metal":100,"crystal":50,"deuterium":25}}};
    var playerBid = false;
    </script>
    </body></html>"#
        .to_string()
}

fn logged_out_page() -> String {
    "<html><head></head><body>Please log in again</body></html>".to_string()
}

fn config_for(server: &MockServer) -> BotConfig {
    BotConfig {
        server_url: server.uri(),
        username: "pilot@example.com".to_string(),
        password: "hunter2".to_string(),
        otp_secret: None,
        language: "en".to_string(),
        timeout_ms: 5_000,
    }
}

async fn mount_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_overview(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/game/index.php"))
        .and(query_param("page", "ingame"))
        .and(query_param("component", "overview"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ── Tests ──

#[tokio::test]
async fn login_detects_version_and_decodes_auction() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    mount_overview(&server, overview_page("8.7.4-pl2", false)).await;
    Mock::given(method("GET"))
        .and(path("/game/index.php"))
        .and(query_param("component", "traderauctioneer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(auction_page()))
        .mount(&server)
        .await;

    let bot = Bot::new(config_for(&server));
    bot.login().await.unwrap();

    let status = bot.status().await.unwrap();
    assert!(status.logged_in);
    assert_eq!(status.version.as_deref(), Some("8.7.4"));
    assert!(!status.under_attack);

    let auction = bot.auction().await.unwrap();
    assert!(!auction.has_finished);
    assert_eq!(auction.endtime, 300);
    assert_eq!(auction.current_bid, 1234);
    assert_eq!(auction.already_bid, 0);
    assert_eq!(auction.token, "abc");

    let resources = bot.resources().await.unwrap();
    assert_eq!(resources.metal, 10_000);
    assert_eq!(resources.energy, 120);
}

#[tokio::test]
async fn rejected_credentials_surface_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let bot = Bot::new(config_for(&server));
    let err = bot.login().await.unwrap_err();
    assert_eq!(err, BotError::BadCredentials);
    assert!(!bot.is_logged_in().await.unwrap());
}

#[tokio::test]
async fn challenge_flow_resolves_and_logs_in() {
    let server = MockServer::start().await;
    // First login attempt conflicts with a challenge; later attempts pass.
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(409).insert_header("gf-challenge-id", "c-42"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_login_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/challenge/c-42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"question":"aW1hZ2UtYnl0ZXM="}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/challenge/c-42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_overview(&server, overview_page("8.7.4", false)).await;

    let bot = Bot::new(config_for(&server));
    let err = bot.login().await.unwrap_err();
    assert_eq!(
        err,
        BotError::ChallengeRequired {
            challenge_id: "c-42".to_string()
        }
    );

    let pending = bot.pending_challenge().await.unwrap().unwrap();
    assert_eq!(pending.id, "c-42");
    assert_eq!(pending.image_base64.as_deref(), Some("aW1hZ2UtYnl0ZXM="));

    bot.solve_challenge("c-42", "3").await.unwrap();
    assert!(bot.is_logged_in().await.unwrap());
}

#[tokio::test]
async fn expired_session_triggers_exactly_one_relogin() {
    let server = MockServer::start().await;
    // Exactly two logins: the initial one and the single recovery.
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    mount_overview(&server, overview_page("8.7.4", false)).await;
    // First auction fetch comes back logged out, the retry succeeds.
    Mock::given(method("GET"))
        .and(path("/game/index.php"))
        .and(query_param("component", "traderauctioneer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(logged_out_page()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/index.php"))
        .and(query_param("component", "traderauctioneer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(auction_page()))
        .mount(&server)
        .await;

    let bot = Bot::new(config_for(&server));
    bot.login().await.unwrap();

    let mut events = bot.subscribe();
    let auction = bot.auction().await.unwrap();
    assert_eq!(auction.current_bid, 1234);

    let mut saw_expired = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, BotEvent::SessionExpired) {
            saw_expired = true;
        }
    }
    assert!(saw_expired);
    server.verify().await;
}

#[tokio::test]
async fn unknown_client_version_fails_login() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    mount_overview(&server, overview_page("9.9.9", false)).await;

    let bot = Bot::new(config_for(&server));
    let err = bot.login().await.unwrap_err();
    assert_eq!(err, BotError::UnsupportedVersion("9.9.9".to_string()));
    assert!(!bot.is_logged_in().await.unwrap());
}

#[tokio::test]
async fn auction_bid_replays_form_with_fresh_token() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    mount_overview(&server, overview_page("8.7.4", false)).await;
    Mock::given(method("GET"))
        .and(path("/game/index.php"))
        .and(query_param("component", "traderauctioneer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(auction_page()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/game/index.php"))
        .and(query_param("action", "submitBid"))
        .and(body_string_contains("token=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(auction_page()))
        .expect(1)
        .mount(&server)
        .await;

    let bot = Bot::new(config_for(&server));
    bot.login().await.unwrap();

    let mut offers = HashMap::new();
    offers.insert(
        "33620484".to_string(),
        ResourceAmounts {
            metal: 1_000,
            crystal: 0,
            deuterium: 0,
        },
    );
    bot.place_auction_bid(offers).await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn json_action_response_is_not_treated_as_expiry() {
    let server = MockServer::start().await;
    // Exactly one login: the JSON-bodied action response carries no session
    // marker, and must not trigger expiry recovery (which would replay the
    // state-mutating POST).
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_overview(&server, overview_page("8.7.4", false)).await;
    Mock::given(method("GET"))
        .and(path("/game/index.php"))
        .and(query_param("component", "traderauctioneer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(auction_page()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/game/index.php"))
        .and(query_param("action", "submitBid"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"success"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let bot = Bot::new(config_for(&server));
    bot.login().await.unwrap();

    let mut offers = HashMap::new();
    offers.insert(
        "33620484".to_string(),
        ResourceAmounts {
            metal: 1_000,
            crystal: 0,
            deuterium: 0,
        },
    );
    bot.place_auction_bid(offers).await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn vacation_mode_blocks_bid_actions() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    mount_overview(&server, overview_page("8.7.4", true)).await;

    let bot = Bot::new(config_for(&server));
    bot.login().await.unwrap();
    assert!(bot.is_vacation_mode().await.unwrap());

    let mut offers = HashMap::new();
    offers.insert(
        "33620484".to_string(),
        ResourceAmounts {
            metal: 1_000,
            crystal: 0,
            deuterium: 0,
        },
    );
    let err = bot.place_auction_bid(offers).await.unwrap_err();
    assert_eq!(err, BotError::PlayerInVacationMode);
}
