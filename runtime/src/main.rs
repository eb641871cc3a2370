// Copyright 2026 Vega Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::collections::HashMap;
use vega_runtime::bot::Bot;
use vega_runtime::config::BotConfig;
use vega_runtime::snapshot::ResourceAmounts;

#[derive(Parser)]
#[command(
    name = "vega",
    about = "Vega — headless client for a persistent browser strategy game",
    version,
    after_help = "Credentials come from VEGA_* environment variables.\n\
                  Run 'vega <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and show session status
    Status,
    /// Fetch and decode the current auction
    Auction,
    /// Fetch and decode the daily import offer
    Offer,
    /// Show the resource bar amounts
    Resources,
    /// Place an auction bid, offering resources from one celestial
    Bid {
        /// Celestial id offering the resources
        celestial: String,
        #[arg(long, default_value = "0")]
        metal: i64,
        #[arg(long, default_value = "0")]
        crystal: i64,
        #[arg(long, default_value = "0")]
        deuterium: i64,
    },
    /// Buy the daily import offer at its listed price
    BuyOffer,
    /// Show the scheduler queue
    Tasks,
    /// Fetch a raw game page by query parameters (key=value pairs)
    Page {
        /// Query parameters, e.g. "page=ingame" "component=overview"
        params: Vec<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "vega", &mut std::io::stdout());
        return Ok(());
    }

    let config = BotConfig::from_env()?;
    let bot = Bot::new(config);
    let result = run_command(&bot, cli.command, cli.json).await;
    bot.shutdown();

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    result
}

async fn run_command(bot: &Bot, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Status => {
            bot.login().await?;
            let status = bot.status().await?;
            if json {
                print_json(&status)?;
            } else {
                println!("logged in:     {}", status.logged_in);
                println!("under attack:  {}", status.under_attack);
                println!("vacation mode: {}", status.vacation_mode);
                println!(
                    "version:       {}",
                    status.version.as_deref().unwrap_or("unknown")
                );
            }
        }
        Commands::Auction => {
            let auction = bot.auction().await?;
            if json {
                print_json(&auction)?;
            } else if auction.has_finished {
                println!("auction finished; next starts in {}s", auction.endtime);
            } else {
                println!("item:        {}", auction.current_item);
                println!("current bid: {} ({} bids)", auction.current_bid, auction.num_bids);
                println!("highest:     {}", auction.highest_bidder);
                println!("already bid: {}", auction.already_bid);
                println!("minimum bid: {}", auction.minimum_bid);
                println!("ends in:     {}s", auction.endtime);
            }
        }
        Commands::Offer => {
            let offer = bot.offer_of_the_day().await?;
            if json {
                print_json(&offer)?;
            } else {
                println!("price: {}", offer.price);
            }
        }
        Commands::Resources => {
            let resources = bot.resources().await?;
            if json {
                print_json(&resources)?;
            } else {
                println!("metal:       {}", resources.metal);
                println!("crystal:     {}", resources.crystal);
                println!("deuterium:   {}", resources.deuterium);
                println!("energy:      {}", resources.energy);
                println!("dark matter: {}", resources.dark_matter);
            }
        }
        Commands::Bid {
            celestial,
            metal,
            crystal,
            deuterium,
        } => {
            let mut offers = HashMap::new();
            offers.insert(
                celestial,
                ResourceAmounts {
                    metal,
                    crystal,
                    deuterium,
                },
            );
            bot.place_auction_bid(offers).await?;
            println!("bid placed");
        }
        Commands::BuyOffer => {
            bot.buy_offer_of_the_day().await?;
            println!("offer bought");
        }
        Commands::Tasks => {
            let tasks = bot.tasks();
            if json {
                print_json(&tasks)?;
            } else if tasks.is_empty() {
                println!("queue empty ({} waiting)", bot.queue_depth());
            } else {
                for task in tasks {
                    println!("#{} priority {} queued {}ms", task.id, task.priority, task.queued_ms);
                }
            }
        }
        Commands::Page { params } => {
            let mut parsed = Vec::new();
            for param in &params {
                let Some((key, value)) = param.split_once('=') else {
                    bail!("page parameters must be key=value, got '{param}'");
                };
                parsed.push((key.to_string(), value.to_string()));
            }
            let html = bot.page_content(parsed).await?;
            println!("{html}");
        }
        // Handled in main, before the runtime is built.
        Commands::Completions { .. } => {}
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
