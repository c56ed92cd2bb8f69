//! Run one browse mode against live TMDB and print the pipeline output.
//! Usage:
//!   cargo run --bin pipeline_props -- search <title>
//!   cargo run --bin pipeline_props -- trending <day|week>
//!   cargo run --bin pipeline_props -- random [count]
//!   cargo run --bin pipeline_props -- on-this-day [MM-DD]
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use chrono::Datelike;
use dotenvy::dotenv;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reelscout::config::Config;
use reelscout::feed::{self, Feed};
use reelscout::models::MediaCard;
use reelscout::pipeline::{MonthDay, PipelineConfig, RatingRange};
use reelscout::tmdb::{TmdbClient, TrendingWindow};
use serde_json::json;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Search,
    Trending,
    Random,
    OnThisDay,
}

impl FromStr for Mode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "search" => Ok(Mode::Search),
            "trending" => Ok(Mode::Trending),
            "random" => Ok(Mode::Random),
            "on-this-day" => Ok(Mode::OnThisDay),
            _ => Err(anyhow::anyhow!(
                "mode must be 'search', 'trending', 'random' or 'on-this-day'"
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin pipeline_props -- search <title>");
        eprintln!("       cargo run --bin pipeline_props -- trending <day|week>");
        eprintln!("       cargo run --bin pipeline_props -- random [count]");
        eprintln!("       cargo run --bin pipeline_props -- on-this-day [MM-DD]");
        std::process::exit(1);
    }

    let mode = Mode::from_str(&args[1])?;
    let arg = args.get(2).map(String::as_str);
    let config = Config::from_env()?;
    let tmdb = TmdbClient::from_config(&config)?;

    let (feed, pipeline) = match mode {
        Mode::Search => {
            let query = args[2..].join(" ");
            if query.trim().is_empty() {
                anyhow::bail!("search needs a title");
            }
            (Feed::Search { query }, PipelineConfig::single_page())
        }
        Mode::Trending => {
            let window: TrendingWindow = arg.unwrap_or("week").parse()?;
            let pipeline = PipelineConfig {
                require_poster: true,
                ..PipelineConfig::single_page()
            };
            (Feed::Trending(window), pipeline)
        }
        Mode::Random => {
            let count: usize = arg
                .unwrap_or("3")
                .parse()
                .context("count must be an integer")?;
            let pipeline = PipelineConfig {
                require_poster: true,
                require_overview: true,
                rating_range: Some(RatingRange::default()),
                sample_count: Some(count),
                ..PipelineConfig::multi_page()
            }
            .with_blocklist(&config.title_blocklist);
            (Feed::Popular, pipeline)
        }
        Mode::OnThisDay => {
            let month_day = match arg {
                Some(s) => s.parse()?,
                None => MonthDay::today(),
            };
            let latest = chrono::Local::now().year();
            let pipeline = PipelineConfig {
                require_poster: true,
                rating_range: Some(RatingRange::default()),
                date_match: Some(month_day),
                page_limit: config.on_this_day_years,
                ..PipelineConfig::single_page()
            }
            .with_blocklist(&config.title_blocklist);
            (
                Feed::on_this_day(month_day, latest, config.on_this_day_years),
                pipeline,
            )
        }
    };

    let items = feed::collect(&tmdb, &feed, &pipeline, &mut StdRng::from_entropy()).await?;
    let cards: Vec<MediaCard> = items.iter().map(MediaCard::from).collect();
    let output = json!({
        "mode": feed.label(),
        "count": cards.len(),
        "items": cards,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
