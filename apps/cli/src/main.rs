#![deny(warnings)]

//! Headless front-end: loads a goods catalog, plays a scripted sequence of
//! intents and ticks (or runs against the wall clock) and prints the result.

use anyhow::{anyhow, bail, Context, Result};
use factory_core::{load_catalog, load_config, EngineConfig, GoodId};
use factory_runtime::{Intent, Session, SessionSnapshot};
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

const DEFAULT_CATALOG: &str = "assets/goods.json";
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Default)]
struct Args {
    catalog: Option<String>,
    config: Option<String>,
    script: Option<String>,
    realtime: Option<f64>,
    json: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--catalog" => args.catalog = it.next(),
            "--config" => args.config = it.next(),
            "--script" => args.script = it.next(),
            "--realtime" => args.realtime = it.next().and_then(|s| s.parse().ok()),
            "--json" => args.json = true,
            _ => {}
        }
    }
    args
}

/// One scripted action.
#[derive(Debug, PartialEq)]
enum Step {
    Intent(Intent),
    Tick(f64),
}

fn parse_step(text: &str) -> Result<Step> {
    let text = text.trim();
    if text == "sellall" {
        return Ok(Step::Intent(Intent::SellAll));
    }
    let (verb, arg) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("malformed step {text:?}"))?;
    match verb {
        "buy" => Ok(Step::Intent(Intent::BuyFactory(GoodId::from(arg)))),
        "sell" => Ok(Step::Intent(Intent::Sell(GoodId::from(arg)))),
        "tick" => {
            let secs: f64 = arg
                .parse()
                .with_context(|| format!("bad tick duration {arg:?}"))?;
            Ok(Step::Tick(secs))
        }
        other => bail!("unknown step verb {other:?}"),
    }
}

fn parse_script(script: &str) -> Result<Vec<Step>> {
    script
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_step)
        .collect()
}

fn run_script(session: &mut Session, steps: &[Step]) {
    for step in steps {
        match step {
            Step::Intent(intent) => {
                let outcome = session.dispatch(intent);
                info!(?intent, ?outcome, "step");
            }
            Step::Tick(secs) => {
                let snap = session.advance(*secs);
                info!(secs, money = %snap.economy.money, "tick");
            }
        }
    }
}

fn run_realtime(session: &mut Session, seconds: f64) {
    let start = Instant::now();
    session.advance_wall_clock();
    while start.elapsed().as_secs_f64() < seconds {
        std::thread::sleep(FRAME_INTERVAL);
        session.advance_wall_clock();
    }
}

fn render_text(snap: &SessionSnapshot) -> String {
    let mut out = format!(
        "💰 Money: ${:.2} | frames: {} | elapsed: {:.1}s\n",
        snap.economy.money, snap.frame, snap.elapsed_seconds
    );
    for good in snap
        .economy
        .goods
        .iter()
        .filter(|g| snap.is_revealed(&g.id))
    {
        let glyph = good.emoji.as_deref().unwrap_or("•");
        let buy = if good.affordable {
            format!("buy ${}", good.cost)
        } else {
            "not enough money".to_string()
        };
        out.push_str(&format!(
            "{glyph} {} | qty: {} | factories: {} | max +{}/s | {buy} | sell ${} each\n",
            good.name, good.quantity, good.factories, good.production_per_sec, good.sell_price
        ));
    }
    out
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(?args, "starting CLI");

    let catalog_path = args.catalog.as_deref().unwrap_or(DEFAULT_CATALOG);
    let catalog = load_catalog(catalog_path)
        .map_err(|e| {
            error!(path = catalog_path, error = %e, "catalog load failed");
            e
        })
        .with_context(|| format!("loading catalog {catalog_path}"))?;
    let config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading config {path}"))?,
        None => EngineConfig::default(),
    };
    let steps = match &args.script {
        Some(script) => parse_script(script)?,
        None => Vec::new(),
    };

    let mut session = Session::new(catalog, config)?;
    run_script(&mut session, &steps);
    if let Some(seconds) = args.realtime {
        run_realtime(&mut session, seconds);
    }

    let snap = session.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(snap)?);
    } else {
        print!("{}", render_text(snap));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        let steps = parse_script("buy:wood, tick:2.5,sell:wood,sellall").unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Intent(Intent::BuyFactory(GoodId::from("wood"))),
                Step::Tick(2.5),
                Step::Intent(Intent::Sell(GoodId::from("wood"))),
                Step::Intent(Intent::SellAll),
            ]
        );
    }

    #[test]
    fn rejects_bad_steps() {
        assert!(parse_step("explode:wood").is_err());
        assert!(parse_step("tick:soon").is_err());
        assert!(parse_step("wood").is_err());
    }

    #[test]
    fn bundled_catalog_runs_a_script() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../assets/goods.json");
        let catalog = load_catalog(path).unwrap();
        let mut session = Session::new(catalog, EngineConfig::default()).unwrap();
        let steps = parse_script("buy:wood,tick:5,sellall").unwrap();
        run_script(&mut session, &steps);
        let text = render_text(session.snapshot());
        assert!(text.contains("Wood"));
        assert!(text.contains("factories: 1"));
    }
}
