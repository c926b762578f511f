//! `vbl simulate`: replay the pipeline over a CSV bar fixture, emit the
//! result as JSON on stdout and optionally the timeline as CSV.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Args;
use rust_decimal::Decimal;

use vbl_domain::EvaluationRecord;
use vbl_ports::SystemClock;
use vbl_sim::{load_csv_file, run_simulation, SimPrice, SimulationRequest};
use vbl_testkit::ScriptedMarketData;

#[derive(Args)]
pub struct SimulateArgs {
    #[arg(long)]
    pub ticker: String,

    /// Inclusive start date (UTC, YYYY-MM-DD).
    #[arg(long)]
    pub from: String,

    /// Inclusive end date (UTC, YYYY-MM-DD).
    #[arg(long)]
    pub to: String,

    /// Initial cash.
    #[arg(long)]
    pub cash: String,

    /// Bar interval in minutes.
    #[arg(long, default_value_t = 60)]
    pub interval: u32,

    #[arg(long, default_value_t = false)]
    pub include_after_hours: bool,

    /// Bar fixture CSV (ts,open,high,low,close,volume[,dividend]).
    #[arg(long)]
    pub bars: PathBuf,

    /// Which bar price drives decisions.
    #[arg(long, default_value = "close")]
    pub sim_price: String,

    /// Write the evaluation timeline to this CSV file.
    #[arg(long)]
    pub timeline_csv: Option<PathBuf>,
}

pub fn execute(args: &SimulateArgs) -> Result<()> {
    let start = parse_date(&args.from).context("--from")?;
    let end_date = parse_date_naive(&args.to).context("--to")?;
    // Inclusive end date: cover the whole day.
    let end = Utc
        .from_utc_datetime(&end_date.and_hms_opt(23, 59, 59).unwrap());
    let cash = Decimal::from_str(&args.cash)
        .with_context(|| format!("--cash: bad decimal {:?}", args.cash))?;
    let sim_price = match args.sim_price.as_str() {
        "close" => SimPrice::Close,
        "open" => SimPrice::Open,
        other => anyhow::bail!("--sim-price must be close|open, got {other:?}"),
    };

    let bars = load_csv_file(&args.bars)
        .with_context(|| format!("load bars from {:?}", args.bars))?;
    let market = Arc::new(ScriptedMarketData::new(Arc::new(SystemClock)));
    market.set_bars(&args.ticker, bars);

    let mut request = SimulationRequest::new(&args.ticker, start, end, cash, args.interval);
    request.include_after_hours = args.include_after_hours;
    request.sim_price = sim_price;

    let run = run_simulation(&request, market).map_err(|e| anyhow::anyhow!("{e}"))?;

    if let Some(path) = &args.timeline_csv {
        write_timeline_csv(path, &run.records)
            .with_context(|| format!("write timeline csv {path:?}"))?;
    }

    println!("{}", serde_json::to_string_pretty(&run.result)?);
    Ok(())
}

fn parse_date(s: &str) -> Result<chrono::DateTime<Utc>> {
    let date = parse_date_naive(s)?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()))
}

fn parse_date_naive(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad date {s:?}"))
}

fn write_timeline_csv(path: &PathBuf, records: &[EvaluationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "timestamp",
        "mode",
        "action",
        "price",
        "anchor_before",
        "anchor_after",
        "delta_pct",
        "trigger_fired",
        "trigger_reason",
        "block_reason",
        "intended_qty",
        "order_id",
        "execution_qty",
        "execution_price",
        "commission",
        "qty_after",
        "cash_after",
        "total_value_after",
        "dividend_amount",
    ])?;

    let opt = |v: &Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_default();
    for r in records {
        writer.write_record([
            r.timestamp.to_rfc3339(),
            format!("{:?}", r.mode).to_uppercase(),
            r.action.as_str().to_string(),
            r.price.to_string(),
            opt(&r.anchor_before),
            opt(&r.anchor_after),
            opt(&r.delta_pct),
            r.trigger_fired.to_string(),
            r.trigger_reason.clone(),
            r.block_reason.clone().unwrap_or_default(),
            opt(&r.intended_qty),
            r.order_id.clone().unwrap_or_default(),
            opt(&r.execution_qty),
            opt(&r.execution_price),
            opt(&r.commission),
            r.qty_after.to_string(),
            r.cash_after.to_string(),
            r.total_value_after.to_string(),
            opt(&r.dividend_amount),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
