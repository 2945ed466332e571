//! retention-runner: headless batch runner for the donor retention matrices.
//!
//! Usage:
//!   retention-runner --db payments.db --out ./out
//!   retention-runner --db payments.db --data-dir ./data --as-of 2025-07
//!   retention-runner --db payments.db --format sheets-json
//!   retention-runner --db payments.db --import feed.csv
//!
//! Reads the full payment mirror, recomputes every retention matrix, and
//! writes one export per variant: plain CSV, or the A1-addressed batch
//! payload a spreadsheet uploader consumes (`--format sheets-json`).

use anyhow::{Context, Result};
use retention_core::{
    config::{ExportConfig, RetentionConfig},
    engine::{FeedBundle, RetentionEngine, RetentionReport, VariantOutcome},
    feed::{normalize, DropStats, Payment, RawPayment},
    grid::{Ratio, RetentionGrid},
    period::Period,
    sink::{
        clear_region, columns_per_cohort, layout_updates, CellUpdate, CellValue, ClearRegion,
        GridSink, RetrySink, SinkError,
    },
    store::PaymentStore,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::{env, fs};

/// Rows cleared past the tallest cohort, so a shrinking grid leaves no
/// stale rows behind in the target.
const CLEAR_PAD_ROWS: u32 = 5;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or_else(|| "payments.db".to_string());
    let out_dir = arg_value(&args, "--out").unwrap_or_else(|| "out".to_string());
    let format = arg_value(&args, "--format").unwrap_or_else(|| "csv".to_string());
    let data_dir = arg_value(&args, "--data-dir");
    let import = arg_value(&args, "--import");
    let as_of = match arg_value(&args, "--as-of") {
        Some(raw) => parse_period(&raw).context("--as-of expects YYYY-MM")?,
        None => Period::from_date(chrono::Local::now().date_naive()),
    };

    let config = match data_dir.as_deref() {
        Some(dir) => RetentionConfig::load(dir)?,
        None => RetentionConfig::builtin(),
    };

    let store = PaymentStore::open(&db)?;
    store.migrate()?;

    if let Some(csv_path) = import {
        let inserted = import_csv(&store, &csv_path)?;
        log::info!("imported {inserted} rows from {csv_path}");
    }

    println!("retention-runner");
    println!("  db:      {db}");
    println!("  as_of:   {as_of}");
    println!("  out:     {out_dir}");
    println!("  format:  {format}");
    println!();

    let feeds = FeedBundle {
        recurring: store.load_recurring(&config.recurring)?,
        all:       store.load_all(&config.all)?,
    };

    let engine = RetentionEngine::new(config);
    let report = engine.run(&feeds, as_of)?;

    fs::create_dir_all(&out_dir).with_context(|| format!("cannot create {out_dir}"))?;

    for outcome in &report.variants {
        if outcome.is_no_data() {
            println!("  (no data for '{}' — export skipped)", outcome.name);
            continue;
        }
        let export = &engine.config().export;
        match format.as_str() {
            "csv" => write_csv_grid(outcome, export, &out_dir)?,
            "sheets-json" => write_sheets_json(outcome, export, &out_dir)?,
            other => anyhow::bail!("unknown --format '{other}' (expected csv or sheets-json)"),
        }
    }

    // Audit copy of the broad feed every matrix was computed from.
    let (all_payments, _) = normalize(&feeds.all, as_of);
    let source_path = format!("{out_dir}/source.csv");
    let written = export_source_feed(&source_path, &all_payments)?;
    println!("  wrote {source_path} ({written} rows)");

    print_summary(&report);
    Ok(())
}

// ── Grid exports ─────────────────────────────────────────────────────────────

/// Cohort start labels one row above each cohort's count column.
fn header_updates(grid: &RetentionGrid, export: &ExportConfig) -> Vec<CellUpdate> {
    if export.start_row < 2 {
        return Vec::new();
    }
    let width = columns_per_cohort(grid.mode);
    grid.cohorts
        .iter()
        .enumerate()
        .map(|(i, cohort)| CellUpdate {
            row:    export.start_row - 1,
            col:    export.first_col + i as u32 * width,
            values: vec![CellValue::Text(cohort.start.to_string())],
        })
        .collect()
}

fn push_grid<S: GridSink>(
    sink: &mut RetrySink<S>,
    grid: &RetentionGrid,
    export: &ExportConfig,
) -> Result<(), SinkError> {
    if let Some(region) = clear_region(grid, export, CLEAR_PAD_ROWS) {
        sink.clear(region)?;
    }
    let mut updates = header_updates(grid, export);
    updates.extend(layout_updates(grid, export));
    sink.write(&updates)
}

fn write_csv_grid(outcome: &VariantOutcome, export: &ExportConfig, out_dir: &str) -> Result<()> {
    let mut sink = RetrySink::new(CsvGridSink::default(), export);
    push_grid(&mut sink, &outcome.grid, export)?;

    let path = format!("{out_dir}/{}.csv", outcome.name);
    sink.into_inner().finish(&path)?;
    println!("  wrote {path}");
    Ok(())
}

fn write_sheets_json(outcome: &VariantOutcome, export: &ExportConfig, out_dir: &str) -> Result<()> {
    let sheet = format!("Retention {}", outcome.name);
    let mut sink = RetrySink::new(SheetsJsonSink::new(sheet, export.start_row), export);
    push_grid(&mut sink, &outcome.grid, export)?;

    let path = format!("{out_dir}/{}.batch.json", outcome.name);
    sink.into_inner().finish(&path)?;
    println!("  wrote {path}");
    Ok(())
}

// ── CSV sink ─────────────────────────────────────────────────────────────────

/// Renders cell batches into a dense CSV rectangle. Ratios become literal
/// percentages — CSV has no live formulas.
#[derive(Default)]
struct CsvGridSink {
    cells: BTreeMap<(u32, u32), String>,
}

impl CsvGridSink {
    fn finish(self, path: &str) -> Result<()> {
        let max_row = self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0);
        let max_col = self.cells.keys().map(|(_, c)| *c).max().unwrap_or(0);

        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("cannot write {path}"))?;
        for row in 1..=max_row {
            let record: Vec<String> = (1..=max_col)
                .map(|col| self.cells.get(&(row, col)).cloned().unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn render(value: &CellValue) -> String {
        match value {
            CellValue::Count(c) => c.to_string(),
            CellValue::Amount(a) => format!("{a:.0}"),
            CellValue::Text(t) => t.clone(),
            CellValue::Ratio(Ratio::Base) => "100%".to_string(),
            CellValue::Ratio(r @ Ratio::OfBase { .. }) => {
                format!("{:.1}%", r.as_f64() * 100.0)
            }
        }
    }
}

impl GridSink for CsvGridSink {
    fn clear(&mut self, region: ClearRegion) -> Result<(), SinkError> {
        self.cells.retain(|(row, col), _| {
            *row < region.first_row
                || *row > region.last_row
                || *col < region.first_col
                || *col > region.last_col
        });
        Ok(())
    }

    fn write(&mut self, updates: &[CellUpdate]) -> Result<(), SinkError> {
        for update in updates {
            for (i, value) in update.values.iter().enumerate() {
                self.cells
                    .insert((update.row, update.col + i as u32), Self::render(value));
            }
        }
        Ok(())
    }
}

// ── Sheet batch sink ─────────────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct RangeUpdate {
    range:  String,
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    clear_range:        Option<String>,
    value_input_option: &'static str,
    data:               Vec<RangeUpdate>,
}

/// Accumulates the A1-addressed batch-update payload a spreadsheet uploader
/// consumes. The column-letter scheme lives only here — the core never sees
/// it.
struct SheetsJsonSink {
    sheet:       String,
    start_row:   u32,
    clear_range: Option<String>,
    data:        Vec<RangeUpdate>,
}

impl SheetsJsonSink {
    fn new(sheet: String, start_row: u32) -> Self {
        Self {
            sheet,
            start_row,
            clear_range: None,
            data: Vec::new(),
        }
    }

    fn finish(self, path: &str) -> Result<()> {
        let payload = BatchPayload {
            clear_range:        self.clear_range,
            value_input_option: "USER_ENTERED",
            data:               self.data,
        };
        let file =
            fs::File::create(path).with_context(|| format!("cannot write {path}"))?;
        serde_json::to_writer_pretty(file, &payload)?;
        Ok(())
    }

    fn render(&self, update: &CellUpdate) -> RangeUpdate {
        let first = a1(update.col, update.row);
        let last = a1(update.col + update.values.len() as u32 - 1, update.row);
        let row: Vec<serde_json::Value> = update
            .values
            .iter()
            .map(|value| match value {
                CellValue::Count(c) => json!(c),
                CellValue::Amount(a) => json!(a),
                CellValue::Text(t) => json!(t),
                CellValue::Ratio(Ratio::Base) => json!("100%"),
                // Live formula over the count column: this offset's count
                // cell over the cohort's offset-zero count cell.
                CellValue::Ratio(Ratio::OfBase { .. }) => json!(format!(
                    "={}/{}",
                    a1(update.col, update.row),
                    a1(update.col, self.start_row),
                )),
            })
            .collect();
        RangeUpdate {
            range:  format!("{}!{}:{}", self.sheet, first, last),
            values: vec![row],
        }
    }
}

impl GridSink for SheetsJsonSink {
    fn clear(&mut self, region: ClearRegion) -> Result<(), SinkError> {
        self.clear_range = Some(format!(
            "{}!{}:{}",
            self.sheet,
            a1(region.first_col, region.first_row),
            a1(region.last_col, region.last_row),
        ));
        Ok(())
    }

    fn write(&mut self, updates: &[CellUpdate]) -> Result<(), SinkError> {
        for update in updates {
            let rendered = self.render(update);
            self.data.push(rendered);
        }
        Ok(())
    }
}

/// 1-based column number to letters: 1 → A, 26 → Z, 27 → AA.
fn col_letter(mut n: u32) -> String {
    let mut letters = String::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        n = (n - 1) / 26;
        letters.insert(0, (b'A' + rem) as char);
    }
    letters
}

fn a1(col: u32, row: u32) -> String {
    format!("{}{row}", col_letter(col))
}

// ── Source export ────────────────────────────────────────────────────────────

/// Audit copy of the normalized feed, newest first, with day-month-year
/// dates and decimal-comma amounts as the downstream sheet expects.
fn export_source_feed(path: &str, payments: &[Payment]) -> Result<usize> {
    let mut rows: Vec<&Payment> = payments.iter().collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("cannot write {path}"))?;
    writer.write_record([
        "supporter_id",
        "payment_type_id",
        "subscription_id",
        "payment_date",
        "amount",
        "month",
        "year",
    ])?;
    for p in &rows {
        writer.write_record([
            p.supporter_id.to_string(),
            p.payment_type.to_string(),
            p.subscription_id.map(|s| s.to_string()).unwrap_or_default(),
            p.date.format("%d.%m.%Y").to_string(),
            format!("{:.2}", p.amount).replace('.', ","),
            p.period.month.to_string(),
            p.period.year.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(rows.len())
}

// ── Feed import ──────────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ImportRow {
    supporter_id:    i64,
    payment_type_id: i64,
    #[serde(default)]
    subscription_id: Option<i64>,
    payment_date:    String,
    #[serde(default)]
    amount:          Option<f64>,
    #[serde(default)]
    is_success:      Option<i64>,
}

fn import_csv(store: &PaymentStore, path: &str) -> Result<usize> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("cannot open {path}"))?;
    let mut inserted = 0usize;
    for record in reader.deserialize() {
        let row: ImportRow = record?;
        let raw = RawPayment {
            supporter_id:    row.supporter_id,
            payment_type:    row.payment_type_id,
            subscription_id: row.subscription_id,
            payment_date:    row.payment_date,
            amount:          row.amount,
        };
        store.insert_payment(&raw, row.is_success.unwrap_or(1) != 0)?;
        inserted += 1;
    }
    Ok(inserted)
}

// ── Summary ──────────────────────────────────────────────────────────────────

fn print_summary(report: &RetentionReport) {
    println!();
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", report.run_id);
    println!("  as_of:          {}", report.as_of);
    println!(
        "  recurring rows: {} ({})",
        report.recurring_rows,
        drops(&report.recurring_drops),
    );
    println!(
        "  total rows:     {} ({})",
        report.all_rows,
        drops(&report.all_drops),
    );
    println!();
    println!("=== VARIANTS ===");
    for v in &report.variants {
        if v.is_no_data() {
            println!("  {:<16} no data", v.name);
        } else {
            println!(
                "  {:<16} {} cohorts | {} rows in scope | {} no-cohort | {} pre-cohort",
                v.name,
                v.grid.cohorts.len(),
                v.in_scope,
                v.no_cohort,
                v.pre_cohort,
            );
        }
    }
}

fn drops(d: &DropStats) -> String {
    format!(
        "{} bad dates dropped, {} amounts coerced, {} outside window",
        d.bad_dates, d.coerced_amounts, d.out_of_window,
    )
}

// ── Args ─────────────────────────────────────────────────────────────────────

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone())
}

fn parse_period(raw: &str) -> Option<Period> {
    let (y, m) = raw.split_once('-')?;
    let year = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    (1..=12).contains(&month).then(|| Period::new(year, month))
}
