use retention_core::{
    config::RetentionConfig,
    engine::{FeedBundle, RetentionEngine, RetentionReport, VariantOutcome},
    feed::RawPayment,
    grid::Ratio,
    period::Period,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn raw(supporter: i64, ptype: i64, sub: Option<i64>, date: &str, amount: f64) -> RawPayment {
    RawPayment {
        supporter_id:    supporter,
        payment_type:    ptype,
        subscription_id: sub,
        payment_date:    date.to_string(),
        amount:          Some(amount),
    }
}

fn run(feeds: &FeedBundle) -> RetentionReport {
    let engine = RetentionEngine::new(RetentionConfig::builtin());
    engine.run(feeds, Period::new(2025, 1)).unwrap()
}

fn variant<'a>(report: &'a RetentionReport, name: &str) -> &'a VariantOutcome {
    report
        .variants
        .iter()
        .find(|v| v.name == name)
        .unwrap_or_else(|| panic!("variant {name} missing"))
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Scenario: subscription S1 pays in 2024-01 and 2024-03, S2 in 2024-02.
/// The subscriptions matrix shows cohort 2024-01 with offsets 0..=2 (the
/// gap zero-filled) and cohort 2024-02 with its base row only.
#[test]
fn subscription_matrix_end_to_end() {
    let feeds = FeedBundle {
        recurring: vec![
            raw(1, 53, Some(1), "2024-01-15", 20.0),
            raw(1, 53, Some(1), "2024-03-15", 20.0),
            raw(2, 53, Some(2), "2024-02-10", 35.0),
        ],
        all: Vec::new(),
    };

    let report = run(&feeds);
    let subs = variant(&report, "subscriptions");

    assert_eq!(subs.in_scope, 3);
    assert_eq!(subs.grid.cohorts.len(), 2);

    let jan = &subs.grid.cohorts[0];
    assert_eq!(jan.start, Period::new(2024, 1));
    assert_eq!(jan.rows.len(), 3);
    assert_eq!(jan.rows[0].count, 1);
    assert_eq!(jan.rows[0].amount, Some(20.0));
    assert_eq!(jan.rows[1].count, 0);
    assert_eq!(jan.rows[2].count, 1);
    assert_eq!(jan.rows[2].ratio, Ratio::OfBase { value: 1, base: 1 });

    let feb = &subs.grid.cohorts[1];
    assert_eq!(feb.start, Period::new(2024, 2));
    assert_eq!(feb.rows.len(), 1);
}

/// The donor variants qualify on acquisition, not on any recurring payment:
/// a supporter who pays monthly but never had an acquisition payment is in
/// the subscriptions matrix yet absent from the regular-donors matrix.
#[test]
fn donor_variant_requires_acquisition() {
    let feeds = FeedBundle {
        recurring: vec![
            // Supporter 1: acquired (55) then retained.
            raw(1, 55, Some(1), "2024-01-05", 10.0),
            raw(1, 53, Some(1), "2024-02-05", 10.0),
            // Supporter 2: recurring payments only, never a 55.
            raw(2, 53, Some(2), "2024-01-07", 10.0),
            raw(2, 53, Some(2), "2024-02-07", 10.0),
        ],
        all: Vec::new(),
    };

    let report = run(&feeds);

    let subs = variant(&report, "subscriptions");
    assert_eq!(subs.grid.cohorts.len(), 1);
    assert_eq!(subs.grid.cohorts[0].rows[0].count, 2); // both subscriptions

    let donors = variant(&report, "regular-donors");
    assert_eq!(donors.in_scope, 2);
    assert_eq!(donors.no_cohort, 2); // supporter 2's payments
    assert_eq!(donors.grid.cohorts.len(), 1);
    assert_eq!(donors.grid.cohorts[0].rows[0].count, 1);
    assert_eq!(donors.grid.cohorts[0].rows[1].count, 1);
}

/// Scenario: a gift in the broader set predates the donor's acquisition.
/// The all-donors matrix drops the earlier gift (negative offset) and
/// anchors the cohort at the acquisition month.
#[test]
fn all_donors_excludes_pre_acquisition_gifts() {
    let feeds = FeedBundle {
        recurring: Vec::new(),
        all: vec![
            raw(7, 24, None, "2024-04-18", 30.0), // one-time, before acquisition
            raw(7, 55, Some(70), "2024-05-02", 15.0),
            raw(7, 53, Some(70), "2024-07-02", 15.0),
        ],
    };

    let report = run(&feeds);
    let all = variant(&report, "all-donors");

    assert_eq!(all.pre_cohort, 1);
    assert_eq!(all.grid.cohorts.len(), 1);

    let cohort = &all.grid.cohorts[0];
    assert_eq!(cohort.start, Period::new(2024, 5));
    assert_eq!(cohort.max_offset(), 2);
    assert_eq!(cohort.rows[0].count, 1);
}

/// A donor making two donations in their acquisition month counts once in
/// the offset-zero cell, end to end.
#[test]
fn same_month_donations_count_one_donor() {
    let feeds = FeedBundle {
        recurring: vec![
            raw(5, 55, Some(50), "2024-06-03", 10.0),
            raw(5, 53, Some(50), "2024-06-21", 10.0),
        ],
        all: Vec::new(),
    };

    let report = run(&feeds);
    let donors = variant(&report, "regular-donors");

    assert_eq!(donors.in_scope, 2);
    assert_eq!(donors.grid.cohorts[0].rows[0].count, 1);
}

/// An empty feed is an explicit no-data condition per variant, not an
/// error — and distinct from variants that simply retain nobody later.
#[test]
fn empty_feed_reports_no_data() {
    let report = run(&FeedBundle::default());

    assert_eq!(report.recurring_rows, 0);
    assert_eq!(report.all_rows, 0);
    assert_eq!(report.variants.len(), 3);
    for v in &report.variants {
        assert!(v.is_no_data());
        assert_eq!(v.in_scope, 0);
    }
}

/// Feed row totals and drop tallies surface in the report unchanged.
#[test]
fn report_carries_input_accounting() {
    let feeds = FeedBundle {
        recurring: vec![
            raw(1, 53, Some(1), "2024-01-15", 20.0),
            raw(1, 53, Some(1), "bad-date", 20.0),
        ],
        all: vec![raw(1, 16, None, "2025-06-01", 50.0)], // beyond as_of
    };

    let report = run(&feeds);

    assert_eq!(report.recurring_rows, 2);
    assert_eq!(report.all_rows, 1);
    assert_eq!(report.recurring_drops.bad_dates, 1);
    assert_eq!(report.all_drops.out_of_window, 1);
}
