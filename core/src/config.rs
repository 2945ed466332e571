//! Variant catalog and category configuration.
//!
//! Which payment type codes count as recurring, one-time, or acquisition is
//! upstream-platform trivia, so it lives in data files. The production
//! codes also ship compiled in (`RetentionConfig::builtin()`) for tests and
//! bare runs without a data directory.

use crate::{
    aggregate::AggregateMode,
    category::{CategorySet, PaymentType},
    cohort::KeyBy,
};
use serde::{Deserialize, Serialize};

/// Which slice of the payment feed a variant consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedScope {
    /// Recurring (subscription-backed) payments only.
    Recurring,
    /// Recurring plus one-time payments.
    All,
}

/// One retention matrix: who is cohorted, what qualifies them, what is
/// counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name:       String,
    pub feed:       FeedScope,
    pub key_by:     KeyBy,
    /// Categories that establish an entity's first-activity period.
    /// Distinct from the feed scope: every feed payment for a cohorted
    /// entity is aggregated, qualifying or not.
    pub qualifying: CategorySet,
    pub mode:       AggregateMode,
}

/// Sink layout and retry knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// 1-based sheet row of every cohort's offset-zero cell.
    pub start_row:          u32,
    /// 1-based column of the first cohort's count column.
    pub first_col:          u32,
    pub retry_attempts:     u32,
    pub retry_backoff_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            start_row:          4,
            first_col:          2,
            retry_attempts:     3,
            retry_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CategoriesFile {
    recurring:     Vec<PaymentType>,
    one_time:      Vec<PaymentType>,
    acquisition:   PaymentType,
    one_time_gift: PaymentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Recurring payment categories — the subscription feed.
    pub recurring: CategorySet,
    /// Recurring plus one-time categories — the broader feed.
    pub all:       CategorySet,
    pub variants:  Vec<VariantConfig>,
    pub export:    ExportConfig,
}

impl RetentionConfig {
    /// Load from the data/ directory. In tests, use builtin().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/retention/categories.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let categories: CategoriesFile = serde_json::from_str(&content)?;

        let export_path = format!("{data_dir}/retention/export.json");
        let export_content = std::fs::read_to_string(&export_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {export_path}: {e}"))?;
        let export: ExportConfig = serde_json::from_str(&export_content)?;

        Ok(Self::from_categories(categories, export))
    }

    /// The production category codes, compiled in.
    pub fn builtin() -> Self {
        Self::from_categories(
            CategoriesFile {
                recurring:     vec![26, 45, 53, 54, 55],
                one_time:      vec![1, 16, 24, 34, 50],
                acquisition:   55,
                one_time_gift: 16,
            },
            ExportConfig::default(),
        )
    }

    fn from_categories(file: CategoriesFile, export: ExportConfig) -> Self {
        let recurring = CategorySet::new(file.recurring);
        let all = recurring.union(&CategorySet::new(file.one_time));

        // The three production matrices. One engine, three parameterizations.
        let variants = vec![
            VariantConfig {
                name:       "subscriptions".into(),
                feed:       FeedScope::Recurring,
                key_by:     KeyBy::Subscription,
                qualifying: recurring.clone(),
                mode:       AggregateMode::CountAndAmount,
            },
            VariantConfig {
                name:       "regular-donors".into(),
                feed:       FeedScope::Recurring,
                key_by:     KeyBy::Supporter,
                qualifying: CategorySet::new([file.acquisition]),
                mode:       AggregateMode::UniqueEntities,
            },
            VariantConfig {
                name:       "all-donors".into(),
                feed:       FeedScope::All,
                key_by:     KeyBy::Supporter,
                qualifying: CategorySet::new([file.acquisition, file.one_time_gift]),
                mode:       AggregateMode::UniqueEntities,
            },
        ];

        Self {
            recurring,
            all,
            variants,
            export,
        }
    }
}
