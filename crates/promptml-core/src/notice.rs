use crate::batch::NoticeError;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of finding classes the analysis backend emits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NoticeCategory {
    Proxy,
    Missing,
    Error,
    Resemble,
    ModelReport,
    Welcome,
    Outliers,
    EqOdds,
}

impl NoticeCategory {
    pub const ALL: [NoticeCategory; 8] = [
        NoticeCategory::Proxy,
        NoticeCategory::Missing,
        NoticeCategory::Error,
        NoticeCategory::Resemble,
        NoticeCategory::ModelReport,
        NoticeCategory::Welcome,
        NoticeCategory::Outliers,
        NoticeCategory::EqOdds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Missing => "missing",
            Self::Error => "error",
            Self::Resemble => "resemble",
            Self::ModelReport => "model_report",
            Self::Welcome => "welcome",
            Self::Outliers => "outliers",
            Self::EqOdds => "eq_odds",
        }
    }

    /// Stable reconciliation key for the category.
    pub fn key(self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Missing => "missing",
            Self::Error => "errors",
            Self::Resemble => "protected",
            Self::ModelReport => "modelReport",
            Self::Welcome => "welcome",
            Self::Outliers => "outliers",
            Self::EqOdds => "equalizedOdds",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Proxy => "Proxy Columns",
            Self::Missing => "Missing Data",
            Self::Error => "Errors",
            Self::Resemble => "Protected Columns",
            Self::ModelReport => "Model Report",
            Self::Welcome => "Welcome",
            Self::Outliers => "Outliers",
            Self::EqOdds => "Equalized Odds",
        }
    }

    /// Resolves a batch key as sent by any backend version.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name.trim() {
            "proxy" => Some(Self::Proxy),
            "missing" => Some(Self::Missing),
            "error" | "errors" => Some(Self::Error),
            "resemble" | "protected" => Some(Self::Resemble),
            "model_report" | "modelReport" | "model_perf" | "performance" => {
                Some(Self::ModelReport)
            }
            "welcome" => Some(Self::Welcome),
            "outliers" => Some(Self::Outliers),
            "eq_odds" | "equalized" | "equalizedOdds" => Some(Self::EqOdds),
            _ => None,
        }
    }
}

impl fmt::Display for NoticeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoticeCategory {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::from_wire(input).ok_or_else(|| format!("Unknown notice category: {input}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyNotice {
    pub df: String,
    pub proxy_col_name: String,
    pub sensitive_col_name: String,
    #[serde(default, rename = "p")]
    pub p_value: Option<f64>,
}

impl ProxyNotice {
    pub fn is_strong(&self) -> bool {
        self.p_value.map(|p| p < 0.001).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingNotice {
    #[serde(alias = "df_name")]
    pub df: String,
    /// Either a list of columns or the backend's
    /// `missing_columns: {name: {number_missing, total_length, sens_col}}` map.
    #[serde(alias = "missing_columns", deserialize_with = "missing_columns")]
    pub columns: Vec<MissingColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingColumn {
    #[serde(alias = "col_name")]
    pub name: String,
    pub number_missing: u64,
    pub total_length: u64,
    #[serde(default)]
    pub correlated_column: Option<String>,
    #[serde(default)]
    pub largest_percent: Option<f64>,
    #[serde(default)]
    pub largest_missing_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MissingColumnStats {
    number_missing: u64,
    total_length: u64,
    #[serde(default, alias = "sens_cols")]
    sens_col: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SensitiveMode {
    #[serde(default)]
    largest_missing_value: Option<Value>,
    #[serde(default)]
    largest_percent: Option<f64>,
}

fn missing_columns<'de, D>(deserializer: D) -> Result<Vec<MissingColumn>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| MissingColumn::deserialize(item).map_err(de::Error::custom))
            .collect(),
        Value::Object(by_name) => by_name
            .into_iter()
            .map(|(name, stats)| {
                let stats = MissingColumnStats::deserialize(stats).map_err(de::Error::custom)?;
                missing_column_from_stats(name, stats).map_err(de::Error::custom)
            })
            .collect(),
        other => Err(de::Error::custom(format!(
            "missing columns must be a list or a map, got {other}"
        ))),
    }
}

/// Keeps the sensitive column whose most frequent value covers the largest
/// share of the missing rows; the first one wins ties.
fn missing_column_from_stats(
    name: String,
    stats: MissingColumnStats,
) -> Result<MissingColumn, serde_json::Error> {
    let mut column = MissingColumn {
        name,
        number_missing: stats.number_missing,
        total_length: stats.total_length,
        correlated_column: None,
        largest_percent: None,
        largest_missing_value: None,
    };
    for (sensitive, mode) in stats.sens_col {
        let mode = SensitiveMode::deserialize(mode)?;
        let Some(percent) = mode.largest_percent else {
            continue;
        };
        if column.largest_percent.map_or(true, |best| percent > best) {
            column.correlated_column = Some(sensitive);
            column.largest_percent = Some(percent);
            column.largest_missing_value = mode.largest_missing_value;
        }
    }
    Ok(column)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorNotice {
    pub model_name: String,
    #[serde(default)]
    pub slice: Vec<(String, Value)>,
    #[serde(default, rename = "n")]
    pub count: Option<u64>,
}

pub const UNNAMED_DF: &str = "unnamed";

/// Columns of one dataframe that look like protected classes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawProtectedNotice")]
pub struct ProtectedNotice {
    pub df: String,
    pub columns: Vec<ProtectedColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectedColumn {
    pub name: String,
    pub sensitive: bool,
    /// Protected class the column resembles, when known.
    #[serde(default)]
    pub field: Option<Value>,
}

impl ProtectedNotice {
    pub fn sensitive_columns(&self) -> impl Iterator<Item = &ProtectedColumn> {
        self.columns.iter().filter(|column| column.sensitive)
    }
}

/// Wire shapes: the backend's `columns: {name: {sensitive, field, ..}}` map,
/// or the older comma-delimited `col`/`column` plus `category` strings.
#[derive(Debug, Deserialize)]
struct RawProtectedNotice {
    #[serde(default)]
    df: Option<String>,
    #[serde(default)]
    columns: Option<Map<String, Value>>,
    #[serde(default, alias = "column")]
    col: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProtectedColumn {
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    field: Option<Value>,
}

impl TryFrom<RawProtectedNotice> for ProtectedNotice {
    type Error = String;

    fn try_from(raw: RawProtectedNotice) -> Result<Self, Self::Error> {
        let df = raw
            .df
            .filter(|df| !df.trim().is_empty())
            .unwrap_or_else(|| UNNAMED_DF.to_string());
        let columns = match (raw.columns, raw.col) {
            (Some(by_name), _) => by_name
                .into_iter()
                .map(|(name, info)| {
                    let info = RawProtectedColumn::deserialize(info)
                        .map_err(|err| format!("protected column {name}: {err}"))?;
                    Ok(ProtectedColumn {
                        name,
                        sensitive: info.sensitive,
                        field: info.field.filter(|field| !field.is_null()),
                    })
                })
                .collect::<Result<Vec<_>, String>>()?,
            (None, Some(names)) => {
                let categories = raw
                    .category
                    .as_deref()
                    .map(split_list)
                    .unwrap_or_default();
                split_list(&names)
                    .into_iter()
                    .enumerate()
                    .map(|(index, name)| ProtectedColumn {
                        name,
                        sensitive: true,
                        field: categories.get(index).cloned().map(Value::String),
                    })
                    .collect()
            }
            (None, None) => return Err("protected notice names no columns".to_string()),
        };
        Ok(Self { df, columns })
    }
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ErrorRates {
    pub fpr: f64,
    pub fnr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeLabels {
    pub pos: Value,
    pub neg: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelReportNotice {
    pub model_name: String,
    #[serde(default, alias = "acc")]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub values: Option<OutcomeLabels>,
    /// column -> column value -> error rates for rows holding that value
    #[serde(default)]
    pub columns: BTreeMap<String, BTreeMap<String, ErrorRates>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutlierNotice {
    pub col_name: String,
    #[serde(default)]
    pub df_name: Option<String>,
    pub value: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EqOddsNotice {
    pub model_name: String,
    #[serde(default)]
    pub eq: Option<String>,
    pub acc_orig: f64,
    pub acc_corr: f64,
    #[serde(default)]
    pub num_changed: u64,
    #[serde(default)]
    pub grp: Option<String>,
}

/// Every notice of one category delivered in a single batch.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeGroup {
    Proxy(Vec<ProxyNotice>),
    Missing(Vec<MissingNotice>),
    Error(Vec<ErrorNotice>),
    Resemble(Vec<ProtectedNotice>),
    ModelReport(Vec<ModelReportNotice>),
    Welcome,
    Outliers(Vec<OutlierNotice>),
    EqOdds(Vec<EqOddsNotice>),
}

impl NoticeGroup {
    pub fn parse(category: NoticeCategory, raw: &[Value]) -> Result<Self, NoticeError> {
        let group = match category {
            NoticeCategory::Proxy => Self::Proxy(parse_all(category, raw)?),
            NoticeCategory::Missing => Self::Missing(parse_all(category, raw)?),
            NoticeCategory::Error => Self::Error(parse_all(category, raw)?),
            NoticeCategory::Resemble => Self::Resemble(parse_all(category, raw)?),
            NoticeCategory::ModelReport => Self::ModelReport(parse_all(category, raw)?),
            NoticeCategory::Welcome => Self::Welcome,
            NoticeCategory::Outliers => Self::Outliers(parse_all(category, raw)?),
            NoticeCategory::EqOdds => Self::EqOdds(parse_all(category, raw)?),
        };
        Ok(group)
    }

    pub fn category(&self) -> NoticeCategory {
        match self {
            Self::Proxy(_) => NoticeCategory::Proxy,
            Self::Missing(_) => NoticeCategory::Missing,
            Self::Error(_) => NoticeCategory::Error,
            Self::Resemble(_) => NoticeCategory::Resemble,
            Self::ModelReport(_) => NoticeCategory::ModelReport,
            Self::Welcome => NoticeCategory::Welcome,
            Self::Outliers(_) => NoticeCategory::Outliers,
            Self::EqOdds(_) => NoticeCategory::EqOdds,
        }
    }
}

fn parse_all<T: DeserializeOwned>(
    category: NoticeCategory,
    raw: &[Value],
) -> Result<Vec<T>, NoticeError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            T::deserialize(value).map_err(|source| NoticeError::Field {
                category: category.as_str(),
                index,
                source,
            })
        })
        .collect()
}
