//! Per-field aggregate statistics
//!
//! One aggregate per field, chosen by the field type: histogram for
//! numbers, keywords for text, count for classes, hierarchy for categories
//! and timeline for datetimes.

use chrono::{DateTime, Utc};
use miner_engine::{median, SummaryStats, Tokenizer};
use miner_graph::{FieldValue, RecordStore};
use miner_protocol::{AggregateType, DocumentId, FieldDescriptor};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const HISTOGRAM_BINS: usize = 10;
const TOP_KEYWORDS: usize = 20;

/// Aggregates of `fields` over `documents`
///
/// Returns one `{field, type, statistics}` entry per field.
#[must_use]
pub fn compute(
    store: &RecordStore,
    documents: &[DocumentId],
    fields: &[FieldDescriptor],
    tokenizer: &Tokenizer,
) -> Vec<Value> {
    fields
        .iter()
        .filter(|f| f.included)
        .map(|field| {
            let values: Vec<&FieldValue> = documents
                .iter()
                .filter_map(|&id| store.document(id).ok())
                .filter_map(|doc| doc.value(&field.name))
                .collect();
            let aggregate = field.field_type.aggregate();
            let statistics = match aggregate {
                AggregateType::Histogram => {
                    histogram(&values.iter().filter_map(|v| v.as_number()).collect::<Vec<_>>())
                }
                AggregateType::Keywords => keywords(
                    &values.iter().filter_map(|v| v.as_text()).collect::<Vec<_>>(),
                    tokenizer,
                ),
                AggregateType::Count => {
                    count(&values.iter().filter_map(|v| v.as_text()).collect::<Vec<_>>())
                }
                AggregateType::Hierarchy => hierarchy(&values),
                AggregateType::Timeline => timeline(
                    &values
                        .iter()
                        .filter_map(|v| match v {
                            FieldValue::Datetime(dt) => Some(*dt),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                ),
            };
            json!({
                "field": field.name,
                "type": aggregate,
                "statistics": statistics,
            })
        })
        .collect()
}

fn histogram(values: &[f64]) -> Value {
    let stats = SummaryStats::of(values);
    let mut bins = Vec::new();
    if !values.is_empty() {
        let width = (stats.max - stats.min) / HISTOGRAM_BINS as f64;
        if width == 0.0 {
            bins.push(json!({"min": stats.min, "max": stats.max, "frequency": values.len()}));
        } else {
            let mut frequency = [0usize; HISTOGRAM_BINS];
            for v in values {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let bin = (((v - stats.min) / width) as usize).min(HISTOGRAM_BINS - 1);
                frequency[bin] += 1;
            }
            for (i, f) in frequency.iter().enumerate() {
                let lo = stats.min + width * i as f64;
                bins.push(json!({"min": lo, "max": lo + width, "frequency": f}));
            }
        }
    }
    json!({
        "count": values.len(),
        "min": stats.min,
        "max": stats.max,
        "mean": stats.mean,
        "median": median(values).unwrap_or(0.0),
        "stdev": stats.std,
        "sum": values.iter().sum::<f64>(),
        "values": bins,
    })
}

fn keywords(texts: &[&str], tokenizer: &Tokenizer) -> Value {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for text in texts {
        let unique: HashSet<String> = tokenizer.tokenize(text).into_iter().collect();
        for token in unique {
            *frequency.entry(token).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_KEYWORDS);

    let top = ranked.first().map_or(1, |(_, f)| *f) as f64;
    let mut values: Vec<Value> = ranked
        .into_iter()
        .map(|(keyword, f)| json!({"keyword": keyword, "weight": f as f64 / top}))
        .collect();
    if values.is_empty() {
        if let Some(first) = texts.first() {
            values.push(json!({"keyword": first, "weight": 1.0}));
        }
    }
    json!({ "values": values })
}

fn count(values: &[&str]) -> Value {
    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for &v in values {
        *frequency.entry(v).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let total = values.len().max(1) as f64;
    json!({
        "values": ranked
            .into_iter()
            .map(|(value, f)| json!({
                "value": value,
                "frequency": f,
                "percent": f as f64 / total * 100.0,
            }))
            .collect::<Vec<_>>()
    })
}

#[derive(Default)]
struct CategoryNode {
    size: usize,
    children: BTreeMap<String, CategoryNode>,
}

impl CategoryNode {
    fn insert(&mut self, path: &[String]) {
        self.size += 1;
        if let Some((head, rest)) = path.split_first() {
            self.children.entry(head.clone()).or_default().insert(rest);
        }
    }

    fn to_json(&self) -> Vec<Value> {
        let mut children: Vec<(&String, &CategoryNode)> = self.children.iter().collect();
        children.sort_by(|a, b| b.1.size.cmp(&a.1.size).then(a.0.cmp(b.0)));
        children
            .into_iter()
            .map(|(name, node)| {
                json!({
                    "name": name,
                    "size": node.size,
                    "children": node.to_json(),
                })
            })
            .collect()
    }
}

fn hierarchy(values: &[&FieldValue]) -> Value {
    let mut root = CategoryNode::default();
    for value in values {
        if let FieldValue::Category(path) = value {
            root.insert(path);
        }
    }
    json!({ "values": root.to_json() })
}

fn timeline(dates: &[DateTime<Utc>]) -> Value {
    let bucket = |format: &str| {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for dt in dates {
            *counts.entry(dt.format(format).to_string()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(date, count)| json!({"date": date, "count": count}))
            .collect::<Vec<_>>()
    };
    json!({
        "values": {
            "month": bucket("%Y-%m"),
            "day": bucket("%Y-%m-%d"),
        }
    })
}
