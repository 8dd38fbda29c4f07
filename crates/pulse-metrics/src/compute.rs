use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Timelike, Utc};
use pulse_core::types::{FeedbackRecord, Sentiment};
use serde::Serialize;

const WINDOW_BUCKETS: usize = 12;
const BUCKET_MINUTES: i64 = 5;
const TOP_TOPICS_LIMIT: usize = 10;
const TREND_TOPICS_LIMIT: usize = 5;

/// Sentiment counts — all three keys always present, zero-filled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SentimentCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentCounts {
    fn bump(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }
}

/// One 5-minute slot of the trailing hour.
#[derive(Debug, Clone, Serialize)]
pub struct TimeBucket {
    /// Bucket start, "HH:MM" in UTC.
    pub bucket: String,
    pub count: u64,
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: u64,
}

/// Daily counts for the globally-top topics, flattened for charting:
/// `{"date": "2026-01-01", "service": 3, "pricing": 0, …}`.
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub date: String,
    #[serde(flatten)]
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub sentiment_distribution: SentimentCounts,
    pub submissions_by_time: Vec<TimeBucket>,
    pub top_topics: Vec<TopicCount>,
    pub topic_trends: Vec<TrendPoint>,
}

/// Derive all metrics from the record set at call time. No materialized view.
pub fn compute(records: &[FeedbackRecord]) -> Metrics {
    compute_at(records, Utc::now())
}

/// Same as [`compute`] with an explicit "now" for deterministic tests.
pub fn compute_at(records: &[FeedbackRecord], now: DateTime<Utc>) -> Metrics {
    let mut distribution = SentimentCounts::default();

    let window_end = floor_bucket(now);
    let window_start =
        window_end - Duration::minutes((WINDOW_BUCKETS as i64 - 1) * BUCKET_MINUTES);

    let mut buckets: Vec<TimeBucket> = (0..WINDOW_BUCKETS)
        .map(|i| {
            let start = window_start + Duration::minutes(i as i64 * BUCKET_MINUTES);
            TimeBucket {
                bucket: start.format("%H:%M").to_string(),
                count: 0,
                positive: 0,
                neutral: 0,
                negative: 0,
            }
        })
        .collect();

    for r in records {
        distribution.bump(r.sentiment);

        if r.created_at >= window_start {
            let idx = ((r.created_at - window_start).num_seconds() / (BUCKET_MINUTES * 60))
                as usize;
            if idx < WINDOW_BUCKETS {
                let slot = &mut buckets[idx];
                slot.count += 1;
                match r.sentiment {
                    Sentiment::Positive => slot.positive += 1,
                    Sentiment::Neutral => slot.neutral += 1,
                    Sentiment::Negative => slot.negative += 1,
                }
            }
        }
    }

    let (order, counts) = count_topics(records);

    let mut top_topics: Vec<TopicCount> = order
        .iter()
        .map(|topic| TopicCount {
            topic: topic.clone(),
            count: counts[topic],
        })
        .collect();
    // Stable sort keeps first-seen order for equal counts.
    top_topics.sort_by(|a, b| b.count.cmp(&a.count));
    top_topics.truncate(TOP_TOPICS_LIMIT);

    Metrics {
        sentiment_distribution: distribution,
        submissions_by_time: buckets,
        top_topics,
        topic_trends: topic_trends(records, &order, &counts),
    }
}

/// Daily time series for the top [`TREND_TOPICS_LIMIT`] topics overall.
/// Days where none of the top topics appear are omitted; a present day
/// zero-fills topics that did not occur on it.
fn topic_trends(
    records: &[FeedbackRecord],
    order: &[String],
    counts: &HashMap<String, u64>,
) -> Vec<TrendPoint> {
    let mut ranked: Vec<&String> = order.iter().collect();
    ranked.sort_by(|a, b| counts[*b].cmp(&counts[*a]));
    let top: Vec<String> = ranked
        .into_iter()
        .take(TREND_TOPICS_LIMIT)
        .cloned()
        .collect();
    if top.is_empty() {
        return Vec::new();
    }

    let mut by_date: BTreeMap<String, HashMap<String, u64>> = BTreeMap::new();
    for r in records {
        let date_key = r.created_at.date_naive().to_string();
        for t in &r.key_topics {
            if top.contains(t) {
                *by_date
                    .entry(date_key.clone())
                    .or_default()
                    .entry(t.clone())
                    .or_insert(0) += 1;
            }
        }
    }

    by_date
        .into_iter()
        .map(|(date, day_counts)| {
            let counts = top
                .iter()
                .map(|topic| (topic.clone(), day_counts.get(topic).copied().unwrap_or(0)))
                .collect();
            TrendPoint { date, counts }
        })
        .collect()
}

/// Topic occurrence counts plus first-seen order for deterministic ties.
fn count_topics(records: &[FeedbackRecord]) -> (Vec<String>, HashMap<String, u64>) {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for r in records {
        for t in &r.key_topics {
            let entry = counts.entry(t.clone()).or_insert_with(|| {
                order.push(t.clone());
                0
            });
            *entry += 1;
        }
    }
    (order, counts)
}

/// Round down to the nearest 5-minute boundary.
fn floor_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    let t = t
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t);
    t - Duration::minutes((t.minute() % BUCKET_MINUTES as u32) as i64)
}
