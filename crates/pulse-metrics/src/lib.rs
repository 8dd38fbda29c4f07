pub mod compute;

pub use compute::{compute, Metrics, SentimentCounts, TimeBucket, TopicCount, TrendPoint};
