pub mod service;
pub mod weekly;

pub use service::AnalyticsService;
pub use weekly::{aggregate_week, window_start, AnalyticsSummary, DailyScore, ScoreSample};
