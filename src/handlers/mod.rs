pub mod cron;
pub mod monitoring;

pub use cron::{cron_daily, cron_delta, cron_light};
pub use monitoring::{health_handler, liveness_handler, metrics_handler, readiness_handler};
