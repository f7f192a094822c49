mod report;

pub use report::{ErrorDetail, REPORT_VERSION, Report, StageTiming};
