pub mod daily_run_use_case;
pub mod ports;

pub use daily_run_use_case::DailyRunUseCase;
