pub mod backtest;
pub mod predictor;
pub mod prize;
pub mod sampler;
pub mod stats;

pub use backtest::{run_backtest, BacktestReport, BacktestRow};
pub use predictor::{predict_many, simulate_draw, Strategy};
pub use prize::PrizeResult;
