pub mod backtest;
pub mod candle;
pub mod signal;
pub mod snapshot;

pub use backtest::*;
pub use candle::*;
pub use signal::*;
pub use snapshot::*;
