pub mod backtester;
pub mod signal_worker;
pub mod signals;
pub mod snapshot_store;

pub use backtester::{
    compute_metrics, simulate_trades, write_trades_csv, BacktestParams, BacktestReport,
    BacktestRunner, EvalWindow,
};
pub use signal_worker::{Clock, SignalWorker};
pub use signals::{
    build_latest_signal, build_signal_frame, compute_features, evaluate_signal,
    latest_signal_report,
};
pub use snapshot_store::{
    build_snapshot_store, CompositeSnapshotStore, FileSnapshotStore, MemorySnapshotStore,
    RedisSnapshotStore, SnapshotStore,
};
