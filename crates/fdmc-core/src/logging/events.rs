//! Event names attached to log records as the `event` field.

/// Standard event names used in logging.
pub mod event_names {
    // Fit lifecycle
    pub const FIT_STARTED: &str = "fit.started";
    pub const FIT_ITERATION: &str = "fit.iteration";
    pub const STATE_FITTED: &str = "fit.state_fitted";
    pub const FIT_FINISHED: &str = "fit.finished";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    // Synthetic data
    pub const DATA_GENERATED: &str = "data.generated";
}
