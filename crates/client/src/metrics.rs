//! Prometheus Metrics for the payment client
//!
//! Metrics are process-wide and never influence client behaviour.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static! {
    /// Channels opened, by direction (outbound/inbound)
    pub static ref CHANNELS_OPENED: IntCounterVec = register_int_counter_vec!(
        "paychan_channels_opened_total",
        "Total number of channels opened by direction",
        &["direction"]
    )
    .expect("Failed to register paychan_channels_opened_total metric");

    /// Payment success/failure counter
    pub static ref PAYMENT_RESULT: IntCounterVec = register_int_counter_vec!(
        "paychan_payment_result_total",
        "Off-chain payment results (success/failure)",
        &["result"]
    )
    .expect("Failed to register paychan_payment_result_total metric");

    /// Settlement success/failure counter
    pub static ref SETTLEMENT_RESULT: IntCounterVec = register_int_counter_vec!(
        "paychan_settlement_result_total",
        "Channel settlement results (success/failure)",
        &["result"]
    )
    .expect("Failed to register paychan_settlement_result_total metric");

    /// Registered observers across all clients in the process
    pub static ref OBSERVERS_REGISTERED: IntGauge = register_int_gauge!(
        "paychan_observers_registered",
        "Number of currently registered observers"
    )
    .expect("Failed to register paychan_observers_registered metric");

    /// Balance changes picked up by the poller
    pub static ref BALANCE_UPDATES: IntCounter = register_int_counter!(
        "paychan_balance_updates_total",
        "Total number of on-chain balance changes broadcast to observers"
    )
    .expect("Failed to register paychan_balance_updates_total metric");

    /// Failed or timed-out balance queries
    pub static ref BALANCE_POLL_FAILURES: IntCounter = register_int_counter!(
        "paychan_balance_poll_failures_total",
        "Total number of failed on-chain balance queries"
    )
    .expect("Failed to register paychan_balance_poll_failures_total metric");

    /// Watcher task exits by outcome (concluded/error/cancelled)
    pub static ref WATCHER_EXITS: IntCounterVec = register_int_counter_vec!(
        "paychan_watcher_exits_total",
        "Dispute watcher exits by outcome",
        &["outcome"]
    )
    .expect("Failed to register paychan_watcher_exits_total metric");

    /// Adjudicator events seen by watchers, by kind
    pub static ref ADJUDICATOR_EVENTS: IntCounterVec = register_int_counter_vec!(
        "paychan_adjudicator_events_total",
        "Adjudicator events delivered to the client by kind",
        &["kind"]
    )
    .expect("Failed to register paychan_adjudicator_events_total metric");
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a newly installed channel
pub fn record_channel_opened(direction: &str) {
    CHANNELS_OPENED.with_label_values(&[direction]).inc();
}

/// Record payment result
pub fn record_payment_result(success: bool) {
    PAYMENT_RESULT.with_label_values(&[result_label(success)]).inc();
}

/// Record settlement result
pub fn record_settlement_result(success: bool) {
    SETTLEMENT_RESULT
        .with_label_values(&[result_label(success)])
        .inc();
}

pub fn record_watcher_exit(outcome: &str) {
    WATCHER_EXITS.with_label_values(&[outcome]).inc();
}

pub fn record_adjudicator_event(kind: &str) {
    ADJUDICATOR_EVENTS.with_label_values(&[kind]).inc();
}
