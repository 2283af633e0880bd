// Handshake step engine: header sync, state probing, step selection and dispatch

pub mod client_update;
pub mod dispatch;
pub mod handshake;
pub mod msgs;
pub mod path;
pub mod probe;
pub mod retry;
pub mod selector;
pub mod sync;

pub use client_update::{create_client, create_clients, update_client};
pub use dispatch::{dispatch, dispatch_batch};
pub use handshake::{
    plan_step, raw_step, run_channel_close, run_channel_handshake, run_connection_handshake,
    step_once, DriverConfig, DriverState, HandshakeDriver, HandshakeKind, HandshakeOutcome,
    StepReport,
};
pub use msgs::{MessageBatch, Msg};
pub use path::{PathEnd, PathIdentifiers, PathKind};
pub use probe::{probe_channel_state, probe_connection_state, ProbedEnd};
pub use retry::RetryConfig;
pub use selector::{
    select_channel_close_step, select_channel_step, select_connection_step, Action, Side,
    StatePair, Step,
};
pub use sync::{sync_header, sync_headers, HeaderMap};
