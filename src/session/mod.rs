//! Session state machine: `Listening → Serving(client, encoder?) → Listening`
//! on any per-client error, `Terminating` on SIGINT/SIGTERM (SPEC_FULL §4.6).

mod client;
mod loop_;

pub use loop_::run;
