//! Cooperative cancellation of a run.
//!
//! The CLI cancels the token on Ctrl-C; running subprocesses are killed and
//! the run stops between stages. Interrupted stages resume from checkpoints.

mod token;

pub use token::CancellationToken;
