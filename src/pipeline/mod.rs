//! # Dispatch pipeline
//!
//! Every broker request runs through a chain of [`Stage`]s sharing one
//! [`Exchange`]:
//!
//! 1. [`AccessLog`] - sequence number, entry trace, exit log with duration
//! 2. [`AuthGate`] - only when an identifier is configured
//! 3. [`TransactionStage`] - only when a database is configured
//! 4. extra stages registered on the broker, in order
//! 5. [`InvokeStage`] - resolves the verb and executes the command
//!
//! A stage returns `Ok(Flow::Completed)`, `Ok(Flow::Redirect(..))` or an
//! error; the broker turns that into the HTTP response.

mod access_log;
mod auth;
mod core;
mod invoke;
mod transaction;

pub use access_log::AccessLog;
pub use auth::{AuthGate, USER_ATTRIBUTE};
pub use self::core::{Exchange, Flow, HandlerResponse, HeaderVec, Next, Stage, MAX_INLINE_HEADERS};
pub use invoke::InvokeStage;
pub use transaction::TransactionStage;
