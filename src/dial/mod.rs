//! Linked test-parameter dials and the engine that keeps them consistent

pub mod engine;
pub mod error;
pub mod field;
pub mod set;

pub use engine::{
    recompute_target, Bound, ChangeOutcome, ChangeReport, DialEngine, DialWrite, RangeNotice,
};
pub use error::{DialError, Result as DialResult};
pub use field::{DialField, Direction, LockableField};
pub use set::{DialSet, TestParameters};
