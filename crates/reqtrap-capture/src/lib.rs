//! Request capture and mock dispatch
//!
//! - [`MockTable`]: in-memory `(method, path)` lookup rebuilt from the record store
//! - [`dispatch`]: the catch-all path that logs, optionally delays, answers and records

pub mod dispatcher;
pub mod mock_table;

pub use dispatcher::{
    dispatch, CaptureConfig, CaptureState, CAPTURED_BODY, DEFAULT_MAX_BODY_BYTES, RESERVED_PATHS,
};
pub use mock_table::{MockDefinition, MockDefinitionError, MockKey, MockTable};
