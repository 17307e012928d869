//! Common test utilities
//!
//! This module is shared across all integration tests

pub mod fixtures;
pub mod gateway;

#[allow(unused_imports)]
pub use fixtures::{audio_formats_json, collect_until, is_complete, is_failure_status, next_event, TestEnvironment};
#[allow(unused_imports)]
pub use gateway::{DiscoveryReply, DownloadScript, ScriptedGateway};
