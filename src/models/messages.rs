//! Wire messages from a driven environment
//!
//! JSON messages relayed by the transport while an environment registers and
//! reports its tests.

use serde::{Deserialize, Serialize};

use crate::models::test::{TestMeta, TestRun};

/// One inbound message from a driven environment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnvMessage {
    /// A test became known to the environment and is queued on its suite
    #[serde(rename = "TEST_ADDED")]
    TestAdded {
        #[serde(rename = "suiteName")]
        suite_name: String,
        #[serde(rename = "testMeta")]
        test_meta: TestMeta,
    },
    /// A test settled; carries the environment-measured run outcome
    #[serde(rename = "TEST_ENDED")]
    TestEnded {
        #[serde(rename = "suiteName")]
        suite_name: String,
        #[serde(rename = "testName")]
        test_name: String,
        run: TestRun,
    },
}

impl EnvMessage {
    pub fn suite_name(&self) -> &str {
        match self {
            EnvMessage::TestAdded { suite_name, .. } => suite_name,
            EnvMessage::TestEnded { suite_name, .. } => suite_name,
        }
    }
}
