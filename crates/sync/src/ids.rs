use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use uuid::Uuid;

use super::error::{BlankIdSnafu, IdError, IdResult};

// Macro keeps all ID wrappers structurally identical; server-assigned ids are opaque strings.
macro_rules! define_string_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> IdResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    BlankIdSnafu {
                        stage: "parse-id",
                        id_type: $id_type,
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(raw: &str) -> IdResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_string_id!(ConversationId, "conversation-id");
define_string_id!(MessageId, "message-id");
define_string_id!(UserId, "user-id");

impl MessageId {
    /// Mints a local id: UUIDv7 carries a millisecond timestamp plus a random tail.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}
