//! Declarative state changes returned by command handlers.

use serde::{Deserialize, Serialize};

/// One state change. Handlers emit these; only the reducer applies them.
///
/// A serialized effect with an unrecognised `type` deserializes to
/// [`SideEffect::Unknown`], which the reducer skips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    /// Signed lamport delta
    UpdateBalance { address: String, amount: i64 },
    CreateKeypair { pubkey: String, path: String },
    CreateFile { path: String, content: String },
    SetConfig { key: String, value: String },
    RecordTx { signature: String, description: String },
    DeployProgram { program_id: String, authority: String },
    CreateMint {
        mint: String,
        symbol: Option<String>,
        decimals: u8,
        authority: String,
    },
    MintTokens { mint: String, holder: String, amount: u64 },
    TransferTokens {
        mint: String,
        from: String,
        to: String,
        amount: u64,
    },
    CreateDir { path: String },
    DeletePath { path: String },
    ChangeDir { path: String },
    SetEnv { key: String, value: String },
    #[serde(other)]
    Unknown,
}

/// Exit code for a successful command.
pub const EXIT_OK: i32 = 0;

/// Exit code for any failed command.
pub const EXIT_FAILURE: i32 = 1;

/// Outcome of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub side_effects: Vec<SideEffect>,
}

impl CommandResult {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn ok_with(stdout: impl Into<String>, side_effects: Vec<SideEffect>) -> Self {
        Self {
            stdout: stdout.into(),
            side_effects,
            ..Default::default()
        }
    }

    pub fn fail(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: EXIT_FAILURE,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_wire_format() {
        let effect = SideEffect::UpdateBalance {
            address: "A".into(),
            amount: -5,
        };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["type"], "update_balance");
        assert_eq!(json["amount"], -5);
    }

    #[test]
    fn test_unknown_effect_kind_deserializes() {
        let effect: SideEffect =
            serde_json::from_str(r#"{"type":"launch_rocket","speed":9}"#).unwrap();
        assert_eq!(effect, SideEffect::Unknown);
    }

    #[test]
    fn test_result_constructors() {
        assert!(CommandResult::ok("x").is_success());
        let failed = CommandResult::fail("bad");
        assert_eq!(failed.exit_code, 1);
        assert_eq!(failed.stderr, "bad");
        assert!(failed.side_effects.is_empty());
    }
}
