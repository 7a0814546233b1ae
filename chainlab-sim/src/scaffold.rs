//! Fixed project template every new session starts from.

use crate::vfs::Vfs;

/// Default project directory name inside the workspace.
pub const PROJECT_NAME: &str = "hello_anchor";

/// Where the CLI keeps its configuration file.
pub const CLI_CONFIG_PATH: &str = ".config/solana/cli/config.yml";

/// Default keypair location used by `keygen new` and `config`.
pub const DEFAULT_KEYPAIR_PATH: &str = "~/.config/solana/id.json";

const ANCHOR_TOML: &str = r#"[toolchain]

[features]
seeds = false
skip-lint = false

[programs.localnet]
hello_anchor = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS"

[registry]
url = "https://api.apr.dev"

[provider]
cluster = "Localnet"
wallet = "~/.config/solana/id.json"

[scripts]
test = "yarn run ts-mocha -p ./tsconfig.json -t 1000000 tests/**/*.ts"
"#;

const WORKSPACE_CARGO_TOML: &str = r#"[workspace]
members = [
    "programs/*"
]
resolver = "2"

[profile.release]
overflow-checks = true
lto = "fat"
codegen-units = 1
"#;

const PROGRAM_CARGO_TOML: &str = r#"[package]
name = "hello_anchor"
version = "0.1.0"
description = "Created with Anchor"
edition = "2021"

[lib]
crate-type = ["cdylib", "lib"]
name = "hello_anchor"

[features]
no-entrypoint = []
no-idl = []
cpi = ["no-entrypoint"]
default = []

[dependencies]
anchor-lang = "0.30.1"
"#;

const PROGRAM_LIB_RS: &str = r#"use anchor_lang::prelude::*;

declare_id!("Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS");

#[program]
pub mod hello_anchor {
    use super::*;

    pub fn initialize(ctx: Context<Initialize>, data: u64) -> Result<()> {
        ctx.accounts.new_account.data = data;
        msg!("Changed data to: {}!", data);
        Ok(())
    }
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(init, payer = signer, space = 8 + 8)]
    pub new_account: Account<'info, NewAccount>,
    #[account(mut)]
    pub signer: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[account]
pub struct NewAccount {
    data: u64,
}
"#;

const TEST_TS: &str = r#"import * as anchor from "@coral-xyz/anchor";
import { Program } from "@coral-xyz/anchor";
import { HelloAnchor } from "../target/types/hello_anchor";

describe("hello_anchor", () => {
  anchor.setProvider(anchor.AnchorProvider.env());
  const program = anchor.workspace.HelloAnchor as Program<HelloAnchor>;

  it("Is initialized!", async () => {
    const tx = await program.methods.initialize(new anchor.BN(42)).rpc();
    console.log("Your transaction signature", tx);
  });
});
"#;

const CLI_CONFIG_YML: &str = r#"---
json_rpc_url: "https://api.devnet.solana.com"
websocket_url: ""
keypair_path: ~/.config/solana/id.json
commitment: confirmed
"#;

const README_MD: &str = "# hello_anchor\n\nRun `anchor build` to compile the program and `anchor deploy` to ship it.\n";

/// Files of the seeded workspace, root-relative.
pub fn template_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("hello_anchor/Anchor.toml", ANCHOR_TOML),
        ("hello_anchor/Cargo.toml", WORKSPACE_CARGO_TOML),
        ("hello_anchor/README.md", README_MD),
        ("hello_anchor/programs/hello_anchor/Cargo.toml", PROGRAM_CARGO_TOML),
        ("hello_anchor/programs/hello_anchor/src/lib.rs", PROGRAM_LIB_RS),
        ("hello_anchor/tests/hello_anchor.ts", TEST_TS),
        (CLI_CONFIG_PATH, CLI_CONFIG_YML),
    ]
}

/// The tree a fresh session starts with.
pub fn project_template() -> Vfs {
    Vfs::from_files(template_files()).unwrap_or_default()
}
