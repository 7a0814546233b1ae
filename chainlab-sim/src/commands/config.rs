//! `config get` / `config set`.

use crate::effects::{CommandResult, SideEffect};
use crate::ledger::{resolve_endpoint, ClientConfig, Commitment};
use crate::path;
use crate::scaffold::CLI_CONFIG_PATH;
use crate::tokenizer::Invocation;

use super::{usage, HandlerContext};

const USAGE: &str = "config <get|set> [--url <URL_OR_MONIKER>] [--commitment <LEVEL>] [--keypair <PATH>]";

pub fn handle(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    match inv.positional(0) {
        Some("get") => CommandResult::ok(render(&ctx.chain.config)),
        Some("set") => set(inv, ctx),
        Some(other) => usage(&format!("unrecognized subcommand '{}'", other), USAGE),
        None => usage("a subcommand is required", USAGE),
    }
}

fn set(inv: &Invocation, ctx: &HandlerContext<'_>) -> CommandResult {
    let url = inv.flag("url").or_else(|| inv.positional(1));

    if inv.positionals.len() > 2 {
        return usage("too many arguments", USAGE);
    }

    let mut next = ctx.chain.config.clone();
    let mut effects = Vec::new();

    if let Some(url) = url {
        let Some(endpoint) = resolve_endpoint(url) else {
            return CommandResult::fail(format!("error: Unrecognized URL or moniker: {}\n", url));
        };
        next.json_rpc_url = endpoint.rpc_url;
        next.websocket_url = endpoint.websocket_url;
        effects.push(SideEffect::SetConfig {
            key: "json_rpc_url".into(),
            value: next.json_rpc_url.clone(),
        });
        effects.push(SideEffect::SetConfig {
            key: "websocket_url".into(),
            value: next.websocket_url.clone(),
        });
    }

    if let Some(level) = inv.flag("commitment") {
        match level.parse::<Commitment>() {
            Ok(commitment) => {
                next.commitment = commitment;
                effects.push(SideEffect::SetConfig {
                    key: "commitment".into(),
                    value: commitment.to_string(),
                });
            }
            Err(e) => return CommandResult::fail(format!("error: {}\n", e)),
        }
    }

    if let Some(keypair) = inv.flag("keypair") {
        next.keypair_path = path::display(&ctx.resolve(keypair));
        effects.push(SideEffect::SetConfig {
            key: "keypair_path".into(),
            value: next.keypair_path.clone(),
        });
    }

    if effects.is_empty() {
        return usage("at least one of --url, --commitment or --keypair is required", USAGE);
    }

    effects.push(SideEffect::CreateFile {
        path: CLI_CONFIG_PATH.to_string(),
        content: config_yaml(&next),
    });

    CommandResult::ok_with(render(&next), effects)
}

fn render(config: &ClientConfig) -> String {
    format!(
        "Config File: ~/{}\nRPC URL: {}\nWebSocket URL: {} (computed)\nKeypair Path: {}\nCommitment: {}\n",
        CLI_CONFIG_PATH,
        config.json_rpc_url,
        config.websocket_url,
        config.keypair_path,
        config.commitment
    )
}

fn config_yaml(config: &ClientConfig) -> String {
    format!(
        "---\njson_rpc_url: \"{}\"\nwebsocket_url: \"{}\"\nkeypair_path: {}\ncommitment: {}\n",
        config.json_rpc_url, config.websocket_url, config.keypair_path, config.commitment
    )
}
