//! Native-currency verbs: keypairs, balances, airdrops, transfers.

use crate::effects::{CommandResult, SideEffect};
use crate::generator::{is_address, keypair_bytes};
use crate::ledger::{format_sol, parse_sol, LAMPORTS_PER_SOL};
use crate::path;
use crate::tokenizer::Invocation;

use super::{usage, HandlerContext};

/// Largest airdrop a single request may ask for (5 SOL).
pub const AIRDROP_CAP_LAMPORTS: u64 = 5 * LAMPORTS_PER_SOL;

/// Flat fee charged to the sender of every transfer.
pub const TRANSFER_FEE_LAMPORTS: u64 = 5_000;

const RULE: &str = "================================================================================";

pub fn keygen(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    match inv.positional(0) {
        Some("new") => keygen_new(inv, ctx),
        Some("pubkey") => keygen_pubkey(inv, ctx),
        Some(other) => usage(
            &format!("unrecognized subcommand '{}'", other),
            "keygen <new|pubkey> [--outfile <PATH>]",
        ),
        None => usage("a subcommand is required", "keygen <new|pubkey> [--outfile <PATH>]"),
    }
}

fn keygen_new(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let short = match inv.positionals.as_slice() {
        [_, o, path] if o == "-o" => Some(path.as_str()),
        [_] => None,
        _ => return usage("unexpected arguments", "keygen new [--outfile <PATH>]"),
    };
    let outfile = inv
        .flag("outfile")
        .or(short)
        .unwrap_or(&ctx.chain.config.keypair_path);
    let target = ctx.resolve(outfile);
    if target.is_empty() || ctx.vfs.is_dir(&target) {
        return CommandResult::fail(format!("error: {} is a directory\n", outfile));
    }

    let pubkey = ctx.entropy.address();
    let keypair_path = path::display(&target);
    let content = serde_json::to_string(&keypair_bytes(&pubkey)).unwrap_or_default();

    let stdout = format!(
        "Generating a new keypair\n\nWrote new keypair to {}\n{}\npubkey: {}\n{}\n",
        keypair_path, RULE, pubkey, RULE
    );

    CommandResult::ok_with(
        stdout,
        vec![
            SideEffect::CreateKeypair {
                pubkey,
                path: keypair_path,
            },
            SideEffect::CreateFile {
                path: target,
                content,
            },
        ],
    )
}

fn keygen_pubkey(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let input = inv
        .positional(1)
        .unwrap_or(&ctx.chain.config.keypair_path);
    let target = ctx.resolve(input);
    match ctx.chain.wallet_for_keypair(&target) {
        Some(pubkey) => CommandResult::ok(format!("{}\n", pubkey)),
        None => CommandResult::fail(format!("error: No keypair found at {}\n", input)),
    }
}

pub fn address(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    if let Some(keypair) = inv.flag("keypair") {
        let target = ctx.resolve(keypair);
        return match ctx.chain.wallet_for_keypair(&target) {
            Some(pubkey) => CommandResult::ok(format!("{}\n", pubkey)),
            None => CommandResult::fail(format!("error: No keypair found at {}\n", keypair)),
        };
    }

    match ctx.signer() {
        Ok(signer) => CommandResult::ok(format!("{}\n", signer)),
        Err(failure) => failure,
    }
}

pub fn balance(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    if inv.positionals.len() > 1 {
        return usage("too many arguments", "balance [ADDRESS] [--lamports]");
    }

    let target = match inv.positional(0) {
        Some(address) if is_address(address) => address.to_string(),
        Some(address) => return CommandResult::fail(format!("error: Invalid pubkey: {}\n", address)),
        None => match ctx.signer() {
            Ok(signer) => signer,
            Err(failure) => return failure,
        },
    };

    let lamports = ctx.chain.balance(&target);
    if inv.has_flag("lamports") {
        CommandResult::ok(format!("{} lamports\n", lamports))
    } else {
        CommandResult::ok(format!("{} SOL\n", format_sol(lamports)))
    }
}

pub fn airdrop(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    const USAGE: &str = "airdrop <AMOUNT> [RECIPIENT]";

    let (amount, recipient) = match inv.positionals.as_slice() {
        [amount] => (amount, None),
        [amount, recipient] => (amount, Some(recipient)),
        [] => return usage("the amount to request is required", USAGE),
        _ => return usage("too many arguments", USAGE),
    };

    let Some(lamports) = parse_sol(amount) else {
        return CommandResult::fail(format!("error: Invalid amount: {}\n", amount));
    };
    if lamports == 0 {
        return CommandResult::fail("error: Airdrop amount must be greater than zero\n");
    }
    if lamports > AIRDROP_CAP_LAMPORTS {
        return CommandResult::fail(
            "Error: airdrop request failed. This can happen when the rate limit is reached.\n",
        );
    }

    let target = match recipient {
        Some(address) if is_address(address) => address.clone(),
        Some(address) => return CommandResult::fail(format!("error: Invalid pubkey: {}\n", address)),
        None => match ctx.signer() {
            Ok(signer) => signer,
            Err(failure) => return failure,
        },
    };

    let Some(new_balance) = ctx.chain.balance(&target).checked_add(lamports) else {
        return CommandResult::fail("error: Balance overflow\n");
    };
    let Ok(delta) = i64::try_from(lamports) else {
        return CommandResult::fail(format!("error: Invalid amount: {}\n", amount));
    };

    let signature = ctx.entropy.signature();
    let stdout = format!(
        "Requesting airdrop of {} SOL\n\nSignature: {}\n\n{} SOL\n",
        format_sol(lamports),
        signature,
        format_sol(new_balance)
    );

    CommandResult::ok_with(
        stdout,
        vec![
            SideEffect::UpdateBalance {
                address: target.clone(),
                amount: delta,
            },
            SideEffect::RecordTx {
                signature,
                description: format!("airdrop {} SOL to {}", format_sol(lamports), target),
            },
        ],
    )
}

pub fn transfer(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    const USAGE: &str = "transfer <RECIPIENT> <AMOUNT>";

    let [recipient, amount] = inv.positionals.as_slice() else {
        return usage("expected a recipient and an amount", USAGE);
    };

    let sender = match ctx.signer() {
        Ok(signer) => signer,
        Err(failure) => return failure,
    };
    if !is_address(recipient) {
        return CommandResult::fail(format!("error: Invalid pubkey: {}\n", recipient));
    }
    let Some(lamports) = parse_sol(amount) else {
        return CommandResult::fail(format!("error: Invalid amount: {}\n", amount));
    };
    if lamports == 0 {
        return CommandResult::fail("error: Transfer amount must be greater than zero\n");
    }

    let Some(required) = lamports.checked_add(TRANSFER_FEE_LAMPORTS) else {
        return CommandResult::fail(format!("error: Invalid amount: {}\n", amount));
    };
    let (Ok(debit), Ok(credit)) = (i64::try_from(required), i64::try_from(lamports)) else {
        return CommandResult::fail(format!("error: Invalid amount: {}\n", amount));
    };

    if ctx.chain.balance(&sender) < required {
        return CommandResult::fail(format!(
            "Error: Account {} has insufficient funds for spend ({} SOL) + fee ({} SOL)\n",
            sender,
            format_sol(lamports),
            format_sol(TRANSFER_FEE_LAMPORTS)
        ));
    }

    let signature = ctx.entropy.signature();
    CommandResult::ok_with(
        format!("Signature: {}\n", signature),
        vec![
            SideEffect::UpdateBalance {
                address: sender.clone(),
                amount: -debit,
            },
            SideEffect::UpdateBalance {
                address: recipient.clone(),
                amount: credit,
            },
            SideEffect::RecordTx {
                signature,
                description: format!(
                    "transfer {} SOL from {} to {}",
                    format_sol(lamports),
                    sender,
                    recipient
                ),
            },
        ],
    )
}

pub fn confirm(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let [signature] = inv.positionals.as_slice() else {
        return usage("expected exactly one signature", "confirm <SIGNATURE>");
    };

    match ctx.chain.find_transaction(signature) {
        Some(_) => CommandResult::ok(format!("{}\n", ctx.chain.config.commitment.status_label())),
        None => CommandResult::fail(format!(
            "Unable to confirm transaction. Not found: {}\n",
            signature
        )),
    }
}
