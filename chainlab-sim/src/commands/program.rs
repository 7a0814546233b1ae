//! `program deploy` / `program show`.

use crate::effects::{CommandResult, SideEffect};
use crate::ledger::UPGRADEABLE_LOADER_ID;
use crate::tokenizer::Invocation;

use super::{usage, HandlerContext};

const USAGE: &str = "program <deploy <PROGRAM_FILE>|show <PROGRAM_ID>|show --programs>";

pub fn handle(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    match inv.positional(0) {
        Some("deploy") => deploy(inv, ctx),
        Some("show") => show(inv, ctx),
        Some(other) => usage(&format!("unrecognized subcommand '{}'", other), USAGE),
        None => usage("a subcommand is required", USAGE),
    }
}

fn deploy(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let [_, program_file] = inv.positionals.as_slice() else {
        return usage("expected exactly one program file", USAGE);
    };

    let target = ctx.resolve(program_file);
    if ctx.vfs.get_file(&target).is_none() {
        return CommandResult::fail(format!(
            "Error: Unable to open program file: {}\n",
            program_file
        ));
    }

    let authority = match ctx.signer() {
        Ok(signer) => signer,
        Err(failure) => return failure,
    };

    let program_id = ctx.entropy.address();
    let signature = ctx.entropy.signature();

    CommandResult::ok_with(
        format!("Program Id: {}\n\nSignature: {}\n", program_id, signature),
        vec![
            SideEffect::DeployProgram {
                program_id: program_id.clone(),
                authority,
            },
            SideEffect::RecordTx {
                signature,
                description: format!("deploy program {} from {}", program_id, target),
            },
        ],
    )
}

fn show(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    if inv.has_flag("programs") {
        if ctx.chain.programs.is_empty() {
            return CommandResult::ok("No programs found\n");
        }
        let mut out = format!("{:<44} | {:<44}\n", "Program Id", "Authority");
        for (id, account) in &ctx.chain.programs {
            out.push_str(&format!("{:<44} | {:<44}\n", id, account.authority));
        }
        return CommandResult::ok(out);
    }

    let [_, program_id] = inv.positionals.as_slice() else {
        return usage("expected exactly one program id", USAGE);
    };

    match ctx.chain.programs.get(program_id) {
        Some(account) => CommandResult::ok(format!(
            "\nProgram Id: {}\nOwner: {}\nAuthority: {}\n",
            program_id, UPGRADEABLE_LOADER_ID, account.authority
        )),
        None => CommandResult::fail(format!(
            "Error: Unable to find the account {}\n",
            program_id
        )),
    }
}
