//! Token verbs (`spl-token …` / `token …`).
//!
//! Amounts are typed in whole-token decimal notation and held in base units
//! scaled by the mint's `decimals`. A mint's supply only ever moves together
//! with one holder balance, so supply stays equal to the holder total.

use crate::effects::{CommandResult, SideEffect};
use crate::generator::is_address;
use crate::ledger::{format_units, parse_units, ChainState, TokenMint, SOL_DECIMALS};
use crate::tokenizer::Invocation;

use super::{usage, HandlerContext};

const USAGE: &str = "token <create-token|mint|transfer|supply|balance|accounts> [ARGS]";

pub fn handle(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let sub = inv.shift();
    match sub.command.as_str() {
        "create-token" => create_token(&sub, ctx),
        "mint" => mint(&sub, ctx),
        "transfer" => transfer(&sub, ctx),
        "supply" => supply(&sub, ctx),
        "balance" => balance(&sub, ctx),
        "accounts" => accounts(ctx),
        "" => usage("a subcommand is required", USAGE),
        other => usage(&format!("unrecognized subcommand '{}'", other), USAGE),
    }
}

fn lookup<'c>(chain: &'c ChainState, mint: &str) -> Result<&'c TokenMint, CommandResult> {
    chain
        .token_mints
        .get(mint)
        .ok_or_else(|| CommandResult::fail(format!("Error: Account not found: {}\n", mint)))
}

fn create_token(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    if !inv.positionals.is_empty() {
        return usage(
            "create-token takes no positional arguments",
            "token create-token [--decimals <N>] [--symbol <S>]",
        );
    }

    let decimals = match inv.flag("decimals") {
        None => SOL_DECIMALS,
        Some(raw) => match raw.parse::<u8>() {
            Ok(d) if d <= SOL_DECIMALS => d,
            _ => {
                return CommandResult::fail(format!(
                    "error: Invalid decimals '{}': expected 0 to {}\n",
                    raw, SOL_DECIMALS
                ))
            }
        },
    };
    let symbol = inv.flag("symbol").map(str::to_string);

    let authority = match ctx.signer() {
        Ok(signer) => signer,
        Err(failure) => return failure,
    };

    let mint = ctx.entropy.address();
    let signature = ctx.entropy.signature();

    CommandResult::ok_with(
        format!(
            "Creating token {}\n\nAddress:  {}\nDecimals:  {}\n\nSignature: {}\n",
            mint, mint, decimals, signature
        ),
        vec![
            SideEffect::CreateMint {
                mint: mint.clone(),
                symbol,
                decimals,
                authority,
            },
            SideEffect::RecordTx {
                signature,
                description: format!("create token {}", mint),
            },
        ],
    )
}

fn mint(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    const MINT_USAGE: &str = "token mint <MINT> <AMOUNT> [RECIPIENT]";

    let (mint_address, amount, recipient) = match inv.positionals.as_slice() {
        [mint, amount] => (mint, amount, None),
        [mint, amount, recipient] => (mint, amount, Some(recipient)),
        _ => return usage("expected a mint and an amount", MINT_USAGE),
    };

    let signer = match ctx.signer() {
        Ok(signer) => signer,
        Err(failure) => return failure,
    };
    let token = match lookup(ctx.chain, mint_address) {
        Ok(token) => token,
        Err(failure) => return failure,
    };
    if token.authority != signer {
        return CommandResult::fail(format!(
            "Error: {} is not the mint authority of {}\n",
            signer, mint_address
        ));
    }

    let holder = match recipient {
        Some(address) if is_address(address) => address.clone(),
        Some(address) => return CommandResult::fail(format!("error: Invalid pubkey: {}\n", address)),
        None => signer,
    };

    let units = match parse_units(amount, token.decimals) {
        Some(units) if units > 0 => units,
        _ => return CommandResult::fail(format!("error: Invalid amount: {}\n", amount)),
    };
    if token.supply.checked_add(units).is_none() {
        return CommandResult::fail("Error: Mint would overflow the token supply\n");
    }

    let shown = format_units(units, token.decimals);
    let signature = ctx.entropy.signature();

    CommandResult::ok_with(
        format!(
            "Minting {} tokens\n  Token: {}\n  Recipient: {}\n\nSignature: {}\n",
            shown, mint_address, holder, signature
        ),
        vec![
            SideEffect::MintTokens {
                mint: mint_address.clone(),
                holder: holder.clone(),
                amount: units,
            },
            SideEffect::RecordTx {
                signature,
                description: format!("mint {} of {} to {}", shown, mint_address, holder),
            },
        ],
    )
}

fn transfer(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let [mint_address, amount, recipient] = inv.positionals.as_slice() else {
        return usage(
            "expected a mint, an amount and a recipient",
            "token transfer <MINT> <AMOUNT> <RECIPIENT>",
        );
    };

    let sender = match ctx.signer() {
        Ok(signer) => signer,
        Err(failure) => return failure,
    };
    let token = match lookup(ctx.chain, mint_address) {
        Ok(token) => token,
        Err(failure) => return failure,
    };
    if !is_address(recipient) {
        return CommandResult::fail(format!("error: Invalid pubkey: {}\n", recipient));
    }

    let units = match parse_units(amount, token.decimals) {
        Some(units) if units > 0 => units,
        _ => return CommandResult::fail(format!("error: Invalid amount: {}\n", amount)),
    };
    let held = token.balance_of(&sender);
    if held < units {
        return CommandResult::fail(format!(
            "Error: Insufficient funds: {} available, {} requested\n",
            format_units(held, token.decimals),
            format_units(units, token.decimals)
        ));
    }

    let shown = format_units(units, token.decimals);
    let signature = ctx.entropy.signature();

    CommandResult::ok_with(
        format!(
            "Transfer {} tokens\n  Sender: {}\n  Recipient: {}\n\nSignature: {}\n",
            shown, sender, recipient, signature
        ),
        vec![
            SideEffect::TransferTokens {
                mint: mint_address.clone(),
                from: sender.clone(),
                to: recipient.clone(),
                amount: units,
            },
            SideEffect::RecordTx {
                signature,
                description: format!(
                    "transfer {} of {} from {} to {}",
                    shown, mint_address, sender, recipient
                ),
            },
        ],
    )
}

fn supply(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let [mint_address] = inv.positionals.as_slice() else {
        return usage("expected exactly one mint", "token supply <MINT>");
    };
    match lookup(ctx.chain, mint_address) {
        Ok(token) => CommandResult::ok(format!("{}\n", format_units(token.supply, token.decimals))),
        Err(failure) => failure,
    }
}

fn balance(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (mint_address, owner) = match inv.positionals.as_slice() {
        [mint] => (mint, None),
        [mint, owner] => (mint, Some(owner.clone())),
        _ => return usage("expected a mint", "token balance <MINT> [OWNER]"),
    };

    let owner = match owner {
        Some(owner) => owner,
        None => match ctx.signer() {
            Ok(signer) => signer,
            Err(failure) => return failure,
        },
    };
    match lookup(ctx.chain, mint_address) {
        Ok(token) => CommandResult::ok(format!(
            "{}\n",
            format_units(token.balance_of(&owner), token.decimals)
        )),
        Err(failure) => failure,
    }
}

fn accounts(ctx: &mut HandlerContext<'_>) -> CommandResult {
    let owner = match ctx.signer() {
        Ok(signer) => signer,
        Err(failure) => return failure,
    };

    let held: Vec<_> = ctx
        .chain
        .token_mints
        .iter()
        .filter(|(_, token)| token.holders.contains_key(&owner))
        .collect();
    if held.is_empty() {
        return CommandResult::ok("No token accounts found\n");
    }

    let mut out = format!("{:<44}  {}\n{}\n", "Token", "Balance", "-".repeat(60));
    for (mint, token) in held {
        let label = match &token.symbol {
            Some(symbol) => format!("{} ({})", format_units(token.balance_of(&owner), token.decimals), symbol),
            None => format_units(token.balance_of(&owner), token.decimals),
        };
        out.push_str(&format!("{:<44}  {}\n", mint, label));
    }
    CommandResult::ok(out)
}

#[cfg(test)]
mod tests {
    use crate::session::Session;

    fn with_mint(seed: &str, decimals: u8) -> (Session, String, String) {
        let mut session = Session::with_seed(seed);
        session.run("keygen new");
        let owner = session.run("address").stdout.trim().to_string();
        let created = session.run(&format!("spl-token create-token --decimals {} --symbol LAB", decimals));
        assert!(created.is_success(), "{}", created.stderr);
        let mint = created
            .stdout
            .lines()
            .find_map(|l| l.strip_prefix("Address:  "))
            .unwrap()
            .to_string();
        (session, owner, mint)
    }

    fn second_wallet(session: &mut Session) -> String {
        session
            .run("keygen new --outfile ~/friend.json")
            .stdout
            .lines()
            .find_map(|l| l.strip_prefix("pubkey: "))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_create_mint_and_supply() {
        let (mut session, owner, mint) = with_mint("tok", 2);
        assert!(session.run(&format!("token mint {} 10.5", mint)).is_success());
        assert_eq!(session.run(&format!("token supply {}", mint)).stdout, "10.5\n");
        assert_eq!(session.chain().token_balance(&mint, &owner), 1_050);
    }

    #[test]
    fn test_supply_equals_holder_total_through_transfers() {
        let (mut session, owner, mint) = with_mint("tok", 0);
        let friend = second_wallet(&mut session);

        for line in [
            format!("token mint {} 100", mint),
            format!("token transfer {} 30 {}", mint, friend),
            format!("token mint {} 7 {}", mint, friend),
            format!("token transfer {} 70 {}", mint, friend),
        ] {
            assert!(session.run(&line).is_success(), "{}", line);
        }

        let rejected = session.run(&format!("token transfer {} 1 {}", mint, friend));
        assert_eq!(rejected.exit_code, 1);
        assert!(rejected.stderr.contains("Insufficient funds"));

        let token = &session.chain().token_mints[&mint];
        assert_eq!(token.supply, 107);
        assert_eq!(token.holder_total(), token.supply);
        assert_eq!(token.balance_of(&owner), 0);
        assert_eq!(token.balance_of(&friend), 107);
    }

    #[test]
    fn test_only_authority_may_mint() {
        let (mut session, _, mint) = with_mint("tok", 0);
        session.run("keygen new --outfile ~/friend.json");
        assert!(session.run("config set --keypair ~/friend.json").is_success());

        let result = session.run(&format!("token mint {} 5", mint));
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("mint authority"));
        assert_eq!(session.chain().token_mints[&mint].supply, 0);
    }

    #[test]
    fn test_invalid_arguments() {
        let (mut session, _, mint) = with_mint("tok", 2);
        assert_eq!(session.run("token create-token --decimals 12").exit_code, 1);
        assert_eq!(session.run(&format!("token mint {} 0", mint)).exit_code, 1);
        assert_eq!(session.run(&format!("token mint {} 1.001", mint)).exit_code, 1);
        assert_eq!(session.run("token supply Unknown111").exit_code, 1);
        assert_eq!(session.run("token launch").exit_code, 1);
        assert_eq!(session.run("token").exit_code, 1);
    }

    #[test]
    fn test_balance_and_accounts() {
        let (mut session, _, mint) = with_mint("tok", 3);
        assert_eq!(session.run("token accounts").stdout, "No token accounts found\n");
        session.run(&format!("token mint {} 2", mint));
        assert_eq!(session.run(&format!("token balance {}", mint)).stdout, "2\n");
        let listed = session.run("spl-token accounts");
        assert!(listed.stdout.contains(&mint));
        assert!(listed.stdout.contains("2 (LAB)"));
    }
}
