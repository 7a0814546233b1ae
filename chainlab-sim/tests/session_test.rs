//! End-to-end terminal sessions against the simulated ledger.

use chainlab_sim::generator::{generate, ValueKind};
use chainlab_sim::persistence::{self, MemoryStorage};
use chainlab_sim::{tokenize, CommandRegistry, Session, SideEffect};
use std::collections::HashSet;
use std::sync::Arc;

// =============================================================================
// Wallet scenarios
// =============================================================================

#[test]
fn test_keygen_then_address_is_stable() {
    let mut session = Session::with_seed("scenario-1");
    let created = session.run("solana-keygen new");
    assert!(created.is_success());

    let pubkey = created
        .stdout
        .lines()
        .find_map(|l| l.strip_prefix("pubkey: "))
        .expect("pubkey line")
        .to_string();

    for _ in 0..3 {
        let address = session.run("solana address");
        assert_eq!(address.exit_code, 0);
        assert_eq!(address.stdout.trim(), pubkey);
    }
}

#[test]
fn test_airdrop_then_balance() {
    let mut session = Session::with_seed("scenario-2");
    session.run("solana-keygen new");

    let airdrop = session.run("solana airdrop 2");
    assert!(airdrop.is_success(), "{}", airdrop.stderr);
    assert!(airdrop.stdout.starts_with("Requesting airdrop of 2 SOL"));
    assert!(airdrop.stdout.trim_end().ends_with("2 SOL"));

    assert_eq!(session.run("solana balance").stdout, "2 SOL\n");
}

#[test]
fn test_airdrop_above_cap_is_rate_limited() {
    let mut session = Session::with_seed("scenario-3");
    session.run("solana-keygen new");

    let result = session.run("solana airdrop 6");
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("rate limit"));
    assert!(result.side_effects.is_empty());
    assert_eq!(session.run("solana balance").stdout, "0 SOL\n");
}

#[test]
fn test_transfer_conservation_over_many_steps() {
    let mut session = Session::with_seed("conservation");
    session.run("solana-keygen new");
    let sender = session.run("solana address").stdout.trim().to_string();
    let recipient = session
        .run("solana-keygen new --outfile ~/bob.json")
        .stdout
        .lines()
        .find_map(|l| l.strip_prefix("pubkey: "))
        .unwrap()
        .to_string();

    session.run("solana airdrop 5");
    session.run("solana airdrop 5");

    let mut transferred = 0u64;
    let mut transfers = 0u64;
    for amount in ["0.5", "1", "2.25", "0.000000001", "100"] {
        let result = session.run(&format!("solana transfer {} {}", recipient, amount));
        if result.is_success() {
            transferred += chainlab_sim::ledger::parse_sol(amount).unwrap();
            transfers += 1;
        }
    }

    let fee = chainlab_sim::commands::TRANSFER_FEE_LAMPORTS;
    assert_eq!(transfers, 4);
    assert_eq!(session.chain().balance(&recipient), transferred);
    assert_eq!(
        session.chain().balance(&sender),
        10_000_000_000 - transferred - transfers * fee
    );
}

// =============================================================================
// Generator and tokenizer properties
// =============================================================================

#[test]
fn test_generator_distinct_over_large_sample() {
    let mut seen = HashSet::new();
    for counter in 0..5_000 {
        let value = generate("property-seed", counter, ValueKind::Address);
        assert_eq!(value, generate("property-seed", counter, ValueKind::Address));
        assert!(seen.insert(value), "collision at counter {}", counter);
    }
}

#[test]
fn test_quoted_spaces_survive_into_files() {
    let mut session = Session::with_seed("quotes");
    session.run(r#"echo "two  spaces" 'and more' > q.txt"#);
    assert_eq!(session.vfs().get_file("q.txt"), Some("two  spaces and more\n"));
    assert_eq!(tokenize(r#"cat "my file.txt""#).positionals, vec!["my file.txt"]);
}

// =============================================================================
// Reload
// =============================================================================

#[test]
fn test_reload_resumes_the_same_session() {
    let registry = Arc::new(CommandRegistry::new());
    let storage = MemoryStorage::new();

    let mut session = Session::new("reload", chrono::Utc::now(), Arc::clone(&registry));
    session.run("solana-keygen new");
    session.run("solana airdrop 1");
    persistence::save(&storage, &session).unwrap();

    let mut restored = persistence::load_or_default(&storage, registry, Session::fresh);
    assert_eq!(restored.run("solana balance").stdout, "1 SOL\n");

    let next = restored.run("solana airdrop 1");
    let earlier: Vec<_> = restored.chain().transactions.iter().map(|t| t.signature.clone()).collect();
    assert_eq!(earlier.len(), 2);
    assert_ne!(earlier[0], earlier[1]);
    assert!(next
        .side_effects
        .iter()
        .any(|e| matches!(e, SideEffect::RecordTx { .. })));
}
