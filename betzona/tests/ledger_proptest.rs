//! Property tests for ledger balance conservation.
//!
//! For any sequence of placements and cancellations, the user's balance plus
//! the stakes of their pending bets always equals the starting balance, and
//! no match ever carries more than one pending bet for the user.

use betzona::auth::{NewUser, Role};
use betzona::db::{BetRepository, MemoryStore, UserRepository};
use betzona::fixtures::{MatchManager, NewMatch};
use betzona::ledger::{BetFilter, BetManager, BetStatus, PlaceBetRequest};
use betzona::Pagination;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::{collections::HashMap, sync::Arc};

const MATCHES: i64 = 4;

#[derive(Debug, Clone)]
enum Op {
    Place { match_idx: i64, cents: i64 },
    Cancel { pick: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..MATCHES, 1i64..6_000).prop_map(|(match_idx, cents)| Op::Place { match_idx, cents }),
        (0usize..8).prop_map(|pick| Op::Cancel { pick }),
    ]
}

async fn run(ops: Vec<Op>, starting_cents: i64) -> Result<(), TestCaseError> {
    let store = Arc::new(MemoryStore::new());
    let starting = Decimal::new(starting_cents, 2);
    let matches = MatchManager::new(store.clone());
    let ledger = BetManager::new(store.clone(), store.clone());

    // Straight to the store; password hashing is irrelevant here
    let user = store
        .create_user(NewUser {
            name: "Prop".to_string(),
            email: "prop@example.com".to_string(),
            password_hash: "unused".to_string(),
            role: Role::User,
            balance: starting,
        })
        .await
        .unwrap();

    let start = Utc::now() + Duration::days(1);
    let mut match_ids = Vec::new();
    for i in 0..MATCHES {
        let m = matches
            .create_match(NewMatch {
                tournament_id: 1,
                home_team_id: i * 2 + 1,
                away_team_id: i * 2 + 2,
                start_time: start,
                end_time: start + Duration::hours(2),
                stadium: None,
                referee: None,
            })
            .await
            .unwrap();
        match_ids.push(m.id);
    }

    let mut placed = Vec::new();
    for op in ops {
        match op {
            Op::Place { match_idx, cents } => {
                let req = PlaceBetRequest {
                    match_id: match_ids[match_idx as usize],
                    bet_type: "goals".to_string(),
                    amount: Decimal::new(cents, 2),
                    odds: Decimal::new(150, 2),
                    promotion_id: None,
                };
                if let Ok(bet) = ledger.place_bet(user.id, req).await {
                    placed.push(bet.id);
                }
            }
            Op::Cancel { pick } => {
                if !placed.is_empty() {
                    let bet_id = placed[pick % placed.len()];
                    let _ = ledger.cancel_bet(user.id, bet_id).await;
                }
            }
        }

        let balance = store.find_account(user.id).await.unwrap().unwrap().balance;
        let pending = ledger
            .list_bets(
                user.id,
                &BetFilter {
                    status: Some(BetStatus::Pending),
                    ..Default::default()
                },
                Pagination::new(1, 100),
            )
            .await
            .unwrap();
        let reserved: Decimal = pending.items.iter().map(|b| b.amount).sum();

        prop_assert!(balance >= Decimal::ZERO);
        prop_assert_eq!(balance + reserved, starting);

        let mut per_match: HashMap<i64, usize> = HashMap::new();
        for bet in &pending.items {
            *per_match.entry(bet.match_id).or_default() += 1;
        }
        prop_assert!(per_match.values().all(|n| *n == 1));
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balance_is_conserved(
        ops in prop::collection::vec(op_strategy(), 1..40),
        starting_cents in 0i64..20_000,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run(ops, starting_cents))?;
    }
}
