//! End-to-end storage tests
//!
//! These exercise the Postgres-backed services and are ignored by
//! default. Point DATABASE_URL at a disposable database and run
//! `cargo test -- --ignored` to include them; each test seeds its own
//! master data so runs do not collide.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use shared::types::DateRange;
use wms_engine::models::{LoanStatus, MovementKind, ReturnCondition};
use wms_engine::services::import::{ImportRow, ImportService};
use wms_engine::services::inventory::{Dispatch, DispatchItem, InventoryService, ReceiveLot};
use wms_engine::services::kardex::KardexService;
use wms_engine::services::ledger::{LedgerService, MovementFilter, NewMovement};
use wms_engine::services::loans::{CreateLoan, LoanFilter, LoanService, ReturnLoan};
use wms_engine::AppError;

struct Fixture {
    pool: PgPool,
    item_id: Uuid,
    location_id: Uuid,
    branch_id: Uuid,
    actor_id: Uuid,
}

async fn fixture() -> Fixture {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPool::connect(&url).await.expect("database connection");
    wms_engine::db::run_migrations(&pool).await.expect("migrations");

    // Short enough to stay within the import row's code length limits
    let tag = Uuid::new_v4().simple().to_string()[..12].to_string();

    let branch_id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO branches (name) VALUES ($1) RETURNING id",
    )
    .bind(format!("Branch {tag}"))
    .fetch_one(&pool)
    .await
    .expect("seed branch");

    let location_id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO locations (code, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(format!("LOC-{tag}"))
    .bind("Receiving dock")
    .fetch_one(&pool)
    .await
    .expect("seed location");

    let actor_id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO users (username, role) VALUES ($1, 'admin') RETURNING id",
    )
    .bind(format!("tester-{tag}"))
    .fetch_one(&pool)
    .await
    .expect("seed user");

    let item_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO items (sku, name, min_stock, sale_price, average_cost, is_loanable)
        VALUES ($1, $2, 5, 19.90, 12.50, TRUE)
        RETURNING id
        "#,
    )
    .bind(format!("SKU-{tag}"))
    .bind("Cordless drill")
    .fetch_one(&pool)
    .await
    .expect("seed item");

    Fixture {
        pool,
        item_id,
        location_id,
        branch_id,
        actor_id,
    }
}

fn single_line_dispatch(item_id: Uuid, quantity: i64) -> Dispatch {
    Dispatch {
        items: vec![DispatchItem { item_id, quantity }],
        branch_id: None,
        location_id: None,
        reference: None,
    }
}

fn receive_input(f: &Fixture, quantity: i64, unit_cost: &str) -> ReceiveLot {
    ReceiveLot {
        item_id: f.item_id,
        supplier_id: None,
        location_id: f.location_id,
        branch_id: f.branch_id,
        quantity,
        unit_cost: unit_cost.parse::<Decimal>().unwrap(),
        reference: None,
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database via DATABASE_URL"]
async fn receive_then_dispatch_honors_fifo_and_the_ledger() {
    let f = fixture().await;
    let inventory = InventoryService::new(f.pool.clone());
    let ledger = LedgerService::new(f.pool.clone());
    let kardex = KardexService::new(f.pool.clone());

    let day1 = Utc::now() - Duration::days(2);
    let day2 = Utc::now() - Duration::days(1);

    let first = inventory
        .receive_lot(f.actor_id, day1, receive_input(&f, 5, "10.00"))
        .await
        .unwrap();
    let second = inventory
        .receive_lot(f.actor_id, day2, receive_input(&f, 5, "11.00"))
        .await
        .unwrap();

    let lines = inventory
        .dispatch(
            f.actor_id,
            Utc::now(),
            Dispatch {
                items: vec![DispatchItem {
                    item_id: f.item_id,
                    quantity: 7,
                }],
                branch_id: Some(f.branch_id),
                location_id: None,
                reference: Some("WO-1042".to_string()),
            },
        )
        .await
        .unwrap();

    // Oldest lot drained first
    assert_eq!(lines[0].consumed[0].lot_id, first.id);
    assert_eq!(lines[0].consumed[0].quantity, 5);
    assert_eq!(lines[0].consumed[1].lot_id, second.id);
    assert_eq!(lines[0].consumed[1].quantity, 2);

    let lots = inventory.lots_for_item(f.item_id).await.unwrap();
    assert_eq!(lots[0].quantity_remaining, 0);
    assert_eq!(lots[1].quantity_remaining, 3);

    assert_eq!(inventory.available_stock(f.item_id, None).await.unwrap(), 3);

    // The ledger saw two entries and one exit, and the kardex agrees with
    // the live lot remainders
    let movements = ledger
        .list(MovementFilter {
            item_id: Some(f.item_id),
            range: Some(DateRange {
                start: day1 - Duration::hours(1),
                end: Utc::now() + Duration::hours(1),
            }),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(movements.len(), 3);

    let rows = kardex.replay_item(f.item_id).await.unwrap();
    assert_eq!(rows.last().unwrap().balance, 3);

    // Stock views: the branch-scoped overview matches, and the item (min
    // stock 5, 3 on hand) shows up as low on stock
    let overview = inventory.stock_on_hand(Some(f.branch_id)).await.unwrap();
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].item_id, f.item_id);
    assert_eq!(overview[0].on_hand, 3);

    let item = inventory.get_item(f.item_id).await.unwrap();
    assert!(item.is_below_min(overview[0].on_hand));
    let low = inventory.low_stock_items().await.unwrap();
    assert!(low.iter().any(|l| l.item_id == f.item_id && l.on_hand == 3));

    // Valuation and monthly totals are warehouse-wide; other fixtures may
    // contribute, so only lower bounds hold
    let value = inventory.total_inventory_value().await.unwrap();
    assert!(value >= "33.00".parse::<Decimal>().unwrap());

    let flow = ledger
        .monthly_flow(Utc::now() - Duration::days(90))
        .await
        .unwrap();
    let entries: i64 = flow.iter().map(|m| m.entries).sum();
    let exits: i64 = flow.iter().map(|m| m.exits).sum();
    assert!(entries >= 10);
    assert!(exits >= 7);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database via DATABASE_URL"]
async fn insufficient_dispatch_rolls_back_untouched() {
    let f = fixture().await;
    let inventory = InventoryService::new(f.pool.clone());

    inventory
        .receive_lot(f.actor_id, Utc::now(), receive_input(&f, 10, "10.00"))
        .await
        .unwrap();

    let err = inventory
        .dispatch(
            f.actor_id,
            Utc::now(),
            Dispatch {
                items: vec![DispatchItem {
                    item_id: f.item_id,
                    quantity: 11,
                }],
                branch_id: None,
                location_id: None,
                reference: None,
            },
        )
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientStock {
            available,
            requested,
        } => {
            assert_eq!(available, 10);
            assert_eq!(requested, 11);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Atomicity of failure: nothing was decremented, nothing was logged
    // beyond the receipt
    assert_eq!(inventory.available_stock(f.item_id, None).await.unwrap(), 10);
    let kardex = KardexService::new(f.pool.clone());
    let rows = kardex.replay_item(f.item_id).await.unwrap();
    assert_eq!(rows.len(), 1);

    // A standalone recorded adjustment replays as a loss
    let ledger = LedgerService::new(f.pool.clone());
    ledger
        .record(NewMovement {
            occurred_at: Utc::now(),
            user_id: f.actor_id,
            kind: MovementKind::Adjustment,
            quantity: 2,
            reference: Some("Shelf damage write-off".to_string()),
            item_id: Some(f.item_id),
            unit_cost: None,
        })
        .await
        .unwrap();

    let rows = kardex.replay_item(f.item_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.last().unwrap().balance, 8);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database via DATABASE_URL"]
async fn concurrent_dispatches_cannot_overdraw() {
    let f = fixture().await;
    let inventory = InventoryService::new(f.pool.clone());

    inventory
        .receive_lot(f.actor_id, Utc::now(), receive_input(&f, 10, "10.00"))
        .await
        .unwrap();

    let a = inventory.clone();
    let b = inventory.clone();
    let actor = f.actor_id;
    let item_id = f.item_id;
    let (first, second) = tokio::join!(
        tokio::spawn(async move {
            a.dispatch(actor, Utc::now(), single_line_dispatch(item_id, 7))
                .await
        }),
        tokio::spawn(async move {
            b.dispatch(actor, Utc::now(), single_line_dispatch(item_id, 6))
                .await
        }),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let winners = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(winners, 1, "exactly one dispatch may win");

    let losers: Vec<_> = outcomes.iter().filter(|o| o.is_err()).collect();
    assert!(matches!(
        losers[0].as_ref().unwrap_err(),
        AppError::InsufficientStock { .. }
    ));

    let remaining = inventory.available_stock(f.item_id, None).await.unwrap();
    assert!(remaining == 3 || remaining == 4);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database via DATABASE_URL"]
async fn loan_roundtrip_with_mixed_returns() {
    let f = fixture().await;
    let inventory = InventoryService::new(f.pool.clone());
    let loans = LoanService::new(f.pool.clone(), 7);
    let ledger = LedgerService::new(f.pool.clone());

    inventory
        .receive_lot(f.actor_id, Utc::now(), receive_input(&f, 10, "12.50"))
        .await
        .unwrap();

    let loan = loans
        .create(
            f.actor_id,
            Utc::now(),
            CreateLoan {
                item_id: f.item_id,
                requester: "Maria Lopez".to_string(),
                department: Some("Maintenance".to_string()),
                quantity: 10,
                due_at: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(inventory.available_stock(f.item_id, None).await.unwrap(), 0);

    loans
        .return_partial(
            f.actor_id,
            Utc::now(),
            loan.id,
            ReturnLoan {
                quantity: 4,
                condition: ReturnCondition::Good,
                notes: None,
            },
        )
        .await
        .unwrap();

    let closed = loans
        .return_partial(
            f.actor_id,
            Utc::now(),
            loan.id,
            ReturnLoan {
                quantity: 6,
                condition: ReturnCondition::Damaged,
                notes: Some("casing cracked".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(closed.status, LoanStatus::Returned);
    assert_eq!(closed.quantity_returned, 10);
    assert!(closed.returned_at.is_some());

    // Only the good portion came back on the shelf
    assert_eq!(inventory.available_stock(f.item_id, None).await.unwrap(), 4);

    // Exactly one loss adjustment of 6, and no entry for the damaged part
    let adjustments = ledger
        .list(MovementFilter {
            item_id: Some(f.item_id),
            kind: Some(MovementKind::Adjustment),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].quantity, 6);

    // A closed loan rejects any further return
    let err = loans
        .return_partial(
            f.actor_id,
            Utc::now(),
            loan.id,
            ReturnLoan {
                quantity: 1,
                condition: ReturnCondition::Good,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LoanAlreadyClosed(_)));

    // The monitor sees the closed loan, and the lent item really was a
    // loanable fixed asset
    let fetched = loans.get(loan.id).await.unwrap();
    assert_eq!(fetched.quantity_returned, 10);
    assert!(fetched.comments.as_deref().unwrap().contains("casing cracked"));

    let history = loans.list(LoanFilter::Returned, Utc::now()).await.unwrap();
    assert!(history.iter().any(|l| l.id == loan.id));
    let active = loans.list(LoanFilter::Active, Utc::now()).await.unwrap();
    assert!(active.iter().all(|l| l.id != loan.id));

    let stats = loans.stats(Utc::now()).await.unwrap();
    assert!(stats.returned >= 1);

    assert!(inventory.get_item(f.item_id).await.unwrap().is_loanable);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database via DATABASE_URL"]
async fn bulk_import_commits_rows_independently() {
    let f = fixture().await;
    let import = ImportService::new(f.pool.clone());
    let inventory = InventoryService::new(f.pool.clone());

    let sku = sqlx::query_scalar::<_, String>("SELECT sku FROM items WHERE id = $1")
        .bind(f.item_id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
    let location_code =
        sqlx::query_scalar::<_, String>("SELECT code FROM locations WHERE id = $1")
            .bind(f.location_id)
            .fetch_one(&f.pool)
            .await
            .unwrap();

    let rows = vec![
        ImportRow {
            sku: sku.clone(),
            location_code: location_code.clone(),
            quantity: 100,
            unit_cost: "150.50".parse().unwrap(),
            supplier_id: None,
        },
        ImportRow {
            sku: "NO-SUCH-SKU".to_string(),
            location_code: location_code.clone(),
            quantity: 5,
            unit_cost: "1.00".parse().unwrap(),
            supplier_id: None,
        },
        ImportRow {
            sku,
            location_code,
            quantity: 50,
            unit_cost: "149.00".parse().unwrap(),
            supplier_id: None,
        },
    ];

    let report = import
        .import(f.actor_id, Utc::now(), f.branch_id, rows)
        .await
        .unwrap();

    assert_eq!(report.received, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].row_index, 1);

    // The bad row did not roll back its neighbors
    assert_eq!(
        inventory.available_stock(f.item_id, None).await.unwrap(),
        150
    );
}
