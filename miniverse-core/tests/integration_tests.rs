//! Integration tests for miniverse-core services
//!
//! These tests exercise the ledger end to end against a real DuckDB file.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use miniverse_core::config::Config;
use miniverse_core::domain::guard::ensure_sufficient;
use miniverse_core::ports::LedgerStore;
use miniverse_core::services::journal::{create_movement, stage_movement};
use miniverse_core::services::transfer::create_transfer;
use miniverse_core::services::{StagedMovements, TransferPolicy};
use miniverse_core::domain::MAX_AMOUNT_ABS;
use miniverse_core::{Error, MiniverseContext, MovementType, TransferType, UserId};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a file-backed context in a temp directory
fn create_test_context(temp_dir: &TempDir) -> MiniverseContext {
    MiniverseContext::new(temp_dir.path()).expect("Failed to create context")
}

fn uid(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

/// Create a user with opening funds
fn create_user(ctx: &MiniverseContext, id: &str, funds: Decimal) -> UserId {
    let user_id = uid(id);
    ctx.user_service
        .create(&user_id, id, "secret", Some(funds))
        .expect("Failed to create user");
    user_id
}

fn balance(ctx: &MiniverseContext, id: &UserId) -> Decimal {
    ctx.user_service.balance(id).unwrap().balance
}

/// Balance must equal the sum of the user's movements at every observation
fn assert_ledger_consistent(ctx: &MiniverseContext) {
    let report = ctx.status_service.audit().unwrap();
    assert!(
        report.is_consistent(),
        "balances diverged: {:?}",
        report.divergences
    );
}

// ============================================================================
// Balance Guard
// ============================================================================

#[test]
fn test_guard_examples() {
    assert!(ensure_sufficient(dec!(100), dec!(-90)).is_ok());
    assert!(ensure_sufficient(dec!(100), dec!(-100)).is_ok());
    assert!(matches!(
        ensure_sufficient(dec!(100), dec!(-110)),
        Err(Error::InsufficientFunds(_))
    ));
    assert!(ensure_sufficient(Decimal::ZERO, dec!(1)).is_ok());
}

// ============================================================================
// Movement Journal
// ============================================================================

#[test]
fn test_zero_movement_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));

    let err = ctx
        .journal
        .record(&a, Decimal::ZERO, MovementType::FundsWithdrawal)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));
    assert_eq!(balance(&ctx, &a), dec!(100));
    assert_eq!(ctx.journal.list_for_user(&a, false).unwrap().len(), 1);
}

#[test]
fn test_withdrawal_within_balance() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));

    ctx.journal
        .record(&a, dec!(-90), MovementType::FundsWithdrawal)
        .unwrap();
    assert_eq!(balance(&ctx, &a), dec!(10));
    assert_ledger_consistent(&ctx);
}

#[test]
fn test_overdraft_is_rejected_and_nothing_changes() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));

    let err = ctx
        .journal
        .record(&a, dec!(-110), MovementType::FundsWithdrawal)
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));
    assert!(!err.is_retryable());
    assert_eq!(balance(&ctx, &a), dec!(100));
    assert_eq!(ctx.journal.list_for_user(&a, false).unwrap().len(), 1);
    assert_ledger_consistent(&ctx);
}

#[test]
fn test_unknown_movement_type_is_invalid_type() {
    assert!(matches!(
        MovementType::from_str("LOTTERY_WIN"),
        Err(Error::InvalidType(_))
    ));
    assert_eq!(
        MovementType::from_str("funds-deposit").unwrap(),
        MovementType::FundsDeposit
    );
}

#[test]
fn test_excess_precision_is_invalid_amount() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(1));

    let err = ctx
        .journal
        .record(&a, dec!(0.00000000001), MovementType::FundsDeposit)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));
}

#[test]
fn test_oversized_amount_is_invalid_amount() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(0));
    let b = create_user(&ctx, "b", dec!(0));
    let too_large = Decimal::from_str("10000000000000000000000000000").unwrap();

    let err = ctx
        .journal
        .record(&a, too_large, MovementType::FundsDeposit)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));

    let err = ctx
        .transfers
        .transfer(&a, &b, too_large, "", TransferType::Public)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));

    assert_eq!(balance(&ctx, &a), dec!(0));
    assert!(ctx.journal.list_for_user(&a, false).unwrap().is_empty());
}

#[test]
fn test_deposit_past_storable_balance_is_invalid_amount() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let near_limit = MAX_AMOUNT_ABS - dec!(10);
    let a = create_user(&ctx, "a", near_limit);

    ctx.journal
        .record(&a, dec!(9), MovementType::FundsDeposit)
        .unwrap();
    let err = ctx
        .journal
        .record(&a, dec!(1), MovementType::FundsDeposit)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));

    assert_eq!(balance(&ctx, &a), near_limit + dec!(9));
    assert_ledger_consistent(&ctx);
}

#[test]
fn test_get_movement_is_repeatable() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));
    let id = ctx
        .journal
        .record(&a, dec!(-1.5), MovementType::FundsWithdrawal)
        .unwrap();

    let first = ctx.journal.get(id, true).unwrap();
    let second = ctx.journal.get(id, true).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.amount, dec!(-1.5));
    assert_eq!(first.user.expanded().unwrap().balance, dec!(98.5));
    assert_eq!(balance(&ctx, &a), dec!(98.5));

    let plain = ctx.journal.get(id, false).unwrap();
    assert_eq!(plain.user.reference(), Some("/user/a"));
}

#[test]
fn test_movements_listed_in_creation_order() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(10));
    ctx.journal.record(&a, dec!(5), MovementType::FundsDeposit).unwrap();
    ctx.journal.record(&a, dec!(-3), MovementType::FundsWithdrawal).unwrap();

    let amounts: Vec<Decimal> = ctx
        .journal
        .list_for_user(&a, false)
        .unwrap()
        .into_iter()
        .map(|m| m.amount)
        .collect();
    assert_eq!(amounts, vec![dec!(10), dec!(5), dec!(-3)]);
}

#[test]
fn test_missing_movement_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    assert!(matches!(
        ctx.journal.get(miniverse_core::MovementId(12345), false),
        Err(Error::NotFound(_))
    ));
}

// ============================================================================
// Transfer Coordinator
// ============================================================================

#[test]
fn test_end_to_end_transfer() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));
    let b = create_user(&ctx, "b", dec!(50));

    let id = ctx
        .transfers
        .transfer(&a, &b, dec!(25), "lunch", TransferType::Public)
        .unwrap();

    assert_eq!(balance(&ctx, &a), dec!(75));
    assert_eq!(balance(&ctx, &b), dec!(75));

    let view = ctx.transfers.get(id, true).unwrap();
    assert_eq!(view.comment, "lunch");
    assert_eq!(view.kind, TransferType::Public);

    let withdrawal = view.withdrawal.expanded().unwrap();
    assert_eq!(withdrawal.amount, dec!(-25));
    assert_eq!(withdrawal.kind, MovementType::TransferWithdrawal);
    assert_eq!(withdrawal.user.reference(), Some("/user/a"));

    let deposit = view.deposit.expanded().unwrap();
    assert_eq!(deposit.amount, dec!(25));
    assert_eq!(deposit.kind, MovementType::TransferDeposit);
    assert_eq!(deposit.user.reference(), Some("/user/b"));

    assert_ledger_consistent(&ctx);
}

#[test]
fn test_transfer_references_without_expansion() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));
    let b = create_user(&ctx, "b", dec!(0));
    let id = ctx
        .transfers
        .transfer(&a, &b, dec!(10), "", TransferType::Private)
        .unwrap();

    let view = ctx.transfers.get(id, false).unwrap();
    let withdrawal = view.withdrawal.reference().unwrap();
    let deposit = view.deposit.reference().unwrap();
    assert!(withdrawal.starts_with("/movement/"));
    assert!(deposit.starts_with("/movement/"));
    assert_ne!(withdrawal, deposit);

    let json = serde_json::to_value(&view).unwrap();
    assert!(json["withdrawal"].is_string());
    assert_eq!(json["type"], "PRIVATE");
}

#[test]
fn test_asymmetric_transfer_leaves_no_trace() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));
    let b = create_user(&ctx, "b", dec!(0));

    let mut uow = ctx.repository.begin().unwrap();
    let mut staging = StagedMovements::new();
    let w = stage_movement(
        uow.as_mut(),
        &mut staging,
        &a,
        dec!(-25),
        MovementType::TransferWithdrawal,
    )
    .unwrap();
    let d = stage_movement(
        uow.as_mut(),
        &mut staging,
        &b,
        dec!(30),
        MovementType::TransferDeposit,
    )
    .unwrap();
    let err = create_transfer(
        uow.as_mut(),
        &mut staging,
        TransferPolicy::default(),
        w,
        d,
        "",
        TransferType::Public,
    )
    .unwrap_err();
    assert!(matches!(err, Error::AsymmetricTransfer(_)));
    drop(uow);
    drop(staging);

    assert!(matches!(ctx.journal.get(w, false), Err(Error::NotFound(_))));
    assert!(matches!(ctx.journal.get(d, false), Err(Error::NotFound(_))));
    assert_eq!(balance(&ctx, &a), dec!(100));
    assert_eq!(balance(&ctx, &b), dec!(0));
    assert!(ctx.transfers.list_for_user(&a, false).unwrap().is_empty());
}

#[test]
fn test_symmetric_staged_legs_commit() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));
    let b = create_user(&ctx, "b", dec!(0));

    let mut uow = ctx.repository.begin().unwrap();
    let mut staging = StagedMovements::new();
    let w = stage_movement(
        uow.as_mut(),
        &mut staging,
        &a,
        dec!(-25),
        MovementType::TransferWithdrawal,
    )
    .unwrap();
    let d = stage_movement(
        uow.as_mut(),
        &mut staging,
        &b,
        dec!(25),
        MovementType::TransferDeposit,
    )
    .unwrap();
    let t = create_transfer(
        uow.as_mut(),
        &mut staging,
        TransferPolicy::default(),
        w,
        d,
        "rent",
        TransferType::Private,
    )
    .unwrap();
    uow.commit().unwrap();

    let view = ctx.transfers.get(t, false).unwrap();
    assert_eq!(view.withdrawal.reference(), Some(ctx.journal.reference(w).as_str()));
    assert_eq!(view.deposit.reference(), Some(ctx.journal.reference(d).as_str()));
    assert_eq!(balance(&ctx, &a), dec!(75));
    assert_eq!(balance(&ctx, &b), dec!(25));
    assert_ledger_consistent(&ctx);
}

#[test]
fn test_positive_withdrawal_leg_is_invalid_state() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(0));
    let b = create_user(&ctx, "b", dec!(100));

    let w = ctx.journal.record(&a, dec!(25), MovementType::FundsDeposit).unwrap();
    let d = ctx.journal.record(&b, dec!(-25), MovementType::FundsWithdrawal).unwrap();
    let err = ctx
        .transfers
        .link(w, d, "", TransferType::Public)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_transfer_overdraft_rolls_back_both_legs() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(10));
    let b = create_user(&ctx, "b", dec!(0));

    let err = ctx
        .transfers
        .transfer(&a, &b, dec!(11), "", TransferType::Public)
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));
    assert_eq!(balance(&ctx, &a), dec!(10));
    assert_eq!(balance(&ctx, &b), dec!(0));
    assert!(ctx.journal.list_for_user(&b, false).unwrap().is_empty());
}

#[test]
fn test_transfer_to_unknown_user_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(10));

    let err = ctx
        .transfers
        .transfer(&a, &uid("nobody"), dec!(5), "", TransferType::Public)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(balance(&ctx, &a), dec!(10));
    assert_eq!(ctx.journal.list_for_user(&a, false).unwrap().len(), 1);
}

#[test]
fn test_non_positive_transfer_amount_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(10));
    let b = create_user(&ctx, "b", dec!(10));

    for amount in [Decimal::ZERO, dec!(-5)] {
        let err = ctx
            .transfers
            .transfer(&a, &b, amount, "", TransferType::Public)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)), "{}", amount);
    }
}

#[test]
fn test_self_transfer_rejected_by_default() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(10));

    let err = ctx
        .transfers
        .transfer(&a, &a, dec!(5), "", TransferType::Public)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(balance(&ctx, &a), dec!(10));
}

#[test]
fn test_self_transfer_allowed_by_policy() {
    let config = Config {
        allow_self_transfer: true,
        ..Config::default()
    };
    let ctx = MiniverseContext::in_memory(config).unwrap();
    let a = create_user(&ctx, "a", dec!(10));

    ctx.transfers
        .transfer(&a, &a, dec!(5), "", TransferType::Public)
        .unwrap();
    assert_eq!(balance(&ctx, &a), dec!(10));
    assert_eq!(ctx.transfers.list_for_user(&a, false).unwrap().len(), 1);
    assert_ledger_consistent(&ctx);
}

#[test]
fn test_transfers_listed_for_both_parties() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(100));
    let b = create_user(&ctx, "b", dec!(100));
    let c = create_user(&ctx, "c", dec!(100));

    ctx.transfers.transfer(&a, &b, dec!(1), "", TransferType::Public).unwrap();
    ctx.transfers.transfer(&b, &c, dec!(2), "", TransferType::Public).unwrap();

    assert_eq!(ctx.transfers.list_for_user(&a, false).unwrap().len(), 1);
    assert_eq!(ctx.transfers.list_for_user(&b, false).unwrap().len(), 2);
    assert_eq!(ctx.transfers.list_for_user(&c, true).unwrap().len(), 1);
}

#[test]
fn test_missing_transfer_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    assert!(matches!(
        ctx.transfers.get(miniverse_core::TransferId(77), true),
        Err(Error::NotFound(_))
    ));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_ledger_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let a = uid("a");
    let b = uid("b");
    let transfer_id = {
        let ctx = create_test_context(&temp_dir);
        create_user(&ctx, "a", dec!(100));
        create_user(&ctx, "b", dec!(0));
        ctx.transfers
            .transfer(&a, &b, dec!(33.33), "", TransferType::Public)
            .unwrap()
    };

    let ctx = create_test_context(&temp_dir);
    assert_eq!(balance(&ctx, &a), dec!(66.67));
    assert_eq!(balance(&ctx, &b), dec!(33.33));
    assert!(ctx.transfers.get(transfer_id, false).is_ok());

    // Ids keep increasing after reopen
    let next = ctx
        .journal
        .record(&a, dec!(1), MovementType::FundsDeposit)
        .unwrap();
    let view = ctx.transfers.get(transfer_id, true).unwrap();
    assert!(next > view.deposit.expanded().unwrap().id);
}

#[test]
fn test_durable_movement_then_transfer_in_one_unit() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_test_context(&temp_dir);
    let a = create_user(&ctx, "a", dec!(50));
    let b = create_user(&ctx, "b", dec!(0));

    let mut uow = ctx.repository.begin().unwrap();
    let w = create_movement(uow.as_mut(), &a, dec!(-20), MovementType::TransferWithdrawal).unwrap();
    let d = create_movement(uow.as_mut(), &b, dec!(20), MovementType::TransferDeposit).unwrap();
    let mut staging = StagedMovements::new();
    create_transfer(
        uow.as_mut(),
        &mut staging,
        TransferPolicy::default(),
        w,
        d,
        "",
        TransferType::Public,
    )
    .unwrap();
    // Never committed
    drop(uow);

    assert_eq!(balance(&ctx, &a), dec!(50));
    assert_eq!(balance(&ctx, &b), dec!(0));
    assert_ledger_consistent(&ctx);
}
