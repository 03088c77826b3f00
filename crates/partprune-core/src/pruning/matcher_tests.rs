//! Tests for predicate and key-range matching.

use super::context::PruningContext;
use super::matcher::{match_index, match_key_range, match_predicate, prune_with_value};
use super::spec::{KeyRange, RangeType};
use super::strategy::PruneOutcome;
use super::test_fixtures::{hash_table, key, list_table, orders_table, range_table, range_table_on, Harness};
use crate::expr::{ArithOp, EvalContext, Expr, PartitionExpression};
use crate::predicate::{Predicate, PruningOp, Quantifier, RelOp};
use crate::value::{DbType, DbValue};

const ORDERS: u64 = 100;
const QUARTERS: u64 = 200;
const SHIFTED: u64 = 300;
const TAGS: u64 = 400;
const BUCKETS: u64 = 500;

fn harness() -> Harness {
    Harness::new(&[
        orders_table(ORDERS),
        range_table(
            QUARTERS,
            &[(Some(0), Some(10)), (Some(10), Some(20)), (Some(20), Some(30)), (Some(30), Some(40))],
        ),
        range_table_on(
            SHIFTED,
            PartitionExpression::new(
                Expr::binary(ArithOp::Add, key(), Expr::constant(1)),
                DbType::Int,
            ),
            &[(None, Some(10)), (Some(10), None)],
        ),
        list_table(TAGS, vec![vec![1.into(), 2.into(), 3.into()], vec![4.into(), 5.into()]]),
        hash_table(BUCKETS, 4, DbType::Int),
    ])
}

fn selected(outcome: PruneOutcome) -> Option<Vec<usize>> {
    outcome.bitset().map(|set| set.iter().collect())
}

fn run(ctx: &PruningContext, predicate: &Predicate) -> Option<Vec<usize>> {
    selected(match_predicate(ctx, predicate, &EvalContext::default()).expect("match"))
}

fn key_eq(value: i64) -> Predicate {
    Predicate::compare(key(), RelOp::Eq, Expr::constant(value))
}

fn other_column_eq(value: i64) -> Predicate {
    Predicate::compare(Expr::attr(2, DbType::Int), RelOp::Eq, Expr::constant(value))
}

// ========================================================================
// Comparisons
// ========================================================================

#[test]
fn test_equality_on_key_selects_partition() {
    // Arrange
    let h = harness();
    let ctx = h.context(ORDERS);

    // Act
    let result = run(&ctx, &key_eq(15));

    // Assert
    assert_eq!(result, Some(vec![1]));
}

#[test]
fn test_comparison_with_key_on_right_is_commuted() {
    let h = harness();
    let ctx = h.context(ORDERS);

    // 10 < key  ==  key > 10
    let pred = Predicate::compare(Expr::constant(10), RelOp::Lt, key());
    assert_eq!(run(&ctx, &pred), Some(vec![1, 2]));

    let pred = Predicate::compare(Expr::constant(15), RelOp::Eq, key());
    assert_eq!(run(&ctx, &pred), Some(vec![1]));
}

#[test]
fn test_comparison_not_on_key_is_not_matched() {
    let h = harness();
    let ctx = h.context(ORDERS);

    assert_eq!(run(&ctx, &other_column_eq(15)), None);
    let column_vs_column = Predicate::compare(key(), RelOp::Eq, Expr::attr(2, DbType::Int));
    assert_eq!(run(&ctx, &column_vs_column), None);
}

#[test]
fn test_parameter_operand_is_folded() {
    // Arrange
    let h = harness();
    let ctx = h.context(ORDERS);
    let params = [DbValue::Int(25)];
    let pred = Predicate::compare(key(), RelOp::Ge, Expr::param(0));

    // Act
    let outcome = match_predicate(&ctx, &pred, &EvalContext::new(&params)).expect("match");

    // Assert
    assert_eq!(selected(outcome), Some(vec![2]));
}

#[test]
fn test_arithmetic_operand_is_folded() {
    let h = harness();
    let ctx = h.context(ORDERS);
    let pred = Predicate::compare(
        key(),
        RelOp::Eq,
        Expr::binary(ArithOp::Mul, Expr::constant(3), Expr::constant(4)),
    );

    assert_eq!(run(&ctx, &pred), Some(vec![1]));
}

#[test]
fn test_failing_operand_is_not_matched() {
    // Arrange
    let h = harness();
    let ctx = h.context(ORDERS);
    let pred = Predicate::compare(
        key(),
        RelOp::Eq,
        Expr::binary(ArithOp::Div, Expr::constant(1), Expr::constant(0)),
    );

    // Act
    let result = match_predicate(&ctx, &pred, &EvalContext::default());

    // Assert
    assert_eq!(result.expect("match"), PruneOutcome::NotMatched);
}

#[test]
fn test_missing_parameter_is_not_matched() {
    let h = harness();
    let ctx = h.context(ORDERS);
    let pred = Predicate::compare(key(), RelOp::Eq, Expr::param(3));

    assert_eq!(run(&ctx, &pred), None);
}

#[test]
fn test_failed_cast_in_disjunction_scans_everything() {
    // Arrange
    let h = harness();
    let ctx = h.context(ORDERS);
    let bad_cast = Expr::unary(ArithOp::Cast(DbType::Int), Expr::constant("abc"));
    let pred = Predicate::or(other_column_eq(1), Predicate::compare(key(), RelOp::Eq, bad_cast));

    // Act
    let result = match_predicate(&ctx, &pred, &EvalContext::default());

    // Assert
    assert_eq!(result.expect("match"), PruneOutcome::NotMatched);
}

#[test]
fn test_failed_cast_in_conjunction_defers_to_other_side() {
    let h = harness();
    let ctx = h.context(ORDERS);
    let bad_cast = Expr::unary(ArithOp::Cast(DbType::Int), Expr::constant("abc"));
    let pred = Predicate::and(key_eq(15), Predicate::compare(key(), RelOp::Lt, bad_cast));

    assert_eq!(run(&ctx, &pred), Some(vec![1]));
}

#[test]
fn test_is_null_selects_minvalue_partition() {
    let h = harness();
    let ctx = h.context(ORDERS);

    assert_eq!(run(&ctx, &Predicate::is_null(key())), Some(vec![0]));
}

#[test]
fn test_ignored_operators_are_not_matched() {
    let h = harness();
    let ctx = h.context(ORDERS);
    let not_null = Predicate::Compare {
        lhs: key(),
        op: RelOp::IsNotNull,
        rhs: None,
    };

    assert_eq!(run(&ctx, &not_null), None);
    assert_eq!(run(&ctx, &Predicate::compare(key(), RelOp::Ne, Expr::constant(5))), None);
}

#[test]
fn test_expression_partitioning_matches_whole_expression() {
    // Arrange
    let h = harness();
    let ctx = h.context(SHIFTED);
    let shifted = Expr::binary(ArithOp::Add, key(), Expr::constant(1));

    // Act
    let on_expression = run(&ctx, &Predicate::compare(shifted, RelOp::Eq, Expr::constant(12)));
    let on_column = run(&ctx, &key_eq(12));

    // Assert
    assert_eq!(on_expression, Some(vec![1]));
    assert_eq!(on_column, None);
}

// ========================================================================
// Boolean structure
// ========================================================================

#[test]
fn test_and_intersects_and_or_unions() {
    // Arrange
    let h = harness();
    let ctx = h.context(QUARTERS);
    let first = Predicate::in_list(key(), vec![Expr::constant(5), Expr::constant(25)]);
    let second = Predicate::in_list(key(), vec![Expr::constant(25), Expr::constant(35)]);

    // Act
    let both = run(&ctx, &Predicate::and(first.clone(), second.clone()));
    let either = run(&ctx, &Predicate::or(first, second));

    // Assert
    assert_eq!(both, Some(vec![2]));
    assert_eq!(either, Some(vec![0, 2, 3]));
}

#[test]
fn test_and_with_unconstrained_side_keeps_other_side() {
    let h = harness();
    let ctx = h.context(ORDERS);

    let pred = Predicate::and(other_column_eq(1), key_eq(15));
    assert_eq!(run(&ctx, &pred), Some(vec![1]));
}

#[test]
fn test_or_with_unconstrained_side_is_not_matched() {
    let h = harness();
    let ctx = h.context(ORDERS);

    let pred = Predicate::or(key_eq(15), other_column_eq(1));
    assert_eq!(run(&ctx, &pred), None);
}

#[test]
fn test_and_with_disjoint_sides_is_empty() {
    let h = harness();
    let ctx = h.context(ORDERS);

    let pred = Predicate::and(key_eq(5), key_eq(25));
    assert_eq!(run(&ctx, &pred), Some(vec![]));
}

#[test]
fn test_negation_and_like_never_constrain() {
    let h = harness();
    let ctx = h.context(ORDERS);
    let like = Predicate::Like {
        source: key(),
        pattern: Expr::constant("1%"),
        regex: false,
    };

    assert_eq!(run(&ctx, &Predicate::negate(key_eq(15))), None);
    assert_eq!(run(&ctx, &like), None);
}

// ========================================================================
// Element-of terms
// ========================================================================

#[test]
fn test_list_in_and_not_in() {
    // Arrange
    let h = harness();
    let ctx = h.context(TAGS);
    let members = || vec![Expr::constant(2), Expr::constant(5)];

    // Act
    let in_result = run(&ctx, &Predicate::in_list(key(), members()));
    let not_in_result = run(&ctx, &Predicate::not_in_list(key(), members()));

    // Assert
    assert_eq!(in_result, Some(vec![0, 1]));
    assert_eq!(not_in_result, Some(vec![]));
}

#[test]
fn test_quantified_terms_without_set_meaning_are_not_matched() {
    let h = harness();
    let ctx = h.context(TAGS);
    let ne_some = Predicate::ElementOf {
        element: key(),
        op: RelOp::Ne,
        quantifier: Quantifier::Some,
        set: Expr::sequence(vec![Expr::constant(2)]),
    };

    assert_eq!(run(&ctx, &ne_some), None);
}

#[test]
fn test_element_of_with_parameter_set() {
    // Arrange
    let h = harness();
    let ctx = h.context(TAGS);
    let params = [DbValue::from(vec![4, 5])];
    let pred = Predicate::ElementOf {
        element: key(),
        op: RelOp::Eq,
        quantifier: Quantifier::Some,
        set: Expr::param(0),
    };

    // Act
    let outcome = match_predicate(&ctx, &pred, &EvalContext::new(&params)).expect("match");

    // Assert
    assert_eq!(selected(outcome), Some(vec![1]));
}

#[test]
fn test_hash_equality_selects_one_bucket() {
    let h = harness();
    let ctx = h.context(BUCKETS);

    let result = run(&ctx, &key_eq(42)).expect("matched");
    assert_eq!(result, vec![DbValue::Int(42).partition_hash(4)]);
}

#[test]
fn test_unloaded_context_is_not_matched() {
    let ctx = PruningContext::new();

    assert_eq!(run(&ctx, &key_eq(15)), None);
    assert_eq!(prune_with_value(&ctx, &DbValue::Int(15), PruningOp::Eq), PruneOutcome::NotMatched);
}

// ========================================================================
// Key ranges
// ========================================================================

fn key_context(h: &Harness, position: usize) -> PruningContext {
    let mut ctx = h.context(ORDERS);
    ctx.set_attr_position(Some(position));
    ctx
}

fn range(range: RangeType, key1: Option<i64>, key2: Option<i64>) -> KeyRange {
    KeyRange::new(range, key1.map(Expr::constant), key2.map(Expr::constant))
}

#[test]
fn test_key_range_bounds_are_intersected() {
    // Arrange
    let h = harness();
    let ctx = key_context(&h, 0);

    // Act
    let outcome = match_key_range(&ctx, &range(RangeType::GeLt, Some(10), Some(20)), &EvalContext::default())
        .expect("match");

    // Assert
    assert_eq!(selected(outcome), Some(vec![1]));
}

#[test]
fn test_key_range_shapes() {
    let h = harness();
    let ctx = key_context(&h, 0);
    let eval = EvalContext::default();
    let check = |r: KeyRange| selected(match_key_range(&ctx, &r, &eval).expect("match"));

    assert_eq!(check(KeyRange::eq(Expr::constant(25))), Some(vec![2]));
    assert_eq!(check(range(RangeType::InfLt, None, Some(10))), Some(vec![0]));
    assert_eq!(check(range(RangeType::GtInf, Some(10), None)), Some(vec![1, 2]));
    assert_eq!(check(range(RangeType::InfInf, None, None)), None);
    assert_eq!(check(range(RangeType::NeqNa, Some(3), None)), None);
}

#[test]
fn test_multi_column_key_uses_key_position() {
    // Arrange
    let h = harness();
    let ctx = key_context(&h, 1);
    let composite = Expr::multi_key(vec![Expr::constant("eu"), Expr::constant(15)]);
    let short = Expr::multi_key(vec![Expr::constant("eu")]);

    // Act
    let hit = match_key_range(&ctx, &KeyRange::eq(composite), &EvalContext::default()).expect("match");
    let miss = match_key_range(&ctx, &KeyRange::eq(short), &EvalContext::default()).expect("match");

    // Assert
    assert_eq!(selected(hit), Some(vec![1]));
    assert_eq!(miss, PruneOutcome::NotMatched);
}

#[test]
fn test_key_range_with_unfoldable_bound_defers_to_other_bound() {
    // Arrange
    let h = harness();
    let ctx = key_context(&h, 0);
    let bad_cast = Expr::unary(ArithOp::Cast(DbType::Int), Expr::constant("abc"));
    let key_range = KeyRange::new(RangeType::GeLt, Some(bad_cast), Some(Expr::constant(10)));

    // Act
    let outcome = match_key_range(&ctx, &key_range, &EvalContext::default()).expect("match");

    // Assert
    assert_eq!(selected(outcome), Some(vec![0]));
}

#[test]
fn test_match_index_unions_ranges() {
    let h = harness();
    let ctx = key_context(&h, 0);
    let ranges = [KeyRange::eq(Expr::constant(5)), KeyRange::eq(Expr::constant(25))];

    let outcome = match_index(&ctx, &ranges, &EvalContext::default()).expect("match");
    assert_eq!(selected(outcome), Some(vec![0, 2]));
}

#[test]
fn test_match_index_with_unusable_range_is_not_matched() {
    let h = harness();
    let ctx = key_context(&h, 0);
    let ranges = [
        KeyRange::eq(Expr::constant(5)),
        range(RangeType::InfInf, None, None),
    ];

    let outcome = match_index(&ctx, &ranges, &EvalContext::default()).expect("match");
    assert_eq!(outcome, PruneOutcome::NotMatched);
}

#[test]
fn test_match_index_requires_key_position_and_ranges() {
    // Arrange
    let h = harness();
    let without_position = h.context(ORDERS);
    let with_position = key_context(&h, 0);
    let ranges = [KeyRange::eq(Expr::constant(5))];
    let eval = EvalContext::default();

    // Act & Assert
    assert_eq!(
        match_index(&without_position, &ranges, &eval).expect("match"),
        PruneOutcome::NotMatched
    );
    assert_eq!(match_index(&with_position, &[], &eval).expect("match"), PruneOutcome::NotMatched);
}
