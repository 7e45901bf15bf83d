//! Scenario catalog
//!
//! Ready-made scenarios for the four ANSI anomalies over the `users`
//! fixture. Each builder takes the [`Behavior`] the target engine shows for
//! that anomaly (usually from an [`EngineProfile`]) and scripts the
//! expectations accordingly:
//!
//! - `Observed` / `Prevented`: the interfering write succeeds and tx1's
//!   second read does or does not see it.
//! - `WriterBlocked`: the write is expected to time out after
//!   [`BLOCKED_WRITE_TIMEOUT`]; tx2 is abandoned.
//! - `WriterRejected(class)`: the write is expected to fail with `class`;
//!   tx2 is rolled back.
//!
//! Both transactions are begun before the first step, tx1 first.

use crate::profile::{Behavior, EngineProfile};
use isocheck_core::{
    Action, Anomaly, FailureClass, Fixture, IsolationLevel, Row, Scenario, Snapshot, SqlValue, TxRef,
};
use std::time::Duration;

/// Full-table read used by the dirty-read, non-repeatable-read and
/// dirty-write scenarios.
pub const SELECT_ALL: &str = "SELECT id, name, score FROM users ORDER BY id";

/// Range read used by the phantom-read scenario; bound to [`RANGE_MIN_SCORE`].
pub const SELECT_RANGE: &str = "SELECT id, name, score FROM users WHERE score >= ? ORDER BY id";

/// Lower bound of the phantom-read range.
pub const RANGE_MIN_SCORE: i64 = 100;

/// Deadline for a write expected to wait on a lock.
pub const BLOCKED_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// tx1 reads, tx2 renames Alice to Alien without committing, tx1 reads
/// again, then both commit.
pub fn dirty_read(behavior: Behavior) -> Scenario {
    let fixture = Fixture::users();
    let seed = fixture.seed_snapshot();
    let alien = seed.map_row(1, |r| Row::new(r.id, "Alien", r.score));

    let scenario =
        Scenario::new(Anomaly::DirtyRead.name(), fixture).query(TxRef::Tx1, SELECT_ALL, seed.clone());
    let scenario = interfering_write(
        scenario,
        behavior,
        "UPDATE users SET name = ? WHERE id = ?",
        vec![SqlValue::from("Alien"), SqlValue::Integer(1)],
        false,
    );
    let seen = if behavior == Behavior::Observed { alien } else { seed };
    let scenario = scenario.query(TxRef::Tx1, SELECT_ALL, seen).commit(TxRef::Tx1);
    finish_writer(scenario, behavior)
}

/// tx1 reads, tx2 renames Alice to Alien and commits, tx1 reads again.
pub fn non_repeatable_read(behavior: Behavior) -> Scenario {
    let fixture = Fixture::users();
    let seed = fixture.seed_snapshot();
    let alien = seed.map_row(1, |r| Row::new(r.id, "Alien", r.score));

    let scenario = Scenario::new(Anomaly::NonRepeatableRead.name(), fixture)
        .query(TxRef::Tx1, SELECT_ALL, seed.clone());
    let scenario = interfering_write(
        scenario,
        behavior,
        "UPDATE users SET name = ? WHERE id = ?",
        vec![SqlValue::from("Alien"), SqlValue::Integer(1)],
        true,
    );
    let seen = if behavior == Behavior::Observed { alien } else { seed };
    scenario.query(TxRef::Tx1, SELECT_ALL, seen).commit(TxRef::Tx1)
}

/// tx1 runs a range query, tx2 inserts Charlie inside the range and
/// commits, tx1 repeats the range query.
pub fn phantom_read(behavior: Behavior) -> Scenario {
    let fixture = Fixture::users();
    let seed = fixture.seed_snapshot();
    let grown = seed.with_row(Row::new(3, "Charlie", 300));
    let range = vec![SqlValue::Integer(RANGE_MIN_SCORE)];

    let scenario = Scenario::new(Anomaly::PhantomRead.name(), fixture).query_with(
        TxRef::Tx1,
        SELECT_RANGE,
        range.clone(),
        seed.clone(),
    );
    let scenario = interfering_write(
        scenario,
        behavior,
        "INSERT INTO users (id, name, score) VALUES (?, ?, ?)",
        Row::new(3, "Charlie", 300).to_params(),
        true,
    );
    let seen = if behavior == Behavior::Observed { grown } else { seed };
    scenario
        .query_with(TxRef::Tx1, SELECT_RANGE, range, seen)
        .commit(TxRef::Tx1)
}

/// tx1 updates Alice's score without committing, tx2 updates the same row,
/// tx1 reads its own write back and commits.
///
/// `Prevented` has no meaning for a write-write conflict and is scripted
/// as `WriterBlocked`.
pub fn dirty_write(behavior: Behavior) -> Scenario {
    let behavior = match behavior {
        Behavior::Prevented => Behavior::WriterBlocked,
        other => other,
    };
    let fixture = Fixture::users();
    let seed = fixture.seed_snapshot();
    let mine = seed.map_row(1, |r| Row::new(r.id, r.name.clone(), 150));
    let theirs = seed.map_row(1, |r| Row::new(r.id, r.name.clone(), 250));

    let scenario = Scenario::new(Anomaly::DirtyWrite.name(), fixture).exec_with(
        TxRef::Tx1,
        "UPDATE users SET score = ? WHERE id = ?",
        vec![SqlValue::Integer(150), SqlValue::Integer(1)],
    );
    let scenario = interfering_write(
        scenario,
        behavior,
        "UPDATE users SET score = ? WHERE id = ?",
        vec![SqlValue::Integer(250), SqlValue::Integer(1)],
        false,
    );
    let seen = if behavior == Behavior::Observed { theirs } else { mine };
    let scenario = scenario.query(TxRef::Tx1, SELECT_ALL, seen).commit(TxRef::Tx1);
    finish_writer(scenario, behavior)
}

/// Scenario probing `anomaly` with the expectations `profile` gives for `level`.
pub fn scenario_for(anomaly: Anomaly, profile: &EngineProfile, level: IsolationLevel) -> Scenario {
    let behavior = profile.behavior(anomaly, level);
    let mut scenario = match anomaly {
        Anomaly::DirtyRead => dirty_read(behavior),
        Anomaly::NonRepeatableRead => non_repeatable_read(behavior),
        Anomaly::PhantomRead => phantom_read(behavior),
        Anomaly::DirtyWrite => dirty_write(behavior),
    };
    scenario.name = format!("{}/{}/{}", profile.name(), anomaly, level);
    scenario
}

/// One scenario per anomaly, in catalog order.
pub fn all(profile: &EngineProfile, level: IsolationLevel) -> Vec<Scenario> {
    Anomaly::ALL
        .iter()
        .map(|&anomaly| scenario_for(anomaly, profile, level))
        .collect()
}

/// Append tx2's write, scripted for `behavior`. A write that goes through is
/// committed immediately when `commit` is set.
fn interfering_write(
    scenario: Scenario,
    behavior: Behavior,
    sql: &str,
    params: Vec<SqlValue>,
    commit: bool,
) -> Scenario {
    let scenario = scenario.exec_with(TxRef::Tx2, sql, params);
    match behavior {
        Behavior::Observed | Behavior::Prevented if commit => scenario.commit(TxRef::Tx2),
        Behavior::Observed | Behavior::Prevented => scenario,
        Behavior::WriterBlocked => scenario
            .expect_failure(FailureClass::Timeout)
            .with_timeout(BLOCKED_WRITE_TIMEOUT),
        Behavior::WriterRejected(class) => scenario.expect_failure(class).rollback(TxRef::Tx2),
    }
}

/// Commit tx2 at the end if its write went through and is still open.
fn finish_writer(scenario: Scenario, behavior: Behavior) -> Scenario {
    match behavior {
        Behavior::Observed | Behavior::Prevented => scenario.commit(TxRef::Tx2),
        Behavior::WriterBlocked | Behavior::WriterRejected(_) => scenario,
    }
}

/// Snapshot tx1 should see on its last read of `scenario`, if any.
pub fn final_read(scenario: &Scenario) -> Option<&Snapshot> {
    scenario.steps.iter().rev().find_map(|step| match &step.action {
        Action::Query { expect, .. } if step.tx == TxRef::Tx1 => Some(expect),
        _ => None,
    })
}
