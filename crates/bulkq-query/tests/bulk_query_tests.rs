//! Fan-out behaviour against scripted mock targets

mod common;

use std::time::Duration;

use bulkq_core::Value;
use bulkq_query::{BulkQueryEngine, TargetOutcome, execute_target, split};
use common::{MockDatabase, MockDriver, init_tracing, mock_target, rendered_rows};
use pretty_assertions::assert_eq;

const SCRIPT: &str = "SELECT id, name FROM widgets";

fn widgets(rows: &[(i64, &str)]) -> MockDatabase {
    MockDatabase::returning(
        &[("id", "INTEGER"), ("name", "TEXT")],
        rows.iter()
            .map(|(id, name)| vec![Value::Int64(*id), Value::from(*name)])
            .collect(),
    )
}

fn gadgets(rows: &[i64]) -> MockDatabase {
    MockDatabase::returning(
        &[("serial", "BIGINT")],
        rows.iter().map(|n| vec![Value::Int64(*n)]).collect(),
    )
}

fn schema_names(schema: &Option<Vec<bulkq_core::ColumnMeta>>) -> Vec<String> {
    schema
        .as_ref()
        .map(|cols| cols.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_failing_target_does_not_affect_others() {
    init_tracing();
    let driver = MockDriver::new()
        .with_database("Sales", widgets(&[(1, "bolt"), (2, "nut")]))
        .with_database("Offline", MockDatabase::unreachable());
    let counters = driver.counters();
    let engine = BulkQueryEngine::new(driver.into_registry());

    let targets = [mock_target("east", "Sales"), mock_target("west", "Offline")];
    let aggregate = engine.bulk_query(&targets, SCRIPT, 30).await;

    assert_eq!(
        rendered_rows(&aggregate.rows),
        vec![vec!["east", "Sales", "1", "bolt"], vec!["east", "Sales", "2", "nut"]]
    );
    assert_eq!(
        aggregate.messages,
        vec!["Offline - west: Connection error: cannot open database 'Offline'".to_string()]
    );
    assert_eq!(counters.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_canonical_schema_follows_input_order_not_completion() {
    // A finishes last, B first
    let driver = MockDriver::new()
        .with_database("A", widgets(&[(1, "bolt")]).with_delay(Duration::from_millis(500)))
        .with_database("B", gadgets(&[10, 20]));
    let engine = BulkQueryEngine::new(driver.into_registry());
    let a = mock_target("s1", "A");
    let b = mock_target("s1", "B");

    let forward = engine
        .bulk_query(&[a.clone(), b.clone()], SCRIPT, 30)
        .await;
    let reverse = engine.bulk_query(&[b, a], SCRIPT, 30).await;

    assert_eq!(
        schema_names(&forward.schema),
        vec!["Server", "Database", "id", "name"]
    );
    assert_eq!(forward.row_count(), 1);
    assert_eq!(
        forward.messages,
        vec!["Columns returned by B - s1 do not match those of A - s1.".to_string()]
    );

    assert_eq!(
        schema_names(&reverse.schema),
        vec!["Server", "Database", "serial"]
    );
    assert_eq!(reverse.row_count(), 2);
    assert_eq!(
        reverse.messages,
        vec!["Columns returned by A - s1 do not match those of B - s1.".to_string()]
    );
}

#[tokio::test]
async fn test_mismatched_target_contributes_no_rows() {
    let driver = MockDriver::new()
        .with_database("A", widgets(&[(1, "bolt"), (2, "nut"), (3, "gear")]))
        .with_database("B", gadgets(&[7, 8, 9, 10]))
        .with_database("C", widgets(&[(4, "cog")]));
    let engine = BulkQueryEngine::new(driver.into_registry());

    let targets = [
        mock_target("s1", "A"),
        mock_target("s1", "B"),
        mock_target("s2", "C"),
    ];
    let aggregate = engine.bulk_query(&targets, SCRIPT, 0).await;

    assert_eq!(aggregate.row_count(), 4);
    assert!(
        aggregate
            .rows
            .iter()
            .all(|row| row.values[1] != Value::from("B"))
    );
    assert_eq!(aggregate.messages.len(), 1);
    assert!(aggregate.messages[0].contains("B - s1"));
    assert!(aggregate.messages[0].contains("A - s1"));
}

#[tokio::test]
async fn test_provenance_distinguishes_shared_database_names() {
    let driver = MockDriver::new().with_database("Sales", widgets(&[(1, "bolt")]));
    let engine = BulkQueryEngine::new(driver.into_registry());

    let targets = [
        mock_target("east", "Sales"),
        mock_target("west", "Sales"),
        mock_target("north", "Sales"),
    ];
    let aggregate = engine.bulk_query(&targets, SCRIPT, 30).await;

    let provenance: Vec<(String, String)> = aggregate
        .rows
        .iter()
        .map(|row| (row.values[0].to_string(), row.values[1].to_string()))
        .collect();
    assert_eq!(
        provenance,
        vec![
            ("east".to_string(), "Sales".to_string()),
            ("west".to_string(), "Sales".to_string()),
            ("north".to_string(), "Sales".to_string()),
        ]
    );
    assert!(aggregate.is_clean());
}

#[tokio::test]
async fn test_no_targets_yields_empty_aggregate() {
    let engine = BulkQueryEngine::new(MockDriver::new().into_registry());

    let aggregate = engine.bulk_query(&[], SCRIPT, 30).await;

    assert!(aggregate.schema.is_none());
    assert!(aggregate.rows.is_empty());
    assert!(aggregate.messages.is_empty());
}

#[tokio::test]
async fn test_blank_script_sends_nothing_and_succeeds() {
    let driver = MockDriver::new()
        .with_database("Sales", widgets(&[(1, "bolt")]))
        .with_database("Stock", widgets(&[(2, "nut")]));
    let counters = driver.counters();
    let engine = BulkQueryEngine::new(driver.into_registry());

    let targets = [mock_target("east", "Sales"), mock_target("west", "Stock")];
    let aggregate = engine.bulk_query(&targets, "GO\n  \nGO\n", 30).await;

    assert_eq!(schema_names(&aggregate.schema), vec!["Server", "Database"]);
    assert_eq!(aggregate.row_count(), 0);
    assert!(aggregate.is_clean(), "{:?}", aggregate.messages);
    assert!(counters.executed("Sales").is_empty());
    assert!(counters.executed("Stock").is_empty());
    assert_eq!(counters.opens(), 2);
    assert_eq!(counters.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_execution_releases_connection() {
    let driver = MockDriver::new()
        .with_database("Sales", widgets(&[(1, "bolt")]).with_delay(Duration::from_secs(60)));
    let counters = driver.counters();
    let registry = driver.into_registry();
    let target = mock_target("s1", "Sales");
    let batches = split(SCRIPT);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        execute_target(&registry, &target, &batches, None),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(counters.opens(), 1);

    // the close runs on a task spawned from the dropped guard
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(counters.closes(), 1);
    assert_eq!(counters.open_connections(), 0);
}

#[tokio::test]
async fn test_execute_target_reports_success_directly() {
    let driver = MockDriver::new().with_database("Sales", widgets(&[(1, "bolt")]));
    let registry = driver.into_registry();

    let outcome = execute_target(&registry, &mock_target("s1", "Sales"), &split(SCRIPT), None).await;

    match outcome {
        TargetOutcome::Success(set) => assert_eq!(
            rendered_rows(&set.rows),
            vec![vec!["s1", "Sales", "1", "bolt"]]
        ),
        TargetOutcome::Failure(failure) => panic!("unexpected failure: {failure}"),
    }
}

#[tokio::test]
async fn test_connections_released_on_success_and_failure() {
    let driver = MockDriver::new()
        .with_database("Ok", widgets(&[(1, "bolt")]))
        .with_database("Broken", widgets(&[]).failing_on("UPDATE"));
    let counters = driver.counters();
    let engine = BulkQueryEngine::new(driver.into_registry());

    let script = "UPDATE widgets SET name = 'x'\nGO\nSELECT id, name FROM widgets";
    let targets = [mock_target("s1", "Ok"), mock_target("s1", "Broken")];
    let aggregate = engine.bulk_query(&targets, script, 30).await;

    assert_eq!(aggregate.row_count(), 1);
    assert_eq!(aggregate.messages.len(), 1);
    assert_eq!(counters.opens(), 2);
    assert_eq!(counters.closes(), 2);
}

#[tokio::test]
async fn test_side_effect_failure_stops_remaining_batches() {
    let driver = MockDriver::new().with_database("Sales", widgets(&[]).failing_on("step 2"));
    let counters = driver.counters();
    let engine = BulkQueryEngine::new(driver.into_registry());

    let script = "-- step 1\nGO\n-- step 2\nGO\n-- step 3\nGO\nSELECT id, name FROM widgets\n";
    let aggregate = engine
        .bulk_query(&[mock_target("s1", "Sales")], script, 30)
        .await;

    assert_eq!(
        counters.executed("Sales"),
        vec!["-- step 1\n".to_string(), "-- step 2\n".to_string()]
    );
    assert!(aggregate.schema.is_none());
    assert_eq!(
        aggregate.messages,
        vec!["Sales - s1: Query error: failed on 'step 2'".to_string()]
    );
}

#[tokio::test]
async fn test_blank_batches_are_not_sent() {
    let driver = MockDriver::new().with_database("Sales", widgets(&[(1, "bolt")]));
    let counters = driver.counters();
    let engine = BulkQueryEngine::new(driver.into_registry());

    let script = "GO\nDELETE FROM staging\nGO\n\nGO\nSELECT id, name FROM widgets\nGO\n";
    let aggregate = engine
        .bulk_query(&[mock_target("s1", "Sales")], script, 30)
        .await;

    assert_eq!(
        counters.executed("Sales"),
        vec![
            "DELETE FROM staging\n".to_string(),
            "SELECT id, name FROM widgets\n".to_string(),
        ]
    );
    assert_eq!(aggregate.row_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_statement_timeout_fails_only_the_slow_target() {
    let driver = MockDriver::new()
        .with_database("Fast", widgets(&[(1, "bolt")]))
        .with_database("Hung", widgets(&[(2, "nut")]).with_delay(Duration::from_secs(600)));
    let counters = driver.counters();
    let engine = BulkQueryEngine::new(driver.into_registry());

    let targets = [mock_target("s1", "Hung"), mock_target("s1", "Fast")];
    let aggregate = engine.bulk_query(&targets, SCRIPT, 5).await;

    assert_eq!(
        rendered_rows(&aggregate.rows),
        vec![vec!["s1", "Fast", "1", "bolt"]]
    );
    assert_eq!(
        aggregate.messages,
        vec!["Hung - s1: Timeout: batch timed out after 5s".to_string()]
    );
    assert_eq!(counters.open_connections(), 0);
}

#[tokio::test]
async fn test_unconfigured_database_reports_connection_failure() {
    let engine = BulkQueryEngine::new(MockDriver::new().into_registry());

    let aggregate = engine
        .bulk_query(&[mock_target("s1", "Ghost")], SCRIPT, 30)
        .await;

    assert_eq!(
        aggregate.messages,
        vec!["Ghost - s1: Not found: database 'Ghost'".to_string()]
    );
}
