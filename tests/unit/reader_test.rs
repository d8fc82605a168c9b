mod support;

use std::sync::atomic::Ordering;
use support::{MockConnector, MockWarehouse, people_columns, row, warehouse_id};
use tableport::backend::{Connection, Connector, RawRow, Statement};
use tableport::error::TableportError;
use tableport::reader::{ReadLimits, fetch_statement, read_all};

fn chunk(start: u32, len: u32) -> Vec<RawRow> {
    (start..start + len)
        .map(|i| {
            let id = i.to_string();
            row(&[Some(id.as_str()), Some("x"), Some("true")])
        })
        .collect()
}

#[tokio::test]
async fn test_single_chunk_needs_no_fetch() {
    let warehouse = MockWarehouse::new();
    warehouse.set_result(people_columns(), vec![chunk(0, 3)]);
    let connection = MockConnector::new(warehouse.clone())
        .connect(&warehouse_id())
        .await
        .unwrap();

    let first = connection.execute(&Statement::new("SELECT 1")).await.unwrap();
    let result = read_all(connection.as_ref(), first, ReadLimits::default())
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.columns.len(), 3);
    assert_eq!(warehouse.chunk_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_follows_chunks_in_order() {
    let warehouse = MockWarehouse::new();
    warehouse.set_result(people_columns(), vec![chunk(0, 2), chunk(2, 2), chunk(4, 1)]);
    let connection = MockConnector::new(warehouse.clone())
        .connect(&warehouse_id())
        .await
        .unwrap();

    let first = connection.execute(&Statement::new("SELECT 1")).await.unwrap();
    let result = read_all(connection.as_ref(), first, ReadLimits::default())
        .await
        .unwrap();

    let ids: Vec<_> = result.rows.iter().map(|r| r[0].clone().unwrap()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    assert_eq!(result.total_rows, Some(5));
    assert_eq!(warehouse.chunk_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_chunk_budget_is_enforced() {
    let warehouse = MockWarehouse::new();
    warehouse.set_result(people_columns(), (0..5).map(|i| chunk(i * 2, 2)).collect());
    let connection = MockConnector::new(warehouse.clone())
        .connect(&warehouse_id())
        .await
        .unwrap();

    let first = connection.execute(&Statement::new("SELECT 1")).await.unwrap();
    let err = read_all(connection.as_ref(), first, ReadLimits { max_chunks: 3 })
        .await
        .unwrap_err();

    assert!(matches!(err, TableportError::ResultTooLarge { max_chunks: 3 }));
    // Stops before fetching a chunk beyond the budget.
    assert_eq!(warehouse.chunk_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_exact_budget_succeeds() {
    let warehouse = MockWarehouse::new();
    warehouse.set_result(people_columns(), vec![chunk(0, 1), chunk(1, 1), chunk(2, 1)]);
    let connection = MockConnector::new(warehouse.clone())
        .connect(&warehouse_id())
        .await
        .unwrap();

    let first = connection.execute(&Statement::new("SELECT 1")).await.unwrap();
    let result = read_all(connection.as_ref(), first, ReadLimits { max_chunks: 3 })
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 3);
}

#[tokio::test]
async fn test_fetch_statement_reads_all_chunks() {
    let warehouse = MockWarehouse::new();
    warehouse.set_result(people_columns(), vec![chunk(0, 2), chunk(2, 2)]);
    let connection = MockConnector::new(warehouse.clone())
        .connect(&warehouse_id())
        .await
        .unwrap();

    let result = fetch_statement(connection.as_ref(), "01ef-abc", ReadLimits::default())
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 4);
    assert_eq!(warehouse.executes.load(Ordering::SeqCst), 0);
}
