//! Parameter-bound bulk insert payloads
//!
//! Records are turned into typed rows whose values are bound as statement
//! parameters. SQL text only ever contains table/column names and `$n`
//! placeholders.

use gdax_feed::{EventRecord, Level, SnapshotRecord};
use tokio_postgres::types::ToSql;

pub type Param<'a> = &'a (dyn ToSql + Sync);

pub const MESSAGES_TABLE: &str = "messages";
pub const SNAPSHOTS_TABLE: &str = "snapshots";

pub const MESSAGE_COLUMNS: [&str; 20] = [
    "type",
    "product_id",
    "trade_id",
    "order_id",
    "sequence",
    "maker_order_id",
    "taker_order_id",
    "time",
    "remaining_size",
    "new_size",
    "old_size",
    "size",
    "price",
    "side",
    "reason",
    "order_type",
    "funds",
    "new_funds",
    "old_funds",
    "message",
];

pub const SNAPSHOT_COLUMNS: [&str; 6] = ["product_id", "sequence", "bid_ask", "price", "size", "order_id"];

/// PostgreSQL wire protocol limit on bind parameters per statement
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// How many rows of `columns` width fit in one statement
pub fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// `($1, $2), ($3, $4)` for 2 columns x 2 rows
pub fn values_clause(columns: usize, rows: usize) -> String {
    let mut sql = String::with_capacity(rows * columns * 6);
    let mut n = 0;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns {
            if col > 0 {
                sql.push_str(", ");
            }
            n += 1;
            sql.push('$');
            sql.push_str(&n.to_string());
        }
        sql.push(')');
    }
    sql
}

pub fn bulk_insert_sql(table: &str, columns: &[&str], rows: usize) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        values_clause(columns.len(), rows)
    )
}

/// One `messages` row borrowed from an [`EventRecord`]
pub struct EventRow<'a> {
    record: &'a EventRecord,
    side: Option<&'static str>,
}

impl<'a> EventRow<'a> {
    pub fn new(record: &'a EventRecord) -> Self {
        Self {
            record,
            side: record.side.map(|s| s.as_str()),
        }
    }

    /// Values in [`MESSAGE_COLUMNS`] order
    pub fn params(&self) -> [Param<'_>; 20] {
        let r = self.record;
        [
            &r.kind,
            &r.product_id,
            &r.trade_id,
            &r.order_id,
            &r.sequence,
            &r.maker_order_id,
            &r.taker_order_id,
            &r.time,
            &r.remaining_size,
            &r.new_size,
            &r.old_size,
            &r.size,
            &r.price,
            &self.side,
            &r.reason,
            &r.order_type,
            &r.funds,
            &r.new_funds,
            &r.old_funds,
            &r.message,
        ]
    }
}

/// One `snapshots` row: a single level of a snapshot
pub struct LevelRow<'a> {
    product_id: &'a str,
    sequence: i64,
    side: &'static str,
    level: &'a Level,
}

impl<'a> LevelRow<'a> {
    /// Every level of `snapshot`, bids first
    pub fn from_snapshot(snapshot: &'a SnapshotRecord) -> impl Iterator<Item = LevelRow<'a>> + 'a {
        snapshot.rows().map(move |(side, level)| LevelRow {
            product_id: &snapshot.product_id,
            sequence: snapshot.sequence,
            side,
            level,
        })
    }

    /// Values in [`SNAPSHOT_COLUMNS`] order
    pub fn params(&self) -> [Param<'_>; 6] {
        [
            &self.product_id,
            &self.sequence,
            &self.side,
            &self.level.price,
            &self.level.size,
            &self.level.order_id,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use chrono::{DateTime, Utc};
    use gdax_feed::Side;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tokio_postgres::types::{FromSql, IsNull, Type};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn full_event() -> EventRecord {
        let mut event = EventRecord::new("change");
        event.product_id = Some("BTC-USD".to_string());
        event.sequence = Some(80);
        event.time = Some("2017-06-01T12:34:56.789012Z".parse().unwrap());
        event.remaining_size = Some(dec("0.00000001"));
        event.new_size = Some(dec("5.23512"));
        event.old_size = Some(dec("12.234412"));
        event.size = Some(dec("1.00000000"));
        event.price = Some(dec("2401.99"));
        event.side = Some(Side::Sell);
        event.funds = Some(dec("12345678901234.5678"));
        event.new_funds = Some(dec("0.1"));
        event.old_funds = Some(dec("99999.99999999"));
        event
    }

    fn roundtrip_decimal(param: Param<'_>) -> Decimal {
        let mut buf = BytesMut::new();
        let is_null = param.to_sql_checked(&Type::NUMERIC, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::No));
        Decimal::from_sql(&Type::NUMERIC, &buf).unwrap()
    }

    #[test]
    fn test_values_clause() {
        assert_eq!(values_clause(3, 1), "($1, $2, $3)");
        assert_eq!(values_clause(2, 3), "($1, $2), ($3, $4), ($5, $6)");
        assert_eq!(values_clause(2, 0), "");
    }

    #[test]
    fn test_bulk_insert_sql() {
        let sql = bulk_insert_sql(SNAPSHOTS_TABLE, &SNAPSHOT_COLUMNS, 2);
        assert_eq!(
            sql,
            "INSERT INTO snapshots (product_id, sequence, bid_ask, price, size, order_id) \
             VALUES ($1, $2, $3, $4, $5, $6), ($7, $8, $9, $10, $11, $12)"
        );
    }

    #[test]
    fn test_rows_per_statement_respects_param_limit() {
        let rows = rows_per_statement(MESSAGE_COLUMNS.len());
        assert!(rows * MESSAGE_COLUMNS.len() <= MAX_BIND_PARAMS);
        assert!((rows + 1) * MESSAGE_COLUMNS.len() > MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
    }

    #[test]
    fn test_event_decimals_survive_encoding() {
        let event = full_event();
        let row = EventRow::new(&event);
        let params = row.params();

        let decimal_columns = [
            ("remaining_size", event.remaining_size),
            ("new_size", event.new_size),
            ("old_size", event.old_size),
            ("size", event.size),
            ("price", event.price),
            ("funds", event.funds),
            ("new_funds", event.new_funds),
            ("old_funds", event.old_funds),
        ];
        for (column, expected) in decimal_columns {
            let idx = MESSAGE_COLUMNS.iter().position(|c| *c == column).unwrap();
            assert_eq!(Some(roundtrip_decimal(params[idx])), expected, "{column}");
        }
    }

    #[test]
    fn test_event_time_and_side_encoding() {
        let event = full_event();
        let row = EventRow::new(&event);
        let params = row.params();

        let mut buf = BytesMut::new();
        params[7].to_sql_checked(&Type::TIMESTAMPTZ, &mut buf).unwrap();
        let time = DateTime::<Utc>::from_sql(&Type::TIMESTAMPTZ, &buf).unwrap();
        assert_eq!(Some(time), event.time);

        let mut buf = BytesMut::new();
        params[13].to_sql_checked(&Type::TEXT, &mut buf).unwrap();
        assert_eq!(<&str>::from_sql(&Type::TEXT, &buf).unwrap(), "sell");
    }

    #[test]
    fn test_absent_fields_bind_null() {
        let event = EventRecord::new("error");
        let row = EventRow::new(&event);
        let params = row.params();

        let mut buf = BytesMut::new();
        let is_null = params[12].to_sql_checked(&Type::NUMERIC, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }

    #[test]
    fn test_level_rows() {
        let snapshot = SnapshotRecord {
            product_id: "ETH-USD".to_string(),
            sequence: 42,
            bids: vec![Level {
                price: dec("300.01"),
                size: dec("2"),
                order_id: "b1".to_string(),
            }],
            asks: vec![Level {
                price: dec("300.02"),
                size: dec("0.5"),
                order_id: "a1".to_string(),
            }],
        };

        let rows: Vec<LevelRow> = LevelRow::from_snapshot(&snapshot).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].side, "bid");
        assert_eq!(rows[1].side, "ask");

        let params = rows[1].params();
        assert_eq!(params.len(), SNAPSHOT_COLUMNS.len());
        assert_eq!(roundtrip_decimal(params[3]), dec("300.02"));
    }
}
