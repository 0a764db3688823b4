//! Convert plan operands to values that sqlx can bind.

use crate::query::Operand;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A value that can be bound to a PostgreSQL query. Each variant reports its own type so
/// comparisons against uuid, numeric and timestamp columns need no casts.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PgBindValue {
    Bool(bool),
    I64(i64),
    Text(String),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
}

impl From<&Operand> for PgBindValue {
    fn from(op: &Operand) -> Self {
        match op {
            Operand::Text(s) => PgBindValue::Text(s.clone()),
            Operand::Integer(n) => PgBindValue::I64(*n),
            Operand::Bool(b) => PgBindValue::Bool(*b),
            Operand::Uuid(u) => PgBindValue::Uuid(*u),
            Operand::DateTime(d) => PgBindValue::Timestamp(d.with_timezone(&Utc)),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf),
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::Text(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf),
            PgBindValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf),
            PgBindValue::Timestamp(t) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(t, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
            PgBindValue::I64(_) => <i64 as Type<Postgres>>::type_info(),
            PgBindValue::Text(_) => <String as Type<Postgres>>::type_info(),
            PgBindValue::Uuid(_) => <uuid::Uuid as Type<Postgres>>::type_info(),
            PgBindValue::Timestamp(_) => <DateTime<Utc> as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn operands_keep_their_type() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(PgBindValue::from(&Operand::Uuid(id)), PgBindValue::Uuid(id));
        assert_eq!(PgBindValue::from(&Operand::Integer(3)), PgBindValue::I64(3));
        assert_eq!(PgBindValue::from(&Operand::from("x")), PgBindValue::Text("x".into()));
    }

    #[test]
    fn datetimes_are_normalized_to_utc() {
        let local = chrono::FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(PgBindValue::from(&Operand::DateTime(local)), PgBindValue::Timestamp(expected));
    }

    #[test]
    fn serializes_as_plain_json() {
        let values = vec![PgBindValue::I64(3), PgBindValue::Text("hut".into()), PgBindValue::Bool(true)];
        assert_eq!(serde_json::to_value(&values).unwrap(), serde_json::json!([3, "hut", true]));
    }
}
