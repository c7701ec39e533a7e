// Typed row identifiers.
//
// Each table gets its own id type so a team id can never be passed where a
// player id is expected. They convert to and from SQLite integers.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

row_id!(
    /// Primary key of the `teams` table.
    TeamId
);
row_id!(
    /// Primary key of the `players` table.
    PlayerId
);
row_id!(
    /// Primary key of the `matches` table.
    MatchId
);
row_id!(
    /// Primary key of the `ideas` table.
    IdeaId
);
row_id!(
    /// Primary key of the `case_studies` table.
    CaseId
);
