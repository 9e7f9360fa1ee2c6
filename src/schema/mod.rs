pub mod arrow;
pub mod column;

pub use self::arrow::{build_long_schema, set_float_column, MONTH_COLUMN};
pub use self::column::{classify_columns, ColumnKind, ColumnLayout, SNAPSHOT};
