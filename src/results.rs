mod factory;
mod row;

pub use factory::{RowFactory, TextFactory};
pub use row::{Columns, NamedRow, Row};

pub(crate) use factory::{Factories, RawValue, materialize};
