//! Query state: the viewed select, its filters and sort keys, and the SQL
//! generated from them.

pub mod sql;
mod state;

pub use state::{
    Filter, FilterToggle, QueryError, QueryState, SortDirection, SortKey, MAX_SORT_COLUMNS,
};
