use std::fmt;

use super::sql::{
    find_keyword, leading_identifier, parse_equality, quote_identifier, quote_literal,
    split_on_keyword, starts_with_keyword, unqualified_name,
};

/// Most columns that may carry a sort key at once.
pub const MAX_SORT_COLUMNS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    Empty,
    MissingFrom,
    UnnamedColumn,
    TooManySortKeys,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Empty => write!(f, "empty query"),
            QueryError::MissingFrom => write!(f, "query has no from clause"),
            QueryError::UnnamedColumn => write!(f, "column has no name"),
            QueryError::TooManySortKeys => {
                write!(f, "at most {} columns can be sorted", MAX_SORT_COLUMNS)
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// An equality predicate added by picking a cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!("{}={}", quote_identifier(&self.column), quote_literal(&self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
    /// 1-based tie-break order; active keys always cover 1..=n.
    pub priority: usize,
}

/// Result of toggling a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterToggle {
    Added,
    Removed,
}

/// Sort state of a column after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
    Unsorted,
}

/// The query currently being viewed, kept as structured parts.
///
/// SQL text is produced from these parts whenever a statement is needed and
/// is never parsed back into state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    select_list: String,
    /// `from <relations>`, up to any where clause.
    from_clause: String,
    /// A where clause that could not be taken apart into filters.
    base_where: Option<String>,
    /// `group by … [having …]`, kept after the where clause.
    group_clause: Option<String>,
    filters: Vec<Filter>,
    sort_keys: Vec<SortKey>,
    base_order: Option<String>,
    table: Option<String>,
}

impl QueryState {
    /// Parse a top-level select into a fresh query state.
    ///
    /// A trailing `limit`/`offset` is dropped because the row window does its
    /// own paging. A trailing `order by` is kept until a sort key is toggled.
    /// Only top-level clauses are recognised; subqueries stay as written.
    pub fn set_base(select_text: &str) -> Result<Self, QueryError> {
        let text = select_text.trim().trim_end_matches(';').trim_end();
        if text.is_empty() {
            return Err(QueryError::Empty);
        }

        let (from_start, _) = find_keyword(text, "from").ok_or(QueryError::MissingFrom)?;
        let select_list = text[..from_start].trim_end().to_string();
        let mut rest = &text[from_start..];

        if let Some((limit_start, _)) = find_keyword(rest, "limit") {
            rest = rest[..limit_start].trim_end();
        }

        let mut base_order = None;
        if let Some((order_start, _)) = find_keyword(rest, "order by") {
            base_order = Some(rest[order_start..].trim().to_string());
            rest = rest[..order_start].trim_end();
        }

        let mut group_clause = None;
        if let Some((group_start, _)) = find_keyword(rest, "group by") {
            group_clause = Some(rest[group_start..].trim().to_string());
            rest = rest[..group_start].trim_end();
        }

        let mut from_clause = rest;
        let mut filters = Vec::new();
        let mut base_where = None;
        if let Some((where_start, where_end)) = find_keyword(rest, "where") {
            let predicate = rest[where_end..].trim();
            from_clause = rest[..where_start].trim_end();
            match parse_filters(predicate) {
                Some(parsed) => filters = parsed,
                None => base_where = Some(predicate.to_string()),
            }
        }

        let table = leading_identifier(&from_clause["from".len()..])
            .map(|(token, _)| token.to_string());

        Ok(Self {
            select_list,
            from_clause: from_clause.to_string(),
            base_where,
            group_clause,
            filters,
            sort_keys: Vec::new(),
            base_order,
            table,
        })
    }

    /// `select * from <table>`
    pub fn for_table(table: &str) -> Self {
        let table = quote_identifier(table);
        Self {
            select_list: "select *".to_string(),
            from_clause: format!("from {}", table),
            base_where: None,
            group_clause: None,
            filters: Vec::new(),
            sort_keys: Vec::new(),
            base_order: None,
            table: Some(table),
        }
    }

    /// The first relation after `from`, as written. Edits target it.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Table name as reported by change notifications (unquoted, lowercase).
    pub fn watched_table(&self) -> Option<String> {
        self.table
            .as_deref()
            .map(|t| unqualified_name(t).to_lowercase())
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Active sort keys in priority order.
    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    pub fn sort_for(&self, column: &str) -> Option<&SortKey> {
        self.sort_keys.iter().find(|k| k.column == column)
    }

    /// Insert the `{column, value}` predicate, or remove it if present.
    pub fn toggle_filter(&mut self, column: &str, value: &str) -> Result<FilterToggle, QueryError> {
        if column.is_empty() {
            return Err(QueryError::UnnamedColumn);
        }

        if let Some(pos) = self
            .filters
            .iter()
            .position(|f| f.column == column && f.value == value)
        {
            self.filters.remove(pos);
            Ok(FilterToggle::Removed)
        } else {
            self.filters.push(Filter::new(column, value));
            Ok(FilterToggle::Added)
        }
    }

    /// Cycle a column through ascending, descending and unsorted.
    pub fn toggle_sort(&mut self, column: &str) -> Result<SortDirection, QueryError> {
        if column.is_empty() {
            return Err(QueryError::UnnamedColumn);
        }

        match self.sort_keys.iter().position(|k| k.column == column) {
            Some(pos) if self.sort_keys[pos].ascending => {
                self.sort_keys[pos].ascending = false;
                Ok(SortDirection::Descending)
            }
            Some(pos) => {
                self.sort_keys.remove(pos);
                for (i, key) in self.sort_keys.iter_mut().enumerate() {
                    key.priority = i + 1;
                }
                Ok(SortDirection::Unsorted)
            }
            None => {
                if self.sort_keys.len() >= MAX_SORT_COLUMNS {
                    return Err(QueryError::TooManySortKeys);
                }
                self.sort_keys.push(SortKey {
                    column: column.to_string(),
                    ascending: true,
                    priority: self.sort_keys.len() + 1,
                });
                Ok(SortDirection::Ascending)
            }
        }
    }

    /// `from … where …` including the active filters, then any grouping.
    ///
    /// A verbatim where clause is parenthesised once filters join it, so an
    /// `or` inside it cannot swallow them.
    fn predicate_sql(&self) -> String {
        let mut terms: Vec<String> = Vec::new();
        match &self.base_where {
            Some(base) if self.filters.is_empty() => terms.push(base.clone()),
            Some(base) => terms.push(format!("({})", base)),
            None => {}
        }
        terms.extend(self.filters.iter().map(Filter::to_sql));

        let mut out = self.from_clause.clone();
        if !terms.is_empty() {
            out.push_str(" where ");
            out.push_str(&terms.join(" and "));
        }
        if let Some(group) = &self.group_clause {
            out.push(' ');
            out.push_str(group);
        }
        out
    }

    /// Whether result rows are not one-to-one with source rows.
    fn is_aggregated(&self) -> bool {
        self.group_clause.is_some() || starts_with_keyword(&self.select_list, "select distinct")
    }

    fn order_sql(&self) -> String {
        if self.sort_keys.is_empty() {
            return match &self.base_order {
                Some(order) => format!(" {}", order),
                None => String::new(),
            };
        }

        let keys: Vec<String> = self
            .sort_keys
            .iter()
            .map(|k| {
                let col = quote_identifier(&k.column);
                if k.ascending {
                    col
                } else {
                    format!("{} desc", col)
                }
            })
            .collect();
        format!(" order by {}", keys.join(", "))
    }

    pub fn select_sql(&self) -> String {
        format!("{} {}{}", self.select_list, self.predicate_sql(), self.order_sql())
    }

    /// Row count of the current query; ordering and paging never affect it.
    pub fn count_sql(&self) -> String {
        if self.is_aggregated() {
            return format!(
                "select count(*) from ({} {})",
                self.select_list,
                self.predicate_sql()
            );
        }
        format!("select count(*) {}", self.predicate_sql())
    }

    pub fn fetch_sql(&self, limit: usize, offset: usize) -> String {
        format!("{} limit {} offset {}", self.select_sql(), limit, offset)
    }

    /// Projection of some columns over the same rows and order.
    pub fn columns_sql(&self, columns: &[String], limit: usize, offset: usize) -> String {
        let cols: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        if self.is_aggregated() {
            // Result columns of a grouped query only exist in its output.
            return format!(
                "select {} from ({}) limit {} offset {}",
                cols.join(", "),
                self.select_sql(),
                limit,
                offset
            );
        }
        format!(
            "select {} {}{} limit {} offset {}",
            cols.join(", "),
            self.predicate_sql(),
            self.order_sql(),
            limit,
            offset
        )
    }
}

/// Take a where clause apart into equality filters, but only when rendering
/// them again gives back the exact same text.
fn parse_filters(predicate: &str) -> Option<Vec<Filter>> {
    let filters = split_on_keyword(predicate, "and")
        .into_iter()
        .map(|part| parse_equality(part.trim()).map(|(c, v)| Filter::new(c, v)))
        .collect::<Option<Vec<_>>>()?;

    let rendered: Vec<String> = filters.iter().map(Filter::to_sql).collect();
    (rendered.join(" and ") == predicate).then_some(filters)
}
