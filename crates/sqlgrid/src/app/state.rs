/// Which input receives keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Grid,
    /// SQL command line.
    Sql,
    /// `:` command prompt.
    Command,
    /// Cell editor of an insert or update.
    Edit,
}

impl Focus {
    pub fn label(&self) -> &'static str {
        match self {
            Focus::Grid => "GRID",
            Focus::Sql => "SQL",
            Focus::Command => "COMMAND",
            Focus::Edit => "EDIT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreStatus {
    Closed,
    Opening,
    Open,
}

impl StoreStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StoreStatus::Closed => "NO DATABASE",
            StoreStatus::Opening => "OPENING",
            StoreStatus::Open => "OPEN",
        }
    }
}
