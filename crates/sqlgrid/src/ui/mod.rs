mod editor;
mod grid;
mod help_popup;
mod status_line;

pub use editor::Prompt;
pub use grid::{marker_width, severity_color, DataGrid, GridState, PendingRow};
pub use help_popup::{centered_rect, HelpAction, HelpPopup};
pub use status_line::{store_label, Priority, StatusLineBuilder, StatusSegment};
