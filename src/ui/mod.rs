use std::io::IsTerminal;

mod pager;
mod select;
mod spinner;
mod status;
mod table;

pub use pager::print_with_pager;

pub use select::{fuzzy_select, select_project_interactive};

pub use spinner::{progress_bar, with_spinner};

pub use status::{print_command_status, CommandStatus};

pub use table::{apply_column_padding, header, styled_table, truncate};

pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal()
}
